//! Codepage utilities for thermal printers
//!
//! Receipt printers print bytes, not Unicode. Text is converted to the
//! codepage the printer was switched into at initialization. This module
//! provides:
//! - Codepage selection commands
//! - Per-character conversion with a `?` fallback for unmappable characters
//! - Column width, truncation, padding and wrapping measured in printed cells

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::escpos::Align;

/// Fallback byte for characters the codepage cannot represent
const REPLACEMENT: u8 = b'?';

/// Character table the printer is switched into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codepage {
    /// WPC1252, Western European
    Wpc1252,
    /// WPC1254, Turkish
    #[default]
    Wpc1254,
    /// GBK double-byte mode for Chinese printers
    Gbk,
}

impl Codepage {
    fn encoding(self) -> &'static encoding_rs::Encoding {
        match self {
            Codepage::Wpc1252 => encoding_rs::WINDOWS_1252,
            Codepage::Wpc1254 => encoding_rs::WINDOWS_1254,
            Codepage::Gbk => encoding_rs::GBK,
        }
    }

    /// Commands that switch the printer into this codepage
    ///
    /// Must be re-sent after every ESC @ since INIT resets the table.
    pub fn select_command(self) -> &'static [u8] {
        match self {
            // ESC t n - Select character code table
            Codepage::Wpc1252 => &[0x1B, 0x74, 16],
            Codepage::Wpc1254 => &[0x1B, 0x74, 48],
            // FS & - Enable Chinese mode, FS C 1 - Select GBK
            Codepage::Gbk => &[0x1C, 0x26, 0x1C, 0x43, 0x01],
        }
    }

    /// Commands that leave this codepage at the end of a document
    pub fn exit_command(self) -> &'static [u8] {
        match self {
            // FS . - Cancel Chinese mode
            Codepage::Gbk => &[0x1C, 0x2E],
            _ => &[],
        }
    }

    /// Convert text to printer bytes
    pub fn encode(self, s: &str) -> Vec<u8> {
        let mut out = Vec::with_capacity(s.len());
        for c in s.chars() {
            self.encode_char(c, &mut out);
        }
        out
    }

    fn encode_char(self, c: char, out: &mut Vec<u8>) {
        if c.is_ascii() {
            out.push(c as u8);
            return;
        }
        let mut utf8 = [0u8; 4];
        let (bytes, _, had_errors) = self.encoding().encode(c.encode_utf8(&mut utf8));
        if had_errors {
            out.push(REPLACEMENT);
        } else {
            out.extend_from_slice(&bytes);
        }
    }

    /// Printed width of a string in character cells
    ///
    /// One byte occupies one cell, so GBK ideographs count as two.
    pub fn width(self, s: &str) -> usize {
        s.chars().map(|c| self.char_width(c)).sum()
    }

    fn char_width(self, c: char) -> usize {
        let mut out = Vec::with_capacity(2);
        self.encode_char(c, &mut out);
        out.len()
    }

    /// Truncate a string to fit within a printed width
    pub fn truncate(self, s: &str, max_width: usize) -> String {
        let mut width = 0;
        let mut result = String::new();
        for c in s.chars() {
            let w = self.char_width(c);
            if width + w > max_width {
                break;
            }
            result.push(c);
            width += w;
        }
        result
    }

    /// Pad a string to a printed width using the given alignment
    ///
    /// If the string is wider than `width`, it is truncated.
    pub fn pad(self, s: &str, width: usize, align: Align) -> String {
        let current = self.width(s);
        if current >= width {
            return self.truncate(s, width);
        }
        let spaces = width - current;
        match align {
            Align::Left => format!("{}{}", s, " ".repeat(spaces)),
            Align::Right => format!("{}{}", " ".repeat(spaces), s),
            Align::Center => {
                let left = spaces / 2;
                format!("{}{}{}", " ".repeat(left), s, " ".repeat(spaces - left))
            }
        }
    }

    /// Greedy word wrap to a printed width
    ///
    /// Words wider than the line are split at character boundaries.
    /// Always returns at least one (possibly empty) line.
    pub fn wrap(self, s: &str, width: usize) -> Vec<String> {
        let width = width.max(1);
        let mut lines = Vec::new();
        let mut current = String::new();
        let mut current_width = 0;

        for word in s.split_whitespace() {
            let word_width = self.width(word);
            let sep = usize::from(!current.is_empty());

            if current_width + sep + word_width <= width {
                if sep == 1 {
                    current.push(' ');
                }
                current.push_str(word);
                current_width += sep + word_width;
                continue;
            }

            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
                current_width = 0;
            }

            // Hard-split words that cannot fit on a line of their own
            for c in word.chars() {
                let w = self.char_width(c);
                if current_width + w > width && !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                    current_width = 0;
                }
                current.push(c);
                current_width += w;
            }
        }

        if !current.is_empty() || lines.is_empty() {
            lines.push(current);
        }
        lines
    }
}

impl fmt::Display for Codepage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Codepage::Wpc1252 => write!(f, "wpc1252"),
            Codepage::Wpc1254 => write!(f, "wpc1254"),
            Codepage::Gbk => write!(f, "gbk"),
        }
    }
}

impl FromStr for Codepage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "wpc1252" | "cp1252" | "windows-1252" => Ok(Codepage::Wpc1252),
            "wpc1254" | "cp1254" | "windows-1254" => Ok(Codepage::Wpc1254),
            "gbk" => Ok(Codepage::Gbk),
            other => Err(format!("unknown codepage: {}", other)),
        }
    }
}
