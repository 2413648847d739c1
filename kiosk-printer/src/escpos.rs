//! ESC/POS command builder
//!
//! Provides a fluent API for building ESC/POS print data.

use serde::{Deserialize, Serialize};

use crate::barcode::{BarcodeOptions, QrOptions, barcode_command, qr_command};
use crate::encoding::Codepage;
use crate::error::{EncodeError, EncodeResult};
use crate::raster::RasterImage;

/// Horizontal justification (ESC a n)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Align {
    #[default]
    Left,
    Center,
    Right,
}

impl Align {
    fn command_value(self) -> u8 {
        match self {
            Align::Left => 0x00,
            Align::Center => 0x01,
            Align::Right => 0x02,
        }
    }
}

/// Position in the stream that a failed element can be rolled back to
#[derive(Debug, Clone, Copy)]
pub struct Checkpoint {
    len: usize,
    align: Option<Align>,
}

/// ESC/POS command builder
///
/// Builds ESC/POS byte sequences for thermal printers.
/// Text is converted to the builder's codepage as it is written.
pub struct EscPosBuilder {
    buf: Vec<u8>,
    width: usize,
    codepage: Codepage,
    align: Option<Align>,
}

impl EscPosBuilder {
    /// Create a new builder with the specified paper width in characters
    ///
    /// Common widths:
    /// - 58mm paper: 32 characters
    /// - 80mm paper: 48 characters
    pub fn new(width: usize) -> Self {
        Self::with_codepage(width, Codepage::default())
    }

    /// Create a builder that prints text in the given codepage
    pub fn with_codepage(width: usize, codepage: Codepage) -> Self {
        let mut b = Self {
            buf: Vec::with_capacity(4096),
            width,
            codepage,
            align: None,
        };
        b.reset();
        b
    }

    /// Get the configured paper width
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn codepage(&self) -> Codepage {
        self.codepage
    }

    /// Alignment mode currently in effect, if one was set since reset
    pub fn current_align(&self) -> Option<Align> {
        self.align
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Bytes written so far
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    // === Checkpoints ===

    /// Remember the current end of the stream
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            len: self.buf.len(),
            align: self.align,
        }
    }

    /// Discard everything written after `cp`
    pub fn rollback(&mut self, cp: Checkpoint) -> &mut Self {
        self.buf.truncate(cp.len);
        self.align = cp.align;
        self
    }

    // === Text Output ===

    /// Write text in the builder's codepage
    pub fn text(&mut self, s: &str) -> &mut Self {
        let bytes = self.codepage.encode(s);
        self.buf.extend_from_slice(&bytes);
        self
    }

    /// Write text followed by newline
    pub fn line(&mut self, s: &str) -> &mut Self {
        self.text(s);
        self.buf.push(b'\n');
        self
    }

    /// Write empty line
    pub fn newline(&mut self) -> &mut Self {
        self.buf.push(b'\n');
        self
    }

    /// Write `count` line feeds
    pub fn newlines(&mut self, count: usize) -> &mut Self {
        self.buf.extend(std::iter::repeat_n(b'\n', count));
        self
    }

    // === Alignment ===

    /// Set justification; stays in effect until changed
    pub fn align(&mut self, align: Align) -> &mut Self {
        self.buf
            .extend_from_slice(&[0x1B, 0x61, align.command_value()]);
        self.align = Some(align);
        self
    }

    /// Align text to center
    pub fn center(&mut self) -> &mut Self {
        self.align(Align::Center)
    }

    /// Align text to left (default)
    pub fn left(&mut self) -> &mut Self {
        self.align(Align::Left)
    }

    /// Align text to right
    pub fn right(&mut self) -> &mut Self {
        self.align(Align::Right)
    }

    // === Text Style ===

    /// Enable bold text
    pub fn bold(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1B, 0x45, 0x01]);
        self
    }

    /// Disable bold text
    pub fn bold_off(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1B, 0x45, 0x00]);
        self
    }

    /// Enable single underline
    pub fn underline(&mut self) -> &mut Self {
        // ESC - n
        self.buf.extend_from_slice(&[0x1B, 0x2D, 0x01]);
        self
    }

    pub fn underline_off(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1B, 0x2D, 0x00]);
        self
    }

    /// Double width and height
    pub fn double_size(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1D, 0x21, 0x11]);
        self
    }

    /// Reset to normal size
    pub fn reset_size(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1D, 0x21, 0x00]);
        self
    }

    // === Separators ===

    /// Print `ch` repeated `length` times on its own line
    pub fn rule(&mut self, ch: char, length: usize) -> &mut Self {
        let s: String = std::iter::repeat_n(ch, length).collect();
        self.line(&s)
    }

    // === Paper Control ===

    /// Cut paper (full cut)
    pub fn cut(&mut self) -> &mut Self {
        // GS V 0 - Full cut
        self.buf.extend_from_slice(&[0x1D, 0x56, 0x00]);
        self
    }

    // === Codes ===

    /// Print a 1D barcode
    ///
    /// Nothing is written if the data is rejected.
    pub fn barcode(&mut self, data: &str, options: &BarcodeOptions) -> EncodeResult<&mut Self> {
        let cmd = barcode_command(data, options)?;
        self.buf.extend_from_slice(&cmd);
        Ok(self)
    }

    /// Print a QR code
    ///
    /// Nothing is written if the data is rejected.
    pub fn qr_code(&mut self, data: &str, options: &QrOptions) -> EncodeResult<&mut Self> {
        let cmd = qr_command(data, options)?;
        self.buf.extend_from_slice(&cmd);
        Ok(self)
    }

    // === Images ===

    /// Print a raster bit image (GS v 0)
    ///
    /// Nothing is written if the size does not fit the 16-bit header fields
    /// or disagrees with the data length.
    pub fn raster(&mut self, image: &RasterImage) -> EncodeResult<&mut Self> {
        let x_bytes = image.width_bytes();
        let h = image.height;
        if x_bytes > u32::from(u16::MAX) || h > u32::from(u16::MAX) {
            return Err(EncodeError::ImageTooLarge {
                width: image.width,
                height: h,
                max: u32::from(u16::MAX),
            });
        }
        if image.data.len() as u64 != u64::from(x_bytes) * u64::from(h) {
            return Err(EncodeError::InvalidImage(format!(
                "{} bytes of raster data for {}x{} dots",
                image.data.len(),
                image.width,
                h
            )));
        }

        // GS v 0 m xL xH yL yH
        self.buf.extend_from_slice(&[0x1D, 0x76, 0x30, 0x00]);
        self.buf.push(x_bytes as u8);
        self.buf.push((x_bytes >> 8) as u8);
        self.buf.push(h as u8);
        self.buf.push((h >> 8) as u8);
        self.buf.extend_from_slice(&image.data);
        Ok(self)
    }

    /// Reset printer to default state and re-select font A and the codepage
    pub fn reset(&mut self) -> &mut Self {
        // ESC @ - Initialize
        self.buf.extend_from_slice(&[0x1B, 0x40]);
        // ESC M 0 - Font A (48 columns on 80mm)
        self.buf.extend_from_slice(&[0x1B, 0x4D, 0x00]);
        self.buf.extend_from_slice(self.codepage.select_command());
        self.align = None;
        self
    }

    // === Build ===

    /// Close the document: leave the codepage mode, feed `feed_lines`
    /// lines and cut, so the stream always ends with the cut
    pub fn finish(mut self, feed_lines: usize) -> Vec<u8> {
        self.buf.extend_from_slice(self.codepage.exit_command());
        self.newlines(feed_lines);
        self.cut();
        self.buf
    }
}

impl Default for EscPosBuilder {
    fn default() -> Self {
        Self::new(48)
    }
}
