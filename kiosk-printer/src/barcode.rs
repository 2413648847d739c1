//! Barcode and QR code command blocks
//!
//! Data is validated per symbology before any command byte is produced,
//! so a rejected barcode never leaves a half-written command in the stream.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{EncodeError, EncodeResult};

/// QR store function accepts at most this many data bytes
const QR_MAX_DATA: usize = 7089;

/// 1D barcode symbologies supported by GS k (function B)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Symbology {
    #[serde(alias = "upc-a")]
    Upca,
    #[serde(alias = "upc-e")]
    Upce,
    #[serde(alias = "ean-13")]
    Ean13,
    #[serde(alias = "ean-8")]
    Ean8,
    Code39,
    Itf,
    Codabar,
    Code93,
    #[default]
    Code128,
}

impl Symbology {
    pub fn name(self) -> &'static str {
        match self {
            Symbology::Upca => "upca",
            Symbology::Upce => "upce",
            Symbology::Ean13 => "ean13",
            Symbology::Ean8 => "ean8",
            Symbology::Code39 => "code39",
            Symbology::Itf => "itf",
            Symbology::Codabar => "codabar",
            Symbology::Code93 => "code93",
            Symbology::Code128 => "code128",
        }
    }

    /// GS k `m` value for function B
    fn command_id(self) -> u8 {
        match self {
            Symbology::Upca => 65,
            Symbology::Upce => 66,
            Symbology::Ean13 => 67,
            Symbology::Ean8 => 68,
            Symbology::Code39 => 69,
            Symbology::Itf => 70,
            Symbology::Codabar => 71,
            Symbology::Code93 => 72,
            Symbology::Code128 => 73,
        }
    }

    fn invalid(self, reason: impl Into<String>) -> EncodeError {
        EncodeError::InvalidBarcode {
            symbology: self.name(),
            reason: reason.into(),
        }
    }

    /// Check that `data` is encodable in this symbology
    pub fn validate(self, data: &str) -> EncodeResult<()> {
        if data.is_empty() {
            return Err(self.invalid("empty data"));
        }
        let all_digits = data.bytes().all(|b| b.is_ascii_digit());

        match self {
            Symbology::Upca => {
                if !all_digits || !matches!(data.len(), 11 | 12) {
                    return Err(self.invalid("expected 11 or 12 digits"));
                }
                if data.len() == 12 {
                    verify_check_digit(self, data)?;
                }
            }
            Symbology::Upce => {
                if !all_digits || !matches!(data.len(), 6..=8 | 11 | 12) {
                    return Err(self.invalid("expected 6-8, 11 or 12 digits"));
                }
            }
            Symbology::Ean13 => {
                if !all_digits || !matches!(data.len(), 12 | 13) {
                    return Err(self.invalid("expected 12 or 13 digits"));
                }
                if data.len() == 13 {
                    verify_check_digit(self, data)?;
                }
            }
            Symbology::Ean8 => {
                if !all_digits || !matches!(data.len(), 7 | 8) {
                    return Err(self.invalid("expected 7 or 8 digits"));
                }
                if data.len() == 8 {
                    verify_check_digit(self, data)?;
                }
            }
            Symbology::Code39 => {
                let ok = data.bytes().all(|b| {
                    b.is_ascii_digit() || b.is_ascii_uppercase() || b" $%*+-./".contains(&b)
                });
                if !ok {
                    return Err(self.invalid("allowed: 0-9 A-Z space $ % * + - . /"));
                }
            }
            Symbology::Itf => {
                if !all_digits || data.len() % 2 != 0 {
                    return Err(self.invalid("expected an even number of digits"));
                }
            }
            Symbology::Codabar => {
                let ok = data.bytes().all(|b| {
                    b.is_ascii_digit() || b"ABCDabcd-$:/.+".contains(&b)
                });
                if !ok {
                    return Err(self.invalid("allowed: 0-9 A-D - $ : / . +"));
                }
            }
            Symbology::Code93 | Symbology::Code128 => {
                if !data.is_ascii() {
                    return Err(self.invalid("non-ASCII data"));
                }
            }
        }

        // n is a single byte; CODE128 also spends two bytes on the code set
        // prefix and one more per escaped brace
        let overhead = if self == Symbology::Code128 {
            2 + data.bytes().filter(|b| *b == b'{').count()
        } else {
            0
        };
        if data.len() + overhead > 255 {
            return Err(self.invalid("data too long"));
        }
        Ok(())
    }
}

impl FromStr for Symbology {
    type Err = EncodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "upca" => Ok(Symbology::Upca),
            "upce" => Ok(Symbology::Upce),
            "ean13" | "jan13" => Ok(Symbology::Ean13),
            "ean8" | "jan8" => Ok(Symbology::Ean8),
            "code39" => Ok(Symbology::Code39),
            "itf" | "itf14" => Ok(Symbology::Itf),
            "codabar" | "nw7" => Ok(Symbology::Codabar),
            "code93" => Ok(Symbology::Code93),
            "code128" => Ok(Symbology::Code128),
            _ => Err(EncodeError::InvalidBarcode {
                symbology: "unknown",
                reason: format!("unsupported symbology: {}", s),
            }),
        }
    }
}

/// Verify the trailing GS1 modulo-10 check digit (UPC-A, EAN-13, EAN-8)
fn verify_check_digit(symbology: Symbology, data: &str) -> EncodeResult<()> {
    let digits: Vec<u32> = data.bytes().map(|b| u32::from(b - b'0')).collect();
    let (body, check) = digits.split_at(digits.len() - 1);

    // Weights alternate 3,1,3,... starting from the digit next to the check digit
    let sum: u32 = body
        .iter()
        .rev()
        .enumerate()
        .map(|(i, d)| if i % 2 == 0 { d * 3 } else { *d })
        .sum();
    let expected = (10 - sum % 10) % 10;

    if expected != check[0] {
        return Err(symbology.invalid(format!(
            "check digit {} does not match expected {}",
            check[0], expected
        )));
    }
    Ok(())
}

/// Options for a 1D barcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarcodeOptions {
    pub symbology: Symbology,
    /// Bar height in dots (1-255)
    pub height: u8,
    /// Module width (2-6)
    pub width: u8,
    /// Print human readable text below the bars
    pub show_text: bool,
}

impl Default for BarcodeOptions {
    fn default() -> Self {
        Self {
            symbology: Symbology::Code128,
            height: 60,
            width: 2,
            show_text: true,
        }
    }
}

/// Build the GS h / GS w / GS H / GS k block for a barcode
pub fn barcode_command(data: &str, options: &BarcodeOptions) -> EncodeResult<Vec<u8>> {
    let symbology = options.symbology;
    symbology.validate(data)?;

    let mut cmd = Vec::with_capacity(data.len() + 16);
    // GS h n - Bar height
    cmd.extend_from_slice(&[0x1D, 0x68, options.height.max(1)]);
    // GS w n - Module width
    cmd.extend_from_slice(&[0x1D, 0x77, options.width.clamp(2, 6)]);
    // GS H n - HRI position (0 = none, 2 = below)
    cmd.extend_from_slice(&[0x1D, 0x48, if options.show_text { 2 } else { 0 }]);

    let payload: Vec<u8> = if symbology == Symbology::Code128 {
        // Code set B; a literal brace is sent as "{{"
        let mut p = b"{B".to_vec();
        for byte in data.bytes() {
            if byte == b'{' {
                p.push(b'{');
            }
            p.push(byte);
        }
        p
    } else {
        data.as_bytes().to_vec()
    };

    // GS k m n d1...dn
    cmd.extend_from_slice(&[0x1D, 0x6B, symbology.command_id(), payload.len() as u8]);
    cmd.extend_from_slice(&payload);
    Ok(cmd)
}

/// QR code error correction level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QrErrorLevel {
    #[serde(alias = "L")]
    L,
    #[default]
    #[serde(alias = "M")]
    M,
    #[serde(alias = "Q")]
    Q,
    #[serde(alias = "H")]
    H,
}

impl QrErrorLevel {
    fn command_value(self) -> u8 {
        match self {
            QrErrorLevel::L => 0x30,
            QrErrorLevel::M => 0x31,
            QrErrorLevel::Q => 0x32,
            QrErrorLevel::H => 0x33,
        }
    }
}

/// Options for a QR code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QrOptions {
    /// QR model (1 or 2)
    pub model: u8,
    /// Module size in dots (1-16)
    pub size: u8,
    pub error_level: QrErrorLevel,
}

impl Default for QrOptions {
    fn default() -> Self {
        Self {
            model: 2,
            size: 6,
            error_level: QrErrorLevel::M,
        }
    }
}

/// Build the GS ( k sequence that stores and prints a QR code
pub fn qr_command(data: &str, options: &QrOptions) -> EncodeResult<Vec<u8>> {
    if data.is_empty() {
        return Err(EncodeError::InvalidQrCode("empty data".to_string()));
    }
    if data.len() > QR_MAX_DATA {
        return Err(EncodeError::InvalidQrCode(format!(
            "{} bytes exceeds the {} byte limit",
            data.len(),
            QR_MAX_DATA
        )));
    }
    if !matches!(options.model, 1 | 2) {
        return Err(EncodeError::InvalidQrCode(format!(
            "unsupported model {}",
            options.model
        )));
    }

    let size = options.size.clamp(1, 16);
    let mut cmd = Vec::with_capacity(data.len() + 40);

    // Function 165: Select model
    cmd.extend_from_slice(&[0x1D, 0x28, 0x6B, 0x04, 0x00, 0x31, 0x41, 0x30 + options.model, 0x00]);

    // Function 167: Set module size
    cmd.extend_from_slice(&[0x1D, 0x28, 0x6B, 0x03, 0x00, 0x31, 0x43, size]);

    // Function 169: Set error correction level
    cmd.extend_from_slice(&[
        0x1D,
        0x28,
        0x6B,
        0x03,
        0x00,
        0x31,
        0x45,
        options.error_level.command_value(),
    ]);

    // Function 180: Store data
    let data_bytes = data.as_bytes();
    let len = data_bytes.len() + 3;
    let p_l = (len & 0xFF) as u8;
    let p_h = ((len >> 8) & 0xFF) as u8;
    cmd.extend_from_slice(&[0x1D, 0x28, 0x6B, p_l, p_h, 0x31, 0x50, 0x30]);
    cmd.extend_from_slice(data_bytes);

    // Function 181: Print
    cmd.extend_from_slice(&[0x1D, 0x28, 0x6B, 0x03, 0x00, 0x31, 0x51, 0x30]);

    Ok(cmd)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ean13_check_digit() {
        assert!(Symbology::Ean13.validate("4006381333931").is_ok());
        assert!(Symbology::Ean13.validate("4006381333932").is_err());
        // Without check digit the printer computes it
        assert!(Symbology::Ean13.validate("400638133393").is_ok());
    }

    #[test]
    fn test_ean8_and_upca() {
        assert!(Symbology::Ean8.validate("96385074").is_ok());
        assert!(Symbology::Upca.validate("036000291452").is_ok());
        assert!(Symbology::Upca.validate("03600029145").is_ok());
        assert!(Symbology::Upca.validate("036000291453").is_err());
    }

    #[test]
    fn test_rejects_bad_charset() {
        assert!(Symbology::Ean13.validate("ABC").is_err());
        assert!(Symbology::Code39.validate("abc").is_err());
        assert!(Symbology::Itf.validate("123").is_err());
        assert!(Symbology::Code128.validate("çay").is_err());
        assert!(Symbology::Code128.validate("").is_err());
    }

    #[test]
    fn test_parse_symbology() {
        assert_eq!("EAN-13".parse::<Symbology>().unwrap(), Symbology::Ean13);
        assert_eq!("code128".parse::<Symbology>().unwrap(), Symbology::Code128);
        assert_eq!("UPC_A".parse::<Symbology>().unwrap(), Symbology::Upca);
        assert!("pdf417".parse::<Symbology>().is_err());
    }

    #[test]
    fn test_code128_command() {
        let cmd = barcode_command("AB12", &BarcodeOptions::default()).unwrap();
        let tail = &cmd[cmd.len() - 10..];
        assert_eq!(&tail[..4], &[0x1D, 0x6B, 73, 6]);
        assert_eq!(&tail[4..], b"{BAB12");
        // HRI below
        assert!(cmd.windows(3).any(|w| w == [0x1D, 0x48, 2]));
    }

    #[test]
    fn test_code128_too_long() {
        let data = "A".repeat(254);
        assert!(barcode_command(&data, &BarcodeOptions::default()).is_err());
    }

    #[test]
    fn test_code128_escapes_braces() {
        let cmd = barcode_command("AB{C12", &BarcodeOptions::default()).unwrap();
        let tail = &cmd[cmd.len() - 13..];
        assert_eq!(&tail[..4], &[0x1D, 0x6B, 73, 9]);
        assert_eq!(&tail[4..], b"{BAB{{C12");

        // 253 bytes plus the prefix fit; each brace costs one more
        assert!(barcode_command(&"A".repeat(253), &BarcodeOptions::default()).is_ok());
        let braces = format!("{}{{", "A".repeat(252));
        assert!(barcode_command(&braces, &BarcodeOptions::default()).is_err());
    }

    #[test]
    fn test_qr_command() {
        let cmd = qr_command("https://example.com", &QrOptions::default()).unwrap();
        // Model 2
        assert_eq!(&cmd[..9], &[0x1D, 0x28, 0x6B, 0x04, 0x00, 0x31, 0x41, 0x32, 0x00]);
        // Error level M
        assert!(cmd.windows(8).any(|w| w == [0x1D, 0x28, 0x6B, 0x03, 0x00, 0x31, 0x45, 0x31]));
        // Ends with print function
        assert_eq!(&cmd[cmd.len() - 8..], &[0x1D, 0x28, 0x6B, 0x03, 0x00, 0x31, 0x51, 0x30]);
    }

    #[test]
    fn test_qr_rejects() {
        assert!(qr_command("", &QrOptions::default()).is_err());
        let bad_model = QrOptions {
            model: 3,
            ..Default::default()
        };
        assert!(qr_command("x", &bad_model).is_err());
        assert!(qr_command(&"x".repeat(QR_MAX_DATA + 1), &QrOptions::default()).is_err());
    }
}
