//! Error types for the printer library

use thiserror::Error;

/// Printer error types
#[derive(Debug, Error)]
pub enum PrintError {
    /// Network connection error
    #[error("Connection failed: {0}")]
    Connection(String),

    /// IO error during printing
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Timeout waiting for printer
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Invalid printer configuration
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

/// Result type for printer operations
pub type PrintResult<T> = Result<T, PrintError>;

/// Errors raised while turning one receipt element into commands
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("Invalid barcode data for {symbology}: {reason}")]
    InvalidBarcode {
        symbology: &'static str,
        reason: String,
    },

    #[error("Invalid QR code: {0}")]
    InvalidQrCode(String),

    #[error("Invalid image data: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Image decode failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Image too large: {width}x{height} dots, at most {max} rows")]
    ImageTooLarge { width: u32, height: u32, max: u32 },

    #[error("Invalid table: {0}")]
    InvalidTable(String),
}

/// Result type for encoding operations
pub type EncodeResult<T> = Result<T, EncodeError>;
