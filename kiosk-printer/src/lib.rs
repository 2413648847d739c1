//! # kiosk-printer
//!
//! ESC/POS thermal printer library - low-level printing capabilities only.
//!
//! ## Scope
//!
//! This crate handles HOW to print:
//! - ESC/POS command building
//! - Single-byte codepages (and GBK mode) for receipt text
//! - Barcode, QR code and raster image command blocks
//! - Image normalization to the print head width
//! - Network printing (TCP port 9100)
//!
//! WHAT to print and WHEN (receipt elements, job queues, retries) lives in
//! `kiosk-spooler`.
//!
//! ## Example
//!
//! ```ignore
//! use kiosk_printer::{EscPosBuilder, NetworkPrinter, Printer};
//!
//! let mut builder = EscPosBuilder::new(48);
//! builder.center();
//! builder.double_size();
//! builder.line("FİŞ");
//! builder.reset_size();
//! builder.rule('=', 48);
//! builder.left();
//! builder.line("Masa: 12");
//!
//! let printer = NetworkPrinter::new("192.168.1.100", 9100)?;
//! printer.print(&builder.finish(4)).await?;
//! ```

mod barcode;
mod encoding;
mod error;
mod escpos;
mod printer;
pub mod raster;

// Re-exports
pub use barcode::{BarcodeOptions, QrErrorLevel, QrOptions, Symbology, barcode_command, qr_command};
pub use encoding::Codepage;
pub use error::{EncodeError, EncodeResult, PrintError, PrintResult};
pub use escpos::{Align, Checkpoint, EscPosBuilder};
pub use printer::{DEFAULT_PORT, DEFAULT_TIMEOUT, NetworkPrinter, Printer};
pub use raster::{
    DitherAlgorithm, MAX_RASTER_HEIGHT, NormalizedImage, PRINTER_WIDTH, RasterImage, normalize,
};
