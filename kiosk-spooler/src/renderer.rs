//! Receipt renderer
//!
//! Turns an ordered list of [`ReceiptElement`]s into one ESC/POS byte
//! stream. Rendering never fails as a whole: an element that cannot be
//! encoded is rolled back and replaced by a one-line `[Error: <type>]`
//! marker, and every stream ends with a feed and a full cut.

use chrono::Utc;
use kiosk_printer::{
    Align, BarcodeOptions, Codepage, EncodeError, EncodeResult, EscPosBuilder, QrOptions,
    Symbology, raster,
};
use tracing::{debug, warn};

use crate::element::{
    BarcodeElement, ImageElement, QrCodeElement, ReceiptElement, TableElement, TextElement,
};
use crate::types::PrinterConfig;

/// Lines fed before the closing cut
const TRAILING_FEED: usize = 4;

/// Upper bound for a single blank element
const MAX_BLANK_LINES: usize = 255;

/// Receipt renderer
#[derive(Debug, Clone, Copy)]
pub struct ReceiptRenderer {
    width: usize,
    codepage: Codepage,
}

impl ReceiptRenderer {
    /// Create a renderer for the given paper width in characters
    pub fn new(width: usize, codepage: Codepage) -> Self {
        Self { width, codepage }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Render receipt elements to ESC/POS bytes
    pub fn render(&self, elements: &[ReceiptElement]) -> Vec<u8> {
        let mut b = EscPosBuilder::with_codepage(self.width, self.codepage);

        for (index, element) in elements.iter().enumerate() {
            let cp = b.checkpoint();
            if let Err(e) = self.render_element(&mut b, element) {
                warn!(index, kind = element.kind(), error = %e, "Element failed, printing placeholder");
                b.rollback(cp);
                b.line(&format!("[Error: {}]", element.kind()));
            }
        }

        let data = b.finish(TRAILING_FEED);
        debug!(elements = elements.len(), bytes = data.len(), "Receipt rendered");
        data
    }

    fn render_element(&self, b: &mut EscPosBuilder, element: &ReceiptElement) -> EncodeResult<()> {
        match element {
            ReceiptElement::Text(text) => self.render_text(b, text),
            ReceiptElement::Header(header) => {
                b.align(header.align);
                b.bold();
                b.double_size();
                b.line(&header.content);
                b.reset_size();
                b.bold_off();
            }
            ReceiptElement::Image(image) => self.render_image(b, image)?,
            ReceiptElement::Barcode(barcode) => self.render_barcode(b, barcode)?,
            ReceiptElement::QrCode(qr) => self.render_qr(b, qr)?,
            ReceiptElement::Table(table) => self.render_table(b, table)?,
            ReceiptElement::Rule(rule) => {
                b.align(rule.align);
                b.rule(rule.ch, rule.length);
            }
            ReceiptElement::Blank(blank) => {
                b.newlines(blank.count.min(MAX_BLANK_LINES));
            }
            ReceiptElement::Cut => {
                b.newlines(TRAILING_FEED);
                b.cut();
            }
            ReceiptElement::Unsupported { kind } => {
                debug!(kind = %kind, "Unsupported element");
                b.line(&format!("[{}]", kind));
            }
        }
        Ok(())
    }

    fn render_text(&self, b: &mut EscPosBuilder, text: &TextElement) {
        b.align(text.align);
        if text.bold {
            b.bold();
        }
        if text.underline {
            b.underline();
        }
        b.line(&text.content);
        if text.underline {
            b.underline_off();
        }
        if text.bold {
            b.bold_off();
        }
    }

    fn render_image(&self, b: &mut EscPosBuilder, image: &ImageElement) -> EncodeResult<()> {
        let normalized = raster::normalize(&image.image_data)?;
        let raster = normalized.to_raster(image.algorithm, image.threshold);
        b.align(image.align);
        b.raster(&raster)?;
        b.newline();
        Ok(())
    }

    fn render_barcode(&self, b: &mut EscPosBuilder, barcode: &BarcodeElement) -> EncodeResult<()> {
        let symbology: Symbology = barcode.symbology.parse()?;
        let options = BarcodeOptions {
            symbology,
            height: clamp_u8(barcode.height, 1, 255),
            width: clamp_u8(barcode.width, 2, 6),
            show_text: barcode.show_text,
        };
        b.align(barcode.align);
        b.barcode(&barcode.data, &options)?;
        b.newline();
        Ok(())
    }

    fn render_qr(&self, b: &mut EscPosBuilder, qr: &QrCodeElement) -> EncodeResult<()> {
        let options = QrOptions {
            model: qr.model,
            size: qr.size.clamp(1, 16),
            error_level: qr.error_level,
        };
        b.align(qr.align);
        b.qr_code(&qr.data, &options)?;
        b.newline();
        Ok(())
    }

    /// Fixed-width grid: every cell is wrapped to its column, padded to the
    /// column alignment and framed by the column margins
    fn render_table(&self, b: &mut EscPosBuilder, table: &TableElement) -> EncodeResult<()> {
        if table.columns.is_empty() {
            return Err(EncodeError::InvalidTable("no columns".to_string()));
        }
        if table.columns.iter().any(|c| c.width == 0) {
            return Err(EncodeError::InvalidTable("column width is 0".to_string()));
        }
        let total: usize = table.columns.iter().map(|c| c.span()).sum();
        if total > self.width {
            return Err(EncodeError::InvalidTable(format!(
                "columns span {} characters, paper has {}",
                total, self.width
            )));
        }

        b.align(Align::Left);
        for (row_index, row) in table.rows.iter().enumerate() {
            if row.len() > table.columns.len() {
                return Err(EncodeError::InvalidTable(format!(
                    "row {} has {} cells for {} columns",
                    row_index,
                    row.len(),
                    table.columns.len()
                )));
            }

            let wrapped: Vec<Vec<String>> = table
                .columns
                .iter()
                .enumerate()
                .map(|(i, column)| {
                    let cell = row.get(i).map(String::as_str).unwrap_or("");
                    self.codepage.wrap(cell, column.width)
                })
                .collect();
            let height = wrapped.iter().map(Vec::len).max().unwrap_or(1);

            for line_index in 0..height {
                let mut line = String::with_capacity(total);
                for (column, cell_lines) in table.columns.iter().zip(&wrapped) {
                    let part = cell_lines.get(line_index).map(String::as_str).unwrap_or("");
                    line.push_str(&" ".repeat(column.margin_left));
                    line.push_str(&self.codepage.pad(part, column.width, column.align));
                    line.push_str(&" ".repeat(column.margin_right));
                }
                b.line(line.trim_end());
            }
        }
        Ok(())
    }
}

impl Default for ReceiptRenderer {
    fn default() -> Self {
        Self::new(48, Codepage::default())
    }
}

fn clamp_u8(value: u32, min: u8, max: u8) -> u8 {
    value.clamp(u32::from(min), u32::from(max)) as u8
}

/// Render elements with the default 48-column renderer
pub fn encode(elements: &[ReceiptElement]) -> Vec<u8> {
    ReceiptRenderer::default().render(elements)
}

/// Built-in receipt used to check that a printer is wired up
pub fn test_page(printer: &PrinterConfig) -> Vec<ReceiptElement> {
    use crate::element::{RuleElement, TableColumn};

    let address = format!("{}:{}", printer.ip, printer.port);
    vec![
        ReceiptElement::header("TEST PRINT"),
        ReceiptElement::Rule(RuleElement::default()),
        ReceiptElement::Table(TableElement {
            columns: vec![
                TableColumn::new(12, Align::Left),
                TableColumn {
                    width: 30,
                    align: Align::Right,
                    margin_left: 1,
                    margin_right: 0,
                },
            ],
            rows: vec![
                vec!["Printer".to_string(), printer.label()],
                vec!["Address".to_string(), address.clone()],
                vec![
                    "Time".to_string(),
                    Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
                ],
            ],
        }),
        ReceiptElement::Rule(RuleElement::default()),
        ReceiptElement::Text(TextElement {
            content: "Türkçe: ğüşıöç ĞÜŞİÖÇ".to_string(),
            ..Default::default()
        }),
        ReceiptElement::QrCode(QrCodeElement {
            data: address,
            size: 4,
            ..Default::default()
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{BlankElement, RuleElement, TableColumn};

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    fn count(haystack: &[u8], needle: &[u8]) -> usize {
        haystack.windows(needle.len()).filter(|w| *w == needle).count()
    }

    #[test]
    fn test_empty_receipt_is_init_and_cut() {
        let data = encode(&[]);
        assert_eq!(&data[..2], &[0x1B, 0x40]);
        assert!(data.ends_with(&[b'\n', b'\n', b'\n', b'\n', 0x1D, 0x56, 0x00]));
    }

    #[test]
    fn test_text_styles_do_not_leak() {
        let data = encode(&[
            ReceiptElement::Text(TextElement {
                content: "Toplam".to_string(),
                align: Align::Right,
                bold: true,
                underline: true,
            }),
            ReceiptElement::text("plain"),
        ]);

        assert_eq!(count(&data, &[0x1B, 0x45, 0x01]), 1);
        assert_eq!(count(&data, &[0x1B, 0x45, 0x00]), 1);
        assert_eq!(count(&data, &[0x1B, 0x2D, 0x00]), 1);
        // bold off comes before the next element's text
        let off = data.windows(3).position(|w| w == [0x1B, 0x45, 0x00]).unwrap();
        let plain = data.windows(5).position(|w| w == b"plain").unwrap();
        assert!(off < plain);
        assert!(contains(&data, &[0x1B, 0x61, 0x02]));
    }

    #[test]
    fn test_header_is_bold_double_size() {
        let data = encode(&[ReceiptElement::header("FİŞ")]);
        let mut expected = vec![0x1B, 0x61, 0x01, 0x1B, 0x45, 0x01, 0x1D, 0x21, 0x11];
        // FİŞ in WPC1254
        expected.extend_from_slice(&[b'F', 0xDD, 0xDE, b'\n']);
        expected.extend_from_slice(&[0x1D, 0x21, 0x00, 0x1B, 0x45, 0x00]);
        assert!(contains(&data, &expected));
    }

    #[test]
    fn test_rule_and_blank() {
        let data = encode(&[
            ReceiptElement::Rule(RuleElement {
                ch: '-',
                length: 10,
                align: Align::Left,
            }),
            ReceiptElement::Blank(BlankElement { count: 3 }),
        ]);
        assert!(contains(&data, b"----------\n\n\n\n"));
    }

    #[test]
    fn test_rule_keeps_requested_length() {
        let renderer = ReceiptRenderer::new(48, Codepage::Wpc1254);
        let data = renderer.render(&[ReceiptElement::Rule(RuleElement {
            ch: '*',
            length: 60,
            align: Align::Center,
        })]);
        let expected = format!("{}\n", "*".repeat(60));
        assert!(contains(&data, expected.as_bytes()));
        assert!(!contains(&data, "*".repeat(61).as_bytes()));
    }

    #[test]
    fn test_gbk_receipt_ends_with_cut() {
        let renderer = ReceiptRenderer::new(48, Codepage::Gbk);
        let data = renderer.render(&[ReceiptElement::text("你好")]);
        assert!(contains(&data, &[0x1C, 0x2E]));
        assert!(data.ends_with(&[0x1C, 0x2E, b'\n', b'\n', b'\n', b'\n', 0x1D, 0x56, 0x00]));
    }

    #[test]
    fn test_bad_barcode_becomes_single_placeholder() {
        let data = encode(&[
            ReceiptElement::text("before"),
            ReceiptElement::Barcode(BarcodeElement {
                data: "12AB".to_string(),
                symbology: "ean13".to_string(),
                ..Default::default()
            }),
            ReceiptElement::QrCode(QrCodeElement {
                data: "https://example.com".to_string(),
                ..Default::default()
            }),
        ]);

        assert_eq!(count(&data, b"[Error: barcode]"), 1);
        assert!(contains(&data, b"before\n"));
        // QR print function still emitted
        assert!(contains(&data, &[0x1D, 0x28, 0x6B, 0x03, 0x00, 0x31, 0x51, 0x30]));
        // the rejected barcode left no GS h behind
        assert!(!contains(&data, &[0x1D, 0x68]));
        assert!(data.ends_with(&[0x1D, 0x56, 0x00]));
    }

    #[test]
    fn test_unknown_symbology_and_bad_image_are_contained() {
        let data = encode(&[
            ReceiptElement::Barcode(BarcodeElement {
                data: "123".to_string(),
                symbology: "pdf417".to_string(),
                ..Default::default()
            }),
            ReceiptElement::Image(ImageElement {
                image_data: "not base64!".to_string(),
                ..Default::default()
            }),
        ]);
        assert_eq!(count(&data, b"[Error: barcode]"), 1);
        assert_eq!(count(&data, b"[Error: image]"), 1);
    }

    #[test]
    fn test_unsupported_element_placeholder() {
        let data = encode(&[
            ReceiptElement::text("one"),
            ReceiptElement::Unsupported {
                kind: "signature".to_string(),
            },
            ReceiptElement::text("two"),
        ]);
        assert_eq!(count(&data, b"[signature]\n"), 1);
        assert!(contains(&data, b"one\n"));
        assert!(contains(&data, b"two\n"));
        assert!(!contains(&data, b"[Error"));
    }

    #[test]
    fn test_table_wraps_and_pads() {
        let renderer = ReceiptRenderer::new(20, Codepage::Wpc1254);
        let data = renderer.render(&[ReceiptElement::Table(TableElement {
            columns: vec![
                TableColumn::new(10, Align::Left),
                TableColumn {
                    width: 8,
                    align: Align::Right,
                    margin_left: 2,
                    margin_right: 0,
                },
            ],
            rows: vec![vec!["Kahve sade buyuk".to_string(), "45.00".to_string()]],
        })]);

        assert!(contains(&data, b"Kahve sade     45.00\n"));
        assert!(contains(&data, b"buyuk\n"));
    }

    #[test]
    fn test_table_too_wide_is_placeholder() {
        let renderer = ReceiptRenderer::new(20, Codepage::Wpc1254);
        let data = renderer.render(&[ReceiptElement::Table(TableElement {
            columns: vec![TableColumn::new(15, Align::Left), TableColumn::new(15, Align::Left)],
            rows: vec![vec!["a".to_string(), "b".to_string()]],
        })]);
        assert_eq!(count(&data, b"[Error: table]"), 1);
    }

    fn png_data_url(width: u32, height: u32) -> String {
        use base64::Engine;

        let img = image::RgbImage::from_pixel(width, height, image::Rgb([0, 0, 0]));
        let mut png = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        let encoded = base64::engine::general_purpose::STANDARD.encode(&png);
        format!("data:image/png;base64,{}", encoded)
    }

    #[test]
    fn test_image_element_emits_raster() {
        let data = encode(&[ReceiptElement::Image(ImageElement {
            image_data: png_data_url(100, 50),
            ..Default::default()
        })]);

        // 576 dots = 72 bytes, 100x50 → 576x288
        assert!(contains(&data, &[0x1D, 0x76, 0x30, 0x00, 72, 0, 0x20, 0x01]));
    }

    #[test]
    fn test_tall_image_is_placeholder() {
        let data = encode(&[
            ReceiptElement::Image(ImageElement {
                image_data: png_data_url(2, 250),
                ..Default::default()
            }),
            ReceiptElement::text("after"),
        ]);
        assert_eq!(count(&data, b"[Error: image]"), 1);
        assert!(!contains(&data, &[0x1D, 0x76, 0x30]));
        assert!(contains(&data, b"after\n"));
        assert!(data.ends_with(&[0x1D, 0x56, 0x00]));
    }

    #[test]
    fn test_test_page_renders_cleanly() {
        let printer = PrinterConfig::new("192.168.1.50", 9100).with_display_name("Kasa");
        let data = encode(&test_page(&printer));
        assert!(contains(&data, b"TEST PRINT"));
        assert!(contains(&data, b"Kasa"));
        assert!(!contains(&data, b"[Error"));
    }
}
