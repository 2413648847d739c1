//! Receipt elements
//!
//! The abstract content of a receipt as submitted by the kiosk UI. Elements
//! are tagged by a `type` field; a tag this crate does not know is kept as
//! [`ReceiptElement::Unsupported`] so the receipt still prints with a
//! placeholder in its place.

use kiosk_printer::{Align, DitherAlgorithm, QrErrorLevel};
use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum ReceiptElement {
    Text(TextElement),
    Header(HeaderElement),
    Image(ImageElement),
    Barcode(BarcodeElement),
    QrCode(QrCodeElement),
    Table(TableElement),
    Rule(RuleElement),
    Blank(BlankElement),
    Cut,
    Unsupported { kind: String },
}

impl ReceiptElement {
    /// The `type` tag this element travels under
    pub fn kind(&self) -> &str {
        match self {
            ReceiptElement::Text(_) => "text",
            ReceiptElement::Header(_) => "header",
            ReceiptElement::Image(_) => "image",
            ReceiptElement::Barcode(_) => "barcode",
            ReceiptElement::QrCode(_) => "qrcode",
            ReceiptElement::Table(_) => "table",
            ReceiptElement::Rule(_) => "line",
            ReceiptElement::Blank(_) => "newline",
            ReceiptElement::Cut => "cut",
            ReceiptElement::Unsupported { kind } => kind,
        }
    }

    pub fn text(content: impl Into<String>) -> Self {
        ReceiptElement::Text(TextElement {
            content: content.into(),
            ..Default::default()
        })
    }

    pub fn header(content: impl Into<String>) -> Self {
        ReceiptElement::Header(HeaderElement {
            content: content.into(),
            ..Default::default()
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TextElement {
    pub content: String,
    pub align: Align,
    pub bold: bool,
    pub underline: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderElement {
    pub content: String,
    pub align: Align,
}

impl Default for HeaderElement {
    fn default() -> Self {
        Self {
            content: String::new(),
            align: Align::Center,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageElement {
    /// Base64 image, optionally with a `data:image/...;base64,` prefix
    #[serde(alias = "imageData")]
    pub image_data: String,
    pub align: Align,
    pub algorithm: DitherAlgorithm,
    pub threshold: u8,
}

impl Default for ImageElement {
    fn default() -> Self {
        Self {
            image_data: String::new(),
            align: Align::Center,
            algorithm: DitherAlgorithm::Threshold,
            threshold: 128,
        }
    }
}

/// Symbology is kept as text so an unknown one fails at render time
/// (placeholder) rather than rejecting the whole receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BarcodeElement {
    pub data: String,
    pub symbology: String,
    pub height: u32,
    pub width: u32,
    #[serde(alias = "showText")]
    pub show_text: bool,
    pub align: Align,
}

impl Default for BarcodeElement {
    fn default() -> Self {
        Self {
            data: String::new(),
            symbology: "code128".to_string(),
            height: 60,
            width: 2,
            show_text: true,
            align: Align::Center,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QrCodeElement {
    pub data: String,
    pub model: u8,
    pub size: u8,
    #[serde(alias = "errorLevel", alias = "errorlevel")]
    pub error_level: QrErrorLevel,
    pub align: Align,
}

impl Default for QrCodeElement {
    fn default() -> Self {
        Self {
            data: String::new(),
            model: 2,
            size: 6,
            error_level: QrErrorLevel::M,
            align: Align::Center,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TableColumn {
    pub width: usize,
    pub align: Align,
    #[serde(alias = "marginLeft")]
    pub margin_left: usize,
    #[serde(alias = "marginRight")]
    pub margin_right: usize,
}

impl TableColumn {
    pub fn new(width: usize, align: Align) -> Self {
        Self {
            width,
            align,
            ..Default::default()
        }
    }

    /// Columns this cell occupies including margins
    pub fn span(&self) -> usize {
        self.margin_left + self.width + self.margin_right
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TableElement {
    pub columns: Vec<TableColumn>,
    #[serde(deserialize_with = "deserialize_rows")]
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleElement {
    #[serde(rename = "char")]
    pub ch: char,
    pub length: usize,
    pub align: Align,
}

impl Default for RuleElement {
    fn default() -> Self {
        Self {
            ch: '=',
            length: 32,
            align: Align::Center,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlankElement {
    pub count: usize,
}

impl Default for BlankElement {
    fn default() -> Self {
        Self { count: 1 }
    }
}

/// Table cells arrive as strings, numbers or null
fn deserialize_rows<'de, D>(deserializer: D) -> Result<Vec<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let rows: Vec<Vec<Value>> = Vec::deserialize(deserializer)?;
    Ok(rows
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|cell| match cell {
                    Value::String(s) => s,
                    Value::Null => String::new(),
                    other => other.to_string(),
                })
                .collect()
        })
        .collect())
}

const KNOWN_KINDS: &[&str] = &[
    "text", "header", "image", "barcode", "qrcode", "table", "line", "rule", "newline", "blank",
    "cut",
];

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum KnownElement {
    Text(TextElement),
    Header(HeaderElement),
    Image(ImageElement),
    Barcode(BarcodeElement),
    #[serde(rename = "qrcode")]
    QrCode(QrCodeElement),
    Table(TableElement),
    #[serde(rename = "line", alias = "rule")]
    Rule(RuleElement),
    #[serde(rename = "newline", alias = "blank")]
    Blank(BlankElement),
    Cut,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum KnownElementRef<'a> {
    Text(&'a TextElement),
    Header(&'a HeaderElement),
    Image(&'a ImageElement),
    Barcode(&'a BarcodeElement),
    #[serde(rename = "qrcode")]
    QrCode(&'a QrCodeElement),
    Table(&'a TableElement),
    #[serde(rename = "line")]
    Rule(&'a RuleElement),
    #[serde(rename = "newline")]
    Blank(&'a BlankElement),
    Cut,
}

impl From<KnownElement> for ReceiptElement {
    fn from(known: KnownElement) -> Self {
        match known {
            KnownElement::Text(e) => ReceiptElement::Text(e),
            KnownElement::Header(e) => ReceiptElement::Header(e),
            KnownElement::Image(e) => ReceiptElement::Image(e),
            KnownElement::Barcode(e) => ReceiptElement::Barcode(e),
            KnownElement::QrCode(e) => ReceiptElement::QrCode(e),
            KnownElement::Table(e) => ReceiptElement::Table(e),
            KnownElement::Rule(e) => ReceiptElement::Rule(e),
            KnownElement::Blank(e) => ReceiptElement::Blank(e),
            KnownElement::Cut => ReceiptElement::Cut,
        }
    }
}

impl<'de> Deserialize<'de> for ReceiptElement {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| de::Error::missing_field("type"))?
            .to_string();

        if !KNOWN_KINDS.contains(&kind.as_str()) {
            return Ok(ReceiptElement::Unsupported { kind });
        }

        KnownElement::deserialize(value)
            .map(ReceiptElement::from)
            .map_err(|e| de::Error::custom(format!("invalid {} element: {}", kind, e)))
    }
}

impl Serialize for ReceiptElement {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let known = match self {
            ReceiptElement::Text(e) => KnownElementRef::Text(e),
            ReceiptElement::Header(e) => KnownElementRef::Header(e),
            ReceiptElement::Image(e) => KnownElementRef::Image(e),
            ReceiptElement::Barcode(e) => KnownElementRef::Barcode(e),
            ReceiptElement::QrCode(e) => KnownElementRef::QrCode(e),
            ReceiptElement::Table(e) => KnownElementRef::Table(e),
            ReceiptElement::Rule(e) => KnownElementRef::Rule(e),
            ReceiptElement::Blank(e) => KnownElementRef::Blank(e),
            ReceiptElement::Cut => KnownElementRef::Cut,
            ReceiptElement::Unsupported { kind } => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("type", kind)?;
                return map.end();
            }
        };
        known.serialize(serializer)
    }
}
