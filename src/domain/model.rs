use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::utils::error::{DocIntelError, Result};
use crate::utils::validation::validate_file_extension;

pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "jpg", "jpeg", "png", "bmp", "tif", "tiff"];

/// Locales offered for the Read model.
pub const READ_LOCALES: &[&str] = &["en", "ar", "fr", "es", "zh-Hans"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    Read,
    Layout,
    GeneralDocument,
    Invoice,
    Receipt,
    IdDocument,
    BusinessCard,
}

impl ModelKind {
    pub const ALL: [ModelKind; 7] = [
        ModelKind::Read,
        ModelKind::Layout,
        ModelKind::GeneralDocument,
        ModelKind::Invoice,
        ModelKind::Receipt,
        ModelKind::IdDocument,
        ModelKind::BusinessCard,
    ];

    pub fn model_id(&self) -> &'static str {
        match self {
            ModelKind::Read => "prebuilt-read",
            ModelKind::Layout => "prebuilt-layout",
            ModelKind::GeneralDocument => "prebuilt-document",
            ModelKind::Invoice => "prebuilt-invoice",
            ModelKind::Receipt => "prebuilt-receipt",
            ModelKind::IdDocument => "prebuilt-idDocument",
            ModelKind::BusinessCard => "prebuilt-businessCard",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ModelKind::Read => "Read",
            ModelKind::Layout => "Layout",
            ModelKind::GeneralDocument => "General Docs",
            ModelKind::Invoice => "Invoice",
            ModelKind::Receipt => "Receipt",
            ModelKind::IdDocument => "ID Document",
            ModelKind::BusinessCard => "Business Card",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for ModelKind {
    type Err = DocIntelError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_'))
            .collect::<String>()
            .to_ascii_lowercase();
        let normalized = normalized.strip_prefix("prebuilt").unwrap_or(&normalized);

        match normalized {
            "read" | "ocr" | "ocrread" => Ok(ModelKind::Read),
            "layout" => Ok(ModelKind::Layout),
            "document" | "general" | "generaldocument" | "generaldocs" => {
                Ok(ModelKind::GeneralDocument)
            }
            "invoice" => Ok(ModelKind::Invoice),
            "receipt" => Ok(ModelKind::Receipt),
            "id" | "iddocument" => Ok(ModelKind::IdDocument),
            "businesscard" | "card" => Ok(ModelKind::BusinessCard),
            _ => Err(DocIntelError::ValidationError {
                message: format!(
                    "Unknown model kind '{}'. Choose one of: read, layout, document, invoice, receipt, id, businesscard",
                    s
                ),
            }),
        }
    }
}

/// A file handed to the session, either from disk or from a test.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    pub fn from_path(path: &str) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let name = std::path::Path::new(path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(path)
            .to_string();
        Ok(Self { name, bytes })
    }

    /// 只看副檔名，不檢查檔案內容
    pub fn content_type(&self) -> Result<String> {
        let extension = validate_file_extension(&self.name, SUPPORTED_EXTENSIONS)?;
        let mime = mime_guess::from_ext(&extension)
            .first()
            .map(|m| m.essence_str().to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());
        Ok(mime)
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub document: Vec<u8>,
    pub content_type: String,
    pub model: ModelKind,
    pub locale: Option<String>,
}

impl AnalysisRequest {
    pub fn from_upload(upload: &UploadedFile, model: ModelKind) -> Result<Self> {
        let content_type = upload.content_type()?;
        Ok(Self {
            document: upload.bytes.clone(),
            content_type,
            model,
            locale: None,
        })
    }

    /// Locale only applies to the Read model; it is dropped for everything else.
    pub fn with_locale(mut self, locale: Option<&str>) -> Self {
        self.locale = match (self.model, locale) {
            (ModelKind::Read, Some(l)) if !l.is_empty() && l != "auto" => Some(l.to_string()),
            _ => None,
        };
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub content: String,
    pub polygon: Vec<f64>,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub page_number: u32,
    pub words: Vec<Word>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableCell {
    pub kind: String,
    pub row_index: usize,
    pub column_index: usize,
    pub content: String,
}

impl TableCell {
    pub fn is_header(&self) -> bool {
        matches!(self.kind.as_str(), "columnHeader" | "header")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub row_count: usize,
    pub column_count: usize,
    pub cells: Vec<TableCell>,
    pub pages: Vec<u32>,
}

/// A table laid out as rows, with header rows pulled out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableGrid {
    pub headers: Option<Vec<String>>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn to_grid(&self) -> TableGrid {
        let mut headers = vec![String::new(); self.column_count];
        let mut grid = vec![vec![String::new(); self.column_count]; self.row_count];
        let mut header_rows = std::collections::BTreeSet::new();
        let mut has_headers = false;

        for cell in &self.cells {
            if cell.row_index >= self.row_count || cell.column_index >= self.column_count {
                continue;
            }
            if cell.is_header() {
                headers[cell.column_index] = cell.content.clone();
                header_rows.insert(cell.row_index);
                has_headers = true;
            }
            grid[cell.row_index][cell.column_index] = cell.content.clone();
        }

        let rows = grid
            .into_iter()
            .enumerate()
            .filter(|(idx, _)| !header_rows.contains(idx))
            .map(|(_, row)| row)
            .collect();

        let headers = if has_headers && headers.iter().any(|h| !h.is_empty()) {
            Some(headers)
        } else {
            None
        };

        TableGrid { headers, rows }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyValuePair {
    pub key: Option<String>,
    pub value: Option<String>,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Currency {
        amount: Option<f64>,
        symbol: Option<String>,
    },
    Number(f64),
    Integer(i64),
    Text(String),
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentField {
    pub value_type: String,
    pub content: Option<String>,
    pub confidence: Option<f64>,
    pub value: FieldValue,
}

impl DocumentField {
    pub fn display_value(&self) -> String {
        let value = match &self.value {
            FieldValue::Currency { amount, symbol } => match amount {
                Some(amt) => format!("{}{:.2}", symbol.as_deref().unwrap_or(""), amt),
                None => "N/A".to_string(),
            },
            FieldValue::Number(n) => n.to_string(),
            FieldValue::Integer(i) => i.to_string(),
            _ => match self.content.as_deref() {
                Some(c) if !c.is_empty() => c.to_string(),
                _ => "N/A".to_string(),
            },
        };

        match self.confidence {
            Some(conf) if conf > 0.0 => format!("{} (Conf: {:.2})", value, conf),
            _ => value,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyzedDocument {
    pub doc_type: String,
    pub confidence: f64,
    pub pages: Vec<u32>,
    pub fields: BTreeMap<String, DocumentField>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub model_id: String,
    pub content: String,
    pub pages: Vec<Page>,
    pub tables: Vec<Table>,
    pub key_value_pairs: Vec<KeyValuePair>,
    pub documents: Vec<AnalyzedDocument>,
    pub created_at: Option<DateTime<Utc>>,
    pub raw: serde_json::Value,
}

impl AnalysisResult {
    /// Flattened view: document fields first, then key-value pairs.
    pub fn key_values(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        for doc in &self.documents {
            for (name, field) in &doc.fields {
                map.entry(name.clone())
                    .or_insert_with(|| field.display_value());
            }
        }
        for (i, kvp) in self.key_value_pairs.iter().enumerate() {
            let key = kvp.key.clone().unwrap_or_else(|| format!("NK_{}", i));
            let value = kvp.value.clone().unwrap_or_else(|| "N/A".to_string());
            map.entry(key).or_insert(value);
        }
        map
    }

    /// Every word on every page with its page number, in reading order.
    pub fn words(&self) -> impl Iterator<Item = (u32, &Word)> {
        self.pages
            .iter()
            .enumerate()
            .flat_map(|(idx, page)| {
                let number = if page.page_number > 0 {
                    page.page_number
                } else {
                    idx as u32 + 1
                };
                page.words.iter().map(move |w| (number, w))
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldType {
    String,
    Number,
    Integer,
    Date,
    Time,
    PhoneNumber,
    Currency,
    Address,
    Boolean,
    SelectionMark,
    CountryRegion,
    Signature,
    Array,
    Object,
    Voucher,
}

impl FieldType {
    pub const ALL: [FieldType; 15] = [
        FieldType::String,
        FieldType::Number,
        FieldType::Integer,
        FieldType::Date,
        FieldType::Time,
        FieldType::PhoneNumber,
        FieldType::Currency,
        FieldType::Address,
        FieldType::Boolean,
        FieldType::SelectionMark,
        FieldType::CountryRegion,
        FieldType::Signature,
        FieldType::Array,
        FieldType::Object,
        FieldType::Voucher,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Integer => "integer",
            FieldType::Date => "date",
            FieldType::Time => "time",
            FieldType::PhoneNumber => "phoneNumber",
            FieldType::Currency => "currency",
            FieldType::Address => "address",
            FieldType::Boolean => "boolean",
            FieldType::SelectionMark => "selectionMark",
            FieldType::CountryRegion => "countryRegion",
            FieldType::Signature => "signature",
            FieldType::Array => "array",
            FieldType::Object => "object",
            FieldType::Voucher => "voucher",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = DocIntelError;

    fn from_str(s: &str) -> Result<Self> {
        FieldType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DocIntelError::ValidationError {
                message: format!("Unknown field type '{}'", s),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDefinition {
    pub field_key: String,
    pub field_type: FieldType,
    #[serde(default = "default_field_format")]
    pub field_format: String,
}

pub fn default_field_format() -> String {
    "not-specified".to_string()
}

impl FieldDefinition {
    pub fn new(field_key: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            field_key: field_key.into(),
            field_type,
            field_format: default_field_format(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabelValue {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polygon: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcrWord {
    pub text: String,
    pub polygon: Vec<f64>,
    pub confidence: Option<f64>,
    pub page: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcrReference {
    pub words: Vec<OcrWord>,
}

impl OcrReference {
    pub fn from_result(result: &AnalysisResult) -> Self {
        let words = result
            .words()
            .map(|(page, w)| OcrWord {
                text: w.content.clone(),
                polygon: w.polygon.clone(),
                confidence: w.confidence,
                page,
            })
            .collect();
        Self { words }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelRecord {
    pub document_id: String,
    pub fields: Vec<FieldDefinition>,
    pub labels: BTreeMap<String, LabelValue>,
    pub ocr: OcrReference,
}

impl LabelRecord {
    /// Text per defined field; fields without a label map to "".
    pub fn values(&self) -> BTreeMap<String, String> {
        self.fields
            .iter()
            .map(|f| {
                let text = self
                    .labels
                    .get(&f.field_key)
                    .map(|v| v.text.clone())
                    .unwrap_or_default();
                (f.field_key.clone(), text)
            })
            .collect()
    }
}
