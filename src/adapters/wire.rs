//! JSON shapes of the Document Intelligence REST API (`2023-07-31`) and their
//! conversion into domain types. Every collection defaults to empty so a sparse
//! response still maps to a complete `AnalysisResult`.

use crate::domain::model::{
    AnalysisResult, AnalyzedDocument, DocumentField, FieldValue, KeyValuePair, Page, Table,
    TableCell, Word,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeOperation {
    pub status: String,
    #[serde(default)]
    pub created_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: Option<ErrorDetail>,
    #[serde(default)]
    pub analyze_result: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub innererror: Option<Box<ErrorDetail>>,
}

impl ErrorDetail {
    /// Service message, with the innermost detail appended when present.
    pub fn full_message(&self) -> String {
        match &self.innererror {
            Some(inner) if !inner.message.is_empty() => {
                format!("{} {}", self.message, inner.full_message())
                    .trim()
                    .to_string()
            }
            _ => self.message.clone(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawResult {
    #[serde(default)]
    model_id: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    pages: Vec<RawPage>,
    #[serde(default)]
    tables: Vec<RawTable>,
    #[serde(default)]
    key_value_pairs: Vec<RawKeyValuePair>,
    #[serde(default)]
    documents: Vec<RawDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPage {
    #[serde(default)]
    page_number: u32,
    #[serde(default)]
    words: Vec<RawWord>,
}

#[derive(Debug, Deserialize)]
struct RawWord {
    #[serde(default)]
    content: String,
    #[serde(default)]
    polygon: Vec<f64>,
    #[serde(default)]
    confidence: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBoundingRegion {
    page_number: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTable {
    #[serde(default)]
    row_count: usize,
    #[serde(default)]
    column_count: usize,
    #[serde(default)]
    cells: Vec<RawCell>,
    #[serde(default)]
    bounding_regions: Vec<RawBoundingRegion>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCell {
    #[serde(default = "default_cell_kind")]
    kind: String,
    row_index: usize,
    column_index: usize,
    #[serde(default)]
    content: String,
}

fn default_cell_kind() -> String {
    "content".to_string()
}

#[derive(Debug, Deserialize)]
struct RawElement {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawKeyValuePair {
    #[serde(default)]
    key: Option<RawElement>,
    #[serde(default)]
    value: Option<RawElement>,
    #[serde(default)]
    confidence: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDocument {
    #[serde(default)]
    doc_type: String,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    bounding_regions: Vec<RawBoundingRegion>,
    #[serde(default)]
    fields: BTreeMap<String, Option<RawField>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawField {
    #[serde(rename = "type", default)]
    value_type: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    value_currency: Option<RawCurrency>,
    #[serde(default)]
    value_number: Option<f64>,
    #[serde(default)]
    value_integer: Option<i64>,
    #[serde(default)]
    value_string: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCurrency {
    #[serde(default)]
    amount: Option<f64>,
    #[serde(default)]
    currency_symbol: Option<String>,
}

impl From<RawField> for DocumentField {
    fn from(raw: RawField) -> Self {
        let value = match raw.value_type.as_str() {
            "currency" => {
                let currency = raw.value_currency;
                FieldValue::Currency {
                    amount: currency.as_ref().and_then(|c| c.amount),
                    symbol: currency.and_then(|c| c.currency_symbol),
                }
            }
            "number" => raw.value_number.map(FieldValue::Number).unwrap_or(FieldValue::Other),
            "integer" => raw
                .value_integer
                .map(FieldValue::Integer)
                .unwrap_or(FieldValue::Other),
            "string" => raw
                .value_string
                .clone()
                .map(FieldValue::Text)
                .unwrap_or(FieldValue::Other),
            _ => FieldValue::Other,
        };

        DocumentField {
            value_type: raw.value_type,
            content: raw.content,
            confidence: raw.confidence,
            value,
        }
    }
}

/// Convert the `analyzeResult` object into an `AnalysisResult`, keeping the raw JSON.
pub fn into_analysis_result(
    analyze_result: serde_json::Value,
    created_at: Option<DateTime<Utc>>,
) -> crate::utils::error::Result<AnalysisResult> {
    let raw: RawResult = if analyze_result.is_null() {
        RawResult::default()
    } else {
        serde_json::from_value(analyze_result.clone())?
    };

    let pages = raw
        .pages
        .into_iter()
        .map(|p| Page {
            page_number: p.page_number,
            words: p
                .words
                .into_iter()
                .map(|w| Word {
                    content: w.content,
                    polygon: w.polygon,
                    confidence: w.confidence,
                })
                .collect(),
        })
        .collect();

    let tables = raw
        .tables
        .into_iter()
        .map(|t| Table {
            row_count: t.row_count,
            column_count: t.column_count,
            cells: t
                .cells
                .into_iter()
                .map(|c| TableCell {
                    kind: c.kind,
                    row_index: c.row_index,
                    column_index: c.column_index,
                    content: c.content,
                })
                .collect(),
            pages: t.bounding_regions.iter().map(|r| r.page_number).collect(),
        })
        .collect();

    let key_value_pairs = raw
        .key_value_pairs
        .into_iter()
        .map(|kvp| KeyValuePair {
            key: kvp.key.and_then(|k| k.content),
            value: kvp.value.and_then(|v| v.content),
            confidence: kvp.confidence,
        })
        .collect();

    let documents = raw
        .documents
        .into_iter()
        .map(|d| AnalyzedDocument {
            doc_type: d.doc_type,
            confidence: d.confidence,
            pages: d.bounding_regions.iter().map(|r| r.page_number).collect(),
            fields: d
                .fields
                .into_iter()
                .filter_map(|(name, field)| field.map(|f| (name, DocumentField::from(f))))
                .collect(),
        })
        .collect();

    Ok(AnalysisResult {
        model_id: raw.model_id,
        content: raw.content,
        pages,
        tables,
        key_value_pairs,
        documents,
        created_at,
        raw: analyze_result,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_result_maps_to_empty_structures() {
        let result = into_analysis_result(json!({"modelId": "prebuilt-read"}), None).unwrap();
        assert_eq!(result.model_id, "prebuilt-read");
        assert!(result.content.is_empty());
        assert!(result.tables.is_empty());
        assert!(result.key_values().is_empty());
    }

    #[test]
    fn test_null_result_is_not_an_error() {
        let result = into_analysis_result(serde_json::Value::Null, None).unwrap();
        assert!(result.pages.is_empty());
    }

    #[test]
    fn test_invoice_fields_are_typed() {
        let value = json!({
            "modelId": "prebuilt-invoice",
            "content": "INVOICE Total $110.00",
            "documents": [{
                "docType": "invoice",
                "confidence": 1.0,
                "boundingRegions": [{"pageNumber": 1, "polygon": [0, 0, 1, 0, 1, 1, 0, 1]}],
                "fields": {
                    "InvoiceTotal": {
                        "type": "currency",
                        "valueCurrency": {"amount": 110.0, "currencySymbol": "$"},
                        "content": "$110.00",
                        "confidence": 0.97
                    },
                    "VendorName": {"type": "string", "valueString": "CONTOSO", "content": "CONTOSO LTD."},
                    "Missing": null
                }
            }]
        });
        let result = into_analysis_result(value, None).unwrap();
        let doc = &result.documents[0];
        assert_eq!(doc.pages, vec![1]);
        assert_eq!(doc.fields.len(), 2);
        assert_eq!(doc.fields["InvoiceTotal"].display_value(), "$110.00 (Conf: 0.97)");
        assert_eq!(doc.fields["VendorName"].display_value(), "CONTOSO LTD.");
    }

    #[test]
    fn test_error_detail_appends_inner_message() {
        let envelope: ErrorEnvelope = serde_json::from_value(json!({
            "error": {
                "code": "InvalidRequest",
                "message": "Invalid request.",
                "innererror": {"code": "InvalidContent", "message": "The file is corrupted or format is unsupported."}
            }
        }))
        .unwrap();
        assert_eq!(
            envelope.error.full_message(),
            "Invalid request. The file is corrupted or format is unsupported."
        );
    }
}
