use crate::domain::model::{AnalysisResult, LabelValue};
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

fn trailing_punctuation() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[:.\s]+$").expect("valid regex"))
}

fn non_word() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\w\s-]").expect("valid regex"))
}

fn forbidden_filename_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"[\\/*?:"<>|]"#).expect("valid regex"))
}

/// Normalize a key so "Invoice Total:" and "invoice total" compare equal.
pub fn clean_key(key: &str) -> String {
    let lower = key.to_lowercase();
    let trimmed = trailing_punctuation().replace(&lower, "");
    non_word().replace_all(&trimmed, "").trim().to_string()
}

/// Strip characters that are unsafe in file names, then drop the last extension.
pub fn document_id(file_name: &str) -> String {
    let sanitized = forbidden_filename_chars().replace_all(file_name, "");
    match sanitized.rfind('.') {
        Some(idx) if idx > 0 => sanitized[..idx].to_string(),
        _ => sanitized.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuggestionSource {
    Existing,
    Document,
    Layout,
}

impl SuggestionSource {
    pub fn tag(&self) -> &'static str {
        match self {
            SuggestionSource::Existing => "Existing",
            SuggestionSource::Document => "Doc",
            SuggestionSource::Layout => "Layout",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Suggestion {
    pub text: String,
    pub source: SuggestionSource,
    pub confidence: Option<f64>,
}

impl Suggestion {
    pub fn describe(&self) -> String {
        match (self.source, self.confidence) {
            (SuggestionSource::Existing, _) => "(Using existing label)".to_string(),
            (source, Some(conf)) => format!("(Sugg [{}] Conf:{:.2})", source.tag(), conf),
            (source, None) => format!("(Sugg [{}] Conf: N/A)", source.tag()),
        }
    }
}

/// Cleaned key → suggestion, built once per loaded document.
#[derive(Debug, Clone, Default)]
pub struct SuggestionIndex {
    document: HashMap<String, Suggestion>,
    layout: HashMap<String, Suggestion>,
}

impl SuggestionIndex {
    pub fn build(layout: &AnalysisResult, general: &AnalysisResult) -> Self {
        let mut document = HashMap::new();
        // 一般文件模型的欄位優先，其次才是它的 key-value pairs
        for doc in &general.documents {
            for (name, field) in &doc.fields {
                let content = match field.content.as_deref() {
                    Some(c) if !c.is_empty() => c,
                    _ => continue,
                };
                let key = clean_key(name);
                if !key.is_empty() {
                    document.insert(
                        key,
                        Suggestion {
                            text: content.to_string(),
                            source: SuggestionSource::Document,
                            confidence: field.confidence,
                        },
                    );
                }
            }
        }
        for kvp in &general.key_value_pairs {
            if let (Some(key), Some(value)) = (&kvp.key, &kvp.value) {
                let key = clean_key(key);
                if !key.is_empty() && !document.contains_key(&key) {
                    document.insert(
                        key,
                        Suggestion {
                            text: value.clone(),
                            source: SuggestionSource::Document,
                            confidence: kvp.confidence,
                        },
                    );
                }
            }
        }

        let mut layout_map = HashMap::new();
        for kvp in &layout.key_value_pairs {
            if let (Some(key), Some(value)) = (&kvp.key, &kvp.value) {
                let key = clean_key(key);
                if !key.is_empty() {
                    layout_map.insert(
                        key,
                        Suggestion {
                            text: value.clone(),
                            source: SuggestionSource::Layout,
                            confidence: kvp.confidence,
                        },
                    );
                }
            }
        }

        Self {
            document,
            layout: layout_map,
        }
    }

    pub fn suggest(&self, field_key: &str) -> Option<&Suggestion> {
        let key = clean_key(field_key);
        self.document.get(&key).or_else(|| self.layout.get(&key))
    }
}

/// Location of the first Layout word whose text equals `text` exactly.
pub fn locate(layout: &AnalysisResult, text: &str) -> Option<LabelValue> {
    layout
        .words()
        .find(|(_, word)| word.content == text)
        .map(|(page, word)| LabelValue {
            text: text.to_string(),
            page: Some(page),
            polygon: Some(word.polygon.clone()),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{
        AnalyzedDocument, DocumentField, FieldValue, KeyValuePair, Page, Word,
    };
    use std::collections::BTreeMap;

    fn kvp(key: &str, value: &str, confidence: f64) -> KeyValuePair {
        KeyValuePair {
            key: Some(key.to_string()),
            value: Some(value.to_string()),
            confidence: Some(confidence),
        }
    }

    #[test]
    fn test_clean_key() {
        assert_eq!(clean_key("Invoice Total:"), "invoice total");
        assert_eq!(clean_key("P.O. Number."), "po number");
        assert_eq!(clean_key("Due-Date :  "), "due-date");
        assert_eq!(clean_key(""), "");
    }

    #[test]
    fn test_document_id() {
        assert_eq!(document_id("invoice1.pdf"), "invoice1");
        assert_eq!(document_id("scan.2024.png"), "scan.2024");
        assert_eq!(document_id("a:b?c.jpg"), "abc");
        assert_eq!(document_id("README"), "README");
        assert_eq!(document_id(".pdf"), ".pdf");
    }

    #[test]
    fn test_suggestions_prefer_document_fields() {
        let mut fields = BTreeMap::new();
        fields.insert(
            "Total".to_string(),
            DocumentField {
                value_type: "string".to_string(),
                content: Some("$42.00".to_string()),
                confidence: Some(0.9),
                value: FieldValue::Text("$42.00".to_string()),
            },
        );
        let general = AnalysisResult {
            documents: vec![AnalyzedDocument {
                fields,
                ..Default::default()
            }],
            key_value_pairs: vec![kvp("Total:", "$1.00", 0.5), kvp("Date", "2024-01-01", 0.8)],
            ..Default::default()
        };
        let layout = AnalysisResult {
            key_value_pairs: vec![kvp("Date", "ignored", 0.1), kvp("Vendor:", "Contoso", 0.7)],
            ..Default::default()
        };

        let index = SuggestionIndex::build(&layout, &general);
        assert_eq!(index.suggest("total").unwrap().text, "$42.00");
        assert_eq!(index.suggest("Date").unwrap().text, "2024-01-01");
        let vendor = index.suggest("vendor").unwrap();
        assert_eq!(vendor.source, SuggestionSource::Layout);
        assert_eq!(vendor.describe(), "(Sugg [Layout] Conf:0.70)");
        assert!(index.suggest("unknown").is_none());
    }

    #[test]
    fn test_locate_finds_first_exact_word() {
        let layout = AnalysisResult {
            pages: vec![
                Page {
                    page_number: 1,
                    words: vec![Word {
                        content: "Total".to_string(),
                        polygon: vec![0.0; 8],
                        confidence: Some(0.9),
                    }],
                },
                Page {
                    page_number: 2,
                    words: vec![Word {
                        content: "42.00".to_string(),
                        polygon: vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0],
                        confidence: Some(0.95),
                    }],
                },
            ],
            ..Default::default()
        };
        let found = locate(&layout, "42.00").unwrap();
        assert_eq!(found.page, Some(2));
        assert_eq!(found.polygon.unwrap()[0], 1.0);
        assert!(locate(&layout, "42").is_none());
    }
}
