use crate::core::fields::FieldRegistry;
use crate::core::matching::{document_id, locate, Suggestion, SuggestionIndex, SuggestionSource};
use crate::core::{Analyzer, ConfigProvider, Storage};
use crate::domain::model::{
    AnalysisRequest, AnalysisResult, FieldDefinition, FieldType, LabelRecord, LabelValue,
    ModelKind, OcrReference, UploadedFile,
};
use crate::utils::error::{DocIntelError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

pub const LABELS_SCHEMA: &str =
    "https://schema.cognitiveservices.azure.com/formrecognizer/2021-07-30/fields.json";

#[derive(Debug, Serialize, Deserialize)]
struct LabelsFile {
    #[serde(rename = "$schema", default)]
    schema: String,
    #[serde(default)]
    fields: BTreeMap<String, FieldSchema>,
    #[serde(default)]
    labels: Vec<LabelEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FieldSchema {
    field_type: FieldType,
}

#[derive(Debug, Serialize, Deserialize)]
struct LabelEntry {
    label: String,
    value: Vec<LabelValue>,
}

/// Reads and writes `<id>.ocr.json` / `<id>.labels.json` pairs.
#[derive(Debug, Clone)]
pub struct LabelStore<S: Storage> {
    storage: S,
    ocr_dir: String,
    labels_dir: String,
}

impl<S: Storage> LabelStore<S> {
    pub fn new(storage: S, ocr_dir: impl Into<String>, labels_dir: impl Into<String>) -> Self {
        Self {
            storage,
            ocr_dir: ocr_dir.into(),
            labels_dir: labels_dir.into(),
        }
    }

    pub fn from_config<C: ConfigProvider>(storage: S, config: &C) -> Self {
        Self::new(storage, config.ocr_dir(), config.labels_dir())
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn ocr_path(&self, document_id: &str) -> String {
        format!("{}/{}.ocr.json", self.ocr_dir, document_id)
    }

    pub fn labels_path(&self, document_id: &str) -> String {
        format!("{}/{}.labels.json", self.labels_dir, document_id)
    }

    /// 覆寫既有紀錄，不做合併也不保證原子性
    pub async fn save(&self, record: &LabelRecord) -> Result<(String, String)> {
        let ocr_path = self.ocr_path(&record.document_id);
        let labels_path = self.labels_path(&record.document_id);

        let ocr_json = serde_json::to_vec_pretty(&record.ocr)?;
        self.storage.write_file(&ocr_path, &ocr_json).await?;
        tracing::debug!("OCR reference saved: {}", ocr_path);

        let file = LabelsFile {
            schema: LABELS_SCHEMA.to_string(),
            fields: record
                .fields
                .iter()
                .map(|f| {
                    (
                        f.field_key.clone(),
                        FieldSchema {
                            field_type: f.field_type,
                        },
                    )
                })
                .collect(),
            labels: record
                .fields
                .iter()
                .filter_map(|f| {
                    record.labels.get(&f.field_key).map(|value| LabelEntry {
                        label: f.field_key.clone(),
                        value: vec![value.clone()],
                    })
                })
                .collect(),
        };
        let labels_json = serde_json::to_vec_pretty(&file)?;
        self.storage.write_file(&labels_path, &labels_json).await?;
        tracing::info!("💾 Labels saved/overwritten: {}", labels_path);

        Ok((ocr_path, labels_path))
    }

    /// `None` when the document has never been labeled.
    pub async fn load(&self, document_id: &str) -> Result<Option<LabelRecord>> {
        let labels_data = match self.storage.read_file(&self.labels_path(document_id)).await {
            Ok(data) => data,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };
        let file: LabelsFile = serde_json::from_slice(&labels_data)?;

        let ocr = match self.storage.read_file(&self.ocr_path(document_id)).await {
            Ok(data) => serde_json::from_slice(&data)?,
            Err(e) if e.is_not_found() => OcrReference::default(),
            Err(e) => return Err(e),
        };

        let fields = file
            .fields
            .into_iter()
            .map(|(key, schema)| FieldDefinition::new(key, schema.field_type))
            .collect();
        let labels = file
            .labels
            .into_iter()
            .filter_map(|entry| {
                entry
                    .value
                    .into_iter()
                    .next()
                    .map(|value| (entry.label, value))
            })
            .collect();

        Ok(Some(LabelRecord {
            document_id: document_id.to_string(),
            fields,
            labels,
            ocr,
        }))
    }

    pub async fn list(&self) -> Result<Vec<String>> {
        let names = self.storage.list_files(&self.labels_dir).await?;
        Ok(names
            .into_iter()
            .filter_map(|n| n.strip_suffix(".labels.json").map(str::to_string))
            .collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    DocumentLoaded,
    Labeled,
    Saved,
}

#[derive(Debug, Clone)]
struct CachedAnalysis {
    layout: AnalysisResult,
    general: AnalysisResult,
}

#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub file_name: String,
    pub document_id: String,
    pub layout: AnalysisResult,
    pub general: AnalysisResult,
    pub values: BTreeMap<String, String>,
    pub suggestions: BTreeMap<String, Suggestion>,
    pub had_existing_labels: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SaveOutcome {
    pub ocr_path: String,
    pub labels_path: String,
    pub unlocated: Vec<String>,
}

/// Per-session labeling context: field set, current document, analysis cache.
pub struct LabelingSession<S: Storage> {
    store: LabelStore<S>,
    fields_file: String,
    fields: FieldRegistry,
    cache: HashMap<String, CachedAnalysis>,
    current: Option<LoadedDocument>,
    state: SessionState,
}

impl<S: Storage> LabelingSession<S> {
    pub fn new(store: LabelStore<S>, fields_file: impl Into<String>) -> Self {
        Self {
            store,
            fields_file: fields_file.into(),
            fields: FieldRegistry::default(),
            cache: HashMap::new(),
            current: None,
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn fields(&self) -> &FieldRegistry {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut FieldRegistry {
        &mut self.fields
    }

    pub fn current(&self) -> Option<&LoadedDocument> {
        self.current.as_ref()
    }

    pub fn store(&self) -> &LabelStore<S> {
        &self.store
    }

    pub async fn reload_fields(&mut self) {
        self.fields = FieldRegistry::load(self.store.storage(), &self.fields_file).await;
        tracing::debug!("Loaded {} field definitions", self.fields.len());
    }

    pub async fn save_fields(&self) -> Result<()> {
        self.fields
            .save(self.store.storage(), &self.fields_file)
            .await
    }

    /// Analyze with Layout and General Document (cached per file name), then
    /// prefill values from saved labels or suggestions.
    pub async fn load_document<A: Analyzer + ?Sized>(
        &mut self,
        analyzer: &A,
        upload: &UploadedFile,
    ) -> Result<&LoadedDocument> {
        let id = document_id(&upload.name);
        if id.is_empty() {
            return Err(DocIntelError::ValidationError {
                message: format!("Cannot derive a document name from '{}'", upload.name),
            });
        }
        // 先檢查檔案類型，不支援的格式不呼叫遠端服務
        let layout_request = AnalysisRequest::from_upload(upload, ModelKind::Layout)?;

        let cached = match self.cache.get(&upload.name) {
            Some(cached) => {
                tracing::debug!("Using cached analysis for {}", upload.name);
                cached.clone()
            }
            None => {
                tracing::info!("🔍 Analyzing {} (Layout & General Document)", upload.name);
                let layout = analyzer.analyze(&layout_request).await?;
                let general_request = AnalysisRequest {
                    model: ModelKind::GeneralDocument,
                    ..layout_request
                };
                let general = analyzer.analyze(&general_request).await?;
                let cached = CachedAnalysis { layout, general };
                self.cache.insert(upload.name.clone(), cached.clone());
                cached
            }
        };

        let existing = match self.store.load(&id).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("⚠️ Could not load existing labels for {}: {}", id, e);
                None
            }
        };
        if existing.is_some() {
            tracing::info!("📁 Loaded labels: {}", self.store.labels_path(&id));
        }

        let index = SuggestionIndex::build(&cached.layout, &cached.general);
        let mut values = BTreeMap::new();
        let mut suggestions = BTreeMap::new();
        for field in self.fields.fields() {
            let key = &field.field_key;
            let saved = existing
                .as_ref()
                .and_then(|r| r.labels.get(key))
                .filter(|v| !v.text.is_empty());

            let suggestion = match saved {
                Some(value) => Some(Suggestion {
                    text: value.text.clone(),
                    source: SuggestionSource::Existing,
                    confidence: None,
                }),
                None => index.suggest(key).cloned(),
            };

            values.insert(
                key.clone(),
                suggestion.as_ref().map(|s| s.text.clone()).unwrap_or_default(),
            );
            if let Some(s) = suggestion {
                suggestions.insert(key.clone(), s);
            }
        }

        self.current = Some(LoadedDocument {
            file_name: upload.name.clone(),
            document_id: id,
            layout: cached.layout,
            general: cached.general,
            values,
            suggestions,
            had_existing_labels: existing.is_some(),
        });
        self.state = SessionState::DocumentLoaded;

        self.current.as_ref().ok_or_else(|| DocIntelError::ValidationError {
            message: "No document loaded".to_string(),
        })
    }

    fn current_mut(&mut self) -> Result<&mut LoadedDocument> {
        self.current
            .as_mut()
            .ok_or_else(|| DocIntelError::ValidationError {
                message: "Open a document first".to_string(),
            })
    }

    /// 改名時一併搬移已輸入的值與建議
    pub fn rename_field(&mut self, index: usize, name: &str) -> Result<String> {
        let old_key = self
            .fields
            .fields()
            .get(index)
            .map(|f| f.field_key.clone())
            .unwrap_or_default();
        self.fields.rename(index, name)?;
        let new_key = self.fields.fields()[index].field_key.clone();

        if let Some(doc) = self.current.as_mut() {
            if let Some(value) = doc.values.remove(&old_key) {
                doc.values.insert(new_key.clone(), value);
            }
            if let Some(suggestion) = doc.suggestions.remove(&old_key) {
                doc.suggestions.insert(new_key.clone(), suggestion);
            }
        }
        Ok(new_key)
    }

    /// Any text is accepted, including empty.
    pub fn set_value(&mut self, field_key: &str, text: &str) -> Result<()> {
        let key = self
            .fields
            .fields()
            .iter()
            .find(|f| f.field_key.eq_ignore_ascii_case(field_key))
            .map(|f| f.field_key.clone())
            .ok_or_else(|| DocIntelError::ValidationError {
                message: format!("Unknown field '{}'", field_key),
            })?;

        let doc = self.current_mut()?;
        doc.values.insert(key, text.to_string());
        self.state = SessionState::Labeled;
        Ok(())
    }

    /// Build the record for the current document from the entered values.
    pub fn build_record(&self) -> Result<(LabelRecord, Vec<String>)> {
        let doc = self
            .current
            .as_ref()
            .ok_or_else(|| DocIntelError::ValidationError {
                message: "Open a document first".to_string(),
            })?;

        let mut labels = BTreeMap::new();
        let mut unlocated = Vec::new();
        for field in self.fields.fields() {
            let text = doc
                .values
                .get(&field.field_key)
                .map(|v| v.trim())
                .unwrap_or("");
            if text.is_empty() {
                continue;
            }
            let value = match locate(&doc.layout, text) {
                Some(value) => value,
                None => {
                    tracing::warn!(
                        "⚠️ '{}': no exact match for '{}' in Layout words, saving text only",
                        field.field_key,
                        text
                    );
                    unlocated.push(field.field_key.clone());
                    LabelValue {
                        text: text.to_string(),
                        ..Default::default()
                    }
                }
            };
            labels.insert(field.field_key.clone(), value);
        }

        let record = LabelRecord {
            document_id: doc.document_id.clone(),
            fields: self.fields.fields().to_vec(),
            labels,
            ocr: OcrReference::from_result(&doc.layout),
        };
        Ok((record, unlocated))
    }

    pub async fn save(&mut self) -> Result<SaveOutcome> {
        let (record, unlocated) = self.build_record()?;
        let (ocr_path, labels_path) = self.store.save(&record).await?;
        self.state = SessionState::Saved;
        Ok(SaveOutcome {
            ocr_path,
            labels_path,
            unlocated,
        })
    }
}
