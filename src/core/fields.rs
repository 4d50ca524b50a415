use crate::core::Storage;
use crate::domain::model::{default_field_format, FieldDefinition, FieldType};
use crate::utils::error::{DocIntelError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// User-defined extraction fields for the labeling workflow.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldRegistry {
    fields: Vec<FieldDefinition>,
}

#[derive(Serialize)]
struct FieldsFile<'a> {
    fields: &'a [FieldDefinition],
}

// 讀檔時型別先當字串，未知型別再退回 string
#[derive(Deserialize)]
struct RawFieldsFile {
    fields: Vec<RawFieldDefinition>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFieldDefinition {
    field_key: String,
    #[serde(default)]
    field_type: String,
    #[serde(default = "default_field_format")]
    field_format: String,
}

impl FieldRegistry {
    pub fn new(fields: Vec<FieldDefinition>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[FieldDefinition] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    fn position(&self, name: &str) -> Option<usize> {
        let lowered = name.to_lowercase();
        self.fields
            .iter()
            .position(|f| f.field_key.to_lowercase() == lowered)
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.fields.len() {
            return Err(DocIntelError::ValidationError {
                message: format!(
                    "No field at index {} ({} fields defined)",
                    index,
                    self.fields.len()
                ),
            });
        }
        Ok(())
    }

    fn check_name(&self, name: &str, editing: Option<usize>) -> Result<String> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(DocIntelError::ValidationError {
                message: "Field name cannot be empty".to_string(),
            });
        }
        match self.position(trimmed) {
            Some(existing) if Some(existing) != editing => Err(DocIntelError::ValidationError {
                message: format!("Field '{}' already exists", trimmed),
            }),
            _ => Ok(trimmed.to_string()),
        }
    }

    pub fn add(&mut self, name: &str, field_type: FieldType) -> Result<&FieldDefinition> {
        let name = self.check_name(name, None)?;
        tracing::debug!("Adding field '{}' ({})", name, field_type);
        self.fields.push(FieldDefinition::new(name, field_type));
        Ok(&self.fields[self.fields.len() - 1])
    }

    pub fn rename(&mut self, index: usize, name: &str) -> Result<()> {
        self.check_index(index)?;
        let name = self.check_name(name, Some(index))?;
        self.fields[index].field_key = name;
        Ok(())
    }

    pub fn set_type(&mut self, index: usize, field_type: FieldType) -> Result<()> {
        self.check_index(index)?;
        self.fields[index].field_type = field_type;
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Result<FieldDefinition> {
        self.check_index(index)?;
        Ok(self.fields.remove(index))
    }

    pub fn has_duplicates(&self) -> bool {
        let unique: HashSet<String> = self
            .fields
            .iter()
            .map(|f| f.field_key.to_lowercase())
            .collect();
        unique.len() != self.fields.len()
    }

    /// 載入欄位設定；檔案不存在或格式錯誤時回傳空集合
    pub async fn load<S: Storage>(storage: &S, path: &str) -> Self {
        let data = match storage.read_file(path).await {
            Ok(data) => data,
            Err(e) if e.is_not_found() => return Self::default(),
            Err(e) => {
                tracing::error!("❌ Failed to read field definitions '{}': {}", path, e);
                return Self::default();
            }
        };

        let raw: RawFieldsFile = match serde_json::from_slice(&data) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("⚠️ '{}' has an unexpected format: {}", path, e);
                return Self::default();
            }
        };

        let fields = raw
            .fields
            .into_iter()
            .map(|f| {
                let field_type = f.field_type.parse().unwrap_or_else(|_| {
                    tracing::warn!(
                        "⚠️ Unknown type '{}' for field '{}', using string",
                        f.field_type,
                        f.field_key
                    );
                    FieldType::String
                });
                FieldDefinition {
                    field_key: f.field_key,
                    field_type,
                    field_format: f.field_format,
                }
            })
            .collect();

        Self { fields }
    }

    pub async fn save<S: Storage>(&self, storage: &S, path: &str) -> Result<()> {
        if self.has_duplicates() {
            return Err(DocIntelError::ValidationError {
                message: "Duplicate field names".to_string(),
            });
        }
        let json = serde_json::to_vec_pretty(&FieldsFile {
            fields: &self.fields,
        })?;
        storage.write_file(path, &json).await?;
        tracing::info!("💾 Saved {} field definitions to {}", self.fields.len(), path);
        Ok(())
    }
}
