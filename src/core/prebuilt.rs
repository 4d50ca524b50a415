use crate::core::render::render_pages_markdown;
use crate::core::{Analyzer, Storage};
use crate::domain::model::{AnalysisRequest, AnalysisResult, ModelKind, Table, UploadedFile};
use crate::utils::error::{DocIntelError, Result};

/// Run one prebuilt model over an uploaded file. Nothing is written to disk.
pub async fn analyze_upload<A: Analyzer + ?Sized>(
    analyzer: &A,
    upload: &UploadedFile,
    model: ModelKind,
    locale: Option<&str>,
) -> Result<AnalysisResult> {
    let request = AnalysisRequest::from_upload(upload, model)?.with_locale(locale);
    tracing::info!(
        "📄 Analyzing '{}' with '{}'",
        upload.name,
        model.display_name()
    );
    analyzer.analyze(&request).await
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Text,
    Markdown,
    Tables,
    Json,
}

impl std::str::FromStr for ExportKind {
    type Err = DocIntelError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "txt" => Ok(ExportKind::Text),
            "markdown" | "md" => Ok(ExportKind::Markdown),
            "tables" | "csv" => Ok(ExportKind::Tables),
            "json" | "raw" => Ok(ExportKind::Json),
            other => Err(DocIntelError::ValidationError {
                message: format!("Unknown export '{}'. Use text, markdown, tables or json", other),
            }),
        }
    }
}

pub fn table_to_csv(table: &Table) -> Result<Vec<u8>> {
    let grid = table.to_grid();
    let mut writer = csv::Writer::from_writer(Vec::new());
    match &grid.headers {
        Some(headers) => writer.write_record(headers)?,
        None => writer.write_record((0..table.column_count).map(|i| i.to_string()))?,
    }
    for row in &grid.rows {
        writer.write_record(row)?;
    }
    writer.into_inner().map_err(|e| e.into_error().into())
}

/// Explicit "download": writes the chosen part of the result under `export_dir`.
/// Returns the paths written.
pub async fn export_result<S: Storage>(
    storage: &S,
    export_dir: &str,
    stem: &str,
    result: &AnalysisResult,
    kind: ExportKind,
) -> Result<Vec<String>> {
    let mut written = Vec::new();
    match kind {
        ExportKind::Text => {
            if result.content.is_empty() {
                return Err(DocIntelError::ValidationError {
                    message: "No text was extracted from this document".to_string(),
                });
            }
            let path = format!("{}/{}_text.txt", export_dir, stem);
            storage.write_file(&path, result.content.as_bytes()).await?;
            written.push(path);
        }
        ExportKind::Markdown => {
            let markdown = render_pages_markdown(result);
            if markdown.is_empty() {
                return Err(DocIntelError::ValidationError {
                    message: "No page words were extracted from this document".to_string(),
                });
            }
            let path = format!("{}/{}_text.md", export_dir, stem);
            storage.write_file(&path, markdown.as_bytes()).await?;
            written.push(path);
        }
        ExportKind::Tables => {
            if result.tables.is_empty() {
                return Err(DocIntelError::ValidationError {
                    message: "No tables were detected in this document".to_string(),
                });
            }
            for (i, table) in result.tables.iter().enumerate() {
                let path = format!("{}/{}_table_{}.csv", export_dir, stem, i + 1);
                storage.write_file(&path, &table_to_csv(table)?).await?;
                written.push(path);
            }
        }
        ExportKind::Json => {
            let path = format!("{}/{}_raw.json", export_dir, stem);
            storage
                .write_file(&path, &serde_json::to_vec_pretty(&result.raw)?)
                .await?;
            written.push(path);
        }
    }

    for path in &written {
        tracing::info!("📁 Exported {}", path);
    }
    Ok(written)
}
