pub mod cli;

use crate::core::ConfigProvider;
use crate::utils::error::Result;
use crate::utils::validation::{
    validate_non_empty_string, validate_path, validate_positive_number, validate_required_field,
    validate_url, Validate,
};
use clap::Parser;
use std::fmt;
use std::time::Duration;

#[derive(Clone, Parser)]
#[command(name = "docintel")]
#[command(about = "Interactive front-end for Azure Document Intelligence analysis and labeling")]
pub struct AppConfig {
    #[arg(long, env = "AZURE_ENDPOINT")]
    pub endpoint: Option<String>,

    #[arg(long, env = "AZURE_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    #[arg(long, env = "DOCINTEL_API_VERSION", default_value = "2023-07-31")]
    pub api_version: String,

    #[arg(long, env = "DOCINTEL_DATA_DIR", default_value = ".")]
    pub data_dir: String,

    #[arg(long, default_value = "ocr")]
    pub ocr_dir: String,

    #[arg(long, default_value = "labels")]
    pub labels_dir: String,

    #[arg(long, default_value = "fields.json")]
    pub fields_file: String,

    #[arg(long, default_value = "exports")]
    pub export_dir: String,

    #[arg(long, default_value = "1000")]
    pub poll_interval_ms: u64,

    #[arg(long, default_value = "300")]
    pub max_polls: u32,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON")]
    pub log_json: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            api_version: "2023-07-31".to_string(),
            data_dir: ".".to_string(),
            ocr_dir: "ocr".to_string(),
            labels_dir: "labels".to_string(),
            fields_file: "fields.json".to_string(),
            export_dir: "exports".to_string(),
            poll_interval_ms: 1000,
            max_polls: 300,
            verbose: false,
            log_json: false,
        }
    }
}

// api_key 不可出現在日誌裡
impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("api_version", &self.api_version)
            .field("data_dir", &self.data_dir)
            .field("ocr_dir", &self.ocr_dir)
            .field("labels_dir", &self.labels_dir)
            .field("fields_file", &self.fields_file)
            .field("export_dir", &self.export_dir)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("max_polls", &self.max_polls)
            .field("verbose", &self.verbose)
            .finish()
    }
}

impl Validate for AppConfig {
    fn validate(&self) -> Result<()> {
        let endpoint = validate_required_field("AZURE_ENDPOINT", &self.endpoint)?;
        validate_url("AZURE_ENDPOINT", endpoint)?;
        let api_key = validate_required_field("AZURE_KEY", &self.api_key)?;
        validate_non_empty_string("AZURE_KEY", api_key)?;
        validate_non_empty_string("api_version", &self.api_version)?;

        validate_path("data_dir", &self.data_dir)?;
        validate_path("ocr_dir", &self.ocr_dir)?;
        validate_path("labels_dir", &self.labels_dir)?;
        validate_path("fields_file", &self.fields_file)?;
        validate_path("export_dir", &self.export_dir)?;

        validate_positive_number("max_polls", u64::from(self.max_polls), 1)?;
        Ok(())
    }
}

impl ConfigProvider for AppConfig {
    fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    fn api_version(&self) -> &str {
        &self.api_version
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    fn max_polls(&self) -> u32 {
        self.max_polls
    }

    fn ocr_dir(&self) -> &str {
        &self.ocr_dir
    }

    fn labels_dir(&self) -> &str {
        &self.labels_dir
    }

    fn fields_file(&self) -> &str {
        &self.fields_file
    }

    fn export_dir(&self) -> &str {
        &self.export_dir
    }
}
