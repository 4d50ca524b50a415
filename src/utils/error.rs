use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocIntelError {
    #[error("Request to analysis service failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Service error: {message} (Status: {status})")]
    RemoteError {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Analysis failed: {message} ({code})")]
    AnalysisFailed { code: String, message: String },

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Unsupported file '{file}': {reason}")]
    UnsupportedFileType { file: String, reason: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Remote,
    LocalIo,
    Input,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl DocIntelError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigError { .. }
            | Self::MissingConfigError { .. }
            | Self::InvalidConfigValueError { .. } => ErrorCategory::Configuration,
            Self::HttpError(_) | Self::RemoteError { .. } | Self::AnalysisFailed { .. } => {
                ErrorCategory::Remote
            }
            Self::IoError(_) | Self::CsvError(_) | Self::SerializationError(_) => {
                ErrorCategory::LocalIo
            }
            Self::UnsupportedFileType { .. } | Self::ValidationError { .. } => {
                ErrorCategory::Input
            }
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Input => ErrorSeverity::Low,
            ErrorCategory::Remote => ErrorSeverity::Medium,
            ErrorCategory::LocalIo => ErrorSeverity::High,
            ErrorCategory::Configuration => ErrorSeverity::Critical,
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::RemoteError {
                status, message, ..
            } => format!("Azure Error: {} (Status: {})", message, status),
            Self::AnalysisFailed { message, .. } => format!("Analysis failed: {}", message),
            Self::HttpError(e) => format!("Could not reach the analysis service: {}", e),
            Self::MissingConfigError { field } => format!(
                "Azure Document Intelligence credentials not found ({} is not set)",
                field
            ),
            other => other.to_string(),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            Self::MissingConfigError { .. } => {
                "Set AZURE_ENDPOINT and AZURE_KEY in the environment or in a .env file"
            }
            Self::ConfigError { .. } | Self::InvalidConfigValueError { .. } => {
                "Check the endpoint URL and API key of your Document Intelligence resource"
            }
            Self::HttpError(_) => "Check network connectivity and the endpoint URL, then retry",
            Self::RemoteError { status: 401, .. } | Self::RemoteError { status: 403, .. } => {
                "The API key was rejected; verify AZURE_KEY"
            }
            Self::RemoteError { .. } | Self::AnalysisFailed { .. } => {
                "Make sure the document is a readable PDF or image and retry"
            }
            Self::UnsupportedFileType { .. } => "Upload a pdf, jpg, jpeg, png, bmp or tiff file",
            Self::ValidationError { .. } => "Correct the input and try again",
            Self::IoError(_) | Self::CsvError(_) | Self::SerializationError(_) => {
                "Check that the data directory exists and is writable"
            }
        }
    }

    pub(crate) fn is_not_found(&self) -> bool {
        matches!(self, Self::IoError(e) if e.kind() == std::io::ErrorKind::NotFound)
    }
}

pub type Result<T> = std::result::Result<T, DocIntelError>;
