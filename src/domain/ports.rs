use crate::domain::model::{AnalysisRequest, AnalysisResult};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::time::Duration;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
    /// File names directly under `dir`, sorted. A missing directory lists as empty.
    fn list_files(&self, dir: &str)
        -> impl std::future::Future<Output = Result<Vec<String>>> + Send;
}

pub trait ConfigProvider: Send + Sync {
    fn endpoint(&self) -> Option<&str>;
    fn api_key(&self) -> Option<&str>;
    fn api_version(&self) -> &str;
    fn poll_interval(&self) -> Duration;
    fn max_polls(&self) -> u32;
    fn ocr_dir(&self) -> &str;
    fn labels_dir(&self) -> &str;
    fn fields_file(&self) -> &str;
    fn export_dir(&self) -> &str;
}

/// The one outbound call: analyze a document with a prebuilt model.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResult>;
}
