use crate::adapters::wire::{into_analysis_result, AnalyzeOperation, ErrorEnvelope};
use crate::core::{Analyzer, ConfigProvider};
use crate::domain::model::{AnalysisRequest, AnalysisResult};
use crate::utils::error::{DocIntelError, Result};
use crate::utils::validation::{validate_non_empty_string, validate_url};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response};
use std::time::Duration;
use url::Url;

const KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";
const OPERATION_LOCATION: &str = "Operation-Location";

/// Client for the prebuilt models of Azure Document Intelligence.
#[derive(Debug, Clone)]
pub struct AzureAnalyzer {
    client: Client,
    endpoint: Url,
    api_key: String,
    api_version: String,
    poll_interval: Duration,
    max_polls: u32,
}

impl AzureAnalyzer {
    pub fn new<C: ConfigProvider>(config: &C) -> Result<Self> {
        let endpoint = config
            .endpoint()
            .ok_or_else(|| DocIntelError::MissingConfigError {
                field: "AZURE_ENDPOINT".to_string(),
            })?;
        let api_key = config
            .api_key()
            .ok_or_else(|| DocIntelError::MissingConfigError {
                field: "AZURE_KEY".to_string(),
            })?;
        validate_url("AZURE_ENDPOINT", endpoint)?;
        validate_non_empty_string("AZURE_KEY", api_key)?;

        // 確保 endpoint 以 / 結尾，join 時才不會吃掉最後一段路徑
        let normalized = format!("{}/", endpoint.trim_end_matches('/'));
        let endpoint = Url::parse(&normalized).map_err(|e| DocIntelError::ConfigError {
            message: format!("Invalid endpoint '{}': {}", endpoint, e),
        })?;

        Ok(Self {
            client: Client::new(),
            endpoint,
            api_key: api_key.trim().to_string(),
            api_version: config.api_version().to_string(),
            poll_interval: config.poll_interval(),
            max_polls: config.max_polls(),
        })
    }

    fn analyze_url(&self, request: &AnalysisRequest) -> Result<Url> {
        let path = format!(
            "formrecognizer/documentModels/{}:analyze",
            request.model.model_id()
        );
        let mut url = self
            .endpoint
            .join(&path)
            .map_err(|e| DocIntelError::ConfigError {
                message: format!("Cannot build analyze URL: {}", e),
            })?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("api-version", &self.api_version);
            if let Some(locale) = &request.locale {
                query.append_pair("locale", locale);
            }
        }
        Ok(url)
    }

    async fn submit(&self, request: &AnalysisRequest) -> Result<String> {
        let url = self.analyze_url(request)?;
        tracing::debug!(
            "Submitting {} bytes ({}) to {}",
            request.document.len(),
            request.content_type,
            url
        );

        let response = self
            .client
            .post(url)
            .header(KEY_HEADER, &self.api_key)
            .header(CONTENT_TYPE, &request.content_type)
            .body(request.document.clone())
            .send()
            .await?;

        tracing::debug!("Analyze response status: {}", response.status());
        let response = error_for_status(response).await?;

        response
            .headers()
            .get(OPERATION_LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| DocIntelError::RemoteError {
                status: 202,
                code: "MissingOperationLocation".to_string(),
                message: "Service accepted the document but returned no Operation-Location"
                    .to_string(),
            })
    }

    async fn poll(&self, operation_url: &str) -> Result<AnalysisResult> {
        for attempt in 1..=self.max_polls {
            let response = self
                .client
                .get(operation_url)
                .header(KEY_HEADER, &self.api_key)
                .send()
                .await?;
            let response = error_for_status(response).await?;
            let operation: AnalyzeOperation = response.json().await?;

            tracing::debug!("Poll {} status: {}", attempt, operation.status);
            match operation.status.as_str() {
                "succeeded" => {
                    let raw = operation.analyze_result.unwrap_or(serde_json::Value::Null);
                    return into_analysis_result(raw, operation.created_date_time);
                }
                "failed" => {
                    let detail = operation.error;
                    return Err(DocIntelError::AnalysisFailed {
                        code: detail
                            .as_ref()
                            .map(|d| d.code.clone())
                            .unwrap_or_else(|| "Unknown".to_string()),
                        message: detail
                            .map(|d| d.full_message())
                            .unwrap_or_else(|| "The service reported a failed analysis".to_string()),
                    });
                }
                "notStarted" | "running" => {
                    if attempt < self.max_polls {
                        tokio::time::sleep(self.poll_interval).await;
                    }
                }
                other => {
                    return Err(DocIntelError::AnalysisFailed {
                        code: other.to_string(),
                        message: format!("Analysis ended with status '{}'", other),
                    });
                }
            }
        }

        Err(DocIntelError::RemoteError {
            status: 408,
            code: "PollLimitExceeded".to_string(),
            message: format!(
                "Analysis did not complete after {} status checks",
                self.max_polls
            ),
        })
    }
}

#[async_trait]
impl Analyzer for AzureAnalyzer {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResult> {
        tracing::info!("🔍 Analyzing document with {}", request.model.model_id());
        let operation_url = self.submit(request).await?;
        let result = self.poll(&operation_url).await?;
        tracing::info!(
            "✅ Analysis complete: {} pages, {} tables, {} key-value pairs",
            result.pages.len(),
            result.tables.len(),
            result.key_value_pairs.len()
        );
        Ok(result)
    }
}

/// 非 2xx 回應轉成 RemoteError，保留服務端原始訊息
async fn error_for_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let (code, message) = match serde_json::from_str::<ErrorEnvelope>(&body) {
        Ok(envelope) => (envelope.error.code.clone(), envelope.error.full_message()),
        Err(_) if body.trim().is_empty() => (
            status.as_str().to_string(),
            status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string(),
        ),
        Err(_) => (status.as_str().to_string(), body.trim().to_string()),
    };

    tracing::warn!("Service rejected request: {} ({})", message, status);
    Err(DocIntelError::RemoteError {
        status: status.as_u16(),
        code,
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::domain::model::{ModelKind, UploadedFile};
    use httpmock::prelude::*;
    use serde_json::json;

    fn config_for(endpoint: &str) -> AppConfig {
        AppConfig {
            endpoint: Some(endpoint.to_string()),
            api_key: Some("test-key".to_string()),
            poll_interval_ms: 0,
            max_polls: 3,
            ..Default::default()
        }
    }

    fn request(model: ModelKind) -> AnalysisRequest {
        AnalysisRequest::from_upload(&UploadedFile::new("doc.pdf", b"%PDF-1.4".to_vec()), model)
            .unwrap()
    }

    #[test]
    fn test_missing_key_is_configuration_error() {
        let config = AppConfig {
            endpoint: Some("https://example.com".to_string()),
            api_key: None,
            ..Default::default()
        };
        assert!(matches!(
            AzureAnalyzer::new(&config),
            Err(DocIntelError::MissingConfigError { .. })
        ));

        let blank = AppConfig {
            api_key: Some("  ".to_string()),
            ..config
        };
        assert!(AzureAnalyzer::new(&blank).is_err());
    }

    #[test]
    fn test_analyze_url_includes_version_and_read_locale() {
        let analyzer = AzureAnalyzer::new(&config_for("https://example.com/base")).unwrap();
        let read = request(ModelKind::Read).with_locale(Some("en"));
        let url = analyzer.analyze_url(&read).unwrap();
        assert_eq!(
            url.as_str(),
            "https://example.com/base/formrecognizer/documentModels/prebuilt-read:analyze?api-version=2023-07-31&locale=en"
        );
    }

    #[tokio::test]
    async fn test_analyze_submits_and_polls_until_succeeded() {
        let server = MockServer::start();
        let operation = server.url("/formrecognizer/documentModels/prebuilt-layout/analyzeResults/op-1");

        let submit_mock = server.mock(|when, then| {
            when.method(POST)
                .path("/formrecognizer/documentModels/prebuilt-layout:analyze")
                .query_param("api-version", "2023-07-31")
                .header("ocp-apim-subscription-key", "test-key")
                .header("content-type", "application/pdf");
            then.status(202).header("Operation-Location", operation.as_str());
        });

        let poll_mock = server.mock(|when, then| {
            when.method(GET)
                .path("/formrecognizer/documentModels/prebuilt-layout/analyzeResults/op-1")
                .header("ocp-apim-subscription-key", "test-key");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(json!({
                    "status": "succeeded",
                    "createdDateTime": "2024-05-01T10:00:00Z",
                    "analyzeResult": {
                        "modelId": "prebuilt-layout",
                        "content": "Hello world",
                        "pages": [{"pageNumber": 1, "words": [
                            {"content": "Hello", "polygon": [1, 1, 2, 1, 2, 2, 1, 2], "confidence": 0.99}
                        ]}]
                    }
                }));
        });

        let analyzer = AzureAnalyzer::new(&config_for(&server.base_url())).unwrap();
        let result = analyzer.analyze(&request(ModelKind::Layout)).await.unwrap();

        submit_mock.assert();
        poll_mock.assert();
        assert_eq!(result.content, "Hello world");
        assert_eq!(result.pages[0].words[0].content, "Hello");
        assert!(result.created_at.is_some());
    }

    #[tokio::test]
    async fn test_rejection_is_reported_verbatim_without_retry() {
        let server = MockServer::start();
        let submit_mock = server.mock(|when, then| {
            when.method(POST)
                .path("/formrecognizer/documentModels/prebuilt-invoice:analyze");
            then.status(400)
                .header("Content-Type", "application/json")
                .json_body(json!({
                    "error": {
                        "code": "InvalidRequest",
                        "message": "Invalid request.",
                        "innererror": {
                            "code": "InvalidContent",
                            "message": "The file is corrupted or format is unsupported."
                        }
                    }
                }));
        });

        let analyzer = AzureAnalyzer::new(&config_for(&server.base_url())).unwrap();
        let err = analyzer
            .analyze(&request(ModelKind::Invoice))
            .await
            .unwrap_err();

        submit_mock.assert_hits(1);
        match err {
            DocIntelError::RemoteError {
                status,
                code,
                message,
            } => {
                assert_eq!(status, 400);
                assert_eq!(code, "InvalidRequest");
                assert_eq!(
                    message,
                    "Invalid request. The file is corrupted or format is unsupported."
                );
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_auth_failure_is_remote_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST);
            then.status(401)
                .json_body(json!({"error": {"code": "401", "message": "Access denied due to invalid subscription key."}}));
        });

        let analyzer = AzureAnalyzer::new(&config_for(&server.base_url())).unwrap();
        let err = analyzer.analyze(&request(ModelKind::Read)).await.unwrap_err();
        assert!(matches!(err, DocIntelError::RemoteError { status: 401, .. }));
        assert!(err.recovery_suggestion().contains("AZURE_KEY"));
    }

    #[tokio::test]
    async fn test_failed_operation_surfaces_service_error() {
        let server = MockServer::start();
        let operation = server.url("/ops/failed");
        server.mock(|when, then| {
            when.method(POST);
            then.status(202).header("Operation-Location", operation.as_str());
        });
        server.mock(|when, then| {
            when.method(GET).path("/ops/failed");
            then.status(200).json_body(json!({
                "status": "failed",
                "error": {"code": "InternalServerError", "message": "An unexpected error occurred."}
            }));
        });

        let analyzer = AzureAnalyzer::new(&config_for(&server.base_url())).unwrap();
        let err = analyzer.analyze(&request(ModelKind::Receipt)).await.unwrap_err();
        assert!(matches!(
            err,
            DocIntelError::AnalysisFailed { ref message, .. } if message == "An unexpected error occurred."
        ));
    }

    #[tokio::test]
    async fn test_poll_limit_is_enforced() {
        let server = MockServer::start();
        let operation = server.url("/ops/slow");
        server.mock(|when, then| {
            when.method(POST);
            then.status(202).header("Operation-Location", operation.as_str());
        });
        let poll_mock = server.mock(|when, then| {
            when.method(GET).path("/ops/slow");
            then.status(200).json_body(json!({"status": "running"}));
        });

        let analyzer = AzureAnalyzer::new(&config_for(&server.base_url())).unwrap();
        let err = analyzer.analyze(&request(ModelKind::Read)).await.unwrap_err();

        poll_mock.assert_hits(3);
        assert!(matches!(err, DocIntelError::RemoteError { status: 408, .. }));
    }

    #[tokio::test]
    async fn test_canceled_operation_stops_polling() {
        let server = MockServer::start();
        let operation = server.url("/ops/canceled");
        server.mock(|when, then| {
            when.method(POST);
            then.status(202).header("Operation-Location", operation.as_str());
        });
        let poll_mock = server.mock(|when, then| {
            when.method(GET).path("/ops/canceled");
            then.status(200).json_body(json!({"status": "canceled"}));
        });

        let analyzer = AzureAnalyzer::new(&config_for(&server.base_url())).unwrap();
        let err = analyzer.analyze(&request(ModelKind::Read)).await.unwrap_err();

        poll_mock.assert_hits(1);
        assert!(matches!(
            err,
            DocIntelError::AnalysisFailed { ref code, .. } if code == "canceled"
        ));
    }

    #[tokio::test]
    async fn test_no_sleep_after_last_poll() {
        let server = MockServer::start();
        let operation = server.url("/ops/slow");
        server.mock(|when, then| {
            when.method(POST);
            then.status(202).header("Operation-Location", operation.as_str());
        });
        server.mock(|when, then| {
            when.method(GET).path("/ops/slow");
            then.status(200).json_body(json!({"status": "notStarted"}));
        });

        let config = AppConfig {
            poll_interval_ms: 400,
            max_polls: 1,
            ..config_for(&server.base_url())
        };
        let analyzer = AzureAnalyzer::new(&config).unwrap();
        let started = std::time::Instant::now();
        let err = analyzer.analyze(&request(ModelKind::Read)).await.unwrap_err();

        assert!(matches!(err, DocIntelError::RemoteError { status: 408, .. }));
        assert!(started.elapsed() < Duration::from_millis(400));
    }
}
