//! Client for the local inference runtime
//!
//! The runtime exposes two control surfaces and this client wraps both: an
//! OpenAI-compatible HTTP API for health, model control, and chat, and an
//! operator CLI for service control and catalog listings. HTTP calls retry
//! transient network failures per the configured policy; CLI invocations and
//! application-level HTTP failures surface immediately.
//!
//! The client holds no mutable state beyond the connection pool, so one
//! instance is safe to share across concurrent callers.

use crate::catalog::{self, LoadedModelRef, ModelRecord};
use crate::retry::retry_with;
use crate::{Result, RuntimeError};

use berth_core::OrchestratorConfig;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Instant;
use tracing::{debug, warn};

/// Client for the runtime's HTTP API and operator CLI
pub struct RuntimeClient {
    config: OrchestratorConfig,
    client: Client,
}

/// Result of a single health probe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthInfo {
    /// Whether the runtime answered with a well-formed success response
    pub healthy: bool,

    /// Human-readable status, e.g. `healthy` or `unhealthy (HTTP 503)`
    pub status: String,

    /// Base URL the probe targeted
    pub base_url: String,

    /// When the probe completed
    pub checked_at: DateTime<Utc>,

    /// Probe round-trip time
    pub response_time_ms: f64,

    /// Number of models the runtime reported, when the body carried a list
    pub models_available: Option<usize>,
}

/// One message in a chat conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Chat completion request (OpenAI-compatible)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stream: bool,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: 0.7,
            max_tokens: 1000,
            stream: false,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Chat completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub model: String,
    pub choices: Vec<ChatChoice>,
    pub usage: Option<Usage>,
}

impl ChatResponse {
    /// Text of the first choice, if any
    pub fn text(&self) -> Option<&str> {
        self.choices.first().map(|c| c.message.content.as_str())
    }
}

/// One choice in a chat completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
    pub finish_reason: Option<String>,
}

/// Token usage statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl RuntimeClient {
    /// Create a new client
    pub fn new(config: OrchestratorConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| {
                RuntimeError::Configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { config, client })
    }

    /// Resolve an API path against the configured base URL
    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.as_str().trim_end_matches('/'),
            path
        )
    }

    /// Probe the runtime's health endpoint.
    ///
    /// An error status or malformed body is an unhealthy observation, not an
    /// error; only transport failures are returned as errors.
    pub async fn health_check(&self) -> Result<HealthInfo> {
        let url = self.url("models");
        retry_with(&self.config.retry, "health probe", || self.probe(&url)).await
    }

    async fn probe(&self, url: &str) -> Result<HealthInfo> {
        debug!("Probing runtime health at: {}", url);
        let started = Instant::now();

        let response = self
            .client
            .get(url)
            .timeout(self.config.health.probe_timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RuntimeError::Timeout(format!("Health probe timed out: {}", e))
                } else {
                    RuntimeError::Connection(format!("Failed to connect to runtime: {}", e))
                }
            })?;

        let response_time_ms = started.elapsed().as_secs_f64() * 1000.0;
        let status = response.status();

        if !status.is_success() {
            return Ok(self.health_info(
                false,
                format!("unhealthy (HTTP {})", status.as_u16()),
                response_time_ms,
                None,
            ));
        }

        let body = response.text().await?;
        match serde_json::from_str::<serde_json::Value>(&body) {
            Ok(value) => {
                let models_available = value.as_array().map(|models| models.len()).or_else(|| {
                    value
                        .get("data")
                        .and_then(|data| data.as_array())
                        .map(|models| models.len())
                });
                Ok(self.health_info(true, "healthy".to_string(), response_time_ms, models_available))
            }
            Err(e) => Ok(self.health_info(
                false,
                format!("invalid response body: {}", e),
                response_time_ms,
                None,
            )),
        }
    }

    fn health_info(
        &self,
        healthy: bool,
        status: String,
        response_time_ms: f64,
        models_available: Option<usize>,
    ) -> HealthInfo {
        HealthInfo {
            healthy,
            status,
            base_url: self.config.base_url.to_string(),
            checked_at: Utc::now(),
            response_time_ms,
            models_available,
        }
    }

    /// List the model catalog, marking loaded variants.
    ///
    /// Loaded-state matching is exact string equality between `model_id`s
    /// scraped from two separately formatted CLI tables; any drift between
    /// the outputs shows up as a model reported not loaded.
    pub async fn list_models(&self) -> Result<Vec<ModelRecord>> {
        let stdout = self.run_cli(&["model", "list"]).await?;
        let mut records = catalog::parse_catalog(&stdout);

        let loaded = match self.loaded_models().await {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!("Could not determine loaded models: {}", e);
                Vec::new()
            }
        };
        apply_loaded(&mut records, &loaded);

        Ok(records)
    }

    /// Models currently running in the service
    pub async fn loaded_models(&self) -> Result<Vec<LoadedModelRef>> {
        let stdout = self.run_cli(&["service", "list"]).await?;
        Ok(catalog::parse_loaded_set(&stdout))
    }

    /// Load a model into the runtime by id
    pub async fn run_model(&self, model_id: &str) -> Result<()> {
        let url = self.url(&format!("models/{}/load", model_id));
        retry_with(&self.config.retry, "model load", || {
            self.post_control(&url, "load", model_id)
        })
        .await
    }

    /// Unload a model from the runtime by id
    pub async fn unload_model(&self, model_id: &str) -> Result<()> {
        let url = self.url(&format!("models/{}/unload", model_id));
        retry_with(&self.config.retry, "model unload", || {
            self.post_control(&url, "unload", model_id)
        })
        .await
    }

    async fn post_control(&self, url: &str, action: &str, model_id: &str) -> Result<()> {
        debug!("Requesting model {} for: {}", action, model_id);

        let response = self.client.post(url).send().await.map_err(|e| {
            if e.is_timeout() {
                RuntimeError::Timeout(format!("Model {} timed out: {}", action, e))
            } else {
                RuntimeError::Connection(format!("Failed to connect to runtime: {}", e))
            }
        })?;

        let status = response.status();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            return Err(RuntimeError::Unavailable(format!(
                "Runtime not ready for model {}: {}",
                action, status
            )));
        }
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RuntimeError::Model(format!(
                "Model {} failed for {}: {} - {}",
                action, model_id, status, error_text
            )));
        }

        Ok(())
    }

    /// Send a chat completion request
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let url = self.url("chat/completions");
        retry_with(&self.config.retry, "chat completion", || {
            self.send_chat(&url, request)
        })
        .await
    }

    async fn send_chat(&self, url: &str, request: &ChatRequest) -> Result<ChatResponse> {
        debug!("Sending chat request for model: {}", request.model);

        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RuntimeError::Timeout(format!("Chat request timed out: {}", e))
                } else {
                    RuntimeError::Connection(format!("Chat request failed: {}", e))
                }
            })?;

        let status = response.status();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            return Err(RuntimeError::Unavailable(format!(
                "Runtime not ready for chat: {}",
                status
            )));
        }
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RuntimeError::Model(format!(
                "Chat completion failed: {} - {}",
                status, error_text
            )));
        }

        response
            .json()
            .await
            .map_err(|e| RuntimeError::InvalidResponse(format!("Invalid chat response: {}", e)))
    }

    /// Ask the runtime's CLI to start the background service
    pub async fn start_service(&self) -> Result<()> {
        self.run_cli(&["service", "start"]).await.map(|_| ())
    }

    /// Ask the runtime's CLI to stop the background service
    pub async fn stop_service(&self) -> Result<()> {
        self.run_cli(&["service", "stop"]).await.map(|_| ())
    }

    /// Run the runtime's operator CLI and capture stdout. CLI failures are
    /// application-level and never retried.
    async fn run_cli(&self, args: &[&str]) -> Result<String> {
        debug!("Running CLI: {} {}", self.config.cli_command, args.join(" "));

        let output = tokio::time::timeout(
            self.config.cli_timeout,
            tokio::process::Command::new(&self.config.cli_command)
                .args(args)
                .output(),
        )
        .await
        .map_err(|_| {
            RuntimeError::Timeout(format!(
                "{} {} timed out after {:?}",
                self.config.cli_command,
                args.join(" "),
                self.config.cli_timeout
            ))
        })?
        .map_err(|e| {
            RuntimeError::Process(format!("Failed to run {}: {}", self.config.cli_command, e))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RuntimeError::Process(format!(
                "{} {} exited with {}: {}",
                self.config.cli_command,
                args.join(" "),
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Mark each record loaded iff any of its variants' `model_id` exactly
/// matches a loaded-set entry.
fn apply_loaded(records: &mut [ModelRecord], loaded: &[LoadedModelRef]) {
    let loaded_ids: HashSet<&str> = loaded.iter().map(|m| m.model_id.as_str()).collect();
    for record in records {
        record.is_loaded = record
            .variants
            .iter()
            .any(|v| loaded_ids.contains(v.model_id.as_str()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ModelVariant;
    use crate::RetryPolicy;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(uri: &str) -> OrchestratorConfig {
        OrchestratorConfig::default()
            .with_base_url(uri)
            .unwrap()
            .with_retry(RetryPolicy::new(1, Duration::from_millis(1), 1.0))
    }

    fn variant(model_id: &str) -> ModelVariant {
        ModelVariant {
            device: "GPU".to_string(),
            task: "chat-completion".to_string(),
            size: "8.37 GB".to_string(),
            license: "MIT".to_string(),
            model_id: model_id.to_string(),
        }
    }

    fn record(alias: &str, ids: &[&str]) -> ModelRecord {
        ModelRecord {
            alias: alias.to_string(),
            variants: ids.iter().map(|id| variant(id)).collect(),
            is_loaded: false,
        }
    }

    #[tokio::test]
    async fn test_chat_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({"model": "phi-4", "stream": false})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "phi-4",
                "choices": [{
                    "message": {"role": "assistant", "content": "Hello there"},
                    "finish_reason": "stop"
                }],
                "usage": {"prompt_tokens": 9, "completion_tokens": 3, "total_tokens": 12}
            })))
            .mount(&server)
            .await;

        let client = RuntimeClient::new(config_for(&server.uri())).unwrap();
        let request = ChatRequest::new("phi-4", vec![ChatMessage::user("Hi")]);
        let response = client.chat(&request).await.unwrap();

        assert_eq!(response.text(), Some("Hello there"));
        assert_eq!(response.usage.unwrap().total_tokens, 12);
    }

    #[tokio::test]
    async fn test_model_not_found_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/missing/load"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no such model"))
            .expect(1)
            .mount(&server)
            .await;

        let config = config_for(&server.uri())
            .with_retry(RetryPolicy::new(3, Duration::from_millis(1), 1.0));
        let client = RuntimeClient::new(config).unwrap();

        let err = client.run_model("missing").await.unwrap_err();
        assert!(matches!(err, RuntimeError::Model(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_service_unavailable_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/phi-4/load"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;

        let config = config_for(&server.uri())
            .with_retry(RetryPolicy::new(2, Duration::from_millis(1), 1.0));
        let client = RuntimeClient::new(config).unwrap();

        let err = client.run_model("phi-4").await.unwrap_err();
        assert!(matches!(err, RuntimeError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_health_check_counts_models() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "object": "list",
                "data": [{"id": "phi-4"}, {"id": "qwen2.5-0.5b"}]
            })))
            .mount(&server)
            .await;

        let client = RuntimeClient::new(config_for(&server.uri())).unwrap();
        let health = client.health_check().await.unwrap();

        assert!(health.healthy);
        assert_eq!(health.status, "healthy");
        assert_eq!(health.models_available, Some(2));
        assert!(health.response_time_ms >= 0.0);
    }

    #[tokio::test]
    async fn test_health_check_reports_error_status_as_unhealthy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = RuntimeClient::new(config_for(&server.uri())).unwrap();
        let health = client.health_check().await.unwrap();

        assert!(!health.healthy);
        assert_eq!(health.status, "unhealthy (HTTP 500)");
        assert_eq!(health.models_available, None);
    }

    #[tokio::test]
    async fn test_connection_refused_is_retryable_and_backs_off() {
        // Bind and drop a listener so the port is known-dead
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let config = OrchestratorConfig::default()
            .with_base_url(&format!("http://127.0.0.1:{}", port))
            .unwrap()
            .with_retry(RetryPolicy::new(2, Duration::from_millis(50), 1.0));
        let client = RuntimeClient::new(config).unwrap();

        let started = Instant::now();
        let err = client.health_check().await.unwrap_err();

        assert!(err.is_retryable());
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_loaded_models_with_unloadable_output() {
        let config = OrchestratorConfig::default().with_cli_command("echo");
        let client = RuntimeClient::new(config).unwrap();

        let loaded = client.loaded_models().await.unwrap();
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn test_missing_cli_binary_is_process_error() {
        let config = OrchestratorConfig::default().with_cli_command("berth-test-no-such-cli");
        let client = RuntimeClient::new(config).unwrap();

        let err = client.loaded_models().await.unwrap_err();
        assert!(matches!(err, RuntimeError::Process(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_apply_loaded_requires_exact_variant_match() {
        let mut records = vec![
            record("phi-4", &["Phi-4-generic-gpu", "Phi-4-generic-cpu"]),
            record("phi-4-mini", &["Phi-4-mini-instruct-generic-gpu"]),
        ];
        let loaded = vec![LoadedModelRef {
            alias: "phi-4".to_string(),
            model_id: "Phi-4-generic-cpu".to_string(),
        }];

        apply_loaded(&mut records, &loaded);
        assert!(records[0].is_loaded);
        assert!(!records[1].is_loaded);
    }

    #[test]
    fn test_apply_loaded_ignores_casing_drift() {
        let mut records = vec![record("phi-4", &["Phi-4-generic-gpu"])];
        let loaded = vec![LoadedModelRef {
            alias: "phi-4".to_string(),
            model_id: "phi-4-generic-gpu".to_string(),
        }];

        apply_loaded(&mut records, &loaded);
        assert!(!records[0].is_loaded);
    }

    #[test]
    fn test_chat_request_defaults() {
        let request = ChatRequest::new("phi-4", vec![ChatMessage::user("Hi")]);
        assert_eq!(request.temperature, 0.7);
        assert_eq!(request.max_tokens, 1000);
        assert!(!request.stream);

        let request = request.with_temperature(0.2).with_max_tokens(64);
        assert_eq!(request.temperature, 0.2);
        assert_eq!(request.max_tokens, 64);
    }
}
