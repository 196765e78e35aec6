use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use thiserror::Error;
use tracing::{debug, info};

use super::endpoints::{GenerateRequest, GenerateResponse, Provider};
use super::retry::RetryPolicy;

#[derive(Debug, Error)]
pub enum ApiConnectionError {
    #[error("API key not found in environment: {0}")]
    MissingApiKey(String),
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("{service} API error {status}: {error_body}")]
    ApiError {
        service: &'static str,
        status: StatusCode,
        error_body: String,
    },
    #[error("{service} returned an error: {message}")]
    Upstream {
        service: &'static str,
        message: String,
    },
}

impl ApiConnectionError {
    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiConnectionError::NetworkError(err) => {
                err.is_timeout() || err.is_connect() || err.is_request()
            }
            ApiConnectionError::ApiError { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            _ => false,
        }
    }
}

/// Builds the shared HTTP client used by every outbound adapter.
pub fn http_client(timeout: Duration) -> Result<Client, ApiConnectionError> {
    Ok(Client::builder().timeout(timeout).build()?)
}

/// Turns a non-2xx response into `ApiError`, keeping the body for the log.
pub async fn ensure_success(
    service: &'static str,
    response: Response,
) -> Result<Response, ApiConnectionError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let error_body = response
        .text()
        .await
        .unwrap_or_else(|_| "Failed to read error body".to_string());
    Err(ApiConnectionError::ApiError {
        service,
        status,
        error_body,
    })
}

/// A black-box text completion service.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, temperature: Option<f32>) -> Result<String, ApiConnectionError>;
}

/// Text generation client for an Ollama-compatible `/api/generate` endpoint.
#[derive(Debug, Clone)]
pub struct Generator {
    provider: Provider,
    client: Client,
    retry: RetryPolicy,
}

impl Generator {
    pub fn new(provider: Provider, timeout: Duration, retry: RetryPolicy) -> Result<Self, ApiConnectionError> {
        Ok(Self {
            provider,
            client: http_client(timeout)?,
            retry,
        })
    }

    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    pub async fn call_generate(
        &self,
        request: &GenerateRequest,
    ) -> Result<GenerateResponse, ApiConnectionError> {
        let service = self.provider.service_name();
        let url = self.provider.generate_url();

        let client = &self.client;
        let url = url.as_str();
        self.retry
            .run("generate", || async move {
                let response = client.post(url).json(request).send().await?;
                let response = ensure_success(service, response).await?;
                let body = response.bytes().await?;
                Ok(serde_json::from_slice::<GenerateResponse>(&body)?)
            })
            .await
    }

    /// Runs one completion and returns only the generated text.
    pub async fn complete(
        &self,
        prompt: &str,
        temperature: Option<f32>,
    ) -> Result<String, ApiConnectionError> {
        info!(model = self.provider.model(), ?temperature, "Generating text");
        let request = GenerateRequest::new(self.provider.model(), prompt, temperature);
        let response = self.call_generate(&request).await?;
        debug!(chars = response.response.len(), "Text generated");
        Ok(response.response)
    }
}

#[async_trait]
impl TextGenerator for Generator {
    async fn generate(&self, prompt: &str, temperature: Option<f32>) -> Result<String, ApiConnectionError> {
        self.complete(prompt, temperature).await
    }
}
