use std::time::Duration;

use reqwest::Client;

use super::error::BackendError;
use super::types::{ChatMessage, ChatRequest, ChatResponse};
use crate::config::ModelConfig;

/// Default per-request timeout for model calls.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// HTTP client for OpenAI-compatible `chat/completions` endpoints.
#[derive(Debug, Clone)]
pub struct ChatClient {
    client: Client,
}

impl ChatClient {
    pub fn new() -> Result<Self, BackendError> {
        Self::with_timeout(REQUEST_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, BackendError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    pub async fn complete(
        &self,
        model: &ModelConfig,
        messages: Vec<ChatMessage>,
    ) -> Result<ChatResponse, BackendError> {
        let url = format!("{}/chat/completions", model.base_url.trim_end_matches('/'));
        let req = ChatRequest {
            model: model.model_id.clone(),
            messages,
            temperature: model.temperature,
            max_tokens: model.max_tokens,
        };

        let mut builder = self.client.post(&url).json(&req);
        if !model.api_key.is_empty() {
            builder = builder.bearer_auth(&model.api_key);
        }
        let response = builder.send().await?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs * 1000)
                .unwrap_or(1000);
            return Err(BackendError::RateLimited {
                retry_after_ms: retry_after,
            });
        }

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(BackendError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.json::<ChatResponse>().await?;
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn model(base_url: String, api_key: &str) -> ModelConfig {
        ModelConfig {
            name: "test".into(),
            base_url,
            model_id: "test-model".into(),
            api_key: api_key.into(),
            local: false,
            temperature: 0.3,
            max_tokens: 256,
        }
    }

    #[tokio::test]
    async fn complete_parses_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "hello"}}],
                "usage": {"prompt_tokens": 3, "completion_tokens": 2}
            })))
            .mount(&server)
            .await;

        let client = ChatClient::new().unwrap();
        let resp = client
            .complete(&model(format!("{}/v1/", server.uri()), "sk-test"), vec![ChatMessage::user("hi")])
            .await
            .unwrap();
        assert_eq!(resp.text(), Some("hello"));
        assert_eq!(resp.completion_tokens(), 2);
    }

    #[tokio::test]
    async fn complete_maps_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "3"))
            .mount(&server)
            .await;

        let client = ChatClient::new().unwrap();
        let err = client
            .complete(&model(server.uri(), ""), vec![ChatMessage::user("hi")])
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::RateLimited { retry_after_ms: 3000 }));
    }

    #[tokio::test]
    async fn complete_maps_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = ChatClient::new().unwrap();
        let err = client
            .complete(&model(server.uri(), ""), vec![ChatMessage::user("hi")])
            .await
            .unwrap_err();
        match err {
            BackendError::ApiError { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "boom");
            }
            other => panic!("expected ApiError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn complete_reports_network_failure() {
        let client = ChatClient::with_timeout(Duration::from_millis(500)).unwrap();
        let err = client
            .complete(&model("http://127.0.0.1:9".into(), ""), vec![ChatMessage::user("hi")])
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::NetworkError(_)));
    }
}
