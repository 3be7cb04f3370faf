//! Chat-model clients.
//!
//! [`ChatModel`] is the seam between the analysis engine and whatever
//! serves completions. [`HttpChatModel`] speaks the OpenAI-compatible
//! `/chat/completions` shape; [`MockChatModel`] is exported so
//! downstream crates can test pipeline wiring without a live model.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config;

use super::AnalysisError;

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone)]
pub struct ChatCompletion {
    pub text: String,
    /// Usage as reported by the backend, when it reports one.
    pub usage: Option<TokenUsage>,
    pub model: String,
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<ChatCompletion, AnalysisError>;

    fn model_name(&self) -> &str;
}

#[derive(Debug, Clone)]
pub struct HttpChatModelConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
}

impl HttpChatModelConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: config::DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(config::DEFAULT_MODEL_TIMEOUT_SECS),
        }
    }
}

pub struct HttpChatModel {
    config: HttpChatModelConfig,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl HttpChatModel {
    pub fn new(config: HttpChatModelConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("Failed to create HTTP client");
        Self { config, client }
    }
}

#[async_trait]
impl ChatModel for HttpChatModel {
    async fn complete(&self, system: &str, user: &str) -> Result<ChatCompletion, AnalysisError> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let request = CompletionRequest {
            model: &self.config.model,
            messages: vec![
                WireMessage {
                    role: "system",
                    content: system,
                },
                WireMessage {
                    role: "user",
                    content: user,
                },
            ],
            // Analysis should be reproducible, not creative.
            temperature: 0.0,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AnalysisError::Timeout {
                        elapsed_secs: self.config.timeout.as_secs(),
                    }
                } else {
                    AnalysisError::ModelCall(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::ModelCall(format!(
                "completion endpoint returned {status}: {body}"
            )));
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| AnalysisError::ModelCall(e.to_string()))?;

        let text = parsed
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(AnalysisError::EmptyResponse);
        }

        Ok(ChatCompletion {
            text,
            usage: parsed.usage,
            model: parsed.model.unwrap_or_else(|| self.config.model.clone()),
        })
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

/// Scripted chat model for tests. Replies are consumed in order; when
/// the script is exhausted the last reply repeats.
pub struct MockChatModel {
    replies: Mutex<Vec<String>>,
    usage: Option<TokenUsage>,
    calls: std::sync::atomic::AtomicUsize,
}

impl MockChatModel {
    pub fn new(replies: Vec<String>) -> Self {
        Self {
            replies: Mutex::new(replies),
            usage: None,
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatModel for MockChatModel {
    async fn complete(&self, _system: &str, _user: &str) -> Result<ChatCompletion, AnalysisError> {
        self.calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let mut replies = self.replies.lock().expect("mock replies lock");
        let text = if replies.len() > 1 {
            replies.remove(0)
        } else {
            replies.first().cloned().unwrap_or_default()
        };
        if text.trim().is_empty() {
            return Err(AnalysisError::EmptyResponse);
        }
        Ok(ChatCompletion {
            text,
            usage: self.usage,
            model: "mock-model".to_string(),
        })
    }

    fn model_name(&self) -> &str {
        "mock-model"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn http_model_sends_zero_temperature_and_parses_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(json!({ "temperature": 0.0 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "content": "[]" } }],
                "usage": { "prompt_tokens": 100, "completion_tokens": 20, "total_tokens": 120 },
                "model": "gpt-4o-mini"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let model = HttpChatModel::new(HttpChatModelConfig::new(server.uri(), "test-key"));
        let completion = model.complete("system", "user").await.unwrap();

        assert_eq!(completion.text, "[]");
        assert_eq!(completion.usage.unwrap().total_tokens, 120);
        assert_eq!(completion.model, "gpt-4o-mini");
    }

    #[tokio::test]
    async fn http_error_surfaces_as_model_call_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let model = HttpChatModel::new(HttpChatModelConfig::new(server.uri(), "k"));
        let err = model.complete("s", "u").await.unwrap_err();
        assert!(matches!(err, AnalysisError::ModelCall(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn blank_completion_is_an_empty_response_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "content": "   " } }]
            })))
            .mount(&server)
            .await;

        let model = HttpChatModel::new(HttpChatModelConfig::new(server.uri(), "k"));
        let err = model.complete("s", "u").await.unwrap_err();
        assert!(matches!(err, AnalysisError::EmptyResponse));
    }

    #[tokio::test]
    async fn mock_model_replays_its_script() {
        let model = MockChatModel::new(vec!["first".into(), "second".into()]);
        assert_eq!(model.complete("s", "u").await.unwrap().text, "first");
        assert_eq!(model.complete("s", "u").await.unwrap().text, "second");
        assert_eq!(model.complete("s", "u").await.unwrap().text, "second");
        assert_eq!(model.calls(), 3);
    }
}
