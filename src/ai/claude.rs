use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};

use super::prompt::compose_text_prompt;
use super::types::{BackendHealth, ExtractionBackend, ExtractionInput};
use super::{BackendError, BackendId};
use crate::config::{HEALTH_CHECK_TIMEOUT, HOSTED_EXTRACTION_TIMEOUT};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;

/// Hosted backend over the Anthropic Messages API.
pub struct ClaudeBackend {
    base_url: String,
    api_key: Option<String>,
    model: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl ClaudeBackend {
    pub fn new(base_url: &str, api_key: Option<String>, model: &str) -> Result<Self, BackendError> {
        Self::with_timeout(base_url, api_key, model, HOSTED_EXTRACTION_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: &str,
        api_key: Option<String>,
        model: &str,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Http {
                backend: BackendId::Claude,
                message: e.to_string(),
            })?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model: model.to_string(),
            client,
            timeout,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn api_key(&self) -> Result<&str, BackendError> {
        self.api_key.as_deref().ok_or_else(|| BackendError::Unconfigured {
            backend: BackendId::Claude,
            reason: "ANTHROPIC_API_KEY is not set".into(),
        })
    }
}

// ── Wire types ──

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: MessageContent<'a>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum MessageContent<'a> {
    Text(String),
    Blocks(Vec<ContentBlock<'a>>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ContentBlock<'a> {
    Document { source: DocumentSource<'a> },
    Text { text: &'a str },
}

#[derive(Serialize)]
struct DocumentSource<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    media_type: &'a str,
    data: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ReplyBlock>,
}

#[derive(Deserialize)]
struct ReplyBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

fn build_content<'a>(input: &'a ExtractionInput, instructions: &'a str) -> MessageContent<'a> {
    match input {
        ExtractionInput::Document { bytes, media_type } => MessageContent::Blocks(vec![
            ContentBlock::Document {
                source: DocumentSource {
                    kind: "base64",
                    media_type,
                    data: base64::engine::general_purpose::STANDARD.encode(bytes),
                },
            },
            ContentBlock::Text { text: instructions },
        ]),
        ExtractionInput::Text(text) => MessageContent::Text(compose_text_prompt(instructions, text)),
    }
}

#[async_trait]
impl ExtractionBackend for ClaudeBackend {
    fn id(&self) -> BackendId {
        BackendId::Claude
    }

    fn accepts_documents(&self) -> bool {
        true
    }

    fn extraction_timeout(&self) -> Duration {
        self.timeout
    }

    async fn health_check(&self) -> BackendHealth {
        let started = Instant::now();
        let Ok(key) = self.api_key() else {
            return BackendHealth::down(0, "ANTHROPIC_API_KEY is not set");
        };

        let url = format!("{}/v1/models", self.base_url);
        let result = self
            .client
            .get(&url)
            .header("x-api-key", key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .timeout(HEALTH_CHECK_TIMEOUT)
            .send()
            .await;
        let latency = started.elapsed().as_millis() as u64;

        match result {
            Ok(resp) if resp.status().is_success() => BackendHealth::up(latency, &self.model),
            Ok(resp) => BackendHealth::down(latency, format!("status {}", resp.status().as_u16())),
            Err(e) => BackendHealth::down(latency, e.to_string()),
        }
    }

    async fn extract(
        &self,
        input: &ExtractionInput,
        instructions: &str,
    ) -> Result<String, BackendError> {
        let key = self.api_key()?;
        let url = format!("{}/v1/messages", self.base_url);
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            temperature: 0.0,
            messages: vec![Message {
                role: "user",
                content: build_content(input, instructions),
            }],
        };

        tracing::debug!(model = %self.model, document = input.is_document(), "Claude request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                BackendError::from_reqwest(BackendId::Claude, &self.base_url, e, self.timeout.as_secs())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                backend: BackendId::Claude,
                status: status.as_u16(),
                body,
            });
        }

        let parsed: MessagesResponse = response.json().await.map_err(|e| BackendError::Http {
            backend: BackendId::Claude,
            message: e.to_string(),
        })?;

        let text: String = parsed
            .content
            .into_iter()
            .filter(|b| b.kind == "text")
            .filter_map(|b| b.text)
            .collect::<Vec<_>>()
            .join("");

        if text.trim().is_empty() {
            return Err(BackendError::EmptyReply {
                backend: BackendId::Claude,
            });
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend(server: &MockServer, key: Option<&str>) -> ClaudeBackend {
        ClaudeBackend::new(&server.uri(), key.map(String::from), "claude-test").unwrap()
    }

    #[test]
    fn trims_trailing_slash_and_blank_key() {
        let b = ClaudeBackend::new("https://api.anthropic.com/", Some("  ".into()), "m").unwrap();
        assert_eq!(b.base_url, "https://api.anthropic.com");
        assert!(!b.is_configured());
        assert_eq!(b.extraction_timeout(), HOSTED_EXTRACTION_TIMEOUT);
    }

    #[tokio::test]
    async fn unconfigured_backend_is_down_without_request() {
        let server = MockServer::start().await;
        let health = backend(&server, None).health_check().await;
        assert!(!health.available);
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unconfigured_extract_fails_fast() {
        let server = MockServer::start().await;
        let err = backend(&server, None)
            .extract(&ExtractionInput::Text("x".into()), "p")
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Unconfigured { .. }));
    }

    #[tokio::test]
    async fn health_probe_uses_models_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .and(header("x-api-key", "sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})))
            .mount(&server)
            .await;

        let health = backend(&server, Some("sk-test")).health_check().await;
        assert!(health.available);
        assert_eq!(health.model.as_deref(), Some("claude-test"));
    }

    #[tokio::test]
    async fn health_probe_reports_rejected_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let health = backend(&server, Some("bad")).health_check().await;
        assert!(!health.available);
        assert_eq!(health.error.as_deref(), Some("status 401"));
    }

    #[tokio::test]
    async fn document_is_sent_as_base64_block() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(body_partial_json(serde_json::json!({
                "model": "claude-test",
                "max_tokens": 4096,
                "messages": [{"role": "user", "content": [
                    {"type": "document", "source": {"type": "base64", "media_type": "application/pdf", "data": "JVBERg=="}},
                    {"type": "text", "text": "Extract."}
                ]}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [{"type": "text", "text": "{\"ok\":"}, {"type": "text", "text": "true}"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let reply = backend(&server, Some("sk-test"))
            .extract(&ExtractionInput::pdf(b"%PDF".to_vec()), "Extract.")
            .await
            .unwrap();
        assert_eq!(reply, "{\"ok\":true}");
    }

    #[tokio::test]
    async fn non_success_status_is_backend_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(529).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = backend(&server, Some("sk-test"))
            .extract(&ExtractionInput::Text("report".into()), "Extract.")
            .await
            .unwrap_err();
        match err {
            BackendError::Status { status, body, .. } => {
                assert_eq!(status, 529);
                assert_eq!(body, "overloaded");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn empty_content_is_empty_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"content": []})))
            .mount(&server)
            .await;

        let err = backend(&server, Some("sk-test"))
            .extract(&ExtractionInput::Text("report".into()), "Extract.")
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::EmptyReply { .. }));
    }
}
