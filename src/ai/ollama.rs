use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};

use super::prompt::compose_text_prompt;
use super::types::{BackendHealth, ExtractionBackend, ExtractionInput};
use super::{BackendError, BackendId};
use crate::config::{HEALTH_CHECK_TIMEOUT, LOCAL_EXTRACTION_TIMEOUT};

const NUM_PREDICT: u32 = 4096;

/// Local backend over Ollama's `/api/generate`. Text input only.
pub struct OllamaBackend {
    base_url: String,
    model: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl OllamaBackend {
    pub fn new(base_url: &str, model: &str) -> Result<Self, BackendError> {
        Self::with_timeout(base_url, model, LOCAL_EXTRACTION_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, model: &str, timeout: Duration) -> Result<Self, BackendError> {
        // Long-lived connection: local inference may take many minutes.
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .map_err(|e| BackendError::Http {
                backend: BackendId::Ollama,
                message: e.to_string(),
            })?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
            timeout,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Whether `installed` lists the configured model, exactly or as `model:tag`.
    pub fn model_installed(&self, installed: &[String]) -> bool {
        let tagged = format!("{}:", self.model);
        installed
            .iter()
            .any(|m| m == &self.model || m.starts_with(&tagged))
    }

    fn http_error(&self, e: reqwest::Error) -> BackendError {
        BackendError::from_reqwest(BackendId::Ollama, &self.base_url, e, self.timeout.as_secs())
    }
}

// ── Wire types ──

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

/// One NDJSON line of a streamed generate response.
#[derive(Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Deserialize)]
struct TagModel {
    name: String,
}

/// Accumulates streamed tokens from NDJSON chunks split at arbitrary byte boundaries.
#[derive(Default)]
struct StreamAccumulator {
    pending: Vec<u8>,
    text: String,
    done: bool,
}

impl StreamAccumulator {
    fn push(&mut self, bytes: &[u8]) -> Result<(), BackendError> {
        self.pending.extend_from_slice(bytes);
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.consume_line(&line)?;
        }
        Ok(())
    }

    fn finish(mut self) -> Result<String, BackendError> {
        let rest = std::mem::take(&mut self.pending);
        self.consume_line(&rest)?;
        Ok(self.text)
    }

    fn consume_line(&mut self, line: &[u8]) -> Result<(), BackendError> {
        let line = String::from_utf8_lossy(line);
        let line = line.trim();
        if line.is_empty() || self.done {
            return Ok(());
        }
        let chunk: GenerateChunk = serde_json::from_str(line).map_err(|e| BackendError::Http {
            backend: BackendId::Ollama,
            message: format!("invalid stream chunk: {e}"),
        })?;
        if let Some(error) = chunk.error {
            return Err(BackendError::Http {
                backend: BackendId::Ollama,
                message: error,
            });
        }
        self.text.push_str(&chunk.response);
        self.done = chunk.done;
        Ok(())
    }
}

#[async_trait]
impl ExtractionBackend for OllamaBackend {
    fn id(&self) -> BackendId {
        BackendId::Ollama
    }

    fn accepts_documents(&self) -> bool {
        false
    }

    fn extraction_timeout(&self) -> Duration {
        self.timeout
    }

    async fn health_check(&self) -> BackendHealth {
        let started = Instant::now();
        let url = format!("{}/api/tags", self.base_url);
        let result = self
            .client
            .get(&url)
            .timeout(HEALTH_CHECK_TIMEOUT)
            .send()
            .await;

        let response = match result {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                let latency = started.elapsed().as_millis() as u64;
                return BackendHealth::down(latency, format!("status {}", r.status().as_u16()));
            }
            Err(e) => {
                let latency = started.elapsed().as_millis() as u64;
                return BackendHealth::down(latency, e.to_string());
            }
        };

        let tags = response.json::<TagsResponse>().await;
        let latency = started.elapsed().as_millis() as u64;
        match tags {
            Ok(tags) => {
                let installed: Vec<String> = tags.models.into_iter().map(|m| m.name).collect();
                if self.model_installed(&installed) {
                    BackendHealth::up(latency, &self.model)
                } else {
                    BackendHealth::down(latency, format!("model '{}' is not installed", self.model))
                }
            }
            Err(e) => BackendHealth::down(latency, e.to_string()),
        }
    }

    async fn extract(
        &self,
        input: &ExtractionInput,
        instructions: &str,
    ) -> Result<String, BackendError> {
        let ExtractionInput::Text(text) = input else {
            return Err(BackendError::UnsupportedInput {
                backend: BackendId::Ollama,
            });
        };

        let prompt = compose_text_prompt(instructions, text);
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest {
            model: &self.model,
            prompt: &prompt,
            stream: true,
            options: GenerateOptions {
                temperature: 0.0,
                num_predict: NUM_PREDICT,
            },
        };

        tracing::debug!(model = %self.model, prompt_chars = prompt.len(), "Ollama request");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.http_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                backend: BackendId::Ollama,
                status: status.as_u16(),
                body,
            });
        }

        let mut acc = StreamAccumulator::default();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(|e| self.http_error(e))?;
            acc.push(&bytes)?;
        }
        let text = acc.finish()?;

        if text.trim().is_empty() {
            return Err(BackendError::EmptyReply {
                backend: BackendId::Ollama,
            });
        }
        Ok(text)
    }
}
