//! Backend selection with health probing, a short-lived selection cache
//! and exactly one cross-backend failover per request.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::Instrument;

use super::parser::{MalformedResponse, ResponseDecode};
use super::pdf_text::{PdfExtractText, PdfTextExtractor};
use super::selection::{Clock, SelectionCache, SystemClock};
use super::types::{BackendHealth, ExtractionBackend, ExtractionInput};
use super::{BackendError, BackendId, ClaudeBackend, FailedAttempt, OllamaBackend, ProviderError};
use crate::config::{AppConfig, HEALTH_CHECK_TIMEOUT, SELECTION_TTL};

/// A reply and the backend that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted<T> {
    pub value: T,
    pub backend: BackendId,
}

/// Per-backend liveness plus the backend a request would use now.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    #[serde(flatten)]
    pub backends: BTreeMap<BackendId, BackendHealth>,
    /// Backend id, or `"none"`.
    pub active_provider: String,
}

pub struct ProviderOrchestrator {
    /// Preference order: hosted before local.
    backends: Vec<Arc<dyn ExtractionBackend>>,
    /// Global override; bypasses probing and caching.
    override_backend: Option<BackendId>,
    cache: SelectionCache,
    pdf_text: Arc<dyn PdfTextExtractor>,
    health_timeout: Duration,
}

impl ProviderOrchestrator {
    pub fn new(
        backends: Vec<Arc<dyn ExtractionBackend>>,
        override_backend: Option<BackendId>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            backends,
            override_backend,
            cache: SelectionCache::new(SELECTION_TTL, clock),
            pdf_text: Arc::new(PdfExtractText),
            health_timeout: HEALTH_CHECK_TIMEOUT,
        }
    }

    /// Claude then Ollama, as configured in the environment.
    pub fn from_config(config: &AppConfig) -> Result<Self, BackendError> {
        let claude = ClaudeBackend::new(
            &config.anthropic_base_url,
            config.anthropic_api_key.clone(),
            &config.claude_model,
        )?;
        let ollama = OllamaBackend::new(&config.ollama_base_url, &config.ollama_model)?;

        let backends: Vec<Arc<dyn ExtractionBackend>> = vec![
            Arc::new(claude) as Arc<dyn ExtractionBackend>,
            Arc::new(ollama),
        ];
        Ok(Self::new(
            backends,
            config.provider_override,
            Arc::new(SystemClock),
        ))
    }

    pub fn with_pdf_extractor(mut self, extractor: Arc<dyn PdfTextExtractor>) -> Self {
        self.pdf_text = extractor;
        self
    }

    pub fn with_health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }

    pub fn backend_ids(&self) -> Vec<BackendId> {
        self.backends.iter().map(|b| b.id()).collect()
    }

    /// Currently cached selection, if still fresh.
    pub fn cached_selection(&self) -> Option<BackendId> {
        self.cache.fresh()
    }

    fn backend(&self, id: BackendId) -> Result<&Arc<dyn ExtractionBackend>, ProviderError> {
        self.backends
            .iter()
            .find(|b| b.id() == id)
            .ok_or_else(|| ProviderError::UnknownBackend(id.to_string()))
    }

    async fn probe(&self, backend: &dyn ExtractionBackend) -> BackendHealth {
        let started = Instant::now();
        match tokio::time::timeout(self.health_timeout, backend.health_check()).await {
            Ok(health) => health,
            Err(_) => BackendHealth::down(
                started.elapsed().as_millis() as u64,
                "health check timed out",
            ),
        }
    }

    // ── Selection ──

    /// Override if configured, else a fresh cached choice, else the first
    /// backend that reports healthy.
    pub async fn select_active(&self) -> Result<BackendId, ProviderError> {
        if let Some(id) = self.override_backend {
            self.backend(id)?;
            return Ok(id);
        }

        if let Some(id) = self.cache.fresh() {
            tracing::debug!(backend = %id, "Using cached provider selection");
            return Ok(id);
        }

        for backend in &self.backends {
            let health = self.probe(backend.as_ref()).await;
            if health.available {
                tracing::info!(backend = %backend.id(), latency_ms = health.latency_ms, "Provider selected");
                self.cache.store(backend.id());
                return Ok(backend.id());
            }
            tracing::debug!(
                backend = %backend.id(),
                error = health.error.as_deref().unwrap_or(""),
                "Provider unavailable"
            );
        }

        Err(ProviderError::NoBackendAvailable)
    }

    /// Probe every backend concurrently. Never fails.
    pub async fn health_report(&self) -> HealthReport {
        let probes = self.backends.iter().map(|b| async move {
            let health = self.probe(b.as_ref()).await;
            (b.id(), health)
        });
        let results = futures_util::future::join_all(probes).await;

        let active = match self.override_backend {
            Some(id) => Some(id),
            None => self
                .backends
                .iter()
                .map(|b| b.id())
                .find(|id| results.iter().any(|(rid, h)| rid == id && h.available)),
        };

        HealthReport {
            backends: results.into_iter().collect(),
            active_provider: active.map_or_else(|| "none".to_string(), |id| id.to_string()),
        }
    }

    // ── Extraction ──

    pub async fn extract_document(
        &self,
        bytes: Vec<u8>,
        prompt: &str,
        override_backend: Option<BackendId>,
    ) -> Result<Extracted<String>, ProviderError> {
        self.run(ExtractionInput::pdf(bytes), prompt, override_backend, |raw| Ok(raw.to_string()))
            .await
    }

    pub async fn extract_text(
        &self,
        text: String,
        prompt: &str,
        override_backend: Option<BackendId>,
    ) -> Result<Extracted<String>, ProviderError> {
        self.run(ExtractionInput::Text(text), prompt, override_backend, |raw| Ok(raw.to_string()))
            .await
    }

    /// Document extraction decoded into `T`; a malformed reply fails over
    /// like a transport error.
    pub async fn extract_document_as<T: ResponseDecode>(
        &self,
        bytes: Vec<u8>,
        prompt: &str,
        override_backend: Option<BackendId>,
    ) -> Result<Extracted<T>, ProviderError> {
        self.run(ExtractionInput::pdf(bytes), prompt, override_backend, T::decode)
            .await
    }

    pub async fn extract_text_as<T: ResponseDecode>(
        &self,
        text: String,
        prompt: &str,
        override_backend: Option<BackendId>,
    ) -> Result<Extracted<T>, ProviderError> {
        self.run(ExtractionInput::Text(text), prompt, override_backend, T::decode)
            .await
    }

    async fn run<T, F>(
        &self,
        input: ExtractionInput,
        prompt: &str,
        request_override: Option<BackendId>,
        decode: F,
    ) -> Result<Extracted<T>, ProviderError>
    where
        F: Fn(&str) -> Result<T, MalformedResponse>,
    {
        let forced = request_override.or(self.override_backend);
        let primary = match forced {
            Some(id) => self.backend(id)?.clone(),
            None => {
                let id = self.select_active().await?;
                self.backend(id)?.clone()
            }
        };

        let mut attempts = Vec::with_capacity(2);

        match self.attempt(primary.as_ref(), &input, prompt, &decode).await {
            Ok(value) => {
                if forced.is_none() {
                    self.cache.store(primary.id());
                }
                return Ok(Extracted { value, backend: primary.id() });
            }
            Err(error) => {
                tracing::warn!(backend = %primary.id(), error = %error, "Extraction failed, trying fallback");
                if forced.is_none() {
                    self.cache.invalidate(primary.id());
                }
                attempts.push(FailedAttempt { backend: primary.id(), error });
            }
        }

        let Some(fallback) = self.backends.iter().find(|b| b.id() != primary.id()) else {
            return Err(ProviderError::AllBackendsFailed { attempts });
        };

        match self.attempt(fallback.as_ref(), &input, prompt, &decode).await {
            Ok(value) => {
                tracing::info!(backend = %fallback.id(), "Fallback extraction succeeded");
                if forced.is_none() {
                    self.cache.store(fallback.id());
                }
                Ok(Extracted { value, backend: fallback.id() })
            }
            Err(error) => {
                tracing::error!(backend = %fallback.id(), error = %error, "Fallback extraction failed");
                attempts.push(FailedAttempt { backend: fallback.id(), error });
                Err(ProviderError::AllBackendsFailed { attempts })
            }
        }
    }

    /// One bounded call, including any text pre-extraction and decoding.
    async fn attempt<T, F>(
        &self,
        backend: &dyn ExtractionBackend,
        input: &ExtractionInput,
        prompt: &str,
        decode: &F,
    ) -> Result<T, BackendError>
    where
        F: Fn(&str) -> Result<T, MalformedResponse>,
    {
        let span = tracing::info_span!("extraction", backend = %backend.id());
        async {
            let prepared = self.prepare_input(backend, input).await?;
            let limit = backend.extraction_timeout();
            let raw = tokio::time::timeout(limit, backend.extract(&prepared, prompt))
                .await
                .map_err(|_| BackendError::Timeout {
                    backend: backend.id(),
                    secs: limit.as_secs(),
                })??;
            decode(&raw).map_err(BackendError::from)
        }
        .instrument(span)
        .await
    }

    /// Text-only backends get the PDF's text layer instead of its bytes.
    async fn prepare_input<'a>(
        &self,
        backend: &dyn ExtractionBackend,
        input: &'a ExtractionInput,
    ) -> Result<Cow<'a, ExtractionInput>, BackendError> {
        match input {
            ExtractionInput::Document { bytes, .. } if !backend.accepts_documents() => {
                let extractor = Arc::clone(&self.pdf_text);
                let bytes = bytes.clone();
                let text = tokio::task::spawn_blocking(move || extractor.extract_text(&bytes))
                    .await
                    .map_err(|e| BackendError::Preprocessing(e.to_string()))??;
                tracing::debug!(chars = text.len(), "Extracted PDF text for text-only backend");
                Ok(Cow::Owned(ExtractionInput::Text(text)))
            }
            _ => Ok(Cow::Borrowed(input)),
        }
    }
}
