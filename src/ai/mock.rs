//! Scripted backend for tests and offline demos.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::types::{BackendHealth, ExtractionBackend, ExtractionInput};
use super::{BackendError, BackendId};

/// Mock backend with configurable availability, replies and latency.
pub struct MockBackend {
    id: BackendId,
    available: AtomicBool,
    /// Served first, one per call.
    scripted: Mutex<VecDeque<Result<String, String>>>,
    /// Served once the script runs out.
    default_reply: Result<String, String>,
    delay: Option<Duration>,
    timeout: Duration,
    probe_count: AtomicU32,
    call_count: AtomicU32,
    last_input: Mutex<Option<ExtractionInput>>,
}

impl MockBackend {
    pub fn new(id: BackendId) -> Self {
        Self {
            id,
            available: AtomicBool::new(true),
            scripted: Mutex::new(VecDeque::new()),
            default_reply: Ok("{}".to_string()),
            delay: None,
            timeout: Duration::from_secs(5),
            probe_count: AtomicU32::new(0),
            call_count: AtomicU32::new(0),
            last_input: Mutex::new(None),
        }
    }

    /// Reply with `content` on every call.
    pub fn with_response(mut self, content: impl Into<String>) -> Self {
        self.default_reply = Ok(content.into());
        self
    }

    /// Fail every call with `message`.
    pub fn with_failure(mut self, message: impl Into<String>) -> Self {
        self.default_reply = Err(message.into());
        self
    }

    /// Queue one reply ahead of the default.
    pub fn then_reply(self, content: impl Into<String>) -> Self {
        self.push(Ok(content.into()));
        self
    }

    /// Queue one failure ahead of the default.
    pub fn then_fail(self, message: impl Into<String>) -> Self {
        self.push(Err(message.into()));
        self
    }

    pub fn with_available(self, available: bool) -> Self {
        self.available.store(available, Ordering::SeqCst);
        self
    }

    /// Sleep before every reply.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of health probes received.
    pub fn probe_count(&self) -> u32 {
        self.probe_count.load(Ordering::SeqCst)
    }

    /// Number of extract calls received.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn last_input(&self) -> Option<ExtractionInput> {
        self.last_input.lock().ok().and_then(|g| g.clone())
    }

    fn push(&self, reply: Result<String, String>) {
        if let Ok(mut queue) = self.scripted.lock() {
            queue.push_back(reply);
        }
    }

    fn next_reply(&self) -> Result<String, String> {
        self.scripted
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front())
            .unwrap_or_else(|| self.default_reply.clone())
    }
}

#[async_trait]
impl ExtractionBackend for MockBackend {
    fn id(&self) -> BackendId {
        self.id
    }

    fn accepts_documents(&self) -> bool {
        self.id == BackendId::Claude
    }

    fn extraction_timeout(&self) -> Duration {
        self.timeout
    }

    async fn health_check(&self) -> BackendHealth {
        self.probe_count.fetch_add(1, Ordering::SeqCst);
        if self.available.load(Ordering::SeqCst) {
            BackendHealth::up(1, format!("mock-{}", self.id))
        } else {
            BackendHealth::down(1, "mock backend disabled")
        }
    }

    async fn extract(
        &self,
        input: &ExtractionInput,
        _instructions: &str,
    ) -> Result<String, BackendError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_input.lock() {
            *last = Some(input.clone());
        }
        if input.is_document() && !self.accepts_documents() {
            return Err(BackendError::UnsupportedInput { backend: self.id });
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.next_reply().map_err(|message| BackendError::Http {
            backend: self.id,
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_replies_precede_default() {
        let backend = MockBackend::new(BackendId::Claude)
            .with_response("default")
            .then_fail("first");
        let input = ExtractionInput::Text("x".into());

        assert!(backend.extract(&input, "p").await.is_err());
        assert_eq!(backend.extract(&input, "p").await.unwrap(), "default");
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn availability_is_reported_by_probe() {
        let backend = MockBackend::new(BackendId::Ollama).with_available(false);
        assert!(!backend.health_check().await.available);
        backend.set_available(true);
        assert!(backend.health_check().await.available);
        assert_eq!(backend.probe_count(), 2);
    }

    #[tokio::test]
    async fn text_only_mock_rejects_documents() {
        let backend = MockBackend::new(BackendId::Ollama);
        let err = backend.extract(&ExtractionInput::pdf(vec![0]), "p").await.unwrap_err();
        assert!(matches!(err, BackendError::UnsupportedInput { .. }));
    }
}
