pub mod claude;
pub mod mock;
pub mod ollama;
pub mod orchestrator;
pub mod parser;
pub mod pdf_text;
pub mod prompt;
pub mod selection;
pub mod types;

pub use claude::*;
pub use ollama::*;
pub use orchestrator::*;
pub use parser::*;
pub use pdf_text::*;
pub use prompt::*;
pub use selection::*;
pub use types::*;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier of one interchangeable extraction backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendId {
    /// Hosted Anthropic Messages API. Accepts PDF bytes directly.
    Claude,
    /// Locally hosted Ollama model. Text only.
    Ollama,
}

impl BackendId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Ollama => "ollama",
        }
    }
}

impl std::fmt::Display for BackendId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BackendId {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "claude" => Ok(Self::Claude),
            "ollama" => Ok(Self::Ollama),
            other => Err(ProviderError::UnknownBackend(other.to_string())),
        }
    }
}

/// Failure of a single backend call. Recoverable through failover.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("{backend} is not reachable at {url}")]
    Connection { backend: BackendId, url: String },

    #[error("{backend} timed out after {secs}s")]
    Timeout { backend: BackendId, secs: u64 },

    #[error("{backend} returned error (status {status}): {body}")]
    Status {
        backend: BackendId,
        status: u16,
        body: String,
    },

    #[error("{backend} HTTP client error: {message}")]
    Http { backend: BackendId, message: String },

    #[error("{backend} returned an empty reply")]
    EmptyReply { backend: BackendId },

    #[error("{backend} is not configured: {reason}")]
    Unconfigured { backend: BackendId, reason: String },

    #[error("{backend} only accepts plain text input")]
    UnsupportedInput { backend: BackendId },

    #[error("Document text extraction failed: {0}")]
    Preprocessing(String),

    #[error(transparent)]
    Malformed(#[from] MalformedResponse),
}

impl BackendError {
    /// Map a reqwest failure onto the backend taxonomy.
    pub(crate) fn from_reqwest(backend: BackendId, url: &str, err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_connect() {
            BackendError::Connection {
                backend,
                url: url.to_string(),
            }
        } else if err.is_timeout() {
            BackendError::Timeout {
                backend,
                secs: timeout_secs,
            }
        } else {
            BackendError::Http {
                backend,
                message: err.to_string(),
            }
        }
    }
}

/// One failed attempt inside a failover sequence.
#[derive(Debug)]
pub struct FailedAttempt {
    pub backend: BackendId,
    pub error: BackendError,
}

impl std::fmt::Display for FailedAttempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.backend, self.error)
    }
}

/// Terminal failure for one extraction request.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("No AI provider available. Set ANTHROPIC_API_KEY or start Ollama.")]
    NoBackendAvailable,

    #[error("AI extraction failed with both providers. Please try again or enter data manually.")]
    AllBackendsFailed { attempts: Vec<FailedAttempt> },

    #[error("Unknown AI provider: {0}")]
    UnknownBackend(String),
}

impl ProviderError {
    /// Human-readable detail of every underlying failure.
    pub fn detail(&self) -> String {
        match self {
            ProviderError::AllBackendsFailed { attempts } => attempts
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; "),
            other => other.to_string(),
        }
    }
}
