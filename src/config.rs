use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::ai::BackendId;

/// Application-level constants
pub const APP_NAME: &str = "ImpactLens";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// ── Provider defaults ──

pub const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_CLAUDE_MODEL: &str = "claude-sonnet-4-5-20250929";
pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "mistral";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8787";

/// How long a healthy backend selection is reused without re-probing.
pub const SELECTION_TTL: Duration = Duration::from_secs(30);
/// Upper bound for a single backend health probe.
pub const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(2);
/// Per-call budget for the hosted backend.
pub const HOSTED_EXTRACTION_TIMEOUT: Duration = Duration::from_secs(60);
/// Per-call budget for local inference (CPU-bound, slow by construction).
pub const LOCAL_EXTRACTION_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Reject uploads larger than 10 MB before any backend call.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
/// The only document format accepted for extraction.
pub const ACCEPTED_DOCUMENT_TYPE: &str = "application/pdf";

/// Get the application data directory.
/// ~/ImpactLens/ unless `IMPACTLENS_DATA_DIR` points elsewhere.
pub fn app_data_dir() -> PathBuf {
    if let Some(dir) = non_empty_var("IMPACTLENS_DATA_DIR") {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_NAME)
}

/// Path of the session database inside the data directory.
pub fn database_path() -> PathBuf {
    app_data_dir().join("impactlens.db")
}

/// Default `tracing` filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    if cfg!(debug_assertions) {
        "info,impactlens=debug"
    } else {
        "info"
    }
}

/// Runtime configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Global backend override (`AI_PROVIDER`). `None` means automatic selection.
    pub provider_override: Option<BackendId>,
    pub anthropic_api_key: Option<String>,
    pub anthropic_base_url: String,
    pub claude_model: String,
    pub ollama_base_url: String,
    pub ollama_model: String,
    pub bind_addr: SocketAddr,
    pub database_path: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            provider_override: None,
            anthropic_api_key: None,
            anthropic_base_url: DEFAULT_ANTHROPIC_BASE_URL.to_string(),
            claude_model: DEFAULT_CLAUDE_MODEL.to_string(),
            ollama_base_url: DEFAULT_OLLAMA_BASE_URL.to_string(),
            ollama_model: DEFAULT_OLLAMA_MODEL.to_string(),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8787)),
            database_path: database_path(),
        }
    }
}

impl AppConfig {
    /// Build the configuration from environment variables, falling back
    /// to defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let provider_override = match non_empty_var("AI_PROVIDER") {
            Some(raw) if raw.eq_ignore_ascii_case("auto") => None,
            Some(raw) => match raw.parse::<BackendId>() {
                Ok(id) => Some(id),
                Err(_) => {
                    tracing::warn!(value = %raw, "Unknown AI_PROVIDER, using automatic selection");
                    None
                }
            },
            None => None,
        };

        let bind_addr = match non_empty_var("IMPACTLENS_BIND") {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!(value = %raw, "Invalid IMPACTLENS_BIND, using {DEFAULT_BIND_ADDR}");
                defaults.bind_addr
            }),
            None => defaults.bind_addr,
        };

        Self {
            provider_override,
            anthropic_api_key: non_empty_var("ANTHROPIC_API_KEY"),
            anthropic_base_url: non_empty_var("ANTHROPIC_BASE_URL")
                .unwrap_or(defaults.anthropic_base_url),
            claude_model: non_empty_var("CLAUDE_MODEL").unwrap_or(defaults.claude_model),
            ollama_base_url: non_empty_var("OLLAMA_BASE_URL").unwrap_or(defaults.ollama_base_url),
            ollama_model: non_empty_var("OLLAMA_MODEL").unwrap_or(defaults.ollama_model),
            bind_addr,
            database_path: defaults.database_path,
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_lives_in_app_data_dir() {
        let db = database_path();
        assert!(db.starts_with(app_data_dir()));
        assert!(db.ends_with("impactlens.db"));
    }

    #[test]
    fn app_name_is_impactlens() {
        assert_eq!(APP_NAME, "ImpactLens");
    }

    #[test]
    fn default_config_points_at_local_services() {
        let config = AppConfig::default();
        assert!(config.provider_override.is_none());
        assert!(config.anthropic_api_key.is_none());
        assert_eq!(config.ollama_base_url, "http://localhost:11434");
        assert_eq!(config.ollama_model, "mistral");
        assert_eq!(config.bind_addr.port(), 8787);
    }

    #[test]
    fn timeouts_are_ordered() {
        assert!(HEALTH_CHECK_TIMEOUT < HOSTED_EXTRACTION_TIMEOUT);
        assert!(HOSTED_EXTRACTION_TIMEOUT < LOCAL_EXTRACTION_TIMEOUT);
        assert!(LOCAL_EXTRACTION_TIMEOUT >= Duration::from_secs(900));
    }

    #[test]
    fn default_bind_addr_parses() {
        let addr: SocketAddr = DEFAULT_BIND_ADDR.parse().unwrap();
        assert_eq!(addr, AppConfig::default().bind_addr);
    }
}
