//! Shared application state behind the HTTP surface.
//!
//! `CoreState` owns the provider orchestrator, the pipeline runner and
//! the session store. The store sits behind a tokio `Mutex` so extraction
//! runs can release it across backend calls. Every successful mutation
//! made through the API is followed by `persist()`.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;

use crate::ai::{BackendError, ProviderOrchestrator};
use crate::config::AppConfig;
use crate::db::{self, DatabaseError};
use crate::pipeline::{cancel_channel, ExtractionService, PipelineRunner, PipelineStore};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("Provider setup failed: {0}")]
    Provider(#[from] BackendError),
    #[error("Background task failed: {0}")]
    Task(String),
    #[error("Internal lock poisoned")]
    LockPoisoned,
    #[error("A report batch is already running")]
    BatchRunning,
}

// ═══════════════════════════════════════════════════════════
// CoreState
// ═══════════════════════════════════════════════════════════

pub struct CoreState {
    orchestrator: Arc<ProviderOrchestrator>,
    runner: PipelineRunner,
    store: tokio::sync::Mutex<PipelineStore>,
    /// `None` keeps the session in memory only (tests).
    db_path: Option<PathBuf>,
    /// Serializes snapshot writes so a slower save never lands last.
    persist_lock: tokio::sync::Mutex<()>,
    /// Cancel signal of the running report batch, if any.
    batch_cancel: Mutex<Option<watch::Sender<bool>>>,
}

impl CoreState {
    pub fn new(
        orchestrator: Arc<ProviderOrchestrator>,
        store: PipelineStore,
        db_path: Option<PathBuf>,
    ) -> Self {
        let runner = PipelineRunner::new(ExtractionService::new(orchestrator.clone()));
        Self {
            orchestrator,
            runner,
            store: tokio::sync::Mutex::new(store),
            db_path,
            persist_lock: tokio::sync::Mutex::new(()),
            batch_cancel: Mutex::new(None),
        }
    }

    /// Build from configuration, restoring the last saved session.
    pub async fn from_config(config: &AppConfig) -> Result<Self, CoreError> {
        let orchestrator = Arc::new(ProviderOrchestrator::from_config(config)?);
        let path = config.database_path.clone();

        let snapshot = {
            let path = path.clone();
            tokio::task::spawn_blocking(move || -> Result<_, DatabaseError> {
                let conn = db::open_database(&path)?;
                db::load_snapshot(&conn)
            })
            .await
            .map_err(|e| CoreError::Task(e.to_string()))??
        };

        let store = match snapshot {
            Some(snapshot) => {
                tracing::info!(
                    assessments = snapshot.assessments.len(),
                    path = %path.display(),
                    "Session restored"
                );
                PipelineStore::from_snapshot(snapshot)
            }
            None => {
                tracing::info!(path = %path.display(), "No saved session, starting empty");
                PipelineStore::new()
            }
        };

        Ok(Self::new(orchestrator, store, Some(path)))
    }

    pub fn orchestrator(&self) -> &ProviderOrchestrator {
        &self.orchestrator
    }

    pub fn runner(&self) -> &PipelineRunner {
        &self.runner
    }

    pub fn store(&self) -> &tokio::sync::Mutex<PipelineStore> {
        &self.store
    }

    /// Write the current session snapshot. No-op without a database path.
    pub async fn persist(&self) -> Result<(), CoreError> {
        let Some(path) = self.db_path.clone() else {
            return Ok(());
        };

        let _guard = self.persist_lock.lock().await;
        let snapshot = self.store.lock().await.snapshot();

        tokio::task::spawn_blocking(move || -> Result<(), DatabaseError> {
            let mut conn = db::open_database(&path)?;
            db::save_snapshot(&mut conn, &snapshot)?;
            Ok(())
        })
        .await
        .map_err(|e| CoreError::Task(e.to_string()))??;

        Ok(())
    }

    // ── Report batch cancellation ──

    /// Register a new batch. Only one batch runs at a time.
    pub fn begin_batch(&self) -> Result<watch::Receiver<bool>, CoreError> {
        let mut slot = self.batch_cancel.lock().map_err(|_| CoreError::LockPoisoned)?;
        if slot.is_some() {
            return Err(CoreError::BatchRunning);
        }
        let (tx, rx) = cancel_channel();
        *slot = Some(tx);
        Ok(rx)
    }

    pub fn end_batch(&self) {
        if let Ok(mut slot) = self.batch_cancel.lock() {
            slot.take();
        }
    }

    /// Signal the running batch to stop. Returns false when none is running.
    pub fn cancel_batch(&self) -> Result<bool, CoreError> {
        let slot = self.batch_cancel.lock().map_err(|_| CoreError::LockPoisoned)?;
        match slot.as_ref() {
            Some(tx) => {
                tracing::info!("Report batch cancellation requested");
                Ok(tx.send(true).is_ok())
            }
            None => Ok(false),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[tokio::test]
    async fn persist_without_path_is_noop() {
        let core = offline_core();
        core.store().lock().await.create_assessment("A", None).unwrap();
        assert!(core.persist().await.is_ok());
    }

    #[tokio::test]
    async fn persist_writes_snapshot_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("impactlens.db");
        let base = offline_core();
        let core = CoreState::new(base.orchestrator.clone(), PipelineStore::new(), Some(path.clone()));

        let id = core
            .store()
            .lock()
            .await
            .create_assessment("Skills", Some("Acme".into()))
            .unwrap();
        core.persist().await.unwrap();

        let conn = db::open_database(&path).unwrap();
        let snapshot = db::load_snapshot(&conn).unwrap().unwrap();
        assert_eq!(snapshot.active_assessment_id, Some(id));
        assert_eq!(snapshot.assessments[0].name, "Skills");
    }

    #[tokio::test]
    async fn from_config_restores_saved_session() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            database_path: dir.path().join("impactlens.db"),
            ..AppConfig::default()
        };

        let first = CoreState::from_config(&config).await.unwrap();
        first.store().lock().await.create_assessment("Restored", None).unwrap();
        first.persist().await.unwrap();

        let second = CoreState::from_config(&config).await.unwrap();
        let store = second.store().lock().await;
        assert_eq!(store.assessments().len(), 1);
        assert_eq!(store.active().unwrap().name, "Restored");
    }

    #[test]
    fn only_one_batch_at_a_time() {
        let core = offline_core();
        let rx = core.begin_batch().unwrap();
        assert!(matches!(core.begin_batch(), Err(CoreError::BatchRunning)));

        assert!(core.cancel_batch().unwrap());
        assert!(*rx.borrow());

        core.end_batch();
        assert!(!core.cancel_batch().unwrap());
        assert!(core.begin_batch().is_ok());
    }
}
