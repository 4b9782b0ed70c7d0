use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::BackendId;

/// Monotonic time source, injectable for tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = *self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        self.origin + offset
    }
}

#[derive(Debug, Clone, Copy)]
struct CachedSelection {
    backend: BackendId,
    checked_at: Instant,
}

/// Last known-good backend with its timestamp. Single entry,
/// last write wins; a stale read only costs one extra probe.
pub struct SelectionCache {
    entry: Mutex<Option<CachedSelection>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl SelectionCache {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entry: Mutex::new(None),
            ttl,
            clock,
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<CachedSelection>> {
        // The entry is a plain value; a panic elsewhere cannot leave it torn.
        self.entry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The cached backend if it is younger than the TTL.
    pub fn fresh(&self) -> Option<BackendId> {
        let now = self.clock.now();
        let entry = *self.slot();
        entry
            .filter(|c| now.saturating_duration_since(c.checked_at) < self.ttl)
            .map(|c| c.backend)
    }

    pub fn store(&self, backend: BackendId) {
        *self.slot() = Some(CachedSelection {
            backend,
            checked_at: self.clock.now(),
        });
    }

    /// Drop the entry only if it points at `backend`.
    pub fn invalidate(&self, backend: BackendId) {
        let mut slot = self.slot();
        if matches!(*slot, Some(c) if c.backend == backend) {
            *slot = None;
        }
    }

    pub fn clear(&self) {
        *self.slot() = None;
    }
}
