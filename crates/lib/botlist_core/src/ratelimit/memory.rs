//! In-process counters for tests and single-node development.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

use super::{CounterStore, RateLimitError};

/// Counters held in a `DashMap`, expiring on the tokio clock.
#[derive(Default)]
pub struct MemoryCounterStore {
    counters: DashMap<String, (i64, Instant)>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn incr(&self, key: &str, window: Duration) -> Result<(i64, Duration), RateLimitError> {
        let now = Instant::now();
        let mut entry = self
            .counters
            .entry(key.to_string())
            .or_insert((0, now + window));
        if entry.1 <= now {
            *entry = (0, now + window);
        }
        entry.0 += 1;
        Ok((entry.0, entry.1.saturating_duration_since(now)))
    }

    async fn extend(&self, key: &str, by: Duration) -> Result<(), RateLimitError> {
        if let Some(mut entry) = self.counters.get_mut(key) {
            entry.1 += by;
        }
        Ok(())
    }
}
