//! Cooldown Guard
//!
//! Per-source rate limiting built on the Ephemeral Store: a cooldown marker
//! is itself a TTL-bounded key. Checking never arms; arming is a separate
//! call the lifecycle manager makes only after a fully successful real
//! submission, so rejected submissions do not consume the window.

use anyhow::Result;
use std::time::Duration;

use crate::store::EphemeralStore;

fn marker_key(source: &str) -> String {
    format!("cooldown:{}", source)
}

#[derive(Clone)]
pub struct CooldownGuard {
    store: EphemeralStore,
    window: Duration,
}

impl CooldownGuard {
    pub fn new(store: EphemeralStore, window: Duration) -> Self {
        Self { store, window }
    }

    /// Whole seconds left on a live marker (ceiling, at least 1), or None
    /// when the source is free to submit.
    pub async fn check(&self, source: &str) -> Result<Option<u64>> {
        let remaining = self.store.remaining_ttl(&marker_key(source)).await?;
        Ok(remaining.map(|d| (d.as_millis() as u64).div_ceil(1000).max(1)))
    }

    /// Arm a fresh marker for the full window.
    pub async fn arm(&self, source: &str) -> Result<()> {
        self.store
            .put_json(&marker_key(source), &1u8, Some(self.window))
            .await
    }
}
