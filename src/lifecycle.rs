//! Bubble Lifecycle Manager
//!
//! Validates, constructs, persists and retires bubbles, orchestrating the
//! ephemeral store, the cooldown guard and the history log. Validation
//! fails fast in a fixed order; after the primary store write succeeds, all
//! bookkeeping side effects are attempted independently and failures are
//! swallowed — user-visible delivery takes priority over analytics
//! durability.

use std::time::Duration;

use crate::bubble::{Bubble, BubbleInput, BubbleKind};
use crate::config::BubbleConfig;
use crate::cooldown::CooldownGuard;
use crate::error::SubmitError;
use crate::history::{HistoryLog, StatsCounters};
use crate::metrics::{self, Timer};
use crate::store::EphemeralStore;

const BUBBLE_PREFIX: &str = "bubble:";

/// Who is submitting, and with which map lifetime.
#[derive(Debug, Clone, Copy)]
pub enum Origin {
    /// A real viewer submission; standard TTL, cooldown enforced and armed.
    Viewer,
    /// Scheduler-injected content; cooldown bypassed, staggered TTL.
    Seed { ttl: Duration },
}

#[derive(Clone)]
pub struct BubbleService {
    store: EphemeralStore,
    guard: CooldownGuard,
    history: HistoryLog,
    counters: StatsCounters,
    config: BubbleConfig,
}

impl BubbleService {
    pub fn new(
        store: EphemeralStore,
        guard: CooldownGuard,
        history: HistoryLog,
        counters: StatsCounters,
        config: BubbleConfig,
    ) -> Self {
        Self {
            store,
            guard,
            history,
            counters,
            config,
        }
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    pub fn counters(&self) -> &StatsCounters {
        &self.counters
    }

    pub fn config(&self) -> &BubbleConfig {
        &self.config
    }

    /// Validate a candidate and, on success, put it live. Returns the
    /// constructed bubble with `remaining_ms` populated from its TTL.
    pub async fn submit(
        &self,
        input: &BubbleInput,
        source: &str,
        origin: Origin,
    ) -> Result<Bubble, SubmitError> {
        let timer = Timer::new();

        // 1. Required fields present.
        let (name, text, x, y) = match (&input.name, &input.text, input.x, input.y) {
            (Some(name), Some(text), Some(x), Some(y)) => (name, text, x, y),
            _ => {
                metrics::SUBMISSIONS_REJECTED
                    .with_label_values(&["missing_fields"])
                    .inc();
                return Err(SubmitError::MissingFields);
            }
        };

        // 2. Cooldown, real submissions only. The guard never arms on read.
        if matches!(origin, Origin::Viewer) {
            match self.guard.check(source).await {
                Ok(Some(remaining_seconds)) => {
                    metrics::SUBMISSIONS_REJECTED
                        .with_label_values(&["cooldown"])
                        .inc();
                    return Err(SubmitError::OnCooldown { remaining_seconds });
                }
                Ok(None) => {}
                Err(e) => {
                    // A failed guard read must not block the map; log and
                    // let the submission through.
                    tracing::warn!(source = %source, error = %e, "cooldown check failed");
                }
            }
        }

        // 3. Coordinate bounds for the active mode.
        if !self.config.coord_mode.contains(x, y) {
            metrics::SUBMISSIONS_REJECTED
                .with_label_values(&["invalid_coordinates"])
                .inc();
            return Err(SubmitError::InvalidCoordinates);
        }

        let (is_seed, ttl) = match origin {
            Origin::Viewer => (false, self.config.ttl),
            Origin::Seed { ttl } => (true, ttl),
        };

        let mut bubble = Bubble::build(
            source,
            name,
            text,
            x,
            y,
            input.kind.unwrap_or(BubbleKind::Speech),
            self.config.max_name_len,
            self.config.max_text_len,
            is_seed,
        );

        // Primary write: the only step whose failure stops the submission.
        let key = format!("{}{}", BUBBLE_PREFIX, bubble.id);
        if let Err(e) = self.store.put_json(&key, &bubble, Some(ttl)).await {
            tracing::error!(key = %key, error = %e, "bubble write failed");
            return Err(SubmitError::Storage(e.to_string()));
        }

        // Best-effort bookkeeping, each attempted regardless of the others.
        if !is_seed {
            if let Err(e) = self.guard.arm(source).await {
                metrics::SIDE_EFFECT_FAILURES.inc();
                tracing::warn!(source = %source, error = %e, "cooldown arm failed");
            }
        }
        if let Err(e) = self.history.append(&bubble).await {
            metrics::SIDE_EFFECT_FAILURES.inc();
            tracing::warn!(id = %bubble.id, error = %e, "history append failed");
        }
        if let Err(e) = self.counters.record_message().await {
            metrics::SIDE_EFFECT_FAILURES.inc();
            tracing::warn!(id = %bubble.id, error = %e, "counter increment failed");
        }

        bubble.remaining_ms = ttl.as_millis() as u64;
        metrics::BUBBLES_CREATED
            .with_label_values(&[if is_seed { "seed" } else { "viewer" }])
            .inc();
        timer.observe_duration_seconds(&metrics::SUBMIT_LATENCY);
        tracing::debug!(id = %bubble.id, seed = is_seed, "bubble live");
        Ok(bubble)
    }

    /// All currently live bubbles with freshly computed `remaining_ms`.
    /// A bubble expiring between enumeration and read is skipped, not an
    /// error.
    pub async fn live_bubbles(&self) -> anyhow::Result<Vec<Bubble>> {
        let keys = self.store.keys_with_prefix(BUBBLE_PREFIX).await?;
        let mut bubbles = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(mut bubble) = self.store.get_json::<Bubble>(&key).await? else {
                continue;
            };
            let Some(remaining) = self.store.remaining_ttl(&key).await? else {
                continue;
            };
            bubble.remaining_ms = remaining.as_millis() as u64;
            bubbles.push(bubble);
        }
        Ok(bubbles)
    }

    pub async fn live_count(&self) -> anyhow::Result<usize> {
        Ok(self.store.keys_with_prefix(BUBBLE_PREFIX).await?.len())
    }
}
