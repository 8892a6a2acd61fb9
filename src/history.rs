//! Durable History Log + Aggregate Counters
//!
//! Every accepted bubble is mirrored into an append-only, bounded Sled tree
//! that outlives the bubble's map lifetime. Trimming to the retained bound
//! happens on every append, not as a scheduled job. Counters live in the
//! Ephemeral Store key space so the daily counter can ride on ordinary TTL
//! expiry instead of a midnight-rollover cleanup.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::bubble::Bubble;
use crate::metrics;
use crate::store::EphemeralStore;

const TOTAL_KEY: &str = "stats:total_messages";
const PEAK_KEY: &str = "stats:peak_users";
/// Daily counters linger two calendar days so midnight rollover needs no
/// explicit cleanup.
const DAILY_RETENTION: Duration = Duration::from_secs(48 * 3600);

pub struct HistoryLog {
    db: sled::Db,
    tree: sled::Tree,
    max_len: usize,
}

impl Clone for HistoryLog {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            tree: self.tree.clone(),
            max_len: self.max_len,
        }
    }
}

impl HistoryLog {
    pub fn new(store: &EphemeralStore, max_len: usize) -> Result<Self> {
        let db = store.db().clone();
        let tree = db.open_tree("history")?;
        Ok(Self { db, tree, max_len })
    }

    /// Append a bubble, then trim the tree back to the retained bound.
    pub async fn append(&self, bubble: &Bubble) -> Result<()> {
        let body = serde_json::to_vec(bubble)?;
        let db = self.db.clone();
        let tree = self.tree.clone();
        let max_len = self.max_len;

        let trimmed = tokio::task::spawn_blocking(move || {
            // Monotonic ids in big-endian keep Sled's key order equal to
            // insertion order.
            let id = db.generate_id()?;
            tree.insert(id.to_be_bytes(), body)?;

            let mut trimmed = 0u64;
            while tree.len() > max_len {
                if tree.pop_min()?.is_none() {
                    break;
                }
                trimmed += 1;
            }
            Ok::<_, anyhow::Error>(trimmed)
        })
        .await
        .map_err(|e| anyhow::anyhow!("Thread join error: {}", e))??;

        if trimmed > 0 {
            metrics::HISTORY_TRIMMED.inc_by(trimmed);
        }
        Ok(())
    }

    /// Full retained sequence in insertion order. Undecodable entries are
    /// dropped, never fatal to the read.
    pub async fn read_all(&self) -> Result<Vec<Bubble>> {
        let tree = self.tree.clone();

        let (bubbles, skipped) = tokio::task::spawn_blocking(move || {
            let mut bubbles = Vec::with_capacity(tree.len());
            let mut skipped = 0u64;
            for item in tree.iter() {
                let (_, v) = item?;
                match serde_json::from_slice::<Bubble>(&v) {
                    Ok(bubble) => bubbles.push(bubble),
                    Err(_) => skipped += 1,
                }
            }
            Ok::<_, anyhow::Error>((bubbles, skipped))
        })
        .await
        .map_err(|e| anyhow::anyhow!("Thread join error: {}", e))??;

        if skipped > 0 {
            metrics::MALFORMED_ENTRIES_SKIPPED.inc_by(skipped);
            tracing::warn!(skipped, "skipped malformed history entries");
        }
        Ok(bubbles)
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// `{lat, lng, name, time}` projection of the retained sequence.
    pub async fn heatmap(&self) -> Result<Vec<HeatPoint>> {
        let bubbles = self.read_all().await?;
        Ok(bubbles
            .into_iter()
            .map(|b| HeatPoint {
                lat: b.x,
                lng: b.y,
                name: b.name,
                time: b.created_at,
            })
            .collect())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeatPoint {
    pub lat: f64,
    pub lng: f64,
    pub name: String,
    pub time: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_all_time: i64,
    pub total_today: i64,
    pub peak_users: i64,
    pub active_users: usize,
    pub active_bubbles: usize,
}

/// Aggregate counters over the Ephemeral Store.
#[derive(Clone)]
pub struct StatsCounters {
    store: EphemeralStore,
}

impl StatsCounters {
    pub fn new(store: EphemeralStore) -> Self {
        Self { store }
    }

    fn today_key() -> String {
        // Wall-clock date, not request context.
        format!("stats:today:{}", chrono::Utc::now().format("%Y-%m-%d"))
    }

    /// Bump total-all-time and the current calendar-day counter.
    pub async fn record_message(&self) -> Result<()> {
        self.store.incr(TOTAL_KEY, None).await?;
        self.store
            .incr(&Self::today_key(), Some(DAILY_RETENTION))
            .await?;
        Ok(())
    }

    /// Persist a new concurrent-viewer peak candidate (monotonic).
    pub async fn record_peak(&self, active: usize) -> Result<i64> {
        self.store.record_max(PEAK_KEY, active as i64).await
    }

    pub async fn stats(&self, active_users: usize, active_bubbles: usize) -> Result<Stats> {
        Ok(Stats {
            total_all_time: self.store.get_counter(TOTAL_KEY).await?,
            total_today: self.store.get_counter(&Self::today_key()).await?,
            peak_users: self.store.get_counter(PEAK_KEY).await?,
            active_users,
            active_bubbles,
        })
    }
}
