//! Ephemeral Store
//!
//! Key/value storage with per-entry time-to-live on top of Sled. Entries
//! carry an expiry envelope; expiry is enforced lazily on read plus a
//! periodic sweep, so callers never issue deletes in the normal lifecycle.
//!
//! ## Components
//! - Core storage: Sled tree with bincode-encoded envelopes
//! - Concurrency: Sled calls offloaded to the blocking thread pool
//! - Metrics: Prometheus counters and latency histograms

use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::metrics::{self, Timer};

/// On-disk record: a JSON payload plus TTL bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Envelope {
    body: String,
    /// Creation timestamp (Unix millis)
    created_at: i64,
    /// Absolute expiration timestamp (Unix millis); None = no expiry
    expires_at: Option<i64>,
}

impl Envelope {
    fn new(body: String, ttl: Option<Duration>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            body,
            created_at: now,
            expires_at: ttl.map(|t| now + t.as_millis() as i64),
        }
    }

    fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(at) => chrono::Utc::now().timestamp_millis() > at,
            None => false,
        }
    }

    /// Remaining lifetime; None if no expiry is set or already expired.
    fn remaining(&self) -> Option<Duration> {
        let at = self.expires_at?;
        let now = chrono::Utc::now().timestamp_millis();
        if now < at {
            Some(Duration::from_millis((at - now) as u64))
        } else {
            None
        }
    }
}

pub struct EphemeralStore {
    db: sled::Db,
    tree: sled::Tree,
}

impl Clone for EphemeralStore {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            tree: self.tree.clone(),
        }
    }
}

impl EphemeralStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let db = tokio::task::spawn_blocking(move || {
            sled::Config::new()
                .path(&path)
                // Batch writes for throughput (flush every 1 second)
                .flush_every_ms(Some(1000))
                .mode(sled::Mode::HighThroughput)
                .use_compression(true)
                .open()
        })
        .await
        .map_err(|e| anyhow::anyhow!("Thread join error: {}", e))??;

        let tree = db.open_tree("ephemeral_kv")?;
        tracing::info!("EphemeralStore opened (flush=1s, mode=HighThroughput, compression=enabled)");

        Ok(Self { db, tree })
    }

    /// Shared Sled handle, used by the history log for its own tree.
    pub fn db(&self) -> &sled::Db {
        &self.db
    }

    /// Store a JSON-serializable value, visible for exactly `ttl` from now
    /// (forever when `ttl` is None).
    pub async fn put_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let timer = Timer::new();
        let body = serde_json::to_string(value)?;
        let envelope = Envelope::new(body, ttl);
        let bytes = bincode::serialize(&envelope)?;

        let tree = self.tree.clone();
        let key_owned = key.to_string();
        tokio::task::spawn_blocking(move || {
            tree.insert(key_owned.as_bytes(), bytes)?;
            Ok::<_, anyhow::Error>(())
        })
        .await
        .map_err(|e| anyhow::anyhow!("Thread join error: {}", e))??;

        timer.observe_duration_seconds(&metrics::WRITE_LATENCY);
        metrics::STORE_WRITES.inc();
        tracing::debug!(key = %key, "stored key");
        Ok(())
    }

    /// Read a value back. Expired entries are removed on read and reported
    /// absent; undecodable payloads are dropped, not fatal.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let timer = Timer::new();
        let envelope = self.read_live_envelope(key).await?;
        timer.observe_duration_seconds(&metrics::READ_LATENCY);
        metrics::STORE_READS.inc();

        let envelope = match envelope {
            Some(e) => e,
            None => return Ok(None),
        };

        match serde_json::from_str(&envelope.body) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                metrics::MALFORMED_ENTRIES_SKIPPED.inc();
                tracing::warn!(key = %key, error = %e, "skipping malformed stored entry");
                Ok(None)
            }
        }
    }

    /// Seconds-resolution wrapper is deliberately avoided: callers compute
    /// `remaining_ms` themselves from the returned Duration.
    pub async fn remaining_ttl(&self, key: &str) -> Result<Option<Duration>> {
        let envelope = self.read_live_envelope(key).await?;
        Ok(envelope.and_then(|e| e.remaining()))
    }

    /// Enumerate live keys sharing a prefix. Entries found expired during
    /// the scan are removed as a side effect.
    pub async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let tree = self.tree.clone();
        let prefix_owned = prefix.to_string();

        let (live, expired) = tokio::task::spawn_blocking(move || {
            let mut live = Vec::new();
            let mut expired = Vec::new();
            for item in tree.scan_prefix(prefix_owned.as_bytes()) {
                let (k, v) = item?;
                let key = String::from_utf8(k.to_vec())?;
                match bincode::deserialize::<Envelope>(&v) {
                    Ok(env) if env.is_expired() => expired.push(key),
                    Ok(_) => live.push(key),
                    Err(_) => expired.push(key),
                }
            }
            for key in &expired {
                tree.remove(key.as_bytes())?;
            }
            Ok::<_, anyhow::Error>((live, expired))
        })
        .await
        .map_err(|e| anyhow::anyhow!("Thread join error: {}", e))??;

        if !expired.is_empty() {
            metrics::TTL_KEYS_EXPIRED.inc_by(expired.len() as u64);
        }
        Ok(live)
    }

    /// Atomically increment a decimal counter, creating it with
    /// `ttl_on_create` when absent or previously expired. Returns the new
    /// value. Corrupt counter bytes restart at 1.
    pub async fn incr(&self, key: &str, ttl_on_create: Option<Duration>) -> Result<i64> {
        let tree = self.tree.clone();
        let key_owned = key.to_string();

        let bytes = tokio::task::spawn_blocking(move || {
            tree.update_and_fetch(key_owned.as_bytes(), |old| {
                let next = match old.and_then(|b| bincode::deserialize::<Envelope>(b).ok()) {
                    Some(env) if !env.is_expired() => {
                        let current: i64 = env.body.parse().unwrap_or(0);
                        Envelope {
                            body: (current + 1).to_string(),
                            ..env
                        }
                    }
                    _ => Envelope::new("1".to_string(), ttl_on_create),
                };
                // Serialization of a plain struct cannot fail here.
                bincode::serialize(&next).ok()
            })
        })
        .await
        .map_err(|e| anyhow::anyhow!("Thread join error: {}", e))??;

        metrics::STORE_WRITES.inc();
        let value = bytes
            .and_then(|b| bincode::deserialize::<Envelope>(&b).ok())
            .and_then(|env| env.body.parse().ok())
            .unwrap_or(0);
        Ok(value)
    }

    /// Monotonic max counter (never decreases). Returns the stored value
    /// after the update.
    pub async fn record_max(&self, key: &str, candidate: i64) -> Result<i64> {
        let tree = self.tree.clone();
        let key_owned = key.to_string();

        let bytes = tokio::task::spawn_blocking(move || {
            tree.update_and_fetch(key_owned.as_bytes(), |old| {
                let current = old
                    .and_then(|b| bincode::deserialize::<Envelope>(b).ok())
                    .and_then(|env| env.body.parse::<i64>().ok())
                    .unwrap_or(0);
                let next = Envelope::new(current.max(candidate).to_string(), None);
                bincode::serialize(&next).ok()
            })
        })
        .await
        .map_err(|e| anyhow::anyhow!("Thread join error: {}", e))??;

        let value = bytes
            .and_then(|b| bincode::deserialize::<Envelope>(&b).ok())
            .and_then(|env| env.body.parse().ok())
            .unwrap_or(candidate);
        Ok(value)
    }

    /// Counter read; absent, expired or corrupt reads as 0.
    pub async fn get_counter(&self, key: &str) -> Result<i64> {
        let envelope = self.read_live_envelope(key).await?;
        Ok(envelope
            .and_then(|env| env.body.parse().ok())
            .unwrap_or(0))
    }

    /// Remove every expired entry. Spawned on an interval from `main`;
    /// complements the lazy removal done on reads.
    pub async fn sweep_expired(&self) -> Result<usize> {
        let tree = self.tree.clone();

        let removed = tokio::task::spawn_blocking(move || {
            let mut expired = Vec::new();
            for item in tree.iter() {
                let (k, v) = item?;
                let gone = match bincode::deserialize::<Envelope>(&v) {
                    Ok(env) => env.is_expired(),
                    // Unreadable record: sweep it rather than carry it forever.
                    Err(_) => true,
                };
                if gone {
                    expired.push(k);
                }
            }
            for key in &expired {
                tree.remove(key)?;
            }
            Ok::<_, anyhow::Error>(expired.len())
        })
        .await
        .map_err(|e| anyhow::anyhow!("Thread join error: {}", e))??;

        if removed > 0 {
            metrics::TTL_KEYS_EXPIRED.inc_by(removed as u64);
            tracing::debug!(removed, "expiry sweep removed entries");
        }
        Ok(removed)
    }

    /// Fetch the envelope for a key, deleting it if its TTL has elapsed.
    async fn read_live_envelope(&self, key: &str) -> Result<Option<Envelope>> {
        let tree = self.tree.clone();
        let key_owned = key.to_string();

        tokio::task::spawn_blocking(move || {
            let raw = match tree.get(key_owned.as_bytes())? {
                Some(v) => v,
                None => return Ok(None),
            };
            let envelope = match bincode::deserialize::<Envelope>(&raw) {
                Ok(env) => env,
                Err(_) => {
                    tree.remove(key_owned.as_bytes())?;
                    metrics::MALFORMED_ENTRIES_SKIPPED.inc();
                    return Ok(None);
                }
            };
            if envelope.is_expired() {
                // Best-effort cleanup; the key is gone either way.
                tree.remove(key_owned.as_bytes())?;
                metrics::TTL_KEYS_EXPIRED.inc();
                return Ok(None);
            }
            Ok::<_, anyhow::Error>(Some(envelope))
        })
        .await
        .map_err(|e| anyhow::anyhow!("Thread join error: {}", e))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_remaining() {
        let env = Envelope::new("x".to_string(), Some(Duration::from_secs(60)));
        assert!(!env.is_expired());
        let remaining = env.remaining().unwrap();
        assert!(remaining <= Duration::from_secs(60));
        assert!(remaining > Duration::from_secs(58));
    }

    #[test]
    fn test_envelope_no_ttl_never_expires() {
        let env = Envelope::new("x".to_string(), None);
        assert!(!env.is_expired());
        assert_eq!(env.remaining(), None);
    }

    #[test]
    fn test_envelope_expired_in_the_past() {
        let mut env = Envelope::new("x".to_string(), Some(Duration::from_secs(1)));
        env.expires_at = Some(chrono::Utc::now().timestamp_millis() - 10);
        assert!(env.is_expired());
        assert_eq!(env.remaining(), None);
    }
}
