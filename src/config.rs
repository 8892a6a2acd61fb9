use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::bubble::CoordMode;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api_host: String,
    pub api_port: u16,
    pub data_dir: String,
    pub admin_password: String,
    pub bubble_config: BubbleConfig,
    pub seed_config: SeedConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BubbleConfig {
    /// Map lifetime of an accepted bubble.
    pub ttl: Duration,
    /// Minimum interval between accepted submissions from a single source.
    pub cooldown: Duration,
    /// Maximum message body length in characters (valid band 110-280).
    pub max_text_len: usize,
    /// Maximum display-name length in characters.
    pub max_name_len: usize,
    /// Active coordinate validation mode; exactly one per deployment.
    pub coord_mode: CoordMode,
    /// Retained length of the durable history log.
    pub history_max_len: usize,
    /// Interval of the background expiry sweep.
    pub sweep_interval: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedConfig {
    pub enabled: bool,
    /// Timer period between top-up checks.
    pub interval: Duration,
    /// Live-bubble count below which a top-up runs.
    pub low_water: usize,
    /// Batch size injected at process start when the map is sparse.
    pub initial_batch: usize,
    /// Top-up batch size band (inclusive).
    pub topup_min: usize,
    pub topup_max: usize,
    /// Randomized per-seed TTL band (inclusive), staggering batch expiry.
    pub ttl_min: Duration,
    pub ttl_max: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        let api_host = env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let api_port = env::var("API_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .unwrap_or(8080);

        let data_dir = env::var("DATA_DIR").unwrap_or_else(|_| "./data/bubblemap".to_string());

        let admin_password = env::var("ADMIN_PASSWORD").unwrap_or_else(|_| "letmein".to_string());

        let ttl_seconds: u64 = env::var("BUBBLE_TTL_SECONDS")
            .unwrap_or_else(|_| "120".to_string())
            .parse()
            .unwrap_or(120);

        let cooldown_seconds: u64 = env::var("COOLDOWN_SECONDS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .unwrap_or(30);

        // Observed deployments run between 110 and 280; clamp into that band.
        let max_text_len: usize = env::var("MAX_TEXT_LEN")
            .unwrap_or_else(|_| "140".to_string())
            .parse()
            .unwrap_or(140)
            .clamp(110, 280);

        let coord_mode = match env::var("COORD_MODE").as_deref() {
            Ok("canvas") => {
                let width: f64 = env::var("CANVAS_WIDTH")
                    .unwrap_or_else(|_| "1920".to_string())
                    .parse()
                    .unwrap_or(1920.0);
                let height: f64 = env::var("CANVAS_HEIGHT")
                    .unwrap_or_else(|_| "1080".to_string())
                    .parse()
                    .unwrap_or(1080.0);
                CoordMode::Canvas { width, height }
            }
            _ => CoordMode::Geographic,
        };

        let history_max_len: usize = env::var("HISTORY_MAX_LEN")
            .unwrap_or_else(|_| "10000".to_string())
            .parse()
            .unwrap_or(10_000);

        let sweep_seconds: u64 = env::var("SWEEP_INTERVAL_SECONDS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .unwrap_or(30);

        // Seeder configuration
        let seed_enabled = env::var("SEED_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse()
            .unwrap_or(true);

        let seed_interval_seconds: u64 = env::var("SEED_INTERVAL_SECONDS")
            .unwrap_or_else(|_| "180".to_string())
            .parse()
            .unwrap_or(180);

        let seed_low_water: usize = env::var("SEED_LOW_WATER")
            .unwrap_or_else(|_| "6".to_string())
            .parse()
            .unwrap_or(6);

        let seed_initial_batch: usize = env::var("SEED_INITIAL_BATCH")
            .unwrap_or_else(|_| "15".to_string())
            .parse()
            .unwrap_or(15);

        let seed_ttl_min: u64 = env::var("SEED_TTL_MIN_SECONDS")
            .unwrap_or_else(|_| "60".to_string())
            .parse()
            .unwrap_or(60);

        let seed_ttl_max: u64 = env::var("SEED_TTL_MAX_SECONDS")
            .unwrap_or_else(|_| "180".to_string())
            .parse()
            .unwrap_or(180)
            .max(seed_ttl_min);

        Ok(Self {
            api_host,
            api_port,
            data_dir,
            admin_password,
            bubble_config: BubbleConfig {
                ttl: Duration::from_secs(ttl_seconds),
                cooldown: Duration::from_secs(cooldown_seconds),
                max_text_len,
                max_name_len: 20,
                coord_mode,
                history_max_len,
                sweep_interval: Duration::from_secs(sweep_seconds),
            },
            seed_config: SeedConfig {
                enabled: seed_enabled,
                interval: Duration::from_secs(seed_interval_seconds),
                low_water: seed_low_water,
                initial_batch: seed_initial_batch,
                topup_min: 5,
                topup_max: 12,
                ttl_min: Duration::from_secs(seed_ttl_min),
                ttl_max: Duration::from_secs(seed_ttl_max),
            },
        })
    }
}

impl Default for BubbleConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(120),
            cooldown: Duration::from_secs(30),
            max_text_len: 140,
            max_name_len: 20,
            coord_mode: CoordMode::Geographic,
            history_max_len: 10_000,
            sweep_interval: Duration::from_secs(30),
        }
    }
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(180),
            low_water: 6,
            initial_batch: 15,
            topup_min: 5,
            topup_max: 12,
            ttl_min: Duration::from_secs(60),
            ttl_max: Duration::from_secs(180),
        }
    }
}
