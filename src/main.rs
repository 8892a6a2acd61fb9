mod api;
mod bubble;
mod config;
mod cooldown;
mod error;
mod fanout;
mod history;
mod lifecycle;
mod metrics;
mod seeder;
mod store;

use anyhow::Result;

use crate::cooldown::CooldownGuard;
use crate::fanout::Hub;
use crate::history::{HistoryLog, StatsCounters};
use crate::lifecycle::BubbleService;
use crate::seeder::SeedScheduler;
use crate::store::EphemeralStore;

#[cfg(feature = "jemalloc")]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging with filters
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting bubble map node...");

    // Initialize metrics
    metrics::init_metrics();
    tracing::info!("Metrics system initialized");

    // Load configuration
    let config = config::Config::load()?;
    tracing::info!(
        mode = ?config.bubble_config.coord_mode,
        ttl_secs = config.bubble_config.ttl.as_secs(),
        cooldown_secs = config.bubble_config.cooldown.as_secs(),
        "configuration loaded"
    );

    // Storage substrate; everything else hangs off this handle.
    tokio::fs::create_dir_all(&config.data_dir).await?;
    let store = EphemeralStore::open(&config.data_dir).await?;

    let guard = CooldownGuard::new(store.clone(), config.bubble_config.cooldown);
    let history = HistoryLog::new(&store, config.bubble_config.history_max_len)?;
    let counters = StatsCounters::new(store.clone());
    let service = BubbleService::new(
        store.clone(),
        guard,
        history,
        counters,
        config.bubble_config.clone(),
    );
    let hub = Hub::new(service, config.admin_password.clone());
    tracing::info!("Lifecycle manager and fanout hub initialized");

    // Background task: periodic TTL sweep complementing lazy expiry on read.
    let sweep_store = store.clone();
    let sweep_interval = config.bubble_config.sweep_interval;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_interval);
        interval.tick().await; // skip the immediate first tick
        loop {
            interval.tick().await;
            if let Err(e) = sweep_store.sweep_expired().await {
                tracing::warn!(error = %e, "expiry sweep failed");
            }
        }
    });

    // Background task: seed scheduler (initial fill + periodic top-ups).
    let seeder = SeedScheduler::new(hub.clone(), config.seed_config.clone());
    tokio::spawn(seeder.run());
    tracing::info!("Seed scheduler started");

    // Admin read surface
    let app = api::router(hub);
    let addr = format!("{}:{}", config.api_host, config.api_port);
    tracing::info!("Admin API listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
