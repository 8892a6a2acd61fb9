use bubblemap_node::seeder::SeedScheduler;
use bubblemap_node::{
    BubbleConfig, BubbleService, CooldownGuard, EphemeralStore, HistoryLog, Hub, SeedConfig,
    ServerEvent, StatsCounters,
};
use serial_test::serial;
use std::sync::Arc;
use tempfile::TempDir;

async fn create_test_hub() -> (Arc<Hub>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let store = EphemeralStore::open(temp_dir.path()).await.unwrap();
    let config = BubbleConfig::default();
    let guard = CooldownGuard::new(store.clone(), config.cooldown);
    let history = HistoryLog::new(&store, config.history_max_len).unwrap();
    let counters = StatsCounters::new(store.clone());
    let service = BubbleService::new(store, guard, history, counters, config);
    (Hub::new(service, "pw".to_string()), temp_dir)
}

#[tokio::test]
#[serial]
async fn test_inject_batch_goes_live_and_broadcasts() {
    let (hub, _dir) = create_test_hub().await;

    let mut rx = hub.connect("v1").await;
    while rx.try_recv().is_ok() {}

    let seeder = SeedScheduler::new(hub.clone(), SeedConfig::default());
    let injected = seeder.inject_batch(5).await;
    assert_eq!(injected, 5);

    assert_eq!(hub.service().live_count().await.unwrap(), 5);

    // Seeds are broadcast through the normal path.
    let mut seen = 0;
    while let Ok(event) = rx.try_recv() {
        if let ServerEvent::BubbleNew(bubble) = event {
            assert!(bubble.id.starts_with("seed-"));
            assert!(bubble.remaining_ms > 0);
            seen += 1;
        }
    }
    assert_eq!(seen, 5);

    // And mirrored into history like any other bubble.
    assert_eq!(hub.service().history().read_all().await.unwrap().len(), 5);
}

#[tokio::test]
#[serial]
async fn test_topup_never_runs_when_map_is_populated() {
    let (hub, _dir) = create_test_hub().await;

    let config = SeedConfig {
        low_water: 3,
        ..SeedConfig::default()
    };
    let seeder = SeedScheduler::new(hub.clone(), config);

    seeder.inject_batch(3).await;
    assert_eq!(hub.service().live_count().await.unwrap(), 3);

    // At the low-water mark: no further injection.
    assert_eq!(seeder.topup_if_sparse().await, 0);
    assert_eq!(hub.service().live_count().await.unwrap(), 3);
}

#[tokio::test]
#[serial]
async fn test_topup_restores_count_above_low_water() {
    let (hub, _dir) = create_test_hub().await;

    let config = SeedConfig {
        low_water: 6,
        ..SeedConfig::default()
    };
    let seeder = SeedScheduler::new(hub.clone(), config);

    assert_eq!(hub.service().live_count().await.unwrap(), 0);
    let injected = seeder.topup_if_sparse().await;
    assert!(injected >= 6);
    assert!(hub.service().live_count().await.unwrap() >= 6);
}

#[tokio::test]
#[serial]
async fn test_seed_ttls_are_staggered_within_band() {
    let (hub, _dir) = create_test_hub().await;

    let config = SeedConfig::default();
    let ttl_min = config.ttl_min.as_millis() as u64;
    let ttl_max = config.ttl_max.as_millis() as u64;
    let seeder = SeedScheduler::new(hub.clone(), config);

    seeder.inject_batch(8).await;

    for bubble in hub.service().live_bubbles().await.unwrap() {
        // remaining_ms was just computed, so allow a little read latency.
        assert!(bubble.remaining_ms <= ttl_max);
        assert!(bubble.remaining_ms + 1000 >= ttl_min);
    }
}
