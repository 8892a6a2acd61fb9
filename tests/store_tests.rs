use bubblemap_node::store::EphemeralStore;
use serial_test::serial;
use std::time::Duration;
use tempfile::TempDir;

async fn create_test_store() -> (EphemeralStore, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let store = EphemeralStore::open(temp_dir.path()).await.unwrap();
    (store, temp_dir)
}

#[tokio::test]
#[serial]
async fn test_put_get_roundtrip() {
    let (store, _dir) = create_test_store().await;

    store
        .put_json("k1", &"hello".to_string(), None)
        .await
        .unwrap();
    let value: Option<String> = store.get_json("k1").await.unwrap();
    assert_eq!(value, Some("hello".to_string()));

    let missing: Option<String> = store.get_json("nope").await.unwrap();
    assert_eq!(missing, None);
}

#[tokio::test]
#[serial]
async fn test_ttl_expiry_is_automatic() {
    let (store, _dir) = create_test_store().await;

    store
        .put_json("gone", &42u32, Some(Duration::from_millis(100)))
        .await
        .unwrap();
    let value: Option<u32> = store.get_json("gone").await.unwrap();
    assert_eq!(value, Some(42));

    tokio::time::sleep(Duration::from_millis(150)).await;

    // No delete was ever issued; the key is simply gone.
    let value: Option<u32> = store.get_json("gone").await.unwrap();
    assert_eq!(value, None);
    assert_eq!(store.remaining_ttl("gone").await.unwrap(), None);
}

#[tokio::test]
#[serial]
async fn test_remaining_ttl_bounds() {
    let (store, _dir) = create_test_store().await;

    store
        .put_json("k", &1u8, Some(Duration::from_secs(60)))
        .await
        .unwrap();
    let remaining = store.remaining_ttl("k").await.unwrap().unwrap();
    assert!(remaining <= Duration::from_secs(60));
    assert!(remaining > Duration::from_secs(58));

    // No TTL set: no remaining lifetime to report.
    store.put_json("forever", &1u8, None).await.unwrap();
    assert_eq!(store.remaining_ttl("forever").await.unwrap(), None);
}

#[tokio::test]
#[serial]
async fn test_keys_with_prefix_skips_expired() {
    let (store, _dir) = create_test_store().await;

    store
        .put_json("bubble:a", &1u8, Some(Duration::from_secs(60)))
        .await
        .unwrap();
    store
        .put_json("bubble:b", &1u8, Some(Duration::from_millis(50)))
        .await
        .unwrap();
    store.put_json("other:c", &1u8, None).await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;

    let keys = store.keys_with_prefix("bubble:").await.unwrap();
    assert_eq!(keys, vec!["bubble:a".to_string()]);
}

#[tokio::test]
#[serial]
async fn test_counter_increment() {
    let (store, _dir) = create_test_store().await;

    assert_eq!(store.incr("c", None).await.unwrap(), 1);
    assert_eq!(store.incr("c", None).await.unwrap(), 2);
    assert_eq!(store.get_counter("c").await.unwrap(), 2);

    assert_eq!(store.get_counter("absent").await.unwrap(), 0);
}

#[tokio::test]
#[serial]
async fn test_counter_ttl_restarts_after_expiry() {
    let (store, _dir) = create_test_store().await;

    let ttl = Some(Duration::from_millis(80));
    assert_eq!(store.incr("daily", ttl).await.unwrap(), 1);
    assert_eq!(store.incr("daily", ttl).await.unwrap(), 2);

    tokio::time::sleep(Duration::from_millis(120)).await;

    assert_eq!(store.get_counter("daily").await.unwrap(), 0);
    assert_eq!(store.incr("daily", ttl).await.unwrap(), 1);
}

#[tokio::test]
#[serial]
async fn test_concurrent_increment_is_atomic() {
    let (store, _dir) = create_test_store().await;

    let mut handles = Vec::new();
    for _ in 0..20 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..5 {
                store.incr("shared", None).await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(store.get_counter("shared").await.unwrap(), 100);
}

#[tokio::test]
#[serial]
async fn test_record_max_is_monotonic() {
    let (store, _dir) = create_test_store().await;

    assert_eq!(store.record_max("peak", 3).await.unwrap(), 3);
    assert_eq!(store.record_max("peak", 7).await.unwrap(), 7);
    assert_eq!(store.record_max("peak", 5).await.unwrap(), 7);
    assert_eq!(store.get_counter("peak").await.unwrap(), 7);
}

#[tokio::test]
#[serial]
async fn test_sweep_removes_expired_entries() {
    let (store, _dir) = create_test_store().await;

    store
        .put_json("a", &1u8, Some(Duration::from_millis(50)))
        .await
        .unwrap();
    store
        .put_json("b", &1u8, Some(Duration::from_secs(60)))
        .await
        .unwrap();
    store.put_json("c", &1u8, None).await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;

    let removed = store.sweep_expired().await.unwrap();
    assert_eq!(removed, 1);
    assert_eq!(store.sweep_expired().await.unwrap(), 0);

    let b: Option<u8> = store.get_json("b").await.unwrap();
    assert_eq!(b, Some(1));
    let c: Option<u8> = store.get_json("c").await.unwrap();
    assert_eq!(c, Some(1));
}
