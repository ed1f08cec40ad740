//! End-to-end lifecycle tests driving the manager through its scheduler

use std::sync::Arc;
use std::time::Duration;

use geofeed_core::{ExternalId, ExternalRecord, FeedConfig, Geometry, LatLon};
use geofeed_entity::testing::{HostInstruction, RecordingHost};
use geofeed_entity::EntityHost;
use geofeed_manager::FeedEntityManager;
use geofeed_source::testing::MockRecordSource;
use geofeed_source::SourceError;
use serde_json::json;

fn record(id: &str, title: &str) -> ExternalRecord {
    ExternalRecord::new(id, title, Geometry::Point(LatLon::new(0.0, 1.0)))
}

fn setup(
    interval: Duration,
) -> (
    Arc<MockRecordSource>,
    Arc<RecordingHost>,
    Arc<FeedEntityManager<Arc<MockRecordSource>>>,
) {
    let source = Arc::new(MockRecordSource::new());
    let host = Arc::new(RecordingHost::new());
    let config = FeedConfig::new(LatLon::new(0.0, 0.0)).with_update_interval(interval);
    let manager = Arc::new(FeedEntityManager::new(
        source.clone(),
        config,
        host.clone() as Arc<dyn EntityHost>,
    ));
    (source, host, manager)
}

#[tokio::test(start_paused = true)]
async fn test_scheduler_ticks_at_startup_and_on_interval() {
    let (source, host, manager) = setup(Duration::from_secs(60));
    source.push_records(vec![record("a", "Fire 1"), record("b", "Fire 2")]);
    source.push_records(vec![record("a", "Fire 1 Updated"), record("c", "Fire 3")]);

    manager.clone().start();

    // Startup tick
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(
        manager.managed_ids().await,
        [ExternalId::new("a"), ExternalId::new("b")].into_iter().collect()
    );
    assert_eq!(host.register_count(), 2);

    // Next interval fire
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(
        manager.managed_ids().await,
        [ExternalId::new("a"), ExternalId::new("c")].into_iter().collect()
    );
    assert_eq!(host.remove_count(), 1);
    assert_eq!(host.register_count(), 3);

    // The surviving entity saw the new snapshot, not the stale one
    let refreshed = host
        .instructions()
        .into_iter()
        .filter_map(|i| match i {
            HostInstruction::PushState { entity_id, attributes, .. }
                if entity_id.to_string() == "geo_location.a" =>
            {
                Some(attributes)
            }
            _ => None,
        })
        .last()
        .expect("entity a was never refreshed");
    assert_eq!(refreshed["title"], json!("Fire 1 Updated"));

    manager.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_stop_tears_down_all_entities() {
    let (source, host, manager) = setup(Duration::from_secs(60));
    source.push_records(vec![record("a", "Fire 1"), record("b", "Fire 2")]);

    manager.clone().start();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(manager.entity_count().await, 2);

    manager.stop().await;

    assert_eq!(manager.entity_count().await, 0);
    assert_eq!(host.remove_count(), 2);
    assert!(manager.snapshot().is_empty());

    // No further fetches after stop
    let fetches = source.fetch_count();
    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(source.fetch_count(), fetches);
}

#[tokio::test(start_paused = true)]
async fn test_stop_wins_over_pending_interval_fire() {
    let (source, host, manager) = setup(Duration::from_secs(60));
    source.push_records(vec![record("a", "Fire 1")]);
    source.push_records(vec![record("b", "Fire 2")]);

    manager.clone().start();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(manager.entity_count().await, 1);

    // Make the next interval fire due, then stop before yielding to the
    // scheduler loop: the queued fire must not leave entities behind
    tokio::time::advance(Duration::from_secs(60)).await;
    manager.stop().await;

    assert_eq!(manager.entity_count().await, 0);
    assert!(host.registered_ids().is_empty());
    assert!(manager.snapshot().is_empty());

    // And nothing comes back later
    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(manager.entity_count().await, 0);
    assert!(host.registered_ids().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_sustained_errors_leave_feed_empty() {
    let (source, host, manager) = setup(Duration::from_secs(60));
    source.push_records(vec![record("a", "Fire 1")]);
    source.push_error(SourceError::Network("timeout".to_string()));
    source.push_error(SourceError::Network("timeout".to_string()));

    manager.clone().start();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(manager.entity_count().await, 1);

    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(manager.entity_count().await, 0);
    assert_eq!(host.remove_count(), 1);

    // A second failed tick has nothing left to remove
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(host.remove_count(), 1);

    manager.stop().await;
}

#[tokio::test]
async fn test_full_scenario_sequence() {
    // The canonical four-tick walk: create, diff, no-data, error
    let (source, host, manager) = setup(Duration::from_secs(60));
    source.push_records(vec![record("a", "Fire 1"), record("b", "Fire 2")]);
    source.push_records(vec![record("a", "Fire 1 Updated"), record("c", "Fire 3")]);
    source.push_no_data();
    source.push_error(SourceError::Malformed("not xml".to_string()));

    let t1 = manager.tick().await.unwrap();
    assert_eq!((t1.created, t1.updated, t1.removed), (2, 0, 0));

    let t2 = manager.tick().await.unwrap();
    assert_eq!((t2.created, t2.updated, t2.removed), (1, 1, 1));

    let t3 = manager.tick().await.unwrap();
    assert_eq!((t3.created, t3.updated, t3.removed), (0, 0, 0));
    assert_eq!(manager.entity_count().await, 2);

    let t4 = manager.tick().await.unwrap();
    assert_eq!(t4.removed, 2);
    assert_eq!(manager.entity_count().await, 0);

    // Every id that ever existed got exactly one remove
    assert_eq!(host.remove_count(), 3);
}
