//! Geo feed manager demo
//!
//! Runs a feed entity manager against a scripted record source and a host
//! that logs every instruction it receives. Pass a YAML config path as the
//! first argument to override the built-in demo configuration.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use geofeed_core::{EntityId, ExternalRecord, FeedConfig, Geometry, LatLon};
use geofeed_entity::{EntityDescription, EntityHost, HostError};
use geofeed_manager::FeedEntityManager;
use geofeed_source::testing::MockRecordSource;
use geofeed_source::SourceError;
use serde_json::Value;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// A host that logs every instruction instead of materializing entities
struct LoggingHost;

impl EntityHost for LoggingHost {
    fn register(&self, entity: EntityDescription) -> Result<(), HostError> {
        info!(entity_id = %entity.entity_id, state = %entity.state, "register");
        Ok(())
    }

    fn push_state(&self, entity_id: &EntityId, state: String, _attributes: HashMap<String, Value>) {
        info!(%entity_id, %state, "push_state");
    }

    fn request_remove(&self, entity_id: &EntityId, force: bool) {
        info!(%entity_id, force, "request_remove");
    }
}

fn demo_config() -> FeedConfig {
    // Sydney, with a 500 km radius
    FeedConfig::new(LatLon::new(-33.8688, 151.2093))
        .with_update_interval(Duration::from_secs(2))
        .with_radius_km(500.0)
}

fn load_config(path: &str) -> Result<FeedConfig> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
    serde_yaml::from_str(&raw).with_context(|| format!("parsing {path}"))
}

fn scripted_source() -> MockRecordSource {
    let source = MockRecordSource::new();
    source.push_records(vec![
        ExternalRecord::new(
            "fire-1",
            "Bush Fire near Penrith",
            Geometry::Point(LatLon::new(-33.75, 150.7)),
        )
        .with_category("Bush Fire"),
        ExternalRecord::new(
            "fire-2",
            "Grass Fire near Goulburn",
            Geometry::Point(LatLon::new(-34.75, 149.72)),
        )
        .with_category("Grass Fire"),
    ]);
    source.push_records(vec![ExternalRecord::new(
        "fire-1",
        "Bush Fire near Penrith (contained)",
        Geometry::Point(LatLon::new(-33.75, 150.7)),
    )
    .with_category("Bush Fire")]);
    source.push_error(SourceError::Network("demo outage".to_string()));
    source
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::DEBUG)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = match std::env::args().nth(1) {
        Some(path) => load_config(&path)?,
        None => demo_config(),
    };

    info!("Starting geo feed manager demo");

    let manager = Arc::new(FeedEntityManager::new(
        scripted_source(),
        config,
        Arc::new(LoggingHost) as Arc<dyn EntityHost>,
    ));

    manager.clone().start();

    // Let the scripted source play out: create, diff, error-clear
    tokio::time::sleep(Duration::from_secs(7)).await;

    manager.stop().await;
    info!("Demo finished");

    Ok(())
}
