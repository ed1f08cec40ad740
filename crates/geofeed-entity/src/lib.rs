//! Entity lifecycle proxy and the host framework boundary
//!
//! A `GeoEventEntity` is the thin object representing one external record
//! inside the host framework. It subscribes to its own per-id update and
//! delete signals, refreshes its state from the current feed snapshot, and
//! requests its own removal when told to.

mod host;
pub mod testing;

use std::collections::HashMap;
use std::sync::Arc;

use geofeed_core::{
    EntityId, ExternalId, ExternalRecord, FeedConfig, ATTR_CATEGORY, ATTR_DISTANCE,
    ATTR_EXTERNAL_ID, ATTR_LATITUDE, ATTR_LONGITUDE, ATTR_PUBLICATION_DATE, ATTR_TITLE,
};
use geofeed_dispatch::{SignalDispatcher, SignalKind};
use geofeed_filter::DerivedAttributes;
use geofeed_source::FeedSnapshot;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub use host::{EntityDescription, EntityHost, HostError};

/// State value used when a distance cannot be computed
const STATE_UNKNOWN: &str = "unknown";

/// The live proxy for one external record
///
/// Constructed by the reconciliation engine's create step. The engine never
/// touches the host on the proxy's behalf: updates and removal both flow
/// through the proxy's own signal loop.
pub struct GeoEventEntity {
    external_id: ExternalId,
    entity_id: EntityId,
    snapshot: Arc<FeedSnapshot>,
    host: Arc<dyn EntityHost>,
    dispatcher: Arc<SignalDispatcher>,
    config: Arc<FeedConfig>,
}

impl GeoEventEntity {
    pub fn new(
        external_id: ExternalId,
        snapshot: Arc<FeedSnapshot>,
        host: Arc<dyn EntityHost>,
        dispatcher: Arc<SignalDispatcher>,
        config: Arc<FeedConfig>,
    ) -> Self {
        let entity_id = EntityId::geo_location(&external_id);
        Self {
            external_id,
            entity_id,
            snapshot,
            host,
            dispatcher,
            config,
        }
    }

    /// Override the derived entity id
    ///
    /// The reconciliation engine uses this when two distinct external ids
    /// collapse to the same slug and the second needs a suffixed id.
    pub fn with_entity_id(mut self, entity_id: EntityId) -> Self {
        self.entity_id = entity_id;
        self
    }

    pub fn external_id(&self) -> &ExternalId {
        &self.external_id
    }

    pub fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    /// Register this entity with the host framework
    ///
    /// A duplicate-id rejection here means the reconciliation invariant was
    /// violated upstream; the error is propagated, never swallowed.
    pub fn register(&self) -> Result<(), HostError> {
        let (state, attributes) = self
            .current_view()
            .unwrap_or_else(|| (STATE_UNKNOWN.to_string(), HashMap::new()));
        self.host.register(EntityDescription {
            entity_id: self.entity_id.clone(),
            state,
            attributes,
        })
    }

    /// Start the proxy's signal loop
    ///
    /// The task ends when the entity is deleted or both signal channels
    /// close. Deletion wins over a simultaneously pending update.
    pub fn spawn(
        self,
        mut updated: broadcast::Receiver<()>,
        mut deleted: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;

                    result = deleted.recv() => match result {
                        Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {
                            self.remove_self();
                            break;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },

                    result = updated.recv() => match result {
                        Ok(()) => self.refresh(),
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            warn!(
                                external_id = %self.external_id,
                                missed,
                                "Update signals lagged, refreshing once"
                            );
                            self.refresh();
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        })
    }

    /// Re-read the snapshot and push the refreshed state to the host
    ///
    /// A missing record is not a fault: a remove and an update can both be
    /// in flight for the same tick, in which case the entity keeps its
    /// last-known values and waits for the delete signal.
    fn refresh(&self) {
        match self.snapshot.get(&self.external_id) {
            Some(record) => {
                let (state, attributes) = self.view_of(&record);
                self.host.push_state(&self.entity_id, state, attributes);
            }
            None => {
                debug!(
                    external_id = %self.external_id,
                    "Update signal with no snapshot record, keeping last state"
                );
            }
        }
    }

    /// Disconnect both signals, then ask the host to remove the entity
    ///
    /// The subscriptions are cleared first so a re-delivered delete signal
    /// is a structural no-op; the remove uses force so it succeeds even if
    /// the host already considers the entity to be going away.
    fn remove_self(&self) {
        debug!(external_id = %self.external_id, entity_id = %self.entity_id, "Removing entity");
        self.dispatcher.disconnect(SignalKind::Updated, &self.external_id);
        self.dispatcher.disconnect(SignalKind::Deleted, &self.external_id);
        self.host.request_remove(&self.entity_id, true);
    }

    /// Current state and attributes from the snapshot, if the record exists
    pub fn current_view(&self) -> Option<(String, HashMap<String, Value>)> {
        self.snapshot
            .get(&self.external_id)
            .map(|record| self.view_of(&record))
    }

    fn view_of(&self, record: &ExternalRecord) -> (String, HashMap<String, Value>) {
        let derived =
            DerivedAttributes::compute(record, self.config.home, &self.config.custom_attributes);

        let state = if derived.distance_km.is_finite() {
            format!("{:.1}", derived.distance_km)
        } else {
            STATE_UNKNOWN.to_string()
        };

        let mut attributes = HashMap::new();
        attributes.insert(ATTR_EXTERNAL_ID.to_string(), json!(self.external_id.as_str()));
        attributes.insert(ATTR_TITLE.to_string(), json!(record.title));
        if let Some(point) = record.geometry.representative_point() {
            attributes.insert(ATTR_LATITUDE.to_string(), json!(point.lat));
            attributes.insert(ATTR_LONGITUDE.to_string(), json!(point.lon));
        }
        if derived.distance_km.is_finite() {
            attributes.insert(ATTR_DISTANCE.to_string(), json!(derived.distance_km));
        }
        if let Some(category) = &record.category {
            attributes.insert(ATTR_CATEGORY.to_string(), json!(category));
        }
        if let Some(date) = &record.publication_date {
            attributes.insert(ATTR_PUBLICATION_DATE.to_string(), json!(date.to_rfc3339()));
        }
        for (name, value) in derived.custom {
            attributes.insert(name, json!(value));
        }

        (state, attributes)
    }
}
