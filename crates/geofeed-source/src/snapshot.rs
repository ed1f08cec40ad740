//! Most recent successful fetch, exposed for per-id lookups

use std::collections::HashMap;
use std::sync::RwLock;

use geofeed_core::{ExternalId, ExternalRecord};

/// The current `external_id -> record` mapping
///
/// Replaced wholesale on each successful reconciliation pass; entity
/// proxies pull field values from it by id whenever they refresh, which
/// decouples a proxy's refresh from the tick that produced the data. No
/// history is retained.
#[derive(Debug, Default)]
pub struct FeedSnapshot {
    records: RwLock<HashMap<ExternalId, ExternalRecord>>,
}

impl FeedSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a record by external id
    pub fn get(&self, id: &ExternalId) -> Option<ExternalRecord> {
        self.records
            .read()
            .expect("snapshot lock poisoned")
            .get(id)
            .cloned()
    }

    /// Replace the whole snapshot with a new record set
    pub fn replace(&self, records: impl IntoIterator<Item = ExternalRecord>) {
        let new: HashMap<_, _> = records
            .into_iter()
            .map(|r| (r.external_id.clone(), r))
            .collect();
        *self.records.write().expect("snapshot lock poisoned") = new;
    }

    /// Drop every record
    pub fn clear(&self) {
        self.records
            .write()
            .expect("snapshot lock poisoned")
            .clear();
    }

    /// Ids currently present in the snapshot
    pub fn ids(&self) -> Vec<ExternalId> {
        self.records
            .read()
            .expect("snapshot lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().expect("snapshot lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
