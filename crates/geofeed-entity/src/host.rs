//! Host framework boundary
//!
//! The feed entity manager does not own entity registration or state
//! serialization; it calls into the host framework through this trait and
//! nothing else.

use std::collections::HashMap;

use geofeed_core::EntityId;
use serde_json::Value;
use thiserror::Error;

/// Errors the host framework can surface at the boundary
#[derive(Debug, Clone, Error)]
pub enum HostError {
    /// An entity with this id is already registered. Inside a feed manager
    /// this indicates a reconciliation invariant violation and is treated
    /// as a programming error, not a recoverable condition.
    #[error("entity {0} is already registered")]
    DuplicateEntity(EntityId),

    #[error("host rejected entity {entity_id}: {reason}")]
    Rejected { entity_id: EntityId, reason: String },
}

/// Everything the host needs to materialize a new entity
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDescription {
    pub entity_id: EntityId,
    pub state: String,
    pub attributes: HashMap<String, Value>,
}

/// The slice of the host entity framework the feed manager depends on
pub trait EntityHost: Send + Sync {
    /// Materialize a new entity
    fn register(&self, entity: EntityDescription) -> Result<(), HostError>;

    /// Push a state refresh for an already registered entity
    fn push_state(&self, entity_id: &EntityId, state: String, attributes: HashMap<String, Value>);

    /// Ask the host to destroy an entity
    ///
    /// With `force` the removal must succeed even if the host already
    /// considers the entity to be in a removing state.
    fn request_remove(&self, entity_id: &EntityId, force: bool);
}
