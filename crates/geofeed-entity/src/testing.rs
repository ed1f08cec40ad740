//! Recording host for tests

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use geofeed_core::EntityId;
use serde_json::Value;

use crate::{EntityDescription, EntityHost, HostError};

/// One instruction received from the feed manager side
#[derive(Debug, Clone, PartialEq)]
pub enum HostInstruction {
    Register(EntityDescription),
    PushState {
        entity_id: EntityId,
        state: String,
        attributes: HashMap<String, Value>,
    },
    Remove {
        entity_id: EntityId,
        force: bool,
    },
}

/// An `EntityHost` that records every instruction it receives
///
/// Registration enforces id uniqueness the way a real host does, so
/// reconciliation invariant violations surface as `DuplicateEntity`.
#[derive(Default)]
pub struct RecordingHost {
    instructions: Mutex<Vec<HostInstruction>>,
    registered: Mutex<HashSet<EntityId>>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn instructions(&self) -> Vec<HostInstruction> {
        self.instructions
            .lock()
            .expect("instructions lock poisoned")
            .clone()
    }

    pub fn registered_ids(&self) -> HashSet<EntityId> {
        self.registered
            .lock()
            .expect("registered lock poisoned")
            .clone()
    }

    pub fn register_count(&self) -> usize {
        self.count(|i| matches!(i, HostInstruction::Register(_)))
    }

    pub fn push_count(&self) -> usize {
        self.count(|i| matches!(i, HostInstruction::PushState { .. }))
    }

    pub fn remove_count(&self) -> usize {
        self.count(|i| matches!(i, HostInstruction::Remove { .. }))
    }

    /// Number of remove instructions received for one entity
    pub fn removes_for(&self, entity_id: &EntityId) -> usize {
        self.count(|i| matches!(i, HostInstruction::Remove { entity_id: id, .. } if id == entity_id))
    }

    fn count(&self, predicate: impl Fn(&HostInstruction) -> bool) -> usize {
        self.instructions
            .lock()
            .expect("instructions lock poisoned")
            .iter()
            .filter(|i| predicate(i))
            .count()
    }

    fn record(&self, instruction: HostInstruction) {
        self.instructions
            .lock()
            .expect("instructions lock poisoned")
            .push(instruction);
    }
}

impl EntityHost for RecordingHost {
    fn register(&self, entity: EntityDescription) -> Result<(), HostError> {
        let mut registered = self.registered.lock().expect("registered lock poisoned");
        if !registered.insert(entity.entity_id.clone()) {
            return Err(HostError::DuplicateEntity(entity.entity_id));
        }
        drop(registered);
        self.record(HostInstruction::Register(entity));
        Ok(())
    }

    fn push_state(&self, entity_id: &EntityId, state: String, attributes: HashMap<String, Value>) {
        self.record(HostInstruction::PushState {
            entity_id: entity_id.clone(),
            state,
            attributes,
        });
    }

    fn request_remove(&self, entity_id: &EntityId, force: bool) {
        self.registered
            .lock()
            .expect("registered lock poisoned")
            .remove(entity_id);
        self.record(HostInstruction::Remove {
            entity_id: entity_id.clone(),
            force,
        });
    }
}
