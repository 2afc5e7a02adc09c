//! Store change notifications and reconciler decision events

use crate::meta::{ObjectKey, ObjectMeta, ResourceKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What happened to a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WatchAction {
    Added,
    Modified,
    Deleted,
}

/// Change notification emitted by the store after every successful write
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchEvent {
    pub kind: ResourceKind,
    pub action: WatchAction,

    /// Metadata of the record as written (or as last seen, for deletions)
    pub meta: ObjectMeta,
}

impl WatchEvent {
    pub fn key(&self) -> ObjectKey {
        self.meta.key()
    }
}

/// Event severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventSeverity {
    Info,
    Warning,
    Error,
}

/// Decisions taken by the reconcilers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FleetEvent {
    DroneCreated {
        swarm: ObjectKey,
        drone: String,
    },

    DroneDeleted {
        swarm: ObjectKey,
        drone: String,
    },

    UnitCreated {
        drone: ObjectKey,
        kind: ResourceKind,
        unit: String,
        node: Option<String>,
    },

    UnitDeleted {
        drone: ObjectKey,
        kind: ResourceKind,
        unit: String,
    },

    /// Every eligible machine is occupied
    DroneGrounded {
        drone: ObjectKey,
    },

    ReplicasAdjusted {
        drone: ObjectKey,
        from: i32,
        to: i32,
    },

    StatusSynced {
        kind: ResourceKind,
        key: ObjectKey,
    },

    ReconcileFailed {
        kind: ResourceKind,
        key: ObjectKey,
        reason: String,
    },
}

/// Envelope wrapping every fleet event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetEventEnvelope {
    pub id: Uuid,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub severity: EventSeverity,
    pub event: FleetEvent,
}

impl FleetEventEnvelope {
    pub fn new(event: FleetEvent, severity: EventSeverity) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            severity,
            event,
        }
    }
}
