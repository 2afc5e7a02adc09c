//! Swarm: a declared fleet size of Drones

use crate::meta::{HasStatus, ObjectMeta, Resource, ResourceKind};
use serde::{Deserialize, Serialize};

/// A named fleet of identical Drones
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Swarm {
    pub metadata: ObjectMeta,

    #[serde(default)]
    pub spec: SwarmSpec,

    #[serde(default)]
    pub status: SwarmStatus,
}

/// Operator-declared state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SwarmSpec {
    /// Desired number of Drones
    #[serde(rename = "howmany", default, skip_serializing_if = "Option::is_none")]
    pub how_many: Option<i32>,
}

/// Controller-written observation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SwarmStatus {
    /// Drone records that existed at the last successful reconciliation
    #[serde(rename = "flyingdrones", default)]
    pub flying_drones: i32,
}

impl Swarm {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        how_many: Option<i32>,
    ) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            spec: SwarmSpec { how_many },
            status: SwarmStatus::default(),
        }
    }

    /// Desired count clamped to zero; `None` when the operator left it unset
    pub fn desired_count(&self) -> Option<usize> {
        self.spec
            .how_many
            .map(|n| usize::try_from(n.max(0)).unwrap_or_default())
    }
}

impl Resource for Swarm {
    const KIND: ResourceKind = ResourceKind::Swarm;

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

impl HasStatus for Swarm {
    type Status = SwarmStatus;

    fn status(&self) -> &SwarmStatus {
        &self.status
    }

    fn status_mut(&mut self) -> &mut SwarmStatus {
        &mut self.status
    }
}
