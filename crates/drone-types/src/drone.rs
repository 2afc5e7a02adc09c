//! Drone: one worker unit and its backing workload

use crate::meta::{HasStatus, ObjectMeta, Resource, ResourceKind};
use serde::{Deserialize, Serialize};

/// Label naming the Swarm a Drone was created for. A lookup link only.
pub const SWARM_LABEL: &str = "experiments.mad.md/swarm";

/// A worker unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Drone {
    pub metadata: ObjectMeta,

    #[serde(default)]
    pub spec: DroneSpec,

    #[serde(default)]
    pub status: DroneStatus,
}

/// Declared configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DroneSpec {
    /// Desired replica count (replica-counted strategy only)
    #[serde(rename = "howmany", default, skip_serializing_if = "Option::is_none")]
    pub how_many: Option<i32>,
}

/// Observed state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DroneStatus {
    /// Backing pod is bound to a machine (pod-per-node strategy)
    #[serde(default)]
    pub flying: bool,

    #[serde(
        rename = "assignedNode",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub assigned_node: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<DronePhase>,

    /// Observed replicas of the shared set (replica-counted strategy)
    #[serde(rename = "flyingdrones", default)]
    pub flying_drones: i32,
}

/// Pod-per-node lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DronePhase {
    /// No workload unit yet
    Unscheduled,
    /// Workload unit bound to a machine
    Flying,
    /// Every eligible machine is occupied
    Grounded,
}

impl Drone {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            spec: DroneSpec::default(),
            status: DroneStatus::default(),
        }
    }

    pub fn with_replicas(mut self, how_many: i32) -> Self {
        self.spec.how_many = Some(how_many);
        self
    }

    /// Desired replicas, defaulting to one
    pub fn desired_replicas(&self) -> i32 {
        self.spec.how_many.unwrap_or(1)
    }

    pub fn owner_swarm(&self) -> Option<&str> {
        self.metadata.labels.get(SWARM_LABEL).map(String::as_str)
    }

    pub fn phase(&self) -> DronePhase {
        self.status.phase.unwrap_or(DronePhase::Unscheduled)
    }
}

impl Resource for Drone {
    const KIND: ResourceKind = ResourceKind::Drone;

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

impl HasStatus for Drone {
    type Status = DroneStatus;

    fn status(&self) -> &DroneStatus {
        &self.status
    }

    fn status_mut(&mut self) -> &mut DroneStatus {
        &mut self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let drone = Drone::new("fleet", "eager-hopper");
        assert_eq!(drone.desired_replicas(), 1);
        assert_eq!(drone.phase(), DronePhase::Unscheduled);
        assert!(drone.owner_swarm().is_none());
        assert_eq!(drone.with_replicas(5).desired_replicas(), 5);
    }

    #[test]
    fn test_status_round_trips_wire_names() {
        let json = serde_json::json!({
            "metadata": { "name": "eager-hopper", "namespace": "fleet" },
            "status": { "flying": true, "assignedNode": "rockpi1", "phase": "Flying" }
        });
        let drone: Drone = serde_json::from_value(json).unwrap();
        assert!(drone.status.flying);
        assert_eq!(drone.status.assigned_node.as_deref(), Some("rockpi1"));
        assert_eq!(drone.phase(), DronePhase::Flying);
        assert_eq!(drone.spec.how_many, None);
    }
}
