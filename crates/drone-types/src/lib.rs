//! Drone Types - declarative records for fleet convergence
//!
//! A **Swarm** declares how many **Drones** should exist. Each Drone is backed
//! by a workload unit: either a single [`Pod`] bound to one [`Machine`], or a
//! shared replicated [`Deployment`]. Workload units point back at their Drone
//! through a controller [`OwnerReference`].
//!
//! ## Key Concepts
//!
//! - **ObjectMeta**: identity, optimistic-concurrency version, labels, owners
//! - **Resource**: common access to metadata for every stored record kind
//! - **WatchEvent**: change notification emitted by the store
//! - **FleetEvent**: decision record emitted by the reconcilers

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod drone;
pub mod events;
pub mod machine;
pub mod meta;
pub mod swarm;
pub mod workload;

pub use drone::{Drone, DronePhase, DroneSpec, DroneStatus, SWARM_LABEL};
pub use events::{
    EventSeverity, FleetEvent, FleetEventEnvelope, WatchAction, WatchEvent,
};
pub use machine::{Machine, RoleSelector};
pub use meta::{
    HasStatus, ObjectKey, ObjectMeta, OwnerReference, Resource, ResourceKind, GROUP_VERSION,
};
pub use swarm::{Swarm, SwarmSpec, SwarmStatus};
pub use workload::{
    Container, Deployment, DeploymentSpec, DeploymentStatus, EnvVar, Pod, PodPhase, PodSpec,
    PodStatus, PodTemplate,
};
