//! Drone Controller - fleet convergence for Swarm and Drone records
//!
//! Two level-triggered reconcilers compose through the store:
//!
//! - **Swarm reconciler**: creates or deletes one Drone per pass until the
//!   namespace holds the declared count, then publishes the observed count
//! - **Drone reconciler**: garbage-collects stale workload units, then
//!   converges the Drone's backing workload through a [`WorkloadStrategy`]
//!
//! ## Key Concepts
//!
//! - **Placement**: a pod-per-node Drone lands on the first eligible machine
//!   no other pod in the namespace is bound to
//! - **Ownership**: workload units carry a controller owner reference to their
//!   Drone; the store indexes it under [`gc::OWNER_INDEX`]
//! - **Runtime**: [`ControllerManager`] maps change notifications to keys and
//!   runs them on a per-key serialized [`WorkQueue`] with backoff

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod config;
pub mod drone;
pub mod error;
pub mod gc;
pub mod names;
pub mod placement;
pub mod queue;
pub mod runtime;
pub mod swarm;

pub use config::{ControllerConfig, RuntimeConfig, StrategyKind};
pub use drone::{
    strategy_for, DroneOutcome, DroneReconciler, PodPerNode, Replicated, WorkloadStrategy,
};
pub use error::{ReconcileError, ReconcileResult};
pub use gc::{reconcile_owned_units, register_owner_indexes, OwnedUnits, OWNER_INDEX};
pub use placement::{FirstFree, Placement, PlacementPolicy};
pub use queue::{Backoff, WorkQueue};
pub use runtime::ControllerManager;
pub use swarm::{ScaleAction, SwarmOutcome, SwarmReconciler};
