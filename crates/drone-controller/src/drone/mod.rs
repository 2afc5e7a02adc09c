//! Drone reconciler
//!
//! One pass converges a single Drone's backing workload and its status:
//!
//! 1. Fetch the Drone; absent means deleted, nothing to do
//! 2. Garbage-collect owned units the current configuration no longer names
//! 3. Let the active [`WorkloadStrategy`] converge the target unit
//!
//! The strategy is chosen once at startup. Both strategies perform at most one
//! corrective write per pass and skip status writes that would change nothing.

mod pod_per_node;
mod replicated;

pub use pod_per_node::PodPerNode;
pub use replicated::Replicated;

use crate::config::{ControllerConfig, StrategyKind};
use crate::error::ReconcileResult;
use async_trait::async_trait;
use drone_store::ClusterStore;
use drone_types::{
    Drone, EventSeverity, FleetEvent, FleetEventEnvelope, ObjectKey, ResourceKind,
};
use std::sync::Arc;
use tokio::sync::broadcast;

/// What a single Drone pass did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DroneOutcome {
    /// The Drone no longer exists
    Missing,

    /// Created the target unit, bound to `node` when placement applies
    UnitCreated { unit: String, node: Option<String> },

    /// Removed the target unit so the next pass recreates it
    UnitRecycled { unit: String },

    /// No free machine; status records it and nothing was created
    Grounded,

    /// Adjusted the declared replica count of the shared set
    ReplicasAdjusted { from: i32, to: i32 },

    /// Wrote the Drone's status to match the observed unit
    StatusSynced,

    /// Nothing to change
    Converged,
}

impl DroneOutcome {
    pub fn is_grounded(&self) -> bool {
        matches!(self, DroneOutcome::Grounded)
    }
}

/// How a Drone's backing workload is built and converged
#[async_trait]
pub trait WorkloadStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Record kind of the units this strategy manages
    fn unit_kind(&self) -> ResourceKind;

    /// Name of the single unit the Drone should own
    fn target_unit(&self, drone: &Drone) -> String;

    /// Delete owned units other than the target; returns the deleted keys
    async fn collect_garbage(
        &self,
        store: &dyn ClusterStore,
        drone: &Drone,
    ) -> ReconcileResult<Vec<ObjectKey>>;

    /// Drive the target unit and the Drone's status one step toward convergence
    async fn converge(&self, store: &dyn ClusterStore, drone: &Drone)
        -> ReconcileResult<DroneOutcome>;
}

/// Build the strategy selected by `config`
pub fn strategy_for(config: &ControllerConfig) -> Arc<dyn WorkloadStrategy> {
    match config.strategy {
        StrategyKind::PodPerNode => Arc::new(PodPerNode::new(config)),
        StrategyKind::Replicated => Arc::new(Replicated::new(config)),
    }
}

/// Converges Drones through a [`WorkloadStrategy`]
pub struct DroneReconciler {
    store: Arc<dyn ClusterStore>,
    strategy: Arc<dyn WorkloadStrategy>,
    event_tx: broadcast::Sender<FleetEventEnvelope>,
}

impl DroneReconciler {
    pub fn new(
        store: Arc<dyn ClusterStore>,
        strategy: Arc<dyn WorkloadStrategy>,
        event_tx: broadcast::Sender<FleetEventEnvelope>,
    ) -> Self {
        Self {
            store,
            strategy,
            event_tx,
        }
    }

    pub fn strategy(&self) -> &dyn WorkloadStrategy {
        self.strategy.as_ref()
    }

    /// Reconcile the Drone at `key`
    pub async fn reconcile(&self, key: &ObjectKey) -> ReconcileResult<DroneOutcome> {
        let Some(drone) = self.store.get_drone(key).await? else {
            tracing::debug!(drone = %key, "Drone gone, nothing to reconcile");
            return Ok(DroneOutcome::Missing);
        };

        let collected = self
            .strategy
            .collect_garbage(self.store.as_ref(), &drone)
            .await?;
        for unit in collected {
            self.emit(
                FleetEvent::UnitDeleted {
                    drone: key.clone(),
                    kind: self.strategy.unit_kind(),
                    unit: unit.name,
                },
                EventSeverity::Info,
            );
        }

        let outcome = self.strategy.converge(self.store.as_ref(), &drone).await?;

        tracing::debug!(
            drone = %key,
            strategy = %self.strategy.kind(),
            outcome = ?outcome,
            "Drone reconciled"
        );
        self.publish(key, &outcome);

        Ok(outcome)
    }

    fn publish(&self, key: &ObjectKey, outcome: &DroneOutcome) {
        let unit_kind = self.strategy.unit_kind();
        let (event, severity) = match outcome {
            DroneOutcome::Missing | DroneOutcome::Converged => return,
            DroneOutcome::UnitCreated { unit, node } => (
                FleetEvent::UnitCreated {
                    drone: key.clone(),
                    kind: unit_kind,
                    unit: unit.clone(),
                    node: node.clone(),
                },
                EventSeverity::Info,
            ),
            DroneOutcome::UnitRecycled { unit } => (
                FleetEvent::UnitDeleted {
                    drone: key.clone(),
                    kind: unit_kind,
                    unit: unit.clone(),
                },
                EventSeverity::Warning,
            ),
            DroneOutcome::Grounded => (
                FleetEvent::DroneGrounded { drone: key.clone() },
                EventSeverity::Warning,
            ),
            DroneOutcome::ReplicasAdjusted { from, to } => (
                FleetEvent::ReplicasAdjusted {
                    drone: key.clone(),
                    from: *from,
                    to: *to,
                },
                EventSeverity::Info,
            ),
            DroneOutcome::StatusSynced => (
                FleetEvent::StatusSynced {
                    kind: ResourceKind::Drone,
                    key: key.clone(),
                },
                EventSeverity::Info,
            ),
        };
        self.emit(event, severity);
    }

    fn emit(&self, event: FleetEvent, severity: EventSeverity) {
        let _ = self.event_tx.send(FleetEventEnvelope::new(event, severity));
    }
}
