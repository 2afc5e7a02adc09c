//! Swarm reconciler
//!
//! Converges the number of Drone records in a Swarm's namespace toward the
//! declared count, one Drone per pass, then republishes the observed count.
//! The create or delete it issues wakes the reconciler again through the
//! store, so the loop paces itself.

use crate::error::ReconcileResult;
use crate::names::unique_name;
use drone_store::ClusterStore;
use drone_types::{
    Drone, EventSeverity, FleetEvent, FleetEventEnvelope, ObjectKey, ObjectMeta, ResourceKind,
    Swarm, SWARM_LABEL,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// Fleet-size change made by one pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScaleAction {
    None,
    Created(String),
    Deleted(String),
}

/// What a single Swarm pass did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwarmOutcome {
    /// The Swarm no longer exists
    Missing,

    Reconciled {
        action: ScaleAction,
        /// Drones present after the action
        flying: i32,
        /// Whether the status was written
        status_written: bool,
    },
}

/// Converges Swarms
pub struct SwarmReconciler {
    store: Arc<dyn ClusterStore>,
    event_tx: broadcast::Sender<FleetEventEnvelope>,
    rng: Mutex<StdRng>,
}

impl SwarmReconciler {
    pub fn new(
        store: Arc<dyn ClusterStore>,
        event_tx: broadcast::Sender<FleetEventEnvelope>,
    ) -> Self {
        Self {
            store,
            event_tx,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Use a fixed seed for name generation
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    /// Reconcile the Swarm at `key`
    pub async fn reconcile(&self, key: &ObjectKey) -> ReconcileResult<SwarmOutcome> {
        let Some(swarm) = self.store.get_swarm(key).await? else {
            tracing::debug!(swarm = %key, "Swarm gone, nothing to reconcile");
            return Ok(SwarmOutcome::Missing);
        };

        let namespace = swarm.metadata.namespace.as_str();
        let drones = self.store.list_drones(Some(namespace)).await?;
        let desired = swarm.desired_count();

        tracing::debug!(
            swarm = %key,
            desired = ?desired,
            current = drones.len(),
            "Reconciling swarm"
        );

        let action = match desired {
            Some(desired) if drones.len() < desired => self.scale_up(&swarm, &drones).await?,
            Some(desired) if drones.len() > desired => self.scale_down(&swarm, &drones).await?,
            _ => ScaleAction::None,
        };

        let observed = self.store.list_drones(Some(namespace)).await?.len();
        let flying = i32::try_from(observed).unwrap_or(i32::MAX);

        let status_written = swarm.status.flying_drones != flying;
        if status_written {
            let mut updated = swarm.clone();
            updated.status.flying_drones = flying;
            self.store.update_swarm_status(updated).await?;
            self.emit(
                FleetEvent::StatusSynced {
                    kind: ResourceKind::Swarm,
                    key: key.clone(),
                },
                EventSeverity::Info,
            );
        }

        Ok(SwarmOutcome::Reconciled {
            action,
            flying,
            status_written,
        })
    }

    async fn scale_up(&self, swarm: &Swarm, drones: &[Drone]) -> ReconcileResult<ScaleAction> {
        let name = self.next_name(drones);
        let drone = Drone {
            metadata: ObjectMeta::new(swarm.metadata.namespace.clone(), name.clone())
                .with_label(SWARM_LABEL, swarm.metadata.name.clone()),
            spec: Default::default(),
            status: Default::default(),
        };

        self.store.create_drone(drone).await?;
        tracing::info!(
            swarm = %swarm.metadata.key(),
            drone = %name,
            "Created drone"
        );
        self.emit(
            FleetEvent::DroneCreated {
                swarm: swarm.metadata.key(),
                drone: name.clone(),
            },
            EventSeverity::Info,
        );

        Ok(ScaleAction::Created(name))
    }

    /// Delete the first Drone in listing order
    async fn scale_down(&self, swarm: &Swarm, drones: &[Drone]) -> ReconcileResult<ScaleAction> {
        let Some(victim) = drones.first() else {
            return Ok(ScaleAction::None);
        };

        self.store.delete_drone(&victim.metadata.key()).await?;
        tracing::info!(
            swarm = %swarm.metadata.key(),
            drone = %victim.metadata.name,
            "Deleted drone"
        );
        self.emit(
            FleetEvent::DroneDeleted {
                swarm: swarm.metadata.key(),
                drone: victim.metadata.name.clone(),
            },
            EventSeverity::Info,
        );

        Ok(ScaleAction::Deleted(victim.metadata.name.clone()))
    }

    fn next_name(&self, drones: &[Drone]) -> String {
        let taken: BTreeSet<String> = drones.iter().map(|d| d.metadata.name.clone()).collect();
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        unique_name(&mut *rng, &taken)
    }

    fn emit(&self, event: FleetEvent, severity: EventSeverity) {
        let _ = self.event_tx.send(FleetEventEnvelope::new(event, severity));
    }
}
