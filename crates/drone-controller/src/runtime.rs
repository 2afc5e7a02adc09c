//! Hosting runtime
//!
//! Turns store change notifications into reconciliation requests and runs
//! them on a bounded pool of workers per reconciler:
//!
//! - Swarm change → that Swarm
//! - Drone change → that Drone; on create/delete also its Swarm
//! - Pod/Deployment change → the controller-owner Drone
//! - Pod deletion → Grounded Drones in the namespace (a machine may be free)
//! - Machine change → every Drone
//!
//! A periodic resync enqueues everything, covering missed or lagged events.

use crate::config::{ControllerConfig, RuntimeConfig};
use crate::drone::{strategy_for, DroneReconciler, WorkloadStrategy};
use crate::error::{ReconcileError, ReconcileResult};
use crate::gc::register_owner_indexes;
use crate::queue::{Backoff, WorkQueue};
use crate::swarm::SwarmReconciler;
use drone_store::ClusterStore;
use drone_types::{
    DronePhase, EventSeverity, FleetEvent, FleetEventEnvelope, ObjectKey, ResourceKind, WatchAction,
    WatchEvent, SWARM_LABEL,
};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Capacity of the fleet event channel
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Runs the Swarm and Drone reconcilers against a store
pub struct ControllerManager {
    store: Arc<dyn ClusterStore>,
    swarms: SwarmReconciler,
    drones: DroneReconciler,
    swarm_queue: Arc<WorkQueue<ObjectKey>>,
    drone_queue: Arc<WorkQueue<ObjectKey>>,
    runtime: RuntimeConfig,
    event_tx: broadcast::Sender<FleetEventEnvelope>,
}

impl ControllerManager {
    /// Create a manager with the strategy selected by `controller`
    pub fn new(
        store: Arc<dyn ClusterStore>,
        controller: &ControllerConfig,
        runtime: RuntimeConfig,
    ) -> ReconcileResult<Self> {
        controller.validate()?;
        Self::with_strategy(store, strategy_for(controller), runtime)
    }

    /// Create a manager with an explicit workload strategy
    pub fn with_strategy(
        store: Arc<dyn ClusterStore>,
        strategy: Arc<dyn WorkloadStrategy>,
        runtime: RuntimeConfig,
    ) -> ReconcileResult<Self> {
        runtime.validate()?;

        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let backoff = Backoff::new(runtime.backoff_base(), runtime.backoff_max());

        Ok(Self {
            swarms: SwarmReconciler::new(store.clone(), event_tx.clone()),
            drones: DroneReconciler::new(store.clone(), strategy, event_tx.clone()),
            swarm_queue: Arc::new(WorkQueue::new("swarm", backoff)),
            drone_queue: Arc::new(WorkQueue::new("drone", backoff)),
            store,
            runtime,
            event_tx,
        })
    }

    /// Use a fixed seed for Drone name generation
    pub fn with_name_seed(mut self, seed: u64) -> Self {
        self.swarms = self.swarms.with_seed(seed);
        self
    }

    /// Subscribe to reconciler decisions
    pub fn subscribe_events(&self) -> broadcast::Receiver<FleetEventEnvelope> {
        self.event_tx.subscribe()
    }

    /// Run until `shutdown` flips to true or its sender is dropped
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> ReconcileResult<()> {
        register_owner_indexes(self.store.as_ref()).await?;

        // Subscribe before the initial listing so no write falls in between
        let mut changes = self.store.subscribe();
        self.enqueue_all().await?;

        let mut workers = Vec::with_capacity(self.runtime.workers * 2);
        for _ in 0..self.runtime.workers {
            workers.push(tokio::spawn(Arc::clone(&self).run_swarm_worker()));
            workers.push(tokio::spawn(Arc::clone(&self).run_drone_worker()));
        }

        tracing::info!(
            strategy = %self.drones.strategy().kind(),
            workers = self.runtime.workers,
            resync_secs = self.runtime.resync_interval().as_secs(),
            "Controller manager started"
        );

        let period = self.runtime.resync_interval();
        let mut resync = interval_at(Instant::now() + period, period);
        resync.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    let stop = changed.is_err() || *shutdown.borrow();
                    if stop {
                        break;
                    }
                }
                _ = resync.tick() => {
                    if let Err(e) = self.enqueue_all().await {
                        tracing::error!(error = %e, "Resync failed");
                    }
                }
                change = changes.recv() => match change {
                    Ok(event) => {
                        if let Err(e) = self.route(event).await {
                            tracing::warn!(error = %e, "Failed to route change notification");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped = skipped, "Change stream lagged, resyncing");
                        if let Err(e) = self.enqueue_all().await {
                            tracing::error!(error = %e, "Resync failed");
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::warn!("Change stream closed");
                        break;
                    }
                },
            }
        }

        tracing::info!("Controller manager stopping");
        self.swarm_queue.shutdown();
        self.drone_queue.shutdown();
        for result in futures::future::join_all(workers).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Worker task failed");
            }
        }
        tracing::info!("Controller manager stopped");

        Ok(())
    }

    /// Enqueue every Swarm and Drone
    pub async fn enqueue_all(&self) -> ReconcileResult<()> {
        for swarm in self.store.list_swarms(None).await? {
            self.swarm_queue.add(swarm.metadata.key());
        }
        for drone in self.store.list_drones(None).await? {
            self.drone_queue.add(drone.metadata.key());
        }
        Ok(())
    }

    /// Map one change notification to reconciliation requests
    async fn route(&self, event: WatchEvent) -> ReconcileResult<()> {
        let key = event.key();
        let namespace = event.meta.namespace.as_str();

        match event.kind {
            ResourceKind::Swarm => self.swarm_queue.add(key),
            ResourceKind::Drone => {
                self.drone_queue.add(key);
                if matches!(event.action, WatchAction::Added | WatchAction::Deleted) {
                    match event.meta.labels.get(SWARM_LABEL) {
                        Some(swarm) => {
                            self.swarm_queue.add(ObjectKey::new(namespace, swarm.as_str()))
                        }
                        None => {
                            for swarm in self.store.list_swarms(Some(namespace)).await? {
                                self.swarm_queue.add(swarm.metadata.key());
                            }
                        }
                    }
                }
            }
            ResourceKind::Pod | ResourceKind::Deployment => {
                if let Some(owner) = event.meta.controller().filter(|o| o.is_drone()) {
                    self.drone_queue.add(ObjectKey::new(namespace, owner.name.as_str()));
                }
                if event.kind == ResourceKind::Pod && event.action == WatchAction::Deleted {
                    for drone in self.store.list_drones(Some(namespace)).await? {
                        if drone.phase() == DronePhase::Grounded {
                            self.drone_queue.add(drone.metadata.key());
                        }
                    }
                }
            }
            ResourceKind::Machine => {
                for drone in self.store.list_drones(None).await? {
                    self.drone_queue.add(drone.metadata.key());
                }
            }
        }

        Ok(())
    }

    async fn run_swarm_worker(self: Arc<Self>) {
        while let Some(key) = self.swarm_queue.next().await {
            match self.swarms.reconcile(&key).await {
                Ok(outcome) => {
                    tracing::trace!(swarm = %key, outcome = ?outcome, "Swarm pass finished");
                    self.swarm_queue.forget(&key);
                }
                Err(e) => self.handle_failure(&self.swarm_queue, ResourceKind::Swarm, &key, e),
            }
            self.swarm_queue.done(&key);
        }
    }

    async fn run_drone_worker(self: Arc<Self>) {
        while let Some(key) = self.drone_queue.next().await {
            match self.drones.reconcile(&key).await {
                Ok(outcome) => {
                    self.drone_queue.forget(&key);
                    if outcome.is_grounded() {
                        self.drone_queue
                            .add_after(key.clone(), self.runtime.grounded_requeue());
                    }
                }
                Err(e) => self.handle_failure(&self.drone_queue, ResourceKind::Drone, &key, e),
            }
            self.drone_queue.done(&key);
        }
    }

    fn handle_failure(
        &self,
        queue: &Arc<WorkQueue<ObjectKey>>,
        kind: ResourceKind,
        key: &ObjectKey,
        error: ReconcileError,
    ) {
        let severity = if error.is_retryable() {
            let delay = queue.retry(key.clone());
            tracing::warn!(
                kind = %kind,
                key = %key,
                error = %error,
                retry_ms = delay.as_millis() as u64,
                "Reconciliation failed, will retry"
            );
            EventSeverity::Warning
        } else {
            queue.forget(key);
            tracing::error!(
                kind = %kind,
                key = %key,
                error = %error,
                "Reconciliation failed permanently until next change or resync"
            );
            EventSeverity::Error
        };

        let _ = self.event_tx.send(FleetEventEnvelope::new(
            FleetEvent::ReconcileFailed {
                kind,
                key: key.clone(),
                reason: error.to_string(),
            },
            severity,
        ));
    }
}
