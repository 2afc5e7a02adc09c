//! Daemon setup and lifecycle management

use crate::config::{DaemonConfig, SeedConfig};
use crate::error::{DaemonError, DaemonResult};
use crate::simulator::Simulator;
use drone_controller::ControllerManager;
use drone_store::{ClusterStore, InMemoryStore, MachineStore, SwarmStore};
use drone_types::{EventSeverity, FleetEventEnvelope, Machine, Swarm};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

/// Drone fleet daemon
pub struct Daemon {
    config: DaemonConfig,
    store: Arc<InMemoryStore>,
}

impl Daemon {
    /// Create a new daemon with the given configuration
    pub fn new(config: DaemonConfig) -> DaemonResult<Self> {
        config.validate().map_err(DaemonError::Config)?;

        Ok(Self {
            config,
            store: Arc::new(InMemoryStore::new()),
        })
    }

    pub fn store(&self) -> Arc<InMemoryStore> {
        self.store.clone()
    }

    /// Load the configured machines and swarms into the store
    pub async fn seed(&self) -> DaemonResult<()> {
        let SeedConfig {
            namespace,
            machines,
            swarms,
        } = &self.config.seed;

        for seed in machines {
            let mut machine = Machine::new(seed.name.clone());
            if seed.eligible {
                machine = machine.with_label(
                    self.config.controller.role_label.clone(),
                    self.config.controller.role_value.clone().unwrap_or_default(),
                );
            }
            self.store.create_machine(machine).await?;
        }

        for seed in swarms {
            let namespace = seed.namespace.clone().unwrap_or_else(|| namespace.clone());
            self.store
                .create_swarm(Swarm::new(namespace, seed.name.clone(), seed.howmany))
                .await?;
        }

        tracing::info!(
            machines = machines.len(),
            swarms = swarms.len(),
            "Seeded in-memory cluster"
        );
        Ok(())
    }

    /// Run until Ctrl+C or SIGTERM
    pub async fn run(self) -> DaemonResult<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Run until `signal` completes
    pub async fn run_until<F>(self, signal: F) -> DaemonResult<()>
    where
        F: Future<Output = ()> + Send,
    {
        self.seed().await?;

        let store: Arc<dyn ClusterStore> = self.store.clone();
        let manager = Arc::new(ControllerManager::new(
            store.clone(),
            &self.config.controller,
            self.config.runtime.clone(),
        )?);

        let events = manager.subscribe_events();
        let event_logger = tokio::spawn(log_events(events));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let controller = tokio::spawn(manager.clone().run(shutdown_rx.clone()));

        let simulator = if self.config.simulator.enabled {
            let simulator = Simulator::new(store, self.config.simulator.clone());
            Some(tokio::spawn(simulator.run(shutdown_rx)))
        } else {
            None
        };

        tracing::info!(
            strategy = %self.config.controller.strategy,
            simulator = self.config.simulator.enabled,
            "Drone daemon running"
        );

        signal.await;
        tracing::info!("Drone daemon shutting down");

        let _ = shutdown_tx.send(true);
        if let Some(simulator) = simulator {
            simulator
                .await
                .map_err(|e| DaemonError::Task(e.to_string()))?;
        }
        let result = controller
            .await
            .map_err(|e| DaemonError::Task(e.to_string()))?;

        // Dropping the manager closes the event channel and ends the logger
        drop(manager);
        if let Err(e) = event_logger.await {
            tracing::warn!(error = %e, "Event logger ended abnormally");
        }

        result.map_err(DaemonError::from)
    }
}

/// Log reconciler decisions until the channel closes
async fn log_events(mut events: broadcast::Receiver<FleetEventEnvelope>) {
    loop {
        match events.recv().await {
            Ok(envelope) => match envelope.severity {
                EventSeverity::Info => {
                    tracing::info!(id = %envelope.id, event = ?envelope.event, "Fleet event")
                }
                EventSeverity::Warning => {
                    tracing::warn!(id = %envelope.id, event = ?envelope.event, "Fleet event")
                }
                EventSeverity::Error => {
                    tracing::error!(id = %envelope.id, event = ?envelope.event, "Fleet event")
                }
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped = skipped, "Fleet event log lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MachineSeed, SwarmSeed};
    use drone_store::{DroneStore, PodStore};
    use std::time::Duration;

    fn dev_config() -> DaemonConfig {
        let mut config = DaemonConfig::default();
        config.runtime.resync_interval_secs = 1;
        config.runtime.workers = 1;
        config.simulator.tick_interval_ms = 10;
        config.seed = SeedConfig {
            namespace: "fleet".into(),
            machines: vec![
                MachineSeed {
                    name: "rockpi0".into(),
                    eligible: true,
                },
                MachineSeed {
                    name: "gateway".into(),
                    eligible: false,
                },
            ],
            swarms: vec![SwarmSeed {
                name: "alpha".into(),
                namespace: None,
                howmany: Some(1),
            }],
        };
        config
    }

    #[tokio::test]
    async fn test_seed_labels_eligible_machines() {
        let daemon = Daemon::new(dev_config()).unwrap();
        daemon.seed().await.unwrap();

        let store = daemon.store();
        let eligible = store.get_machine("rockpi0").await.unwrap().unwrap();
        assert!(eligible
            .metadata
            .labels
            .contains_key("node-role.kubernetes.io/drone"));
        let gateway = store.get_machine("gateway").await.unwrap().unwrap();
        assert!(gateway.metadata.labels.is_empty());
        assert_eq!(store.list_swarms(Some("fleet")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rejects_invalid_config() {
        let mut config = dev_config();
        config.runtime.workers = 0;
        assert!(matches!(Daemon::new(config), Err(DaemonError::Config(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_runs_fleet_to_running_pod() {
        let daemon = Daemon::new(dev_config()).unwrap();
        let store = daemon.store();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(daemon.run_until(async {
            let _ = stop_rx.await;
        }));

        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            let drones = store.list_drones(Some("fleet")).await.unwrap();
            let pods = store.list_pods(Some("fleet")).await.unwrap();
            let running = pods
                .iter()
                .any(|p| p.status.phase == drone_types::PodPhase::Running);
            if drones.len() == 1 && drones[0].status.flying && running {
                break;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "fleet did not converge"
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        stop_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }
}
