//! Development scheduler
//!
//! Stands in for the process scheduler when the daemon runs against the
//! in-memory store: pending pods bound to a machine start running (or fail,
//! at the configured rate) and replicated sets report their declared
//! replicas as present.

use crate::config::SimulatorConfig;
use drone_store::{ClusterStore, StoreResult};
use drone_types::PodPhase;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, Duration};

/// Changes made by one simulator pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub started: usize,
    pub failed: usize,
    pub scaled: usize,
}

/// Simulation engine for the scheduler side of the cluster
pub struct Simulator {
    store: Arc<dyn ClusterStore>,
    config: SimulatorConfig,
    rng: StdRng,
}

impl Simulator {
    pub fn new(store: Arc<dyn ClusterStore>, config: SimulatorConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { store, config, rng }
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(Duration::from_millis(self.config.tick_interval_ms.max(1)));
        tracing::info!(
            tick_ms = self.config.tick_interval_ms,
            failure_rate = self.config.failure_rate,
            "Scheduler simulator started"
        );

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    let stop = changed.is_err() || *shutdown.borrow();
                    if stop {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    match self.tick().await {
                        Ok(report) if report != TickReport::default() => {
                            tracing::debug!(
                                started = report.started,
                                failed = report.failed,
                                scaled = report.scaled,
                                "Simulator pass"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => tracing::warn!(error = %e, "Simulator tick failed"),
                    }
                }
            }
        }

        tracing::info!("Scheduler simulator stopped");
    }

    /// One pass over pods and replicated sets
    pub async fn tick(&mut self) -> StoreResult<TickReport> {
        let mut report = TickReport::default();
        let failure_rate = self.config.failure_rate.clamp(0.0, 1.0);

        for mut pod in self.store.list_pods(None).await? {
            if pod.status.phase != PodPhase::Pending || pod.node_name().is_none() {
                continue;
            }

            let fails = self.rng.gen_bool(failure_rate);
            pod.status.phase = if fails {
                PodPhase::Failed
            } else {
                PodPhase::Running
            };

            let key = pod.metadata.key();
            match self.store.update_pod_status(pod).await {
                Ok(_) if fails => report.failed += 1,
                Ok(_) => report.started += 1,
                Err(e) if e.is_transient() => {
                    tracing::debug!(pod = %key, error = %e, "Pod changed underneath simulator");
                }
                Err(e) => return Err(e),
            }
        }

        for mut deployment in self.store.list_deployments(None).await? {
            let declared = deployment.declared_replicas().max(0);
            if deployment.status.replicas == declared {
                continue;
            }

            deployment.status.replicas = declared;
            let key = deployment.metadata.key();
            match self.store.update_deployment_status(deployment).await {
                Ok(_) => report.scaled += 1,
                Err(e) if e.is_transient() => {
                    tracing::debug!(
                        deployment = %key,
                        error = %e,
                        "Set changed underneath simulator"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drone_store::{DeploymentStore, DroneStore, InMemoryStore, PodStore};
    use drone_types::{
        Deployment, DeploymentSpec, Drone, ObjectKey, ObjectMeta, OwnerReference, Pod, PodSpec,
        PodTemplate,
    };

    fn config(failure_rate: f64) -> SimulatorConfig {
        SimulatorConfig {
            enabled: true,
            tick_interval_ms: 10,
            failure_rate,
            seed: Some(9),
        }
    }

    async fn pod(store: &InMemoryStore, name: &str, node: Option<&str>) {
        let drone = store.create_drone(Drone::new("fleet", name)).await.unwrap();
        store
            .create_pod(Pod {
                metadata: ObjectMeta::new("fleet", name)
                    .with_owner(OwnerReference::controller_of(&drone)),
                spec: PodSpec {
                    node_name: node.map(str::to_string),
                    containers: Vec::new(),
                },
                status: Default::default(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_bound_pods_start_running() {
        let store = Arc::new(InMemoryStore::new());
        pod(&store, "bound", Some("rockpi0")).await;
        pod(&store, "unbound", None).await;
        let mut simulator = Simulator::new(store.clone(), config(0.0));

        let report = simulator.tick().await.unwrap();
        assert_eq!(report.started, 1);

        let bound = store.get_pod(&ObjectKey::new("fleet", "bound")).await.unwrap().unwrap();
        assert_eq!(bound.status.phase, PodPhase::Running);
        let unbound = store
            .get_pod(&ObjectKey::new("fleet", "unbound"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(unbound.status.phase, PodPhase::Pending);

        assert_eq!(simulator.tick().await.unwrap(), TickReport::default());
    }

    #[tokio::test]
    async fn test_certain_failure_marks_pods_failed() {
        let store = Arc::new(InMemoryStore::new());
        pod(&store, "doomed", Some("rockpi0")).await;
        let mut simulator = Simulator::new(store.clone(), config(1.0));

        let report = simulator.tick().await.unwrap();

        assert_eq!(report.failed, 1);
        let doomed = store.get_pod(&ObjectKey::new("fleet", "doomed")).await.unwrap().unwrap();
        assert_eq!(doomed.status.phase, PodPhase::Failed);
    }

    #[tokio::test]
    async fn test_sets_report_declared_replicas() {
        let store = Arc::new(InMemoryStore::new());
        store
            .create_deployment(Deployment {
                metadata: ObjectMeta::new("fleet", "mydrones"),
                spec: DeploymentSpec {
                    replicas: Some(4),
                    selector: Default::default(),
                    template: PodTemplate::default(),
                },
                status: Default::default(),
            })
            .await
            .unwrap();
        let mut simulator = Simulator::new(store.clone(), config(0.0));

        assert_eq!(simulator.tick().await.unwrap().scaled, 1);
        let set = store
            .get_deployment(&ObjectKey::new("fleet", "mydrones"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(set.status.replicas, 4);
    }
}
