//! One shared replicated set per namespace

use super::{DroneOutcome, WorkloadStrategy};
use crate::config::{ControllerConfig, StrategyKind};
use crate::error::ReconcileResult;
use crate::gc::reconcile_owned_units;
use async_trait::async_trait;
use drone_store::ClusterStore;
use drone_types::{
    Container, Deployment, DeploymentSpec, DeploymentStatus, Drone, ObjectKey, ObjectMeta,
    OwnerReference, PodSpec, PodTemplate, ResourceKind,
};
use std::collections::BTreeMap;

/// Replica-counted strategy.
///
/// Every Drone in a namespace converges the same named set. Each pass makes at
/// most one write: create the set, adjust its declared replicas, or copy its
/// observed replicas into the Drone's status.
pub struct Replicated {
    deployment_name: String,
    selector_label: String,
    image: String,
    container_name: String,
}

impl Replicated {
    pub fn new(config: &ControllerConfig) -> Self {
        Self {
            deployment_name: config.deployment_name.clone(),
            selector_label: config.selector_label.clone(),
            image: config.image.clone(),
            container_name: config.container_name.clone(),
        }
    }

    /// Desired replicas for `drone`; unset means one, negatives mean none
    pub fn desired_replicas(drone: &Drone) -> i32 {
        drone.desired_replicas().max(0)
    }

    /// The shared set, sized for `drone` and owned by it
    pub fn build_deployment(&self, drone: &Drone) -> Deployment {
        let labels: BTreeMap<String, String> = BTreeMap::from([(
            self.selector_label.clone(),
            self.deployment_name.clone(),
        )]);

        let mut metadata =
            ObjectMeta::new(drone.metadata.namespace.clone(), self.deployment_name.clone())
                .with_owner(OwnerReference::controller_of(drone));
        metadata.labels = labels.clone();

        Deployment {
            metadata,
            spec: DeploymentSpec {
                replicas: Some(Self::desired_replicas(drone)),
                selector: labels.clone(),
                template: PodTemplate {
                    labels,
                    spec: PodSpec {
                        node_name: None,
                        containers: vec![Container {
                            name: self.container_name.clone(),
                            image: self.image.clone(),
                            env: Vec::new(),
                        }],
                    },
                },
            },
            status: DeploymentStatus::default(),
        }
    }
}

#[async_trait]
impl WorkloadStrategy for Replicated {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Replicated
    }

    fn unit_kind(&self) -> ResourceKind {
        ResourceKind::Deployment
    }

    fn target_unit(&self, _drone: &Drone) -> String {
        self.deployment_name.clone()
    }

    async fn collect_garbage(
        &self,
        store: &dyn ClusterStore,
        drone: &Drone,
    ) -> ReconcileResult<Vec<ObjectKey>> {
        let target = self.target_unit(drone);
        let deleted = reconcile_owned_units::<Deployment, _, _>(
            store,
            &drone.metadata.key(),
            |deployment: &Deployment| deployment.metadata.name == target,
        )
        .await?;
        Ok(deleted)
    }

    async fn converge(
        &self,
        store: &dyn ClusterStore,
        drone: &Drone,
    ) -> ReconcileResult<DroneOutcome> {
        let key = ObjectKey::new(drone.metadata.namespace.clone(), self.target_unit(drone));
        let desired = Self::desired_replicas(drone);

        let Some(deployment) = store.get_deployment(&key).await? else {
            let created = store.create_deployment(self.build_deployment(drone)).await?;
            tracing::info!(
                drone = %drone.metadata.key(),
                deployment = %created.metadata.name,
                replicas = desired,
                "Created replicated set"
            );
            return Ok(DroneOutcome::UnitCreated {
                unit: created.metadata.name,
                node: None,
            });
        };

        let declared = deployment.declared_replicas();
        if declared != desired {
            let mut resized = deployment;
            resized.spec.replicas = Some(desired);
            store.update_deployment(resized).await?;
            tracing::info!(
                drone = %drone.metadata.key(),
                deployment = %key,
                from = declared,
                to = desired,
                "Adjusted declared replicas"
            );
            return Ok(DroneOutcome::ReplicasAdjusted {
                from: declared,
                to: desired,
            });
        }

        let observed = deployment.status.replicas;
        if drone.status.flying_drones == observed {
            return Ok(DroneOutcome::Converged);
        }

        let mut updated = drone.clone();
        updated.status.flying_drones = observed;
        store.update_drone_status(updated).await?;
        tracing::debug!(
            drone = %drone.metadata.key(),
            flying = observed,
            "Synced observed replicas"
        );
        Ok(DroneOutcome::StatusSynced)
    }
}
