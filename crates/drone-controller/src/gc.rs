//! Owner-based garbage collection
//!
//! Workload units point at their Drone through a controller owner reference.
//! The store indexes units by that owner's name under [`OWNER_INDEX`], so a
//! collection pass is one indexed list plus a delete for every unit the
//! Drone's current configuration no longer calls for.

use async_trait::async_trait;
use drone_store::{ClusterStore, DeploymentStore, IndexFn, PodStore, StoreResult};
use drone_types::{Deployment, ObjectKey, Pod, Resource};
use std::sync::Arc;

/// Field index mapping a workload unit to its controller Drone's name
pub const OWNER_INDEX: &str = ".metadata.controller";

/// Index values for `unit`: its controller owner's name, if that owner is a Drone
pub fn owner_index_values<R: Resource>(unit: &R) -> Vec<String> {
    unit.meta()
        .controller()
        .filter(|owner| owner.is_drone())
        .map(|owner| vec![owner.name.clone()])
        .unwrap_or_default()
}

/// Register the owner index for every workload unit kind.
///
/// Must run once before any reconciler lists owned units.
pub async fn register_owner_indexes(store: &dyn ClusterStore) -> StoreResult<()> {
    let pods: IndexFn<Pod> = Arc::new(|pod: &Pod| owner_index_values(pod));
    let deployments: IndexFn<Deployment> =
        Arc::new(|deployment: &Deployment| owner_index_values(deployment));

    store.index_pods(OWNER_INDEX, pods).await?;
    store.index_deployments(OWNER_INDEX, deployments).await?;

    tracing::debug!(index = OWNER_INDEX, "Registered owner indexes");
    Ok(())
}

/// Lookup and removal of the units of kind `U` owned by a Drone
#[async_trait]
pub trait OwnedUnits<U: Resource>: Send + Sync {
    async fn list_owned(&self, owner: &ObjectKey) -> StoreResult<Vec<U>>;

    async fn delete_unit(&self, key: &ObjectKey) -> StoreResult<bool>;
}

#[async_trait]
impl<T: PodStore + ?Sized> OwnedUnits<Pod> for T {
    async fn list_owned(&self, owner: &ObjectKey) -> StoreResult<Vec<Pod>> {
        self.list_pods_by_index(&owner.namespace, OWNER_INDEX, &owner.name)
            .await
    }

    async fn delete_unit(&self, key: &ObjectKey) -> StoreResult<bool> {
        self.delete_pod(key).await
    }
}

#[async_trait]
impl<T: DeploymentStore + ?Sized> OwnedUnits<Deployment> for T {
    async fn list_owned(&self, owner: &ObjectKey) -> StoreResult<Vec<Deployment>> {
        self.list_deployments_by_index(&owner.namespace, OWNER_INDEX, &owner.name)
            .await
    }

    async fn delete_unit(&self, key: &ObjectKey) -> StoreResult<bool> {
        self.delete_deployment(key).await
    }
}

/// Delete every unit owned by `owner` for which `keep` is false.
///
/// Returns the keys actually deleted. The first failed delete aborts the pass;
/// units already removed stay removed and the rest are picked up next time.
pub async fn reconcile_owned_units<U, S, F>(
    store: &S,
    owner: &ObjectKey,
    keep: F,
) -> StoreResult<Vec<ObjectKey>>
where
    U: Resource,
    S: OwnedUnits<U> + ?Sized,
    F: Fn(&U) -> bool + Send,
{
    let owned = store.list_owned(owner).await?;
    let mut deleted = Vec::new();

    for unit in owned {
        if keep(&unit) {
            continue;
        }

        let key = unit.key();
        if store.delete_unit(&key).await? {
            tracing::info!(
                owner = %owner,
                kind = U::KIND.as_str(),
                unit = %key,
                "Deleted stale workload unit"
            );
            deleted.push(key);
        }
    }

    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use drone_store::{DroneStore, InMemoryStore, StoreError};
    use drone_types::{Drone, ObjectMeta, OwnerReference};
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    fn owned_pod(name: &str, owner: &Drone) -> Pod {
        Pod {
            metadata: ObjectMeta::new(owner.metadata.namespace.clone(), name)
                .with_owner(OwnerReference::controller_of(owner)),
            spec: Default::default(),
            status: Default::default(),
        }
    }

    #[test]
    fn test_index_values_ignore_foreign_owners() {
        let drone = Drone::new("fleet", "d1");
        assert_eq!(owner_index_values(&owned_pod("p", &drone)), vec!["d1"]);

        let mut foreign = owned_pod("q", &drone);
        foreign.metadata.owner_references[0].kind = "ReplicaSet".into();
        assert!(owner_index_values(&foreign).is_empty());

        let mut loose = owned_pod("r", &drone);
        loose.metadata.owner_references[0].controller = false;
        assert!(owner_index_values(&loose).is_empty());
    }

    #[tokio::test]
    async fn test_deletes_only_non_matching_units() {
        let store = InMemoryStore::new();
        register_owner_indexes(&store).await.unwrap();
        let drone = store.create_drone(Drone::new("fleet", "b")).await.unwrap();
        for name in ["a", "b", "c"] {
            store.create_pod(owned_pod(name, &drone)).await.unwrap();
        }

        let deleted = reconcile_owned_units::<Pod, _, _>(&store, &drone.key(), |pod: &Pod| {
            pod.metadata.name == "b"
        })
        .await
        .unwrap();

        let deleted: BTreeSet<String> = deleted.into_iter().map(|k| k.name).collect();
        assert_eq!(deleted, BTreeSet::from(["a".to_string(), "c".to_string()]));

        let left: Vec<String> = store
            .list_pods(Some("fleet"))
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.metadata.name)
            .collect();
        assert_eq!(left, vec!["b"]);
    }

    /// Serves a fixed owned set and fails deleting one named unit
    struct FlakyUnits {
        units: Vec<Pod>,
        fail_on: &'static str,
        deleted: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl OwnedUnits<Pod> for FlakyUnits {
        async fn list_owned(&self, _owner: &ObjectKey) -> StoreResult<Vec<Pod>> {
            Ok(self.units.clone())
        }

        async fn delete_unit(&self, key: &ObjectKey) -> StoreResult<bool> {
            if key.name == self.fail_on {
                return Err(StoreError::Unavailable("connection reset".into()));
            }
            self.deleted.lock().unwrap().push(key.name.clone());
            Ok(true)
        }
    }

    #[tokio::test]
    async fn test_failed_delete_aborts_the_pass() {
        let drone = Drone::new("fleet", "keep");
        let fake = FlakyUnits {
            units: ["a", "b", "c"].iter().map(|n| owned_pod(n, &drone)).collect(),
            fail_on: "b",
            deleted: Mutex::new(Vec::new()),
        };

        let err = reconcile_owned_units::<Pod, _, _>(&fake, &drone.key(), |_: &Pod| false)
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Unavailable(_)));
        assert_eq!(*fake.deleted.lock().unwrap(), vec!["a"]);
    }
}
