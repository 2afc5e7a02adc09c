//! In-memory store implementation
//!
//! Records live in ordered maps keyed by `(namespace, name)`, so listing order
//! is stable and matches what a control-plane store returns. Every write bumps
//! a store-wide resource version and is broadcast to watchers.

use crate::error::{StoreError, StoreResult};
use crate::traits::*;
use async_trait::async_trait;
use drone_types::{
    Deployment, Drone, HasStatus, Machine, ObjectKey, ObjectMeta, Pod, Resource, ResourceKind,
    Swarm, WatchAction, WatchEvent,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

const DEFAULT_WATCH_CAPACITY: usize = 1024;

/// Client writes accepted by the store. Cascade deletions are not counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteStats {
    pub creates: u64,
    pub updates: u64,
    pub status_updates: u64,
    pub deletes: u64,
}

impl WriteStats {
    pub fn total(&self) -> u64 {
        self.creates + self.updates + self.status_updates + self.deletes
    }
}

#[derive(Debug, Default)]
struct WriteCounters {
    creates: AtomicU64,
    updates: AtomicU64,
    status_updates: AtomicU64,
    deletes: AtomicU64,
}

/// One record kind with its field indexes
struct Table<K: Resource> {
    items: BTreeMap<ObjectKey, K>,
    indexers: HashMap<String, IndexFn<K>>,
    indices: HashMap<String, HashMap<String, BTreeSet<ObjectKey>>>,
}

impl<K: Resource> Table<K> {
    fn new() -> Self {
        Self {
            items: BTreeMap::new(),
            indexers: HashMap::new(),
            indices: HashMap::new(),
        }
    }

    fn get(&self, key: &ObjectKey) -> Option<K> {
        self.items.get(key).cloned()
    }

    fn list(&self, namespace: Option<&str>) -> Vec<K> {
        self.items
            .values()
            .filter(|obj| namespace.map_or(true, |ns| obj.meta().namespace == ns))
            .cloned()
            .collect()
    }

    fn by_index(&self, namespace: &str, index: &str, value: &str) -> StoreResult<Vec<K>> {
        let entries = self
            .indices
            .get(index)
            .ok_or_else(|| StoreError::IndexNotFound {
                kind: K::KIND,
                index: index.to_string(),
            })?;

        Ok(entries
            .get(value)
            .map(|keys| {
                keys.iter()
                    .filter(|key| key.namespace == namespace)
                    .filter_map(|key| self.items.get(key).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    fn put(&mut self, obj: K) {
        let key = obj.key();
        if let Some(old) = self.items.remove(&key) {
            self.unindex(&key, &old);
        }
        self.index(&key, &obj);
        self.items.insert(key, obj);
    }

    fn take(&mut self, key: &ObjectKey) -> Option<K> {
        let old = self.items.remove(key)?;
        self.unindex(key, &old);
        Some(old)
    }

    fn add_indexer(&mut self, name: &str, extract: IndexFn<K>) {
        let mut entries: HashMap<String, BTreeSet<ObjectKey>> = HashMap::new();
        for (key, obj) in &self.items {
            for value in extract(obj) {
                entries.entry(value).or_default().insert(key.clone());
            }
        }
        self.indices.insert(name.to_string(), entries);
        self.indexers.insert(name.to_string(), extract);
    }

    fn index(&mut self, key: &ObjectKey, obj: &K) {
        for (name, extract) in &self.indexers {
            let entries = self.indices.entry(name.clone()).or_default();
            for value in extract(obj) {
                entries.entry(value).or_default().insert(key.clone());
            }
        }
    }

    fn unindex(&mut self, key: &ObjectKey, obj: &K) {
        for (name, extract) in &self.indexers {
            let Some(entries) = self.indices.get_mut(name) else {
                continue;
            };
            for value in extract(obj) {
                if let Some(keys) = entries.get_mut(&value) {
                    keys.remove(key);
                    if keys.is_empty() {
                        entries.remove(&value);
                    }
                }
            }
        }
    }
}

/// In-memory cluster store for development and testing
pub struct InMemoryStore {
    swarms: RwLock<Table<Swarm>>,
    drones: RwLock<Table<Drone>>,
    pods: RwLock<Table<Pod>>,
    deployments: RwLock<Table<Deployment>>,
    machines: RwLock<Table<Machine>>,
    version: AtomicU64,
    counters: WriteCounters,
    events: broadcast::Sender<WatchEvent>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::with_watch_capacity(DEFAULT_WATCH_CAPACITY)
    }

    /// Create an empty store whose watch channel buffers `capacity` events
    pub fn with_watch_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            swarms: RwLock::new(Table::new()),
            drones: RwLock::new(Table::new()),
            pods: RwLock::new(Table::new()),
            deployments: RwLock::new(Table::new()),
            machines: RwLock::new(Table::new()),
            version: AtomicU64::new(0),
            counters: WriteCounters::default(),
            events,
        }
    }

    /// Snapshot of client writes accepted so far
    pub fn write_stats(&self) -> WriteStats {
        WriteStats {
            creates: self.counters.creates.load(Ordering::Relaxed),
            updates: self.counters.updates.load(Ordering::Relaxed),
            status_updates: self.counters.status_updates.load(Ordering::Relaxed),
            deletes: self.counters.deletes.load(Ordering::Relaxed),
        }
    }

    fn next_version(&self) -> u64 {
        self.version.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn emit(&self, kind: ResourceKind, action: WatchAction, meta: ObjectMeta) {
        // No subscribers is fine
        let _ = self.events.send(WatchEvent { kind, action, meta });
    }

    fn validate<K: Resource>(obj: &K) -> StoreResult<()> {
        let meta = obj.meta();
        if meta.name.is_empty() {
            return Err(StoreError::InvalidObject {
                kind: K::KIND,
                reason: "name must not be empty".into(),
            });
        }
        if K::NAMESPACED && meta.namespace.is_empty() {
            return Err(StoreError::InvalidObject {
                kind: K::KIND,
                reason: format!("{} must be namespaced", meta.name),
            });
        }
        Ok(())
    }

    async fn create_in<K: Resource>(
        &self,
        table: &RwLock<Table<K>>,
        mut obj: K,
    ) -> StoreResult<K> {
        Self::validate(&obj)?;
        if !K::NAMESPACED {
            obj.meta_mut().namespace.clear();
        }
        let key = obj.key();

        {
            let mut table = table.write().await;
            if table.items.contains_key(&key) {
                return Err(StoreError::AlreadyExists { kind: K::KIND, key });
            }

            let version = self.next_version();
            let meta = obj.meta_mut();
            meta.uid = Some(Uuid::new_v4().to_string());
            meta.resource_version = Some(version);
            meta.creation_timestamp = Some(chrono::Utc::now());
            table.put(obj.clone());
        }

        self.counters.creates.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(kind = K::KIND.as_str(), key = %key, "Record created");
        self.emit(K::KIND, WatchAction::Added, obj.meta().clone());
        Ok(obj)
    }

    /// Compare-and-swap replacement of a stored record.
    ///
    /// A caller-supplied resource version must match the stored one. Identity
    /// fields always come from the stored record.
    async fn replace_in<K, F>(
        &self,
        table: &RwLock<Table<K>>,
        incoming: K,
        merge: F,
    ) -> StoreResult<K>
    where
        K: Resource,
        F: FnOnce(&K, K) -> K + Send,
    {
        let key = incoming.key();

        let next = {
            let mut table = table.write().await;
            let stored = table.get(&key).ok_or_else(|| StoreError::NotFound {
                kind: K::KIND,
                key: key.clone(),
            })?;

            let current = stored.meta().resource_version.unwrap_or_default();
            if let Some(expected) = incoming.meta().resource_version {
                if expected != current {
                    return Err(StoreError::Conflict {
                        kind: K::KIND,
                        key,
                        expected,
                        current,
                    });
                }
            }

            let mut next = merge(&stored, incoming);
            let version = self.next_version();
            let stored_meta = stored.meta();
            let meta = next.meta_mut();
            meta.name = stored_meta.name.clone();
            meta.namespace = stored_meta.namespace.clone();
            meta.uid = stored_meta.uid.clone();
            meta.creation_timestamp = stored_meta.creation_timestamp;
            meta.resource_version = Some(version);
            table.put(next.clone());
            next
        };

        self.emit(K::KIND, WatchAction::Modified, next.meta().clone());
        Ok(next)
    }

    async fn update_in<K: HasStatus>(&self, table: &RwLock<Table<K>>, obj: K) -> StoreResult<K> {
        let updated = self
            .replace_in(table, obj, |stored, mut incoming| {
                *incoming.status_mut() = stored.status().clone();
                incoming
            })
            .await?;
        self.counters.updates.fetch_add(1, Ordering::Relaxed);
        Ok(updated)
    }

    async fn update_status_in<K: HasStatus>(
        &self,
        table: &RwLock<Table<K>>,
        obj: K,
    ) -> StoreResult<K> {
        let updated = self
            .replace_in(table, obj, |stored, incoming| {
                let mut next = stored.clone();
                *next.status_mut() = incoming.status().clone();
                next
            })
            .await?;
        self.counters.status_updates.fetch_add(1, Ordering::Relaxed);
        Ok(updated)
    }

    async fn delete_in<K: Resource>(
        &self,
        table: &RwLock<Table<K>>,
        key: &ObjectKey,
    ) -> StoreResult<bool> {
        let removed = table.write().await.take(key);
        let Some(obj) = removed else {
            return Ok(false);
        };

        self.counters.deletes.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(kind = K::KIND.as_str(), key = %key, "Record deleted");
        self.emit(K::KIND, WatchAction::Deleted, obj.meta().clone());

        if let Some(uid) = obj.meta().uid.as_deref() {
            self.delete_dependents(uid).await;
        }
        Ok(true)
    }

    /// Cascade deletion of workload units owned by `owner_uid`
    async fn delete_dependents(&self, owner_uid: &str) {
        for pod in Self::take_owned(&self.pods, owner_uid).await {
            tracing::debug!(pod = %pod.key(), "Cascade-deleted pod");
            self.emit(ResourceKind::Pod, WatchAction::Deleted, pod.metadata);
        }
        for deployment in Self::take_owned(&self.deployments, owner_uid).await {
            tracing::debug!(deployment = %deployment.key(), "Cascade-deleted deployment");
            self.emit(
                ResourceKind::Deployment,
                WatchAction::Deleted,
                deployment.metadata,
            );
        }
    }

    async fn take_owned<K: Resource>(table: &RwLock<Table<K>>, owner_uid: &str) -> Vec<K> {
        let mut table = table.write().await;
        let keys: Vec<ObjectKey> = table
            .items
            .iter()
            .filter(|(_, obj)| obj.meta().is_owned_by_uid(owner_uid))
            .map(|(key, _)| key.clone())
            .collect();
        keys.iter().filter_map(|key| table.take(key)).collect()
    }
}

#[async_trait]
impl SwarmStore for InMemoryStore {
    async fn get_swarm(&self, key: &ObjectKey) -> StoreResult<Option<Swarm>> {
        Ok(self.swarms.read().await.get(key))
    }

    async fn list_swarms(&self, namespace: Option<&str>) -> StoreResult<Vec<Swarm>> {
        Ok(self.swarms.read().await.list(namespace))
    }

    async fn create_swarm(&self, swarm: Swarm) -> StoreResult<Swarm> {
        self.create_in(&self.swarms, swarm).await
    }

    async fn update_swarm(&self, swarm: Swarm) -> StoreResult<Swarm> {
        self.update_in(&self.swarms, swarm).await
    }

    async fn update_swarm_status(&self, swarm: Swarm) -> StoreResult<Swarm> {
        self.update_status_in(&self.swarms, swarm).await
    }

    async fn delete_swarm(&self, key: &ObjectKey) -> StoreResult<bool> {
        self.delete_in(&self.swarms, key).await
    }
}

#[async_trait]
impl DroneStore for InMemoryStore {
    async fn get_drone(&self, key: &ObjectKey) -> StoreResult<Option<Drone>> {
        Ok(self.drones.read().await.get(key))
    }

    async fn list_drones(&self, namespace: Option<&str>) -> StoreResult<Vec<Drone>> {
        Ok(self.drones.read().await.list(namespace))
    }

    async fn create_drone(&self, drone: Drone) -> StoreResult<Drone> {
        self.create_in(&self.drones, drone).await
    }

    async fn update_drone(&self, drone: Drone) -> StoreResult<Drone> {
        self.update_in(&self.drones, drone).await
    }

    async fn update_drone_status(&self, drone: Drone) -> StoreResult<Drone> {
        self.update_status_in(&self.drones, drone).await
    }

    async fn delete_drone(&self, key: &ObjectKey) -> StoreResult<bool> {
        self.delete_in(&self.drones, key).await
    }
}

#[async_trait]
impl PodStore for InMemoryStore {
    async fn get_pod(&self, key: &ObjectKey) -> StoreResult<Option<Pod>> {
        Ok(self.pods.read().await.get(key))
    }

    async fn list_pods(&self, namespace: Option<&str>) -> StoreResult<Vec<Pod>> {
        Ok(self.pods.read().await.list(namespace))
    }

    async fn list_pods_by_index(
        &self,
        namespace: &str,
        index: &str,
        value: &str,
    ) -> StoreResult<Vec<Pod>> {
        self.pods.read().await.by_index(namespace, index, value)
    }

    async fn create_pod(&self, pod: Pod) -> StoreResult<Pod> {
        self.create_in(&self.pods, pod).await
    }

    async fn update_pod(&self, pod: Pod) -> StoreResult<Pod> {
        self.update_in(&self.pods, pod).await
    }

    async fn update_pod_status(&self, pod: Pod) -> StoreResult<Pod> {
        self.update_status_in(&self.pods, pod).await
    }

    async fn delete_pod(&self, key: &ObjectKey) -> StoreResult<bool> {
        self.delete_in(&self.pods, key).await
    }

    async fn index_pods(&self, index: &str, extract: IndexFn<Pod>) -> StoreResult<()> {
        self.pods.write().await.add_indexer(index, extract);
        Ok(())
    }
}

#[async_trait]
impl DeploymentStore for InMemoryStore {
    async fn get_deployment(&self, key: &ObjectKey) -> StoreResult<Option<Deployment>> {
        Ok(self.deployments.read().await.get(key))
    }

    async fn list_deployments(&self, namespace: Option<&str>) -> StoreResult<Vec<Deployment>> {
        Ok(self.deployments.read().await.list(namespace))
    }

    async fn list_deployments_by_index(
        &self,
        namespace: &str,
        index: &str,
        value: &str,
    ) -> StoreResult<Vec<Deployment>> {
        self.deployments.read().await.by_index(namespace, index, value)
    }

    async fn create_deployment(&self, deployment: Deployment) -> StoreResult<Deployment> {
        self.create_in(&self.deployments, deployment).await
    }

    async fn update_deployment(&self, deployment: Deployment) -> StoreResult<Deployment> {
        self.update_in(&self.deployments, deployment).await
    }

    async fn update_deployment_status(&self, deployment: Deployment) -> StoreResult<Deployment> {
        self.update_status_in(&self.deployments, deployment).await
    }

    async fn delete_deployment(&self, key: &ObjectKey) -> StoreResult<bool> {
        self.delete_in(&self.deployments, key).await
    }

    async fn index_deployments(
        &self,
        index: &str,
        extract: IndexFn<Deployment>,
    ) -> StoreResult<()> {
        self.deployments.write().await.add_indexer(index, extract);
        Ok(())
    }
}

#[async_trait]
impl MachineStore for InMemoryStore {
    async fn get_machine(&self, name: &str) -> StoreResult<Option<Machine>> {
        Ok(self.machines.read().await.get(&ObjectKey::cluster(name)))
    }

    async fn list_machines(&self) -> StoreResult<Vec<Machine>> {
        Ok(self.machines.read().await.list(None))
    }

    async fn create_machine(&self, machine: Machine) -> StoreResult<Machine> {
        self.create_in(&self.machines, machine).await
    }

    async fn delete_machine(&self, name: &str) -> StoreResult<bool> {
        self.delete_in(&self.machines, &ObjectKey::cluster(name)).await
    }
}

impl WatchSource for InMemoryStore {
    fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.events.subscribe()
    }
}
