//! Drone Store - the resource store client consumed by the reconcilers
//!
//! The reconcilers never talk to a concrete backend. They go through the
//! per-kind traits in [`traits`], combined into [`ClusterStore`]:
//!
//! - **get / list / create / update / update_status / delete** per kind
//! - **field indexes** registered once at startup (owner lookup)
//! - **watch** stream of [`drone_types::WatchEvent`] after every write
//!
//! ## In-Memory vs Persistent
//!
//! [`InMemoryStore`] keeps every record in ordered maps and implements the
//! optimistic-concurrency and cascade semantics a real control-plane store
//! provides. It backs the daemon's development mode and all tests.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::{InMemoryStore, WriteStats};
pub use traits::{
    ClusterStore, DeploymentStore, DroneStore, IndexFn, MachineStore, PodStore, SwarmStore,
    WatchSource,
};
