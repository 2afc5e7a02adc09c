//! Workload units owned by Drones
//!
//! A [`Pod`] is a single scheduled process bound to one machine. A
//! [`Deployment`] is a replicated set stamped out from a [`PodTemplate`].

use crate::meta::{HasStatus, ObjectMeta, Resource, ResourceKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Environment variable passed to a container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

/// A container within a pod
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub name: String,
    pub image: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodSpec {
    /// Machine the pod is bound to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,

    #[serde(default)]
    pub containers: Vec<Container>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PodPhase {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodStatus {
    #[serde(default)]
    pub phase: PodPhase,
}

/// A single scheduled process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pod {
    pub metadata: ObjectMeta,

    #[serde(default)]
    pub spec: PodSpec,

    #[serde(default)]
    pub status: PodStatus,
}

impl Pod {
    pub fn node_name(&self) -> Option<&str> {
        self.spec.node_name.as_deref()
    }
}

impl Resource for Pod {
    const KIND: ResourceKind = ResourceKind::Pod;

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

impl HasStatus for Pod {
    type Status = PodStatus;

    fn status(&self) -> &PodStatus {
        &self.status
    }

    fn status_mut(&mut self) -> &mut PodStatus {
        &mut self.status
    }
}

/// Pod blueprint used by a replicated set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodTemplate {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    pub spec: PodSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentSpec {
    /// Declared replica count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub selector: BTreeMap<String, String>,

    pub template: PodTemplate,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentStatus {
    /// Replicas the scheduler reports as present
    #[serde(default)]
    pub replicas: i32,
}

/// A replicated workload set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    pub metadata: ObjectMeta,
    pub spec: DeploymentSpec,

    #[serde(default)]
    pub status: DeploymentStatus,
}

impl Deployment {
    /// Declared replicas; an unset count means one, as schedulers treat it
    pub fn declared_replicas(&self) -> i32 {
        self.spec.replicas.unwrap_or(1)
    }
}

impl Resource for Deployment {
    const KIND: ResourceKind = ResourceKind::Deployment;

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

impl HasStatus for Deployment {
    type Status = DeploymentStatus;

    fn status(&self) -> &DeploymentStatus {
        &self.status
    }

    fn status_mut(&mut self) -> &mut DeploymentStatus {
        &mut self.status
    }
}
