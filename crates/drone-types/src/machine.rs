//! Machines from the cluster's node inventory

use crate::meta::{ObjectMeta, Resource, ResourceKind};
use serde::{Deserialize, Serialize};

/// A schedulable machine. Read-only to the reconcilers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Machine {
    pub metadata: ObjectMeta,
}

impl Machine {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            metadata: ObjectMeta::new(String::new(), name),
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.labels.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}

impl Resource for Machine {
    const KIND: ResourceKind = ResourceKind::Machine;
    const NAMESPACED: bool = false;

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

/// Role label marking machines eligible to host drones.
///
/// Without a value the label only has to be present, which is how node role
/// labels are usually applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSelector {
    pub label: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl RoleSelector {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: None,
        }
    }

    pub fn matches(&self, machine: &Machine) -> bool {
        match (machine.metadata.labels.get(&self.label), &self.value) {
            (Some(_), None) => true,
            (Some(actual), Some(expected)) => actual == expected,
            (None, _) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_selector_presence() {
        let selector = RoleSelector::new("node-role.kubernetes.io/drone");
        let labelled = Machine::new("a").with_label("node-role.kubernetes.io/drone", "");
        assert!(selector.matches(&labelled));
        assert!(!selector.matches(&Machine::new("b")));
    }

    #[test]
    fn test_role_selector_value() {
        let selector = RoleSelector {
            label: "role".into(),
            value: Some("drone".into()),
        };
        assert!(selector.matches(&Machine::new("a").with_label("role", "drone")));
        assert!(!selector.matches(&Machine::new("b").with_label("role", "gateway")));
    }
}
