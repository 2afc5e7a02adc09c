//! Controller and runtime configuration

use crate::error::{ReconcileError, ReconcileResult};
use drone_types::RoleSelector;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Which workload backs each Drone. Chosen once at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    /// One pod per Drone, each on its own machine
    #[default]
    PodPerNode,

    /// One shared replicated set per namespace
    Replicated,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::PodPerNode => "pod-per-node",
            StrategyKind::Replicated => "replicated",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pod-per-node" | "pod" | "node" => Ok(StrategyKind::PodPerNode),
            "replicated" | "deployment" | "replicas" => Ok(StrategyKind::Replicated),
            other => Err(ReconcileError::Config(format!(
                "Unknown workload strategy: {}",
                other
            ))),
        }
    }
}

/// Reconciler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Workload strategy
    #[serde(default)]
    pub strategy: StrategyKind,

    /// Label marking machines eligible to host drones
    #[serde(default = "default_role_label")]
    pub role_label: String,

    /// Required role label value; presence is enough when unset
    #[serde(default)]
    pub role_value: Option<String>,

    /// Container image run by every workload unit
    #[serde(default = "default_image")]
    pub image: String,

    /// Container name inside every workload unit
    #[serde(default = "default_container_name")]
    pub container_name: String,

    /// Environment variable carrying the assigned machine name
    #[serde(default = "default_node_env")]
    pub node_env: String,

    /// Name of the shared replicated set (replicated strategy)
    #[serde(default = "default_deployment_name")]
    pub deployment_name: String,

    /// Selector label key stamped on the replicated set and its template
    #[serde(default = "default_selector_label")]
    pub selector_label: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::default(),
            role_label: default_role_label(),
            role_value: None,
            image: default_image(),
            container_name: default_container_name(),
            node_env: default_node_env(),
            deployment_name: default_deployment_name(),
            selector_label: default_selector_label(),
        }
    }
}

impl ControllerConfig {
    pub fn role_selector(&self) -> RoleSelector {
        RoleSelector {
            label: self.role_label.clone(),
            value: self.role_value.clone(),
        }
    }

    pub fn validate(&self) -> ReconcileResult<()> {
        let required = [
            ("role_label", &self.role_label),
            ("image", &self.image),
            ("container_name", &self.container_name),
            ("deployment_name", &self.deployment_name),
            ("selector_label", &self.selector_label),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ReconcileError::Config(format!("{} must not be empty", field)));
            }
        }
        Ok(())
    }
}

/// Hosting runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Concurrent workers per reconciler
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Interval between full resyncs in seconds
    #[serde(default = "default_resync_interval")]
    pub resync_interval_secs: u64,

    /// Delay before re-checking a grounded drone, in seconds
    #[serde(default = "default_grounded_requeue")]
    pub grounded_requeue_secs: u64,

    /// First retry delay after a failure, in milliseconds
    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,

    /// Retry delay ceiling, in milliseconds
    #[serde(default = "default_backoff_max")]
    pub backoff_max_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            resync_interval_secs: default_resync_interval(),
            grounded_requeue_secs: default_grounded_requeue(),
            backoff_base_ms: default_backoff_base(),
            backoff_max_ms: default_backoff_max(),
        }
    }
}

impl RuntimeConfig {
    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs.max(1))
    }

    pub fn grounded_requeue(&self) -> Duration {
        Duration::from_secs(self.grounded_requeue_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms.max(self.backoff_base_ms))
    }

    pub fn validate(&self) -> ReconcileResult<()> {
        if self.workers == 0 {
            return Err(ReconcileError::Config("workers must be positive".into()));
        }
        if self.grounded_requeue_secs == 0 {
            return Err(ReconcileError::Config("grounded_requeue_secs must be positive".into()));
        }
        Ok(())
    }
}

// Default value helpers
fn default_role_label() -> String {
    "node-role.kubernetes.io/drone".to_string()
}

fn default_image() -> String {
    "danacr/drone-pod:latest".to_string()
}

fn default_container_name() -> String {
    "drone-pod".to_string()
}

fn default_node_env() -> String {
    "NODE".to_string()
}

fn default_deployment_name() -> String {
    "mydrones".to_string()
}

fn default_selector_label() -> String {
    "example-controller.jetstack.io/deployment-name".to_string()
}

fn default_workers() -> usize {
    2
}

fn default_resync_interval() -> u64 {
    30
}

fn default_grounded_requeue() -> u64 {
    60
}

fn default_backoff_base() -> u64 {
    100
}

fn default_backoff_max() -> u64 {
    30_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_controller_defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.strategy, StrategyKind::PodPerNode);
        assert_eq!(config.deployment_name, "mydrones");
        assert!(config.role_selector().value.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!(
            "Replicated".parse::<StrategyKind>().unwrap(),
            StrategyKind::Replicated
        );
        assert_eq!(
            "pod-per-node".parse::<StrategyKind>().unwrap(),
            StrategyKind::PodPerNode
        );
        assert!("round-robin".parse::<StrategyKind>().is_err());
    }

    #[test]
    fn test_runtime_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.workers, 2);
        assert_eq!(config.grounded_requeue(), Duration::from_secs(60));
        assert!(config.backoff_max() >= config.backoff_base());
        assert!(RuntimeConfig {
            workers: 0,
            ..Default::default()
        }
        .validate()
        .is_err());
    }

    #[test]
    fn test_grounded_requeue_must_be_positive() {
        let spinning = RuntimeConfig {
            grounded_requeue_secs: 0,
            ..Default::default()
        };
        assert!(matches!(
            spinning.validate(),
            Err(ReconcileError::Config(reason)) if reason.contains("grounded_requeue_secs")
        ));
    }
}
