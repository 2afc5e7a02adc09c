//! Configuration for drone-daemon

use drone_controller::{ControllerConfig, RuntimeConfig};
use serde::{Deserialize, Serialize};

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Reconciler configuration
    #[serde(default)]
    pub controller: ControllerConfig,

    /// Work queue and resync configuration
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Development scheduler
    #[serde(default)]
    pub simulator: SimulatorConfig,

    /// Records loaded into the store at startup
    #[serde(default)]
    pub seed: SeedConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Scheduler simulator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// Run the simulator alongside the controller
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Interval between simulator passes in milliseconds
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,

    /// Probability that a pending pod fails instead of starting
    #[serde(default)]
    pub failure_rate: f64,

    /// Fixed RNG seed for reproducible runs
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_interval_ms: default_tick_interval(),
            failure_rate: 0.0,
            seed: None,
        }
    }
}

/// Startup records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedConfig {
    /// Namespace for seeded swarms without one
    #[serde(default = "default_namespace")]
    pub namespace: String,

    #[serde(default)]
    pub machines: Vec<MachineSeed>,

    #[serde(default)]
    pub swarms: Vec<SwarmSeed>,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            machines: (0..3)
                .map(|i| MachineSeed {
                    name: format!("rockpi{}", i),
                    eligible: true,
                })
                .collect(),
            swarms: vec![SwarmSeed {
                name: "swarm".to_string(),
                namespace: None,
                howmany: Some(2),
            }],
        }
    }
}

/// A machine to register
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineSeed {
    pub name: String,

    /// Carries the controller's role label
    #[serde(default = "default_true")]
    pub eligible: bool,
}

/// A swarm to create
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmSeed {
    pub name: String,

    #[serde(default)]
    pub namespace: Option<String>,

    #[serde(default)]
    pub howmany: Option<i32>,
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_tick_interval() -> u64 {
    500
}

fn default_namespace() -> String {
    "default".to_string()
}

impl DaemonConfig {
    /// Load configuration: defaults, then the optional file, then `DRONE_*`
    /// environment variables (`DRONE_RUNTIME__WORKERS=4`)
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        // Add default configuration
        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        // Add file configuration if provided
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("DRONE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), String> {
        self.controller.validate().map_err(|e| e.to_string())?;
        self.runtime.validate().map_err(|e| e.to_string())?;
        if !(0.0..=1.0).contains(&self.simulator.failure_rate) {
            return Err(format!(
                "simulator.failure_rate must be within 0..=1, got {}",
                self.simulator.failure_rate
            ));
        }
        if self.simulator.tick_interval_ms == 0 {
            return Err("simulator.tick_interval_ms must be positive".to_string());
        }
        Ok(())
    }
}
