//! Configuration types for the public IP publisher
//!
//! This module defines all configuration structures used throughout the crate.
//! A [`PublisherConfig`] is resolved once at startup, validated, and then
//! handed to the engine by value; nothing reads settings ambiently.

use serde::{Deserialize, Serialize};

use crate::schedule::Schedule;

/// Main publisher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublisherConfig {
    /// Name of the node this process publishes for
    pub node_name: String,

    /// Annotation keys that receive the public IP
    pub annotation_keys: Vec<String>,

    /// Whether to also manage the node's `ExternalIP` status address
    #[serde(default)]
    pub set_external_ip: bool,

    /// Cycle schedule
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Public IP resolver settings
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// How to reach the cluster
    #[serde(default)]
    pub cluster: ClusterConfig,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl PublisherConfig {
    /// Create a configuration with defaults for everything but the target
    pub fn new(node_name: impl Into<String>, annotation_keys: Vec<String>) -> Self {
        Self {
            node_name: node_name.into(),
            annotation_keys,
            set_external_ip: false,
            schedule: ScheduleConfig::default(),
            resolver: ResolverConfig::default(),
            cluster: ClusterConfig::default(),
            engine: EngineConfig::default(),
        }
    }

    /// Enable or disable external-IP management
    pub fn with_external_ip(mut self, enabled: bool) -> Self {
        self.set_external_ip = enabled;
        self
    }

    /// Validate the configuration
    ///
    /// Duplicate annotation keys are removed (first occurrence wins) so
    /// every generated patch path is unique.
    pub fn validate(&mut self) -> Result<(), crate::Error> {
        if self.node_name.trim().is_empty() {
            return Err(crate::Error::config("node name cannot be empty"));
        }

        if self.annotation_keys.is_empty() {
            return Err(crate::Error::config("at least one annotation is required"));
        }
        if self.annotation_keys.iter().any(|key| key.is_empty()) {
            return Err(crate::Error::config("annotation keys cannot be empty"));
        }
        let mut seen = std::collections::HashSet::new();
        self.annotation_keys.retain(|key| seen.insert(key.clone()));

        self.schedule.validate()?;
        self.resolver.validate()?;
        self.cluster.validate()?;
        self.engine.validate()?;

        Ok(())
    }
}

/// Schedule configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// `@every <duration>` or a seconds-resolution cron expression
    #[serde(default = "default_schedule_expression")]
    pub expression: String,

    /// Run once at startup only
    #[serde(default)]
    pub disabled: bool,
}

impl ScheduleConfig {
    /// Validate the schedule configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.disabled {
            return Ok(());
        }
        self.parse().map(|_| ())
    }

    /// Parse the expression
    pub fn parse(&self) -> Result<Schedule, crate::Error> {
        Schedule::parse(&self.expression)
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            expression: default_schedule_expression(),
            disabled: false,
        }
    }
}

/// Public IP resolver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Mirror endpoints, tried in order
    #[serde(default = "default_mirrors")]
    pub mirrors: Vec<String>,

    /// Per-request timeout (in seconds)
    #[serde(default = "default_resolver_timeout_secs")]
    pub timeout_secs: u64,
}

impl ResolverConfig {
    /// Validate the resolver configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.mirrors.is_empty() {
            return Err(crate::Error::config("at least one IP mirror is required"));
        }
        for mirror in &self.mirrors {
            if !mirror.starts_with("https://") && !mirror.starts_with("http://") {
                return Err(crate::Error::config(format!(
                    "IP mirror must use HTTP or HTTPS scheme. Got: {mirror}"
                )));
            }
        }
        if self.timeout_secs == 0 {
            return Err(crate::Error::config("IP resolver timeout must be > 0"));
        }
        Ok(())
    }

    /// Overall deadline for one resolution
    ///
    /// Long enough for every mirror to use its full per-request timeout,
    /// so the last mirror still gets its turn.
    pub fn deadline_secs(&self) -> u64 {
        let mirrors = self.mirrors.len().max(1) as u64;
        mirrors
            .saturating_mul(self.timeout_secs)
            .saturating_add(RESOLVE_DEADLINE_SLACK_SECS)
    }
}

/// Added to the summed mirror timeouts in [`ResolverConfig::deadline_secs`]
const RESOLVE_DEADLINE_SLACK_SECS: u64 = 2;

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            mirrors: default_mirrors(),
            timeout_secs: default_resolver_timeout_secs(),
        }
    }
}

/// Cluster authentication mode
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClusterConfig {
    /// Service-account credentials mounted into the pod
    #[default]
    InCluster,

    /// A kubeconfig file
    Kubeconfig {
        /// Path to the kubeconfig file
        path: String,
    },
}

impl ClusterConfig {
    /// Validate the cluster configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            ClusterConfig::Kubeconfig { path } if path.is_empty() => {
                Err(crate::Error::config("kubeconfig path cannot be empty"))
            }
            _ => Ok(()),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Deadline for each cluster store call (in seconds)
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    /// Capacity of the engine event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl EngineConfig {
    /// Validate the engine configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.call_timeout_secs == 0 {
            return Err(crate::Error::config("call timeout must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("event channel capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            call_timeout_secs: default_call_timeout_secs(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

/// Default cycle schedule
pub const DEFAULT_SCHEDULE: &str = "@every 5m";

/// Default public IP mirrors
pub const DEFAULT_MIRRORS: &[&str] = &["https://api.ipify.org", "http://checkip.amazonaws.com"];

fn default_schedule_expression() -> String {
    DEFAULT_SCHEDULE.to_string()
}

fn default_mirrors() -> Vec<String> {
    DEFAULT_MIRRORS.iter().map(|m| m.to_string()).collect()
}

fn default_resolver_timeout_secs() -> u64 {
    10
}

fn default_call_timeout_secs() -> u64 {
    30
}

fn default_event_channel_capacity() -> usize {
    100
}
