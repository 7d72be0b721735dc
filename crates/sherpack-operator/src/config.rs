//! Operator watch configuration
//!
//! Owners are declared in a `watches.yaml` file:
//!
//! ```yaml
//! - group: example.com
//!   version: v1alpha1
//!   kind: Memcached
//!   watchDependentResources: true
//!   selector:
//!     app.kubernetes.io/managed-by: sherpack
//!   backoff:
//!     baseDelay: 5ms
//!     maxDelay: 16m 40s
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

use kube::core::GroupVersionKind;
use serde::{Deserialize, Serialize};

use crate::error::{OperatorError, Result};
use crate::event::EventFilter;

/// Retry backoff for reconcile requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackoffConfig {
    /// Delay before the first retry
    #[serde(default = "default_base_delay", with = "humantime_serde")]
    pub base_delay: Duration,

    /// Upper bound for any retry delay
    #[serde(default = "default_max_delay", with = "humantime_serde")]
    pub max_delay: Duration,
}

fn default_base_delay() -> Duration {
    Duration::from_millis(5)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(1000)
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay: default_base_delay(),
            max_delay: default_max_delay(),
        }
    }
}

impl BackoffConfig {
    /// Delay for the given retry attempt (0-based): `base * 2^attempt`, capped
    pub fn delay_for(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

/// One watched owner kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchConfig {
    /// API group of the owner (empty for the core group)
    #[serde(default)]
    pub group: String,

    /// API version of the owner
    pub version: String,

    /// Kind of the owner
    pub kind: String,

    /// Register watches for the resources each release creates
    #[serde(default = "default_true")]
    pub watch_dependent_resources: bool,

    /// Labels every watched dependent must carry
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub selector: BTreeMap<String, String>,

    /// Retry backoff
    #[serde(default)]
    pub backoff: BackoffConfig,
}

fn default_true() -> bool {
    true
}

impl WatchConfig {
    /// Create a config for an owner kind with default settings
    pub fn new(group: &str, version: &str, kind: &str) -> Self {
        Self {
            group: group.to_string(),
            version: version.to_string(),
            kind: kind.to_string(),
            watch_dependent_resources: true,
            selector: BTreeMap::new(),
            backoff: BackoffConfig::default(),
        }
    }

    /// Owner Group-Version-Kind
    pub fn gvk(&self) -> GroupVersionKind {
        GroupVersionKind::gvk(&self.group, &self.version, &self.kind)
    }

    /// Filters every dependent subscription carries
    pub fn event_filters(&self) -> Vec<EventFilter> {
        let mut filters = vec![EventFilter::DependentChanges];
        if !self.selector.is_empty() {
            filters.push(EventFilter::MatchLabels(self.selector.clone()));
        }
        filters
    }

    /// Validate required fields
    pub fn validate(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            return Err(OperatorError::InvalidConfig(format!(
                "watch for kind '{}' has an empty version",
                self.kind
            )));
        }
        if self.kind.trim().is_empty() {
            return Err(OperatorError::InvalidConfig(format!(
                "watch for group '{}' has an empty kind",
                self.group
            )));
        }
        if self.backoff.base_delay > self.backoff.max_delay {
            return Err(OperatorError::InvalidConfig(format!(
                "watch for kind '{}' has baseDelay greater than maxDelay",
                self.kind
            )));
        }
        Ok(())
    }
}

/// The full watches file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WatchesFile {
    pub watches: Vec<WatchConfig>,
}

impl WatchesFile {
    /// Load and validate a watches file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse and validate watches from YAML text
    pub fn parse(content: &str) -> Result<Self> {
        let file: Self = serde_yaml::from_str(content)?;
        file.validate()?;
        Ok(file)
    }

    /// Validate every entry and reject duplicate owner kinds
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for watch in &self.watches {
            watch.validate()?;
            if !seen.insert(watch.gvk()) {
                return Err(OperatorError::InvalidConfig(format!(
                    "duplicate watch for {}/{} {}",
                    watch.group, watch.version, watch.kind
                )));
            }
        }
        Ok(())
    }

    /// Find the watch for an owner kind
    pub fn get(&self, gvk: &GroupVersionKind) -> Option<&WatchConfig> {
        self.watches.iter().find(|w| &w.gvk() == gvk)
    }
}
