//! Engine configuration format.
//!
//! The engine reads a single TOML document. Every key is optional; an empty
//! document yields [`EngineConfig::default`].
//!
//! # Example
//!
//! ```toml
//! batch_concurrency = 8
//! default_deadline_ms = 2000
//!
//! [authorization]
//! default_allow = true
//!
//! [authorization.actors]
//! alice = ["warehouse"]
//! bob = ["support"]
//!
//! [[authorization.rules]]
//! kind = "order"
//! from = "PROCESSING"
//! to = "SHIPPED"
//! roles = ["warehouse"]
//!
//! [[authorization.rules]]
//! kind = "managed_device"
//! command = "push_firmware"
//! roles = ["firmware"]
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::lifecycle::EntityKind;

// ── Types ─────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not parse engine config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid engine config: {0}")]
    Invalid(String),
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// How many batch items may be in flight at once. `1` runs them
    /// sequentially; `0` is rejected.
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,
    /// Deadline applied to requests that carry none. Unset means no deadline.
    #[serde(default)]
    pub default_deadline_ms: Option<u64>,
    /// Role table for [`RolePolicy`](crate::guard::RolePolicy). When absent the
    /// caller supplies its own authorization provider.
    #[serde(default)]
    pub authorization: Option<RolePolicyConfig>,
}

fn default_batch_concurrency() -> usize {
    1
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_concurrency: default_batch_concurrency(),
            default_deadline_ms: None,
            authorization: None,
        }
    }
}

/// `[authorization]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RolePolicyConfig {
    /// Answer for operations no rule mentions.
    #[serde(default)]
    pub default_allow: bool,
    /// Roles held by each actor, keyed by actor id.
    #[serde(default)]
    pub actors: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub rules: Vec<RoleRuleConfig>,
}

/// One `[[authorization.rules]]` entry. Exactly one of `to` or `command` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoleRuleConfig {
    pub kind: EntityKind,
    /// Source state code. Unset matches any source state.
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
    pub roles: Vec<String>,
}

// ── Functions ─────────────────────────────────────────────────────────────────

impl EngineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a config file from `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "batch_concurrency must be at least 1".to_string(),
            ));
        }
        if let Some(authorization) = &self.authorization {
            authorization.validate()?;
        }
        Ok(())
    }

    pub fn default_deadline(&self) -> Option<Duration> {
        self.default_deadline_ms.map(Duration::from_millis)
    }
}

impl RolePolicyConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (i, rule) in self.rules.iter().enumerate() {
            match (&rule.to, &rule.command) {
                (Some(_), None) | (None, Some(_)) => {}
                (Some(_), Some(_)) => {
                    return Err(ConfigError::Invalid(format!(
                        "rule {i} ({}) sets both 'to' and 'command'",
                        rule.kind
                    )))
                }
                (None, None) => {
                    return Err(ConfigError::Invalid(format!(
                        "rule {i} ({}) needs either 'to' or 'command'",
                        rule.kind
                    )))
                }
            }
            if rule.command.is_some() && rule.from.is_some() {
                return Err(ConfigError::Invalid(format!(
                    "rule {i} ({}) is a command rule and cannot set 'from'",
                    rule.kind
                )));
            }
            if rule.roles.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "rule {i} ({}) grants no roles",
                    rule.kind
                )));
            }
            for code in rule.from.iter().chain(&rule.to) {
                if !rule.kind.has_state(code) {
                    return Err(ConfigError::Invalid(format!(
                        "rule {i} ({}) names unknown state '{code}'",
                        rule.kind
                    )));
                }
            }
            if let Some(command) = rule.command.as_deref() {
                if !rule.kind.has_command(command) {
                    return Err(ConfigError::Invalid(format!(
                        "rule {i} ({}) names unknown command '{command}'",
                        rule.kind
                    )));
                }
            }
        }
        Ok(())
    }
}
