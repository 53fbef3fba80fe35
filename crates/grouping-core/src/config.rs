use crate::error::{GroupingError, Result};
use crate::paths;
use crate::policy::{Mode, Policy};
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// EventConfig / StoreConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// How often a running admin session checks the store file for commits
    /// made by other processes.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    250
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: u32,
    pub event: EventConfig,
    #[serde(default)]
    pub policy: Policy,
    #[serde(default)]
    pub store: StoreConfig,
}

/// Keys accepted by [`Config::set`].
pub const SETTABLE_KEYS: &[&str] = &[
    "event.name",
    "policy.mode",
    "policy.group_size",
    "policy.group_count",
    "policy.refresh_minutes",
    "store.poll_interval_ms",
];

impl Config {
    pub fn new(event_name: impl Into<String>) -> Self {
        Self {
            version: 1,
            event: EventConfig {
                name: event_name.into(),
                description: None,
            },
            policy: Policy::default(),
            store: StoreConfig::default(),
        }
    }

    pub fn load(root: &Path) -> Result<Self> {
        if !paths::is_initialized(root) {
            return Err(GroupingError::NotInitialized);
        }
        let data = std::fs::read_to_string(paths::config_path(root))?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    /// Set one dotted key from its string form. The policy keys also accept
    /// the bare field name (`group_size`).
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let key = key.trim();
        let field = key.strip_prefix("policy.").unwrap_or(key);
        let mut policy = self.policy.clone();
        match field {
            "event.name" => {
                let name = value.trim();
                if name.is_empty() {
                    return Err(GroupingError::InvalidPolicy("event name is empty".into()));
                }
                self.event.name = name.to_string();
                return Ok(());
            }
            "store.poll_interval_ms" => {
                self.store.poll_interval_ms = parse_number(key, value)?;
                return Ok(());
            }
            "mode" => policy.mode = value.parse::<Mode>()?,
            "group_size" => policy.group_size = parse_number(key, value)?,
            "group_count" => policy.group_count = parse_number(key, value)?,
            "refresh_minutes" => policy.refresh_minutes = parse_number(key, value)?,
            _ => {
                return Err(GroupingError::InvalidPolicy(format!(
                    "unknown key '{key}' (expected one of: {})",
                    SETTABLE_KEYS.join(", ")
                )))
            }
        }
        policy.validate()?;
        self.policy = policy;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if let Err(e) = self.policy.validate() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: e.to_string(),
            });
        }

        if self.policy.mode == Mode::Batch && self.policy.group_size == 1 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "group_size 1 in batch mode: groups of one are never formed, \
                          members are paired up instead"
                    .to_string(),
            });
        }

        if self.policy.refresh_minutes > 24 * 60 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "refresh_minutes {} is longer than a day",
                    self.policy.refresh_minutes
                ),
            });
        }

        if self.store.poll_interval_ms == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "store.poll_interval_ms must be positive".to_string(),
            });
        }

        if self.event.name.trim().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "event.name is empty".to_string(),
            });
        }

        warnings
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| GroupingError::InvalidPolicy(format!("'{value}' is not a valid number for {key}")))
}
