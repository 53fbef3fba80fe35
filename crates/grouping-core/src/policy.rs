use crate::error::{GroupingError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Mode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Re-partition the whole population on every regenerate.
    #[default]
    Batch,
    /// Fixed set of groups filled up to capacity as members arrive.
    #[serde(rename = "firstcome")]
    FirstCome,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Batch => "batch",
            Mode::FirstCome => "firstcome",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = GroupingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "batch" => Ok(Mode::Batch),
            "firstcome" | "first-come" | "first_come" => Ok(Mode::FirstCome),
            other => Err(GroupingError::InvalidPolicy(format!(
                "unknown mode '{other}' (expected batch or firstcome)"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Allocation policy parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    #[serde(default)]
    pub mode: Mode,
    #[serde(default = "default_group_size")]
    pub group_size: usize,
    /// Number of groups to fill. Only consulted in first-come mode.
    #[serde(default = "default_group_count")]
    pub group_count: usize,
    #[serde(default = "default_refresh_minutes")]
    pub refresh_minutes: u32,
}

fn default_group_size() -> usize {
    4
}

fn default_group_count() -> usize {
    4
}

fn default_refresh_minutes() -> u32 {
    10
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            group_size: default_group_size(),
            group_count: default_group_count(),
            refresh_minutes: default_refresh_minutes(),
        }
    }
}

impl Policy {
    pub fn validate(&self) -> Result<()> {
        if self.group_size == 0 {
            return Err(GroupingError::InvalidPolicy(
                "group size must be positive".into(),
            ));
        }
        if self.mode == Mode::FirstCome && self.group_count == 0 {
            return Err(GroupingError::InvalidPolicy(
                "group count must be positive in first-come mode".into(),
            ));
        }
        if self.refresh_minutes == 0 {
            return Err(GroupingError::InvalidPolicy(
                "refresh interval must be at least one minute".into(),
            ));
        }
        Ok(())
    }

    pub fn refresh_interval_ms(&self) -> i64 {
        minutes_to_ms(self.refresh_minutes)
    }
}

pub fn minutes_to_ms(minutes: u32) -> i64 {
    i64::from(minutes) * 60 * 1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let policy = Policy::default();
        assert_eq!(policy.mode, Mode::Batch);
        assert_eq!(policy.group_size, 4);
        assert_eq!(policy.refresh_minutes, 10);
        assert_eq!(policy.refresh_interval_ms(), 600_000);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn zero_size_is_invalid() {
        let policy = Policy {
            group_size: 0,
            ..Policy::default()
        };
        assert!(matches!(
            policy.validate(),
            Err(GroupingError::InvalidPolicy(_))
        ));
    }

    #[test]
    fn zero_count_only_matters_in_first_come() {
        let batch = Policy {
            group_count: 0,
            ..Policy::default()
        };
        assert!(batch.validate().is_ok());

        let first_come = Policy {
            mode: Mode::FirstCome,
            ..batch
        };
        assert!(first_come.validate().is_err());
    }

    #[test]
    fn zero_refresh_is_invalid() {
        let policy = Policy {
            refresh_minutes: 0,
            ..Policy::default()
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn mode_parses_and_serializes() {
        assert_eq!("batch".parse::<Mode>().unwrap(), Mode::Batch);
        assert_eq!("FirstCome".parse::<Mode>().unwrap(), Mode::FirstCome);
        assert_eq!("first-come".parse::<Mode>().unwrap(), Mode::FirstCome);
        assert!("random".parse::<Mode>().is_err());

        let yaml = serde_yaml::to_string(&Mode::FirstCome).unwrap();
        assert_eq!(yaml.trim(), "firstcome");
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let policy: Policy = serde_yaml::from_str("mode: firstcome\ngroup_count: 3\n").unwrap();
        assert_eq!(policy.mode, Mode::FirstCome);
        assert_eq!(policy.group_count, 3);
        assert_eq!(policy.group_size, 4);
    }
}
