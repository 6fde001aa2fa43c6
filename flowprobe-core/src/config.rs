//! Harness configuration file: timeouts and pattern overrides.
//!
//! ```yaml
//! timeouts:
//!   daemon: 30
//!   kill_grace: 5
//! patterns:
//!   ready: "Reader thread started"
//! ```
//!
//! Durations are seconds and may be fractional.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, CoreError};
use crate::patterns::PatternOverrides;

/// Every timer the supervisor and injectors use.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Timeouts {
    /// Upper bound on one wait for child output.
    #[serde(with = "seconds")]
    pub poll: Duration,
    /// Idle time without progress before termination is scheduled.
    #[serde(with = "seconds")]
    pub daemon: Duration,
    /// Delay between reaching the expected count and SIGTERM.
    #[serde(with = "seconds")]
    pub limit_delay: Duration,
    /// SIGTERM to SIGKILL escalation window.
    #[serde(with = "seconds")]
    pub kill_grace: Duration,
    /// How long teardown waits for the child to exit on its own.
    #[serde(with = "seconds")]
    pub reap_wait: Duration,
    #[serde(with = "seconds")]
    pub connect: Duration,
    #[serde(with = "seconds")]
    pub send: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            poll: Duration::from_secs(1),
            daemon: Duration::from_secs(60),
            limit_delay: Duration::from_secs(2),
            kill_grace: Duration::from_secs(15),
            reap_wait: Duration::from_secs(1),
            connect: Duration::from_secs(5),
            send: Duration::from_secs(1),
        }
    }
}

/// Contents of a `--config` YAML file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    pub timeouts: Timeouts,
    pub patterns: PatternOverrides,
}

impl HarnessConfig {
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let text = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
        serde_yaml::from_str(&text).map_err(|source| CoreError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

mod seconds {
    use std::time::Duration;

    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}
