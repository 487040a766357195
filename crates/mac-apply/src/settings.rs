//! Apply settings
//!
//! Loaded from an optional TOML file plus `MACSHIFT_*` environment overrides.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use macshift_core::error::ConfigError;
use macshift_core::Result;
use macshift_platform::CommandRunner;
use macshift_validate::ValidationPolicy;

/// Which committed transactions a partial batch failure reverts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RollbackScope {
    /// Only transactions committed by the failing batch
    #[default]
    Batch,
    /// Every committed transaction in the log
    Log,
}

impl fmt::Display for RollbackScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RollbackScope::Batch => write!(f, "batch"),
            RollbackScope::Log => write!(f, "log"),
        }
    }
}

impl std::str::FromStr for RollbackScope {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "batch" => Ok(RollbackScope::Batch),
            "log" | "all" => Ok(RollbackScope::Log),
            _ => Err(ConfigError::InvalidValue {
                field: "batch_rollback_scope".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Behaviour of the change orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplySettings {
    /// Revert a transaction when its apply or verification fails
    pub auto_rollback_on_error: bool,
    /// Require a known vendor prefix
    pub strict_validation: bool,
    /// Reject multicast addresses
    pub require_unicast: bool,
    /// Transaction log capacity
    pub max_transactions: usize,
    /// Deadline for each snapshot, apply, verify and rollback call (seconds)
    pub operation_timeout_secs: u64,
    pub batch_rollback_scope: RollbackScope,
    /// Default for random generation: keep a known vendor prefix
    pub realistic_mac_only: bool,
    /// Prefix privileged commands with `sudo -n`
    pub use_sudo: bool,
}

impl Default for ApplySettings {
    fn default() -> Self {
        Self {
            auto_rollback_on_error: true,
            strict_validation: false,
            require_unicast: true,
            max_transactions: 1000,
            operation_timeout_secs: 10,
            batch_rollback_scope: RollbackScope::Batch,
            realistic_mac_only: true,
            use_sudo: false,
        }
    }
}

impl ApplySettings {
    pub const ENV_PREFIX: &'static str = "MACSHIFT";

    /// Searched in order by `load_with_defaults`
    pub const DEFAULT_PATHS: &'static [&'static str] =
        &["/etc/macshift/settings.toml", "./macshift.toml"];

    /// Load settings from a file, with environment overrides on top
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading settings from {}", path.display());

        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(Self::environment())
            .build()
            .map_err(ConfigError::from)?;

        Self::finish(settings)
    }

    /// Load settings from environment overrides only
    pub fn from_env() -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(Self::environment())
            .build()
            .map_err(ConfigError::from)?;

        Self::finish(settings)
    }

    /// Load from the first readable default location, else from the environment
    pub fn load_with_defaults() -> Result<Self> {
        for path in Self::DEFAULT_PATHS {
            if Path::new(path).exists() {
                match Self::load_from_file(path) {
                    Ok(settings) => return Ok(settings),
                    Err(e) => warn!("Failed to load settings from {}: {}", path, e),
                }
            }
        }

        Self::from_env()
    }

    fn environment() -> config::Environment {
        config::Environment::with_prefix(Self::ENV_PREFIX).try_parsing(true)
    }

    fn finish(settings: config::Config) -> Result<Self> {
        let settings: ApplySettings = settings.try_deserialize().map_err(ConfigError::from)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the orchestrator cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.max_transactions == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_transactions".to_string(),
                value: self.max_transactions.to_string(),
            }
            .into());
        }
        if self.operation_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "operation_timeout_secs".to_string(),
                value: self.operation_timeout_secs.to_string(),
            }
            .into());
        }
        Ok(())
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    pub fn validation_policy(&self) -> ValidationPolicy {
        ValidationPolicy {
            require_unicast: self.require_unicast,
            require_known_vendor: self.strict_validation,
        }
    }

    /// Command runner sharing the operation deadline and sudo preference
    pub fn command_runner(&self) -> CommandRunner {
        CommandRunner::new(self.operation_timeout(), self.use_sudo)
    }
}
