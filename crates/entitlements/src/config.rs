//! Configuration management for entitlements.
//!
//! Configuration is layered with figment: built-in defaults, then a TOML
//! file, then environment variables.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::payment::DEFAULT_PAYMENT_METHOD;
use crate::subscription::CancellationPolicy;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "entitlements";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "subscriptions.db";

/// Longest premium period accepted, in days.
pub const MAX_PERIOD_DAYS: u32 = 3650;

/// Environment variable prefix.
const ENV_PREFIX: &str = "ENTITLEMENTS_";

/// Application configuration.
///
/// Loaded from (in order of precedence, highest first):
/// 1. Environment variables prefixed with `ENTITLEMENTS_`, with `__`
///    separating section and key (`ENTITLEMENTS_SUBSCRIPTION__PERIOD_DAYS=7`)
/// 2. TOML config file at `~/.config/entitlements/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Subscription rules.
    pub subscription: SubscriptionConfig,
}

/// Storage-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/entitlements/subscriptions.db`
    pub database_path: Option<PathBuf>,
}

/// Subscription lifecycle configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionConfig {
    /// Length of a premium period in days.
    pub period_days: u32,
    /// What cancelling does to the paid-through date.
    pub cancellation: CancellationPolicy,
    /// Upper bound on a single payment provider call, in seconds.
    pub provider_timeout_secs: u64,
    /// Payment method recorded when the proof doesn't name one.
    pub default_payment_method: String,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            period_days: 30,
            cancellation: CancellationPolicy::Immediate,
            provider_timeout_secs: 30,
            default_payment_method: DEFAULT_PAYMENT_METHOD.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// A missing file is not an error; defaults and environment still apply.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing, or validation fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.subscription.period_days == 0 {
            return Err(Error::ConfigValidation {
                message: "period_days must be greater than 0".to_string(),
            });
        }

        if self.subscription.period_days > MAX_PERIOD_DAYS {
            return Err(Error::ConfigValidation {
                message: format!("period_days must be at most {MAX_PERIOD_DAYS}"),
            });
        }

        if self.subscription.provider_timeout_secs == 0 {
            return Err(Error::ConfigValidation {
                message: "provider_timeout_secs must be greater than 0".to_string(),
            });
        }

        if self.subscription.default_payment_method.trim().is_empty() {
            return Err(Error::ConfigValidation {
                message: "default_payment_method cannot be empty".to_string(),
            });
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the premium period length.
    #[must_use]
    pub fn period(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.subscription.period_days))
    }

    /// Get the payment provider timeout.
    #[must_use]
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.subscription.provider_timeout_secs)
    }
}
