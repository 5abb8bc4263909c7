//! Monitor configuration
//!
//! Sources are layered with the `config` crate: built-in defaults, then an
//! optional TOML file, then `PETKIT_*` environment variables
//! (`PETKIT_ACCOUNT__EMAIL`, `PETKIT_POLL_INTERVAL`, ...). Command line
//! overrides are applied on top by the binary.

pub mod credentials;
pub mod timezone;

pub use credentials::PetkitCredentials;
pub use timezone::{TimezoneSetting, SET_AUTOMATICALLY};

use crate::error::{PetkitError, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Region used when none is configured
pub const DEFAULT_REGION: &str = "United States";
/// Passport host that lists regional API gateways
pub const DEFAULT_PASSPORT_URL: &str = "https://passport.petkt.com/";
/// Gateway serving accounts registered in mainland China
pub const CHINA_BASE_URL: &str = "http://api.petkit.cn/6/";

const ENV_PREFIX: &str = "PETKIT";

/// Full monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default)]
    pub account: PetkitCredentials,
    /// Region name or id as listed by the passport server
    pub region: String,
    pub timezone: TimezoneSetting,
    /// Delay between polls
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Upper bound for one complete snapshot fetch
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Vendor endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub passport_url: Url,
    /// Skip region resolution and talk to this gateway directly
    #[serde(default)]
    pub base_url: Option<Url>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            passport_url: Url::parse(DEFAULT_PASSPORT_URL).expect("valid default passport URL"),
            base_url: None,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    pub format: LogFormat,
    /// Also write logs to a daily-rolling file in this directory
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
            file: None,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            account: PetkitCredentials::default(),
            region: DEFAULT_REGION.to_string(),
            timezone: TimezoneSetting::Automatic,
            poll_interval: Duration::from_secs(120),
            request_timeout: Duration::from_secs(20),
            api: ApiConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl MonitorConfig {
    /// Default config file location
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("petkit-monitor")
            .join("config.toml")
    }

    /// Load configuration from defaults, file and environment
    ///
    /// An explicit `path` must exist; the default path is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (Self::default_path(), false),
        };
        debug!("Loading configuration from {:?} (required: {})", path, required);

        let settings = Config::builder()
            .set_default("region", DEFAULT_REGION)?
            .set_default("timezone", SET_AUTOMATICALLY)?
            .set_default("poll_interval", "120s")?
            .set_default("request_timeout", "20s")?
            .set_default("api.passport_url", DEFAULT_PASSPORT_URL)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "compact")?
            .add_source(File::from(path).format(FileFormat::Toml).required(required))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: MonitorConfig = settings.try_deserialize()?;
        Ok(config)
    }

    /// Check the loaded values before polling starts
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(PetkitError::config("poll_interval must be greater than zero"));
        }
        if self.request_timeout.is_zero() {
            return Err(PetkitError::config(
                "request_timeout must be greater than zero",
            ));
        }
        if !self.account.is_complete() {
            return Err(PetkitError::config(
                "PetKit credentials required. Set account.email/account.password, PETKIT_EMAIL/PETKIT_PASSWORD or pass --email/--password",
            ));
        }
        if self.region.trim().is_empty() && self.api.base_url.is_none() {
            return Err(PetkitError::config("region must not be empty"));
        }
        Ok(())
    }
}
