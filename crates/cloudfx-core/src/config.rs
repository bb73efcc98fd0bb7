//! Session configuration
//!
//! Read once at startup, from the environment or a TOML file.

use crate::detector::PollPolicy;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Environment variable holding the cloud account name
pub const ENV_CLOUD_NAME: &str = "CLOUDINARY_CLOUD_NAME";
/// Environment variable holding the background-removal preset
pub const ENV_UPLOAD_PRESET: &str = "CLOUDINARY_UPLOAD_PRESET";
/// Environment variable holding the neutral preset
pub const ENV_NEUTRAL_PRESET: &str = "CLOUDINARY_NEUTRAL_PRESET";
/// Optional poll interval override in milliseconds
pub const ENV_POLL_INTERVAL_MS: &str = "CLOUDFX_POLL_INTERVAL_MS";
/// Optional poll attempt cap, `0` meaning unbounded
pub const ENV_POLL_MAX_ATTEMPTS: &str = "CLOUDFX_POLL_MAX_ATTEMPTS";
/// Optional per-probe timeout in milliseconds
pub const ENV_PROBE_TIMEOUT_MS: &str = "CLOUDFX_PROBE_TIMEOUT_MS";

const DEFAULT_API_BASE: &str = "https://api.cloudinary.com";
const DEFAULT_DELIVERY_BASE: &str = "https://res.cloudinary.com";

/// Remote service configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    /// Cloud account name
    pub cloud_name: String,
    /// Upload preset implying background removal (preset A)
    pub upload_preset: String,
    /// Upload preset with no implied transform (preset B)
    pub neutral_preset: String,
    /// Upload API root
    pub api_base: String,
    /// Delivery host root
    pub delivery_base: String,
    /// Emit `https` delivery URLs
    pub secure: bool,
    /// Per-request upload timeout in seconds
    pub upload_timeout_secs: Option<u64>,
    /// Render-completion polling
    pub poll: PollPolicy,
}

impl CloudConfig {
    /// Create configuration for an account
    #[must_use]
    pub fn new(
        cloud_name: impl Into<String>,
        upload_preset: impl Into<String>,
        neutral_preset: impl Into<String>,
    ) -> Self {
        Self {
            cloud_name: cloud_name.into(),
            upload_preset: upload_preset.into(),
            neutral_preset: neutral_preset.into(),
            ..Self::default()
        }
    }

    /// Read from process environment
    ///
    /// # Errors
    /// Missing or malformed variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read through an arbitrary key lookup
    ///
    /// # Errors
    /// Missing or malformed values
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(key))
        };

        let mut config = Self::new(
            required(ENV_CLOUD_NAME)?,
            required(ENV_UPLOAD_PRESET)?,
            required(ENV_NEUTRAL_PRESET)?,
        );

        if let Some(raw) = lookup(ENV_POLL_INTERVAL_MS) {
            config.poll.interval_ms = parse_number(ENV_POLL_INTERVAL_MS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_POLL_MAX_ATTEMPTS) {
            let max: u32 = parse_number(ENV_POLL_MAX_ATTEMPTS, &raw)?;
            config.poll.max_attempts = (max > 0).then_some(max);
        }
        if let Some(raw) = lookup(ENV_PROBE_TIMEOUT_MS) {
            config.poll.probe_timeout_ms = parse_number(ENV_PROBE_TIMEOUT_MS, &raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse from TOML
    ///
    /// # Errors
    /// Parse or validation failure
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file
    ///
    /// # Errors
    /// IO, parse or validation failure
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Check every required value is usable
    ///
    /// # Errors
    /// First problem found
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [
            (ENV_CLOUD_NAME, &self.cloud_name),
            (ENV_UPLOAD_PRESET, &self.upload_preset),
            (ENV_NEUTRAL_PRESET, &self.neutral_preset),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Missing(key));
            }
        }

        self.api_url()?;
        self.delivery_url()?;

        if self.poll.interval_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "poll.interval_ms",
                message: "must be positive".to_string(),
            });
        }
        if self.poll.probe_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "poll.probe_timeout_ms",
                message: "must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Parsed upload API root
    ///
    /// # Errors
    /// `ConfigError::Invalid` if not an absolute URL
    pub fn api_url(&self) -> Result<Url, ConfigError> {
        parse_url("api_base", &self.api_base)
    }

    /// Parsed delivery root
    ///
    /// # Errors
    /// `ConfigError::Invalid` if not an absolute URL
    pub fn delivery_url(&self) -> Result<Url, ConfigError> {
        parse_url("delivery_base", &self.delivery_base)
    }

    /// Upload request timeout, if any
    #[inline]
    #[must_use]
    pub fn upload_timeout(&self) -> Option<Duration> {
        self.upload_timeout_secs.map(Duration::from_secs)
    }

    /// With custom API root
    #[inline]
    #[must_use]
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    /// With custom delivery root
    #[inline]
    #[must_use]
    pub fn with_delivery_base(mut self, base: impl Into<String>) -> Self {
        self.delivery_base = base.into();
        self
    }

    /// With poll policy
    #[inline]
    #[must_use]
    pub fn with_poll(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    /// With upload timeout
    #[inline]
    #[must_use]
    pub fn with_upload_timeout(mut self, secs: u64) -> Self {
        self.upload_timeout_secs = Some(secs);
        self
    }

    /// With secure flag
    #[inline]
    #[must_use]
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            cloud_name: String::new(),
            upload_preset: String::new(),
            neutral_preset: String::new(),
            api_base: DEFAULT_API_BASE.to_string(),
            delivery_base: DEFAULT_DELIVERY_BASE.to_string(),
            secure: true,
            upload_timeout_secs: None,
            poll: PollPolicy::default(),
        }
    }
}

fn parse_url(key: &'static str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|e| ConfigError::Invalid {
        key,
        message: e.to_string(),
    })
}

fn parse_number<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        message: e.to_string(),
    })
}
