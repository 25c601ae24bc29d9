//! Loader configuration
//!
//! ```
//! use archetype_bundle::config::LoaderConfig;
//!
//! let config = LoaderConfig::from_json_str(r#"{ "unload_delay_secs": 2.5 }"#).unwrap();
//! assert_eq!(config.unload_delay().as_secs_f64(), 2.5);
//! assert_eq!(config.download_timeout().as_secs(), 30);
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BundleError, Result};

/// Default eviction debounce window in seconds
pub const DEFAULT_UNLOAD_DELAY_SECS: f64 = 5.0;

/// Default download watchdog in seconds
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: f64 = 30.0;

/// Tunables for [`crate::LoadCoordinator`]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// How long a bundle must stay unreferenced before it is evicted
    pub unload_delay_secs: f64,
    /// How long a download may stay in flight before it is reported as failed
    pub download_timeout_secs: f64,
    /// Prefix joined with a bundle file name to form its fetch URL
    pub remote_base_url: String,
    /// Appended to a bundle name to form its file name
    pub bundle_suffix: String,
    /// Whether blocking local reads are available on this platform
    pub sync_loads: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            unload_delay_secs: DEFAULT_UNLOAD_DELAY_SECS,
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
            remote_base_url: String::new(),
            bundle_suffix: String::new(),
            sync_loads: !cfg!(target_arch = "wasm32"),
        }
    }
}

impl LoaderConfig {
    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| BundleError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    pub fn with_unload_delay(mut self, delay: Duration) -> Self {
        self.unload_delay_secs = delay.as_secs_f64();
        self
    }

    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout_secs = timeout.as_secs_f64();
        self
    }

    pub fn with_remote_base_url(mut self, url: impl Into<String>) -> Self {
        self.remote_base_url = url.into();
        self
    }

    pub fn with_bundle_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.bundle_suffix = suffix.into();
        self
    }

    pub fn with_sync_loads(mut self, enabled: bool) -> Self {
        self.sync_loads = enabled;
        self
    }

    pub fn unload_delay(&self) -> Duration {
        secs_to_duration(self.unload_delay_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        secs_to_duration(self.download_timeout_secs)
    }

    /// File name of a bundle in local storage and on the remote
    pub fn file_name(&self, bundle: &str) -> String {
        format!("{bundle}{}", self.bundle_suffix)
    }

    /// URL a bundle file is fetched from
    pub fn remote_url(&self, file_name: &str) -> String {
        if self.remote_base_url.is_empty() {
            file_name.to_string()
        } else {
            format!("{}/{file_name}", self.remote_base_url.trim_end_matches('/'))
        }
    }

    /// Check both durations are representable; run by `from_json_str` and
    /// by the coordinator builder.
    pub fn validate(&self) -> Result<()> {
        let max = Duration::MAX.as_secs_f64();
        if !self.unload_delay_secs.is_finite()
            || self.unload_delay_secs < 0.0
            || self.unload_delay_secs > max
        {
            return Err(BundleError::Config(format!(
                "unload_delay_secs must be between 0 and {max}, got {}",
                self.unload_delay_secs
            )));
        }
        if !self.download_timeout_secs.is_finite()
            || self.download_timeout_secs <= 0.0
            || self.download_timeout_secs > max
        {
            return Err(BundleError::Config(format!(
                "download_timeout_secs must be positive and at most {max}, got {}",
                self.download_timeout_secs
            )));
        }
        Ok(())
    }
}

/// Out-of-range values clamp instead of panicking
fn secs_to_duration(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}
