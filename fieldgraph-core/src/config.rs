//! # Filter Configuration
//!
//! Per-instance settings: an optional chain override, profile defaults for
//! frame rate and sample aspect, the scaler used for planned resizes and the
//! warm-up bound. Read from a JSON file or from the instance's properties.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::format::Rational;
use crate::planner::{is_identity_chain, ScaleAlgorithm};
use crate::properties::Properties;
use crate::session::DEFAULT_WARMUP_LIMIT;

/// Instance property keys.
pub mod keys {
    pub const FILTER: &str = "filter";
    pub const SAR_NUM: &str = "sar_num";
    pub const SAR_DEN: &str = "sar_den";
    pub const FRAME_RATE_NUM: &str = "frame_rate_num";
    pub const FRAME_RATE_DEN: &str = "frame_rate_den";
    pub const SCALE: &str = "scale";
    pub const WARMUP_LIMIT: &str = "warmup_limit";
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Unknown scale algorithm '{0}'")]
    ScaleAlgorithm(String),
}

/// Output profile the host renders to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub frame_rate: Rational,
    pub sample_aspect: Rational,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            frame_rate: Rational::new(25, 1),
            sample_aspect: Rational::new(1, 1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Extra chain appended after the planned stages
    pub filter: Option<String>,
    pub profile: Profile,
    pub scale_algorithm: ScaleAlgorithm,
    pub warmup_limit: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            filter: None,
            profile: Profile::default(),
            scale_algorithm: ScaleAlgorithm::default(),
            warmup_limit: DEFAULT_WARMUP_LIMIT,
        }
    }
}

impl FilterConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Read from filter instance properties, starting from `profile`.
    pub fn from_properties(props: &Properties, profile: Profile) -> Result<Self, ConfigError> {
        let mut config = Self {
            profile,
            ..Self::default()
        };

        if let Some(chain) = props.get(keys::FILTER) {
            config.filter = Some(chain.to_string());
        }

        let sar = Rational::new(
            props.get_int(keys::SAR_NUM) as i32,
            props.get_int(keys::SAR_DEN) as i32,
        );
        config.profile.sample_aspect = sar.or(config.profile.sample_aspect);

        let rate = Rational::new(
            props.get_int(keys::FRAME_RATE_NUM) as i32,
            props.get_int(keys::FRAME_RATE_DEN) as i32,
        );
        config.profile.frame_rate = rate.or(config.profile.frame_rate);

        if let Some(name) = props.get(keys::SCALE) {
            config.scale_algorithm =
                ScaleAlgorithm::from_flag(name).ok_or_else(|| ConfigError::ScaleAlgorithm(name.to_string()))?;
        }

        let limit = props.get_int_or(keys::WARMUP_LIMIT, DEFAULT_WARMUP_LIMIT as i64);
        config.warmup_limit = limit.max(0) as usize;

        Ok(config)
    }

    /// The override chain, unless it is absent or the identity.
    pub fn chain_override(&self) -> Option<&str> {
        self.filter.as_deref().filter(|chain| !is_identity_chain(chain))
    }
}
