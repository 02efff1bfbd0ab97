//! Flattening configuration with documented constants
//!
//! Every tunable number lives here together with the range it is validated
//! against. The state machine never caches these values: it asks its
//! [`ConfigSource`] at the point of use, so a reload takes effect on the next
//! operation.

use std::path::Path;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::core::error::ConfigError;

/// Tunables for the compression lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlattenConfig {
    // === SCALE ===
    /// Smallest height scale a compressed entity can reach
    ///
    /// At 0.05 a standing entity (1.8 blocks) is squashed to 0.09 blocks.
    /// Must lie in (0, 1).
    pub min_height_scale: f64,

    /// Spread added per compressing object on each re-compression
    ///
    /// Three stacked objects at 0.8 add 2.4 to the spread multiplier.
    pub spread_increment: f64,

    /// Upper bound of the accumulated spread multiplier
    pub max_spread_limit: f64,

    // === DAMAGE ===
    /// Damage dealt by a single compressing object
    pub base_damage: f64,

    /// Extra damage for every object in the stack beyond the first
    pub per_extra_object_damage: f64,

    // === TIMERS ===
    /// Ticks spent in RECOVERING before returning to NORMAL
    pub recovery_ticks: i32,

    /// Seconds a compressed entity waits before a blocking object no longer
    /// prevents reformation. Zero disables the fallback entirely.
    pub fallback_timeout_seconds: i32,

    /// Ticks after a re-compression during which further contact is ignored
    ///
    /// Keeps a resting object from stacking spread every tick.
    pub reflatten_cooldown_ticks: i32,

    /// Whether a blocking object above the entity prevents reformation
    pub blocking_enabled: bool,
}

impl Default for FlattenConfig {
    fn default() -> Self {
        Self {
            min_height_scale: 0.05,
            spread_increment: 0.8,
            max_spread_limit: 6.0,

            base_damage: 8.0,
            per_extra_object_damage: 2.0,

            recovery_ticks: 20,
            fallback_timeout_seconds: 15,
            reflatten_cooldown_ticks: 10,
            blocking_enabled: true,
        }
    }
}

impl FlattenConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document; missing keys fall back to defaults
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: FlattenConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Validate every value against its documented range
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.min_height_scale > 0.0 && self.min_height_scale < 1.0) {
            return Err(out_of_range("min_height_scale", self.min_height_scale, "0 < x < 1"));
        }

        let non_negative = [
            ("spread_increment", self.spread_increment),
            ("max_spread_limit", self.max_spread_limit),
            ("base_damage", self.base_damage),
            ("per_extra_object_damage", self.per_extra_object_damage),
            ("recovery_ticks", self.recovery_ticks as f64),
            ("fallback_timeout_seconds", self.fallback_timeout_seconds as f64),
            ("reflatten_cooldown_ticks", self.reflatten_cooldown_ticks as f64),
        ];
        for (field, value) in non_negative {
            // NaN fails this comparison too
            if !(value >= 0.0) {
                return Err(out_of_range(field, value, "x >= 0"));
            }
        }

        Ok(())
    }
}

fn out_of_range(field: &'static str, value: f64, expected: &'static str) -> ConfigError {
    ConfigError::OutOfRange {
        field,
        value,
        expected,
    }
}

/// Read-only view of the current configuration
pub trait ConfigSource: Send + Sync {
    fn current(&self) -> FlattenConfig;
}

impl ConfigSource for FlattenConfig {
    fn current(&self) -> FlattenConfig {
        *self
    }
}

/// Hot-reloadable configuration shared between the driver and its tools
#[derive(Debug, Clone, Default)]
pub struct SharedConfig {
    inner: Arc<RwLock<FlattenConfig>>,
}

impl SharedConfig {
    pub fn new(config: FlattenConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// Swap in a new configuration after validating it
    ///
    /// On failure the previous configuration stays active.
    pub fn replace(&self, config: FlattenConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *guard = config;
        Ok(())
    }

    /// Re-read a TOML file and swap it in
    pub fn reload(&self, path: &Path) -> Result<(), ConfigError> {
        match FlattenConfig::load(path) {
            Ok(config) => {
                self.replace(config)?;
                tracing::info!("Reloaded flattening config from {}", path.display());
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Keeping previous flattening config: {}", e);
                Err(e)
            }
        }
    }
}

impl ConfigSource for SharedConfig {
    fn current(&self) -> FlattenConfig {
        *self.inner.read().unwrap_or_else(|e| e.into_inner())
    }
}
