//! Configuration management for the hostpulse engine
//!
//! This module handles loading, parsing, and validating configuration from
//! TOML files and environment variables. Thresholds and the auto-optimization
//! flag are additionally mutable at runtime through the engine API; every
//! other section is fixed for the lifetime of a run.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::health::MissingMetricPolicy;
use crate::history::DEFAULT_HISTORY_CAPACITY;
use crate::source::MetricKind;

/// Main configuration structure for the engine
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// Sampling loop configuration
    pub sampling: SamplingConfig,

    /// Rolling history configuration
    pub history: HistoryConfig,

    /// Per-metric alert thresholds
    pub thresholds: ThresholdConfig,

    /// Alert log configuration
    pub alerts: AlertConfig,

    /// Optimization actuator configuration
    pub optimization: OptimizationConfig,

    /// Health scoring configuration
    pub scoring: ScoringConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Sampling loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Nominal tick interval in milliseconds
    pub interval_ms: u64,

    /// Interval used after an unexpected tick failure
    pub failure_backoff_ms: u64,

    /// Per-source read timeout in milliseconds
    pub source_timeout_ms: u64,

    /// Consecutive failures before a source is disabled for the run
    pub max_source_failures: u32,

    /// Bounded wait for the loop to exit on stop, in milliseconds
    pub stop_timeout_ms: u64,
}

impl SamplingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn failure_backoff(&self) -> Duration {
        Duration::from_millis(self.failure_backoff_ms)
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_millis(self.source_timeout_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 2000,
            failure_backoff_ms: 5000,
            source_timeout_ms: 500,
            max_source_failures: 3,
            stop_timeout_ms: 5000,
        }
    }
}

/// Rolling history configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Samples retained per metric
    pub capacity: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

/// Warn/critical pair for one percentage metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricThreshold {
    pub warn: f64,
    pub critical: f64,
}

impl MetricThreshold {
    pub fn new(warn: f64, critical: f64) -> Self {
        Self { warn, critical }
    }
}

/// Per-metric alert thresholds, mutable at runtime via
/// [`crate::sampler::SamplerEngine::update_thresholds`]. The evaluation reads
/// one consistent copy per tick; there is no caching of stale values across
/// ticks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub cpu: MetricThreshold,
    pub memory: MetricThreshold,
    pub gpu: MetricThreshold,
    pub disk: MetricThreshold,
}

impl ThresholdConfig {
    /// Threshold pair for a metric, `None` for rate metrics which have no
    /// percentage thresholds.
    pub fn get(&self, kind: MetricKind) -> Option<MetricThreshold> {
        match kind {
            MetricKind::Cpu => Some(self.cpu),
            MetricKind::Memory => Some(self.memory),
            MetricKind::Gpu => Some(self.gpu),
            MetricKind::Disk => Some(self.disk),
            MetricKind::NetworkSent | MetricKind::NetworkReceived => None,
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        for (name, threshold) in [
            ("cpu", self.cpu),
            ("memory", self.memory),
            ("gpu", self.gpu),
            ("disk", self.disk),
        ] {
            if !(0.0..=100.0).contains(&threshold.critical) || threshold.critical <= 0.0 {
                return Err(ConfigError::InvalidValue {
                    field: format!("thresholds.{}.critical", name),
                    value: threshold.critical.to_string(),
                });
            }
            if threshold.warn <= 0.0 || threshold.warn >= threshold.critical {
                return Err(ConfigError::InvalidValue {
                    field: format!("thresholds.{}.warn", name),
                    value: threshold.warn.to_string(),
                });
            }
        }
        Ok(())
    }
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            cpu: MetricThreshold::new(80.0, 95.0),
            memory: MetricThreshold::new(85.0, 95.0),
            gpu: MetricThreshold::new(90.0, 98.0),
            disk: MetricThreshold::new(90.0, 98.0),
        }
    }
}

/// Alert log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Maximum alerts retained; oldest evicted first
    pub capacity: usize,

    /// Suppression window for repeated `(metric, level)` breaches, seconds
    pub cooldown_secs: u64,
}

impl AlertConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            capacity: 50,
            cooldown_secs: 30,
        }
    }
}

/// Optimization actuator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationConfig {
    /// Trigger the matching remediation action when a critical alert fires
    pub auto: bool,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self { auto: true }
    }
}

/// Health scoring configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ScoringConfig {
    /// How unavailable metrics participate in the composite score
    pub missing_metric: MissingMetricPolicy,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,

    /// Emit JSON-structured logs
    pub json: bool,

    /// Enable console logging
    pub console: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            console: true,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.to_string_lossy().to_string(),
        })?;

        let config: EngineConfig = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables over defaults
    pub fn from_env() -> ConfigResult<Self> {
        let mut config = EngineConfig::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with fallback order: file -> env -> defaults
    pub fn load_with_fallback<P: AsRef<Path>>(config_path: Option<P>) -> ConfigResult<Self> {
        let mut config = match config_path {
            Some(path) if path.as_ref().exists() => EngineConfig::from_file(path)?,
            _ => EngineConfig::default(),
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `HOSTPULSE_*` environment variable overrides
    fn apply_env_overrides(&mut self) -> ConfigResult<()> {
        if let Ok(interval) = std::env::var("HOSTPULSE_INTERVAL_MS") {
            self.sampling.interval_ms =
                interval.parse().map_err(|_| ConfigError::InvalidValue {
                    field: "HOSTPULSE_INTERVAL_MS".to_string(),
                    value: interval,
                })?;
        }

        if let Ok(timeout) = std::env::var("HOSTPULSE_SOURCE_TIMEOUT_MS") {
            self.sampling.source_timeout_ms =
                timeout.parse().map_err(|_| ConfigError::InvalidValue {
                    field: "HOSTPULSE_SOURCE_TIMEOUT_MS".to_string(),
                    value: timeout,
                })?;
        }

        if let Ok(auto) = std::env::var("HOSTPULSE_AUTO_OPTIMIZE") {
            self.optimization.auto = auto.parse().map_err(|_| ConfigError::InvalidValue {
                field: "HOSTPULSE_AUTO_OPTIMIZE".to_string(),
                value: auto,
            })?;
        }

        if let Ok(level) = std::env::var("HOSTPULSE_LOG_LEVEL") {
            self.logging.level = level;
        }

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.sampling.interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "sampling.interval_ms".to_string(),
                value: "0".to_string(),
            });
        }

        if self.sampling.source_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "sampling.source_timeout_ms".to_string(),
                value: "0".to_string(),
            });
        }

        if self.sampling.source_timeout_ms >= self.sampling.interval_ms {
            return Err(ConfigError::ValidationFailed {
                reason: format!(
                    "source timeout ({} ms) must be shorter than the tick interval ({} ms)",
                    self.sampling.source_timeout_ms, self.sampling.interval_ms
                ),
            });
        }

        if self.sampling.max_source_failures == 0 {
            return Err(ConfigError::InvalidValue {
                field: "sampling.max_source_failures".to_string(),
                value: "0".to_string(),
            });
        }

        if self.history.capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "history.capacity".to_string(),
                value: "0".to_string(),
            });
        }

        if self.alerts.capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "alerts.capacity".to_string(),
                value: "0".to_string(),
            });
        }

        self.thresholds.validate()?;

        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> ConfigResult<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("hostpulse").join("engine.toml"))
            .ok_or_else(|| ConfigError::ValidationFailed {
                reason: "Unable to determine config directory".to_string(),
            })
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|_| ConfigError::ValidationFailed {
                reason: format!("Unable to create config directory: {}", parent.display()),
            })?;
        }

        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationFailed {
            reason: e.to_string(),
        })?;

        fs::write(path, content).map_err(|_| ConfigError::PermissionDenied {
            path: path.to_string_lossy().to_string(),
        })?;

        Ok(())
    }
}
