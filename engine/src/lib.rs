//! hostpulse engine library
//!
//! This library provides the core functionality for the hostpulse telemetry
//! engine: pluggable metric sources sampled on a fixed cadence, rolling
//! per-metric history, composite health scoring, threshold alerting with
//! deduplication, and best-effort optimization actions. Consumers receive
//! immutable snapshots; all sampling state is owned by a single loop task.

pub mod alerts;
pub mod config;
pub mod error;
pub mod health;
pub mod history;
pub mod metrics;
pub mod optimize;
pub mod sampler;
pub mod snapshot;
pub mod source;

// Re-export commonly used types
pub use alerts::{Alert, AlertLevel, AlertManager};
pub use config::{EngineConfig, MetricThreshold, ThresholdConfig};
pub use error::{EngineError, Result};
pub use health::{HealthLabel, HealthScore, HealthScorer, MissingMetricPolicy};
pub use history::HistoryBuffer;
pub use metrics::{EngineMetrics, EngineStats};
pub use optimize::{Improvement, OptimizationActuator, OptimizationKind, OptimizationResult};
pub use sampler::{EngineState, SamplerEngine, SnapshotCallback};
pub use snapshot::{MetricReading, Snapshot};
pub use source::{default_sources, MetricKind, MetricSource, Sample};
