//! Engine observability counters
//!
//! Failures inside the sampling loop are recovered locally, so without
//! counters they would be invisible. This module tracks ticks, tick failures,
//! per-metric source failures, alerts, and optimization runs in a prometheus
//! registry, and snapshots them into the serializable [`EngineStats`] carried
//! by every published snapshot.

use prometheus::core::Collector;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::source::MetricKind;

/// Counter snapshot embedded in every published snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    /// Ticks that completed and published a snapshot
    pub ticks_completed: u64,

    /// Ticks abandoned to an unexpected internal failure
    pub tick_failures: u64,

    /// Individual source read failures (timeouts included)
    pub source_failures: u64,

    /// Alerts created by threshold evaluation
    pub alerts_emitted: u64,

    /// Optimization actions executed (manual and automatic)
    pub optimizations_run: u64,
}

/// Prometheus-backed counters for the engine.
pub struct EngineMetrics {
    registry: Registry,
    ticks_completed: IntCounter,
    tick_failures: IntCounter,
    source_failures: IntCounterVec,
    alerts_emitted: IntCounterVec,
    optimizations_run: IntCounter,
}

impl EngineMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let ticks_completed =
            IntCounter::new("hostpulse_ticks_completed_total", "Completed sampling ticks")?;
        registry.register(Box::new(ticks_completed.clone()))?;

        let tick_failures = IntCounter::new(
            "hostpulse_tick_failures_total",
            "Sampling ticks abandoned to an internal failure",
        )?;
        registry.register(Box::new(tick_failures.clone()))?;

        let source_failures = IntCounterVec::new(
            Opts::new(
                "hostpulse_source_failures_total",
                "Metric source read failures",
            ),
            &["metric"],
        )?;
        registry.register(Box::new(source_failures.clone()))?;

        let alerts_emitted = IntCounterVec::new(
            Opts::new("hostpulse_alerts_emitted_total", "Alerts created"),
            &["level"],
        )?;
        registry.register(Box::new(alerts_emitted.clone()))?;

        let optimizations_run = IntCounter::new(
            "hostpulse_optimizations_run_total",
            "Optimization actions executed",
        )?;
        registry.register(Box::new(optimizations_run.clone()))?;

        Ok(Self {
            registry,
            ticks_completed,
            tick_failures,
            source_failures,
            alerts_emitted,
            optimizations_run,
        })
    }

    pub fn record_tick_completed(&self) {
        self.ticks_completed.inc();
    }

    pub fn record_tick_failure(&self) {
        self.tick_failures.inc();
    }

    pub fn record_source_failure(&self, metric: MetricKind) {
        self.source_failures
            .with_label_values(&[metric.as_str()])
            .inc();
    }

    pub fn record_alert(&self, level: &str) {
        self.alerts_emitted.with_label_values(&[level]).inc();
    }

    pub fn record_optimization(&self) {
        self.optimizations_run.inc();
    }

    /// Snapshot the counters into a plain value for embedding in snapshots.
    pub fn stats(&self) -> EngineStats {
        let sum_vec = |vec: &IntCounterVec| {
            vec.collect()
                .iter()
                .flat_map(|family| family.get_metric().iter().map(|m| m.get_counter().get_value()))
                .sum::<f64>() as u64
        };

        EngineStats {
            ticks_completed: self.ticks_completed.get(),
            tick_failures: self.tick_failures.get(),
            source_failures: sum_vec(&self.source_failures),
            alerts_emitted: sum_vec(&self.alerts_emitted),
            optimizations_run: self.optimizations_run.get(),
        }
    }

    /// Export all counters in the prometheus text format.
    pub fn export(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
