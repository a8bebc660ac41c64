//! Immutable published view of the engine's state
//!
//! One [`Snapshot`] is published per tick and superseded by the next; readers
//! must not assume identity stability between ticks. Consumers only ever see
//! these values, never the engine's internal buffers or alert log.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alerts::Alert;
use crate::health::HealthScore;
use crate::metrics::EngineStats;
use crate::source::MetricKind;

/// Latest value and history-derived statistics for one metric.
///
/// `latest` is `None` when the source failed or timed out this tick;
/// `average` and `peak` still reflect whatever history exists. A metric with
/// no data anywhere reports `None` across the board, never zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricReading {
    pub latest: Option<f64>,
    pub average: Option<f64>,
    pub peak: Option<f64>,
}

impl MetricReading {
    /// True when the metric has produced at least one retained sample.
    pub fn has_data(&self) -> bool {
        self.average.is_some()
    }
}

/// Immutable value object published once per tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Monotonic tick counter; advances even for failed ticks so consumers
    /// can detect gaps.
    pub tick: u64,

    /// When this snapshot was assembled.
    pub captured_at: DateTime<Utc>,

    /// Per-metric readings; a metric with no registered source is absent.
    pub readings: HashMap<MetricKind, MetricReading>,

    /// Composite health; `None` when no percentage metric reported at all.
    pub health: Option<HealthScore>,

    /// Copy of the alert log at publication time, oldest first.
    pub alerts: Vec<Alert>,

    /// Engine counters at publication time.
    pub stats: EngineStats,
}

impl Snapshot {
    pub fn reading(&self, kind: MetricKind) -> Option<&MetricReading> {
        self.readings.get(&kind)
    }

    /// Whether a metric delivered a value this tick.
    pub fn is_available(&self, kind: MetricKind) -> bool {
        self.readings
            .get(&kind)
            .map(|r| r.latest.is_some())
            .unwrap_or(false)
    }

    /// Alerts not yet acknowledged by the user.
    pub fn unacknowledged_alerts(&self) -> impl Iterator<Item = &Alert> {
        self.alerts.iter().filter(|a| !a.acknowledged)
    }

    /// One-line summary suitable for logging or CLI display.
    pub fn summary(&self) -> String {
        let fmt_pct = |kind: MetricKind| match self.reading(kind).and_then(|r| r.latest) {
            Some(v) => format!("{:.1}%", v),
            None => "n/a".to_string(),
        };

        let health = match &self.health {
            Some(h) => format!("{:.0} ({})", h.score, h.label),
            None => "n/a".to_string(),
        };

        format!(
            "tick {}: cpu {} mem {} disk {} | health {} | {} alert(s)",
            self.tick,
            fmt_pct(MetricKind::Cpu),
            fmt_pct(MetricKind::Memory),
            fmt_pct(MetricKind::Disk),
            health,
            self.alerts.len(),
        )
    }
}
