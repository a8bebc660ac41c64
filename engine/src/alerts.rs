//! Threshold evaluation, deduplication, and the bounded alert log
//!
//! Alerts live in memory only and never survive a restart. The log holds at
//! most `capacity` entries, evicting the lowest id first regardless of
//! severity or acknowledgment. A sustained breach creates one alert per
//! `(metric, level)` per cooldown window, not one per tick; re-alerting on
//! every tick would fill a 50-entry log within two minutes of any sustained
//! spike.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ThresholdConfig;
use crate::source::MetricKind;

/// Severity of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertLevel {
    Info,
    Warning,
    Critical,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Info => "info",
            AlertLevel::Warning => "warning",
            AlertLevel::Critical => "critical",
        }
    }
}

impl std::fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One alert. Immutable after creation except for the `acknowledged` flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: u64,
    pub metric: MetricKind,
    pub title: String,
    pub message: String,
    pub level: AlertLevel,
    pub created_at: DateTime<Utc>,
    pub acknowledged: bool,
}

/// Threshold evaluation plus the bounded, deduplicated alert log.
///
/// Owned by the sampling loop; consumers see alerts only through the copies
/// embedded in each snapshot.
#[derive(Debug)]
pub struct AlertManager {
    log: VecDeque<Alert>,
    next_id: u64,
    capacity: usize,
    cooldown: Duration,
    last_fired: HashMap<(MetricKind, AlertLevel), DateTime<Utc>>,
}

impl AlertManager {
    pub fn new(capacity: usize, cooldown: Duration) -> Self {
        Self {
            log: VecDeque::with_capacity(capacity),
            next_id: 0,
            capacity,
            cooldown,
            last_fired: HashMap::new(),
        }
    }

    /// Evaluate the tick's readings against the given thresholds and record
    /// any breaches. Returns the alerts created this call, in creation order.
    ///
    /// Thresholds are taken fresh on every call so runtime updates apply from
    /// the next tick onward.
    pub fn evaluate(
        &mut self,
        readings: &[(MetricKind, f64)],
        thresholds: &ThresholdConfig,
        now: DateTime<Utc>,
    ) -> Vec<Alert> {
        let mut created = Vec::new();

        for &(metric, value) in readings {
            let Some(threshold) = thresholds.get(metric) else {
                continue;
            };

            let level = if value >= threshold.critical {
                AlertLevel::Critical
            } else if value >= threshold.warn {
                AlertLevel::Warning
            } else {
                continue;
            };

            if self.in_cooldown(metric, level, now) {
                continue;
            }

            let title = format!("{} {}", capitalized(level.as_str()), metric);
            let message = format!("{} usage {}: {:.1}%", metric, level, value);
            created.push(self.raise(metric, title, message, level, now));
        }

        created
    }

    /// Create an alert directly, bypassing threshold evaluation but still
    /// subject to capacity eviction. Used for engine-internal notices.
    pub fn raise(
        &mut self,
        metric: MetricKind,
        title: String,
        message: String,
        level: AlertLevel,
        now: DateTime<Utc>,
    ) -> Alert {
        self.next_id += 1;
        let alert = Alert {
            id: self.next_id,
            metric,
            title,
            message,
            level,
            created_at: now,
            acknowledged: false,
        };

        self.last_fired.insert((metric, level), now);
        self.log.push_back(alert.clone());
        while self.log.len() > self.capacity {
            // FIFO: the front entry always carries the lowest id.
            self.log.pop_front();
        }

        alert
    }

    /// Flip the acknowledged flag. Does not remove the alert or affect
    /// eviction order. Returns false for an unknown id.
    pub fn acknowledge(&mut self, id: u64) -> bool {
        match self.log.iter_mut().find(|a| a.id == id) {
            Some(alert) => {
                alert.acknowledged = true;
                true
            }
            None => false,
        }
    }

    /// Copy of the current log, oldest first.
    pub fn alerts(&self) -> Vec<Alert> {
        self.log.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    fn in_cooldown(&self, metric: MetricKind, level: AlertLevel, now: DateTime<Utc>) -> bool {
        let Some(&fired) = self.last_fired.get(&(metric, level)) else {
            return false;
        };
        let Ok(cooldown) = chrono::Duration::from_std(self.cooldown) else {
            return false;
        };
        now - fired < cooldown
    }
}

fn capitalized(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
