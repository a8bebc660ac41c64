//! Composite health scoring
//!
//! Pure computation: current usage percentages in, one 0-100 score and a
//! qualitative label out. Weights: CPU 0.3, RAM 0.3, GPU 0.2, Disk 0.2, each
//! sub-score `max(0, 100 - usage)`.
//!
//! The default treats an unavailable metric as a perfect sub-score, which
//! quietly inflates the composite when a counter is down. Weight
//! renormalization over the available metrics is selectable via
//! [`MissingMetricPolicy`].

use serde::{Deserialize, Serialize};

const CPU_WEIGHT: f64 = 0.3;
const MEMORY_WEIGHT: f64 = 0.3;
const GPU_WEIGHT: f64 = 0.2;
const DISK_WEIGHT: f64 = 0.2;

/// Qualitative band for a composite score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthLabel {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl HealthLabel {
    pub fn from_score(score: f64) -> Self {
        match score {
            s if s >= 80.0 => HealthLabel::Excellent,
            s if s >= 60.0 => HealthLabel::Good,
            s if s >= 40.0 => HealthLabel::Fair,
            _ => HealthLabel::Poor,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthLabel::Excellent => "Excellent",
            HealthLabel::Good => "Good",
            HealthLabel::Fair => "Fair",
            HealthLabel::Poor => "Poor",
        }
    }
}

impl std::fmt::Display for HealthLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Composite score with its label.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthScore {
    pub score: f64,
    pub label: HealthLabel,
}

/// How unavailable metrics participate in the composite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum MissingMetricPolicy {
    /// Substitute a perfect sub-score (100) for missing metrics. Reference
    /// behavior; a metric outage inflates the composite.
    #[default]
    AssumePerfect,
    /// Renormalize weights over the metrics that reported a value.
    Renormalize,
}

/// Current usage percentages feeding one scoring pass. `None` means the
/// metric reported no data this tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HealthInputs {
    pub cpu: Option<f64>,
    pub memory: Option<f64>,
    pub gpu: Option<f64>,
    pub disk: Option<f64>,
}

/// Deterministic scorer; no side effects.
#[derive(Debug, Clone, Copy)]
pub struct HealthScorer {
    policy: MissingMetricPolicy,
}

impl HealthScorer {
    pub fn new(policy: MissingMetricPolicy) -> Self {
        Self { policy }
    }

    /// Combine current readings into one 0-100 composite. Returns `None`
    /// when no metric reported at all: an all-dark host has no health, not
    /// perfect health.
    pub fn score(&self, inputs: &HealthInputs) -> Option<HealthScore> {
        let weighted = [
            (inputs.cpu, CPU_WEIGHT),
            (inputs.memory, MEMORY_WEIGHT),
            (inputs.gpu, GPU_WEIGHT),
            (inputs.disk, DISK_WEIGHT),
        ];

        if weighted.iter().all(|(value, _)| value.is_none()) {
            return None;
        }

        let score = match self.policy {
            MissingMetricPolicy::AssumePerfect => weighted
                .iter()
                .map(|(value, weight)| sub_score(value.unwrap_or(0.0)) * weight)
                .sum(),
            MissingMetricPolicy::Renormalize => {
                let available_weight: f64 = weighted
                    .iter()
                    .filter(|(value, _)| value.is_some())
                    .map(|(_, weight)| weight)
                    .sum();
                weighted
                    .iter()
                    .filter_map(|(value, weight)| value.map(|v| sub_score(v) * weight))
                    .sum::<f64>()
                    / available_weight
            }
        };

        Some(HealthScore {
            score,
            label: HealthLabel::from_score(score),
        })
    }
}

impl Default for HealthScorer {
    fn default() -> Self {
        Self::new(MissingMetricPolicy::default())
    }
}

fn sub_score(usage: f64) -> f64 {
    (100.0 - usage).max(0.0)
}
