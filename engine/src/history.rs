//! Bounded rolling history of metric samples
//!
//! Fixed-capacity ring store, insertion-ordered, oldest evicted first. All
//! derived statistics return `None` over an empty buffer: a metric with no
//! data must never silently score as zero (or as perfect).

use std::collections::VecDeque;

use crate::source::Sample;

/// Number of samples retained per metric unless configured otherwise.
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// Fixed-capacity ring of the most recent samples for one metric.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    samples: VecDeque<Sample>,
    capacity: usize,
}

impl HistoryBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest once capacity is exceeded.
    pub fn push(&mut self, sample: Sample) {
        self.samples.push_back(sample);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    /// Rolling mean over the retained samples, `None` when empty.
    pub fn average(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let sum: f64 = self.samples.iter().map(|s| s.value).sum();
        Some(sum / self.samples.len() as f64)
    }

    /// Most recent retained value, `None` when empty.
    pub fn last(&self) -> Option<f64> {
        self.samples.back().map(|s| s.value)
    }

    /// Maximum retained value, `None` when empty.
    pub fn peak(&self) -> Option<f64> {
        self.samples
            .iter()
            .map(|s| s.value)
            .fold(None, |acc, v| match acc {
                Some(max) if max >= v => Some(max),
                _ => Some(v),
            })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
