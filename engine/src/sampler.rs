//! The sampling orchestrator
//!
//! Owns the periodic loop and every mutable piece of engine state. All
//! mutation happens inside the single loop task (single writer); consumers
//! receive immutable [`Snapshot`]s through a watch channel or callback and
//! interact with the engine only through the methods here.
//!
//! One bad tick never kills the engine: source failures degrade that tick's
//! data, and an unexpected internal failure is counted, logged, and followed
//! by the failure backoff interval instead of the nominal one.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::alerts::{AlertLevel, AlertManager};
use crate::config::{EngineConfig, SamplingConfig, ThresholdConfig};
use crate::error::{EngineError, Result};
use crate::health::{HealthInputs, HealthScorer};
use crate::history::HistoryBuffer;
use crate::metrics::EngineMetrics;
use crate::optimize::{OptimizationActuator, OptimizationKind, OptimizationResult};
use crate::snapshot::{MetricReading, Snapshot};
use crate::source::{MetricKind, MetricSource, Sample};

/// Engine lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EngineState::Idle => "idle",
            EngineState::Running => "running",
            EngineState::Stopping => "stopping",
            EngineState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Callback invoked with every published snapshot, on the loop task.
pub type SnapshotCallback = Box<dyn Fn(&Snapshot) + Send + Sync>;

/// The telemetry sampling and alerting engine.
pub struct SamplerEngine {
    config: EngineConfig,
    thresholds: Arc<RwLock<ThresholdConfig>>,
    auto_optimize: Arc<AtomicBool>,
    state: Arc<RwLock<EngineState>>,
    alert_manager: Arc<Mutex<AlertManager>>,
    actuator: Arc<Mutex<OptimizationActuator>>,
    metrics: Arc<EngineMetrics>,
    snapshot_tx: Option<watch::Sender<Option<Snapshot>>>,
    snapshot_rx: watch::Receiver<Option<Snapshot>>,
    sources: Option<Vec<Box<dyn MetricSource>>>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl SamplerEngine {
    /// Build an engine from validated configuration and a source set.
    ///
    /// The engine owns its sources for its lifetime and tears them down when
    /// the loop exits.
    pub fn new(config: EngineConfig, sources: Vec<Box<dyn MetricSource>>) -> Result<Self> {
        config.validate()?;

        let (snapshot_tx, snapshot_rx) = watch::channel(None);

        Ok(Self {
            thresholds: Arc::new(RwLock::new(config.thresholds)),
            auto_optimize: Arc::new(AtomicBool::new(config.optimization.auto)),
            state: Arc::new(RwLock::new(EngineState::Idle)),
            alert_manager: Arc::new(Mutex::new(AlertManager::new(
                config.alerts.capacity,
                config.alerts.cooldown(),
            ))),
            actuator: Arc::new(Mutex::new(OptimizationActuator::new())),
            metrics: Arc::new(EngineMetrics::new()?),
            snapshot_tx: Some(snapshot_tx),
            snapshot_rx,
            sources: Some(sources),
            cancel: CancellationToken::new(),
            config,
            handle: None,
        })
    }

    /// Start the sampling loop. Idempotent no-op while already running;
    /// rejected once the engine has been stopped (sources are gone).
    pub async fn start(&mut self, on_snapshot: Option<SnapshotCallback>) -> Result<()> {
        {
            let mut state = self.state.write().await;
            match *state {
                EngineState::Running => {
                    debug!("start ignored: engine already running");
                    return Ok(());
                }
                EngineState::Idle => {
                    *state = EngineState::Running;
                }
                other => {
                    return Err(EngineError::InvalidState {
                        expected: "idle".to_string(),
                        actual: other.to_string(),
                    });
                }
            }
        }

        let sources = self.sources.take().ok_or_else(|| EngineError::InvalidState {
            expected: "idle".to_string(),
            actual: "sources already consumed".to_string(),
        })?;
        let snapshot_tx = self
            .snapshot_tx
            .take()
            .ok_or_else(|| EngineError::InvalidState {
                expected: "idle".to_string(),
                actual: "snapshot channel already consumed".to_string(),
            })?;

        let source_kinds: Vec<MetricKind> = sources.iter().map(|s| s.kind()).collect();
        info!(
            interval_ms = self.config.sampling.interval_ms,
            sources = ?source_kinds,
            "starting sampling loop"
        );

        let sampler_loop = SamplerLoop {
            sources: sources
                .into_iter()
                .map(|source| SourceSlot {
                    source,
                    consecutive_failures: 0,
                    disabled: false,
                })
                .collect(),
            history: HashMap::new(),
            history_capacity: self.config.history.capacity,
            scorer: HealthScorer::new(self.config.scoring.missing_metric),
            thresholds: self.thresholds.clone(),
            auto_optimize: self.auto_optimize.clone(),
            alert_manager: self.alert_manager.clone(),
            actuator: self.actuator.clone(),
            metrics: self.metrics.clone(),
            state: self.state.clone(),
            snapshot_tx,
            on_snapshot,
            sampling: self.config.sampling.clone(),
            max_source_failures: self.config.sampling.max_source_failures,
            tick: 0,
        };

        let cancel = self.cancel.clone();
        self.handle = Some(tokio::spawn(sampler_loop.run(cancel)));

        Ok(())
    }

    /// Signal cancellation and wait (bounded) for the loop to exit. The loop
    /// releases all source resources before exiting.
    pub async fn stop(&mut self) -> Result<()> {
        {
            let mut state = self.state.write().await;
            match *state {
                EngineState::Running => {
                    *state = EngineState::Stopping;
                }
                other => {
                    debug!(state = %other, "stop ignored: engine not running");
                    return Ok(());
                }
            }
        }

        info!("stopping sampling loop");
        self.cancel.cancel();

        let Some(mut handle) = self.handle.take() else {
            *self.state.write().await = EngineState::Stopped;
            return Ok(());
        };

        let wait = self.config.sampling.stop_timeout();
        match timeout(wait, &mut handle).await {
            Ok(_) => {
                *self.state.write().await = EngineState::Stopped;
                info!("sampling loop stopped");
                Ok(())
            }
            Err(_) => {
                // The loop is cooperative and its waits are bounded, so this
                // indicates a source ignoring its timeout. Detach rather than
                // abort: the loop still runs every source's shutdown() when
                // it finally exits, which an abort would skip.
                drop(handle);
                *self.state.write().await = EngineState::Stopped;
                Err(EngineError::ShutdownTimeout {
                    waited_ms: wait.as_millis() as u64,
                })
            }
        }
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> EngineState {
        *self.state.read().await
    }

    /// The most recently published snapshot, if any tick has completed.
    pub fn latest_snapshot(&self) -> Option<Snapshot> {
        self.snapshot_rx.borrow().clone()
    }

    /// Subscribe to snapshot publications. The channel always holds the
    /// latest value; slow consumers observe gaps via the tick counter, never
    /// stale reordering.
    pub fn subscribe(&self) -> watch::Receiver<Option<Snapshot>> {
        self.snapshot_rx.clone()
    }

    /// Replace the alert thresholds. Invalid values are rejected and the
    /// previous configuration is retained; the loop picks up the new values
    /// at its next tick.
    pub async fn update_thresholds(&self, thresholds: ThresholdConfig) -> Result<()> {
        thresholds.validate()?;
        *self.thresholds.write().await = thresholds;
        info!("alert thresholds updated");
        Ok(())
    }

    /// Current alert thresholds.
    pub async fn thresholds(&self) -> ThresholdConfig {
        *self.thresholds.read().await
    }

    /// Enable or disable automatic remediation on critical breaches.
    pub fn set_auto_optimization(&self, enabled: bool) {
        self.auto_optimize.store(enabled, Ordering::Relaxed);
    }

    pub fn auto_optimization(&self) -> bool {
        self.auto_optimize.load(Ordering::Relaxed)
    }

    /// Mark an alert acknowledged. The alert stays in the log and keeps its
    /// eviction position.
    pub async fn acknowledge_alert(&self, id: u64) -> Result<()> {
        let mut manager = self.alert_manager.lock().await;
        if manager.acknowledge(id) {
            Ok(())
        } else {
            Err(EngineError::UnknownAlert { id })
        }
    }

    /// Run a remediation action on demand. Always returns a result; failure
    /// is reported through the `succeeded` flag, never an error.
    pub async fn run_optimization(&self, kind: OptimizationKind) -> OptimizationResult {
        let result = self.actuator.lock().await.run(kind);
        self.metrics.record_optimization();
        result
    }

    /// Cumulative estimated gain from successful optimizations.
    pub async fn total_optimization_gain(&self) -> f64 {
        self.actuator.lock().await.total_gain()
    }

    /// Reset the cumulative optimization gain to zero.
    pub async fn reset_optimizations(&self) {
        self.actuator.lock().await.reset();
    }

    /// Export engine counters in the prometheus text format.
    pub fn export_metrics(&self) -> Result<String> {
        self.metrics.export()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

struct SourceSlot {
    source: Box<dyn MetricSource>,
    consecutive_failures: u32,
    disabled: bool,
}

/// Everything the loop task owns. Lives entirely inside the spawned task;
/// the only shared pieces are the Arc'd collaborators it publishes through.
struct SamplerLoop {
    sources: Vec<SourceSlot>,
    history: HashMap<MetricKind, HistoryBuffer>,
    history_capacity: usize,
    scorer: HealthScorer,
    thresholds: Arc<RwLock<ThresholdConfig>>,
    auto_optimize: Arc<AtomicBool>,
    alert_manager: Arc<Mutex<AlertManager>>,
    actuator: Arc<Mutex<OptimizationActuator>>,
    metrics: Arc<EngineMetrics>,
    state: Arc<RwLock<EngineState>>,
    snapshot_tx: watch::Sender<Option<Snapshot>>,
    on_snapshot: Option<SnapshotCallback>,
    sampling: SamplingConfig,
    max_source_failures: u32,
    tick: u64,
}

impl SamplerLoop {
    async fn run(mut self, cancel: CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                break;
            }

            let delay = match self.tick().await {
                Ok(()) => {
                    self.metrics.record_tick_completed();
                    self.sampling.interval()
                }
                Err(e) => {
                    self.metrics.record_tick_failure();
                    warn!(
                        tick = self.tick,
                        category = e.category(),
                        "tick failed, continuing after backoff: {}",
                        e
                    );
                    self.sampling.failure_backoff()
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(delay) => {}
            }
        }

        // Scoped release of platform counters/handles, even when stop
        // arrived mid-tick.
        for slot in &mut self.sources {
            slot.source.shutdown();
        }

        *self.state.write().await = EngineState::Stopped;
        info!(ticks = self.tick, "sampling loop exited");
    }

    /// One iteration: read sources, update history, score, evaluate alerts,
    /// publish. Partial data never aborts the tick.
    async fn tick(&mut self) -> Result<()> {
        // Advance even when this tick later fails, so consumers can detect
        // gaps in the published sequence.
        self.tick += 1;
        let now = Utc::now();

        // One consistent view of the mutable config for the whole tick.
        let thresholds = *self.thresholds.read().await;
        let auto_optimize = self.auto_optimize.load(Ordering::Relaxed);

        let mut latest: HashMap<MetricKind, Option<f64>> = HashMap::new();
        let mut newly_disabled: Vec<MetricKind> = Vec::new();

        for slot in &mut self.sources {
            let kind = slot.source.kind();
            if slot.disabled {
                latest.insert(kind, None);
                continue;
            }

            let read = timeout(self.sampling.source_timeout(), slot.source.read()).await;
            let value = match read {
                Ok(Ok(value)) => {
                    slot.consecutive_failures = 0;
                    Some(value)
                }
                Ok(Err(e)) => {
                    slot.consecutive_failures += 1;
                    self.metrics.record_source_failure(kind);
                    debug!(metric = %kind, failures = slot.consecutive_failures, "source read failed: {}", e);
                    None
                }
                Err(_) => {
                    slot.consecutive_failures += 1;
                    self.metrics.record_source_failure(kind);
                    debug!(
                        metric = %kind,
                        failures = slot.consecutive_failures,
                        timeout_ms = self.sampling.source_timeout_ms,
                        "source read timed out"
                    );
                    None
                }
            };

            if slot.consecutive_failures >= self.max_source_failures && !slot.disabled {
                slot.disabled = true;
                newly_disabled.push(kind);
            }

            if let Some(value) = value {
                self.history
                    .entry(kind)
                    .or_insert_with(|| HistoryBuffer::new(self.history_capacity))
                    .push(Sample::new(kind, value, now));
            }
            latest.insert(kind, value);
        }

        for kind in &newly_disabled {
            warn!(
                metric = %kind,
                failures = self.max_source_failures,
                "source disabled for the remainder of this run"
            );
        }

        let health = self.scorer.score(&HealthInputs {
            cpu: latest.get(&MetricKind::Cpu).copied().flatten(),
            memory: latest.get(&MetricKind::Memory).copied().flatten(),
            gpu: latest.get(&MetricKind::Gpu).copied().flatten(),
            disk: latest.get(&MetricKind::Disk).copied().flatten(),
        });

        // Fixed metric order keeps alert ids and log order deterministic
        // when several metrics breach in the same tick.
        let breaches: Vec<(MetricKind, f64)> = MetricKind::ALL
            .iter()
            .filter_map(|&kind| latest.get(&kind).copied().flatten().map(|v| (kind, v)))
            .collect();

        let (new_alerts, alerts) = {
            let mut manager = self.alert_manager.lock().await;
            let mut created = manager.evaluate(&breaches, &thresholds, now);
            for kind in &newly_disabled {
                created.push(manager.raise(
                    *kind,
                    format!("Source unavailable: {}", kind),
                    format!(
                        "{} source disabled after {} consecutive failures",
                        kind, self.max_source_failures
                    ),
                    AlertLevel::Info,
                    now,
                ));
            }
            (created, manager.alerts())
        };

        for alert in &new_alerts {
            self.metrics.record_alert(alert.level.as_str());
            warn!(metric = %alert.metric, level = %alert.level, "{}", alert.message);
        }

        if auto_optimize {
            for alert in new_alerts
                .iter()
                .filter(|a| a.level == AlertLevel::Critical)
            {
                let action = match alert.metric {
                    MetricKind::Cpu => Some(OptimizationKind::Cpu),
                    MetricKind::Memory => Some(OptimizationKind::Memory),
                    MetricKind::Disk => Some(OptimizationKind::Disk),
                    _ => None,
                };
                if let Some(action) = action {
                    let result = self.actuator.lock().await.run(action);
                    self.metrics.record_optimization();
                    info!(
                        action = %action,
                        succeeded = result.succeeded,
                        "auto-optimization triggered by critical breach: {}",
                        result.description
                    );
                }
            }
        }

        let readings: HashMap<MetricKind, MetricReading> = self
            .sources
            .iter()
            .map(|slot| {
                let kind = slot.source.kind();
                let history = self.history.get(&kind);
                (
                    kind,
                    MetricReading {
                        latest: latest.get(&kind).copied().flatten(),
                        average: history.and_then(|h| h.average()),
                        peak: history.and_then(|h| h.peak()),
                    },
                )
            })
            .collect();

        let snapshot = Snapshot {
            tick: self.tick,
            captured_at: now,
            readings,
            health,
            alerts,
            stats: self.metrics.stats(),
        };

        debug!("{}", snapshot.summary());

        if let Some(callback) = &self.on_snapshot {
            callback(&snapshot);
        }

        self.snapshot_tx
            .send(Some(snapshot))
            .map_err(|_| EngineError::TransientTick {
                reason: "snapshot channel closed".to_string(),
            })?;

        Ok(())
    }
}
