//! Metric sources for the hostpulse engine
//!
//! A [`MetricSource`] provides a single instantaneous reading for one
//! [`MetricKind`]. The engine only ever calls `read()` under its own bounded
//! timeout; a stalled source costs at most that timeout per tick and can
//! never stall the loop globally. Production adapters are backed by the
//! `sysinfo` crate and run their platform refreshes on the blocking pool, so
//! the timeout can abandon a hung refresh at the await point; tests
//! substitute scripted fakes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use sysinfo::{Disks, Networks, System};

use crate::error::{SourceError, SourceResult};

/// The set of metrics the engine understands.
///
/// GPU is optional: when no source is registered for it, derived statistics
/// report "unavailable" rather than zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Cpu,
    Memory,
    Disk,
    NetworkSent,
    NetworkReceived,
    Gpu,
}

impl MetricKind {
    /// All known metric kinds, in display order.
    pub const ALL: [MetricKind; 6] = [
        MetricKind::Cpu,
        MetricKind::Memory,
        MetricKind::Disk,
        MetricKind::NetworkSent,
        MetricKind::NetworkReceived,
        MetricKind::Gpu,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Cpu => "cpu",
            MetricKind::Memory => "memory",
            MetricKind::Disk => "disk",
            MetricKind::NetworkSent => "network_sent",
            MetricKind::NetworkReceived => "network_received",
            MetricKind::Gpu => "gpu",
        }
    }

    /// Whether readings for this metric are percentages (0-100) as opposed
    /// to rates (bytes/sec). Only percentage metrics participate in health
    /// scoring and threshold evaluation.
    pub fn is_percentage(&self) -> bool {
        matches!(
            self,
            MetricKind::Cpu | MetricKind::Memory | MetricKind::Disk | MetricKind::Gpu
        )
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reading of one metric. Immutable once created.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub metric: MetricKind,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

impl Sample {
    pub fn new(metric: MetricKind, value: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            metric,
            value,
            timestamp,
        }
    }
}

/// Polymorphic provider of a single instantaneous reading.
///
/// Implementations must be cheap to call and must not hold locks across
/// `read()`; the engine imposes its own timeout around every call. `shutdown`
/// is invoked exactly once when the sampling loop exits, so implementations
/// holding platform counters or handles release them there.
#[async_trait]
pub trait MetricSource: Send {
    /// The metric this source provides.
    fn kind(&self) -> MetricKind;

    /// Take one reading. Percentage metrics return 0-100; rate metrics
    /// return bytes per second.
    async fn read(&mut self) -> SourceResult<f64>;

    /// Release any platform resources. Default is a no-op.
    fn shutdown(&mut self) {}
}

/// Run a blocking platform refresh on the blocking pool.
///
/// Platform refreshes make blocking syscalls and never yield, so they must
/// not run inside the loop task: the engine's read timeout can only cancel a
/// future at an await point. Spawned here, a hung refresh is abandoned at the
/// `.await` while it keeps its state lock; subsequent reads then fail fast
/// via `try_lock` instead of queueing behind it.
async fn blocking_read<F>(refresh: F) -> SourceResult<f64>
where
    F: FnOnce() -> SourceResult<f64> + Send + 'static,
{
    tokio::task::spawn_blocking(refresh)
        .await
        .map_err(|e| SourceError::Unavailable {
            reason: format!("refresh task failed: {}", e),
        })?
}

/// CPU usage percentage via sysinfo.
///
/// sysinfo derives usage from the delta between consecutive refreshes, so
/// the first tick after startup legitimately reads near zero.
pub struct SysinfoCpuSource {
    system: Arc<Mutex<System>>,
}

impl SysinfoCpuSource {
    pub fn new() -> Self {
        let mut system = System::new();
        // Prime the counter so the second refresh yields a real delta.
        system.refresh_cpu();
        Self {
            system: Arc::new(Mutex::new(system)),
        }
    }
}

impl Default for SysinfoCpuSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetricSource for SysinfoCpuSource {
    fn kind(&self) -> MetricKind {
        MetricKind::Cpu
    }

    async fn read(&mut self) -> SourceResult<f64> {
        let system = Arc::clone(&self.system);
        blocking_read(move || {
            let mut system = system.try_lock().map_err(|_| SourceError::Unavailable {
                reason: "previous cpu refresh still running".to_string(),
            })?;
            system.refresh_cpu();
            if system.cpus().is_empty() {
                return Err(SourceError::Unavailable {
                    reason: "no CPUs reported".to_string(),
                });
            }
            Ok(system.global_cpu_info().cpu_usage() as f64)
        })
        .await
    }
}

/// Memory usage percentage via sysinfo.
pub struct SysinfoMemorySource {
    system: Arc<Mutex<System>>,
}

impl SysinfoMemorySource {
    pub fn new() -> Self {
        Self {
            system: Arc::new(Mutex::new(System::new())),
        }
    }
}

impl Default for SysinfoMemorySource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetricSource for SysinfoMemorySource {
    fn kind(&self) -> MetricKind {
        MetricKind::Memory
    }

    async fn read(&mut self) -> SourceResult<f64> {
        let system = Arc::clone(&self.system);
        blocking_read(move || {
            let mut system = system.try_lock().map_err(|_| SourceError::Unavailable {
                reason: "previous memory refresh still running".to_string(),
            })?;
            system.refresh_memory();
            let total = system.total_memory();
            if total == 0 {
                // Report unavailable rather than fabricating a reading from
                // a fallback total.
                return Err(SourceError::Unavailable {
                    reason: "total memory reported as zero".to_string(),
                });
            }
            Ok(system.used_memory() as f64 / total as f64 * 100.0)
        })
        .await
    }
}

/// Disk space usage percentage across fixed disks via sysinfo.
pub struct SysinfoDiskSource {
    disks: Arc<Mutex<Disks>>,
}

impl SysinfoDiskSource {
    pub fn new() -> Self {
        Self {
            disks: Arc::new(Mutex::new(Disks::new_with_refreshed_list())),
        }
    }
}

impl Default for SysinfoDiskSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetricSource for SysinfoDiskSource {
    fn kind(&self) -> MetricKind {
        MetricKind::Disk
    }

    async fn read(&mut self) -> SourceResult<f64> {
        let disks = Arc::clone(&self.disks);
        blocking_read(move || {
            let mut disks = disks.try_lock().map_err(|_| SourceError::Unavailable {
                reason: "previous disk refresh still running".to_string(),
            })?;
            disks.refresh();
            let total: u64 = disks.iter().map(|d| d.total_space()).sum();
            if total == 0 {
                return Err(SourceError::Unavailable {
                    reason: "no disks with reported capacity".to_string(),
                });
            }
            let available: u64 = disks.iter().map(|d| d.available_space()).sum();
            Ok((total - available) as f64 / total as f64 * 100.0)
        })
        .await
    }
}

/// Direction of a network throughput source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkDirection {
    Sent,
    Received,
}

struct NetworkState {
    networks: Networks,
    last_refresh: Instant,
}

/// Network throughput in bytes/sec, summed over all interfaces.
///
/// sysinfo reports bytes transferred since the previous refresh; dividing by
/// the elapsed wall time turns that into a rate for the tick.
pub struct SysinfoNetworkSource {
    state: Arc<Mutex<NetworkState>>,
    direction: NetworkDirection,
}

impl SysinfoNetworkSource {
    pub fn new(direction: NetworkDirection) -> Self {
        Self {
            state: Arc::new(Mutex::new(NetworkState {
                networks: Networks::new_with_refreshed_list(),
                last_refresh: Instant::now(),
            })),
            direction,
        }
    }
}

#[async_trait]
impl MetricSource for SysinfoNetworkSource {
    fn kind(&self) -> MetricKind {
        match self.direction {
            NetworkDirection::Sent => MetricKind::NetworkSent,
            NetworkDirection::Received => MetricKind::NetworkReceived,
        }
    }

    async fn read(&mut self) -> SourceResult<f64> {
        let state = Arc::clone(&self.state);
        let direction = self.direction;
        blocking_read(move || {
            let mut state = state.try_lock().map_err(|_| SourceError::Unavailable {
                reason: "previous network refresh still running".to_string(),
            })?;
            state.networks.refresh();
            let elapsed = state.last_refresh.elapsed().as_secs_f64();
            state.last_refresh = Instant::now();
            if state.networks.iter().next().is_none() {
                return Err(SourceError::Unavailable {
                    reason: "no network interfaces".to_string(),
                });
            }
            let bytes: u64 = state
                .networks
                .iter()
                .map(|(_, data)| match direction {
                    NetworkDirection::Sent => data.transmitted(),
                    NetworkDirection::Received => data.received(),
                })
                .sum();
            if elapsed <= 0.0 {
                return Ok(0.0);
            }
            Ok(bytes as f64 / elapsed)
        })
        .await
    }
}

/// The default production source set: CPU, memory, disk, and both network
/// directions. GPU is intentionally absent; there is no portable source for
/// it and the engine degrades that metric to "unavailable".
pub fn default_sources() -> Vec<Box<dyn MetricSource>> {
    vec![
        Box::new(SysinfoCpuSource::new()),
        Box::new(SysinfoMemorySource::new()),
        Box::new(SysinfoDiskSource::new()),
        Box::new(SysinfoNetworkSource::new(NetworkDirection::Sent)),
        Box::new(SysinfoNetworkSource::new(NetworkDirection::Received)),
    ]
}
