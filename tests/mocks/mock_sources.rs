//! Controlled metric sources
//!
//! Each mock implements the same trait the production sysinfo adapters do, so
//! the engine under test runs its real loop against deterministic inputs.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use hostpulse_engine::error::{SourceError, SourceResult};
use hostpulse_engine::source::{MetricKind, MetricSource};

/// Replays a scripted sequence of outcomes, then a steady fallback value.
pub struct ScriptedSource {
    kind: MetricKind,
    script: VecDeque<SourceResult<f64>>,
    fallback: f64,
    reads: Arc<AtomicU64>,
}

impl ScriptedSource {
    pub fn new(kind: MetricKind, script: Vec<SourceResult<f64>>, fallback: f64) -> Self {
        Self {
            kind,
            script: script.into(),
            fallback,
            reads: Arc::new(AtomicU64::new(0)),
        }
    }

    /// A source that always answers with the same value.
    pub fn steady(kind: MetricKind, value: f64) -> Self {
        Self::new(kind, Vec::new(), value)
    }

    /// Counter of reads performed, observable after the source moves into
    /// the engine.
    pub fn read_counter(&self) -> Arc<AtomicU64> {
        self.reads.clone()
    }
}

#[async_trait]
impl MetricSource for ScriptedSource {
    fn kind(&self) -> MetricKind {
        self.kind
    }

    async fn read(&mut self) -> SourceResult<f64> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        match self.script.pop_front() {
            Some(result) => result,
            None => Ok(self.fallback),
        }
    }
}

/// Fails every read with the same error.
pub struct FlakySource {
    kind: MetricKind,
}

impl FlakySource {
    pub fn new(kind: MetricKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl MetricSource for FlakySource {
    fn kind(&self) -> MetricKind {
        self.kind
    }

    async fn read(&mut self) -> SourceResult<f64> {
        Err(SourceError::Unavailable {
            reason: "mock source configured to fail".to_string(),
        })
    }
}

/// Never answers within any sane read timeout.
pub struct StalledSource {
    kind: MetricKind,
}

impl StalledSource {
    pub fn new(kind: MetricKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl MetricSource for StalledSource {
    fn kind(&self) -> MetricKind {
        self.kind
    }

    async fn read(&mut self) -> SourceResult<f64> {
        tokio::time::sleep(Duration::from_secs(600)).await;
        Ok(0.0)
    }
}

/// Performs its blocking work on the blocking pool, the way the production
/// sysinfo adapters do, so the engine's read timeout can abandon it.
pub struct BlockingRefreshSource {
    kind: MetricKind,
    block: Duration,
}

impl BlockingRefreshSource {
    pub fn new(kind: MetricKind, block: Duration) -> Self {
        Self { kind, block }
    }
}

#[async_trait]
impl MetricSource for BlockingRefreshSource {
    fn kind(&self) -> MetricKind {
        self.kind
    }

    async fn read(&mut self) -> SourceResult<f64> {
        let block = self.block;
        tokio::task::spawn_blocking(move || {
            std::thread::sleep(block);
            Ok(5.0)
        })
        .await
        .map_err(|e| SourceError::Unavailable {
            reason: e.to_string(),
        })?
    }
}

/// A misbehaving source that blocks the calling thread inside `read()`
/// without ever yielding, so no timeout can interrupt the read itself.
pub struct ThreadBlockingSource {
    kind: MetricKind,
    block: Duration,
    released: Arc<AtomicBool>,
}

impl ThreadBlockingSource {
    pub fn new(kind: MetricKind, block: Duration) -> (Self, Arc<AtomicBool>) {
        let released = Arc::new(AtomicBool::new(false));
        (
            Self {
                kind,
                block,
                released: released.clone(),
            },
            released,
        )
    }
}

#[async_trait]
impl MetricSource for ThreadBlockingSource {
    fn kind(&self) -> MetricKind {
        self.kind
    }

    async fn read(&mut self) -> SourceResult<f64> {
        std::thread::sleep(self.block);
        Ok(10.0)
    }

    fn shutdown(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

/// Wraps another source and records whether the engine released it.
pub struct TrackedSource<S> {
    inner: S,
    released: Arc<AtomicBool>,
}

impl<S: MetricSource> TrackedSource<S> {
    pub fn new(inner: S) -> (Self, Arc<AtomicBool>) {
        let released = Arc::new(AtomicBool::new(false));
        (
            Self {
                inner,
                released: released.clone(),
            },
            released,
        )
    }
}

#[async_trait]
impl<S: MetricSource> MetricSource for TrackedSource<S> {
    fn kind(&self) -> MetricKind {
        self.inner.kind()
    }

    async fn read(&mut self) -> SourceResult<f64> {
        self.inner.read().await
    }

    fn shutdown(&mut self) {
        self.inner.shutdown();
        self.released.store(true, Ordering::SeqCst);
    }
}
