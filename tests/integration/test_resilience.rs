//! Failure-mode tests: the engine keeps publishing when sources fail,
//! stall, or disappear, and always releases resources on stop.

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::{Duration, Instant};

    use crate::mocks::{
        BlockingRefreshSource, FlakySource, ScriptedSource, StalledSource, ThreadBlockingSource,
        TrackedSource,
    };
    use crate::{fast_test_config, init_test_environment, wait_for_tick};

    use hostpulse_engine::{AlertLevel, EngineError, MetricKind, MetricSource, SamplerEngine};

    #[tokio::test]
    async fn test_all_sources_failing_still_publishes_snapshots() {
        init_test_environment();

        let sources: Vec<Box<dyn MetricSource>> = vec![
            Box::new(FlakySource::new(MetricKind::Cpu)),
            Box::new(FlakySource::new(MetricKind::Memory)),
        ];
        let mut engine = SamplerEngine::new(fast_test_config(), sources).unwrap();
        let mut rx = engine.subscribe();

        engine.start(None).await.unwrap();
        let snapshot = wait_for_tick(&mut rx, 3).await;
        engine.stop().await.unwrap();

        // Snapshots keep flowing; they just carry no data and no health.
        assert!(snapshot.tick >= 3);
        assert!(!snapshot.is_available(MetricKind::Cpu));
        assert!(!snapshot.is_available(MetricKind::Memory));
        assert!(snapshot.health.is_none());
        assert!(snapshot.stats.source_failures > 0);
    }

    #[tokio::test]
    async fn test_stalled_source_does_not_block_healthy_ones() {
        init_test_environment();

        let cpu = ScriptedSource::steady(MetricKind::Cpu, 25.0);
        let reads = cpu.read_counter();
        let sources: Vec<Box<dyn MetricSource>> = vec![
            Box::new(cpu),
            Box::new(StalledSource::new(MetricKind::Disk)),
        ];
        let mut engine = SamplerEngine::new(fast_test_config(), sources).unwrap();
        let mut rx = engine.subscribe();

        engine.start(None).await.unwrap();
        let snapshot = wait_for_tick(&mut rx, 5).await;
        engine.stop().await.unwrap();

        assert!(snapshot.is_available(MetricKind::Cpu));
        assert!(!snapshot.is_available(MetricKind::Disk));
        assert!(reads.load(Ordering::SeqCst) >= 5);
    }

    #[tokio::test]
    async fn test_repeatedly_failing_source_is_disabled_with_notice() {
        init_test_environment();

        let sources: Vec<Box<dyn MetricSource>> = vec![
            Box::new(ScriptedSource::steady(MetricKind::Cpu, 25.0)),
            Box::new(FlakySource::new(MetricKind::Memory)),
        ];
        let config = fast_test_config();
        let max_failures = config.sampling.max_source_failures as u64;
        let mut engine = SamplerEngine::new(config, sources).unwrap();
        let mut rx = engine.subscribe();

        engine.start(None).await.unwrap();
        let snapshot = wait_for_tick(&mut rx, 8).await;
        engine.stop().await.unwrap();

        // After the disable threshold the source is no longer polled, so the
        // failure counter stops at the threshold.
        assert_eq!(snapshot.stats.source_failures, max_failures);
        assert!(snapshot
            .alerts
            .iter()
            .any(|a| a.metric == MetricKind::Memory && a.level == AlertLevel::Info));
    }

    #[tokio::test]
    async fn test_stop_is_bounded_and_releases_all_sources() {
        init_test_environment();

        let (cpu, cpu_released) = TrackedSource::new(ScriptedSource::steady(MetricKind::Cpu, 25.0));
        let (disk, disk_released) = TrackedSource::new(StalledSource::new(MetricKind::Disk));
        let sources: Vec<Box<dyn MetricSource>> = vec![Box::new(cpu), Box::new(disk)];

        let config = fast_test_config();
        let stop_budget = Duration::from_millis(config.sampling.stop_timeout_ms + 500);
        let mut engine = SamplerEngine::new(config, sources).unwrap();
        let mut rx = engine.subscribe();

        engine.start(None).await.unwrap();
        wait_for_tick(&mut rx, 2).await;

        let started = Instant::now();
        engine.stop().await.unwrap();
        assert!(started.elapsed() < stop_budget);

        assert!(cpu_released.load(Ordering::SeqCst));
        assert!(disk_released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_blocking_refresh_cannot_stall_the_tick() {
        init_test_environment();

        // One source spends 1.5 s in a blocking platform call per read, far
        // past the 10 ms read timeout; the tick must not wait it out.
        let sources: Vec<Box<dyn MetricSource>> = vec![
            Box::new(ScriptedSource::steady(MetricKind::Cpu, 25.0)),
            Box::new(BlockingRefreshSource::new(
                MetricKind::Disk,
                Duration::from_millis(1500),
            )),
        ];
        let mut engine = SamplerEngine::new(fast_test_config(), sources).unwrap();
        let mut rx = engine.subscribe();

        let started = Instant::now();
        engine.start(None).await.unwrap();
        let snapshot = wait_for_tick(&mut rx, 1).await;
        let first_snapshot_after = started.elapsed();
        engine.stop().await.unwrap();

        assert!(
            first_snapshot_after < Duration::from_secs(1),
            "first snapshot took {:?}",
            first_snapshot_after
        );
        assert!(snapshot.is_available(MetricKind::Cpu));
        assert!(!snapshot.is_available(MetricKind::Disk));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_uninterruptible_source_times_out_stop_but_still_releases() {
        init_test_environment();

        // Blocks the loop thread itself, so the read timeout cannot fire and
        // stop() exhausts its bounded wait.
        let (source, released) =
            ThreadBlockingSource::new(MetricKind::Cpu, Duration::from_millis(300));
        let sources: Vec<Box<dyn MetricSource>> = vec![Box::new(source)];

        let mut config = fast_test_config();
        config.sampling.stop_timeout_ms = 50;
        let mut engine = SamplerEngine::new(config, sources).unwrap();
        let mut rx = engine.subscribe();

        engine.start(None).await.unwrap();
        wait_for_tick(&mut rx, 1).await;
        // Land the stop inside the next blocked read, not the inter-tick wait.
        tokio::time::sleep(Duration::from_millis(100)).await;

        let result = engine.stop().await;
        assert!(matches!(result, Err(EngineError::ShutdownTimeout { .. })));

        // The detached loop exits once the blocked read returns and still
        // releases the source.
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_recovering_source_resumes_before_disable_threshold() {
        init_test_environment();

        // Two failures, then recovery: below the disable threshold of three.
        let cpu = ScriptedSource::new(
            MetricKind::Cpu,
            vec![
                Err(hostpulse_engine::error::SourceError::Unavailable {
                    reason: "warming up".to_string(),
                }),
                Err(hostpulse_engine::error::SourceError::Unavailable {
                    reason: "warming up".to_string(),
                }),
                Ok(42.0),
            ],
            42.0,
        );
        let sources: Vec<Box<dyn MetricSource>> = vec![Box::new(cpu)];
        let mut engine = SamplerEngine::new(fast_test_config(), sources).unwrap();
        let mut rx = engine.subscribe();

        engine.start(None).await.unwrap();
        let snapshot = wait_for_tick(&mut rx, 4).await;
        engine.stop().await.unwrap();

        assert!(snapshot.is_available(MetricKind::Cpu));
        assert_eq!(snapshot.stats.source_failures, 2);
        // The recovery reset the failure streak, so no disable notice exists.
        assert!(snapshot.alerts.iter().all(|a| a.level != AlertLevel::Info));
    }
}
