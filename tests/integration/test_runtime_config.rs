//! Configuration tests: file loading feeding a live engine, and the two
//! settings mutable at runtime (thresholds and auto-optimization).

#[cfg(test)]
mod tests {
    use crate::mocks::ScriptedSource;
    use crate::{fast_test_config, init_test_environment, wait_for_tick};

    use hostpulse_engine::{
        AlertLevel, EngineConfig, MetricKind, MetricSource, SamplerEngine, ThresholdConfig,
    };
    use tempfile::NamedTempFile;

    fn single_cpu(value: f64) -> Vec<Box<dyn MetricSource>> {
        vec![Box::new(ScriptedSource::steady(MetricKind::Cpu, value))]
    }

    #[tokio::test]
    async fn test_engine_honors_file_configuration() {
        init_test_environment();

        let content = r#"
            [sampling]
            interval_ms = 20
            failure_backoff_ms = 20
            source_timeout_ms = 10
            stop_timeout_ms = 2000

            [thresholds.cpu]
            warn = 10.0
            critical = 50.0

            [optimization]
            auto = false
        "#;
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), content).unwrap();

        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.sampling.interval_ms, 20);
        assert_eq!(config.thresholds.cpu.warn, 10.0);

        // A 30% CPU reading breaches the lowered warn threshold from the file.
        let mut engine = SamplerEngine::new(config, single_cpu(30.0)).unwrap();
        let mut rx = engine.subscribe();

        engine.start(None).await.unwrap();
        let snapshot = wait_for_tick(&mut rx, 2).await;
        engine.stop().await.unwrap();

        assert!(snapshot
            .alerts
            .iter()
            .any(|a| a.metric == MetricKind::Cpu && a.level == AlertLevel::Warning));
    }

    #[tokio::test]
    async fn test_threshold_update_applies_from_next_tick() {
        init_test_environment();

        let mut engine = SamplerEngine::new(fast_test_config(), single_cpu(30.0)).unwrap();
        let mut rx = engine.subscribe();

        engine.start(None).await.unwrap();
        let before = wait_for_tick(&mut rx, 2).await;
        // 30% CPU is quiet under the default 80% warn threshold.
        assert!(before.alerts.is_empty());

        let mut thresholds = ThresholdConfig::default();
        thresholds.cpu.warn = 20.0;
        engine.update_thresholds(thresholds).await.unwrap();

        let after = wait_for_tick(&mut rx, before.tick + 2).await;
        engine.stop().await.unwrap();

        assert!(after
            .alerts
            .iter()
            .any(|a| a.metric == MetricKind::Cpu && a.level == AlertLevel::Warning));
    }

    #[tokio::test]
    async fn test_invalid_threshold_update_keeps_engine_quiet() {
        init_test_environment();

        let mut engine = SamplerEngine::new(fast_test_config(), single_cpu(30.0)).unwrap();
        let mut rx = engine.subscribe();

        engine.start(None).await.unwrap();

        // warn above critical is rejected; the default thresholds survive.
        let mut invalid = ThresholdConfig::default();
        invalid.cpu.warn = 99.0;
        assert!(engine.update_thresholds(invalid).await.is_err());

        let snapshot = wait_for_tick(&mut rx, 3).await;
        engine.stop().await.unwrap();

        assert!(snapshot.alerts.is_empty());
    }

    #[tokio::test]
    async fn test_auto_optimization_toggle_takes_effect() {
        init_test_environment();

        let mut config = fast_test_config();
        config.optimization.auto = true;

        // Critical breach only after the toggle has been flipped off.
        let cpu = ScriptedSource::new(
            MetricKind::Cpu,
            vec![Ok(10.0), Ok(10.0), Ok(10.0), Ok(10.0), Ok(96.0)],
            10.0,
        );
        let sources: Vec<Box<dyn MetricSource>> = vec![Box::new(cpu)];
        let mut engine = SamplerEngine::new(config, sources).unwrap();
        let mut rx = engine.subscribe();

        engine.start(None).await.unwrap();
        assert!(engine.auto_optimization());
        engine.set_auto_optimization(false);

        let snapshot = wait_for_tick(&mut rx, 6).await;
        engine.stop().await.unwrap();

        // The breach alerted but no remediation ran.
        assert!(snapshot
            .alerts
            .iter()
            .any(|a| a.level == AlertLevel::Critical));
        assert_eq!(snapshot.stats.optimizations_run, 0);
    }

    #[tokio::test]
    async fn test_config_round_trip_preserves_engine_settings() {
        init_test_environment();

        let mut config = EngineConfig::default();
        config.sampling.interval_ms = 1000;
        config.alerts.cooldown_secs = 60;

        let file = NamedTempFile::new().unwrap();
        config.save_to_file(file.path()).unwrap();
        let loaded = EngineConfig::from_file(file.path()).unwrap();

        assert_eq!(loaded.sampling.interval_ms, 1000);
        assert_eq!(loaded.alerts.cooldown_secs, 60);
        assert_eq!(loaded.thresholds, config.thresholds);
    }
}
