//! Full pipeline tests: sources through history, scoring, and alerting to
//! published snapshots.

#[cfg(test)]
mod tests {
    use crate::mocks::ScriptedSource;
    use crate::{fast_test_config, init_test_environment, wait_for_tick};

    use hostpulse_engine::{
        AlertLevel, HealthLabel, MetricKind, MetricSource, OptimizationKind, SamplerEngine,
    };

    fn boxed(sources: Vec<ScriptedSource>) -> Vec<Box<dyn MetricSource>> {
        sources
            .into_iter()
            .map(|s| Box::new(s) as Box<dyn MetricSource>)
            .collect()
    }

    #[tokio::test]
    async fn test_snapshots_carry_history_statistics() {
        init_test_environment();

        let cpu = ScriptedSource::new(
            MetricKind::Cpu,
            vec![Ok(10.0), Ok(30.0), Ok(50.0)],
            50.0,
        );
        let mut engine = SamplerEngine::new(fast_test_config(), boxed(vec![cpu])).unwrap();
        let mut rx = engine.subscribe();

        engine.start(None).await.unwrap();
        let snapshot = wait_for_tick(&mut rx, 3).await;
        engine.stop().await.unwrap();

        let reading = snapshot.reading(MetricKind::Cpu).unwrap();
        assert_eq!(reading.peak, Some(50.0));
        // Average over [10, 30, 50, ...50s] stays within the sampled range.
        let average = reading.average.unwrap();
        assert!(average >= 10.0 && average <= 50.0);
        assert!(reading.latest.is_some());
    }

    #[tokio::test]
    async fn test_health_scored_from_current_readings() {
        init_test_environment();

        let sources = boxed(vec![
            ScriptedSource::steady(MetricKind::Cpu, 0.0),
            ScriptedSource::steady(MetricKind::Memory, 0.0),
            ScriptedSource::steady(MetricKind::Disk, 0.0),
        ]);
        let mut engine = SamplerEngine::new(fast_test_config(), sources).unwrap();
        let mut rx = engine.subscribe();

        engine.start(None).await.unwrap();
        let snapshot = wait_for_tick(&mut rx, 1).await;
        engine.stop().await.unwrap();

        // Idle host with no GPU source: every contributing metric scores 100.
        let health = snapshot.health.unwrap();
        assert_eq!(health.score, 100.0);
        assert_eq!(health.label, HealthLabel::Excellent);
    }

    #[tokio::test]
    async fn test_breach_raises_alert_visible_in_snapshot() {
        init_test_environment();

        let sources = boxed(vec![
            ScriptedSource::steady(MetricKind::Cpu, 30.0),
            ScriptedSource::steady(MetricKind::Memory, 97.0),
        ]);
        let mut engine = SamplerEngine::new(fast_test_config(), sources).unwrap();
        let mut rx = engine.subscribe();

        engine.start(None).await.unwrap();
        let snapshot = wait_for_tick(&mut rx, 2).await;
        engine.stop().await.unwrap();

        let memory_alerts: Vec<_> = snapshot
            .alerts
            .iter()
            .filter(|a| a.metric == MetricKind::Memory)
            .collect();
        assert_eq!(memory_alerts.len(), 1);
        assert_eq!(memory_alerts[0].level, AlertLevel::Critical);
        assert!(snapshot.alerts.iter().all(|a| a.metric != MetricKind::Cpu));
        assert!(snapshot.stats.alerts_emitted >= 1);
    }

    #[tokio::test]
    async fn test_auto_optimization_runs_on_critical_breach() {
        init_test_environment();

        let mut config = fast_test_config();
        config.optimization.auto = true;

        let sources = boxed(vec![ScriptedSource::new(
            MetricKind::Memory,
            vec![Ok(97.0)],
            20.0,
        )]);
        let mut engine = SamplerEngine::new(config, sources).unwrap();
        let mut rx = engine.subscribe();

        engine.start(None).await.unwrap();
        let snapshot = wait_for_tick(&mut rx, 2).await;
        engine.stop().await.unwrap();

        assert!(snapshot.stats.optimizations_run >= 1);
        assert!(engine.total_optimization_gain().await >= 0.0);
    }

    #[tokio::test]
    async fn test_manual_optimization_accumulates_and_resets_gain() {
        init_test_environment();

        let engine = SamplerEngine::new(
            fast_test_config(),
            boxed(vec![ScriptedSource::steady(MetricKind::Cpu, 20.0)]),
        )
        .unwrap();

        let network = engine.run_optimization(OptimizationKind::Network).await;
        assert!(network.succeeded);
        let cpu = engine.run_optimization(OptimizationKind::Cpu).await;
        assert!(cpu.succeeded);

        assert_eq!(engine.total_optimization_gain().await, 35.0);

        engine.reset_optimizations().await;
        assert_eq!(engine.total_optimization_gain().await, 0.0);
    }

    #[tokio::test]
    async fn test_exported_metrics_reflect_loop_activity() {
        init_test_environment();

        let mut engine = SamplerEngine::new(
            fast_test_config(),
            boxed(vec![ScriptedSource::steady(MetricKind::Cpu, 20.0)]),
        )
        .unwrap();
        let mut rx = engine.subscribe();

        engine.start(None).await.unwrap();
        wait_for_tick(&mut rx, 2).await;
        engine.stop().await.unwrap();

        let exported = engine.export_metrics().unwrap();
        assert!(exported.contains("hostpulse_ticks_completed_total"));
    }
}
