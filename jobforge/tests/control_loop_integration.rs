//! Integration tests for the closed control loop: priority ordering,
//! monitor-driven tuning, and runtime lifecycle.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use jobforge::monitor::{
    MetricKind, MonitorConfig, PerformanceMonitor, SuggestionAction,
};
use jobforge::priority::{PriorityConfig, PriorityLevel, PriorityManager};
use jobforge::runtime::{Runtime, RuntimeConfig};
use jobforge::scheduler::{work_fn, JobStatus, SchedulerConfig, SubmitOptions};

#[test]
fn test_dependent_source_ordered_after_dependency() {
    let manager = PriorityManager::default();

    manager
        .register(
            "A",
            PriorityLevel::Normal,
            9,
            8,
            HashMap::new(),
            HashSet::new(),
        )
        .unwrap();
    manager
        .register(
            "B",
            PriorityLevel::Normal,
            5,
            4,
            HashMap::new(),
            ["A".to_string()].into_iter().collect(),
        )
        .unwrap();

    let order = manager.optimized_order(None, None);
    let names: Vec<&str> = order.jobs.iter().map(|j| j.source.as_str()).collect();
    assert_eq!(names, vec!["A", "B"]);
    assert!(!order.has_cycles());
}

#[test]
fn test_scores_stay_in_unit_interval() {
    let manager = PriorityManager::new(PriorityConfig::default());
    for (name, importance, urgency) in [("lo", 1, 1), ("mid", 5, 6), ("hi", 10, 10)] {
        manager
            .register(
                name,
                PriorityLevel::Normal,
                importance,
                urgency,
                HashMap::new(),
                HashSet::new(),
            )
            .unwrap();
    }

    for name in ["lo", "mid", "hi"] {
        let score = manager.score(name, Utc::now()).unwrap();
        assert!((0.0..=1.0).contains(&score.total));
        for sub in [
            score.importance,
            score.urgency,
            score.performance,
            score.resource,
            score.time,
        ] {
            assert!((0.0..=1.0).contains(&sub));
        }
    }
}

#[test]
fn test_sustained_high_cpu_suggests_fewer_workers() {
    let monitor = PerformanceMonitor::new(MonitorConfig::default());

    // Five consecutive samples averaging above 80%.
    for cpu in [82.0, 85.0, 88.0, 90.0, 84.0] {
        monitor.record_system_sample(cpu, 50.0);
    }

    let suggestions = monitor.suggest();
    let decrease = suggestions
        .iter()
        .find(|s| s.action == SuggestionAction::DecreaseWorkers)
        .expect("sustained high CPU should suggest fewer workers");
    assert!(decrease.priority >= 8);
}

#[tokio::test]
async fn test_runtime_end_to_end_submit_cache_report() {
    let runtime = Runtime::new(RuntimeConfig {
        scheduler: SchedulerConfig {
            pool_size: 2,
            ..SchedulerConfig::default()
        },
        ..RuntimeConfig::default()
    });
    runtime.start();

    let scheduler = runtime.scheduler();
    let cache = runtime.cache();
    let priorities = runtime.priorities();
    let monitor = runtime.monitor();

    // Register two sources and get an execution order.
    priorities
        .register(
            "quotes",
            PriorityLevel::High,
            9,
            8,
            HashMap::new(),
            HashSet::new(),
        )
        .unwrap();
    priorities
        .register(
            "analytics",
            PriorityLevel::Normal,
            5,
            4,
            HashMap::new(),
            ["quotes".to_string()].into_iter().collect(),
        )
        .unwrap();

    let order = priorities.optimized_order(None, None);
    assert_eq!(order.jobs[0].source, "quotes");

    // Run each scheduled source as a job that memoizes into the cache.
    let mut ids = Vec::new();
    for slot in &order.jobs {
        let key = format!("result:{}", slot.source);
        let cache_for_job = Arc::clone(&cache);
        let cached = cache_for_job.get(&key);
        let id = scheduler
            .submit(
                work_fn(move |_| {
                    let cache = Arc::clone(&cache_for_job);
                    let key = key.clone();
                    let cached = cached.clone();
                    async move {
                        if let Some(hit) = cached {
                            return Ok(Some(hit));
                        }
                        let value = b"computed".to_vec();
                        cache
                            .set(&key, value.clone(), Some(Duration::from_secs(60)), None)
                            .map_err(|e| e.to_string())?;
                        Ok(Some(value))
                    }
                }),
                SubmitOptions {
                    label: Some(slot.source.clone()),
                    priority: slot.priority,
                    ..SubmitOptions::default()
                },
            )
            .await;
        ids.push((slot.source.clone(), id));
    }

    let id_list: Vec<_> = ids.iter().map(|(_, id)| *id).collect();
    let outcomes = scheduler
        .await_completion(&id_list, Some(Duration::from_secs(10)))
        .await;

    for (source, id) in &ids {
        let outcome = &outcomes[id];
        assert_eq!(outcome.status, JobStatus::Completed);

        // Feed outcomes back into the priority manager and monitor.
        priorities
            .record_outcome(
                source,
                outcome.is_success(),
                outcome.processing_time.unwrap_or_default(),
                outcome.error.clone(),
            )
            .unwrap();
        monitor.record_job_outcome(
            outcome.is_success(),
            outcome.processing_time.unwrap_or_default(),
            Some(source.clone()),
        );
    }

    // Memoized values are visible through the cache surface.
    assert_eq!(cache.get("result:quotes"), Some(b"computed".to_vec()));
    assert!(cache.stats().hit_rate() >= 0.0);

    // The report reflects the recorded samples.
    let report = monitor.report(None);
    assert!(report.statistics.contains_key(&MetricKind::JobLatency));
    assert!(report.health_score > 0.0);

    tokio::time::timeout(Duration::from_secs(5), runtime.shutdown())
        .await
        .expect("runtime shutdown must be deterministic");
}

#[tokio::test]
async fn test_feedback_paths_do_not_contradict() {
    // The two feedback paths touch disjoint state: auto-demotion moves a
    // source's base priority, auto-tune moves pool size / retry defaults.
    // Run both concurrently against the same runtime and verify each
    // landed without clobbering the other.
    let runtime = Runtime::new(RuntimeConfig {
        scheduler: SchedulerConfig {
            pool_size: 4,
            ..SchedulerConfig::default()
        },
        ..RuntimeConfig::default()
    });

    let priorities = runtime.priorities();
    let scheduler = runtime.scheduler();

    priorities
        .register(
            "flaky",
            PriorityLevel::High,
            7,
            7,
            HashMap::new(),
            HashSet::new(),
        )
        .unwrap();

    let demote = {
        let priorities = Arc::clone(&priorities);
        tokio::spawn(async move {
            for _ in 0..10 {
                priorities
                    .record_outcome(
                        "flaky",
                        false,
                        Duration::from_millis(5),
                        Some("boom".to_string()),
                    )
                    .unwrap();
            }
        })
    };
    let tune = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move {
            scheduler.resize_pool(2).unwrap();
            scheduler.set_default_max_retries(1);
        })
    };

    demote.await.unwrap();
    tune.await.unwrap();

    // Demotion landed.
    assert_eq!(
        priorities.source("flaky").unwrap().base_priority,
        PriorityLevel::Background
    );
    assert!(!priorities.adjustment_history().is_empty());

    // Auto-tune state landed independently.
    assert_eq!(scheduler.pool_size(), 2);
    assert_eq!(scheduler.default_max_retries(), 1);

    runtime.shutdown().await;
}

#[test]
fn test_priority_review_loop_logic_demotes_once_enough_history() {
    let manager = PriorityManager::new(PriorityConfig {
        // Synchronous auto-demotion off: only the periodic review demotes.
        auto_demote: false,
        ..PriorityConfig::default()
    });
    manager
        .register(
            "batch",
            PriorityLevel::Normal,
            5,
            5,
            HashMap::new(),
            HashSet::new(),
        )
        .unwrap();

    for _ in 0..6 {
        manager
            .record_outcome("batch", false, Duration::from_millis(5), None)
            .unwrap();
    }
    assert_eq!(
        manager.source("batch").unwrap().base_priority,
        PriorityLevel::Normal
    );

    let adjusted = manager.review_error_rates();
    assert_eq!(adjusted, vec!["batch".to_string()]);
    assert_eq!(
        manager.source("batch").unwrap().base_priority,
        PriorityLevel::Low
    );
}
