//! Scheduling and isolation behavior of the sync manager.

use async_trait::async_trait;
use planner_sync::models::{SyncReport, TenantConfig};
use planner_sync::services::{CycleOutcome, CycleRunner, SyncManager};
use planner_sync::AppError;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time;

fn tenant_config() -> TenantConfig {
    TenantConfig {
        canvas_url: "https://canvas.example.edu".to_string(),
        canvas_token: "canvas-token".to_string(),
        notion_token: "secret_notion".to_string(),
        notion_database_id: "db-123".to_string(),
        openai_api_key: None,
        openai_model: None,
        days_to_fetch: 16,
    }
}

#[derive(Default)]
struct ScriptedRunner {
    calls: Mutex<Vec<String>>,
    failing: HashSet<String>,
    panicking: HashSet<String>,
    delay: Duration,
}

impl ScriptedRunner {
    fn calls_for(&self, tenant_id: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|id| *id == tenant_id)
            .count()
    }
}

/// Handle the manager owns while the test keeps its own clone.
struct SharedRunner(Arc<ScriptedRunner>);

#[async_trait]
impl CycleRunner for SharedRunner {
    async fn run_cycle(
        &self,
        tenant_id: &str,
        _config: &TenantConfig,
    ) -> Result<SyncReport, AppError> {
        let runner = &self.0;
        runner.calls.lock().unwrap().push(tenant_id.to_string());
        if !runner.delay.is_zero() {
            time::sleep(runner.delay).await;
        }
        if runner.panicking.contains(tenant_id) {
            panic!("runner blew up for {}", tenant_id);
        }
        if runner.failing.contains(tenant_id) {
            return Err(AppError::authentication("Invalid API token"));
        }
        Ok(SyncReport {
            matched: 3,
            ..Default::default()
        })
    }
}

async fn manager_with(
    runner: ScriptedRunner,
    tenants: &[&str],
) -> (SyncManager<SharedRunner>, Arc<ScriptedRunner>) {
    let runner = Arc::new(runner);
    let manager = SyncManager::with_runner(SharedRunner(runner.clone()), Duration::from_secs(60));
    for id in tenants {
        manager.add_user(id, tenant_config()).await.unwrap();
    }
    (manager, runner)
}

#[tokio::test]
async fn test_failing_tenant_does_not_affect_others() {
    let runner = ScriptedRunner {
        failing: HashSet::from(["bob".to_string()]),
        ..Default::default()
    };
    let (manager, _runner) = manager_with(runner, &["alice", "bob", "carol"]).await;

    let runs = manager.run_once().await;

    assert_eq!(runs.len(), 3);
    let failed: Vec<&str> = runs
        .iter()
        .filter(|r| r.is_failure())
        .map(|r| r.tenant_id.as_str())
        .collect();
    assert_eq!(failed, vec!["bob"]);
    assert!(matches!(&runs[0].outcome, CycleOutcome::Synced(r) if r.matched == 3));
    assert!(matches!(runs[2].outcome, CycleOutcome::Synced(_)));
}

#[tokio::test]
async fn test_panicking_tenant_is_reported_as_failure() {
    let runner = ScriptedRunner {
        panicking: HashSet::from(["bob".to_string()]),
        ..Default::default()
    };
    let (manager, runner) = manager_with(runner, &["alice", "bob"]).await;

    let runs = manager.run_once().await;

    assert!(matches!(runs[0].outcome, CycleOutcome::Synced(_)));
    assert!(runs[1].is_failure());

    // The tenant is not left marked busy.
    let runs = manager.run_once().await;
    assert!(runs[1].is_failure());
    assert_eq!(runner.calls_for("bob"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_tenants_run_concurrently() {
    let runner = ScriptedRunner {
        delay: Duration::from_secs(30),
        ..Default::default()
    };
    let (manager, runner) = manager_with(runner, &["alice", "bob", "carol"]).await;

    let started = time::Instant::now();
    let runs = manager.run_once().await;
    let elapsed = started.elapsed();

    assert_eq!(runs.len(), 3);
    assert!(runs.iter().all(|r| matches!(r.outcome, CycleOutcome::Synced(_))));
    assert!(elapsed >= Duration::from_secs(30));
    assert!(elapsed < Duration::from_secs(60), "passes ran in series: {:?}", elapsed);
    assert_eq!(runner.calls_for("carol"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_start_runs_immediately_then_on_each_tick() {
    let (manager, runner) = manager_with(ScriptedRunner::default(), &["alice", "bob"]).await;

    assert!(manager.start().await);
    time::sleep(Duration::from_millis(10)).await;
    assert_eq!(runner.calls_for("alice"), 1);
    assert_eq!(runner.calls_for("bob"), 1);

    time::sleep(Duration::from_secs(60)).await;
    assert_eq!(runner.calls_for("alice"), 2);

    time::sleep(Duration::from_secs(60)).await;
    assert_eq!(runner.calls_for("alice"), 3);

    assert!(manager.stop().await);
    time::sleep(Duration::from_secs(600)).await;
    assert_eq!(runner.calls_for("alice"), 3);
}

#[tokio::test(start_paused = true)]
async fn test_failures_keep_the_timer_alive() {
    let runner = ScriptedRunner {
        failing: HashSet::from(["alice".to_string()]),
        ..Default::default()
    };
    let (manager, runner) = manager_with(runner, &["alice"]).await;

    manager.start().await;
    time::sleep(Duration::from_secs(121)).await;

    assert_eq!(runner.calls_for("alice"), 3);
    assert!(manager.is_running().await);
    manager.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_trigger_runs_an_extra_pass() {
    let (manager, runner) = manager_with(ScriptedRunner::default(), &["alice"]).await;

    manager.start().await;
    time::sleep(Duration::from_millis(10)).await;
    manager.trigger().await.unwrap();
    time::sleep(Duration::from_millis(10)).await;

    assert_eq!(runner.calls_for("alice"), 2);
    manager.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_busy_tenant_is_skipped() {
    let runner = ScriptedRunner {
        delay: Duration::from_secs(30),
        ..Default::default()
    };
    let (manager, runner) = manager_with(runner, &["alice"]).await;
    let manager = Arc::new(manager);

    let first = tokio::spawn({
        let manager = manager.clone();
        async move { manager.run_once().await }
    });
    time::sleep(Duration::from_secs(1)).await;

    let second = manager.run_once().await;
    assert!(matches!(second[0].outcome, CycleOutcome::Skipped));

    let first = first.await.unwrap();
    assert!(matches!(first[0].outcome, CycleOutcome::Synced(_)));
    assert_eq!(runner.calls_for("alice"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_removed_tenant_finishes_current_pass_only() {
    let runner = ScriptedRunner {
        delay: Duration::from_secs(5),
        ..Default::default()
    };
    let (manager, runner) = manager_with(runner, &["alice", "bob"]).await;
    let manager = Arc::new(manager);

    let pass = tokio::spawn({
        let manager = manager.clone();
        async move { manager.run_once().await }
    });
    time::sleep(Duration::from_secs(1)).await;
    assert!(manager.remove_user("alice").await);

    let runs = pass.await.unwrap();
    assert_eq!(runs.len(), 2);
    assert!(runs.iter().all(|r| matches!(r.outcome, CycleOutcome::Synced(_))));

    let runs = manager.run_once().await;
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].tenant_id, "bob");
    assert_eq!(runner.calls_for("alice"), 1);
}

#[tokio::test]
async fn test_add_user_validates_config() {
    let (manager, _runner) = manager_with(ScriptedRunner::default(), &[]).await;

    let mut config = tenant_config();
    config.canvas_url = "canvas.example.edu".to_string();
    assert!(manager.add_user("alice", config).await.is_err());
    assert!(manager.add_user("  ", tenant_config()).await.is_err());
    assert!(manager.tenant_ids().await.is_empty());
}

#[tokio::test]
async fn test_run_reports_serialize() {
    let runner = ScriptedRunner {
        failing: HashSet::from(["bob".to_string()]),
        ..Default::default()
    };
    let (manager, _runner) = manager_with(runner, &["alice", "bob"]).await;

    let runs = manager.run_once().await;
    let json = serde_json::to_value(&runs).unwrap();

    assert_eq!(json[0]["tenant_id"], "alice");
    assert_eq!(json[0]["outcome"], "synced");
    assert_eq!(json[0]["details"]["matched"], 3);
    assert_eq!(json[1]["outcome"], "failed");
}
