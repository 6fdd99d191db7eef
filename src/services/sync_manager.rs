//! Multi-tenant sync scheduler.
//!
//! This module provides:
//! - A registry of tenants, each reconciled independently
//! - An immediate pass on start, then a pass on every interval tick
//! - Failure isolation: one tenant's error never affects another tenant or
//!   the timer
//! - At most one in-flight pass per tenant

use crate::config::{AppConfig, RequestSpacing};
use crate::error::AppError;
use crate::models::{SyncReport, TenantConfig};
use crate::services::sync_cycle::SyncCycle;
use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// Default interval between passes (four hours).
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 4 * 60 * 60;

/// Runs one pass for one tenant.
#[async_trait]
pub trait CycleRunner: Send + Sync + 'static {
    async fn run_cycle(&self, tenant_id: &str, config: &TenantConfig)
        -> Result<SyncReport, AppError>;
}

/// Runner that talks to Canvas, Notion and OpenAI over HTTP.
#[derive(Debug, Clone, Default)]
pub struct HttpCycleRunner {
    spacing: RequestSpacing,
}

impl HttpCycleRunner {
    pub fn new(spacing: RequestSpacing) -> Self {
        Self { spacing }
    }
}

#[async_trait]
impl CycleRunner for HttpCycleRunner {
    async fn run_cycle(
        &self,
        tenant_id: &str,
        config: &TenantConfig,
    ) -> Result<SyncReport, AppError> {
        SyncCycle::from_tenant(tenant_id, config, &self.spacing)?
            .run()
            .await
    }
}

/// How a tenant's pass ended.
#[derive(Debug, Serialize)]
#[serde(tag = "outcome", content = "details", rename_all = "snake_case")]
pub enum CycleOutcome {
    Synced(SyncReport),
    Failed(AppError),
    /// The previous pass for this tenant was still running.
    Skipped,
}

/// Result of one tenant's pass.
#[derive(Debug, Serialize)]
pub struct TenantRun {
    pub tenant_id: String,
    #[serde(flatten)]
    pub outcome: CycleOutcome,
}

impl TenantRun {
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, CycleOutcome::Failed(_))
    }
}

/// Commands that can be sent to the timer loop.
#[derive(Debug)]
pub enum SyncCommand {
    /// Run a pass now.
    TriggerSync,

    /// Stop the timer loop.
    Stop,
}

/// State shared between the manager and its spawned tasks.
struct Shared<R> {
    runner: R,
    tenants: RwLock<HashMap<String, Arc<TenantConfig>>>,
    in_flight: StdMutex<HashSet<String>>,
}

/// Marks a tenant busy for as long as it lives.
struct InFlight<'a> {
    set: &'a StdMutex<HashSet<String>>,
    tenant_id: String,
}

impl<'a> InFlight<'a> {
    fn acquire(set: &'a StdMutex<HashSet<String>>, tenant_id: &str) -> Option<Self> {
        let inserted = set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(tenant_id.to_string());
        inserted.then(|| Self {
            set,
            tenant_id: tenant_id.to_string(),
        })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.tenant_id);
    }
}

impl<R: CycleRunner> Shared<R> {
    /// Run one tenant's pass, logging instead of propagating its failure.
    async fn run_tenant(&self, tenant_id: String, config: Arc<TenantConfig>) -> TenantRun {
        let Some(_guard) = InFlight::acquire(&self.in_flight, &tenant_id) else {
            log::warn!("[manager] {}: previous pass still running, skipping", tenant_id);
            return TenantRun {
                tenant_id,
                outcome: CycleOutcome::Skipped,
            };
        };

        let result = match config.validate() {
            Ok(()) => self.runner.run_cycle(&tenant_id, &config).await,
            Err(e) => Err(e),
        };

        let outcome = match result {
            Ok(report) => {
                log::info!(
                    "[manager] {}: {} matched, {} created, {} due dates, {} completed, {} overrides ({} ms)",
                    tenant_id,
                    report.matched,
                    report.created,
                    report.due_dates_updated,
                    report.marked_complete,
                    report.overrides_created + report.overrides_updated,
                    report.duration_ms
                );
                CycleOutcome::Synced(report)
            }
            Err(e) => {
                if e.is_transient() {
                    log::error!("[manager] {}: pass failed, will retry next tick: {}", tenant_id, e);
                } else {
                    log::error!("[manager] {}: pass failed: {}", tenant_id, e);
                }
                CycleOutcome::Failed(e)
            }
        };

        TenantRun { tenant_id, outcome }
    }
}

/// Run one pass for every registered tenant, concurrently.
async fn run_pass<R: CycleRunner>(shared: Arc<Shared<R>>) -> Vec<TenantRun> {
    let snapshot: Vec<(String, Arc<TenantConfig>)> = {
        let tenants = shared.tenants.read().await;
        let mut entries: Vec<_> = tenants
            .iter()
            .map(|(id, config)| (id.clone(), config.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    };

    let handles: Vec<(String, JoinHandle<TenantRun>)> = snapshot
        .into_iter()
        .map(|(tenant_id, config)| {
            let shared = shared.clone();
            let id = tenant_id.clone();
            (
                tenant_id,
                tokio::spawn(async move { shared.run_tenant(id, config).await }),
            )
        })
        .collect();

    let (ids, tasks): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
    join_all(tasks)
        .await
        .into_iter()
        .zip(ids)
        .map(|(joined, tenant_id)| match joined {
            Ok(run) => run,
            Err(e) => {
                log::error!("[manager] {}: pass aborted: {}", tenant_id, e);
                TenantRun {
                    tenant_id,
                    outcome: CycleOutcome::Failed(AppError::internal(format!(
                        "Sync task aborted: {}",
                        e
                    ))),
                }
            }
        })
        .collect()
}

/// Start a pass in the background without waiting for it.
fn spawn_pass<R: CycleRunner>(shared: &Arc<Shared<R>>) {
    let shared = shared.clone();
    tokio::spawn(async move {
        let runs = run_pass(shared).await;
        let failed = runs.iter().filter(|r| r.is_failure()).count();
        log::info!(
            "[manager] pass finished: {} tenant(s), {} failed",
            runs.len(),
            failed
        );
    });
}

/// Handle to the running timer loop.
struct TimerHandle {
    command_tx: mpsc::Sender<SyncCommand>,
    task: JoinHandle<()>,
}

/// Registry of tenants plus the recurring timer that reconciles them.
pub struct SyncManager<R: CycleRunner = HttpCycleRunner> {
    shared: Arc<Shared<R>>,
    interval: Duration,
    timer: Mutex<Option<TimerHandle>>,
}

impl SyncManager<HttpCycleRunner> {
    /// Create a manager using the HTTP adapters and the config's timing.
    /// Tenants are not registered; call [`SyncManager::add_user`] for each.
    pub fn new(config: &AppConfig) -> Self {
        Self::with_runner(HttpCycleRunner::new(config.min_spacing_ms), config.interval())
    }
}

impl<R: CycleRunner> SyncManager<R> {
    pub fn with_runner(runner: R, interval: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                runner,
                tenants: RwLock::new(HashMap::new()),
                in_flight: StdMutex::new(HashSet::new()),
            }),
            interval,
            timer: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Register a tenant. The config is validated here; replacing a tenant
    /// means removing it first.
    pub async fn add_user(&self, id: &str, config: TenantConfig) -> Result<(), AppError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(AppError::invalid_input_field("Tenant id must not be empty", "id"));
        }
        config.validate()?;

        let mut tenants = self.shared.tenants.write().await;
        if tenants.contains_key(id) {
            return Err(AppError::invalid_input_field(
                format!("Tenant {} is already registered", id),
                "id",
            ));
        }
        tenants.insert(id.to_string(), Arc::new(config));
        log::info!("[manager] registered tenant {}", id);
        Ok(())
    }

    /// Unregister a tenant. A pass already running for it completes; no new
    /// pass is started. Returns whether the tenant was registered.
    pub async fn remove_user(&self, id: &str) -> bool {
        let removed = self.shared.tenants.write().await.remove(id.trim()).is_some();
        if removed {
            log::info!("[manager] removed tenant {}", id);
        }
        removed
    }

    /// Registered tenant IDs, sorted.
    pub async fn tenant_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.shared.tenants.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn is_running(&self) -> bool {
        self.timer.lock().await.is_some()
    }

    /// Run one pass for every tenant and wait for all of them.
    pub async fn run_once(&self) -> Vec<TenantRun> {
        run_pass(self.shared.clone()).await
    }

    /// Run a pass immediately, then on every interval tick until
    /// [`SyncManager::stop`]. Returns `false` if already started.
    pub async fn start(&self) -> bool {
        let mut timer = self.timer.lock().await;
        if timer.is_some() {
            log::warn!("[manager] already started");
            return false;
        }

        let (tx, mut rx) = mpsc::channel::<SyncCommand>(16);
        let shared = self.shared.clone();
        // tokio intervals reject a zero period
        let interval = self.interval.max(Duration::from_millis(1));

        let task = tokio::spawn(async move {
            log::info!("[manager] running initial pass");
            spawn_pass(&shared);

            let mut ticker = time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        log::info!("[manager] running scheduled pass");
                        spawn_pass(&shared);
                    }
                    cmd = rx.recv() => {
                        match cmd {
                            Some(SyncCommand::TriggerSync) => {
                                log::info!("[manager] manual pass triggered");
                                spawn_pass(&shared);
                            }
                            Some(SyncCommand::Stop) | None => break,
                        }
                    }
                }
            }
            log::info!("[manager] timer stopped");
        });

        log::info!("[manager] started, interval={}s", interval.as_secs());
        *timer = Some(TimerHandle {
            command_tx: tx,
            task,
        });
        true
    }

    /// Request an immediate pass from the running timer loop.
    pub async fn trigger(&self) -> Result<(), AppError> {
        let timer = self.timer.lock().await;
        let handle = timer
            .as_ref()
            .ok_or_else(|| AppError::internal("Sync manager not running"))?;
        handle
            .command_tx
            .send(SyncCommand::TriggerSync)
            .await
            .map_err(|_| AppError::internal("Sync manager not running"))
    }

    /// Disarm the timer. Passes already running are left to finish. Safe to
    /// call when not started; returns whether a timer was running.
    pub async fn stop(&self) -> bool {
        let Some(handle) = self.timer.lock().await.take() else {
            return false;
        };

        if handle.command_tx.send(SyncCommand::Stop).await.is_err() {
            handle.task.abort();
        }
        if let Err(e) = handle.task.await {
            if !e.is_cancelled() {
                log::error!("[manager] timer task failed: {}", e);
            }
        }
        true
    }
}

impl<R: CycleRunner> Drop for SyncManager<R> {
    fn drop(&mut self) {
        if let Some(handle) = self.timer.get_mut().take() {
            handle.task.abort();
        }
    }
}
