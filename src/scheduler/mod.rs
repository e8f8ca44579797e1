//! Per-check scheduling
//!
//! One long-lived tokio task per enabled check. Each worker sleeps a random
//! jitter (to avoid synchronized ticks across checks), probes immediately,
//! then ticks on its own interval until it receives its per-worker stop
//! signal or the scheduler-wide shutdown broadcast.
//!
//! Every tick re-reads the check from storage so live edits take effect and
//! a deleted check lets its worker exit cleanly. Within one worker, verdicts
//! are processed strictly in order; across checks no ordering is guaranteed.

pub mod retention;
pub mod transitions;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument};

use crate::alerts::AlertManager;
use crate::config::RetentionConfig;
use crate::probe::{HttpProber, ProbeRequest, ProbeResponse};
use crate::storage::models::Check;
use crate::storage::Storage;

use transitions::process_result;

/// Safety floor applied when a check's interval is below one second.
const MIN_INTERVAL_SECS: i64 = 60;
const DEFAULT_TIMEOUT_SECS: i64 = 10;

static WORKER_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub consecutive_failures: usize,
    pub retention: RetentionConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            consecutive_failures: 2,
            retention: RetentionConfig::default(),
        }
    }
}

struct Worker {
    seq: u64,
    stop: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

/// Owns the per-check workers and the retention sweeper.
pub struct Scheduler {
    storage: Arc<dyn Storage>,
    alerter: Arc<AlertManager>,
    prober: Arc<HttpProber>,
    consecutive_failures: usize,
    retention: RetentionConfig,
    workers: Arc<RwLock<HashMap<i64, Worker>>>,
    shutdown: broadcast::Sender<()>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(
        storage: Arc<dyn Storage>,
        alerter: Arc<AlertManager>,
        config: SchedulerConfig,
    ) -> Self {
        let consecutive_failures = if config.consecutive_failures < 1 {
            2
        } else {
            config.consecutive_failures
        };
        let (shutdown, _) = broadcast::channel(1);

        Self {
            storage,
            alerter,
            prober: Arc::new(HttpProber::new()),
            consecutive_failures,
            retention: config.retention,
            workers: Arc::new(RwLock::new(HashMap::new())),
            shutdown,
            sweeper: Mutex::new(None),
        }
    }

    /// Replaces the probe executor (tests inject one without the retry
    /// delay).
    pub fn with_prober(mut self, prober: HttpProber) -> Self {
        self.prober = Arc::new(prober);
        self
    }

    /// Loads all enabled checks, installs one worker each, and starts the
    /// retention sweeper.
    #[instrument(skip(self))]
    pub async fn start(&self) -> anyhow::Result<()> {
        let checks = self
            .storage
            .list_enabled_checks()
            .await
            .context("loading checks")?;

        for check in checks {
            self.add_check(check).await;
        }

        let sweeper = tokio::spawn(retention::run_sweeper(
            self.storage.clone(),
            self.retention.clone(),
            self.shutdown.subscribe(),
        ));
        *self.sweeper.lock().await = Some(sweeper);

        info!("scheduler started with {} workers", self.worker_count().await);
        Ok(())
    }

    /// Broadcasts shutdown and waits for every worker to drain.
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        let _ = self.shutdown.send(());

        let drained: Vec<Worker> = {
            let mut workers = self.workers.write().await;
            workers.drain().map(|(_, worker)| worker).collect()
        };
        for worker in drained {
            let _ = worker.handle.await;
        }

        if let Some(sweeper) = self.sweeper.lock().await.take() {
            let _ = sweeper.await;
        }

        info!("scheduler stopped");
    }

    /// Installs a worker for the check. A no-op when one is already
    /// running.
    pub async fn add_check(&self, check: Check) {
        let mut workers = self.workers.write().await;
        if workers.contains_key(&check.id) {
            return;
        }

        debug!("scheduling check {} ({})", check.name, check.url);

        let seq = WORKER_SEQ.fetch_add(1, Ordering::Relaxed);
        let (stop_tx, stop_rx) = broadcast::channel(1);
        let check_id = check.id;

        let ctx = WorkerContext {
            storage: self.storage.clone(),
            alerter: self.alerter.clone(),
            prober: self.prober.clone(),
            consecutive_failures: self.consecutive_failures,
        };
        let shutdown_rx = self.shutdown.subscribe();
        let map = self.workers.clone();

        let handle = tokio::spawn(async move {
            run_worker(ctx, check, stop_rx, shutdown_rx).await;

            // Drop our own registration, but never a successor installed by
            // update_check while we were draining.
            let mut workers = map.write().await;
            if workers.get(&check_id).is_some_and(|w| w.seq == seq) {
                workers.remove(&check_id);
            }
        });

        workers.insert(
            check_id,
            Worker {
                seq,
                stop: stop_tx,
                handle,
            },
        );
    }

    /// Signals the check's worker and drops its record.
    pub async fn remove_check(&self, check_id: i64) {
        let mut workers = self.workers.write().await;
        if let Some(worker) = workers.remove(&check_id) {
            let _ = worker.stop.send(());
            debug!("removed worker for check {check_id}");
        }
    }

    /// Re-schedules the check so interval/URL edits take effect. Disabled
    /// checks simply lose their worker.
    pub async fn update_check(&self, check: Check) {
        self.remove_check(check.id).await;
        if check.enabled {
            self.add_check(check).await;
        }
    }

    /// Runs one probe outside the tick schedule, threads it through the
    /// state machine, and returns the raw response.
    pub async fn trigger_check(&self, check_id: i64) -> anyhow::Result<ProbeResponse> {
        let check = self
            .storage
            .check(check_id)
            .await
            .context("getting check")?
            .ok_or_else(|| anyhow::anyhow!("check not found"))?;

        let response = self.prober.execute(&probe_request(&check)).await;
        process_result(
            &*self.storage,
            &self.alerter,
            &check,
            &response,
            self.consecutive_failures,
        )
        .await
        .context("processing result")?;

        Ok(response)
    }

    /// Number of installed workers.
    pub async fn worker_count(&self) -> usize {
        self.workers.read().await.len()
    }
}

struct WorkerContext {
    storage: Arc<dyn Storage>,
    alerter: Arc<AlertManager>,
    prober: Arc<HttpProber>,
    consecutive_failures: usize,
}

fn probe_request(check: &Check) -> ProbeRequest {
    let timeout_secs = if check.timeout_seconds > 0 {
        check.timeout_seconds
    } else {
        DEFAULT_TIMEOUT_SECS
    };

    ProbeRequest {
        url: check.url.clone(),
        timeout: Duration::from_secs(timeout_secs as u64),
        expected_status: check.expected_status,
    }
}

async fn run_worker(
    ctx: WorkerContext,
    check: Check,
    mut stop_rx: broadcast::Receiver<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    // Spread workers out so they do not tick in lockstep.
    let jitter = Duration::from_millis(rand::random::<u64>() % 1000);
    tokio::time::sleep(jitter).await;

    execute_tick(&ctx, &check).await;

    let interval_secs = if check.interval_seconds < 1 {
        MIN_INTERVAL_SECS
    } else {
        check.interval_seconds
    };
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs as u64));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick completes immediately and is covered by the probe above.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = stop_rx.recv() => {
                debug!("worker for {} stopping", check.name);
                break;
            }
            _ = shutdown_rx.recv() => {
                debug!("worker for {} shutting down", check.name);
                break;
            }
            _ = ticker.tick() => {
                // Re-read so live edits (and deletion) take effect.
                match ctx.storage.check(check.id).await {
                    Ok(Some(current)) => execute_tick(&ctx, &current).await,
                    Ok(None) => {
                        info!("check {} no longer exists, stopping worker", check.name);
                        break;
                    }
                    Err(e) => error!("failed to reload check {}: {e}", check.name),
                }
            }
        }
    }
}

async fn execute_tick(ctx: &WorkerContext, check: &Check) {
    let response = ctx.prober.execute(&probe_request(check)).await;

    if let Err(e) = process_result(
        &*ctx.storage,
        &ctx.alerter,
        check,
        &response,
        ctx.consecutive_failures,
    )
    .await
    {
        error!("error processing result for {}: {e:#}", check.name);
    }
}
