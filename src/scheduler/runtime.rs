use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use log::{error, info, warn};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::{Mutex, Notify, watch};
use tokio::task::{JoinHandle, JoinSet};

use super::job::{JobCallback, JobDefinition, JobSummary, RunGuard};
use super::trigger::{DailyTrigger, Firing, firing_decision};
use crate::error::SchedulerError;
use crate::metrics::{METRICS, RuntimeMetrics};

/// Id of the built-in daily collection job.
pub const DAILY_JOB_ID: &str = "daily_jurisprudence";
pub const DAILY_JOB_NAME: &str = "Daily jurisprudence collection";

/// Longest the timer sleeps without re-checking the clock.
const MAX_TIMER_SLEEP: Duration = Duration::from_secs(60);

struct ScheduledJob {
    def: JobDefinition,
    next_run: Option<DateTime<Utc>>,
    running: Arc<AtomicBool>,
}

impl ScheduledJob {
    fn summary(&self) -> JobSummary {
        JobSummary {
            id: self.def.id.clone(),
            name: self.def.name.clone(),
            next_run: self
                .next_run
                .map(|t| t.with_timezone(&self.def.trigger.timezone()).to_rfc3339()),
            trigger: self.def.trigger.describe(),
        }
    }
}

/// A firing the timer decided to run.
struct Due {
    id: String,
    callback: JobCallback,
    running: Arc<AtomicBool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatus {
    pub running: bool,
    pub jobs_count: usize,
    pub timezone: String,
    /// RFC 3339 in the scheduler timezone
    pub current_time: String,
    pub next_daily_collection: Option<String>,
}

/// Job scheduler
///
/// Owns the job table and one background timer task.
///
/// LIFECYCLE:
/// - `new` builds an idle scheduler; jobs may be added before `start`
/// - `start` spawns the timer on the current tokio runtime
/// - `shutdown` stops new firings and waits for running jobs
///
/// GUARANTEES:
/// - At most one execution per job id, across timer and `run_now`
/// - A firing that finds its job running is dropped, never queued
/// - `add_or_replace` swaps under the table lock; the job is never
///   observed missing
/// - Running flags are keyed by job id and outlive table entries, so a
///   job removed and re-added while it runs still counts as running
///
pub struct JobScheduler {
    tz: Tz,
    jobs: Mutex<BTreeMap<String, ScheduledJob>>,
    run_flags: std::sync::Mutex<HashMap<String, Arc<AtomicBool>>>,
    wake: Notify,
    shutdown_tx: watch::Sender<bool>,
    timer: std::sync::Mutex<Option<JoinHandle<()>>>,
    running: AtomicBool,
}

impl JobScheduler {
    pub fn new(tz: Tz) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            tz,
            jobs: Mutex::new(BTreeMap::new()),
            run_flags: std::sync::Mutex::new(HashMap::new()),
            wake: Notify::new(),
            shutdown_tx,
            timer: std::sync::Mutex::new(None),
            running: AtomicBool::new(false),
        }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Spawns the timer task.
    ///
    /// Fails only when called outside a tokio runtime. Calling it again
    /// while running is a no-op.
    pub fn start(self: &Arc<Self>) -> Result<(), SchedulerError> {
        let handle = Handle::try_current().map_err(|e| SchedulerError::Runtime(e.to_string()))?;

        if self.running.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.shutdown_tx.send_replace(false);
        let shutdown = self.shutdown_tx.subscribe();
        let task = handle.spawn(self.clone().run_timer(shutdown));
        *self.timer_slot() = Some(task);

        info!("scheduler started ({})", self.tz.name());
        Ok(())
    }

    /// Stops firing and waits for running jobs to finish.
    pub async fn shutdown(&self) {
        self.running.store(false, Ordering::Release);
        self.shutdown_tx.send_replace(true);

        let task = self.timer_slot().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!("scheduler timer ended abnormally: {}", e);
            }
        }
        info!("scheduler stopped");
    }

    fn timer_slot(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.timer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Running flag of `id`, created on first use and never dropped.
    fn run_flag(&self, id: &str) -> Arc<AtomicBool> {
        self.run_flags
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(id.to_string())
            .or_default()
            .clone()
    }

    /// Adds a job, or atomically replaces the one with the same id.
    pub async fn add_or_replace(&self, def: JobDefinition) {
        let next_run = def.trigger.next_after(Utc::now());
        let id = def.id.clone();
        let describe = def.trigger.describe();
        let running = self.run_flag(&id);

        {
            let mut jobs = self.jobs.lock().await;
            jobs.insert(
                id.clone(),
                ScheduledJob {
                    def,
                    next_run,
                    running,
                },
            );
        }

        self.wake.notify_one();
        info!("job '{}' scheduled {}", id, describe);
    }

    pub async fn remove(&self, id: &str) -> Result<(), SchedulerError> {
        let removed = self.jobs.lock().await.remove(id);
        match removed {
            Some(_) => {
                self.wake.notify_one();
                info!("job '{}' removed", id);
                Ok(())
            }
            None => Err(SchedulerError::NotFound(id.to_string())),
        }
    }

    /// Runs a job immediately and returns its report.
    ///
    /// The scheduled next run is left as is.
    pub async fn run_now(&self, id: &str) -> Result<serde_json::Value, SchedulerError> {
        let (callback, running) = {
            let jobs = self.jobs.lock().await;
            let job = jobs
                .get(id)
                .ok_or_else(|| SchedulerError::NotFound(id.to_string()))?;
            if !job.def.manual_run {
                return Err(SchedulerError::NotSupported(id.to_string()));
            }
            (job.def.callback.clone(), job.running.clone())
        };

        let _guard = RunGuard::try_acquire(&running)
            .ok_or_else(|| SchedulerError::AlreadyRunning(id.to_string()))?;

        info!("job '{}' started manually", id);
        callback().await.map_err(|e| SchedulerError::JobFailed {
            id: id.to_string(),
            reason: format!("{e:#}"),
        })
    }

    pub async fn trigger_of(&self, id: &str) -> Option<DailyTrigger> {
        self.jobs.lock().await.get(id).map(|j| j.def.trigger)
    }

    pub async fn list_jobs(&self) -> Vec<JobSummary> {
        self.jobs
            .lock()
            .await
            .values()
            .map(ScheduledJob::summary)
            .collect()
    }

    pub async fn status(&self) -> SchedulerStatus {
        let jobs = self.jobs.lock().await;
        SchedulerStatus {
            running: self.running.load(Ordering::Acquire),
            jobs_count: jobs.len(),
            timezone: self.tz.name().to_string(),
            current_time: Utc::now().with_timezone(&self.tz).to_rfc3339(),
            next_daily_collection: jobs
                .get(DAILY_JOB_ID)
                .and_then(|j| j.next_run)
                .map(|t| t.with_timezone(&self.tz).to_rfc3339()),
        }
    }

    // --------------------------------------------------
    // Timer
    // --------------------------------------------------

    async fn run_timer(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut inflight = JoinSet::new();

        loop {
            if *shutdown.borrow() {
                break;
            }

            let due = self.due_jobs(Utc::now()).await;
            fire(due, &mut inflight);

            let nap = self.until_next(Utc::now()).await;
            tokio::select! {
                _ = tokio::time::sleep(nap) => {}
                _ = self.wake.notified() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                Some(joined) = inflight.join_next(), if !inflight.is_empty() => {
                    if let Err(e) = joined {
                        error!("job task aborted: {}", e);
                    }
                }
            }
        }

        if !inflight.is_empty() {
            info!("waiting for {} running jobs", inflight.len());
        }
        while let Some(joined) = inflight.join_next().await {
            if let Err(e) = joined {
                error!("job task aborted: {}", e);
            }
        }
    }

    /// Collects due jobs and advances every fired or missed job to its
    /// next run.
    async fn due_jobs(&self, now: DateTime<Utc>) -> Vec<Due> {
        let mut jobs = self.jobs.lock().await;
        let mut due = Vec::new();

        for (id, job) in jobs.iter_mut() {
            let Some(at) = job.next_run else { continue };

            match firing_decision(at, now, job.def.misfire_grace) {
                Firing::Wait => continue,
                Firing::Run => due.push(Due {
                    id: id.clone(),
                    callback: job.def.callback.clone(),
                    running: job.running.clone(),
                }),
                Firing::Misfire => {
                    RuntimeMetrics::incr(&METRICS.jobs_misfired);
                    warn!(
                        "job '{}' missed its run at {} by more than {}s, skipping",
                        id,
                        at,
                        job.def.misfire_grace.num_seconds()
                    );
                }
            }

            job.next_run = job.def.trigger.next_after(now);
        }

        due
    }

    async fn until_next(&self, now: DateTime<Utc>) -> Duration {
        self.jobs
            .lock()
            .await
            .values()
            .filter_map(|j| j.next_run)
            .min()
            .map(|at| (at - now).to_std().unwrap_or(Duration::ZERO))
            .unwrap_or(MAX_TIMER_SLEEP)
            .min(MAX_TIMER_SLEEP)
    }

    #[cfg(test)]
    async fn force_next_run(&self, id: &str, at: DateTime<Utc>) {
        if let Some(job) = self.jobs.lock().await.get_mut(id) {
            job.next_run = Some(at);
        }
        self.wake.notify_one();
    }
}

fn fire(due: Vec<Due>, inflight: &mut JoinSet<()>) {
    for job in due {
        let Some(guard) = RunGuard::try_acquire(&job.running) else {
            RuntimeMetrics::incr(&METRICS.jobs_dropped_running);
            warn!("job '{}' still running, firing dropped", job.id);
            continue;
        };

        RuntimeMetrics::incr(&METRICS.jobs_fired);
        info!("job '{}' fired", job.id);

        inflight.spawn(async move {
            let _guard = guard;
            match (job.callback)().await {
                Ok(_) => info!("job '{}' finished", job.id),
                Err(e) => error!("job '{}' failed: {:#}", job.id, e),
            }
        });
    }
}
