use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::TimeDelta;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde::Serialize;

use super::trigger::DailyTrigger;

/// Work a job performs. Returns a JSON report for manual runs.
pub type JobCallback =
    Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<serde_json::Value>> + Send + Sync>;

/// Wraps an async closure into a `JobCallback`.
pub fn job_callback<F, Fut>(f: F) -> JobCallback
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<serde_json::Value>> + Send + 'static,
{
    Arc::new(move || f().boxed())
}

/// Everything needed to (re)schedule one job.
#[derive(Clone)]
pub struct JobDefinition {
    pub id: String,
    pub name: String,
    pub trigger: DailyTrigger,
    pub callback: JobCallback,

    /// How late a firing may start and still run
    pub misfire_grace: TimeDelta,

    /// Whether `run_now` may execute this job
    pub manual_run: bool,
}

impl std::fmt::Debug for JobDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobDefinition")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("trigger", &self.trigger)
            .field("misfire_grace", &self.misfire_grace)
            .field("manual_run", &self.manual_run)
            .finish_non_exhaustive()
    }
}

/// Job as reported by `list_jobs`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub id: String,
    pub name: String,
    /// RFC 3339 in the job's timezone
    pub next_run: Option<String>,
    pub trigger: String,
}

/// Held while a job executes; released on drop.
///
/// One flag per job id, shared by timer firings and `run_now`, so the
/// same job never runs twice at once.
#[derive(Debug)]
pub struct RunGuard {
    flag: Arc<AtomicBool>,
}

impl RunGuard {
    pub fn try_acquire(flag: &Arc<AtomicBool>) -> Option<RunGuard> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard { flag: flag.clone() })
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
