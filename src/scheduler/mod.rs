/// Scheduler module
///
/// Drives collections on a daily cadence and on demand:
/// - `trigger`: wall-clock trigger math and the misfire rule
/// - `job`: job definitions and the per-job running guard
/// - `runtime`: the job table and its timer task
pub mod job;
pub mod runtime;
pub mod trigger;

pub use job::{JobCallback, JobDefinition, JobSummary, job_callback};
pub use runtime::{DAILY_JOB_ID, DAILY_JOB_NAME, JobScheduler, SchedulerStatus};
pub use trigger::DailyTrigger;
