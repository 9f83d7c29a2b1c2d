//! Caller-facing operations.
//!
//! `ControlPlane` is what a request/response transport would call. It
//! validates input, delegates to the collector, scheduler and store, and
//! shapes the answers.

use std::sync::Arc;

use chrono::TimeDelta;
use log::info;
use serde::Serialize;

use crate::{
    collector::Collector,
    config::Config,
    error::{ControlError, ValidationError},
    scheduler::{
        DAILY_JOB_ID, DAILY_JOB_NAME, DailyTrigger, JobDefinition, JobScheduler, JobSummary,
        SchedulerStatus, job_callback,
    },
    schema::{CollectionResult, Court, DecisionRecord, RuleBody, RuleCategory, RuleRecord, SourceId},
    store::StoreCounts,
};

/// Refusal message for removing the built-in job.
pub const DAILY_JOB_PROTECTED: &str = "the daily collection job cannot be removed";

/// `{success, message | results | newSchedule}`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResponse {
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_schedule: Option<String>,
}

impl ActionResponse {
    fn done(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            ..Self::default()
        }
    }

    /// Failure answer for a transport that only speaks this shape.
    pub fn failure(err: &ControlError) -> Self {
        Self {
            success: false,
            message: Some(err.to_string()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleSummary {
    /// "HH:MM"
    pub daily_collection_time: String,
    pub timezone: String,
    pub description: String,
    /// "STF - Supremo Tribunal Federal", ...
    pub sources: Vec<String>,
}

/// Builds the built-in daily job.
pub fn daily_collection_job(
    collector: Arc<Collector>,
    trigger: DailyTrigger,
    days_back: u32,
    misfire_grace: TimeDelta,
) -> JobDefinition {
    let callback = job_callback(move || {
        let collector = collector.clone();
        async move {
            let result = collector.collect_all(days_back).await;
            Ok::<_, anyhow::Error>(serde_json::to_value(result)?)
        }
    });

    JobDefinition {
        id: DAILY_JOB_ID.to_string(),
        name: DAILY_JOB_NAME.to_string(),
        trigger,
        callback,
        misfire_grace,
        manual_run: true,
    }
}

pub struct ControlPlane {
    collector: Arc<Collector>,
    scheduler: Arc<JobScheduler>,
    daily_days_back: u32,
    misfire_grace: TimeDelta,
    manual_days_back: u32,
}

impl ControlPlane {
    pub fn new(collector: Arc<Collector>, scheduler: Arc<JobScheduler>, cfg: &Config) -> Self {
        Self {
            collector,
            scheduler,
            daily_days_back: cfg.schedule.days_back,
            misfire_grace: i64::try_from(cfg.schedule.misfire_grace_secs)
                .ok()
                .and_then(TimeDelta::try_seconds)
                .unwrap_or(TimeDelta::MAX),
            manual_days_back: cfg.collection.manual_days_back,
        }
    }

    /// Schedules the daily job at the configured time.
    pub async fn install_daily_job(&self, hour: u32, minute: u32) -> Result<(), ControlError> {
        let trigger =
            DailyTrigger::validated(i64::from(hour), i64::from(minute), self.scheduler.timezone())?;
        self.scheduler.add_or_replace(self.daily_job(trigger)).await;
        Ok(())
    }

    fn daily_job(&self, trigger: DailyTrigger) -> JobDefinition {
        daily_collection_job(
            self.collector.clone(),
            trigger,
            self.daily_days_back,
            self.misfire_grace,
        )
    }

    /// Manual collection. `None` uses the configured window.
    pub async fn collect_all(&self, days_back: Option<i64>) -> Result<CollectionResult, ControlError> {
        let days_back = match days_back {
            None => self.manual_days_back,
            Some(d) if d < 0 => return Err(ValidationError::NegativeDaysBack(d).into()),
            Some(d) => u32::try_from(d).unwrap_or(u32::MAX),
        };

        info!("manual collection requested ({} days back)", days_back);
        Ok(self.collector.collect_all(days_back).await)
    }

    pub async fn scheduler_status(&self) -> SchedulerStatus {
        self.scheduler.status().await
    }

    pub async fn list_jobs(&self) -> Vec<JobSummary> {
        self.scheduler.list_jobs().await
    }

    pub async fn run_job_now(&self, id: &str) -> Result<ActionResponse, ControlError> {
        let id = required_id(id)?;
        let results = self.scheduler.run_now(id).await?;

        Ok(ActionResponse {
            success: true,
            results: Some(results),
            ..ActionResponse::default()
        })
    }

    pub async fn remove_job(&self, id: &str) -> Result<ActionResponse, ControlError> {
        let id = required_id(id)?;
        if id == DAILY_JOB_ID {
            return Err(ControlError::Rejected(DAILY_JOB_PROTECTED.to_string()));
        }

        self.scheduler.remove(id).await?;
        Ok(ActionResponse::done(format!("job '{id}' removed")))
    }

    /// Moves the daily job to `hour:minute`; on invalid input the job
    /// is left as it was.
    pub async fn reconfigure_daily_job(
        &self,
        hour: i64,
        minute: i64,
    ) -> Result<ActionResponse, ControlError> {
        let trigger = DailyTrigger::validated(hour, minute, self.scheduler.timezone())?;
        let label = trigger.time_label();

        self.scheduler.add_or_replace(self.daily_job(trigger)).await;

        Ok(ActionResponse {
            new_schedule: Some(label.clone()),
            ..ActionResponse::done(format!("daily collection rescheduled to {label}"))
        })
    }

    pub async fn schedule_config(&self) -> ScheduleSummary {
        let tz = self.scheduler.timezone();
        let time = match self.scheduler.trigger_of(DAILY_JOB_ID).await {
            Some(trigger) => trigger.time_label(),
            None => "--:--".to_string(),
        };

        let mut sources = Vec::new();
        for adapter in self.collector.sources() {
            match adapter.identify() {
                SourceId::Court(court) => {
                    sources.push(format!("{} - {}", court, court.full_name()));
                }
                SourceId::Rules => {
                    for body in RuleBody::ALL {
                        sources.push(format!("{} - {}", body, body.full_name()));
                    }
                }
            }
        }

        ScheduleSummary {
            description: format!("Daily jurisprudence collection at {} ({})", time, tz.name()),
            daily_collection_time: time,
            timezone: tz.name().to_string(),
            sources,
        }
    }

    pub async fn recent_decisions(
        &self,
        court: Option<Court>,
        limit: usize,
    ) -> Result<Vec<DecisionRecord>, ControlError> {
        Ok(self.collector.store().recent_decisions(court, limit).await?)
    }

    pub async fn search_decisions(
        &self,
        term: &str,
        court: Option<Court>,
        limit: usize,
    ) -> Result<Vec<DecisionRecord>, ControlError> {
        let term = term.trim();
        if term.is_empty() {
            return Err(ValidationError::EmptySearchTerm.into());
        }
        Ok(self
            .collector
            .store()
            .search_decisions(term, court, limit)
            .await?)
    }

    pub async fn rules(
        &self,
        body: Option<RuleBody>,
        category: Option<RuleCategory>,
        limit: usize,
    ) -> Result<Vec<RuleRecord>, ControlError> {
        Ok(self.collector.store().rules(body, category, limit).await?)
    }

    pub async fn store_status(&self) -> Result<StoreCounts, ControlError> {
        Ok(self.collector.store().counts().await?)
    }
}

fn required_id(id: &str) -> Result<&str, ValidationError> {
    let id = id.trim();
    if id.is_empty() {
        Err(ValidationError::MissingJobId)
    } else {
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::error::{SchedulerError, SourceError};
    use crate::schema::{CandidateRef, Harvest};
    use crate::sources::adapter::SourceAdapter;
    use crate::store::MemoryStore;

    struct OneDecision;

    #[async_trait]
    impl SourceAdapter for OneDecision {
        fn identify(&self) -> SourceId {
            SourceId::Court(Court::Stj)
        }

        async fn search_recent(&self, _days_back: u32) -> Vec<CandidateRef> {
            vec![CandidateRef::decision("https://stj/1")]
        }

        async fn extract_details(&self, candidate: &CandidateRef) -> Option<DecisionRecord> {
            Some(DecisionRecord {
                court: Court::Stj,
                process_number: "0001234-56.2024.8.26.0000".into(),
                judge: None,
                judgment_date: None,
                publication_date: None,
                summary: "Responsabilidade civil. Dano moral.".into(),
                body: String::new(),
                tags: "civil".into(),
                source_url: candidate.url().to_string(),
                collected_at: None,
            })
        }
    }

    struct NoRules;

    #[async_trait]
    impl SourceAdapter for NoRules {
        fn identify(&self) -> SourceId {
            SourceId::Rules
        }

        async fn search_recent(&self, _days_back: u32) -> Vec<CandidateRef> {
            Vec::new()
        }

        async fn extract_details(&self, _candidate: &CandidateRef) -> Option<DecisionRecord> {
            None
        }

        async fn collect(&self, _days_back: u32) -> Result<Harvest, SourceError> {
            Ok(Harvest::Rules(Vec::new()))
        }
    }

    async fn control() -> ControlPlane {
        let cfg = Config::from_json("{}").unwrap();
        let collector = Arc::new(Collector::new(
            vec![Arc::new(OneDecision), Arc::new(NoRules)],
            Arc::new(MemoryStore::new()),
            false,
        ));
        let scheduler = Arc::new(JobScheduler::new(cfg.schedule.timezone().unwrap()));
        let control = ControlPlane::new(collector, scheduler, &cfg);
        control
            .install_daily_job(cfg.schedule.hour, cfg.schedule.minute)
            .await
            .unwrap();
        control
    }

    #[tokio::test]
    async fn out_of_range_reconfigure_leaves_job_unchanged() {
        let control = control().await;
        let before = control.list_jobs().await;

        let err = control.reconfigure_daily_job(25, 0).await.unwrap_err();
        assert!(matches!(
            err,
            ControlError::Validation(ValidationError::HourOutOfRange(25))
        ));
        let err = control.reconfigure_daily_job(9, -5).await.unwrap_err();
        assert!(matches!(
            err,
            ControlError::Validation(ValidationError::MinuteOutOfRange(-5))
        ));

        assert_eq!(control.list_jobs().await, before);
        assert_eq!(control.schedule_config().await.daily_collection_time, "09:00");
    }

    #[tokio::test]
    async fn reconfigure_moves_the_daily_job() {
        let control = control().await;

        let response = control.reconfigure_daily_job(7, 30).await.unwrap();
        assert!(response.success);
        assert_eq!(response.new_schedule.as_deref(), Some("07:30"));

        let jobs = control.list_jobs().await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, DAILY_JOB_ID);
        assert_eq!(jobs[0].trigger, "daily at 07:30 (America/Sao_Paulo)");

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["newSchedule"], "07:30");
        assert!(json.get("results").is_none());
    }

    #[tokio::test]
    async fn daily_job_cannot_be_removed() {
        let control = control().await;

        let err = control.remove_job(DAILY_JOB_ID).await.unwrap_err();
        assert_eq!(err.to_string(), DAILY_JOB_PROTECTED);
        assert_eq!(
            ActionResponse::failure(&err),
            ActionResponse {
                success: false,
                message: Some(DAILY_JOB_PROTECTED.into()),
                ..ActionResponse::default()
            }
        );

        let jobs = control.list_jobs().await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].name, DAILY_JOB_NAME);
    }

    #[tokio::test]
    async fn removing_unknown_or_blank_job_fails() {
        let control = control().await;
        assert!(matches!(
            control.remove_job("nightly").await,
            Err(ControlError::Scheduler(SchedulerError::NotFound(_)))
        ));
        assert!(matches!(
            control.remove_job("  ").await,
            Err(ControlError::Validation(ValidationError::MissingJobId))
        ));
    }

    #[tokio::test]
    async fn running_daily_job_returns_collection_report() {
        let control = control().await;

        let response = control.run_job_now(DAILY_JOB_ID).await.unwrap();
        assert!(response.success);
        let results = response.results.unwrap();
        assert_eq!(results["totalCollected"], 1);
        assert_eq!(results["success"][0], "STJ: 1 decision collected");
        assert_eq!(results["success"][1], "ENUNCIADOS: 0 rules collected");

        // second run finds only duplicates
        let again = control.run_job_now(DAILY_JOB_ID).await.unwrap();
        assert_eq!(again.results.unwrap()["totalCollected"], 0);
    }

    #[tokio::test]
    async fn manual_collection_validates_window() {
        let control = control().await;
        assert!(matches!(
            control.collect_all(Some(-1)).await,
            Err(ControlError::Validation(ValidationError::NegativeDaysBack(-1)))
        ));

        let result = control.collect_all(None).await.unwrap();
        assert_eq!(result.total_collected, 1);
        assert!(result.errors.is_empty());
    }

    #[tokio::test]
    async fn read_side_queries() {
        let control = control().await;
        control.collect_all(Some(1)).await.unwrap();

        let recent = control.recent_decisions(Some(Court::Stj), 10).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert!(recent[0].collected_at.is_some());

        assert_eq!(control.search_decisions("dano", None, 10).await.unwrap().len(), 1);
        assert_eq!(control.search_decisions("ICMS", None, 10).await.unwrap().len(), 0);
        assert!(matches!(
            control.search_decisions("   ", None, 10).await,
            Err(ControlError::Validation(ValidationError::EmptySearchTerm))
        ));

        assert!(control.rules(None, None, 10).await.unwrap().is_empty());
        assert_eq!(control.store_status().await.unwrap().decisions[&Court::Stj], 1);
    }

    #[tokio::test]
    async fn schedule_config_lists_enabled_sources() {
        let control = control().await;
        let summary = control.schedule_config().await;

        assert_eq!(summary.timezone, "America/Sao_Paulo");
        assert_eq!(
            summary.sources,
            [
                "STJ - Superior Tribunal de Justiça",
                "FONAJE - Fórum Nacional de Juizados Especiais",
                "CNJ - Conselho Nacional de Justiça",
            ]
        );

        let status = control.scheduler_status().await;
        assert_eq!(status.jobs_count, 1);
        assert!(status.next_daily_collection.is_some());
    }
}
