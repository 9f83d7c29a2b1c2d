use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::join_all;
use log::{error, info};

use crate::{
    metrics::{METRICS, RuntimeMetrics},
    schema::CollectionResult,
    sources::{Registry, adapter::SourceAdapter},
    store::RecordStore,
};

use super::persist::persist_harvest;

/// Outcome of one adapter within a run.
enum SourceOutcome {
    Collected { line: String, saved: usize },
    Failed(String),
}

/// Collection orchestrator.
///
/// Runs every adapter of the registry, in order, and aggregates a
/// `CollectionResult`.
///
/// GUARANTEES:
/// - `collect_all` never fails: an adapter error or panic becomes one
///   entry in `errors` and the run continues
/// - Each adapter's harvest is committed as its own batch
/// - Report lines follow registry order, also in parallel mode
///
pub struct Collector {
    sources: Registry,
    store: Arc<dyn RecordStore>,
    parallel: bool,
}

impl Collector {
    pub fn new(sources: Registry, store: Arc<dyn RecordStore>, parallel: bool) -> Self {
        Self {
            sources,
            store,
            parallel,
        }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn sources(&self) -> &Registry {
        &self.sources
    }

    /// Collects everything published within the last `days_back` days.
    pub async fn collect_all(&self, days_back: u32) -> CollectionResult {
        RuntimeMetrics::incr(&METRICS.collection_runs);
        info!(
            "collection started: {} sources, {} days back{}",
            self.sources.len(),
            days_back,
            if self.parallel { ", parallel" } else { "" }
        );

        let outcomes = if self.parallel {
            join_all(
                self.sources
                    .iter()
                    .map(|adapter| self.run_source(adapter.as_ref(), days_back)),
            )
            .await
        } else {
            let mut outcomes = Vec::with_capacity(self.sources.len());
            for adapter in &self.sources {
                outcomes.push(self.run_source(adapter.as_ref(), days_back).await);
            }
            outcomes
        };

        let mut result = CollectionResult::default();
        for outcome in outcomes {
            match outcome {
                SourceOutcome::Collected { line, saved } => {
                    result.success.push(line);
                    result.total_collected += saved;
                }
                SourceOutcome::Failed(line) => result.errors.push(line),
            }
        }

        info!(
            "collection finished: {} new records, {} sources failed",
            result.total_collected,
            result.errors.len()
        );
        result
    }

    /// Runs one adapter inside the failure boundary, then persists.
    async fn run_source(&self, adapter: &dyn SourceAdapter, days_back: u32) -> SourceOutcome {
        let source = adapter.identify();

        let harvest = match AssertUnwindSafe(adapter.collect(days_back))
            .catch_unwind()
            .await
        {
            Ok(Ok(harvest)) => harvest,
            Ok(Err(e)) => return failed(source, &e.to_string()),
            Err(panic) => return failed(source, &panic_reason(panic.as_ref())),
        };

        let (one, many) = harvest.nouns();
        let saved = persist_harvest(self.store.as_ref(), source, harvest).await;
        let noun = if saved == 1 { one } else { many };
        let line = format!("{}: {} {} collected", source, saved, noun);
        info!("{}", line);

        SourceOutcome::Collected { line, saved }
    }
}

fn failed(source: impl std::fmt::Display, reason: &str) -> SourceOutcome {
    RuntimeMetrics::incr(&METRICS.source_failures);
    let line = format!("{}: collection failed: {}", source, reason);
    error!("{}", line);
    SourceOutcome::Failed(line)
}

fn panic_reason(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("adapter panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("adapter panicked: {s}")
    } else {
        "adapter panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::error::{PersistenceError, SourceError};
    use crate::schema::{
        CandidateRef, Court, DecisionKey, DecisionRecord, Harvest, RuleBody, RuleCategory,
        RuleKey, RuleRecord, SourceId,
    };
    use crate::store::{MemoryStore, StoreCounts};

    fn decision(court: Court, number: &str) -> DecisionRecord {
        DecisionRecord {
            court,
            process_number: number.into(),
            judge: Some("Min. Relator".into()),
            judgment_date: None,
            publication_date: None,
            summary: format!("ementa {number}"),
            body: "inteiro teor".into(),
            tags: "civil".into(),
            source_url: format!("https://{}/{}", court, number),
            collected_at: None,
        }
    }

    enum Behaviour {
        Returns(Vec<DecisionRecord>),
        Fails,
        Panics,
    }

    struct FakeSource {
        id: SourceId,
        behaviour: Behaviour,
    }

    #[async_trait]
    impl SourceAdapter for FakeSource {
        fn identify(&self) -> SourceId {
            self.id
        }

        async fn search_recent(&self, _days_back: u32) -> Vec<CandidateRef> {
            Vec::new()
        }

        async fn extract_details(&self, _candidate: &CandidateRef) -> Option<DecisionRecord> {
            None
        }

        async fn collect(&self, _days_back: u32) -> Result<Harvest, SourceError> {
            match &self.behaviour {
                Behaviour::Returns(records) => Ok(Harvest::Decisions(records.clone())),
                Behaviour::Fails => Err(SourceError::Unreachable("portal offline".into())),
                Behaviour::Panics => panic!("selector exploded"),
            }
        }
    }

    fn source(court: Court, behaviour: Behaviour) -> Arc<dyn SourceAdapter> {
        Arc::new(FakeSource {
            id: SourceId::Court(court),
            behaviour,
        })
    }

    /// Delegates to a memory store but refuses decision commits for one court.
    struct FailingStore {
        inner: MemoryStore,
        reject: Court,
    }

    #[async_trait]
    impl RecordStore for FailingStore {
        async fn find_decision(
            &self,
            key: &DecisionKey,
        ) -> Result<Option<DecisionRecord>, PersistenceError> {
            self.inner.find_decision(key).await
        }

        async fn find_rule(&self, key: &RuleKey) -> Result<Option<RuleRecord>, PersistenceError> {
            self.inner.find_rule(key).await
        }

        async fn commit_decisions(
            &self,
            batch: Vec<DecisionRecord>,
        ) -> Result<(), PersistenceError> {
            if batch.iter().any(|r| r.court == self.reject) {
                return Err(PersistenceError::Unavailable("disk full".into()));
            }
            self.inner.commit_decisions(batch).await
        }

        async fn commit_rules(&self, batch: Vec<RuleRecord>) -> Result<(), PersistenceError> {
            self.inner.commit_rules(batch).await
        }

        async fn recent_decisions(
            &self,
            court: Option<Court>,
            limit: usize,
        ) -> Result<Vec<DecisionRecord>, PersistenceError> {
            self.inner.recent_decisions(court, limit).await
        }

        async fn search_decisions(
            &self,
            term: &str,
            court: Option<Court>,
            limit: usize,
        ) -> Result<Vec<DecisionRecord>, PersistenceError> {
            self.inner.search_decisions(term, court, limit).await
        }

        async fn rules(
            &self,
            body: Option<RuleBody>,
            category: Option<RuleCategory>,
            limit: usize,
        ) -> Result<Vec<RuleRecord>, PersistenceError> {
            self.inner.rules(body, category, limit).await
        }

        async fn counts(&self) -> Result<StoreCounts, PersistenceError> {
            self.inner.counts().await
        }
    }

    #[tokio::test]
    async fn new_records_are_all_saved() {
        let store = Arc::new(MemoryStore::new());
        let collector = Collector::new(
            vec![source(
                Court::Stf,
                Behaviour::Returns(vec![
                    decision(Court::Stf, "1"),
                    decision(Court::Stf, "2"),
                    decision(Court::Stf, "3"),
                ]),
            )],
            store.clone(),
            false,
        );

        let result = collector.collect_all(1).await;
        assert_eq!(result.total_collected, 3);
        assert_eq!(result.success, ["STF: 3 decisions collected"]);
        assert!(result.errors.is_empty());
        assert_eq!(store.counts().await.unwrap().decisions[&Court::Stf], 3);
    }

    #[tokio::test]
    async fn existing_record_is_left_untouched() {
        let existing_number = "0001234-56.2024.8.26.0000";
        let store = Arc::new(MemoryStore::new());

        let mut original = decision(Court::Stj, existing_number);
        original.summary = "versão original".into();
        original.collected_at = Some(chrono::Utc::now());
        store.commit_decisions(vec![original.clone()]).await.unwrap();

        let mut changed = decision(Court::Stj, existing_number);
        changed.summary = "versão nova".into();
        let collector = Collector::new(
            vec![source(
                Court::Stj,
                Behaviour::Returns(vec![
                    changed,
                    decision(Court::Stj, "0000002-00.2024.3.00.0000"),
                    decision(Court::Stj, "0000003-00.2024.3.00.0000"),
                ]),
            )],
            store.clone(),
            false,
        );

        let result = collector.collect_all(7).await;
        assert_eq!(result.total_collected, 2);

        let stored = store.find_decision(&original.key()).await.unwrap().unwrap();
        assert_eq!(stored, original);
        assert_eq!(store.counts().await.unwrap().total(), 3);
    }

    #[tokio::test]
    async fn second_run_over_same_data_saves_nothing() {
        let store = Arc::new(MemoryStore::new());
        let collector = Collector::new(
            vec![
                source(
                    Court::Stf,
                    Behaviour::Returns(vec![decision(Court::Stf, "1"), decision(Court::Stf, "2")]),
                ),
                source(Court::Tjsp, Behaviour::Returns(vec![decision(Court::Tjsp, "1")])),
            ],
            store.clone(),
            false,
        );

        assert_eq!(collector.collect_all(1).await.total_collected, 3);
        let second = collector.collect_all(1).await;
        assert_eq!(second.total_collected, 0);
        assert_eq!(
            second.success,
            ["STF: 0 decisions collected", "TJSP: 0 decisions collected"]
        );
        assert_eq!(store.counts().await.unwrap().total(), 3);
    }

    #[tokio::test]
    async fn failing_and_panicking_sources_are_isolated() {
        let store = Arc::new(MemoryStore::new());
        let collector = Collector::new(
            vec![
                source(Court::Stf, Behaviour::Returns(vec![decision(Court::Stf, "1")])),
                source(Court::Stj, Behaviour::Fails),
                source(Court::Tjsp, Behaviour::Panics),
                source(Court::Tst, Behaviour::Returns(vec![decision(Court::Tst, "9")])),
            ],
            store,
            false,
        );

        let result = collector.collect_all(1).await;
        assert_eq!(
            result.success,
            ["STF: 1 decision collected", "TST: 1 decision collected"]
        );
        assert_eq!(result.errors.len(), 2);
        assert_eq!(
            result.errors[0],
            "STJ: collection failed: source unreachable: portal offline"
        );
        assert!(result.errors[1].starts_with("TJSP: collection failed: adapter panicked"));
        assert!(result.errors[1].contains("selector exploded"));
        assert_eq!(result.total_collected, 2);
    }

    #[tokio::test]
    async fn rolled_back_batch_counts_zero_and_spares_others() {
        let store = Arc::new(FailingStore {
            inner: MemoryStore::new(),
            reject: Court::Stj,
        });
        let collector = Collector::new(
            vec![
                source(Court::Stf, Behaviour::Returns(vec![decision(Court::Stf, "1")])),
                source(
                    Court::Stj,
                    Behaviour::Returns(vec![decision(Court::Stj, "1"), decision(Court::Stj, "2")]),
                ),
            ],
            store.clone(),
            false,
        );

        let result = collector.collect_all(1).await;
        assert_eq!(
            result.success,
            ["STF: 1 decision collected", "STJ: 0 decisions collected"]
        );
        assert_eq!(result.total_collected, 1);

        let counts = store.counts().await.unwrap();
        assert_eq!(counts.decisions.get(&Court::Stj), None);
        assert_eq!(counts.decisions[&Court::Stf], 1);
    }

    #[tokio::test]
    async fn parallel_mode_reports_in_registry_order() {
        let store = Arc::new(MemoryStore::new());
        let collector = Collector::new(
            vec![
                source(Court::Tse, Behaviour::Returns(vec![decision(Court::Tse, "1")])),
                source(Court::Stm, Behaviour::Fails),
                source(Court::Stf, Behaviour::Returns(vec![decision(Court::Stf, "1")])),
            ],
            store,
            true,
        );

        let result = collector.collect_all(3).await;
        assert_eq!(
            result.success,
            ["TSE: 1 decision collected", "STF: 1 decision collected"]
        );
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].starts_with("STM: "));
    }

    #[tokio::test]
    async fn empty_registry_yields_empty_report() {
        let collector = Collector::new(Vec::new(), Arc::new(MemoryStore::new()), false);
        assert_eq!(collector.collect_all(1).await, CollectionResult::default());
    }
}
