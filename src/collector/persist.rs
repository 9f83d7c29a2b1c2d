use std::collections::HashSet;

use chrono::Utc;
use log::{debug, error, warn};

use crate::error::PersistenceError;
use crate::metrics::{METRICS, RuntimeMetrics};
use crate::schema::{DecisionRecord, Harvest, RuleRecord, SourceId};
use crate::store::RecordStore;

/// Deduplicates one adapter's harvest and commits it as a single batch.
///
/// Returns the number of records newly written. A failed commit rolls
/// the whole batch back and counts as zero; the caller keeps going.
pub async fn persist_harvest(store: &dyn RecordStore, source: SourceId, harvest: Harvest) -> usize {
    let outcome = match harvest {
        Harvest::Decisions(records) => persist_decisions(store, source, records).await,
        Harvest::Rules(records) => persist_rules(store, source, records).await,
    };

    match outcome {
        Ok(saved) => {
            RuntimeMetrics::add(&METRICS.records_saved, saved);
            saved
        }
        Err(e) => {
            RuntimeMetrics::incr(&METRICS.commit_failures);
            error!("{}: commit rolled back: {}", source, e);
            0
        }
    }
}

async fn persist_decisions(
    store: &dyn RecordStore,
    source: SourceId,
    records: Vec<DecisionRecord>,
) -> Result<usize, PersistenceError> {
    let mut staged = Vec::with_capacity(records.len());
    let mut staged_keys = HashSet::with_capacity(records.len());

    for mut record in records {
        let key = record.key();

        if staged_keys.contains(&key) {
            RuntimeMetrics::incr(&METRICS.duplicates_skipped);
            continue;
        }

        match store.find_decision(&key).await {
            Ok(Some(_)) => {
                RuntimeMetrics::incr(&METRICS.duplicates_skipped);
                debug!("{}: {} already stored", source, key);
                continue;
            }
            Ok(None) => {}
            Err(e) => {
                warn!("{}: lookup of {} failed, skipping record: {}", source, key, e);
                continue;
            }
        }

        record.collected_at = Some(Utc::now());
        staged_keys.insert(key);
        staged.push(record);
    }

    let n = staged.len();
    if n > 0 {
        store.commit_decisions(staged).await?;
    }
    Ok(n)
}

async fn persist_rules(
    store: &dyn RecordStore,
    source: SourceId,
    records: Vec<RuleRecord>,
) -> Result<usize, PersistenceError> {
    let mut staged = Vec::with_capacity(records.len());
    let mut staged_keys = HashSet::with_capacity(records.len());

    for mut record in records {
        let key = record.key();

        if staged_keys.contains(&key) {
            RuntimeMetrics::incr(&METRICS.duplicates_skipped);
            continue;
        }

        match store.find_rule(&key).await {
            Ok(Some(_)) => {
                RuntimeMetrics::incr(&METRICS.duplicates_skipped);
                continue;
            }
            Ok(None) => {}
            Err(e) => {
                warn!("{}: lookup of {} failed, skipping record: {}", source, key, e);
                continue;
            }
        }

        record.collected_at = Some(Utc::now());
        staged_keys.insert(key);
        staged.push(record);
    }

    let n = staged.len();
    if n > 0 {
        store.commit_rules(staged).await?;
    }
    Ok(n)
}
