//! Durable record storage.
//!
//! The orchestrator only needs key lookups and all-or-nothing batch
//! commits. The read-side queries back the reporting operations of the
//! control layer.

pub mod memory;
pub mod redis;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::{StoreBackend, StoreConfig};
use crate::error::PersistenceError;
use crate::schema::{
    Court, DecisionKey, DecisionRecord, RuleBody, RuleCategory, RuleKey, RuleRecord,
};

pub use memory::MemoryStore;
pub use self::redis::RedisStore;

/// Record counts per partition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    pub decisions: BTreeMap<Court, usize>,
    pub rules: BTreeMap<RuleBody, usize>,
}

impl StoreCounts {
    pub fn total(&self) -> usize {
        self.decisions.values().sum::<usize>() + self.rules.values().sum::<usize>()
    }
}

/// Persistence backend for decisions and rules.
///
/// CONTRACT:
/// - `commit_*` writes the whole batch or nothing
/// - A batch containing a key that already exists fails with
///   `PersistenceError::Conflict` and writes nothing
/// - Records are stored exactly as given (`collected_at` included)
///
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn find_decision(&self, key: &DecisionKey)
    -> Result<Option<DecisionRecord>, PersistenceError>;

    async fn find_rule(&self, key: &RuleKey) -> Result<Option<RuleRecord>, PersistenceError>;

    async fn commit_decisions(&self, batch: Vec<DecisionRecord>) -> Result<(), PersistenceError>;

    async fn commit_rules(&self, batch: Vec<RuleRecord>) -> Result<(), PersistenceError>;

    /// Newest collections first.
    async fn recent_decisions(
        &self,
        court: Option<Court>,
        limit: usize,
    ) -> Result<Vec<DecisionRecord>, PersistenceError>;

    /// Case-insensitive substring match over summary, body and tags,
    /// newest collections first.
    async fn search_decisions(
        &self,
        term: &str,
        court: Option<Court>,
        limit: usize,
    ) -> Result<Vec<DecisionRecord>, PersistenceError>;

    /// Ordered by body, category, then number.
    async fn rules(
        &self,
        body: Option<RuleBody>,
        category: Option<RuleCategory>,
        limit: usize,
    ) -> Result<Vec<RuleRecord>, PersistenceError>;

    async fn counts(&self) -> Result<StoreCounts, PersistenceError>;
}

/// True when `term` occurs in the decision's searchable text.
pub(crate) fn decision_matches(record: &DecisionRecord, term_lower: &str) -> bool {
    [&record.summary, &record.body, &record.tags]
        .iter()
        .any(|field| field.to_lowercase().contains(term_lower))
}

/// Opens the configured backend.
pub async fn open(cfg: &StoreConfig) -> Result<Arc<dyn RecordStore>, PersistenceError> {
    match cfg.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreBackend::Redis => {
            let url = cfg
                .url
                .as_deref()
                .ok_or_else(|| PersistenceError::Unavailable("redis url missing".into()))?;
            let store = RedisStore::connect(url, &cfg.key_prefix).await?;
            Ok(Arc::new(store))
        }
    }
}
