use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{RecordStore, StoreCounts, decision_matches};
use crate::error::PersistenceError;
use crate::schema::{
    Court, DecisionKey, DecisionRecord, RuleBody, RuleCategory, RuleKey, RuleRecord,
};

#[derive(Default)]
struct Tables {
    decisions: HashMap<DecisionKey, DecisionRecord>,
    /// Insertion order, used for "newest first" queries
    decision_log: Vec<DecisionKey>,
    rules: BTreeMap<RuleKey, RuleRecord>,
}

/// Process-local store.
///
/// Commits take the write lock for the whole batch, so a batch is
/// observed either entirely or not at all.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn find_decision(
        &self,
        key: &DecisionKey,
    ) -> Result<Option<DecisionRecord>, PersistenceError> {
        Ok(self.tables.read().await.decisions.get(key).cloned())
    }

    async fn find_rule(&self, key: &RuleKey) -> Result<Option<RuleRecord>, PersistenceError> {
        Ok(self.tables.read().await.rules.get(key).cloned())
    }

    async fn commit_decisions(&self, batch: Vec<DecisionRecord>) -> Result<(), PersistenceError> {
        let mut t = self.tables.write().await;

        // Validate everything before touching the tables.
        let mut incoming = std::collections::HashSet::with_capacity(batch.len());
        for record in &batch {
            let key = record.key();
            if t.decisions.contains_key(&key) || !incoming.insert(key.clone()) {
                return Err(PersistenceError::Conflict(key.to_string()));
            }
        }

        for record in batch {
            let key = record.key();
            t.decision_log.push(key.clone());
            t.decisions.insert(key, record);
        }
        Ok(())
    }

    async fn commit_rules(&self, batch: Vec<RuleRecord>) -> Result<(), PersistenceError> {
        let mut t = self.tables.write().await;

        let mut incoming = std::collections::HashSet::with_capacity(batch.len());
        for record in &batch {
            let key = record.key();
            if t.rules.contains_key(&key) || !incoming.insert(key) {
                return Err(PersistenceError::Conflict(key.to_string()));
            }
        }

        for record in batch {
            t.rules.insert(record.key(), record);
        }
        Ok(())
    }

    async fn recent_decisions(
        &self,
        court: Option<Court>,
        limit: usize,
    ) -> Result<Vec<DecisionRecord>, PersistenceError> {
        let t = self.tables.read().await;
        Ok(t.decision_log
            .iter()
            .rev()
            .filter(|k| court.is_none_or(|c| k.court == c))
            .filter_map(|k| t.decisions.get(k).cloned())
            .take(limit)
            .collect())
    }

    async fn search_decisions(
        &self,
        term: &str,
        court: Option<Court>,
        limit: usize,
    ) -> Result<Vec<DecisionRecord>, PersistenceError> {
        let term = term.to_lowercase();
        let t = self.tables.read().await;
        Ok(t.decision_log
            .iter()
            .rev()
            .filter(|k| court.is_none_or(|c| k.court == c))
            .filter_map(|k| t.decisions.get(k))
            .filter(|r| decision_matches(r, &term))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn rules(
        &self,
        body: Option<RuleBody>,
        category: Option<RuleCategory>,
        limit: usize,
    ) -> Result<Vec<RuleRecord>, PersistenceError> {
        let t = self.tables.read().await;
        Ok(t.rules
            .values()
            .filter(|r| body.is_none_or(|b| r.body == b))
            .filter(|r| category.is_none_or(|c| r.category == c))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn counts(&self) -> Result<StoreCounts, PersistenceError> {
        let t = self.tables.read().await;
        let mut counts = StoreCounts::default();
        for key in t.decisions.keys() {
            *counts.decisions.entry(key.court).or_default() += 1;
        }
        for key in t.rules.keys() {
            *counts.rules.entry(key.body).or_default() += 1;
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision(court: Court, number: &str, summary: &str) -> DecisionRecord {
        DecisionRecord {
            court,
            process_number: number.into(),
            judge: None,
            judgment_date: None,
            publication_date: None,
            summary: summary.into(),
            body: String::new(),
            tags: String::new(),
            source_url: format!("https://example/{number}"),
            collected_at: Some(chrono::Utc::now()),
        }
    }

    fn rule(body: RuleBody, category: RuleCategory, number: u32) -> RuleRecord {
        RuleRecord {
            body,
            category,
            number,
            text: format!("texto {number}"),
            remarks: None,
            approval_date: None,
            source_url: "https://example/rules".into(),
            collected_at: Some(chrono::Utc::now()),
        }
    }

    #[tokio::test]
    async fn conflicting_batch_writes_nothing() {
        let store = MemoryStore::new();
        store
            .commit_decisions(vec![decision(Court::Stj, "1", "a")])
            .await
            .unwrap();

        let err = store
            .commit_decisions(vec![decision(Court::Stj, "2", "b"), decision(Court::Stj, "1", "c")])
            .await
            .unwrap_err();
        assert!(matches!(err, PersistenceError::Conflict(ref k) if k == "STJ:1"));

        let counts = store.counts().await.unwrap();
        assert_eq!(counts.total(), 1);
        let kept = store
            .find_decision(&decision(Court::Stj, "1", "").key())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(kept.summary, "a");
    }

    #[tokio::test]
    async fn same_number_in_different_courts_is_distinct() {
        let store = MemoryStore::new();
        store
            .commit_decisions(vec![decision(Court::Stf, "1", "a"), decision(Court::Stj, "1", "b")])
            .await
            .unwrap();
        assert_eq!(store.counts().await.unwrap().total(), 2);
    }

    #[tokio::test]
    async fn recent_and_search_are_newest_first() {
        let store = MemoryStore::new();
        store
            .commit_decisions(vec![
                decision(Court::Stf, "1", "Dano moral"),
                decision(Court::Stj, "2", "ICMS"),
            ])
            .await
            .unwrap();
        store
            .commit_decisions(vec![decision(Court::Stf, "3", "dano material")])
            .await
            .unwrap();

        let recent = store.recent_decisions(None, 2).await.unwrap();
        let numbers: Vec<_> = recent.iter().map(|r| r.process_number.as_str()).collect();
        assert_eq!(numbers, ["3", "2"]);

        let stf = store.recent_decisions(Some(Court::Stf), 10).await.unwrap();
        assert_eq!(stf.len(), 2);

        let found = store.search_decisions("DANO", None, 10).await.unwrap();
        let numbers: Vec<_> = found.iter().map(|r| r.process_number.as_str()).collect();
        assert_eq!(numbers, ["3", "1"]);
    }

    #[tokio::test]
    async fn rules_are_filtered_and_ordered_by_number() {
        let store = MemoryStore::new();
        store
            .commit_rules(vec![
                rule(RuleBody::Fonaje, RuleCategory::Civel, 10),
                rule(RuleBody::Fonaje, RuleCategory::Civel, 2),
                rule(RuleBody::Cnj, RuleCategory::Geral, 1),
            ])
            .await
            .unwrap();

        let civel = store
            .rules(Some(RuleBody::Fonaje), Some(RuleCategory::Civel), 10)
            .await
            .unwrap();
        let numbers: Vec<_> = civel.iter().map(|r| r.number).collect();
        assert_eq!(numbers, [2, 10]);

        let counts = store.counts().await.unwrap();
        assert_eq!(counts.rules[&RuleBody::Fonaje], 2);
        assert_eq!(counts.rules[&RuleBody::Cnj], 1);

        assert!(
            store
                .commit_rules(vec![rule(RuleBody::Cnj, RuleCategory::Geral, 1)])
                .await
                .is_err()
        );
    }
}
