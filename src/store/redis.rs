use std::collections::HashSet;

use async_trait::async_trait;
use log::{debug, info};
use redis::aio::MultiplexedConnection;
use serde::Serialize;

use super::{RecordStore, StoreCounts, decision_matches};
use crate::error::PersistenceError;
use crate::schema::{
    Court, DecisionKey, DecisionRecord, RuleBody, RuleCategory, RuleKey, RuleRecord,
};

/// Checks every record key, then writes all of them or none.
///
/// KEYS[1] is the index, KEYS[2..] the record keys.
/// ARGV[1..n] are the JSON values, ARGV[n+1..2n] the index members and
/// ARGV[2n+1] is the index kind ("list" or "set").
///
/// Returns the first existing key, or nil once the batch is written.
const COMMIT_SCRIPT: &str = r#"
local n = #KEYS - 1
for i = 2, #KEYS do
  if redis.call('EXISTS', KEYS[i]) == 1 then return KEYS[i] end
end
for i = 1, n do
  redis.call('SET', KEYS[i + 1], ARGV[i])
  if ARGV[2 * n + 1] == 'list' then
    redis.call('LPUSH', KEYS[1], ARGV[n + i])
  else
    redis.call('SADD', KEYS[1], ARGV[n + i])
  end
end
return false
"#;

#[derive(Clone, Copy)]
enum IndexKind {
    /// Insertion-ordered, newest at the head
    List,
    Set,
}

impl IndexKind {
    fn as_str(self) -> &'static str {
        match self {
            IndexKind::List => "list",
            IndexKind::Set => "set",
        }
    }
}

/// Redis-backed store.
///
/// LAYOUT:
/// - `<prefix>:decision:<COURT>:<process>` JSON record
/// - `<prefix>:decisions` list of decision keys, newest first
/// - `<prefix>:rule:<BODY>:<CATEGORY>:<n>` JSON record
/// - `<prefix>:rules` set of rule keys
///
/// Batches are committed by a single Lua script, so Redis applies them
/// atomically and other clients never see half a batch.
pub struct RedisStore {
    conn: MultiplexedConnection,
    prefix: String,
}

impl RedisStore {
    pub async fn connect(url: &str, prefix: &str) -> Result<Self, PersistenceError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        info!("redis store connected (prefix '{}')", prefix);

        Ok(Self {
            conn,
            prefix: prefix.to_string(),
        })
    }

    fn decision_key(&self, member: &str) -> String {
        format!("{}:decision:{}", self.prefix, member)
    }

    fn decision_index(&self) -> String {
        format!("{}:decisions", self.prefix)
    }

    fn rule_key(&self, member: &str) -> String {
        format!("{}:rule:{}", self.prefix, member)
    }

    fn rule_index(&self) -> String {
        format!("{}:rules", self.prefix)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, PersistenceError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        raw.map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(PersistenceError::from)
    }

    async fn mget_json<T: serde::de::DeserializeOwned>(
        &self,
        keys: &[String],
    ) -> Result<Vec<T>, PersistenceError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.conn.clone();
        let raw: Vec<Option<String>> = redis::cmd("MGET").arg(keys).query_async(&mut conn).await?;

        let mut out = Vec::with_capacity(raw.len());
        for value in raw.into_iter().flatten() {
            out.push(serde_json::from_str(&value)?);
        }
        Ok(out)
    }

    /// Decision index members, newest first, optionally for one court.
    async fn decision_members(&self, court: Option<Court>) -> Result<Vec<String>, PersistenceError> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = redis::cmd("LRANGE")
            .arg(self.decision_index())
            .arg(0)
            .arg(-1)
            .query_async(&mut conn)
            .await?;

        Ok(members
            .into_iter()
            .filter(|m| court.is_none_or(|c| member_court(m) == Some(c)))
            .collect())
    }

    async fn rule_members(&self) -> Result<Vec<String>, PersistenceError> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = redis::cmd("SMEMBERS")
            .arg(self.rule_index())
            .query_async(&mut conn)
            .await?;
        Ok(members)
    }

    async fn commit<T: Serialize>(
        &self,
        index: String,
        kind: IndexKind,
        entries: Vec<(String, String, &T)>,
    ) -> Result<(), PersistenceError> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut seen = HashSet::with_capacity(entries.len());
        for (member, _, _) in &entries {
            if !seen.insert(member.as_str()) {
                return Err(PersistenceError::Conflict(member.clone()));
            }
        }

        let mut values = Vec::with_capacity(entries.len());
        for (_, _, record) in &entries {
            values.push(serde_json::to_string(record)?);
        }

        let mut cmd = redis::cmd("EVAL");
        cmd.arg(COMMIT_SCRIPT).arg(entries.len() + 1).arg(&index);
        for (_, key, _) in &entries {
            cmd.arg(key);
        }
        for value in &values {
            cmd.arg(value);
        }
        for (member, _, _) in &entries {
            cmd.arg(member);
        }
        cmd.arg(kind.as_str());

        let mut conn = self.conn.clone();
        let existing: Option<String> = cmd.query_async(&mut conn).await?;

        match existing {
            Some(key) => Err(PersistenceError::Conflict(key)),
            None => {
                debug!("committed {} records to {}", entries.len(), index);
                Ok(())
            }
        }
    }
}

/// Court of a decision index member ("STJ:<process>").
fn member_court(member: &str) -> Option<Court> {
    member.split_once(':').and_then(|(court, _)| Court::parse(court))
}

/// Body of a rule index member ("FONAJE:CIVEL:8").
fn member_body(member: &str) -> Option<RuleBody> {
    match member.split(':').next()? {
        "FONAJE" => Some(RuleBody::Fonaje),
        "CNJ" => Some(RuleBody::Cnj),
        _ => None,
    }
}

#[async_trait]
impl RecordStore for RedisStore {
    async fn find_decision(
        &self,
        key: &DecisionKey,
    ) -> Result<Option<DecisionRecord>, PersistenceError> {
        self.get_json(&self.decision_key(&key.to_string())).await
    }

    async fn find_rule(&self, key: &RuleKey) -> Result<Option<RuleRecord>, PersistenceError> {
        self.get_json(&self.rule_key(&key.to_string())).await
    }

    async fn commit_decisions(&self, batch: Vec<DecisionRecord>) -> Result<(), PersistenceError> {
        let entries = batch
            .iter()
            .map(|r| {
                let member = r.key().to_string();
                let key = self.decision_key(&member);
                (member, key, r)
            })
            .collect();
        self.commit(self.decision_index(), IndexKind::List, entries)
            .await
    }

    async fn commit_rules(&self, batch: Vec<RuleRecord>) -> Result<(), PersistenceError> {
        let entries = batch
            .iter()
            .map(|r| {
                let member = r.key().to_string();
                let key = self.rule_key(&member);
                (member, key, r)
            })
            .collect();
        self.commit(self.rule_index(), IndexKind::Set, entries).await
    }

    async fn recent_decisions(
        &self,
        court: Option<Court>,
        limit: usize,
    ) -> Result<Vec<DecisionRecord>, PersistenceError> {
        let keys: Vec<String> = self
            .decision_members(court)
            .await?
            .iter()
            .take(limit)
            .map(|m| self.decision_key(m))
            .collect();
        self.mget_json(&keys).await
    }

    async fn search_decisions(
        &self,
        term: &str,
        court: Option<Court>,
        limit: usize,
    ) -> Result<Vec<DecisionRecord>, PersistenceError> {
        let term = term.to_lowercase();
        let keys: Vec<String> = self
            .decision_members(court)
            .await?
            .iter()
            .map(|m| self.decision_key(m))
            .collect();

        let mut found = Vec::new();
        for chunk in keys.chunks(200) {
            let records: Vec<DecisionRecord> = self.mget_json(chunk).await?;
            found.extend(records.into_iter().filter(|r| decision_matches(r, &term)));
            if found.len() >= limit {
                break;
            }
        }
        found.truncate(limit);
        Ok(found)
    }

    async fn rules(
        &self,
        body: Option<RuleBody>,
        category: Option<RuleCategory>,
        limit: usize,
    ) -> Result<Vec<RuleRecord>, PersistenceError> {
        let keys: Vec<String> = self
            .rule_members()
            .await?
            .iter()
            .filter(|m| body.is_none_or(|b| member_body(m) == Some(b)))
            .map(|m| self.rule_key(m))
            .collect();

        let mut rules: Vec<RuleRecord> = self.mget_json(&keys).await?;
        rules.retain(|r| category.is_none_or(|c| r.category == c));
        rules.sort_by_key(RuleRecord::key);
        rules.truncate(limit);
        Ok(rules)
    }

    async fn counts(&self) -> Result<StoreCounts, PersistenceError> {
        let mut counts = StoreCounts::default();
        for member in self.decision_members(None).await? {
            if let Some(court) = member_court(&member) {
                *counts.decisions.entry(court).or_default() += 1;
            }
        }
        for member in self.rule_members().await? {
            if let Some(body) = member_body(&member) {
                *counts.rules.entry(body).or_default() += 1;
            }
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_members_resolve_their_partition() {
        assert_eq!(member_court("STJ:0001234-56.2024.8.26.0000"), Some(Court::Stj));
        assert_eq!(member_court("TJSP:1:2"), Some(Court::Tjsp));
        assert_eq!(member_court("garbage"), None);

        assert_eq!(member_body("FONAJE:CIVEL:8"), Some(RuleBody::Fonaje));
        assert_eq!(member_body("CNJ:GERAL:1"), Some(RuleBody::Cnj));
        assert_eq!(member_body("OAB:GERAL:1"), None);
    }

    #[test]
    fn commit_script_checks_before_writing() {
        let exists = COMMIT_SCRIPT.find("EXISTS").unwrap();
        let set = COMMIT_SCRIPT.find("'SET'").unwrap();
        assert!(exists < set);
    }
}
