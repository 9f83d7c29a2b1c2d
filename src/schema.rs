use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Courts whose decisions are collected.
///
/// The serialized form is the upper-case acronym and is also the
/// partition used by the deduplication key.
///
/// IMPORTANT:
/// - Names must remain stable: they are persisted in record keys
/// - Adding a court requires a `CourtProfile` in `sources::court`
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Court {
    /// Supremo Tribunal Federal
    Stf,
    /// Superior Tribunal de Justiça
    Stj,
    /// Tribunal de Justiça de São Paulo
    Tjsp,
    /// Tribunal Superior do Trabalho
    Tst,
    /// Tribunal Superior Eleitoral
    Tse,
    /// Superior Tribunal Militar
    Stm,
}

impl Court {
    pub const ALL: [Court; 6] = [
        Court::Stf,
        Court::Stj,
        Court::Tjsp,
        Court::Tst,
        Court::Tse,
        Court::Stm,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Court::Stf => "STF",
            Court::Stj => "STJ",
            Court::Tjsp => "TJSP",
            Court::Tst => "TST",
            Court::Tse => "TSE",
            Court::Stm => "STM",
        }
    }

    /// Human-readable court name, used in the schedule description.
    pub fn full_name(&self) -> &'static str {
        match self {
            Court::Stf => "Supremo Tribunal Federal",
            Court::Stj => "Superior Tribunal de Justiça",
            Court::Tjsp => "Tribunal de Justiça de São Paulo",
            Court::Tst => "Tribunal Superior do Trabalho",
            Court::Tse => "Tribunal Superior Eleitoral",
            Court::Stm => "Superior Tribunal Militar",
        }
    }

    pub fn parse(name: &str) -> Option<Court> {
        Court::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for Court {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a registered source adapter.
///
/// Courts produce `DecisionRecord`s, the rules source produces
/// `RuleRecord`s for every issuing body at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceId {
    Court(Court),
    Rules,
}

impl SourceId {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceId::Court(c) => c.as_str(),
            SourceId::Rules => "ENUNCIADOS",
        }
    }

    /// Resolves a configured source name (`"STJ"`, `"enunciados"`, …).
    pub fn parse(name: &str) -> Option<SourceId> {
        if name.trim().eq_ignore_ascii_case("ENUNCIADOS") {
            return Some(SourceId::Rules);
        }
        Court::parse(name).map(SourceId::Court)
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bodies that publish enunciados.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RuleBody {
    Fonaje,
    Cnj,
}

impl RuleBody {
    pub const ALL: [RuleBody; 2] = [RuleBody::Fonaje, RuleBody::Cnj];

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleBody::Fonaje => "FONAJE",
            RuleBody::Cnj => "CNJ",
        }
    }

    pub fn full_name(&self) -> &'static str {
        match self {
            RuleBody::Fonaje => "Fórum Nacional de Juizados Especiais",
            RuleBody::Cnj => "Conselho Nacional de Justiça",
        }
    }
}

impl fmt::Display for RuleBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleCategory {
    Civel,
    Criminal,
    FazendaPublica,
    Geral,
}

impl RuleCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleCategory::Civel => "CIVEL",
            RuleCategory::Criminal => "CRIMINAL",
            RuleCategory::FazendaPublica => "FAZENDA_PUBLICA",
            RuleCategory::Geral => "GERAL",
        }
    }
}

impl fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ------------------------------------------------------------
// Decision record
// ------------------------------------------------------------
//
// One published judicial decision, normalized across courts.
//
// `collected_at` is `None` for everything an adapter returns; the
// persistence step stamps it right before staging the record.
//
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub court: Court,

    /// Process number in whatever format the court publishes
    /// (e.g. CNJ unified numbering "0001234-56.2024.8.26.0000").
    pub process_number: String,

    /// Reporting judge (relator)
    pub judge: Option<String>,

    pub judgment_date: Option<NaiveDate>,
    pub publication_date: Option<NaiveDate>,

    /// Ementa
    pub summary: String,

    /// Full decision text (acórdão / inteiro teor)
    pub body: String,

    /// Keywords joined with ", "
    pub tags: String,

    pub source_url: String,

    pub collected_at: Option<DateTime<Utc>>,
}

impl DecisionRecord {
    pub fn key(&self) -> DecisionKey {
        DecisionKey {
            court: self.court,
            process_number: self.process_number.clone(),
        }
    }
}

/// Uniqueness key of a decision: (court, process number).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DecisionKey {
    pub court: Court,
    pub process_number: String,
}

impl fmt::Display for DecisionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.court, self.process_number)
    }
}

// ------------------------------------------------------------
// Rule record (enunciado)
// ------------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleRecord {
    pub body: RuleBody,
    pub category: RuleCategory,

    /// Always positive; blocks without a number are never turned
    /// into records.
    pub number: u32,

    pub text: String,
    pub remarks: Option<String>,
    pub approval_date: Option<NaiveDate>,
    pub source_url: String,
    pub collected_at: Option<DateTime<Utc>>,
}

impl RuleRecord {
    pub fn key(&self) -> RuleKey {
        RuleKey {
            body: self.body,
            category: self.category,
            number: self.number,
        }
    }
}

/// Uniqueness key of a rule: (body, category, number).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleKey {
    pub body: RuleBody,
    pub category: RuleCategory,
    pub number: u32,
}

impl fmt::Display for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.body, self.category, self.number)
    }
}

/// Lightweight pointer produced by `search_recent`.
///
/// Court adapters return `Decision` references that still need a detail
/// fetch. The rules adapter already has everything during search and
/// returns fully populated `Rule` entries.
#[derive(Debug, Clone, PartialEq)]
pub enum CandidateRef {
    Decision {
        url: String,
        /// Hints scraped from the result list, used when the detail page
        /// lacks them.
        process_number: Option<String>,
        judge: Option<String>,
    },
    Rule(RuleRecord),
}

impl CandidateRef {
    pub fn decision(url: impl Into<String>) -> Self {
        CandidateRef::Decision {
            url: url.into(),
            process_number: None,
            judge: None,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            CandidateRef::Decision { url, .. } => url,
            CandidateRef::Rule(rule) => &rule.source_url,
        }
    }
}

/// Output of one adapter's `collect`.
#[derive(Debug, Clone, PartialEq)]
pub enum Harvest {
    Decisions(Vec<DecisionRecord>),
    Rules(Vec<RuleRecord>),
}

impl Harvest {
    pub fn len(&self) -> usize {
        match self {
            Harvest::Decisions(d) => d.len(),
            Harvest::Rules(r) => r.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Singular and plural noun for the per-source report line.
    pub fn nouns(&self) -> (&'static str, &'static str) {
        match self {
            Harvest::Decisions(_) => ("decision", "decisions"),
            Harvest::Rules(_) => ("rule", "rules"),
        }
    }
}

// ------------------------------------------------------------
// Collection report
// ------------------------------------------------------------
//
// Ephemeral: built by `Collector::collect_all`, handed back to the
// caller (manual trigger or scheduler) and never persisted.
//
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionResult {
    /// One line per source that collected without failing, in registry order
    pub success: Vec<String>,

    /// One line per source that failed, in registry order
    pub errors: Vec<String>,

    /// Records newly written during this run
    pub total_collected: usize,
}
