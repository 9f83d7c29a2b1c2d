use std::sync::Arc;

use log::{info, warn};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::{
    error::SourceError,
    fetcher::RateLimitedFetcher,
    schema::{CandidateRef, DecisionRecord, Harvest, RuleBody, RuleCategory, RuleRecord, SourceId},
    util,
};

use super::adapter::SourceAdapter;
use super::extract::MarkupExtractor;

/// "ENUNCIADO 12", "Enunciado nº 12", "ENUNCIADO N. 12"
static HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bENUNCIADO\s+(?:N[º°o]?\.?\s*)?(\d+)\s*[-–—:.]?\s*").expect("valid regex")
});

static REMARKS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)\b(?:Obs\.?|Observação|Nota)\s*:(.+)$").expect("valid regex"));

/// One page listing enunciados of a single body and category.
#[derive(Debug, Clone)]
pub struct RulePage {
    pub body: RuleBody,
    pub category: RuleCategory,
    pub url: String,
}

impl RulePage {
    /// The FONAJE category pages plus the CNJ page.
    pub fn defaults() -> Vec<RulePage> {
        const FONAJE: &str =
            "https://www.cnj.jus.br/programas-e-acoes/juizados-especiais/enunciados-fonaje";
        vec![
            RulePage {
                body: RuleBody::Fonaje,
                category: RuleCategory::Civel,
                url: format!("{FONAJE}/enunciados-civeis/"),
            },
            RulePage {
                body: RuleBody::Fonaje,
                category: RuleCategory::Criminal,
                url: format!("{FONAJE}/enunciados-criminais/"),
            },
            RulePage {
                body: RuleBody::Fonaje,
                category: RuleCategory::FazendaPublica,
                url: format!("{FONAJE}/enunciados-fazenda-publica/"),
            },
            RulePage {
                body: RuleBody::Cnj,
                category: RuleCategory::Geral,
                url: "https://www.cnj.jus.br/enunciados/".into(),
            },
        ]
    }
}

/// Parses one text block into a rule.
///
/// Returns `None` when the block has no `ENUNCIADO <n>` header or the
/// number is not positive.
pub fn parse_rule(
    text: &str,
    body: RuleBody,
    category: RuleCategory,
    url: &str,
) -> Option<RuleRecord> {
    let caps = HEADER.captures(text)?;
    let number: u32 = caps.get(1)?.as_str().parse().ok()?;
    if number == 0 {
        return None;
    }

    let stripped = HEADER.replace(text, "");
    let (main, remarks) = match REMARKS.captures(&stripped) {
        Some(c) => {
            let start = c.get(0)?.start();
            (
                util::clean_text(&stripped[..start]),
                c.get(1).and_then(|m| util::non_empty(m.as_str())),
            )
        }
        None => (util::clean_text(&stripped), None),
    };

    if main.is_empty() {
        return None;
    }

    Some(RuleRecord {
        body,
        category,
        number,
        text: main,
        remarks,
        approval_date: None,
        source_url: url.to_string(),
        collected_at: None,
    })
}

/// Enunciados adapter (FONAJE + CNJ)
///
/// Unlike court adapters this one has no notion of "recent": every run
/// returns the whole corpus and deduplication drops what is already
/// stored. Rules are complete after the search step, so
/// `extract_details` never returns anything.
pub struct RulesAdapter {
    pages: Vec<RulePage>,
    fetcher: RateLimitedFetcher,
    extractor: Arc<dyn MarkupExtractor>,
}

impl RulesAdapter {
    pub fn new(
        pages: Vec<RulePage>,
        fetcher: RateLimitedFetcher,
        extractor: Arc<dyn MarkupExtractor>,
    ) -> Self {
        Self {
            pages,
            fetcher,
            extractor,
        }
    }

    fn parse_page(&self, page: &RulePage, html: &str) -> Vec<RuleRecord> {
        self.extractor
            .rule_blocks(html)
            .iter()
            .filter_map(|block| parse_rule(block, page.body, page.category, &page.url))
            .collect()
    }
}

#[async_trait::async_trait]
impl SourceAdapter for RulesAdapter {
    fn identify(&self) -> SourceId {
        SourceId::Rules
    }

    async fn search_recent(&self, _days_back: u32) -> Vec<CandidateRef> {
        let mut corpus = Vec::new();

        for page in &self.pages {
            match self.fetcher.fetch(&page.url, &[], None).await {
                Ok(fetched) => {
                    let rules = self.parse_page(page, &fetched.body);
                    info!("{} {}: {} enunciados", page.body, page.category, rules.len());
                    corpus.extend(rules.into_iter().map(CandidateRef::Rule));
                }
                Err(e) => warn!("{} {}: page unavailable: {}", page.body, page.category, e),
            }
        }

        corpus
    }

    async fn extract_details(&self, _candidate: &CandidateRef) -> Option<DecisionRecord> {
        None
    }

    async fn collect(&self, days_back: u32) -> Result<Harvest, SourceError> {
        let rules = self
            .search_recent(days_back)
            .await
            .into_iter()
            .filter_map(|c| match c {
                CandidateRef::Rule(rule) => Some(rule),
                CandidateRef::Decision { .. } => None,
            })
            .collect();

        Ok(Harvest::Rules(rules))
    }
}
