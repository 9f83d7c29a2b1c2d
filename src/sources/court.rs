use std::sync::Arc;

use chrono::{Days, NaiveDate, Utc};
use chrono_tz::Tz;
use log::{debug, warn};

use crate::{
    fetcher::RateLimitedFetcher,
    schema::{CandidateRef, Court, DecisionRecord, SourceId},
    util,
};

use super::adapter::SourceAdapter;
use super::extract::MarkupExtractor;

/// Where and how to query one court portal.
///
/// The search form of every portal takes the start of the window as a
/// `dd/mm/yyyy` date; `date_param` names that field.
#[derive(Debug, Clone)]
pub struct CourtProfile {
    pub court: Court,
    pub base_url: &'static str,
    pub search_url: &'static str,
    pub date_param: &'static str,
}

impl CourtProfile {
    pub fn for_court(court: Court) -> CourtProfile {
        let (base_url, search_url, date_param) = match court {
            Court::Stf => (
                "https://portal.stf.jus.br",
                "https://portal.stf.jus.br/jurisprudencia/pesquisar.asp",
                "dataInicial",
            ),
            Court::Stj => (
                "https://www.stj.jus.br",
                "https://www.stj.jus.br/sites/portalp/Paginas/Jurisprudencia/Pesquisa-de-Jurisprudencia.aspx",
                "data_inicial",
            ),
            Court::Tjsp => (
                "https://esaj.tjsp.jus.br",
                "https://esaj.tjsp.jus.br/cjsg/resultadoCompleta.do",
                "dtPublicacaoInicio",
            ),
            Court::Tst => (
                "https://jurisprudencia.tst.jus.br",
                "https://jurisprudencia.tst.jus.br/consulta",
                "publicacaoInicial",
            ),
            Court::Tse => (
                "https://jurisprudencia.tse.jus.br",
                "https://jurisprudencia.tse.jus.br/pesquisa",
                "dataInicial",
            ),
            Court::Stm => (
                "https://jurisprudencia.stm.jus.br",
                "https://jurisprudencia.stm.jus.br/consulta",
                "dataInicial",
            ),
        };

        CourtProfile {
            court,
            base_url,
            search_url,
            date_param,
        }
    }
}

/// Court portal adapter
///
/// One implementation for every court; the differences live in the
/// `CourtProfile` and in the extractor.
///
/// DESIGN PRINCIPLES:
/// - Owns its fetcher, so the random delay is scoped to this portal
/// - Network failures end up as "nothing found", never as an error
/// - The window is counted in `tz`, the scheduler's zone, not the host's
/// - A detail page without a process number is dropped: it cannot be
///   deduplicated
pub struct CourtAdapter {
    profile: CourtProfile,
    fetcher: RateLimitedFetcher,
    extractor: Arc<dyn MarkupExtractor>,
    tz: Tz,
}

impl CourtAdapter {
    pub fn new(
        profile: CourtProfile,
        fetcher: RateLimitedFetcher,
        extractor: Arc<dyn MarkupExtractor>,
        tz: Tz,
    ) -> Self {
        Self {
            profile,
            fetcher,
            extractor,
            tz,
        }
    }

    /// Builds a record out of a detail page.
    ///
    /// Hints scraped from the result list fill in what the detail page
    /// lacks.
    fn build_record(
        &self,
        url: &str,
        html: &str,
        hinted_number: Option<&String>,
        hinted_judge: Option<&String>,
    ) -> Option<DecisionRecord> {
        let fields = self.extractor.decision_fields(html);

        let process_number = fields
            .process_number
            .or_else(|| hinted_number.cloned())
            .and_then(|n| util::non_empty(&n))?;

        Some(DecisionRecord {
            court: self.profile.court,
            process_number,
            judge: fields.judge.or_else(|| hinted_judge.cloned()),
            judgment_date: fields.judgment_date.as_deref().and_then(util::parse_br_date),
            publication_date: fields
                .publication_date
                .as_deref()
                .and_then(util::parse_br_date),
            summary: fields.summary.unwrap_or_default(),
            body: fields.body.unwrap_or_default(),
            tags: util::join_tags(&fields.tags),
            source_url: url.to_string(),
            collected_at: None,
        })
    }
}

#[async_trait::async_trait]
impl SourceAdapter for CourtAdapter {
    fn identify(&self) -> SourceId {
        SourceId::Court(self.profile.court)
    }

    async fn search_recent(&self, days_back: u32) -> Vec<CandidateRef> {
        let today = Utc::now().with_timezone(&self.tz).date_naive();
        let since = window_start(today, days_back);
        let params = [(self.profile.date_param, util::format_br_date(since))];

        let page = match self.fetcher.fetch(self.profile.search_url, &params, None).await {
            Ok(page) => page,
            Err(e) => {
                warn!("{}: search unavailable, treating as empty: {}", self.profile.court, e);
                return Vec::new();
            }
        };

        let candidates: Vec<CandidateRef> = self
            .extractor
            .candidates(&page.body, self.profile.base_url)
            .into_iter()
            .map(|c| CandidateRef::Decision {
                url: c.url,
                process_number: c.process_number,
                judge: c.judge,
            })
            .collect();

        debug!(
            "{}: {} candidates since {} ({}, HTTP {})",
            self.profile.court,
            candidates.len(),
            since,
            page.url,
            page.status
        );
        candidates
    }

    async fn extract_details(&self, candidate: &CandidateRef) -> Option<DecisionRecord> {
        let CandidateRef::Decision {
            url,
            process_number,
            judge,
        } = candidate
        else {
            return None;
        };

        let page = match self.fetcher.fetch(url, &[], None).await {
            Ok(page) => page,
            Err(e) => {
                warn!("{}: skipping {}: {}", self.profile.court, url, e);
                return None;
            }
        };

        let record = self.build_record(url, &page.body, process_number.as_ref(), judge.as_ref());
        if record.is_none() {
            debug!("{}: no process number on {}", self.profile.court, url);
        }
        record
    }
}

/// First day of a `days_back` window ending `today`.
///
/// Windows reaching past the calendar's start are cut at `NaiveDate::MIN`.
fn window_start(today: NaiveDate, days_back: u32) -> NaiveDate {
    today
        .checked_sub_days(Days::new(u64::from(days_back)))
        .unwrap_or(NaiveDate::MIN)
}

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use super::*;
    use crate::fetcher::DelayRange;
    use crate::sources::extract::HtmlExtractor;

    fn adapter(court: Court) -> CourtAdapter {
        crate::fetcher::install_crypto_provider();
        CourtAdapter::new(
            CourtProfile::for_court(court),
            RateLimitedFetcher::new(
                reqwest::Client::new(),
                DelayRange::none(),
                StdDuration::from_secs(1),
            ),
            Arc::new(HtmlExtractor),
            chrono_tz::America::Sao_Paulo,
        )
    }

    #[test]
    fn detail_page_is_normalized() {
        let html = r#"
            <span class="processo">0001234-56.2024.8.26.0000</span>
            <span class="data-julgamento">Julgado em 05/03/2024</span>
            <span class="data-publicacao">sem data</span>
            <div class="ementa">Ementa  do julgado</div>
            <div class="inteiro-teor">Acórdão completo</div>
            <div class="palavra-chave">tributário</div><div class="palavra-chave">ICMS</div>"#;

        let hint = "MINISTRO RELATOR".to_string();
        let record = adapter(Court::Stj)
            .build_record("https://stj/doc/1", html, None, Some(&hint))
            .unwrap();

        assert_eq!(record.court, Court::Stj);
        assert_eq!(record.process_number, "0001234-56.2024.8.26.0000");
        assert_eq!(record.judge.as_deref(), Some("MINISTRO RELATOR"));
        assert_eq!(record.judgment_date, chrono::NaiveDate::from_ymd_opt(2024, 3, 5));
        assert_eq!(record.publication_date, None);
        assert_eq!(record.summary, "Ementa do julgado");
        assert_eq!(record.body, "Acórdão completo");
        assert_eq!(record.tags, "tributário, ICMS");
        assert_eq!(record.collected_at, None);
    }

    #[test]
    fn huge_window_is_cut_at_calendar_start() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();

        assert_eq!(window_start(today, 0), today);
        assert_eq!(window_start(today, 7), NaiveDate::from_ymd_opt(2024, 2, 27).unwrap());
        assert_eq!(window_start(today, 200_000_000), NaiveDate::MIN);
        assert_eq!(window_start(today, u32::MAX), NaiveDate::MIN);
    }

    #[tokio::test]
    async fn huge_window_search_is_empty_not_a_panic() {
        // unreachable portal: the search degrades to an empty list
        let mut a = adapter(Court::Stf);
        a.profile.search_url = "http://127.0.0.1:1/pesquisar";

        assert!(a.search_recent(u32::MAX).await.is_empty());
        assert_eq!(a.collect(200_000_000).await.unwrap(), crate::schema::Harvest::Decisions(vec![]));
    }

    #[test]
    fn missing_process_number_falls_back_to_hint_or_drops() {
        let a = adapter(Court::Stf);
        let hint = "0000001-00.2024.1.00.0000".to_string();

        let rec = a.build_record("u", "<div class='ementa'>x</div>", Some(&hint), None);
        assert_eq!(rec.unwrap().process_number, hint);

        assert!(a.build_record("u", "<div class='ementa'>x</div>", None, None).is_none());
    }

    #[tokio::test]
    async fn rule_candidates_are_not_court_items() {
        let a = adapter(Court::Tjsp);
        let rule = crate::schema::RuleRecord {
            body: crate::schema::RuleBody::Cnj,
            category: crate::schema::RuleCategory::Geral,
            number: 1,
            text: "t".into(),
            remarks: None,
            approval_date: None,
            source_url: "u".into(),
            collected_at: None,
        };
        assert!(a.extract_details(&CandidateRef::Rule(rule)).await.is_none());
    }

    #[test]
    fn every_court_has_a_profile() {
        for court in Court::ALL {
            let p = CourtProfile::for_court(court);
            assert_eq!(p.court, court);
            assert!(p.search_url.starts_with(p.base_url));
        }
    }
}
