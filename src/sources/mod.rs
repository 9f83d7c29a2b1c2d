//! Source adapter registry and factory
//!
//! This module provides:
//! - Central registration of all supported sources
//! - A factory function to resolve adapters by identity
//!
//! All source-specific logic lives in the adapter modules. The rest of
//! the application interacts exclusively through `SourceAdapter`.

pub mod adapter;
pub mod court;
pub mod extract;
pub mod rules;

use std::sync::Arc;

use chrono_tz::Tz;

use adapter::SourceAdapter;
use court::{CourtAdapter, CourtProfile};
use extract::MarkupExtractor;
use rules::{RulePage, RulesAdapter};

use crate::fetcher::RateLimitedFetcher;
use crate::schema::SourceId;

/// Ordered list of adapters the orchestrator runs.
pub type Registry = Vec<Arc<dyn SourceAdapter>>;

/// Returns the adapter for one source.
///
/// Every adapter receives its own clone of `fetcher`: the delay
/// settings are shared, the pacing is not. Court windows are counted
/// in `tz`.
pub fn get_adapter(
    id: SourceId,
    fetcher: &RateLimitedFetcher,
    extractor: Arc<dyn MarkupExtractor>,
    tz: Tz,
) -> Arc<dyn SourceAdapter> {
    match id {
        SourceId::Court(court) => Arc::new(CourtAdapter::new(
            CourtProfile::for_court(court),
            fetcher.clone(),
            extractor,
            tz,
        )),
        SourceId::Rules => Arc::new(RulesAdapter::new(
            RulePage::defaults(),
            fetcher.clone(),
            extractor,
        )),
    }
}

/// Builds the registry in the given order, skipping repeated ids.
pub fn build_registry(
    ids: &[SourceId],
    fetcher: &RateLimitedFetcher,
    extractor: Arc<dyn MarkupExtractor>,
    tz: Tz,
) -> Registry {
    let mut registry: Registry = Vec::with_capacity(ids.len());
    for id in ids {
        if registry.iter().any(|a| a.identify() == *id) {
            log::warn!("source {} listed twice, keeping the first entry", id);
            continue;
        }
        registry.push(get_adapter(*id, fetcher, extractor.clone(), tz));
    }
    registry
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::fetcher::DelayRange;
    use crate::schema::Court;

    #[test]
    fn registry_keeps_order_and_drops_repeats() {
        crate::fetcher::install_crypto_provider();
        let fetcher =
            RateLimitedFetcher::new(reqwest::Client::new(), DelayRange::none(), Duration::from_secs(1));
        let ids = [
            SourceId::Rules,
            SourceId::Court(Court::Stj),
            SourceId::Rules,
            SourceId::Court(Court::Stf),
        ];

        let registry = build_registry(
            &ids,
            &fetcher,
            Arc::new(extract::HtmlExtractor),
            chrono_tz::America::Sao_Paulo,
        );
        let names: Vec<_> = registry.iter().map(|a| a.identify().as_str()).collect();
        assert_eq!(names, ["ENUNCIADOS", "STJ", "STF"]);
    }
}
