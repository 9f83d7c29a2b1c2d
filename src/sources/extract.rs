//! Markup extraction boundary.
//!
//! Per-portal extraction rules are volatile and live outside the
//! collection core. Adapters only depend on `MarkupExtractor`;
//! `HtmlExtractor` is the generic best-effort implementation.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::util;

/// One result-list entry, before the detail page is fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateLink {
    pub url: String,
    pub process_number: Option<String>,
    pub judge: Option<String>,
}

/// Named fields found on a decision detail page.
///
/// Every field may be missing; dates are left as text for the adapter
/// to parse.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecisionFields {
    pub process_number: Option<String>,
    pub judge: Option<String>,
    pub judgment_date: Option<String>,
    pub publication_date: Option<String>,
    pub summary: Option<String>,
    pub body: Option<String>,
    pub tags: Vec<String>,
}

/// Turns a fetched document into named fields.
///
/// CONTRACT:
/// - Never fails on malformed markup; returns partial or empty output
/// - Pure: no I/O
///
pub trait MarkupExtractor: Send + Sync {
    /// Links to decisions found on a search result page.
    ///
    /// Relative links are resolved against `base_url`. Duplicates are
    /// removed, first occurrence kept.
    fn candidates(&self, html: &str, base_url: &str) -> Vec<CandidateLink>;

    fn decision_fields(&self, html: &str) -> DecisionFields;

    /// Cleaned text of every block that may hold one enunciado.
    fn rule_blocks(&self, html: &str) -> Vec<String>;
}

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

static RESULT_ITEM: Lazy<Selector> = Lazy::new(|| selector("div.resultado, tr.linha-resultado"));
static LINK: Lazy<Selector> = Lazy::new(|| selector("a[href]"));
static PROCESS: Lazy<Selector> = Lazy::new(|| selector("span.processo, div.numero-processo"));
static JUDGE: Lazy<Selector> = Lazy::new(|| selector("span.relator, div.relator"));
static JUDGMENT_DATE: Lazy<Selector> =
    Lazy::new(|| selector("span.data-julgamento, div.data-julgamento"));
static PUBLICATION_DATE: Lazy<Selector> =
    Lazy::new(|| selector("span.data-publicacao, div.data-publicacao"));
static SUMMARY: Lazy<Selector> = Lazy::new(|| selector("div.ementa, p.ementa"));
static BODY: Lazy<Selector> = Lazy::new(|| selector("div.acordao, div.inteiro-teor"));
static TAG: Lazy<Selector> = Lazy::new(|| selector("span.tag, div.palavra-chave"));
static RULE_DIV: Lazy<Selector> = Lazy::new(|| selector("div.enunciado"));
static PARAGRAPH: Lazy<Selector> = Lazy::new(|| selector("p"));

/// Generic CSS-selector extractor.
///
/// Uses the class names shared by most tribunal portals
/// (`div.resultado`, `span.processo`, `div.ementa`, …).
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlExtractor;

impl HtmlExtractor {
    fn text_of(el: ElementRef<'_>) -> String {
        util::clean_text(&el.text().collect::<Vec<_>>().join(" "))
    }

    fn first_text(doc: &Html, sel: &Selector) -> Option<String> {
        doc.select(sel)
            .map(Self::text_of)
            .find(|t| !t.is_empty())
    }

    fn resolve(base: Option<&Url>, href: &str) -> Option<String> {
        let href = href.trim();
        if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
            return None;
        }
        match Url::parse(href) {
            Ok(abs) => Some(abs.to_string()),
            Err(_) => base?.join(href).ok().map(|u| u.to_string()),
        }
    }
}

impl MarkupExtractor for HtmlExtractor {
    fn candidates(&self, html: &str, base_url: &str) -> Vec<CandidateLink> {
        let doc = Html::parse_document(html);
        let base = Url::parse(base_url).ok();
        let mut seen = HashSet::new();

        doc.select(&RESULT_ITEM)
            .filter_map(|item| {
                let href = item.select(&LINK).next()?.value().attr("href")?;
                let url = Self::resolve(base.as_ref(), href)?;
                let text = Self::text_of(item);
                Some(CandidateLink {
                    url,
                    process_number: util::find_process_number(&text),
                    judge: util::find_judge(&text),
                })
            })
            .filter(|c| seen.insert(c.url.clone()))
            .collect()
    }

    fn decision_fields(&self, html: &str) -> DecisionFields {
        let doc = Html::parse_document(html);

        // Some portals only print the number inside the header text.
        let process_number = Self::first_text(&doc, &PROCESS)
            .or_else(|| util::find_process_number(&Self::text_of(doc.root_element())));

        DecisionFields {
            process_number,
            judge: Self::first_text(&doc, &JUDGE),
            judgment_date: Self::first_text(&doc, &JUDGMENT_DATE),
            publication_date: Self::first_text(&doc, &PUBLICATION_DATE),
            summary: Self::first_text(&doc, &SUMMARY),
            body: Self::first_text(&doc, &BODY),
            tags: doc
                .select(&TAG)
                .map(Self::text_of)
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    fn rule_blocks(&self, html: &str) -> Vec<String> {
        let doc = Html::parse_document(html);

        let mut blocks: Vec<String> = doc.select(&RULE_DIV).map(Self::text_of).collect();
        if blocks.is_empty() {
            blocks = doc.select(&PARAGRAPH).map(Self::text_of).collect();
        }
        blocks.retain(|b| !b.is_empty());
        blocks
    }
}
