/// Utility helpers shared by the source adapters and the extractor.
///
/// This module contains:
/// - Text normalization
/// - Date parsing for the formats Brazilian courts publish
/// - Process number / judge recognition in free text
///
/// IMPORTANT:
/// - No source-specific selectors belong here.
/// - Every helper is total: malformed input yields `None` or an empty
///   string, never a panic.
///

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

/// CNJ unified process numbering: NNNNNNN-DD.AAAA.J.TR.OOOO
static PROCESS_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{7}-\d{2}\.\d{4}\.\d\.\d{2}\.\d{4}").expect("valid regex"));

/// "Rel.: MINISTRO FULANO", "Relator: ...", "Rel. Min. ..."
static JUDGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\brel(?:ator[a]?)?\.?\s*:?\s*([A-ZÁÀÂÃÉÊÍÓÔÕÚÇ][A-ZÁÀÂÃÉÊÍÓÔÕÚÇ.\s]+)")
        .expect("valid regex")
});

/// Collapses runs of whitespace and trims.
///
/// Examples:
/// - "  EMENTA:\n  Recurso   especial " -> "EMENTA: Recurso especial"
///
pub fn clean_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Returns `Some(text)` unless the cleaned text is empty.
pub fn non_empty(raw: &str) -> Option<String> {
    let text = clean_text(raw);
    if text.is_empty() { None } else { Some(text) }
}

/// Parses a date in one of the formats found on court pages.
///
/// Accepted:
/// - "05/03/2024"  (dd/mm/yyyy)
/// - "05.03.2024"  (dd.mm.yyyy)
/// - "2024-03-05"  (ISO)
///
/// Surrounding text is tolerated ("Julgado em 05/03/2024.").
pub fn parse_br_date(raw: &str) -> Option<NaiveDate> {
    static DATE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(\d{1,2})[/.](\d{1,2})[/.](\d{4})|(\d{4})-(\d{2})-(\d{2})").expect("valid regex")
    });

    let caps = DATE.captures(raw)?;
    let (y, m, d) = if caps.get(1).is_some() {
        (&caps[3], &caps[2], &caps[1])
    } else {
        (&caps[4], &caps[5], &caps[6])
    };

    NaiveDate::from_ymd_opt(y.parse().ok()?, m.parse().ok()?, d.parse().ok()?)
}

/// Formats a date the way court search forms expect it.
pub fn format_br_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

/// First CNJ-format process number found in `text`.
pub fn find_process_number(text: &str) -> Option<String> {
    PROCESS_NUMBER.find(text).map(|m| m.as_str().to_string())
}

/// Reporting judge name following a "Rel." marker.
pub fn find_judge(text: &str) -> Option<String> {
    JUDGE
        .captures(text)
        .and_then(|c| non_empty(c.get(1)?.as_str()))
}

/// Joins cleaned, non-empty tags with ", ".
pub fn join_tags<I, S>(tags: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter()
        .filter_map(|t| non_empty(t.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}
