use crate::error::SourceError;
use crate::schema::{CandidateRef, DecisionRecord, Harvest, SourceId};

/// SourceAdapter is the abstraction layer between:
/// - The generic collection orchestrator
/// - One external publisher (a court portal or the rules pages)
///
/// Each source implementation must:
/// - Report a stable identity
/// - Find candidate items published within a window
/// - Turn one candidate into a normalized record
///
/// DESIGN GOALS:
/// - Zero source-specific logic outside adapters
/// - One adapter per source
/// - No raw HTML or transport detail crosses this boundary
///
/// THREAD SAFETY:
/// - Must be Send + Sync
/// - Adapter instances are shared (`Arc`) and may run concurrently with
///   other adapters
///
#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Returns the source identity.
    ///
    /// CONTRACT:
    /// - No side effects
    /// - Used as the report label and as the dedup partition
    ///
    fn identify(&self) -> SourceId;

    /// Lists candidates published within the last `days_back` days.
    ///
    /// OUTPUT:
    /// - A finite list; calling again re-queries the source
    /// - Empty when the source cannot be reached. The failure is logged
    ///   here and NOT propagated, so one unreachable portal cannot abort
    ///   a run
    ///
    async fn search_recent(&self, days_back: u32) -> Vec<CandidateRef>;

    /// Fetches and parses one candidate.
    ///
    /// OUTPUT:
    /// - Some(DecisionRecord) with `collected_at == None`
    /// - None when this one item could not be fetched or parsed
    ///
    async fn extract_details(&self, candidate: &CandidateRef) -> Option<DecisionRecord>;

    /// Search followed by detail extraction.
    ///
    /// This is what the orchestrator calls. An `Err` here means the whole
    /// adapter run failed; it is reported for this source only.
    async fn collect(&self, days_back: u32) -> Result<Harvest, SourceError> {
        let candidates = self.search_recent(days_back).await;

        let mut decisions = Vec::with_capacity(candidates.len());
        for candidate in &candidates {
            if let Some(record) = self.extract_details(candidate).await {
                decisions.push(record);
            }
        }

        log::info!(
            "{}: {} of {} candidates extracted",
            self.identify(),
            decisions.len(),
            candidates.len()
        );
        Ok(Harvest::Decisions(decisions))
    }
}
