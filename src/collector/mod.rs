/// Collector module
///
/// This module groups all logic responsible for:
/// - Running every registered source adapter
/// - Isolating one source's failure from the others
/// - Deduplicating and persisting each adapter's harvest
///
/// The collector layer acts as the orchestration layer between:
/// - Source adapters (court portals, enunciado pages)
/// - The record store
///
/// Design notes:
/// - Source-specific logic MUST NOT live here
/// - Owns no persistent state; everything goes through `persist`
/// - A run always completes and returns a report
pub mod persist;
pub mod runner;

pub use runner::Collector;
