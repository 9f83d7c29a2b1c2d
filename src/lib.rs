// ------------------------------------------------------------
// Module declarations
// ------------------------------------------------------------
//
// Each module represents a well-defined responsibility:
//
// - config:    Configuration structs loaded from JSON
// - schema:    Records, keys and the collection report
// - error:     Typed errors of every layer
// - util:      Text cleanup, Brazilian dates, process numbers
// - metrics:   Process-wide counters
// - fetcher:   HTTP GET with a randomized pause per request
// - sources:   Source adapters and the adapter registry
// - store:     Record persistence (memory, Redis)
// - collector: Runs all sources, deduplicates, persists
// - scheduler: Daily trigger, job table, timer task
// - control:   Caller-facing operations
//
pub mod collector;
pub mod config;
pub mod control;
pub mod error;
pub mod fetcher;
pub mod metrics;
pub mod scheduler;
pub mod schema;
pub mod sources;
pub mod store;
pub mod util;
