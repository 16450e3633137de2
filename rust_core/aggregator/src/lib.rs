//! Snapshot builder: pulls Kraken (plus fallback venues) and derives per-symbol signals.

pub mod engine;
pub mod metrics;
pub mod snapshot;

pub use engine::{Aggregator, AggregatorConfig, UniverseStatus};
pub use metrics::{Bias, EntryLevels, Side, WhaleLevel, WhaleSummary};
pub use snapshot::{ScanRow, SignalRow, Snapshot, SymbolRecord};
