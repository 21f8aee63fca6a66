//! Core business logic abstractions

pub mod config;
pub mod fx;
pub mod log;
pub mod rate;
pub mod warehouse;

// Re-export main types for cleaner imports
pub use fx::{Pair, RateOutcome, RateRow, UnresolvedReason};
pub use rate::HistoricalRateProvider;
pub use warehouse::{ColumnFilter, PairSource, Record, TableRef, Warehouse};
