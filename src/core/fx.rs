//! FX domain types shared by the extractor, resolver and writer

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// One (date, base currency) combination that needs a rate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pair {
    pub date: NaiveDate,
    pub base_currency: String,
}

impl Pair {
    pub fn new(date: NaiveDate, base_currency: impl Into<String>) -> Self {
        Pair {
            date,
            base_currency: base_currency.into(),
        }
    }
}

impl Display for Pair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.date.format("%Y-%m-%d"), self.base_currency)
    }
}

/// Why a pair ended up without a rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnresolvedReason {
    /// Base currency is known to be missing from the provider.
    UnsupportedCurrency,
    /// Provider answered but the target currency was not in the response.
    RateMissing,
    /// Network, HTTP or decode failure.
    LookupFailed(String),
}

impl Display for UnresolvedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnresolvedReason::UnsupportedCurrency => write!(f, "unsupported currency"),
            UnresolvedReason::RateMissing => write!(f, "rate missing from response"),
            UnresolvedReason::LookupFailed(msg) => write!(f, "lookup failed: {msg}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateOutcome {
    Resolved(Decimal),
    Unresolved(UnresolvedReason),
}

impl RateOutcome {
    pub fn rate(&self) -> Option<Decimal> {
        match self {
            RateOutcome::Resolved(rate) => Some(*rate),
            RateOutcome::Unresolved(_) => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, RateOutcome::Resolved(_))
    }
}

/// A single row of the destination rate table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateRow {
    #[serde(with = "date_format")]
    pub date: NaiveDate,
    pub base_currency: String,
    pub target_currency: String,
    pub rate: Option<Decimal>,
}

impl RateRow {
    pub fn from_outcome(pair: &Pair, target_currency: &str, outcome: &RateOutcome) -> Self {
        RateRow {
            date: pair.date,
            base_currency: pair.base_currency.clone(),
            target_currency: target_currency.to_string(),
            rate: outcome.rate(),
        }
    }

    /// Date in the `YYYY-MM-DD` form stored in the destination table.
    pub fn date_string(&self) -> String {
        self.date.format(date_format::FORMAT).to_string()
    }
}

pub(crate) mod date_format {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%d";

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&date.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let s = String::deserialize(deserializer)?;
        NaiveDate::parse_from_str(&s, FORMAT).map_err(serde::de::Error::custom)
    }
}

/// Parses a warehouse date cell. Accepts plain dates as well as timestamps,
/// keeping only the calendar date.
pub fn parse_date_cell(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, date_format::FORMAT)
        .ok()
        .or_else(|| {
            value
                .get(..10)
                .and_then(|prefix| NaiveDate::parse_from_str(prefix, date_format::FORMAT).ok())
        })
}
