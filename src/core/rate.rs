//! Historical FX rate abstractions

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;

#[async_trait]
pub trait HistoricalRateProvider: Send + Sync {
    /// Fetches the `from`→`to` rate published for `date`.
    ///
    /// `Ok(None)` means the provider answered without a rate for `to`.
    async fn historical_rate(&self, date: NaiveDate, from: &str, to: &str)
    -> Result<Option<Decimal>>;
}
