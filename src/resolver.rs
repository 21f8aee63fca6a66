//! Per-pair rate resolution.

use crate::core::fx::{Pair, RateOutcome, RateRow, UnresolvedReason};
use crate::core::rate::HistoricalRateProvider;
use rust_decimal::Decimal;
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// A pair together with the row it produced and how that row came about.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub row: RateRow,
    pub outcome: RateOutcome,
}

pub struct RateResolver<'a> {
    provider: &'a dyn HistoricalRateProvider,
    target_currency: &'a str,
    unsupported: &'a BTreeSet<String>,
}

impl<'a> RateResolver<'a> {
    pub fn new(
        provider: &'a dyn HistoricalRateProvider,
        target_currency: &'a str,
        unsupported: &'a BTreeSet<String>,
    ) -> Self {
        RateResolver {
            provider,
            target_currency,
            unsupported,
        }
    }

    /// Resolves a single pair. Never fails: lookup errors become
    /// [`UnresolvedReason::LookupFailed`].
    pub async fn resolve(&self, pair: &Pair) -> RateOutcome {
        let base = pair.base_currency.as_str();
        let target = self.target_currency;

        if self.unsupported.contains(base) {
            debug!("{} is unsupported, skipping lookup", base);
            return RateOutcome::Unresolved(UnresolvedReason::UnsupportedCurrency);
        }
        if base == target {
            return RateOutcome::Resolved(Decimal::ONE);
        }

        match self.provider.historical_rate(pair.date, base, target).await {
            Ok(Some(rate)) => RateOutcome::Resolved(rate),
            Ok(None) => {
                warn!("FX rate missing for {} {}->{}", pair.date, base, target);
                RateOutcome::Unresolved(UnresolvedReason::RateMissing)
            }
            Err(e) => {
                warn!("FX failed for {} {}->{}: {}", pair.date, base, target, e);
                RateOutcome::Unresolved(UnresolvedReason::LookupFailed(e.to_string()))
            }
        }
    }

    /// Resolves `pairs` one after another, preserving their order.
    pub async fn resolve_all<F>(&self, pairs: &[Pair], mut on_progress: F) -> Vec<Resolution>
    where
        F: FnMut(&Pair, &RateOutcome),
    {
        let mut resolutions = Vec::with_capacity(pairs.len());
        for pair in pairs {
            let outcome = self.resolve(pair).await;
            on_progress(pair, &outcome);
            resolutions.push(Resolution {
                row: RateRow::from_outcome(pair, self.target_currency, &outcome),
                outcome,
            });
        }
        resolutions
    }
}
