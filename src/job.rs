//! The FX-rate sync job: extract pairs, resolve rates, overwrite the rate table.

use crate::core::config::FxConfig;
use crate::core::fx::{Pair, RateOutcome, RateRow};
use crate::core::rate::HistoricalRateProvider;
use crate::core::warehouse::{PairSource, TableRef, Warehouse};
use crate::resolver::{RateResolver, Resolution};
use anyhow::{Context, Result};
use std::collections::BTreeSet;
use tracing::{info, instrument};

/// Everything a single run needs, resolved once up front.
#[derive(Debug, Clone)]
pub struct FxJobConfig {
    pub source: PairSource,
    pub destination: TableRef,
    pub target_currency: String,
    pub unsupported_currencies: BTreeSet<String>,
    /// Resolve rates but skip the write.
    pub dry_run: bool,
}

impl FxJobConfig {
    pub fn from_config(fx: &FxConfig, project_id: &str) -> Self {
        FxJobConfig {
            source: PairSource {
                table: TableRef::new(project_id, &fx.dataset, &fx.source_table),
                date_column: fx.date_column.clone(),
                currency_column: fx.currency_column.clone(),
            },
            destination: TableRef::new(project_id, &fx.dataset, &fx.destination_table),
            target_currency: fx.target_currency.trim().to_string(),
            unsupported_currencies: fx
                .unsupported_currencies
                .iter()
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect(),
            dry_run: false,
        }
    }
}

/// Progress notifications emitted while the job runs.
#[derive(Debug)]
pub enum SyncEvent<'a> {
    Extracted(usize),
    Resolved(&'a Pair, &'a RateOutcome),
    Writing(usize),
}

#[derive(Debug)]
pub enum SyncReport {
    /// The source had no pairs; the destination was left untouched.
    NoPairs { source: TableRef },
    Completed {
        destination: TableRef,
        resolutions: Vec<Resolution>,
        written: bool,
    },
}

impl SyncReport {
    pub fn resolutions(&self) -> &[Resolution] {
        match self {
            SyncReport::NoPairs { .. } => &[],
            SyncReport::Completed { resolutions, .. } => resolutions,
        }
    }

    pub fn rows(&self) -> Vec<RateRow> {
        self.resolutions().iter().map(|r| r.row.clone()).collect()
    }

    pub fn resolved_count(&self) -> usize {
        self.resolutions()
            .iter()
            .filter(|r| r.outcome.is_resolved())
            .count()
    }

    pub fn unresolved_count(&self) -> usize {
        self.resolutions().len() - self.resolved_count()
    }

    pub fn written(&self) -> bool {
        matches!(self, SyncReport::Completed { written: true, .. })
    }
}

/// Runs the sync job.
///
/// An empty extraction ends the run before any write so the destination is
/// never truncated to nothing. Lookup failures only blank the affected rows;
/// extraction and write failures abort the run.
#[instrument(
    name = "SyncFxRates",
    skip_all,
    fields(source = %config.source.table, destination = %config.destination)
)]
pub async fn sync_fx_rates<F>(
    config: &FxJobConfig,
    warehouse: &dyn Warehouse,
    provider: &dyn HistoricalRateProvider,
    mut on_event: F,
) -> Result<SyncReport>
where
    F: FnMut(SyncEvent<'_>),
{
    let pairs = warehouse
        .distinct_pairs(&config.source)
        .await
        .with_context(|| format!("Failed to extract pairs from {}", config.source.table))?;
    info!("Pairs fetched: {}", pairs.len());
    on_event(SyncEvent::Extracted(pairs.len()));

    if pairs.is_empty() {
        info!("No (date, currency) pairs found. Nothing to write.");
        return Ok(SyncReport::NoPairs {
            source: config.source.table.clone(),
        });
    }

    let resolver = RateResolver::new(
        provider,
        &config.target_currency,
        &config.unsupported_currencies,
    );
    let resolutions = resolver
        .resolve_all(&pairs, |pair, outcome| {
            on_event(SyncEvent::Resolved(pair, outcome))
        })
        .await;

    let rows: Vec<RateRow> = resolutions.iter().map(|r| r.row.clone()).collect();
    info!("Rows to write: {}", rows.len());

    if config.dry_run {
        info!("Dry run, skipping write to {}", config.destination);
        return Ok(SyncReport::Completed {
            destination: config.destination.clone(),
            resolutions,
            written: false,
        });
    }

    on_event(SyncEvent::Writing(rows.len()));
    warehouse
        .replace_table(&config.destination, &rows)
        .await
        .with_context(|| format!("Failed to write rates to {}", config.destination))?;
    info!(
        "FX table updated successfully: {} ({} rows)",
        config.destination,
        rows.len()
    );

    Ok(SyncReport::Completed {
        destination: config.destination.clone(),
        resolutions,
        written: true,
    })
}
