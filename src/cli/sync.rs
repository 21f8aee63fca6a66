use super::ui;
use crate::core::config::AppConfig;
use crate::core::fx::RateOutcome;
use crate::core::warehouse::Warehouse;
use crate::job::{FxJobConfig, SyncEvent, SyncReport, sync_fx_rates};
use crate::providers::FrankfurterProvider;
use anyhow::Result;
use comfy_table::Cell;
use tracing::info;

impl SyncReport {
    /// One-line summary of the run.
    pub fn display_summary(&self) -> String {
        match self {
            SyncReport::NoPairs { source } => format!(
                "No (date, currency) pairs found in {}. Nothing to write.",
                ui::style_text(&source.to_string(), ui::StyleType::TotalLabel)
            ),
            SyncReport::Completed {
                destination,
                written,
                ..
            } => {
                let unresolved = self.unresolved_count();
                let unresolved_style = if unresolved > 0 {
                    ui::StyleType::Error
                } else {
                    ui::StyleType::Subtle
                };
                let verb = if *written { "Wrote" } else { "Resolved (dry run)" };
                format!(
                    "{} {} rows for {}: {} resolved, {} without rate",
                    verb,
                    self.resolutions().len(),
                    ui::style_text(&destination.to_string(), ui::StyleType::TotalLabel),
                    ui::style_text(&self.resolved_count().to_string(), ui::StyleType::TotalValue),
                    ui::style_text(&unresolved.to_string(), unresolved_style)
                )
            }
        }
    }

    /// Every row with its rate and, for empty rates, why.
    pub fn display_as_table(&self) -> String {
        let mut table = ui::new_styled_table();
        table.set_header(vec![
            ui::header_cell("Date"),
            ui::header_cell("Base"),
            ui::header_cell("Target"),
            ui::header_cell("Rate"),
            ui::header_cell("Note"),
        ]);

        for resolution in self.resolutions() {
            let row = &resolution.row;
            let note = match &resolution.outcome {
                RateOutcome::Resolved(_) => String::new(),
                RateOutcome::Unresolved(reason) => {
                    ui::style_text(&reason.to_string(), ui::StyleType::Subtle)
                }
            };
            table.add_row(vec![
                Cell::new(row.date_string()),
                Cell::new(&row.base_currency),
                Cell::new(&row.target_currency),
                ui::rate_cell(row.rate),
                Cell::new(note),
            ]);
        }

        table.to_string()
    }
}

pub async fn run(
    config: &AppConfig,
    project_id: &str,
    warehouse: &dyn Warehouse,
    dry_run: bool,
) -> Result<()> {
    let provider_config = config.providers.frankfurter.clone().unwrap_or_default();
    let provider = FrankfurterProvider::new(&provider_config)?;

    let mut job = FxJobConfig::from_config(&config.fx, project_id);
    job.dry_run = dry_run;
    info!("PROJECT_ID: {}", project_id);
    info!("SOURCE_TABLE: {}", job.source.table);
    info!("DEST_TABLE: {}", job.destination);

    let pb = ui::new_progress_bar(0);
    let result = sync_fx_rates(&job, warehouse, &provider, |event| match event {
        SyncEvent::Extracted(count) => pb.set_length(count as u64),
        SyncEvent::Resolved(pair, _) => {
            pb.set_message(pair.to_string());
            pb.inc(1);
        }
        SyncEvent::Writing(count) => pb.set_message(format!("Writing {count} rows")),
    })
    .await;
    pb.finish_and_clear();

    let report = result?;
    if dry_run {
        println!("{}\n", report.display_as_table());
    }
    println!("{}", report.display_summary());
    Ok(())
}
