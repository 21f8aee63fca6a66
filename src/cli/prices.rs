use super::ui;
use crate::core::config::AppConfig;
use crate::core::warehouse::{Record, Warehouse};
use crate::prices::load_price_slice;
use anyhow::Result;
use comfy_table::Cell;
use serde_json::Value;

/// Renders the first `limit` records, using the column order of the first record.
pub fn display_preview(records: &[Record], limit: usize) -> String {
    let Some(first) = records.first() else {
        return ui::style_text("No data found for this query.", ui::StyleType::Subtle);
    };
    let columns: Vec<&String> = first.keys().collect();

    let mut table = ui::new_styled_table();
    table.set_header(columns.iter().map(|c| ui::header_cell(c)).collect::<Vec<_>>());
    for record in records.iter().take(limit) {
        table.add_row(
            columns
                .iter()
                .map(|c| match record.get(c.as_str()) {
                    None | Some(Value::Null) => ui::na_cell(false),
                    Some(Value::String(s)) => Cell::new(s),
                    Some(other) => Cell::new(other.to_string()),
                })
                .collect::<Vec<_>>(),
        );
    }

    let mut output = table.to_string();
    if records.len() > limit {
        output.push_str(&format!(
            "\n{}",
            ui::style_text(
                &format!("... {} more rows", records.len() - limit),
                ui::StyleType::Subtle
            )
        ));
    }
    output
}

pub async fn run(config: &AppConfig, warehouse: &dyn Warehouse, limit: usize) -> Result<()> {
    let records = load_price_slice(warehouse, &config.prices).await?;

    println!(
        "Pricing slice: {}\n",
        ui::style_text(
            &format!("{} = {}", config.prices.column, config.prices.value),
            ui::StyleType::Title
        )
    );
    println!("{}", display_preview(&records, limit));
    println!(
        "\nRetrieved {} rows",
        ui::style_text(&records.len().to_string(), ui::StyleType::TotalValue)
    );
    Ok(())
}
