//! Loads the brand-filtered slice of the pricing dataset.

use crate::core::config::PriceSliceConfig;
use crate::core::warehouse::{ColumnFilter, Record, TableRef, Warehouse};
use anyhow::{Context, Result};
use tracing::info;

pub async fn load_price_slice(
    warehouse: &dyn Warehouse,
    config: &PriceSliceConfig,
) -> Result<Vec<Record>> {
    let table: TableRef = config.table.parse()?;
    let filter = ColumnFilter {
        column: config.column.clone(),
        value: config.value.clone(),
    };

    let records = warehouse
        .select_where(&table, &filter)
        .await
        .with_context(|| {
            format!(
                "Failed to load {} = {:?} from {}",
                filter.column, filter.value, table
            )
        })?;

    if records.is_empty() {
        info!("No data found for this query.");
    } else {
        info!("Retrieved {} rows from {}", records.len(), table);
    }
    Ok(records)
}
