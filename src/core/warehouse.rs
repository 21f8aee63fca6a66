//! Warehouse abstractions

use crate::core::fx::{Pair, RateRow};
use anyhow::{Result, bail};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt::Display;
use std::str::FromStr;

/// A single warehouse row keyed by column name.
pub type Record = Map<String, Value>;

/// Fully qualified `project.dataset.table` reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub project_id: String,
    pub dataset_id: String,
    pub table_id: String,
}

impl TableRef {
    pub fn new(project_id: &str, dataset_id: &str, table_id: &str) -> Self {
        TableRef {
            project_id: project_id.to_string(),
            dataset_id: dataset_id.to_string(),
            table_id: table_id.to_string(),
        }
    }
}

impl Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.project_id, self.dataset_id, self.table_id)
    }
}

impl FromStr for TableRef {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('.').collect();
        match parts.as_slice() {
            [project, dataset, table]
                if !project.is_empty() && !dataset.is_empty() && !table.is_empty() =>
            {
                Ok(TableRef::new(project, dataset, table))
            }
            _ => bail!("Invalid table reference: {s} (expected project.dataset.table)"),
        }
    }
}

/// Where to find the (date, currency) columns of the source table.
#[derive(Debug, Clone)]
pub struct PairSource {
    pub table: TableRef,
    pub date_column: String,
    pub currency_column: String,
}

/// Equality filter on a single column.
#[derive(Debug, Clone)]
pub struct ColumnFilter {
    pub column: String,
    pub value: String,
}

#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Distinct (date, currency) pairs of `source`, ignoring rows where either is null.
    async fn distinct_pairs(&self, source: &PairSource) -> Result<Vec<Pair>>;

    /// All rows of `table` matching `filter`.
    async fn select_where(&self, table: &TableRef, filter: &ColumnFilter) -> Result<Vec<Record>>;

    /// Atomically replaces the full contents of `table` with `rows`.
    async fn replace_table(&self, table: &TableRef, rows: &[RateRow]) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_ref_parse() {
        let table: TableRef = "my-project.patek_data.fx_rates".parse().unwrap();
        assert_eq!(table.project_id, "my-project");
        assert_eq!(table.dataset_id, "patek_data");
        assert_eq!(table.table_id, "fx_rates");
        assert_eq!(table.to_string(), "my-project.patek_data.fx_rates");

        assert!("patek_data.fx_rates".parse::<TableRef>().is_err());
        assert!("a..c".parse::<TableRef>().is_err());
        assert!("a.b.c.d".parse::<TableRef>().is_err());
    }
}
