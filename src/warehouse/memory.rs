use crate::core::fx::{Pair, RateRow, parse_date_cell};
use crate::core::warehouse::{ColumnFilter, PairSource, Record, TableRef, Warehouse};
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// In-memory warehouse keyed by table reference
pub struct MemoryWarehouse {
    tables: Mutex<HashMap<TableRef, Vec<Record>>>,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
            writes: AtomicUsize::new(0),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Seeds `table` with `records`, replacing anything already there.
    pub fn with_table(mut self, table: TableRef, records: Vec<Record>) -> Self {
        self.tables.get_mut().insert(table, records);
        self
    }

    pub async fn table(&self, table: &TableRef) -> Option<Vec<Record>> {
        self.tables.lock().await.get(table).cloned()
    }

    /// Reads `table` back as rate rows.
    pub async fn rate_rows(&self, table: &TableRef) -> Result<Vec<RateRow>> {
        let records = self
            .table(table)
            .await
            .with_context(|| format!("Table not found: {table}"))?;
        records
            .into_iter()
            .map(|r| serde_json::from_value(Value::Object(r)).map_err(anyhow::Error::from))
            .collect()
    }

    /// Number of successful `replace_table` calls.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Makes every following `replace_table` call fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl Default for MemoryWarehouse {
    fn default() -> Self {
        Self::new()
    }
}

fn cell_as_str(record: &Record, column: &str) -> Option<String> {
    match record.get(column)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    async fn distinct_pairs(&self, source: &PairSource) -> Result<Vec<Pair>> {
        let tables = self.tables.lock().await;
        let records = tables
            .get(&source.table)
            .with_context(|| format!("Table not found: {}", source.table))?;

        let mut pairs = BTreeSet::new();
        for record in records {
            let (Some(date), Some(currency)) = (
                cell_as_str(record, &source.date_column),
                cell_as_str(record, &source.currency_column),
            ) else {
                continue;
            };
            match parse_date_cell(&date) {
                Some(date) => {
                    pairs.insert(Pair::new(date, currency));
                }
                None => warn!("Skipping row with unparseable date: {}", date),
            }
        }
        debug!("Extracted {} distinct pairs from {}", pairs.len(), source.table);
        Ok(pairs.into_iter().collect())
    }

    async fn select_where(&self, table: &TableRef, filter: &ColumnFilter) -> Result<Vec<Record>> {
        let tables = self.tables.lock().await;
        let records = tables
            .get(table)
            .with_context(|| format!("Table not found: {table}"))?;
        Ok(records
            .iter()
            .filter(|r| cell_as_str(r, &filter.column).as_deref() == Some(filter.value.as_str()))
            .cloned()
            .collect())
    }

    async fn replace_table(&self, table: &TableRef, rows: &[RateRow]) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("Write to {table} rejected");
        }

        let records = rows
            .iter()
            .map(|row| -> Result<Record> {
                match serde_json::to_value(row)? {
                    Value::Object(record) => Ok(record),
                    other => bail!("Unexpected row encoding: {other}"),
                }
            })
            .collect::<Result<Vec<_>>>()?;

        self.tables.lock().await.insert(table.clone(), records);
        self.writes.fetch_add(1, Ordering::SeqCst);
        debug!("Replaced {} with {} rows", table, rows.len());
        Ok(())
    }
}
