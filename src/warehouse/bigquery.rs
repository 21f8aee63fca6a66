//! BigQuery REST (v2) implementation of [`Warehouse`].
//!
//! Reads go through `jobs.query` / `getQueryResults`. The rate table is
//! replaced by a single query job that selects from an array-of-struct
//! parameter with `WRITE_TRUNCATE`, so the swap is atomic on BigQuery's side.

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::core::config::BigQueryConfig;
use crate::core::fx::{Pair, RateRow, parse_date_cell};
use crate::core::warehouse::{ColumnFilter, PairSource, Record, TableRef, Warehouse};

pub struct BigQueryWarehouse {
    base_url: String,
    project_id: String,
    access_token: Option<String>,
    location: Option<String>,
    query_timeout_ms: u64,
    poll_interval: Duration,
    max_polls: u32,
    client: reqwest::Client,
}

impl BigQueryWarehouse {
    pub fn new(
        config: &BigQueryConfig,
        project_id: &str,
        access_token: Option<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("fxsync/1.0")
            .build()?;

        Ok(BigQueryWarehouse {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            project_id: project_id.to_string(),
            access_token,
            location: config.location.clone(),
            query_timeout_ms: config.query_timeout_ms,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            max_polls: config.max_polls,
            client,
        })
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<T> {
        let request = match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request
            .send()
            .await
            .map_err(|e| anyhow!("Request error: {} during {}", e, what))?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&text)
                .map(|e| e.error.message)
                .unwrap_or(text);
            bail!("BigQuery HTTP error: {} during {}: {}", status, what, message);
        }

        serde_json::from_str(&text)
            .map_err(|e| anyhow!("Failed to parse BigQuery response during {}: {}", what, e))
    }

    /// Runs `sql` and materializes every result page.
    async fn run_query(&self, sql: &str, parameters: Vec<QueryParameter>) -> Result<QueryResults> {
        let url = format!("{}/projects/{}/queries", self.base_url, self.project_id);
        let request = QueryRequest {
            query: sql,
            use_legacy_sql: false,
            timeout_ms: self.query_timeout_ms,
            location: self.location.as_deref(),
            parameter_mode: (!parameters.is_empty()).then_some("NAMED"),
            query_parameters: parameters,
        };
        debug!("Running query: {}", sql);

        let mut response: QueryResponse = self
            .send(self.client.post(&url).json(&request), "query")
            .await?;

        let mut results = QueryResults::default();
        let mut polls = 0;
        loop {
            if response.job_complete {
                if results.fields.is_empty() {
                    if let Some(schema) = response.schema.take() {
                        results.fields = schema.fields.into_iter().map(|f| f.name).collect();
                    }
                }
                let rows = response.rows.drain(..);
                results
                    .rows
                    .extend(rows.map(|row| row.f.into_iter().map(|c| c.v).collect()));
                if response.page_token.is_none() {
                    break;
                }
            } else {
                polls += 1;
                if polls > self.max_polls {
                    bail!("Query did not complete after {} polls", self.max_polls);
                }
                debug!("Query still running, poll {}/{}", polls, self.max_polls);
            }

            let job = response
                .job_reference
                .clone()
                .context("Query response is missing its job reference")?;
            let page_token = response.page_token.take();
            response = self.query_results(&job, page_token.as_deref()).await?;
        }

        debug!("Query returned {} rows", results.rows.len());
        Ok(results)
    }

    async fn query_results(
        &self,
        job: &JobReference,
        page_token: Option<&str>,
    ) -> Result<QueryResponse> {
        let mut params = vec![("timeoutMs", self.query_timeout_ms.to_string())];
        if let Some(location) = job.location.as_ref().or(self.location.as_ref()) {
            params.push(("location", location.clone()));
        }
        if let Some(token) = page_token {
            params.push(("pageToken", token.to_string()));
        }
        let url = Url::parse_with_params(
            &format!(
                "{}/projects/{}/queries/{}",
                self.base_url, job.project_id, job.job_id
            ),
            &params,
        )?;

        self.send(self.client.get(url), "getQueryResults").await
    }

    async fn wait_for_job(&self, mut job: Job) -> Result<Job> {
        let mut polls = 0;
        while !job.is_done() {
            polls += 1;
            if polls > self.max_polls {
                bail!(
                    "Job {} did not finish after {} polls",
                    job.job_reference.job_id,
                    self.max_polls
                );
            }
            tokio::time::sleep(self.poll_interval).await;

            let reference = &job.job_reference;
            let mut params = Vec::new();
            if let Some(location) = reference.location.as_ref().or(self.location.as_ref()) {
                params.push(("location", location.clone()));
            }
            let url = Url::parse_with_params(
                &format!(
                    "{}/projects/{}/jobs/{}",
                    self.base_url, reference.project_id, reference.job_id
                ),
                &params,
            )?;
            job = self.send(self.client.get(url), "jobs.get").await?;
        }
        Ok(job)
    }
}

/// Wraps an identifier in backticks for standard SQL.
fn quote_ident(name: &str) -> Result<String> {
    if name.is_empty() || name.contains('`') {
        bail!("Invalid identifier: {name:?}");
    }
    Ok(format!("`{name}`"))
}

fn distinct_pairs_sql(source: &PairSource) -> Result<String> {
    let table = quote_ident(&source.table.to_string())?;
    let date = quote_ident(&source.date_column)?;
    let currency = quote_ident(&source.currency_column)?;
    Ok(format!(
        "SELECT DISTINCT DATE({date}) AS date, {currency} AS currency \
         FROM {table} \
         WHERE {date} IS NOT NULL AND {currency} IS NOT NULL"
    ))
}

fn string_param(name: &str, value: &str) -> QueryParameter {
    QueryParameter {
        name: name.to_string(),
        parameter_type: ParameterType::scalar("STRING"),
        parameter_value: ParameterValue::scalar(Some(value.to_string())),
    }
}

/// Encodes the rate rows as an `ARRAY<STRUCT<...>>` query parameter.
fn rows_param(rows: &[RateRow]) -> QueryParameter {
    let struct_types = ["date", "base_currency", "target_currency"]
        .into_iter()
        .map(|name| StructType {
            name: name.to_string(),
            kind: ParameterType::scalar("STRING"),
        })
        .chain(std::iter::once(StructType {
            name: "rate".to_string(),
            kind: ParameterType::scalar("FLOAT64"),
        }))
        .collect();

    let array_values = rows
        .iter()
        .map(|row| ParameterValue {
            struct_values: Some(BTreeMap::from([
                ("date".to_string(), ParameterValue::scalar(Some(row.date_string()))),
                (
                    "base_currency".to_string(),
                    ParameterValue::scalar(Some(row.base_currency.clone())),
                ),
                (
                    "target_currency".to_string(),
                    ParameterValue::scalar(Some(row.target_currency.clone())),
                ),
                (
                    "rate".to_string(),
                    ParameterValue::scalar(row.rate.map(|r| r.to_string())),
                ),
            ])),
            ..Default::default()
        })
        .collect();

    QueryParameter {
        name: "rows".to_string(),
        parameter_type: ParameterType {
            kind: "ARRAY".to_string(),
            array_type: Some(Box::new(ParameterType {
                kind: "STRUCT".to_string(),
                array_type: None,
                struct_types: Some(struct_types),
            })),
            struct_types: None,
        },
        parameter_value: ParameterValue {
            array_values: Some(array_values),
            ..Default::default()
        },
    }
}

/// Client-side job id: UTC timestamp plus a random suffix.
fn new_job_id() -> String {
    format!(
        "fxsync_{}_{:08x}",
        Utc::now().format("%Y%m%d%H%M%S%3f"),
        rand::random::<u32>()
    )
}

const REPLACE_ROWS_SQL: &str =
    "SELECT date, base_currency, target_currency, rate FROM UNNEST(@rows)";

#[async_trait]
impl Warehouse for BigQueryWarehouse {
    #[instrument(name = "BigQueryDistinctPairs", skip_all, fields(table = %source.table))]
    async fn distinct_pairs(&self, source: &PairSource) -> Result<Vec<Pair>> {
        let sql = distinct_pairs_sql(source)?;
        let results = self.run_query(&sql, Vec::new()).await?;

        let mut pairs = BTreeSet::new();
        for row in results.rows {
            let (Some(Value::String(date)), Some(Value::String(currency))) =
                (row.first(), row.get(1))
            else {
                continue;
            };
            match parse_date_cell(date) {
                Some(date) => {
                    pairs.insert(Pair::new(date, currency.as_str()));
                }
                None => warn!("Skipping row with unparseable date: {}", date),
            }
        }
        Ok(pairs.into_iter().collect())
    }

    #[instrument(name = "BigQuerySelect", skip_all, fields(table = %table))]
    async fn select_where(&self, table: &TableRef, filter: &ColumnFilter) -> Result<Vec<Record>> {
        let sql = format!(
            "SELECT * FROM {} WHERE {} = @value",
            quote_ident(&table.to_string())?,
            quote_ident(&filter.column)?
        );
        let results = self
            .run_query(&sql, vec![string_param("value", &filter.value)])
            .await?;

        Ok(results
            .rows
            .into_iter()
            .map(|row| results.fields.iter().cloned().zip(row).collect())
            .collect())
    }

    #[instrument(
        name = "BigQueryReplaceTable",
        skip_all,
        fields(table = %table, rows = rows.len())
    )]
    async fn replace_table(&self, table: &TableRef, rows: &[RateRow]) -> Result<()> {
        let url = format!("{}/projects/{}/jobs", self.base_url, self.project_id);
        let request = JobRequest {
            job_reference: NewJobReference {
                project_id: self.project_id.clone(),
                job_id: new_job_id(),
                location: self.location.clone(),
            },
            configuration: JobConfiguration {
                query: JobQuery {
                    query: REPLACE_ROWS_SQL.to_string(),
                    use_legacy_sql: false,
                    parameter_mode: "NAMED".to_string(),
                    query_parameters: vec![rows_param(rows)],
                    destination_table: TableReference {
                        project_id: table.project_id.clone(),
                        dataset_id: table.dataset_id.clone(),
                        table_id: table.table_id.clone(),
                    },
                    write_disposition: "WRITE_TRUNCATE".to_string(),
                    create_disposition: "CREATE_IF_NEEDED".to_string(),
                },
            },
        };

        let job: Job = self
            .send(self.client.post(&url).json(&request), "jobs.insert")
            .await?;
        debug!("Submitted job {}", job.job_reference.job_id);

        let job = self.wait_for_job(job).await?;
        if let Some(error) = job.status.and_then(|s| s.error_result) {
            bail!(
                "Load into {} failed: {}",
                table,
                error.message.unwrap_or_else(|| error.reason.unwrap_or_default())
            );
        }

        info!("Replaced {} with {} rows", table, rows.len());
        Ok(())
    }
}

#[derive(Debug, Default)]
struct QueryResults {
    fields: Vec<String>,
    rows: Vec<Vec<Value>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    query: &'a str,
    use_legacy_sql: bool,
    timeout_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameter_mode: Option<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    query_parameters: Vec<QueryParameter>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryParameter {
    name: String,
    parameter_type: ParameterType,
    parameter_value: ParameterValue,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ParameterType {
    #[serde(rename = "type")]
    kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    array_type: Option<Box<ParameterType>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    struct_types: Option<Vec<StructType>>,
}

impl ParameterType {
    fn scalar(kind: &str) -> Self {
        ParameterType {
            kind: kind.to_string(),
            array_type: None,
            struct_types: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct StructType {
    name: String,
    #[serde(rename = "type")]
    kind: ParameterType,
}

#[derive(Debug, Serialize, Default)]
#[serde(rename_all = "camelCase")]
struct ParameterValue {
    /// Absent for SQL NULL.
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    array_values: Option<Vec<ParameterValue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    struct_values: Option<BTreeMap<String, ParameterValue>>,
}

impl ParameterValue {
    fn scalar(value: Option<String>) -> Self {
        ParameterValue {
            value,
            ..Default::default()
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    job_reference: Option<JobReference>,
    schema: Option<TableSchema>,
    #[serde(default)]
    rows: Vec<TableRow>,
    page_token: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    project_id: String,
    job_id: String,
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TableSchema {
    #[serde(default)]
    fields: Vec<FieldSchema>,
}

#[derive(Debug, Deserialize)]
struct FieldSchema {
    name: String,
}

#[derive(Debug, Deserialize)]
struct TableRow {
    #[serde(default)]
    f: Vec<TableCell>,
}

#[derive(Debug, Deserialize)]
struct TableCell {
    #[serde(default)]
    v: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JobRequest {
    job_reference: NewJobReference,
    configuration: JobConfiguration,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NewJobReference {
    project_id: String,
    job_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<String>,
}

#[derive(Debug, Serialize)]
struct JobConfiguration {
    query: JobQuery,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JobQuery {
    query: String,
    use_legacy_sql: bool,
    parameter_mode: String,
    query_parameters: Vec<QueryParameter>,
    destination_table: TableReference,
    write_disposition: String,
    create_disposition: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TableReference {
    project_id: String,
    dataset_id: String,
    table_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Job {
    job_reference: JobReference,
    status: Option<JobStatus>,
}

impl Job {
    fn is_done(&self) -> bool {
        self.status.as_ref().is_some_and(|s| s.state == "DONE")
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatus {
    state: String,
    error_result: Option<ErrorProto>,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    reason: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}
