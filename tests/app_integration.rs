use fxsync::core::config::{AppConfig, BigQueryConfig, FrankfurterProviderConfig, PROJECT_ID_ENV};
use serde_json::{Value, json};
use std::fs;
use tracing::{error, info};

// Adds automatic logging to test
mod test_utils {
    use serde_json::{Value, json};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub const PROJECT: &str = "my-project";

    pub async fn mount_pairs(server: &MockServer, pairs: &[(&str, &str)]) {
        let rows: Vec<Value> = pairs
            .iter()
            .map(|(date, ccy)| json!({"f": [{"v": date}, {"v": ccy}]}))
            .collect();

        Mock::given(method("POST"))
            .and(path(format!("/projects/{PROJECT}/queries")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jobComplete": true,
                "jobReference": {"projectId": PROJECT, "jobId": "query_1"},
                "schema": {"fields": [{"name": "date"}, {"name": "currency"}]},
                "rows": rows
            })))
            .mount(server)
            .await;
    }

    pub async fn mount_rate(server: &MockServer, date: &str, from: &str, body: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/{date}")))
            .and(query_param("from", from))
            .and(query_param("to", "EUR"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(1)
            .mount(server)
            .await;
    }

    pub async fn mount_load_job(server: &MockServer, response: ResponseTemplate, times: u64) {
        Mock::given(method("POST"))
            .and(path(format!("/projects/{PROJECT}/jobs")))
            .respond_with(response)
            .expect(times)
            .mount(server)
            .await;
    }

    pub fn done_job() -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "jobReference": {"projectId": PROJECT, "jobId": "load_1"},
            "status": {"state": "DONE"}
        }))
    }
}

fn config_for(server: &wiremock::MockServer) -> AppConfig {
    let mut config = AppConfig::default();
    config.providers.frankfurter = Some(FrankfurterProviderConfig {
        base_url: server.uri(),
        timeout_secs: 5,
        retries: 0,
        retry_delay_ms: 1,
        min_interval_ms: 0,
    });
    config.warehouse.bigquery = Some(BigQueryConfig {
        base_url: server.uri(),
        poll_interval_ms: 1,
        max_polls: 3,
        ..Default::default()
    });
    config
}

/// Body of the single load job submitted to the mock warehouse.
async fn submitted_rows(server: &wiremock::MockServer) -> Vec<Value> {
    let requests = server.received_requests().await.unwrap_or_default();
    let job = requests
        .iter()
        .find(|r| r.url.path().ends_with("/jobs"))
        .expect("No load job was submitted");
    let body: Value = serde_json::from_slice(&job.body).expect("Job body is not JSON");
    body["configuration"]["query"]["queryParameters"][0]["parameterValue"]["arrayValues"]
        .as_array()
        .cloned()
        .unwrap_or_default()
}

#[test_log::test(tokio::test)]
async fn test_full_sync_flow_with_mock() {
    let mock_server = wiremock::MockServer::start().await;
    test_utils::mount_pairs(
        &mock_server,
        &[
            ("2023-01-02", "USD"),
            ("2023-01-02", "EUR"),
            ("2023-01-02", "TWD"),
        ],
    )
    .await;
    test_utils::mount_rate(
        &mock_server,
        "2023-01-02",
        "USD",
        r#"{"amount":1.0,"base":"USD","date":"2023-01-02","rates":{"EUR":0.93}}"#,
    )
    .await;
    test_utils::mount_load_job(&mock_server, test_utils::done_job(), 1).await;

    let config = config_for(&mock_server);
    let result = fxsync::run_with(
        fxsync::AppCommand::Sync { dry_run: false },
        &config,
        test_utils::PROJECT,
        Some("token".to_string()),
    )
    .await;
    assert!(result.is_ok(), "Sync failed with: {:?}", result.err());

    let mut rows: Vec<(String, Value)> = submitted_rows(&mock_server)
        .await
        .iter()
        .map(|v| {
            let s = &v["structValues"];
            assert_eq!(s["target_currency"]["value"], "EUR");
            assert_eq!(s["date"]["value"], "2023-01-02");
            (
                s["base_currency"]["value"].as_str().unwrap_or_default().to_string(),
                s["rate"].clone(),
            )
        })
        .collect();
    rows.sort_by(|a, b| a.0.cmp(&b.0));
    info!(?rows, "Rows submitted to warehouse");

    assert_eq!(
        rows,
        vec![
            ("EUR".to_string(), json!({"value": "1"})),
            ("TWD".to_string(), json!({})),
            ("USD".to_string(), json!({"value": "0.93"})),
        ]
    );
}

#[test_log::test(tokio::test)]
async fn test_empty_source_skips_write() {
    let mock_server = wiremock::MockServer::start().await;
    test_utils::mount_pairs(&mock_server, &[]).await;
    test_utils::mount_load_job(&mock_server, test_utils::done_job(), 0).await;

    let config = config_for(&mock_server);
    let result = fxsync::run_with(
        fxsync::AppCommand::Sync { dry_run: false },
        &config,
        test_utils::PROJECT,
        None,
    )
    .await;
    assert!(result.is_ok(), "Sync failed with: {:?}", result.err());
}

#[test_log::test(tokio::test)]
async fn test_dry_run_skips_write() {
    let mock_server = wiremock::MockServer::start().await;
    test_utils::mount_pairs(&mock_server, &[("2023-01-02", "USD")]).await;
    test_utils::mount_rate(&mock_server, "2023-01-02", "USD", r#"{"rates":{"EUR":0.93}}"#).await;
    test_utils::mount_load_job(&mock_server, test_utils::done_job(), 0).await;

    let config = config_for(&mock_server);
    let result = fxsync::run_with(
        fxsync::AppCommand::Sync { dry_run: true },
        &config,
        test_utils::PROJECT,
        None,
    )
    .await;
    assert!(result.is_ok(), "Dry run failed with: {:?}", result.err());
}

#[test_log::test(tokio::test)]
async fn test_provider_failure_does_not_abort_run() {
    let mock_server = wiremock::MockServer::start().await;
    test_utils::mount_pairs(&mock_server, &[("2023-01-02", "USD"), ("2023-01-02", "GBP")]).await;
    test_utils::mount_rate(&mock_server, "2023-01-02", "USD", r#"{"rates":{}}"#).await;
    wiremock::Mock::given(wiremock::matchers::method("GET"))
        .and(wiremock::matchers::query_param("from", "GBP"))
        .respond_with(wiremock::ResponseTemplate::new(500))
        .expect(1)
        .mount(&mock_server)
        .await;
    test_utils::mount_load_job(&mock_server, test_utils::done_job(), 1).await;

    let config = config_for(&mock_server);
    let result = fxsync::run_with(
        fxsync::AppCommand::Sync { dry_run: false },
        &config,
        test_utils::PROJECT,
        None,
    )
    .await;
    assert!(result.is_ok(), "Sync failed with: {:?}", result.err());

    let rows = submitted_rows(&mock_server).await;
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r["structValues"]["rate"] == json!({})));
}

#[test_log::test(tokio::test)]
async fn test_load_failure_fails_run() {
    let mock_server = wiremock::MockServer::start().await;
    test_utils::mount_pairs(&mock_server, &[("2023-01-02", "EUR")]).await;
    test_utils::mount_load_job(
        &mock_server,
        wiremock::ResponseTemplate::new(500)
            .set_body_json(json!({"error": {"code": 500, "message": "Backend error"}})),
        1,
    )
    .await;

    let config = config_for(&mock_server);
    let result = fxsync::run_with(
        fxsync::AppCommand::Sync { dry_run: false },
        &config,
        test_utils::PROJECT,
        None,
    )
    .await;

    let err = result.expect_err("Load failure should fail the run");
    error!("Run failed as expected: {err:#}");
    assert!(format!("{err:#}").contains("Backend error"));
}

#[test_log::test(tokio::test)]
async fn test_prices_flow_with_mock() {
    let mock_server = wiremock::MockServer::start().await;
    wiremock::Mock::given(wiremock::matchers::method("POST"))
        .and(wiremock::matchers::path("/projects/my-project/queries"))
        .and(wiremock::matchers::body_partial_json(json!({
            "queryParameters": [{"name": "value", "parameterValue": {"value": "Patek Philippe"}}]
        })))
        .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(json!({
            "jobComplete": true,
            "schema": {"fields": [{"name": "brand"}, {"name": "model"}]},
            "rows": [{"f": [{"v": "Patek Philippe"}, {"v": "Nautilus 5711"}]}]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = config_for(&mock_server);
    let result = fxsync::run_with(
        fxsync::AppCommand::Prices { limit: 5 },
        &config,
        test_utils::PROJECT,
        None,
    )
    .await;
    assert!(result.is_ok(), "Prices failed with: {:?}", result.err());
}

#[test_log::test(tokio::test)]
async fn test_run_command_with_invalid_config() {
    let config_file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
    fs::write(config_file.path(), "fx: [not, a, mapping]").expect("Failed to write config file");

    let result = fxsync::run_command(
        fxsync::AppCommand::Sync { dry_run: true },
        Some(config_file.path().to_str().unwrap()),
    )
    .await;
    assert!(result.is_err());
    assert!(
        result
            .unwrap_err()
            .to_string()
            .contains("Failed to parse config file")
    );
}

#[test_log::test(tokio::test)]
async fn test_missing_project_id_fails_before_any_request() {
    let mock_server = wiremock::MockServer::start().await;
    wiremock::Mock::given(wiremock::matchers::any())
        .respond_with(wiremock::ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let config_file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
    let yaml = format!(
        "providers:\n  frankfurter:\n    base_url: {uri}\n\
         warehouse:\n  bigquery:\n    base_url: {uri}\n",
        uri = mock_server.uri()
    );
    fs::write(config_file.path(), yaml).expect("Failed to write config file");

    if std::env::var_os(PROJECT_ID_ENV).is_some() {
        // SAFETY: no other test in this binary reads or writes GCP_PROJECT_ID.
        unsafe { std::env::remove_var(PROJECT_ID_ENV) };
    }

    let result = fxsync::run_command(
        fxsync::AppCommand::Sync { dry_run: false },
        Some(config_file.path().to_str().unwrap()),
    )
    .await;

    let err = result.expect_err("Run without a project id should fail");
    assert_eq!(err.to_string(), "Missing env var GCP_PROJECT_ID");
}

#[test_log::test(tokio::test)]
#[ignore = "hits the live Frankfurter API"]
async fn test_real_frankfurter_api() {
    use chrono::NaiveDate;
    use fxsync::core::rate::HistoricalRateProvider;
    use fxsync::providers::FrankfurterProvider;

    let provider = FrankfurterProvider::new(&FrankfurterProviderConfig::default())
        .expect("Failed to build provider");
    let date = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();

    match provider.historical_rate(date, "USD", "EUR").await {
        Ok(rate) => {
            info!(?rate, "Received rate from Frankfurter");
            assert!(rate.is_some_and(|r| r > rust_decimal::Decimal::ZERO));
        }
        Err(e) => {
            error!("Frankfurter request failed: {e}\n{e:?}");
            panic!("Frankfurter request failed: {e}");
        }
    }
}
