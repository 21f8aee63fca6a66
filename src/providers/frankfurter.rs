use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Url;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::core::config::FrankfurterProviderConfig;
use crate::core::rate::HistoricalRateProvider;
use crate::providers::util::{RequestPacer, with_retry};

/// Historical rates from the Frankfurter API (ECB reference rates).
pub struct FrankfurterProvider {
    base_url: String,
    client: reqwest::Client,
    pacer: RequestPacer,
    retries: usize,
    retry_delay_ms: u64,
}

impl FrankfurterProvider {
    pub fn new(config: &FrankfurterProviderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("fxsync/1.0")
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(FrankfurterProvider {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
            pacer: RequestPacer::new(Duration::from_millis(config.min_interval_ms)),
            retries: config.retries,
            retry_delay_ms: config.retry_delay_ms,
        })
    }
}

#[derive(Debug, Deserialize)]
struct FrankfurterResponse {
    #[serde(default)]
    rates: HashMap<String, Decimal>,
}

#[async_trait]
impl HistoricalRateProvider for FrankfurterProvider {
    #[instrument(
        name = "FrankfurterRateFetch",
        skip_all,
        fields(date = %date, from = %from, to = %to)
    )]
    async fn historical_rate(
        &self,
        date: NaiveDate,
        from: &str,
        to: &str,
    ) -> Result<Option<Decimal>> {
        let url = Url::parse_with_params(
            &format!("{}/{}", self.base_url, date.format("%Y-%m-%d")),
            &[("from", from), ("to", to)],
        )?;
        debug!("Requesting historical rate from {}", url);

        let client = &self.client;
        let pacer = &self.pacer;
        let request_url = &url;
        let response = with_retry(
            move || async move {
                pacer.wait().await;
                client
                    .get(request_url.clone())
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
            },
            self.retries,
            self.retry_delay_ms,
        )
        .await
        .map_err(|e| anyhow!("Request error: {} for {}->{} on {}", e, from, to, date))?;

        let text = response.text().await?;
        let data: FrankfurterResponse = serde_json::from_str(&text).map_err(|e| {
            anyhow!(
                "Failed to parse JSON response for {}->{} on {}: {}",
                from,
                to,
                date,
                e
            )
        })?;

        let rate = data.rates.get(to).copied();
        if rate.is_none() {
            debug!("No {} rate in response for {} on {}", to, from, date);
        }
        Ok(rate)
    }
}
