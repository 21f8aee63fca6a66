use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};
use tracing::debug;

/// Environment variable holding the warehouse project identifier.
pub const PROJECT_ID_ENV: &str = "GCP_PROJECT_ID";
/// Environment variable holding an already-issued OAuth bearer token.
pub const ACCESS_TOKEN_ENV: &str = "GCP_ACCESS_TOKEN";

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct FxConfig {
    pub dataset: String,
    pub source_table: String,
    pub destination_table: String,
    pub date_column: String,
    pub currency_column: String,
    pub target_currency: String,
    pub unsupported_currencies: Vec<String>,
}

impl Default for FxConfig {
    fn default() -> Self {
        FxConfig {
            dataset: "patek_data".to_string(),
            source_table: "patek".to_string(),
            destination_table: "fx_rates".to_string(),
            date_column: "life_span_date".to_string(),
            currency_column: "currency".to_string(),
            target_currency: "EUR".to_string(),
            unsupported_currencies: vec!["TWD".to_string()],
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct FrankfurterProviderConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub retries: usize,
    pub retry_delay_ms: u64,
    /// Minimum spacing between two requests to the API.
    pub min_interval_ms: u64,
}

impl Default for FrankfurterProviderConfig {
    fn default() -> Self {
        FrankfurterProviderConfig {
            base_url: "https://api.frankfurter.app".to_string(),
            timeout_secs: 15,
            retries: 3,
            retry_delay_ms: 500,
            min_interval_ms: 100,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProvidersConfig {
    pub frankfurter: Option<FrankfurterProviderConfig>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            frankfurter: Some(FrankfurterProviderConfig::default()),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct BigQueryConfig {
    pub base_url: String,
    pub location: Option<String>,
    pub query_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub max_polls: u32,
}

impl Default for BigQueryConfig {
    fn default() -> Self {
        BigQueryConfig {
            base_url: "https://bigquery.googleapis.com/bigquery/v2".to_string(),
            location: None,
            query_timeout_ms: 10_000,
            poll_interval_ms: 1_000,
            max_polls: 120,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WarehouseConfig {
    pub bigquery: Option<BigQueryConfig>,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        WarehouseConfig {
            bigquery: Some(BigQueryConfig::default()),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct PriceSliceConfig {
    /// Fully qualified `project.dataset.table` of the pricing dataset.
    pub table: String,
    pub column: String,
    pub value: String,
}

impl Default for PriceSliceConfig {
    fn default() -> Self {
        PriceSliceConfig {
            table: "edhec-business-manageme.luxurydata2502.price-monitoring-2022".to_string(),
            column: "brand".to_string(),
            value: "Patek Philippe".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub fx: FxConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub warehouse: WarehouseConfig,
    #[serde(default)]
    pub prices: PriceSliceConfig,
}

impl AppConfig {
    /// Loads the config from the default location, falling back to the
    /// built-in defaults when no file exists there.
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        if !config_path.exists() {
            debug!(
                "No config file at {}, using defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("io", "fxsync", "fxsync")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        config.validate()?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let fx = &self.fx;
        for (name, value) in [
            ("fx.dataset", &fx.dataset),
            ("fx.source_table", &fx.source_table),
            ("fx.destination_table", &fx.destination_table),
            ("fx.date_column", &fx.date_column),
            ("fx.currency_column", &fx.currency_column),
            ("fx.target_currency", &fx.target_currency),
        ] {
            if value.trim().is_empty() {
                bail!("Config value {name} must not be empty");
            }
        }
        Ok(())
    }
}

/// Reads the required project identifier from the environment.
pub fn project_id_from_env() -> Result<String> {
    parse_project_id(std::env::var(PROJECT_ID_ENV).ok())
}

pub fn parse_project_id(value: Option<String>) -> Result<String> {
    match value.map(|v| v.trim().to_string()) {
        Some(id) if !id.is_empty() => Ok(id),
        _ => bail!("Missing env var {PROJECT_ID_ENV}"),
    }
}

/// Optional bearer token for the warehouse API.
pub fn access_token_from_env() -> Option<String> {
    std::env::var(ACCESS_TOKEN_ENV)
        .ok()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: AppConfig = serde_yaml::from_str("{}").expect("Failed to deserialize");
        assert_eq!(config.fx.dataset, "patek_data");
        assert_eq!(config.fx.source_table, "patek");
        assert_eq!(config.fx.destination_table, "fx_rates");
        assert_eq!(config.fx.target_currency, "EUR");
        assert_eq!(config.fx.unsupported_currencies, vec!["TWD".to_string()]);

        let frankfurter = config.providers.frankfurter.unwrap();
        assert_eq!(frankfurter.base_url, "https://api.frankfurter.app");
        assert_eq!(frankfurter.timeout_secs, 15);
        assert_eq!(config.prices.value, "Patek Philippe");
    }

    #[test]
    fn test_config_deserialization() {
        let yaml_str = r#"
fx:
  dataset: "sales"
  source_table: "orders"
  target_currency: "USD"
  unsupported_currencies: ["TWD", "VND"]
providers:
  frankfurter:
    base_url: "http://example.com/fx"
    retries: 0
warehouse:
  bigquery:
    location: "EU"
"#;

        let config: AppConfig = serde_yaml::from_str(yaml_str).expect("Failed to deserialize");
        assert_eq!(config.fx.dataset, "sales");
        assert_eq!(config.fx.source_table, "orders");
        assert_eq!(config.fx.destination_table, "fx_rates");
        assert_eq!(config.fx.target_currency, "USD");
        assert_eq!(config.fx.unsupported_currencies.len(), 2);

        let frankfurter = config.providers.frankfurter.unwrap();
        assert_eq!(frankfurter.base_url, "http://example.com/fx");
        assert_eq!(frankfurter.retries, 0);
        assert_eq!(frankfurter.timeout_secs, 15);

        let bigquery = config.warehouse.bigquery.unwrap();
        assert_eq!(bigquery.location.as_deref(), Some("EU"));
        assert_eq!(
            bigquery.base_url,
            "https://bigquery.googleapis.com/bigquery/v2"
        );
    }

    #[test]
    fn test_load_rejects_empty_target() -> Result<()> {
        let file = tempfile::NamedTempFile::new()?;
        fs::write(file.path(), "fx:\n  target_currency: \"  \"\n")?;

        let result = AppConfig::load_from_path(file.path());
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("fx.target_currency")
        );
        Ok(())
    }

    #[test]
    fn test_parse_project_id() {
        assert_eq!(
            parse_project_id(Some(" my-project \n".to_string())).unwrap(),
            "my-project"
        );
        assert!(parse_project_id(None).is_err());
        let err = parse_project_id(Some("   ".to_string())).unwrap_err();
        assert_eq!(err.to_string(), "Missing env var GCP_PROJECT_ID");
    }
}
