use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub warehouse: WarehouseConfig,
    pub pipeline: PipelineConfig,
}

/// Market-data API configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    /// Credential substituted for `{vantage_api_key}` in the URL template.
    /// Supplied via config/local.toml or VANTAGE__API__API_KEY.
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_url_template")]
    pub url_template: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Warehouse configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WarehouseConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Tracked tickers. Order is significant: merged output follows this
    /// ordering regardless of which fetch finishes first.
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,

    #[serde(default = "default_window_days")]
    pub window_days: i64,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_url_template() -> String {
    "https://www.alphavantage.co/query?function=TIME_SERIES_DAILY&symbol={symbol}&apikey={vantage_api_key}"
        .to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_user_agent() -> String {
    "vantage-etl/0.1 (daily stock warehouse sync)".to_string()
}
fn default_db_path() -> PathBuf {
    PathBuf::from("data/warehouse.duckdb")
}
fn default_symbols() -> Vec<String> {
    vec!["MSFT".to_string(), "NFLX".to_string()]
}
fn default_window_days() -> i64 {
    90
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("VANTAGE").separator("__"))
            .build()?;

        let app_cfg: AppConfig = cfg.try_deserialize().unwrap_or_else(|_| AppConfig::default());
        Ok(app_cfg)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                api_key: String::new(),
                url_template: default_url_template(),
                timeout_secs: default_timeout_secs(),
                user_agent: default_user_agent(),
            },
            warehouse: WarehouseConfig {
                db_path: default_db_path(),
            },
            pipeline: PipelineConfig {
                symbols: default_symbols(),
                window_days: default_window_days(),
            },
        }
    }
}
