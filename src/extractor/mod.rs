pub mod cleaner;
pub mod http_client;

use crate::config::ApiConfig;
use crate::models::{DailyHistory, PriceRecord};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::{debug, warn};
use url::Url;

use self::cleaner::history_to_records;
use self::http_client::HttpClient;

// ── Source trait ──────────────────────────────────────────────────────────────

/// Swappable data source abstraction.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Daily records for `symbol` within the trailing window ending at
    /// `reference`, in the order the provider's series iterates.
    async fn fetch_daily_history(
        &self,
        symbol: &str,
        reference: NaiveDate,
    ) -> Result<Vec<PriceRecord>>;
}

// ── Alpha Vantage client ──────────────────────────────────────────────────────

pub struct AlphaVantageClient {
    client: HttpClient,
    api_key: String,
    url_template: String,
    window_days: i64,
}

impl AlphaVantageClient {
    pub fn new(config: &ApiConfig, window_days: i64) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            anyhow::bail!(
                "API key is not set; put it in config/local.toml or export VANTAGE__API__API_KEY"
            );
        }

        Ok(Self {
            client: HttpClient::new(config)?,
            api_key: config.api_key.clone(),
            url_template: config.url_template.clone(),
            window_days,
        })
    }

    /// Render the request URL for one symbol from the configured template.
    fn request_url(&self, symbol: &str) -> Result<Url> {
        let rendered = self
            .url_template
            .replace("{symbol}", symbol)
            .replace("{vantage_api_key}", &self.api_key);

        Url::parse(&rendered)
            .with_context(|| format!("URL template rendered an invalid URL for {}", symbol))
    }
}

#[async_trait]
impl MarketDataSource for AlphaVantageClient {
    async fn fetch_daily_history(
        &self,
        symbol: &str,
        reference: NaiveDate,
    ) -> Result<Vec<PriceRecord>> {
        let url = self.request_url(symbol)?;

        let history: DailyHistory = self
            .client
            .get_json(url)
            .await
            .with_context(|| format!("Daily history fetch failed for {}", symbol))?;

        if let Some(meta) = &history.meta {
            debug!(
                "{}: payload meta symbol={:?} last_refreshed={:?}",
                symbol, meta.symbol, meta.last_refreshed
            );
        }
        if history.series.is_empty() {
            warn!("{}: payload carried no daily series", symbol);
        }

        let records = history_to_records(symbol, &history, reference, self.window_days);
        debug!(
            "{}: {} records within the {}-day window",
            symbol,
            records.len(),
            self.window_days
        );

        Ok(records)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ApiConfig {
        ApiConfig {
            api_key: "demo-key".to_string(),
            url_template:
                "https://example.com/query?function=TIME_SERIES_DAILY&symbol={symbol}&apikey={vantage_api_key}"
                    .to_string(),
            timeout_secs: 5,
            user_agent: "vantage-etl-test".to_string(),
        }
    }

    #[test]
    fn request_url_substitutes_both_placeholders() {
        let client = AlphaVantageClient::new(&test_config(), 90).unwrap();
        let url = client.request_url("MSFT").unwrap();
        let query = url.query().unwrap();
        assert!(query.contains("symbol=MSFT"));
        assert!(query.contains("apikey=demo-key"));
        assert!(!url.as_str().contains("{symbol}"));
    }

    #[test]
    fn missing_api_key_is_rejected() {
        let mut config = test_config();
        config.api_key = "  ".to_string();
        assert!(AlphaVantageClient::new(&config, 90).is_err());
    }

    #[test]
    fn payload_without_series_key_decodes_to_empty() {
        let payload = r#"{"Note": "Thank you for using Alpha Vantage!"}"#;
        let history: DailyHistory = serde_json::from_str(payload).unwrap();
        assert!(history.series.is_empty());
    }

    #[test]
    fn payload_entry_fields_map_by_numbered_keys() {
        let payload = r#"{
            "Meta Data": {"2. Symbol": "MSFT", "3. Last Refreshed": "2024-01-02"},
            "Time Series (Daily)": {
                "2024-01-01": {
                    "1. open": "10",
                    "2. high": "12",
                    "3. low": "9",
                    "4. close": "11",
                    "5. volume": "1000"
                }
            }
        }"#;
        let history: DailyHistory = serde_json::from_str(payload).unwrap();
        assert_eq!(history.meta.unwrap().symbol.as_deref(), Some("MSFT"));
        let raw = &history.series["2024-01-01"];
        assert_eq!(raw.open, "10");
        assert_eq!(raw.volume, "1000");
    }
}
