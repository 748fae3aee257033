use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ── Price record ──────────────────────────────────────────────────────────────

/// One symbol's OHLCV observation for a single trading day.
/// (symbol, date) is unique within a batch: it is the warehouse primary key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceRecord {
    pub symbol: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

/// Ordered sequence of records as produced by the merge step. May be empty.
pub type RecordBatch = Vec<PriceRecord>;

// ── Raw API payload ───────────────────────────────────────────────────────────

/// Top-level Alpha Vantage daily-history response.
///
/// A payload without the time-series key (throttle notices, error bodies)
/// deserializes to an empty map rather than failing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DailyHistory {
    #[serde(rename = "Meta Data", default)]
    pub meta: Option<SeriesMeta>,

    #[serde(rename = "Time Series (Daily)", default)]
    pub series: BTreeMap<String, RawDailyEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeriesMeta {
    #[serde(rename = "2. Symbol", default)]
    pub symbol: Option<String>,

    #[serde(rename = "3. Last Refreshed", default)]
    pub last_refreshed: Option<String>,
}

/// One day's entry as the API ships it, all values string-typed.
#[derive(Debug, Clone, Deserialize)]
pub struct RawDailyEntry {
    #[serde(rename = "1. open")]
    pub open: String,

    #[serde(rename = "2. high")]
    pub high: String,

    #[serde(rename = "3. low")]
    pub low: String,

    #[serde(rename = "4. close")]
    pub close: String,

    #[serde(rename = "5. volume")]
    pub volume: String,
}
