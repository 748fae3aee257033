use crate::models::{DailyHistory, PriceRecord, RawDailyEntry};
use chrono::{Duration, NaiveDate};
use tracing::warn;

// ── Field parsers ─────────────────────────────────────────────────────────────

/// Parse a price field. Prices are non-negative; anything else is rejected.
pub fn parse_price(s: &str) -> Option<f64> {
    let v: f64 = s.trim().parse().ok()?;
    if v.is_finite() && v >= 0.0 { Some(v) } else { None }
}

/// Parse a share-count field. The API ships plain integers, occasionally
/// with a decimal tail ("123.0").
pub fn parse_volume(s: &str) -> Option<i64> {
    let s = s.trim();
    if let Ok(v) = s.parse::<i64>() {
        return (v >= 0).then_some(v);
    }
    let v: f64 = s.parse().ok()?;
    if v.is_finite() && v >= 0.0 { Some(v as i64) } else { None }
}

/// Series keys are ISO dates; nothing else is accepted.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

pub fn normalise_symbol(s: &str) -> String {
    s.trim().to_uppercase()
}

/// First day inside the trailing window ending at `reference` (inclusive).
pub fn window_start(reference: NaiveDate, window_days: i64) -> NaiveDate {
    reference - Duration::days(window_days)
}

// ── Raw entry → PriceRecord ───────────────────────────────────────────────────

/// Convert one raw API entry. Entries with unparseable fields are dropped
/// with a warning; extraction stays lenient.
pub fn entry_to_record(symbol: &str, date: NaiveDate, raw: &RawDailyEntry) -> Option<PriceRecord> {
    let (Some(open), Some(high), Some(low), Some(close), Some(volume)) = (
        parse_price(&raw.open),
        parse_price(&raw.high),
        parse_price(&raw.low),
        parse_price(&raw.close),
        parse_volume(&raw.volume),
    ) else {
        warn!("{}: dropping {} entry with unparseable fields", symbol, date);
        return None;
    };

    Some(PriceRecord {
        symbol: normalise_symbol(symbol),
        date,
        open,
        high,
        low,
        close,
        volume,
    })
}

/// Filter a decoded payload down to the trailing window and build records.
///
/// The boundary day exactly `window_days` old is kept. A payload whose
/// series is missing or empty yields an empty sequence, not an error.
pub fn history_to_records(
    symbol: &str,
    history: &DailyHistory,
    reference: NaiveDate,
    window_days: i64,
) -> Vec<PriceRecord> {
    let cutoff = window_start(reference, window_days);
    let mut records = Vec::new();

    for (date_str, raw) in &history.series {
        let Some(date) = parse_date(date_str) else {
            warn!("{}: skipping entry with malformed date {:?}", symbol, date_str);
            continue;
        };

        if date < cutoff {
            continue;
        }

        if let Some(record) = entry_to_record(symbol, date, raw) {
            records.push(record);
        }
    }

    records
}

// ── Tests ─────────────────────────────────────────────────────────────────────
