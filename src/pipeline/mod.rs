//! Pipeline orchestrator: one extract, merge, load pass per scheduled run.
//!
//! Per-symbol fetches run as independent tasks with no shared state; the
//! merge joins on them in configured symbol order, not completion order, so
//! output is deterministic regardless of which response lands first. The
//! loader runs strictly after the merge. A rolled-back load is escalated to
//! a hard run failure so the outer scheduler sees a nonzero exit and can
//! retry or alert; overlapping runs against the same table must be
//! serialized by that scheduler.

use crate::config::AppConfig;
use crate::extractor::{AlphaVantageClient, MarketDataSource};
use crate::storage::{LoadOutcome, Warehouse};
use crate::transform;
use anyhow::{Context, Result, bail};
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

pub struct Pipeline {
    config: AppConfig,
}

impl Pipeline {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub async fn run(&self) -> Result<RunStats> {
        let source = Arc::new(
            AlphaVantageClient::new(&self.config.api, self.config.pipeline.window_days)
                .context("Failed to build API client")?,
        );
        let warehouse = Warehouse::open(&self.config.warehouse.db_path)
            .context("Failed to open warehouse")?;

        self.run_with(source, &warehouse).await
    }

    /// Split out so tests can drive the pipeline with a fake source and an
    /// in-memory warehouse.
    pub async fn run_with(
        &self,
        source: Arc<dyn MarketDataSource>,
        warehouse: &Warehouse,
    ) -> Result<RunStats> {
        let reference = Utc::now().date_naive();
        let symbols = &self.config.pipeline.symbols;

        let run_id = warehouse.begin_run().unwrap_or(0);

        info!("=== Step 1: Extracting {} symbols ===", symbols.len());
        let mut handles = Vec::new();
        for symbol in symbols {
            let source = Arc::clone(&source);
            let symbol = symbol.clone();
            let label = symbol.clone();
            let handle =
                tokio::spawn(async move { source.fetch_daily_history(&symbol, reference).await });
            handles.push((label, handle));
        }

        // Join barrier in spawn order. Any extract failure fails the run.
        let mut per_symbol = Vec::new();
        for (symbol, handle) in handles {
            let records = handle
                .await
                .with_context(|| format!("Extract task for {} panicked", symbol))?
                .with_context(|| format!("Extract failed for {}", symbol))?;
            info!("{}: {} records extracted", symbol, records.len());
            per_symbol.push(records);
        }

        info!("=== Step 2: Merging ===");
        let batch = transform::merge(per_symbol);

        info!("=== Step 3: Loading {} records ===", batch.len());
        let stats = match warehouse.load(&batch)? {
            LoadOutcome::Skipped => RunStats {
                symbols_processed: symbols.len(),
                records_merged: 0,
                rows_loaded: 0,
            },
            LoadOutcome::Committed { rows } => RunStats {
                symbols_processed: symbols.len(),
                records_merged: batch.len(),
                rows_loaded: rows,
            },
            LoadOutcome::RolledBack { error } => {
                warehouse
                    .finish_run(run_id, batch.len(), 0, Some(&error.to_string()))
                    .ok();
                bail!("Load rolled back: {}", error);
            }
        };

        warehouse
            .finish_run(run_id, stats.records_merged, stats.rows_loaded, None)
            .ok();

        Ok(stats)
    }
}

#[derive(Debug)]
pub struct RunStats {
    pub symbols_processed: usize,
    pub records_merged: usize,
    pub rows_loaded: usize,
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PriceRecord;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::collections::HashMap;

    struct FakeSource {
        data: HashMap<String, Vec<PriceRecord>>,
        fail_for: Option<String>,
    }

    #[async_trait]
    impl MarketDataSource for FakeSource {
        async fn fetch_daily_history(
            &self,
            symbol: &str,
            _reference: NaiveDate,
        ) -> Result<Vec<PriceRecord>> {
            if self.fail_for.as_deref() == Some(symbol) {
                bail!("simulated API outage for {}", symbol);
            }
            Ok(self.data.get(symbol).cloned().unwrap_or_default())
        }
    }

    fn record(symbol: &str, day: u32) -> PriceRecord {
        PriceRecord {
            symbol: symbol.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            open: 10.0,
            high: 12.0,
            low: 9.0,
            close: 11.0,
            volume: 1000,
        }
    }

    fn test_pipeline() -> Pipeline {
        Pipeline::new(AppConfig::default())
    }

    #[tokio::test]
    async fn run_loads_all_symbols_into_warehouse() {
        let source = Arc::new(FakeSource {
            data: HashMap::from([
                ("MSFT".to_string(), vec![record("MSFT", 1), record("MSFT", 2)]),
                ("NFLX".to_string(), vec![record("NFLX", 1)]),
            ]),
            fail_for: None,
        });
        let warehouse = Warehouse::open_in_memory().unwrap();

        let stats = test_pipeline().run_with(source, &warehouse).await.unwrap();

        assert_eq!(stats.symbols_processed, 2);
        assert_eq!(stats.records_merged, 3);
        assert_eq!(stats.rows_loaded, 3);
        assert_eq!(warehouse.row_count().unwrap(), 3);
        assert_eq!(warehouse.list_symbols().unwrap(), vec!["MSFT", "NFLX"]);
    }

    #[tokio::test]
    async fn run_with_no_data_skips_the_load() {
        let source = Arc::new(FakeSource {
            data: HashMap::new(),
            fail_for: None,
        });
        let warehouse = Warehouse::open_in_memory().unwrap();

        let stats = test_pipeline().run_with(source, &warehouse).await.unwrap();

        assert_eq!(stats.rows_loaded, 0);
        assert!(!warehouse.table_exists().unwrap());
    }

    #[tokio::test]
    async fn extract_failure_fails_the_run() {
        let source = Arc::new(FakeSource {
            data: HashMap::from([("MSFT".to_string(), vec![record("MSFT", 1)])]),
            fail_for: Some("NFLX".to_string()),
        });
        let warehouse = Warehouse::open_in_memory().unwrap();

        let err = test_pipeline()
            .run_with(source, &warehouse)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("NFLX"));
        assert!(!warehouse.table_exists().unwrap());
    }
}
