use crate::models::PriceRecord;
use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use duckdb::{Connection, Transaction, params};
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};

// ── Schema ────────────────────────────────────────────────────────────────────

pub const TARGET_TABLE: &str = "market_data";

/// Destructive recreation: the table holds exactly one run's batch.
/// "max" and "min" are quoted because they collide with the aggregate names.
const TARGET_DDL: &str = r#"
CREATE OR REPLACE TABLE market_data (
    symbol   VARCHAR NOT NULL,
    date     DATE    NOT NULL,
    open     DOUBLE  NOT NULL,
    "max"    DOUBLE  NOT NULL,
    "min"    DOUBLE  NOT NULL,
    close    DOUBLE  NOT NULL,
    volume   BIGINT  NOT NULL,
    PRIMARY KEY (date, symbol)
);
"#;

const INSERT_SQL: &str = r#"
INSERT INTO market_data (symbol, date, open, "max", "min", close, volume)
VALUES (?, ?, ?, ?, ?, ?, ?)
"#;

/// Run bookkeeping lives outside the load transaction and survives the
/// target table's recreation.
const RUNS_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS etl_runs (
    id              BIGINT PRIMARY KEY,
    started_at      TIMESTAMP NOT NULL,
    finished_at     TIMESTAMP,
    status          VARCHAR NOT NULL DEFAULT 'running',
    records_merged  INTEGER DEFAULT 0,
    rows_loaded     INTEGER DEFAULT 0,
    error_msg       VARCHAR
);
"#;

// ── Outcome and errors ────────────────────────────────────────────────────────

/// Terminal state of one `load` call.
#[derive(Debug)]
pub enum LoadOutcome {
    /// Empty batch: the warehouse was never touched.
    Skipped,
    Committed {
        rows: usize,
    },
    /// The transaction was rolled back; the table kept its pre-run state.
    RolledBack {
        error: LoadError,
    },
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("schema recreation failed: {0}")]
    Schema(#[source] duckdb::Error),

    #[error("insert failed for {symbol} {date}: {source}")]
    Insert {
        symbol: String,
        date: NaiveDate,
        #[source]
        source: duckdb::Error,
    },
}

// ── Warehouse ─────────────────────────────────────────────────────────────────

/// Owns the single warehouse connection for one invocation. The connection
/// is released when the value drops, on every exit path.
pub struct Warehouse {
    conn: Connection,
}

impl Warehouse {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Could not create dir {:?}", parent))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open warehouse at {:?}", path))?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    // ── Load ──────────────────────────────────────────────────────────────────

    /// Load a batch into the target table, all or nothing.
    ///
    /// An empty batch skips the warehouse entirely. Otherwise the table is
    /// destructively recreated and every record inserted inside a single
    /// transaction; any failure rolls the whole thing back, recreation
    /// included, and surfaces as `RolledBack` for the caller to escalate.
    pub fn load(&self, batch: &[PriceRecord]) -> Result<LoadOutcome> {
        if batch.is_empty() {
            info!("No records to load.");
            return Ok(LoadOutcome::Skipped);
        }

        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin load transaction")?;

        match Self::recreate_and_insert(&tx, batch) {
            Ok(rows) => {
                tx.commit().context("Failed to commit load transaction")?;
                info!("Successfully loaded {} records into {}", rows, TARGET_TABLE);
                Ok(LoadOutcome::Committed { rows })
            }
            Err(e) => {
                tx.rollback()
                    .context("Rollback failed after load error")?;
                error!("Load failed, transaction rolled back: {}", e);
                Ok(LoadOutcome::RolledBack { error: e })
            }
        }
    }

    fn recreate_and_insert(
        tx: &Transaction<'_>,
        batch: &[PriceRecord],
    ) -> std::result::Result<usize, LoadError> {
        tx.execute_batch(TARGET_DDL).map_err(LoadError::Schema)?;

        for r in batch {
            info!(
                "Inserting {} {}: open={} high={} low={} close={} volume={}",
                r.symbol, r.date, r.open, r.high, r.low, r.close, r.volume
            );
            tx.execute(
                INSERT_SQL,
                params![r.symbol, r.date, r.open, r.high, r.low, r.close, r.volume],
            )
            .map_err(|e| LoadError::Insert {
                symbol: r.symbol.clone(),
                date: r.date,
                source: e,
            })?;
        }

        Ok(batch.len())
    }

    // ── Stats ─────────────────────────────────────────────────────────────────

    /// Whether the target table exists yet. False before the first load.
    pub fn table_exists(&self) -> Result<bool> {
        let mut stmt = self
            .conn
            .prepare("SELECT COUNT(*) FROM information_schema.tables WHERE table_name = ?")?;
        let n: i64 = stmt.query_row(params![TARGET_TABLE], |r| r.get(0))?;
        Ok(n > 0)
    }

    pub fn row_count(&self) -> Result<i64> {
        if !self.table_exists()? {
            return Ok(0);
        }
        let mut stmt = self.conn.prepare("SELECT COUNT(*) FROM market_data")?;
        Ok(stmt.query_row([], |r| r.get(0))?)
    }

    pub fn list_symbols(&self) -> Result<Vec<String>> {
        if !self.table_exists()? {
            return Ok(vec![]);
        }
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT symbol FROM market_data ORDER BY symbol")?;
        let syms: Vec<String> = stmt
            .query_map([], |r| r.get(0))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(syms)
    }

    pub fn date_range(&self) -> Result<(Option<NaiveDate>, Option<NaiveDate>)> {
        if !self.table_exists()? {
            return Ok((None, None));
        }
        let mut stmt = self
            .conn
            .prepare("SELECT MIN(date), MAX(date) FROM market_data")?;
        Ok(stmt.query_row([], |r| Ok((r.get(0)?, r.get(1)?)))?)
    }

    // ── Run log ───────────────────────────────────────────────────────────────

    pub fn begin_run(&self) -> Result<i64> {
        self.conn.execute_batch(RUNS_DDL).context("Run log DDL failed")?;

        let id: i64 = self
            .conn
            .query_row("SELECT COALESCE(MAX(id), 0) + 1 FROM etl_runs", [], |r| {
                r.get(0)
            })?;
        self.conn.execute(
            "INSERT INTO etl_runs (id, started_at, status) VALUES (?, ?, 'running')",
            params![id, Utc::now().naive_utc()],
        )?;
        Ok(id)
    }

    pub fn finish_run(
        &self,
        run_id: i64,
        records_merged: usize,
        rows_loaded: usize,
        error: Option<&str>,
    ) -> Result<()> {
        self.conn.execute(
            r#"UPDATE etl_runs SET
               finished_at = ?, status = ?,
               records_merged = ?, rows_loaded = ?, error_msg = ?
               WHERE id = ?"#,
            params![
                Utc::now().naive_utc(),
                if error.is_none() { "success" } else { "error" },
                records_merged as i64,
                rows_loaded as i64,
                error,
                run_id,
            ],
        )?;
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn record(symbol: &str, day: u32, close: f64) -> PriceRecord {
        PriceRecord {
            symbol: symbol.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            open: close - 1.0,
            high: close + 1.0,
            low: close - 2.0,
            close,
            volume: 1000,
        }
    }

    #[test]
    fn empty_batch_is_skipped_without_touching_warehouse() {
        let wh = Warehouse::open_in_memory().unwrap();
        let outcome = wh.load(&[]).unwrap();
        assert!(matches!(outcome, LoadOutcome::Skipped));
        assert!(!wh.table_exists().unwrap());
    }

    #[test]
    fn full_batch_commits_and_is_queryable() {
        let wh = Warehouse::open_in_memory().unwrap();
        let batch = vec![record("MSFT", 1, 11.0), record("NFLX", 1, 21.0)];

        let outcome = wh.load(&batch).unwrap();
        assert!(matches!(outcome, LoadOutcome::Committed { rows: 2 }));
        assert_eq!(wh.row_count().unwrap(), 2);
        assert_eq!(wh.list_symbols().unwrap(), vec!["MSFT", "NFLX"]);

        let close: f64 = wh
            .conn
            .query_row(
                "SELECT close FROM market_data WHERE symbol = 'NFLX'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(close, 21.0);
    }

    #[test]
    fn duplicate_key_rolls_back_entire_batch() {
        let wh = Warehouse::open_in_memory().unwrap();

        // Seed a prior run so rollback has visible prior state to preserve.
        let prior = vec![record("MSFT", 1, 11.0), record("MSFT", 2, 12.0)];
        assert!(matches!(
            wh.load(&prior).unwrap(),
            LoadOutcome::Committed { rows: 2 }
        ));

        // Third entry collides with the first on (date, symbol).
        let bad = vec![
            record("NFLX", 1, 21.0),
            record("NFLX", 2, 22.0),
            record("NFLX", 1, 23.0),
        ];
        let outcome = wh.load(&bad).unwrap();
        assert!(matches!(
            outcome,
            LoadOutcome::RolledBack {
                error: LoadError::Insert { .. }
            }
        ));

        // Recreation was undone along with the inserts.
        assert_eq!(wh.row_count().unwrap(), 2);
        assert_eq!(wh.list_symbols().unwrap(), vec!["MSFT"]);
    }

    #[test]
    fn reload_recreates_table_from_scratch() {
        let wh = Warehouse::open_in_memory().unwrap();

        let first = vec![record("MSFT", 1, 11.0), record("MSFT", 2, 12.0)];
        assert!(matches!(
            wh.load(&first).unwrap(),
            LoadOutcome::Committed { rows: 2 }
        ));

        // Second run replaces, never appends.
        let second = vec![record("NFLX", 3, 31.0)];
        assert!(matches!(
            wh.load(&second).unwrap(),
            LoadOutcome::Committed { rows: 1 }
        ));
        assert_eq!(wh.row_count().unwrap(), 1);
        assert_eq!(wh.list_symbols().unwrap(), vec!["NFLX"]);
    }

    #[test]
    fn date_range_spans_loaded_batch() {
        let wh = Warehouse::open_in_memory().unwrap();
        assert_eq!(wh.date_range().unwrap(), (None, None));

        wh.load(&[record("MSFT", 5, 10.0), record("MSFT", 9, 10.0)])
            .unwrap();
        let (min, max) = wh.date_range().unwrap();
        assert_eq!(min, NaiveDate::from_ymd_opt(2024, 1, 5));
        assert_eq!(max, NaiveDate::from_ymd_opt(2024, 1, 9));
    }

    #[test]
    fn run_log_records_outcomes() {
        let wh = Warehouse::open_in_memory().unwrap();

        let first = wh.begin_run().unwrap();
        wh.finish_run(first, 3, 3, None).unwrap();

        let second = wh.begin_run().unwrap();
        wh.finish_run(second, 2, 0, Some("load rolled back")).unwrap();
        assert_eq!(second, first + 1);

        let status: String = wh
            .conn
            .query_row(
                "SELECT status FROM etl_runs WHERE id = ?",
                params![second],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(status, "error");
    }
}
