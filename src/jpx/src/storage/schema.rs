//! SQLite schema for the intermediate flush sink
//!
//! Tables:
//! - flushed_companies: one row per record handed over in a periodic flush

use rusqlite::{Connection, Result};

/// Create all tables in the database
pub fn create_tables(conn: &Connection) -> Result<()> {
    // Append-only: the same code may appear in several runs
    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS flushed_companies (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT NOT NULL,
            flush_seq INTEGER NOT NULL,
            page INTEGER NOT NULL,
            code TEXT NOT NULL,
            name TEXT NOT NULL,
            market_segment TEXT,
            industry TEXT,
            fiscal_year_end TEXT,
            stock_prices_url TEXT,
            record_json TEXT NOT NULL,
            extracted_at TEXT NOT NULL,
            flushed_at TEXT DEFAULT (datetime('now'))
        )
        "#,
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_flushed_companies_run ON flushed_companies(run_id, flush_seq)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_flushed_companies_code ON flushed_companies(code)",
        [],
    )?;

    Ok(())
}
