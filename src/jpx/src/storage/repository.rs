//! Append-only SQLite sink for periodic flushes of scraped records

use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};

use super::schema::create_tables;
use crate::error::ScrapeError;
use crate::types::CompanyRecord;

/// Intermediate store written every few pages during a run
pub struct FlushRepository {
    conn: Connection,
    path: PathBuf,
}

impl FlushRepository {
    /// Open (or create) the sink database at `db_path`
    pub fn open(db_path: &Path) -> Result<Self, ScrapeError> {
        // Create parent directories if needed
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| ScrapeError::persistence(parent, err))?;
        }

        let conn = Connection::open(db_path)?;
        create_tables(&conn)?;

        Ok(Self {
            conn,
            path: db_path.to_path_buf(),
        })
    }

    /// Create an in-memory repository (for testing)
    #[cfg(test)]
    pub fn in_memory() -> Result<Self, ScrapeError> {
        let conn = Connection::open_in_memory()?;
        create_tables(&conn)?;
        Ok(Self {
            conn,
            path: PathBuf::from(":memory:"),
        })
    }

    /// Append one flush worth of records in a single transaction.
    ///
    /// Returns the number of rows written.
    pub fn append(
        &mut self,
        run_id: &str,
        flush_seq: u32,
        records: &[CompanyRecord],
    ) -> Result<usize, ScrapeError> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO flushed_companies
                (run_id, flush_seq, page, code, name, market_segment, industry,
                 fiscal_year_end, stock_prices_url, record_json, extracted_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                "#,
            )?;

            for record in records {
                let json = serde_json::to_string(record)
                    .map_err(|err| ScrapeError::encode(&self.path, err))?;
                stmt.execute(params![
                    run_id,
                    flush_seq,
                    record.page,
                    record.code.as_str(),
                    record.name,
                    record.market_segment,
                    record.industry,
                    record.fiscal_year_end,
                    record.stock_prices_url(),
                    json,
                    record.extracted_at.to_rfc3339(),
                ])?;
            }
        }
        tx.commit()?;

        Ok(records.len())
    }

    /// Total rows across all runs
    pub fn count(&self) -> Result<usize, ScrapeError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM flushed_companies", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Codes written for `run_id`, in insertion order
    #[cfg(test)]
    pub fn codes_for_run(&self, run_id: &str) -> Result<Vec<String>, ScrapeError> {
        let mut stmt = self
            .conn
            .prepare("SELECT code FROM flushed_companies WHERE run_id = ?1 ORDER BY id")?;
        let codes = stmt
            .query_map(params![run_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(codes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures::company;

    #[test]
    fn test_append_and_count() {
        let mut repo = FlushRepository::in_memory().unwrap();
        let written = repo
            .append(
                "run-1",
                1,
                &[
                    company("13010", "Prime", "Foods", 1),
                    company("13050", "Prime", "Foods", 1),
                ],
            )
            .unwrap();

        assert_eq!(written, 2);
        assert_eq!(repo.count().unwrap(), 2);
    }

    #[test]
    fn test_append_only_across_runs() {
        let mut repo = FlushRepository::in_memory().unwrap();
        repo.append("run-1", 1, &[company("13010", "Prime", "Foods", 1)])
            .unwrap();
        repo.append("run-2", 1, &[company("13010", "Prime", "Foods", 1)])
            .unwrap();
        repo.append("run-2", 2, &[company("13020", "Prime", "Foods", 6)])
            .unwrap();

        assert_eq!(repo.count().unwrap(), 3);
        assert_eq!(repo.codes_for_run("run-2").unwrap(), vec!["13010", "13020"]);
    }

    #[test]
    fn test_empty_append() {
        let mut repo = FlushRepository::in_memory().unwrap();
        assert_eq!(repo.append("run-1", 1, &[]).unwrap(), 0);
        assert_eq!(repo.count().unwrap(), 0);
    }

    #[test]
    fn test_open_creates_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("sink.sqlite3");
        let mut repo = FlushRepository::open(&path).unwrap();
        repo.append("run-1", 1, &[company("13010", "Prime", "Foods", 1)])
            .unwrap();
        assert!(path.exists());
    }
}
