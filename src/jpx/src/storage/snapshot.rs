//! Raw HTML snapshots of fetched pages, kept for debugging selectors.

use std::path::PathBuf;

use crate::error::ScrapeError;

/// Writes `jpx_page_<n>.html` files into one directory
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    dir: PathBuf,
}

impl SnapshotWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Get snapshot path for a data page
    pub fn page_path(&self, page: u32) -> PathBuf {
        self.dir.join(format!("jpx_page_{page}.html"))
    }

    /// Get snapshot path for the initial search page
    pub fn session_path(&self) -> PathBuf {
        self.dir.join("session_form.html")
    }

    pub fn write_page(&self, page: u32, html: &str) -> Result<PathBuf, ScrapeError> {
        self.write(self.page_path(page), html)
    }

    pub fn write_session(&self, html: &str) -> Result<PathBuf, ScrapeError> {
        self.write(self.session_path(), html)
    }

    fn write(&self, path: PathBuf, html: &str) -> Result<PathBuf, ScrapeError> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|err| ScrapeError::persistence(&self.dir, err))?;
        std::fs::write(&path, html).map_err(|err| ScrapeError::persistence(&path, err))?;
        Ok(path)
    }
}
