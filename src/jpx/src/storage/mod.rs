//! Persistence for scrape runs
//!
//! Final JSON artifacts, raw page snapshots, and the append-only SQLite
//! sink used for periodic flushes.

pub mod artifacts;
pub mod repository;
pub mod schema;
pub mod snapshot;

pub use artifacts::{save_reports, ArtifactPaths, FullReport, SimpleReport};
pub use repository::FlushRepository;
pub use schema::create_tables;
pub use snapshot::SnapshotWriter;
