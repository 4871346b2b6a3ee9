//! # Ledger: result persistence
//!
//! One JSON file per (project, identity) of a run, created exclusively before
//! collection and written once afterwards.

pub mod layout;
pub mod light;
pub mod record;
pub mod sink;

pub use layout::FileLayout;
pub use light::project_light;
pub use record::{ProjectRecord, ScanRecord};
pub use sink::{PendingRecord, ResultSink};

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Result file already exists: {}", .0.display())]
    Conflict(PathBuf),
}
