//! # Crawler: resource collection
//!
//! Consumes the [`ScanTask`]s emitted by the identity walk and runs every
//! enabled [`Collector`] for each of them under two admission bounds:
//! at most `project_workers` tasks at once, and at most `resource_workers`
//! collectors at once inside each task.
//!
//! [`Scanner`] wires the walk, the dispatcher and the result sink together
//! for one run.
//!
//! [`ScanTask`]: common::ScanTask

pub mod dispatch;
pub mod registry;
pub mod scan;
pub mod testing;

pub use dispatch::{DispatchReport, Dispatcher};
pub use registry::CollectorRegistry;
pub use scan::{ScanSummary, Scanner};

use async_trait::async_trait;
use common::{ConfigError, Credential, Project, ResourceSettings, ResourceType};
use ledger::SinkError;
use pivot::PivotError;
use serde_json::Value;
use std::time::Duration;

/// Failure of one collector for one project. Never escapes the task.
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("Collector failed: {0}")]
    Failed(String),
    #[error("Collector timed out after {0:?}")]
    Timeout(Duration),
    #[error("No collector registered for {0}")]
    Unknown(ResourceType),
}

/// Run-level failures: bad configuration, an unusable output directory, or a
/// walk that could not hand its tasks over.
#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error(transparent)]
    Traversal(#[from] PivotError),
}

/// Enumerates one resource type for one project.
///
/// The returned document is stored as-is under the resource-type key of the
/// project's record. `Null`, `[]` and `{}` count as "no data".
#[async_trait]
pub trait Collector: Send + Sync {
    async fn collect(
        &self,
        project: &Project,
        credential: &Credential,
        settings: &ResourceSettings,
    ) -> Result<Value, CollectorError>;
}

/// Returns `true` for documents not worth persisting.
pub fn is_empty_result(data: &Value) -> bool {
    match data {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}
