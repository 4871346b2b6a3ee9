//! # Pivot: identity discovery
//!
//! Walks the impersonation graph breadth-first from a set of seed identities.
//! For every identity it lists the reachable projects, emits one [`ScanTask`]
//! per project and tries to impersonate every service account bound in the
//! project's IAM policy. Newly minted identities join the [`Frontier`].
//!
//! The walk is strictly sequential; collection of the emitted tasks happens
//! elsewhere (see the `crawler` crate) and never blocks the walk.
//!
//! [`ScanTask`]: common::ScanTask

pub mod frontier;
pub mod graph;
pub mod testing;
pub mod traversal;

pub use frontier::Frontier;
pub use graph::ImpersonationGraph;
pub use traversal::{Traversal, TraversalOptions, TraversalReport};

use async_trait::async_trait;
use common::{Binding, Credential, Identity, Project};

/// Errors surfaced by the capability traits and the traversal.
#[derive(Debug, thiserror::Error)]
pub enum PivotError {
    /// Listing projects, looking up a project, or fetching a policy failed.
    #[error("Enumeration failed: {0}")]
    Enumeration(String),
    /// The token exchange for `target` was refused or errored.
    #[error("Impersonation of {target} failed: {reason}")]
    Impersonation { target: String, reason: String },
    /// The task receiver was dropped before the walk finished.
    #[error("Scan task channel closed")]
    DispatchClosed,
}

/// Lists the projects an identity can see.
#[async_trait]
pub trait ProjectLister: Send + Sync {
    async fn list(&self, identity: &Identity) -> Result<Vec<Project>, PivotError>;

    /// Looks up a single project by ID (used for operator-forced projects).
    async fn lookup(&self, identity: &Identity, project_id: &str) -> Result<Project, PivotError>;
}

/// Fetches the IAM policy bindings of a project.
#[async_trait]
pub trait PolicyLookup: Send + Sync {
    async fn bindings(
        &self,
        identity: &Identity,
        project_id: &str,
    ) -> Result<Vec<Binding>, PivotError>;
}

/// Mints a credential for `target` using the privileges of `identity`.
#[async_trait]
pub trait Impersonator: Send + Sync {
    async fn assume(&self, identity: &Identity, target: &str) -> Result<Credential, PivotError>;
}
