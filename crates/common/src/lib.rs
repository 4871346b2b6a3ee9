//! # Common: shared data model
//!
//! Types passed between the traversal (`pivot`), the dispatcher (`crawler`),
//! the result sink (`ledger`) and the cloud collaborators (`gcp`).
//!
//! - [`Identity`] / [`Credential`]: a principal under scan and its opaque token.
//! - [`Project`] / [`Binding`]: resource-manager views of projects and IAM policy.
//! - [`ScanTask`] / [`ImpersonationEdge`]: traversal output.
//! - [`ResourceType`], [`ScanConfig`], [`RunConfig`]: what to collect and how.

pub mod config;
pub mod identity;
pub mod project;
pub mod resource;
pub mod task;

pub use config::{ConfigError, ResourceSettings, RunConfig, ScanConfig};
pub use identity::{Credential, Identity};
pub use project::{impersonation_candidates, Binding, Project, UNKNOWN_PROJECT_NUMBER};
pub use resource::ResourceType;
pub use task::{ImpersonationEdge, ScanTask};
