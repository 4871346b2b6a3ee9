//! # Gcp: Google Cloud REST collaborators
//!
//! Concrete implementations of the capability traits used by the walk and the
//! dispatcher, talking to the public Google Cloud REST APIs with the bearer
//! token carried by each identity.
//!
//! - [`credentials`]: seed identities from token files, raw tokens or the GCE
//!   metadata server.
//! - [`ResourceManager`]: project listing, lookup and IAM policy.
//! - [`IamCredentials`]: service-account impersonation.
//! - [`collectors`]: one [`crawler::Collector`] per known resource type.

pub mod client;
pub mod collectors;
pub mod credentials;
pub mod iam;
pub mod resource_manager;

pub use client::GcpClient;
pub use collectors::default_registry;
pub use iam::IamCredentials;
pub use resource_manager::ResourceManager;

use crawler::CollectorError;
use pivot::PivotError;

#[derive(Debug, thiserror::Error)]
pub enum GcpError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{url} returned {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },
    #[error("Malformed response: {0}")]
    Json(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Malformed credential {source_name}: {reason}")]
    MalformedCredential { source_name: String, reason: String },
}

impl From<GcpError> for CollectorError {
    fn from(e: GcpError) -> Self {
        CollectorError::Failed(e.to_string())
    }
}

impl GcpError {
    pub(crate) fn enumeration(self) -> PivotError {
        PivotError::Enumeration(self.to_string())
    }
}
