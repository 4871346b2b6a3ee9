//! Projects and IAM policy bindings as returned by the resource manager.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Project number recorded for forced projects whose lookup failed.
pub const UNKNOWN_PROJECT_NUMBER: &str = "N/A";

const SERVICE_ACCOUNT_PREFIX: &str = "serviceAccount:";
const DELETED_PREFIX: &str = "deleted:";

/// A project visible to some identity.
#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    pub id: String,
    pub number: String,
    /// Raw project document, written out as `project_info`.
    pub info: Value,
}

impl Project {
    /// Builds a project from a resource-manager document.
    ///
    /// Returns `None` when `projectId` is missing. A missing `projectNumber`
    /// becomes [`UNKNOWN_PROJECT_NUMBER`].
    pub fn from_info(info: Value) -> Option<Self> {
        let id = info.get("projectId")?.as_str()?.to_string();
        let number = match info.get("projectNumber") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => UNKNOWN_PROJECT_NUMBER.to_string(),
        };
        Some(Self { id, number, info })
    }

    /// Synthetic record for a forced project that could not be looked up.
    pub fn placeholder(id: impl Into<String>) -> Self {
        let id = id.into();
        let info = json!({ "projectId": id, "projectNumber": UNKNOWN_PROJECT_NUMBER });
        Self {
            id,
            number: UNKNOWN_PROJECT_NUMBER.to_string(),
            info,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.number == UNKNOWN_PROJECT_NUMBER
    }
}

/// One `role -> members` entry of an IAM policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub role: String,
    #[serde(default)]
    pub members: Vec<String>,
}

/// Extracts impersonation candidates from a set of bindings.
///
/// Keeps members of the form `serviceAccount:<email>` (never `deleted:...`),
/// strips the prefix and collapses duplicates in first-seen order.
///
/// # Examples
/// ```
/// # use common::project::{impersonation_candidates, Binding};
/// let bindings = vec![Binding {
///     role: "roles/iam.serviceAccountTokenCreator".into(),
///     members: vec![
///         "serviceAccount:b@p.iam.gserviceaccount.com".into(),
///         "user:alice@example.com".into(),
///     ],
/// }];
/// assert_eq!(impersonation_candidates(&bindings), ["b@p.iam.gserviceaccount.com"]);
/// ```
pub fn impersonation_candidates(bindings: &[Binding]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for member in bindings.iter().flat_map(|b| b.members.iter()) {
        if member.starts_with(DELETED_PREFIX) {
            continue;
        }
        let Some(email) = member.strip_prefix(SERVICE_ACCOUNT_PREFIX) else {
            continue;
        };
        if !email.contains('@') {
            continue;
        }
        if !out.iter().any(|seen| seen == email) {
            out.push(email.to_string());
        }
    }
    out
}
