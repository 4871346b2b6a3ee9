//! In-memory cloud for exercising the traversal without network access.
//!
//! ```
//! use pivot::testing::FakeCloud;
//!
//! let cloud = FakeCloud::new()
//!     .project("a", "p1")
//!     .bind("p1", "serviceAccount:b@x.iam.gserviceaccount.com")
//!     .allow("a", "b@x.iam.gserviceaccount.com");
//! assert!(cloud.impersonation_calls().is_empty());
//! ```

use crate::{Impersonator, PivotError, PolicyLookup, ProjectLister};
use async_trait::async_trait;
use common::{Binding, Credential, Identity, Project};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

const TOKEN_CREATOR: &str = "roles/iam.serviceAccountTokenCreator";

/// Fake implementation of all three capability traits.
#[derive(Debug, Default)]
pub struct FakeCloud {
    visible: HashMap<String, Vec<String>>,
    known_projects: HashSet<String>,
    policies: HashMap<String, Vec<String>>,
    grants: HashSet<(String, String)>,
    broken_listing: HashSet<String>,
    broken_policies: HashSet<String>,
    impersonations: Mutex<Vec<(String, String)>>,
}

impl FakeCloud {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `project_id` visible to `identity` in project listings.
    pub fn project(mut self, identity: &str, project_id: &str) -> Self {
        self.visible
            .entry(identity.to_string())
            .or_default()
            .push(project_id.to_string());
        self.known_projects.insert(project_id.to_string());
        self
    }

    /// Registers a project that is not listed but can be looked up by ID.
    pub fn lookup_only(mut self, project_id: &str) -> Self {
        self.known_projects.insert(project_id.to_string());
        self
    }

    /// Adds `member` to the project's token-creator binding.
    pub fn bind(mut self, project_id: &str, member: &str) -> Self {
        self.policies
            .entry(project_id.to_string())
            .or_default()
            .push(member.to_string());
        self
    }

    /// Lets `source` mint tokens for `target`.
    pub fn allow(mut self, source: &str, target: &str) -> Self {
        self.grants.insert((source.to_string(), target.to_string()));
        self
    }

    /// Makes project listing fail for `identity`.
    pub fn break_listing(mut self, identity: &str) -> Self {
        self.broken_listing.insert(identity.to_string());
        self
    }

    /// Makes the policy fetch fail for `project_id`.
    pub fn break_policy(mut self, project_id: &str) -> Self {
        self.broken_policies.insert(project_id.to_string());
        self
    }

    /// Every `(source, target)` pair passed to [`Impersonator::assume`].
    pub fn impersonation_calls(&self) -> Vec<(String, String)> {
        self.impersonations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn project_record(id: &str) -> Project {
        Project {
            id: id.to_string(),
            number: format!("{}", 1000 + id.len()),
            info: json!({ "projectId": id }),
        }
    }
}

#[async_trait]
impl ProjectLister for FakeCloud {
    async fn list(&self, identity: &Identity) -> Result<Vec<Project>, PivotError> {
        if self.broken_listing.contains(identity.name()) {
            return Err(PivotError::Enumeration(format!(
                "projects.list denied for {}",
                identity.name()
            )));
        }
        Ok(self
            .visible
            .get(identity.name())
            .map(|ids| ids.iter().map(|id| Self::project_record(id)).collect())
            .unwrap_or_default())
    }

    async fn lookup(&self, _identity: &Identity, project_id: &str) -> Result<Project, PivotError> {
        if self.known_projects.contains(project_id) {
            Ok(Self::project_record(project_id))
        } else {
            Err(PivotError::Enumeration(format!("project {project_id} not found")))
        }
    }
}

#[async_trait]
impl PolicyLookup for FakeCloud {
    async fn bindings(
        &self,
        _identity: &Identity,
        project_id: &str,
    ) -> Result<Vec<Binding>, PivotError> {
        if self.broken_policies.contains(project_id) {
            return Err(PivotError::Enumeration(format!(
                "getIamPolicy denied on {project_id}"
            )));
        }
        Ok(self
            .policies
            .get(project_id)
            .map(|members| {
                vec![Binding {
                    role: TOKEN_CREATOR.to_string(),
                    members: members.clone(),
                }]
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl Impersonator for FakeCloud {
    async fn assume(&self, identity: &Identity, target: &str) -> Result<Credential, PivotError> {
        self.impersonations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((identity.name().to_string(), target.to_string()));
        if self
            .grants
            .contains(&(identity.name().to_string(), target.to_string()))
        {
            Ok(Credential::new(format!("tok-{target}")))
        } else {
            Err(PivotError::Impersonation {
                target: target.to_string(),
                reason: "PERMISSION_DENIED".to_string(),
            })
        }
    }
}
