//! Cloud Resource Manager v1: projects and IAM policies.

use crate::{GcpClient, GcpError};
use async_trait::async_trait;
use common::{Binding, Credential, Identity, Project};
use pivot::{PivotError, PolicyLookup, ProjectLister};
use serde_json::{json, Value};
use tracing::debug;

const CRM_BASE: &str = "https://cloudresourcemanager.googleapis.com/v1";

#[derive(Debug, Clone)]
pub struct ResourceManager {
    client: GcpClient,
}

impl ResourceManager {
    pub fn new(client: GcpClient) -> Self {
        Self { client }
    }

    /// Raw `getIamPolicy` document for a project, policy version 3.
    pub async fn iam_policy(
        &self,
        credential: &Credential,
        project_id: &str,
    ) -> Result<Value, GcpError> {
        self.client
            .post_json(
                credential,
                &format!("{CRM_BASE}/projects/{project_id}:getIamPolicy"),
                &json!({ "options": { "requestedPolicyVersion": 3 } }),
            )
            .await
    }
}

#[async_trait]
impl ProjectLister for ResourceManager {
    async fn list(&self, identity: &Identity) -> Result<Vec<Project>, PivotError> {
        let items = self
            .client
            .list_paged(identity.credential(), &format!("{CRM_BASE}/projects"), "projects")
            .await
            .map_err(GcpError::enumeration)?;
        Ok(projects_from(items))
    }

    async fn lookup(&self, identity: &Identity, project_id: &str) -> Result<Project, PivotError> {
        let info = self
            .client
            .get_json(identity.credential(), &format!("{CRM_BASE}/projects/{project_id}"))
            .await
            .map_err(GcpError::enumeration)?;
        Project::from_info(info).ok_or_else(|| {
            PivotError::Enumeration(format!("project {project_id} has no projectId"))
        })
    }
}

#[async_trait]
impl PolicyLookup for ResourceManager {
    async fn bindings(
        &self,
        identity: &Identity,
        project_id: &str,
    ) -> Result<Vec<Binding>, PivotError> {
        let policy = self
            .iam_policy(identity.credential(), project_id)
            .await
            .map_err(GcpError::enumeration)?;
        bindings_from(policy).map_err(|e| PivotError::Enumeration(e.to_string()))
    }
}

fn projects_from(items: Vec<Value>) -> Vec<Project> {
    items
        .into_iter()
        .filter_map(|info| {
            let project = Project::from_info(info);
            if project.is_none() {
                debug!("skipping project entry without projectId");
            }
            project
        })
        .collect()
}

fn bindings_from(mut policy: Value) -> Result<Vec<Binding>, serde_json::Error> {
    match policy.get_mut("bindings").map(Value::take) {
        Some(bindings) => serde_json::from_value(bindings),
        None => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_projects_from_listing() {
        let projects = projects_from(vec![
            json!({"projectId": "p1", "projectNumber": "111", "lifecycleState": "ACTIVE"}),
            json!({"name": "orphan"}),
        ]);
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].id, "p1");
        assert_eq!(projects[0].info["lifecycleState"], "ACTIVE");
    }

    #[test]
    fn test_bindings_from_policy() {
        let policy = json!({
            "version": 3,
            "etag": "BwX",
            "bindings": [
                {"role": "roles/iam.serviceAccountTokenCreator",
                 "members": ["serviceAccount:b@p.iam.gserviceaccount.com"]},
                {"role": "roles/viewer",
                 "condition": {"expression": "true"}}
            ]
        });
        let bindings = bindings_from(policy).unwrap();
        assert_eq!(bindings.len(), 2);
        assert!(bindings[1].members.is_empty());

        assert!(bindings_from(json!({"etag": "x"})).unwrap().is_empty());
        assert!(bindings_from(json!({"bindings": "bad"})).is_err());
    }
}
