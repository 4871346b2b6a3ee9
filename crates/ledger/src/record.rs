//! Persisted result document.

use crate::light::project_light;
use common::{ResourceType, ScanTask};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Top-level document of one output file.
///
/// ```json
/// {
///   "service_account_chain": ["seed"],
///   "current_service_account": "b@p.iam.gserviceaccount.com",
///   "projects": {
///     "p1": { "project_info": {}, "service_account_edges": [], "kms": [] }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct ScanRecord {
    pub service_account_chain: Vec<String>,
    pub current_service_account: String,
    pub projects: BTreeMap<String, ProjectRecord>,
}

/// Collected data for one project.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProjectRecord {
    pub project_info: Value,
    pub service_account_edges: Vec<String>,
    #[serde(flatten)]
    pub resources: BTreeMap<ResourceType, Value>,
}

impl ScanRecord {
    /// Empty record for a task, carrying its chain, project info and edges.
    pub fn for_task(task: &ScanTask) -> Self {
        let project = ProjectRecord {
            project_info: task.project.info.clone(),
            service_account_edges: task.edges.clone(),
            resources: BTreeMap::new(),
        };
        Self {
            service_account_chain: task.identity.chain().to_vec(),
            current_service_account: task.identity.name().to_string(),
            projects: BTreeMap::from([(task.project_id().to_string(), project)]),
        }
    }

    /// Stores `data` under `ty` for every project in the record.
    pub fn insert(&mut self, ty: ResourceType, data: Value) {
        for project in self.projects.values_mut() {
            project.resources.insert(ty.clone(), data.clone());
        }
    }

    pub fn resource_count(&self) -> usize {
        self.projects.values().map(|p| p.resources.len()).sum()
    }

    /// Reduces every resource list to its light-scan field set.
    pub fn into_light(mut self) -> Self {
        for project in self.projects.values_mut() {
            let resources = std::mem::take(&mut project.resources);
            project.resources = resources
                .into_iter()
                .map(|(ty, data)| {
                    let data = project_light(&ty, data);
                    (ty, data)
                })
                .collect();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Credential, Identity, Project};
    use serde_json::json;
    use std::sync::Arc;

    fn task() -> ScanTask {
        let seed = Identity::seed("a", Credential::new("t"));
        let b = seed.pivot_to("b@p.iam.gserviceaccount.com", Credential::new("t2"));
        let mut task = ScanTask::new(
            Project::from_info(json!({"projectId": "p1", "projectNumber": "42"})).unwrap(),
            Arc::new(b),
        );
        task.edges.push("c@p.iam.gserviceaccount.com".into());
        task
    }

    #[test]
    fn test_layout_matches_json_db() {
        let mut record = ScanRecord::for_task(&task());
        record.insert(ResourceType::Kms, json!([{"name": "ring"}]));

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["service_account_chain"], json!(["a"]));
        assert_eq!(value["current_service_account"], "b@p.iam.gserviceaccount.com");
        let p1 = &value["projects"]["p1"];
        assert_eq!(p1["project_info"]["projectNumber"], "42");
        assert_eq!(p1["service_account_edges"], json!(["c@p.iam.gserviceaccount.com"]));
        assert_eq!(p1["kms"][0]["name"], "ring");
        assert_eq!(record.resource_count(), 1);
    }

    #[test]
    fn test_into_light() {
        let mut record = ScanRecord::for_task(&task());
        record.insert(
            ResourceType::Services,
            json!([{"name": "compute.googleapis.com", "state": "ENABLED"}]),
        );
        record.insert(ResourceType::from("custom"), json!([{"x": 1}]));

        let value = serde_json::to_value(record.into_light()).unwrap();
        let p1 = &value["projects"]["p1"];
        assert_eq!(p1["services"], json!([{"name": "compute.googleapis.com"}]));
        assert_eq!(p1["custom"], json!([{"x": 1}]));
    }
}
