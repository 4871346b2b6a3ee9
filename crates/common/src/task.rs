use crate::identity::Identity;
use crate::project::Project;
use serde::Serialize;
use std::sync::Arc;

/// A successful impersonation observed while walking one project's policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImpersonationEdge {
    pub project_id: String,
    pub source: String,
    pub target: String,
}

/// One unit of collection work: a project seen by one identity.
///
/// Emitted by the traversal once per (project, identity) pair it visits and
/// consumed exactly once by the dispatcher.
#[derive(Debug, Clone)]
pub struct ScanTask {
    pub project: Project,
    pub identity: Arc<Identity>,
    /// Targets this identity impersonated through the project's policy.
    pub edges: Vec<String>,
}

impl ScanTask {
    pub fn new(project: Project, identity: Arc<Identity>) -> Self {
        Self {
            project,
            identity,
            edges: Vec::new(),
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project.id
    }

    pub fn project_number(&self) -> &str {
        &self.project.number
    }
}
