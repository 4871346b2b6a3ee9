//! Breadth-first identity walk.
//!
//! Per identity: `Queued -> Dequeued -> (Skipped | Processing) -> Processed`.
//!
//! 1. Pop the next identity; skip it if its name was already processed.
//! 2. List its projects (a failure counts as an empty list).
//! 3. Merge in forced project IDs, falling back to a placeholder record.
//! 4. For every project passing the target filter, try to impersonate each
//!    service account bound in the project policy, then emit the [`ScanTask`]
//!    carrying the successful edges. A project's collection therefore starts
//!    only after its impersonation attempts have finished.
//! 5. Repeat until the frontier is empty.
//!
//! Every successful impersonation is recorded as an edge, including ones
//! that reach an identity already queued or visited. Only the frontier
//! decides whether the target is walked, so the first chain to reach a name
//! is the one kept. Each source asks for a given target at most once; later
//! projects reuse the outcome.
//!
//! Termination follows from the frontier: the visited set only grows and a
//! name can only be enqueued while it is neither visited nor queued.

use crate::frontier::Frontier;
use crate::{Impersonator, PivotError, PolicyLookup, ProjectLister};
use common::{
    impersonation_candidates, Credential, Identity, ImpersonationEdge, Project, ScanTask,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

/// Knobs of the walk taken from the run configuration.
#[derive(Debug, Clone, Default)]
pub struct TraversalOptions {
    pub impersonation: bool,
    pub forced_projects: Vec<String>,
    pub target_project: Option<String>,
}

impl TraversalOptions {
    fn wants_project(&self, project_id: &str) -> bool {
        self.target_project
            .as_deref()
            .map_or(true, |target| project_id.contains(target))
    }
}

/// What one walk produced.
#[derive(Debug, Default)]
pub struct TraversalReport {
    /// Identity names in the order they were processed.
    pub visited: Vec<String>,
    /// `(project_id, identity)` of every emitted task, in emission order.
    pub tasks: Vec<(String, String)>,
    pub edges: Vec<ImpersonationEdge>,
    pub failed_impersonations: usize,
}

/// The sequential identity walker.
pub struct Traversal {
    projects: Arc<dyn ProjectLister>,
    policies: Arc<dyn PolicyLookup>,
    impersonator: Arc<dyn Impersonator>,
    options: TraversalOptions,
}

impl Traversal {
    pub fn new(
        projects: Arc<dyn ProjectLister>,
        policies: Arc<dyn PolicyLookup>,
        impersonator: Arc<dyn Impersonator>,
        options: TraversalOptions,
    ) -> Self {
        Self {
            projects,
            policies,
            impersonator,
            options,
        }
    }

    /// Drains `frontier`, sending one [`ScanTask`] per visited (project, identity).
    ///
    /// Sending never waits on collection. Only a dropped receiver aborts the walk;
    /// every other failure is logged and skipped.
    ///
    /// # Errors
    /// [`PivotError::DispatchClosed`] if `tasks` has no receiver left.
    pub async fn run(
        &self,
        frontier: &mut Frontier,
        tasks: &UnboundedSender<ScanTask>,
    ) -> Result<TraversalReport, PivotError> {
        let mut report = TraversalReport::default();

        while let Some(identity) = frontier.next() {
            if !frontier.mark_visited(identity.name()) {
                debug!(identity = identity.name(), "already processed, skipping");
                continue;
            }
            info!(
                identity = identity.name(),
                chain = ?identity.chain(),
                "processing identity"
            );

            let mut attempts = Attempts::new();
            for project in self.projects_for(&identity).await {
                if !self.options.wants_project(&project.id) {
                    debug!(project = %project.id, "filtered out by target project");
                    continue;
                }
                info!(project = %project.id, identity = identity.name(), "inspecting project");

                let project_id = project.id.clone();
                let mut task = ScanTask::new(project, Arc::clone(&identity));
                if self.options.impersonation {
                    task.edges = self
                        .discover(&identity, &project_id, frontier, &mut attempts, &mut report)
                        .await;
                }

                report
                    .tasks
                    .push((task.project_id().to_string(), identity.name().to_string()));
                tasks.send(task).map_err(|_| PivotError::DispatchClosed)?;
            }
        }

        report.visited = frontier.visited().to_vec();
        Ok(report)
    }

    /// Listed projects plus forced ones not already present.
    async fn projects_for(&self, identity: &Identity) -> Vec<Project> {
        let mut projects = match self.projects.list(identity).await {
            Ok(projects) => projects,
            Err(e) => {
                warn!(identity = identity.name(), error = %e, "project listing failed");
                Vec::new()
            }
        };
        if projects.is_empty() {
            info!(
                identity = identity.name(),
                "unable to list projects accessible from identity"
            );
        }

        for forced in &self.options.forced_projects {
            if projects.iter().any(|p| &p.id == forced) {
                continue;
            }
            match self.projects.lookup(identity, forced).await {
                Ok(project) => projects.push(project),
                Err(e) => {
                    warn!(project = %forced, error = %e, "forced project lookup failed, scanning placeholder");
                    projects.push(Project::placeholder(forced.clone()));
                }
            }
        }
        projects
    }

    /// Tries every service account bound in the project policy, records an
    /// edge for each one impersonated and hands it to the frontier. Returns
    /// the impersonated names.
    async fn discover(
        &self,
        identity: &Arc<Identity>,
        project_id: &str,
        frontier: &mut Frontier,
        attempts: &mut Attempts,
        report: &mut TraversalReport,
    ) -> Vec<String> {
        let bindings = match self.policies.bindings(identity, project_id).await {
            Ok(bindings) => bindings,
            Err(e) => {
                warn!(project = project_id, error = %e, "IAM policy fetch failed");
                return Vec::new();
            }
        };

        let mut found = Vec::new();
        for candidate in impersonation_candidates(&bindings) {
            if candidate == identity.name() {
                continue;
            }

            let credential = match attempts.get(&candidate) {
                Some(outcome) => {
                    debug!(candidate = %candidate, source = identity.name(), "reusing earlier attempt");
                    outcome.clone()
                }
                None => {
                    let outcome = self.assume(identity, &candidate, report).await;
                    attempts.insert(candidate.clone(), outcome.clone());
                    outcome
                }
            };
            let Some(credential) = credential else {
                continue;
            };

            info!(
                candidate = %candidate,
                source = identity.name(),
                project = project_id,
                "impersonated service account"
            );
            if !frontier.enqueue(identity.pivot_to(candidate.clone(), credential)) {
                debug!(candidate = %candidate, "already discovered, keeping earlier chain");
            }
            report.edges.push(ImpersonationEdge {
                project_id: project_id.to_string(),
                source: identity.name().to_string(),
                target: candidate.clone(),
            });
            found.push(candidate);
        }
        found
    }

    async fn assume(
        &self,
        identity: &Identity,
        candidate: &str,
        report: &mut TraversalReport,
    ) -> Option<Credential> {
        debug!(candidate = %candidate, source = identity.name(), "trying impersonation");
        match self.impersonator.assume(identity, candidate).await {
            Ok(credential) => Some(credential),
            Err(e) => {
                report.failed_impersonations += 1;
                warn!(candidate = %candidate, error = %e, "failed to get token");
                None
            }
        }
    }
}

/// Outcome of each impersonation attempt made by the identity being processed.
type Attempts = HashMap<String, Option<Credential>>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeCloud;
    use common::{Credential, UNKNOWN_PROJECT_NUMBER};
    use tokio::sync::mpsc;

    const B: &str = "b@x.iam.gserviceaccount.com";

    fn traversal(cloud: Arc<FakeCloud>, options: TraversalOptions) -> Traversal {
        Traversal::new(cloud.clone(), cloud.clone(), cloud, options)
    }

    fn impersonating() -> TraversalOptions {
        TraversalOptions {
            impersonation: true,
            ..Default::default()
        }
    }

    async fn walk(
        cloud: Arc<FakeCloud>,
        options: TraversalOptions,
        seeds: &[&str],
    ) -> (TraversalReport, Vec<ScanTask>) {
        let mut frontier = Frontier::new();
        frontier.seed(
            seeds
                .iter()
                .map(|s| Identity::seed(*s, Credential::new(format!("tok-{s}")))),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let report = traversal(cloud, options)
            .run(&mut frontier, &tx)
            .await
            .unwrap();
        drop(tx);
        let mut tasks = Vec::new();
        while let Some(task) = rx.recv().await {
            tasks.push(task);
        }
        (report, tasks)
    }

    #[tokio::test]
    async fn test_single_hop_discovery() {
        let cloud = Arc::new(
            FakeCloud::new()
                .project("a", "p1")
                .project(B, "p1")
                .bind("p1", &format!("serviceAccount:{B}"))
                .allow("a", B),
        );
        let (report, tasks) = walk(cloud, impersonating(), &["a"]).await;

        assert_eq!(report.visited, ["a", B]);
        let pairs: Vec<(&str, &str)> = tasks
            .iter()
            .map(|t| (t.project_id(), t.identity.name()))
            .collect();
        assert_eq!(pairs, [("p1", "a"), ("p1", B)]);
        assert_eq!(tasks[1].identity.chain(), ["a"]);
        assert_eq!(tasks[0].edges, [B]);
        assert_eq!(
            report.edges,
            [ImpersonationEdge {
                project_id: "p1".into(),
                source: "a".into(),
                target: B.into(),
            }]
        );
    }

    #[tokio::test]
    async fn test_failed_impersonation_is_dropped() {
        let cloud = Arc::new(
            FakeCloud::new()
                .project("a", "p1")
                .bind("p1", &format!("serviceAccount:{B}")),
        );
        let (report, tasks) = walk(cloud.clone(), impersonating(), &["a"]).await;

        assert_eq!(report.visited, ["a"]);
        assert_eq!(report.failed_impersonations, 1);
        assert_eq!(tasks.len(), 1);
        assert!(tasks[0].edges.is_empty());
        assert_eq!(cloud.impersonation_calls(), [("a".to_string(), B.to_string())]);
    }

    #[tokio::test]
    async fn test_three_cycle_terminates() {
        let cloud = Arc::new(
            FakeCloud::new()
                .bind("pa", "serviceAccount:b@x")
                .bind("pb", "serviceAccount:c@x")
                .bind("pc", "serviceAccount:a@x")
                .project("b@x", "pb")
                .project("c@x", "pc")
                .project("a@x", "pa")
                .allow("a@x", "b@x")
                .allow("b@x", "c@x")
                .allow("c@x", "a@x"),
        );
        let (report, tasks) = walk(cloud, impersonating(), &["a@x"]).await;

        assert_eq!(report.visited, ["a@x", "b@x", "c@x"]);
        assert_eq!(tasks.len(), 3);
        let c = &tasks[2].identity;
        assert_eq!(c.chain(), ["a@x", "b@x"]);

        // The edge closing the cycle is kept even though `a@x` is already visited.
        let edges: Vec<(&str, &str)> = report
            .edges
            .iter()
            .map(|e| (e.source.as_str(), e.target.as_str()))
            .collect();
        assert_eq!(edges, [("a@x", "b@x"), ("b@x", "c@x"), ("c@x", "a@x")]);
        assert_eq!(tasks[2].edges, ["a@x"]);
    }

    #[tokio::test]
    async fn test_no_duplicate_visits_in_dense_graph() {
        // Every identity can impersonate every other one through a shared project.
        let names = ["s1@x", "s2@x", "s3@x", "s4@x"];
        let mut cloud = FakeCloud::new();
        for name in names {
            cloud = cloud
                .project(name, "shared")
                .bind("shared", &format!("serviceAccount:{name}"));
            for other in names {
                cloud = cloud.allow(name, other);
            }
        }
        let cloud = Arc::new(cloud);
        let (report, _) = walk(cloud.clone(), impersonating(), &["s1@x"]).await;

        let mut visited = report.visited.clone();
        visited.sort();
        visited.dedup();
        assert_eq!(visited.len(), report.visited.len());
        assert_eq!(visited.len(), names.len());

        // Nobody is asked to impersonate itself, and every other pair is tried once.
        let calls = cloud.impersonation_calls();
        assert!(calls.iter().all(|(src, dst)| src != dst));
        let mut pairs = calls.clone();
        pairs.sort();
        pairs.dedup();
        assert_eq!(pairs.len(), calls.len());
        assert_eq!(calls.len(), names.len() * (names.len() - 1));
        assert_eq!(report.edges.len(), calls.len());
    }

    #[tokio::test]
    async fn test_chain_monotonicity_and_no_self_loops() {
        let cloud = Arc::new(
            FakeCloud::new()
                .project("root", "p")
                .project("h1@x", "p1")
                .project("h2@x", "p2")
                .bind("p", "serviceAccount:h1@x")
                .bind("p1", "serviceAccount:h2@x")
                .bind("p1", "serviceAccount:h1@x")
                .allow("root", "h1@x")
                .allow("h1@x", "h2@x"),
        );
        let (_, tasks) = walk(cloud, impersonating(), &["root"]).await;

        for task in &tasks {
            let id = &task.identity;
            assert!(!id.chain().iter().any(|n| n == id.name()));
        }
        let h2 = tasks.iter().find(|t| t.identity.name() == "h2@x").unwrap();
        let h1 = tasks.iter().find(|t| t.identity.name() == "h1@x").unwrap();
        assert_eq!(h2.identity.chain().len(), h1.identity.chain().len() + 1);
    }

    #[tokio::test]
    async fn test_first_discovery_wins() {
        // Two projects under the same identity both expose `t@x`.
        let cloud = Arc::new(
            FakeCloud::new()
                .project("a", "p1")
                .project("a", "p2")
                .bind("p1", "serviceAccount:t@x")
                .bind("p2", "serviceAccount:t@x")
                .allow("a", "t@x"),
        );
        let (report, tasks) = walk(cloud.clone(), impersonating(), &["a"]).await;

        // One call, reused for the second project; one edge per project.
        assert_eq!(cloud.impersonation_calls(), [("a".to_string(), "t@x".to_string())]);
        let projects: Vec<&str> = report.edges.iter().map(|e| e.project_id.as_str()).collect();
        assert_eq!(projects, ["p1", "p2"]);
        assert_eq!(tasks[0].edges, ["t@x"]);
        assert_eq!(tasks[1].edges, ["t@x"]);
        assert_eq!(tasks.iter().filter(|t| t.identity.name() == "t@x").count(), 0);
        assert_eq!(report.visited, ["a", "t@x"]);
    }

    #[tokio::test]
    async fn test_cached_failure_is_not_retried() {
        let cloud = Arc::new(
            FakeCloud::new()
                .project("a", "p1")
                .project("a", "p2")
                .bind("p1", &format!("serviceAccount:{B}"))
                .bind("p2", &format!("serviceAccount:{B}")),
        );
        let (report, tasks) = walk(cloud.clone(), impersonating(), &["a"]).await;

        assert_eq!(cloud.impersonation_calls().len(), 1);
        assert_eq!(report.failed_impersonations, 1);
        assert_eq!(tasks.len(), 2);
        assert!(report.edges.is_empty());
    }

    #[tokio::test]
    async fn test_impersonation_disabled() {
        let cloud = Arc::new(
            FakeCloud::new()
                .project("a", "p1")
                .bind("p1", &format!("serviceAccount:{B}"))
                .allow("a", B),
        );
        let (report, tasks) = walk(cloud.clone(), TraversalOptions::default(), &["a"]).await;

        assert_eq!(report.visited, ["a"]);
        assert_eq!(tasks.len(), 1);
        assert!(cloud.impersonation_calls().is_empty());
    }

    #[tokio::test]
    async fn test_forced_projects_and_placeholder() {
        let cloud = Arc::new(
            FakeCloud::new()
                .project("a", "p1")
                .lookup_only("hidden"),
        );
        let options = TraversalOptions {
            forced_projects: vec!["p1".into(), "hidden".into(), "ghost".into()],
            ..Default::default()
        };
        let (_, tasks) = walk(cloud, options, &["a"]).await;

        let ids: Vec<&str> = tasks.iter().map(|t| t.project_id()).collect();
        assert_eq!(ids, ["p1", "hidden", "ghost"]);
        assert_eq!(tasks[2].project_number(), UNKNOWN_PROJECT_NUMBER);
        assert_ne!(tasks[1].project_number(), UNKNOWN_PROJECT_NUMBER);
    }

    #[tokio::test]
    async fn test_listing_failure_still_scans_forced() {
        let cloud = Arc::new(FakeCloud::new().break_listing("a"));
        let options = TraversalOptions {
            forced_projects: vec!["forced".into()],
            ..Default::default()
        };
        let (report, tasks) = walk(cloud, options, &["a"]).await;

        assert_eq!(report.visited, ["a"]);
        assert_eq!(tasks.len(), 1);
        assert!(tasks[0].project.is_placeholder());
    }

    #[tokio::test]
    async fn test_policy_failure_keeps_task() {
        let cloud = Arc::new(
            FakeCloud::new()
                .project("a", "p1")
                .break_policy("p1")
                .allow("a", B),
        );
        let (report, tasks) = walk(cloud, impersonating(), &["a"]).await;

        assert_eq!(tasks.len(), 1);
        assert!(report.edges.is_empty());
    }

    #[tokio::test]
    async fn test_target_project_filter() {
        let cloud = Arc::new(
            FakeCloud::new()
                .project("a", "acme-prod")
                .project("a", "acme-dev")
                .bind("acme-dev", &format!("serviceAccount:{B}"))
                .allow("a", B),
        );
        let options = TraversalOptions {
            impersonation: true,
            target_project: Some("prod".into()),
            ..Default::default()
        };
        let (report, tasks) = walk(cloud.clone(), options, &["a"]).await;

        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].project_id(), "acme-prod");
        assert_eq!(report.visited, ["a"]);
        assert!(cloud.impersonation_calls().is_empty());
    }

    #[tokio::test]
    async fn test_closed_channel_aborts() {
        let cloud = Arc::new(FakeCloud::new().project("a", "p1"));
        let mut frontier = Frontier::new();
        frontier.seed([Identity::seed("a", Credential::new("t"))]);
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let result = traversal(cloud, TraversalOptions::default())
            .run(&mut frontier, &tx)
            .await;
        assert!(matches!(result, Err(PivotError::DispatchClosed)));
    }
}
