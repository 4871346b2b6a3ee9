//! One complete run: identity walk and collection side by side.

use crate::dispatch::{DispatchReport, Dispatcher};
use crate::registry::CollectorRegistry;
use crate::CrawlError;
use common::{Identity, ImpersonationEdge, RunConfig};
use ledger::{FileLayout, ResultSink};
use pivot::{
    Frontier, ImpersonationGraph, Impersonator, PolicyLookup, ProjectLister, Traversal,
    TraversalOptions,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

/// What a finished run did.
#[derive(Debug, Default, Clone)]
pub struct ScanSummary {
    pub seeds: Vec<String>,
    /// Identity names in processing order.
    pub visited: Vec<String>,
    pub tasks: usize,
    pub files_written: Vec<PathBuf>,
    pub conflicts: usize,
    pub write_failures: usize,
    pub collector_failures: usize,
    pub failed_impersonations: usize,
    pub edges: Vec<ImpersonationEdge>,
}

impl ScanSummary {
    /// Graph of every successful impersonation, seeds included.
    pub fn graph(&self) -> ImpersonationGraph {
        ImpersonationGraph::from_edges(self.seeds.iter().map(String::as_str), &self.edges)
    }
}

/// Wires a traversal and a dispatcher for one run.
///
/// # Examples
/// ```no_run
/// # use std::sync::Arc;
/// # use common::{Credential, Identity, RunConfig, ScanConfig};
/// # use crawler::{CollectorRegistry, Scanner};
/// # use ledger::FileLayout;
/// # use pivot::testing::FakeCloud;
/// # async fn run() -> Result<(), crawler::CrawlError> {
/// let cloud = Arc::new(FakeCloud::new().project("a", "p1"));
/// let config = RunConfig::new("out", ScanConfig::fetch_all());
/// let scanner = Scanner::new(
///     cloud.clone(),
///     cloud.clone(),
///     cloud,
///     CollectorRegistry::new(),
///     &config,
///     FileLayout::new("out", 1_700_000_000),
/// )?;
/// let summary = scanner.run(vec![Identity::seed("a", Credential::new("t"))]).await?;
/// println!("{} identities visited", summary.visited.len());
/// # Ok(())
/// # }
/// ```
pub struct Scanner {
    traversal: Traversal,
    dispatcher: Dispatcher,
}

impl Scanner {
    /// # Errors
    /// [`CrawlError::Config`] for invalid worker counts, [`CrawlError::Sink`]
    /// if the output directory cannot be created.
    pub fn new(
        projects: Arc<dyn ProjectLister>,
        policies: Arc<dyn PolicyLookup>,
        impersonator: Arc<dyn Impersonator>,
        registry: CollectorRegistry,
        config: &RunConfig,
        layout: FileLayout,
    ) -> Result<Self, CrawlError> {
        config.validate()?;
        let options = TraversalOptions {
            impersonation: config.impersonation,
            forced_projects: config.forced_projects.clone(),
            target_project: config.target_project.clone(),
        };
        let sink = ResultSink::new(layout, config.light_scan)?;
        Ok(Self {
            traversal: Traversal::new(projects, policies, impersonator, options),
            dispatcher: Dispatcher::new(Arc::new(registry), sink, config),
        })
    }

    /// Walks from `seeds` and collects every emitted task. Returns once the
    /// frontier is exhausted and every admitted worker has finished.
    ///
    /// # Errors
    /// Only a walk that could not hand over its tasks fails the run; every
    /// per-project failure is logged and counted in the summary.
    pub async fn run(self, seeds: Vec<Identity>) -> Result<ScanSummary, CrawlError> {
        let seed_names: Vec<String> = seeds.iter().map(|s| s.name().to_string()).collect();
        let mut frontier = Frontier::new();
        frontier.seed(seeds);
        info!(seeds = seed_names.len(), "starting scan");

        let (tx, rx) = mpsc::unbounded_channel();
        let traversal = self.traversal;
        let walk = async move {
            let result = traversal.run(&mut frontier, &tx).await;
            drop(tx);
            result
        };
        let (walked, dispatched) = tokio::join!(walk, self.dispatcher.run(rx));
        let walked = walked?;

        let DispatchReport {
            tasks,
            files_written,
            conflicts,
            write_failures,
            collector_failures,
        } = dispatched;
        Ok(ScanSummary {
            seeds: seed_names,
            visited: walked.visited,
            tasks,
            files_written,
            conflicts,
            write_failures,
            collector_failures,
            failed_impersonations: walked.failed_impersonations,
            edges: walked.edges,
        })
    }
}
