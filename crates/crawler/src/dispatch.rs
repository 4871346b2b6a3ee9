//! Two-level bounded crawl dispatcher.
//!
//! The outer level admits one worker per [`ScanTask`] once a project permit is
//! free. Each worker reserves the task's result file, launches every enabled
//! collector under its own resource semaphore, joins them all, and only then
//! writes the record. Admission waits on semaphores, never on polling.

use crate::registry::CollectorRegistry;
use crate::{is_empty_result, CollectorError};
use common::{ResourceSettings, ResourceType, RunConfig, ScanConfig, ScanTask};
use ledger::{ResultSink, ScanRecord, SinkError};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

/// Counters accumulated over all tasks a dispatcher handled.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub tasks: usize,
    pub files_written: Vec<PathBuf>,
    /// Tasks skipped because their result file already existed.
    pub conflicts: usize,
    /// Tasks whose result file could not be created or written.
    pub write_failures: usize,
    pub collector_failures: usize,
}

impl DispatchReport {
    fn absorb(&mut self, outcome: TaskOutcome) {
        self.tasks += 1;
        self.collector_failures += outcome.collector_failures;
        match outcome.status {
            TaskStatus::Written(path) => self.files_written.push(path),
            TaskStatus::Conflict => self.conflicts += 1,
            TaskStatus::WriteFailed => self.write_failures += 1,
        }
    }
}

#[derive(Debug)]
enum TaskStatus {
    Written(PathBuf),
    Conflict,
    WriteFailed,
}

#[derive(Debug)]
struct TaskOutcome {
    status: TaskStatus,
    collector_failures: usize,
}

/// Runs collectors for every incoming task with bounded concurrency.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<CollectorRegistry>,
    sink: ResultSink,
    scan: Arc<ScanConfig>,
    project_workers: usize,
    resource_workers: usize,
    collector_timeout: Duration,
}

impl Dispatcher {
    /// Bounds are taken from `config`; worker counts below 1 are raised to 1.
    pub fn new(registry: Arc<CollectorRegistry>, sink: ResultSink, config: &RunConfig) -> Self {
        Self {
            registry,
            sink,
            scan: Arc::new(config.scan.clone()),
            project_workers: config.project_workers.max(1),
            resource_workers: config.resource_workers.max(1),
            collector_timeout: config.collector_timeout,
        }
    }

    /// Consumes tasks until the sender side closes, then waits for every
    /// admitted worker to finish.
    pub async fn run(self, mut tasks: UnboundedReceiver<ScanTask>) -> DispatchReport {
        let this = Arc::new(self);
        let admission = Arc::new(Semaphore::new(this.project_workers));
        let mut workers = JoinSet::new();
        let mut report = DispatchReport::default();

        while let Some(task) = tasks.recv().await {
            let Ok(permit) = Arc::clone(&admission).acquire_owned().await else {
                break;
            };
            while let Some(joined) = workers.try_join_next() {
                absorb_joined(&mut report, joined);
            }

            let worker = Arc::clone(&this);
            workers.spawn(async move {
                let _permit = permit;
                worker.process(task).await
            });
        }

        while let Some(joined) = workers.join_next().await {
            absorb_joined(&mut report, joined);
        }
        report
    }

    /// Outer worker body for a single task.
    async fn process(&self, task: ScanTask) -> TaskOutcome {
        let project_id = task.project_id().to_string();
        let identity = task.identity.name().to_string();

        let pending = match self.sink.reserve(&project_id, &identity) {
            Ok(pending) => pending,
            Err(SinkError::Conflict(path)) => {
                error!(
                    project = %project_id,
                    identity = %identity,
                    path = %path.display(),
                    "result file already exists, skipping project"
                );
                return TaskOutcome {
                    status: TaskStatus::Conflict,
                    collector_failures: 0,
                };
            }
            Err(e) => {
                error!(project = %project_id, error = %e, "cannot create result file");
                return TaskOutcome {
                    status: TaskStatus::WriteFailed,
                    collector_failures: 0,
                };
            }
        };

        info!(project = %project_id, identity = %identity, "collecting resources");
        let (results, collector_failures) = self.collect_all(&task).await;

        let mut record = ScanRecord::for_task(&task);
        for (ty, data) in results {
            record.insert(ty, data);
        }

        let written = tokio::task::spawn_blocking(move || pending.commit(record)).await;
        let status = match written {
            Ok(Ok(path)) => {
                info!(project = %project_id, path = %path.display(), "results saved");
                TaskStatus::Written(path)
            }
            Ok(Err(e)) => {
                error!(project = %project_id, error = %e, "failed to write results");
                TaskStatus::WriteFailed
            }
            Err(e) => {
                error!(project = %project_id, error = %e, "result writer aborted");
                TaskStatus::WriteFailed
            }
        };
        TaskOutcome {
            status,
            collector_failures,
        }
    }

    /// Inner pool: every enabled collector for one task, at most
    /// `resource_workers` at a time. Returns the non-empty results and the
    /// number of failed collectors.
    async fn collect_all(&self, task: &ScanTask) -> (BTreeMap<ResourceType, Value>, usize) {
        let admission = Arc::new(Semaphore::new(self.resource_workers));
        let mut running = JoinSet::new();

        for (ty, settings) in self.scan.enabled() {
            let Ok(permit) = Arc::clone(&admission).acquire_owned().await else {
                break;
            };
            let registry = Arc::clone(&self.registry);
            let task = task.clone();
            let limit = self.collector_timeout;
            running.spawn(async move {
                let _permit = permit;
                let result = run_collector(&registry, &ty, &task, &settings, limit).await;
                (ty, result)
            });
        }

        let mut results = BTreeMap::new();
        let mut failures = 0;
        let project = task.project_id();
        while let Some(joined) = running.join_next().await {
            match joined {
                Ok((ty, Ok(data))) if is_empty_result(&data) => {
                    debug!(project, resource = %ty, "no data");
                }
                Ok((ty, Ok(data))) => {
                    debug!(project, resource = %ty, "collected");
                    results.insert(ty, data);
                }
                Ok((ty, Err(e))) => {
                    failures += 1;
                    warn!(project, resource = %ty, error = %e, "collector failed");
                }
                Err(e) => {
                    failures += 1;
                    error!(project, error = %e, "collector aborted");
                }
            }
        }
        (results, failures)
    }
}

async fn run_collector(
    registry: &CollectorRegistry,
    ty: &ResourceType,
    task: &ScanTask,
    settings: &ResourceSettings,
    limit: Duration,
) -> Result<Value, CollectorError> {
    let collector = registry
        .get(ty)
        .ok_or_else(|| CollectorError::Unknown(ty.clone()))?;
    let call = collector.collect(&task.project, task.identity.credential(), settings);
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| CollectorError::Timeout(limit))?
}

fn absorb_joined(report: &mut DispatchReport, joined: Result<TaskOutcome, JoinError>) {
    match joined {
        Ok(outcome) => report.absorb(outcome),
        Err(e) => {
            report.tasks += 1;
            report.write_failures += 1;
            error!(error = %e, "project worker aborted");
        }
    }
}
