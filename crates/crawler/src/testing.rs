//! Instrumented collectors for exercising the dispatcher.

use crate::{Collector, CollectorError};
use async_trait::async_trait;
use common::{Credential, Project, ResourceSettings};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

/// Returns the same document for every project and records who asked.
#[derive(Debug)]
pub struct StaticCollector {
    data: Value,
    calls: Mutex<Vec<(String, String)>>,
}

impl StaticCollector {
    pub fn new(data: Value) -> Self {
        Self {
            data,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// `(project_id, bearer)` of every call so far.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl Collector for StaticCollector {
    async fn collect(
        &self,
        project: &Project,
        credential: &Credential,
        _settings: &ResourceSettings,
    ) -> Result<Value, CollectorError> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((project.id.clone(), credential.bearer().to_string()));
        Ok(self.data.clone())
    }
}

/// Always fails.
#[derive(Debug, Default)]
pub struct FailingCollector;

#[async_trait]
impl Collector for FailingCollector {
    async fn collect(
        &self,
        project: &Project,
        _credential: &Credential,
        _settings: &ResourceSettings,
    ) -> Result<Value, CollectorError> {
        Err(CollectorError::Failed(format!(
            "403 Forbidden on {}",
            project.id
        )))
    }
}

/// Shared gate that blocks [`GatedCollector`]s until opened and tracks how
/// many of them are inside at once.
#[derive(Debug)]
pub struct Gate {
    pass: Semaphore,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    finished: AtomicUsize,
}

impl Gate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            pass: Semaphore::new(0),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
        })
    }

    /// Lets every waiting and future collector through.
    pub fn open(&self) {
        self.pass.add_permits(Semaphore::MAX_PERMITS / 2);
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of collectors ever waiting at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

/// Leaves the gate's in-flight count even when the call is cancelled.
struct InFlight<'a>(&'a Gate);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Blocks on a [`Gate`], then returns its document.
#[derive(Debug)]
pub struct GatedCollector {
    gate: Arc<Gate>,
    data: Value,
}

impl GatedCollector {
    pub fn new(gate: Arc<Gate>, data: Value) -> Self {
        Self { gate, data }
    }
}

#[async_trait]
impl Collector for GatedCollector {
    async fn collect(
        &self,
        _project: &Project,
        _credential: &Credential,
        _settings: &ResourceSettings,
    ) -> Result<Value, CollectorError> {
        let now = self.gate.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.gate.peak.fetch_max(now, Ordering::SeqCst);
        let inside = InFlight(&self.gate);

        let passed = self.gate.pass.acquire().await;
        drop(inside);
        passed.map_err(|_| CollectorError::Failed("gate closed".into()))?;

        self.gate.finished.fetch_add(1, Ordering::SeqCst);
        Ok(self.data.clone())
    }
}
