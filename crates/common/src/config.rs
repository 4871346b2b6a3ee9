//! Run-level configuration.
//!
//! The scan config file is a JSON document mapping resource-type names to
//! `{ "fetch": bool, ...options }`.
//!
//! ```json
//! {
//!   "compute_instances": { "fetch": true },
//!   "service_accounts": { "fetch": true, "impersonate": true }
//! }
//! ```

use crate::resource::ResourceType;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Errors from loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Malformed scan config: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("{name} must be at least 1 (got {value})")]
    InvalidWorkerCount { name: &'static str, value: usize },
}

/// Per-resource-type settings. Options other than `fetch` are opaque to the
/// core and handed to the collector as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSettings {
    #[serde(default)]
    pub fetch: bool,
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

impl ResourceSettings {
    pub fn enabled() -> Self {
        Self {
            fetch: true,
            options: Map::new(),
        }
    }

    /// Reads a boolean option, treating anything but `true` as `false`.
    pub fn flag(&self, key: &str) -> bool {
        self.options.get(key).and_then(Value::as_bool).unwrap_or(false)
    }
}

/// Which resource types to collect, and with which options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScanConfig {
    entries: BTreeMap<ResourceType, ResourceSettings>,
}

impl ScanConfig {
    /// Config used when no file is given: every known type, impersonation on.
    pub fn fetch_all() -> Self {
        let mut entries: BTreeMap<ResourceType, ResourceSettings> = ResourceType::KNOWN
            .iter()
            .map(|ty| (ty.clone(), ResourceSettings::enabled()))
            .collect();
        if let Some(sa) = entries.get_mut(&ResourceType::ServiceAccounts) {
            sa.options.insert("impersonate".into(), Value::Bool(true));
        }
        Self { entries }
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn insert(&mut self, ty: ResourceType, settings: ResourceSettings) {
        self.entries.insert(ty, settings);
    }

    pub fn get(&self, ty: &ResourceType) -> Option<&ResourceSettings> {
        self.entries.get(ty)
    }

    pub fn is_enabled(&self, ty: &ResourceType) -> bool {
        self.get(ty).is_some_and(|s| s.fetch)
    }

    /// Resource types with `fetch = true`, in launch order: known types first,
    /// then any others alphabetically.
    pub fn enabled(&self) -> Vec<(ResourceType, ResourceSettings)> {
        let mut out: Vec<(ResourceType, ResourceSettings)> = ResourceType::KNOWN
            .iter()
            .filter_map(|ty| {
                self.entries
                    .get(ty)
                    .filter(|s| s.fetch)
                    .map(|s| (ty.clone(), s.clone()))
            })
            .collect();
        out.extend(
            self.entries
                .iter()
                .filter(|(ty, s)| !ty.is_known() && s.fetch)
                .map(|(ty, s)| (ty.clone(), s.clone())),
        );
        out
    }

    /// `service_accounts.impersonate` as set in the file.
    pub fn impersonation_requested(&self) -> bool {
        self.get(&ResourceType::ServiceAccounts)
            .is_some_and(|s| s.flag("impersonate"))
    }
}

/// Everything the traversal and dispatcher need for one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub output_dir: PathBuf,
    pub project_workers: usize,
    pub resource_workers: usize,
    pub scan: ScanConfig,
    pub impersonation: bool,
    pub forced_projects: Vec<String>,
    /// Substring filter on project IDs.
    pub target_project: Option<String>,
    pub light_scan: bool,
    pub collector_timeout: Duration,
}

impl RunConfig {
    pub const DEFAULT_COLLECTOR_TIMEOUT: Duration = Duration::from_secs(300);

    pub fn new(output_dir: impl Into<PathBuf>, scan: ScanConfig) -> Self {
        let impersonation = scan.impersonation_requested();
        Self {
            output_dir: output_dir.into(),
            project_workers: 1,
            resource_workers: 1,
            scan,
            impersonation,
            forced_projects: Vec::new(),
            target_project: None,
            light_scan: false,
            collector_timeout: Self::DEFAULT_COLLECTOR_TIMEOUT,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.project_workers == 0 {
            return Err(ConfigError::InvalidWorkerCount {
                name: "project_workers",
                value: 0,
            });
        }
        if self.resource_workers == 0 {
            return Err(ConfigError::InvalidWorkerCount {
                name: "resource_workers",
                value: 0,
            });
        }
        Ok(())
    }
}
