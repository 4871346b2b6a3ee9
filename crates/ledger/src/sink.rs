//! Exclusive-create result files.
//!
//! A file is reserved before any collection starts for its task and written
//! once when collection ends. Reserving fails if the file already exists, so a
//! repeated run with a colliding name never overwrites an earlier result.

use crate::layout::FileLayout;
use crate::record::ScanRecord;
use crate::SinkError;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Creates and fills result files under a [`FileLayout`].
#[derive(Debug, Clone)]
pub struct ResultSink {
    layout: FileLayout,
    light: bool,
}

impl ResultSink {
    /// Creates the output directory if needed.
    ///
    /// # Errors
    /// Returns [`SinkError::IoError`] if the directory cannot be created.
    pub fn new(layout: FileLayout, light: bool) -> Result<Self, SinkError> {
        std::fs::create_dir_all(layout.out_dir())?;
        Ok(Self { layout, light })
    }

    pub fn layout(&self) -> &FileLayout {
        &self.layout
    }

    /// Atomically creates the file for `(project_id, identity)`.
    ///
    /// # Errors
    /// [`SinkError::Conflict`] if the file already exists, [`SinkError::IoError`]
    /// for any other failure.
    pub fn reserve(&self, project_id: &str, identity: &str) -> Result<PendingRecord, SinkError> {
        let path = self.layout.record_path(project_id, identity);
        let file = OpenOptions::new()
            .create_new(true)
            .append(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => SinkError::Conflict(path.clone()),
                _ => SinkError::IoError(e),
            })?;
        debug!(path = %path.display(), "reserved result file");
        Ok(PendingRecord {
            path,
            file,
            light: self.light,
        })
    }
}

/// A reserved, still empty result file.
#[derive(Debug)]
pub struct PendingRecord {
    path: PathBuf,
    file: File,
    light: bool,
}

impl PendingRecord {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serializes `record` into the reserved file and returns its path.
    pub fn commit(self, record: ScanRecord) -> Result<PathBuf, SinkError> {
        let record = if self.light {
            record.into_light()
        } else {
            record
        };
        let mut writer = BufWriter::new(self.file);
        serde_json::to_writer_pretty(&mut writer, &record)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Credential, Identity, Project, ResourceType, ScanTask};
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn record() -> ScanRecord {
        let task = ScanTask::new(
            Project::placeholder("p1"),
            Arc::new(Identity::seed("seed", Credential::new("t"))),
        );
        let mut record = ScanRecord::for_task(&task);
        record.insert(
            ResourceType::ComputeInstances,
            json!([{"name": "vm", "labels": {"a": "b"}}]),
        );
        record
    }

    #[test]
    fn test_reserve_and_commit() {
        let dir = tempfile::tempdir().unwrap();
        let sink = ResultSink::new(FileLayout::new(dir.path().join("out"), 7), false).unwrap();

        let pending = sink.reserve("p1", "seed").unwrap();
        assert!(pending.path().exists());
        let path = pending.commit(record()).unwrap();

        let written: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["current_service_account"], "seed");
        assert_eq!(
            written["projects"]["p1"]["compute_instances"][0]["labels"]["a"],
            "b"
        );
    }

    #[test]
    fn test_second_reserve_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let sink = ResultSink::new(FileLayout::new(dir.path(), 7), false).unwrap();

        sink.reserve("p1", "seed").unwrap().commit(record()).unwrap();
        let before = std::fs::read_to_string(sink.layout().record_path("p1", "seed")).unwrap();

        match sink.reserve("p1", "seed") {
            Err(SinkError::Conflict(path)) => {
                assert_eq!(path, sink.layout().record_path("p1", "seed"))
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        let after = std::fs::read_to_string(sink.layout().record_path("p1", "seed")).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_light_commit() {
        let dir = tempfile::tempdir().unwrap();
        let sink = ResultSink::new(FileLayout::new(dir.path(), 7), true).unwrap();

        let path = sink.reserve("p1", "seed").unwrap().commit(record()).unwrap();
        let written: Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        let vm = &written["projects"]["p1"]["compute_instances"][0];
        assert!(vm.get("labels").is_none());
        assert_eq!(vm["status"], Value::Null);
    }
}
