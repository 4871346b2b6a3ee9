//! Output file naming.

use std::path::{Path, PathBuf};

/// Where a run's result files land.
///
/// Layout: `{out_dir}/{project_id}-{identity}-{run_stamp}.json`, one file per
/// (project, identity) pair of a run.
#[derive(Debug, Clone)]
pub struct FileLayout {
    out_dir: PathBuf,
    run_stamp: u64,
}

impl FileLayout {
    pub fn new(out_dir: impl Into<PathBuf>, run_stamp: u64) -> Self {
        Self {
            out_dir: out_dir.into(),
            run_stamp,
        }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    pub fn run_stamp(&self) -> u64 {
        self.run_stamp
    }

    pub fn record_path(&self, project_id: &str, identity: &str) -> PathBuf {
        self.out_dir.join(format!(
            "{}-{}-{}.json",
            sanitize(project_id),
            sanitize(identity),
            self.run_stamp
        ))
    }

    pub fn graph_path(&self) -> PathBuf {
        self.out_dir
            .join(format!("impersonation-graph-{}.dot", self.run_stamp))
    }
}

/// Replaces anything outside `[A-Za-z0-9@._-]` with `_`.
///
/// When something was replaced, a short hash of the raw name is appended so
/// that `a:b` and `a_b` do not share a file.
fn sanitize(component: &str) -> String {
    let mut clean: String = component
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '@' | '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if clean != component {
        let digest = blake3::hash(component.as_bytes()).to_hex();
        clean.push('~');
        clean.push_str(&digest.as_str()[..8]);
    }
    clean
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_path() {
        let layout = FileLayout::new("/tmp/scan", 1700000000);
        assert_eq!(
            layout.record_path("acme-prod", "sa@acme.iam.gserviceaccount.com"),
            PathBuf::from("/tmp/scan/acme-prod-sa@acme.iam.gserviceaccount.com-1700000000.json")
        );
    }

    #[test]
    fn test_sanitize_blocks_traversal() {
        let layout = FileLayout::new("out", 1);
        let path = layout.record_path("p", "../../etc/passwd token");
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("p-.._.._etc_passwd_token~"));
        assert!(name.ends_with("-1.json"));
        assert!(!name.contains('/'));
        assert_eq!(path.parent(), Some(Path::new("out")));
    }

    #[test]
    fn test_sanitized_names_stay_distinct() {
        let layout = FileLayout::new("out", 1);
        let replaced = layout.record_path("p", "a:b");
        let plain = layout.record_path("p", "a_b");
        assert_ne!(replaced, plain);
        assert_eq!(plain, PathBuf::from("out/p-a_b-1.json"));
        assert_eq!(replaced, layout.record_path("p", "a:b"));
        assert_ne!(replaced, layout.record_path("p", "a/b"));
    }
}
