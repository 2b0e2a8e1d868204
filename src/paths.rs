//! Typed paths into the install-directory layout.
//!
//! Centralizing path construction keeps the store, manifest and lock on the
//! same naming scheme:
//!
//! ```text
//! <install_dir>/
//!   build_templates/          Vagrantfile + provisioning scripts
//!   boxes/
//!     <escaped>.json          manifest
//!     .<escaped>.lock         advisory writer lock
//!     <escaped>/<version>.box artifacts
//! ```
use crate::error::{BoxError, Result};
use crate::name::BoxName;
use std::path::{Component, Path, PathBuf};

pub const ARTIFACT_EXTENSION: &str = "box";

/// Convenience wrapper for locating box-store artifacts.
#[derive(Debug, Clone)]
pub struct BoxPaths {
    install_dir: PathBuf,
}

impl BoxPaths {
    /// Create a new path helper rooted at the install directory.
    pub fn new(install_dir: PathBuf) -> Self {
        Self { install_dir }
    }

    /// Return the `boxes/` directory path.
    pub fn boxes_dir(&self) -> PathBuf {
        self.install_dir.join("boxes")
    }

    /// Return the `build_templates/` directory path.
    pub fn build_templates_dir(&self) -> PathBuf {
        self.install_dir.join("build_templates")
    }

    /// Return the `boxes/<escaped>/` directory for a target box.
    pub fn box_dir(&self, name: &BoxName) -> PathBuf {
        self.boxes_dir().join(name.escaped())
    }

    /// Return the `boxes/<escaped>.json` manifest path.
    pub fn manifest_path(&self, name: &BoxName) -> PathBuf {
        self.boxes_dir().join(format!("{}.json", name.escaped()))
    }

    /// Return the `boxes/.<escaped>.lock` path.
    pub fn lock_path(&self, name: &BoxName) -> PathBuf {
        self.boxes_dir().join(format!(".{}.lock", name.escaped()))
    }

    /// Return the artifact path for one version; no lookup is involved.
    pub fn artifact_path(&self, name: &BoxName, version: u64) -> PathBuf {
        self.box_dir(name).join(artifact_file_name(version))
    }
}

/// File name of the artifact for `version`.
pub fn artifact_file_name(version: u64) -> String {
    format!("{version}.{ARTIFACT_EXTENSION}")
}

/// Artifact file name named by the last segment of a manifest URL.
///
/// Older manifests named artifacts `<box_id>.box`; the URL is the only record
/// of which file backs such an entry. `None` unless the segment is a plain,
/// non-hidden `*.box` file name.
pub fn artifact_file_name_from_url(url: &str) -> Option<&str> {
    let segment = url.rsplit('/').next()?;
    let stem = segment.strip_suffix(&format!(".{ARTIFACT_EXTENSION}"))?;
    let plain = !stem.is_empty()
        && !stem.starts_with('.')
        && !segment.contains(['\\', '?', '#', ':']);
    plain.then_some(segment)
}

/// Parse a version out of an artifact file name; `None` for anything else.
pub fn parse_artifact_file_name(file_name: &str) -> Option<u64> {
    let stem = file_name.strip_suffix(&format!(".{ARTIFACT_EXTENSION}"))?;
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    // Leading zeros would let two names map to the same version.
    if stem.len() > 1 && stem.starts_with('0') {
        return None;
    }
    stem.parse().ok()
}

/// Fail unless `path` stays inside `root` once `.` and `..` are resolved lexically.
pub fn ensure_within(root: &Path, path: &Path, label: &str) -> Result<PathBuf> {
    let normalized = normalize_lexically(path);
    let root = normalize_lexically(root);
    if normalized == root || !normalized.starts_with(&root) {
        return Err(BoxError::validation(format!(
            "{label} {} is not inside {}",
            normalized.display(),
            root.display()
        )));
    }
    Ok(normalized)
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Join a public base URL and relative segments with single slashes.
pub fn join_url(base: &str, segments: &[&str]) -> String {
    let mut url = base.trim_end_matches('/').to_string();
    for segment in segments {
        url.push('/');
        url.push_str(segment.trim_matches('/'));
    }
    url
}

#[cfg(test)]
#[path = "paths_tests.rs"]
mod tests;
