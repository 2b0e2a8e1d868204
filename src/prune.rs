//! Retention: keep the N most recent versions of a box, delete the rest.
//!
//! Artifacts are deleted first and the manifest is saved last, so an
//! interrupted prune can be re-run: already-deleted files show up as tolerated
//! misses and the manifest converges to the same target state.
use crate::config::Config;
use crate::error::{BoxError, Result};
use crate::lock::BoxLock;
use crate::manifest::{Manifest, ManifestManager};
use crate::name::BoxName;
use crate::paths::BoxPaths;
use crate::store::BoxStore;
use serde::Serialize;
use std::collections::BTreeSet;

/// Outcome of one prune, most recent versions first in each list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    pub target_box: BoxName,
    pub kept: Vec<u64>,
    pub removed: Vec<u64>,
    /// Removed versions whose artifact was already gone.
    pub missing_artifacts: Vec<u64>,
    /// Store files with no manifest entry, deleted to restore consistency.
    pub orphans_removed: Vec<u64>,
}

impl PruneReport {
    pub fn is_noop(&self) -> bool {
        self.removed.is_empty() && self.orphans_removed.is_empty()
    }
}

pub struct Pruner {
    paths: BoxPaths,
    manifests: ManifestManager,
    store: BoxStore,
}

/// Versions to drop so that only the `keep_n` highest remain, highest first.
pub fn select_for_removal(manifest: &Manifest, keep_n: usize) -> Vec<u64> {
    let mut versions: Vec<u64> = manifest.versions.iter().map(|entry| entry.version).collect();
    versions.sort_unstable_by(|a, b| b.cmp(a));
    versions.into_iter().skip(keep_n).collect()
}

impl Pruner {
    pub fn new(config: &Config) -> Self {
        let paths = BoxPaths::new(config.install_dir.clone());
        Self {
            manifests: ManifestManager::new(
                paths.clone(),
                config.public_base_url.clone(),
                config.provider.clone(),
            ),
            store: BoxStore::new(paths.clone()),
            paths,
        }
    }

    /// Keep the `keep_n` most recent versions of `name` and delete the rest.
    ///
    /// With `keep_n` at or above the version count the manifest is left
    /// untouched, but store files no entry points at are still deleted, so
    /// such a prune is a no-op only for a store that already matches its
    /// manifest. `PruneReport::is_noop` tells the two apart.
    pub fn prune(&self, name: &BoxName, keep_n: usize) -> Result<PruneReport> {
        // Manifests are never deleted, so checking before locking is enough.
        if !self.manifests.exists(name) {
            return Err(BoxError::not_found(format!(
                "no manifest for {name} at {}",
                self.manifests.manifest_path(name).display()
            )));
        }
        let _lock = BoxLock::acquire(&self.paths, name)?;
        let mut manifest = self.manifests.load(name)?;
        let to_remove = select_for_removal(&manifest, keep_n);
        tracing::info!(
            box_name = %name,
            keep_n,
            total = manifest.versions.len(),
            removing = to_remove.len(),
            "pruning box versions"
        );

        let mut missing_artifacts = Vec::new();
        for entry in manifest
            .versions
            .iter()
            .filter(|entry| to_remove.contains(&entry.version))
        {
            let deleted = self.store.delete_entry_artifact(name, entry);
            if tolerate_missing(name, entry.version, deleted)? {
                tracing::info!(box_name = %name, version = entry.version, "removed box version");
            } else {
                missing_artifacts.push(entry.version);
            }
        }

        let mut orphans_removed = Vec::new();
        for version in self.store.orphaned_versions(name, &manifest)? {
            let deleted = self.store.delete_artifact(name, version);
            if tolerate_missing(name, version, deleted)? {
                tracing::info!(box_name = %name, version, "removed orphaned artifact");
                orphans_removed.push(version);
            }
        }

        if !to_remove.is_empty() {
            let remove_set: BTreeSet<u64> = to_remove.iter().copied().collect();
            manifest.remove(&remove_set)?;
            self.manifests.save(&manifest)?;
            tracing::info!(
                box_name = %name,
                latest = ?manifest.latest().map(|entry| entry.version),
                "manifest updated"
            );
        }

        Ok(PruneReport {
            target_box: name.clone(),
            kept: manifest.versions.iter().map(|entry| entry.version).collect(),
            removed: to_remove,
            missing_artifacts,
            orphans_removed,
        })
    }
}

/// Map a delete result to `Ok(false)` when the artifact was already absent.
fn tolerate_missing(name: &BoxName, version: u64, deleted: Result<()>) -> Result<bool> {
    match deleted {
        Ok(()) => Ok(true),
        Err(err) if err.is_not_found() => {
            tracing::warn!(box_name = %name, version, "{err}; continuing");
            Ok(false)
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
#[path = "prune_tests.rs"]
mod tests;
