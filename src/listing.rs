//! Read-only view of a box: manifest versions joined with store contents.
use crate::config::Config;
use crate::error::{BoxError, Result};
use crate::manifest::ManifestManager;
use crate::name::BoxName;
use crate::paths::BoxPaths;
use crate::store::BoxStore;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListedVersion {
    pub version: u64,
    pub box_id: String,
    pub created_at: String,
    pub checksum: String,
    pub url: String,
    pub artifact_present: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoxListing {
    pub target_box: BoxName,
    /// Most recent first, in manifest order.
    pub versions: Vec<ListedVersion>,
    /// Store files with no manifest entry.
    pub orphaned_artifacts: Vec<u64>,
}

impl BoxListing {
    pub fn is_consistent(&self) -> bool {
        self.orphaned_artifacts.is_empty()
            && self.versions.iter().all(|entry| entry.artifact_present)
    }
}

pub fn list_box(config: &Config, name: &BoxName) -> Result<BoxListing> {
    let paths = BoxPaths::new(config.install_dir.clone());
    let manifests = ManifestManager::new(
        paths.clone(),
        config.public_base_url.clone(),
        config.provider.clone(),
    );
    if !manifests.exists(name) {
        return Err(BoxError::not_found(format!(
            "no manifest for {name} at {}",
            manifests.manifest_path(name).display()
        )));
    }
    let manifest = manifests.load(name)?;
    let store = BoxStore::new(paths);

    let versions = manifest
        .versions
        .iter()
        .map(|entry| ListedVersion {
            version: entry.version,
            box_id: entry.box_id.clone(),
            created_at: entry.created_at.clone(),
            checksum: entry.checksum.clone(),
            url: entry.url.clone(),
            artifact_present: store.path_for_entry(name, entry).is_file(),
        })
        .collect();
    let orphaned_artifacts = store.orphaned_versions(name, &manifest)?;

    Ok(BoxListing {
        target_box: name.clone(),
        versions,
        orphaned_artifacts,
    })
}
