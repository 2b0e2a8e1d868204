//! Version manifests consumed by `vagrant box add` / `vagrant box outdated`.
//!
//! One JSON document per target box lives at `boxes/<escaped>.json`. The
//! `versions` list is kept sorted by version number, most recent first, and is
//! always written with an atomic rename so readers never see a partial file.
use crate::error::{BoxError, IoContext, Result};
use crate::name::BoxName;
use crate::paths::{self, BoxPaths};
use crate::util::publish_tempfile;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::PathBuf;

pub const CHECKSUM_TYPE: &str = "sha256";

/// Manifest document for one target box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub name: BoxName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub versions: Vec<BoxVersion>,
    /// Keys written by other tools; carried through load/save untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One published version of a target box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxVersion {
    #[serde(with = "version_string")]
    pub version: u64,
    #[serde(default)]
    pub box_id: String,
    #[serde(default)]
    pub checksum: String,
    #[serde(default = "default_checksum_type")]
    pub checksum_type: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub providers: Vec<Provider>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Vagrant provider entry; mirrors `url` and `checksum` of its version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    pub name: String,
    pub url: String,
    #[serde(default = "default_checksum_type")]
    pub checksum_type: String,
    #[serde(default)]
    pub checksum: String,
}

/// Inputs for [`ManifestManager::append`].
#[derive(Debug, Clone)]
pub struct NewVersion {
    /// Explicit version number; `None` assigns `max + 1`.
    pub version: Option<u64>,
    pub box_id: String,
    pub checksum: String,
    pub created_at: String,
}

fn default_checksum_type() -> String {
    CHECKSUM_TYPE.to_string()
}

/// Vagrant expects quoted version numbers; older manifests may carry bare integers.
mod version_string {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(version: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(version)
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Number(value) => Ok(value),
            Raw::Text(text) => text.trim().parse().map_err(|_| {
                de::Error::custom(format!("version must be a non-negative integer (got {text:?})"))
            }),
        }
    }
}

impl Manifest {
    /// A manifest with no versions, as returned for a box never built before.
    pub fn empty(name: BoxName) -> Self {
        Self {
            name,
            description: None,
            versions: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn version_numbers(&self) -> BTreeSet<u64> {
        self.versions.iter().map(|entry| entry.version).collect()
    }

    pub fn latest(&self) -> Option<&BoxVersion> {
        self.versions.first()
    }

    pub fn get(&self, version: u64) -> Option<&BoxVersion> {
        self.versions.iter().find(|entry| entry.version == version)
    }

    /// Highest version number plus one; 1 for an empty manifest.
    pub fn next_version(&self) -> u64 {
        self.versions
            .iter()
            .map(|entry| entry.version)
            .max()
            .map_or(1, |max| max + 1)
    }

    /// Remove every listed version, or nothing if any of them is absent.
    pub fn remove(&mut self, versions: &BTreeSet<u64>) -> Result<Vec<BoxVersion>> {
        let present = self.version_numbers();
        let missing: Vec<String> = versions
            .difference(&present)
            .map(|version| version.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(BoxError::not_found(format!(
                "{} has no version(s) {}",
                self.name,
                missing.join(", ")
            )));
        }
        let (removed, kept): (Vec<_>, Vec<_>) = self
            .versions
            .drain(..)
            .partition(|entry| versions.contains(&entry.version));
        self.versions = kept;
        Ok(removed)
    }

    /// Sort most-recent-first, reject duplicates, and backfill top-level
    /// `url`/`checksum` from the first provider for manifests written by
    /// provider-only tooling.
    fn normalize(&mut self) -> Result<()> {
        self.versions.sort_by(|a, b| b.version.cmp(&a.version));
        if let Some(pair) = self
            .versions
            .windows(2)
            .find(|pair| pair[0].version == pair[1].version)
        {
            return Err(BoxError::validation(format!(
                "{} lists version {} more than once",
                self.name, pair[0].version
            )));
        }
        for entry in &mut self.versions {
            let Some(provider) = entry.providers.first() else {
                continue;
            };
            if entry.url.is_empty() {
                entry.url = provider.url.clone();
            }
            if entry.checksum.is_empty() {
                entry.checksum = provider.checksum.clone();
                entry.checksum_type = provider.checksum_type.clone();
            }
        }
        Ok(())
    }
}

/// Reads and writes manifests under an install directory.
#[derive(Debug, Clone)]
pub struct ManifestManager {
    paths: BoxPaths,
    public_base_url: String,
    provider: String,
}

impl ManifestManager {
    pub fn new(paths: BoxPaths, public_base_url: String, provider: String) -> Self {
        Self {
            paths,
            public_base_url,
            provider,
        }
    }

    pub fn manifest_path(&self, name: &BoxName) -> PathBuf {
        self.paths.manifest_path(name)
    }

    pub fn exists(&self, name: &BoxName) -> bool {
        self.manifest_path(name).is_file()
    }

    /// Public URL of the artifact for `version`.
    pub fn artifact_url(&self, name: &BoxName, version: u64) -> String {
        paths::join_url(
            &self.public_base_url,
            &[&name.escaped(), &paths::artifact_file_name(version)],
        )
    }

    /// Load the manifest for `name`; an absent file yields an empty manifest.
    pub fn load(&self, name: &BoxName) -> Result<Manifest> {
        let path = self.manifest_path(name);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Ok(Manifest::empty(name.clone()));
            }
            Err(source) => {
                return Err(BoxError::Io {
                    context: format!("read manifest {}", path.display()),
                    source,
                })
            }
        };
        let mut manifest: Manifest =
            serde_json::from_slice(&bytes).map_err(|source| BoxError::Manifest {
                path: path.clone(),
                source,
            })?;
        if &manifest.name != name {
            return Err(BoxError::validation(format!(
                "manifest {} names box {} (expected {name})",
                path.display(),
                manifest.name
            )));
        }
        manifest.normalize()?;
        Ok(manifest)
    }

    /// Add a version to `manifest`, keeping most-recent-first order.
    pub fn append<'m>(
        &self,
        manifest: &'m mut Manifest,
        new_version: NewVersion,
    ) -> Result<&'m BoxVersion> {
        let next = manifest.next_version();
        let version = match new_version.version {
            Some(version) if manifest.get(version).is_some() => {
                return Err(BoxError::validation(format!(
                    "{} already has version {version}",
                    manifest.name
                )));
            }
            Some(version) if version < next => {
                return Err(BoxError::validation(format!(
                    "version {version} for {} must be greater than {}",
                    manifest.name,
                    next - 1
                )));
            }
            Some(version) => version,
            None => next,
        };
        let url = self.artifact_url(&manifest.name, version);
        let entry = BoxVersion {
            version,
            box_id: new_version.box_id,
            checksum: new_version.checksum.clone(),
            checksum_type: CHECKSUM_TYPE.to_string(),
            url: url.clone(),
            created_at: new_version.created_at,
            providers: vec![Provider {
                name: self.provider.clone(),
                url,
                checksum_type: CHECKSUM_TYPE.to_string(),
                checksum: new_version.checksum,
            }],
            extra: Map::new(),
        };
        manifest.versions.insert(0, entry);
        Ok(&manifest.versions[0])
    }

    /// Write `manifest` via a temp file in the same directory plus rename.
    pub fn save(&self, manifest: &Manifest) -> Result<()> {
        let path = self.manifest_path(&manifest.name);
        let parent = self.paths.boxes_dir();
        fs::create_dir_all(&parent).io_context(|| format!("create {}", parent.display()))?;

        let mut text =
            serde_json::to_vec_pretty(manifest).map_err(|source| BoxError::Manifest {
                path: path.clone(),
                source,
            })?;
        text.push(b'\n');

        let prefix = format!(".{}.", manifest.name.escaped());
        let mut tmp = publish_tempfile(&parent, &prefix, ".tmp")
            .io_context(|| format!("create temp file in {}", parent.display()))?;
        tmp.write_all(&text)
            .io_context(|| format!("write {}", tmp.path().display()))?;
        tmp.as_file()
            .sync_all()
            .io_context(|| format!("sync {}", tmp.path().display()))?;
        tmp.persist(&path)
            .map_err(|err| BoxError::Io {
                context: format!("publish manifest {}", path.display()),
                source: err.error,
            })?;
        tracing::debug!(path = %path.display(), versions = manifest.versions.len(), "manifest saved");
        Ok(())
    }
}

#[cfg(test)]
#[path = "manifest_tests.rs"]
mod tests;
