//! Box artifact storage: one `<version>.box` file per published version.
//!
//! Artifacts are streamed into a temp file inside the box directory and only
//! renamed into place once fully written and hashed. An interrupted write drops
//! the temp file, so the store never holds a truncated artifact under a
//! version name. Entries from manifests that predate versioned file names
//! point at `<box_id>.box` through their URL instead.
use crate::error::{BoxError, IoContext, Result};
use crate::manifest::{BoxVersion, Manifest};
use crate::name::BoxName;
use crate::paths::{
    artifact_file_name_from_url, ensure_within, parse_artifact_file_name, BoxPaths,
};
use crate::util::publish_tempfile;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

const COPY_BUFFER_BYTES: usize = 64 * 1024;

/// Result of writing an artifact into the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    pub path: PathBuf,
    /// Lowercase hex SHA-256 of the artifact bytes.
    pub checksum: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct BoxStore {
    paths: BoxPaths,
}

impl BoxStore {
    pub fn new(paths: BoxPaths) -> Self {
        Self { paths }
    }

    pub fn path_for(&self, name: &BoxName, version: u64) -> PathBuf {
        self.paths.artifact_path(name, version)
    }

    /// Stream `reader` into the artifact slot for `version`, replacing any
    /// existing file only after the new one is complete.
    pub fn write_artifact<R: Read>(
        &self,
        name: &BoxName,
        version: u64,
        mut reader: R,
    ) -> Result<StoredArtifact> {
        let box_dir = ensure_within(
            &self.paths.boxes_dir(),
            &self.paths.box_dir(name),
            "box directory",
        )?;
        fs::create_dir_all(&box_dir).io_context(|| format!("create {}", box_dir.display()))?;
        let dest = self.path_for(name, version);

        let prefix = format!(".{version}.");
        let mut tmp = publish_tempfile(&box_dir, &prefix, ".partial")
            .io_context(|| format!("create temp artifact in {}", box_dir.display()))?;

        let mut hasher = Sha256::new();
        let mut buffer = vec![0_u8; COPY_BUFFER_BYTES];
        let mut size_bytes = 0_u64;
        loop {
            let read = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(read) => read,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(source) => {
                    return Err(BoxError::Io {
                        context: format!("read artifact source for {}", dest.display()),
                        source,
                    })
                }
            };
            hasher.update(&buffer[..read]);
            tmp.write_all(&buffer[..read])
                .io_context(|| format!("write {}", dest.display()))?;
            size_bytes += read as u64;
        }
        tmp.as_file()
            .sync_all()
            .io_context(|| format!("sync {}", dest.display()))?;
        tmp.persist(&dest).map_err(|err| BoxError::Io {
            context: format!("publish artifact {}", dest.display()),
            source: err.error,
        })?;

        let checksum = hex::encode(hasher.finalize());
        tracing::debug!(path = %dest.display(), size_bytes, %checksum, "artifact stored");
        Ok(StoredArtifact {
            path: dest,
            checksum,
            size_bytes,
        })
    }

    /// Copy a file produced elsewhere (e.g. `package.box`) into the store.
    pub fn import_artifact(
        &self,
        name: &BoxName,
        version: u64,
        source: &Path,
    ) -> Result<StoredArtifact> {
        let file = File::open(source).io_context(|| format!("open {}", source.display()))?;
        self.write_artifact(name, version, file)
    }

    /// File backing a manifest entry: `<version>.box`, or for entries written
    /// under the older `<box_id>.box` scheme, the file their URL names.
    pub fn path_for_entry(&self, name: &BoxName, entry: &BoxVersion) -> PathBuf {
        match artifact_file_name_from_url(&entry.url) {
            Some(file_name) => self.paths.box_dir(name).join(file_name),
            None => self.path_for(name, entry.version),
        }
    }

    pub fn delete_artifact(&self, name: &BoxName, version: u64) -> Result<()> {
        self.delete_file(name, version, self.path_for(name, version))
    }

    /// Delete the file backing `entry`; `NotFound` if it is already gone.
    pub fn delete_entry_artifact(&self, name: &BoxName, entry: &BoxVersion) -> Result<()> {
        self.delete_file(name, entry.version, self.path_for_entry(name, entry))
    }

    fn delete_file(&self, name: &BoxName, version: u64, path: PathBuf) -> Result<()> {
        let path = ensure_within(&self.paths.box_dir(name), &path, "artifact")?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(BoxError::not_found(format!(
                "artifact for {name} version {version} not found at {}",
                path.display()
            ))),
            Err(source) => Err(BoxError::Io {
                context: format!("remove {}", path.display()),
                source,
            }),
        }
    }

    /// `<version>.box` files that no manifest entry points at, most recent first.
    pub fn orphaned_versions(&self, name: &BoxName, manifest: &Manifest) -> Result<Vec<u64>> {
        let referenced: BTreeSet<PathBuf> = manifest
            .versions
            .iter()
            .map(|entry| self.path_for_entry(name, entry))
            .collect();
        let mut orphans: Vec<u64> = self
            .list_versions(name)?
            .into_iter()
            .filter(|&version| !referenced.contains(&self.path_for(name, version)))
            .collect();
        orphans.reverse();
        Ok(orphans)
    }

    /// Versions with an artifact file present; empty if the box directory is absent.
    pub fn list_versions(&self, name: &BoxName) -> Result<BTreeSet<u64>> {
        let box_dir = self.paths.box_dir(name);
        let entries = match fs::read_dir(&box_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(BTreeSet::new()),
            Err(source) => {
                return Err(BoxError::Io {
                    context: format!("read {}", box_dir.display()),
                    source,
                })
            }
        };
        let mut versions = BTreeSet::new();
        for entry in entries {
            let entry = entry.io_context(|| format!("read {}", box_dir.display()))?;
            let is_file = entry
                .file_type()
                .io_context(|| format!("inspect {}", entry.path().display()))?
                .is_file();
            if !is_file {
                continue;
            }
            if let Some(version) = entry.file_name().to_str().and_then(parse_artifact_file_name) {
                versions.insert(version);
            }
        }
        Ok(versions)
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
