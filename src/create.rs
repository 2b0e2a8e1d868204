//! Build orchestration: source box + provisioning script -> new box version.
//!
//! The VM work is delegated to vagrant inside a private scratch copy of
//! `build_templates/`. Publishing writes the artifact first and the manifest
//! second; if the manifest save fails, the artifact is left as an orphan
//! that the next prune removes.
use crate::config::Config;
use crate::error::{BoxError, IoContext, Result};
use crate::lock::BoxLock;
use crate::manifest::{ManifestManager, NewVersion};
use crate::name::{BoxId, BoxName};
use crate::paths::{ensure_within, BoxPaths};
use crate::store::BoxStore;
use crate::templates;
use crate::util::now_rfc3339;
use crate::vagrant::Vagrant;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

const BUILD_DIR_PREFIX: &str = "vagrant_box_build-";
const PACKAGE_FILE_NAME: &str = "package.box";

/// One `create` invocation.
#[derive(Debug, Clone)]
pub struct CreateRequest {
    /// Box the build starts from, e.g. `ubuntu/trusty64`.
    pub source_box: String,
    /// File name of a script in `build_templates/`.
    pub provision_script: String,
    pub target_box: BoxName,
    pub box_id: BoxId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateReport {
    pub target_box: BoxName,
    pub version: u64,
    pub box_id: BoxId,
    pub checksum: String,
    pub url: String,
    pub artifact: PathBuf,
    pub size_bytes: u64,
}

pub struct Builder {
    config: Config,
    paths: BoxPaths,
    manifests: ManifestManager,
    store: BoxStore,
}

impl Builder {
    pub fn new(config: &Config) -> Self {
        let paths = BoxPaths::new(config.install_dir.clone());
        Self {
            config: config.clone(),
            manifests: ManifestManager::new(
                paths.clone(),
                config.public_base_url.clone(),
                config.provider.clone(),
            ),
            store: BoxStore::new(paths.clone()),
            paths,
        }
    }

    pub fn create(&self, request: &CreateRequest) -> Result<CreateReport> {
        let templates_dir = self.paths.build_templates_dir();
        let script_path = self.provision_script_path(&templates_dir, &request.provision_script)?;
        ensure_private(&templates_dir)?;
        let vagrant = Vagrant::from_config(&self.config)?;

        let build_dir = BuildDir::create(
            &self.config.build_root,
            &request.box_id,
            &templates_dir,
            vagrant.clone(),
        )?;
        tracing::info!(
            source_box = %request.source_box,
            provision_script = %script_path.display(),
            build_dir = %build_dir.path().display(),
            "building box"
        );

        let env = [
            ("SOURCE_BOX", request.source_box.as_str()),
            ("PROVISION_SCRIPT", request.provision_script.as_str()),
        ];
        vagrant.run(build_dir.path(), &env, &["up"])?;
        tracing::info!("provisioning done");

        let package = build_dir.path().join(PACKAGE_FILE_NAME);
        let package_arg = package.to_string_lossy().to_string();
        vagrant.run(
            build_dir.path(),
            &env,
            &["package", "--output", &package_arg],
        )?;
        if !package.is_file() {
            return Err(BoxError::Build {
                command: "vagrant package".to_string(),
                detail: format!("no box was written to {}", package.display()),
            });
        }
        tracing::info!(package = %package.display(), "export done");

        self.publish(request, &package)
    }

    /// Import a packaged box and record it in the manifest as `max + 1`.
    pub fn publish(&self, request: &CreateRequest, package: &Path) -> Result<CreateReport> {
        let name = &request.target_box;
        let _lock = BoxLock::acquire(&self.paths, name)?;
        let mut manifest = self.manifests.load(name)?;
        let version = manifest.next_version();

        let stored = self.store.import_artifact(name, version, package)?;
        tracing::info!(
            box_name = %name,
            version,
            artifact = %stored.path.display(),
            checksum = %stored.checksum,
            "artifact stored"
        );

        if manifest.description.is_none() {
            manifest.description = Some(format!(
                "Generated from source box '{}' using provisioning script '{}'",
                request.source_box, request.provision_script
            ));
        }
        let url = self
            .manifests
            .append(
                &mut manifest,
                NewVersion {
                    version: Some(version),
                    box_id: request.box_id.to_string(),
                    checksum: stored.checksum.clone(),
                    created_at: now_rfc3339(),
                },
            )?
            .url
            .clone();
        self.manifests.save(&manifest)?;
        tracing::info!(box_name = %name, version, %url, "manifest updated");

        Ok(CreateReport {
            target_box: name.clone(),
            version,
            box_id: request.box_id.clone(),
            checksum: stored.checksum,
            url,
            artifact: stored.path,
            size_bytes: stored.size_bytes,
        })
    }

    fn provision_script_path(&self, templates_dir: &Path, script: &str) -> Result<PathBuf> {
        let is_plain_name = Path::new(script)
            .file_name()
            .is_some_and(|name| name == script);
        if !is_plain_name {
            return Err(BoxError::validation(format!(
                "provisioning script must be a file name inside {} (got {script:?})",
                templates_dir.display()
            )));
        }
        let path = templates_dir.join(script);
        if !path.is_file() {
            return Err(BoxError::validation(format!(
                "provisioning script '{script}' does not exist in '{}'",
                templates_dir.display()
            )));
        }
        Ok(path)
    }
}

/// The build directory receives a full guest root filesystem, so the template
/// it is copied from must not be readable by other users.
#[cfg(unix)]
fn ensure_private(templates_dir: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mode = fs::metadata(templates_dir)
        .io_context(|| format!("inspect {}", templates_dir.display()))?
        .permissions()
        .mode();
    if mode & 0o004 != 0 {
        return Err(BoxError::validation(format!(
            "build template directory '{}' is world readable",
            templates_dir.display()
        )));
    }
    Ok(())
}

#[cfg(not(unix))]
fn ensure_private(templates_dir: &Path) -> Result<()> {
    fs::metadata(templates_dir).io_context(|| format!("inspect {}", templates_dir.display()))?;
    Ok(())
}

/// Scratch directory for one build; the VM is destroyed and the directory
/// removed when this value is dropped.
struct BuildDir {
    path: PathBuf,
    vagrant: Vagrant,
}

impl BuildDir {
    fn create(
        build_root: &Path,
        box_id: &BoxId,
        templates_dir: &Path,
        vagrant: Vagrant,
    ) -> Result<Self> {
        let candidate = build_root.join(format!("{BUILD_DIR_PREFIX}{box_id}"));
        let path = ensure_within(build_root, &candidate, "build directory")?;
        if path.exists() {
            return Err(BoxError::validation(format!(
                "build directory {} already exists; remove it or use a different box id",
                path.display()
            )));
        }
        fs::create_dir_all(build_root).io_context(|| format!("create {}", build_root.display()))?;
        create_private_dir(&path)?;
        // From here on, Drop cleans up even if the copy fails part way.
        let build_dir = Self { path, vagrant };
        copy_dir_contents(templates_dir, &build_dir.path)?;

        let vagrantfile = build_dir.path.join("Vagrantfile");
        if !vagrantfile.exists() {
            fs::write(&vagrantfile, templates::VAGRANTFILE)
                .io_context(|| format!("write {}", vagrantfile.display()))?;
            tracing::debug!(path = %vagrantfile.display(), "wrote default Vagrantfile");
        }
        Ok(build_dir)
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for BuildDir {
    fn drop(&mut self) {
        tracing::info!(path = %self.path.display(), "cleaning up build directory");
        match self.vagrant.run_unchecked(&self.path, &[], &["destroy", "-f"]) {
            Ok(output) if !output.status.success() => {
                tracing::warn!(status = %output.status, "vagrant destroy failed");
            }
            Ok(_) => {}
            Err(err) => tracing::warn!("vagrant destroy failed: {err}"),
        }
        if let Err(err) = fs::remove_dir_all(&self.path) {
            tracing::warn!(path = %self.path.display(), "remove build directory: {err}");
        }
    }
}

#[cfg(unix)]
fn create_private_dir(path: &Path) -> Result<()> {
    use std::os::unix::fs::DirBuilderExt;

    fs::DirBuilder::new()
        .mode(0o700)
        .create(path)
        .io_context(|| format!("create {}", path.display()))
}

#[cfg(not(unix))]
fn create_private_dir(path: &Path) -> Result<()> {
    fs::create_dir(path).io_context(|| format!("create {}", path.display()))
}

/// Recursive copy; `fs::copy` carries permission bits across.
fn copy_dir_contents(from: &Path, to: &Path) -> Result<()> {
    for entry in fs::read_dir(from).io_context(|| format!("read {}", from.display()))? {
        let entry = entry.io_context(|| format!("read {}", from.display()))?;
        let source = entry.path();
        let dest = to.join(entry.file_name());
        let file_type = entry
            .file_type()
            .io_context(|| format!("inspect {}", source.display()))?;
        if file_type.is_dir() {
            fs::create_dir_all(&dest).io_context(|| format!("create {}", dest.display()))?;
            copy_dir_contents(&source, &dest)?;
        } else {
            fs::copy(&source, &dest)
                .io_context(|| format!("copy {} to {}", source.display(), dest.display()))?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "create_tests.rs"]
mod tests;
