use super::{select_for_removal, Pruner};
use crate::config::Config;
use crate::manifest::{Manifest, ManifestManager, NewVersion};
use crate::name::BoxName;
use crate::paths::BoxPaths;
use crate::store::BoxStore;
use std::collections::BTreeSet;
use std::path::Path;

struct Fixture {
    _dir: tempfile::TempDir,
    config: Config,
    manifests: ManifestManager,
    store: BoxStore,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let config = Config {
            install_dir: dir.path().to_path_buf(),
            build_root: dir.path().join("build"),
            public_base_url: "http://boxes.example.com".to_string(),
            ..Config::default()
        };
        let paths = BoxPaths::new(config.install_dir.clone());
        Self {
            manifests: ManifestManager::new(
                paths.clone(),
                config.public_base_url.clone(),
                config.provider.clone(),
            ),
            store: BoxStore::new(paths),
            config,
            _dir: dir,
        }
    }

    fn root(&self) -> &Path {
        &self.config.install_dir
    }

    /// Publish versions the way `create` does: artifact first, then manifest.
    fn publish(&self, name: &BoxName, ids: &[&str]) {
        let mut manifest = self.manifests.load(name).expect("load");
        for id in ids {
            let version = manifest.next_version();
            let stored = self
                .store
                .write_artifact(name, version, id.as_bytes())
                .expect("write artifact");
            self.manifests
                .append(
                    &mut manifest,
                    NewVersion {
                        version: Some(version),
                        box_id: id.to_string(),
                        checksum: stored.checksum,
                        created_at: "2026-10-16T12:00:00Z".to_string(),
                    },
                )
                .expect("append");
        }
        self.manifests.save(&manifest).expect("save");
    }

    fn manifest_versions(&self, name: &BoxName) -> BTreeSet<u64> {
        self.manifests.load(name).expect("load").version_numbers()
    }

    fn store_versions(&self, name: &BoxName) -> BTreeSet<u64> {
        self.store.list_versions(name).expect("list")
    }
}

fn name() -> BoxName {
    BoxName::parse("acme/trusty64").expect("box name")
}

#[test]
fn keeps_only_most_recent_versions() {
    let fx = Fixture::new();
    fx.publish(&name(), &["a1", "a2", "a3"]);
    assert_eq!(fx.manifest_versions(&name()), BTreeSet::from([1, 2, 3]));

    let report = Pruner::new(&fx.config).prune(&name(), 1).expect("prune");
    assert_eq!(report.kept, vec![3]);
    assert_eq!(report.removed, vec![2, 1]);
    assert!(report.missing_artifacts.is_empty());

    assert_eq!(fx.manifest_versions(&name()), BTreeSet::from([3]));
    assert_eq!(fx.store_versions(&name()), BTreeSet::from([3]));
}

#[test]
fn prune_twice_is_idempotent() {
    let fx = Fixture::new();
    fx.publish(&name(), &["a1", "a2", "a3", "a4"]);
    let pruner = Pruner::new(&fx.config);
    pruner.prune(&name(), 2).expect("first prune");
    let manifest_path = fx.manifests.manifest_path(&name());
    let first = std::fs::read(&manifest_path).expect("read manifest");

    let report = pruner.prune(&name(), 2).expect("second prune");
    assert!(report.is_noop());
    let second = std::fs::read(&manifest_path).expect("read manifest");
    assert_eq!(first, second);
}

#[test]
fn keep_at_least_count_is_noop() {
    let fx = Fixture::new();
    fx.publish(&name(), &["a1", "a2"]);
    let before = std::fs::read(fx.manifests.manifest_path(&name())).expect("read");

    for keep in [2, 5] {
        let report = Pruner::new(&fx.config).prune(&name(), keep).expect("prune");
        assert!(report.is_noop());
    }
    let after = std::fs::read(fx.manifests.manifest_path(&name())).expect("read");
    assert_eq!(before, after);
    assert_eq!(fx.store_versions(&name()), BTreeSet::from([1, 2]));
}

#[test]
fn prune_to_zero_leaves_empty_manifest() {
    let fx = Fixture::new();
    fx.publish(&name(), &["a1", "a2"]);
    Pruner::new(&fx.config).prune(&name(), 0).expect("prune");
    assert!(fx.manifests.exists(&name()));
    assert_eq!(fx.manifests.load(&name()).expect("load"), Manifest::empty(name()));
    assert!(fx.store_versions(&name()).is_empty());
}

#[test]
fn missing_manifest_is_not_found() {
    let fx = Fixture::new();
    let err = Pruner::new(&fx.config)
        .prune(&name(), 1)
        .expect_err("no manifest");
    assert!(err.is_not_found());
    assert!(!fx.root().join("boxes").join("acme_trusty64.json").exists());
}

#[test]
fn missing_artifacts_are_tolerated() {
    let fx = Fixture::new();
    fx.publish(&name(), &["a1", "a2", "a3"]);
    fx.store.delete_artifact(&name(), 1).expect("simulate earlier partial prune");

    let report = Pruner::new(&fx.config).prune(&name(), 1).expect("prune");
    assert_eq!(report.missing_artifacts, vec![1]);
    assert_eq!(fx.manifest_versions(&name()), BTreeSet::from([3]));
    assert_eq!(fx.store_versions(&name()), BTreeSet::from([3]));
}

#[test]
fn orphaned_artifacts_are_reconciled() {
    let fx = Fixture::new();
    fx.publish(&name(), &["a1", "a2"]);
    // A create whose manifest save failed leaves its artifact behind.
    fx.store
        .write_artifact(&name(), 3, &b"orphan"[..])
        .expect("orphan");

    let report = Pruner::new(&fx.config).prune(&name(), 5).expect("prune");
    assert!(report.removed.is_empty());
    assert_eq!(report.orphans_removed, vec![3]);
    assert_eq!(fx.store_versions(&name()), fx.manifest_versions(&name()));
}

#[test]
fn selection_ignores_manifest_order() {
    let mut manifest = Manifest::empty(name());
    let fx = Fixture::new();
    for id in ["a1", "a2", "a3", "a4"] {
        fx.manifests
            .append(
                &mut manifest,
                NewVersion {
                    version: None,
                    box_id: id.to_string(),
                    checksum: String::new(),
                    created_at: String::new(),
                },
            )
            .expect("append");
    }
    manifest.versions.reverse();
    assert_eq!(select_for_removal(&manifest, 1), vec![3, 2, 1]);
    assert_eq!(select_for_removal(&manifest, 4), Vec::<u64>::new());
}

/// Manifest in the older layout: provider-only entries whose artifacts are
/// named after the box id rather than the version.
fn write_box_id_named_store(fx: &Fixture, ids: &[(u64, &str)]) -> std::path::PathBuf {
    let box_dir = fx.root().join("boxes").join("acme_trusty64");
    std::fs::create_dir_all(&box_dir).expect("box dir");
    let versions: Vec<serde_json::Value> = ids
        .iter()
        .map(|(version, id)| {
            std::fs::write(box_dir.join(format!("{id}.box")), id).expect("artifact");
            serde_json::json!({
                "version": version.to_string(),
                "providers": [{
                    "name": "virtualbox",
                    "url": format!("http://old.example.com/acme_trusty64/{id}.box"),
                    "checksum_type": "sha1",
                    "checksum": "0000",
                }],
            })
        })
        .collect();
    let manifest = serde_json::json!({"name": "acme/trusty64", "versions": versions});
    std::fs::write(
        fx.manifests.manifest_path(&name()),
        serde_json::to_vec_pretty(&manifest).expect("serialize"),
    )
    .expect("write manifest");
    box_dir
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("read box dir")
        .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn box_id_named_artifacts_are_deleted_through_their_url() {
    let fx = Fixture::new();
    let box_dir = write_box_id_named_store(&fx, &[(1, "a1"), (2, "a2")]);

    let report = Pruner::new(&fx.config).prune(&name(), 1).expect("prune");
    assert_eq!(report.removed, vec![1]);
    assert!(report.missing_artifacts.is_empty(), "{report:?}");
    assert_eq!(file_names(&box_dir), vec!["a2.box"]);
    assert_eq!(fx.manifest_versions(&name()), BTreeSet::from([2]));
}

#[test]
fn numeric_box_id_artifact_is_not_mistaken_for_an_orphan() {
    let fx = Fixture::new();
    // Version 1 was built from box id "7", so its file is `7.box`.
    let box_dir = write_box_id_named_store(&fx, &[(1, "7"), (2, "a2")]);
    let listing = crate::listing::list_box(&fx.config, &name()).expect("list");
    assert!(listing.is_consistent(), "{listing:?}");

    let report = Pruner::new(&fx.config).prune(&name(), 5).expect("prune");
    assert!(report.is_noop(), "{report:?}");
    assert_eq!(file_names(&box_dir), vec!["7.box", "a2.box"]);
}
