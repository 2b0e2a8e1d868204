//! Shared test infrastructure for integration tests.

use serde_json::Value;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

/// Fake `vagrant` used in place of the real tool: `up` checks the build
/// environment, `package` writes a small artifact to `--output`'s value.
const FAKE_VAGRANT: &str = r#"#!/bin/sh
case "$1" in
  up)
    test -f "$VAGRANT_CWD/Vagrantfile" || { echo "no Vagrantfile" >&2; exit 2; }
    test -f "$VAGRANT_CWD/$PROVISION_SCRIPT" || { echo "no script" >&2; exit 2; }
    echo "==> default: provisioned $SOURCE_BOX"
    ;;
  package)
    printf 'box from %s\n' "$SOURCE_BOX" > "$3"
    ;;
esac
"#;

/// Isolated install dir, build root and config file for running `boxman`.
pub struct BoxFixture {
    _dir: TempDir,
    pub install_dir: PathBuf,
    config_path: PathBuf,
}

impl BoxFixture {
    pub fn new() -> anyhow::Result<Self> {
        let dir = TempDir::new()?;
        let install_dir = dir.path().join("install");
        let templates = install_dir.join("build_templates");
        fs::create_dir_all(&templates)?;
        fs::write(templates.join("base.sh"), "#!/bin/sh\necho base\n")?;
        fs::set_permissions(&templates, fs::Permissions::from_mode(0o700))?;

        let vagrant = dir.path().join("fake-vagrant");
        fs::write(&vagrant, FAKE_VAGRANT)?;
        fs::set_permissions(&vagrant, fs::Permissions::from_mode(0o755))?;

        let config_path = dir.path().join("config.json");
        let config = serde_json::json!({
            "build_root": dir.path().join("build"),
            "vagrant_command": vagrant,
            "public_base_url": "http://boxes.example.com/boxes",
        });
        fs::write(&config_path, serde_json::to_string_pretty(&config)?)?;

        Ok(Self {
            _dir: dir,
            install_dir,
            config_path,
        })
    }

    /// Run `boxman` against this fixture with the given arguments.
    pub fn boxman(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_boxman"))
            .arg("--config")
            .arg(&self.config_path)
            .arg("--install-dir")
            .arg(&self.install_dir)
            .args(args)
            .env_remove("BOXMAN_INSTALL_DIR")
            .env_remove("BOXMAN_PUBLIC_URL")
            .env_remove("RUST_LOG")
            .output()
            .expect("run boxman")
    }

    /// Run `boxman`, assert success, and return stdout.
    pub fn boxman_ok(&self, args: &[&str]) -> String {
        let output = self.boxman(args);
        assert!(
            output.status.success(),
            "boxman {args:?} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).into_owned()
    }

    pub fn create(&self, target: &str, box_id: &str) -> Value {
        let stdout = self.boxman_ok(&[
            "create",
            "ubuntu/trusty64",
            "base.sh",
            target,
            box_id,
            "--json",
        ]);
        serde_json::from_str(&stdout).expect("create report json")
    }

    pub fn manifest(&self, escaped: &str) -> Value {
        let path = self.boxes_dir().join(format!("{escaped}.json"));
        let text = fs::read_to_string(&path).expect("read manifest");
        serde_json::from_str(&text).expect("manifest json")
    }

    pub fn manifest_versions(&self, escaped: &str) -> Vec<String> {
        self.manifest(escaped)["versions"]
            .as_array()
            .expect("versions array")
            .iter()
            .map(|entry| entry["version"].as_str().expect("version").to_string())
            .collect()
    }

    /// Artifact file names under `boxes/<escaped>/`, sorted.
    pub fn artifacts(&self, escaped: &str) -> Vec<String> {
        let dir = self.boxes_dir().join(escaped);
        let mut names: Vec<String> = match fs::read_dir(&dir) {
            Ok(entries) => entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .collect(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }

    pub fn boxes_dir(&self) -> PathBuf {
        self.install_dir.join("boxes")
    }
}

pub fn exit_code(output: &Output) -> Option<i32> {
    output.status.code()
}

pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}
