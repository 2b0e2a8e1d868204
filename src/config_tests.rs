use super::{load_config_file, Config, ConfigFile, DEFAULT_PROVIDER};
use crate::error::BoxError;
use std::path::PathBuf;

fn base_config() -> Config {
    Config {
        install_dir: PathBuf::from("/srv/boxes"),
        build_root: PathBuf::from("/tmp"),
        ..Config::default()
    }
}

#[test]
fn defaults_validate() {
    let config = base_config();
    config.validate().expect("defaults are valid");
    assert_eq!(config.provider, DEFAULT_PROVIDER);
    assert_eq!(config.vagrant_argv().expect("argv"), vec!["vagrant"]);
}

#[test]
fn file_values_override_defaults_only_when_present() {
    let mut config = base_config();
    config.apply_file(ConfigFile {
        public_base_url: Some("https://boxes.example.com".into()),
        build_timeout_secs: Some(3600),
        ..ConfigFile::default()
    });
    assert_eq!(config.public_base_url, "https://boxes.example.com");
    assert_eq!(config.build_timeout_secs, Some(3600));
    assert_eq!(config.install_dir, PathBuf::from("/srv/boxes"));
}

#[test]
fn rejects_relative_install_dir() {
    let config = Config {
        install_dir: PathBuf::from("boxes"),
        ..base_config()
    };
    assert!(matches!(config.validate(), Err(BoxError::Config(_))));
}

#[test]
fn rejects_unsupported_url_scheme() {
    let config = Config {
        public_base_url: "ftp://boxes.example.com".into(),
        ..base_config()
    };
    assert!(matches!(config.validate(), Err(BoxError::Config(_))));
}

#[test]
fn vagrant_command_is_split_shell_style() {
    let config = Config {
        vagrant_command: "sudo -u 'box builder' vagrant".into(),
        ..base_config()
    };
    assert_eq!(
        config.vagrant_argv().expect("argv"),
        vec!["sudo", "-u", "box builder", "vagrant"]
    );
}

#[test]
fn config_file_rejects_unknown_keys() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{"install_dir": "/srv/boxes", "colour": "blue"}"#)
        .expect("write config");
    assert!(matches!(load_config_file(&path), Err(BoxError::Config(_))));

    std::fs::write(&path, r#"{"install_dir": "/srv/boxes"}"#).expect("write config");
    let file = load_config_file(&path).expect("parse config");
    assert_eq!(file.install_dir, Some(PathBuf::from("/srv/boxes")));
}

#[test]
fn missing_config_file_is_io_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let err = load_config_file(&dir.path().join("absent.json")).expect_err("missing file");
    assert!(matches!(err, BoxError::Io { .. }));
}
