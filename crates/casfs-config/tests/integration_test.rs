//! Integration tests for casfs-config: full load pipeline against real
//! files on disk (global, then project, then environment).

use std::path::PathBuf;
use tempfile::tempdir;

#[test]
fn loads_project_config_from_file() {
    let temp = tempdir().unwrap();
    let casbak_dir = temp.path().join(".casbak");
    std::fs::create_dir_all(&casbak_dir).unwrap();

    let config_content = r#"
[storage]
cas_root = "/custom/the_source"
digest_algorithm = "blake3"

[codec]
default_format = "unix"

[cache]
ring_size = 128
"#;
    std::fs::write(casbak_dir.join("config.toml"), config_content).unwrap();

    let config = casfs_config::Config::load_for_project(temp.path()).unwrap();

    assert_eq!(config.storage.cas_root, PathBuf::from("/custom/the_source"));
    assert_eq!(config.storage.digest_algorithm, "blake3");
    assert_eq!(config.codec.default_format, "unix");
    assert_eq!(config.cache.ring_size, 128);
}

#[test]
fn project_config_overrides_defaults_but_leaves_others() {
    let temp = tempdir().unwrap();
    let casbak_dir = temp.path().join(".casbak");
    std::fs::create_dir_all(&casbak_dir).unwrap();
    std::fs::write(
        casbak_dir.join("config.toml"),
        "[codec]\ndefault_format = \"minimal\"\n",
    )
    .unwrap();

    let config = casfs_config::Config::load_for_project(temp.path()).unwrap();
    assert_eq!(config.codec.default_format, "minimal");
    assert_eq!(config.storage.digest_algorithm, "sha256");
}

#[test]
fn missing_project_config_uses_defaults() {
    let temp = tempdir().unwrap();
    let config = casfs_config::Config::load_for_project(temp.path()).unwrap();
    assert_eq!(config.storage.digest_algorithm, "sha256");
    assert_eq!(config.cache.ring_size, 32);
}

#[test]
fn env_override_wins_over_project_file() {
    let temp = tempdir().unwrap();
    let casbak_dir = temp.path().join(".casbak");
    std::fs::create_dir_all(&casbak_dir).unwrap();
    std::fs::write(
        casbak_dir.join("config.toml"),
        "[storage]\ndigest_algorithm = \"sha1\"\n",
    )
    .unwrap();

    std::env::set_var("CASBAK_DIGEST", "blake3");
    let config = casfs_config::Config::load_for_project(temp.path()).unwrap();
    std::env::remove_var("CASBAK_DIGEST");

    assert_eq!(config.storage.digest_algorithm, "blake3");
}

#[test]
fn init_toml_round_trips_through_parser() {
    let rendered = casfs_config::Config::init_toml();
    let parsed: casfs_config::Config = toml::from_str(&rendered).unwrap();
    assert_eq!(parsed.storage.digest_algorithm, "sha256");
    assert_eq!(parsed.cache.ring_size, 32);
}
