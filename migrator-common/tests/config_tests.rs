//! Tests for config file resolution and graceful degradation
//!
//! Uses serial_test to prevent ENV variable races: every test that touches
//! MIGRATOR_CONFIG is marked #[serial].

use migrator_common::config::{resolve_config_path, ConfigSource, TomlConfig, CONFIG_ENV_VAR};
use serial_test::serial;
use std::env;
use std::io::Write;
use std::path::PathBuf;

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
#[serial]
fn test_cli_argument_has_highest_priority() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/migrator-env-config.toml");

    let cli = PathBuf::from("/tmp/migrator-cli-config.toml");
    let resolved = resolve_config_path(Some(&cli));
    assert_eq!(resolved, Some(cli));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_env_var_used_without_cli_argument() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/migrator-env-config.toml");

    let resolved = resolve_config_path(None);
    assert_eq!(resolved, Some(PathBuf::from("/tmp/migrator-env-config.toml")));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_missing_file_degrades_to_defaults() {
    env::remove_var(CONFIG_ENV_VAR);

    let missing = PathBuf::from(format!("/tmp/migrator-missing-{}.toml", std::process::id()));
    let (config, source) = TomlConfig::load_or_default(Some(&missing)).unwrap();
    assert_eq!(config, TomlConfig::default());
    assert_eq!(source, ConfigSource::Missing(missing));
}

#[test]
#[serial]
fn test_env_var_file_is_loaded() {
    let file = write_config("[validator]\nbatch_size = 10\ndirection = \"old->new\"\n");
    env::set_var(CONFIG_ENV_VAR, file.path());

    let (config, source) = TomlConfig::load_or_default(None).unwrap();
    assert_eq!(source, ConfigSource::File(file.path().to_path_buf()));
    assert_eq!(config.validator.batch_size, Some(10));
    assert_eq!(config.validator.direction.as_deref(), Some("old->new"));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_unparseable_file_is_an_error() {
    env::remove_var(CONFIG_ENV_VAR);

    let file = write_config("this is = = not toml");
    let result = TomlConfig::load_or_default(Some(file.path()));
    assert!(result.is_err());
}
