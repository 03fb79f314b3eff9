//! Integration tests for configuration resolution and loading
//!
//! Tests that manipulate SEGUE_CONFIG are marked with #[serial] so they do
//! not race each other on the process environment.

use segue_common::config::{ConfigResolver, ConfigSource, CONFIG_ENV_VAR};
use segue_common::{EnvelopeCurve, Error, SegueConfig};
use serial_test::serial;
use std::env;
use std::io::Write;
use std::path::{Path, PathBuf};

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
#[serial]
fn test_env_var_used_without_cli_path() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/segue-env.toml");

    let source = ConfigResolver::new().resolve(None);
    assert_eq!(source, ConfigSource::Explicit(PathBuf::from("/tmp/segue-env.toml")));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_cli_path_beats_env_var() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/segue-env.toml");

    let source = ConfigResolver::new().resolve(Some(Path::new("/tmp/segue-cli.toml")));
    assert_eq!(source, ConfigSource::Explicit(PathBuf::from("/tmp/segue-cli.toml")));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_no_overrides_falls_back_to_platform_path() {
    env::remove_var(CONFIG_ENV_VAR);

    match ConfigResolver::new().resolve(None) {
        ConfigSource::Platform(path) => {
            assert!(path.ends_with("segue/config.toml"), "unexpected path {:?}", path);
        }
        ConfigSource::Defaults => {}
        other => panic!("Expected platform or defaults, got {:?}", other),
    }
}

#[test]
#[serial]
fn test_load_from_env_var_file() {
    let file = write_config(
        r#"
        [default_transition]
        mode = "crossfade"
        duration_ms = 3000
        curve_out = "s_curve"
        curve_in = "s_curve"
        "#,
    );
    env::set_var(CONFIG_ENV_VAR, file.path());

    let config = SegueConfig::load(None).unwrap();
    assert_eq!(config.default_transition.duration_ms, 3000);
    assert_eq!(config.default_transition.curve_out, EnvelopeCurve::SCurve);

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_explicit_missing_file_is_an_error() {
    env::remove_var(CONFIG_ENV_VAR);

    let result = SegueConfig::load(Some(Path::new("/nonexistent/segue/config.toml")));
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_invalid_timing_in_file_is_rejected() {
    let file = write_config("[timing]\nduration_poll_ms = 0\n");

    let result = SegueConfig::from_file(file.path());
    assert!(matches!(result, Err(Error::Config(_))));
}
