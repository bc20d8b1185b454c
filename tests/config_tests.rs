//! Integration tests for configuration loading
//!
//! - TOML, YAML and JSON files, chosen by extension
//! - Partial files merged over the defaults
//! - Explicit path handling and `ZKCIR_INFRA_CONFIG`
//! - Environment variable overrides
//! - Validation of values

use pretty_assertions::assert_eq;
use serial_test::serial;
use std::fs;
use std::path::PathBuf;
use tempfile::tempdir;

use zkcir_infra::config::Config;
use zkcir_infra::constructs::acm::CertificateValidation;
use zkcir_infra::zkcir::ZkcirStack;

const OVERRIDE_VARS: [&str; 6] = [
    "ZKCIR_INFRA_CONFIG",
    "ZKCIR_ACCOUNT",
    "ZKCIR_REGION",
    "ZKCIR_STACK_NAME",
    "ZKCIR_DOMAIN_NAME",
    "ZKCIR_BUILD_CONTEXT",
];

fn clear_env() {
    for var in OVERRIDE_VARS {
        std::env::remove_var(var);
    }
}

// ============================================================================
// File Formats
// ============================================================================

#[test]
fn test_load_toml_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("zkcir-infra.toml");
    fs::write(
        &path,
        r#"
[stack]
name = "ZkcirStaging"
region = "eu-west-1"

[certificate]
domain_name = "staging.zkcir.chrisc.dev"
validation = "dns"
"#,
    )
    .unwrap();

    let config = Config::from_file(&path).unwrap();
    assert_eq!(config.stack.name, "ZkcirStaging");
    assert_eq!(config.stack.region, "eu-west-1");
    assert_eq!(config.stack.account, "388179654007");
    assert_eq!(config.certificate.validation, CertificateValidation::Dns);
    assert_eq!(config.identity.user_pool_domain, "zkcir");
}

#[test]
fn test_load_yaml_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("zkcir-infra.yaml");
    fs::write(
        &path,
        "identity:\n  user_pool_domain: zkcir-dev\n  access_token_validity_minutes: 60\n",
    )
    .unwrap();

    let config = Config::from_file(&path).unwrap();
    assert_eq!(config.identity.user_pool_domain, "zkcir-dev");
    assert_eq!(config.identity.access_token_validity_minutes, 60);
    assert_eq!(config.identity.google_client_secret_name, "GoogleClientSecret");
}

#[test]
fn test_load_json_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("zkcir-infra.json");
    fs::write(
        &path,
        r#"{"build": {"context": "/srv/zkcir", "exclude": ["cdk", "target"]}}"#,
    )
    .unwrap();

    let config = Config::from_file(&path).unwrap();
    assert_eq!(config.build.context, PathBuf::from("/srv/zkcir"));
    assert_eq!(config.build.exclude, vec!["cdk", "target"]);
    assert_eq!(config.build.service_target, "core-ecs");
}

#[test]
fn test_explicit_callback_urls() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("zkcir-infra.toml");
    fs::write(
        &path,
        "[identity]\ncallback_urls = [\"https://example.com/cb\"]\n",
    )
    .unwrap();

    let config = Config::from_file(&path).unwrap();
    assert_eq!(config.callback_urls(), vec!["https://example.com/cb"]);
}

#[test]
fn test_invalid_toml_is_config_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("zkcir-infra.toml");
    fs::write(&path, "[stack\nname = ").unwrap();

    let err = Config::from_file(&path).unwrap_err();
    assert_eq!(err.exit_code(), 4);
}

// ============================================================================
// Load Precedence
// ============================================================================

#[test]
#[serial]
fn test_load_explicit_path() {
    clear_env();
    let dir = tempdir().unwrap();
    let path = dir.path().join("custom.toml");
    fs::write(&path, "[stack]\nname = \"Explicit\"\n").unwrap();

    let config = Config::load(Some(&path)).unwrap();
    assert_eq!(config.stack.name, "Explicit");
}

#[test]
#[serial]
fn test_load_from_env_path() {
    clear_env();
    let dir = tempdir().unwrap();
    let path = dir.path().join("from-env.yml");
    fs::write(&path, "stack:\n  name: FromEnv\n").unwrap();

    std::env::set_var("ZKCIR_INFRA_CONFIG", &path);
    let config = Config::load(None).unwrap();
    clear_env();

    assert_eq!(config.stack.name, "FromEnv");
}

#[test]
#[serial]
fn test_missing_env_path_is_error() {
    clear_env();
    std::env::set_var("ZKCIR_INFRA_CONFIG", "/nonexistent/zkcir.toml");
    let result = Config::load(None);
    clear_env();

    assert_eq!(result.unwrap_err().exit_code(), 4);
}

#[test]
#[serial]
fn test_env_overrides_win_over_file() {
    clear_env();
    let dir = tempdir().unwrap();
    let path = dir.path().join("zkcir-infra.toml");
    fs::write(
        &path,
        "[stack]\naccount = \"111111111111\"\nregion = \"eu-west-1\"\n",
    )
    .unwrap();

    std::env::set_var("ZKCIR_ACCOUNT", "222222222222");
    std::env::set_var("ZKCIR_DOMAIN_NAME", "dev.example.com");
    std::env::set_var("ZKCIR_STACK_NAME", "ZkcirDev");
    let config = Config::load(Some(&path)).unwrap();
    clear_env();

    assert_eq!(config.stack.account, "222222222222");
    assert_eq!(config.stack.region, "eu-west-1");
    assert_eq!(config.stack.name, "ZkcirDev");
    assert_eq!(config.certificate.domain_name, "dev.example.com");
    assert_eq!(
        config.callback_urls()[0],
        "https://dev.example.com/auth/callback"
    );
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn test_invalid_account_rejected() {
    let mut config = Config::default();
    config.stack.account = "not-an-account".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_empty_domain_rejected() {
    let mut config = Config::default();
    config.certificate.domain_name = "  ".to_string();
    let err = config.validate().unwrap_err();
    assert_eq!(err.exit_code(), 4);
    assert!(err.to_string().contains("certificate.domain_name"));
}

#[test]
#[serial]
fn test_oversized_token_validity_rejected() {
    clear_env();
    let dir = tempdir().unwrap();
    let path = dir.path().join("zkcir-infra.toml");
    fs::write(
        &path,
        "[identity]\naccess_token_validity_minutes = 4611686018427387964\n",
    )
    .unwrap();

    let config = Config::load(Some(&path)).unwrap();
    let err = config.validate().unwrap_err();
    assert_eq!(err.exit_code(), 4);
    assert!(err.to_string().contains("access_token_validity_minutes"));

    // declaring the stack directly reports the bad value instead of overflowing
    assert!(ZkcirStack::build(&config).is_err());
}

#[test]
fn test_environment_descriptor() {
    let config = Config::default();
    assert_eq!(
        config.environment().unwrap().descriptor(),
        "aws://388179654007/us-east-1"
    );
}
