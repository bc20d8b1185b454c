//! Configuration for zkcir-infra
//!
//! Handles loading and merging configuration from multiple sources:
//! - Default values (the production deployment)
//! - User configuration (`<config dir>/zkcir-infra/config.toml`)
//! - Project configuration (`./zkcir-infra.{toml,yaml,yml,json}`)
//! - An explicit file (`-c` or `ZKCIR_INFRA_CONFIG`)
//! - Environment variables
//!
//! Files are merged key by key: a file only overrides what it sets.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tracing::debug;

use crate::constructs::acm::CertificateValidation;
use crate::error::{Error, ErrorContext, Result};
use crate::stack::Environment;

/// Account the production stack is deployed to.
pub const DEFAULT_ACCOUNT: &str = "388179654007";
/// Region the production stack is deployed to.
pub const DEFAULT_REGION: &str = "us-east-1";
/// OAuth client registered with Google for the hosted sign-in.
pub const DEFAULT_GOOGLE_CLIENT_ID: &str =
    "585833256001-k7otn8at0hvvttmug2le7nm0mm4ehfvb.apps.googleusercontent.com";
/// Cognito hosted domain prefix.
pub const DEFAULT_USER_POOL_DOMAIN: &str = "zkcir";
/// Public domain of the service.
pub const DEFAULT_DOMAIN_NAME: &str = "zkcir.chrisc.dev";
/// Stack name.
pub const DEFAULT_STACK_NAME: &str = "ZkcirCdkStack";

/// Access token lifetimes Cognito accepts, in minutes.
const ACCESS_TOKEN_VALIDITY_MINUTES: std::ops::RangeInclusive<u64> = 5..=1440;

const PROJECT_FILES: &[&str] = &[
    "zkcir-infra.toml",
    "zkcir-infra.yaml",
    "zkcir-infra.yml",
    "zkcir-infra.json",
];

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Stack identity and placement
    pub stack: StackConfig,

    /// Sign-in settings
    pub identity: IdentityConfig,

    /// Public certificate
    pub certificate: CertificateConfig,

    /// Container build contexts
    pub build: BuildConfig,

    /// Logging settings
    pub logging: LoggingConfig,

    /// Output settings
    pub output: OutputConfig,
}

/// Stack settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackConfig {
    /// Stack name
    pub name: String,
    /// 12-digit account id
    pub account: String,
    /// Region
    pub region: String,
    /// Template description
    pub description: Option<String>,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_STACK_NAME.to_string(),
            account: DEFAULT_ACCOUNT.to_string(),
            region: DEFAULT_REGION.to_string(),
            description: None,
        }
    }
}

/// Identity pool and federation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Google OAuth client id
    pub google_client_id: String,
    /// Secrets Manager secret holding the Google client secret
    pub google_client_secret_name: String,
    /// Cognito hosted domain prefix
    pub user_pool_domain: String,
    /// Redirect targets; derived from the certificate domain when unset
    pub callback_urls: Option<Vec<String>>,
    /// Access token lifetime in minutes
    pub access_token_validity_minutes: u64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            google_client_id: DEFAULT_GOOGLE_CLIENT_ID.to_string(),
            google_client_secret_name: "GoogleClientSecret".to_string(),
            user_pool_domain: DEFAULT_USER_POOL_DOMAIN.to_string(),
            callback_urls: None,
            access_token_validity_minutes: 24 * 60,
        }
    }
}

/// Certificate settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CertificateConfig {
    /// Domain the certificate covers
    pub domain_name: String,
    /// Validation method
    pub validation: CertificateValidation,
}

impl Default for CertificateConfig {
    fn default() -> Self {
        Self {
            domain_name: DEFAULT_DOMAIN_NAME.to_string(),
            validation: CertificateValidation::Email,
        }
    }
}

/// Build context settings shared by both images
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Docker build context, relative to the working directory
    pub context: PathBuf,
    /// Paths excluded from the context
    pub exclude: Vec<String>,
    /// Dockerfile stage of the web service
    pub service_target: String,
    /// Dockerfile stage of the compile function
    pub lambda_target: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            context: PathBuf::from(".."),
            exclude: vec!["cdk".to_string()],
            service_target: "core-ecs".to_string(),
            lambda_target: "compile-lambda".to_string(),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level when neither `-v` nor `RUST_LOG` is given
    pub level: String,
    /// Emit JSON log lines
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
        }
    }
}

/// Output settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Cloud assembly directory
    pub outdir: PathBuf,
    /// Colored terminal output
    pub color: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            outdir: PathBuf::from(crate::assembly::DEFAULT_OUTDIR),
            color: true,
        }
    }
}

impl Config {
    /// Load configuration from all sources
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut merged = serde_json::to_value(Config::default())?;

        for path in Self::get_config_paths(config_path)? {
            if path.exists() {
                debug!(path = %path.display(), "loading configuration file");
                merge_values(&mut merged, read_value(&path)?);
            }
        }

        let mut config: Config = serde_json::from_value(merged)
            .map_err(|e| Error::Config(format!("invalid configuration: {}", e)))?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from a single file on top of the defaults, without env overrides.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut merged = serde_json::to_value(Config::default())?;
        merge_values(&mut merged, read_value(path.as_ref())?);
        serde_json::from_value(merged)
            .map_err(|e| Error::Config(format!("invalid configuration: {}", e)))
    }

    /// Files to read, lowest precedence first
    fn get_config_paths(explicit_path: Option<&Path>) -> Result<Vec<PathBuf>> {
        let explicit = explicit_path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var("ZKCIR_INFRA_CONFIG").ok().map(PathBuf::from));

        // an explicit file must exist and replaces the search
        if let Some(path) = explicit {
            if !path.is_file() {
                return Err(Error::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            return Ok(vec![path]);
        }

        let mut paths = Vec::new();
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("zkcir-infra").join("config.toml"));
        }
        paths.extend(PROJECT_FILES.iter().map(PathBuf::from));
        Ok(paths)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(account) = std::env::var("ZKCIR_ACCOUNT") {
            self.stack.account = account;
        }
        if let Ok(region) = std::env::var("ZKCIR_REGION") {
            self.stack.region = region;
        }
        if let Ok(name) = std::env::var("ZKCIR_STACK_NAME") {
            self.stack.name = name;
        }
        if let Ok(domain) = std::env::var("ZKCIR_DOMAIN_NAME") {
            self.certificate.domain_name = domain;
        }
        if let Ok(context) = std::env::var("ZKCIR_BUILD_CONTEXT") {
            self.build.context = PathBuf::from(context);
        }
        if std::env::var("NO_COLOR").is_ok() {
            self.output.color = false;
        }
    }

    /// Validated deployment environment
    pub fn environment(&self) -> Result<Environment> {
        Environment::new(&self.stack.account, &self.stack.region)
    }

    /// Callback URLs the sign-in client accepts.
    ///
    /// Unless configured, the public domain's `/auth/callback` plus the two
    /// local development servers.
    pub fn callback_urls(&self) -> Vec<String> {
        match &self.identity.callback_urls {
            Some(urls) => urls.clone(),
            None => vec![
                format!("https://{}/auth/callback", self.certificate.domain_name),
                "http://localhost:3000/auth/callback".to_string(),
                "http://localhost:8000/auth/callback".to_string(),
            ],
        }
    }

    /// Check values that do not depend on the filesystem.
    pub fn validate(&self) -> Result<()> {
        self.environment()?;
        if self.certificate.domain_name.trim().is_empty() {
            return Err(Error::invalid_config(
                "certificate.domain_name",
                "must not be empty",
            ));
        }
        if self.identity.google_client_id.trim().is_empty() {
            return Err(Error::invalid_config(
                "identity.google_client_id",
                "must not be empty",
            ));
        }
        if self.build.service_target == self.build.lambda_target {
            return Err(Error::invalid_config(
                "build.lambda_target",
                "must differ from build.service_target",
            ));
        }
        if !ACCESS_TOKEN_VALIDITY_MINUTES.contains(&self.identity.access_token_validity_minutes) {
            return Err(Error::invalid_config(
                "identity.access_token_validity_minutes",
                "must be between 5 and 1440",
            ));
        }
        Ok(())
    }
}

/// Parse a config file into a generic value, by extension.
fn read_value(path: &Path) -> Result<Json> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    let value: Json = match extension {
        "yml" | "yaml" => serde_yaml::from_str(&content)?,
        "json" => serde_json::from_str(&content)?,
        "toml" => toml::from_str(&content)?,
        _ => toml::from_str(&content).or_else(|_| {
            serde_yaml::from_str(&content).map_err(|e| {
                Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
            })
        })?,
    };
    Ok(value)
}

/// Overlay `other` onto `base`, recursing into tables.
fn merge_values(base: &mut Json, other: Json) {
    match (base, other) {
        (Json::Object(base), Json::Object(other)) => {
            for (key, value) in other {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use serial_test::serial;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.stack.name, "ZkcirCdkStack");
        assert_eq!(config.stack.account, "388179654007");
        assert_eq!(config.stack.region, "us-east-1");
        assert_eq!(config.identity.user_pool_domain, "zkcir");
        assert_eq!(config.certificate.domain_name, "zkcir.chrisc.dev");
        assert_eq!(config.certificate.validation, CertificateValidation::Email);
        assert_eq!(config.build.exclude, vec!["cdk"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_merge_only_overrides_set_keys() {
        let mut base = json!({"stack": {"name": "A", "region": "us-east-1"}});
        merge_values(&mut base, json!({"stack": {"region": "eu-west-1"}}));
        assert_eq!(base, json!({"stack": {"name": "A", "region": "eu-west-1"}}));
    }

    #[test]
    fn test_callback_urls_follow_domain() {
        let mut config = Config::default();
        config.certificate.domain_name = "staging.example.com".into();
        assert_eq!(
            config.callback_urls()[0],
            "https://staging.example.com/auth/callback"
        );
        assert_eq!(config.callback_urls().len(), 3);
    }

    #[test]
    fn test_validate_rejects_same_targets() {
        let mut config = Config::default();
        config.build.lambda_target = config.build.service_target.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_token_validity_bounds() {
        let mut config = Config::default();
        config.identity.access_token_validity_minutes = 5;
        assert!(config.validate().is_ok());
        config.identity.access_token_validity_minutes = 4;
        assert!(config.validate().is_err());
        config.identity.access_token_validity_minutes = 60 + (1 << 62);
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_env_override() {
        std::env::set_var("ZKCIR_REGION", "eu-central-1");
        std::env::set_var("ZKCIR_BUILD_CONTEXT", "/tmp/context");
        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.stack.region, "eu-central-1");
        assert_eq!(config.build.context, PathBuf::from("/tmp/context"));
        std::env::remove_var("ZKCIR_REGION");
        std::env::remove_var("ZKCIR_BUILD_CONTEXT");
    }

    #[test]
    #[serial]
    fn test_missing_explicit_file() {
        let err = Config::load(Some(Path::new("/nonexistent/zkcir-infra.toml"))).unwrap_err();
        assert_eq!(err.exit_code(), 4);
    }
}
