//! Error types for zkcir-infra.
//!
//! Every failure this crate can produce happens while the resource graph is
//! being declared or synthesized. Provisioning failures belong to the
//! deployment engine and never surface here.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for zkcir-infra operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for zkcir-infra.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Construct Errors
    // ========================================================================
    /// A construct was given properties it cannot express.
    #[error("Invalid properties for '{construct}': {message}")]
    InvalidProps {
        /// Construct path or id
        construct: String,
        /// Error message
        message: String,
    },

    /// Two resources resolved to the same logical id.
    #[error("Duplicate logical id '{0}' in stack")]
    DuplicateLogicalId(String),

    /// A resource lookup by logical id failed.
    #[error("Resource '{0}' not found in stack")]
    ResourceNotFound(String),

    // ========================================================================
    // Synthesis Errors
    // ========================================================================
    /// A `Ref`, `Fn::GetAtt` or `DependsOn` points at nothing.
    #[error("Resource '{from}' references unknown logical id '{to}'")]
    DanglingReference {
        /// Referencing resource
        from: String,
        /// Missing target
        to: String,
    },

    /// The resource graph contains a cycle.
    #[error("Dependency cycle between resources: {0}")]
    DependencyCycle(String),

    // ========================================================================
    // Asset Errors
    // ========================================================================
    /// Build context directory does not exist.
    #[error("Asset directory not found: {0}")]
    AssetNotFound(PathBuf),

    /// Asset fingerprinting failed.
    #[error("Failed to fingerprint asset '{path}': {message}")]
    AssetFingerprint {
        /// Path being fingerprinted
        path: PathBuf,
        /// Error message
        message: String,
    },

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid configuration value.
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidConfig {
        /// Configuration key
        key: String,
        /// Error message
        message: String,
    },

    // ========================================================================
    // IO and Serialization Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    // ========================================================================
    // Other Errors
    // ========================================================================
    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Generic error with source.
    #[error("{message}")]
    Other {
        /// Error message
        message: String,
        /// Source error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Creates a new invalid props error.
    pub fn invalid_props(construct: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidProps {
            construct: construct.into(),
            message: message.into(),
        }
    }

    /// Creates a new dangling reference error.
    pub fn dangling_reference(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::DanglingReference {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Creates a new invalid config error.
    pub fn invalid_config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Returns the error code for CLI exit status.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::InvalidProps { .. }
            | Error::DuplicateLogicalId(_)
            | Error::ResourceNotFound(_)
            | Error::DanglingReference { .. }
            | Error::DependencyCycle(_) => 2,
            Error::AssetNotFound(_) | Error::AssetFingerprint { .. } => 3,
            Error::Config(_) | Error::InvalidConfig { .. } | Error::TomlParse(_) => 4,
            _ => 1,
        }
    }
}

/// Extension trait for adding context to errors.
pub trait ErrorContext<T> {
    /// Adds context to an error.
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Adds context with a closure that is only evaluated on error.
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Other {
            message: message.into(),
            source: Some(Box::new(e)),
        })
    }

    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| Error::Other {
            message: f().into(),
            source: Some(Box::new(e)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(Error::DuplicateLogicalId("X".into()).exit_code(), 2);
        assert_eq!(Error::dangling_reference("A", "B").exit_code(), 2);
        assert_eq!(Error::AssetNotFound(PathBuf::from("/nope")).exit_code(), 3);
        assert_eq!(Error::invalid_config("stack.region", "empty").exit_code(), 4);
        assert_eq!(Error::Internal("boom".into()).exit_code(), 1);
    }

    #[test]
    fn test_error_display() {
        let err = Error::invalid_props("Vpc", "max_azs must be at least 1");
        assert_eq!(
            err.to_string(),
            "Invalid properties for 'Vpc': max_azs must be at least 1"
        );
    }

    #[test]
    fn test_context_wraps_source() {
        let io: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "missing",
        ));
        let err = io.context("reading template").unwrap_err();
        assert_eq!(err.to_string(), "reading template");
        assert!(std::error::Error::source(&err).is_some());
    }
}
