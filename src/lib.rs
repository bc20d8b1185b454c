//! # zkcir-infra - Typed infrastructure for the zkcir service
//!
//! zkcir-infra declares the cloud infrastructure of the zkcir hosted service
//! as typed Rust values and synthesizes it into a CloudFormation cloud
//! assembly. Provisioning itself is left to the deployment engine
//! (`cdk deploy --app cdk.out` or `aws cloudformation deploy`).
//!
//! ## Core Concepts
//!
//! - **Template**: the serializable CloudFormation document, with intrinsic
//!   functions (`Ref`, `Fn::GetAtt`, `Fn::Join`, `Fn::Sub`) as typed values
//! - **Stack**: an ordered set of resources under unique logical ids, with
//!   dependency tracking and cycle detection
//! - **Constructs**: builders that expand into one or more resources, one
//!   module per AWS service (`ec2::Vpc`, `cognito::UserPool`, ...)
//! - **Grants**: least-privilege policy statements attached to a role's
//!   default policy and recorded on the stack
//! - **Assets**: Docker build contexts, fingerprinted for content-addressed
//!   image tags
//! - **Cloud assembly**: the directory of files handed to the engine
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                           CLI Interface                             │
//! │          (synth, print, list, graph, validate, completions)         │
//! └─────────────────────────────────────────────────────────────────────┘
//!                                    │
//!                                    ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                      ZkcirStack (topology)                          │
//! │     network, identity, compute, data and the container wiring       │
//! └─────────────────────────────────────────────────────────────────────┘
//!                                    │
//!          ┌─────────────────────────┼─────────────────────────┐
//!          ▼                         ▼                         ▼
//! ┌─────────────────┐   ┌─────────────────────┐   ┌─────────────────────┐
//! │   Constructs    │   │       Stack         │   │      Assets         │
//! │ (ec2, ecs, iam, │──▶│ (logical ids, deps, │◀──│ (build context      │
//! │  cognito, ...)  │   │  grants, synth)     │   │  fingerprints)      │
//! └─────────────────┘   └─────────────────────┘   └─────────────────────┘
//!                                    │
//!                                    ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                         Cloud Assembly                              │
//! │        manifest.json, <stack>.template.json, <stack>.assets.json    │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Example
//!
//! ```rust,no_run
//! use zkcir_infra::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let config = Config::load(None)?;
//!     let zkcir = ZkcirStack::build(&config)?;
//!     let written = CloudAssembly::write("cdk.out", zkcir.stack())?;
//!     println!("wrote {} files", written.len());
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.
    //!
    //! ```rust,no_run
    //! use zkcir_infra::prelude::*;
    //!
    //! # fn main() -> Result<()> {
    //! let env = Environment::new("123456789012", "us-east-1")?;
    //! let mut stack = Stack::new("Demo", env)?;
    //! let table = Table::new(
    //!     &mut stack,
    //!     "Users",
    //!     TableProps::new(Attribute::new("user_id", AttributeType::String)),
    //! )?;
    //! let template = stack.synth()?;
    //! assert!(template.resource(table.logical_id()).is_some());
    //! # Ok(())
    //! # }
    //! ```

    pub use crate::assembly::CloudAssembly;
    pub use crate::assets::{DockerImageAsset, DockerImageAssetProps};
    pub use crate::config::Config;
    pub use crate::constructs::dynamodb::{Attribute, AttributeType, Table, TableProps};
    pub use crate::constructs::iam::{Grant, GrantKind, PolicyStatement, Role, RoleProps};
    pub use crate::constructs::{Duration, RemovalPolicy, Size};
    pub use crate::error::{Error, ErrorContext, Result};
    pub use crate::stack::{Construct, Environment, Stack};
    pub use crate::template::{Resource, Template, Value};
    pub use crate::validate::{validate, Finding, Severity, ValidationReport};
    pub use crate::zkcir::ZkcirStack;
}

// ============================================================================
// Core Model
// ============================================================================

/// Error types and result aliases.
pub mod error;

/// CloudFormation template model and intrinsic functions.
pub mod template;

/// Stacks, logical ids and the resource dependency graph.
///
/// A [`Stack`](stack::Stack) owns every declared resource. Constructs hold
/// logical ids into it rather than references, so resources can keep being
/// extended after they are declared.
pub mod stack;

// ============================================================================
// Constructs
// ============================================================================

/// Typed builders for the AWS services the zkcir stack uses.
pub mod constructs;

/// Docker image assets and build-context fingerprints.
pub mod assets;

// ============================================================================
// Topology and Output
// ============================================================================

/// Configuration loading and environment overrides.
pub mod config;

/// The zkcir service stack.
pub mod zkcir;

/// Semantic checks over a synthesized template.
pub mod validate;

/// Cloud assembly writer.
pub mod assembly;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Returns detailed version information including build metadata.
pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION"),
        rust_version: option_env!("CARGO_PKG_RUST_VERSION").unwrap_or("unknown"),
        target: std::env::consts::ARCH,
        profile: if cfg!(debug_assertions) {
            "debug"
        } else {
            "release"
        },
    }
}

/// Detailed version information for the build.
#[derive(Debug, Clone)]
pub struct VersionInfo {
    /// Semantic version string
    pub version: &'static str,
    /// Minimum Rust version required
    pub rust_version: &'static str,
    /// Target architecture
    pub target: &'static str,
    /// Build profile (debug or release)
    pub profile: &'static str,
}

impl std::fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "zkcir-infra {} ({}, {})",
            self.version, self.target, self.profile
        )
    }
}
