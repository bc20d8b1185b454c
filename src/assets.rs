//! Container image assets.
//!
//! An image asset is a Docker build context on local disk. Synthesis does not
//! build anything: it fingerprints the context, registers the asset with the
//! stack and hands out the image URI the deployment engine will publish to.
//! The fingerprint covers every non-excluded file, so any change to the
//! context yields a new image tag.

use std::fs;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use tracing::debug;
use walkdir::WalkDir;

use crate::assembly::BOOTSTRAP_QUALIFIER;
use crate::constructs::iam::{self, GrantKind, PolicyStatement, Role};
use crate::error::{Error, Result};
use crate::stack::Stack;
use crate::template::Value;

/// Properties for [`DockerImageAsset`].
#[derive(Debug, Clone, Default)]
pub struct DockerImageAssetProps {
    /// Build context directory
    pub directory: PathBuf,
    /// Glob patterns excluded from the context, relative to it
    pub exclude: Vec<String>,
    /// Multi-stage build target
    pub target: Option<String>,
    /// Dockerfile name relative to the context; `Dockerfile` if unset
    pub file: Option<String>,
}

/// What the deployment engine needs to build and publish an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAssetSource {
    /// Content fingerprint, also the image tag
    pub hash: String,
    /// Construct path the asset was declared at
    pub display_name: String,
    /// Build context directory
    pub directory: PathBuf,
    /// Multi-stage build target
    pub target: Option<String>,
    /// Excluded patterns
    pub exclude: Vec<String>,
    /// Dockerfile, if not the default
    pub file: Option<String>,
}

/// A Docker image built from a local context.
#[derive(Debug, Clone)]
pub struct DockerImageAsset {
    path: Vec<String>,
    source: ImageAssetSource,
}

impl DockerImageAsset {
    /// Fingerprint a build context and register it with the stack.
    ///
    /// A relative context is resolved against the working directory; the
    /// registered source always carries the absolute path.
    pub fn new(stack: &mut Stack, path: &[&str], props: DockerImageAssetProps) -> Result<Self> {
        let directory = fs::canonicalize(&props.directory)
            .map_err(|_| Error::AssetNotFound(props.directory.clone()))?;
        let dockerfile = props.file.as_deref().unwrap_or("Dockerfile");
        if !directory.join(dockerfile).is_file() {
            return Err(Error::AssetFingerprint {
                path: directory,
                message: format!("no {} in build context", dockerfile),
            });
        }

        let hash = fingerprint(
            &directory,
            &props.exclude,
            props.target.as_deref(),
            props.file.as_deref(),
        )?;
        let display_name = path.join("/");
        debug!(
            asset = %display_name,
            hash = %hash,
            directory = %directory.display(),
            "fingerprinted image asset"
        );

        let source = ImageAssetSource {
            hash,
            display_name,
            directory,
            target: props.target,
            exclude: props.exclude,
            file: props.file,
        };
        stack.add_asset(source.clone());

        Ok(Self {
            path: path.iter().map(|s| s.to_string()).collect(),
            source,
        })
    }

    /// Construct path
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Content fingerprint; also the image tag
    pub fn hash(&self) -> &str {
        &self.source.hash
    }

    /// Registered source
    pub fn source(&self) -> &ImageAssetSource {
        &self.source
    }

    /// Full image URI in the bootstrap container-assets repository.
    pub fn image_uri(&self) -> Value {
        Value::sub(format!(
            "${{AWS::AccountId}}.dkr.ecr.${{AWS::Region}}.${{AWS::URLSuffix}}/{}:{}",
            repository_name(),
            self.source.hash
        ))
    }

    /// ARN of the repository the image is published to.
    pub fn repository_arn(&self) -> Value {
        Value::sub(format!(
            "arn:${{AWS::Partition}}:ecr:${{AWS::Region}}:${{AWS::AccountId}}:repository/{}",
            repository_name()
        ))
    }

    /// Allow `role` to pull the image.
    pub fn grant_pull(&self, stack: &mut Stack, role: &Role) -> Result<bool> {
        iam::grant(
            stack,
            role,
            GrantKind::Pull,
            &repository_name(),
            vec![
                PolicyStatement::allow(
                    &[
                        "ecr:BatchCheckLayerAvailability",
                        "ecr:GetDownloadUrlForLayer",
                        "ecr:BatchGetImage",
                    ],
                    vec![self.repository_arn()],
                ),
                PolicyStatement::allow(&["ecr:GetAuthorizationToken"], vec![Value::from("*")]),
            ],
        )
    }
}

/// Bootstrap container-assets repository name, with deploy-time placeholders.
pub fn repository_name() -> String {
    format!(
        "cdk-{}-container-assets-${{AWS::AccountId}}-${{AWS::Region}}",
        BOOTSTRAP_QUALIFIER
    )
}

fn exclude_set(directory: &Path, exclude: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in exclude {
        let pattern = pattern.trim_end_matches('/');
        for candidate in [pattern.to_string(), format!("{}/**", pattern)] {
            let glob = Glob::new(&candidate).map_err(|e| Error::AssetFingerprint {
                path: directory.to_path_buf(),
                message: format!("invalid exclude pattern '{}': {}", pattern, e),
            })?;
            builder.add(glob);
        }
    }
    builder.build().map_err(|e| Error::AssetFingerprint {
        path: directory.to_path_buf(),
        message: e.to_string(),
    })
}

/// SHA-256 fingerprint of a build context.
///
/// Covers the relative path and contents of every file not matched by
/// `exclude`, visited in sorted order, plus the build options.
pub fn fingerprint(
    directory: &Path,
    exclude: &[String],
    target: Option<&str>,
    file: Option<&str>,
) -> Result<String> {
    if !directory.is_dir() {
        return Err(Error::AssetNotFound(directory.to_path_buf()));
    }
    let excluded = exclude_set(directory, exclude)?;
    let mut hasher = Sha256::new();
    let mut files = 0usize;

    let walker = WalkDir::new(directory)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| match entry.path().strip_prefix(directory) {
            Ok(rel) if rel.as_os_str().is_empty() => true,
            Ok(rel) => !excluded.is_match(rel),
            Err(_) => false,
        });

    for entry in walker {
        let entry = entry.map_err(|e| Error::AssetFingerprint {
            path: directory.to_path_buf(),
            message: e.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(directory)
            .map_err(|e| Error::Internal(e.to_string()))?;
        let rel = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        hasher.update(rel.as_bytes());
        hasher.update([0u8]);
        hasher.update(fs::read(entry.path())?);
        hasher.update([0u8]);
        files += 1;
    }

    hasher.update(format!("target:{}\0", target.unwrap_or("")).as_bytes());
    hasher.update(format!("file:{}\0", file.unwrap_or("")).as_bytes());
    hasher.update(format!("exclude:{}\0", exclude.join(",")).as_bytes());

    debug!(directory = %directory.display(), files, "hashed build context");
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::Environment;
    use tempfile::TempDir;

    fn context() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Dockerfile"), "FROM scratch\n").unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/main.rs"), "fn main() {}\n").unwrap();
        fs::create_dir(dir.path().join("cdk")).unwrap();
        fs::write(dir.path().join("cdk/cdk.out"), "synth output").unwrap();
        dir
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let dir = context();
        let a = fingerprint(dir.path(), &[], None, None).unwrap();
        let b = fingerprint(dir.path(), &[], None, None).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_excluded_files_do_not_change_fingerprint() {
        let dir = context();
        let exclude = vec!["cdk".to_string()];
        let before = fingerprint(dir.path(), &exclude, Some("core-ecs"), None).unwrap();
        fs::write(dir.path().join("cdk/cdk.out"), "different output").unwrap();
        let after = fingerprint(dir.path(), &exclude, Some("core-ecs"), None).unwrap();
        assert_eq!(before, after);

        fs::write(dir.path().join("src/main.rs"), "fn main() { }\n").unwrap();
        let changed = fingerprint(dir.path(), &exclude, Some("core-ecs"), None).unwrap();
        assert_ne!(before, changed);
    }

    #[test]
    fn test_target_changes_fingerprint() {
        let dir = context();
        let exclude = vec!["cdk".to_string()];
        let ecs = fingerprint(dir.path(), &exclude, Some("core-ecs"), None).unwrap();
        let lambda = fingerprint(dir.path(), &exclude, Some("compile-lambda"), None).unwrap();
        assert_ne!(ecs, lambda);
    }

    #[test]
    fn test_missing_directory() {
        let result = fingerprint(Path::new("/nonexistent/build/context"), &[], None, None);
        assert!(matches!(result, Err(Error::AssetNotFound(_))));
    }

    #[test]
    fn test_asset_registration_and_uri() {
        let dir = context();
        let mut stack =
            Stack::new("Test", Environment::new("123456789012", "us-east-1").unwrap()).unwrap();
        let props = DockerImageAssetProps {
            directory: dir.path().to_path_buf(),
            exclude: vec!["cdk".into()],
            target: Some("core-ecs".into()),
            file: None,
        };
        let asset = DockerImageAsset::new(&mut stack, &["AxumImage"], props.clone()).unwrap();
        DockerImageAsset::new(&mut stack, &["Again"], props).unwrap();
        assert_eq!(stack.assets().len(), 1);

        let uri = asset.image_uri().to_json();
        let uri = uri["Fn::Sub"].as_str().unwrap();
        assert!(uri.contains("cdk-hnb659fds-container-assets-${AWS::AccountId}-${AWS::Region}"));
        assert!(uri.ends_with(asset.hash()));
    }

    #[test]
    fn test_missing_dockerfile() {
        let dir = TempDir::new().unwrap();
        let mut stack =
            Stack::new("Test", Environment::new("123456789012", "us-east-1").unwrap()).unwrap();
        let result = DockerImageAsset::new(
            &mut stack,
            &["Image"],
            DockerImageAssetProps {
                directory: dir.path().to_path_buf(),
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(Error::AssetFingerprint { .. })));
    }

    #[test]
    fn test_relative_context_is_made_absolute() {
        let dir = context();
        let mut stack =
            Stack::new("Test", Environment::new("123456789012", "us-east-1").unwrap()).unwrap();
        DockerImageAsset::new(
            &mut stack,
            &["Image"],
            DockerImageAssetProps {
                directory: dir.path().join("src").join(".."),
                exclude: vec!["cdk".into()],
                ..Default::default()
            },
        )
        .unwrap();

        let registered = &stack.assets()[0].directory;
        assert!(registered.is_absolute());
        assert_eq!(registered, &fs::canonicalize(dir.path()).unwrap());
    }

    #[test]
    fn test_missing_context_directory() {
        let mut stack =
            Stack::new("Test", Environment::new("123456789012", "us-east-1").unwrap()).unwrap();
        let result = DockerImageAsset::new(
            &mut stack,
            &["Image"],
            DockerImageAssetProps {
                directory: PathBuf::from("/nonexistent/build/context"),
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(Error::AssetNotFound(_))));
    }
}
