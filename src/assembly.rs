//! Cloud assembly output.
//!
//! A cloud assembly is the directory handed to the deployment engine. For a
//! single stack it holds three files:
//!
//! ```text
//! cdk.out/
//! ├── manifest.json              # artifact index
//! ├── <stack>.template.json      # the synthesized template
//! └── <stack>.assets.json        # what to build and publish before deploying
//! ```
//!
//! The layout and the bootstrap parameter follow the modern CDK bootstrap
//! (qualifier `hnb659fds`, bootstrap version 6), so `cdk deploy --app cdk.out`
//! accepts the directory as-is.

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{json, Value as Json};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::assets::ImageAssetSource;
use crate::error::{ErrorContext, Result};
use crate::stack::Stack;
use crate::template::Parameter;

/// Qualifier of the default CDK bootstrap stack.
pub const BOOTSTRAP_QUALIFIER: &str = "hnb659fds";

/// Minimum bootstrap stack version the assembly requires.
pub const REQUIRED_BOOTSTRAP_VERSION: u32 = 6;

/// Cloud assembly schema version written to every manifest.
pub const SCHEMA_VERSION: &str = "36.0.0";

/// Name of the parameter holding the deployed bootstrap version.
pub const BOOTSTRAP_VERSION_PARAMETER: &str = "BootstrapVersion";

/// Default output directory.
pub const DEFAULT_OUTDIR: &str = "cdk.out";

fn bootstrap_version_ssm_parameter() -> String {
    format!("/cdk-bootstrap/{}/version", BOOTSTRAP_QUALIFIER)
}

/// Parameters every synthesized template carries.
pub fn bootstrap_parameters() -> IndexMap<String, Parameter> {
    let mut parameters = IndexMap::new();
    parameters.insert(
        BOOTSTRAP_VERSION_PARAMETER.to_string(),
        Parameter {
            parameter_type: "AWS::SSM::Parameter::Value<String>".to_string(),
            default: Some(bootstrap_version_ssm_parameter()),
            description: Some(
                "Version of the CDK Bootstrap resources in this environment, automatically \
                 retrieved from SSM Parameter Store. [cdk:skip]"
                    .to_string(),
            ),
        },
    );
    parameters
}

/// Rules every synthesized template carries.
pub fn bootstrap_rules() -> IndexMap<String, Json> {
    let old_versions: Vec<String> = (1..REQUIRED_BOOTSTRAP_VERSION).map(|v| v.to_string()).collect();
    let mut rules = IndexMap::new();
    rules.insert(
        "CheckBootstrapVersion".to_string(),
        json!({
            "Assertions": [{
                "Assert": {
                    "Fn::Not": [{
                        "Fn::Contains": [old_versions, { "Ref": BOOTSTRAP_VERSION_PARAMETER }]
                    }]
                },
                "AssertDescription": format!(
                    "CDK bootstrap stack version {} required. Please run 'cdk bootstrap' with a \
                     recent version of the CDK CLI.",
                    REQUIRED_BOOTSTRAP_VERSION
                )
            }]
        }),
    );
    rules
}

/// `arn:${AWS::Partition}:iam::<account>:role/cdk-<qualifier>-<kind>-role-<account>-<region>`
fn bootstrap_role_arn(kind: &str, account: &str, region: &str) -> String {
    format!(
        "arn:${{AWS::Partition}}:iam::{account}:role/cdk-{}-{kind}-role-{account}-{region}",
        BOOTSTRAP_QUALIFIER
    )
}

// ============================================================================
// Manifest model
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AssetManifest {
    version: &'static str,
    files: IndexMap<String, FileAsset>,
    docker_images: IndexMap<String, DockerImageEntry>,
}

#[derive(Debug, Serialize)]
struct FileAsset {
    source: FileSource,
    destinations: IndexMap<String, FileDestination>,
}

#[derive(Debug, Serialize)]
struct FileSource {
    path: String,
    packaging: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileDestination {
    bucket_name: String,
    object_key: String,
    assume_role_arn: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DockerImageEntry {
    display_name: String,
    source: DockerImageSource,
    destinations: IndexMap<String, DockerImageDestination>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DockerImageSource {
    directory: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    docker_build_target: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    docker_exclude: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    docker_file: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DockerImageDestination {
    repository_name: String,
    image_tag: String,
    assume_role_arn: String,
}

#[derive(Debug, Serialize)]
struct Manifest {
    version: &'static str,
    artifacts: IndexMap<String, Artifact>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Artifact {
    #[serde(rename = "type")]
    artifact_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    environment: Option<String>,
    properties: Json,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    dependencies: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    display_name: Option<String>,
}

// ============================================================================
// Writer
// ============================================================================

/// Writes a stack as a cloud assembly.
#[derive(Debug)]
pub struct CloudAssembly;

impl CloudAssembly {
    /// Synthesize `stack` and write the assembly into `outdir`.
    ///
    /// The stack is fully validated before anything touches the disk, and
    /// each file is written to a temporary name first, so a failed run never
    /// leaves a partial template behind. Returns the written paths.
    pub fn write(outdir: impl AsRef<Path>, stack: &Stack) -> Result<Vec<PathBuf>> {
        let outdir = outdir.as_ref();
        let template = stack.synth()?;
        let template_json = template.to_json_pretty()?;

        let env = stack.env();
        let (account, region) = (env.account.as_str(), env.region.as_str());
        let destination = format!("{}-{}", account, region);
        let template_file = format!("{}.template.json", stack.name());
        let assets_file = format!("{}.assets.json", stack.name());
        let template_hash = hex_digest(template_json.as_bytes());

        let mut files = IndexMap::new();
        files.insert(
            template_hash.clone(),
            FileAsset {
                source: FileSource {
                    path: template_file.clone(),
                    packaging: "file",
                },
                destinations: IndexMap::from([(
                    destination.clone(),
                    FileDestination {
                        bucket_name: assets_bucket(account, region),
                        object_key: format!("{}.json", template_hash),
                        assume_role_arn: bootstrap_role_arn("file-publishing", account, region),
                    },
                )]),
            },
        );

        let docker_images = stack
            .assets()
            .iter()
            .map(|asset| {
                (
                    asset.hash.clone(),
                    docker_image_entry(asset, &destination, account, region),
                )
            })
            .collect();

        let asset_manifest = AssetManifest {
            version: SCHEMA_VERSION,
            files,
            docker_images,
        };

        let assets_artifact = format!("{}.assets", stack.name());
        let mut artifacts = IndexMap::new();
        artifacts.insert(
            assets_artifact.clone(),
            Artifact {
                artifact_type: "cdk:asset-manifest",
                environment: None,
                properties: json!({
                    "file": assets_file,
                    "requiresBootstrapStackVersion": REQUIRED_BOOTSTRAP_VERSION,
                    "bootstrapStackVersionSsmParameter": bootstrap_version_ssm_parameter()
                }),
                dependencies: Vec::new(),
                display_name: None,
            },
        );
        artifacts.insert(
            stack.name().to_string(),
            Artifact {
                artifact_type: "aws:cloudformation:stack",
                environment: Some(env.descriptor()),
                properties: json!({
                    "templateFile": template_file,
                    "validateOnSynth": false,
                    "assumeRoleArn": bootstrap_role_arn("deploy", account, region),
                    "cloudFormationExecutionRoleArn":
                        bootstrap_role_arn("cfn-exec", account, region),
                    "stackTemplateAssetObjectUrl": format!(
                        "s3://{}/{}.json",
                        assets_bucket(account, region),
                        template_hash
                    ),
                    "requiresBootstrapStackVersion": REQUIRED_BOOTSTRAP_VERSION,
                    "bootstrapStackVersionSsmParameter": bootstrap_version_ssm_parameter()
                }),
                dependencies: vec![assets_artifact],
                display_name: Some(stack.name().to_string()),
            },
        );
        let manifest = Manifest {
            version: SCHEMA_VERSION,
            artifacts,
        };

        fs::create_dir_all(outdir)
            .with_context(|| format!("creating output directory {}", outdir.display()))?;

        let written = vec![
            write_file(&outdir.join(&template_file), &template_json)?,
            write_file(
                &outdir.join(&assets_file),
                &serde_json::to_string_pretty(&asset_manifest)?,
            )?,
            write_file(
                &outdir.join("manifest.json"),
                &serde_json::to_string_pretty(&manifest)?,
            )?,
        ];

        info!(
            stack = %stack.name(),
            outdir = %outdir.display(),
            files = written.len(),
            images = stack.assets().len(),
            "wrote cloud assembly"
        );
        Ok(written)
    }
}

fn docker_image_entry(
    asset: &ImageAssetSource,
    destination: &str,
    account: &str,
    region: &str,
) -> DockerImageEntry {
    DockerImageEntry {
        display_name: asset.display_name.clone(),
        source: DockerImageSource {
            directory: asset.directory.display().to_string(),
            docker_build_target: asset.target.clone(),
            docker_exclude: asset.exclude.clone(),
            docker_file: asset.file.clone(),
        },
        destinations: IndexMap::from([(
            destination.to_string(),
            DockerImageDestination {
                repository_name: format!(
                    "cdk-{}-container-assets-{}-{}",
                    BOOTSTRAP_QUALIFIER, account, region
                ),
                image_tag: asset.hash.clone(),
                assume_role_arn: bootstrap_role_arn("image-publishing", account, region),
            },
        )]),
    }
}

fn assets_bucket(account: &str, region: &str) -> String {
    format!("cdk-{}-assets-{}-{}", BOOTSTRAP_QUALIFIER, account, region)
}

fn hex_digest(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

fn write_file(path: &Path, content: &str) -> Result<PathBuf> {
    let tmp = path.with_extension("json.tmp");
    let mut body = content.to_string();
    body.push('\n');
    fs::write(&tmp, body).with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("renaming {}", tmp.display()))?;
    debug!(path = %path.display(), "wrote file");
    Ok(path.to_path_buf())
}
