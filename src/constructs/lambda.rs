//! Lambda functions packaged as container images.

use serde_json::json;

use super::iam::{self, GrantKind, ManagedPolicy, PolicyStatement, Role, RoleProps};
use super::logs::{LogGroup, LogGroupProps, RetentionDays};
use super::{impl_construct, Duration, Size};
use crate::assets::{DockerImageAsset, DockerImageAssetProps};
use crate::error::{Error, Result};
use crate::stack::{Construct, Stack};
use crate::template::{Resource, Value};

const MAX_TIMEOUT: Duration = Duration::minutes(15);
const MIN_EPHEMERAL: Size = Size::mebibytes(512);
const MAX_EPHEMERAL: Size = Size::gibibytes(10);

/// Function code.
#[derive(Debug, Clone)]
pub enum Code {
    /// Image built from a local Docker context
    AssetImage(DockerImageAssetProps),
}

impl Code {
    /// Image built from a local Docker context.
    pub fn from_asset_image(props: DockerImageAssetProps) -> Self {
        Code::AssetImage(props)
    }
}

/// Properties for [`Function`].
#[derive(Debug, Clone)]
pub struct FunctionProps {
    /// Code
    pub code: Code,
    /// Memory in MiB, 128 to 10240
    pub memory_size: u32,
    /// `/tmp` size, 512 MiB to 10 GiB
    pub ephemeral_storage_size: Option<Size>,
    /// Maximum run time, up to 15 minutes
    pub timeout: Duration,
    /// Retention of the function's log group
    pub log_retention: Option<RetentionDays>,
}

/// A Lambda function.
#[derive(Debug, Clone)]
pub struct Function {
    path: Vec<String>,
    logical_id: String,
    role: Role,
    asset: DockerImageAsset,
}

impl_construct!(Function);

impl Function {
    /// Declare a function.
    pub fn new(stack: &mut Stack, id: &str, props: FunctionProps) -> Result<Self> {
        validate(id, &props)?;
        let path = vec![id.to_string()];

        let Code::AssetImage(asset_props) = props.code;
        let asset = DockerImageAsset::new(stack, &[id, "AssetImage"], asset_props)?;

        let mut role_props = RoleProps::assumed_by("lambda.amazonaws.com");
        role_props
            .managed_policies
            .push(ManagedPolicy::aws_managed("service-role/AWSLambdaBasicExecutionRole"));
        let role = Role::within(stack, &path, "ServiceRole", role_props)?;

        let mut resource = Resource::new("AWS::Lambda::Function").with_properties(json!({
            "Code": { "ImageUri": asset.image_uri().to_json() },
            "MemorySize": props.memory_size,
            "PackageType": "Image",
            "Role": role.arn().to_json(),
            "Timeout": props.timeout.to_seconds()
        }));
        if let Some(size) = props.ephemeral_storage_size {
            resource = resource.with_property("EphemeralStorage", json!({ "Size": size.to_mebibytes() }));
        }
        if let Some(retention) = props.log_retention {
            let group = LogGroup::within(
                stack,
                &path,
                "LogGroup",
                LogGroupProps {
                    retention,
                    ..Default::default()
                },
            )?;
            resource = resource.with_property(
                "LoggingConfig",
                json!({ "LogGroup": group.reference().to_json() }),
            );
        }

        let logical_id = stack.add_resource(&[id, "Resource"], resource)?;
        stack.add_dependency_on_path(&logical_id, role.path());

        Ok(Self {
            path,
            logical_id,
            role,
            asset,
        })
    }

    /// `Fn::GetAtt Arn`
    pub fn function_arn(&self) -> Value {
        Value::get_att(&self.logical_id, "Arn")
    }

    /// `Ref` (the function name)
    pub fn function_name(&self) -> Value {
        Value::reference(&self.logical_id)
    }

    /// Execution role of the function
    pub fn role(&self) -> &Role {
        &self.role
    }

    /// Image asset the function runs
    pub fn asset(&self) -> &DockerImageAsset {
        &self.asset
    }

    /// Allow `grantee` to invoke the function and any of its versions.
    pub fn grant_invoke(&self, stack: &mut Stack, grantee: &Role) -> Result<bool> {
        let arn = self.function_arn();
        let versions = Value::join("", vec![arn.clone(), Value::from(":*")]);
        iam::grant(
            stack,
            grantee,
            GrantKind::Invoke,
            &self.logical_id,
            vec![PolicyStatement::allow(&["lambda:InvokeFunction"], vec![arn, versions])],
        )
    }
}

fn validate(id: &str, props: &FunctionProps) -> Result<()> {
    if !(128..=10240).contains(&props.memory_size) {
        return Err(Error::invalid_props(
            id,
            format!("memory size {} MiB is outside 128..=10240", props.memory_size),
        ));
    }
    if props.timeout > MAX_TIMEOUT || props.timeout.to_seconds() == 0 {
        return Err(Error::invalid_props(
            id,
            "timeout must be between 1 second and 15 minutes",
        ));
    }
    if let Some(size) = props.ephemeral_storage_size {
        if size < MIN_EPHEMERAL || size > MAX_EPHEMERAL {
            return Err(Error::invalid_props(
                id,
                "ephemeral storage must be between 512 MiB and 10 GiB",
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::Environment;
    use std::fs;
    use tempfile::TempDir;

    fn context() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Dockerfile"), "FROM scratch AS compile-lambda\n").unwrap();
        dir
    }

    fn props(dir: &TempDir) -> FunctionProps {
        FunctionProps {
            code: Code::from_asset_image(DockerImageAssetProps {
                directory: dir.path().to_path_buf(),
                exclude: vec!["cdk".into()],
                target: Some("compile-lambda".into()),
                file: None,
            }),
            memory_size: 1024,
            ephemeral_storage_size: Some(Size::gibibytes(2)),
            timeout: Duration::seconds(30),
            log_retention: Some(RetentionDays::OneWeek),
        }
    }

    #[test]
    fn test_function_properties() {
        let dir = context();
        let mut stack =
            Stack::new("Test", Environment::new("123456789012", "us-east-1").unwrap()).unwrap();
        let function = Function::new(&mut stack, "CompileLambda", props(&dir)).unwrap();

        let template = stack.synth().unwrap();
        let resource = template.resource(function.logical_id()).unwrap();
        assert_eq!(resource.property("PackageType"), Some(&json!("Image")));
        assert_eq!(resource.property("MemorySize"), Some(&json!(1024)));
        assert_eq!(resource.property("Timeout"), Some(&json!(30)));
        assert_eq!(resource.property("EphemeralStorage"), Some(&json!({"Size": 2048})));
        assert!(resource.depends_on.contains(&function.role().logical_id().to_string()));
        assert_eq!(template.count_of_type("AWS::Logs::LogGroup"), 1);
        assert_eq!(stack.assets().len(), 1);
    }

    #[test]
    fn test_grant_invoke_covers_versions() {
        let dir = context();
        let mut stack =
            Stack::new("Test", Environment::new("123456789012", "us-east-1").unwrap()).unwrap();
        let function = Function::new(&mut stack, "CompileLambda", props(&dir)).unwrap();
        let caller = Role::new(&mut stack, "Caller", RoleProps::assumed_by("ecs-tasks.amazonaws.com"))
            .unwrap();

        assert!(function.grant_invoke(&mut stack, &caller).unwrap());
        let policy_id = caller.default_policy_id(&stack).unwrap();
        let statement = &stack.resource(&policy_id).unwrap().property("PolicyDocument").unwrap()
            ["Statement"][0];
        assert_eq!(statement["Action"], json!("lambda:InvokeFunction"));
        assert_eq!(statement["Resource"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_limits_are_validated() {
        let dir = context();
        let mut stack =
            Stack::new("Test", Environment::new("123456789012", "us-east-1").unwrap()).unwrap();
        let mut too_long = props(&dir);
        too_long.timeout = Duration::minutes(16);
        assert!(Function::new(&mut stack, "A", too_long).is_err());

        let mut too_small = props(&dir);
        too_small.memory_size = 64;
        assert!(Function::new(&mut stack, "B", too_small).is_err());

        let mut too_much_disk = props(&dir);
        too_much_disk.ephemeral_storage_size = Some(Size::gibibytes(11));
        assert!(Function::new(&mut stack, "C", too_much_disk).is_err());
    }
}
