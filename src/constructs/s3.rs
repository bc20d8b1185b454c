//! S3 buckets.
//!
//! CloudFormation refuses to delete a bucket that still holds objects. A
//! bucket declared with `auto_delete_objects` therefore gets a custom
//! resource whose handler empties it when the stack is torn down. The
//! handler and its role are shared by every such bucket in a stack.

use serde_json::json;

use super::iam::{self, GrantKind, PolicyStatement, Role};
use super::{child_path, impl_construct, RemovalPolicy};
use crate::error::{Error, Result};
use crate::stack::Stack;
use crate::template::{DeletionPolicy, Resource, Value};

/// Tag marking buckets the auto-delete handler may empty.
pub const AUTO_DELETE_OBJECTS_TAG: &str = "aws-cdk:auto-delete-objects";
const AUTO_DELETE_RESOURCE_TYPE: &str = "Custom::S3AutoDeleteObjects";
const PROVIDER_ID: &str = "Custom::S3AutoDeleteObjectsCustomResourceProvider";

const READ_ACTIONS: &[&str] = &["s3:GetObject*", "s3:GetBucket*", "s3:List*"];
const PUT_ACTIONS: &[&str] = &[
    "s3:PutObject",
    "s3:PutObjectLegalHold",
    "s3:PutObjectRetention",
    "s3:PutObjectTagging",
    "s3:PutObjectVersionTagging",
    "s3:Abort*",
];
const DELETE_ACTIONS: &[&str] = &["s3:DeleteObject*"];

/// Empties a tagged bucket on stack deletion.
const AUTO_DELETE_HANDLER: &str = r#"import boto3
import cfnresponse

s3 = boto3.client("s3")

def handler(event, context):
    bucket = event["ResourceProperties"]["BucketName"]
    try:
        if event["RequestType"] == "Delete" and is_tagged(bucket):
            empty(bucket)
        cfnresponse.send(event, context, cfnresponse.SUCCESS, {}, bucket)
    except Exception as e:
        print(e)
        cfnresponse.send(event, context, cfnresponse.FAILED, {}, bucket)

def is_tagged(bucket):
    try:
        tags = s3.get_bucket_tagging(Bucket=bucket)["TagSet"]
    except s3.exceptions.ClientError:
        return False
    return any(t["Key"] == "aws-cdk:auto-delete-objects" and t["Value"] == "true" for t in tags)

def empty(bucket):
    paginator = s3.get_paginator("list_object_versions")
    for page in paginator.paginate(Bucket=bucket):
        objects = [
            {"Key": o["Key"], "VersionId": o["VersionId"]}
            for o in page.get("Versions", []) + page.get("DeleteMarkers", [])
        ]
        if objects:
            s3.delete_objects(Bucket=bucket, Delete={"Objects": objects})
"#;

/// Properties for [`Bucket`].
#[derive(Debug, Clone, Default)]
pub struct BucketProps {
    /// Empty the bucket on stack deletion; requires `Destroy`
    pub auto_delete_objects: bool,
    /// Removal policy
    pub removal_policy: RemovalPolicy,
    /// Keep object versions
    pub versioned: bool,
}

/// An S3 bucket.
#[derive(Debug, Clone)]
pub struct Bucket {
    path: Vec<String>,
    logical_id: String,
}

impl_construct!(Bucket);

impl Bucket {
    /// Declare a bucket.
    pub fn new(stack: &mut Stack, id: &str, props: BucketProps) -> Result<Self> {
        if props.auto_delete_objects && props.removal_policy != RemovalPolicy::Destroy {
            return Err(Error::invalid_props(
                id,
                "auto_delete_objects requires the Destroy removal policy",
            ));
        }

        let path = vec![id.to_string()];
        let mut resource = Resource::new("AWS::S3::Bucket")
            .with_removal_policy(props.removal_policy.deletion_policy());
        if props.versioned {
            resource = resource
                .with_property("VersioningConfiguration", json!({ "Status": "Enabled" }));
        }
        if props.auto_delete_objects {
            resource = resource.with_property(
                "Tags",
                json!([{ "Key": AUTO_DELETE_OBJECTS_TAG, "Value": "true" }]),
            );
        }
        let logical_id = stack.add_resource(&[id, "Resource"], resource)?;

        let bucket = Self { path, logical_id };
        if props.auto_delete_objects {
            bucket.enable_auto_delete_objects(stack)?;
        }
        Ok(bucket)
    }

    /// `Ref` (the generated bucket name)
    pub fn bucket_name(&self) -> Value {
        Value::reference(&self.logical_id)
    }

    /// `Fn::GetAtt Arn`
    pub fn bucket_arn(&self) -> Value {
        Value::get_att(&self.logical_id, "Arn")
    }

    /// ARN matching objects under `pattern`, e.g. `*`.
    pub fn arn_for_objects(&self, pattern: &str) -> Value {
        Value::join("", vec![self.bucket_arn(), Value::from(format!("/{}", pattern))])
    }

    /// Allow `grantee` to read, write and delete objects.
    pub fn grant_read_write(&self, stack: &mut Stack, grantee: &Role) -> Result<bool> {
        let actions: Vec<&str> = READ_ACTIONS
            .iter()
            .chain(PUT_ACTIONS)
            .chain(DELETE_ACTIONS)
            .copied()
            .collect();
        iam::grant(
            stack,
            grantee,
            GrantKind::ReadWrite,
            &self.logical_id,
            vec![PolicyStatement::allow(
                &actions,
                vec![self.bucket_arn(), self.arn_for_objects("*")],
            )],
        )
    }

    fn enable_auto_delete_objects(&self, stack: &mut Stack) -> Result<()> {
        let (provider_role, handler) = auto_delete_provider(stack)?;

        let policy = stack.add_resource(
            &child_path(&self.path, &["Policy", "Resource"]),
            Resource::new("AWS::S3::BucketPolicy").with_properties(json!({
                "Bucket": self.bucket_name().to_json(),
                "PolicyDocument": {
                    "Statement": [{
                        "Action": [
                            "s3:PutBucketPolicy",
                            "s3:GetBucket*",
                            "s3:List*",
                            "s3:DeleteObject*"
                        ],
                        "Effect": "Allow",
                        "Principal": {
                            "AWS": Value::get_att(&provider_role, "Arn").to_json()
                        },
                        "Resource": [
                            self.bucket_arn().to_json(),
                            self.arn_for_objects("*").to_json()
                        ]
                    }],
                    "Version": "2012-10-17"
                }
            })),
        )?;

        stack.add_resource(
            &child_path(&self.path, &["AutoDeleteObjectsCustomResource", "Default"]),
            Resource::new(AUTO_DELETE_RESOURCE_TYPE)
                .with_properties(json!({
                    "ServiceToken": Value::get_att(&handler, "Arn").to_json(),
                    "BucketName": self.bucket_name().to_json()
                }))
                .with_dependency(policy)
                .with_removal_policy(DeletionPolicy::Delete),
        )?;
        Ok(())
    }
}

/// Role and handler shared by every auto-delete bucket in a stack.
fn auto_delete_provider(stack: &mut Stack) -> Result<(String, String)> {
    let role_path = [PROVIDER_ID, "Role"];
    let handler_path = [PROVIDER_ID, "Handler"];
    let role_id = stack.logical_id_for(&role_path)?;
    let handler_id = stack.logical_id_for(&handler_path)?;
    if stack.contains(&handler_id) {
        return Ok((role_id, handler_id));
    }

    stack.add_resource(
        &role_path,
        Resource::new("AWS::IAM::Role").with_properties(json!({
            "AssumeRolePolicyDocument": {
                "Version": "2012-10-17",
                "Statement": [{
                    "Action": "sts:AssumeRole",
                    "Effect": "Allow",
                    "Principal": { "Service": "lambda.amazonaws.com" }
                }]
            },
            "ManagedPolicyArns": [{
                "Fn::Sub": "arn:${AWS::Partition}:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole"
            }],
            "Policies": [{
                "PolicyName": "Inline",
                "PolicyDocument": {
                    "Version": "2012-10-17",
                    "Statement": [{
                        "Action": ["s3:GetBucketTagging"],
                        "Effect": "Allow",
                        "Resource": "*"
                    }]
                }
            }]
        })),
    )?;

    stack.add_resource(
        &handler_path,
        Resource::new("AWS::Lambda::Function")
            .with_properties(json!({
                "Code": { "ZipFile": AUTO_DELETE_HANDLER },
                "Description": "Deletes all objects in a tagged bucket when the stack is deleted",
                "Handler": "index.handler",
                "MemorySize": 128,
                "Role": Value::get_att(&role_id, "Arn").to_json(),
                "Runtime": "python3.12",
                "Timeout": 900
            }))
            .with_dependency(role_id.clone()),
    )?;

    Ok((role_id, handler_id))
}
