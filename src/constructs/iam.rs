//! IAM roles, policy statements and grants.
//!
//! Permissions are never written by hand in the topology. A resource
//! construct exposes `grant_*` methods that add a [`PolicyStatement`] to the
//! grantee's default policy and record a [`Grant`] in the stack, so the
//! intent stays inspectable after synthesis.

use serde_json::{json, Value as Json};

use super::{child_path, impl_construct};
use crate::error::{Error, Result};
use crate::stack::Stack;
use crate::template::{Resource, Value};

const POLICY_VERSION: &str = "2012-10-17";

/// A service that may assume a role, e.g. `ecs-tasks.amazonaws.com`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServicePrincipal(String);

impl ServicePrincipal {
    /// Create a service principal.
    pub fn new(service: impl Into<String>) -> Self {
        Self(service.into())
    }

    /// The service name.
    pub fn service(&self) -> &str {
        &self.0
    }

    fn assume_role_policy(&self) -> Json {
        json!({
            "Statement": [{
                "Action": "sts:AssumeRole",
                "Effect": "Allow",
                "Principal": { "Service": self.0 }
            }],
            "Version": POLICY_VERSION
        })
    }
}

/// A managed policy attached by ARN.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagedPolicy {
    name: String,
    arn: Value,
}

impl ManagedPolicy {
    /// An AWS-managed policy, e.g. `service-role/AmazonECSTaskExecutionRolePolicy`.
    pub fn aws_managed(name: &str) -> Self {
        Self {
            name: name.to_string(),
            arn: Value::join(
                "",
                vec![
                    Value::from("arn:"),
                    Value::partition(),
                    Value::from(format!(":iam::aws:policy/{}", name)),
                ],
            ),
        }
    }

    /// Policy name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Policy ARN
    pub fn arn(&self) -> &Value {
        &self.arn
    }
}

/// Statement effect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Allow the actions
    Allow,
    /// Deny the actions
    Deny,
}

impl Effect {
    fn as_str(self) -> &'static str {
        match self {
            Effect::Allow => "Allow",
            Effect::Deny => "Deny",
        }
    }
}

/// One statement of a policy document.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyStatement {
    /// Effect
    pub effect: Effect,
    /// Actions, e.g. `dynamodb:GetItem`
    pub actions: Vec<String>,
    /// Resource ARNs
    pub resources: Vec<Value>,
}

impl PolicyStatement {
    /// An `Allow` statement.
    pub fn allow<S: AsRef<str>>(actions: &[S], resources: Vec<Value>) -> Self {
        Self {
            effect: Effect::Allow,
            actions: actions.iter().map(|a| a.as_ref().to_string()).collect(),
            resources,
        }
    }

    /// JSON form. Single actions and resources are not wrapped in a list.
    pub fn to_json(&self) -> Json {
        let action = match self.actions.as_slice() {
            [single] => json!(single),
            many => json!(many),
        };
        let resource = match self.resources.as_slice() {
            [single] => single.to_json(),
            many => Json::Array(many.iter().map(Value::to_json).collect()),
        };
        json!({
            "Action": action,
            "Effect": self.effect.as_str(),
            "Resource": resource
        })
    }
}

/// Kind of access a grant gives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GrantKind {
    /// Pull a container image
    Pull,
    /// Invoke a function
    Invoke,
    /// Read and write table items
    ReadWriteData,
    /// Read and write bucket objects
    ReadWrite,
    /// Write to a log group
    LogWrite,
}

/// A recorded permission grant from a resource to a role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    /// Logical id of the role receiving access
    pub grantee: String,
    /// Kind of access
    pub kind: GrantKind,
    /// Logical id (or repository name) of what access is granted on
    pub target: String,
    /// Actions allowed
    pub actions: Vec<String>,
}

/// Properties for [`Role`].
#[derive(Debug, Clone)]
pub struct RoleProps {
    /// Principal allowed to assume the role
    pub assumed_by: ServicePrincipal,
    /// Managed policies attached at creation
    pub managed_policies: Vec<ManagedPolicy>,
    /// Optional description
    pub description: Option<String>,
}

impl RoleProps {
    /// Props for a role assumed by `service`.
    pub fn assumed_by(service: &str) -> Self {
        Self {
            assumed_by: ServicePrincipal::new(service),
            managed_policies: Vec::new(),
            description: None,
        }
    }
}

/// An IAM role.
///
/// Inline permissions go to a default policy resource, created the first
/// time a statement is added.
#[derive(Debug, Clone)]
pub struct Role {
    path: Vec<String>,
    logical_id: String,
    policy_path: Vec<String>,
}

impl_construct!(Role);

impl Role {
    /// Declare a top-level role.
    pub fn new(stack: &mut Stack, id: &str, props: RoleProps) -> Result<Self> {
        Self::within(stack, &[], id, props)
    }

    /// Declare a role nested under another construct.
    pub fn within(
        stack: &mut Stack,
        scope: &[String],
        id: &str,
        props: RoleProps,
    ) -> Result<Self> {
        let path = child_path(scope, &[id]);
        let mut resource = Resource::new("AWS::IAM::Role").with_property(
            "AssumeRolePolicyDocument",
            props.assumed_by.assume_role_policy(),
        );
        if let Some(description) = &props.description {
            resource = resource.with_property("Description", json!(description));
        }
        for policy in &props.managed_policies {
            resource.push_property("ManagedPolicyArns", policy.arn().to_json());
        }

        let logical_id = stack.add_resource(&child_path(&path, &["Resource"]), resource)?;
        let policy_path = child_path(&path, &["DefaultPolicy", "Resource"]);

        Ok(Self {
            path,
            logical_id,
            policy_path,
        })
    }

    /// `Fn::GetAtt Arn`
    pub fn arn(&self) -> Value {
        Value::get_att(&self.logical_id, "Arn")
    }

    /// `Ref` (the role name)
    pub fn reference(&self) -> Value {
        Value::reference(&self.logical_id)
    }

    /// Attach a managed policy.
    pub fn add_managed_policy(&self, stack: &mut Stack, policy: &ManagedPolicy) -> Result<()> {
        stack.push_property(&self.logical_id, "ManagedPolicyArns", policy.arn().to_json())
    }

    /// Logical id of the default policy, if one has been created.
    pub fn default_policy_id(&self, stack: &Stack) -> Option<String> {
        let id = stack.logical_id_for(&self.policy_path).ok()?;
        stack.contains(&id).then_some(id)
    }

    /// Append a statement to the role's default policy.
    pub fn add_to_policy(&self, stack: &mut Stack, statement: PolicyStatement) -> Result<()> {
        let policy_id = match self.default_policy_id(stack) {
            Some(id) => id,
            None => {
                let name = stack.logical_id_for(&self.policy_path)?;
                let resource = Resource::new("AWS::IAM::Policy").with_properties(json!({
                    "PolicyDocument": {
                        "Statement": [],
                        "Version": POLICY_VERSION
                    },
                    "PolicyName": name,
                    "Roles": [self.reference().to_json()]
                }));
                stack.add_resource(&self.policy_path, resource)?
            }
        };

        let resource = stack.resource_mut(&policy_id)?;
        let statements = resource
            .properties
            .get_mut("PolicyDocument")
            .and_then(|doc| doc.get_mut("Statement"))
            .and_then(Json::as_array_mut)
            .ok_or_else(|| {
                Error::Internal(format!("Policy '{}' has no statement list", policy_id))
            })?;
        statements.push(statement.to_json());
        Ok(())
    }
}

/// Grant `statements` to `grantee` and record the grant.
///
/// A grant identical to one already recorded is a no-op, so calling a
/// `grant_*` method twice does not duplicate policy statements. Returns
/// whether anything was added.
pub fn grant(
    stack: &mut Stack,
    grantee: &Role,
    kind: GrantKind,
    target: &str,
    statements: Vec<PolicyStatement>,
) -> Result<bool> {
    let actions = statements
        .iter()
        .flat_map(|s| s.actions.iter().cloned())
        .collect();
    let recorded = stack.record_grant(Grant {
        grantee: grantee.logical_id.clone(),
        kind,
        target: target.to_string(),
        actions,
    });
    if !recorded {
        return Ok(false);
    }

    for statement in statements {
        grantee.add_to_policy(stack, statement)?;
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::{Construct, Environment};

    fn stack() -> Stack {
        Stack::new("Test", Environment::new("123456789012", "us-east-1").unwrap()).unwrap()
    }

    #[test]
    fn test_role_with_managed_policy() {
        let mut stack = stack();
        let mut props = RoleProps::assumed_by("ecs-tasks.amazonaws.com");
        props
            .managed_policies
            .push(ManagedPolicy::aws_managed("service-role/AmazonECSTaskExecutionRolePolicy"));
        let role = Role::new(&mut stack, "ExecutionRole", props).unwrap();

        let resource = stack.resource(role.logical_id()).unwrap();
        assert_eq!(
            resource.property("AssumeRolePolicyDocument").unwrap()["Statement"][0]["Principal"]
                ["Service"],
            json!("ecs-tasks.amazonaws.com")
        );
        let arns = resource.property("ManagedPolicyArns").unwrap();
        assert_eq!(arns.as_array().unwrap().len(), 1);
        assert_eq!(
            arns[0]["Fn::Join"][1][2],
            json!(":iam::aws:policy/service-role/AmazonECSTaskExecutionRolePolicy")
        );
    }

    #[test]
    fn test_default_policy_created_lazily() {
        let mut stack = stack();
        let role = Role::new(&mut stack, "TaskRole", RoleProps::assumed_by("ecs-tasks.amazonaws.com"))
            .unwrap();
        assert!(role.default_policy_id(&stack).is_none());

        role.add_to_policy(
            &mut stack,
            PolicyStatement::allow(&["lambda:InvokeFunction"], vec![Value::from("*")]),
        )
        .unwrap();
        role.add_to_policy(
            &mut stack,
            PolicyStatement::allow(&["s3:GetObject", "s3:PutObject"], vec![Value::from("*")]),
        )
        .unwrap();

        let policy_id = role.default_policy_id(&stack).unwrap();
        let policy = stack.resource(&policy_id).unwrap();
        let statements = &policy.property("PolicyDocument").unwrap()["Statement"];
        assert_eq!(statements.as_array().unwrap().len(), 2);
        assert_eq!(statements[0]["Action"], json!("lambda:InvokeFunction"));
        assert_eq!(statements[1]["Action"], json!(["s3:GetObject", "s3:PutObject"]));
        assert_eq!(
            policy.property("Roles").unwrap(),
            &json!([{"Ref": role.logical_id()}])
        );
    }

    #[test]
    fn test_grant_is_recorded_once() {
        let mut stack = stack();
        let role = Role::new(&mut stack, "TaskRole", RoleProps::assumed_by("ecs-tasks.amazonaws.com"))
            .unwrap();
        let statements = || {
            vec![PolicyStatement::allow(
                &["lambda:InvokeFunction"],
                vec![Value::get_att("Fn", "Arn")],
            )]
        };

        assert!(grant(&mut stack, &role, GrantKind::Invoke, "Fn", statements()).unwrap());
        assert!(!grant(&mut stack, &role, GrantKind::Invoke, "Fn", statements()).unwrap());

        let policy_id = role.default_policy_id(&stack).unwrap();
        let statements = &stack.resource(&policy_id).unwrap().property("PolicyDocument").unwrap()
            ["Statement"];
        assert_eq!(statements.as_array().unwrap().len(), 1);
        assert_eq!(stack.grants_for(role.logical_id()).count(), 1);
    }
}
