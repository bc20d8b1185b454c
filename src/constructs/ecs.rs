//! ECS on Fargate: cluster, task definition, containers and service.

use indexmap::IndexMap;
use serde_json::{json, Value as Json};
use tracing::debug;

use super::ec2::{SecurityGroup, SecurityGroupProps, Vpc};
use super::elbv2::{ApplicationLoadBalancerTarget, ApplicationTargetGroup, TargetType};
use super::iam::{Role, RoleProps};
use super::logs::{LogGroup, LogGroupProps, RetentionDays};
use super::{child_path, impl_construct};
use crate::assets::DockerImageAsset;
use crate::error::{Error, Result};
use crate::stack::{make_unique_id, Construct, Stack};
use crate::template::{Resource, Value};

const ECS_TASKS_PRINCIPAL: &str = "ecs-tasks.amazonaws.com";

// ============================================================================
// Cluster
// ============================================================================

/// An ECS cluster.
#[derive(Debug, Clone)]
pub struct Cluster {
    path: Vec<String>,
    logical_id: String,
}

impl_construct!(Cluster);

impl Cluster {
    /// Declare a cluster. Networking comes from the services placed in it.
    pub fn new(stack: &mut Stack, id: &str) -> Result<Self> {
        let logical_id = stack.add_resource(&[id, "Resource"], Resource::new("AWS::ECS::Cluster"))?;
        Ok(Self {
            path: vec![id.to_string()],
            logical_id,
        })
    }

    /// `Ref` (the cluster name)
    pub fn cluster_name(&self) -> Value {
        Value::reference(&self.logical_id)
    }

    /// `Fn::GetAtt Arn`
    pub fn arn(&self) -> Value {
        Value::get_att(&self.logical_id, "Arn")
    }
}

// ============================================================================
// Task definition
// ============================================================================

/// Returns true if Fargate accepts this cpu/memory pair.
pub fn is_valid_fargate_size(cpu: u32, memory_mib: u32) -> bool {
    let (min, max, step) = match cpu {
        256 => return matches!(memory_mib, 512 | 1024 | 2048),
        512 => (1024, 4096, 1024),
        1024 => (2048, 8192, 1024),
        2048 => (4096, 16384, 1024),
        4096 => (8192, 30720, 1024),
        8192 => (16384, 61440, 4096),
        16384 => (32768, 122880, 8192),
        _ => return false,
    };
    (min..=max).contains(&memory_mib) && (memory_mib - min) % step == 0
}

/// Properties for [`FargateTaskDefinition`].
#[derive(Debug, Clone)]
pub struct FargateTaskDefinitionProps {
    /// CPU units
    pub cpu: u32,
    /// Memory in MiB
    pub memory_limit_mib: u32,
    /// Role ECS uses to pull images and ship logs; created if unset
    pub execution_role: Option<Role>,
    /// Role the containers run as; created if unset
    pub task_role: Option<Role>,
}

impl Default for FargateTaskDefinitionProps {
    fn default() -> Self {
        Self {
            cpu: 256,
            memory_limit_mib: 512,
            execution_role: None,
            task_role: None,
        }
    }
}

/// Where a container image comes from.
#[derive(Debug, Clone)]
pub enum ContainerImage {
    /// A locally built asset
    Asset(DockerImageAsset),
    /// A public registry image, e.g. `nginx:latest`
    Registry(String),
}

impl ContainerImage {
    /// Image built from a local asset.
    pub fn from_docker_image_asset(asset: &DockerImageAsset) -> Self {
        ContainerImage::Asset(asset.clone())
    }

    /// Image from a registry.
    pub fn from_registry(name: &str) -> Self {
        ContainerImage::Registry(name.to_string())
    }

    fn image_name(&self) -> Value {
        match self {
            ContainerImage::Asset(asset) => asset.image_uri(),
            ContainerImage::Registry(name) => Value::from(name.as_str()),
        }
    }
}

/// Options for the `awslogs` driver.
#[derive(Debug, Clone)]
pub struct AwsLogDriverProps {
    /// Prefix for log stream names
    pub stream_prefix: String,
    /// Retention of the log group created for the container
    pub log_retention: RetentionDays,
}

/// Container logging.
#[derive(Debug, Clone)]
pub enum LogDriver {
    /// CloudWatch Logs
    AwsLogs(AwsLogDriverProps),
}

impl LogDriver {
    /// The `awslogs` driver.
    pub fn aws_logs(props: AwsLogDriverProps) -> Self {
        LogDriver::AwsLogs(props)
    }
}

/// Transport protocol of a port mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protocol {
    /// TCP
    #[default]
    Tcp,
    /// UDP
    Udp,
}

/// A container port exposed to the task network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMapping {
    /// Port inside the container
    pub container_port: u16,
    /// Protocol
    pub protocol: Protocol,
}

impl PortMapping {
    /// TCP mapping for `port`.
    pub fn tcp(port: u16) -> Self {
        Self {
            container_port: port,
            protocol: Protocol::Tcp,
        }
    }

    fn to_json(self) -> Json {
        let protocol = match self.protocol {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        };
        json!({ "ContainerPort": self.container_port, "Protocol": protocol })
    }
}

/// Options for [`FargateTaskDefinition::add_container`].
#[derive(Debug, Clone)]
pub struct ContainerDefinitionOptions {
    /// Image
    pub image: ContainerImage,
    /// Logging driver
    pub logging: Option<LogDriver>,
    /// Exposed ports
    pub port_mappings: Vec<PortMapping>,
    /// Initial environment
    pub environment: IndexMap<String, Value>,
    /// Whether the task stops when this container stops
    pub essential: bool,
}

impl ContainerDefinitionOptions {
    /// Essential container running `image`, no ports, no logging.
    pub fn new(image: ContainerImage) -> Self {
        Self {
            image,
            logging: None,
            port_mappings: Vec::new(),
            environment: IndexMap::new(),
            essential: true,
        }
    }
}

/// A container inside a task definition.
///
/// Containers are entries in the task definition's `ContainerDefinitions`
/// list rather than resources of their own, so this is a handle that edits
/// that entry through the stack.
#[derive(Debug, Clone)]
pub struct ContainerDefinition {
    task_definition_id: String,
    name: String,
    index: usize,
}

impl ContainerDefinition {
    /// Container name
    pub fn name(&self) -> &str {
        &self.name
    }

    fn entry_mut<'a>(&self, stack: &'a mut Stack) -> Result<&'a mut serde_json::Map<String, Json>> {
        let resource = stack.resource_mut(&self.task_definition_id)?;
        resource
            .properties
            .get_mut("ContainerDefinitions")
            .and_then(|defs| defs.get_mut(self.index))
            .and_then(Json::as_object_mut)
            .ok_or_else(|| {
                Error::Internal(format!(
                    "container '{}' missing from task definition '{}'",
                    self.name, self.task_definition_id
                ))
            })
    }

    fn entry<'a>(&self, stack: &'a Stack) -> Option<&'a Json> {
        stack
            .resource(&self.task_definition_id)?
            .property("ContainerDefinitions")?
            .get(self.index)
    }

    /// Add an environment variable. Names must be unique per container.
    pub fn add_environment(&self, stack: &mut Stack, name: &str, value: Value) -> Result<()> {
        if name.is_empty() {
            return Err(Error::invalid_props(&self.name, "environment variable name is empty"));
        }
        if self.environment_names(stack).iter().any(|n| n == name) {
            return Err(Error::invalid_props(
                &self.name,
                format!("environment variable '{}' is already set", name),
            ));
        }

        let entry = self.entry_mut(stack)?;
        let environment = entry
            .entry("Environment")
            .or_insert_with(|| Json::Array(Vec::new()));
        if let Json::Array(items) = environment {
            items.push(json!({ "Name": name, "Value": value.to_json() }));
        }
        debug!(container = %self.name, variable = %name, "added environment variable");
        Ok(())
    }

    /// Environment variable names, in insertion order.
    pub fn environment_names(&self, stack: &Stack) -> Vec<String> {
        self.entry(stack)
            .and_then(|e| e.get("Environment"))
            .and_then(Json::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|i| i.get("Name").and_then(Json::as_str))
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Expose more ports.
    pub fn add_port_mappings(&self, stack: &mut Stack, mappings: &[PortMapping]) -> Result<()> {
        let entry = self.entry_mut(stack)?;
        let ports = entry
            .entry("PortMappings")
            .or_insert_with(|| Json::Array(Vec::new()));
        if let Json::Array(items) = ports {
            for mapping in mappings {
                items.push(mapping.to_json());
            }
        }
        Ok(())
    }

    /// First mapped container port.
    pub fn container_port(&self, stack: &Stack) -> Option<u16> {
        self.entry(stack)?
            .get("PortMappings")?
            .get(0)?
            .get("ContainerPort")?
            .as_u64()
            .and_then(|p| u16::try_from(p).ok())
    }
}

/// A task definition for the Fargate launch type.
#[derive(Debug, Clone)]
pub struct FargateTaskDefinition {
    path: Vec<String>,
    logical_id: String,
    task_role: Role,
    execution_role: Role,
    containers: Vec<ContainerDefinition>,
}

impl_construct!(FargateTaskDefinition);

impl FargateTaskDefinition {
    /// Declare a task definition.
    pub fn new(stack: &mut Stack, id: &str, props: FargateTaskDefinitionProps) -> Result<Self> {
        if !is_valid_fargate_size(props.cpu, props.memory_limit_mib) {
            return Err(Error::invalid_props(
                id,
                format!(
                    "{} CPU units with {} MiB is not a valid Fargate size",
                    props.cpu, props.memory_limit_mib
                ),
            ));
        }

        let path = vec![id.to_string()];
        let task_role = match props.task_role {
            Some(role) => role,
            None => Role::within(stack, &path, "TaskRole", RoleProps::assumed_by(ECS_TASKS_PRINCIPAL))?,
        };
        let execution_role = match props.execution_role {
            Some(role) => role,
            None => Role::within(
                stack,
                &path,
                "ExecutionRole",
                RoleProps::assumed_by(ECS_TASKS_PRINCIPAL),
            )?,
        };

        let family = make_unique_id(&[stack.name(), id])?;
        let resource = Resource::new("AWS::ECS::TaskDefinition").with_properties(json!({
            "ContainerDefinitions": [],
            "Cpu": props.cpu.to_string(),
            "ExecutionRoleArn": execution_role.arn().to_json(),
            "Family": family,
            "Memory": props.memory_limit_mib.to_string(),
            "NetworkMode": "awsvpc",
            "RequiresCompatibilities": ["FARGATE"],
            "TaskRoleArn": task_role.arn().to_json()
        }));
        let logical_id = stack.add_resource(&[id, "Resource"], resource)?;

        Ok(Self {
            path,
            logical_id,
            task_role,
            execution_role,
            containers: Vec::new(),
        })
    }

    /// Role the containers run as
    pub fn task_role(&self) -> &Role {
        &self.task_role
    }

    /// Role ECS uses on the task's behalf
    pub fn execution_role(&self) -> &Role {
        &self.execution_role
    }

    /// `Ref` (the task definition ARN)
    pub fn arn(&self) -> Value {
        Value::reference(&self.logical_id)
    }

    /// First essential container.
    pub fn default_container(&self) -> Option<&ContainerDefinition> {
        self.containers.first()
    }

    /// Add a container.
    ///
    /// Asset images grant pull access to the execution role; the `awslogs`
    /// driver creates a log group and grants the execution role write
    /// access to it.
    pub fn add_container(
        &mut self,
        stack: &mut Stack,
        id: &str,
        options: ContainerDefinitionOptions,
    ) -> Result<ContainerDefinition> {
        if self.containers.iter().any(|c| c.name == id) {
            return Err(Error::invalid_props(
                &self.logical_id,
                format!("container '{}' already exists", id),
            ));
        }
        let container_path = child_path(&self.path, &[id]);

        if let ContainerImage::Asset(asset) = &options.image {
            asset.grant_pull(stack, &self.execution_role)?;
        }

        let mut entry = json!({
            "Essential": options.essential,
            "Image": options.image.image_name().to_json(),
            "Name": id
        });

        if let Some(LogDriver::AwsLogs(log_props)) = &options.logging {
            let group = LogGroup::within(
                stack,
                &container_path,
                "LogGroup",
                LogGroupProps {
                    retention: log_props.log_retention,
                    ..Default::default()
                },
            )?;
            group.grant_write(stack, &self.execution_role)?;
            entry["LogConfiguration"] = json!({
                "LogDriver": "awslogs",
                "Options": {
                    "awslogs-group": group.reference().to_json(),
                    "awslogs-stream-prefix": log_props.stream_prefix,
                    "awslogs-region": Value::region().to_json()
                }
            });
        }

        let index = stack
            .resource(&self.logical_id)
            .and_then(|r| r.property("ContainerDefinitions"))
            .and_then(Json::as_array)
            .map(Vec::len)
            .unwrap_or(0);
        stack.push_property(&self.logical_id, "ContainerDefinitions", entry)?;

        let container = ContainerDefinition {
            task_definition_id: self.logical_id.clone(),
            name: id.to_string(),
            index,
        };
        if !options.port_mappings.is_empty() {
            container.add_port_mappings(stack, &options.port_mappings)?;
        }
        for (name, value) in options.environment {
            container.add_environment(stack, &name, value)?;
        }

        // only essential containers can be the default
        if options.essential {
            self.containers.push(container.clone());
        }
        Ok(container)
    }
}

// ============================================================================
// Service
// ============================================================================

/// Properties for [`FargateService`].
#[derive(Debug, Clone)]
pub struct FargateServiceProps {
    /// Tasks to keep running
    pub desired_count: u32,
    /// Give tasks public IPs
    pub assign_public_ip: bool,
}

impl Default for FargateServiceProps {
    fn default() -> Self {
        Self {
            desired_count: 1,
            assign_public_ip: false,
        }
    }
}

/// A long-running Fargate service.
#[derive(Debug, Clone)]
pub struct FargateService {
    path: Vec<String>,
    logical_id: String,
    security_group: SecurityGroup,
    default_container: Option<ContainerDefinition>,
}

impl_construct!(FargateService);

impl FargateService {
    /// Run `task_definition` on `cluster` in the VPC's workload subnets.
    pub fn new(
        stack: &mut Stack,
        id: &str,
        cluster: &Cluster,
        task_definition: &FargateTaskDefinition,
        vpc: &Vpc,
        props: FargateServiceProps,
    ) -> Result<Self> {
        if task_definition.default_container().is_none() {
            return Err(Error::invalid_props(
                id,
                "task definition has no essential container",
            ));
        }

        let path = vec![id.to_string()];
        let security_group = SecurityGroup::within(
            stack,
            &path,
            "SecurityGroup",
            vpc,
            SecurityGroupProps::default(),
        )?;
        let subnets: Vec<Json> = vpc
            .default_workload_subnets()
            .into_iter()
            .map(|s| s.subnet_id().to_json())
            .collect();

        let resource = Resource::new("AWS::ECS::Service").with_properties(json!({
            "Cluster": cluster.cluster_name().to_json(),
            "DeploymentConfiguration": {
                "MaximumPercent": 200,
                "MinimumHealthyPercent": 50
            },
            "DesiredCount": props.desired_count,
            "EnableECSManagedTags": false,
            "LaunchType": "FARGATE",
            "NetworkConfiguration": {
                "AwsvpcConfiguration": {
                    "AssignPublicIp": if props.assign_public_ip { "ENABLED" } else { "DISABLED" },
                    "SecurityGroups": [security_group.group_id().to_json()],
                    "Subnets": subnets
                }
            },
            "TaskDefinition": task_definition.arn().to_json()
        }));
        let logical_id = stack.add_resource(&[id, "Service"], resource)?;

        let service = Self {
            path,
            logical_id,
            security_group,
            default_container: task_definition.default_container().cloned(),
        };
        // the task role's policy must exist before tasks start
        stack.add_dependency(&service, task_definition.task_role());
        Ok(service)
    }

    /// Security group of the service's tasks
    pub fn security_group(&self) -> &SecurityGroup {
        &self.security_group
    }

    /// `Fn::GetAtt Name`
    pub fn service_name(&self) -> Value {
        Value::get_att(&self.logical_id, "Name")
    }
}

impl ApplicationLoadBalancerTarget for FargateService {
    fn target_type(&self) -> TargetType {
        TargetType::Ip
    }

    fn attach_to_target_group(
        &self,
        stack: &mut Stack,
        target_group: &ApplicationTargetGroup,
    ) -> Result<()> {
        let container = self.default_container.as_ref().ok_or_else(|| {
            Error::invalid_props(self.logical_id(), "service has no default container")
        })?;
        let port = container.container_port(stack).ok_or_else(|| {
            Error::invalid_props(
                self.logical_id(),
                format!("container '{}' has no port mapping", container.name()),
            )
        })?;

        stack.push_property(
            &self.logical_id,
            "LoadBalancers",
            json!({
                "ContainerName": container.name(),
                "ContainerPort": port,
                "TargetGroupArn": target_group.arn().to_json()
            }),
        )
    }

    fn security_group(&self) -> Option<&SecurityGroup> {
        Some(&self.security_group)
    }
}
