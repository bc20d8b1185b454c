//! Application load balancers, listeners and target groups.

use serde_json::{json, Value as Json};
use tracing::debug;

use super::ec2::{SecurityGroup, SecurityGroupProps, SubnetType, Vpc};
use super::{child_path, impl_construct};
use crate::error::{Error, Result};
use crate::stack::{Construct, Stack};
use crate::template::{Resource, Value};

/// How targets are registered with a target group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetType {
    /// By IP address (awsvpc tasks)
    Ip,
    /// By instance id
    Instance,
    /// A Lambda function
    Lambda,
}

impl TargetType {
    fn as_str(self) -> &'static str {
        match self {
            TargetType::Ip => "ip",
            TargetType::Instance => "instance",
            TargetType::Lambda => "lambda",
        }
    }
}

/// Application-layer protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationProtocol {
    /// Plain HTTP
    Http,
    /// HTTP over TLS
    Https,
}

impl ApplicationProtocol {
    fn as_str(self) -> &'static str {
        match self {
            ApplicationProtocol::Http => "HTTP",
            ApplicationProtocol::Https => "HTTPS",
        }
    }
}

/// Something a load balancer can send traffic to.
pub trait ApplicationLoadBalancerTarget: Construct {
    /// Registration type the target needs.
    fn target_type(&self) -> TargetType;

    /// Register with `target_group`.
    fn attach_to_target_group(
        &self,
        stack: &mut Stack,
        target_group: &ApplicationTargetGroup,
    ) -> Result<()>;

    /// Security group traffic must be allowed into, if any.
    fn security_group(&self) -> Option<&SecurityGroup>;
}

/// Properties for [`ApplicationLoadBalancer`].
#[derive(Debug, Clone, Default)]
pub struct ApplicationLoadBalancerProps {
    /// Internet-facing (public subnets) or internal (private subnets)
    pub internet_facing: bool,
}

/// An application load balancer.
#[derive(Debug, Clone)]
pub struct ApplicationLoadBalancer {
    path: Vec<String>,
    logical_id: String,
    security_group: SecurityGroup,
    vpc_id: Value,
}

impl_construct!(ApplicationLoadBalancer);

impl ApplicationLoadBalancer {
    /// Declare a load balancer in `vpc`.
    pub fn new(
        stack: &mut Stack,
        id: &str,
        vpc: &Vpc,
        props: ApplicationLoadBalancerProps,
    ) -> Result<Self> {
        let path = vec![id.to_string()];
        let unique = stack.logical_id_for(&[stack.name(), id])?;
        let security_group = SecurityGroup::within(
            stack,
            &path,
            "SecurityGroup",
            vpc,
            SecurityGroupProps {
                description: Some(format!(
                    "Automatically created Security Group for ELB {}",
                    unique
                )),
                allow_all_outbound: false,
            },
        )?;

        let subnet_type = if props.internet_facing {
            SubnetType::Public
        } else {
            SubnetType::PrivateWithEgress
        };
        let subnets: Vec<Json> = vpc
            .subnet_ids(subnet_type)
            .iter()
            .map(Value::to_json)
            .collect();
        if subnets.is_empty() {
            return Err(Error::invalid_props(
                id,
                format!("VPC has no {:?} subnets for the load balancer", subnet_type),
            ));
        }

        let mut resource = Resource::new("AWS::ElasticLoadBalancingV2::LoadBalancer")
            .with_properties(json!({
                "LoadBalancerAttributes": [
                    { "Key": "deletion_protection.enabled", "Value": "false" }
                ],
                "Scheme": if props.internet_facing { "internet-facing" } else { "internal" },
                "SecurityGroups": [security_group.group_id().to_json()],
                "Subnets": subnets,
                "Type": "application"
            }));
        if props.internet_facing {
            // the load balancer is unreachable until public routes exist
            for route in vpc.internet_connectivity() {
                resource.add_dependency(route);
            }
        }
        let logical_id = stack.add_resource(&[id, "Resource"], resource)?;

        Ok(Self {
            path,
            logical_id,
            security_group,
            vpc_id: vpc.vpc_id(),
        })
    }

    /// `Ref` (the load balancer ARN)
    pub fn arn(&self) -> Value {
        Value::reference(&self.logical_id)
    }

    /// `Fn::GetAtt DNSName`
    pub fn dns_name(&self) -> Value {
        Value::get_att(&self.logical_id, "DNSName")
    }

    /// Security group in front of the load balancer
    pub fn security_group(&self) -> &SecurityGroup {
        &self.security_group
    }

    /// Add a listener.
    ///
    /// The protocol defaults to HTTPS when certificates are given and HTTP
    /// otherwise. An open listener accepts traffic from anywhere on its port.
    pub fn add_listener(
        &self,
        stack: &mut Stack,
        id: &str,
        props: BaseApplicationListenerProps,
    ) -> Result<ApplicationListener> {
        let protocol = props.protocol.unwrap_or(if props.certificates.is_empty() {
            ApplicationProtocol::Http
        } else {
            ApplicationProtocol::Https
        });
        if protocol == ApplicationProtocol::Https && props.certificates.is_empty() {
            return Err(Error::invalid_props(
                id,
                "HTTPS listeners need at least one certificate",
            ));
        }
        if props.port == 0 {
            return Err(Error::invalid_props(id, "listener port must be non-zero"));
        }

        let path = child_path(&self.path, &[id]);
        let mut resource = Resource::new("AWS::ElasticLoadBalancingV2::Listener").with_properties(
            json!({
                "DefaultActions": [],
                "LoadBalancerArn": self.arn().to_json(),
                "Port": props.port,
                "Protocol": protocol.as_str()
            }),
        );
        if !props.certificates.is_empty() {
            let certificates: Vec<Json> = props
                .certificates
                .iter()
                .map(|arn| json!({ "CertificateArn": arn.to_json() }))
                .collect();
            resource = resource.with_property("Certificates", json!(certificates));
        }
        let logical_id = stack.add_resource(&child_path(&path, &["Resource"]), resource)?;

        if props.open {
            self.security_group.add_ingress_cidr(
                stack,
                "0.0.0.0/0",
                props.port,
                &format!("Allow from anyone on port {}", props.port),
            )?;
        }

        Ok(ApplicationListener {
            path,
            logical_id,
            load_balancer: self.clone(),
            port: props.port,
        })
    }
}

/// Properties for [`ApplicationLoadBalancer::add_listener`].
#[derive(Debug, Clone)]
pub struct BaseApplicationListenerProps {
    /// Port to listen on
    pub port: u16,
    /// Protocol; inferred from certificates when unset
    pub protocol: Option<ApplicationProtocol>,
    /// Certificate ARNs
    pub certificates: Vec<Value>,
    /// Allow traffic from anywhere
    pub open: bool,
}

impl BaseApplicationListenerProps {
    /// Open listener on `port`.
    pub fn port(port: u16) -> Self {
        Self {
            port,
            protocol: None,
            certificates: Vec::new(),
            open: true,
        }
    }
}

/// A listener on an application load balancer.
#[derive(Debug, Clone)]
pub struct ApplicationListener {
    path: Vec<String>,
    logical_id: String,
    load_balancer: ApplicationLoadBalancer,
    port: u16,
}

impl_construct!(ApplicationListener);

/// Properties for [`ApplicationListener::add_targets`].
pub struct AddApplicationTargetsProps<'a> {
    /// Port the targets listen on
    pub port: u16,
    /// Protocol spoken to the targets
    pub protocol: ApplicationProtocol,
    /// Targets
    pub targets: Vec<&'a dyn ApplicationLoadBalancerTarget>,
}

impl ApplicationListener {
    /// Listener port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// `Ref` (the listener ARN)
    pub fn arn(&self) -> Value {
        Value::reference(&self.logical_id)
    }

    /// Forward all traffic to a new target group containing `targets`.
    ///
    /// Each target is registered with the group, made to wait for this
    /// listener and opened to the load balancer's security group on `port`.
    pub fn add_targets(
        &self,
        stack: &mut Stack,
        id: &str,
        props: AddApplicationTargetsProps<'_>,
    ) -> Result<ApplicationTargetGroup> {
        let target_type = match props.targets.first() {
            Some(first) => first.target_type(),
            None => return Err(Error::invalid_props(id, "at least one target is required")),
        };
        if props.targets.iter().any(|t| t.target_type() != target_type) {
            return Err(Error::invalid_props(id, "targets must share one target type"));
        }

        let has_default = stack
            .resource(&self.logical_id)
            .and_then(|r| r.property("DefaultActions"))
            .and_then(Json::as_array)
            .is_some_and(|actions| !actions.is_empty());
        if has_default {
            return Err(Error::invalid_props(
                &self.logical_id,
                "listener already has a default action",
            ));
        }

        let group_path = child_path(&self.path, &[&format!("{}Group", id)]);
        let logical_id = stack.add_resource(
            &child_path(&group_path, &["Resource"]),
            Resource::new("AWS::ElasticLoadBalancingV2::TargetGroup").with_properties(json!({
                "Port": props.port,
                "Protocol": props.protocol.as_str(),
                "TargetGroupAttributes": [
                    { "Key": "stickiness.enabled", "Value": "false" }
                ],
                "TargetType": target_type.as_str(),
                "VpcId": self.load_balancer.vpc_id.to_json()
            })),
        )?;
        let group = ApplicationTargetGroup {
            path: group_path,
            logical_id,
            port: props.port,
        };

        stack.push_property(
            &self.logical_id,
            "DefaultActions",
            json!({ "TargetGroupArn": group.arn().to_json(), "Type": "forward" }),
        )?;

        for target in &props.targets {
            target.attach_to_target_group(stack, &group)?;
            stack.add_dependency_on_path(target.logical_id(), &self.path);
            if let Some(sg) = target.security_group() {
                sg.allow_from(
                    stack,
                    self.load_balancer.security_group(),
                    props.port,
                    "Load balancer to target",
                )?;
            }
        }

        debug!(
            listener = %self.logical_id,
            target_group = %group.logical_id,
            targets = props.targets.len(),
            "attached targets"
        );
        Ok(group)
    }
}

/// A target group behind a listener.
#[derive(Debug, Clone)]
pub struct ApplicationTargetGroup {
    path: Vec<String>,
    logical_id: String,
    port: u16,
}

impl_construct!(ApplicationTargetGroup);

impl ApplicationTargetGroup {
    /// `Ref` (the target group ARN)
    pub fn arn(&self) -> Value {
        Value::reference(&self.logical_id)
    }

    /// Target port
    pub fn port(&self) -> u16 {
        self.port
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constructs::ec2::VpcProps;
    use crate::constructs::ecs::{
        Cluster, ContainerDefinitionOptions, ContainerImage, FargateService, FargateServiceProps,
        FargateTaskDefinition, FargateTaskDefinitionProps, PortMapping,
    };
    use crate::stack::Environment;

    fn network() -> (Stack, Vpc) {
        let mut stack =
            Stack::new("Test", Environment::new("123456789012", "us-east-1").unwrap()).unwrap();
        let vpc = Vpc::new(
            &mut stack,
            "Vpc",
            VpcProps {
                max_azs: 2,
                nat_gateways: Some(1),
                ..Default::default()
            },
        )
        .unwrap();
        (stack, vpc)
    }

    #[test]
    fn test_https_listener_requires_certificate() {
        let (mut stack, vpc) = network();
        let lb = ApplicationLoadBalancer::new(
            &mut stack,
            "ALB",
            &vpc,
            ApplicationLoadBalancerProps {
                internet_facing: true,
            },
        )
        .unwrap();
        let props = BaseApplicationListenerProps {
            protocol: Some(ApplicationProtocol::Https),
            ..BaseApplicationListenerProps::port(443)
        };
        assert!(lb.add_listener(&mut stack, "Https", props).is_err());
    }

    #[test]
    fn test_listener_forwards_to_service() {
        let (mut stack, vpc) = network();
        let cluster = Cluster::new(&mut stack, "Cluster").unwrap();
        let mut task_def =
            FargateTaskDefinition::new(&mut stack, "TaskDef", FargateTaskDefinitionProps::default())
                .unwrap();
        let mut options = ContainerDefinitionOptions::new(ContainerImage::from_registry("nginx"));
        options.port_mappings.push(PortMapping::tcp(3000));
        task_def.add_container(&mut stack, "Web", options).unwrap();
        let service = FargateService::new(
            &mut stack,
            "Service",
            &cluster,
            &task_def,
            &vpc,
            FargateServiceProps::default(),
        )
        .unwrap();

        let lb = ApplicationLoadBalancer::new(
            &mut stack,
            "ALB",
            &vpc,
            ApplicationLoadBalancerProps {
                internet_facing: true,
            },
        )
        .unwrap();
        let listener = lb
            .add_listener(
                &mut stack,
                "HttpsListener",
                BaseApplicationListenerProps {
                    certificates: vec![Value::from("arn:aws:acm:us-east-1:123456789012:certificate/x")],
                    ..BaseApplicationListenerProps::port(443)
                },
            )
            .unwrap();
        let group = listener
            .add_targets(
                &mut stack,
                "ECSHttps",
                AddApplicationTargetsProps {
                    port: 3000,
                    protocol: ApplicationProtocol::Http,
                    targets: vec![&service as &dyn ApplicationLoadBalancerTarget],
                },
            )
            .unwrap();

        let template = stack.synth().unwrap();
        let listener_res = template.resource(listener.logical_id()).unwrap();
        assert_eq!(listener_res.property("Protocol"), Some(&json!("HTTPS")));
        assert_eq!(
            listener_res.property("DefaultActions").unwrap()[0]["TargetGroupArn"],
            json!({"Ref": group.logical_id()})
        );

        let service_res = template.resource(service.logical_id()).unwrap();
        assert!(service_res.depends_on.contains(&listener.logical_id().to_string()));
        assert_eq!(
            service_res.property("LoadBalancers").unwrap()[0]["ContainerPort"],
            json!(3000)
        );

        let tg = template.resource(group.logical_id()).unwrap();
        assert_eq!(tg.property("TargetType"), Some(&json!("ip")));

        let lb_res = template.resource(lb.logical_id()).unwrap();
        assert_eq!(lb_res.depends_on.len(), 2);

        // second default action is rejected
        assert!(listener
            .add_targets(
                &mut stack,
                "Again",
                AddApplicationTargetsProps {
                    port: 3000,
                    protocol: ApplicationProtocol::Http,
                    targets: vec![&service as &dyn ApplicationLoadBalancerTarget],
                },
            )
            .is_err());
    }
}
