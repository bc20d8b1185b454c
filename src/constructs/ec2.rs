//! VPC networking: subnets, routing, NAT, gateway endpoints and security
//! groups.
//!
//! A [`Vpc`] expands into the same resource set the CDK produces for an
//! equivalent `ec2.Vpc`: one subnet, route table and association per
//! (subnet group, availability zone), an internet gateway for public
//! subnets and NAT gateways in the first public subnets.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use indexmap::IndexMap;
use serde_json::{json, Value as Json};
use tracing::debug;

use super::{child_path, impl_construct};
use crate::error::{Error, Result};
use crate::stack::Stack;
use crate::template::{Resource, Value};

/// Smallest subnet AWS allows.
const MIN_SUBNET_PREFIX: u8 = 28;
const ANYWHERE_IPV4: &str = "0.0.0.0/0";

// ============================================================================
// CIDR blocks
// ============================================================================

/// An IPv4 network in CIDR notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Cidr {
    network: Ipv4Addr,
    prefix: u8,
}

impl Ipv4Cidr {
    /// Create a block; host bits in `address` must be zero.
    pub fn new(address: Ipv4Addr, prefix: u8) -> Result<Self> {
        if prefix > 32 {
            return Err(Error::invalid_props(
                "Vpc",
                format!("prefix length /{} is out of range", prefix),
            ));
        }
        let bits = u32::from(address);
        if bits & !Self::mask(prefix) != 0 {
            return Err(Error::invalid_props(
                "Vpc",
                format!("{}/{} has host bits set", address, prefix),
            ));
        }
        Ok(Self {
            network: address,
            prefix,
        })
    }

    fn mask(prefix: u8) -> u32 {
        if prefix == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(prefix))
        }
    }

    /// Network address
    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    /// Prefix length
    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Number of addresses in the block.
    pub fn size(&self) -> u64 {
        1u64 << (32 - u32::from(self.prefix))
    }

    /// Returns true if `other` lies entirely inside this block.
    pub fn contains(&self, other: &Ipv4Cidr) -> bool {
        other.prefix >= self.prefix
            && u32::from(other.network) & Self::mask(self.prefix) == u32::from(self.network)
    }

    /// Split into `count` equal blocks, rounding up to a power of two.
    ///
    /// Returns exactly `count` blocks, in address order.
    pub fn split(&self, count: usize) -> Result<Vec<Ipv4Cidr>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let extra_bits = usize::BITS - (count - 1).leading_zeros();
        let prefix = u32::from(self.prefix) + extra_bits;
        if prefix > u32::from(MIN_SUBNET_PREFIX) {
            return Err(Error::invalid_props(
                "Vpc",
                format!("{} is too small to hold {} subnets", self, count),
            ));
        }

        let step = 1u64 << (32 - prefix);
        let base = u64::from(u32::from(self.network));
        (0..count as u64)
            .map(|i| {
                let addr = u32::try_from(base + i * step)
                    .map_err(|_| Error::Internal(format!("address overflow splitting {}", self)))?;
                Ipv4Cidr::new(Ipv4Addr::from(addr), prefix as u8)
            })
            .collect()
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

impl FromStr for Ipv4Cidr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::invalid_props("Vpc", format!("'{}' is not an IPv4 CIDR block", s));
        let (addr, prefix) = s.split_once('/').ok_or_else(invalid)?;
        let address = addr.parse::<Ipv4Addr>().map_err(|_| invalid())?;
        let prefix = prefix.parse::<u8>().map_err(|_| invalid())?;
        Ipv4Cidr::new(address, prefix)
    }
}

// ============================================================================
// VPC
// ============================================================================

/// Routing behavior of a subnet group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubnetType {
    /// Routes to an internet gateway
    Public,
    /// Outbound-only internet access through NAT
    PrivateWithEgress,
    /// No internet route at all
    PrivateIsolated,
}

impl SubnetType {
    fn tag(self) -> &'static str {
        match self {
            SubnetType::Public => "Public",
            SubnetType::PrivateWithEgress => "Private",
            SubnetType::PrivateIsolated => "Isolated",
        }
    }
}

/// One subnet group, replicated in every availability zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetConfiguration {
    /// Group name, used in construct ids and tags
    pub name: String,
    /// Routing behavior
    pub subnet_type: SubnetType,
}

impl SubnetConfiguration {
    /// Create a subnet group.
    pub fn new(name: &str, subnet_type: SubnetType) -> Self {
        Self {
            name: name.to_string(),
            subnet_type,
        }
    }
}

/// AWS services reachable through a gateway endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayVpcEndpointAwsService {
    /// Amazon S3
    S3,
    /// Amazon DynamoDB
    DynamoDb,
}

impl GatewayVpcEndpointAwsService {
    /// Short service name used in the endpoint's service name.
    pub fn short_name(self) -> &'static str {
        match self {
            GatewayVpcEndpointAwsService::S3 => "s3",
            GatewayVpcEndpointAwsService::DynamoDb => "dynamodb",
        }
    }

    /// `com.amazonaws.<region>.<service>`
    pub fn service_name(self) -> Value {
        Value::join(
            "",
            vec![
                Value::from("com.amazonaws."),
                Value::region(),
                Value::from(format!(".{}", self.short_name())),
            ],
        )
    }
}

/// Properties for [`Vpc`].
#[derive(Debug, Clone)]
pub struct VpcProps {
    /// Address space of the VPC
    pub cidr: String,
    /// Number of availability zones to spread over
    pub max_azs: usize,
    /// NAT gateways; `None` puts one in each availability zone
    pub nat_gateways: Option<usize>,
    /// Subnet groups, in allocation order
    pub subnet_configuration: Vec<SubnetConfiguration>,
    /// Gateway endpoints by construct id
    pub gateway_endpoints: IndexMap<String, GatewayVpcEndpointAwsService>,
}

impl Default for VpcProps {
    fn default() -> Self {
        Self {
            cidr: "10.0.0.0/16".to_string(),
            max_azs: 3,
            nat_gateways: None,
            subnet_configuration: vec![
                SubnetConfiguration::new("Public", SubnetType::Public),
                SubnetConfiguration::new("Private", SubnetType::PrivateWithEgress),
            ],
            gateway_endpoints: IndexMap::new(),
        }
    }
}

/// A subnet inside a [`Vpc`].
#[derive(Debug, Clone)]
pub struct Subnet {
    path: Vec<String>,
    logical_id: String,
    /// Subnet group name
    pub group: String,
    /// Routing behavior
    pub subnet_type: SubnetType,
    /// Address block
    pub cidr: Ipv4Cidr,
    /// Availability zone index
    pub az_index: usize,
    /// Logical id of the route table
    pub route_table_id: String,
    /// Logical id of the `0.0.0.0/0` route, if the subnet has one
    pub default_route_id: Option<String>,
}

impl_construct!(Subnet);

impl Subnet {
    /// `Ref` (the subnet id)
    pub fn subnet_id(&self) -> Value {
        Value::reference(&self.logical_id)
    }

    /// `Ref` to the route table
    pub fn route_table(&self) -> Value {
        Value::reference(&self.route_table_id)
    }
}

/// A gateway endpoint attached to a VPC's route tables.
#[derive(Debug, Clone)]
pub struct GatewayEndpoint {
    path: Vec<String>,
    logical_id: String,
    /// Service the endpoint reaches
    pub service: GatewayVpcEndpointAwsService,
}

impl_construct!(GatewayEndpoint);

/// A virtual private cloud.
#[derive(Debug, Clone)]
pub struct Vpc {
    path: Vec<String>,
    logical_id: String,
    cidr: Ipv4Cidr,
    az_count: usize,
    subnets: Vec<Subnet>,
    nat_gateway_ids: Vec<String>,
    endpoints: Vec<GatewayEndpoint>,
}

impl_construct!(Vpc);

impl Vpc {
    /// Declare a VPC with its subnets, routing and endpoints.
    pub fn new(stack: &mut Stack, id: &str, props: VpcProps) -> Result<Self> {
        let cidr: Ipv4Cidr = props.cidr.parse()?;
        validate_props(id, &props)?;

        let path = vec![id.to_string()];
        let stack_path = format!("{}/{}", stack.name(), id);
        let az_count = props.max_azs;
        let nat_count = props.nat_gateways.unwrap_or(az_count);

        let vpc = Resource::new("AWS::EC2::VPC").with_properties(json!({
            "CidrBlock": cidr.to_string(),
            "EnableDnsHostnames": true,
            "EnableDnsSupport": true,
            "InstanceTenancy": "default",
            "Tags": [name_tag(&stack_path)]
        }));
        let logical_id = stack.add_resource(&[id, "Resource"], vpc)?;
        let vpc_ref = Value::reference(&logical_id).to_json();

        let has_public = props
            .subnet_configuration
            .iter()
            .any(|c| c.subnet_type == SubnetType::Public);
        let gateway_attachment = if has_public {
            let igw = stack.add_resource(
                &[id, "IGW"],
                Resource::new("AWS::EC2::InternetGateway")
                    .with_property("Tags", json!([name_tag(&stack_path)])),
            )?;
            let attachment = stack.add_resource(
                &[id, "VPCGW"],
                Resource::new("AWS::EC2::VPCGatewayAttachment").with_properties(json!({
                    "InternetGatewayId": { "Ref": igw },
                    "VpcId": vpc_ref
                })),
            )?;
            Some((igw, attachment))
        } else {
            None
        };

        let blocks = cidr.split(props.subnet_configuration.len() * az_count)?;
        let mut blocks = blocks.into_iter();
        let mut subnets = Vec::new();

        for config in &props.subnet_configuration {
            for az in 0..az_count {
                let block = blocks.next().ok_or_else(|| {
                    Error::Internal("ran out of address blocks while allocating subnets".into())
                })?;
                let subnet_id = format!("{}Subnet{}", config.name, az + 1);
                let subnet_path = child_path(&path, &[&subnet_id]);
                let tag_path = format!("{}/{}", stack_path, subnet_id);

                let subnet = Resource::new("AWS::EC2::Subnet").with_properties(json!({
                    "AvailabilityZone": Value::availability_zone(az).to_json(),
                    "CidrBlock": block.to_string(),
                    "MapPublicIpOnLaunch": config.subnet_type == SubnetType::Public,
                    "Tags": [
                        { "Key": "aws-cdk:subnet-name", "Value": config.name },
                        { "Key": "aws-cdk:subnet-type", "Value": config.subnet_type.tag() },
                        name_tag(&tag_path)
                    ],
                    "VpcId": vpc_ref
                }));
                let subnet_logical_id =
                    stack.add_resource(&child_path(&subnet_path, &["Subnet"]), subnet)?;

                let route_table_id = stack.add_resource(
                    &child_path(&subnet_path, &["RouteTable"]),
                    Resource::new("AWS::EC2::RouteTable").with_properties(json!({
                        "Tags": [name_tag(&tag_path)],
                        "VpcId": vpc_ref
                    })),
                )?;
                stack.add_resource(
                    &child_path(&subnet_path, &["RouteTableAssociation"]),
                    Resource::new("AWS::EC2::SubnetRouteTableAssociation").with_properties(
                        json!({
                            "RouteTableId": { "Ref": route_table_id },
                            "SubnetId": { "Ref": subnet_logical_id }
                        }),
                    ),
                )?;

                let default_route_id = match (&config.subnet_type, &gateway_attachment) {
                    (SubnetType::Public, Some((igw, attachment))) => Some(stack.add_resource(
                        &child_path(&subnet_path, &["DefaultRoute"]),
                        Resource::new("AWS::EC2::Route")
                            .with_properties(json!({
                                "DestinationCidrBlock": ANYWHERE_IPV4,
                                "GatewayId": { "Ref": igw },
                                "RouteTableId": { "Ref": route_table_id }
                            }))
                            .with_dependency(attachment.clone()),
                    )?),
                    _ => None,
                };

                subnets.push(Subnet {
                    path: subnet_path,
                    logical_id: subnet_logical_id,
                    group: config.name.clone(),
                    subnet_type: config.subnet_type,
                    cidr: block,
                    az_index: az,
                    route_table_id,
                    default_route_id,
                });
            }
        }

        // NAT gateways go in the first public subnets
        let mut nat_gateway_ids = Vec::new();
        let public: Vec<Subnet> = subnets
            .iter()
            .filter(|s| s.subnet_type == SubnetType::Public)
            .take(nat_count)
            .cloned()
            .collect();
        for subnet in &public {
            let eip = stack.add_resource(
                &child_path(&subnet.path, &["EIP"]),
                Resource::new("AWS::EC2::EIP").with_properties(json!({
                    "Domain": "vpc",
                    "Tags": [name_tag(&format!("{}/{}", stack_path, subnet.path[1..].join("/")))]
                })),
            )?;
            let mut nat = Resource::new("AWS::EC2::NatGateway").with_properties(json!({
                "AllocationId": Value::get_att(&eip, "AllocationId").to_json(),
                "SubnetId": subnet.subnet_id().to_json(),
                "Tags": [name_tag(&format!("{}/{}", stack_path, subnet.path[1..].join("/")))]
            }));
            if let Some(route) = &subnet.default_route_id {
                nat.add_dependency(route.clone());
            }
            let association = stack.logical_id_for(&child_path(&subnet.path, &["RouteTableAssociation"]))?;
            nat.add_dependency(association);
            nat_gateway_ids.push(
                stack.add_resource(&child_path(&subnet.path, &["NATGateway"]), nat)?,
            );
        }

        // Private subnets route through the NAT gateway in their AZ, or the
        // last one when there are fewer gateways than zones
        for subnet in subnets
            .iter_mut()
            .filter(|s| s.subnet_type == SubnetType::PrivateWithEgress)
        {
            let nat = nat_gateway_ids
                .get(subnet.az_index)
                .or_else(|| nat_gateway_ids.last())
                .ok_or_else(|| {
                    Error::invalid_props(
                        id,
                        "private subnets with egress need at least one NAT gateway",
                    )
                })?;
            let route = stack.add_resource(
                &child_path(&subnet.path, &["DefaultRoute"]),
                Resource::new("AWS::EC2::Route").with_properties(json!({
                    "DestinationCidrBlock": ANYWHERE_IPV4,
                    "NatGatewayId": { "Ref": nat },
                    "RouteTableId": { "Ref": subnet.route_table_id }
                })),
            )?;
            subnet.default_route_id = Some(route);
        }

        let mut vpc = Self {
            path,
            logical_id,
            cidr,
            az_count,
            subnets,
            nat_gateway_ids,
            endpoints: Vec::new(),
        };

        for (endpoint_id, service) in &props.gateway_endpoints {
            vpc.add_gateway_endpoint(stack, endpoint_id, *service)?;
        }

        debug!(
            vpc = %vpc.logical_id,
            subnets = vpc.subnets.len(),
            nat_gateways = vpc.nat_gateway_ids.len(),
            "declared vpc"
        );

        Ok(vpc)
    }

    /// Attach a gateway endpoint to the private route tables.
    pub fn add_gateway_endpoint(
        &mut self,
        stack: &mut Stack,
        id: &str,
        service: GatewayVpcEndpointAwsService,
    ) -> Result<&GatewayEndpoint> {
        let mut route_tables: Vec<Json> = self
            .subnets
            .iter()
            .filter(|s| s.subnet_type != SubnetType::Public)
            .map(|s| s.route_table().to_json())
            .collect();
        if route_tables.is_empty() {
            route_tables = self.subnets.iter().map(|s| s.route_table().to_json()).collect();
        }

        let path = child_path(&self.path, &[id]);
        let logical_id = stack.add_resource(
            &child_path(&path, &["Resource"]),
            Resource::new("AWS::EC2::VPCEndpoint").with_properties(json!({
                "RouteTableIds": route_tables,
                "ServiceName": service.service_name().to_json(),
                "VpcEndpointType": "Gateway",
                "VpcId": self.vpc_id().to_json()
            })),
        )?;

        self.endpoints.push(GatewayEndpoint {
            path,
            logical_id,
            service,
        });
        let last = self.endpoints.len() - 1;
        Ok(&self.endpoints[last])
    }

    /// `Ref` (the VPC id)
    pub fn vpc_id(&self) -> Value {
        Value::reference(&self.logical_id)
    }

    /// Address space
    pub fn cidr(&self) -> Ipv4Cidr {
        self.cidr
    }

    /// Availability zones in use, as deploy-time values.
    pub fn availability_zones(&self) -> Vec<Value> {
        (0..self.az_count).map(Value::availability_zone).collect()
    }

    /// All subnets, in allocation order.
    pub fn subnets(&self) -> &[Subnet] {
        &self.subnets
    }

    /// Subnets of one type.
    pub fn select_subnets(&self, subnet_type: SubnetType) -> Vec<&Subnet> {
        self.subnets
            .iter()
            .filter(|s| s.subnet_type == subnet_type)
            .collect()
    }

    /// `Ref`s to the subnets of one type.
    pub fn subnet_ids(&self, subnet_type: SubnetType) -> Vec<Value> {
        self.select_subnets(subnet_type)
            .into_iter()
            .map(Subnet::subnet_id)
            .collect()
    }

    /// Subnets for workloads: private with egress if any, else isolated,
    /// else public.
    pub fn default_workload_subnets(&self) -> Vec<&Subnet> {
        [
            SubnetType::PrivateWithEgress,
            SubnetType::PrivateIsolated,
            SubnetType::Public,
        ]
        .into_iter()
        .map(|t| self.select_subnets(t))
        .find(|s| !s.is_empty())
        .unwrap_or_default()
    }

    /// Logical ids of the NAT gateways
    pub fn nat_gateway_ids(&self) -> &[String] {
        &self.nat_gateway_ids
    }

    /// Gateway endpoints
    pub fn gateway_endpoints(&self) -> &[GatewayEndpoint] {
        &self.endpoints
    }

    /// Resources that must exist before anything in a public subnet can
    /// reach the internet.
    pub fn internet_connectivity(&self) -> Vec<String> {
        self.select_subnets(SubnetType::Public)
            .into_iter()
            .filter_map(|s| s.default_route_id.clone())
            .collect()
    }
}

fn validate_props(id: &str, props: &VpcProps) -> Result<()> {
    if props.max_azs == 0 {
        return Err(Error::invalid_props(id, "max_azs must be at least 1"));
    }
    if props.subnet_configuration.is_empty() {
        return Err(Error::invalid_props(id, "at least one subnet group is required"));
    }

    let mut names = Vec::new();
    for config in &props.subnet_configuration {
        if config.name.is_empty() || names.contains(&config.name.as_str()) {
            return Err(Error::invalid_props(
                id,
                format!("subnet group name '{}' is empty or repeated", config.name),
            ));
        }
        names.push(config.name.as_str());
    }

    let has = |t: SubnetType| props.subnet_configuration.iter().any(|c| c.subnet_type == t);
    let nat = props.nat_gateways.unwrap_or(props.max_azs);
    if nat > props.max_azs {
        return Err(Error::invalid_props(
            id,
            format!(
                "{} NAT gateways requested but only {} availability zones",
                nat, props.max_azs
            ),
        ));
    }
    if has(SubnetType::PrivateWithEgress) {
        if nat == 0 {
            return Err(Error::invalid_props(
                id,
                "private subnets with egress need at least one NAT gateway",
            ));
        }
        if !has(SubnetType::Public) {
            return Err(Error::invalid_props(
                id,
                "NAT gateways need a public subnet group",
            ));
        }
    }
    Ok(())
}

fn name_tag(value: &str) -> Json {
    json!({ "Key": "Name", "Value": value })
}

// ============================================================================
// Security groups
// ============================================================================

/// Properties for [`SecurityGroup`].
#[derive(Debug, Clone)]
pub struct SecurityGroupProps {
    /// Description; defaults to the construct path
    pub description: Option<String>,
    /// Allow all outbound traffic
    pub allow_all_outbound: bool,
}

impl Default for SecurityGroupProps {
    fn default() -> Self {
        Self {
            description: None,
            allow_all_outbound: true,
        }
    }
}

/// A security group.
#[derive(Debug, Clone)]
pub struct SecurityGroup {
    path: Vec<String>,
    logical_id: String,
    allow_all_outbound: bool,
}

impl_construct!(SecurityGroup);

impl SecurityGroup {
    /// Declare a security group nested under `scope`.
    pub fn within(
        stack: &mut Stack,
        scope: &[String],
        id: &str,
        vpc: &Vpc,
        props: SecurityGroupProps,
    ) -> Result<Self> {
        let path = child_path(scope, &[id]);
        let description = props
            .description
            .unwrap_or_else(|| format!("{}/{}", stack.name(), path.join("/")));

        let egress = if props.allow_all_outbound {
            json!([{
                "CidrIp": ANYWHERE_IPV4,
                "Description": "Allow all outbound traffic by default",
                "IpProtocol": "-1"
            }])
        } else {
            json!([{
                "CidrIp": "255.255.255.255/32",
                "Description": "Disallow all traffic",
                "FromPort": 252,
                "IpProtocol": "icmp",
                "ToPort": 86
            }])
        };

        let logical_id = stack.add_resource(
            &child_path(&path, &["Resource"]),
            Resource::new("AWS::EC2::SecurityGroup").with_properties(json!({
                "GroupDescription": description,
                "SecurityGroupEgress": egress,
                "VpcId": vpc.vpc_id().to_json()
            })),
        )?;

        Ok(Self {
            path,
            logical_id,
            allow_all_outbound: props.allow_all_outbound,
        })
    }

    /// `Fn::GetAtt GroupId`
    pub fn group_id(&self) -> Value {
        Value::get_att(&self.logical_id, "GroupId")
    }

    /// Allow inbound TCP on `port` from a CIDR block.
    pub fn add_ingress_cidr(
        &self,
        stack: &mut Stack,
        cidr: &str,
        port: u16,
        description: &str,
    ) -> Result<()> {
        stack.push_property(
            &self.logical_id,
            "SecurityGroupIngress",
            json!({
                "CidrIp": cidr,
                "Description": description,
                "FromPort": port,
                "IpProtocol": "tcp",
                "ToPort": port
            }),
        )
    }

    /// Allow TCP on `port` from `peer` to this group.
    ///
    /// Adds an ingress rule here and, when `peer` restricts outbound
    /// traffic, the matching egress rule on `peer`.
    pub fn allow_from(
        &self,
        stack: &mut Stack,
        peer: &SecurityGroup,
        port: u16,
        description: &str,
    ) -> Result<()> {
        let ingress_path = child_path(
            &self.path,
            &[&format!("from {}:{}", peer.logical_id, port)],
        );
        stack.add_resource(
            &ingress_path,
            Resource::new("AWS::EC2::SecurityGroupIngress").with_properties(json!({
                "Description": description,
                "FromPort": port,
                "GroupId": self.group_id().to_json(),
                "IpProtocol": "tcp",
                "SourceSecurityGroupId": peer.group_id().to_json(),
                "ToPort": port
            })),
        )?;

        if !peer.allow_all_outbound {
            let egress_path = child_path(
                &peer.path,
                &[&format!("to {}:{}", self.logical_id, port)],
            );
            stack.add_resource(
                &egress_path,
                Resource::new("AWS::EC2::SecurityGroupEgress").with_properties(json!({
                    "Description": description,
                    "DestinationSecurityGroupId": self.group_id().to_json(),
                    "FromPort": port,
                    "GroupId": peer.group_id().to_json(),
                    "IpProtocol": "tcp",
                    "ToPort": port
                })),
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::{Construct, Environment};
    use proptest::prelude::*;

    fn stack() -> Stack {
        Stack::new("Test", Environment::new("123456789012", "us-east-1").unwrap()).unwrap()
    }

    fn zkcir_props() -> VpcProps {
        let mut endpoints = IndexMap::new();
        endpoints.insert("S3Endpoint".to_string(), GatewayVpcEndpointAwsService::S3);
        endpoints.insert(
            "DynamoDBEndpoint".to_string(),
            GatewayVpcEndpointAwsService::DynamoDb,
        );
        VpcProps {
            max_azs: 2,
            nat_gateways: Some(1),
            subnet_configuration: vec![
                SubnetConfiguration::new("public", SubnetType::Public),
                SubnetConfiguration::new("private", SubnetType::PrivateWithEgress),
            ],
            gateway_endpoints: endpoints,
            ..Default::default()
        }
    }

    #[test]
    fn test_cidr_parse_and_display() {
        let cidr: Ipv4Cidr = "10.0.0.0/16".parse().unwrap();
        assert_eq!(cidr.to_string(), "10.0.0.0/16");
        assert_eq!(cidr.size(), 65536);
        assert!("10.0.0.1/16".parse::<Ipv4Cidr>().is_err());
        assert!("10.0.0.0/33".parse::<Ipv4Cidr>().is_err());
        assert!("10.0.0.0".parse::<Ipv4Cidr>().is_err());
    }

    #[test]
    fn test_cidr_split_into_quarters() {
        let cidr: Ipv4Cidr = "10.0.0.0/16".parse().unwrap();
        let blocks: Vec<String> = cidr.split(4).unwrap().iter().map(|b| b.to_string()).collect();
        assert_eq!(
            blocks,
            vec!["10.0.0.0/18", "10.0.64.0/18", "10.0.128.0/18", "10.0.192.0/18"]
        );
    }

    #[test]
    fn test_cidr_too_small() {
        let cidr: Ipv4Cidr = "10.0.0.0/27".parse().unwrap();
        assert!(cidr.split(4).is_err());
    }

    proptest! {
        #[test]
        fn prop_split_blocks_are_disjoint_and_contained(
            prefix in 8u8..=24,
            count in 1usize..=16,
        ) {
            let cidr = Ipv4Cidr::new(Ipv4Addr::new(10, 0, 0, 0), prefix).unwrap();
            let blocks = cidr.split(count).unwrap();
            prop_assert_eq!(blocks.len(), count);
            for pair in blocks.windows(2) {
                prop_assert_eq!(pair[0].prefix(), pair[1].prefix());
                prop_assert!(u32::from(pair[0].network()) + pair[0].size() as u32
                    <= u32::from(pair[1].network()));
            }
            for block in &blocks {
                prop_assert!(cidr.contains(block));
            }
        }
    }

    #[test]
    fn test_vpc_topology() {
        let mut stack = stack();
        let vpc = Vpc::new(&mut stack, "Vpc", zkcir_props()).unwrap();

        assert_eq!(vpc.logical_id(), "Vpc8378EB38");
        assert_eq!(vpc.availability_zones().len(), 2);
        assert_eq!(vpc.select_subnets(SubnetType::Public).len(), 2);
        assert_eq!(vpc.select_subnets(SubnetType::PrivateWithEgress).len(), 2);
        assert_eq!(vpc.nat_gateway_ids().len(), 1);
        assert_eq!(vpc.gateway_endpoints().len(), 2);
        assert_eq!(vpc.internet_connectivity().len(), 2);

        let public = vpc.select_subnets(SubnetType::Public)[0];
        assert_eq!(public.logical_id(), "VpcpublicSubnet1Subnet2BB74ED7");
        let subnet = stack.resource(public.logical_id()).unwrap();
        assert_eq!(subnet.property("CidrBlock"), Some(&json!("10.0.0.0/18")));
        assert_eq!(subnet.property("MapPublicIpOnLaunch"), Some(&json!(true)));

        // both private subnets route through the single NAT gateway
        for private in vpc.select_subnets(SubnetType::PrivateWithEgress) {
            let route_id = private.default_route_id.as_ref().unwrap();
            let route = stack.resource(route_id).unwrap();
            assert_eq!(
                route.property("NatGatewayId"),
                Some(&json!({"Ref": vpc.nat_gateway_ids()[0]}))
            );
        }
    }

    #[test]
    fn test_gateway_endpoints_use_private_route_tables() {
        let mut stack = stack();
        let vpc = Vpc::new(&mut stack, "Vpc", zkcir_props()).unwrap();
        let endpoint = &vpc.gateway_endpoints()[1];
        let resource = stack.resource(endpoint.logical_id()).unwrap();

        assert_eq!(resource.property("VpcEndpointType"), Some(&json!("Gateway")));
        assert_eq!(
            resource.property("ServiceName").unwrap()["Fn::Join"][1][2],
            json!(".dynamodb")
        );
        let private_tables: Vec<Json> = vpc
            .select_subnets(SubnetType::PrivateWithEgress)
            .iter()
            .map(|s| s.route_table().to_json())
            .collect();
        assert_eq!(resource.property("RouteTableIds"), Some(&json!(private_tables)));
    }

    #[test]
    fn test_invalid_vpc_props() {
        let mut stack = stack();
        let zero = VpcProps {
            max_azs: 0,
            ..zkcir_props()
        };
        assert!(Vpc::new(&mut stack, "A", zero).is_err());

        let too_many_nat = VpcProps {
            nat_gateways: Some(3),
            ..zkcir_props()
        };
        assert!(Vpc::new(&mut stack, "B", too_many_nat).is_err());

        let no_nat = VpcProps {
            nat_gateways: Some(0),
            ..zkcir_props()
        };
        assert!(Vpc::new(&mut stack, "C", no_nat).is_err());
    }

    #[test]
    fn test_security_group_peering() {
        let mut stack = stack();
        let vpc = Vpc::new(&mut stack, "Vpc", zkcir_props()).unwrap();
        let lb_sg = SecurityGroup::within(
            &mut stack,
            &["ALB".to_string()],
            "SecurityGroup",
            &vpc,
            SecurityGroupProps {
                allow_all_outbound: false,
                ..Default::default()
            },
        )
        .unwrap();
        let svc_sg = SecurityGroup::within(
            &mut stack,
            &["Service".to_string()],
            "SecurityGroup",
            &vpc,
            SecurityGroupProps::default(),
        )
        .unwrap();

        svc_sg
            .allow_from(&mut stack, &lb_sg, 3000, "Load balancer to target")
            .unwrap();
        lb_sg
            .add_ingress_cidr(&mut stack, "0.0.0.0/0", 443, "Allow from anyone on port 443")
            .unwrap();

        let template = stack.synth().unwrap();
        assert_eq!(template.count_of_type("AWS::EC2::SecurityGroupIngress"), 1);
        assert_eq!(template.count_of_type("AWS::EC2::SecurityGroupEgress"), 1);
        let lb = template.resource(lb_sg.logical_id()).unwrap();
        assert_eq!(lb.property("SecurityGroupIngress").unwrap()[0]["FromPort"], json!(443));
    }
}
