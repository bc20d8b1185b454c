//! The zkcir service stack.
//!
//! One stack holds everything the hosted service needs:
//!
//! - **Network**: a two-AZ VPC with public and private subnets, a single NAT
//!   gateway and gateway endpoints for S3 and DynamoDB.
//! - **Identity**: a Cognito user pool federated with Google, a hosted
//!   sign-in domain and an app client.
//! - **Compute**: the web service on Fargate behind an HTTPS load balancer,
//!   and the circuit compile function.
//! - **Data**: the users table and the circuits bucket.
//!
//! The web service finds everything else through six environment
//! variables on its container, see [`ENVIRONMENT_VARIABLES`].

use tracing::info;

use crate::assets::{DockerImageAsset, DockerImageAssetProps};
use crate::config::Config;
use crate::constructs::acm::{Certificate, CertificateProps};
use crate::constructs::cognito::{
    AttributeMapping, AutoVerifiedAttrs, GoogleIdentityProvider, GoogleIdentityProviderProps,
    OAuthFlows, OAuthScope, OAuthSettings, ProviderAttribute, UserPool, UserPoolClient,
    UserPoolClientIdentityProvider, UserPoolClientProps, UserPoolDomain, UserPoolProps,
};
use crate::constructs::dynamodb::{Attribute, AttributeType, BillingMode, Table, TableProps};
use crate::constructs::ec2::{
    GatewayVpcEndpointAwsService, SubnetConfiguration, SubnetType, Vpc, VpcProps,
};
use crate::constructs::ecs::{
    AwsLogDriverProps, Cluster, ContainerDefinition, ContainerDefinitionOptions, ContainerImage,
    FargateService, FargateServiceProps, FargateTaskDefinition, FargateTaskDefinitionProps,
    LogDriver, PortMapping,
};
use crate::constructs::elbv2::{
    AddApplicationTargetsProps, ApplicationListener, ApplicationLoadBalancer,
    ApplicationLoadBalancerProps, ApplicationLoadBalancerTarget, ApplicationProtocol,
    ApplicationTargetGroup, BaseApplicationListenerProps,
};
use crate::constructs::iam::{ManagedPolicy, Role, RoleProps};
use crate::constructs::lambda::{Code, Function, FunctionProps};
use crate::constructs::logs::RetentionDays;
use crate::constructs::s3::{Bucket, BucketProps};
use crate::constructs::secrets::Secret;
use crate::constructs::{Duration, RemovalPolicy, Size};
use crate::error::{Error, Result};
use crate::stack::Stack;
use crate::template::Value;

/// Container environment of the web service, in the order it is written.
pub const ENVIRONMENT_VARIABLES: [&str; 6] = [
    "ddb_user_table",
    "circuits_bucket",
    "user_pool_domain",
    "user_pool_client_id",
    "aws_region",
    "compile_lambda_arn",
];

/// Port the web service listens on inside its container.
pub const CONTAINER_PORT: u16 = 3000;

/// Public HTTPS port of the load balancer.
pub const HTTPS_PORT: u16 = 443;

/// The declared zkcir stack, with handles to its main constructs.
#[derive(Debug)]
pub struct ZkcirStack {
    stack: Stack,
    certificate: Certificate,
    user_pool: UserPool,
    google_provider: GoogleIdentityProvider,
    user_pool_domain: UserPoolDomain,
    user_pool_client: UserPoolClient,
    vpc: Vpc,
    cluster: Cluster,
    execution_role: Role,
    task_definition: FargateTaskDefinition,
    container: ContainerDefinition,
    service: FargateService,
    load_balancer: ApplicationLoadBalancer,
    listener: ApplicationListener,
    target_group: ApplicationTargetGroup,
    compile_lambda: Function,
    users_table: Table,
    circuits_bucket: Bucket,
}

impl ZkcirStack {
    /// Declare the whole stack from `config`.
    pub fn build(config: &Config) -> Result<Self> {
        config.validate()?;
        let mut stack = Stack::new(&config.stack.name, config.environment()?)?;
        if let Some(description) = &config.stack.description {
            stack.set_description(description);
        }

        let certificate = Certificate::new(
            &mut stack,
            "Certificate",
            CertificateProps {
                domain_name: config.certificate.domain_name.clone(),
                validation: config.certificate.validation,
            },
        )?;

        // Identity
        let user_pool = UserPool::new(
            &mut stack,
            "ZkcirUserPool",
            UserPoolProps {
                self_sign_up_enabled: true,
                auto_verify: AutoVerifiedAttrs {
                    email: true,
                    phone: false,
                },
                removal_policy: RemovalPolicy::Destroy,
            },
        )?;

        let google_provider = GoogleIdentityProvider::new(
            &mut stack,
            "ZkcirGoogleProvider",
            &user_pool,
            GoogleIdentityProviderProps {
                client_id: config.identity.google_client_id.clone(),
                client_secret: Secret::from_secret_name_v2(
                    &config.identity.google_client_secret_name,
                )?,
                attribute_mapping: AttributeMapping {
                    email: Some(ProviderAttribute::GoogleEmail),
                    fullname: Some(ProviderAttribute::GoogleName),
                    given_name: Some(ProviderAttribute::GoogleGivenName),
                    profile_picture: Some(ProviderAttribute::GooglePicture),
                    ..Default::default()
                },
                scopes: Vec::new(),
            },
        )?;

        let user_pool_domain = UserPoolDomain::new(
            &mut stack,
            "ZkcirUserPoolDomain",
            &user_pool,
            &config.identity.user_pool_domain,
        )?;

        // Network
        let vpc = Vpc::new(
            &mut stack,
            "Vpc",
            VpcProps {
                max_azs: 2,
                nat_gateways: Some(1),
                subnet_configuration: vec![
                    SubnetConfiguration::new("public", SubnetType::Public),
                    SubnetConfiguration::new("private", SubnetType::PrivateWithEgress),
                ],
                gateway_endpoints: [
                    ("S3Endpoint".to_string(), GatewayVpcEndpointAwsService::S3),
                    ("DynamoDBEndpoint".to_string(), GatewayVpcEndpointAwsService::DynamoDb),
                ]
                .into_iter()
                .collect(),
                ..VpcProps::default()
            },
        )?;

        // Web service
        let image = DockerImageAsset::new(
            &mut stack,
            &["AxumImage"],
            build_props(config, &config.build.service_target),
        )?;
        let cluster = Cluster::new(&mut stack, "Cluster")?;

        let execution_role = Role::new(
            &mut stack,
            "ExecutionRole",
            RoleProps::assumed_by("ecs-tasks.amazonaws.com"),
        )?;
        execution_role.add_managed_policy(
            &mut stack,
            &ManagedPolicy::aws_managed("service-role/AmazonECSTaskExecutionRolePolicy"),
        )?;
        image.grant_pull(&mut stack, &execution_role)?;

        let mut task_definition = FargateTaskDefinition::new(
            &mut stack,
            "TaskDef",
            FargateTaskDefinitionProps {
                cpu: 512,
                memory_limit_mib: 2048,
                execution_role: Some(execution_role.clone()),
                task_role: None,
            },
        )?;

        let mut options = ContainerDefinitionOptions::new(ContainerImage::from_docker_image_asset(&image));
        options.logging = Some(LogDriver::aws_logs(AwsLogDriverProps {
            stream_prefix: "Service".to_string(),
            log_retention: RetentionDays::OneWeek,
        }));
        let container = task_definition.add_container(&mut stack, "AxumContainer", options)?;

        // Compile function
        let compile_lambda = Function::new(
            &mut stack,
            "CompileLambda",
            FunctionProps {
                code: Code::from_asset_image(build_props(config, &config.build.lambda_target)),
                memory_size: 1024,
                ephemeral_storage_size: Some(Size::gibibytes(2)),
                timeout: Duration::seconds(30),
                log_retention: Some(RetentionDays::OneWeek),
            },
        )?;
        compile_lambda.grant_invoke(&mut stack, task_definition.task_role())?;

        container.add_port_mappings(&mut stack, &[PortMapping::tcp(CONTAINER_PORT)])?;

        let service = FargateService::new(
            &mut stack,
            "Service",
            &cluster,
            &task_definition,
            &vpc,
            FargateServiceProps::default(),
        )?;

        // Load balancer
        let load_balancer = ApplicationLoadBalancer::new(
            &mut stack,
            "ALB",
            &vpc,
            ApplicationLoadBalancerProps {
                internet_facing: true,
            },
        )?;
        let listener = load_balancer.add_listener(
            &mut stack,
            "HttpsListener",
            BaseApplicationListenerProps {
                certificates: vec![certificate.arn()],
                ..BaseApplicationListenerProps::port(HTTPS_PORT)
            },
        )?;
        let target_group = listener.add_targets(
            &mut stack,
            "ECSHttps",
            AddApplicationTargetsProps {
                port: CONTAINER_PORT,
                protocol: ApplicationProtocol::Http,
                targets: vec![&service as &dyn ApplicationLoadBalancerTarget],
            },
        )?;

        // Sign-in client
        let user_pool_client = UserPoolClient::new(
            &mut stack,
            "ZkcirUserPoolClient",
            &user_pool,
            UserPoolClientProps {
                supported_identity_providers: vec![UserPoolClientIdentityProvider::Google],
                oauth: OAuthSettings {
                    flows: OAuthFlows::default(),
                    callback_urls: config.callback_urls(),
                    scopes: vec![
                        OAuthScope::Email,
                        OAuthScope::OpenId,
                        OAuthScope::Profile,
                        OAuthScope::CognitoAdmin,
                    ],
                },
                access_token_validity: Some(Duration::minutes(
                    config.identity.access_token_validity_minutes,
                )),
            },
        )?;
        // Cognito rejects a client naming a provider that does not exist yet
        stack.add_dependency(&user_pool_client, &google_provider);

        // Data
        let users_table = Table::new(
            &mut stack,
            "Users",
            TableProps {
                billing_mode: BillingMode::Provisioned,
                read_capacity: Some(25),
                write_capacity: Some(25),
                removal_policy: RemovalPolicy::Destroy,
                ..TableProps::new(Attribute::new("user_id", AttributeType::String))
            },
        )?;
        users_table.grant_read_write_data(&mut stack, task_definition.task_role())?;

        let circuits_bucket = Bucket::new(
            &mut stack,
            "Circuits",
            BucketProps {
                auto_delete_objects: true,
                removal_policy: RemovalPolicy::Destroy,
                ..Default::default()
            },
        )?;
        circuits_bucket.grant_read_write(&mut stack, task_definition.task_role())?;

        // Wiring
        let default_container = task_definition
            .default_container()
            .cloned()
            .ok_or_else(|| Error::Internal("task definition has no default container".into()))?;
        let values = [
            users_table.table_name(),
            circuits_bucket.bucket_name(),
            Value::from(config.identity.user_pool_domain.as_str()),
            user_pool_client.user_pool_client_id(),
            Value::from(config.stack.region.as_str()),
            compile_lambda.function_arn(),
        ];
        for (name, value) in ENVIRONMENT_VARIABLES.into_iter().zip(values) {
            default_container.add_environment(&mut stack, name, value)?;
        }

        stack.add_output(
            "LoadBalancerDnsName",
            load_balancer.dns_name(),
            Some("Public DNS name of the load balancer"),
        )?;

        info!(
            stack = %stack.name(),
            resources = stack.resource_count(),
            assets = stack.assets().len(),
            "declared zkcir stack"
        );

        Ok(Self {
            stack,
            certificate,
            user_pool,
            google_provider,
            user_pool_domain,
            user_pool_client,
            vpc,
            cluster,
            execution_role,
            task_definition,
            container,
            service,
            load_balancer,
            listener,
            target_group,
            compile_lambda,
            users_table,
            circuits_bucket,
        })
    }

    /// The underlying stack
    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    /// Give up the construct handles and keep the stack.
    pub fn into_stack(self) -> Stack {
        self.stack
    }

    /// Certificate
    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// User pool
    pub fn user_pool(&self) -> &UserPool {
        &self.user_pool
    }

    /// Google identity provider
    pub fn google_provider(&self) -> &GoogleIdentityProvider {
        &self.google_provider
    }

    /// Hosted sign-in domain
    pub fn user_pool_domain(&self) -> &UserPoolDomain {
        &self.user_pool_domain
    }

    /// Sign-in app client
    pub fn user_pool_client(&self) -> &UserPoolClient {
        &self.user_pool_client
    }

    /// VPC
    pub fn vpc(&self) -> &Vpc {
        &self.vpc
    }

    /// ECS cluster
    pub fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    /// Role ECS uses to pull the image and ship logs
    pub fn execution_role(&self) -> &Role {
        &self.execution_role
    }

    /// Role the web service runs as
    pub fn task_role(&self) -> &Role {
        self.task_definition.task_role()
    }

    /// Task definition
    pub fn task_definition(&self) -> &FargateTaskDefinition {
        &self.task_definition
    }

    /// Web service container
    pub fn container(&self) -> &ContainerDefinition {
        &self.container
    }

    /// Fargate service
    pub fn service(&self) -> &FargateService {
        &self.service
    }

    /// Load balancer
    pub fn load_balancer(&self) -> &ApplicationLoadBalancer {
        &self.load_balancer
    }

    /// HTTPS listener
    pub fn listener(&self) -> &ApplicationListener {
        &self.listener
    }

    /// Target group behind the listener
    pub fn target_group(&self) -> &ApplicationTargetGroup {
        &self.target_group
    }

    /// Compile function
    pub fn compile_lambda(&self) -> &Function {
        &self.compile_lambda
    }

    /// Users table
    pub fn users_table(&self) -> &Table {
        &self.users_table
    }

    /// Circuits bucket
    pub fn circuits_bucket(&self) -> &Bucket {
        &self.circuits_bucket
    }
}

fn build_props(config: &Config, target: &str) -> DockerImageAssetProps {
    DockerImageAssetProps {
        directory: config.build.context.clone(),
        exclude: config.build.exclude.clone(),
        target: Some(target.to_string()),
        file: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::Construct;
    use std::fs;
    use tempfile::TempDir;

    fn config(context: &TempDir) -> Config {
        fs::write(
            context.path().join("Dockerfile"),
            "FROM scratch AS core-ecs\nFROM scratch AS compile-lambda\n",
        )
        .unwrap();
        let mut config = Config::default();
        config.build.context = context.path().to_path_buf();
        config
    }

    #[test]
    fn test_build_declares_expected_ids() {
        let context = TempDir::new().unwrap();
        let zkcir = ZkcirStack::build(&config(&context)).unwrap();
        assert_eq!(zkcir.stack().name(), "ZkcirCdkStack");
        assert_eq!(zkcir.users_table().logical_id(), "Users0A0EEA89");
        assert_eq!(zkcir.vpc().logical_id(), "Vpc8378EB38");
    }

    #[test]
    fn test_environment_written_in_order() {
        let context = TempDir::new().unwrap();
        let zkcir = ZkcirStack::build(&config(&context)).unwrap();
        assert_eq!(
            zkcir.container().environment_names(zkcir.stack()),
            ENVIRONMENT_VARIABLES.to_vec()
        );
    }

    #[test]
    fn test_two_image_assets() {
        let context = TempDir::new().unwrap();
        let zkcir = ZkcirStack::build(&config(&context)).unwrap();
        let targets: Vec<_> = zkcir
            .stack()
            .assets()
            .iter()
            .filter_map(|a| a.target.as_deref())
            .collect();
        assert_eq!(targets, vec!["core-ecs", "compile-lambda"]);
    }

    #[test]
    fn test_missing_dockerfile_fails() {
        let context = TempDir::new().unwrap();
        let mut config = Config::default();
        config.build.context = context.path().to_path_buf();
        assert!(ZkcirStack::build(&config).is_err());
    }
}
