//! Integration tests for the declared zkcir stack.
//!
//! These cover the properties the deployed system relies on:
//! - Sign-in client ordering after the federated provider
//! - Network shape (AZs, NAT gateways, gateway endpoints)
//! - Grants on the execution and task roles
//! - Container environment
//! - Data resources and the HTTPS listener
//! - Deterministic synthesis

mod common;

use std::collections::BTreeSet;

use common::*;
use pretty_assertions::assert_eq;
use serde_json::{json, Value as Json};

use zkcir_infra::assembly::CloudAssembly;
use zkcir_infra::constructs::iam::GrantKind;
use zkcir_infra::constructs::s3::AUTO_DELETE_OBJECTS_TAG;
use zkcir_infra::prelude::*;
use zkcir_infra::zkcir::{CONTAINER_PORT, ENVIRONMENT_VARIABLES, HTTPS_PORT};

// ============================================================================
// Identity
// ============================================================================

#[test]
fn test_client_depends_on_google_provider() {
    let context = BuildContext::new();
    let zkcir = context.build();
    let template = zkcir.stack().synth().unwrap();

    let client = template
        .resource(zkcir.user_pool_client().logical_id())
        .unwrap();
    assert!(client
        .depends_on
        .contains(&zkcir.google_provider().logical_id().to_string()));

    let order = zkcir.stack().deploy_order().unwrap();
    let position = |id: &str| order.iter().position(|o| o == id).unwrap();
    assert!(
        position(zkcir.google_provider().logical_id())
            < position(zkcir.user_pool_client().logical_id())
    );
}

#[test]
fn test_client_oauth_settings() {
    let context = BuildContext::new();
    let zkcir = context.build();
    let template = zkcir.stack().synth().unwrap();
    let client = template
        .resource(zkcir.user_pool_client().logical_id())
        .unwrap();

    assert_eq!(
        client.property("CallbackURLs"),
        Some(&json!([
            "https://zkcir.chrisc.dev/auth/callback",
            "http://localhost:3000/auth/callback",
            "http://localhost:8000/auth/callback"
        ]))
    );
    assert_eq!(
        client.property("SupportedIdentityProviders"),
        Some(&json!(["Google"]))
    );
}

#[test]
fn test_google_secret_is_dynamic_reference() {
    let template = BuildContext::new().template();
    let (_, provider) = template
        .resources_of_type("AWS::Cognito::UserPoolIdentityProvider")
        .next()
        .unwrap();
    let secret = provider.property("ProviderDetails").unwrap()["client_secret"].to_string();
    assert!(secret.contains("{{resolve:secretsmanager:"));
    assert!(secret.contains("GoogleClientSecret"));
}

// ============================================================================
// Network
// ============================================================================

#[test]
fn test_vpc_uses_two_availability_zones() {
    let template = BuildContext::new().template();
    let zones: BTreeSet<String> = template
        .resources_of_type("AWS::EC2::Subnet")
        .filter_map(|(_, subnet)| subnet.property("AvailabilityZone"))
        .map(Json::to_string)
        .collect();
    assert_eq!(zones.len(), 2);
    assert_eq!(template.count_of_type("AWS::EC2::Subnet"), 4);
}

#[test]
fn test_single_nat_gateway() {
    let template = BuildContext::new().template();
    assert_eq!(template.count_of_type("AWS::EC2::NatGateway"), 1);
    assert_eq!(template.count_of_type("AWS::EC2::InternetGateway"), 1);
}

#[test]
fn test_gateway_endpoints_for_s3_and_dynamodb() {
    let template = BuildContext::new().template();
    let endpoints: Vec<_> = template
        .resources_of_type("AWS::EC2::VPCEndpoint")
        .map(|(_, e)| e)
        .collect();
    assert_eq!(endpoints.len(), 2);

    let services: Vec<String> = endpoints
        .iter()
        .map(|e| {
            assert_eq!(e.property("VpcEndpointType"), Some(&json!("Gateway")));
            e.property("ServiceName").unwrap().to_string()
        })
        .collect();
    assert!(services.iter().any(|s| s.contains(".s3")));
    assert!(services.iter().any(|s| s.contains(".dynamodb")));
}

// ============================================================================
// Roles and grants
// ============================================================================

#[test]
fn test_execution_role_grants() {
    let context = BuildContext::new();
    let zkcir = context.build();
    let stack = zkcir.stack();
    let template = stack.synth().unwrap();

    let role = template
        .resource(zkcir.execution_role().logical_id())
        .unwrap();
    let managed = role.property("ManagedPolicyArns").unwrap().as_array().unwrap();
    assert_eq!(managed.len(), 1);
    assert!(managed[0]
        .to_string()
        .contains("AmazonECSTaskExecutionRolePolicy"));

    let pulls = stack
        .grants_for(zkcir.execution_role().logical_id())
        .filter(|g| g.kind == GrantKind::Pull)
        .count();
    assert_eq!(pulls, 1);
}

#[test]
fn test_task_role_grants() {
    let context = BuildContext::new();
    let zkcir = context.build();
    let stack = zkcir.stack();
    let task_role = zkcir.task_definition().task_role().logical_id();

    let count = |kind: GrantKind| stack.grants_for(task_role).filter(|g| g.kind == kind).count();
    assert_eq!(count(GrantKind::Invoke), 1);
    assert_eq!(count(GrantKind::ReadWriteData), 1);
    assert_eq!(count(GrantKind::ReadWrite), 1);
    assert_eq!(count(GrantKind::Pull), 0);
}

#[test]
fn test_task_role_policy_covers_table_bucket_and_function() {
    let context = BuildContext::new();
    let zkcir = context.build();
    let template = zkcir.stack().synth().unwrap();
    let policy_id = zkcir
        .task_definition()
        .task_role()
        .default_policy_id(zkcir.stack())
        .unwrap();
    let document = template.resource(&policy_id).unwrap().property("PolicyDocument").unwrap();

    let targets = referenced_ids(document);
    assert!(targets.contains(&zkcir.users_table().logical_id().to_string()));
    assert!(targets.contains(&zkcir.circuits_bucket().logical_id().to_string()));
    assert!(targets.contains(&zkcir.compile_lambda().logical_id().to_string()));
}

// ============================================================================
// Container
// ============================================================================

#[test]
fn test_container_environment() {
    let context = BuildContext::new();
    let zkcir = context.build();
    let template = zkcir.stack().synth().unwrap();

    let task_definition = template
        .resource(zkcir.task_definition().logical_id())
        .unwrap();
    let containers = task_definition
        .property("ContainerDefinitions")
        .unwrap()
        .as_array()
        .unwrap();
    assert_eq!(containers.len(), 1);

    let environment = containers[0]["Environment"].as_array().unwrap();
    let names: Vec<&str> = environment
        .iter()
        .map(|e| e["Name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ENVIRONMENT_VARIABLES.to_vec());

    let value_of = |name: &str| {
        environment
            .iter()
            .find(|e| e["Name"] == name)
            .map(|e| e["Value"].clone())
            .unwrap()
    };
    assert_eq!(value_of("aws_region"), json!("us-east-1"));
    assert_eq!(value_of("user_pool_domain"), json!("zkcir"));
    assert_eq!(
        value_of("ddb_user_table"),
        json!({ "Ref": zkcir.users_table().logical_id() })
    );
}

#[test]
fn test_container_port_mapping_and_sizing() {
    let context = BuildContext::new();
    let zkcir = context.build();
    let template = zkcir.stack().synth().unwrap();
    let task_definition = template
        .resource(zkcir.task_definition().logical_id())
        .unwrap();

    assert_eq!(task_definition.property("Cpu"), Some(&json!("512")));
    assert_eq!(task_definition.property("Memory"), Some(&json!("2048")));
    assert_eq!(
        zkcir.container().container_port(zkcir.stack()),
        Some(CONTAINER_PORT)
    );
}

// ============================================================================
// Data and load balancing
// ============================================================================

#[test]
fn test_users_table() {
    let template = BuildContext::new().template();
    let tables: Vec<_> = template.resources_of_type("AWS::DynamoDB::Table").collect();
    assert_eq!(tables.len(), 1);

    let (_, table) = tables[0];
    assert_eq!(
        table.property("KeySchema"),
        Some(&json!([{ "AttributeName": "user_id", "KeyType": "HASH" }]))
    );
    assert_eq!(
        table.property("AttributeDefinitions"),
        Some(&json!([{ "AttributeName": "user_id", "AttributeType": "S" }]))
    );
}

#[test]
fn test_circuits_bucket_auto_deletes() {
    let template = BuildContext::new().template();
    let buckets: Vec<_> = template.resources_of_type("AWS::S3::Bucket").collect();
    assert_eq!(buckets.len(), 1);

    let tags = buckets[0].1.property("Tags").unwrap().to_string();
    assert!(tags.contains(AUTO_DELETE_OBJECTS_TAG));
    assert_eq!(template.count_of_type("Custom::S3AutoDeleteObjects"), 1);
}

#[test]
fn test_https_listener_uses_certificate() {
    let context = BuildContext::new();
    let zkcir = context.build();
    let template = zkcir.stack().synth().unwrap();

    let listeners: Vec<_> = template
        .resources_of_type("AWS::ElasticLoadBalancingV2::Listener")
        .collect();
    assert_eq!(listeners.len(), 1);

    let (_, listener) = listeners[0];
    assert_eq!(listener.property("Port"), Some(&json!(HTTPS_PORT)));
    assert_eq!(listener.property("Protocol"), Some(&json!("HTTPS")));
    assert_eq!(
        listener.property("Certificates"),
        Some(&json!([{ "CertificateArn": { "Ref": zkcir.certificate().logical_id() } }]))
    );

    let (_, target_group) = template
        .resources_of_type("AWS::ElasticLoadBalancingV2::TargetGroup")
        .next()
        .unwrap();
    assert_eq!(target_group.property("Port"), Some(&json!(CONTAINER_PORT)));
}

#[test]
fn test_load_balancer_output() {
    let context = BuildContext::new();
    let zkcir = context.build();
    let template = zkcir.stack().synth().unwrap();
    let output = template.outputs.get("LoadBalancerDnsName").unwrap();
    assert_eq!(
        referenced_ids(&output.value),
        vec![zkcir.load_balancer().logical_id().to_string()]
    );
}

// ============================================================================
// Synthesis
// ============================================================================

#[test]
fn test_synthesized_template_passes_validation() {
    let template = BuildContext::new().template();
    let report = validate(&template);
    assert!(!report.has_errors(), "{:?}", report.findings);
}

#[test]
fn test_synthesis_is_deterministic() {
    let context = BuildContext::new();
    let first = context.template().to_json_pretty().unwrap();
    let second = context.template().to_json_pretty().unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_assembly_is_deterministic() {
    let context = BuildContext::new();
    let out_a = tempfile::tempdir().unwrap();
    let out_b = tempfile::tempdir().unwrap();

    let files_a = CloudAssembly::write(out_a.path(), context.build().stack()).unwrap();
    let files_b = CloudAssembly::write(out_b.path(), context.build().stack()).unwrap();
    assert_eq!(files_a.len(), files_b.len());

    for (a, b) in files_a.iter().zip(&files_b) {
        assert_eq!(a.file_name(), b.file_name());
        assert_eq!(
            std::fs::read_to_string(a).unwrap(),
            std::fs::read_to_string(b).unwrap()
        );
    }
}

#[test]
fn test_context_change_changes_image_hash() {
    let context = BuildContext::new();
    let before: Vec<String> = context
        .build()
        .stack()
        .assets()
        .iter()
        .map(|a| a.hash.clone())
        .collect();

    std::fs::write(context.path().join("core/src/main.rs"), "fn main() { }\n").unwrap();
    let after: Vec<String> = context
        .build()
        .stack()
        .assets()
        .iter()
        .map(|a| a.hash.clone())
        .collect();
    assert_ne!(before, after);
}

#[test]
fn test_excluded_directory_does_not_change_image_hash() {
    let context = BuildContext::new();
    let hash = |c: &BuildContext| c.build().stack().assets()[0].hash.clone();
    let before = hash(&context);

    std::fs::write(context.path().join("cdk/cdk.json"), "{\"app\": \"x\"}\n").unwrap();
    assert_eq!(before, hash(&context));
}

#[test]
fn test_custom_environment() {
    let context = BuildContext::new();
    let mut config = context.config();
    config.stack.account = "123456789012".to_string();
    config.stack.region = "eu-west-1".to_string();

    let zkcir = ZkcirStack::build(&config).unwrap();
    assert_eq!(zkcir.stack().env().descriptor(), "aws://123456789012/eu-west-1");
    assert_eq!(zkcir.users_table().logical_id(), "Users0A0EEA89");
}
