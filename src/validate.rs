//! Template checks beyond what synthesis enforces.
//!
//! Synthesis guarantees a well-formed graph: no dangling references, no
//! cycles. The rules here look at what the resources mean and flag
//! templates that would deploy but misbehave, such as a user pool client
//! created before the identity provider it names.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;
use serde_json::Value as Json;

use crate::template::{collect_references, Template};

/// Severity of a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Worth a look
    Warning,
    /// The deployment will fail or misbehave
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// One problem found in a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    /// Rule identifier, e.g. `V001`
    pub rule: &'static str,
    /// Severity
    pub severity: Severity,
    /// Offending resource
    pub logical_id: String,
    /// Human-readable description
    pub message: String,
}

impl Finding {
    fn new(
        rule: &'static str,
        severity: Severity,
        logical_id: &str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            rule,
            severity,
            logical_id: logical_id.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {}: {}",
            self.rule, self.severity, self.logical_id, self.message
        )
    }
}

/// Result of running every rule over a template.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    /// Findings, in rule order
    pub findings: Vec<Finding>,
}

impl ValidationReport {
    /// True if any finding is an error.
    pub fn has_errors(&self) -> bool {
        self.findings.iter().any(|f| f.severity == Severity::Error)
    }

    /// Number of findings at a severity.
    pub fn count(&self, severity: Severity) -> usize {
        self.findings.iter().filter(|f| f.severity == severity).count()
    }

    /// True if nothing was found.
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }
}

/// Run every rule over `template`.
pub fn validate(template: &Template) -> ValidationReport {
    let mut findings = Vec::new();
    check_client_waits_for_providers(template, &mut findings);
    check_listener_default_actions(template, &mut findings);
    check_service_waits_for_task_policies(template, &mut findings);
    check_unique_environment_names(template, &mut findings);
    check_secrets_are_references(template, &mut findings);
    check_open_ingress(template, &mut findings);
    ValidationReport { findings }
}

/// V001: a client naming a federated provider must depend on it.
fn check_client_waits_for_providers(template: &Template, findings: &mut Vec<Finding>) {
    let providers: Vec<(&String, &str)> = template
        .resources_of_type("AWS::Cognito::UserPoolIdentityProvider")
        .filter_map(|(id, r)| r.property("ProviderName")?.as_str().map(|name| (id, name)))
        .collect();

    for (id, client) in template.resources_of_type("AWS::Cognito::UserPoolClient") {
        let supported = client
            .property("SupportedIdentityProviders")
            .and_then(Json::as_array)
            .map(|a| a.iter().filter_map(Json::as_str).collect::<Vec<_>>())
            .unwrap_or_default();

        for (provider_id, name) in &providers {
            if supported.contains(name) && !client.depends_on.contains(provider_id) {
                findings.push(Finding::new(
                    "V001",
                    Severity::Error,
                    id,
                    format!("supports '{}' but does not depend on {}", name, provider_id),
                ));
            }
        }
    }
}

/// V002: listeners must forward somewhere.
fn check_listener_default_actions(template: &Template, findings: &mut Vec<Finding>) {
    for (id, listener) in template.resources_of_type("AWS::ElasticLoadBalancingV2::Listener") {
        let empty = listener
            .property("DefaultActions")
            .and_then(Json::as_array)
            .is_none_or(|a| a.is_empty());
        if empty {
            findings.push(Finding::new("V002", Severity::Error, id, "no default actions"));
        }
    }
}

/// V003: a service must not start before its task role can act.
fn check_service_waits_for_task_policies(template: &Template, findings: &mut Vec<Finding>) {
    for (id, service) in template.resources_of_type("AWS::ECS::Service") {
        let Some(task_definition) = service
            .property("TaskDefinition")
            .and_then(|v| v.get("Ref"))
            .and_then(Json::as_str)
            .and_then(|td| template.resource(td))
        else {
            continue;
        };
        let Some(role) = task_definition
            .property("TaskRoleArn")
            .map(collect_references)
            .and_then(|refs| refs.into_iter().next())
        else {
            continue;
        };

        for (policy_id, policy) in template.resources_of_type("AWS::IAM::Policy") {
            let attached = policy
                .property("Roles")
                .map(collect_references)
                .is_some_and(|refs| refs.iter().any(|r| r.target == role.target));
            if attached && !service.depends_on.contains(policy_id) {
                findings.push(Finding::new(
                    "V003",
                    Severity::Warning,
                    id,
                    format!("may start before task role policy {} exists", policy_id),
                ));
            }
        }
    }
}

/// V004: container environment names are unique.
fn check_unique_environment_names(template: &Template, findings: &mut Vec<Finding>) {
    for (id, task_definition) in template.resources_of_type("AWS::ECS::TaskDefinition") {
        let containers = task_definition
            .property("ContainerDefinitions")
            .and_then(Json::as_array)
            .cloned()
            .unwrap_or_default();
        for container in &containers {
            let mut seen = HashSet::new();
            let names = container["Environment"]
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(|e| e["Name"].as_str());
            for name in names {
                if !seen.insert(name) {
                    findings.push(Finding::new(
                        "V004",
                        Severity::Error,
                        id,
                        format!("environment variable '{}' is set twice", name),
                    ));
                }
            }
        }
    }
}

/// V005: client secrets are resolved at deploy time, never inlined.
fn check_secrets_are_references(template: &Template, findings: &mut Vec<Finding>) {
    for (id, provider) in template.resources_of_type("AWS::Cognito::UserPoolIdentityProvider") {
        let Some(secret) = provider
            .property("ProviderDetails")
            .and_then(|d| d.get("client_secret"))
        else {
            continue;
        };
        if let Some(literal) = secret.as_str() {
            if !literal.starts_with("{{resolve:") {
                findings.push(Finding::new(
                    "V005",
                    Severity::Error,
                    id,
                    "client secret is a literal value",
                ));
            }
        }
    }
}

/// V006: world-open ingress outside the web ports.
fn check_open_ingress(template: &Template, findings: &mut Vec<Finding>) {
    let mut rules: Vec<(&String, Json)> = Vec::new();
    for (id, group) in template.resources_of_type("AWS::EC2::SecurityGroup") {
        for rule in group
            .property("SecurityGroupIngress")
            .and_then(Json::as_array)
            .into_iter()
            .flatten()
        {
            rules.push((id, rule.clone()));
        }
    }
    for (id, ingress) in template.resources_of_type("AWS::EC2::SecurityGroupIngress") {
        rules.push((id, Json::Object(ingress.properties.clone())));
    }

    for (id, rule) in rules {
        if rule["CidrIp"].as_str() != Some("0.0.0.0/0") {
            continue;
        }
        let port = rule["FromPort"].as_u64();
        if !matches!(port, Some(80) | Some(443)) {
            findings.push(Finding::new(
                "V006",
                Severity::Warning,
                id,
                format!("open to the internet on port {}", display_port(port)),
            ));
        }
    }
}

fn display_port(port: Option<u64>) -> String {
    port.map(|p| p.to_string()).unwrap_or_else(|| "any".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::Resource;
    use serde_json::json;

    fn template(resources: Vec<(&str, Resource)>) -> Template {
        let mut template = Template::default();
        for (id, resource) in resources {
            template.resources.insert(id.to_string(), resource);
        }
        template
    }

    fn provider() -> Resource {
        Resource::new("AWS::Cognito::UserPoolIdentityProvider").with_properties(json!({
            "ProviderName": "Google",
            "ProviderDetails": {
                "client_id": "abc",
                "client_secret": "{{resolve:secretsmanager:GoogleClientSecret:SecretString:::}}"
            }
        }))
    }

    fn client() -> Resource {
        Resource::new("AWS::Cognito::UserPoolClient")
            .with_property("SupportedIdentityProviders", json!(["Google"]))
    }

    #[test]
    fn test_client_without_provider_dependency() {
        let report = validate(&template(vec![("Provider", provider()), ("Client", client())]));
        assert!(report.has_errors());
        assert_eq!(report.findings[0].rule, "V001");

        let ordered = client().with_dependency("Provider");
        let report = validate(&template(vec![("Provider", provider()), ("Client", ordered)]));
        assert!(report.is_clean());
    }

    #[test]
    fn test_listener_without_actions() {
        let report = validate(&template(vec![(
            "Listener",
            Resource::new("AWS::ElasticLoadBalancingV2::Listener").with_property("Port", json!(443)),
        )]));
        assert_eq!(report.count(Severity::Error), 1);
    }

    #[test]
    fn test_service_before_task_policy() {
        let report = validate(&template(vec![
            ("TaskRole", Resource::new("AWS::IAM::Role")),
            (
                "TaskRolePolicy",
                Resource::new("AWS::IAM::Policy").with_property("Roles", json!([{"Ref": "TaskRole"}])),
            ),
            (
                "TaskDef",
                Resource::new("AWS::ECS::TaskDefinition")
                    .with_property("TaskRoleArn", json!({"Fn::GetAtt": ["TaskRole", "Arn"]})),
            ),
            (
                "Service",
                Resource::new("AWS::ECS::Service")
                    .with_property("TaskDefinition", json!({"Ref": "TaskDef"})),
            ),
        ]));
        assert_eq!(report.count(Severity::Warning), 1);
        assert!(!report.has_errors());
    }

    #[test]
    fn test_duplicate_environment_name() {
        let report = validate(&template(vec![(
            "TaskDef",
            Resource::new("AWS::ECS::TaskDefinition").with_property(
                "ContainerDefinitions",
                json!([{
                    "Environment": [
                        {"Name": "aws_region", "Value": "us-east-1"},
                        {"Name": "aws_region", "Value": "eu-west-1"}
                    ]
                }]),
            ),
        )]));
        assert_eq!(report.findings.len(), 1);
        assert!(report.findings[0].message.contains("aws_region"));
    }

    #[test]
    fn test_literal_secret() {
        let leaky = Resource::new("AWS::Cognito::UserPoolIdentityProvider").with_properties(json!({
            "ProviderName": "Google",
            "ProviderDetails": {"client_secret": "hunter2"}
        }));
        let report = validate(&template(vec![("Provider", leaky)]));
        assert_eq!(report.findings[0].rule, "V005");
    }

    #[test]
    fn test_open_ingress_on_https_is_fine() {
        let group = Resource::new("AWS::EC2::SecurityGroup").with_property(
            "SecurityGroupIngress",
            json!([
                {"CidrIp": "0.0.0.0/0", "FromPort": 443, "ToPort": 443, "IpProtocol": "tcp"},
                {"CidrIp": "0.0.0.0/0", "FromPort": 22, "ToPort": 22, "IpProtocol": "tcp"}
            ]),
        );
        let report = validate(&template(vec![("Sg", group)]));
        assert_eq!(report.findings.len(), 1);
        assert!(report.findings[0].message.contains("22"));
    }
}
