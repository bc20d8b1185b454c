//! ACM certificates.

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::impl_construct;
use crate::error::{Error, Result};
use crate::stack::Stack;
use crate::template::{Resource, Value};

/// How ownership of the domain is proven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertificateValidation {
    /// Approval mail to the domain's registered contacts
    #[default]
    Email,
    /// CNAME record in the domain's zone
    Dns,
}

impl CertificateValidation {
    fn as_str(self) -> &'static str {
        match self {
            CertificateValidation::Email => "EMAIL",
            CertificateValidation::Dns => "DNS",
        }
    }
}

/// Properties for [`Certificate`].
#[derive(Debug, Clone)]
pub struct CertificateProps {
    /// Fully qualified domain name
    pub domain_name: String,
    /// Validation method
    pub validation: CertificateValidation,
}

/// A public TLS certificate.
#[derive(Debug, Clone)]
pub struct Certificate {
    path: Vec<String>,
    logical_id: String,
    domain_name: String,
}

impl_construct!(Certificate);

impl Certificate {
    /// Request a certificate for a domain.
    pub fn new(stack: &mut Stack, id: &str, props: CertificateProps) -> Result<Self> {
        let domain = props.domain_name.trim();
        if domain.is_empty() || !domain.contains('.') || domain.len() > 253 {
            return Err(Error::invalid_props(
                id,
                format!("'{}' is not a fully qualified domain name", props.domain_name),
            ));
        }

        let path = vec![id.to_string()];
        let resource = Resource::new("AWS::CertificateManager::Certificate").with_properties(json!({
            "DomainName": domain,
            "ValidationMethod": props.validation.as_str()
        }));
        let logical_id = stack.add_resource(&[id, "Resource"], resource)?;

        Ok(Self {
            path,
            logical_id,
            domain_name: domain.to_string(),
        })
    }

    /// Certificate ARN (`Ref` on a certificate yields the ARN).
    pub fn arn(&self) -> Value {
        Value::reference(&self.logical_id)
    }

    /// Domain the certificate covers
    pub fn domain_name(&self) -> &str {
        &self.domain_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::{Construct, Environment};

    fn stack() -> Stack {
        Stack::new("Test", Environment::new("123456789012", "us-east-1").unwrap()).unwrap()
    }

    #[test]
    fn test_certificate_defaults_to_email() {
        let mut stack = stack();
        let cert = Certificate::new(
            &mut stack,
            "Certificate",
            CertificateProps {
                domain_name: "zkcir.chrisc.dev".into(),
                validation: CertificateValidation::default(),
            },
        )
        .unwrap();
        let resource = stack.resource(cert.logical_id()).unwrap();
        assert_eq!(resource.property("ValidationMethod"), Some(&json!("EMAIL")));
        assert_eq!(resource.property("DomainName"), Some(&json!("zkcir.chrisc.dev")));
    }

    #[test]
    fn test_rejects_bare_hostname() {
        let mut stack = stack();
        let result = Certificate::new(
            &mut stack,
            "Certificate",
            CertificateProps {
                domain_name: "localhost".into(),
                validation: CertificateValidation::Dns,
            },
        );
        assert!(matches!(result, Err(Error::InvalidProps { .. })));
    }
}
