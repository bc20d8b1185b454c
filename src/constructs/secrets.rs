//! Secrets Manager references.
//!
//! Secrets are never created by this crate and their values never appear in
//! a template. A [`Secret`] is a pointer to an existing secret, resolved by
//! CloudFormation through a dynamic reference at deploy time.

use crate::error::{Error, Result};
use crate::template::Value;

/// An existing secret, looked up by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Secret {
    name: String,
}

impl Secret {
    /// Reference a secret by its friendly name.
    pub fn from_secret_name_v2(name: &str) -> Result<Self> {
        let valid = !name.is_empty()
            && name.len() <= 512
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || "/_+=.@-".contains(c));
        if !valid {
            return Err(Error::invalid_props(
                "Secret",
                format!("'{}' is not a valid secret name", name),
            ));
        }
        Ok(Self {
            name: name.to_string(),
        })
    }

    /// Secret name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Partial ARN of the secret (without the random suffix).
    pub fn arn(&self) -> Value {
        Value::join(
            "",
            vec![
                Value::from("arn:"),
                Value::partition(),
                Value::from(":secretsmanager:"),
                Value::region(),
                Value::from(":"),
                Value::account_id(),
                Value::from(format!(":secret:{}", self.name)),
            ],
        )
    }

    /// Dynamic reference to the whole secret string.
    pub fn secret_value(&self) -> Value {
        Value::join(
            "",
            vec![
                Value::from("{{resolve:secretsmanager:"),
                self.arn(),
                Value::from(":SecretString:::}}"),
            ],
        )
    }
}
