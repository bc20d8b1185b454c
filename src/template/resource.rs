//! A single CloudFormation resource.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

use super::intrinsic::{collect_references, Reference};

/// What the deployment engine does with a resource when it leaves the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeletionPolicy {
    /// Delete the physical resource
    Delete,
    /// Keep the physical resource
    Retain,
    /// Snapshot, then delete
    Snapshot,
}

/// A resource entry under the template's `Resources` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Resource {
    /// CloudFormation type, e.g. `AWS::DynamoDB::Table`
    #[serde(rename = "Type")]
    pub resource_type: String,

    /// Resource properties
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub properties: Map<String, Json>,

    /// Explicit ordering dependencies
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    /// Deletion policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<DeletionPolicy>,

    /// Replacement policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_replace_policy: Option<DeletionPolicy>,

    /// Free-form metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Json>,
}

impl Resource {
    /// Create a resource of the given type with no properties.
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            properties: Map::new(),
            depends_on: Vec::new(),
            deletion_policy: None,
            update_replace_policy: None,
            metadata: None,
        }
    }

    /// Replace the properties from a JSON object.
    ///
    /// Non-object values are ignored; every construct builds its properties
    /// with `json!({...})`.
    pub fn with_properties(mut self, properties: Json) -> Self {
        if let Json::Object(map) = properties {
            self.properties = map;
        }
        self
    }

    /// Set one property.
    pub fn with_property(mut self, key: impl Into<String>, value: Json) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    /// Set both deletion and replacement policy.
    pub fn with_removal_policy(mut self, policy: DeletionPolicy) -> Self {
        self.deletion_policy = Some(policy);
        self.update_replace_policy = Some(policy);
        self
    }

    /// Add an explicit dependency (deduplicated).
    pub fn with_dependency(mut self, logical_id: impl Into<String>) -> Self {
        self.add_dependency(logical_id);
        self
    }

    /// Add an explicit dependency in place (deduplicated).
    pub fn add_dependency(&mut self, logical_id: impl Into<String>) {
        let id = logical_id.into();
        if !self.depends_on.contains(&id) {
            self.depends_on.push(id);
        }
    }

    /// Get a property.
    pub fn property(&self, key: &str) -> Option<&Json> {
        self.properties.get(key)
    }

    /// Append to an array property, creating it if missing.
    pub fn push_property(&mut self, key: &str, value: Json) {
        match self.properties.get_mut(key) {
            Some(Json::Array(items)) => items.push(value),
            _ => {
                self.properties
                    .insert(key.to_string(), Json::Array(vec![value]));
            }
        }
    }

    /// Every logical id referenced from the properties.
    pub fn references(&self) -> Vec<Reference> {
        let mut refs = Vec::new();
        for value in self.properties.values() {
            refs.extend(collect_references(value));
        }
        refs
    }

    /// Returns true if the resource is of the given CloudFormation type.
    pub fn is_type(&self, resource_type: &str) -> bool {
        self.resource_type == resource_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resource_serialization() {
        let resource = Resource::new("AWS::DynamoDB::Table")
            .with_properties(json!({"TableName": "users"}))
            .with_removal_policy(DeletionPolicy::Delete);
        let v = serde_json::to_value(&resource).unwrap();
        assert_eq!(
            v,
            json!({
                "Type": "AWS::DynamoDB::Table",
                "Properties": {"TableName": "users"},
                "DeletionPolicy": "Delete",
                "UpdateReplacePolicy": "Delete"
            })
        );
    }

    #[test]
    fn test_dependencies_are_deduplicated() {
        let mut resource = Resource::new("AWS::Cognito::UserPoolClient").with_dependency("Google");
        resource.add_dependency("Google");
        assert_eq!(resource.depends_on, vec!["Google".to_string()]);
    }

    #[test]
    fn test_push_property_creates_array() {
        let mut resource = Resource::new("AWS::IAM::Role");
        resource.push_property("ManagedPolicyArns", json!("arn:a"));
        resource.push_property("ManagedPolicyArns", json!("arn:b"));
        assert_eq!(
            resource.property("ManagedPolicyArns"),
            Some(&json!(["arn:a", "arn:b"]))
        );
    }

    #[test]
    fn test_empty_fields_are_skipped() {
        let v = serde_json::to_value(Resource::new("AWS::ECS::Cluster")).unwrap();
        assert_eq!(v, json!({"Type": "AWS::ECS::Cluster"}));
    }
}
