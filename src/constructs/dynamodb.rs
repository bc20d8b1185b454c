//! DynamoDB tables.

use serde_json::{json, Value as Json};

use super::iam::{self, GrantKind, PolicyStatement, Role};
use super::{impl_construct, RemovalPolicy};
use crate::error::{Error, Result};
use crate::stack::Stack;
use crate::template::{Resource, Value};

const DEFAULT_CAPACITY: u32 = 5;

const READ_DATA_ACTIONS: &[&str] = &[
    "dynamodb:BatchGetItem",
    "dynamodb:GetRecords",
    "dynamodb:GetShardIterator",
    "dynamodb:Query",
    "dynamodb:GetItem",
    "dynamodb:Scan",
    "dynamodb:ConditionCheckItem",
];

const WRITE_DATA_ACTIONS: &[&str] = &[
    "dynamodb:BatchWriteItem",
    "dynamodb:PutItem",
    "dynamodb:UpdateItem",
    "dynamodb:DeleteItem",
];

/// Scalar type of a key attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeType {
    /// `S`
    String,
    /// `N`
    Number,
    /// `B`
    Binary,
}

impl AttributeType {
    fn as_str(self) -> &'static str {
        match self {
            AttributeType::String => "S",
            AttributeType::Number => "N",
            AttributeType::Binary => "B",
        }
    }
}

/// A key attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Attribute name
    pub name: String,
    /// Attribute type
    pub attribute_type: AttributeType,
}

impl Attribute {
    /// Create a key attribute.
    pub fn new(name: &str, attribute_type: AttributeType) -> Self {
        Self {
            name: name.to_string(),
            attribute_type,
        }
    }
}

/// How read and write capacity is paid for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BillingMode {
    /// On demand
    #[default]
    PayPerRequest,
    /// Fixed capacity units
    Provisioned,
}

/// Properties for [`Table`].
#[derive(Debug, Clone)]
pub struct TableProps {
    /// Partition key
    pub partition_key: Attribute,
    /// Optional sort key
    pub sort_key: Option<Attribute>,
    /// Billing mode
    pub billing_mode: BillingMode,
    /// Read capacity units (provisioned only)
    pub read_capacity: Option<u32>,
    /// Write capacity units (provisioned only)
    pub write_capacity: Option<u32>,
    /// Removal policy
    pub removal_policy: RemovalPolicy,
}

impl TableProps {
    /// On-demand table keyed by `partition_key`.
    pub fn new(partition_key: Attribute) -> Self {
        Self {
            partition_key,
            sort_key: None,
            billing_mode: BillingMode::default(),
            read_capacity: None,
            write_capacity: None,
            removal_policy: RemovalPolicy::default(),
        }
    }
}

/// A DynamoDB table.
#[derive(Debug, Clone)]
pub struct Table {
    path: Vec<String>,
    logical_id: String,
}

impl_construct!(Table);

impl Table {
    /// Declare a table.
    pub fn new(stack: &mut Stack, id: &str, props: TableProps) -> Result<Self> {
        if props.partition_key.name.is_empty() {
            return Err(Error::invalid_props(id, "partition key name is empty"));
        }

        let mut key_schema = vec![json!({
            "AttributeName": props.partition_key.name,
            "KeyType": "HASH"
        })];
        let mut definitions = vec![attribute_definition(&props.partition_key)];
        if let Some(sort_key) = &props.sort_key {
            if sort_key.name == props.partition_key.name {
                return Err(Error::invalid_props(
                    id,
                    "sort key must differ from the partition key",
                ));
            }
            key_schema.push(json!({ "AttributeName": sort_key.name, "KeyType": "RANGE" }));
            definitions.push(attribute_definition(sort_key));
        }

        let mut resource = Resource::new("AWS::DynamoDB::Table")
            .with_properties(json!({
                "AttributeDefinitions": definitions,
                "KeySchema": key_schema
            }))
            .with_removal_policy(props.removal_policy.deletion_policy());

        match props.billing_mode {
            BillingMode::PayPerRequest => {
                if props.read_capacity.is_some() || props.write_capacity.is_some() {
                    return Err(Error::invalid_props(
                        id,
                        "capacity cannot be set for on-demand billing",
                    ));
                }
                resource = resource.with_property("BillingMode", json!("PAY_PER_REQUEST"));
            }
            BillingMode::Provisioned => {
                let read = props.read_capacity.unwrap_or(DEFAULT_CAPACITY);
                let write = props.write_capacity.unwrap_or(DEFAULT_CAPACITY);
                if read == 0 || write == 0 {
                    return Err(Error::invalid_props(id, "capacity units must be positive"));
                }
                resource = resource.with_property(
                    "ProvisionedThroughput",
                    json!({ "ReadCapacityUnits": read, "WriteCapacityUnits": write }),
                );
            }
        }

        let logical_id = stack.add_resource(&[id, "Resource"], resource)?;
        Ok(Self {
            path: vec![id.to_string()],
            logical_id,
        })
    }

    /// `Ref` (the generated table name)
    pub fn table_name(&self) -> Value {
        Value::reference(&self.logical_id)
    }

    /// `Fn::GetAtt Arn`
    pub fn table_arn(&self) -> Value {
        Value::get_att(&self.logical_id, "Arn")
    }

    /// Allow `grantee` to read and write items.
    pub fn grant_read_write_data(&self, stack: &mut Stack, grantee: &Role) -> Result<bool> {
        let actions: Vec<&str> = READ_DATA_ACTIONS
            .iter()
            .chain(WRITE_DATA_ACTIONS)
            .chain(&["dynamodb:DescribeTable"])
            .copied()
            .collect();
        iam::grant(
            stack,
            grantee,
            GrantKind::ReadWriteData,
            &self.logical_id,
            vec![PolicyStatement::allow(&actions, vec![self.table_arn()])],
        )
    }
}

fn attribute_definition(attribute: &Attribute) -> Json {
    json!({
        "AttributeName": attribute.name,
        "AttributeType": attribute.attribute_type.as_str()
    })
}
