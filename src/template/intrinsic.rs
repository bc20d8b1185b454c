//! CloudFormation values and intrinsic functions.
//!
//! A [`Value`] is anything that can sit in a resource property: a literal or
//! one of the intrinsic functions the deployment engine resolves at deploy
//! time. Generated identifiers (table names, function ARNs, ...) are only
//! ever known as intrinsics, never as literals.

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

/// Pseudo parameter for the deploying account.
pub const AWS_ACCOUNT_ID: &str = "AWS::AccountId";
/// Pseudo parameter for the deploying region.
pub const AWS_REGION: &str = "AWS::Region";
/// Pseudo parameter for the partition (`aws`, `aws-cn`, ...).
pub const AWS_PARTITION: &str = "AWS::Partition";
/// Pseudo parameter for the domain suffix (`amazonaws.com`, ...).
pub const AWS_URL_SUFFIX: &str = "AWS::URLSuffix";
/// Pseudo parameter for the stack name.
pub const AWS_STACK_NAME: &str = "AWS::StackName";

/// A property value in a CloudFormation template.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Literal string
    String(String),
    /// Literal integer
    Number(i64),
    /// Literal boolean
    Bool(bool),
    /// `{"Ref": id}`
    Ref(String),
    /// `{"Fn::GetAtt": [id, attribute]}`
    GetAtt {
        /// Logical id of the resource
        logical_id: String,
        /// Attribute name
        attribute: String,
    },
    /// `{"Fn::Join": [delimiter, [values]]}`
    Join {
        /// Delimiter placed between values
        delimiter: String,
        /// Values to join
        values: Vec<Value>,
    },
    /// `{"Fn::Select": [index, list]}`
    Select {
        /// Zero-based index
        index: usize,
        /// List to pick from
        list: Box<Value>,
    },
    /// `{"Fn::GetAZs": region}`
    GetAzs(String),
    /// `{"Fn::Sub": template}`
    Sub(String),
    /// A list of values
    List(Vec<Value>),
}

impl Value {
    /// `Ref` to a resource or parameter.
    pub fn reference(logical_id: impl Into<String>) -> Self {
        Value::Ref(logical_id.into())
    }

    /// `Fn::GetAtt` on a resource attribute.
    pub fn get_att(logical_id: impl Into<String>, attribute: impl Into<String>) -> Self {
        Value::GetAtt {
            logical_id: logical_id.into(),
            attribute: attribute.into(),
        }
    }

    /// `Fn::Join` with the given delimiter.
    pub fn join(delimiter: impl Into<String>, values: Vec<Value>) -> Self {
        Value::Join {
            delimiter: delimiter.into(),
            values,
        }
    }

    /// `Fn::Sub` over a template string.
    pub fn sub(template: impl Into<String>) -> Self {
        Value::Sub(template.into())
    }

    /// The `index`-th availability zone of the deploying region.
    pub fn availability_zone(index: usize) -> Self {
        Value::Select {
            index,
            list: Box::new(Value::GetAzs(String::new())),
        }
    }

    /// `Ref AWS::AccountId`
    pub fn account_id() -> Self {
        Value::Ref(AWS_ACCOUNT_ID.to_string())
    }

    /// `Ref AWS::Region`
    pub fn region() -> Self {
        Value::Ref(AWS_REGION.to_string())
    }

    /// `Ref AWS::Partition`
    pub fn partition() -> Self {
        Value::Ref(AWS_PARTITION.to_string())
    }

    /// `Ref AWS::URLSuffix`
    pub fn url_suffix() -> Self {
        Value::Ref(AWS_URL_SUFFIX.to_string())
    }

    /// Returns true if this is a literal (no deploy-time resolution needed).
    pub fn is_literal(&self) -> bool {
        match self {
            Value::String(_) | Value::Number(_) | Value::Bool(_) => true,
            Value::List(items) => items.iter().all(Value::is_literal),
            _ => false,
        }
    }

    /// Returns the literal string, if this value is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl Value {
    /// The JSON form of this value, as it appears in a template.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::json;
        match self {
            Value::String(s) => json!(s),
            Value::Number(n) => json!(n),
            Value::Bool(b) => json!(b),
            Value::Ref(id) => json!({ "Ref": id }),
            Value::GetAtt {
                logical_id,
                attribute,
            } => json!({ "Fn::GetAtt": [logical_id, attribute] }),
            Value::Join { delimiter, values } => {
                let values: Vec<_> = values.iter().map(Value::to_json).collect();
                json!({ "Fn::Join": [delimiter, values] })
            }
            Value::Select { index, list } => json!({ "Fn::Select": [index, list.to_json()] }),
            Value::GetAzs(region) => json!({ "Fn::GetAZs": region }),
            Value::Sub(template) => json!({ "Fn::Sub": template }),
            Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        value.to_json()
    }
}

/// Returns true if `name` is a pseudo parameter rather than a logical id.
pub fn is_pseudo_parameter(name: &str) -> bool {
    name.starts_with("AWS::")
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(i64::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

struct Pair<'a, A: Serialize, B: Serialize>(&'a A, &'a B);

impl<A: Serialize, B: Serialize> Serialize for Pair<'_, A, B> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(2))?;
        seq.serialize_element(self.0)?;
        seq.serialize_element(self.1)?;
        seq.end()
    }
}

fn single_key<S: Serializer, V: Serialize>(
    serializer: S,
    key: &str,
    value: &V,
) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(1))?;
    map.serialize_entry(key, value)?;
    map.end()
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::String(s) => serializer.serialize_str(s),
            Value::Number(n) => serializer.serialize_i64(*n),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Ref(id) => single_key(serializer, "Ref", id),
            Value::GetAtt {
                logical_id,
                attribute,
            } => single_key(serializer, "Fn::GetAtt", &Pair(logical_id, attribute)),
            Value::Join { delimiter, values } => {
                single_key(serializer, "Fn::Join", &Pair(delimiter, values))
            }
            Value::Select { index, list } => {
                single_key(serializer, "Fn::Select", &Pair(index, list.as_ref()))
            }
            Value::GetAzs(region) => single_key(serializer, "Fn::GetAZs", region),
            Value::Sub(template) => single_key(serializer, "Fn::Sub", template),
            Value::List(items) => items.serialize(serializer),
        }
    }
}

/// A logical id referenced from inside a property tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Referenced logical id
    pub target: String,
    /// Attribute for `Fn::GetAtt` / `${X.Attr}` references
    pub attribute: Option<String>,
}

/// Collects every non-pseudo logical id referenced from a JSON property tree.
///
/// Recognizes `Ref`, `Fn::GetAtt` (list and dotted forms) and `${...}`
/// placeholders in `Fn::Sub` strings.
pub fn collect_references(value: &serde_json::Value) -> Vec<Reference> {
    let mut found = Vec::new();
    walk(value, &mut found);
    found
}

fn walk(value: &serde_json::Value, found: &mut Vec<Reference>) {
    match value {
        serde_json::Value::Object(map) => {
            if map.len() == 1 {
                if let Some(serde_json::Value::String(target)) = map.get("Ref") {
                    if !is_pseudo_parameter(target) {
                        found.push(Reference {
                            target: target.clone(),
                            attribute: None,
                        });
                    }
                    return;
                }
                if let Some(att) = map.get("Fn::GetAtt") {
                    match att {
                        serde_json::Value::Array(parts) => {
                            if let Some(serde_json::Value::String(target)) = parts.first() {
                                found.push(Reference {
                                    target: target.clone(),
                                    attribute: parts
                                        .get(1)
                                        .and_then(|a| a.as_str())
                                        .map(String::from),
                                });
                            }
                        }
                        serde_json::Value::String(dotted) => {
                            let (target, attribute) = match dotted.split_once('.') {
                                Some((t, a)) => (t.to_string(), Some(a.to_string())),
                                None => (dotted.clone(), None),
                            };
                            found.push(Reference { target, attribute });
                        }
                        _ => {}
                    }
                    return;
                }
                if let Some(serde_json::Value::String(template)) = map.get("Fn::Sub") {
                    found.extend(sub_references(template));
                    return;
                }
            }
            for v in map.values() {
                walk(v, found);
            }
        }
        serde_json::Value::Array(items) => {
            for v in items {
                walk(v, found);
            }
        }
        _ => {}
    }
}

fn sub_references(template: &str) -> Vec<Reference> {
    let mut refs = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else { break };
        let name = &after[..end];
        // `${!Literal}` escapes a placeholder
        if !name.starts_with('!') && !is_pseudo_parameter(name) {
            let (target, attribute) = match name.split_once('.') {
                Some((t, a)) => (t.to_string(), Some(a.to_string())),
                None => (name.to_string(), None),
            };
            refs.push(Reference { target, attribute });
        }
        rest = &after[end + 1..];
    }
    refs
}
