//! Resource - Values exchanged with the orchestrator
//!
//! Identifiers, configurations and attributes all travel as [`Value`] trees.
//! Handlers decode them into concrete structs through [`crate::codec`].

use std::collections::HashMap;
use std::fmt;

use serde_json::json;

use crate::codec::DecodeError;

const FILE_KEY: &str = "$file";
const IDENTIFIER_KEY: &str = "$identifier";

/// Kind of a [`Value`], reported in decode errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    String,
    Bool,
    List,
    Map,
    File,
    Identifier,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::String => "String",
            ValueKind::Bool => "Bool",
            ValueKind::List => "List",
            ValueKind::Map => "Map",
            ValueKind::File => "File",
            ValueKind::Identifier => "Identifier",
        };
        f.write_str(name)
    }
}

/// Handle to a local file.
///
/// Only the path and a content checksum travel; the body is read by the
/// handler that uploads it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileRef {
    pub path: String,
    pub checksum: String,
}

impl FileRef {
    pub fn new(path: impl Into<String>, checksum: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            checksum: checksum.into(),
        }
    }

    /// A file known only by its checksum, as reported back by the cloud
    pub fn with_checksum(checksum: impl Into<String>) -> Self {
        Self::new(String::new(), checksum)
    }
}

/// Identifier of a resource, tagged by resource type
#[derive(Debug, Clone)]
pub struct Identifier {
    /// Resource type tag (e.g., "bucket", "function")
    pub resource_type: String,
    pub fields: HashMap<String, Value>,
    /// Name the orchestrator uses for this resource; never read by handlers
    pub alias: Option<String>,
}

impl Identifier {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            fields: HashMap::new(),
            alias: None,
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }
}

// The alias belongs to the orchestrator, so two identifiers naming the same
// resource are equal regardless of it.
impl PartialEq for Identifier {
    fn eq(&self, other: &Self) -> bool {
        self.resource_type == other.resource_type && self.fields == other.fields
    }
}

/// Self-describing value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Bool(bool),
    List(Vec<Value>),
    Map(HashMap<String, Value>),
    File(FileRef),
    Identifier(Identifier),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::String(_) => ValueKind::String,
            Value::Bool(_) => ValueKind::Bool,
            Value::List(_) => ValueKind::List,
            Value::Map(_) => ValueKind::Map,
            Value::File(_) => ValueKind::File,
            Value::Identifier(_) => ValueKind::Identifier,
        }
    }

    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    /// Build a map value from key/value pairs
    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn as_str(&self) -> Result<&str, DecodeError> {
        match self {
            Value::String(s) => Ok(s),
            other => Err(DecodeError::mismatch(ValueKind::String, other)),
        }
    }

    pub fn as_bool(&self) -> Result<bool, DecodeError> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(DecodeError::mismatch(ValueKind::Bool, other)),
        }
    }

    pub fn as_list(&self) -> Result<&[Value], DecodeError> {
        match self {
            Value::List(items) => Ok(items),
            other => Err(DecodeError::mismatch(ValueKind::List, other)),
        }
    }

    pub fn as_map(&self) -> Result<&HashMap<String, Value>, DecodeError> {
        match self {
            Value::Map(map) => Ok(map),
            other => Err(DecodeError::mismatch(ValueKind::Map, other)),
        }
    }

    pub fn as_file(&self) -> Result<&FileRef, DecodeError> {
        match self {
            Value::File(file) => Ok(file),
            other => Err(DecodeError::mismatch(ValueKind::File, other)),
        }
    }

    pub fn as_identifier(&self) -> Result<&Identifier, DecodeError> {
        match self {
            Value::Identifier(id) => Ok(id),
            other => Err(DecodeError::mismatch(ValueKind::Identifier, other)),
        }
    }

    /// Convert a JSON document into a Value.
    ///
    /// Objects of the form `{"$file": {...}}` and `{"$identifier": {...}}`
    /// become File and Identifier values. Numbers and null have no Value
    /// counterpart and are rejected.
    pub fn from_json(json: &serde_json::Value) -> Result<Value, DecodeError> {
        match json {
            serde_json::Value::String(s) => Ok(Value::String(s.clone())),
            serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
            serde_json::Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| Value::from_json(item).map_err(|e| e.at_index(i)))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            serde_json::Value::Object(obj) => {
                if obj.len() == 1 {
                    if let Some(file) = obj.get(FILE_KEY) {
                        return file_from_json(file).map(Value::File);
                    }
                    if let Some(id) = obj.get(IDENTIFIER_KEY) {
                        return identifier_from_json(id).map(Value::Identifier);
                    }
                }
                let mut map = HashMap::new();
                for (key, item) in obj {
                    let value = Value::from_json(item).map_err(|e| e.in_map_key(key))?;
                    map.insert(key.clone(), value);
                }
                Ok(Value::Map(map))
            }
            serde_json::Value::Number(n) => Err(DecodeError::invalid(
                n.to_string(),
                "numbers are not supported, use a string",
            )),
            serde_json::Value::Null => Err(DecodeError::invalid("null", "null is not a value")),
        }
    }

    /// Convert this Value into its JSON form (inverse of [`Value::from_json`])
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::String(s) => json!(s),
            Value::Bool(b) => json!(b),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Value::File(file) => json!({
                FILE_KEY: { "path": file.path, "checksum": file.checksum }
            }),
            Value::Identifier(id) => {
                let fields: serde_json::Map<String, serde_json::Value> = id
                    .fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect();
                let mut body = serde_json::Map::new();
                body.insert("resource_type".to_string(), json!(id.resource_type));
                if let Some(alias) = &id.alias {
                    body.insert("alias".to_string(), json!(alias));
                }
                body.insert("fields".to_string(), serde_json::Value::Object(fields));
                json!({ IDENTIFIER_KEY: body })
            }
        }
    }
}

fn json_str<'a>(
    obj: &'a serde_json::Map<String, serde_json::Value>,
    key: &str,
) -> Result<Option<&'a str>, DecodeError> {
    match obj.get(key) {
        None => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(other) => Err(DecodeError::invalid(other.to_string(), "expected a string").in_field(key)),
    }
}

fn file_from_json(json: &serde_json::Value) -> Result<FileRef, DecodeError> {
    let obj = json
        .as_object()
        .ok_or_else(|| DecodeError::invalid(json.to_string(), "expected an object").in_field(FILE_KEY))?;
    let path = json_str(obj, "path")?.unwrap_or_default();
    let checksum = json_str(obj, "checksum")?.unwrap_or_default();
    Ok(FileRef::new(path, checksum))
}

fn identifier_from_json(json: &serde_json::Value) -> Result<Identifier, DecodeError> {
    let obj = json.as_object().ok_or_else(|| {
        DecodeError::invalid(json.to_string(), "expected an object").in_field(IDENTIFIER_KEY)
    })?;
    let resource_type = json_str(obj, "resource_type")?
        .ok_or_else(|| DecodeError::missing("resource_type"))?;

    let mut id = Identifier::new(resource_type);
    if let Some(alias) = json_str(obj, "alias")? {
        id = id.with_alias(alias);
    }
    if let Some(fields) = obj.get("fields") {
        match Value::from_json(fields).map_err(|e| e.in_field("fields"))? {
            Value::Map(map) => id.fields = map,
            other => return Err(DecodeError::mismatch(ValueKind::Map, &other).in_field("fields")),
        }
    }
    Ok(id)
}

/// A resource as returned to the orchestrator
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub identifier: Identifier,
    pub config: Value,
    pub attrs: Value,
}

impl Resource {
    pub fn new(identifier: Identifier, config: Value, attrs: Value) -> Self {
        Self {
            identifier,
            config,
            attrs,
        }
    }

    /// The `(config, attrs)` pair handed back to the orchestrator
    pub fn into_parts(self) -> (Value, Value) {
        (self.config, self.attrs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessor_reports_expected_and_actual_kind() {
        let err = Value::List(vec![]).as_map().unwrap_err();
        assert_eq!(err.to_string(), "expected Map, got List");
    }

    #[test]
    fn identifier_equality_ignores_alias() {
        let a = Identifier::new("bucket").with_field("name", Value::string("b"));
        let b = a.clone().with_alias("logs");
        assert_eq!(a, b);
    }

    #[test]
    fn json_round_trip_with_file_and_identifier() {
        let value = Value::map([
            ("labels", Value::map([("env", Value::string("prod"))])),
            ("enabled", Value::Bool(true)),
            (
                "docs",
                Value::List(vec![Value::File(FileRef::new("api.yaml", "123"))]),
            ),
            (
                "api",
                Value::Identifier(
                    Identifier::new("api")
                        .with_field("project", Value::string("p1"))
                        .with_alias("main"),
                ),
            ),
        ]);

        let json = value.to_json();
        assert_eq!(json["docs"][0]["$file"]["path"], "api.yaml");
        assert_eq!(json["api"]["$identifier"]["resource_type"], "api");

        let back = Value::from_json(&json).unwrap();
        assert_eq!(back, value);
        let Value::Map(map) = back else { panic!("expected map") };
        let Value::Identifier(id) = &map["api"] else { panic!("expected identifier") };
        assert_eq!(id.alias.as_deref(), Some("main"));
    }

    #[test]
    fn json_numbers_are_rejected_with_location() {
        let json = serde_json::json!({ "labels": { "count": 3 } });
        let err = Value::from_json(&json).unwrap_err();
        assert!(err.to_string().contains("'labels'"));
        assert!(err.to_string().contains("'count'"));
    }

    #[test]
    fn identifier_json_requires_resource_type() {
        let json = serde_json::json!({ "$identifier": { "fields": {} } });
        let err = Value::from_json(&json).unwrap_err();
        assert_eq!(err, DecodeError::missing("resource_type"));
    }

    #[test]
    fn resource_into_parts() {
        let resource = Resource::new(
            Identifier::new("bucket"),
            Value::map([("labels", Value::Map(HashMap::new()))]),
            Value::map([("created", Value::string("now"))]),
        );
        let (config, attrs) = resource.into_parts();
        assert_eq!(config.kind(), ValueKind::Map);
        assert_eq!(attrs.as_map().unwrap()["created"], Value::string("now"));
    }
}
