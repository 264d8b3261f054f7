//! Schema - Define type schemas for resources
//!
//! Providers build one immutable [`ResourceSchema`] per resource type at
//! startup. Schemas describe the identifier, config and attrs structs and are
//! used for structural validation, update-mask checking and introspection.

use std::fmt;

use crate::resource::Value;

/// Attribute type
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeType {
    String,
    Bool,
    /// Local file reference
    File,
    /// Identifier of any resource type
    Identifier,
    List(Box<AttributeType>),
    /// Map with string keys
    Map(Box<AttributeType>),
    /// Nested struct with fixed fields
    Struct(Vec<AttributeSchema>),
}

impl AttributeType {
    pub fn list(inner: AttributeType) -> Self {
        AttributeType::List(Box::new(inner))
    }

    pub fn map(inner: AttributeType) -> Self {
        AttributeType::Map(Box::new(inner))
    }

    /// Check if a value conforms to this type
    pub fn validate(&self, value: &Value) -> Result<(), TypeError> {
        match (self, value) {
            (AttributeType::String, Value::String(_))
            | (AttributeType::Bool, Value::Bool(_))
            | (AttributeType::File, Value::File(_))
            | (AttributeType::Identifier, Value::Identifier(_)) => Ok(()),

            (AttributeType::List(inner), Value::List(items)) => {
                for (i, item) in items.iter().enumerate() {
                    inner.validate(item).map_err(|e| TypeError::ListItemError {
                        index: i,
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Map(inner), Value::Map(map)) => {
                for (k, v) in map {
                    inner.validate(v).map_err(|e| TypeError::MapValueError {
                        key: k.clone(),
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Struct(fields), Value::Map(_)) => {
                match validate_fields(fields, value).into_iter().next() {
                    Some(e) => Err(e),
                    None => Ok(()),
                }
            }

            _ => Err(TypeError::TypeMismatch {
                expected: self.type_name(),
                got: value.kind().to_string(),
            }),
        }
    }

    fn type_name(&self) -> String {
        match self {
            AttributeType::String => "String".to_string(),
            AttributeType::Bool => "Bool".to_string(),
            AttributeType::File => "File".to_string(),
            AttributeType::Identifier => "Identifier".to_string(),
            AttributeType::List(inner) => format!("List<{}>", inner.type_name()),
            AttributeType::Map(inner) => format!("Map<{}>", inner.type_name()),
            AttributeType::Struct(fields) => {
                let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
                format!("Struct{{{}}}", names.join(", "))
            }
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// Type error
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TypeError {
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("Required attribute '{name}' is missing")]
    MissingRequired { name: String },

    #[error("Attribute '{name}': {inner}")]
    AttributeError { name: String, inner: Box<TypeError> },

    #[error("List item at index {index}: {inner}")]
    ListItemError { index: usize, inner: Box<TypeError> },

    #[error("Map value for key '{key}': {inner}")]
    MapValueError { key: String, inner: Box<TypeError> },
}

/// Attribute schema
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeSchema {
    pub name: String,
    pub attr_type: AttributeType,
    pub description: Option<String>,
}

impl AttributeSchema {
    pub fn new(name: impl Into<String>, attr_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attr_type,
            description: None,
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }
}

/// Validate a map value against a fixed field list, collecting every error.
///
/// All declared fields are required. Unknown attributes are allowed.
pub fn validate_fields(fields: &[AttributeSchema], value: &Value) -> Vec<TypeError> {
    let map = match value {
        Value::Map(map) => map,
        other => {
            return vec![TypeError::TypeMismatch {
                expected: "Map".to_string(),
                got: other.kind().to_string(),
            }];
        }
    };

    let mut errors = Vec::new();
    for field in fields {
        match map.get(&field.name) {
            None => errors.push(TypeError::MissingRequired {
                name: field.name.clone(),
            }),
            Some(v) => {
                if let Err(e) = field.attr_type.validate(v) {
                    errors.push(TypeError::AttributeError {
                        name: field.name.clone(),
                        inner: Box::new(e),
                    });
                }
            }
        }
    }
    errors
}

/// Resource schema
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSchema {
    pub resource_type: String,
    pub identifier: Vec<AttributeSchema>,
    pub config: Vec<AttributeSchema>,
    pub attrs: Vec<AttributeSchema>,
    pub description: Option<String>,
}

impl ResourceSchema {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            identifier: Vec::new(),
            config: Vec::new(),
            attrs: Vec::new(),
            description: None,
        }
    }

    pub fn identifier(mut self, schema: AttributeSchema) -> Self {
        self.identifier.push(schema);
        self
    }

    pub fn config(mut self, schema: AttributeSchema) -> Self {
        self.config.push(schema);
        self
    }

    pub fn attr(mut self, schema: AttributeSchema) -> Self {
        self.attrs.push(schema);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Validate the fields of an identifier value
    pub fn validate_identifier(&self, value: &Value) -> Result<(), Vec<TypeError>> {
        let fields = match value {
            Value::Identifier(id) => Value::Map(id.fields.clone()),
            other => {
                return Err(vec![TypeError::TypeMismatch {
                    expected: "Identifier".to_string(),
                    got: other.kind().to_string(),
                }]);
            }
        };
        into_result(validate_fields(&self.identifier, &fields))
    }

    /// Validate a config value
    pub fn validate_config(&self, value: &Value) -> Result<(), Vec<TypeError>> {
        into_result(validate_fields(&self.config, value))
    }
}

fn into_result(errors: Vec<TypeError>) -> Result<(), Vec<TypeError>> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{FileRef, Identifier};

    fn function_schema() -> ResourceSchema {
        ResourceSchema::new("function")
            .identifier(AttributeSchema::new("name", AttributeType::String))
            .config(AttributeSchema::new("description", AttributeType::String))
            .config(AttributeSchema::new(
                "labels",
                AttributeType::map(AttributeType::String),
            ))
            .config(AttributeSchema::new(
                "build_config",
                AttributeType::Struct(vec![
                    AttributeSchema::new("runtime", AttributeType::String),
                    AttributeSchema::new("source", AttributeType::File),
                ]),
            ))
    }

    #[test]
    fn validate_string_type() {
        let t = AttributeType::String;
        assert!(t.validate(&Value::string("hello")).is_ok());
        assert!(t.validate(&Value::Bool(true)).is_err());
    }

    #[test]
    fn validate_list_of_files() {
        let t = AttributeType::list(AttributeType::File);
        assert!(t.validate(&Value::List(vec![Value::File(FileRef::default())])).is_ok());
        let err = t
            .validate(&Value::List(vec![Value::string("a.yaml")]))
            .unwrap_err();
        assert!(matches!(err, TypeError::ListItemError { index: 0, .. }));
    }

    #[test]
    fn validate_config_collects_all_errors() {
        let schema = function_schema();
        let config = Value::map([
            ("labels", Value::map([("env", Value::Bool(true))])),
            (
                "build_config",
                Value::map([("runtime", Value::string("go121"))]),
            ),
        ]);

        let errors = schema.validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&TypeError::MissingRequired {
            name: "description".to_string()
        }));
    }

    #[test]
    fn validate_identifier_checks_fields() {
        let schema = function_schema();
        let id = Value::Identifier(Identifier::new("function").with_field("name", Value::string("f")));
        assert!(schema.validate_identifier(&id).is_ok());
        assert!(schema.validate_identifier(&Value::string("f")).is_err());
    }

    #[test]
    fn type_names() {
        let t = AttributeType::map(AttributeType::list(AttributeType::Identifier));
        assert_eq!(t.to_string(), "Map<List<Identifier>>");
    }
}
