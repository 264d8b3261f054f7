//! Codec - Typed conversion between concrete structs and [`Value`] trees
//!
//! Decoding is all-or-nothing: the first field that does not match aborts the
//! whole decode with an error naming the owner, the field path and the
//! expected and actual shapes.

use std::collections::HashMap;

use crate::resource::{FileRef, Identifier, Value, ValueKind};

/// Error raised when a Value does not have the shape its consumer expects
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("expected {expected}, got {actual}")]
    TypeMismatch {
        expected: ValueKind,
        actual: ValueKind,
    },

    #[error("field '{field}' is missing")]
    MissingField { field: String },

    #[error("unknown field '{field}'")]
    UnknownField { field: String },

    #[error("field '{field}': {inner}")]
    Field {
        field: String,
        inner: Box<DecodeError>,
    },

    #[error("list item at index {index}: {inner}")]
    ListItem {
        index: usize,
        inner: Box<DecodeError>,
    },

    #[error("map value for key '{key}': {inner}")]
    MapValue {
        key: String,
        inner: Box<DecodeError>,
    },

    #[error("error parsing {owner}: {inner}")]
    Owner {
        owner: String,
        inner: Box<DecodeError>,
    },

    #[error("unsupported resource type '{0}'")]
    UnsupportedType(String),

    #[error("expected {expected} identifier, got {actual}")]
    IdentifierMismatch { expected: String, actual: String },

    #[error("invalid value '{value}': {reason}")]
    InvalidValue { value: String, reason: String },
}

impl DecodeError {
    pub fn mismatch(expected: ValueKind, actual: &Value) -> Self {
        Self::TypeMismatch {
            expected,
            actual: actual.kind(),
        }
    }

    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    pub fn invalid(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn identifier_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::IdentifierMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn in_field(self, field: impl Into<String>) -> Self {
        Self::Field {
            field: field.into(),
            inner: Box::new(self),
        }
    }

    pub fn at_index(self, index: usize) -> Self {
        Self::ListItem {
            index,
            inner: Box::new(self),
        }
    }

    pub fn in_map_key(self, key: impl Into<String>) -> Self {
        Self::MapValue {
            key: key.into(),
            inner: Box::new(self),
        }
    }

    pub fn in_owner(self, owner: impl Into<String>) -> Self {
        Self::Owner {
            owner: owner.into(),
            inner: Box::new(self),
        }
    }

    /// Field path from the outermost struct to the failing field.
    ///
    /// List indices and map keys appear as path segments; owner wrappers do not.
    pub fn path(&self) -> Vec<String> {
        let mut path = Vec::new();
        let mut current = self;
        loop {
            match current {
                DecodeError::Field { field, inner } => {
                    path.push(field.clone());
                    current = inner;
                }
                DecodeError::ListItem { index, inner } => {
                    path.push(index.to_string());
                    current = inner;
                }
                DecodeError::MapValue { key, inner } => {
                    path.push(key.clone());
                    current = inner;
                }
                DecodeError::Owner { inner, .. } => current = inner,
                DecodeError::MissingField { field } | DecodeError::UnknownField { field } => {
                    path.push(field.clone());
                    return path;
                }
                _ => return path,
            }
        }
    }

    /// The innermost error, with all location wrappers removed
    pub fn root(&self) -> &DecodeError {
        match self {
            DecodeError::Field { inner, .. }
            | DecodeError::ListItem { inner, .. }
            | DecodeError::MapValue { inner, .. }
            | DecodeError::Owner { inner, .. } => inner.root(),
            other => other,
        }
    }
}

/// Encode a concrete struct into a Value
pub trait ToValue {
    fn to_value(&self) -> Value;
}

/// Decode a concrete struct from a Value
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self, DecodeError>;
}

/// A concrete identifier variant bound to one resource type tag
pub trait IdentifierCodec: Sized {
    /// Resource type tag this identifier decodes from
    const RESOURCE_TYPE: &'static str;

    fn to_identifier(&self) -> Identifier;

    fn from_identifier(id: &Identifier) -> Result<Self, DecodeError>;
}

impl ToValue for String {
    fn to_value(&self) -> Value {
        Value::String(self.clone())
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self, DecodeError> {
        value.as_str().map(str::to_string)
    }
}

impl ToValue for bool {
    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self, DecodeError> {
        value.as_bool()
    }
}

impl ToValue for FileRef {
    fn to_value(&self) -> Value {
        Value::File(self.clone())
    }
}

impl FromValue for FileRef {
    fn from_value(value: &Value) -> Result<Self, DecodeError> {
        value.as_file().cloned()
    }
}

impl<T: ToValue> ToValue for Vec<T> {
    fn to_value(&self) -> Value {
        Value::List(self.iter().map(ToValue::to_value).collect())
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: &Value) -> Result<Self, DecodeError> {
        value
            .as_list()?
            .iter()
            .enumerate()
            .map(|(i, item)| T::from_value(item).map_err(|e| e.at_index(i)))
            .collect()
    }
}

impl<T: ToValue> ToValue for HashMap<String, T> {
    fn to_value(&self) -> Value {
        Value::Map(self.iter().map(|(k, v)| (k.clone(), v.to_value())).collect())
    }
}

impl<T: FromValue> FromValue for HashMap<String, T> {
    fn from_value(value: &Value) -> Result<Self, DecodeError> {
        value
            .as_map()?
            .iter()
            .map(|(k, v)| {
                T::from_value(v)
                    .map(|decoded| (k.clone(), decoded))
                    .map_err(|e| e.in_map_key(k))
            })
            .collect()
    }
}

/// Decode a list element-wise with a custom decoder, naming the failing index
pub fn decode_list<T>(
    value: &Value,
    decode: impl Fn(&Value) -> Result<T, DecodeError>,
) -> Result<Vec<T>, DecodeError> {
    value
        .as_list()?
        .iter()
        .enumerate()
        .map(|(i, item)| decode(item).map_err(|e| e.at_index(i)))
        .collect()
}

/// Typed reader over the fields of a map or identifier.
///
/// Every error it returns is wrapped with the owner name so that callers
/// several layers up can tell which struct failed.
#[derive(Debug, Clone, Copy)]
pub struct FieldReader<'a> {
    owner: &'a str,
    fields: &'a HashMap<String, Value>,
}

impl<'a> FieldReader<'a> {
    /// Reader over a value that must be a map
    pub fn new(owner: &'a str, value: &'a Value) -> Result<Self, DecodeError> {
        let fields = value.as_map().map_err(|e| e.in_owner(owner))?;
        Ok(Self { owner, fields })
    }

    /// Reader over the fields of an identifier
    pub fn for_identifier(owner: &'a str, id: &'a Identifier) -> Self {
        Self {
            owner,
            fields: &id.fields,
        }
    }

    /// Reject any field not listed in `known`
    pub fn deny_unknown(&self, known: &[&str]) -> Result<(), DecodeError> {
        let mut unknown: Vec<&String> = self
            .fields
            .keys()
            .filter(|k| !known.contains(&k.as_str()))
            .collect();
        unknown.sort();
        match unknown.first() {
            Some(field) => Err(DecodeError::UnknownField {
                field: (*field).clone(),
            }
            .in_owner(self.owner)),
            None => Ok(()),
        }
    }

    /// Raw value of a required field
    pub fn value(&self, name: &str) -> Result<&'a Value, DecodeError> {
        self.fields
            .get(name)
            .ok_or_else(|| DecodeError::missing(name).in_owner(self.owner))
    }

    /// Decode a required field
    pub fn get<T: FromValue>(&self, name: &str) -> Result<T, DecodeError> {
        self.with(name, T::from_value)
    }

    /// Decode a required field with a custom decoder
    pub fn with<T>(
        &self,
        name: &str,
        decode: impl FnOnce(&'a Value) -> Result<T, DecodeError>,
    ) -> Result<T, DecodeError> {
        let value = self.value(name)?;
        decode(value).map_err(|e| e.in_field(name).in_owner(self.owner))
    }
}
