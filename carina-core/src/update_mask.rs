//! Update mask - Select which config fields an update applies
//!
//! The orchestrator sends a shallow tree of [`UpdateMaskField`]s naming the
//! fields that changed. A field without sub-fields selects the whole value; a
//! field with sub-fields selects only the named children (e.g. one label key).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::codec::DecodeError;
use crate::resource::Value;
use crate::schema::{AttributeSchema, AttributeType};

/// Operation applied to a masked field
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    /// Take the value from config
    #[default]
    Set,
    /// Remove the field regardless of config
    Delete,
}

/// One node of an update mask
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateMaskField {
    pub name: String,
    #[serde(default)]
    pub operation: Operation,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_fields: Vec<UpdateMaskField>,
}

impl UpdateMaskField {
    pub fn set(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            operation: Operation::Set,
            sub_fields: Vec::new(),
        }
    }

    pub fn delete(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            operation: Operation::Delete,
            sub_fields: Vec::new(),
        }
    }

    pub fn with_sub_fields(mut self, sub_fields: Vec<UpdateMaskField>) -> Self {
        self.sub_fields = sub_fields;
        self
    }
}

/// A single selected change
#[derive(Debug, Clone, PartialEq)]
pub enum FieldChange {
    Set { path: Vec<String>, value: Value },
    Delete { path: Vec<String> },
}

impl FieldChange {
    pub fn path(&self) -> &[String] {
        match self {
            FieldChange::Set { path, .. } | FieldChange::Delete { path } => path,
        }
    }

    /// Name of the top-level config field this change belongs to
    pub fn field(&self) -> &str {
        self.path().first().map(String::as_str).unwrap_or_default()
    }
}

/// Error raised while applying an update mask
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MaskError {
    #[error("value for '{path}' is missing")]
    MissingValue { path: String },

    #[error("'{path}' cannot select sub-fields: {inner}")]
    NotAContainer { path: String, inner: DecodeError },

    #[error("unknown field '{path}' in update mask")]
    UnknownField { path: String },

    #[error("config is not a map: {0}")]
    Config(DecodeError),
}

/// Select the changes an update mask asserts against a config value.
///
/// A `Set` whose value is absent from config is an error, since the mask
/// claimed the field would change.
pub fn select_fields(
    config: &Value,
    mask: &[UpdateMaskField],
) -> Result<Vec<FieldChange>, MaskError> {
    let fields = config.as_map().map_err(MaskError::Config)?;
    let mut changes = Vec::new();
    select_into(&mut changes, &[], Some(fields), mask)?;
    Ok(changes)
}

fn select_into(
    changes: &mut Vec<FieldChange>,
    base: &[String],
    container: Option<&HashMap<String, Value>>,
    mask: &[UpdateMaskField],
) -> Result<(), MaskError> {
    for field in mask {
        let mut path = base.to_vec();
        path.push(field.name.clone());
        let current = container.and_then(|c| c.get(&field.name));

        if field.sub_fields.is_empty() {
            match field.operation {
                Operation::Delete => changes.push(FieldChange::Delete { path }),
                Operation::Set => {
                    let value = current.ok_or_else(|| MaskError::MissingValue {
                        path: path.join("."),
                    })?;
                    changes.push(FieldChange::Set {
                        path,
                        value: value.clone(),
                    });
                }
            }
            continue;
        }

        let children = match current {
            Some(value) => Some(value.as_map().map_err(|inner| MaskError::NotAContainer {
                path: path.join("."),
                inner,
            })?),
            None => None,
        };
        select_into(changes, &path, children, &field.sub_fields)?;
    }
    Ok(())
}

/// Check mask names against a config schema.
///
/// Struct fields only accept their declared children; map fields accept any
/// key as a sub-field.
pub fn check_names(fields: &[AttributeSchema], mask: &[UpdateMaskField]) -> Result<(), MaskError> {
    check_names_at(&[], fields, mask)
}

fn check_names_at(
    base: &[String],
    fields: &[AttributeSchema],
    mask: &[UpdateMaskField],
) -> Result<(), MaskError> {
    for field in mask {
        let mut path = base.to_vec();
        path.push(field.name.clone());

        let schema = fields
            .iter()
            .find(|f| f.name == field.name)
            .ok_or_else(|| MaskError::UnknownField {
                path: path.join("."),
            })?;

        if let AttributeType::Struct(children) = &schema.attr_type {
            check_names_at(&path, children, &field.sub_fields)?;
        }
    }
    Ok(())
}

/// Top-level field names touched by a set of changes, in first-seen order
pub fn changed_fields(changes: &[FieldChange]) -> Vec<&str> {
    let mut names: Vec<&str> = Vec::new();
    for change in changes {
        let name = change.field();
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels_config() -> Value {
        Value::map([(
            "labels",
            Value::map([("a", Value::string("1")), ("b", Value::string("2"))]),
        )])
    }

    fn path(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn label_sub_fields_select_exactly_named_keys() {
        let mask = vec![UpdateMaskField::set("labels").with_sub_fields(vec![
            UpdateMaskField::set("a"),
            UpdateMaskField::delete("c"),
        ])];

        let changes = select_fields(&labels_config(), &mask).unwrap();
        assert_eq!(
            changes,
            vec![
                FieldChange::Set {
                    path: path(&["labels", "a"]),
                    value: Value::string("1"),
                },
                FieldChange::Delete {
                    path: path(&["labels", "c"]),
                },
            ]
        );
    }

    #[test]
    fn set_of_absent_key_is_an_error() {
        let mask = vec![
            UpdateMaskField::set("labels").with_sub_fields(vec![UpdateMaskField::set("d")]),
        ];
        let err = select_fields(&labels_config(), &mask).unwrap_err();
        assert_eq!(
            err,
            MaskError::MissingValue {
                path: "labels.d".to_string()
            }
        );
    }

    #[test]
    fn whole_field_selection() {
        let config = Value::map([
            ("description", Value::string("hello")),
            ("labels", Value::Map(HashMap::new())),
        ]);
        let changes = select_fields(&config, &[UpdateMaskField::set("description")]).unwrap();
        assert_eq!(
            changes,
            vec![FieldChange::Set {
                path: path(&["description"]),
                value: Value::string("hello"),
            }]
        );
    }

    #[test]
    fn delete_under_absent_container_is_allowed() {
        let config = Value::map([("description", Value::string("x"))]);
        let mask = vec![
            UpdateMaskField::set("labels").with_sub_fields(vec![UpdateMaskField::delete("old")]),
        ];
        let changes = select_fields(&config, &mask).unwrap();
        assert_eq!(changes, vec![FieldChange::Delete { path: path(&["labels", "old"]) }]);
    }

    #[test]
    fn sub_fields_on_scalar_are_rejected() {
        let config = Value::map([("description", Value::string("x"))]);
        let mask = vec![
            UpdateMaskField::set("description").with_sub_fields(vec![UpdateMaskField::set("y")]),
        ];
        let err = select_fields(&config, &mask).unwrap_err();
        assert!(matches!(err, MaskError::NotAContainer { .. }));
    }

    #[test]
    fn check_names_against_schema() {
        let fields = vec![
            AttributeSchema::new("labels", AttributeType::map(AttributeType::String)),
            AttributeSchema::new(
                "build_config",
                AttributeType::Struct(vec![AttributeSchema::new("runtime", AttributeType::String)]),
            ),
        ];

        let ok = vec![
            UpdateMaskField::set("labels").with_sub_fields(vec![UpdateMaskField::set("any")]),
            UpdateMaskField::set("build_config")
                .with_sub_fields(vec![UpdateMaskField::set("runtime")]),
        ];
        assert!(check_names(&fields, &ok).is_ok());

        let bad = vec![
            UpdateMaskField::set("build_config")
                .with_sub_fields(vec![UpdateMaskField::set("entry")]),
        ];
        assert_eq!(
            check_names(&fields, &bad).unwrap_err(),
            MaskError::UnknownField {
                path: "build_config.entry".to_string()
            }
        );
    }

    #[test]
    fn mask_deserializes_with_default_operation() {
        let mask: Vec<UpdateMaskField> = serde_json::from_str(
            r#"[{"name": "labels", "sub_fields": [{"name": "a"}, {"name": "c", "operation": "DELETE"}]}]"#,
        )
        .unwrap();
        assert_eq!(mask[0].operation, Operation::Set);
        assert_eq!(mask[0].sub_fields[1].operation, Operation::Delete);
    }

    #[test]
    fn changed_fields_deduplicates() {
        let changes = vec![
            FieldChange::Delete { path: path(&["labels", "a"]) },
            FieldChange::Delete { path: path(&["labels", "b"]) },
            FieldChange::Delete { path: path(&["description"]) },
        ];
        assert_eq!(changed_fields(&changes), vec!["labels", "description"]);
    }
}
