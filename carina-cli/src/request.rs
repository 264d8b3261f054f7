//! Request files
//!
//! A request is a JSON document naming one handler operation:
//!
//! ```json
//! {
//!   "operation": "update",
//!   "identifier": {"$identifier": {"resource_type": "bucket", "fields": {...}}},
//!   "config": {"labels": {"env": "prod"}},
//!   "mask": [{"name": "labels", "sub_fields": [{"name": "env"}]}]
//! }
//! ```

use std::fmt;
use std::path::Path;

use carina_core::resource::Value;
use carina_core::update_mask::UpdateMaskField;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Get,
    Create,
    Update,
    Delete,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Get => "get",
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Deserialize)]
struct RawRequest {
    operation: OperationKind,
    identifier: serde_json::Value,
    #[serde(default)]
    config: Option<serde_json::Value>,
    #[serde(default)]
    mask: Vec<UpdateMaskField>,
}

/// A request with its JSON converted to values
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub operation: OperationKind,
    pub identifier: Value,
    pub config: Option<Value>,
    pub mask: Vec<UpdateMaskField>,
}

impl Request {
    pub fn parse(content: &str) -> Result<Self, String> {
        let raw: RawRequest =
            serde_json::from_str(content).map_err(|e| format!("Invalid request: {}", e))?;

        let identifier = Value::from_json(&raw.identifier)
            .map_err(|e| format!("Invalid identifier: {}", e))?;
        let config = raw
            .config
            .as_ref()
            .map(Value::from_json)
            .transpose()
            .map_err(|e| format!("Invalid config: {}", e))?;

        let needs_config = matches!(raw.operation, OperationKind::Create | OperationKind::Update);
        if needs_config && config.is_none() {
            return Err(format!("{} requires a config", raw.operation));
        }

        Ok(Self {
            operation: raw.operation,
            identifier,
            config,
            mask: raw.mask,
        })
    }

    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        Self::parse(&content)
    }
}
