//! Predefined IAM role, read only

use std::sync::Arc;

use async_trait::async_trait;
use carina_core::codec::{DecodeError, FieldReader, FromValue, ToValue};
use carina_core::provider::{ProviderResult, Snapshot, TypedHandler};
use carina_core::resource::Value;
use log::debug;

use crate::client::{IamAdminApi, RoleInfo, VendorContext};
use crate::iam::format_etag;
use crate::identifier::IamRoleId;

/// Predefined roles carry no configurable fields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IamRoleConfig;

impl ToValue for IamRoleConfig {
    fn to_value(&self) -> Value {
        Value::map(Vec::<(String, Value)>::new())
    }
}

impl FromValue for IamRoleConfig {
    fn from_value(value: &Value) -> Result<Self, DecodeError> {
        FieldReader::new("iam_role config", value)?.deny_unknown(&[])?;
        Ok(Self)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IamRoleAttrs {
    pub title: String,
    pub description: String,
    pub stage: String,
    pub etag: String,
    pub permissions: Vec<String>,
}

impl ToValue for IamRoleAttrs {
    fn to_value(&self) -> Value {
        Value::map([
            ("title", self.title.to_value()),
            ("description", self.description.to_value()),
            ("stage", self.stage.to_value()),
            ("etag", self.etag.to_value()),
            ("permissions", self.permissions.to_value()),
        ])
    }
}

impl FromValue for IamRoleAttrs {
    fn from_value(value: &Value) -> Result<Self, DecodeError> {
        let r = FieldReader::new("iam_role attrs", value)?;
        Ok(Self {
            title: r.get("title")?,
            description: r.get("description")?,
            stage: r.get("stage")?,
            etag: r.get("etag")?,
            permissions: r.get("permissions")?,
        })
    }
}

pub struct IamRoleHandler {
    iam: Arc<dyn IamAdminApi>,
}

impl IamRoleHandler {
    pub fn new(iam: Arc<dyn IamAdminApi>) -> Self {
        Self { iam }
    }
}

#[async_trait]
impl TypedHandler for IamRoleHandler {
    type Id = IamRoleId;
    type Config = IamRoleConfig;
    type Attrs = IamRoleAttrs;

    async fn get(&self, id: &IamRoleId) -> ProviderResult<Snapshot<IamRoleConfig, IamRoleAttrs>> {
        let name = id.full_name();
        debug!("get role {}", name);
        let role: RoleInfo = self.iam.get_role(&name).await.context("get role", &name)?;
        Ok(Snapshot::new(
            IamRoleConfig,
            IamRoleAttrs {
                title: role.title,
                description: role.description,
                stage: role.stage.to_string(),
                etag: format_etag(&role.etag),
                permissions: role.included_permissions,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use carina_core::provider::ProviderError;

    use super::*;
    use crate::client::RoleStage;
    use crate::resources::test_support::cloud;

    fn viewer() -> IamRoleId {
        IamRoleId {
            name: "viewer".to_string(),
        }
    }

    #[test]
    fn config_is_empty_map() {
        assert_eq!(IamRoleConfig.to_value(), Value::map(Vec::<(String, Value)>::new()));
        let err = IamRoleConfig::from_value(&Value::map([("title", Value::string("x"))]))
            .unwrap_err();
        assert_eq!(err.path(), vec!["title"]);
    }

    #[tokio::test]
    async fn get_predefined_role() {
        let cloud = cloud();
        cloud.add_predefined_role(RoleInfo {
            name: "roles/viewer".to_string(),
            title: "Viewer".to_string(),
            description: "Read access".to_string(),
            included_permissions: vec!["storage.buckets.get".to_string()],
            stage: RoleStage::Ga,
            etag: vec![0xab, 0x01],
            deleted: false,
        });
        let handler = IamRoleHandler::new(cloud);

        let role = handler.get(&viewer()).await.unwrap();
        assert_eq!(role.attrs.title, "Viewer");
        assert_eq!(role.attrs.stage, "GA");
        assert_eq!(role.attrs.etag, "ab01");
        assert_eq!(role.attrs.permissions, vec!["storage.buckets.get"]);
    }

    #[tokio::test]
    async fn mutations_are_not_implemented() {
        let handler = IamRoleHandler::new(cloud());
        let err = handler.create(&viewer(), &IamRoleConfig).await.unwrap_err();
        assert!(matches!(err, ProviderError::Unimplemented { .. }));
        let err = handler.delete(&viewer()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Unimplemented { .. }));
    }

    #[test]
    fn attrs_round_trip() {
        let attrs = IamRoleAttrs {
            title: "Viewer".to_string(),
            description: "Read access".to_string(),
            stage: "GA".to_string(),
            etag: "0a0b".to_string(),
            permissions: vec![
                "storage.objects.get".to_string(),
                "storage.objects.list".to_string(),
            ],
        };
        assert_eq!(IamRoleAttrs::from_value(&attrs.to_value()).unwrap(), attrs);
    }
}
