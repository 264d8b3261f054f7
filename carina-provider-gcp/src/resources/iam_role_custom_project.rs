//! Custom IAM role defined in a project
//!
//! Deleting a custom role only marks it deleted; the role stays readable
//! with `deleted` set until the vendor purges it.

use std::sync::Arc;

use async_trait::async_trait;
use carina_core::codec::{DecodeError, FieldReader, FromValue, ToValue};
use carina_core::provider::{ProviderResult, Snapshot, TypedHandler};
use carina_core::resource::Value;
use carina_core::update_mask::UpdateMaskField;
use log::{debug, info};

use super::vendor_field_mask;
use crate::client::{IamAdminApi, RoleInfo, RoleStage, VendorContext};
use crate::iam::format_etag;
use crate::identifier::IamRoleCustomProjectId;

impl ToValue for RoleStage {
    fn to_value(&self) -> Value {
        Value::string(self.as_str())
    }
}

impl FromValue for RoleStage {
    fn from_value(value: &Value) -> Result<Self, DecodeError> {
        let s = value.as_str()?;
        RoleStage::parse(s).ok_or_else(|| {
            DecodeError::invalid(
                s,
                "expected one of ALPHA, BETA, GA, DEPRECATED, DISABLED, EAP",
            )
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomRoleConfig {
    pub title: String,
    pub description: String,
    pub permissions: Vec<String>,
    pub stage: RoleStage,
}

impl ToValue for CustomRoleConfig {
    fn to_value(&self) -> Value {
        Value::map([
            ("title", self.title.to_value()),
            ("description", self.description.to_value()),
            ("permissions", self.permissions.to_value()),
            ("stage", self.stage.to_value()),
        ])
    }
}

impl FromValue for CustomRoleConfig {
    fn from_value(value: &Value) -> Result<Self, DecodeError> {
        let r = FieldReader::new("iam_role_custom_project config", value)?;
        Ok(Self {
            title: r.get("title")?,
            description: r.get("description")?,
            permissions: r.get("permissions")?,
            stage: r.get("stage")?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomRoleAttrs {
    pub deleted: bool,
    pub etag: String,
}

impl ToValue for CustomRoleAttrs {
    fn to_value(&self) -> Value {
        Value::map([
            ("deleted", self.deleted.to_value()),
            ("etag", self.etag.to_value()),
        ])
    }
}

impl FromValue for CustomRoleAttrs {
    fn from_value(value: &Value) -> Result<Self, DecodeError> {
        let r = FieldReader::new("iam_role_custom_project attrs", value)?;
        Ok(Self {
            deleted: r.get("deleted")?,
            etag: r.get("etag")?,
        })
    }
}

fn snapshot(role: RoleInfo) -> Snapshot<CustomRoleConfig, CustomRoleAttrs> {
    Snapshot::new(
        CustomRoleConfig {
            title: role.title,
            description: role.description,
            permissions: role.included_permissions,
            stage: role.stage,
        },
        CustomRoleAttrs {
            deleted: role.deleted,
            etag: format_etag(&role.etag),
        },
    )
}

fn role_info(id: &IamRoleCustomProjectId, config: &CustomRoleConfig) -> RoleInfo {
    RoleInfo {
        name: id.full_name(),
        title: config.title.clone(),
        description: config.description.clone(),
        included_permissions: config.permissions.clone(),
        stage: config.stage,
        ..Default::default()
    }
}

pub struct CustomRoleHandler {
    iam: Arc<dyn IamAdminApi>,
}

impl CustomRoleHandler {
    pub fn new(iam: Arc<dyn IamAdminApi>) -> Self {
        Self { iam }
    }
}

#[async_trait]
impl TypedHandler for CustomRoleHandler {
    type Id = IamRoleCustomProjectId;
    type Config = CustomRoleConfig;
    type Attrs = CustomRoleAttrs;

    async fn get(
        &self,
        id: &IamRoleCustomProjectId,
    ) -> ProviderResult<Snapshot<CustomRoleConfig, CustomRoleAttrs>> {
        let name = id.full_name();
        debug!("get role {}", name);
        let role = self.iam.get_role(&name).await.context("get role", &name)?;
        Ok(snapshot(role))
    }

    async fn create(
        &self,
        id: &IamRoleCustomProjectId,
        config: &CustomRoleConfig,
    ) -> ProviderResult<Snapshot<CustomRoleConfig, CustomRoleAttrs>> {
        let name = id.full_name();
        let role = self
            .iam
            .create_role(
                &format!("projects/{}", id.project),
                &id.name,
                role_info(id, config),
            )
            .await
            .context("create role", &name)?;
        info!("created role {}", name);
        Ok(snapshot(role))
    }

    async fn update(
        &self,
        id: &IamRoleCustomProjectId,
        config: &CustomRoleConfig,
        mask: &[UpdateMaskField],
    ) -> ProviderResult<Snapshot<CustomRoleConfig, CustomRoleAttrs>> {
        let name = id.full_name();
        let paths = vendor_field_mask(
            "iam_role_custom_project",
            config,
            mask,
            &[
                ("title", "title"),
                ("description", "description"),
                ("stage", "stage"),
                ("permissions", "included_permissions"),
            ],
        )?;
        if paths.is_empty() {
            return self.get(id).await;
        }

        let role = self
            .iam
            .update_role(&name, role_info(id, config), paths)
            .await
            .context("update role", &name)?;
        info!("updated role {}", name);
        Ok(snapshot(role))
    }

    async fn delete(&self, id: &IamRoleCustomProjectId) -> ProviderResult<()> {
        let name = id.full_name();
        self.iam
            .delete_role(&name)
            .await
            .context("delete role", &name)?;
        info!("deleted role {}", name);
        Ok(())
    }
}
