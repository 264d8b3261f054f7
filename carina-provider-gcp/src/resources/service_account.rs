//! Service account

use std::sync::Arc;

use async_trait::async_trait;
use carina_core::codec::{DecodeError, FieldReader, FromValue, ToValue};
use carina_core::provider::{ProviderResult, Snapshot, TypedHandler};
use carina_core::resource::Value;
use carina_core::update_mask::UpdateMaskField;
use log::{debug, info};

use super::vendor_field_mask;
use crate::client::{IamAdminApi, ServiceAccountInfo, VendorContext};
use crate::identifier::ServiceAccountId;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceAccountConfig {
    pub display_name: String,
    pub description: String,
}

impl ToValue for ServiceAccountConfig {
    fn to_value(&self) -> Value {
        Value::map([
            ("display_name", self.display_name.to_value()),
            ("description", self.description.to_value()),
        ])
    }
}

impl FromValue for ServiceAccountConfig {
    fn from_value(value: &Value) -> Result<Self, DecodeError> {
        let r = FieldReader::new("service_account config", value)?;
        Ok(Self {
            display_name: r.get("display_name")?,
            description: r.get("description")?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceAccountAttrs {
    pub unique_id: String,
    pub disabled: bool,
}

impl ToValue for ServiceAccountAttrs {
    fn to_value(&self) -> Value {
        Value::map([
            ("unique_id", self.unique_id.to_value()),
            ("disabled", self.disabled.to_value()),
        ])
    }
}

impl FromValue for ServiceAccountAttrs {
    fn from_value(value: &Value) -> Result<Self, DecodeError> {
        let r = FieldReader::new("service_account attrs", value)?;
        Ok(Self {
            unique_id: r.get("unique_id")?,
            disabled: r.get("disabled")?,
        })
    }
}

fn snapshot(info: ServiceAccountInfo) -> Snapshot<ServiceAccountConfig, ServiceAccountAttrs> {
    Snapshot::new(
        ServiceAccountConfig {
            display_name: info.display_name,
            description: info.description,
        },
        ServiceAccountAttrs {
            unique_id: info.unique_id,
            disabled: info.disabled,
        },
    )
}

pub struct ServiceAccountHandler {
    iam: Arc<dyn IamAdminApi>,
}

impl ServiceAccountHandler {
    pub fn new(iam: Arc<dyn IamAdminApi>) -> Self {
        Self { iam }
    }
}

#[async_trait]
impl TypedHandler for ServiceAccountHandler {
    type Id = ServiceAccountId;
    type Config = ServiceAccountConfig;
    type Attrs = ServiceAccountAttrs;

    async fn get(
        &self,
        id: &ServiceAccountId,
    ) -> ProviderResult<Snapshot<ServiceAccountConfig, ServiceAccountAttrs>> {
        let name = id.full_name();
        debug!("get service account {}", name);
        let info = self
            .iam
            .get_service_account(&name)
            .await
            .context("get service account", &name)?;
        Ok(snapshot(info))
    }

    async fn create(
        &self,
        id: &ServiceAccountId,
        config: &ServiceAccountConfig,
    ) -> ProviderResult<Snapshot<ServiceAccountConfig, ServiceAccountAttrs>> {
        let name = id.full_name();
        let info = self
            .iam
            .create_service_account(
                &format!("projects/{}", id.project),
                &id.account_id,
                ServiceAccountInfo {
                    display_name: config.display_name.clone(),
                    description: config.description.clone(),
                    ..Default::default()
                },
            )
            .await
            .context("create service account", &name)?;
        info!("created service account {}", id.email());
        Ok(snapshot(info))
    }

    async fn update(
        &self,
        id: &ServiceAccountId,
        config: &ServiceAccountConfig,
        mask: &[UpdateMaskField],
    ) -> ProviderResult<Snapshot<ServiceAccountConfig, ServiceAccountAttrs>> {
        let name = id.full_name();
        let paths = vendor_field_mask(
            "service_account",
            config,
            mask,
            &[
                ("display_name", "display_name"),
                ("description", "description"),
            ],
        )?;
        if paths.is_empty() {
            return self.get(id).await;
        }

        let info = self
            .iam
            .update_service_account(
                ServiceAccountInfo {
                    name: name.clone(),
                    display_name: config.display_name.clone(),
                    description: config.description.clone(),
                    ..Default::default()
                },
                paths,
            )
            .await
            .context("update service account", &name)?;
        info!("updated service account {}", id.email());
        Ok(snapshot(info))
    }

    async fn delete(&self, id: &ServiceAccountId) -> ProviderResult<()> {
        let name = id.full_name();
        self.iam
            .delete_service_account(&name)
            .await
            .context("delete service account", &name)?;
        info!("deleted service account {}", id.email());
        Ok(())
    }
}
