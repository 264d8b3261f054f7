//! API gateway serving one api config

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use carina_core::codec::{DecodeError, FieldReader, FromValue, IdentifierCodec, ToValue};
use carina_core::provider::{ProviderError, ProviderResult, Snapshot, TypedHandler};
use carina_core::resource::Value;
use carina_core::update_mask::UpdateMaskField;
use log::{debug, info};

use super::vendor_field_mask;
use crate::client::{ApiGatewayApi, GatewayInfo, VendorContext};
use crate::config::ProviderConfig;
use crate::identifier::{ApiConfigId, ApiGatewayId, resolve_as};
use crate::operation::wait_for_operation;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiGatewayConfig {
    pub labels: HashMap<String, String>,
    pub display_name: String,
    pub api_config: ApiConfigId,
}

impl ToValue for ApiGatewayConfig {
    fn to_value(&self) -> Value {
        Value::map([
            ("labels", self.labels.to_value()),
            ("display_name", self.display_name.to_value()),
            ("api_config", Value::Identifier(self.api_config.to_identifier())),
        ])
    }
}

impl FromValue for ApiGatewayConfig {
    fn from_value(value: &Value) -> Result<Self, DecodeError> {
        let r = FieldReader::new("api_gateway config", value)?;
        Ok(Self {
            labels: r.get("labels")?,
            display_name: r.get("display_name")?,
            api_config: r.with("api_config", resolve_as)?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiGatewayAttrs {
    pub create: String,
    pub update: String,
    pub state: String,
    pub default_hostname: String,
}

impl ToValue for ApiGatewayAttrs {
    fn to_value(&self) -> Value {
        Value::map([
            ("create", self.create.to_value()),
            ("update", self.update.to_value()),
            ("state", self.state.to_value()),
            ("default_hostname", self.default_hostname.to_value()),
        ])
    }
}

impl FromValue for ApiGatewayAttrs {
    fn from_value(value: &Value) -> Result<Self, DecodeError> {
        let r = FieldReader::new("api_gateway attrs", value)?;
        Ok(Self {
            create: r.get("create")?,
            update: r.get("update")?,
            state: r.get("state")?,
            default_hostname: r.get("default_hostname")?,
        })
    }
}

/// Convert a vendor gateway, parsing the name of the config it serves
fn snapshot(info: GatewayInfo) -> ProviderResult<Snapshot<ApiGatewayConfig, ApiGatewayAttrs>> {
    let api_config = ApiConfigId::parse_full_name(&info.api_config).map_err(|e| {
        ProviderError::decode(
            "api_gateway",
            e.in_field("api_config").in_owner("api_gateway config"),
        )
    })?;

    Ok(Snapshot::new(
        ApiGatewayConfig {
            labels: info.labels,
            display_name: info.display_name,
            api_config,
        },
        ApiGatewayAttrs {
            create: info.create_time,
            update: info.update_time,
            state: info.state,
            default_hostname: info.default_hostname,
        },
    ))
}

pub struct ApiGatewayHandler {
    gateway: Arc<dyn ApiGatewayApi>,
    config: ProviderConfig,
}

impl ApiGatewayHandler {
    pub fn new(gateway: Arc<dyn ApiGatewayApi>, config: ProviderConfig) -> Self {
        Self { gateway, config }
    }

    fn gateway_info(id: &ApiGatewayId, config: &ApiGatewayConfig) -> GatewayInfo {
        GatewayInfo {
            name: id.full_name(),
            display_name: config.display_name.clone(),
            labels: config.labels.clone(),
            api_config: config.api_config.full_name(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl TypedHandler for ApiGatewayHandler {
    type Id = ApiGatewayId;
    type Config = ApiGatewayConfig;
    type Attrs = ApiGatewayAttrs;

    async fn get(
        &self,
        id: &ApiGatewayId,
    ) -> ProviderResult<Snapshot<ApiGatewayConfig, ApiGatewayAttrs>> {
        let name = id.full_name();
        debug!("get gateway {}", name);
        let info = self
            .gateway
            .get_gateway(&name)
            .await
            .context("get gateway", &name)?;
        snapshot(info)
    }

    async fn create(
        &self,
        id: &ApiGatewayId,
        config: &ApiGatewayConfig,
    ) -> ProviderResult<Snapshot<ApiGatewayConfig, ApiGatewayAttrs>> {
        let name = id.full_name();
        let operation = self
            .gateway
            .create_gateway(&id.parent(), &id.gateway_id, Self::gateway_info(id, config))
            .await
            .context("create gateway", &name)?;
        debug!("create gateway {}: operation {}", name, operation.name);
        wait_for_operation(self.gateway.as_ref(), &self.config, &operation, &name).await?;

        info!("created gateway {}", name);
        self.get(id).await
    }

    async fn update(
        &self,
        id: &ApiGatewayId,
        config: &ApiGatewayConfig,
        mask: &[UpdateMaskField],
    ) -> ProviderResult<Snapshot<ApiGatewayConfig, ApiGatewayAttrs>> {
        let name = id.full_name();
        let paths = vendor_field_mask(
            "api_gateway",
            config,
            mask,
            &[
                ("labels", "labels"),
                ("display_name", "display_name"),
                ("api_config", "api_config"),
            ],
        )?;
        if paths.is_empty() {
            return self.get(id).await;
        }

        let operation = self
            .gateway
            .update_gateway(Self::gateway_info(id, config), paths)
            .await
            .context("update gateway", &name)?;
        wait_for_operation(self.gateway.as_ref(), &self.config, &operation, &name).await?;

        info!("updated gateway {}", name);
        self.get(id).await
    }

    async fn delete(&self, id: &ApiGatewayId) -> ProviderResult<()> {
        let name = id.full_name();
        let operation = self
            .gateway
            .delete_gateway(&name)
            .await
            .context("delete gateway", &name)?;
        wait_for_operation(self.gateway.as_ref(), &self.config, &operation, &name).await?;
        info!("deleted gateway {}", name);
        Ok(())
    }
}
