//! API managed by the API gateway service

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use carina_core::codec::{DecodeError, FieldReader, FromValue, ToValue};
use carina_core::provider::{ProviderResult, Snapshot, TypedHandler};
use carina_core::resource::Value;
use carina_core::update_mask::UpdateMaskField;
use log::{debug, info};

use super::vendor_field_mask;
use crate::client::{ApiGatewayApi, ApiInfo, VendorContext};
use crate::config::ProviderConfig;
use crate::identifier::ApiId;
use crate::operation::wait_for_operation;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiConfig {
    pub display_name: String,
    pub labels: HashMap<String, String>,
}

impl ToValue for ApiConfig {
    fn to_value(&self) -> Value {
        Value::map([
            ("display_name", self.display_name.to_value()),
            ("labels", self.labels.to_value()),
        ])
    }
}

impl FromValue for ApiConfig {
    fn from_value(value: &Value) -> Result<Self, DecodeError> {
        let r = FieldReader::new("api config", value)?;
        Ok(Self {
            display_name: r.get("display_name")?,
            labels: r.get("labels")?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiAttrs {
    pub create: String,
    pub update: String,
    pub state: String,
}

impl ToValue for ApiAttrs {
    fn to_value(&self) -> Value {
        Value::map([
            ("create", self.create.to_value()),
            ("update", self.update.to_value()),
            ("state", self.state.to_value()),
        ])
    }
}

impl FromValue for ApiAttrs {
    fn from_value(value: &Value) -> Result<Self, DecodeError> {
        let r = FieldReader::new("api attrs", value)?;
        Ok(Self {
            create: r.get("create")?,
            update: r.get("update")?,
            state: r.get("state")?,
        })
    }
}

fn snapshot(info: ApiInfo) -> Snapshot<ApiConfig, ApiAttrs> {
    Snapshot::new(
        ApiConfig {
            display_name: info.display_name,
            labels: info.labels,
        },
        ApiAttrs {
            create: info.create_time,
            update: info.update_time,
            state: info.state,
        },
    )
}

pub struct ApiHandler {
    gateway: Arc<dyn ApiGatewayApi>,
    config: ProviderConfig,
}

impl ApiHandler {
    pub fn new(gateway: Arc<dyn ApiGatewayApi>, config: ProviderConfig) -> Self {
        Self { gateway, config }
    }

    fn api_info(id: &ApiId, config: &ApiConfig) -> ApiInfo {
        ApiInfo {
            name: id.full_name(),
            display_name: config.display_name.clone(),
            labels: config.labels.clone(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl TypedHandler for ApiHandler {
    type Id = ApiId;
    type Config = ApiConfig;
    type Attrs = ApiAttrs;

    async fn get(&self, id: &ApiId) -> ProviderResult<Snapshot<ApiConfig, ApiAttrs>> {
        let name = id.full_name();
        debug!("get api {}", name);
        let info = self.gateway.get_api(&name).await.context("get api", &name)?;
        Ok(snapshot(info))
    }

    async fn create(
        &self,
        id: &ApiId,
        config: &ApiConfig,
    ) -> ProviderResult<Snapshot<ApiConfig, ApiAttrs>> {
        let name = id.full_name();
        let parent = format!("projects/{}/locations/global", id.project);
        let operation = self
            .gateway
            .create_api(&parent, &id.api_id, Self::api_info(id, config))
            .await
            .context("create api", &name)?;
        debug!("create api {}: operation {}", name, operation.name);
        wait_for_operation(self.gateway.as_ref(), &self.config, &operation, &name).await?;

        info!("created api {}", name);
        self.get(id).await
    }

    async fn update(
        &self,
        id: &ApiId,
        config: &ApiConfig,
        mask: &[UpdateMaskField],
    ) -> ProviderResult<Snapshot<ApiConfig, ApiAttrs>> {
        let name = id.full_name();
        let paths = vendor_field_mask(
            "api",
            config,
            mask,
            &[("display_name", "display_name"), ("labels", "labels")],
        )?;
        if paths.is_empty() {
            return self.get(id).await;
        }

        let operation = self
            .gateway
            .update_api(Self::api_info(id, config), paths)
            .await
            .context("update api", &name)?;
        wait_for_operation(self.gateway.as_ref(), &self.config, &operation, &name).await?;

        info!("updated api {}", name);
        self.get(id).await
    }

    async fn delete(&self, id: &ApiId) -> ProviderResult<()> {
        let name = id.full_name();
        let operation = self
            .gateway
            .delete_api(&name)
            .await
            .context("delete api", &name)?;
        wait_for_operation(self.gateway.as_ref(), &self.config, &operation, &name).await?;
        info!("deleted api {}", name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use carina_core::provider::ProviderError;

    use super::*;
    use crate::resources::test_support::{cloud, fast_config};

    fn id() -> ApiId {
        ApiId {
            project: "p1".to_string(),
            api_id: "orders".to_string(),
        }
    }

    fn config() -> ApiConfig {
        ApiConfig {
            display_name: "Orders".to_string(),
            labels: HashMap::from([("team".to_string(), "shop".to_string())]),
        }
    }

    #[tokio::test]
    async fn create_passes_api_id_and_waits() {
        let handler = ApiHandler::new(cloud(), fast_config());
        let created = handler.create(&id(), &config()).await.unwrap();
        assert_eq!(created.config, config());
        assert_eq!(created.attrs.state, "ACTIVE");
        assert!(!created.attrs.create.is_empty());

        // fetched under the id it was created with
        assert_eq!(handler.get(&id()).await.unwrap(), created);
    }

    #[tokio::test]
    async fn update_labels_only() {
        let handler = ApiHandler::new(cloud(), fast_config());
        handler.create(&id(), &config()).await.unwrap();

        let desired = ApiConfig {
            display_name: "not applied".to_string(),
            labels: HashMap::new(),
        };
        let updated = handler
            .update(&id(), &desired, &[UpdateMaskField::set("labels")])
            .await
            .unwrap();
        assert_eq!(updated.config.display_name, "Orders");
        assert!(updated.config.labels.is_empty());
    }

    #[tokio::test]
    async fn cancelled_operation_is_reported() {
        let cloud = cloud();
        cloud.cancel_next_operation();
        let handler = ApiHandler::new(cloud, fast_config());
        let err = handler.create(&id(), &config()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Cancelled { .. }));
    }

    #[tokio::test]
    async fn delete_then_get_is_not_found() {
        let handler = ApiHandler::new(cloud(), fast_config());
        handler.create(&id(), &config()).await.unwrap();
        handler.delete(&id()).await.unwrap();
        assert!(handler.get(&id()).await.unwrap_err().is_not_found());
    }

    #[test]
    fn attrs_missing_state() {
        let value = Value::map([
            ("create", Value::string("t0")),
            ("update", Value::string("t1")),
        ]);
        let err = ApiAttrs::from_value(&value).unwrap_err();
        assert_eq!(err.to_string(), "error parsing api attrs: field 'state' is missing");
    }

    #[test]
    fn config_and_attrs_round_trip() {
        let config = ApiConfig {
            display_name: "Orders".to_string(),
            labels: HashMap::from([("team".to_string(), "web".to_string())]),
        };
        assert_eq!(ApiConfig::from_value(&config.to_value()).unwrap(), config);

        let attrs = ApiAttrs {
            create: "2024-01-01T00:00:00Z".to_string(),
            update: "2024-01-02T00:00:00Z".to_string(),
            state: "ACTIVE".to_string(),
        };
        assert_eq!(ApiAttrs::from_value(&attrs.to_value()).unwrap(), attrs);
    }
}
