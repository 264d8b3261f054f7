//! API config: the OpenAPI documents served for an API

use std::sync::Arc;

use async_trait::async_trait;
use carina_core::codec::{DecodeError, FieldReader, FromValue, ToValue};
use carina_core::provider::{ProviderResult, Snapshot, TypedHandler};
use carina_core::resource::{FileRef, Value};
use carina_core::update_mask::UpdateMaskField;
use log::{debug, info};

use super::{checksum, read_file, vendor_field_mask};
use crate::client::{ApiConfigInfo, ApiGatewayApi, OpenApiDocument, VendorContext};
use crate::config::ProviderConfig;
use crate::identifier::ApiConfigId;
use crate::operation::wait_for_operation;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiConfigConfig {
    pub display_name: String,
    pub open_api_documents: Vec<FileRef>,
}

impl ToValue for ApiConfigConfig {
    fn to_value(&self) -> Value {
        Value::map([
            ("display_name", self.display_name.to_value()),
            ("open_api_documents", self.open_api_documents.to_value()),
        ])
    }
}

impl FromValue for ApiConfigConfig {
    fn from_value(value: &Value) -> Result<Self, DecodeError> {
        let r = FieldReader::new("api_config config", value)?;
        Ok(Self {
            display_name: r.get("display_name")?,
            open_api_documents: r.get("open_api_documents")?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiConfigAttrs {
    pub create: String,
    pub update: String,
    pub state: String,
}

impl ToValue for ApiConfigAttrs {
    fn to_value(&self) -> Value {
        Value::map([
            ("create", self.create.to_value()),
            ("update", self.update.to_value()),
            ("state", self.state.to_value()),
        ])
    }
}

impl FromValue for ApiConfigAttrs {
    fn from_value(value: &Value) -> Result<Self, DecodeError> {
        let r = FieldReader::new("api_config attrs", value)?;
        Ok(Self {
            create: r.get("create")?,
            update: r.get("update")?,
            state: r.get("state")?,
        })
    }
}

fn snapshot(info: ApiConfigInfo) -> Snapshot<ApiConfigConfig, ApiConfigAttrs> {
    let open_api_documents = info
        .openapi_documents
        .iter()
        .map(|doc| FileRef::new(&doc.path, checksum(&doc.contents)))
        .collect();

    Snapshot::new(
        ApiConfigConfig {
            display_name: info.display_name,
            open_api_documents,
        },
        ApiConfigAttrs {
            create: info.create_time,
            update: info.update_time,
            state: info.state,
        },
    )
}

pub struct ApiConfigHandler {
    gateway: Arc<dyn ApiGatewayApi>,
    config: ProviderConfig,
}

impl ApiConfigHandler {
    pub fn new(gateway: Arc<dyn ApiGatewayApi>, config: ProviderConfig) -> Self {
        Self { gateway, config }
    }

    /// Read every document named by the config, in order
    async fn config_info(
        id: &ApiConfigId,
        config: &ApiConfigConfig,
        with_documents: bool,
    ) -> ProviderResult<ApiConfigInfo> {
        let mut openapi_documents = Vec::new();
        if with_documents {
            for file in &config.open_api_documents {
                openapi_documents.push(OpenApiDocument {
                    path: file.path.clone(),
                    contents: read_file(file).await?,
                });
            }
        }

        Ok(ApiConfigInfo {
            name: id.full_name(),
            display_name: config.display_name.clone(),
            openapi_documents,
            ..Default::default()
        })
    }
}

#[async_trait]
impl TypedHandler for ApiConfigHandler {
    type Id = ApiConfigId;
    type Config = ApiConfigConfig;
    type Attrs = ApiConfigAttrs;

    async fn get(
        &self,
        id: &ApiConfigId,
    ) -> ProviderResult<Snapshot<ApiConfigConfig, ApiConfigAttrs>> {
        let name = id.full_name();
        debug!("get api config {}", name);
        let info = self
            .gateway
            .get_api_config(&name)
            .await
            .context("get api config", &name)?;
        Ok(snapshot(info))
    }

    async fn create(
        &self,
        id: &ApiConfigId,
        config: &ApiConfigConfig,
    ) -> ProviderResult<Snapshot<ApiConfigConfig, ApiConfigAttrs>> {
        let name = id.full_name();
        let info = Self::config_info(id, config, true).await?;
        let operation = self
            .gateway
            .create_api_config(&id.api.full_name(), &id.api_config_id, info)
            .await
            .context("create api config", &name)?;
        debug!("create api config {}: operation {}", name, operation.name);
        wait_for_operation(self.gateway.as_ref(), &self.config, &operation, &name).await?;

        info!("created api config {}", name);
        self.get(id).await
    }

    async fn update(
        &self,
        id: &ApiConfigId,
        config: &ApiConfigConfig,
        mask: &[UpdateMaskField],
    ) -> ProviderResult<Snapshot<ApiConfigConfig, ApiConfigAttrs>> {
        let name = id.full_name();
        let paths = vendor_field_mask(
            "api_config",
            config,
            mask,
            &[
                ("display_name", "display_name"),
                ("open_api_documents", "openapi_documents"),
            ],
        )?;
        if paths.is_empty() {
            return self.get(id).await;
        }

        let with_documents = paths.iter().any(|p| p == "openapi_documents");
        let info = Self::config_info(id, config, with_documents).await?;
        let operation = self
            .gateway
            .update_api_config(info, paths)
            .await
            .context("update api config", &name)?;
        wait_for_operation(self.gateway.as_ref(), &self.config, &operation, &name).await?;

        info!("updated api config {}", name);
        self.get(id).await
    }

    async fn delete(&self, id: &ApiConfigId) -> ProviderResult<()> {
        let name = id.full_name();
        let operation = self
            .gateway
            .delete_api_config(&name)
            .await
            .context("delete api config", &name)?;
        wait_for_operation(self.gateway.as_ref(), &self.config, &operation, &name).await?;
        info!("deleted api config {}", name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::ApiId;
    use crate::resources::test_support::{cloud, fast_config, write_temp};

    fn id() -> ApiConfigId {
        ApiConfigId {
            api: ApiId {
                project: "p1".to_string(),
                api_id: "orders".to_string(),
            },
            api_config_id: "v1".to_string(),
        }
    }

    #[test]
    fn config_rejects_non_file_document() {
        let value = Value::map([
            ("display_name", Value::string("v1")),
            (
                "open_api_documents",
                Value::List(vec![
                    Value::File(FileRef::new("a.yaml", "")),
                    Value::string("b.yaml"),
                ]),
            ),
        ]);
        let err = ApiConfigConfig::from_value(&value).unwrap_err();
        assert_eq!(err.path(), vec!["open_api_documents", "1"]);
    }

    #[tokio::test]
    async fn create_reports_document_checksums_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let first = write_temp(&dir, "a.yaml", b"openapi: 3.0.0");
        let second = write_temp(&dir, "b.yaml", b"paths: {}");
        let handler = ApiConfigHandler::new(cloud(), fast_config());

        let config = ApiConfigConfig {
            display_name: "v1".to_string(),
            open_api_documents: vec![FileRef::new(&first, ""), FileRef::new(&second, "")],
        };
        let created = handler.create(&id(), &config).await.unwrap();

        let docs = &created.config.open_api_documents;
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0], FileRef::new(&first, checksum(b"openapi: 3.0.0")));
        assert_eq!(docs[1], FileRef::new(&second, checksum(b"paths: {}")));
    }

    #[tokio::test]
    async fn display_name_update_leaves_documents() {
        let dir = tempfile::tempdir().unwrap();
        let doc = write_temp(&dir, "a.yaml", b"v1");
        let handler = ApiConfigHandler::new(cloud(), fast_config());
        let mut config = ApiConfigConfig {
            display_name: "first".to_string(),
            open_api_documents: vec![FileRef::new(&doc, "")],
        };
        handler.create(&id(), &config).await.unwrap();

        std::fs::write(&doc, b"v2").unwrap();
        config.display_name = "second".to_string();
        let updated = handler
            .update(&id(), &config, &[UpdateMaskField::set("display_name")])
            .await
            .unwrap();
        assert_eq!(updated.config.display_name, "second");
        assert_eq!(updated.config.open_api_documents[0].checksum, checksum(b"v1"));
    }

    #[test]
    fn config_round_trip_keeps_document_order() {
        let config = ApiConfigConfig {
            display_name: "Orders v1".to_string(),
            open_api_documents: vec![
                FileRef::new("openapi.yaml", "aa01"),
                FileRef::new("paths.yaml", "bb02"),
            ],
        };
        assert_eq!(ApiConfigConfig::from_value(&config.to_value()).unwrap(), config);
    }

    #[test]
    fn attrs_round_trip() {
        let attrs = ApiConfigAttrs {
            create: "2024-01-01T00:00:00Z".to_string(),
            update: "2024-01-02T00:00:00Z".to_string(),
            state: "ACTIVE".to_string(),
        };
        assert_eq!(ApiConfigAttrs::from_value(&attrs.to_value()).unwrap(), attrs);
    }

    #[test]
    fn document_that_is_not_a_file_names_its_index() {
        let value = Value::map([
            ("display_name", Value::string("Orders")),
            (
                "open_api_documents",
                Value::List(vec![
                    Value::File(FileRef::new("openapi.yaml", "")),
                    Value::string("paths.yaml"),
                ]),
            ),
        ]);
        let err = ApiConfigConfig::from_value(&value).unwrap_err();
        assert_eq!(err.path(), vec!["open_api_documents", "1"]);
    }
}
