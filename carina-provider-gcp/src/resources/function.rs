//! Cloud function
//!
//! Source is uploaded to a location reserved by the functions API before the
//! function is created or its build config updated. The checksum reported
//! back is the digest of the uploaded source object.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use carina_core::codec::{DecodeError, FieldReader, FromValue, ToValue};
use carina_core::provider::{ProviderError, ProviderResult, Snapshot, TypedHandler};
use carina_core::resource::{FileRef, Value};
use carina_core::update_mask::UpdateMaskField;
use log::{debug, info};

use super::{read_file, vendor_field_mask};
use crate::client::{
    FunctionInfo, FunctionsApi, StorageApi, StorageSource, VendorContext, VendorError,
};
use crate::config::ProviderConfig;
use crate::identifier::FunctionId;
use crate::operation::wait_for_operation;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildConfig {
    pub runtime: String,
    pub entrypoint: String,
    pub source: FileRef,
}

impl ToValue for BuildConfig {
    fn to_value(&self) -> Value {
        Value::map([
            ("runtime", self.runtime.to_value()),
            ("entrypoint", self.entrypoint.to_value()),
            ("source", self.source.to_value()),
        ])
    }
}

impl FromValue for BuildConfig {
    fn from_value(value: &Value) -> Result<Self, DecodeError> {
        let r = FieldReader::new("build config", value)?;
        Ok(Self {
            runtime: r.get("runtime")?,
            entrypoint: r.get("entrypoint")?,
            source: r.get("source")?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionConfig {
    pub description: String,
    pub labels: HashMap<String, String>,
    pub build_config: BuildConfig,
}

impl ToValue for FunctionConfig {
    fn to_value(&self) -> Value {
        Value::map([
            ("description", self.description.to_value()),
            ("labels", self.labels.to_value()),
            ("build_config", self.build_config.to_value()),
        ])
    }
}

impl FromValue for FunctionConfig {
    fn from_value(value: &Value) -> Result<Self, DecodeError> {
        let r = FieldReader::new("function config", value)?;
        Ok(Self {
            description: r.get("description")?,
            labels: r.get("labels")?,
            build_config: r.get("build_config")?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionAttrs {
    pub url: String,
}

impl ToValue for FunctionAttrs {
    fn to_value(&self) -> Value {
        Value::map([("url", self.url.to_value())])
    }
}

impl FromValue for FunctionAttrs {
    fn from_value(value: &Value) -> Result<Self, DecodeError> {
        let r = FieldReader::new("function attrs", value)?;
        Ok(Self { url: r.get("url")? })
    }
}

const MASK_PATHS: &[(&str, &str)] = &[
    ("description", "description"),
    ("labels", "labels"),
    ("build_config", "build_config"),
];

pub struct FunctionHandler {
    functions: Arc<dyn FunctionsApi>,
    storage: Arc<dyn StorageApi>,
    config: ProviderConfig,
}

impl FunctionHandler {
    pub fn new(
        functions: Arc<dyn FunctionsApi>,
        storage: Arc<dyn StorageApi>,
        config: ProviderConfig,
    ) -> Self {
        Self {
            functions,
            storage,
            config,
        }
    }

    /// Upload function source to a freshly reserved location
    async fn upload_source(&self, id: &FunctionId, source: &FileRef) -> ProviderResult<StorageSource> {
        let data = read_file(source).await?;
        let location = self
            .functions
            .generate_upload_url(&id.parent())
            .await
            .context("generate upload url", &id.full_name())?;

        debug!(
            "upload {} bytes of source to gs://{}/{}",
            data.len(),
            location.bucket,
            location.object
        );
        self.storage
            .put_object(&location.bucket, &location.object, data)
            .await
            .context("upload source", &id.full_name())?;
        Ok(location)
    }

    fn function_info(id: &FunctionId, config: &FunctionConfig, source: StorageSource) -> FunctionInfo {
        FunctionInfo {
            name: id.full_name(),
            description: config.description.clone(),
            labels: config.labels.clone(),
            runtime: config.build_config.runtime.clone(),
            entry_point: config.build_config.entrypoint.clone(),
            source,
            ..Default::default()
        }
    }

    /// Convert a vendor function, looking up the checksum of its source
    async fn snapshot(
        &self,
        info: FunctionInfo,
    ) -> ProviderResult<Snapshot<FunctionConfig, FunctionAttrs>> {
        // A missing source object must not read as a missing function
        let object = self
            .storage
            .get_object(&info.source.bucket, &info.source.object)
            .await
            .map_err(|e| match e {
                VendorError::NotFound => ProviderError::Vendor {
                    operation: "get function source".to_string(),
                    resource: info.name.clone(),
                    message: format!(
                        "source object gs://{}/{} is missing",
                        info.source.bucket, info.source.object
                    ),
                    cause: Box::new(VendorError::NotFound),
                },
                other => other.into_provider("get function source", &info.name),
            })?;

        Ok(Snapshot::new(
            FunctionConfig {
                description: info.description,
                labels: info.labels,
                build_config: BuildConfig {
                    runtime: info.runtime,
                    entrypoint: info.entry_point,
                    source: FileRef::with_checksum(object.sha256),
                },
            },
            FunctionAttrs { url: info.url },
        ))
    }
}

#[async_trait]
impl TypedHandler for FunctionHandler {
    type Id = FunctionId;
    type Config = FunctionConfig;
    type Attrs = FunctionAttrs;

    async fn get(&self, id: &FunctionId) -> ProviderResult<Snapshot<FunctionConfig, FunctionAttrs>> {
        let name = id.full_name();
        debug!("get function {}", name);
        let info = self
            .functions
            .get_function(&name)
            .await
            .context("get function", &name)?;
        self.snapshot(info).await
    }

    async fn create(
        &self,
        id: &FunctionId,
        config: &FunctionConfig,
    ) -> ProviderResult<Snapshot<FunctionConfig, FunctionAttrs>> {
        let name = id.full_name();
        let source = self.upload_source(id, &config.build_config.source).await?;

        let operation = self
            .functions
            .create_function(&id.parent(), &id.name, Self::function_info(id, config, source))
            .await
            .context("create function", &name)?;
        debug!("create function {}: operation {}", name, operation.name);
        wait_for_operation(self.functions.as_ref(), &self.config, &operation, &name).await?;

        info!("created function {}", name);
        self.get(id).await
    }

    async fn update(
        &self,
        id: &FunctionId,
        config: &FunctionConfig,
        mask: &[UpdateMaskField],
    ) -> ProviderResult<Snapshot<FunctionConfig, FunctionAttrs>> {
        let name = id.full_name();
        let paths = vendor_field_mask("function", config, mask, MASK_PATHS)?;
        if paths.is_empty() {
            return self.get(id).await;
        }

        let source = if paths.iter().any(|p| p == "build_config") {
            self.upload_source(id, &config.build_config.source).await?
        } else {
            StorageSource::default()
        };

        let operation = self
            .functions
            .update_function(Self::function_info(id, config, source), paths)
            .await
            .context("update function", &name)?;
        debug!("update function {}: operation {}", name, operation.name);
        wait_for_operation(self.functions.as_ref(), &self.config, &operation, &name).await?;

        info!("updated function {}", name);
        self.get(id).await
    }

    async fn delete(&self, id: &FunctionId) -> ProviderResult<()> {
        let name = id.full_name();
        let operation = self
            .functions
            .delete_function(&name)
            .await
            .context("delete function", &name)?;
        wait_for_operation(self.functions.as_ref(), &self.config, &operation, &name).await?;
        info!("deleted function {}", name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalCloud;
    use crate::resources::checksum;
    use crate::resources::test_support::{cloud, fast_config, write_temp};

    fn id() -> FunctionId {
        FunctionId {
            project: "p1".to_string(),
            location: "us-central1".to_string(),
            name: "hello".to_string(),
        }
    }

    fn config(source: &str) -> FunctionConfig {
        FunctionConfig {
            description: "says hello".to_string(),
            labels: HashMap::from([("team".to_string(), "web".to_string())]),
            build_config: BuildConfig {
                runtime: "go121".to_string(),
                entrypoint: "Hello".to_string(),
                source: FileRef::new(source, ""),
            },
        }
    }

    fn handler(cloud: Arc<LocalCloud>) -> FunctionHandler {
        FunctionHandler::new(cloud.clone(), cloud, fast_config())
    }

    #[test]
    fn build_config_missing_source_names_field() {
        let value = Value::map([
            ("description", Value::string("d")),
            ("labels", Value::map(Vec::<(String, Value)>::new())),
            (
                "build_config",
                Value::map([
                    ("runtime", Value::string("go121")),
                    ("entrypoint", Value::string("Hello")),
                ]),
            ),
        ]);
        let err = FunctionConfig::from_value(&value).unwrap_err();
        assert_eq!(err.path(), vec!["build_config", "source"]);
    }

    #[tokio::test]
    async fn create_uploads_source_and_waits() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_temp(&dir, "src.zip", b"package main");
        let handler = handler(Arc::new(LocalCloud::new().with_operation_polls(2)));

        let created = handler.create(&id(), &config(&source)).await.unwrap();
        assert_eq!(created.config.description, "says hello");
        assert_eq!(created.config.build_config.runtime, "go121");
        assert_eq!(
            created.config.build_config.source.checksum,
            checksum(b"package main")
        );
        assert!(created.attrs.url.contains("hello"));
    }

    #[tokio::test]
    async fn update_description_keeps_source() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_temp(&dir, "src.zip", b"v1");
        let handler = handler(cloud());
        handler.create(&id(), &config(&source)).await.unwrap();

        std::fs::write(&source, b"v2").unwrap();
        let mut desired = config(&source);
        desired.description = "says hi".to_string();
        let updated = handler
            .update(&id(), &desired, &[UpdateMaskField::set("description")])
            .await
            .unwrap();
        assert_eq!(updated.config.description, "says hi");
        assert_eq!(updated.config.build_config.source.checksum, checksum(b"v1"));

        let rebuilt = handler
            .update(&id(), &desired, &[UpdateMaskField::set("build_config")])
            .await
            .unwrap();
        assert_eq!(rebuilt.config.build_config.source.checksum, checksum(b"v2"));
    }

    #[tokio::test]
    async fn failed_build_surfaces_vendor_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_temp(&dir, "src.zip", b"broken");
        let cloud = cloud();
        cloud.fail_next_operation("build failed: syntax error");
        let handler = handler(cloud);

        let err = handler.create(&id(), &config(&source)).await.unwrap_err();
        assert!(matches!(err, ProviderError::Vendor { .. }));
        assert!(err.to_string().contains("syntax error"));
    }

    #[tokio::test]
    async fn missing_source_object_is_not_a_missing_function() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_temp(&dir, "src.zip", b"x");
        let cloud = cloud();
        let handler = handler(cloud.clone());
        handler.create(&id(), &config(&source)).await.unwrap();

        let stored = cloud.get_function(&id().full_name()).await.unwrap().source;
        cloud
            .delete_object(&stored.bucket, &stored.object)
            .await
            .unwrap();

        let err = handler.get(&id()).await.unwrap_err();
        assert!(!err.is_not_found());
        assert!(matches!(err, ProviderError::Vendor { .. }));
        assert!(err.to_string().contains("is missing"));
    }

    #[tokio::test]
    async fn delete_then_get_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_temp(&dir, "src.zip", b"x");
        let handler = handler(cloud());
        handler.create(&id(), &config(&source)).await.unwrap();
        handler.delete(&id()).await.unwrap();
        assert!(handler.get(&id()).await.unwrap_err().is_not_found());
    }

    #[test]
    fn config_round_trip() {
        let config = config("src.zip");
        assert_eq!(FunctionConfig::from_value(&config.to_value()).unwrap(), config);
        assert_eq!(
            BuildConfig::from_value(&config.build_config.to_value()).unwrap(),
            config.build_config
        );
    }

    #[test]
    fn attrs_round_trip() {
        let attrs = FunctionAttrs {
            url: "https://us-central1-p1.cloudfunctions.net/hello".to_string(),
        };
        assert_eq!(FunctionAttrs::from_value(&attrs.to_value()).unwrap(), attrs);
    }
}
