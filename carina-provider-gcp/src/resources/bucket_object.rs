//! Object stored in a bucket

use std::sync::Arc;

use async_trait::async_trait;
use carina_core::codec::{DecodeError, FieldReader, FromValue, ToValue};
use carina_core::provider::{ProviderResult, Snapshot, TypedHandler};
use carina_core::resource::{FileRef, Value};
use carina_core::update_mask::UpdateMaskField;
use log::{debug, info};

use super::{read_file, vendor_field_mask};
use crate::client::{ObjectInfo, StorageApi, VendorContext};
use crate::identifier::BucketObjectId;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BucketObjectConfig {
    pub contents: FileRef,
}

impl ToValue for BucketObjectConfig {
    fn to_value(&self) -> Value {
        Value::map([("contents", self.contents.to_value())])
    }
}

impl FromValue for BucketObjectConfig {
    fn from_value(value: &Value) -> Result<Self, DecodeError> {
        let r = FieldReader::new("bucket_object config", value)?;
        Ok(Self {
            contents: r.get("contents")?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BucketObjectAttrs {
    pub created: String,
}

impl ToValue for BucketObjectAttrs {
    fn to_value(&self) -> Value {
        Value::map([("created", self.created.to_value())])
    }
}

impl FromValue for BucketObjectAttrs {
    fn from_value(value: &Value) -> Result<Self, DecodeError> {
        let r = FieldReader::new("bucket_object attrs", value)?;
        Ok(Self {
            created: r.get("created")?,
        })
    }
}

fn snapshot(info: ObjectInfo) -> Snapshot<BucketObjectConfig, BucketObjectAttrs> {
    Snapshot::new(
        BucketObjectConfig {
            contents: FileRef::with_checksum(info.sha256),
        },
        BucketObjectAttrs {
            created: info.created,
        },
    )
}

fn object_path(id: &BucketObjectId) -> String {
    format!("gs://{}/{}", id.bucket.name, id.name)
}

pub struct BucketObjectHandler {
    storage: Arc<dyn StorageApi>,
}

impl BucketObjectHandler {
    pub fn new(storage: Arc<dyn StorageApi>) -> Self {
        Self { storage }
    }

    async fn upload(
        &self,
        id: &BucketObjectId,
        contents: &FileRef,
    ) -> ProviderResult<Snapshot<BucketObjectConfig, BucketObjectAttrs>> {
        let data = read_file(contents).await?;
        debug!("upload {} bytes to {}", data.len(), object_path(id));
        let info = self
            .storage
            .put_object(&id.bucket.name, &id.name, data)
            .await
            .context("put object", &object_path(id))?;
        Ok(snapshot(info))
    }
}

#[async_trait]
impl TypedHandler for BucketObjectHandler {
    type Id = BucketObjectId;
    type Config = BucketObjectConfig;
    type Attrs = BucketObjectAttrs;

    async fn get(
        &self,
        id: &BucketObjectId,
    ) -> ProviderResult<Snapshot<BucketObjectConfig, BucketObjectAttrs>> {
        let info = self
            .storage
            .get_object(&id.bucket.name, &id.name)
            .await
            .context("get object", &object_path(id))?;
        Ok(snapshot(info))
    }

    async fn create(
        &self,
        id: &BucketObjectId,
        config: &BucketObjectConfig,
    ) -> ProviderResult<Snapshot<BucketObjectConfig, BucketObjectAttrs>> {
        let snapshot = self.upload(id, &config.contents).await?;
        info!("created object {}", object_path(id));
        Ok(snapshot)
    }

    async fn update(
        &self,
        id: &BucketObjectId,
        config: &BucketObjectConfig,
        mask: &[UpdateMaskField],
    ) -> ProviderResult<Snapshot<BucketObjectConfig, BucketObjectAttrs>> {
        let paths = vendor_field_mask(
            "bucket_object",
            config,
            mask,
            &[("contents", "contents")],
        )?;
        if paths.is_empty() {
            return self.get(id).await;
        }

        let snapshot = self.upload(id, &config.contents).await?;
        info!("replaced object {}", object_path(id));
        Ok(snapshot)
    }

    async fn delete(&self, id: &BucketObjectId) -> ProviderResult<()> {
        self.storage
            .delete_object(&id.bucket.name, &id.name)
            .await
            .context("delete object", &object_path(id))?;
        info!("deleted object {}", object_path(id));
        Ok(())
    }
}
