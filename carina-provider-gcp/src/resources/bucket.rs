//! Storage bucket

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use carina_core::codec::{DecodeError, FieldReader, FromValue, ToValue};
use carina_core::provider::{ProviderError, ProviderResult, Snapshot, TypedHandler};
use carina_core::resource::Value;
use carina_core::update_mask::{FieldChange, MaskError, UpdateMaskField, select_fields};
use log::{debug, info};

use crate::client::{BucketInfo, BucketUpdate, StorageApi, VendorContext};
use crate::identifier::BucketId;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BucketConfig {
    pub labels: HashMap<String, String>,
}

impl ToValue for BucketConfig {
    fn to_value(&self) -> Value {
        Value::map([("labels", self.labels.to_value())])
    }
}

impl FromValue for BucketConfig {
    fn from_value(value: &Value) -> Result<Self, DecodeError> {
        let r = FieldReader::new("bucket config", value)?;
        Ok(Self {
            labels: r.get("labels")?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BucketAttrs {
    pub created: String,
}

impl ToValue for BucketAttrs {
    fn to_value(&self) -> Value {
        Value::map([("created", self.created.to_value())])
    }
}

impl FromValue for BucketAttrs {
    fn from_value(value: &Value) -> Result<Self, DecodeError> {
        let r = FieldReader::new("bucket attrs", value)?;
        Ok(Self {
            created: r.get("created")?,
        })
    }
}

fn snapshot(info: BucketInfo) -> Snapshot<BucketConfig, BucketAttrs> {
    Snapshot::new(
        BucketConfig {
            labels: info.labels,
        },
        BucketAttrs {
            created: info.created,
        },
    )
}

pub struct BucketHandler {
    storage: Arc<dyn StorageApi>,
}

impl BucketHandler {
    pub fn new(storage: Arc<dyn StorageApi>) -> Self {
        Self { storage }
    }

    /// Build the label changes for an update.
    ///
    /// Sub-fields of `labels` name single keys. Masking `labels` as a whole
    /// replaces the label set, which needs the current labels to know what to
    /// remove.
    async fn label_update(
        &self,
        id: &BucketId,
        config: &BucketConfig,
        mask: &[UpdateMaskField],
    ) -> ProviderResult<BucketUpdate> {
        let invalid = |e: MaskError| ProviderError::invalid_mask("bucket", e);
        let changes = select_fields(&config.to_value(), mask).map_err(invalid)?;

        let mut update = BucketUpdate::default();
        for change in &changes {
            match (change, change.path()) {
                (FieldChange::Set { value, .. }, [_, key]) => {
                    let label = value.as_str().map_err(|e| {
                        ProviderError::decode("bucket", e.in_map_key(key).in_field("labels"))
                    })?;
                    update.set_label(key, label);
                }
                (FieldChange::Delete { .. }, [_, key]) => update.delete_label(key),
                (FieldChange::Set { .. }, [_]) => {
                    let current = self
                        .storage
                        .get_bucket(&id.name)
                        .await
                        .context("get bucket", &id.name)?;
                    for key in current.labels.keys() {
                        if !config.labels.contains_key(key) {
                            update.delete_label(key);
                        }
                    }
                    for (key, label) in &config.labels {
                        update.set_label(key, label);
                    }
                }
                (FieldChange::Delete { .. }, [_]) => {
                    let current = self
                        .storage
                        .get_bucket(&id.name)
                        .await
                        .context("get bucket", &id.name)?;
                    for key in current.labels.into_keys() {
                        update.delete_label(key);
                    }
                }
                (_, path) => {
                    return Err(invalid(MaskError::UnknownField {
                        path: path.join("."),
                    }));
                }
            }
        }
        Ok(update)
    }
}

#[async_trait]
impl TypedHandler for BucketHandler {
    type Id = BucketId;
    type Config = BucketConfig;
    type Attrs = BucketAttrs;

    async fn get(&self, id: &BucketId) -> ProviderResult<Snapshot<BucketConfig, BucketAttrs>> {
        debug!("get bucket {}", id.name);
        let info = self
            .storage
            .get_bucket(&id.name)
            .await
            .context("get bucket", &id.name)?;
        Ok(snapshot(info))
    }

    async fn create(
        &self,
        id: &BucketId,
        config: &BucketConfig,
    ) -> ProviderResult<Snapshot<BucketConfig, BucketAttrs>> {
        debug!("create bucket {} in {}", id.name, id.location);
        let info = self
            .storage
            .create_bucket(BucketInfo {
                name: id.name.clone(),
                project: id.project.clone(),
                location: id.location.clone(),
                labels: config.labels.clone(),
                ..Default::default()
            })
            .await
            .context("create bucket", &id.name)?;
        info!("created bucket {}", id.name);
        Ok(snapshot(info))
    }

    async fn update(
        &self,
        id: &BucketId,
        config: &BucketConfig,
        mask: &[UpdateMaskField],
    ) -> ProviderResult<Snapshot<BucketConfig, BucketAttrs>> {
        let update = self.label_update(id, config, mask).await?;
        if update.is_empty() {
            return self.get(id).await;
        }

        debug!(
            "update bucket {}: set {:?}, delete {:?}",
            id.name,
            update.set_labels.keys().collect::<Vec<_>>(),
            update.delete_labels
        );
        let info = self
            .storage
            .update_bucket(&id.name, update)
            .await
            .context("update bucket", &id.name)?;
        info!("updated bucket {}", id.name);
        Ok(snapshot(info))
    }

    async fn delete(&self, id: &BucketId) -> ProviderResult<()> {
        debug!("delete bucket {}", id.name);
        self.storage
            .delete_bucket(&id.name)
            .await
            .context("delete bucket", &id.name)?;
        info!("deleted bucket {}", id.name);
        Ok(())
    }
}
