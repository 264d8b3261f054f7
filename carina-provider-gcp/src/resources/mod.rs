//! Resource types
//!
//! Each module holds the config and attrs codecs of one resource type and the
//! [`TypedHandler`](carina_core::provider::TypedHandler) that serves it.

pub mod api;
pub mod api_config;
pub mod api_gateway;
pub mod bucket;
pub mod bucket_object;
pub mod function;
pub mod iam_policy;
pub mod iam_role;
pub mod iam_role_custom_project;
pub mod service_account;

use carina_core::codec::ToValue;
use carina_core::provider::{ProviderError, ProviderResult};
use carina_core::resource::FileRef;
use carina_core::update_mask::{MaskError, UpdateMaskField, changed_fields, select_fields};
use log::debug;
use sha2::{Digest, Sha256};

/// Read the contents of a local file for upload
pub(crate) async fn read_file(file: &FileRef) -> ProviderResult<Vec<u8>> {
    debug!("reading {}", file.path);
    tokio::fs::read(&file.path)
        .await
        .map_err(|e| ProviderError::Io {
            path: file.path.clone(),
            message: e.to_string(),
        })
}

/// Hex SHA-256, the form checksums take in returned file values
pub(crate) fn checksum(contents: &[u8]) -> String {
    hex::encode(Sha256::digest(contents))
}

/// Translate the top-level fields named by an update mask into vendor
/// field-mask paths.
///
/// `paths` maps config field names to vendor paths. A masked field with no
/// vendor path is rejected.
pub(crate) fn vendor_field_mask(
    resource_type: &str,
    config: &impl ToValue,
    mask: &[UpdateMaskField],
    paths: &[(&str, &str)],
) -> ProviderResult<Vec<String>> {
    let invalid = |e: MaskError| ProviderError::invalid_mask(resource_type, e);

    let changes = select_fields(&config.to_value(), mask).map_err(invalid)?;
    changed_fields(&changes)
        .into_iter()
        .map(|field| {
            paths
                .iter()
                .find(|(name, _)| *name == field)
                .map(|(_, path)| path.to_string())
                .ok_or_else(|| {
                    invalid(MaskError::UnknownField {
                        path: field.to_string(),
                    })
                })
        })
        .collect()
}
