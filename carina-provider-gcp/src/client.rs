//! Vendor client interfaces
//!
//! Handlers talk to the cloud only through these traits. Each method maps to
//! one vendor RPC and returns the vendor's wire shapes; translating them to
//! and from [`Value`](carina_core::resource::Value) is the handlers' job.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use carina_core::provider::{ProviderError, ProviderResult};
use serde::{Deserialize, Serialize};

/// Error returned by a vendor client
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VendorError {
    #[error("not found")]
    NotFound,

    /// Etag or other precondition mismatch
    #[error("precondition failed: {0}")]
    Conflict(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("{0}")]
    Other(String),
}

pub type VendorResult<T> = Result<T, VendorError>;

impl VendorError {
    /// Convert into a provider error, naming the operation and resource
    pub fn into_provider(self, operation: &str, resource: &str) -> ProviderError {
        match self {
            VendorError::NotFound => ProviderError::not_found(resource),
            VendorError::Conflict(message) => ProviderError::Conflict {
                resource: resource.to_string(),
                message,
            },
            VendorError::Cancelled => ProviderError::Cancelled {
                operation: operation.to_string(),
                resource: resource.to_string(),
            },
            other => ProviderError::Vendor {
                operation: operation.to_string(),
                resource: resource.to_string(),
                message: other.to_string(),
                cause: Box::new(other),
            },
        }
    }
}

/// Attach operation context to a vendor result
pub trait VendorContext<T> {
    fn context(self, operation: &str, resource: &str) -> ProviderResult<T>;
}

impl<T> VendorContext<T> for VendorResult<T> {
    fn context(self, operation: &str, resource: &str) -> ProviderResult<T> {
        self.map_err(|e| e.into_provider(operation, resource))
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BucketInfo {
    pub name: String,
    pub project: String,
    pub location: String,
    pub labels: HashMap<String, String>,
    pub created: String,
}

/// Label changes applied by a bucket update
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BucketUpdate {
    pub set_labels: HashMap<String, String>,
    pub delete_labels: Vec<String>,
}

impl BucketUpdate {
    pub fn set_label(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.set_labels.insert(key.into(), value.into());
    }

    pub fn delete_label(&mut self, key: impl Into<String>) {
        self.delete_labels.push(key.into());
    }

    pub fn is_empty(&self) -> bool {
        self.set_labels.is_empty() && self.delete_labels.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub bucket: String,
    pub name: String,
    /// Hex SHA-256 of the object contents
    pub sha256: String,
    pub size: u64,
    pub created: String,
}

/// Location of uploaded function source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSource {
    pub bucket: String,
    pub object: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionInfo {
    pub name: String,
    pub description: String,
    pub labels: HashMap<String, String>,
    pub runtime: String,
    pub entry_point: String,
    pub source: StorageSource,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceAccountInfo {
    pub name: String,
    pub project: String,
    pub email: String,
    pub display_name: String,
    pub description: String,
    pub unique_id: String,
    pub disabled: bool,
}

/// Launch stage of a role
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RoleStage {
    #[default]
    Alpha,
    Beta,
    Ga,
    Deprecated,
    Disabled,
    Eap,
}

impl RoleStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleStage::Alpha => "ALPHA",
            RoleStage::Beta => "BETA",
            RoleStage::Ga => "GA",
            RoleStage::Deprecated => "DEPRECATED",
            RoleStage::Disabled => "DISABLED",
            RoleStage::Eap => "EAP",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ALPHA" => Some(RoleStage::Alpha),
            "BETA" => Some(RoleStage::Beta),
            "GA" => Some(RoleStage::Ga),
            "DEPRECATED" => Some(RoleStage::Deprecated),
            "DISABLED" => Some(RoleStage::Disabled),
            "EAP" => Some(RoleStage::Eap),
            _ => None,
        }
    }
}

impl fmt::Display for RoleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoleInfo {
    pub name: String,
    pub title: String,
    pub description: String,
    pub included_permissions: Vec<String>,
    pub stage: RoleStage,
    pub etag: Vec<u8>,
    pub deleted: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiInfo {
    pub name: String,
    pub display_name: String,
    pub labels: HashMap<String, String>,
    pub create_time: String,
    pub update_time: String,
    pub state: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpenApiDocument {
    pub path: String,
    pub contents: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiConfigInfo {
    pub name: String,
    pub display_name: String,
    pub openapi_documents: Vec<OpenApiDocument>,
    pub create_time: String,
    pub update_time: String,
    pub state: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GatewayInfo {
    pub name: String,
    pub display_name: String,
    pub labels: HashMap<String, String>,
    /// Full resource name of the served api config
    pub api_config: String,
    pub create_time: String,
    pub update_time: String,
    pub state: String,
    pub default_hostname: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireBinding {
    pub role: String,
    pub members: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WirePolicy {
    pub version: i32,
    pub bindings: Vec<WireBinding>,
    /// Concurrency token; an empty etag makes a write unconditional
    pub etag: Vec<u8>,
}

/// Handle to a long-running operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub name: String,
}

/// Operation status as reported by the vendor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationStatus {
    Running,
    Succeeded,
    Failed(String),
    Cancelled,
}

// =============================================================================
// Client traits
// =============================================================================

#[async_trait]
pub trait StorageApi: Send + Sync {
    async fn get_bucket(&self, name: &str) -> VendorResult<BucketInfo>;
    async fn create_bucket(&self, bucket: BucketInfo) -> VendorResult<BucketInfo>;
    async fn update_bucket(&self, name: &str, update: BucketUpdate) -> VendorResult<BucketInfo>;
    async fn delete_bucket(&self, name: &str) -> VendorResult<()>;

    async fn get_object(&self, bucket: &str, name: &str) -> VendorResult<ObjectInfo>;
    async fn put_object(&self, bucket: &str, name: &str, contents: Vec<u8>)
    -> VendorResult<ObjectInfo>;
    async fn delete_object(&self, bucket: &str, name: &str) -> VendorResult<()>;
}

/// Polling of long-running operations
#[async_trait]
pub trait OperationsApi: Send + Sync {
    async fn get_operation(&self, name: &str) -> VendorResult<OperationStatus>;
}

#[async_trait]
pub trait FunctionsApi: OperationsApi {
    async fn get_function(&self, name: &str) -> VendorResult<FunctionInfo>;
    /// Reserve a storage location for new function source
    async fn generate_upload_url(&self, parent: &str) -> VendorResult<StorageSource>;
    async fn create_function(
        &self,
        parent: &str,
        function_id: &str,
        function: FunctionInfo,
    ) -> VendorResult<Operation>;
    async fn update_function(
        &self,
        function: FunctionInfo,
        update_mask: Vec<String>,
    ) -> VendorResult<Operation>;
    async fn delete_function(&self, name: &str) -> VendorResult<Operation>;
}

/// Get and set the access policy of a governable resource
#[async_trait]
pub trait IamPolicyApi: Send + Sync {
    async fn get_iam_policy(&self, resource: &str) -> VendorResult<WirePolicy>;
    async fn set_iam_policy(&self, resource: &str, policy: WirePolicy) -> VendorResult<WirePolicy>;
}

#[async_trait]
pub trait IamAdminApi: Send + Sync {
    async fn get_service_account(&self, name: &str) -> VendorResult<ServiceAccountInfo>;
    async fn create_service_account(
        &self,
        project: &str,
        account_id: &str,
        account: ServiceAccountInfo,
    ) -> VendorResult<ServiceAccountInfo>;
    async fn update_service_account(
        &self,
        account: ServiceAccountInfo,
        update_mask: Vec<String>,
    ) -> VendorResult<ServiceAccountInfo>;
    async fn delete_service_account(&self, name: &str) -> VendorResult<()>;

    async fn get_role(&self, name: &str) -> VendorResult<RoleInfo>;
    async fn create_role(&self, parent: &str, role_id: &str, role: RoleInfo)
    -> VendorResult<RoleInfo>;
    async fn update_role(
        &self,
        name: &str,
        role: RoleInfo,
        update_mask: Vec<String>,
    ) -> VendorResult<RoleInfo>;
    async fn delete_role(&self, name: &str) -> VendorResult<RoleInfo>;
}

#[async_trait]
pub trait ApiGatewayApi: OperationsApi {
    async fn get_api(&self, name: &str) -> VendorResult<ApiInfo>;
    async fn create_api(&self, parent: &str, api_id: &str, api: ApiInfo)
    -> VendorResult<Operation>;
    async fn update_api(&self, api: ApiInfo, update_mask: Vec<String>) -> VendorResult<Operation>;
    async fn delete_api(&self, name: &str) -> VendorResult<Operation>;

    async fn get_api_config(&self, name: &str) -> VendorResult<ApiConfigInfo>;
    async fn create_api_config(
        &self,
        parent: &str,
        api_config_id: &str,
        config: ApiConfigInfo,
    ) -> VendorResult<Operation>;
    async fn update_api_config(
        &self,
        config: ApiConfigInfo,
        update_mask: Vec<String>,
    ) -> VendorResult<Operation>;
    async fn delete_api_config(&self, name: &str) -> VendorResult<Operation>;

    async fn get_gateway(&self, name: &str) -> VendorResult<GatewayInfo>;
    async fn create_gateway(
        &self,
        parent: &str,
        gateway_id: &str,
        gateway: GatewayInfo,
    ) -> VendorResult<Operation>;
    async fn update_gateway(
        &self,
        gateway: GatewayInfo,
        update_mask: Vec<String>,
    ) -> VendorResult<Operation>;
    async fn delete_gateway(&self, name: &str) -> VendorResult<Operation>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vendor_not_found_maps_to_not_found() {
        let err = VendorError::NotFound.into_provider("get bucket", "assets");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "assets not found");
    }

    #[test]
    fn vendor_conflict_maps_to_conflict() {
        let result: VendorResult<()> = Err(VendorError::Conflict("etag mismatch".to_string()));
        let err = result.context("set iam policy", "projects/p/functions/f").unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn other_vendor_errors_keep_context() {
        let err = VendorError::Other("quota exceeded".to_string()).into_provider("create api", "orders");
        assert_eq!(err.to_string(), "create api orders failed: quota exceeded");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn role_stage_parse() {
        for stage in ["ALPHA", "BETA", "GA", "DEPRECATED", "DISABLED", "EAP"] {
            assert_eq!(RoleStage::parse(stage).map(|s| s.as_str()), Some(stage));
        }
        assert_eq!(RoleStage::parse("ga"), None);
    }

    #[test]
    fn bucket_update_is_empty() {
        let mut update = BucketUpdate::default();
        assert!(update.is_empty());
        update.delete_label("env");
        assert!(!update.is_empty());
    }
}
