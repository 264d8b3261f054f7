//! In-memory cloud
//!
//! [`LocalCloud`] implements every client trait against process-local state.
//! It backs the tests and the CLI's `--cloud-state` mode, where the state is
//! loaded from and saved back to a JSON file around each command.
//!
//! Mutations that the real vendor runs as long-running operations are applied
//! when the request is accepted; the returned operation then reports
//! `Running` for the configured number of polls before reaching its outcome.
//! An operation set up to fail or be cancelled applies nothing.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use carina_core::provider::{ProviderError, ProviderResult};
use chrono::Utc;
use log::debug;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::client::{
    ApiConfigInfo, ApiGatewayApi, ApiInfo, BucketInfo, BucketUpdate, FunctionInfo, FunctionsApi,
    GatewayInfo, IamAdminApi, IamPolicyApi, ObjectInfo, Operation, OperationStatus,
    OperationsApi, RoleInfo, ServiceAccountInfo, StorageApi, StorageSource, VendorError,
    VendorResult, WirePolicy,
};
use crate::resources::checksum;

/// Version reported for a policy that has never been written
const INITIAL_POLICY_VERSION: i32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
enum Outcome {
    Succeed,
    Fail(String),
    Cancel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PendingOperation {
    remaining_polls: u32,
    outcome: Outcome,
}

/// Everything the local cloud knows, as persisted to disk
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CloudState {
    #[serde(default)]
    buckets: BTreeMap<String, BucketInfo>,
    /// Keyed by `<bucket>/<object>`
    #[serde(default)]
    objects: BTreeMap<String, ObjectInfo>,
    #[serde(default)]
    functions: BTreeMap<String, FunctionInfo>,
    #[serde(default)]
    policies: BTreeMap<String, WirePolicy>,
    #[serde(default)]
    service_accounts: BTreeMap<String, ServiceAccountInfo>,
    #[serde(default)]
    roles: BTreeMap<String, RoleInfo>,
    #[serde(default)]
    apis: BTreeMap<String, ApiInfo>,
    #[serde(default)]
    api_configs: BTreeMap<String, ApiConfigInfo>,
    #[serde(default)]
    gateways: BTreeMap<String, GatewayInfo>,
    #[serde(default)]
    operations: BTreeMap<String, PendingOperation>,
    #[serde(default)]
    serial: u64,
    #[serde(skip)]
    next_outcome: Option<Outcome>,
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

fn object_key(bucket: &str, name: &str) -> String {
    format!("{bucket}/{name}")
}

/// Project segment of a `projects/<p>/...` name
fn project_of(name: &str) -> &str {
    name.strip_prefix("projects/")
        .and_then(|rest| rest.split('/').next())
        .unwrap_or_default()
}

/// Location segment of a `projects/<p>/locations/<l>/...` name
fn location_of(name: &str) -> &str {
    name.split('/').nth(3).unwrap_or_default()
}

fn unsupported_path(path: &str) -> VendorError {
    VendorError::Other(format!("unsupported update mask path '{path}'"))
}

impl CloudState {
    fn next_serial(&mut self) -> u64 {
        self.serial += 1;
        self.serial
    }

    fn next_etag(&mut self) -> Vec<u8> {
        self.next_serial().to_be_bytes().to_vec()
    }

    /// Accept a long-running request, applying it unless the operation is
    /// set up to fail
    fn start_operation(
        &mut self,
        polls: u32,
        apply: impl FnOnce(&mut Self) -> VendorResult<()>,
    ) -> VendorResult<Operation> {
        let outcome = self.next_outcome.take().unwrap_or(Outcome::Succeed);
        if outcome == Outcome::Succeed {
            apply(self)?;
        }

        let name = format!("operations/{}", Uuid::new_v4());
        self.operations.insert(
            name.clone(),
            PendingOperation {
                remaining_polls: polls,
                outcome,
            },
        );
        Ok(Operation { name })
    }

    /// Current policy of a function, creating the empty one on first use
    fn policy(&mut self, resource: &str) -> VendorResult<WirePolicy> {
        if !self.functions.contains_key(resource) {
            return Err(VendorError::NotFound);
        }
        if let Some(policy) = self.policies.get(resource) {
            return Ok(policy.clone());
        }
        let policy = WirePolicy {
            version: INITIAL_POLICY_VERSION,
            bindings: Vec::new(),
            etag: self.next_etag(),
        };
        self.policies.insert(resource.to_string(), policy.clone());
        Ok(policy)
    }
}

/// Process-local implementation of the vendor clients
pub struct LocalCloud {
    state: Mutex<CloudState>,
    operation_polls: u32,
}

impl Default for LocalCloud {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalCloud {
    pub fn new() -> Self {
        Self::from_state(CloudState::default())
    }

    pub fn from_state(state: CloudState) -> Self {
        Self {
            state: Mutex::new(state),
            operation_polls: 0,
        }
    }

    /// Number of polls an operation reports `Running` before it finishes
    pub fn with_operation_polls(mut self, polls: u32) -> Self {
        self.operation_polls = polls;
        self
    }

    /// Make the next long-running operation fail with `message`
    pub fn fail_next_operation(&self, message: impl Into<String>) {
        self.state().next_outcome = Some(Outcome::Fail(message.into()));
    }

    /// Make the next long-running operation end cancelled
    pub fn cancel_next_operation(&self) {
        self.state().next_outcome = Some(Outcome::Cancel);
    }

    /// Register a predefined role, e.g. `roles/viewer`
    pub fn add_predefined_role(&self, role: RoleInfo) {
        self.state().roles.insert(role.name.clone(), role);
    }

    /// Load state from a JSON file; a missing file is an empty cloud
    pub fn load(path: &Path) -> ProviderResult<Self> {
        if !path.exists() {
            debug!("no cloud state at {}, starting empty", path.display());
            return Ok(Self::new());
        }

        let io_error = |message: String| ProviderError::Io {
            path: path.display().to_string(),
            message,
        };
        let content = std::fs::read_to_string(path).map_err(|e| io_error(e.to_string()))?;
        let state: CloudState = serde_json::from_str(&content)
            .map_err(|e| io_error(format!("invalid cloud state: {e}")))?;
        Ok(Self::from_state(state))
    }

    /// Write state back to a JSON file
    pub fn save(&self, path: &Path) -> ProviderResult<()> {
        let io_error = |message: String| ProviderError::Io {
            path: path.display().to_string(),
            message,
        };
        let content = serde_json::to_string_pretty(&*self.state())
            .map_err(|e| io_error(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| io_error(e.to_string()))
    }

    fn state(&self) -> MutexGuard<'_, CloudState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// =============================================================================
// Storage
// =============================================================================

#[async_trait]
impl StorageApi for LocalCloud {
    async fn get_bucket(&self, name: &str) -> VendorResult<BucketInfo> {
        self.state().buckets.get(name).cloned().ok_or(VendorError::NotFound)
    }

    async fn create_bucket(&self, mut bucket: BucketInfo) -> VendorResult<BucketInfo> {
        let mut state = self.state();
        if state.buckets.contains_key(&bucket.name) {
            return Err(VendorError::Conflict(format!("bucket {} already exists", bucket.name)));
        }
        bucket.created = now();
        state.buckets.insert(bucket.name.clone(), bucket.clone());
        Ok(bucket)
    }

    async fn update_bucket(&self, name: &str, update: BucketUpdate) -> VendorResult<BucketInfo> {
        let mut state = self.state();
        let bucket = state.buckets.get_mut(name).ok_or(VendorError::NotFound)?;
        for key in &update.delete_labels {
            bucket.labels.remove(key);
        }
        bucket.labels.extend(update.set_labels);
        Ok(bucket.clone())
    }

    async fn delete_bucket(&self, name: &str) -> VendorResult<()> {
        let mut state = self.state();
        if !state.buckets.contains_key(name) {
            return Err(VendorError::NotFound);
        }
        let prefix = object_key(name, "");
        if state.objects.keys().any(|k| k.starts_with(&prefix)) {
            return Err(VendorError::Conflict(format!("bucket {name} is not empty")));
        }
        state.buckets.remove(name);
        Ok(())
    }

    async fn get_object(&self, bucket: &str, name: &str) -> VendorResult<ObjectInfo> {
        self.state()
            .objects
            .get(&object_key(bucket, name))
            .cloned()
            .ok_or(VendorError::NotFound)
    }

    async fn put_object(
        &self,
        bucket: &str,
        name: &str,
        contents: Vec<u8>,
    ) -> VendorResult<ObjectInfo> {
        let mut state = self.state();
        if !state.buckets.contains_key(bucket) {
            return Err(VendorError::NotFound);
        }
        let object = ObjectInfo {
            bucket: bucket.to_string(),
            name: name.to_string(),
            sha256: checksum(&contents),
            size: contents.len() as u64,
            created: now(),
        };
        state.objects.insert(object_key(bucket, name), object.clone());
        Ok(object)
    }

    async fn delete_object(&self, bucket: &str, name: &str) -> VendorResult<()> {
        self.state()
            .objects
            .remove(&object_key(bucket, name))
            .map(|_| ())
            .ok_or(VendorError::NotFound)
    }
}

// =============================================================================
// Operations and functions
// =============================================================================

#[async_trait]
impl OperationsApi for LocalCloud {
    async fn get_operation(&self, name: &str) -> VendorResult<OperationStatus> {
        let mut state = self.state();
        let operation = state.operations.get_mut(name).ok_or(VendorError::NotFound)?;
        if operation.remaining_polls > 0 {
            operation.remaining_polls -= 1;
            return Ok(OperationStatus::Running);
        }
        // Finished operations are reported once, then forgotten
        let outcome = match state.operations.remove(name) {
            Some(finished) => finished.outcome,
            None => return Err(VendorError::NotFound),
        };
        Ok(match outcome {
            Outcome::Succeed => OperationStatus::Succeeded,
            Outcome::Fail(message) => OperationStatus::Failed(message),
            Outcome::Cancel => OperationStatus::Cancelled,
        })
    }
}

#[async_trait]
impl FunctionsApi for LocalCloud {
    async fn get_function(&self, name: &str) -> VendorResult<FunctionInfo> {
        self.state().functions.get(name).cloned().ok_or(VendorError::NotFound)
    }

    async fn generate_upload_url(&self, parent: &str) -> VendorResult<StorageSource> {
        let mut state = self.state();
        let project = project_of(parent).to_string();
        let bucket = format!("gcf-v2-uploads-{project}");
        if !state.buckets.contains_key(&bucket) {
            state.buckets.insert(
                bucket.clone(),
                BucketInfo {
                    name: bucket.clone(),
                    project,
                    location: location_of(parent).to_string(),
                    labels: Default::default(),
                    created: now(),
                },
            );
        }
        Ok(StorageSource {
            bucket,
            object: format!("{}.zip", Uuid::new_v4()),
        })
    }

    async fn create_function(
        &self,
        parent: &str,
        function_id: &str,
        mut function: FunctionInfo,
    ) -> VendorResult<Operation> {
        let name = format!("{parent}/functions/{function_id}");
        function.url = format!(
            "https://{}-{}.cloudfunctions.net/{}",
            location_of(parent),
            project_of(parent),
            function_id
        );
        function.name = name.clone();

        let mut state = self.state();
        state.start_operation(self.operation_polls, |state| {
            if state.functions.contains_key(&name) {
                return Err(VendorError::Conflict(format!("function {name} already exists")));
            }
            state.functions.insert(name, function);
            Ok(())
        })
    }

    async fn update_function(
        &self,
        function: FunctionInfo,
        update_mask: Vec<String>,
    ) -> VendorResult<Operation> {
        let mut state = self.state();
        state.start_operation(self.operation_polls, |state| {
            let current = state
                .functions
                .get_mut(&function.name)
                .ok_or(VendorError::NotFound)?;
            for path in &update_mask {
                match path.as_str() {
                    "description" => current.description = function.description.clone(),
                    "labels" => current.labels = function.labels.clone(),
                    "build_config" => {
                        current.runtime = function.runtime.clone();
                        current.entry_point = function.entry_point.clone();
                        current.source = function.source.clone();
                    }
                    other => return Err(unsupported_path(other)),
                }
            }
            Ok(())
        })
    }

    async fn delete_function(&self, name: &str) -> VendorResult<Operation> {
        let mut state = self.state();
        state.start_operation(self.operation_polls, |state| {
            state.functions.remove(name).ok_or(VendorError::NotFound)?;
            state.policies.remove(name);
            Ok(())
        })
    }
}

#[async_trait]
impl IamPolicyApi for LocalCloud {
    async fn get_iam_policy(&self, resource: &str) -> VendorResult<WirePolicy> {
        self.state().policy(resource)
    }

    async fn set_iam_policy(&self, resource: &str, policy: WirePolicy) -> VendorResult<WirePolicy> {
        let mut state = self.state();
        let current = state.policy(resource)?;
        if !policy.etag.is_empty() && policy.etag != current.etag {
            return Err(VendorError::Conflict(format!(
                "etag mismatch on policy of {resource}"
            )));
        }

        let stored = WirePolicy {
            version: policy.version,
            bindings: policy.bindings,
            etag: state.next_etag(),
        };
        state.policies.insert(resource.to_string(), stored.clone());
        Ok(stored)
    }
}

// =============================================================================
// IAM admin
// =============================================================================

#[async_trait]
impl IamAdminApi for LocalCloud {
    async fn get_service_account(&self, name: &str) -> VendorResult<ServiceAccountInfo> {
        self.state()
            .service_accounts
            .get(name)
            .cloned()
            .ok_or(VendorError::NotFound)
    }

    async fn create_service_account(
        &self,
        project: &str,
        account_id: &str,
        mut account: ServiceAccountInfo,
    ) -> VendorResult<ServiceAccountInfo> {
        let project_id = project_of(project).to_string();
        account.email = format!("{account_id}@{project_id}.iam.gserviceaccount.com");
        account.name = format!("{project}/serviceAccounts/{}", account.email);
        account.project = project_id;

        let mut state = self.state();
        if state.service_accounts.contains_key(&account.name) {
            return Err(VendorError::Conflict(format!(
                "service account {} already exists",
                account.email
            )));
        }
        account.unique_id = format!("1{:020}", state.next_serial());
        state
            .service_accounts
            .insert(account.name.clone(), account.clone());
        Ok(account)
    }

    async fn update_service_account(
        &self,
        account: ServiceAccountInfo,
        update_mask: Vec<String>,
    ) -> VendorResult<ServiceAccountInfo> {
        let mut state = self.state();
        let current = state
            .service_accounts
            .get_mut(&account.name)
            .ok_or(VendorError::NotFound)?;
        for path in &update_mask {
            match path.as_str() {
                "display_name" => current.display_name = account.display_name.clone(),
                "description" => current.description = account.description.clone(),
                other => return Err(unsupported_path(other)),
            }
        }
        Ok(current.clone())
    }

    async fn delete_service_account(&self, name: &str) -> VendorResult<()> {
        self.state()
            .service_accounts
            .remove(name)
            .map(|_| ())
            .ok_or(VendorError::NotFound)
    }

    async fn get_role(&self, name: &str) -> VendorResult<RoleInfo> {
        self.state().roles.get(name).cloned().ok_or(VendorError::NotFound)
    }

    async fn create_role(
        &self,
        parent: &str,
        role_id: &str,
        mut role: RoleInfo,
    ) -> VendorResult<RoleInfo> {
        let mut state = self.state();
        role.name = format!("{parent}/roles/{role_id}");
        if state.roles.contains_key(&role.name) {
            return Err(VendorError::Conflict(format!("role {} already exists", role.name)));
        }
        role.deleted = false;
        role.etag = state.next_etag();
        state.roles.insert(role.name.clone(), role.clone());
        Ok(role)
    }

    async fn update_role(
        &self,
        name: &str,
        role: RoleInfo,
        update_mask: Vec<String>,
    ) -> VendorResult<RoleInfo> {
        let mut state = self.state();
        let etag = state.next_etag();
        let current = state.roles.get_mut(name).ok_or(VendorError::NotFound)?;
        for path in &update_mask {
            match path.as_str() {
                "title" => current.title = role.title.clone(),
                "description" => current.description = role.description.clone(),
                "stage" => current.stage = role.stage,
                "included_permissions" => {
                    current.included_permissions = role.included_permissions.clone()
                }
                other => return Err(unsupported_path(other)),
            }
        }
        current.etag = etag;
        Ok(current.clone())
    }

    async fn delete_role(&self, name: &str) -> VendorResult<RoleInfo> {
        let mut state = self.state();
        let etag = state.next_etag();
        let current = state.roles.get_mut(name).ok_or(VendorError::NotFound)?;
        current.deleted = true;
        current.etag = etag;
        Ok(current.clone())
    }
}

// =============================================================================
// API gateway
// =============================================================================

#[async_trait]
impl ApiGatewayApi for LocalCloud {
    async fn get_api(&self, name: &str) -> VendorResult<ApiInfo> {
        self.state().apis.get(name).cloned().ok_or(VendorError::NotFound)
    }

    async fn create_api(&self, parent: &str, api_id: &str, mut api: ApiInfo) -> VendorResult<Operation> {
        api.name = format!("{parent}/apis/{api_id}");
        api.create_time = now();
        api.update_time = api.create_time.clone();
        api.state = "ACTIVE".to_string();

        let mut state = self.state();
        state.start_operation(self.operation_polls, |state| {
            if state.apis.contains_key(&api.name) {
                return Err(VendorError::Conflict(format!("api {} already exists", api.name)));
            }
            state.apis.insert(api.name.clone(), api);
            Ok(())
        })
    }

    async fn update_api(&self, api: ApiInfo, update_mask: Vec<String>) -> VendorResult<Operation> {
        let mut state = self.state();
        state.start_operation(self.operation_polls, |state| {
            let current = state.apis.get_mut(&api.name).ok_or(VendorError::NotFound)?;
            for path in &update_mask {
                match path.as_str() {
                    "display_name" => current.display_name = api.display_name.clone(),
                    "labels" => current.labels = api.labels.clone(),
                    other => return Err(unsupported_path(other)),
                }
            }
            current.update_time = now();
            Ok(())
        })
    }

    async fn delete_api(&self, name: &str) -> VendorResult<Operation> {
        let mut state = self.state();
        state.start_operation(self.operation_polls, |state| {
            state.apis.remove(name).map(|_| ()).ok_or(VendorError::NotFound)
        })
    }

    async fn get_api_config(&self, name: &str) -> VendorResult<ApiConfigInfo> {
        self.state()
            .api_configs
            .get(name)
            .cloned()
            .ok_or(VendorError::NotFound)
    }

    async fn create_api_config(
        &self,
        parent: &str,
        api_config_id: &str,
        mut config: ApiConfigInfo,
    ) -> VendorResult<Operation> {
        config.name = format!("{parent}/configs/{api_config_id}");
        config.create_time = now();
        config.update_time = config.create_time.clone();
        config.state = "ACTIVE".to_string();

        let mut state = self.state();
        state.start_operation(self.operation_polls, |state| {
            if state.api_configs.contains_key(&config.name) {
                return Err(VendorError::Conflict(format!(
                    "api config {} already exists",
                    config.name
                )));
            }
            state.api_configs.insert(config.name.clone(), config);
            Ok(())
        })
    }

    async fn update_api_config(
        &self,
        config: ApiConfigInfo,
        update_mask: Vec<String>,
    ) -> VendorResult<Operation> {
        let mut state = self.state();
        state.start_operation(self.operation_polls, |state| {
            let current = state
                .api_configs
                .get_mut(&config.name)
                .ok_or(VendorError::NotFound)?;
            for path in &update_mask {
                match path.as_str() {
                    "display_name" => current.display_name = config.display_name.clone(),
                    "openapi_documents" => {
                        current.openapi_documents = config.openapi_documents.clone()
                    }
                    other => return Err(unsupported_path(other)),
                }
            }
            current.update_time = now();
            Ok(())
        })
    }

    async fn delete_api_config(&self, name: &str) -> VendorResult<Operation> {
        let mut state = self.state();
        state.start_operation(self.operation_polls, |state| {
            state
                .api_configs
                .remove(name)
                .map(|_| ())
                .ok_or(VendorError::NotFound)
        })
    }

    async fn get_gateway(&self, name: &str) -> VendorResult<GatewayInfo> {
        self.state().gateways.get(name).cloned().ok_or(VendorError::NotFound)
    }

    async fn create_gateway(
        &self,
        parent: &str,
        gateway_id: &str,
        mut gateway: GatewayInfo,
    ) -> VendorResult<Operation> {
        gateway.name = format!("{parent}/gateways/{gateway_id}");
        gateway.create_time = now();
        gateway.update_time = gateway.create_time.clone();
        gateway.state = "ACTIVE".to_string();
        gateway.default_hostname = format!(
            "{}-{}.{}.gateway.dev",
            gateway_id,
            &Uuid::new_v4().simple().to_string()[..8],
            location_of(parent)
        );

        let mut state = self.state();
        state.start_operation(self.operation_polls, |state| {
            if state.gateways.contains_key(&gateway.name) {
                return Err(VendorError::Conflict(format!(
                    "gateway {} already exists",
                    gateway.name
                )));
            }
            state.gateways.insert(gateway.name.clone(), gateway);
            Ok(())
        })
    }

    async fn update_gateway(
        &self,
        gateway: GatewayInfo,
        update_mask: Vec<String>,
    ) -> VendorResult<Operation> {
        let mut state = self.state();
        state.start_operation(self.operation_polls, |state| {
            let current = state
                .gateways
                .get_mut(&gateway.name)
                .ok_or(VendorError::NotFound)?;
            for path in &update_mask {
                match path.as_str() {
                    "display_name" => current.display_name = gateway.display_name.clone(),
                    "labels" => current.labels = gateway.labels.clone(),
                    "api_config" => current.api_config = gateway.api_config.clone(),
                    other => return Err(unsupported_path(other)),
                }
            }
            current.update_time = now();
            Ok(())
        })
    }

    async fn delete_gateway(&self, name: &str) -> VendorResult<Operation> {
        let mut state = self.state();
        state.start_operation(self.operation_polls, |state| {
            state.gateways.remove(name).map(|_| ()).ok_or(VendorError::NotFound)
        })
    }
}
