//! Google Cloud provider
//!
//! Routes each request to the handler registered for its identifier's
//! resource type.

use std::collections::HashMap;
use std::sync::Arc;

use carina_core::provider::{ProviderError, ProviderResult, ResourceHandler, Typed};
use carina_core::resource::{Resource, Value};
use carina_core::schema::ResourceSchema;
use carina_core::update_mask::{UpdateMaskField, check_names};
use log::debug;

use crate::client::{ApiGatewayApi, FunctionsApi, IamAdminApi, IamPolicyApi, StorageApi};
use crate::config::ProviderConfig;
use crate::local::LocalCloud;
use crate::resources::api::ApiHandler;
use crate::resources::api_config::ApiConfigHandler;
use crate::resources::api_gateway::ApiGatewayHandler;
use crate::resources::bucket::BucketHandler;
use crate::resources::bucket_object::BucketObjectHandler;
use crate::resources::function::FunctionHandler;
use crate::resources::iam_policy::IamPolicyHandler;
use crate::resources::iam_role::IamRoleHandler;
use crate::resources::iam_role_custom_project::CustomRoleHandler;
use crate::resources::service_account::ServiceAccountHandler;
use crate::schemas;

/// Vendor clients used by the handlers
#[derive(Clone)]
pub struct GcpClients {
    pub storage: Arc<dyn StorageApi>,
    pub functions: Arc<dyn FunctionsApi>,
    /// Policy endpoint of the functions service
    pub functions_iam: Arc<dyn IamPolicyApi>,
    pub iam_admin: Arc<dyn IamAdminApi>,
    pub api_gateway: Arc<dyn ApiGatewayApi>,
}

impl GcpClients {
    /// Serve every client from one local cloud
    pub fn local(cloud: Arc<LocalCloud>) -> Self {
        Self {
            storage: cloud.clone(),
            functions: cloud.clone(),
            functions_iam: cloud.clone(),
            iam_admin: cloud.clone(),
            api_gateway: cloud,
        }
    }
}

pub struct GcpProvider {
    handlers: HashMap<&'static str, Box<dyn ResourceHandler>>,
    schemas: HashMap<String, ResourceSchema>,
}

impl GcpProvider {
    pub fn new(clients: GcpClients, config: ProviderConfig) -> Self {
        let handlers: Vec<Box<dyn ResourceHandler>> = vec![
            Box::new(Typed(BucketHandler::new(clients.storage.clone()))),
            Box::new(Typed(BucketObjectHandler::new(clients.storage.clone()))),
            Box::new(Typed(FunctionHandler::new(
                clients.functions.clone(),
                clients.storage.clone(),
                config.clone(),
            ))),
            Box::new(Typed(ServiceAccountHandler::new(clients.iam_admin.clone()))),
            Box::new(Typed(ApiHandler::new(
                clients.api_gateway.clone(),
                config.clone(),
            ))),
            Box::new(Typed(ApiConfigHandler::new(
                clients.api_gateway.clone(),
                config.clone(),
            ))),
            Box::new(Typed(ApiGatewayHandler::new(clients.api_gateway, config))),
            Box::new(Typed(IamRoleHandler::new(clients.iam_admin.clone()))),
            Box::new(Typed(CustomRoleHandler::new(clients.iam_admin))),
            Box::new(Typed(IamPolicyHandler::new(clients.functions_iam))),
        ];

        Self {
            handlers: handlers
                .into_iter()
                .map(|h| (h.resource_type(), h))
                .collect(),
            schemas: schemas::all()
                .into_iter()
                .map(|s| (s.resource_type.clone(), s))
                .collect(),
        }
    }

    pub fn schema(&self, resource_type: &str) -> Option<&ResourceSchema> {
        self.schemas.get(resource_type)
    }

    /// All schemas, ordered by resource type
    pub fn schemas(&self) -> Vec<&ResourceSchema> {
        let mut schemas: Vec<&ResourceSchema> = self.schemas.values().collect();
        schemas.sort_by(|a, b| a.resource_type.cmp(&b.resource_type));
        schemas
    }

    fn handler(&self, identifier: &Value) -> ProviderResult<&dyn ResourceHandler> {
        let id = identifier
            .as_identifier()
            .map_err(|e| ProviderError::decode("identifier", e))?;
        self.handlers
            .get(id.resource_type.as_str())
            .map(|h| h.as_ref())
            .ok_or_else(|| ProviderError::UnsupportedType(id.resource_type.clone()))
    }

    pub async fn get(&self, identifier: &Value) -> ProviderResult<Resource> {
        let handler = self.handler(identifier)?;
        debug!("get {}", handler.resource_type());
        handler.get(identifier).await
    }

    pub async fn create(&self, identifier: &Value, config: &Value) -> ProviderResult<Resource> {
        let handler = self.handler(identifier)?;
        debug!("create {}", handler.resource_type());
        handler.create(identifier, config).await
    }

    /// Apply the masked fields of `config`.
    ///
    /// Mask names are checked against the config schema before any vendor
    /// call is made.
    pub async fn update(
        &self,
        identifier: &Value,
        config: &Value,
        mask: &[UpdateMaskField],
    ) -> ProviderResult<Resource> {
        let handler = self.handler(identifier)?;
        let resource_type = handler.resource_type();
        if let Some(schema) = self.schema(resource_type) {
            check_names(&schema.config, mask)
                .map_err(|e| ProviderError::invalid_mask(resource_type, e))?;
        }
        debug!("update {} ({} mask fields)", resource_type, mask.len());
        handler.update(identifier, config, mask).await
    }

    pub async fn delete(&self, identifier: &Value) -> ProviderResult<()> {
        let handler = self.handler(identifier)?;
        debug!("delete {}", handler.resource_type());
        handler.delete(identifier).await
    }
}
