//! Provider - Handler contract between the orchestrator and a cloud
//!
//! A [`ResourceHandler`] serves Get/Create/Update/Delete for one resource
//! type over generic [`Value`]s. Most handlers are written against concrete
//! types by implementing [`TypedHandler`] and wrapping it in [`Typed`], which
//! performs the decode and encode around each call.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;

use crate::codec::{DecodeError, FromValue, IdentifierCodec, ToValue};
use crate::resource::{Resource, Value};
use crate::update_mask::{MaskError, UpdateMaskField};

/// Error type for Provider operations
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The resource does not exist
    #[error("{resource} not found")]
    NotFound { resource: String },

    #[error("error decoding {resource_type}: {inner}")]
    Decode {
        resource_type: String,
        inner: DecodeError,
    },

    #[error("unsupported resource type '{0}'")]
    UnsupportedType(String),

    #[error("unsupported role '{0}'")]
    UnsupportedRole(String),

    #[error("unsupported member '{0}'")]
    UnsupportedMember(String),

    /// Optimistic-concurrency failure; the caller may re-read and retry
    #[error("conflicting write to {resource}: {message}")]
    Conflict { resource: String, message: String },

    #[error("{operation} {resource} failed: {message}")]
    Vendor {
        operation: String,
        resource: String,
        message: String,
        #[source]
        cause: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("{operation} {resource} timed out after {elapsed:?}")]
    Timeout {
        operation: String,
        resource: String,
        elapsed: Duration,
    },

    #[error("{operation} {resource} was cancelled")]
    Cancelled { operation: String, resource: String },

    #[error("{operation} is not implemented for {resource_type}")]
    Unimplemented {
        resource_type: String,
        operation: String,
    },

    #[error("invalid update mask for {resource_type}: {inner}")]
    InvalidMask {
        resource_type: String,
        inner: MaskError,
    },

    #[error("failed to read {path}: {message}")]
    Io { path: String, message: String },
}

impl ProviderError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn decode(resource_type: impl Into<String>, inner: DecodeError) -> Self {
        Self::Decode {
            resource_type: resource_type.into(),
            inner,
        }
    }

    pub fn unimplemented(resource_type: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Unimplemented {
            resource_type: resource_type.into(),
            operation: operation.into(),
        }
    }

    pub fn invalid_mask(resource_type: impl Into<String>, inner: MaskError) -> Self {
        Self::InvalidMask {
            resource_type: resource_type.into(),
            inner,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Return type for async operations
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Uniform entry points for one resource type.
///
/// Every call is independent: no state is kept between calls.
pub trait ResourceHandler: Send + Sync {
    /// Resource type tag served by this handler (e.g., "bucket")
    fn resource_type(&self) -> &'static str;

    /// Read the current config and attrs.
    ///
    /// Returns [`ProviderError::NotFound`] when the resource does not exist.
    fn get<'a>(&'a self, identifier: &'a Value) -> BoxFuture<'a, ProviderResult<Resource>>;

    fn create<'a>(
        &'a self,
        identifier: &'a Value,
        config: &'a Value,
    ) -> BoxFuture<'a, ProviderResult<Resource>>;

    fn update<'a>(
        &'a self,
        identifier: &'a Value,
        config: &'a Value,
        mask: &'a [UpdateMaskField],
    ) -> BoxFuture<'a, ProviderResult<Resource>>;

    fn delete<'a>(&'a self, identifier: &'a Value) -> BoxFuture<'a, ProviderResult<()>>;
}

/// Handler implementation for Box<dyn ResourceHandler>
impl ResourceHandler for Box<dyn ResourceHandler> {
    fn resource_type(&self) -> &'static str {
        (**self).resource_type()
    }

    fn get<'a>(&'a self, identifier: &'a Value) -> BoxFuture<'a, ProviderResult<Resource>> {
        (**self).get(identifier)
    }

    fn create<'a>(
        &'a self,
        identifier: &'a Value,
        config: &'a Value,
    ) -> BoxFuture<'a, ProviderResult<Resource>> {
        (**self).create(identifier, config)
    }

    fn update<'a>(
        &'a self,
        identifier: &'a Value,
        config: &'a Value,
        mask: &'a [UpdateMaskField],
    ) -> BoxFuture<'a, ProviderResult<Resource>> {
        (**self).update(identifier, config, mask)
    }

    fn delete<'a>(&'a self, identifier: &'a Value) -> BoxFuture<'a, ProviderResult<()>> {
        (**self).delete(identifier)
    }
}

/// Config and attrs of a resource in their concrete form
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<C, A> {
    pub config: C,
    pub attrs: A,
}

impl<C, A> Snapshot<C, A> {
    pub fn new(config: C, attrs: A) -> Self {
        Self { config, attrs }
    }
}

/// Handler written against concrete identifier, config and attrs types.
///
/// Operations that a resource type does not support keep the default
/// implementation, which reports [`ProviderError::Unimplemented`].
#[async_trait]
pub trait TypedHandler: Send + Sync {
    type Id: IdentifierCodec + Send + Sync;
    type Config: FromValue + ToValue + Send + Sync;
    type Attrs: ToValue + Send;

    async fn get(&self, id: &Self::Id) -> ProviderResult<Snapshot<Self::Config, Self::Attrs>>;

    async fn create(
        &self,
        _id: &Self::Id,
        _config: &Self::Config,
    ) -> ProviderResult<Snapshot<Self::Config, Self::Attrs>> {
        Err(ProviderError::unimplemented(Self::Id::RESOURCE_TYPE, "create"))
    }

    async fn update(
        &self,
        _id: &Self::Id,
        _config: &Self::Config,
        _mask: &[UpdateMaskField],
    ) -> ProviderResult<Snapshot<Self::Config, Self::Attrs>> {
        Err(ProviderError::unimplemented(Self::Id::RESOURCE_TYPE, "update"))
    }

    async fn delete(&self, _id: &Self::Id) -> ProviderResult<()> {
        Err(ProviderError::unimplemented(Self::Id::RESOURCE_TYPE, "delete"))
    }
}

/// Adapts a [`TypedHandler`] to the generic [`ResourceHandler`] contract
pub struct Typed<H>(pub H);

impl<H: TypedHandler> Typed<H> {
    fn decode_id(identifier: &Value) -> ProviderResult<H::Id> {
        let resource_type = H::Id::RESOURCE_TYPE;
        let id = identifier
            .as_identifier()
            .map_err(|e| ProviderError::decode(resource_type, e))?;
        if id.resource_type != resource_type {
            return Err(ProviderError::decode(
                resource_type,
                DecodeError::identifier_mismatch(resource_type, &id.resource_type),
            ));
        }
        H::Id::from_identifier(id).map_err(|e| ProviderError::decode(resource_type, e))
    }

    fn decode_config(config: &Value) -> ProviderResult<H::Config> {
        H::Config::from_value(config).map_err(|e| ProviderError::decode(H::Id::RESOURCE_TYPE, e))
    }

    fn encode(id: &H::Id, snapshot: Snapshot<H::Config, H::Attrs>) -> Resource {
        Resource::new(
            id.to_identifier(),
            snapshot.config.to_value(),
            snapshot.attrs.to_value(),
        )
    }
}

impl<H: TypedHandler> ResourceHandler for Typed<H> {
    fn resource_type(&self) -> &'static str {
        H::Id::RESOURCE_TYPE
    }

    fn get<'a>(&'a self, identifier: &'a Value) -> BoxFuture<'a, ProviderResult<Resource>> {
        Box::pin(async move {
            let id = Self::decode_id(identifier)?;
            let snapshot = self.0.get(&id).await?;
            Ok(Self::encode(&id, snapshot))
        })
    }

    fn create<'a>(
        &'a self,
        identifier: &'a Value,
        config: &'a Value,
    ) -> BoxFuture<'a, ProviderResult<Resource>> {
        Box::pin(async move {
            let id = Self::decode_id(identifier)?;
            let config = Self::decode_config(config)?;
            let snapshot = self.0.create(&id, &config).await?;
            Ok(Self::encode(&id, snapshot))
        })
    }

    fn update<'a>(
        &'a self,
        identifier: &'a Value,
        config: &'a Value,
        mask: &'a [UpdateMaskField],
    ) -> BoxFuture<'a, ProviderResult<Resource>> {
        Box::pin(async move {
            let id = Self::decode_id(identifier)?;
            let config = Self::decode_config(config)?;
            let snapshot = self.0.update(&id, &config, mask).await?;
            Ok(Self::encode(&id, snapshot))
        })
    }

    fn delete<'a>(&'a self, identifier: &'a Value) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(async move {
            let id = Self::decode_id(identifier)?;
            self.0.delete(&id).await
        })
    }
}
