//! Identifier variants and the identifier registry
//!
//! Every resource type has one concrete identifier struct. [`GcpIdentifier`]
//! is the closed set of all of them, and [`GcpIdentifier::resolve`] turns a
//! generic identifier value into the right variant by its resource type tag.

use std::sync::LazyLock;

use carina_core::codec::{DecodeError, FieldReader, IdentifierCodec, ToValue};
use carina_core::resource::{Identifier, Value};
use regex::Regex;

static API_CONFIG_NAME_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^projects/([^/]+)/locations/global/apis/([^/]+)/configs/([^/]+)$").ok()
});

// =============================================================================
// Flat identifiers
// =============================================================================

/// Defines an identifier whose fields are all plain strings
macro_rules! flat_identifier {
    ($(#[$meta:meta])* $name:ident, $tag:literal, { $($field:ident),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $name {
            $(pub $field: String,)+
        }

        impl IdentifierCodec for $name {
            const RESOURCE_TYPE: &'static str = $tag;

            fn to_identifier(&self) -> Identifier {
                Identifier::new(Self::RESOURCE_TYPE)
                    $(.with_field(stringify!($field), self.$field.to_value()))+
            }

            fn from_identifier(id: &Identifier) -> Result<Self, DecodeError> {
                let r = FieldReader::for_identifier(concat!($tag, " identifier"), id);
                r.deny_unknown(&[$(stringify!($field)),+])?;
                Ok(Self {
                    $($field: r.get(stringify!($field))?,)+
                })
            }
        }
    };
}

flat_identifier!(
    /// Storage bucket
    BucketId, "bucket", { project, location, name }
);

flat_identifier!(
    /// Cloud function (2nd gen)
    FunctionId, "function", { project, location, name }
);

flat_identifier!(
    /// User-managed service account
    ServiceAccountId, "service_account", { project, account_id }
);

flat_identifier!(ApiGatewayId, "api_gateway", { project, location, gateway_id });

flat_identifier!(ApiId, "api", { project, api_id });

flat_identifier!(
    /// Predefined role, e.g. `roles/viewer`
    IamRoleId, "iam_role", { name }
);

flat_identifier!(
    /// Custom role defined in a project
    IamRoleCustomProjectId, "iam_role_custom_project", { project, name }
);

impl FunctionId {
    pub fn parent(&self) -> String {
        format!("projects/{}/locations/{}", self.project, self.location)
    }

    pub fn full_name(&self) -> String {
        format!("{}/functions/{}", self.parent(), self.name)
    }
}

impl ServiceAccountId {
    pub fn email(&self) -> String {
        format!("{}@{}.iam.gserviceaccount.com", self.account_id, self.project)
    }

    pub fn full_name(&self) -> String {
        format!("projects/{}/serviceAccounts/{}", self.project, self.email())
    }
}

impl ApiGatewayId {
    pub fn parent(&self) -> String {
        format!("projects/{}/locations/{}", self.project, self.location)
    }

    pub fn full_name(&self) -> String {
        format!("{}/gateways/{}", self.parent(), self.gateway_id)
    }
}

impl ApiId {
    pub fn full_name(&self) -> String {
        format!("projects/{}/locations/global/apis/{}", self.project, self.api_id)
    }
}

impl IamRoleId {
    pub fn full_name(&self) -> String {
        format!("roles/{}", self.name)
    }
}

impl IamRoleCustomProjectId {
    pub fn full_name(&self) -> String {
        format!("projects/{}/roles/{}", self.project, self.name)
    }
}

// =============================================================================
// Nested identifiers
// =============================================================================

/// Config of an API, nested under its API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfigId {
    pub api: ApiId,
    pub api_config_id: String,
}

impl ApiConfigId {
    pub fn full_name(&self) -> String {
        format!("{}/configs/{}", self.api.full_name(), self.api_config_id)
    }

    /// Parse `projects/<p>/locations/global/apis/<api>/configs/<cfg>`
    pub fn parse_full_name(name: &str) -> Result<Self, DecodeError> {
        let caps = API_CONFIG_NAME_RE
            .as_ref()
            .and_then(|re| re.captures(name))
            .ok_or_else(|| DecodeError::invalid(name, "not an api config resource name"))?;
        Ok(Self {
            api: ApiId {
                project: caps[1].to_string(),
                api_id: caps[2].to_string(),
            },
            api_config_id: caps[3].to_string(),
        })
    }
}

impl IdentifierCodec for ApiConfigId {
    const RESOURCE_TYPE: &'static str = "api_config";

    fn to_identifier(&self) -> Identifier {
        Identifier::new(Self::RESOURCE_TYPE)
            .with_field("api", Value::Identifier(self.api.to_identifier()))
            .with_field("api_config_id", self.api_config_id.to_value())
    }

    fn from_identifier(id: &Identifier) -> Result<Self, DecodeError> {
        let r = FieldReader::for_identifier("api_config identifier", id);
        r.deny_unknown(&["api", "api_config_id"])?;
        Ok(Self {
            api: r.with("api", resolve_as)?,
            api_config_id: r.get("api_config_id")?,
        })
    }
}

/// Object stored in a bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketObjectId {
    pub bucket: BucketId,
    pub name: String,
}

impl IdentifierCodec for BucketObjectId {
    const RESOURCE_TYPE: &'static str = "bucket_object";

    fn to_identifier(&self) -> Identifier {
        Identifier::new(Self::RESOURCE_TYPE)
            .with_field("bucket", Value::Identifier(self.bucket.to_identifier()))
            .with_field("name", self.name.to_value())
    }

    fn from_identifier(id: &Identifier) -> Result<Self, DecodeError> {
        let r = FieldReader::for_identifier("bucket_object identifier", id);
        r.deny_unknown(&["bucket", "name"])?;
        Ok(Self {
            bucket: r.with("bucket", resolve_as)?,
            name: r.get("name")?,
        })
    }
}

/// Access policy attached to another resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IamPolicyId {
    pub resource: Box<GcpIdentifier>,
}

impl IdentifierCodec for IamPolicyId {
    const RESOURCE_TYPE: &'static str = "iam_policy";

    fn to_identifier(&self) -> Identifier {
        Identifier::new(Self::RESOURCE_TYPE)
            .with_field("resource", Value::Identifier(self.resource.to_identifier()))
    }

    fn from_identifier(id: &Identifier) -> Result<Self, DecodeError> {
        let r = FieldReader::for_identifier("iam_policy identifier", id);
        r.deny_unknown(&["resource"])?;
        Ok(Self {
            resource: Box::new(r.with("resource", GcpIdentifier::resolve)?),
        })
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Any identifier this provider understands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GcpIdentifier {
    Bucket(BucketId),
    BucketObject(BucketObjectId),
    Function(FunctionId),
    ServiceAccount(ServiceAccountId),
    ApiGateway(ApiGatewayId),
    Api(ApiId),
    ApiConfig(ApiConfigId),
    IamRole(IamRoleId),
    IamRoleCustomProject(IamRoleCustomProjectId),
    IamPolicy(IamPolicyId),
}

impl GcpIdentifier {
    /// Decode a generic identifier value into its concrete variant.
    ///
    /// Dispatches on the resource type tag only; an unknown tag is
    /// [`DecodeError::UnsupportedType`].
    pub fn resolve(value: &Value) -> Result<Self, DecodeError> {
        let id = value.as_identifier()?;
        let resolved = match id.resource_type.as_str() {
            "bucket" => GcpIdentifier::Bucket(BucketId::from_identifier(id)?),
            "bucket_object" => GcpIdentifier::BucketObject(BucketObjectId::from_identifier(id)?),
            "function" => GcpIdentifier::Function(FunctionId::from_identifier(id)?),
            "service_account" => {
                GcpIdentifier::ServiceAccount(ServiceAccountId::from_identifier(id)?)
            }
            "api_gateway" => GcpIdentifier::ApiGateway(ApiGatewayId::from_identifier(id)?),
            "api" => GcpIdentifier::Api(ApiId::from_identifier(id)?),
            "api_config" => GcpIdentifier::ApiConfig(ApiConfigId::from_identifier(id)?),
            "iam_role" => GcpIdentifier::IamRole(IamRoleId::from_identifier(id)?),
            "iam_role_custom_project" => {
                GcpIdentifier::IamRoleCustomProject(IamRoleCustomProjectId::from_identifier(id)?)
            }
            "iam_policy" => GcpIdentifier::IamPolicy(IamPolicyId::from_identifier(id)?),
            other => return Err(DecodeError::UnsupportedType(other.to_string())),
        };
        Ok(resolved)
    }

    pub fn resource_type(&self) -> &'static str {
        match self {
            GcpIdentifier::Bucket(_) => BucketId::RESOURCE_TYPE,
            GcpIdentifier::BucketObject(_) => BucketObjectId::RESOURCE_TYPE,
            GcpIdentifier::Function(_) => FunctionId::RESOURCE_TYPE,
            GcpIdentifier::ServiceAccount(_) => ServiceAccountId::RESOURCE_TYPE,
            GcpIdentifier::ApiGateway(_) => ApiGatewayId::RESOURCE_TYPE,
            GcpIdentifier::Api(_) => ApiId::RESOURCE_TYPE,
            GcpIdentifier::ApiConfig(_) => ApiConfigId::RESOURCE_TYPE,
            GcpIdentifier::IamRole(_) => IamRoleId::RESOURCE_TYPE,
            GcpIdentifier::IamRoleCustomProject(_) => IamRoleCustomProjectId::RESOURCE_TYPE,
            GcpIdentifier::IamPolicy(_) => IamPolicyId::RESOURCE_TYPE,
        }
    }

    pub fn to_identifier(&self) -> Identifier {
        match self {
            GcpIdentifier::Bucket(id) => id.to_identifier(),
            GcpIdentifier::BucketObject(id) => id.to_identifier(),
            GcpIdentifier::Function(id) => id.to_identifier(),
            GcpIdentifier::ServiceAccount(id) => id.to_identifier(),
            GcpIdentifier::ApiGateway(id) => id.to_identifier(),
            GcpIdentifier::Api(id) => id.to_identifier(),
            GcpIdentifier::ApiConfig(id) => id.to_identifier(),
            GcpIdentifier::IamRole(id) => id.to_identifier(),
            GcpIdentifier::IamRoleCustomProject(id) => id.to_identifier(),
            GcpIdentifier::IamPolicy(id) => id.to_identifier(),
        }
    }
}

impl ToValue for GcpIdentifier {
    fn to_value(&self) -> Value {
        Value::Identifier(self.to_identifier())
    }
}

macro_rules! variant_conversions {
    ($($variant:ident($ty:ty)),+ $(,)?) => {
        $(
            impl From<$ty> for GcpIdentifier {
                fn from(id: $ty) -> Self {
                    GcpIdentifier::$variant(id)
                }
            }

            impl TryFrom<GcpIdentifier> for $ty {
                type Error = GcpIdentifier;

                fn try_from(id: GcpIdentifier) -> Result<Self, GcpIdentifier> {
                    match id {
                        GcpIdentifier::$variant(inner) => Ok(inner),
                        other => Err(other),
                    }
                }
            }
        )+
    };
}

variant_conversions!(
    Bucket(BucketId),
    BucketObject(BucketObjectId),
    Function(FunctionId),
    ServiceAccount(ServiceAccountId),
    ApiGateway(ApiGatewayId),
    Api(ApiId),
    ApiConfig(ApiConfigId),
    IamRole(IamRoleId),
    IamRoleCustomProject(IamRoleCustomProjectId),
    IamPolicy(IamPolicyId),
);

/// Resolve a nested identifier through the registry and require one variant
pub fn resolve_as<T>(value: &Value) -> Result<T, DecodeError>
where
    T: IdentifierCodec + TryFrom<GcpIdentifier, Error = GcpIdentifier>,
{
    let resolved = GcpIdentifier::resolve(value)?;
    T::try_from(resolved)
        .map_err(|other| DecodeError::identifier_mismatch(T::RESOURCE_TYPE, other.resource_type()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn function() -> FunctionId {
        FunctionId {
            project: "p1".to_string(),
            location: "us-central1".to_string(),
            name: "hello".to_string(),
        }
    }

    fn api_config() -> ApiConfigId {
        ApiConfigId {
            api: ApiId {
                project: "p1".to_string(),
                api_id: "orders".to_string(),
            },
            api_config_id: "v1".to_string(),
        }
    }

    #[test]
    fn resolve_function() {
        let value = Value::Identifier(function().to_identifier());
        assert_eq!(
            GcpIdentifier::resolve(&value).unwrap(),
            GcpIdentifier::Function(function())
        );
    }

    #[test]
    fn resolve_unknown_tag() {
        let value = Value::Identifier(Identifier::new("unknown_tag"));
        assert_eq!(
            GcpIdentifier::resolve(&value).unwrap_err(),
            DecodeError::UnsupportedType("unknown_tag".to_string())
        );
    }

    #[test]
    fn resolve_requires_identifier_value() {
        let err = GcpIdentifier::resolve(&Value::string("bucket")).unwrap_err();
        assert_eq!(err.to_string(), "expected Identifier, got String");
    }

    #[test]
    fn every_variant_resolves_to_itself() {
        let bucket = BucketId {
            project: "p1".to_string(),
            location: "US".to_string(),
            name: "assets".to_string(),
        };
        let all: Vec<GcpIdentifier> = vec![
            bucket.clone().into(),
            BucketObjectId {
                bucket,
                name: "index.html".to_string(),
            }
            .into(),
            function().into(),
            ServiceAccountId {
                project: "p1".to_string(),
                account_id: "svc".to_string(),
            }
            .into(),
            ApiGatewayId {
                project: "p1".to_string(),
                location: "us-central1".to_string(),
                gateway_id: "gw".to_string(),
            }
            .into(),
            api_config().api.into(),
            api_config().into(),
            IamRoleId {
                name: "viewer".to_string(),
            }
            .into(),
            IamRoleCustomProjectId {
                project: "p1".to_string(),
                name: "invoker".to_string(),
            }
            .into(),
            IamPolicyId {
                resource: Box::new(function().into()),
            }
            .into(),
        ];

        for id in all {
            let value = id.to_value();
            let resolved = GcpIdentifier::resolve(&value).unwrap();
            assert_eq!(resolved.resource_type(), value.as_identifier().unwrap().resource_type);
            assert_eq!(resolved, id);
        }
    }

    #[test]
    fn nested_identifier_of_wrong_type_is_rejected() {
        let id = Identifier::new("api_config")
            .with_field("api", Value::Identifier(function().to_identifier()))
            .with_field("api_config_id", Value::string("v1"));
        let err = ApiConfigId::from_identifier(&id).unwrap_err();
        assert_eq!(
            err.root(),
            &DecodeError::identifier_mismatch("api", "function")
        );
        assert_eq!(err.path(), vec!["api"]);
    }

    #[test]
    fn unknown_identifier_field_is_rejected() {
        let id = function().to_identifier().with_field("zone", Value::string("a"));
        let err = FunctionId::from_identifier(&id).unwrap_err();
        assert_eq!(
            err.to_string(),
            "error parsing function identifier: unknown field 'zone'"
        );
    }

    #[test]
    fn missing_identifier_field_is_rejected() {
        let id = Identifier::new("service_account").with_field("project", Value::string("p1"));
        let err = ServiceAccountId::from_identifier(&id).unwrap_err();
        assert_eq!(err.path(), vec!["account_id"]);
    }

    #[test]
    fn api_config_full_name_round_trip() {
        let name = "projects/p1/locations/global/apis/orders/configs/v1";
        assert_eq!(api_config().full_name(), name);
        assert_eq!(ApiConfigId::parse_full_name(name).unwrap(), api_config());
        assert!(ApiConfigId::parse_full_name("projects/p1/apis/orders").is_err());
    }

    #[test]
    fn service_account_names() {
        let sa = ServiceAccountId {
            project: "p1".to_string(),
            account_id: "svc".to_string(),
        };
        assert_eq!(sa.email(), "svc@p1.iam.gserviceaccount.com");
        assert_eq!(
            sa.full_name(),
            "projects/p1/serviceAccounts/svc@p1.iam.gserviceaccount.com"
        );
    }
}
