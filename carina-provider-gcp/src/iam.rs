//! IAM policy binding codec
//!
//! Translates between structured policy bindings, whose roles and members
//! are identifiers, and the wire policy, whose roles and members are strings.
//!
//! Role strings take two forms:
//! - `roles/<name>` is a predefined role
//! - `projects/<project>/roles/<name>` is a custom project role
//!
//! Members are only understood as user-managed service accounts,
//! `serviceAccount:<account>@<project>.iam.gserviceaccount.com`. Every other
//! principal is refused with an error rather than dropped.

use std::sync::LazyLock;

use carina_core::codec::{DecodeError, FieldReader, FromValue, IdentifierCodec, ToValue, decode_list};
use carina_core::provider::{ProviderError, ProviderResult};
use carina_core::resource::Value;
use log::warn;
use regex::Regex;

use crate::client::{WireBinding, WirePolicy};
use crate::identifier::{
    FunctionId, GcpIdentifier, IamRoleCustomProjectId, IamRoleId, ServiceAccountId, resolve_as,
};

/// Policy schema version sent on every write
pub const POLICY_VERSION: i32 = 3;

static SERVICE_ACCOUNT_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^([^@]+)@([^@]+)\.iam\.gserviceaccount\.com$").ok()
});

// =============================================================================
// Roles
// =============================================================================

/// Role of a binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Predefined(IamRoleId),
    Custom(IamRoleCustomProjectId),
}

impl ToValue for Role {
    fn to_value(&self) -> Value {
        match self {
            Role::Predefined(id) => Value::Identifier(id.to_identifier()),
            Role::Custom(id) => Value::Identifier(id.to_identifier()),
        }
    }
}

impl FromValue for Role {
    fn from_value(value: &Value) -> Result<Self, DecodeError> {
        match GcpIdentifier::resolve(value)? {
            GcpIdentifier::IamRole(id) => Ok(Role::Predefined(id)),
            GcpIdentifier::IamRoleCustomProject(id) => Ok(Role::Custom(id)),
            other => Err(DecodeError::identifier_mismatch(
                "iam_role or iam_role_custom_project",
                other.resource_type(),
            )),
        }
    }
}

/// Parse a wire role string
pub fn decode_role(role: &str) -> ProviderResult<Role> {
    let segments: Vec<&str> = role.split('/').collect();
    let decoded = match segments.as_slice() {
        ["roles", name] if !name.is_empty() => Some(Role::Predefined(IamRoleId {
            name: name.to_string(),
        })),
        ["projects", project, "roles", name] if !project.is_empty() && !name.is_empty() => {
            Some(Role::Custom(IamRoleCustomProjectId {
                project: project.to_string(),
                name: name.to_string(),
            }))
        }
        _ => None,
    };

    decoded.ok_or_else(|| {
        warn!("refusing role '{}'", role);
        ProviderError::UnsupportedRole(role.to_string())
    })
}

/// Format a role for writing.
///
/// Only custom project roles can be granted through a policy; a predefined
/// role is refused.
pub fn encode_role(role: &Role) -> ProviderResult<String> {
    match role {
        Role::Custom(id) => Ok(id.full_name()),
        Role::Predefined(id) => {
            warn!("refusing to grant predefined role '{}'", id.full_name());
            Err(ProviderError::UnsupportedRole(id.full_name()))
        }
    }
}

// =============================================================================
// Members
// =============================================================================

/// Parse a wire member string into a service account
pub fn decode_member(member: &str) -> ProviderResult<ServiceAccountId> {
    let unsupported = || {
        warn!("refusing member '{}'", member);
        ProviderError::UnsupportedMember(member.to_string())
    };

    let (kind, principal) = member.split_once(':').ok_or_else(unsupported)?;
    if kind != "serviceAccount" {
        return Err(unsupported());
    }

    let caps = SERVICE_ACCOUNT_RE
        .as_ref()
        .and_then(|re| re.captures(principal))
        .ok_or_else(unsupported)?;
    Ok(ServiceAccountId {
        account_id: caps[1].to_string(),
        project: caps[2].to_string(),
    })
}

pub fn encode_member(member: &ServiceAccountId) -> String {
    format!("serviceAccount:{}", member.email())
}

// =============================================================================
// Policy
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub role: Role,
    pub members: Vec<ServiceAccountId>,
}

impl ToValue for Binding {
    fn to_value(&self) -> Value {
        Value::map([
            ("role", self.role.to_value()),
            (
                "members",
                Value::List(
                    self.members
                        .iter()
                        .map(|m| Value::Identifier(m.to_identifier()))
                        .collect(),
                ),
            ),
        ])
    }
}

impl FromValue for Binding {
    fn from_value(value: &Value) -> Result<Self, DecodeError> {
        let r = FieldReader::new("binding", value)?;
        Ok(Self {
            role: r.get("role")?,
            members: r.with("members", |v| decode_list(v, resolve_as))?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyConfig {
    pub bindings: Vec<Binding>,
}

impl ToValue for PolicyConfig {
    fn to_value(&self) -> Value {
        Value::map([("bindings", self.bindings.to_value())])
    }
}

impl FromValue for PolicyConfig {
    fn from_value(value: &Value) -> Result<Self, DecodeError> {
        let r = FieldReader::new("iam_policy config", value)?;
        Ok(Self {
            bindings: r.get("bindings")?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyAttrs {
    pub etag: String,
}

impl ToValue for PolicyAttrs {
    fn to_value(&self) -> Value {
        Value::map([("etag", self.etag.to_value())])
    }
}

impl FromValue for PolicyAttrs {
    fn from_value(value: &Value) -> Result<Self, DecodeError> {
        let r = FieldReader::new("iam_policy attrs", value)?;
        Ok(Self { etag: r.get("etag")? })
    }
}

/// Lowercase hex rendering of an etag
pub fn format_etag(etag: &[u8]) -> String {
    etag.iter().map(|b| format!("{b:02x}")).collect()
}

/// Decode the bindings of a wire policy
pub fn decode_policy(policy: &WirePolicy) -> ProviderResult<(PolicyConfig, PolicyAttrs)> {
    let bindings = policy
        .bindings
        .iter()
        .map(|binding| -> ProviderResult<Binding> {
            Ok(Binding {
                role: decode_role(&binding.role)?,
                members: binding
                    .members
                    .iter()
                    .map(|m| decode_member(m))
                    .collect::<ProviderResult<Vec<_>>>()?,
            })
        })
        .collect::<ProviderResult<Vec<_>>>()?;

    Ok((
        PolicyConfig { bindings },
        PolicyAttrs {
            etag: format_etag(&policy.etag),
        },
    ))
}

/// Build the full replacement policy for a write guarded by `etag`
pub fn encode_policy(config: &PolicyConfig, etag: Vec<u8>) -> ProviderResult<WirePolicy> {
    let bindings = config
        .bindings
        .iter()
        .map(|binding| -> ProviderResult<WireBinding> {
            Ok(WireBinding {
                role: encode_role(&binding.role)?,
                members: binding.members.iter().map(encode_member).collect(),
            })
        })
        .collect::<ProviderResult<Vec<_>>>()?;

    Ok(WirePolicy {
        version: POLICY_VERSION,
        bindings,
        etag,
    })
}

// =============================================================================
// Governable resources
// =============================================================================

/// A resource whose access policy can be managed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyTarget {
    Function(FunctionId),
}

impl PolicyTarget {
    pub fn from_identifier(resource: &GcpIdentifier) -> ProviderResult<Self> {
        match resource {
            GcpIdentifier::Function(id) => Ok(PolicyTarget::Function(id.clone())),
            other => Err(ProviderError::UnsupportedType(
                other.resource_type().to_string(),
            )),
        }
    }

    /// Resource name the policy is attached to
    pub fn full_name(&self) -> String {
        match self {
            PolicyTarget::Function(id) => id.full_name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::BucketId;

    fn custom_role() -> IamRoleCustomProjectId {
        IamRoleCustomProjectId {
            project: "p1".to_string(),
            name: "myrole".to_string(),
        }
    }

    fn svc() -> ServiceAccountId {
        ServiceAccountId {
            project: "p1".to_string(),
            account_id: "svc".to_string(),
        }
    }

    #[test]
    fn decode_custom_role() {
        let role = decode_role("projects/p1/roles/myrole").unwrap();
        assert_eq!(role, Role::Custom(custom_role()));
        assert_eq!(encode_role(&role).unwrap(), "projects/p1/roles/myrole");
    }

    #[test]
    fn decode_predefined_role() {
        let role = decode_role("roles/editor").unwrap();
        assert_eq!(
            role,
            Role::Predefined(IamRoleId {
                name: "editor".to_string()
            })
        );
    }

    #[test]
    fn decode_role_rejects_other_forms() {
        for raw in [
            "viewer",
            "roles/",
            "roles/a/b",
            "projects/p1/roles",
            "projects/p1/permissions/x",
            "organizations/1/roles/x",
        ] {
            match decode_role(raw) {
                Err(ProviderError::UnsupportedRole(r)) => assert_eq!(r, raw),
                other => panic!("expected unsupported role for {raw}, got {other:?}"),
            }
        }
    }

    #[test]
    fn predefined_role_cannot_be_granted() {
        let err = encode_role(&Role::Predefined(IamRoleId {
            name: "viewer".to_string(),
        }))
        .unwrap_err();
        assert_eq!(err.to_string(), "unsupported role 'roles/viewer'");
    }

    #[test]
    fn decode_service_account_member() {
        let member = decode_member("serviceAccount:svc@p1.iam.gserviceaccount.com").unwrap();
        assert_eq!(member, svc());
        assert_eq!(
            encode_member(&member),
            "serviceAccount:svc@p1.iam.gserviceaccount.com"
        );
    }

    #[test]
    fn decode_member_rejects_other_principals() {
        for raw in [
            "allUsers",
            "allAuthenticatedUsers",
            "user:alice@example.com",
            "group:ops@example.com",
            "serviceAccount:123-compute@developer.gserviceaccount.com",
        ] {
            assert!(
                matches!(decode_member(raw), Err(ProviderError::UnsupportedMember(_))),
                "{raw} should be refused"
            );
        }
    }

    #[test]
    fn decode_policy_maps_every_binding() {
        let wire = WirePolicy {
            version: 3,
            bindings: vec![
                WireBinding {
                    role: "projects/p1/roles/myrole".to_string(),
                    members: vec!["serviceAccount:svc@p1.iam.gserviceaccount.com".to_string()],
                },
                WireBinding {
                    role: "roles/viewer".to_string(),
                    members: vec![],
                },
            ],
            etag: vec![0xbe, 0xef, 0x01],
        };
        let (config, attrs) = decode_policy(&wire).unwrap();
        assert_eq!(config.bindings.len(), 2);
        assert_eq!(config.bindings[0].members, vec![svc()]);
        assert_eq!(attrs.etag, "beef01");
    }

    #[test]
    fn decode_policy_fails_on_unsupported_member() {
        let wire = WirePolicy {
            version: 3,
            bindings: vec![WireBinding {
                role: "roles/viewer".to_string(),
                members: vec!["allUsers".to_string()],
            }],
            etag: vec![],
        };
        assert!(matches!(
            decode_policy(&wire),
            Err(ProviderError::UnsupportedMember(_))
        ));
    }

    #[test]
    fn encode_policy_is_full_replacement_with_etag() {
        let config = PolicyConfig {
            bindings: vec![Binding {
                role: Role::Custom(custom_role()),
                members: vec![svc()],
            }],
        };
        let wire = encode_policy(&config, vec![7]).unwrap();
        assert_eq!(wire.version, POLICY_VERSION);
        assert_eq!(wire.etag, vec![7]);
        assert_eq!(
            wire.bindings,
            vec![WireBinding {
                role: "projects/p1/roles/myrole".to_string(),
                members: vec!["serviceAccount:svc@p1.iam.gserviceaccount.com".to_string()],
            }]
        );
    }

    #[test]
    fn binding_value_round_trip() {
        let binding = Binding {
            role: Role::Custom(custom_role()),
            members: vec![svc()],
        };
        let config = PolicyConfig {
            bindings: vec![binding],
        };
        assert_eq!(PolicyConfig::from_value(&config.to_value()).unwrap(), config);
    }

    #[test]
    fn binding_member_of_wrong_type_is_decode_error() {
        let value = Value::map([
            ("role", Role::Custom(custom_role()).to_value()),
            (
                "members",
                Value::List(vec![
                    Value::Identifier(svc().to_identifier()),
                    Value::Identifier(
                        BucketId {
                            project: "p1".to_string(),
                            location: "US".to_string(),
                            name: "b".to_string(),
                        }
                        .to_identifier(),
                    ),
                ]),
            ),
        ]);
        let err = Binding::from_value(&value).unwrap_err();
        assert_eq!(err.path(), vec!["members", "1"]);
        assert_eq!(
            err.root(),
            &DecodeError::identifier_mismatch("service_account", "bucket")
        );
    }

    #[test]
    fn binding_role_must_be_a_role() {
        let value = Value::map([
            ("role", Value::Identifier(svc().to_identifier())),
            ("members", Value::List(vec![])),
        ]);
        let err = Binding::from_value(&value).unwrap_err();
        assert_eq!(err.path(), vec!["role"]);
    }

    #[test]
    fn policy_target_only_functions() {
        let function = GcpIdentifier::Function(FunctionId {
            project: "p1".to_string(),
            location: "us-central1".to_string(),
            name: "hello".to_string(),
        });
        let target = PolicyTarget::from_identifier(&function).unwrap();
        assert_eq!(
            target.full_name(),
            "projects/p1/locations/us-central1/functions/hello"
        );

        let sa = GcpIdentifier::ServiceAccount(svc());
        assert!(matches!(
            PolicyTarget::from_identifier(&sa),
            Err(ProviderError::UnsupportedType(t)) if t == "service_account"
        ));
    }

    #[test]
    fn policy_attrs_round_trip() {
        let attrs = PolicyAttrs {
            etag: "beef01".to_string(),
        };
        assert_eq!(PolicyAttrs::from_value(&attrs.to_value()).unwrap(), attrs);
    }
}
