//! Access policy of a governable resource
//!
//! Every write replaces the whole policy and is guarded by the etag read
//! just before it, so a concurrent change made between the read and the
//! write fails with a conflict instead of being overwritten.

use std::sync::Arc;

use async_trait::async_trait;
use carina_core::provider::{ProviderError, ProviderResult, Snapshot, TypedHandler};
use carina_core::update_mask::UpdateMaskField;
use log::{debug, info};

use crate::client::{IamPolicyApi, VendorContext, WirePolicy};
use crate::iam::{POLICY_VERSION, PolicyAttrs, PolicyConfig, PolicyTarget, decode_policy, encode_policy};
use crate::identifier::IamPolicyId;

pub struct IamPolicyHandler {
    functions_iam: Arc<dyn IamPolicyApi>,
}

impl IamPolicyHandler {
    pub fn new(functions_iam: Arc<dyn IamPolicyApi>) -> Self {
        Self { functions_iam }
    }

    async fn read(&self, resource: &str) -> ProviderResult<WirePolicy> {
        debug!("get iam policy of {}", resource);
        self.functions_iam
            .get_iam_policy(resource)
            .await
            .context("get iam policy", resource)
    }

    /// Replace the policy, guarded by the etag of the current one
    async fn write(
        &self,
        resource: &str,
        config: &PolicyConfig,
    ) -> ProviderResult<Snapshot<PolicyConfig, PolicyAttrs>> {
        let current = self.read(resource).await?;
        let policy = encode_policy(config, current.etag)?;
        let written = self
            .functions_iam
            .set_iam_policy(resource, policy)
            .await
            .context("set iam policy", resource)?;
        let (config, attrs) = decode_policy(&written)?;
        Ok(Snapshot::new(config, attrs))
    }
}

#[async_trait]
impl TypedHandler for IamPolicyHandler {
    type Id = IamPolicyId;
    type Config = PolicyConfig;
    type Attrs = PolicyAttrs;

    async fn get(&self, id: &IamPolicyId) -> ProviderResult<Snapshot<PolicyConfig, PolicyAttrs>> {
        let resource = PolicyTarget::from_identifier(&id.resource)?.full_name();
        let policy = self.read(&resource).await?;
        // An empty policy and a missing one look the same to the vendor
        if policy.bindings.is_empty() {
            return Err(ProviderError::not_found(format!("iam policy of {resource}")));
        }
        let (config, attrs) = decode_policy(&policy)?;
        Ok(Snapshot::new(config, attrs))
    }

    async fn create(
        &self,
        id: &IamPolicyId,
        config: &PolicyConfig,
    ) -> ProviderResult<Snapshot<PolicyConfig, PolicyAttrs>> {
        let resource = PolicyTarget::from_identifier(&id.resource)?.full_name();
        let snapshot = self.write(&resource, config).await?;
        info!(
            "set iam policy of {} with {} bindings",
            resource,
            snapshot.config.bindings.len()
        );
        Ok(snapshot)
    }

    async fn update(
        &self,
        id: &IamPolicyId,
        config: &PolicyConfig,
        _mask: &[UpdateMaskField],
    ) -> ProviderResult<Snapshot<PolicyConfig, PolicyAttrs>> {
        // The binding list is always sent whole, whatever the mask names
        let resource = PolicyTarget::from_identifier(&id.resource)?.full_name();
        let snapshot = self.write(&resource, config).await?;
        info!("updated iam policy of {}", resource);
        Ok(snapshot)
    }

    async fn delete(&self, id: &IamPolicyId) -> ProviderResult<()> {
        let resource = PolicyTarget::from_identifier(&id.resource)?.full_name();
        let current = self.read(&resource).await?;
        self.functions_iam
            .set_iam_policy(
                &resource,
                WirePolicy {
                    version: POLICY_VERSION,
                    bindings: Vec::new(),
                    etag: current.etag,
                },
            )
            .await
            .context("set iam policy", &resource)?;
        info!("cleared iam policy of {}", resource);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{FunctionInfo, FunctionsApi, VendorResult, WireBinding};
    use crate::iam::{Binding, Role};
    use crate::identifier::{
        BucketId, FunctionId, GcpIdentifier, IamRoleCustomProjectId, IamRoleId, ServiceAccountId,
    };
    use crate::local::LocalCloud;
    use crate::resources::test_support::cloud;

    fn function() -> FunctionId {
        FunctionId {
            project: "p1".to_string(),
            location: "us-central1".to_string(),
            name: "hello".to_string(),
        }
    }

    fn id() -> IamPolicyId {
        IamPolicyId {
            resource: Box::new(GcpIdentifier::Function(function())),
        }
    }

    fn invoker(accounts: &[&str]) -> PolicyConfig {
        PolicyConfig {
            bindings: vec![Binding {
                role: Role::Custom(IamRoleCustomProjectId {
                    project: "p1".to_string(),
                    name: "invoker".to_string(),
                }),
                members: accounts
                    .iter()
                    .map(|a| ServiceAccountId {
                        project: "p1".to_string(),
                        account_id: a.to_string(),
                    })
                    .collect(),
            }],
        }
    }

    async fn cloud_with_function() -> Arc<LocalCloud> {
        let cloud = cloud();
        cloud
            .create_function(
                &function().parent(),
                "hello",
                FunctionInfo {
                    name: function().full_name(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        cloud
    }

    /// Lets another writer change the policy between our read and our write
    struct Racing {
        inner: Arc<LocalCloud>,
    }

    #[async_trait]
    impl IamPolicyApi for Racing {
        async fn get_iam_policy(&self, resource: &str) -> VendorResult<WirePolicy> {
            let seen = self.inner.get_iam_policy(resource).await?;
            let mut other = seen.clone();
            other.bindings.push(WireBinding {
                role: "projects/p1/roles/other".to_string(),
                members: vec!["serviceAccount:x@p1.iam.gserviceaccount.com".to_string()],
            });
            self.inner.set_iam_policy(resource, other).await?;
            Ok(seen)
        }

        async fn set_iam_policy(
            &self,
            resource: &str,
            policy: WirePolicy,
        ) -> VendorResult<WirePolicy> {
            self.inner.set_iam_policy(resource, policy).await
        }
    }

    #[tokio::test]
    async fn create_then_get() {
        let handler = IamPolicyHandler::new(cloud_with_function().await);
        let created = handler.create(&id(), &invoker(&["a", "b"])).await.unwrap();
        assert_eq!(created.config, invoker(&["a", "b"]));
        assert!(!created.attrs.etag.is_empty());

        let fetched = handler.get(&id()).await.unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn update_replaces_bindings_regardless_of_mask() {
        let cloud = cloud_with_function().await;
        let handler = IamPolicyHandler::new(cloud.clone());
        handler.create(&id(), &invoker(&["a"])).await.unwrap();

        let updated = handler.update(&id(), &invoker(&["b"]), &[]).await.unwrap();
        assert_eq!(updated.config, invoker(&["b"]));
        let live = cloud.get_iam_policy(&function().full_name()).await.unwrap();
        assert_eq!(
            live.bindings[0].members,
            vec!["serviceAccount:b@p1.iam.gserviceaccount.com".to_string()]
        );

        let mask = vec![
            UpdateMaskField::set("bindings").with_sub_fields(vec![UpdateMaskField::set("0")]),
        ];
        let updated = handler.update(&id(), &invoker(&["c"]), &mask).await.unwrap();
        assert_eq!(updated.config, invoker(&["c"]));
    }

    #[tokio::test]
    async fn empty_policy_reads_as_not_found() {
        let handler = IamPolicyHandler::new(cloud_with_function().await);
        assert!(handler.get(&id()).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn delete_twice_succeeds() {
        let handler = IamPolicyHandler::new(cloud_with_function().await);
        handler.create(&id(), &invoker(&["a"])).await.unwrap();
        handler.delete(&id()).await.unwrap();
        handler.delete(&id()).await.unwrap();
        assert!(handler.get(&id()).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn concurrent_change_is_conflict() {
        let cloud = cloud_with_function().await;
        let handler = IamPolicyHandler::new(Arc::new(Racing { inner: cloud.clone() }));
        let err = handler.create(&id(), &invoker(&["a"])).await.unwrap_err();
        assert!(err.is_conflict());

        // the other writer's binding survives
        let policy = cloud.get_iam_policy(&function().full_name()).await.unwrap();
        assert_eq!(policy.bindings[0].role, "projects/p1/roles/other");
    }

    #[tokio::test]
    async fn predefined_role_cannot_be_granted() {
        let handler = IamPolicyHandler::new(cloud_with_function().await);
        let config = PolicyConfig {
            bindings: vec![Binding {
                role: Role::Predefined(IamRoleId {
                    name: "viewer".to_string(),
                }),
                members: Vec::new(),
            }],
        };
        let err = handler.create(&id(), &config).await.unwrap_err();
        assert!(matches!(err, ProviderError::UnsupportedRole(_)));
    }

    #[tokio::test]
    async fn non_function_target_is_unsupported() {
        let handler = IamPolicyHandler::new(cloud());
        let id = IamPolicyId {
            resource: Box::new(GcpIdentifier::Bucket(BucketId {
                project: "p1".to_string(),
                location: "US".to_string(),
                name: "assets".to_string(),
            })),
        };
        let err = handler.get(&id).await.unwrap_err();
        assert!(matches!(err, ProviderError::UnsupportedType(t) if t == "bucket"));
    }

    #[tokio::test]
    async fn policy_of_missing_function_is_not_found() {
        let handler = IamPolicyHandler::new(cloud());
        let err = handler.create(&id(), &invoker(&["a"])).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn foreign_member_is_refused_on_read() {
        let cloud = cloud_with_function().await;
        cloud
            .set_iam_policy(
                &function().full_name(),
                WirePolicy {
                    version: POLICY_VERSION,
                    bindings: vec![WireBinding {
                        role: "projects/p1/roles/invoker".to_string(),
                        members: vec!["user:alice@example.com".to_string()],
                    }],
                    etag: Vec::new(),
                },
            )
            .await
            .unwrap();
        let handler = IamPolicyHandler::new(cloud);
        let err = handler.get(&id()).await.unwrap_err();
        assert!(matches!(err, ProviderError::UnsupportedMember(m) if m == "user:alice@example.com"));
    }
}
