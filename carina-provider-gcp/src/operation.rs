//! Waiting for long-running operations

use std::time::Instant;

use carina_core::provider::{ProviderError, ProviderResult};
use log::debug;

use crate::client::{Operation, OperationStatus, OperationsApi, VendorContext};
use crate::config::ProviderConfig;

/// Poll an operation until it reaches a terminal state.
///
/// The whole wait is bounded by `config.operation_timeout`. Dropping the
/// returned future stops polling.
pub async fn wait_for_operation<C>(
    client: &C,
    config: &ProviderConfig,
    operation: &Operation,
    resource: &str,
) -> ProviderResult<()>
where
    C: OperationsApi + ?Sized,
{
    let started = Instant::now();
    let poll = async {
        loop {
            let status = client
                .get_operation(&operation.name)
                .await
                .context("get operation", resource)?;

            match status {
                OperationStatus::Succeeded => return Ok(()),
                OperationStatus::Failed(message) => {
                    return Err(ProviderError::Vendor {
                        operation: operation.name.clone(),
                        resource: resource.to_string(),
                        message: message.clone(),
                        cause: message.into(),
                    });
                }
                OperationStatus::Cancelled => {
                    return Err(ProviderError::Cancelled {
                        operation: operation.name.clone(),
                        resource: resource.to_string(),
                    });
                }
                OperationStatus::Running => {
                    debug!("operation {} for {} still running", operation.name, resource);
                    tokio::time::sleep(config.poll_interval).await;
                }
            }
        }
    };

    match tokio::time::timeout(config.operation_timeout, poll).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout {
            operation: operation.name.clone(),
            resource: resource.to_string(),
            elapsed: started.elapsed(),
        }),
    }
}
