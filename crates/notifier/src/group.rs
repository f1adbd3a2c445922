//! Retry loop for notification-key operations.
//!
//! A group operation passes or fails as a whole, so there is no subset to
//! narrow: retryable errors re-issue the unchanged operation after a backoff
//! wait. The stale-key fallback happens inside a single attempt, in
//! [`GatewayClient::perform_group_operation_once`].

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use pushgate_common::GatewayError;
use pushgate_common::types::{DispatchOutcome, Operation};

use crate::backoff::{BackoffPolicy, ExponentialBackoff, wait_or_cancel};
use crate::client::GatewayClient;

#[derive(Clone)]
pub struct GroupOperationEngine {
    client: GatewayClient,
    backoff: Arc<dyn BackoffPolicy>,
}

impl GroupOperationEngine {
    pub fn new(client: GatewayClient) -> Self {
        Self {
            client,
            backoff: Arc::new(ExponentialBackoff::default()),
        }
    }

    pub fn with_backoff(mut self, backoff: impl BackoffPolicy + 'static) -> Self {
        self.backoff = Arc::new(backoff);
        self
    }

    /// Perform `operation` with up to `max_retries` retries on retryable errors.
    pub async fn perform(
        &self,
        operation: &Operation,
        max_retries: u32,
    ) -> Result<DispatchOutcome, GatewayError> {
        self.perform_cancellable(operation, max_retries, &CancellationToken::new())
            .await
    }

    pub async fn perform_cancellable(
        &self,
        operation: &Operation,
        max_retries: u32,
        cancel: &CancellationToken,
    ) -> Result<DispatchOutcome, GatewayError> {
        let mut attempt: u32 = 0;

        loop {
            match self.client.perform_group_operation_once(operation).await {
                Ok(outcome) => {
                    tracing::info!(
                        attempts = attempt + 1,
                        operation = %operation.operation_type,
                        group = %operation.group_key_name,
                        "Group operation finished"
                    );
                    return Ok(outcome);
                }
                Err(e) if e.is_retryable() && attempt < max_retries => {
                    let delay = self.backoff.delay(attempt);
                    tracing::warn!(
                        attempt,
                        retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "Scheduling group operation retry"
                    );
                    wait_or_cancel(delay, cancel).await?;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::warn!(attempts = attempt + 1, error = %e, "Group operation failed");
                    return Err(e);
                }
            }
        }
    }
}
