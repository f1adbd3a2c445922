//! Batched send with partial-failure narrowing.
//!
//! Each attempt re-sends only what the previous one could not deliver:
//! - token lists shrink to the tokens reported `Unavailable`
//! - a group-key send that names failed members turns into a token-list send
//!   for just those members, so delivered members are never notified twice
//! - a retryable error re-sends the same request unchanged
//!
//! Attempts are strictly sequential. Running out of retries with residual
//! failures is a normal `Ok` outcome; only the final attempt's error is raised.

use std::collections::HashSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use pushgate_common::GatewayError;
use pushgate_common::types::{DispatchOutcome, Message, Recipient};

use crate::backoff::{BackoffPolicy, ExponentialBackoff, wait_or_cancel};
use crate::client::GatewayClient;

/// Retrying sender. Holds no per-call state, so one engine serves many
/// concurrent sends.
#[derive(Clone)]
pub struct DispatchEngine {
    client: GatewayClient,
    backoff: Arc<dyn BackoffPolicy>,
}

impl DispatchEngine {
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

    pub fn client(&self) -> &GatewayClient {
        &self.client
    }

    /// Send with up to `max_retries` retries after the initial attempt.
    pub async fn send(
        &self,
        message: &Message,
        recipient: &Recipient,
        max_retries: u32,
    ) -> Result<DispatchOutcome, GatewayError> {
        self.send_cancellable(message, recipient, max_retries, &CancellationToken::new())
            .await
    }

    pub async fn send_to_tokens<I, S>(
        &self,
        message: &Message,
        tokens: I,
        max_retries: u32,
    ) -> Result<DispatchOutcome, GatewayError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.send(message, &Recipient::tokens(tokens), max_retries)
            .await
    }

    pub async fn send_to_group(
        &self,
        message: &Message,
        notification_key: impl Into<String>,
        max_retries: u32,
    ) -> Result<DispatchOutcome, GatewayError> {
        self.send(message, &Recipient::group_key(notification_key), max_retries)
            .await
    }

    /// Like [`send`](Self::send), but a fired `cancel` aborts any pending
    /// backoff wait with [`GatewayError::Cancelled`].
    pub async fn send_cancellable(
        &self,
        message: &Message,
        recipient: &Recipient,
        max_retries: u32,
        cancel: &CancellationToken,
    ) -> Result<DispatchOutcome, GatewayError> {
        recipient.validate()?;

        let mut current = recipient.clone();
        let mut attempt: u32 = 0;

        loop {
            let result = self.client.send_once(message, &current).await;

            let next = match &result {
                Ok(outcome) => next_recipient(&current, outcome),
                Err(e) if e.is_retryable() => Some(current.clone()),
                Err(_) => None,
            };

            let Some(next) = next else {
                log_finished(&result, attempt);
                return result;
            };

            if attempt >= max_retries {
                tracing::warn!(
                    attempt,
                    max_retries,
                    "Send retries exhausted, returning last attempt"
                );
                return result;
            }

            let delay = self.backoff.delay(attempt);
            tracing::warn!(
                attempt,
                retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                tokens = next.token_list().map_or(0, <[String]>::len),
                error = ?result.as_ref().err(),
                "Scheduling send retry"
            );

            wait_or_cancel(delay, cancel).await?;
            current = next;
            attempt += 1;
        }
    }
}

/// What the next attempt should target after a successful response, if anything.
fn next_recipient(current: &Recipient, outcome: &DispatchOutcome) -> Option<Recipient> {
    match current {
        Recipient::Tokens(_) => {
            let unsent = outcome.unavailable_tokens();
            (!unsent.is_empty()).then_some(Recipient::Tokens(unsent))
        }
        Recipient::GroupKey(_) => {
            let failed = usable_tokens(outcome.group_retry_tokens()?);
            (!failed.is_empty()).then_some(Recipient::Tokens(failed))
        }
    }
}

/// Gateway-reported tokens minus blanks and repeats, first occurrence kept.
fn usable_tokens(tokens: &[String]) -> Vec<String> {
    let mut seen = HashSet::with_capacity(tokens.len());
    let mut unique = Vec::with_capacity(tokens.len());
    for token in tokens {
        if !token.is_empty() && seen.insert(token.as_str()) {
            unique.push(token.clone());
        }
    }
    unique
}

fn log_finished(result: &Result<DispatchOutcome, GatewayError>, attempt: u32) {
    match result {
        Ok(outcome) => tracing::info!(
            attempts = attempt + 1,
            success = outcome.success_count,
            failure = outcome.failure_count,
            "Send finished"
        ),
        Err(e) => tracing::warn!(attempts = attempt + 1, error = %e, "Send failed"),
    }
}
