//! Single-attempt gateway calls.
//!
//! `GatewayClient` turns one message or group operation into one POST and one
//! response into a [`DispatchOutcome`] or a classified [`GatewayError`]. It never
//! retries; see [`crate::dispatch`] and [`crate::group`] for that.

use std::sync::Arc;
use std::time::Duration;

use pushgate_common::GatewayError;
use pushgate_common::config::GatewayConfig;
use pushgate_common::types::{DispatchOutcome, Message, Operation, OperationType, Recipient};

use crate::transport::{GatewayRequest, GatewayResponse, ReqwestTransport, Transport};
use crate::wire::{self, NOTIFICATION_KEY_NOT_FOUND, OperationBody, ResponseBody, SendBody};

/// Stateless client for the send and notification-key endpoints.
#[derive(Clone)]
pub struct GatewayClient {
    transport: Arc<dyn Transport>,
    api_key: String,
    project_id: Option<String>,
    send_uri: String,
    notification_uri: String,
    timeout: Duration,
}

impl GatewayClient {
    pub fn new(config: &GatewayConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            api_key: config.api_key.clone(),
            project_id: config.project_id.clone(),
            send_uri: config.send_uri.clone(),
            notification_uri: config.notification_uri.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    /// Client backed by a pooled `reqwest` transport.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let transport = ReqwestTransport::new(config)?;
        Ok(Self::new(config, Arc::new(transport)))
    }

    /// Send `message` to `recipient` once.
    pub async fn send_once(
        &self,
        message: &Message,
        recipient: &Recipient,
    ) -> Result<DispatchOutcome, GatewayError> {
        recipient.validate()?;

        let body = serde_json::to_vec(&SendBody::new(message, recipient))
            .map_err(|e| GatewayError::validation(format!("Unserializable message: {e}")))?;

        tracing::debug!(
            uri = %self.send_uri,
            tokens = recipient.token_list().map_or(0, <[String]>::len),
            group = recipient.token_list().is_none(),
            "Posting message to gateway"
        );

        let response = self
            .transport
            .post(self.request(&self.send_uri, body, None))
            .await?;

        if !response.is_success() {
            tracing::debug!(
                status = response.status,
                status_text = %response.status_text,
                "Gateway rejected send"
            );
            return Err(status_error(&response));
        }

        ResponseBody::parse(&response.body)?.into_outcome(recipient.token_list())
    }

    /// Run one create/add/remove against the notification-key endpoint.
    ///
    /// An `add` with `recreate_if_missing` whose key the gateway no longer knows
    /// is re-issued once as a `create`, inside this same call.
    pub async fn perform_group_operation_once(
        &self,
        operation: &Operation,
    ) -> Result<DispatchOutcome, GatewayError> {
        operation.validate()?;

        let response = self.post_operation(operation).await?;
        if response.is_success() {
            return ResponseBody::parse(&response.body)?.into_outcome(None);
        }

        if response.status == 400 {
            let error = wire::error_field(&response.body);
            let key_missing = error.as_deref() == Some(NOTIFICATION_KEY_NOT_FOUND)
                || response.status_text == NOTIFICATION_KEY_NOT_FOUND;

            if operation.recreate_if_missing
                && operation.operation_type == OperationType::Add
                && key_missing
            {
                tracing::warn!(
                    group = %operation.group_key_name,
                    "Notification key not found, recreating group"
                );

                let fallback = operation.with_fallback_to_create();
                let response = self.post_operation(&fallback).await?;
                if !response.is_success() {
                    return Err(status_error(&response));
                }
                return ResponseBody::parse(&response.body)?.into_outcome(None);
            }
        }

        Err(status_error(&response))
    }

    async fn post_operation(&self, operation: &Operation) -> Result<GatewayResponse, GatewayError> {
        let project_id = self
            .project_id
            .as_deref()
            .ok_or_else(|| GatewayError::validation("Group operations require a project id"))?;

        let body = serde_json::to_vec(&OperationBody::new(operation))
            .map_err(|e| GatewayError::validation(format!("Unserializable operation: {e}")))?;

        tracing::debug!(
            uri = %self.notification_uri,
            operation = %operation.operation_type,
            group = %operation.group_key_name,
            tokens = operation.tokens.len(),
            "Posting group operation to gateway"
        );

        let response = self
            .transport
            .post(self.request(&self.notification_uri, body, Some(project_id)))
            .await?;

        tracing::debug!(status = response.status, "Group operation response");
        Ok(response)
    }

    fn request(&self, uri: &str, body: Vec<u8>, project_id: Option<&str>) -> GatewayRequest {
        let mut headers = vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            ("Authorization".to_string(), format!("key={}", self.api_key)),
        ];
        if let Some(project_id) = project_id {
            headers.push(("project_id".to_string(), project_id.to_string()));
        }

        GatewayRequest {
            uri: uri.to_string(),
            headers,
            body,
            timeout: self.timeout,
        }
    }
}

/// Non-2xx response to error. The body's `error` field wins over the status text.
fn status_error(response: &GatewayResponse) -> GatewayError {
    GatewayError::Gateway {
        code: response.status,
        message: wire::error_field(&response.body).unwrap_or_else(|| response.status_text.clone()),
    }
}
