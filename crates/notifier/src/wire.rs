//! JSON bodies exchanged with the gateway.
//!
//! Request structs borrow from the caller's values and skip every unset field.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use pushgate_common::GatewayError;
use pushgate_common::types::{
    DispatchOutcome, Message, Operation, OperationType, Priority, Recipient, TokenError,
    TokenResult,
};

/// Error text the group endpoint uses for a vanished notification key.
pub const NOTIFICATION_KEY_NOT_FOUND: &str = "notification_key not found";

#[derive(Debug, Serialize)]
pub struct SendBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration_ids: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collapse_key: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_to_live: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_available: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restricted_package_name: Option<&'a str>,
    #[serde(skip_serializing_if = "is_empty_data")]
    pub data: &'a Map<String, Value>,
    #[serde(skip_serializing_if = "is_empty_notification")]
    pub notification: &'a BTreeMap<String, String>,
}

fn is_empty_data(data: &&Map<String, Value>) -> bool {
    data.is_empty()
}

fn is_empty_notification(notification: &&BTreeMap<String, String>) -> bool {
    notification.is_empty()
}

impl<'a> SendBody<'a> {
    pub fn new(message: &'a Message, recipient: &'a Recipient) -> Self {
        let (registration_ids, to) = match recipient {
            Recipient::Tokens(tokens) => (Some(tokens.as_slice()), None),
            Recipient::GroupKey(key) => (None, Some(key.as_str())),
        };

        Self {
            registration_ids,
            to,
            collapse_key: message.collapse_key.as_deref(),
            time_to_live: message.time_to_live,
            dry_run: message.dry_run,
            priority: message.priority,
            content_available: message.content_available,
            restricted_package_name: message.restricted_package_name.as_deref(),
            data: &message.data,
            notification: &message.notification,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OperationBody<'a> {
    pub operation: OperationType,
    pub notification_key_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_key: Option<&'a str>,
    pub registration_ids: &'a [String],
}

impl<'a> OperationBody<'a> {
    pub fn new(operation: &'a Operation) -> Self {
        Self {
            operation: operation.operation_type,
            notification_key_name: &operation.group_key_name,
            notification_key: operation.group_key.as_deref().filter(|k| !k.is_empty()),
            registration_ids: &operation.tokens,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ResultEntry {
    pub message_id: Option<String>,
    pub registration_id: Option<String>,
    pub error: Option<String>,
}

impl From<ResultEntry> for TokenResult {
    fn from(entry: ResultEntry) -> Self {
        match (entry.error, entry.message_id) {
            (Some(tag), _) => TokenResult::Failed(TokenError::from_tag(&tag)),
            (None, Some(message_id)) => TokenResult::Delivered {
                message_id,
                canonical_id: entry.registration_id,
            },
            (None, None) => TokenResult::Failed(TokenError::Other("MissingMessageId".to_string())),
        }
    }
}

/// Union of the send and group-operation success bodies.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ResponseBody {
    pub success: Option<u64>,
    pub failure: Option<u64>,
    pub canonical_ids: Option<u64>,
    pub multicast_id: Option<u64>,
    pub results: Vec<ResultEntry>,
    pub failed_registration_ids: Option<Vec<String>>,
    pub notification_key: Option<String>,
}

impl ResponseBody {
    pub fn parse(body: &[u8]) -> Result<Self, GatewayError> {
        serde_json::from_slice(body)
            .map_err(|e| GatewayError::Parse(format!("Malformed gateway response: {e}")))
    }

    /// Convert into an outcome correlated with `tokens`.
    ///
    /// A token-list send must come back with exactly one result per token.
    pub fn into_outcome(self, tokens: Option<&[String]>) -> Result<DispatchOutcome, GatewayError> {
        if let Some(tokens) = tokens {
            if self.results.len() != tokens.len() {
                return Err(GatewayError::Parse(format!(
                    "Expected {} results, gateway returned {}",
                    tokens.len(),
                    self.results.len()
                )));
            }
        }

        Ok(DispatchOutcome {
            success_count: self.success.unwrap_or_default(),
            failure_count: self.failure.unwrap_or_default(),
            canonical_ids: self.canonical_ids,
            multicast_id: self.multicast_id,
            results: self.results.into_iter().map(TokenResult::from).collect(),
            failed_group_tokens: self.failed_registration_ids,
            tokens: tokens.map(<[String]>::to_vec).unwrap_or_default(),
            notification_key: self.notification_key,
        })
    }
}

/// Pull the `error` field out of an error body, if it has one.
pub fn error_field(body: &[u8]) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<Value>,
    }

    let parsed: ErrorBody = serde_json::from_slice(body).ok()?;
    match parsed.error? {
        Value::String(s) if !s.is_empty() => Some(s),
        Value::String(_) | Value::Null => None,
        other => Some(other.to_string()),
    }
}
