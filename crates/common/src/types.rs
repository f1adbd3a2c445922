use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::GatewayError;

/// Delivery priority requested from the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Normal,
    High,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Normal => write!(f, "normal"),
            Priority::High => write!(f, "high"),
        }
    }
}

/// Notification payload.
///
/// Every optional field that is left unset is omitted from the wire body.
/// `data` and `notification` are omitted while empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Message {
    /// Dedup hint: the gateway keeps only the newest pending message per key
    pub collapse_key: Option<String>,
    /// Seconds the gateway keeps the message while the device is offline
    pub time_to_live: Option<u32>,
    pub dry_run: Option<bool>,
    pub priority: Option<Priority>,
    pub content_available: Option<bool>,
    pub restricted_package_name: Option<String>,
    /// Application payload delivered to the app
    pub data: Map<String, Value>,
    /// Display payload rendered by the device
    pub notification: BTreeMap<String, String>,
}

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_collapse_key(mut self, key: impl Into<String>) -> Self {
        self.collapse_key = Some(key.into());
        self
    }

    pub fn with_time_to_live(mut self, seconds: u32) -> Self {
        self.time_to_live = Some(seconds);
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = Some(dry_run);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_content_available(mut self, content_available: bool) -> Self {
        self.content_available = Some(content_available);
        self
    }

    pub fn with_restricted_package_name(mut self, package: impl Into<String>) -> Self {
        self.restricted_package_name = Some(package.into());
        self
    }

    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = data;
        self
    }

    pub fn with_notification<K, V>(mut self, notification: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.notification = notification
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    /// Set a single key in the data payload, replacing any previous value.
    pub fn add_data(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.data.insert(key.into(), value.into());
    }

    /// Merge every key of `entries` into the data payload.
    pub fn extend_data(&mut self, entries: Map<String, Value>) {
        self.data.extend(entries);
    }
}

/// Who a message is addressed to.
///
/// Token order matters: the gateway answers with one result per token, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    /// Explicit device registration tokens (`registration_ids`).
    Tokens(Vec<String>),
    /// A device group notification key (`to`).
    GroupKey(String),
}

impl Recipient {
    pub fn tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Recipient::Tokens(tokens.into_iter().map(Into::into).collect())
    }

    pub fn group_key(key: impl Into<String>) -> Self {
        Recipient::GroupKey(key.into())
    }

    /// Build a recipient from the two optional forms, exactly one of which must be present.
    pub fn from_parts(
        tokens: Option<Vec<String>>,
        notification_key: Option<String>,
    ) -> Result<Self, GatewayError> {
        match (tokens, notification_key) {
            (Some(_), Some(_)) => Err(GatewayError::validation(
                "Provide either registration tokens or a notification key, not both",
            )),
            (Some(tokens), None) => Ok(Recipient::Tokens(tokens)),
            (None, Some(key)) => Ok(Recipient::GroupKey(key)),
            (None, None) => Err(GatewayError::validation("No recipients provided")),
        }
    }

    /// Check the preconditions for a send.
    pub fn validate(&self) -> Result<(), GatewayError> {
        match self {
            Recipient::Tokens(tokens) => {
                if tokens.is_empty() {
                    return Err(GatewayError::validation("No recipients provided"));
                }
                if tokens.iter().any(|t| t.is_empty()) {
                    return Err(GatewayError::validation("Registration tokens must not be empty"));
                }
                let mut seen = HashSet::with_capacity(tokens.len());
                for token in tokens {
                    if !seen.insert(token.as_str()) {
                        return Err(GatewayError::validation(format!(
                            "Duplicate registration token: {token}"
                        )));
                    }
                }
                Ok(())
            }
            Recipient::GroupKey(key) if key.is_empty() => {
                Err(GatewayError::validation("No recipients provided"))
            }
            Recipient::GroupKey(_) => Ok(()),
        }
    }

    pub fn token_list(&self) -> Option<&[String]> {
        match self {
            Recipient::Tokens(tokens) => Some(tokens),
            Recipient::GroupKey(_) => None,
        }
    }
}

/// Device group management intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Create,
    Add,
    Remove,
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationType::Create => write!(f, "create"),
            OperationType::Add => write!(f, "add"),
            OperationType::Remove => write!(f, "remove"),
        }
    }
}

/// A create/add/remove request against a notification key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub operation_type: OperationType,
    /// Application-chosen group name (`notification_key_name`)
    pub group_key_name: String,
    /// Gateway-issued key (`notification_key`), required unless creating
    #[serde(default)]
    pub group_key: Option<String>,
    pub tokens: Vec<String>,
    /// Turn an `add` against a vanished key into a `create`
    #[serde(default)]
    pub recreate_if_missing: bool,
}

impl Operation {
    pub fn create<I, S>(group_key_name: impl Into<String>, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            operation_type: OperationType::Create,
            group_key_name: group_key_name.into(),
            group_key: None,
            tokens: tokens.into_iter().map(Into::into).collect(),
            recreate_if_missing: false,
        }
    }

    pub fn add<I, S>(group_key_name: impl Into<String>, group_key: impl Into<String>, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            operation_type: OperationType::Add,
            group_key: Some(group_key.into()),
            ..Self::create(group_key_name, tokens)
        }
    }

    pub fn remove<I, S>(
        group_key_name: impl Into<String>,
        group_key: impl Into<String>,
        tokens: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            operation_type: OperationType::Remove,
            group_key: Some(group_key.into()),
            ..Self::create(group_key_name, tokens)
        }
    }

    pub fn with_recreate_if_missing(mut self, recreate: bool) -> Self {
        self.recreate_if_missing = recreate;
        self
    }

    /// Check the preconditions for a group operation.
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.group_key_name.is_empty() {
            return Err(GatewayError::validation(
                "Missing or invalid notification key name",
            ));
        }
        let has_key = self.group_key.as_deref().is_some_and(|k| !k.is_empty());
        if self.operation_type != OperationType::Create && !has_key {
            return Err(GatewayError::validation("Missing or invalid notification key"));
        }
        if self.tokens.is_empty() {
            return Err(GatewayError::validation("Missing registration tokens"));
        }
        Ok(())
    }

    /// The `create` that replaces this operation once its key is gone.
    pub fn with_fallback_to_create(&self) -> Self {
        Self {
            operation_type: OperationType::Create,
            group_key: None,
            ..self.clone()
        }
    }
}

/// Per-token error tags reported in `results[i].error`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TokenError {
    /// Transient: the gateway could not process the token this time.
    Unavailable,
    NotRegistered,
    InvalidRegistration,
    MissingRegistration,
    MismatchSenderId,
    MessageTooBig,
    MissingCollapseKey,
    QuotaExceeded,
    DeviceQuotaExceeded,
    Other(String),
}

impl TokenError {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "Unavailable" => TokenError::Unavailable,
            "NotRegistered" => TokenError::NotRegistered,
            "InvalidRegistration" => TokenError::InvalidRegistration,
            "MissingRegistration" => TokenError::MissingRegistration,
            "MismatchSenderId" => TokenError::MismatchSenderId,
            "MessageTooBig" => TokenError::MessageTooBig,
            "MissingCollapseKey" => TokenError::MissingCollapseKey,
            "QuotaExceeded" => TokenError::QuotaExceeded,
            "DeviceQuotaExceeded" => TokenError::DeviceQuotaExceeded,
            other => TokenError::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TokenError::Unavailable => "Unavailable",
            TokenError::NotRegistered => "NotRegistered",
            TokenError::InvalidRegistration => "InvalidRegistration",
            TokenError::MissingRegistration => "MissingRegistration",
            TokenError::MismatchSenderId => "MismatchSenderId",
            TokenError::MessageTooBig => "MessageTooBig",
            TokenError::MissingCollapseKey => "MissingCollapseKey",
            TokenError::QuotaExceeded => "QuotaExceeded",
            TokenError::DeviceQuotaExceeded => "DeviceQuotaExceeded",
            TokenError::Other(tag) => tag,
        }
    }

    /// Only `Unavailable` is worth re-sending.
    pub fn is_transient(&self) -> bool {
        matches!(self, TokenError::Unavailable)
    }
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TokenError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Outcome for one token of a token-list send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenResult {
    Delivered {
        message_id: String,
        /// Replacement token the caller should store instead of the one sent
        canonical_id: Option<String>,
    },
    Failed(TokenError),
}

impl TokenResult {
    pub fn is_delivered(&self) -> bool {
        matches!(self, TokenResult::Delivered { .. })
    }

    pub fn error(&self) -> Option<&TokenError> {
        match self {
            TokenResult::Failed(err) => Some(err),
            TokenResult::Delivered { .. } => None,
        }
    }
}

/// Result of one attempt against the gateway.
///
/// For token-list sends `results[i]` belongs to `tokens[i]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchOutcome {
    pub success_count: u64,
    pub failure_count: u64,
    /// Number of results carrying a canonical token remap
    pub canonical_ids: Option<u64>,
    pub multicast_id: Option<u64>,
    pub results: Vec<TokenResult>,
    /// Group members the gateway could not reach (group-key sends)
    pub failed_group_tokens: Option<Vec<String>>,
    /// Tokens the results correlate to; empty for group-key sends
    pub tokens: Vec<String>,
    /// Key returned by a successful group operation
    pub notification_key: Option<String>,
}

impl DispatchOutcome {
    pub fn total(&self) -> u64 {
        self.success_count + self.failure_count
    }

    /// Tokens whose result carries the transient `Unavailable` tag, in request order.
    pub fn unavailable_tokens(&self) -> Vec<String> {
        self.tokens
            .iter()
            .zip(&self.results)
            .filter(|(_, result)| result.error().is_some_and(TokenError::is_transient))
            .map(|(token, _)| token.clone())
            .collect()
    }

    /// Every token that was not delivered, paired with its error tag.
    pub fn failed_tokens(&self) -> Vec<(&str, &TokenError)> {
        self.tokens
            .iter()
            .zip(&self.results)
            .filter_map(|(token, result)| result.error().map(|err| (token.as_str(), err)))
            .collect()
    }

    /// `(sent token, canonical token)` pairs the caller should persist.
    pub fn canonical_remaps(&self) -> Vec<(&str, &str)> {
        self.tokens
            .iter()
            .zip(&self.results)
            .filter_map(|(token, result)| match result {
                TokenResult::Delivered {
                    canonical_id: Some(canonical),
                    ..
                } => Some((token.as_str(), canonical.as_str())),
                _ => None,
            })
            .collect()
    }

    /// Group-key partial failure: some members failed and the gateway named them.
    pub fn group_retry_tokens(&self) -> Option<&[String]> {
        if self.failure_count == 0 {
            return None;
        }
        self.failed_group_tokens
            .as_deref()
            .filter(|tokens| !tokens.is_empty())
    }
}
