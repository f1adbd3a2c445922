use thiserror::Error;

/// Error taxonomy shared by the gateway client and the retry engines.
///
/// Retry decisions are made from the variant alone, see [`GatewayError::is_retryable`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// Malformed request detected before any network call.
    #[error("Validation error: {0}")]
    Validation(String),

    /// No HTTP response was received (connect failure, timeout, reset).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The gateway answered with a non-2xx status.
    #[error("Gateway error {code}: {message}")]
    Gateway { code: u16, message: String },

    /// A 2xx response whose body could not be interpreted.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The caller aborted the call while it was waiting to retry.
    #[error("Cancelled while waiting to retry")]
    Cancelled,
}

impl GatewayError {
    /// Whether the engines may re-drive the request that produced this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Transport(_) => true,
            GatewayError::Gateway { code, .. } => *code >= 500,
            GatewayError::Validation(_) | GatewayError::Parse(_) | GatewayError::Cancelled => false,
        }
    }

    /// Status-like code carried by the error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            GatewayError::Gateway { code, .. } => Some(*code),
            GatewayError::Validation(_) => Some(400),
            _ => None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        GatewayError::Validation(message.into())
    }
}
