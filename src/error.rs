//! Error types shared across the crate.

/// Errors surfaced synchronously by account operations.
#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    /// No account is registered under this uid.
    #[error("account not found: {uid}")]
    NotFound { uid: String },

    /// A target level must be a positive integer.
    #[error("invalid target level: {value}")]
    InvalidTargetLevel { value: i64 },

    /// An account with this uid is already registered.
    #[error("account already exists: {uid}")]
    AlreadyExists { uid: String },

    /// The registry is full.
    #[error("account limit reached ({max})")]
    AccountLimit { max: usize },
}

/// Errors from the work gateway.
///
/// A failed submission ends the run; a failed poll is coerced to zero
/// gained XP for that cycle.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The request never produced a response (unreachable, timed out).
    #[error("gateway request failed: {reason}")]
    RequestFailed { reason: String },

    /// The gateway answered with a non-success status.
    #[error("gateway returned HTTP {status}: {body}")]
    BadStatus { status: u16, body: String },

    /// The gateway answered with a body we could not interpret.
    #[error("invalid gateway response: {reason}")]
    InvalidResponse { reason: String },
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        GatewayError::RequestFailed {
            reason: e.to_string(),
        }
    }
}
