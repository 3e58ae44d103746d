//! Error Types

use thiserror::Error;

/// Result type alias for billing operations
pub type Result<T> = std::result::Result<T, BillingError>;

/// Billing error types
#[derive(Error, Debug)]
pub enum BillingError {
    /// Input rejected before any side effect
    #[error("Validation error: {0}")]
    Validation(String),

    /// Entity does not exist (or is not visible to the caller)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Uniqueness constraint violated
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Provider rejected the request or answered with something unusable
    #[error("Provider error{}: {message}", http_suffix(.status))]
    Provider {
        status: Option<u16>,
        message: String,
    },

    /// Provider did not answer within the configured timeout
    #[error("Provider timed out after {0}s")]
    ProviderTimeout(u64),

    /// Provider adapter exists for compatibility but is not wired
    #[error("Provider not supported: {0}")]
    Unsupported(String),

    /// Backing store failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn http_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

impl BillingError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BillingError::ProviderTimeout(_) | BillingError::Storage(_)
        ) || matches!(self, BillingError::Provider { status: Some(s), .. } if *s >= 500)
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            BillingError::Validation(msg) => format!("Invalid request: {msg}"),
            BillingError::NotFound(what) => format!("{what} not found."),
            BillingError::Conflict(_) => "This payment request already exists.".into(),
            BillingError::Provider { .. } => "Payment provider rejected the checkout. Please try again.".into(),
            BillingError::ProviderTimeout(_) => "Payment provider is not responding. Please try again.".into(),
            BillingError::Unsupported(_) => "This payment method is not available.".into(),
            _ => "An unexpected error occurred.".into(),
        }
    }
}
