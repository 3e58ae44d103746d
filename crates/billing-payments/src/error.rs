//! Payment Error Types

use billing_core::BillingError;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Payment-related errors
#[derive(Error, Debug)]
pub enum PaymentError {
    /// Domain, storage or provider failure
    #[error(transparent)]
    Billing(#[from] BillingError),

    /// Webhook `x-token` verification failed
    #[error("Webhook signature invalid: {0}")]
    WebhookSignature(String),

    /// Webhook body could not be decoded
    #[error("Webhook parse error: {0}")]
    WebhookParse(String),

    /// Webhook carried no transaction reference
    #[error("Missing transaction reference")]
    MissingReference,

    /// Client-supplied amount disagrees with the monthly price
    #[error("Price mismatch. Expected {expected} {currency}/month")]
    PriceMismatch { expected: i64, currency: String },

    /// Sandbox or provider configuration refused
    #[error("Configuration error: {0}")]
    Config(String),

    /// Receipt document could not be produced
    #[error("Receipt render error: {0}")]
    Render(String),
}

impl PaymentError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            PaymentError::Billing(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Get user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            PaymentError::Billing(e) => e.user_message(),
            PaymentError::WebhookSignature(_) => "Webhook signature rejected.".into(),
            PaymentError::WebhookParse(_) => "Webhook payload could not be read.".into(),
            PaymentError::MissingReference => "Missing transaction reference.".into(),
            PaymentError::PriceMismatch { .. } | PaymentError::Config(_) => self.to_string(),
            PaymentError::Render(_) => "Receipt could not be generated.".into(),
        }
    }
}
