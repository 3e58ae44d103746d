//! Payment Gateway Strategy Pattern
//!
//! Common interface for mobile-money checkout providers (CinetPay,
//! Flutterwave, ...). Checkout initiation and webhook reconciliation work
//! exclusively through this trait.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use billing_core::gateway::{PaymentGateway, CreatePaymentRequest};
//!
//! let gateway = CinetPayGateway::new(config)?;
//! let link = gateway.create_payment(&request).await?;
//! // Redirect the payer to: link.checkout_url
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::intent::{IntentStatus, ProviderKind};

/// Hosted checkout request
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreatePaymentRequest {
    /// Net amount in minor units
    pub amount: i64,

    pub currency: String,

    /// Our idempotency key, sent as the provider transaction id
    pub external_reference: String,

    /// Where the provider posts its asynchronous notification
    pub notify_url: Option<String>,

    /// Where the payer lands after checkout
    pub return_url: Option<String>,

    pub payer_phone: String,

    /// Human-readable line shown on the checkout page
    pub description: String,

    /// Opaque metadata echoed back by the provider
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Hosted checkout created by a provider
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutLink {
    pub checkout_url: String,
    pub provider_token: Option<String>,
}

/// Provider-side transaction status, normalized
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProviderStatus {
    Accepted,
    Refused,
    Pending,
}

impl ProviderStatus {
    /// Normalize a raw provider status string; anything unknown is pending
    pub fn from_provider(raw: &str) -> Self {
        match raw.trim().to_uppercase().as_str() {
            "ACCEPTED" => ProviderStatus::Accepted,
            "REFUSED" => ProviderStatus::Refused,
            _ => ProviderStatus::Pending,
        }
    }

    /// Intent status this provider status maps to
    pub fn outcome(self) -> IntentStatus {
        match self {
            ProviderStatus::Accepted => IntentStatus::Success,
            ProviderStatus::Refused => IntentStatus::Failed,
            ProviderStatus::Pending => IntentStatus::Pending,
        }
    }
}

/// Strategy trait for payment providers
///
/// Implement this trait to add a new payment rail. Adapters perform outbound
/// HTTP only and never touch local state.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Which rail this adapter speaks to
    fn provider(&self) -> ProviderKind;

    /// Open a hosted checkout for the payer
    async fn create_payment(&self, request: &CreatePaymentRequest) -> Result<CheckoutLink>;

    /// Ask the provider for the status of `external_reference`
    async fn check_status(&self, external_reference: &str) -> Result<ProviderStatus>;
}
