//! # billing-payments
//!
//! Checkout initiation, webhook reconciliation and receipt rendering for
//! premium billing over mobile money.
//!
//! ## Payment flow
//!
//! ```text
//! ┌─────────────┐     ┌─────────────────┐     ┌─────────────┐
//! │   Client    │────▶│ Provider hosted │────▶│  Provider   │
//! │  (initiate) │     │  checkout page  │     │  webhook    │
//! └─────────────┘     └─────────────────┘     └──────┬──────┘
//!                                                    │
//!                           ┌────────────────────────▼──┐
//!                           │        Reconciler         │
//!                           │ verify → transition →     │
//!                           │ entitlement + receipt     │
//!                           └───────────────────────────┘
//! ```
//!
//! The provider is the only source of truth for a payment outcome. Outside
//! of sandbox mode the Reconciler ignores the status a notification claims
//! and asks the provider instead.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use billing_payments::{CheckoutService, Reconciler, VerificationMode};
//!
//! let checkout = CheckoutService::new(store.clone(), pricing, Some(gateway.clone()), settings);
//! let response = checkout.initiate(&user_id, request).await?;
//! // Redirect the payer to: response.payment_url
//!
//! let reconciler = Reconciler::new(store, VerificationMode::Provider(gateway));
//! reconciler.reconcile(normalize(payload)?, Utc::now()).await?;
//! ```

mod checkout;
mod error;
pub mod receipt;
mod webhook;

pub use checkout::{
    CheckoutResponse, CheckoutService, CheckoutSettings, LegacyPaymentRequest,
    LegacyPaymentResponse, MobileOperator, SubscriptionRequest,
};
pub use error::{PaymentError, Result};
pub use webhook::{
    decode_body, normalize, NormalizedProviderEvent, ReconcileReport, Reconciler, SandboxAck,
    TokenVerifier, VerificationMode,
};
