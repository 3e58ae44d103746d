//! # billing-gateway
//!
//! Payment provider adapters for premium billing.
//!
//! ## Providers
//!
//! - **CinetPay** (default): hosted mobile-money checkout, wired end to end
//! - **Flutterwave** (deprecated): compatibility stub, rejects every call
//!
//! ## Usage
//!
//! ```rust,ignore
//! use billing_gateway::cinetpay::{CinetPayConfig, CinetPayGateway};
//!
//! let gateway = CinetPayGateway::from_config(CinetPayConfig::from_env())?;
//! let link = gateway.create_payment(&request).await?;
//! ```

#[cfg(feature = "cinetpay")]
pub mod cinetpay;

#[cfg(feature = "flutterwave")]
pub mod flutterwave;

#[cfg(feature = "cinetpay")]
pub use cinetpay::{CinetPayConfig, CinetPayGateway};

#[cfg(feature = "flutterwave")]
pub use flutterwave::FlutterwaveGateway;

// Re-export core types for convenience
pub use billing_core::{
    BillingError, CheckoutLink, CreatePaymentRequest, PaymentGateway, ProviderStatus, Result,
};
