//! # billing-core
//!
//! Domain model for premium subscription billing over mobile money.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          billing-core                            │
//! │  ┌─────────────┐  ┌──────────────────┐  ┌─────────────────────┐  │
//! │  │   Pricing   │  │  PaymentIntent   │  │   PaymentGateway    │  │
//! │  │   Engine    │──│  state machine   │──│   (Strategy)        │  │
//! │  └─────────────┘  └──────────────────┘  └─────────────────────┘  │
//! │  ┌─────────────┐  ┌──────────────────┐  ┌─────────────────────┐  │
//! │  │ Entitlement │  │     Receipt      │  │    BillingStore     │  │
//! │  │   Ledger    │  │                  │  │  (atomic updates)   │  │
//! │  └─────────────┘  └──────────────────┘  └─────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `PaymentGateway` trait lets checkout and reconciliation work against
//! CinetPay or any other mobile-money rail without changing billing logic.
//! The `BillingStore` trait is the only place state is mutated; every method
//! is a single atomic unit.

pub mod entitlement;
pub mod error;
pub mod gateway;
pub mod intent;
pub mod pricing;
pub mod receipt;
pub mod store;

pub use entitlement::{Plan, UserAccount};
pub use error::{BillingError, Result};
pub use gateway::{CheckoutLink, CreatePaymentRequest, PaymentGateway, ProviderStatus};
pub use intent::{IntentStatus, Network, PaymentIntent, ProviderEventRecord, ProviderKind, Transition};
pub use pricing::{PricingEngine, Quote};
pub use receipt::Receipt;
pub use store::{BillingStore, EventApplication, MemoryStore, Settlement};
