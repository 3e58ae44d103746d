//! Flutterwave Provider
//!
//! Deprecated rail. Intents created against it still resolve to an adapter,
//! but no new checkout or status call is ever sent.

use async_trait::async_trait;
use billing_core::{
    error::{BillingError, Result},
    gateway::{CheckoutLink, CreatePaymentRequest, PaymentGateway, ProviderStatus},
    intent::ProviderKind,
};

#[derive(Clone, Debug, Default)]
pub struct FlutterwaveGateway;

impl FlutterwaveGateway {
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PaymentGateway for FlutterwaveGateway {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Flutterwave
    }

    async fn create_payment(&self, request: &CreatePaymentRequest) -> Result<CheckoutLink> {
        tracing::warn!(reference = %request.external_reference, "Flutterwave checkout requested on deprecated rail");
        Err(BillingError::Unsupported("Flutterwave checkout is deprecated".into()))
    }

    async fn check_status(&self, _external_reference: &str) -> Result<ProviderStatus> {
        Err(BillingError::Unsupported("Flutterwave status checks are deprecated".into()))
    }
}
