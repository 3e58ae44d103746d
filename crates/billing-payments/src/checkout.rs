//! Hosted Checkout Initiation
//!
//! Prices the request, persists a `PaymentIntent` in `INITIATED`, then opens
//! a hosted checkout on the configured provider.
//!
//! ```text
//! ┌─────────────┐     ┌─────────────────┐     ┌──────────────────┐
//! │   Client    │────▶│  CheckoutService │────▶│ Provider checkout│
//! │ (initiate)  │     │  quote + persist │     │   (hosted page)  │
//! └─────────────┘     └─────────────────┘     └──────────────────┘
//!        ▲                                              │
//!        └──────────── poll status ◀── webhook ◀────────┘
//! ```

use std::sync::Arc;

use billing_core::{
    intent::generate_request_id, BillingStore, CreatePaymentRequest, Network,
    PaymentGateway, PaymentIntent, PricingEngine, ProviderKind,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{PaymentError, Result};

/// Status string returned to clients right after initiation
pub const PENDING: &str = "pending";

/// Where provider callbacks and payer redirects go
#[derive(Clone, Debug)]
pub struct CheckoutSettings {
    /// ISO currency code every price is quoted in
    pub currency: String,

    pub notify_url: Option<String>,

    /// Falls back to the notify URL when unset
    pub return_url: Option<String>,
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        Self {
            currency: "XAF".into(),
            notify_url: None,
            return_url: None,
        }
    }
}

/// Request to start a premium subscription checkout
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRequest {
    /// Duration purchased, 1 to 24
    pub months: u32,

    #[serde(default)]
    pub network: Option<Network>,

    /// Payer MSISDN
    pub phone: String,
}

/// Result of a subscription checkout initiation
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub request_id: String,
    pub status: String,
    pub amount: i64,
    pub currency: String,
    pub months: u32,
    pub discount_percent: u8,

    /// Hosted checkout URL; absent when no provider is configured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_url: Option<String>,
}

/// Direct mobile-money operators accepted by the legacy endpoint
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MobileOperator {
    #[serde(rename = "MTN_MOMO_CG")]
    MtnMomoCg,

    #[serde(rename = "AIRTEL_MONEY_CG")]
    AirtelMoneyCg,
}

impl MobileOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            MobileOperator::MtnMomoCg => "MTN_MOMO_CG",
            MobileOperator::AirtelMoneyCg => "AIRTEL_MONEY_CG",
        }
    }

    pub fn network(&self) -> Network {
        match self {
            MobileOperator::MtnMomoCg => Network::Mtn,
            MobileOperator::AirtelMoneyCg => Network::Airtel,
        }
    }
}

/// Legacy single-month mobile-money request
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyPaymentRequest {
    /// Optional client-side price; must match the monthly price when given
    #[serde(default)]
    pub amount: Option<i64>,

    pub currency: String,
    pub operator: MobileOperator,
    pub phone: String,
}

/// Result of a legacy initiation
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyPaymentResponse {
    pub request_id: String,
    pub status: String,
    pub amount: i64,
    pub currency: String,
}

/// Checkout initiation service
pub struct CheckoutService {
    store: Arc<dyn BillingStore>,
    pricing: PricingEngine,
    gateway: Option<Arc<dyn PaymentGateway>>,
    settings: CheckoutSettings,
}

impl CheckoutService {
    /// `gateway` is `None` when provider credentials are not configured
    pub fn new(
        store: Arc<dyn BillingStore>,
        pricing: PricingEngine,
        gateway: Option<Arc<dyn PaymentGateway>>,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            store,
            pricing,
            gateway,
            settings,
        }
    }

    pub fn pricing(&self) -> &PricingEngine {
        &self.pricing
    }

    pub fn currency(&self) -> &str {
        &self.settings.currency
    }

    /// Whether a provider checkout will be opened
    pub fn has_gateway(&self) -> bool {
        self.gateway.is_some()
    }

    /// Start a subscription checkout for `user_id`.
    ///
    /// The intent is persisted before the provider is called. If the
    /// provider refuses, the error is returned and the intent stays
    /// `INITIATED`.
    pub async fn initiate(&self, user_id: &str, request: SubscriptionRequest) -> Result<CheckoutResponse> {
        let phone = validate_phone(&request.phone)?;
        let quote = self.pricing.quote(request.months)?;
        let now = Utc::now();

        self.store.ensure_user(user_id, now).await?;

        let provider = self
            .gateway
            .as_ref()
            .map_or(ProviderKind::CinetPay, |g| g.provider());
        let intent = PaymentIntent::new(
            generate_request_id(),
            Some(user_id.to_string()),
            &quote,
            self.settings.currency.clone(),
            provider,
            phone,
            now,
        )
        .with_network(request.network);
        let intent = self.store.insert_intent(intent).await?;

        tracing::info!(
            request_id = %intent.request_id,
            user_id = %user_id,
            months = quote.months,
            amount = quote.net_amount,
            discount = quote.discount_percent,
            "Payment intent created"
        );

        let payment_url = match &self.gateway {
            Some(gateway) => Some(self.open_checkout(gateway.as_ref(), &intent, now).await?),
            None => {
                tracing::debug!(request_id = %intent.request_id, "No provider configured, skipping checkout");
                None
            }
        };

        Ok(CheckoutResponse {
            request_id: intent.request_id,
            status: PENDING.into(),
            amount: quote.net_amount,
            currency: intent.currency,
            months: quote.months,
            discount_percent: quote.discount_percent,
            payment_url,
        })
    }

    async fn open_checkout(
        &self,
        gateway: &dyn PaymentGateway,
        intent: &PaymentIntent,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let notify_url = self.settings.notify_url.clone();
        let request = CreatePaymentRequest {
            amount: intent.amount,
            currency: intent.currency.clone(),
            external_reference: intent.request_id.clone(),
            return_url: self.settings.return_url.clone().or_else(|| notify_url.clone()),
            notify_url,
            payer_phone: intent.msisdn.clone(),
            description: format!("Trivida Premium {} mois", intent.months),
            metadata: json!({
                "months": intent.months,
                "discountPercent": intent.discount_percent,
                "network": intent.network.map(|n| n.as_str()),
            }),
        };

        let link = gateway.create_payment(&request).await.map_err(|e| {
            tracing::warn!(
                request_id = %intent.request_id,
                provider = %gateway.provider().as_str(),
                error = %e,
                "Checkout creation failed, intent left INITIATED"
            );
            PaymentError::from(e)
        })?;

        self.store
            .record_checkout(&intent.request_id, link.provider_token, link.checkout_url.clone(), now)
            .await?;

        Ok(link.checkout_url)
    }

    /// Legacy direct-operator initiation: always one month at the monthly price
    pub async fn initiate_legacy(
        &self,
        user_id: &str,
        request: LegacyPaymentRequest,
    ) -> Result<LegacyPaymentResponse> {
        let phone = validate_phone(&request.phone)?;
        if request.currency != self.settings.currency {
            return Err(billing_core::BillingError::Validation(format!(
                "currency must be {}",
                self.settings.currency
            ))
            .into());
        }

        let quote = self.pricing.quote(1)?;
        if let Some(amount) = request.amount {
            if amount != quote.net_amount {
                return Err(PaymentError::PriceMismatch {
                    expected: quote.net_amount,
                    currency: self.settings.currency.clone(),
                });
            }
        }

        let now = Utc::now();
        self.store.ensure_user(user_id, now).await?;

        let intent = PaymentIntent::new(
            generate_request_id(),
            Some(user_id.to_string()),
            &quote,
            request.currency,
            ProviderKind::LegacyMobileMoney,
            phone,
            now,
        )
        .with_network(Some(request.operator.network()))
        .with_operator(request.operator.as_str());
        let intent = self.store.insert_intent(intent).await?;

        tracing::info!(
            request_id = %intent.request_id,
            user_id = %user_id,
            operator = %request.operator.as_str(),
            "Legacy mobile-money intent created"
        );

        Ok(LegacyPaymentResponse {
            request_id: intent.request_id,
            status: PENDING.into(),
            amount: intent.amount,
            currency: intent.currency,
        })
    }
}

const PHONE_LENGTH: std::ops::RangeInclusive<usize> = 8..=20;

/// Trimmed MSISDN, 8 to 20 characters
fn validate_phone(phone: &str) -> Result<String> {
    let phone = phone.trim();
    if !PHONE_LENGTH.contains(&phone.chars().count()) {
        return Err(billing_core::BillingError::Validation(format!(
            "phone must be between {} and {} characters",
            PHONE_LENGTH.start(),
            PHONE_LENGTH.end()
        ))
        .into());
    }
    Ok(phone.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use billing_core::{BillingError, CheckoutLink, IntentStatus, MemoryStore, ProviderStatus};
    use std::sync::Mutex;

    struct FakeGateway {
        fail: bool,
        seen: Mutex<Vec<CreatePaymentRequest>>,
    }

    impl FakeGateway {
        fn new(fail: bool) -> Self {
            Self { fail, seen: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl PaymentGateway for FakeGateway {
        fn provider(&self) -> ProviderKind {
            ProviderKind::CinetPay
        }

        async fn create_payment(&self, request: &CreatePaymentRequest) -> billing_core::Result<CheckoutLink> {
            self.seen.lock().unwrap().push(request.clone());
            if self.fail {
                return Err(BillingError::Provider { status: Some(400), message: "refused".into() });
            }
            Ok(CheckoutLink {
                checkout_url: format!("https://checkout.test/{}", request.external_reference),
                provider_token: Some("tok-1".into()),
            })
        }

        async fn check_status(&self, _reference: &str) -> billing_core::Result<ProviderStatus> {
            Ok(ProviderStatus::Pending)
        }
    }

    fn settings() -> CheckoutSettings {
        CheckoutSettings {
            notify_url: Some("https://api.test/billing/cinetpay/webhook".into()),
            ..Default::default()
        }
    }

    fn request(months: u32) -> SubscriptionRequest {
        SubscriptionRequest { months, network: Some(Network::Mtn), phone: "242060000000".into() }
    }

    #[tokio::test]
    async fn test_initiate_without_provider() {
        let store = Arc::new(MemoryStore::new());
        let service = CheckoutService::new(store.clone(), PricingEngine::default(), None, settings());

        let response = service.initiate("user-1", request(1)).await.unwrap();
        assert_eq!(response.status, "pending");
        assert_eq!(response.amount, 2000);
        assert_eq!(response.discount_percent, 0);
        assert!(response.payment_url.is_none());

        let intent = store.find_intent(&response.request_id).await.unwrap().unwrap();
        assert_eq!(intent.status, IntentStatus::Initiated);
        assert!(intent.is_owned_by("user-1"));
        assert!(store.get_user("user-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_initiate_with_provider() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(FakeGateway::new(false));
        let service = CheckoutService::new(store.clone(), PricingEngine::default(), Some(gateway.clone() as Arc<dyn PaymentGateway>), settings());

        let response = service.initiate("user-1", request(12)).await.unwrap();
        assert_eq!(response.amount, 20400);
        assert_eq!(response.discount_percent, 15);
        let url = response.payment_url.unwrap();
        assert!(url.ends_with(&response.request_id));

        let sent = gateway.seen.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].external_reference, response.request_id);
        assert_eq!(sent[0].amount, 20400);
        assert_eq!(sent[0].return_url, sent[0].notify_url);
        assert_eq!(sent[0].metadata["network"], "MTN");

        let intent = store.find_intent(&response.request_id).await.unwrap().unwrap();
        assert_eq!(intent.provider_link.as_deref(), Some(url.as_str()));
        assert_eq!(intent.provider_ref.as_deref(), Some("tok-1"));
    }

    #[tokio::test]
    async fn test_provider_failure_keeps_intent() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(FakeGateway::new(true));
        let service = CheckoutService::new(store.clone(), PricingEngine::default(), Some(gateway.clone() as Arc<dyn PaymentGateway>), settings());

        let err = service.initiate("user-1", request(3)).await.unwrap_err();
        assert!(matches!(err, PaymentError::Billing(BillingError::Provider { status: Some(400), .. })));

        // Intent survives for inspection but never looks paid
        let request_id = gateway.seen.lock().unwrap()[0].external_reference.clone();
        let intent = store.find_intent(&request_id).await.unwrap().unwrap();
        assert_eq!(intent.status, IntentStatus::Initiated);
        assert!(intent.provider_link.is_none());
        assert!(intent.provider_ref.is_none());
        assert!(store.list_receipts("user-1", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_phone_length_validated() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(FakeGateway::new(false));
        let service = CheckoutService::new(store.clone(), PricingEngine::default(), Some(gateway.clone() as Arc<dyn PaymentGateway>), settings());

        for phone in ["1", "  1234567  ", "123456789012345678901", ""] {
            let request = SubscriptionRequest { months: 1, network: None, phone: phone.into() };
            let err = service.initiate("user-1", request).await.unwrap_err();
            assert!(matches!(err, PaymentError::Billing(BillingError::Validation(_))), "phone {phone:?}");

            let legacy = LegacyPaymentRequest {
                amount: None,
                currency: "XAF".into(),
                operator: MobileOperator::MtnMomoCg,
                phone: phone.into(),
            };
            assert!(service.initiate_legacy("user-1", legacy).await.is_err());
        }
        assert!(gateway.seen.lock().unwrap().is_empty());

        let request = SubscriptionRequest { months: 1, network: None, phone: " 24206000 ".into() };
        let response = service.initiate("user-1", request).await.unwrap();
        let intent = store.find_intent(&response.request_id).await.unwrap().unwrap();
        assert_eq!(intent.msisdn, "24206000");
    }

    #[tokio::test]
    async fn test_invalid_months_has_no_side_effect() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(FakeGateway::new(false));
        let service = CheckoutService::new(store.clone(), PricingEngine::default(), Some(gateway.clone() as Arc<dyn PaymentGateway>), settings());

        for months in [0, 25] {
            let err = service.initiate("user-1", request(months)).await.unwrap_err();
            assert!(matches!(err, PaymentError::Billing(BillingError::Validation(_))));
        }
        assert!(gateway.seen.lock().unwrap().is_empty());
        assert!(store.get_user("user-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_each_initiation_gets_fresh_request_id() {
        let service = CheckoutService::new(Arc::new(MemoryStore::new()), PricingEngine::default(), None, settings());
        let a = service.initiate("user-1", request(1)).await.unwrap();
        let b = service.initiate("user-1", request(1)).await.unwrap();
        assert_ne!(a.request_id, b.request_id);
    }

    #[tokio::test]
    async fn test_legacy_initiation() {
        let store = Arc::new(MemoryStore::new());
        let service = CheckoutService::new(store.clone(), PricingEngine::default(), None, settings());

        let request = LegacyPaymentRequest {
            amount: Some(2000),
            currency: "XAF".into(),
            operator: MobileOperator::AirtelMoneyCg,
            phone: "242050000000".into(),
        };
        let response = service.initiate_legacy("user-1", request).await.unwrap();
        assert_eq!(response.amount, 2000);

        let intent = store.find_intent(&response.request_id).await.unwrap().unwrap();
        assert_eq!(intent.provider, ProviderKind::LegacyMobileMoney);
        assert_eq!(intent.network, Some(Network::Airtel));
        assert_eq!(intent.operator.as_deref(), Some("AIRTEL_MONEY_CG"));
    }

    #[tokio::test]
    async fn test_legacy_price_mismatch() {
        let service = CheckoutService::new(Arc::new(MemoryStore::new()), PricingEngine::default(), None, settings());
        let request = LegacyPaymentRequest {
            amount: Some(1500),
            currency: "XAF".into(),
            operator: MobileOperator::MtnMomoCg,
            phone: "242060000000".into(),
        };

        let err = service.initiate_legacy("user-1", request).await.unwrap_err();
        assert_eq!(err.to_string(), "Price mismatch. Expected 2000 XAF/month");
    }

    #[test]
    fn test_request_shapes() {
        let request: SubscriptionRequest =
            serde_json::from_str(r#"{"months":6,"network":"AIRTEL","phone":"242050000000"}"#).unwrap();
        assert_eq!(request.network, Some(Network::Airtel));

        let legacy: LegacyPaymentRequest =
            serde_json::from_str(r#"{"currency":"XAF","operator":"MTN_MOMO_CG","phone":"1"}"#).unwrap();
        assert_eq!(legacy.operator, MobileOperator::MtnMomoCg);
        assert!(legacy.amount.is_none());
    }
}
