//! Application State

use std::sync::Arc;

use billing_core::{BillingStore, PaymentGateway, PricingEngine};
use billing_gateway::CinetPayGateway;
use billing_payments::{CheckoutService, Reconciler, SandboxAck, TokenVerifier, VerificationMode};

use crate::auth::AuthState;
use crate::config::AppConfig;
use crate::middleware::RateLimiter;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,

    /// Intents, receipts and accounts
    pub store: Arc<dyn BillingStore>,

    pub checkout: Arc<CheckoutService>,
    pub reconciler: Arc<Reconciler>,

    pub auth: AuthState,
    pub webhook_limiter: Arc<RateLimiter>,
}

impl AppState {
    /// Wire components from a validated configuration.
    ///
    /// `sandbox` is the token returned by `AppConfig::validate`.
    pub fn build(
        config: AppConfig,
        sandbox: Option<SandboxAck>,
        store: Arc<dyn BillingStore>,
    ) -> anyhow::Result<Self> {
        let gateway: Option<Arc<dyn PaymentGateway>> = if config.cinetpay.is_configured() {
            Some(Arc::new(CinetPayGateway::from_config(config.cinetpay.clone())?))
        } else {
            None
        };

        let mode = match (sandbox, &gateway) {
            (Some(ack), _) => VerificationMode::Sandbox(ack),
            (None, Some(gateway)) => VerificationMode::Provider(gateway.clone()),
            (None, None) => VerificationMode::Unverified,
        };

        let mut reconciler = Reconciler::new(store.clone(), mode);
        if let Some(secret) = &config.cinetpay_secret_key {
            reconciler = reconciler.with_token_verifier(TokenVerifier::new(secret.clone()));
        }

        let checkout = CheckoutService::new(
            store.clone(),
            PricingEngine::new(config.unit_price),
            gateway,
            config.checkout_settings(),
        );

        Ok(Self {
            auth: AuthState::new(&config.jwt_secret),
            webhook_limiter: Arc::new(RateLimiter::per_minute(config.webhook_rate_limit_per_min)),
            config: Arc::new(config),
            store,
            checkout: Arc::new(checkout),
            reconciler: Arc::new(reconciler),
        })
    }
}
