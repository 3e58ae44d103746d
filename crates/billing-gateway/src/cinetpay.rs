//! CinetPay Provider
//!
//! Implementation of `PaymentGateway` for CinetPay hosted mobile-money checkout.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use billing_core::{
    error::{BillingError, Result},
    gateway::{CheckoutLink, CreatePaymentRequest, PaymentGateway, ProviderStatus},
    intent::ProviderKind,
};
use serde_json::{json, Value};

const DEFAULT_BASE_URL: &str = "https://api-checkout.cinetpay.com/v2";

/// CinetPay provider configuration
#[derive(Clone, Debug)]
pub struct CinetPayConfig {
    /// API base URL
    pub base_url: String,

    /// Merchant site id
    pub site_id: String,

    /// Merchant API key
    pub api_key: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for CinetPayConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            site_id: String::new(),
            api_key: String::new(),
            timeout_secs: 20,
        }
    }
}

impl CinetPayConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key/value source (environment, test maps)
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let base_url = get("CINETPAY_BASE_URL")
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.base_url);
        let timeout_secs = get("PROVIDER_TIMEOUT_SECS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.timeout_secs);

        Self {
            base_url,
            site_id: get("CINETPAY_SITE_ID").unwrap_or_default(),
            api_key: get("CINETPAY_API_KEY").unwrap_or_default(),
            timeout_secs,
        }
    }

    /// Credentials present (both site id and api key)
    pub fn is_configured(&self) -> bool {
        !self.site_id.trim().is_empty() && !self.api_key.trim().is_empty()
    }
}

/// CinetPay payment gateway
pub struct CinetPayGateway {
    client: reqwest::Client,
    config: CinetPayConfig,
}

impl CinetPayGateway {
    /// Create from configuration; credentials are required
    pub fn from_config(config: CinetPayConfig) -> Result<Self> {
        if !config.is_configured() {
            return Err(BillingError::Config(
                "CINETPAY_SITE_ID and CINETPAY_API_KEY must both be set".into(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            config,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// POST a JSON body and return the HTTP status with the parsed reply.
    ///
    /// Unparseable bodies come back as `Value::Null`.
    async fn post(&self, path: &str, body: &Value) -> Result<(u16, Value)> {
        let request = async {
            let response = self
                .client
                .post(self.endpoint(path))
                .json(body)
                .send()
                .await?;
            let status = response.status().as_u16();
            let text = response.text().await?;
            Ok::<_, reqwest::Error>((status, serde_json::from_str(&text).unwrap_or(Value::Null)))
        };

        with_timeout(self.config.timeout_secs, request)
            .await?
            .map_err(|e| BillingError::Provider {
                status: e.status().map(|s| s.as_u16()),
                message: e.to_string(),
            })
    }
}

async fn with_timeout<T>(secs: u64, fut: impl Future<Output = T>) -> Result<T> {
    tokio::time::timeout(Duration::from_secs(secs), fut)
        .await
        .map_err(|_| BillingError::ProviderTimeout(secs))
}

/// First non-empty string (or number) found at any of `pointers`
fn first_field(value: &Value, pointers: &[&str]) -> Option<String> {
    pointers.iter().find_map(|p| match value.pointer(p)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

#[async_trait]
impl PaymentGateway for CinetPayGateway {
    fn provider(&self) -> ProviderKind {
        ProviderKind::CinetPay
    }

    async fn create_payment(&self, request: &CreatePaymentRequest) -> Result<CheckoutLink> {
        let return_url = request.return_url.clone().or_else(|| request.notify_url.clone());
        let metadata = (!request.metadata.is_null()).then(|| request.metadata.to_string());

        let body = json!({
            "apikey": self.config.api_key,
            "site_id": self.config.site_id,
            "transaction_id": request.external_reference,
            "amount": request.amount,
            "currency": request.currency,
            "description": request.description,
            "channels": "MOBILE_MONEY",
            "notify_url": request.notify_url,
            "return_url": return_url,
            "customer_phone_number": request.payer_phone,
            "metadata": metadata,
        });

        tracing::debug!(transaction_id = %request.external_reference, amount = request.amount, "Creating CinetPay payment");
        let (status, reply) = self.post("payment", &body).await?;

        let accepted = first_field(&reply, &["/code"]).as_deref() == Some("201");
        let checkout_url = first_field(&reply, &["/data/payment_url"]);

        match checkout_url {
            Some(checkout_url) if accepted => Ok(CheckoutLink {
                checkout_url,
                provider_token: first_field(&reply, &["/data/payment_token"]),
            }),
            _ => {
                let message = first_field(&reply, &["/message", "/description"])
                    .unwrap_or_else(|| "CinetPay init failed".into());
                tracing::warn!(status, transaction_id = %request.external_reference, %message, "CinetPay rejected checkout");
                Err(BillingError::Provider { status: Some(status), message })
            }
        }
    }

    async fn check_status(&self, external_reference: &str) -> Result<ProviderStatus> {
        let body = json!({
            "apikey": self.config.api_key,
            "site_id": self.config.site_id,
            "transaction_id": external_reference,
        });

        let (status, reply) = self.post("payment/check", &body).await?;
        if !(200..300).contains(&status) {
            return Err(BillingError::Provider {
                status: Some(status),
                message: first_field(&reply, &["/message"]).unwrap_or_else(|| "CinetPay check failed".into()),
            });
        }

        let raw = first_field(
            &reply,
            &["/data/transaction/status", "/data/status", "/data/payment_status"],
        )
        .unwrap_or_default();

        Ok(ProviderStatus::from_provider(&raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway(base_url: &str) -> CinetPayGateway {
        CinetPayGateway::from_config(CinetPayConfig {
            base_url: base_url.into(),
            site_id: "site-1".into(),
            api_key: "key-1".into(),
            timeout_secs: 1,
        })
        .unwrap()
    }

    fn request() -> CreatePaymentRequest {
        CreatePaymentRequest {
            amount: 20400,
            currency: "XAF".into(),
            external_reference: "req-1".into(),
            notify_url: Some("https://api.example.com/billing/cinetpay/webhook".into()),
            return_url: None,
            payer_phone: "242060000000".into(),
            description: "Trivida Premium 12 mois".into(),
            metadata: json!({"months": 12}),
        }
    }

    #[test]
    fn test_config_from_lookup() {
        let config = CinetPayConfig::from_lookup(|key| match key {
            "CINETPAY_SITE_ID" => Some("site".into()),
            "CINETPAY_API_KEY" => Some("key".into()),
            "PROVIDER_TIMEOUT_SECS" => Some("5".into()),
            _ => None,
        });
        assert!(config.is_configured());
        assert_eq!(config.timeout_secs, 5);
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_config_defaults() {
        let config = CinetPayConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert!(!config.is_configured());
        assert!(CinetPayGateway::from_config(config).is_err());
    }

    #[tokio::test]
    async fn test_create_payment_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/payment"))
            .and(body_partial_json(json!({
                "transaction_id": "req-1",
                "amount": 20400,
                "channels": "MOBILE_MONEY",
                "return_url": "https://api.example.com/billing/cinetpay/webhook",
                "metadata": "{\"months\":12}",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": "201",
                "message": "CREATED",
                "data": {"payment_token": "tok-9", "payment_url": "https://checkout.cinetpay.com/pay/tok-9"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let link = gateway(&server.uri()).create_payment(&request()).await.unwrap();
        assert_eq!(link.checkout_url, "https://checkout.cinetpay.com/pay/tok-9");
        assert_eq!(link.provider_token.as_deref(), Some("tok-9"));
    }

    #[tokio::test]
    async fn test_create_payment_numeric_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/payment"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 201,
                "data": {"payment_token": 42, "payment_url": "https://checkout.cinetpay.com/pay/42"}
            })))
            .mount(&server)
            .await;

        let link = gateway(&server.uri()).create_payment(&request()).await.unwrap();
        assert_eq!(link.provider_token.as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn test_create_payment_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/payment"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "code": "608",
                "message": "MINIMUM_REQUIRED_FIELDS"
            })))
            .mount(&server)
            .await;

        let err = gateway(&server.uri()).create_payment(&request()).await.unwrap_err();
        match err {
            BillingError::Provider { status, message } => {
                assert_eq!(status, Some(400));
                assert_eq!(message, "MINIMUM_REQUIRED_FIELDS");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_create_payment_missing_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/payment"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"code": "201", "data": {}})))
            .mount(&server)
            .await;

        let err = gateway(&server.uri()).create_payment(&request()).await.unwrap_err();
        assert!(matches!(err, BillingError::Provider { status: Some(200), .. }));
    }

    #[tokio::test]
    async fn test_check_status_paths() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/payment/check"))
            .and(body_partial_json(json!({"transaction_id": "nested"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": "00",
                "data": {"transaction": {"status": "ACCEPTED"}}
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/payment/check"))
            .and(body_partial_json(json!({"transaction_id": "flat"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": "627",
                "data": {"status": "REFUSED"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/payment/check"))
            .and(body_partial_json(json!({"transaction_id": "legacy"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"payment_status": "WAITING_FOR_CUSTOMER"}
            })))
            .mount(&server)
            .await;

        let gw = gateway(&server.uri());
        assert_eq!(gw.check_status("nested").await.unwrap(), ProviderStatus::Accepted);
        assert_eq!(gw.check_status("flat").await.unwrap(), ProviderStatus::Refused);
        assert_eq!(gw.check_status("legacy").await.unwrap(), ProviderStatus::Pending);
    }

    #[tokio::test]
    async fn test_check_status_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/payment/check"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = gateway(&server.uri()).check_status("req-1").await.unwrap_err();
        assert!(matches!(err, BillingError::Provider { status: Some(503), .. }));
    }

    #[tokio::test]
    async fn test_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/payment/check"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"data": {"status": "ACCEPTED"}}))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let err = gateway(&server.uri()).check_status("req-1").await.unwrap_err();
        assert!(matches!(err, BillingError::ProviderTimeout(1)));
    }
}
