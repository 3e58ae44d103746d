//! Provider Webhook Handling
//!
//! Turns an asynchronous provider notification into an intent status
//! transition, and settles the entitlement and receipt on success.

use std::sync::Arc;

use billing_core::{
    BillingStore, EventApplication, IntentStatus, PaymentGateway, ProviderEventRecord,
    ProviderStatus, Settlement,
};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde_json::{Map, Value};
use sha2::Sha256;

use crate::error::{PaymentError, Result};

type HmacSha256 = Hmac<Sha256>;

const REFERENCE_FIELDS: [&str; 3] = ["transaction_id", "transactionId", "cpm_trans_id"];
const STATUS_FIELDS: [&str; 2] = ["status", "cpm_result"];
const EVENT_ID_FIELDS: [&str; 3] = ["event_id", "cpm_payid", "payment_id"];

/// Notification fields covered by the CinetPay `x-token`, in signing order
const TOKEN_FIELDS: [&str; 16] = [
    "cpm_site_id",
    "cpm_trans_id",
    "cpm_trans_date",
    "cpm_amount",
    "cpm_currency",
    "signature",
    "payment_method",
    "cel_phone_num",
    "cpm_phone_prefixe",
    "cpm_language",
    "cpm_version",
    "cpm_payment_config",
    "cpm_page_action",
    "cpm_custom",
    "cpm_designation",
    "cpm_error_message",
];

/// Provider notification reduced to what reconciliation needs
#[derive(Clone, Debug, PartialEq)]
pub struct NormalizedProviderEvent {
    /// Our request id, echoed back by the provider
    pub reference: String,

    /// Self-reported provider status, upper-cased
    pub status: Option<String>,

    /// Provider event id, when the payload carries one
    pub event_id: Option<String>,

    /// Decoded body, kept for the audit trail
    pub raw: Value,
}

impl NormalizedProviderEvent {
    /// Deduplication key: `<provider id>:<outcome>`, or `<reference>:<outcome>`
    /// when the payload carries no id.
    ///
    /// The outcome is part of the key so a redelivery that verifies to a new
    /// result is applied instead of dropped as a duplicate.
    pub fn event_id_for(&self, outcome: IntentStatus) -> String {
        let id = self.event_id.as_deref().unwrap_or(&self.reference);
        format!("{id}:{outcome}")
    }
}

/// Decode a webhook body as JSON or as a urlencoded form
pub fn decode_body(body: &[u8], content_type: Option<&str>) -> Result<Value> {
    let is_form = content_type.is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));

    if !is_form {
        if let Ok(value @ Value::Object(_)) = serde_json::from_slice::<Value>(body) {
            return Ok(value);
        }
    }

    let pairs: Vec<(String, String)> =
        serde_urlencoded::from_bytes(body).map_err(|e| PaymentError::WebhookParse(e.to_string()))?;
    let fields: Map<String, Value> = pairs
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect();

    Ok(Value::Object(fields))
}

fn field(raw: &Value, name: &str) -> Option<String> {
    match raw.get(name)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn first_field(raw: &Value, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| field(raw, name))
}

/// Normalize a decoded provider payload.
///
/// Fails with `MissingReference` when no reference field is present.
pub fn normalize(raw: Value) -> Result<NormalizedProviderEvent> {
    let reference = first_field(&raw, &REFERENCE_FIELDS).ok_or(PaymentError::MissingReference)?;

    let status = first_field(&raw, &STATUS_FIELDS).map(|s| match s.as_str() {
        "00" => "ACCEPTED".to_string(),
        _ => s.to_uppercase(),
    });

    Ok(NormalizedProviderEvent {
        reference,
        status,
        event_id: first_field(&raw, &EVENT_ID_FIELDS),
        raw,
    })
}

/// `x-token` verifier for CinetPay notifications
#[derive(Clone)]
pub struct TokenVerifier {
    secret: String,
}

impl TokenVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self { secret: secret.into() }
    }

    fn mac(&self, raw: &Value) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| PaymentError::Config(e.to_string()))?;
        for name in TOKEN_FIELDS {
            mac.update(field(raw, name).unwrap_or_default().as_bytes());
        }
        Ok(mac)
    }

    /// Hex token the provider should have sent for `raw`
    pub fn expected(&self, raw: &Value) -> Result<String> {
        Ok(hex::encode(self.mac(raw)?.finalize().into_bytes()))
    }

    /// Constant-time comparison of `token` with the expected token
    pub fn verify(&self, raw: &Value, token: Option<&str>) -> Result<()> {
        let token = token.ok_or_else(|| PaymentError::WebhookSignature("missing x-token".into()))?;
        let bytes = hex::decode(token.trim())
            .map_err(|_| PaymentError::WebhookSignature("x-token is not hex".into()))?;

        self.mac(raw)?
            .verify_slice(&bytes)
            .map_err(|_| PaymentError::WebhookSignature("x-token mismatch".into()))
    }
}

/// Proof that sandbox payload trust passed startup validation.
///
/// Only [`SandboxAck::acknowledge`] builds one, and it refuses production.
#[derive(Clone, Copy, Debug)]
pub struct SandboxAck {
    _private: (),
}

impl SandboxAck {
    pub fn acknowledge(app_env: &str, allow_non_production: bool) -> Result<Self> {
        if app_env.eq_ignore_ascii_case("production") {
            return Err(PaymentError::Config(
                "sandbox mode cannot be enabled when APP_ENV=production".into(),
            ));
        }
        if !allow_non_production {
            return Err(PaymentError::Config(
                "sandbox mode requires ALLOW_NON_PRODUCTION=1".into(),
            ));
        }
        Ok(Self { _private: () })
    }
}

/// How the Reconciler decides an outcome
#[derive(Clone)]
pub enum VerificationMode {
    /// Trust the payload's own status (non-production only)
    Sandbox(SandboxAck),

    /// Ask the provider for the authoritative status
    Provider(Arc<dyn PaymentGateway>),

    /// No credentials: nothing can be confirmed
    Unverified,
}

impl VerificationMode {
    pub fn is_sandbox(&self) -> bool {
        matches!(self, VerificationMode::Sandbox(_))
    }
}

/// What a reconciliation did
#[derive(Clone, Debug)]
pub struct ReconcileReport {
    pub reference: String,

    /// Outcome derived for this delivery
    pub outcome: IntentStatus,

    /// Intent status after the update; `None` for an unknown reference
    pub status: Option<IntentStatus>,

    /// Event was already processed
    pub duplicate: bool,

    pub settlement: Option<Settlement>,
}

/// Webhook Reconciler
pub struct Reconciler {
    store: Arc<dyn BillingStore>,
    mode: VerificationMode,
    verifier: Option<TokenVerifier>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn BillingStore>, mode: VerificationMode) -> Self {
        Self {
            store,
            mode,
            verifier: None,
        }
    }

    /// Require a valid `x-token` on every notification
    #[must_use]
    pub fn with_token_verifier(mut self, verifier: TokenVerifier) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn mode(&self) -> &VerificationMode {
        &self.mode
    }

    /// Check the `x-token` header when a secret is configured
    pub fn authenticate(&self, raw: &Value, token: Option<&str>) -> Result<()> {
        match &self.verifier {
            Some(verifier) => verifier.verify(raw, token),
            None => Ok(()),
        }
    }

    /// Mapped outcome for `event`. Never fails: anything unconfirmed is `PENDING`.
    pub async fn determine_outcome(&self, event: &NormalizedProviderEvent) -> IntentStatus {
        match &self.mode {
            VerificationMode::Sandbox(_) => {
                ProviderStatus::from_provider(event.status.as_deref().unwrap_or_default()).outcome()
            }
            VerificationMode::Provider(gateway) => match gateway.check_status(&event.reference).await {
                Ok(status) => status.outcome(),
                Err(e) => {
                    tracing::warn!(reference = %event.reference, error = %e, "Provider verification failed, treating as pending");
                    IntentStatus::Pending
                }
            },
            VerificationMode::Unverified => IntentStatus::Pending,
        }
    }

    /// Apply one delivery. Safe to call any number of times with the same payload.
    pub async fn reconcile(&self, event: NormalizedProviderEvent, now: DateTime<Utc>) -> Result<ReconcileReport> {
        let outcome = self.determine_outcome(&event).await;
        let record = ProviderEventRecord {
            event_id: event.event_id_for(outcome),
            status: event.status.clone().unwrap_or_else(|| outcome.as_str().to_string()),
            event_at: now,
            raw: Some(event.raw.clone()),
        };

        let application = self
            .store
            .apply_provider_event(&event.reference, outcome, record, now)
            .await?;

        let mut report = ReconcileReport {
            reference: event.reference.clone(),
            outcome,
            status: application.intent().map(|i| i.status),
            duplicate: matches!(application, EventApplication::Duplicate(_)),
            settlement: None,
        };

        let intent = match &application {
            EventApplication::NotFound => {
                tracing::warn!(reference = %event.reference, "Webhook for unknown reference");
                return Ok(report);
            }
            EventApplication::Applied { intent, from } => {
                tracing::info!(reference = %event.reference, from = %from, to = %intent.status, "Payment intent transitioned");
                intent
            }
            EventApplication::Unchanged(intent) => {
                tracing::debug!(reference = %event.reference, status = %intent.status, outcome = %outcome, "Payment intent unchanged");
                intent
            }
            EventApplication::Duplicate(intent) => {
                tracing::debug!(reference = %event.reference, "Duplicate webhook event");
                intent
            }
        };

        // Settling on every SUCCESS delivery repairs a crash between the two writes
        if intent.status == IntentStatus::Success {
            let settlement = self.store.settle_success(intent.id, now).await?;
            if let Settlement::Issued { receipt, premium_until } = &settlement {
                tracing::info!(
                    reference = %event.reference,
                    receipt_number = %receipt.receipt_number,
                    premium_until = %premium_until,
                    "Premium granted"
                );
            }
            report.settlement = Some(settlement);
        }

        Ok(report)
    }
}
