//! Payment Intents
//!
//! One tracked attempt to collect a subscription payment, keyed by a
//! caller-side idempotency key (`request_id`).
//!
//! ## State machine
//!
//! ```text
//! INITIATED ──▶ PENDING ──▶ AWAITING_CUSTOMER_VALIDATION ──▶ SUCCESS
//!     │            │                    │                   FAILED
//!     └────────────┴────────────────────┴─────────────────▶ CANCELED
//!                                                           EXPIRED
//!                                                           REVERSED
//! ```
//!
//! Status only moves forward. Terminal states never change again, so a late
//! `FAILED` cannot downgrade an intent that already reached `SUCCESS`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pricing::Quote;

/// Intent status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntentStatus {
    Initiated,
    Pending,
    AwaitingCustomerValidation,
    Success,
    Failed,
    Canceled,
    Expired,
    Reversed,
}

impl IntentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentStatus::Initiated => "INITIATED",
            IntentStatus::Pending => "PENDING",
            IntentStatus::AwaitingCustomerValidation => "AWAITING_CUSTOMER_VALIDATION",
            IntentStatus::Success => "SUCCESS",
            IntentStatus::Failed => "FAILED",
            IntentStatus::Canceled => "CANCELED",
            IntentStatus::Expired => "EXPIRED",
            IntentStatus::Reversed => "REVERSED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            IntentStatus::Success
                | IntentStatus::Failed
                | IntentStatus::Canceled
                | IntentStatus::Expired
                | IntentStatus::Reversed
        )
    }

    fn rank(self) -> u8 {
        match self {
            IntentStatus::Initiated => 0,
            IntentStatus::Pending => 1,
            IntentStatus::AwaitingCustomerValidation => 2,
            _ => 3,
        }
    }

    /// Whether `next` may replace `self`
    pub fn can_transition_to(&self, next: IntentStatus) -> bool {
        !self.is_terminal() && next != *self && next.rank() >= self.rank()
    }
}

impl std::fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment rail that owns an intent
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderKind {
    #[serde(rename = "cinetpay")]
    CinetPay,

    /// Kept for records created before the switch to CinetPay
    #[serde(rename = "flutterwave")]
    Flutterwave,

    #[serde(rename = "legacy_mobile_money")]
    LegacyMobileMoney,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::CinetPay => "cinetpay",
            ProviderKind::Flutterwave => "flutterwave",
            ProviderKind::LegacyMobileMoney => "legacy_mobile_money",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mobile-money carrier, for display and audit only
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Network {
    Mtn,
    Airtel,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Mtn => "MTN",
            Network::Airtel => "AIRTEL",
        }
    }
}

/// Raw provider callback kept in the audit trail
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderEventRecord {
    /// Provider event identifier (deduplication key)
    pub event_id: String,

    /// Status the provider reported (or the verified one)
    pub status: String,

    pub event_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
}

/// Result of applying a provider event to an intent
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// Status moved forward from `from`
    Applied { from: IntentStatus },

    /// Event recorded, status kept (same status, lower precedence, or terminal)
    Unchanged,

    /// Event id was already processed; nothing changed
    Duplicate,
}

/// A payment intent record
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntent {
    /// Internal identifier (receipts point here)
    pub id: Uuid,

    /// Idempotency key; also the provider `transaction_id`
    pub request_id: String,

    /// Owning account
    pub user_id: Option<String>,

    /// Net amount in minor units, fixed at creation
    pub amount: i64,

    pub currency: String,

    pub provider: ProviderKind,

    /// Operator label sent by legacy clients
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<Network>,

    /// Payer phone number
    pub msisdn: String,

    pub months: u32,

    pub discount_percent: u8,

    pub status: IntentStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator_transaction_id: Option<String>,

    /// Provider payment token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_ref: Option<String>,

    /// Hosted checkout URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_link: Option<String>,

    #[serde(default)]
    pub processed_event_ids: Vec<String>,

    #[serde(default)]
    pub events: Vec<ProviderEventRecord>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentIntent {
    /// Create a new intent in `INITIATED` from a priced quote
    pub fn new(
        request_id: impl Into<String>,
        user_id: Option<String>,
        quote: &Quote,
        currency: impl Into<String>,
        provider: ProviderKind,
        msisdn: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            request_id: request_id.into(),
            user_id,
            amount: quote.net_amount,
            currency: currency.into(),
            provider,
            operator: None,
            network: None,
            msisdn: msisdn.into(),
            months: quote.months,
            discount_percent: quote.discount_percent,
            status: IntentStatus::Initiated,
            operator_transaction_id: None,
            provider_ref: None,
            provider_link: None,
            processed_event_ids: Vec::new(),
            events: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_network(mut self, network: Option<Network>) -> Self {
        self.network = network;
        self
    }

    pub fn with_operator(mut self, operator: impl Into<String>) -> Self {
        self.operator = Some(operator.into());
        self
    }

    /// Whether `user_id` owns this intent
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id.as_deref() == Some(user_id)
    }

    /// Record a provider event and move status toward `outcome` if allowed.
    pub fn apply_provider_event(
        &mut self,
        outcome: IntentStatus,
        event: ProviderEventRecord,
        now: DateTime<Utc>,
    ) -> Transition {
        if self.processed_event_ids.iter().any(|id| *id == event.event_id) {
            return Transition::Duplicate;
        }

        self.processed_event_ids.push(event.event_id.clone());
        self.events.push(event);
        self.updated_at = now;

        if !self.status.can_transition_to(outcome) {
            return Transition::Unchanged;
        }

        let from = self.status;
        self.status = outcome;
        Transition::Applied { from }
    }
}

/// Generate a fresh idempotency key
pub fn generate_request_id() -> String {
    Uuid::new_v4().to_string()
}
