//! Receipts
//!
//! One immutable receipt per payment intent that reached `SUCCESS`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{BillingError, Result};
use crate::intent::{IntentStatus, Network, PaymentIntent, ProviderKind};
use crate::pricing::unit_price_for;

/// An issued receipt
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub id: Uuid,

    /// Intent this receipt settles (at most one receipt per intent)
    pub payment_intent_id: Uuid,

    pub user_id: String,

    /// `RCT-<requestId>`
    pub receipt_number: String,

    pub amount: i64,
    pub currency: String,
    pub months: u32,
    pub unit_price: i64,
    pub discount_percent: u8,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<Network>,

    pub msisdn: String,
    pub provider: ProviderKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_ref: Option<String>,

    pub issued_at: DateTime<Utc>,
}

impl Receipt {
    /// Receipt number derived from the intent's idempotency key
    pub fn number_for(request_id: &str) -> String {
        format!("RCT-{request_id}")
    }

    /// Issue a receipt for a successful intent
    pub fn issue(intent: &PaymentIntent, now: DateTime<Utc>) -> Result<Self> {
        if intent.status != IntentStatus::Success {
            return Err(BillingError::Validation(format!(
                "intent {} is {}, receipts require SUCCESS",
                intent.request_id, intent.status
            )));
        }

        let user_id = intent.user_id.clone().ok_or_else(|| {
            BillingError::Validation(format!("intent {} has no owner", intent.request_id))
        })?;
        let months = intent.months.max(1);

        Ok(Self {
            id: Uuid::new_v4(),
            payment_intent_id: intent.id,
            user_id,
            receipt_number: Self::number_for(&intent.request_id),
            amount: intent.amount,
            currency: intent.currency.clone(),
            months,
            unit_price: unit_price_for(intent.amount, months)?,
            discount_percent: intent.discount_percent,
            network: intent.network,
            msisdn: intent.msisdn.clone(),
            provider: intent.provider,
            provider_ref: intent.provider_ref.clone(),
            issued_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::PricingEngine;

    #[test]
    fn test_issue_from_successful_intent() {
        let quote = PricingEngine::new(2000).quote(12).unwrap();
        let mut pi = PaymentIntent::new("abc", Some("u1".into()), &quote, "XAF", ProviderKind::CinetPay, "242060000000", Utc::now())
            .with_network(Some(Network::Mtn));
        pi.status = IntentStatus::Success;

        let receipt = Receipt::issue(&pi, Utc::now()).unwrap();
        assert_eq!(receipt.receipt_number, "RCT-abc");
        assert_eq!(receipt.unit_price, 1700);
        assert_eq!(receipt.amount, 20400);
        assert_eq!(receipt.payment_intent_id, pi.id);
        assert_eq!(receipt.network, Some(Network::Mtn));
    }

    #[test]
    fn test_issue_requires_success() {
        let quote = PricingEngine::new(2000).quote(1).unwrap();
        let pi = PaymentIntent::new("abc", Some("u1".into()), &quote, "XAF", ProviderKind::CinetPay, "242060000000", Utc::now());
        assert!(Receipt::issue(&pi, Utc::now()).is_err());
    }
}
