//! Billing Storage
//!
//! Persistence seam for intents, receipts and account entitlements.
//!
//! Every method is one atomic unit. Concurrent webhook deliveries rely on
//! `apply_provider_event` being a find-and-modify and on `settle_success`
//! creating the receipt and extending the entitlement together, keyed by
//! the intent id.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::entitlement::UserAccount;
use crate::error::{BillingError, Result};
use crate::intent::{IntentStatus, PaymentIntent, ProviderEventRecord, Transition};
use crate::receipt::Receipt;

/// Largest page returned by `list_receipts`
pub const MAX_RECEIPT_PAGE: usize = 50;

/// Result of applying a provider event to the intent matching a reference
#[derive(Clone, Debug)]
pub enum EventApplication {
    /// No intent has this reference
    NotFound,

    /// Status moved forward
    Applied {
        intent: PaymentIntent,
        from: IntentStatus,
    },

    /// Event recorded, status kept
    Unchanged(PaymentIntent),

    /// Event already processed
    Duplicate(PaymentIntent),
}

impl EventApplication {
    /// The intent as it is after the update, if one matched
    pub fn intent(&self) -> Option<&PaymentIntent> {
        match self {
            EventApplication::NotFound => None,
            EventApplication::Applied { intent, .. }
            | EventApplication::Unchanged(intent)
            | EventApplication::Duplicate(intent) => Some(intent),
        }
    }
}

/// Result of settling a successful intent
#[derive(Clone, Debug)]
pub enum Settlement {
    /// Entitlement extended and receipt created in this call
    Issued {
        receipt: Receipt,
        premium_until: DateTime<Utc>,
    },

    /// A receipt already existed; nothing changed
    AlreadySettled(Receipt),
}

impl Settlement {
    pub fn receipt(&self) -> &Receipt {
        match self {
            Settlement::Issued { receipt, .. } | Settlement::AlreadySettled(receipt) => receipt,
        }
    }
}

/// Billing storage trait
#[async_trait]
pub trait BillingStore: Send + Sync {
    /// Insert a new intent; fails with `Conflict` if the request id exists
    async fn insert_intent(&self, intent: PaymentIntent) -> Result<PaymentIntent>;

    /// Get intent by request id
    async fn find_intent(&self, request_id: &str) -> Result<Option<PaymentIntent>>;

    /// Get intent by request id, only if `user_id` owns it
    async fn find_intent_for_user(&self, request_id: &str, user_id: &str) -> Result<Option<PaymentIntent>>;

    /// Store provider correlation fields after a checkout was opened
    async fn record_checkout(
        &self,
        request_id: &str,
        provider_ref: Option<String>,
        provider_link: String,
        now: DateTime<Utc>,
    ) -> Result<PaymentIntent>;

    /// Find-and-modify the intent whose request id is `reference`
    async fn apply_provider_event(
        &self,
        reference: &str,
        outcome: IntentStatus,
        event: ProviderEventRecord,
        now: DateTime<Utc>,
    ) -> Result<EventApplication>;

    /// Extend the owner's entitlement and issue the receipt, exactly once per intent
    async fn settle_success(&self, intent_id: Uuid, now: DateTime<Utc>) -> Result<Settlement>;

    /// Get an account
    async fn get_user(&self, user_id: &str) -> Result<Option<UserAccount>>;

    /// Get an account, creating a trial account on first sight
    async fn ensure_user(&self, user_id: &str, now: DateTime<Utc>) -> Result<UserAccount>;

    /// Save or replace an account
    async fn save_user(&self, user: &UserAccount) -> Result<()>;

    /// Get receipt by id, only if `user_id` owns it
    async fn get_receipt(&self, receipt_id: Uuid, user_id: &str) -> Result<Option<Receipt>>;

    /// Get the receipt issued for an intent
    async fn receipt_for_intent(&self, intent_id: Uuid) -> Result<Option<Receipt>>;

    /// Newest receipts first, at most `limit` (clamped to `MAX_RECEIPT_PAGE`)
    async fn list_receipts(&self, user_id: &str, limit: usize) -> Result<Vec<Receipt>>;
}

#[derive(Default)]
struct Tables {
    intents: HashMap<Uuid, PaymentIntent>,
    by_request_id: HashMap<String, Uuid>,
    receipts: HashMap<Uuid, Receipt>,
    receipt_by_intent: HashMap<Uuid, Uuid>,
    users: HashMap<String, UserAccount>,
}

impl Tables {
    fn intent_by_request_mut(&mut self, request_id: &str) -> Option<&mut PaymentIntent> {
        let id = self.by_request_id.get(request_id)?;
        self.intents.get_mut(id)
    }
}

/// In-memory billing store (for development and tests)
///
/// All tables sit behind one lock so multi-table updates are atomic.
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }
}

#[async_trait]
impl BillingStore for MemoryStore {
    async fn insert_intent(&self, intent: PaymentIntent) -> Result<PaymentIntent> {
        let mut tables = self.tables.write().await;

        if tables.by_request_id.contains_key(&intent.request_id) {
            return Err(BillingError::Conflict(format!(
                "payment intent {} already exists",
                intent.request_id
            )));
        }

        tables.by_request_id.insert(intent.request_id.clone(), intent.id);
        tables.intents.insert(intent.id, intent.clone());
        Ok(intent)
    }

    async fn find_intent(&self, request_id: &str) -> Result<Option<PaymentIntent>> {
        let tables = self.tables.read().await;
        Ok(tables
            .by_request_id
            .get(request_id)
            .and_then(|id| tables.intents.get(id))
            .cloned())
    }

    async fn find_intent_for_user(&self, request_id: &str, user_id: &str) -> Result<Option<PaymentIntent>> {
        Ok(self
            .find_intent(request_id)
            .await?
            .filter(|intent| intent.is_owned_by(user_id)))
    }

    async fn record_checkout(
        &self,
        request_id: &str,
        provider_ref: Option<String>,
        provider_link: String,
        now: DateTime<Utc>,
    ) -> Result<PaymentIntent> {
        let mut tables = self.tables.write().await;
        let intent = tables
            .intent_by_request_mut(request_id)
            .ok_or_else(|| BillingError::NotFound(format!("payment intent {request_id}")))?;

        intent.provider_ref = provider_ref;
        intent.provider_link = Some(provider_link);
        intent.updated_at = now;
        Ok(intent.clone())
    }

    async fn apply_provider_event(
        &self,
        reference: &str,
        outcome: IntentStatus,
        event: ProviderEventRecord,
        now: DateTime<Utc>,
    ) -> Result<EventApplication> {
        let mut tables = self.tables.write().await;
        let Some(intent) = tables.intent_by_request_mut(reference) else {
            return Ok(EventApplication::NotFound);
        };

        let application = match intent.apply_provider_event(outcome, event, now) {
            Transition::Applied { from } => EventApplication::Applied {
                intent: intent.clone(),
                from,
            },
            Transition::Unchanged => EventApplication::Unchanged(intent.clone()),
            Transition::Duplicate => EventApplication::Duplicate(intent.clone()),
        };
        Ok(application)
    }

    async fn settle_success(&self, intent_id: Uuid, now: DateTime<Utc>) -> Result<Settlement> {
        let mut tables = self.tables.write().await;

        if let Some(existing) = tables
            .receipt_by_intent
            .get(&intent_id)
            .and_then(|id| tables.receipts.get(id))
        {
            return Ok(Settlement::AlreadySettled(existing.clone()));
        }

        let intent = tables
            .intents
            .get(&intent_id)
            .ok_or_else(|| BillingError::NotFound(format!("payment intent {intent_id}")))?;
        let receipt = Receipt::issue(intent, now)?;

        let mut user = tables
            .users
            .get(&receipt.user_id)
            .cloned()
            .ok_or_else(|| BillingError::NotFound(format!("user {}", receipt.user_id)))?;
        let premium_until = user.extend_premium(receipt.months, now)?;

        // Both writes commit together under the same guard
        tables.users.insert(user.id.clone(), user);
        tables.receipt_by_intent.insert(intent_id, receipt.id);
        tables.receipts.insert(receipt.id, receipt.clone());

        Ok(Settlement::Issued { receipt, premium_until })
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<UserAccount>> {
        let tables = self.tables.read().await;
        Ok(tables.users.get(user_id).cloned())
    }

    async fn ensure_user(&self, user_id: &str, now: DateTime<Utc>) -> Result<UserAccount> {
        let mut tables = self.tables.write().await;
        let user = tables
            .users
            .entry(user_id.to_string())
            .or_insert_with(|| UserAccount::new(user_id, now));
        Ok(user.clone())
    }

    async fn save_user(&self, user: &UserAccount) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn get_receipt(&self, receipt_id: Uuid, user_id: &str) -> Result<Option<Receipt>> {
        let tables = self.tables.read().await;
        Ok(tables
            .receipts
            .get(&receipt_id)
            .filter(|r| r.user_id == user_id)
            .cloned())
    }

    async fn receipt_for_intent(&self, intent_id: Uuid) -> Result<Option<Receipt>> {
        let tables = self.tables.read().await;
        Ok(tables
            .receipt_by_intent
            .get(&intent_id)
            .and_then(|id| tables.receipts.get(id))
            .cloned())
    }

    async fn list_receipts(&self, user_id: &str, limit: usize) -> Result<Vec<Receipt>> {
        let tables = self.tables.read().await;
        let mut receipts: Vec<Receipt> = tables
            .receipts
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();

        receipts.sort_by(|a, b| b.issued_at.cmp(&a.issued_at));
        receipts.truncate(limit.min(MAX_RECEIPT_PAGE));
        Ok(receipts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entitlement::Plan;
    use crate::intent::ProviderKind;
    use crate::pricing::PricingEngine;
    use chrono::Duration;
    use std::sync::Arc;

    fn intent(request_id: &str, user: &str, months: u32) -> PaymentIntent {
        let quote = PricingEngine::new(2000).quote(months).unwrap();
        PaymentIntent::new(request_id, Some(user.into()), &quote, "XAF", ProviderKind::CinetPay, "242060000000", Utc::now())
    }

    fn event(id: &str) -> ProviderEventRecord {
        ProviderEventRecord {
            event_id: id.into(),
            status: "ACCEPTED".into(),
            event_at: Utc::now(),
            raw: None,
        }
    }

    #[tokio::test]
    async fn test_duplicate_request_id_is_rejected() {
        let store = MemoryStore::new();
        store.insert_intent(intent("r1", "u1", 1)).await.unwrap();

        let err = store.insert_intent(intent("r1", "u2", 3)).await.unwrap_err();
        assert!(matches!(err, BillingError::Conflict(_)));

        // Original record is untouched
        let stored = store.find_intent("r1").await.unwrap().unwrap();
        assert!(stored.is_owned_by("u1"));
        assert_eq!(stored.months, 1);
    }

    #[tokio::test]
    async fn test_record_checkout() {
        let store = MemoryStore::new();
        store.insert_intent(intent("r1", "u1", 1)).await.unwrap();
        let now = Utc::now() + Duration::seconds(5);

        let updated = store
            .record_checkout("r1", Some("tok".into()), "https://pay.test/r1".into(), now)
            .await
            .unwrap();
        assert_eq!(updated.provider_ref.as_deref(), Some("tok"));
        assert_eq!(updated.provider_link.as_deref(), Some("https://pay.test/r1"));
        assert_eq!(updated.updated_at, now);
        assert_eq!(updated.status, IntentStatus::Initiated);

        let missing = store.record_checkout("r2", None, "https://pay.test/r2".into(), now).await;
        assert!(matches!(missing, Err(BillingError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_owner_scoped_lookup() {
        let store = MemoryStore::new();
        store.insert_intent(intent("r1", "u1", 1)).await.unwrap();

        assert!(store.find_intent_for_user("r1", "u1").await.unwrap().is_some());
        assert!(store.find_intent_for_user("r1", "u2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_apply_event_unknown_reference() {
        let store = MemoryStore::new();
        let result = store
            .apply_provider_event("missing", IntentStatus::Success, event("e1"), Utc::now())
            .await
            .unwrap();
        assert!(matches!(result, EventApplication::NotFound));
    }

    #[tokio::test]
    async fn test_settle_success_once() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.ensure_user("u1", now).await.unwrap();
        let pi = store.insert_intent(intent("r1", "u1", 12)).await.unwrap();

        store
            .apply_provider_event("r1", IntentStatus::Success, event("e1"), now)
            .await
            .unwrap();

        let first = store.settle_success(pi.id, now).await.unwrap();
        let Settlement::Issued { receipt, premium_until } = first else {
            panic!("expected a fresh settlement");
        };
        assert_eq!(receipt.receipt_number, "RCT-r1");
        assert!(premium_until >= now + Duration::days(12 * 28));

        let second = store.settle_success(pi.id, now).await.unwrap();
        assert!(matches!(second, Settlement::AlreadySettled(ref r) if r.id == receipt.id));

        // Entitlement extended once only
        let user = store.get_user("u1").await.unwrap().unwrap();
        assert_eq!(user.plan, Plan::Premium);
        assert_eq!(user.premium_until, Some(premium_until));
        assert_eq!(store.list_receipts("u1", 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_settle_without_user_writes_nothing() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let pi = store.insert_intent(intent("r1", "ghost", 1)).await.unwrap();
        store
            .apply_provider_event("r1", IntentStatus::Success, event("e1"), now)
            .await
            .unwrap();

        assert!(matches!(store.settle_success(pi.id, now).await, Err(BillingError::NotFound(_))));
        assert!(store.receipt_for_intent(pi.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_settlement_issues_one_receipt() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        store.ensure_user("u1", now).await.unwrap();
        let pi = store.insert_intent(intent("r1", "u1", 1)).await.unwrap();
        store
            .apply_provider_event("r1", IntentStatus::Success, event("e1"), now)
            .await
            .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.settle_success(pi.id, now).await })
            })
            .collect();

        let mut issued = 0;
        for handle in handles {
            if matches!(handle.await.unwrap().unwrap(), Settlement::Issued { .. }) {
                issued += 1;
            }
        }
        assert_eq!(issued, 1);
        assert_eq!(store.list_receipts("u1", 50).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_receipts_are_owner_scoped_and_newest_first() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.ensure_user("u1", now).await.unwrap();

        for (i, rid) in ["r1", "r2", "r3"].iter().enumerate() {
            let pi = store.insert_intent(intent(rid, "u1", 1)).await.unwrap();
            store
                .apply_provider_event(rid, IntentStatus::Success, event(rid), now)
                .await
                .unwrap();
            store
                .settle_success(pi.id, now + Duration::minutes(i as i64))
                .await
                .unwrap();
        }

        let page = store.list_receipts("u1", 2).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].receipt_number, "RCT-r3");
        assert_eq!(page[1].receipt_number, "RCT-r2");

        let id = page[0].id;
        assert!(store.get_receipt(id, "u1").await.unwrap().is_some());
        assert!(store.get_receipt(id, "u2").await.unwrap().is_none());
    }
}
