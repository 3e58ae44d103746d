//! Entitlement Ledger
//!
//! Tracks whether an account currently holds premium access and extends the
//! paid window after a successful payment.

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BillingError, Result};

/// Length of the trial granted to new accounts
pub const TRIAL_DAYS: i64 = 14;

/// Account plan
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    #[default]
    Trial,
    Free,
    Premium,
}

impl Plan {
    pub fn as_str(&self) -> &str {
        match self {
            Plan::Trial => "trial",
            Plan::Free => "free",
            Plan::Premium => "premium",
        }
    }
}

/// Entitlement-relevant view of a user account
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAccount {
    /// Account identifier (JWT subject)
    pub id: String,

    /// Current plan
    pub plan: Plan,

    /// End of the free trial
    pub trial_ends_at: Option<DateTime<Utc>>,

    /// End of the paid premium window
    pub premium_until: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserAccount {
    /// Create a new account on trial
    pub fn new(id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            plan: Plan::Trial,
            trial_ends_at: Some(now + Duration::days(TRIAL_DAYS)),
            premium_until: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Active iff inside the trial, inside the paid window, or on the premium plan
    pub fn is_premium(&self, now: DateTime<Utc>) -> bool {
        if self.trial_ends_at.is_some_and(|t| now < t) {
            return true;
        }
        if self.premium_until.is_some_and(|t| now < t) {
            return true;
        }
        self.plan == Plan::Premium
    }

    /// Extend the paid window by `months` and move to the premium plan.
    ///
    /// Returns the new `premium_until`.
    pub fn extend_premium(&mut self, months: u32, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let until = extended_until(self.premium_until, months, now)?;
        self.premium_until = Some(until);
        self.plan = Plan::Premium;
        self.updated_at = now;
        Ok(until)
    }
}

/// `max(now, current)` plus `months` calendar months.
///
/// Month arithmetic clamps to the last day of shorter months
/// (Jan 31 + 1 month = Feb 28/29).
pub fn extended_until(
    current: Option<DateTime<Utc>>,
    months: u32,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>> {
    let start = match current {
        Some(until) if until > now => until,
        _ => now,
    };

    start
        .checked_add_months(Months::new(months))
        .ok_or_else(|| BillingError::Validation(format!("cannot extend {start} by {months} months")))
}
