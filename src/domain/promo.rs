//! Promotion codes and per-shopper usage records.
//!
//! A code carries its own status vocabulary (active/inactive/expired);
//! consumption is tracked separately per shopper as a small pending → used
//! state machine, so the same code can be independently pending or spent
//! for different shoppers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// An administrator-defined percentage discount.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PromoCode {
    pub id: Uuid,
    pub code: String,
    /// Percentage, 0–100, not an absolute amount.
    pub discount_amount: Decimal,
    pub status: String,
    pub end_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl PromoCode {
    /// Stored status read through the vocabulary. Values the service never
    /// writes read as inactive.
    pub fn current_status(&self) -> PromoStatus {
        PromoStatus::parse(&self.status).unwrap_or(PromoStatus::Inactive)
    }
}

/// Per-shopper consumption record for one promo code.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PromoUsage {
    pub id: Uuid,
    pub guest_user_id: String,
    pub promocode_id: Uuid,
    pub status: String,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromoStatus {
    Active,
    Inactive,
    Expired,
}

impl PromoStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(PromoStatus::Active),
            "inactive" => Some(PromoStatus::Inactive),
            "expired" => Some(PromoStatus::Expired),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PromoStatus::Active => "active",
            PromoStatus::Inactive => "inactive",
            PromoStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for PromoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageStatus {
    Pending,
    Used,
}

impl UsageStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            UsageStatus::Pending => "pending",
            UsageStatus::Used => "used",
        }
    }
}

/// Status a code should be read as right now: an active code past its end
/// date counts as expired. Expiry is checked lazily on read, there is no
/// scheduler.
pub fn effective_status(
    stored: PromoStatus,
    end_date: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> PromoStatus {
    match stored {
        PromoStatus::Active if end_date.is_some_and(|d| d < now) => PromoStatus::Expired,
        other => other,
    }
}

/// An expired code whose end date moves into the future becomes active
/// again on admin update.
pub fn reactivates(
    stored: PromoStatus,
    new_end_date: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    stored == PromoStatus::Expired && new_end_date.is_some_and(|d| d > now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn parses_the_status_vocabulary() {
        assert_eq!(PromoStatus::parse("active"), Some(PromoStatus::Active));
        assert_eq!(PromoStatus::parse("inactive"), Some(PromoStatus::Inactive));
        assert_eq!(PromoStatus::parse("expired"), Some(PromoStatus::Expired));
        assert_eq!(PromoStatus::parse("applied"), None);
    }

    #[test]
    fn active_code_past_its_end_date_reads_as_expired() {
        let now = Utc::now();
        let yesterday = Some(now - Duration::days(1));
        let tomorrow = Some(now + Duration::days(1));

        assert_eq!(
            effective_status(PromoStatus::Active, yesterday, now),
            PromoStatus::Expired
        );
        assert_eq!(
            effective_status(PromoStatus::Active, tomorrow, now),
            PromoStatus::Active
        );
        assert_eq!(
            effective_status(PromoStatus::Active, None, now),
            PromoStatus::Active
        );
    }

    #[test]
    fn expiry_only_applies_to_active_codes() {
        let now = Utc::now();
        let yesterday = Some(now - Duration::days(1));
        assert_eq!(
            effective_status(PromoStatus::Inactive, yesterday, now),
            PromoStatus::Inactive
        );
    }

    #[test]
    fn future_end_date_reactivates_an_expired_code() {
        let now = Utc::now();
        let tomorrow = Some(now + Duration::days(1));

        assert!(reactivates(PromoStatus::Expired, tomorrow, now));
        assert!(!reactivates(PromoStatus::Expired, None, now));
        assert!(!reactivates(
            PromoStatus::Expired,
            Some(now - Duration::days(1)),
            now
        ));
        assert!(!reactivates(PromoStatus::Active, tomorrow, now));
    }
}
