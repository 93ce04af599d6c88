//! The per-user subscription record and the rules evaluated over it.
//!
//! Everything here is pure: time-dependent predicates take `now` explicitly
//! (`*_at` methods). [`SubscriptionRecord::is_effectively_premium_at`] is the
//! single definition of "premium"; every other premium check derives from it.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::payment::PaymentConfirmation;
use crate::tier::{TierDefinition, TierId};

/// Version of the persisted record layout.
pub const RECORD_SCHEMA_VERSION: u32 = 1;

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

fn initial_schema_version() -> u32 {
    1
}

/// Status flag stored on the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    /// The subscription is in force (subject to `end_date`).
    Active,
    /// The user cancelled.
    Cancelled,
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// What happens to the paid-through date when a user cancels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationPolicy {
    /// The subscription ends at the moment of cancellation.
    #[default]
    Immediate,
    /// The original `end_date` is kept; only the status changes.
    PeriodEnd,
}

/// Where a record sits in the subscription lifecycle at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    /// Free tier, active.
    FreeActive,
    /// Free tier, cancelled. Reachable only through a manual update.
    FreeCancelled,
    /// Premium, active and not past its end date.
    PremiumActive,
    /// Premium, cancelled, end date not yet passed.
    PremiumCancelled,
    /// Premium whose end date has passed, whatever the status says.
    PremiumExpired,
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::FreeActive => "free/active",
            Self::FreeCancelled => "free/cancelled",
            Self::PremiumActive => "premium/active",
            Self::PremiumCancelled => "premium/cancelled",
            Self::PremiumExpired => "premium/expired",
        };
        f.write_str(label)
    }
}

/// One user's subscription.
///
/// Serialized with camelCase keys. Records written before the schema version
/// field existed load as version 1, and the older `stripeCustomerId` /
/// `stripeSubscriptionId` keys are accepted as aliases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRecord {
    /// Layout version of this record.
    #[serde(default = "initial_schema_version")]
    pub schema_version: u32,
    /// Nominal tier.
    pub tier: TierId,
    /// Status flag.
    pub status: SubscriptionStatus,
    /// When the current tier started.
    pub start_date: DateTime<Utc>,
    /// When the current period ends. Absent for the free tier.
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    /// When the user cancelled.
    #[serde(default)]
    pub cancelled_at: Option<DateTime<Utc>>,
    /// Opaque payment method label.
    #[serde(default)]
    pub payment_method: Option<String>,
    /// Opaque customer identifier at the payment processor.
    #[serde(default, alias = "stripeCustomerId")]
    pub customer_id: Option<String>,
    /// Opaque subscription identifier at the payment processor.
    #[serde(default, alias = "stripeSubscriptionId")]
    pub subscription_id: Option<String>,
}

/// A partial change to a record. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubscriptionUpdate {
    /// New tier.
    pub tier: Option<TierId>,
    /// New status.
    pub status: Option<SubscriptionStatus>,
    /// New end date; `Some(None)` clears it.
    pub end_date: Option<Option<DateTime<Utc>>>,
    /// New payment method label.
    pub payment_method: Option<String>,
    /// New customer identifier.
    pub customer_id: Option<String>,
    /// New subscription identifier.
    pub subscription_id: Option<String>,
}

impl SubscriptionRecord {
    /// A fresh free, active record starting at `now`.
    #[must_use]
    pub fn free(now: DateTime<Utc>) -> Self {
        Self {
            schema_version: RECORD_SCHEMA_VERSION,
            tier: TierId::Free,
            status: SubscriptionStatus::Active,
            start_date: now,
            end_date: None,
            cancelled_at: None,
            payment_method: None,
            customer_id: None,
            subscription_id: None,
        }
    }

    /// The definition of the nominal tier, without any status or expiry check.
    #[must_use]
    pub fn nominal_tier(&self) -> &'static TierDefinition {
        self.tier.definition()
    }

    /// Whether the end date, if any, lies before `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.end_date.is_some_and(|end| end < now)
    }

    /// Whether the record is active and unexpired, regardless of tier.
    #[must_use]
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Active && !self.is_expired_at(now)
    }

    /// Whether premium entitlements apply at `now`.
    ///
    /// Requires the premium tier, active status, and an end date that is
    /// absent or not yet passed.
    #[must_use]
    pub fn is_effectively_premium_at(&self, now: DateTime<Utc>) -> bool {
        self.tier == TierId::Premium && self.is_active_at(now)
    }

    /// The tier whose entitlements apply at `now`.
    #[must_use]
    pub fn effective_tier_at(&self, now: DateTime<Utc>) -> &'static TierDefinition {
        if self.is_effectively_premium_at(now) {
            TierId::Premium.definition()
        } else {
            TierId::Free.definition()
        }
    }

    /// Lifecycle state at `now`.
    #[must_use]
    pub fn state_at(&self, now: DateTime<Utc>) -> SubscriptionState {
        match (self.tier, self.status) {
            (TierId::Free, SubscriptionStatus::Active) => SubscriptionState::FreeActive,
            (TierId::Free, SubscriptionStatus::Cancelled) => SubscriptionState::FreeCancelled,
            (TierId::Premium, _) if self.is_expired_at(now) => SubscriptionState::PremiumExpired,
            (TierId::Premium, SubscriptionStatus::Active) => SubscriptionState::PremiumActive,
            (TierId::Premium, SubscriptionStatus::Cancelled) => {
                SubscriptionState::PremiumCancelled
            }
        }
    }

    /// Whole days until the end date, rounded up and never negative.
    ///
    /// Returns `None` when there is no end date.
    #[must_use]
    pub fn days_until_expiry_at(&self, now: DateTime<Utc>) -> Option<i64> {
        self.end_date.map(|end| {
            let remaining = (end - now).num_milliseconds();
            if remaining <= 0 {
                0
            } else {
                (remaining + MILLIS_PER_DAY - 1) / MILLIS_PER_DAY
            }
        })
    }

    /// Switch to an active premium period of length `period` starting at `now`.
    ///
    /// Calling this on an already premium record restarts the period from
    /// `now`; it does not stack.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PeriodOutOfRange`] if the period would end past the
    /// last representable date. The record is left untouched.
    pub fn upgrade(
        &mut self,
        confirmation: &PaymentConfirmation,
        now: DateTime<Utc>,
        period: Duration,
    ) -> Result<()> {
        let end = now
            .checked_add_signed(period)
            .ok_or_else(|| Error::PeriodOutOfRange {
                days: period.num_days(),
            })?;

        self.schema_version = RECORD_SCHEMA_VERSION;
        self.tier = TierId::Premium;
        self.status = SubscriptionStatus::Active;
        self.start_date = now;
        self.end_date = Some(end);
        self.cancelled_at = None;
        self.payment_method = Some(confirmation.payment_method.clone());
        self.customer_id = Some(confirmation.customer_id.clone());
        self.subscription_id.clone_from(&confirmation.subscription_id);
        Ok(())
    }

    /// Mark the record cancelled at `now`. The tier is left unchanged.
    pub fn cancel(&mut self, now: DateTime<Utc>, policy: CancellationPolicy) {
        self.status = SubscriptionStatus::Cancelled;
        self.cancelled_at = Some(now);
        match policy {
            CancellationPolicy::Immediate => self.end_date = Some(now),
            CancellationPolicy::PeriodEnd => {
                // Nothing was paid for past now if there is no period at all
                if self.end_date.is_none() {
                    self.end_date = Some(now);
                }
            }
        }
    }

    /// Merge `update` into this record.
    pub fn apply(&mut self, update: SubscriptionUpdate) {
        if let Some(tier) = update.tier {
            self.tier = tier;
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(end_date) = update.end_date {
            self.end_date = end_date;
        }
        if let Some(method) = update.payment_method {
            self.payment_method = Some(method);
        }
        if let Some(customer_id) = update.customer_id {
            self.customer_id = Some(customer_id);
        }
        if let Some(subscription_id) = update.subscription_id {
            self.subscription_id = Some(subscription_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn confirmation() -> PaymentConfirmation {
        PaymentConfirmation {
            customer_id: "cus_1".to_string(),
            subscription_id: Some("sub_1".to_string()),
            payment_method: "stripe".to_string(),
        }
    }

    fn premium_at(now: DateTime<Utc>) -> SubscriptionRecord {
        let mut record = SubscriptionRecord::free(now);
        record
            .upgrade(&confirmation(), now, Duration::days(30))
            .unwrap();
        record
    }

    #[test]
    fn test_free_record_defaults() {
        let record = SubscriptionRecord::free(t0());
        assert_eq!(record.tier, TierId::Free);
        assert_eq!(record.status, SubscriptionStatus::Active);
        assert_eq!(record.schema_version, RECORD_SCHEMA_VERSION);
        assert!(record.end_date.is_none());
        assert_eq!(record.state_at(t0()), SubscriptionState::FreeActive);
        assert!(!record.is_effectively_premium_at(t0()));
        assert!(record.is_active_at(t0()));
        assert_eq!(record.days_until_expiry_at(t0()), None);
    }

    #[test]
    fn test_upgrade_sets_thirty_day_period() {
        let record = premium_at(t0());
        assert_eq!(record.tier, TierId::Premium);
        assert_eq!(record.end_date, Some(t0() + Duration::days(30)));
        assert_eq!(record.customer_id.as_deref(), Some("cus_1"));
        assert_eq!(record.subscription_id.as_deref(), Some("sub_1"));
        assert_eq!(record.payment_method.as_deref(), Some("stripe"));
        assert!(record.is_effectively_premium_at(t0()));
        assert_eq!(record.days_until_expiry_at(t0()), Some(30));
        assert_eq!(record.state_at(t0()), SubscriptionState::PremiumActive);
    }

    #[test]
    fn test_days_until_expiry_tolerates_subsecond_skew() {
        let record = premium_at(t0());
        let slightly_later = t0() + Duration::milliseconds(750);
        assert_eq!(record.days_until_expiry_at(slightly_later), Some(30));
    }

    #[test]
    fn test_days_until_expiry_rounds_up_and_floors_at_zero() {
        let record = premium_at(t0());
        assert_eq!(
            record.days_until_expiry_at(t0() + Duration::days(29) + Duration::hours(1)),
            Some(1)
        );
        assert_eq!(record.days_until_expiry_at(t0() + Duration::days(30)), Some(0));
        assert_eq!(record.days_until_expiry_at(t0() + Duration::days(45)), Some(0));
    }

    #[test]
    fn test_upgrade_twice_restarts_period() {
        let mut record = premium_at(t0());
        let later = t0() + Duration::days(10);
        record
            .upgrade(&confirmation(), later, Duration::days(30))
            .unwrap();
        assert_eq!(record.end_date, Some(later + Duration::days(30)));
        assert_eq!(record.start_date, later);
    }

    #[test]
    fn test_upgrade_rejects_period_past_calendar_end() {
        let mut record = SubscriptionRecord::free(t0());
        let err = record
            .upgrade(&confirmation(), t0(), Duration::days(1_000_000_000))
            .unwrap_err();

        assert!(matches!(err, Error::PeriodOutOfRange { days: 1_000_000_000 }));
        assert_eq!(record, SubscriptionRecord::free(t0()));
    }

    #[test]
    fn test_immediate_cancel_ends_premium_now() {
        let mut record = premium_at(t0());
        let cancel_at = t0() + Duration::days(3);
        record.cancel(cancel_at, CancellationPolicy::Immediate);

        assert_eq!(record.tier, TierId::Premium);
        assert_eq!(record.status, SubscriptionStatus::Cancelled);
        assert_eq!(record.end_date, Some(cancel_at));
        assert_eq!(record.cancelled_at, Some(cancel_at));
        assert!(!record.is_effectively_premium_at(cancel_at));
        assert_eq!(record.days_until_expiry_at(cancel_at), Some(0));
        assert_eq!(
            record.state_at(cancel_at),
            SubscriptionState::PremiumCancelled
        );
        assert_eq!(
            record.state_at(cancel_at + Duration::seconds(1)),
            SubscriptionState::PremiumExpired
        );
    }

    #[test]
    fn test_period_end_cancel_keeps_paid_through_date() {
        let mut record = premium_at(t0());
        let cancel_at = t0() + Duration::days(3);
        record.cancel(cancel_at, CancellationPolicy::PeriodEnd);

        assert_eq!(record.end_date, Some(t0() + Duration::days(30)));
        assert!(!record.is_effectively_premium_at(cancel_at));
        assert_eq!(record.days_until_expiry_at(cancel_at), Some(27));
        assert_eq!(
            record.state_at(cancel_at),
            SubscriptionState::PremiumCancelled
        );
    }

    #[test]
    fn test_period_end_cancel_without_period_ends_now() {
        let mut record = SubscriptionRecord::free(t0());
        record.cancel(t0(), CancellationPolicy::PeriodEnd);
        assert_eq!(record.end_date, Some(t0()));
        assert_eq!(record.state_at(t0()), SubscriptionState::FreeCancelled);
    }

    #[test]
    fn test_expiry_without_status_change_is_not_premium() {
        let record = premium_at(t0());
        let after = t0() + Duration::days(30) + Duration::seconds(1);

        assert_eq!(record.status, SubscriptionStatus::Active);
        assert!(!record.is_effectively_premium_at(after));
        assert!(!record.is_active_at(after));
        assert_eq!(record.state_at(after), SubscriptionState::PremiumExpired);
        assert_eq!(record.effective_tier_at(after).id, TierId::Free);
        assert_eq!(record.nominal_tier().id, TierId::Premium);
    }

    #[test]
    fn test_end_date_equal_to_now_is_still_premium() {
        let record = premium_at(t0());
        let end = t0() + Duration::days(30);
        assert!(record.is_effectively_premium_at(end));
    }

    #[test]
    fn test_premium_without_end_date_never_expires() {
        let mut record = SubscriptionRecord::free(t0());
        record.apply(SubscriptionUpdate {
            tier: Some(TierId::Premium),
            ..SubscriptionUpdate::default()
        });
        assert!(record.is_effectively_premium_at(t0() + Duration::days(3650)));
    }

    #[test]
    fn test_apply_merges_only_given_fields() {
        let mut record = premium_at(t0());
        record.apply(SubscriptionUpdate {
            payment_method: Some("paypal".to_string()),
            end_date: Some(None),
            ..SubscriptionUpdate::default()
        });

        assert_eq!(record.payment_method.as_deref(), Some("paypal"));
        assert!(record.end_date.is_none());
        assert_eq!(record.customer_id.as_deref(), Some("cus_1"));
        assert_eq!(record.tier, TierId::Premium);
    }

    #[test]
    fn test_json_uses_camel_case_keys() {
        let record = premium_at(t0());
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["schemaVersion"], 1);
        assert_eq!(json["tier"], "premium");
        assert_eq!(json["status"], "active");
        assert!(json.get("startDate").is_some());
        assert!(json.get("customerId").is_some());
    }

    #[test]
    fn test_json_round_trip_is_exact() {
        let mut record = premium_at(t0() + Duration::nanoseconds(123_456_789));
        record.cancel(t0() + Duration::days(2), CancellationPolicy::PeriodEnd);

        let json = serde_json::to_string(&record).unwrap();
        let restored: SubscriptionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, record);
    }

    #[test]
    fn test_legacy_record_shape_loads() {
        let json = r#"{
            "tier": "premium",
            "status": "active",
            "startDate": "2025-03-01T12:00:00.000Z",
            "endDate": "2025-03-31T12:00:00.000Z",
            "paymentMethod": "stripe",
            "stripeCustomerId": "cus_legacy",
            "stripeSubscriptionId": null
        }"#;
        let record: SubscriptionRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.schema_version, 1);
        assert_eq!(record.customer_id.as_deref(), Some("cus_legacy"));
        assert!(record.subscription_id.is_none());
        assert!(record.cancelled_at.is_none());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SubscriptionState::PremiumExpired.to_string(), "premium/expired");
        assert_eq!(SubscriptionStatus::Cancelled.to_string(), "cancelled");
    }
}
