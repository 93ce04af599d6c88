//! The entitlement service.
//!
//! [`EntitlementService`] owns every subscription record, keyed by
//! [`UserId`]. Queries are synchronous and never fail: a missing, unreadable,
//! or malformed record is treated as a fresh free subscription. Mutations are
//! `async`, serialized per user, and persist the full record before returning.
//!
//! Feature and limit checks use the *effective* tier, so a cancelled or
//! expired premium record grants free-tier entitlements only.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::gate::{FeatureGate, UsageReport};
use crate::payment::{LocalConfirmation, PaymentProof, PaymentProvider};
use crate::storage::{RecordStore, SqliteStore};
use crate::subscription::{
    CancellationPolicy, SubscriptionRecord, SubscriptionState, SubscriptionUpdate,
};
use crate::tier::{Feature, Limit, LimitValue, TierDefinition, TierId};
use crate::user::UserId;

/// Lifecycle rules the service applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceSettings {
    /// Length of a premium period.
    pub period: Duration,
    /// What cancelling does to the paid-through date.
    pub cancellation: CancellationPolicy,
    /// Upper bound on each payment provider call.
    pub provider_timeout: StdDuration,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for ServiceSettings {
    fn from(config: &Config) -> Self {
        Self {
            period: config.period(),
            cancellation: config.subscription.cancellation,
            provider_timeout: config.provider_timeout(),
        }
    }
}

/// A consistent view of one user's entitlements at a single instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementSummary {
    /// Whose record this is.
    pub user: UserId,
    /// The stored record.
    pub record: SubscriptionRecord,
    /// Tier named on the record.
    pub nominal_tier: TierId,
    /// Tier whose entitlements apply.
    pub effective_tier: TierId,
    /// Lifecycle state.
    pub state: SubscriptionState,
    /// Whether premium entitlements apply.
    pub effectively_premium: bool,
    /// Whole days left in the current period, if it has an end.
    pub days_until_expiry: Option<i64>,
    /// The instant this summary was computed for.
    pub evaluated_at: DateTime<Utc>,
}

/// Per-user subscription records and the entitlement queries over them.
#[derive(Debug)]
pub struct EntitlementService {
    store: Mutex<Box<dyn RecordStore>>,
    provider: Arc<dyn PaymentProvider>,
    clock: Arc<dyn Clock>,
    settings: ServiceSettings,
    user_locks: Mutex<HashMap<UserId, Arc<tokio::sync::Mutex<()>>>>,
}

impl EntitlementService {
    /// Create a service over `store` that confirms upgrades with `provider`.
    pub fn new(store: impl RecordStore + 'static, provider: impl PaymentProvider + 'static) -> Self {
        Self {
            store: Mutex::new(Box::new(store)),
            provider: Arc::new(provider),
            clock: Arc::new(SystemClock),
            settings: ServiceSettings::default(),
            user_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Open the configured database and use local payment confirmation.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn from_config(config: &Config) -> Result<Self> {
        let store = SqliteStore::open(config.database_path())?;
        let provider = LocalConfirmation::new(config.subscription.default_payment_method.clone());
        Ok(Self::new(store, provider).with_settings(ServiceSettings::from(config)))
    }

    /// Replace the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the lifecycle settings.
    #[must_use]
    pub fn with_settings(mut self, settings: ServiceSettings) -> Self {
        self.settings = settings;
        self
    }

    /// The lifecycle settings in use.
    #[must_use]
    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    // === Queries ===

    /// The user's record, or a fresh free record if none is stored.
    #[must_use]
    pub fn record(&self, user: &UserId) -> SubscriptionRecord {
        self.load_record(user, self.clock.now())
    }

    /// The tier named on the record, without status or expiry checks.
    #[must_use]
    pub fn current_tier(&self, user: &UserId) -> &'static TierDefinition {
        self.record(user).nominal_tier()
    }

    /// Whether premium entitlements apply right now.
    #[must_use]
    pub fn is_effectively_premium(&self, user: &UserId) -> bool {
        let now = self.clock.now();
        self.load_record(user, now).is_effectively_premium_at(now)
    }

    /// The tier whose entitlements apply right now.
    #[must_use]
    pub fn effective_tier(&self, user: &UserId) -> &'static TierDefinition {
        let now = self.clock.now();
        self.load_record(user, now).effective_tier_at(now)
    }

    /// Whether the record is active and unexpired, regardless of tier.
    #[must_use]
    pub fn is_active(&self, user: &UserId) -> bool {
        let now = self.clock.now();
        self.load_record(user, now).is_active_at(now)
    }

    /// Whether the user may use `feature`.
    #[must_use]
    pub fn has_feature(&self, user: &UserId, feature: Feature) -> bool {
        self.effective_tier(user).has_feature(feature)
    }

    /// [`has_feature`](Self::has_feature) by wire name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownFeature`] if `name` is not a known feature.
    pub fn has_feature_named(&self, user: &UserId, name: &str) -> Result<bool> {
        let feature: Feature = name.parse()?;
        Ok(self.has_feature(user, feature))
    }

    /// The cap on `limit` for the user.
    #[must_use]
    pub fn feature_limit(&self, user: &UserId, limit: Limit) -> LimitValue {
        self.effective_tier(user).limit(limit)
    }

    /// [`feature_limit`](Self::feature_limit) by wire name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownLimit`] if `name` is not a known limit.
    pub fn feature_limit_named(&self, user: &UserId, name: &str) -> Result<LimitValue> {
        let limit: Limit = name.parse()?;
        Ok(self.feature_limit(user, limit))
    }

    /// Whether `current_usage` existing items leave room for one more.
    #[must_use]
    pub fn is_within_limit(&self, user: &UserId, limit: Limit, current_usage: u64) -> bool {
        self.feature_limit(user, limit).permits(current_usage)
    }

    /// Whole days until the current period ends, never negative.
    #[must_use]
    pub fn days_until_expiry(&self, user: &UserId) -> Option<i64> {
        let now = self.clock.now();
        self.load_record(user, now).days_until_expiry_at(now)
    }

    /// Gate `feature` for the user, including whether to prompt an upgrade.
    #[must_use]
    pub fn feature_gate(&self, user: &UserId, feature: Feature) -> FeatureGate {
        let now = self.clock.now();
        let record = self.load_record(user, now);
        FeatureGate::evaluate(
            feature,
            record.effective_tier_at(now),
            record.is_effectively_premium_at(now),
        )
    }

    /// Report how much of `limit` the user's current usage consumes.
    #[must_use]
    pub fn usage(&self, user: &UserId, limit: Limit, current_usage: u64) -> UsageReport {
        UsageReport::evaluate(limit, self.effective_tier(user), current_usage)
    }

    /// Everything about the user's entitlements, evaluated at one instant.
    #[must_use]
    pub fn summary(&self, user: &UserId) -> EntitlementSummary {
        let now = self.clock.now();
        let record = self.load_record(user, now);
        EntitlementSummary {
            user: user.clone(),
            nominal_tier: record.tier,
            effective_tier: record.effective_tier_at(now).id,
            state: record.state_at(now),
            effectively_premium: record.is_effectively_premium_at(now),
            days_until_expiry: record.days_until_expiry_at(now),
            evaluated_at: now,
            record,
        }
    }

    /// Users with a stored record, most recently updated first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn users(&self) -> Result<Vec<UserId>> {
        self.lock_store().list_users()
    }

    // === Mutations ===

    /// Upgrade the user to premium once the provider confirms `proof`.
    ///
    /// The new period starts now and lasts the configured number of days.
    /// Upgrading an already premium user restarts the period.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Payment`] if the provider rejects the proof,
    /// [`Error::Timeout`] if it does not answer in time, or a persistence
    /// error if the record cannot be saved. The stored record is unchanged
    /// on any error.
    pub async fn upgrade(&self, user: &UserId, proof: &PaymentProof) -> Result<SubscriptionRecord> {
        let lock = self.user_lock(user);
        let _guard = lock.lock().await;

        let confirmation = self
            .with_timeout("upgrade", self.provider.confirm_upgrade(user, proof))
            .await
            .map_err(|e| {
                warn!(user = %user, provider = self.provider.name(), "Upgrade failed: {e}");
                e
            })?;

        let now = self.clock.now();
        let mut record = self.load_for_update(user, now)?;
        record.upgrade(&confirmation, now, self.settings.period)?;
        self.persist(user, &record, now)?;

        info!(user = %user, end_date = ?record.end_date, "Upgraded to premium");
        Ok(record)
    }

    /// Cancel the user's subscription.
    ///
    /// If the record carries a provider subscription id, the provider is told
    /// first. The tier is left as is; the end date follows the configured
    /// [`CancellationPolicy`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Payment`] or [`Error::Timeout`] if the provider call
    /// fails, or a persistence error if the record cannot be saved.
    pub async fn cancel(&self, user: &UserId) -> Result<SubscriptionRecord> {
        let lock = self.user_lock(user);
        let _guard = lock.lock().await;

        let policy = self.settings.cancellation;
        let mut record = self.load_for_update(user, self.clock.now())?;

        if let Some(subscription_id) = record.subscription_id.clone() {
            let at_period_end = policy == CancellationPolicy::PeriodEnd;
            self.with_timeout(
                "cancel",
                self.provider
                    .cancel_subscription(&subscription_id, at_period_end),
            )
            .await
            .map_err(|e| {
                warn!(user = %user, provider = self.provider.name(), "Cancellation failed: {e}");
                e
            })?;
        }

        let now = self.clock.now();
        record.cancel(now, policy);
        self.persist(user, &record, now)?;

        info!(user = %user, tier = %record.tier, ?policy, end_date = ?record.end_date, "Subscription cancelled");
        Ok(record)
    }

    /// Merge `update` into the user's record and persist it.
    ///
    /// # Errors
    ///
    /// Returns a persistence error if the record cannot be saved.
    pub async fn update(
        &self,
        user: &UserId,
        update: SubscriptionUpdate,
    ) -> Result<SubscriptionRecord> {
        let lock = self.user_lock(user);
        let _guard = lock.lock().await;

        let now = self.clock.now();
        let mut record = self.load_for_update(user, now)?;
        record.apply(update);
        self.persist(user, &record, now)?;

        debug!(user = %user, "Subscription updated");
        Ok(record)
    }

    /// Replace the user's record with a fresh free, active one.
    ///
    /// # Errors
    ///
    /// Returns a persistence error if the record cannot be saved.
    pub async fn reset(&self, user: &UserId) -> Result<SubscriptionRecord> {
        let lock = self.user_lock(user);
        let _guard = lock.lock().await;

        let now = self.clock.now();
        let record = SubscriptionRecord::free(now);
        self.persist(user, &record, now)?;

        info!(user = %user, "Subscription reset to free tier");
        Ok(record)
    }

    // === Internals ===

    fn lock_store(&self) -> MutexGuard<'_, Box<dyn RecordStore>> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn user_lock(&self, user: &UserId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .user_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Drop locks nobody is holding or waiting on
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry(user.clone()).or_default())
    }

    async fn with_timeout<T>(
        &self,
        operation: &str,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.settings.provider_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(Error::timeout(format!(
                "payment provider {operation} after {:?}",
                self.settings.provider_timeout
            ))),
        }
    }

    /// Load the user's record, recovering from every read failure.
    ///
    /// A user seen for the first time gets a free record, which is stored so
    /// its start date stays put. The insert never overwrites, so it cannot
    /// race a concurrent mutation.
    fn load_record(&self, user: &UserId, now: DateTime<Utc>) -> SubscriptionRecord {
        let mut store = self.lock_store();

        let raw = match store.load_raw(user) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(user = %user, "Failed to read subscription, using free tier: {e}");
                return SubscriptionRecord::free(now);
            }
        };

        match raw {
            Some(text) => parse_record(user, &text, now),
            None => {
                let record = SubscriptionRecord::free(now);
                let inserted = serde_json::to_string(&record)
                    .map_err(Error::from)
                    .and_then(|json| store.insert_if_absent(user, &json, now));
                match inserted {
                    Ok(true) => {
                        debug!(user = %user, "Created free subscription record");
                        record
                    }
                    Ok(false) => match store.load_raw(user) {
                        Ok(Some(text)) => parse_record(user, &text, now),
                        _ => record,
                    },
                    Err(e) => {
                        warn!(user = %user, "Failed to store initial subscription: {e}");
                        record
                    }
                }
            }
        }
    }

    /// Load the user's record as the base for a mutation.
    ///
    /// Unlike [`load_record`](Self::load_record), a failed read is an error:
    /// writing a placeholder back would destroy the stored record. A missing
    /// or malformed record still starts from a fresh free one.
    fn load_for_update(&self, user: &UserId, now: DateTime<Utc>) -> Result<SubscriptionRecord> {
        let raw = self.lock_store().load_raw(user).map_err(|e| {
            error!(user = %user, "Failed to read subscription for update: {e}");
            e
        })?;
        Ok(raw.map_or_else(
            || SubscriptionRecord::free(now),
            |text| parse_record(user, &text, now),
        ))
    }

    fn persist(&self, user: &UserId, record: &SubscriptionRecord, now: DateTime<Utc>) -> Result<()> {
        let json = serde_json::to_string(record)?;
        self.lock_store()
            .save_raw(user, &json, now)
            .map_err(|e| {
                error!(user = %user, "Failed to persist subscription: {e}");
                Error::persist(user.as_str(), e.to_string())
            })
    }
}

fn parse_record(user: &UserId, text: &str, now: DateTime<Utc>) -> SubscriptionRecord {
    serde_json::from_str(text).unwrap_or_else(|e| {
        warn!(user = %user, "Malformed subscription record, using free tier: {e}");
        SubscriptionRecord::free(now)
    })
}
