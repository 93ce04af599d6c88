//! Feature gates and usage reports.
//!
//! These are the answers UI code actually wants: "can the user do this, and
//! if not, should we offer an upgrade?" and "how much of this allowance is
//! left?".

use serde::Serialize;

use crate::tier::{Feature, Limit, LimitValue, TierDefinition};

/// Message shown when a feature needs a premium subscription.
pub const UPGRADE_MESSAGE: &str = "This feature requires a premium subscription.";

/// Outcome of checking one feature for one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureGate {
    /// The feature checked.
    pub feature: Feature,
    /// Whether the user may use it now.
    pub has_access: bool,
    /// Whether upgrading would grant it.
    pub needs_upgrade: bool,
    /// Prompt to show, present only when an upgrade is needed.
    pub message: Option<&'static str>,
}

impl FeatureGate {
    /// Evaluate `feature` against the tier in effect.
    #[must_use]
    pub fn evaluate(feature: Feature, effective: &TierDefinition, effectively_premium: bool) -> Self {
        let has_access = effective.has_feature(feature);
        let needs_upgrade = !has_access && !effectively_premium;
        Self {
            feature,
            has_access,
            needs_upgrade,
            message: needs_upgrade.then_some(UPGRADE_MESSAGE),
        }
    }
}

/// How much of a limit a given usage consumes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageReport {
    /// The limit checked.
    pub limit: Limit,
    /// The cap in effect.
    pub value: LimitValue,
    /// Items currently in use.
    pub usage: u64,
    /// Whether one more item is allowed.
    pub within_limit: bool,
    /// Items left before the cap; `None` when unlimited.
    pub remaining: Option<u64>,
    /// Share of the cap used, clamped to `0..=100`. Always 0 when unlimited.
    pub percentage: f64,
}

impl UsageReport {
    /// Evaluate `usage` against `limit` on the tier in effect.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn evaluate(limit: Limit, effective: &TierDefinition, usage: u64) -> Self {
        let value = effective.limit(limit);
        let (remaining, percentage) = match value {
            LimitValue::Unlimited => (None, 0.0),
            LimitValue::Count(0) => (Some(0), 100.0),
            LimitValue::Count(cap) => {
                let cap = u64::from(cap);
                let percentage = (usage as f64 / cap as f64 * 100.0).min(100.0);
                (Some(cap.saturating_sub(usage)), percentage)
            }
        };

        Self {
            limit,
            value,
            usage,
            within_limit: value.permits(usage),
            remaining,
            percentage,
        }
    }
}
