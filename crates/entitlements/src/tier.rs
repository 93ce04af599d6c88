//! Tier definitions and the feature/limit vocabulary.
//!
//! There are exactly two tiers, [`FREE`] and [`PREMIUM`]. Features and limits
//! are closed enums and every lookup is an exhaustive `match` over
//! `(tier, name)`, so a name that exists in one tier necessarily exists in the
//! other. Adding a gated feature means adding a variant here, and the compiler
//! then demands a value for both tiers.
//!
//! The string names (`"cloudStorage"`, `"emergencyContacts"`, ...) are the
//! contract other components rely on; [`Feature`] and [`Limit`] parse and
//! display exactly those names.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::Error;

/// Identifier of a subscription tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierId {
    /// The free tier every user starts on.
    #[default]
    Free,
    /// The paid monthly tier.
    Premium,
}

impl TierId {
    /// The static definition for this tier.
    #[must_use]
    pub fn definition(self) -> &'static TierDefinition {
        match self {
            Self::Free => &FREE,
            Self::Premium => &PREMIUM,
        }
    }
}

impl fmt::Display for TierId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Free => write!(f, "free"),
            Self::Premium => write!(f, "premium"),
        }
    }
}

/// A gated feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Feature {
    /// Access to the per-state legal guides.
    StateGuides,
    /// Canned response scripts.
    BasicScripts,
    /// Recording incidents to local storage.
    LocalRecording,
    /// Emergency alerts to contacts.
    BasicAlerts,
    /// Localized content. The language set itself lives on the tier.
    Languages,
    /// Uploading recordings to remote storage.
    CloudStorage,
    /// Extended scripts for specific encounter types.
    AdvancedScripts,
    /// Guides for states other than the primary one.
    MultipleStates,
    /// Generated encounter cards.
    EncounterCards,
    /// Priority support channel.
    PrioritySupport,
}

impl Feature {
    /// Every feature, in declaration order.
    pub const ALL: [Feature; 10] = [
        Feature::StateGuides,
        Feature::BasicScripts,
        Feature::LocalRecording,
        Feature::BasicAlerts,
        Feature::Languages,
        Feature::CloudStorage,
        Feature::AdvancedScripts,
        Feature::MultipleStates,
        Feature::EncounterCards,
        Feature::PrioritySupport,
    ];

    /// The wire name of this feature.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StateGuides => "stateGuides",
            Self::BasicScripts => "basicScripts",
            Self::LocalRecording => "localRecording",
            Self::BasicAlerts => "basicAlerts",
            Self::Languages => "languages",
            Self::CloudStorage => "cloudStorage",
            Self::AdvancedScripts => "advancedScripts",
            Self::MultipleStates => "multipleStates",
            Self::EncounterCards => "encounterCards",
            Self::PrioritySupport => "prioritySupport",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Feature {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|feature| feature.as_str() == s)
            .ok_or_else(|| Error::UnknownFeature {
                name: s.to_string(),
            })
    }
}

/// How a tier grants a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureValue {
    /// Not available on this tier.
    Disabled,
    /// Available.
    Enabled,
    /// Available without any quantity cap.
    Unlimited,
}

impl FeatureValue {
    /// Whether this value grants access.
    #[must_use]
    pub fn is_granted(self) -> bool {
        matches!(self, Self::Enabled | Self::Unlimited)
    }
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disabled => "disabled",
            Self::Enabled => "enabled",
            Self::Unlimited => "unlimited",
        })
    }
}

/// A counted usage limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Limit {
    /// Saved incident recordings.
    Recordings,
    /// Configured emergency contacts.
    EmergencyContacts,
    /// State guides the user may follow.
    StateGuides,
}

impl Limit {
    /// Every limit, in declaration order.
    pub const ALL: [Limit; 3] = [Limit::Recordings, Limit::EmergencyContacts, Limit::StateGuides];

    /// The wire name of this limit.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Recordings => "recordings",
            Self::EmergencyContacts => "emergencyContacts",
            Self::StateGuides => "stateGuides",
        }
    }
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Limit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|limit| limit.as_str() == s)
            .ok_or_else(|| Error::UnknownLimit {
                name: s.to_string(),
            })
    }
}

/// The value of a limit: a count, or the `"unlimited"` sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitValue {
    /// At most this many items.
    Count(u32),
    /// No cap.
    Unlimited,
}

impl LimitValue {
    /// Whether `usage` existing items still leave room for one more.
    ///
    /// The comparison is strict: a limit of N blocks once N items exist.
    #[must_use]
    pub fn permits(self, usage: u64) -> bool {
        match self {
            Self::Unlimited => true,
            Self::Count(limit) => usage < u64::from(limit),
        }
    }
}

impl fmt::Display for LimitValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count(limit) => write!(f, "{limit}"),
            Self::Unlimited => write!(f, "unlimited"),
        }
    }
}

impl Serialize for LimitValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Count(limit) => serializer.serialize_u32(*limit),
            Self::Unlimited => serializer.serialize_str("unlimited"),
        }
    }
}

/// A named bundle of feature flags and usage limits.
#[derive(Debug, PartialEq, Eq)]
pub struct TierDefinition {
    /// Tier identifier.
    pub id: TierId,
    /// Display label.
    pub name: &'static str,
    /// Monthly price in US cents.
    pub price_cents: u32,
    /// Supported content language codes.
    pub languages: &'static [&'static str],
}

/// The free tier.
pub static FREE: TierDefinition = TierDefinition {
    id: TierId::Free,
    name: "Free",
    price_cents: 0,
    languages: &["en"],
};

/// The premium tier.
pub static PREMIUM: TierDefinition = TierDefinition {
    id: TierId::Premium,
    name: "Premium",
    price_cents: 499,
    languages: &["en", "es"],
};

impl TierDefinition {
    /// How this tier grants `feature`.
    #[must_use]
    pub fn feature(&self, feature: Feature) -> FeatureValue {
        use FeatureValue::{Disabled, Enabled, Unlimited};

        match (self.id, feature) {
            // Free users get one state guide through the limit, not the feature
            (TierId::Free, Feature::StateGuides) => Disabled,
            (TierId::Premium, Feature::StateGuides) => Unlimited,

            (
                _,
                Feature::BasicScripts
                | Feature::LocalRecording
                | Feature::BasicAlerts
                | Feature::Languages,
            ) => Enabled,

            (
                TierId::Free,
                Feature::CloudStorage
                | Feature::AdvancedScripts
                | Feature::MultipleStates
                | Feature::EncounterCards
                | Feature::PrioritySupport,
            ) => Disabled,
            (
                TierId::Premium,
                Feature::CloudStorage
                | Feature::AdvancedScripts
                | Feature::MultipleStates
                | Feature::EncounterCards
                | Feature::PrioritySupport,
            ) => Enabled,
        }
    }

    /// The value of `limit` on this tier.
    #[must_use]
    pub fn limit(&self, limit: Limit) -> LimitValue {
        match (self.id, limit) {
            (TierId::Free, Limit::Recordings) => LimitValue::Count(5),
            (TierId::Free, Limit::EmergencyContacts) => LimitValue::Count(2),
            (TierId::Free, Limit::StateGuides) => LimitValue::Count(1),
            (TierId::Premium, Limit::Recordings | Limit::StateGuides) => LimitValue::Unlimited,
            (TierId::Premium, Limit::EmergencyContacts) => LimitValue::Count(10),
        }
    }

    /// Whether this tier grants `feature`.
    #[must_use]
    pub fn has_feature(&self, feature: Feature) -> bool {
        self.feature(feature).is_granted()
    }

    /// Whether content in `code` is available on this tier.
    #[must_use]
    pub fn supports_language(&self, code: &str) -> bool {
        self.languages.contains(&code)
    }

    /// Monthly price formatted as dollars, e.g. `"$4.99"`.
    #[must_use]
    pub fn price_display(&self) -> String {
        format!("${}.{:02}", self.price_cents / 100, self.price_cents % 100)
    }
}

impl Serialize for TierDefinition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let features: BTreeMap<&str, FeatureValue> = Feature::ALL
            .into_iter()
            .map(|feature| (feature.as_str(), self.feature(feature)))
            .collect();
        let limits: BTreeMap<&str, LimitValue> = Limit::ALL
            .into_iter()
            .map(|limit| (limit.as_str(), self.limit(limit)))
            .collect();

        let mut state = serializer.serialize_struct("TierDefinition", 6)?;
        state.serialize_field("id", &self.id)?;
        state.serialize_field("name", self.name)?;
        state.serialize_field("priceCents", &self.price_cents)?;
        state.serialize_field("languages", self.languages)?;
        state.serialize_field("features", &features)?;
        state.serialize_field("limits", &limits)?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_tier_feature_table() {
        for feature in [
            Feature::AdvancedScripts,
            Feature::CloudStorage,
            Feature::MultipleStates,
            Feature::EncounterCards,
            Feature::PrioritySupport,
        ] {
            assert!(!FREE.has_feature(feature), "free should not grant {feature}");
        }
        for feature in [
            Feature::BasicScripts,
            Feature::LocalRecording,
            Feature::BasicAlerts,
        ] {
            assert!(FREE.has_feature(feature), "free should grant {feature}");
        }
    }

    #[test]
    fn test_premium_grants_every_feature() {
        for feature in Feature::ALL {
            assert!(PREMIUM.has_feature(feature), "premium should grant {feature}");
        }
        assert_eq!(
            PREMIUM.feature(Feature::StateGuides),
            FeatureValue::Unlimited
        );
    }

    #[test]
    fn test_limit_table() {
        assert_eq!(FREE.limit(Limit::Recordings), LimitValue::Count(5));
        assert_eq!(FREE.limit(Limit::EmergencyContacts), LimitValue::Count(2));
        assert_eq!(FREE.limit(Limit::StateGuides), LimitValue::Count(1));
        assert_eq!(PREMIUM.limit(Limit::Recordings), LimitValue::Unlimited);
        assert_eq!(
            PREMIUM.limit(Limit::EmergencyContacts),
            LimitValue::Count(10)
        );
        assert_eq!(PREMIUM.limit(Limit::StateGuides), LimitValue::Unlimited);
    }

    #[test]
    fn test_limit_permits_is_strict() {
        let limit = LimitValue::Count(5);
        assert!(limit.permits(0));
        assert!(limit.permits(4));
        assert!(!limit.permits(5));
        assert!(!limit.permits(6));

        assert!(!LimitValue::Count(0).permits(0));
        assert!(LimitValue::Unlimited.permits(10_000));
        assert!(LimitValue::Unlimited.permits(u64::MAX));
    }

    #[test]
    fn test_feature_names_round_trip() {
        for feature in Feature::ALL {
            assert_eq!(feature.as_str().parse::<Feature>().unwrap(), feature);
        }
        assert_eq!(
            "cloudStorage".parse::<Feature>().unwrap(),
            Feature::CloudStorage
        );
    }

    #[test]
    fn test_unknown_feature_name_is_an_error() {
        let err = "cloud_storage".parse::<Feature>().unwrap_err();
        assert!(matches!(err, Error::UnknownFeature { ref name } if name == "cloud_storage"));
    }

    #[test]
    fn test_limit_names() {
        assert_eq!(
            "emergencyContacts".parse::<Limit>().unwrap(),
            Limit::EmergencyContacts
        );
        assert!(matches!(
            "contacts".parse::<Limit>(),
            Err(Error::UnknownLimit { .. })
        ));
    }

    #[test]
    fn test_languages() {
        assert!(FREE.supports_language("en"));
        assert!(!FREE.supports_language("es"));
        assert!(PREMIUM.supports_language("es"));
    }

    #[test]
    fn test_price_display() {
        assert_eq!(FREE.price_display(), "$0.00");
        assert_eq!(PREMIUM.price_display(), "$4.99");
    }

    #[test]
    fn test_tier_id_definition() {
        assert_eq!(TierId::Free.definition().name, "Free");
        assert_eq!(TierId::Premium.definition().name, "Premium");
        assert_eq!(TierId::default(), TierId::Free);
    }

    #[test]
    fn test_tier_serialization_uses_wire_names() {
        let json = serde_json::to_value(&PREMIUM).unwrap();
        assert_eq!(json["id"], "premium");
        assert_eq!(json["features"]["cloudStorage"], "enabled");
        assert_eq!(json["features"]["stateGuides"], "unlimited");
        assert_eq!(json["limits"]["recordings"], "unlimited");
        assert_eq!(json["limits"]["emergencyContacts"], 10);

        let json = serde_json::to_value(&FREE).unwrap();
        assert_eq!(json["limits"]["recordings"], 5);
        assert_eq!(json["languages"], serde_json::json!(["en"]));
    }
}
