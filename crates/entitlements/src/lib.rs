//! `entitlements` - Per-user subscription tiers, feature flags, and usage limits
//!
//! This library tracks whether each user is on the Free or Premium tier,
//! persists that subscription record, and answers which features and usage
//! limits apply to the user right now.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod gate;
pub mod logging;
pub mod payment;
pub mod service;
pub mod storage;
pub mod subscription;
pub mod tier;
pub mod user;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{Error, Result};
pub use gate::{FeatureGate, UsageReport};
pub use logging::init_logging;
pub use payment::{LocalConfirmation, PaymentConfirmation, PaymentProof, PaymentProvider};
pub use service::{EntitlementService, EntitlementSummary, ServiceSettings};
pub use storage::{MemoryStore, RecordStore, SqliteStore};
pub use subscription::{
    CancellationPolicy, SubscriptionRecord, SubscriptionState, SubscriptionStatus,
    SubscriptionUpdate,
};
pub use tier::{Feature, FeatureValue, Limit, LimitValue, TierDefinition, TierId};
pub use user::UserId;
