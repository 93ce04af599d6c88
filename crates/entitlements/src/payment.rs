//! Payment provider seam.
//!
//! The entitlement service never talks to a payment processor directly. It
//! hands the caller's [`PaymentProof`] to a [`PaymentProvider`] and, on
//! success, stores the returned identifiers as opaque strings. Amounts and
//! currencies are the provider's business.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::user::UserId;

/// Payment method recorded when neither the proof nor the provider names one.
pub const DEFAULT_PAYMENT_METHOD: &str = "stripe";

/// Evidence of payment supplied by the caller when upgrading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentProof {
    /// Customer identifier at the payment processor.
    pub customer_id: String,
    /// Subscription identifier at the payment processor, if one was created.
    #[serde(default)]
    pub subscription_id: Option<String>,
    /// Payment method label, e.g. `"stripe"`.
    #[serde(default)]
    pub payment_method: Option<String>,
}

/// What the provider returns when it accepts an upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentConfirmation {
    /// Customer identifier to store on the record.
    pub customer_id: String,
    /// Subscription identifier to store on the record.
    pub subscription_id: Option<String>,
    /// Payment method label to store on the record.
    pub payment_method: String,
}

/// A payment processor as seen by the entitlement service.
///
/// Failures are reported as [`Error::Payment`] with a human-readable message.
#[async_trait]
pub trait PaymentProvider: Send + Sync + fmt::Debug {
    /// Name of this provider (for logging).
    fn name(&self) -> &'static str;

    /// Confirm that `proof` pays for a premium upgrade of `user`.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider rejects the proof or cannot be reached.
    async fn confirm_upgrade(
        &self,
        user: &UserId,
        proof: &PaymentProof,
    ) -> Result<PaymentConfirmation>;

    /// Cancel the recurring subscription `subscription_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider refuses or cannot be reached.
    async fn cancel_subscription(&self, subscription_id: &str, at_period_end: bool) -> Result<()>;
}

/// A provider that accepts any well-formed proof without a network call.
///
/// Used when checkout already happened elsewhere and the caller only needs the
/// entitlement recorded.
#[derive(Debug, Clone)]
pub struct LocalConfirmation {
    default_payment_method: String,
}

impl LocalConfirmation {
    /// Create a provider that labels proofs without a method as `default_payment_method`.
    #[must_use]
    pub fn new(default_payment_method: impl Into<String>) -> Self {
        Self {
            default_payment_method: default_payment_method.into(),
        }
    }
}

impl Default for LocalConfirmation {
    fn default() -> Self {
        Self::new(DEFAULT_PAYMENT_METHOD)
    }
}

#[async_trait]
impl PaymentProvider for LocalConfirmation {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn confirm_upgrade(
        &self,
        user: &UserId,
        proof: &PaymentProof,
    ) -> Result<PaymentConfirmation> {
        if proof.customer_id.trim().is_empty() {
            return Err(Error::payment("payment proof has no customer id"));
        }

        debug!(user = %user, customer_id = %proof.customer_id, "Accepting local payment proof");
        Ok(PaymentConfirmation {
            customer_id: proof.customer_id.clone(),
            subscription_id: proof.subscription_id.clone(),
            payment_method: proof
                .payment_method
                .clone()
                .unwrap_or_else(|| self.default_payment_method.clone()),
        })
    }

    async fn cancel_subscription(&self, subscription_id: &str, at_period_end: bool) -> Result<()> {
        debug!(subscription_id, at_period_end, "Local cancellation acknowledged");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proof(customer_id: &str) -> PaymentProof {
        PaymentProof {
            customer_id: customer_id.to_string(),
            subscription_id: Some("sub_123".to_string()),
            payment_method: None,
        }
    }

    #[tokio::test]
    async fn test_local_confirmation_accepts_proof() {
        let provider = LocalConfirmation::default();
        let user = UserId::new("alice").unwrap();

        let confirmation = provider
            .confirm_upgrade(&user, &proof("cus_42"))
            .await
            .unwrap();
        assert_eq!(confirmation.customer_id, "cus_42");
        assert_eq!(confirmation.subscription_id.as_deref(), Some("sub_123"));
        assert_eq!(confirmation.payment_method, DEFAULT_PAYMENT_METHOD);
    }

    #[tokio::test]
    async fn test_local_confirmation_keeps_explicit_method() {
        let provider = LocalConfirmation::new("invoice");
        let user = UserId::new("alice").unwrap();
        let mut proof = proof("cus_42");
        proof.payment_method = Some("apple_pay".to_string());

        let confirmation = provider.confirm_upgrade(&user, &proof).await.unwrap();
        assert_eq!(confirmation.payment_method, "apple_pay");
    }

    #[tokio::test]
    async fn test_local_confirmation_rejects_blank_customer() {
        let provider = LocalConfirmation::default();
        let user = UserId::new("alice").unwrap();

        let err = provider
            .confirm_upgrade(&user, &proof("  "))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Payment { .. }));
    }

    #[tokio::test]
    async fn test_local_cancel_succeeds() {
        let provider = LocalConfirmation::default();
        assert!(provider.cancel_subscription("sub_1", false).await.is_ok());
    }

    #[test]
    fn test_payment_proof_deserialize_camel_case() {
        let proof: PaymentProof =
            serde_json::from_str(r#"{"customerId": "cus_1", "subscriptionId": "sub_1"}"#).unwrap();
        assert_eq!(proof.customer_id, "cus_1");
        assert_eq!(proof.subscription_id.as_deref(), Some("sub_1"));
        assert!(proof.payment_method.is_none());
    }
}
