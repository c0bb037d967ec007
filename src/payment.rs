use async_trait::async_trait;
use thiserror::Error;
use ulid::Ulid;

use crate::model::Cents;

/// What the provider hands back for an authorized charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeReceipt {
    /// Provider-issued charge reference, used later for refunds and status
    /// notifications.
    pub charge_ref: String,
    pub receipt: Option<String>,
}

/// Context attached to a charge so provider-side records can be reconciled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeMetadata {
    pub plate: String,
    pub spot_id: Ulid,
    pub duration_min: u32,
}

#[derive(Debug, Error)]
pub enum ChargeError {
    #[error("charge declined: {0}")]
    Declined(String),
    #[error("payment provider error: {0}")]
    Provider(String),
}

#[derive(Debug, Error)]
pub enum RefundError {
    #[error("refund rejected: {0}")]
    Rejected(String),
    #[error("payment provider error: {0}")]
    Provider(String),
}

/// The consumed payment-provider contract. The engine only ever calls these
/// two operations; provider specifics (API clients, webhook signature
/// verification) live behind an implementation of this trait.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn authorize(
        &self,
        amount_cents: Cents,
        metadata: &ChargeMetadata,
    ) -> Result<ChargeReceipt, ChargeError>;

    async fn refund(&self, charge_ref: &str) -> Result<(), RefundError>;
}

/// Demonstration gateway: approves every non-negative charge and every
/// refund, minting synthetic references.
#[derive(Debug, Default)]
pub struct AutoApproveGateway;

#[async_trait]
impl PaymentGateway for AutoApproveGateway {
    async fn authorize(
        &self,
        amount_cents: Cents,
        _metadata: &ChargeMetadata,
    ) -> Result<ChargeReceipt, ChargeError> {
        if amount_cents < 0 {
            return Err(ChargeError::Declined("negative amount".into()));
        }
        let id = Ulid::new();
        Ok(ChargeReceipt {
            charge_ref: format!("ch_{id}"),
            receipt: Some(format!("https://pay.invalid/receipts/{id}")),
        })
    }

    async fn refund(&self, _charge_ref: &str) -> Result<(), RefundError> {
        Ok(())
    }
}

/// Test double: declines every charge and rejects every refund.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct DecliningGateway;

#[cfg(test)]
#[async_trait]
impl PaymentGateway for DecliningGateway {
    async fn authorize(
        &self,
        _amount_cents: Cents,
        _metadata: &ChargeMetadata,
    ) -> Result<ChargeReceipt, ChargeError> {
        Err(ChargeError::Declined("card declined".into()))
    }

    async fn refund(&self, _charge_ref: &str) -> Result<(), RefundError> {
        Err(RefundError::Rejected("already settled".into()))
    }
}

/// Test double: never completes, for exercising the call timeout.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct HangingGateway;

#[cfg(test)]
#[async_trait]
impl PaymentGateway for HangingGateway {
    async fn authorize(
        &self,
        _amount_cents: Cents,
        _metadata: &ChargeMetadata,
    ) -> Result<ChargeReceipt, ChargeError> {
        futures::future::pending().await
    }

    async fn refund(&self, _charge_ref: &str) -> Result<(), RefundError> {
        futures::future::pending().await
    }
}
