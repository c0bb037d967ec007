//! Payment records and their status machine. Transitions are monotonic:
//! `pending → succeeded`, `pending → failed`, `succeeded → refunded`. Nothing
//! ever moves a payment backwards, and re-confirming a settled charge is a
//! no-op rather than an error (provider notifications are delivered
//! at-least-once).

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::payment::PaymentGateway;

use super::{Engine, EngineError};

impl Engine {
    /// Record a charge the provider has been asked to authorize. The charge
    /// reference must be unique; a duplicate means the provider notification
    /// was replayed and maps to the existing payment.
    pub async fn register_charge(
        &self,
        plate_raw: &str,
        session_id: Option<Ulid>,
        amount_cents: Cents,
        fee_cents: Cents,
        charge_ref: String,
    ) -> Result<Payment, EngineError> {
        let plate = normalize_plate(plate_raw)
            .ok_or_else(|| EngineError::InvalidPlate(plate_raw.to_string()))?;
        if charge_ref.is_empty() || charge_ref.len() > MAX_CHARGE_REF_LEN {
            return Err(EngineError::LimitExceeded("charge reference length"));
        }
        if amount_cents < 0 {
            return Err(EngineError::LimitExceeded("negative charge amount"));
        }
        let id = Ulid::new();
        // Entry-level claim, mirroring the plate index: concurrent
        // registrations of the same ref resolve to exactly one winner.
        match self.charge_index.entry(charge_ref.clone()) {
            Entry::Occupied(occupied) => {
                return Err(EngineError::AlreadyExists(*occupied.get()));
            }
            Entry::Vacant(vacant) => {
                vacant.insert(id);
            }
        }

        let event = Event::PaymentRecorded {
            id,
            session_id,
            plate: plate.clone(),
            amount_cents,
            fee_cents,
            status: PaymentStatus::Pending,
            charge_ref: charge_ref.clone(),
        };
        if let Err(e) = self.wal_append(&event).await {
            self.charge_index.remove_if(&charge_ref, |_, owner| *owner == id);
            return Err(e);
        }

        let payment = Payment {
            id,
            session_id,
            plate,
            amount_cents,
            fee_cents,
            status: PaymentStatus::Pending,
            charge_ref: charge_ref.clone(),
            receipt: None,
        };
        self.payments.insert(id, Arc::new(RwLock::new(payment.clone())));
        Ok(payment)
    }

    /// Record a charge the gateway has already settled (the paid-session
    /// path): a pending record immediately confirmed with its receipt.
    pub(super) async fn record_settled_charge(
        &self,
        plate: &str,
        session_id: Ulid,
        amount_cents: Cents,
        fee_cents: Cents,
        charge_ref: String,
        receipt: Option<String>,
    ) -> Result<Payment, EngineError> {
        let payment = self
            .register_charge(plate, Some(session_id), amount_cents, fee_cents, charge_ref.clone())
            .await?;
        self.transition_payment(payment.id, PaymentStatus::Succeeded, receipt)
            .await
    }

    /// Provider notified us the charge settled. Idempotent: confirming an
    /// already-succeeded charge returns it unchanged.
    pub async fn confirm_charge(
        &self,
        charge_ref: &str,
        receipt: Option<String>,
    ) -> Result<Payment, EngineError> {
        if let Some(ref r) = receipt
            && r.len() > MAX_RECEIPT_LEN {
                return Err(EngineError::LimitExceeded("receipt too long"));
            }
        let id = self.payment_by_charge_ref(charge_ref)?;
        let payment = self.get_payment(&id).ok_or(EngineError::NotFound(id))?;
        {
            let guard = payment.read().await;
            if guard.status == PaymentStatus::Succeeded {
                return Ok(guard.clone());
            }
            if guard.status != PaymentStatus::Pending {
                return Err(EngineError::InvalidPaymentState {
                    id,
                    status: guard.status,
                });
            }
        }
        self.transition_payment(id, PaymentStatus::Succeeded, receipt)
            .await
    }

    /// Provider notified us the charge was declined or errored after the
    /// fact. Only a pending charge can fail.
    pub async fn fail_charge(&self, charge_ref: &str) -> Result<Payment, EngineError> {
        let id = self.payment_by_charge_ref(charge_ref)?;
        let payment = self.get_payment(&id).ok_or(EngineError::NotFound(id))?;
        {
            let guard = payment.read().await;
            if guard.status != PaymentStatus::Pending {
                return Err(EngineError::InvalidPaymentState {
                    id,
                    status: guard.status,
                });
            }
        }
        self.transition_payment(id, PaymentStatus::Failed, None).await
    }

    /// Refund a settled payment and cancel its session. The refund commits
    /// first; if the session cancel then fails (already cancelled by the
    /// driver, say) the refund still stands and the mismatch is logged —
    /// retrying must never refund twice, and the refunded status guarantees
    /// that.
    pub async fn refund_payment(
        &self,
        gateway: &dyn PaymentGateway,
        refund_timeout: Duration,
        payment_id: Ulid,
    ) -> Result<Payment, EngineError> {
        let payment = self
            .get_payment(&payment_id)
            .ok_or(EngineError::NotFound(payment_id))?;
        {
            let guard = payment.read().await;
            if guard.status != PaymentStatus::Succeeded {
                return Err(EngineError::InvalidPaymentState {
                    id: payment_id,
                    status: guard.status,
                });
            }
        }
        let charge_ref = payment.read().await.charge_ref.clone();

        match tokio::time::timeout(refund_timeout, gateway.refund(&charge_ref)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(EngineError::RefundFailed(e.to_string())),
            Err(_elapsed) => return Err(EngineError::PaymentTimeout),
        }

        let refunded = self
            .transition_payment(payment_id, PaymentStatus::Refunded, None)
            .await?;

        if let Some(session_id) = refunded.session_id {
            match self.cancel_session(session_id).await {
                Ok(_) | Err(EngineError::SessionNotActive { .. }) => {}
                Err(e) => {
                    tracing::warn!(
                        payment = %payment_id,
                        session = %session_id,
                        error = %e,
                        "refund committed but session cancel failed"
                    );
                }
            }
        }
        Ok(refunded)
    }

    fn payment_by_charge_ref(&self, charge_ref: &str) -> Result<Ulid, EngineError> {
        self.charge_index
            .get(charge_ref)
            .map(|e| *e.value())
            .ok_or_else(|| EngineError::UnknownChargeRef(charge_ref.to_string()))
    }

    /// WAL the status change, then apply it under the payment's write lock,
    /// re-checking that nobody raced us to a terminal state.
    async fn transition_payment(
        &self,
        id: Ulid,
        status: PaymentStatus,
        receipt: Option<String>,
    ) -> Result<Payment, EngineError> {
        let payment = self.get_payment(&id).ok_or(EngineError::NotFound(id))?;
        let mut guard = payment.write().await;
        let allowed = matches!(
            (guard.status, status),
            (PaymentStatus::Pending, PaymentStatus::Succeeded)
                | (PaymentStatus::Pending, PaymentStatus::Failed)
                | (PaymentStatus::Succeeded, PaymentStatus::Refunded)
        );
        if !allowed {
            return Err(EngineError::InvalidPaymentState {
                id,
                status: guard.status,
            });
        }

        self.wal_append(&Event::PaymentStatusChanged {
            id,
            status,
            receipt: receipt.clone(),
        })
        .await?;
        guard.status = status;
        if receipt.is_some() {
            guard.receipt = receipt;
        }
        Ok(guard.clone())
    }
}
