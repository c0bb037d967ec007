use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use tokio::sync::RwLock;
use tokio::time::timeout;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::payment::{ChargeMetadata, PaymentGateway};

use super::{apply_extension, session_from_start_event, Engine, EngineError};

impl Engine {
    /// Start an unpaid session (kerbside / operator-entered). Capacity is
    /// reserved and the plate claimed atomically with respect to concurrent
    /// creates for the same plate.
    pub async fn create_session(
        &self,
        plate_raw: &str,
        spot_id: Ulid,
        duration_min: u32,
        declared_cost_cents: Cents,
    ) -> Result<Session, EngineError> {
        let plate = Self::validate_session_input(plate_raw, duration_min, declared_cost_cents)?;
        self.start_session(plate, spot_id, duration_min, declared_cost_cents, None)
            .await
    }

    /// Start a session paid through the external gateway. The reservation is
    /// held while the charge is authorized; any authorization failure —
    /// decline, provider error, or timeout — rolls the reservation back
    /// before the error is surfaced.
    pub async fn create_paid_session(
        &self,
        gateway: &dyn PaymentGateway,
        payment_timeout: Duration,
        plate_raw: &str,
        spot_id: Ulid,
        duration_min: u32,
        declared_cost_cents: Cents,
    ) -> Result<Session, EngineError> {
        let plate = Self::validate_session_input(plate_raw, duration_min, declared_cost_cents)?;

        let session_id = Ulid::new();
        self.claim_plate(&plate, session_id)?;
        if let Err(e) = self.reserve(spot_id).await {
            self.unclaim_plate(&plate, session_id);
            return Err(e);
        }

        let metadata = ChargeMetadata {
            plate: plate.clone(),
            spot_id,
            duration_min,
        };
        let receipt = match timeout(
            payment_timeout,
            gateway.authorize(declared_cost_cents, &metadata),
        )
        .await
        {
            Ok(Ok(receipt)) => receipt,
            Ok(Err(charge_err)) => {
                self.rollback_reservation(&plate, session_id, spot_id).await;
                return Err(EngineError::PaymentDeclined(charge_err.to_string()));
            }
            Err(_elapsed) => {
                self.rollback_reservation(&plate, session_id, spot_id).await;
                return Err(EngineError::PaymentTimeout);
            }
        };

        let payment = match self
            .record_settled_charge(
                &plate,
                session_id,
                declared_cost_cents,
                self.fees.platform_cents,
                receipt.charge_ref.clone(),
                receipt.receipt.clone(),
            )
            .await
        {
            Ok(payment) => payment,
            Err(e) => {
                // Authorized but not persisted: refund best-effort so the
                // driver is not charged for a session that never existed.
                if let Err(refund_err) = gateway.refund(&receipt.charge_ref).await {
                    tracing::warn!(
                        charge_ref = %receipt.charge_ref,
                        error = %refund_err,
                        "refund of unpersisted charge failed"
                    );
                }
                self.rollback_reservation(&plate, session_id, spot_id).await;
                return Err(e);
            }
        };

        match self
            .persist_session(
                session_id,
                plate.clone(),
                spot_id,
                duration_min,
                declared_cost_cents,
                Some(payment.id),
            )
            .await
        {
            Ok(session) => Ok(session),
            Err(e) => {
                if let Err(refund_err) = gateway.refund(&receipt.charge_ref).await {
                    tracing::warn!(
                        charge_ref = %receipt.charge_ref,
                        error = %refund_err,
                        "refund of orphaned charge failed"
                    );
                }
                self.rollback_reservation(&plate, session_id, spot_id).await;
                Err(e)
            }
        }
    }

    fn validate_session_input(
        plate_raw: &str,
        duration_min: u32,
        declared_cost_cents: Cents,
    ) -> Result<String, EngineError> {
        let plate = normalize_plate(plate_raw)
            .ok_or_else(|| EngineError::InvalidPlate(plate_raw.to_string()))?;
        if !(MIN_DURATION_MIN..=MAX_DURATION_MIN).contains(&duration_min) {
            return Err(EngineError::InvalidDuration(i64::from(duration_min)));
        }
        if declared_cost_cents < 0 {
            return Err(EngineError::LimitExceeded("negative session cost"));
        }
        Ok(plate)
    }

    /// The uniqueness constraint: claim succeeds only if no other session id
    /// currently owns the plate. Entry-level, not a read-then-write pre-check,
    /// so concurrent creates for the same plate resolve to exactly one winner.
    fn claim_plate(&self, plate: &str, session_id: Ulid) -> Result<(), EngineError> {
        match self.active_by_plate.entry(plate.to_string()) {
            Entry::Occupied(occupied) => Err(EngineError::PlateAlreadyActive {
                plate: plate.to_string(),
                session_id: *occupied.get(),
            }),
            Entry::Vacant(vacant) => {
                vacant.insert(session_id);
                Ok(())
            }
        }
    }

    async fn rollback_reservation(&self, plate: &str, session_id: Ulid, spot_id: Ulid) {
        if let Err(e) = self.release(spot_id).await {
            tracing::warn!(%spot_id, error = %e, "rollback release failed");
        }
        self.unclaim_plate(plate, session_id);
    }

    async fn start_session(
        &self,
        plate: String,
        spot_id: Ulid,
        duration_min: u32,
        cost_cents: Cents,
        payment_id: Option<Ulid>,
    ) -> Result<Session, EngineError> {
        let session_id = Ulid::new();
        self.claim_plate(&plate, session_id)?;
        if let Err(e) = self.reserve(spot_id).await {
            self.unclaim_plate(&plate, session_id);
            return Err(e);
        }
        match self
            .persist_session(session_id, plate.clone(), spot_id, duration_min, cost_cents, payment_id)
            .await
        {
            Ok(session) => Ok(session),
            Err(e) => {
                self.rollback_reservation(&plate, session_id, spot_id).await;
                Err(e)
            }
        }
    }

    async fn persist_session(
        &self,
        id: Ulid,
        plate: String,
        spot_id: Ulid,
        duration_min: u32,
        cost_cents: Cents,
        payment_id: Option<Ulid>,
    ) -> Result<Session, EngineError> {
        let start = now_ms();
        let fee_paid_cents = self.fees.platform_cents;
        let fee_saved_cents = self.fees.saved_cents();
        self.wal_append(&Event::SessionStarted {
            id,
            plate: plate.clone(),
            spot_id,
            duration_min,
            start,
            cost_cents,
            fee_paid_cents,
            fee_saved_cents,
            payment_id,
        })
        .await?;

        let session = session_from_start_event(
            id,
            &plate,
            spot_id,
            duration_min,
            start,
            cost_cents,
            fee_paid_cents,
            fee_saved_cents,
            payment_id,
        );
        self.sessions.insert(id, Arc::new(RwLock::new(session.clone())));
        Ok(session)
    }

    /// Add minutes and cost to an active session. The end time is recomputed
    /// from the original start, never from the previous end.
    pub async fn extend_session(
        &self,
        id: Ulid,
        additional_min: u32,
        additional_cost_cents: Cents,
    ) -> Result<Session, EngineError> {
        if additional_min == 0 {
            return Err(EngineError::InvalidDuration(0));
        }
        if additional_cost_cents < 0 {
            return Err(EngineError::LimitExceeded("negative extension cost"));
        }
        let session = self.get_session(&id).ok_or(EngineError::NotFound(id))?;
        let mut guard = session.write().await;
        if guard.status != SessionStatus::Active {
            return Err(EngineError::SessionNotActive {
                id,
                status: guard.status,
            });
        }
        let new_total = guard.duration_min.saturating_add(additional_min);
        if new_total > MAX_DURATION_MIN {
            return Err(EngineError::InvalidDuration(i64::from(new_total)));
        }

        self.wal_append(&Event::SessionExtended {
            id,
            additional_min,
            additional_cost_cents,
        })
        .await?;
        apply_extension(&mut guard, additional_min, additional_cost_cents);
        Ok(guard.clone())
    }

    /// Explicit cancellation. Frees the plate and returns the capacity unit;
    /// a release failure after the cancel has committed is logged, not
    /// surfaced, so the session never ends up half-cancelled.
    pub async fn cancel_session(&self, id: Ulid) -> Result<Session, EngineError> {
        let session = self.get_session(&id).ok_or(EngineError::NotFound(id))?;
        let mut guard = session.write().await;
        if guard.status != SessionStatus::Active {
            return Err(EngineError::SessionNotActive {
                id,
                status: guard.status,
            });
        }

        let at = now_ms();
        self.wal_append(&Event::SessionCancelled { id, at }).await?;
        guard.status = SessionStatus::Cancelled;
        self.unclaim_plate(&guard.plate, id);
        let spot_id = guard.spot_id;
        let snapshot = guard.clone();
        drop(guard);

        if let Err(e) = self.release(spot_id).await {
            tracing::warn!(%spot_id, session = %id, error = %e, "release after cancel failed");
        }
        Ok(snapshot)
    }

    /// Transition one session to expired, guarded by a status precondition:
    /// a session cancelled between the sweep's scan and this call is left
    /// untouched and `Ok(false)` is returned.
    pub async fn expire_session(&self, id: Ulid) -> Result<bool, EngineError> {
        let session = self.get_session(&id).ok_or(EngineError::NotFound(id))?;
        let mut guard = session.write().await;
        if guard.status != SessionStatus::Active {
            return Ok(false);
        }

        let at = now_ms();
        self.wal_append(&Event::SessionExpired { id, at }).await?;
        guard.status = SessionStatus::Expired;
        self.unclaim_plate(&guard.plate, id);
        let spot_id = guard.spot_id;
        drop(guard);

        self.release(spot_id).await?;
        Ok(true)
    }

    /// Sessions whose window has closed but whose status is still active.
    /// Contended entries are skipped; the next tick picks them up.
    pub fn collect_expired(&self, now: Ms) -> Vec<Ulid> {
        self.sessions
            .iter()
            .filter_map(|entry| {
                let guard = entry.value().try_read().ok()?;
                (guard.status == SessionStatus::Active && guard.end < now).then_some(guard.id)
            })
            .collect()
    }
}
