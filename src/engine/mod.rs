mod error;
mod ledger;
mod payments;
mod queries;
mod sessions;

pub use error::EngineError;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, RwLock};
use ulid::Ulid;

use crate::config::FeeSchedule;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub type SharedSpot = Arc<RwLock<Spot>>;
pub type SharedSession = Arc<RwLock<Session>>;
pub type SharedPayment = Arc<RwLock<Payment>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) struct WalAppend {
    event: Event,
    response: oneshot::Sender<io::Result<()>>,
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first append arrives.
/// 2. Drain all immediately available appends (the batch window).
/// 3. Single flush_sync for the whole batch.
/// 4. Respond to all senders with the batch outcome.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalAppend>) {
    while let Some(first) = rx.recv().await {
        let mut batch = vec![first];
        while let Ok(next) = rx.try_recv() {
            batch.push(next);
        }

        metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE)
            .record(batch.len() as f64);
        let flush_start = std::time::Instant::now();

        let mut result: io::Result<()> = Ok(());
        for item in &batch {
            if let Err(e) = wal.append_buffered(&item.event) {
                result = Err(e);
                break;
            }
        }
        // Always flush — even after an append error — so partially buffered
        // bytes don't leak into the next batch (these callers are all told
        // the batch failed).
        if let Err(e) = wal.flush_sync() {
            if result.is_ok() {
                result = Err(e);
            }
        }

        metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());

        for item in batch {
            let r = match &result {
                Ok(()) => Ok(()),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            };
            let _ = item.response.send(r);
        }
    }
}

// ── Event application ────────────────────────────────────

fn session_from_start_event(
    id: Ulid,
    plate: &str,
    spot_id: Ulid,
    duration_min: u32,
    start: Ms,
    cost_cents: Cents,
    fee_paid_cents: Cents,
    fee_saved_cents: Cents,
    payment_id: Option<Ulid>,
) -> Session {
    Session {
        id,
        plate: plate.to_string(),
        spot_id,
        duration_min,
        start,
        end: compute_end_time(start, duration_min),
        cost_cents,
        fee_paid_cents,
        fee_saved_cents,
        status: SessionStatus::Active,
        payment_id,
    }
}

/// Extension mutates duration and cost; the end time is always re-derived
/// from the original start.
fn apply_extension(session: &mut Session, additional_min: u32, additional_cost_cents: Cents) {
    session.duration_min += additional_min;
    session.cost_cents += additional_cost_cents;
    session.end = compute_end_time(session.start, session.duration_min);
}

pub struct Engine {
    pub(super) spots: DashMap<Ulid, SharedSpot>,
    pub(super) sessions: DashMap<Ulid, SharedSession>,
    pub(super) payments: DashMap<Ulid, SharedPayment>,
    /// plate → active session id. The at-most-one-active-session-per-plate
    /// constraint is this map's entry API, not a read-then-write pre-check.
    pub(super) active_by_plate: DashMap<String, Ulid>,
    /// provider charge reference → payment id.
    pub(super) charge_index: DashMap<String, Ulid>,
    pub(super) wal_tx: mpsc::Sender<WalAppend>,
    pub notify: Arc<NotifyHub>,
    pub(super) fees: FeeSchedule,
}

impl Engine {
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>, fees: FeeSchedule) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            spots: DashMap::new(),
            sessions: DashMap::new(),
            payments: DashMap::new(),
            active_by_plate: DashMap::new(),
            charge_index: DashMap::new(),
            wal_tx,
            notify,
            fees,
        };

        // Replay — we're the sole owner of these Arcs, so try_write always
        // succeeds instantly. Never blocking_write here: this may run inside
        // an async context (lazy tenant creation).
        for event in events {
            engine.replay_event(event);
        }

        Ok(engine)
    }

    fn replay_event(&self, event: Event) {
        match event {
            Event::SpotCreated {
                id,
                name,
                address,
                lat,
                lng,
                rate_cents,
                total_spots,
                available_spots,
                zone,
                restrictions,
                at,
            } => {
                let spot = Spot {
                    id,
                    name,
                    address,
                    lat,
                    lng,
                    rate_cents,
                    total_spots,
                    available_spots,
                    zone,
                    restrictions,
                    active: true,
                    last_updated: at,
                };
                self.spots.insert(id, Arc::new(RwLock::new(spot)));
            }
            Event::SpotAvailabilityChanged {
                id,
                available_spots,
                at,
            } => {
                if let Some(entry) = self.spots.get(&id) {
                    let spot = entry.value().clone();
                    let mut guard = spot.try_write().expect("replay: uncontended write");
                    guard.available_spots = available_spots;
                    guard.last_updated = at;
                }
            }
            Event::SpotDeactivated { id, at } => {
                if let Some(entry) = self.spots.get(&id) {
                    let spot = entry.value().clone();
                    let mut guard = spot.try_write().expect("replay: uncontended write");
                    guard.active = false;
                    guard.last_updated = at;
                }
            }
            Event::SessionStarted {
                id,
                plate,
                spot_id,
                duration_min,
                start,
                cost_cents,
                fee_paid_cents,
                fee_saved_cents,
                payment_id,
            } => {
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
                self.active_by_plate.insert(plate, id);
                self.sessions.insert(id, Arc::new(RwLock::new(session)));
            }
            Event::SessionExtended {
                id,
                additional_min,
                additional_cost_cents,
            } => {
                if let Some(entry) = self.sessions.get(&id) {
                    let session = entry.value().clone();
                    let mut guard = session.try_write().expect("replay: uncontended write");
                    apply_extension(&mut guard, additional_min, additional_cost_cents);
                }
            }
            Event::SessionCancelled { id, .. } => {
                self.replay_session_close(id, SessionStatus::Cancelled);
            }
            Event::SessionExpired { id, .. } => {
                self.replay_session_close(id, SessionStatus::Expired);
            }
            Event::PaymentRecorded {
                id,
                session_id,
                plate,
                amount_cents,
                fee_cents,
                status,
                charge_ref,
            } => {
                let payment = Payment {
                    id,
                    session_id,
                    plate,
                    amount_cents,
                    fee_cents,
                    status,
                    charge_ref: charge_ref.clone(),
                    receipt: None,
                };
                self.charge_index.insert(charge_ref, id);
                self.payments.insert(id, Arc::new(RwLock::new(payment)));
            }
            Event::PaymentStatusChanged {
                id,
                status,
                receipt,
            } => {
                if let Some(entry) = self.payments.get(&id) {
                    let payment = entry.value().clone();
                    let mut guard = payment.try_write().expect("replay: uncontended write");
                    guard.status = status;
                    if receipt.is_some() {
                        guard.receipt = receipt;
                    }
                }
            }
        }
    }

    fn replay_session_close(&self, id: Ulid, status: SessionStatus) {
        if let Some(entry) = self.sessions.get(&id) {
            let session = entry.value().clone();
            let mut guard = session.try_write().expect("replay: uncontended write");
            guard.status = status;
            self.unclaim_plate(&guard.plate, id);
        }
    }

    /// Remove the plate → session mapping, but only if it still points at
    /// this session.
    pub(super) fn unclaim_plate(&self, plate: &str, session_id: Ulid) {
        self.active_by_plate
            .remove_if(plate, |_, claimed| *claimed == session_id);
    }

    /// Write an event to the WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalAppend {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn get_spot(&self, id: &Ulid) -> Option<SharedSpot> {
        self.spots.get(id).map(|e| e.value().clone())
    }

    pub(super) fn get_session(&self, id: &Ulid) -> Option<SharedSession> {
        self.sessions.get(id).map(|e| e.value().clone())
    }

    pub(super) fn get_payment(&self, id: &Ulid) -> Option<SharedPayment> {
        self.payments.get(id).map(|e| e.value().clone())
    }
}
