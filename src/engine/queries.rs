//! Read-side operations. Everything here works off cloned `Arc` handles so
//! no DashMap shard guard is ever held across an `.await`.

use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::{Engine, EngineError, SharedPayment, SharedSession, SharedSpot};

impl Engine {
    /// Active spots matching the filter, sorted by name for stable output.
    pub async fn list_spots(&self, filter: &SpotFilter) -> Vec<Spot> {
        let shared: Vec<SharedSpot> = self.spots.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::with_capacity(shared.len());
        for spot in shared {
            let guard = spot.read().await;
            if !guard.active {
                continue;
            }
            if let Some(ref zone) = filter.zone
                && !guard.zone.eq_ignore_ascii_case(zone) {
                    continue;
                }
            if let Some(bbox) = filter.bbox
                && !bbox.contains(guard.lat, guard.lng) {
                    continue;
                }
            out.push(guard.clone());
        }
        out.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        out
    }

    pub async fn spot(&self, id: Ulid) -> Option<Spot> {
        let spot = self.get_spot(&id)?;
        let guard = spot.read().await;
        Some(guard.clone())
    }

    pub async fn session(&self, id: Ulid) -> Option<Session> {
        let session = self.get_session(&id)?;
        let guard = session.read().await;
        Some(guard.clone())
    }

    pub async fn payment(&self, id: Ulid) -> Option<Payment> {
        let payment = self.get_payment(&id)?;
        let guard = payment.read().await;
        Some(guard.clone())
    }

    /// The active session for a plate, if its `[start, end]` window contains
    /// `now`. Absence is `None`, never an error; an unparseable plate cannot
    /// have a session, so it is also `None`.
    pub async fn lookup_active(&self, plate_raw: &str, now: Ms) -> Option<SessionView> {
        let plate = normalize_plate(plate_raw)?;
        let id = *self.active_by_plate.get(&plate)?.value();
        let session = self.get_session(&id)?;
        let guard = session.read().await;
        guard
            .is_active_at(now)
            .then(|| SessionView::at(guard.clone(), now))
    }

    /// All sessions for a plate, newest first, paginated. `page` counts from
    /// one; `per_page` is clamped into `[1, MAX_PAGE_SIZE]`.
    pub async fn session_history(
        &self,
        plate_raw: &str,
        page: u32,
        per_page: u32,
        now: Ms,
    ) -> Result<Page<SessionView>, EngineError> {
        let plate = normalize_plate(plate_raw)
            .ok_or_else(|| EngineError::InvalidPlate(plate_raw.to_string()))?;
        let page = page.max(1);
        let per_page = per_page.clamp(1, MAX_PAGE_SIZE);

        let mut matching = self.sessions_for_plate(&plate).await;
        matching.sort_by(|a, b| b.start.cmp(&a.start).then(b.id.cmp(&a.id)));

        let total = matching.len();
        let pages = (total as u32).div_ceil(per_page).max(1);
        let offset = (page as usize - 1).saturating_mul(per_page as usize);
        let items = matching
            .into_iter()
            .skip(offset)
            .take(per_page as usize)
            .map(|s| SessionView::at(s, now))
            .collect();

        Ok(Page {
            items,
            page,
            per_page,
            total,
            pages,
        })
    }

    pub async fn plate_statistics(&self, plate_raw: &str) -> Result<PlateStats, EngineError> {
        let plate = normalize_plate(plate_raw)
            .ok_or_else(|| EngineError::InvalidPlate(plate_raw.to_string()))?;
        let sessions = self.sessions_for_plate(&plate).await;

        let mut stats = PlateStats {
            total_sessions: sessions.len(),
            active_sessions: 0,
            total_spent_cents: 0,
            total_fees_cents: 0,
            total_saved_cents: 0,
        };
        for s in &sessions {
            if s.status == SessionStatus::Active {
                stats.active_sessions += 1;
            }
            stats.total_spent_cents += s.cost_cents;
            stats.total_fees_cents += s.fee_paid_cents;
            stats.total_saved_cents += s.fee_saved_cents;
        }
        Ok(stats)
    }

    /// Aggregate view over the whole tenant. Occupancy is computed over the
    /// summed capacity of active spots, not per-spot averages.
    pub async fn statistics(&self) -> Stats {
        let spots: Vec<SharedSpot> = self.spots.iter().map(|e| e.value().clone()).collect();
        let mut total_spots = 0usize;
        let mut capacity: u64 = 0;
        let mut available: u64 = 0;
        for spot in spots {
            let guard = spot.read().await;
            if !guard.active {
                continue;
            }
            total_spots += 1;
            capacity += u64::from(guard.total_spots);
            available += u64::from(guard.available_spots);
        }

        let sessions: Vec<SharedSession> = self.sessions.iter().map(|e| e.value().clone()).collect();
        let mut total_revenue_cents: Cents = 0;
        let mut total_fees_saved_cents: Cents = 0;
        for session in sessions {
            let guard = session.read().await;
            total_revenue_cents += guard.cost_cents;
            total_fees_saved_cents += guard.fee_saved_cents;
        }

        let occupancy_rate = if capacity == 0 {
            0.0
        } else {
            (capacity - available) as f64 / capacity as f64 * 100.0
        };

        Stats {
            total_spots,
            available_spots: available,
            active_sessions: self.active_by_plate.len(),
            total_revenue_cents,
            total_fees_saved_cents,
            occupancy_rate,
        }
    }

    /// Look up a payment by its provider charge reference.
    pub async fn payment_for_charge(&self, charge_ref: &str) -> Option<Payment> {
        let id = *self.charge_index.get(charge_ref)?.value();
        self.payment(id).await
    }

    /// Payments for a plate, newest first.
    pub async fn payments_for_plate(&self, plate_raw: &str) -> Result<Vec<Payment>, EngineError> {
        let plate = normalize_plate(plate_raw)
            .ok_or_else(|| EngineError::InvalidPlate(plate_raw.to_string()))?;
        let shared: Vec<SharedPayment> = self.payments.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::new();
        for payment in shared {
            let guard = payment.read().await;
            if guard.plate == plate {
                out.push(guard.clone());
            }
        }
        out.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(out)
    }

    async fn sessions_for_plate(&self, plate: &str) -> Vec<Session> {
        let shared: Vec<SharedSession> = self.sessions.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::new();
        for session in shared {
            let guard = session.read().await;
            if guard.plate == plate {
                out.push(guard.clone());
            }
        }
        out
    }
}
