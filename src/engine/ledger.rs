//! The availability ledger: every session transition funnels spot counter
//! changes through `reserve` / `release`, and operator corrections go through
//! `set_available`. All three clamp into `[0, total_spots]` and emit the
//! post-clamp value, never a delta.

use std::sync::Arc;

use tokio::sync::RwLock;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::{Engine, EngineError};

impl Engine {
    pub async fn create_spot(
        &self,
        id: Ulid,
        name: String,
        address: String,
        lat: f64,
        lng: f64,
        rate_cents: Cents,
        total_spots: u32,
        zone: String,
        restrictions: Vec<String>,
    ) -> Result<(), EngineError> {
        if self.spots.len() >= MAX_SPOTS_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many spots"));
        }
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("spot name length"));
        }
        if address.len() > MAX_ADDRESS_LEN {
            return Err(EngineError::LimitExceeded("address too long"));
        }
        if zone.len() > MAX_ZONE_LEN {
            return Err(EngineError::LimitExceeded("zone name too long"));
        }
        if restrictions.len() > MAX_RESTRICTIONS
            || restrictions.iter().any(|r| r.len() > MAX_RESTRICTION_LEN)
        {
            return Err(EngineError::LimitExceeded("too many restrictions"));
        }
        if !(MIN_LAT..=MAX_LAT).contains(&lat) || !(MIN_LNG..=MAX_LNG).contains(&lng) {
            return Err(EngineError::LimitExceeded("coordinates out of range"));
        }
        if total_spots == 0 {
            return Err(EngineError::LimitExceeded("capacity must be at least 1"));
        }
        if rate_cents < 0 {
            return Err(EngineError::LimitExceeded("negative hourly rate"));
        }
        if self.spots.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let at = now_ms();
        let event = Event::SpotCreated {
            id,
            name: name.clone(),
            address: address.clone(),
            lat,
            lng,
            rate_cents,
            total_spots,
            available_spots: total_spots,
            zone: zone.clone(),
            restrictions: restrictions.clone(),
            at,
        };
        self.wal_append(&event).await?;

        let spot = Spot {
            id,
            name,
            address,
            lat,
            lng,
            rate_cents,
            total_spots,
            available_spots: total_spots,
            zone,
            restrictions,
            active: true,
            last_updated: at,
        };
        self.spots.insert(id, Arc::new(RwLock::new(spot)));
        Ok(())
    }

    /// Soft deactivation. The spot stays in the map (history queries still
    /// resolve it) but no new sessions may target it.
    pub async fn deactivate_spot(&self, id: Ulid) -> Result<(), EngineError> {
        let spot = self.get_spot(&id).ok_or(EngineError::NotFound(id))?;
        let mut guard = spot.write().await;
        if !guard.active {
            return Err(EngineError::SpotInactive(id));
        }

        let at = now_ms();
        self.wal_append(&Event::SpotDeactivated { id, at }).await?;
        guard.active = false;
        guard.last_updated = at;
        Ok(())
    }

    /// Take one unit of capacity. Fails with `SpotUnavailable` when the
    /// counter is already at zero.
    pub(super) async fn reserve(&self, spot_id: Ulid) -> Result<(), EngineError> {
        let spot = self.get_spot(&spot_id).ok_or(EngineError::NotFound(spot_id))?;
        let mut guard = spot.write().await;
        if !guard.active {
            return Err(EngineError::SpotInactive(spot_id));
        }
        if guard.available_spots == 0 {
            return Err(EngineError::SpotUnavailable(spot_id));
        }
        let next = guard.available_spots - 1;
        self.commit_availability(&mut guard, next).await
    }

    /// Return one unit of capacity, saturating at `total_spots`. Releasing
    /// never fails on a full counter — compensation paths depend on that.
    pub(super) async fn release(&self, spot_id: Ulid) -> Result<(), EngineError> {
        let spot = self.get_spot(&spot_id).ok_or(EngineError::NotFound(spot_id))?;
        let mut guard = spot.write().await;
        let next = (guard.available_spots + 1).min(guard.total_spots);
        self.commit_availability(&mut guard, next).await
    }

    /// Operator override. The requested count is clamped into
    /// `[0, total_spots]` rather than rejected.
    pub async fn set_available(&self, spot_id: Ulid, requested: u32) -> Result<u32, EngineError> {
        let spot = self.get_spot(&spot_id).ok_or(EngineError::NotFound(spot_id))?;
        let mut guard = spot.write().await;
        let next = requested.min(guard.total_spots);
        self.commit_availability(&mut guard, next).await?;
        Ok(next)
    }

    /// WAL the post-value while the write lock is held, then apply and
    /// broadcast. Holding the lock across the append keeps the event order
    /// identical to the in-memory order.
    async fn commit_availability(
        &self,
        guard: &mut Spot,
        available_spots: u32,
    ) -> Result<(), EngineError> {
        let at = now_ms();
        self.wal_append(&Event::SpotAvailabilityChanged {
            id: guard.id,
            available_spots,
            at,
        })
        .await?;
        guard.available_spots = available_spots;
        guard.last_updated = at;
        self.notify.send(SpotUpdate {
            spot_id: guard.id,
            available_spots,
        });
        Ok(())
    }
}
