use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::limits::*;

/// Unix milliseconds — the only time type.
pub type Ms = i64;

/// Integer cents — the only money type.
pub type Cents = i64;

pub fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

/// End time is always derived from start + duration. Every mutation of either
/// input goes through here; there is no implicit recompute-on-save hook.
pub fn compute_end_time(start: Ms, duration_min: u32) -> Ms {
    start + Ms::from(duration_min) * 60_000
}

/// Trim, uppercase, and validate a license plate. Returns `None` unless the
/// result is alphanumeric and 2–8 characters.
pub fn normalize_plate(raw: &str) -> Option<String> {
    let plate: String = raw.trim().to_uppercase();
    if plate.len() < MIN_PLATE_LEN || plate.len() > MAX_PLATE_LEN {
        return None;
    }
    if !plate.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(plate)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Active,
    Expired,
    Cancelled,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Expired => "expired",
            SessionStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(SessionStatus::Active),
            "expired" => Some(SessionStatus::Expired),
            "cancelled" => Some(SessionStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Succeeded => "succeeded",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PaymentStatus::Pending),
            "succeeded" => Some(PaymentStatus::Succeeded),
            "failed" => Some(PaymentStatus::Failed),
            "refunded" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }
}

/// A physical parking location. `available_spots` is mutated only through the
/// availability ledger and never leaves `[0, total_spots]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spot {
    pub id: Ulid,
    pub name: String,
    pub address: String,
    pub lat: f64,
    pub lng: f64,
    pub rate_cents: Cents,
    pub total_spots: u32,
    pub available_spots: u32,
    pub zone: String,
    pub restrictions: Vec<String>,
    pub active: bool,
    pub last_updated: Ms,
}

impl Spot {
    pub fn occupancy_percentage(&self) -> f64 {
        if self.total_spots == 0 {
            return 0.0;
        }
        f64::from(self.total_spots - self.available_spots) / f64::from(self.total_spots) * 100.0
    }
}

/// A time-bounded reservation of one capacity unit at a spot, keyed by plate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: Ulid,
    pub plate: String,
    pub spot_id: Ulid,
    pub duration_min: u32,
    pub start: Ms,
    pub end: Ms,
    pub cost_cents: Cents,
    pub fee_paid_cents: Cents,
    pub fee_saved_cents: Cents,
    pub status: SessionStatus,
    pub payment_id: Option<Ulid>,
}

impl Session {
    /// Seconds until the session's end time, floored at zero.
    pub fn time_remaining_secs(&self, now: Ms) -> i64 {
        ((self.end - now).max(0)) / 1000
    }

    /// Active status AND the `[start, end]` window contains `now`.
    pub fn is_active_at(&self, now: Ms) -> bool {
        self.status == SessionStatus::Active && now >= self.start && now <= self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Ulid,
    /// Absent for charges registered ahead of session creation.
    pub session_id: Option<Ulid>,
    pub plate: String,
    pub amount_cents: Cents,
    pub fee_cents: Cents,
    pub status: PaymentStatus,
    /// Opaque reference issued by the external payment provider.
    pub charge_ref: String,
    pub receipt: Option<String>,
}

/// The event types — flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    SpotCreated {
        id: Ulid,
        name: String,
        address: String,
        lat: f64,
        lng: f64,
        rate_cents: Cents,
        total_spots: u32,
        available_spots: u32,
        zone: String,
        restrictions: Vec<String>,
        at: Ms,
    },
    /// Post-value, so replay is deterministic regardless of clamping.
    SpotAvailabilityChanged {
        id: Ulid,
        available_spots: u32,
        at: Ms,
    },
    SpotDeactivated {
        id: Ulid,
        at: Ms,
    },
    SessionStarted {
        id: Ulid,
        plate: String,
        spot_id: Ulid,
        duration_min: u32,
        start: Ms,
        cost_cents: Cents,
        fee_paid_cents: Cents,
        fee_saved_cents: Cents,
        payment_id: Option<Ulid>,
    },
    SessionExtended {
        id: Ulid,
        additional_min: u32,
        additional_cost_cents: Cents,
    },
    SessionCancelled {
        id: Ulid,
        at: Ms,
    },
    SessionExpired {
        id: Ulid,
        at: Ms,
    },
    PaymentRecorded {
        id: Ulid,
        session_id: Option<Ulid>,
        plate: String,
        amount_cents: Cents,
        fee_cents: Cents,
        status: PaymentStatus,
        charge_ref: String,
    },
    PaymentStatusChanged {
        id: Ulid,
        status: PaymentStatus,
        receipt: Option<String>,
    },
}

// ── Query parameter & result types ───────────────────────────────

/// Inclusive coordinate box for spot listing. No geospatial index behind it,
/// just comparisons.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    pub fn contains(&self, lat: f64, lng: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lng >= self.min_lng && lng <= self.max_lng
    }
}

/// Typed spot-listing filter. Inactive spots are always excluded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpotFilter {
    pub zone: Option<String>,
    pub bbox: Option<BoundingBox>,
}

/// A session augmented with the caller-facing countdown fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    pub session: Session,
    pub time_remaining_secs: i64,
    pub is_expired: bool,
}

impl SessionView {
    pub fn at(session: Session, now: Ms) -> Self {
        let time_remaining_secs = session.time_remaining_secs(now);
        Self {
            session,
            time_remaining_secs,
            is_expired: time_remaining_secs == 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: usize,
    pub pages: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stats {
    pub total_spots: usize,
    pub available_spots: u64,
    pub active_sessions: usize,
    pub total_revenue_cents: Cents,
    pub total_fees_saved_cents: Cents,
    /// `(total - available) / total * 100` over all active spots' capacity.
    pub occupancy_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlateStats {
    pub total_sessions: usize,
    pub active_sessions: usize,
    pub total_spent_cents: Cents,
    pub total_fees_cents: Cents,
    pub total_saved_cents: Cents,
}

/// Payload broadcast on the parking-updates channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpotUpdate {
    pub spot_id: Ulid,
    pub available_spots: u32,
}
