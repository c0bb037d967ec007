//! Input bounds. Every externally supplied value is checked against one of
//! these before it reaches the engine.

/// Normalized license plates: alphanumeric, 2–8 characters.
pub const MIN_PLATE_LEN: usize = 2;
pub const MAX_PLATE_LEN: usize = 8;

/// Session duration in minutes: at least one minute, at most 24 hours.
pub const MIN_DURATION_MIN: u32 = 1;
pub const MAX_DURATION_MIN: u32 = 1440;

pub const MIN_LAT: f64 = -90.0;
pub const MAX_LAT: f64 = 90.0;
pub const MIN_LNG: f64 = -180.0;
pub const MAX_LNG: f64 = 180.0;

pub const MAX_NAME_LEN: usize = 100;
pub const MAX_ADDRESS_LEN: usize = 200;
pub const MAX_ZONE_LEN: usize = 50;
pub const MAX_RESTRICTIONS: usize = 16;
pub const MAX_RESTRICTION_LEN: usize = 100;
pub const MAX_CHARGE_REF_LEN: usize = 128;
pub const MAX_RECEIPT_LEN: usize = 512;

/// History pagination: `per_page` is clamped into `[1, MAX_PAGE_SIZE]`.
pub const MAX_PAGE_SIZE: u32 = 100;
pub const DEFAULT_PAGE_SIZE: u32 = 10;

pub const MAX_SPOTS_PER_TENANT: usize = 10_000;
pub const MAX_TENANTS: usize = 256;
pub const MAX_TENANT_NAME_LEN: usize = 256;
