//! parkd: an in-memory parking session daemon speaking the PostgreSQL wire
//! protocol. Spots, sessions, and payments live in per-tenant engines backed
//! by an append-only WAL; availability changes fan out over an in-process
//! broadcast channel.

pub mod auth;
pub mod config;
pub mod engine;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod payment;
pub mod sql;
pub mod sweeper;
pub mod tenant;
pub mod tls;
pub mod wal;
pub mod wire;
