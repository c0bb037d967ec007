use thiserror::Error;
use ulid::Ulid;

use crate::model::{PaymentStatus, SessionStatus};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(Ulid),
    #[error("already exists: {0}")]
    AlreadyExists(Ulid),
    #[error("invalid license plate: {0:?}")]
    InvalidPlate(String),
    #[error("invalid duration: {0} minutes (must be 1-1440)")]
    InvalidDuration(i64),
    #[error("plate {plate} already has an active session {session_id}")]
    PlateAlreadyActive { plate: String, session_id: Ulid },
    #[error("spot {0} has no available capacity")]
    SpotUnavailable(Ulid),
    #[error("spot {0} is deactivated")]
    SpotInactive(Ulid),
    #[error("session {id} is not active (status: {status:?})")]
    SessionNotActive { id: Ulid, status: SessionStatus },
    #[error("payment {id} cannot transition from {status:?}")]
    InvalidPaymentState { id: Ulid, status: PaymentStatus },
    #[error("unknown charge reference: {0}")]
    UnknownChargeRef(String),
    #[error("charge authorization failed: {0}")]
    PaymentDeclined(String),
    #[error("payment provider timed out")]
    PaymentTimeout,
    #[error("refund failed: {0}")]
    RefundFailed(String),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("WAL error: {0}")]
    WalError(String),
}
