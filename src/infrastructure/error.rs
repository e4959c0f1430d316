use crate::domain::clock::ClockFormatError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid clock time: {0}")]
    Format(#[from] ClockFormatError),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Invalid calendar record: {0}")]
    InvalidRecord(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Appointment store error: {0}")]
    Store(String),
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}
