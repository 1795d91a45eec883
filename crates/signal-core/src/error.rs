use thiserror::Error;

use crate::types::FailureKind;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SignalError {
    /// Oracle timed out or the network call failed.
    #[error("Transient data error: {0}")]
    Transient(String),

    /// Oracle answered with malformed or out-of-range values.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("No data: {0}")]
    NoData(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Persistence error: {0}")]
    Persistence(String),
}

pub type SignalResult<T> = Result<T, SignalError>;

impl SignalError {
    /// How an oracle error degrades the cycle input. Configuration and
    /// persistence errors are not oracle failures.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            SignalError::Transient(_) => Some(FailureKind::Transient),
            SignalError::InvalidData(_) => Some(FailureKind::Invalid),
            SignalError::NoData(_) => Some(FailureKind::NoData),
            SignalError::Configuration(_) | SignalError::Persistence(_) => None,
        }
    }
}
