use signal_core::SignalError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OracleError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("No data: {0}")]
    NoData(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type OracleResult<T> = Result<T, OracleError>;

impl From<OracleError> for SignalError {
    fn from(err: OracleError) -> Self {
        match err {
            OracleError::RequestFailed(e) if e.is_decode() => SignalError::InvalidData(e.to_string()),
            OracleError::RequestFailed(e) => SignalError::Transient(e.to_string()),
            OracleError::ServiceUnavailable(msg) | OracleError::RateLimited(msg) => {
                SignalError::Transient(msg)
            }
            OracleError::InvalidResponse(msg) => SignalError::InvalidData(msg),
            OracleError::Serialization(e) => SignalError::InvalidData(e.to_string()),
            OracleError::NoData(msg) => SignalError::NoData(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_mapping() {
        assert!(matches!(
            SignalError::from(OracleError::ServiceUnavailable("503".into())),
            SignalError::Transient(_)
        ));
        assert!(matches!(
            SignalError::from(OracleError::InvalidResponse("bad".into())),
            SignalError::InvalidData(_)
        ));
        assert!(matches!(
            SignalError::from(OracleError::NoData("empty".into())),
            SignalError::NoData(_)
        ));
    }
}
