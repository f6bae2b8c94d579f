//! Store-specific error types

use std::num::ParseIntError;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the Redis store adapter
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Pool error: {0}")]
    Pool(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid integer value: {0}")]
    Parse(#[from] ParseIntError),

    #[error("Call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Call cancelled")]
    Cancelled,
}

impl StoreError {
    /// Returns true if the call timed out under its call context
    pub fn is_timeout(&self) -> bool {
        match self {
            StoreError::Timeout(_) => true,
            StoreError::Redis(e) => e.is_timeout(),
            _ => false,
        }
    }

    /// Returns true if the error is transport-level and the call may succeed later
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Timeout(_) | StoreError::Pool(_) | StoreError::Connection(_) => true,
            StoreError::Redis(e) => {
                e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout()
            }
            _ => false,
        }
    }
}

impl From<deadpool_redis::PoolError> for StoreError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        StoreError::Pool(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_classification() {
        let err = StoreError::Timeout(Duration::from_millis(5));
        assert!(err.is_timeout());
        assert!(err.is_retryable());
        assert_eq!(err.to_string(), "Call timed out after 5ms");
    }

    #[test]
    fn test_parse_error_is_not_retryable() {
        let err: StoreError = "abc".parse::<i64>().unwrap_err().into();
        assert!(matches!(err, StoreError::Parse(_)));
        assert!(!err.is_retryable());
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_redis_io_error_is_retryable() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err: StoreError = redis::RedisError::from(io).into();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_cancelled_and_configuration() {
        assert!(!StoreError::Cancelled.is_retryable());
        let err = StoreError::Configuration("no hosts".to_string());
        assert_eq!(err.to_string(), "Configuration error: no hosts");
    }
}
