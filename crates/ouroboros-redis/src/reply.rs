//! Tagged outcome of a store call

use crate::StoreError;

/// Outcome of a store call that keeps "missing" and "failed" apart
#[derive(Debug)]
pub enum Reply<T> {
    /// The call succeeded and produced a value
    Found(T),
    /// The server answered with a nil reply (key or field absent)
    Missing,
    /// The call failed (transport, timeout, server error, ...)
    Failed(StoreError),
}

impl<T> Reply<T> {
    /// Build from a call whose nil reply is decoded as `None`
    pub fn from_optional(result: Result<Option<T>, StoreError>) -> Self {
        match result {
            Ok(Some(value)) => Reply::Found(value),
            Ok(None) => Reply::Missing,
            Err(e) => Reply::Failed(e),
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Reply::Found(_))
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Reply::Missing)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Reply::Failed(_))
    }

    /// The value, if any
    pub fn found(self) -> Option<T> {
        match self {
            Reply::Found(value) => Some(value),
            _ => None,
        }
    }

    /// The error, if the call failed
    pub fn error(&self) -> Option<&StoreError> {
        match self {
            Reply::Failed(e) => Some(e),
            _ => None,
        }
    }

    /// Missing becomes `Ok(None)`, failures stay errors
    pub fn into_result(self) -> Result<Option<T>, StoreError> {
        match self {
            Reply::Found(value) => Ok(Some(value)),
            Reply::Missing => Ok(None),
            Reply::Failed(e) => Err(e),
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Reply<U> {
        match self {
            Reply::Found(value) => Reply::Found(f(value)),
            Reply::Missing => Reply::Missing,
            Reply::Failed(e) => Reply::Failed(e),
        }
    }

    /// Value, or `default` when missing or failed
    pub fn unwrap_or(self, default: T) -> T {
        self.found().unwrap_or(default)
    }
}

impl<T: Default> Reply<T> {
    /// Value, or `T::default()` when missing or failed
    pub fn unwrap_or_default(self) -> T {
        self.found().unwrap_or_default()
    }
}

impl<T> From<Result<T, StoreError>> for Reply<T> {
    fn from(result: Result<T, StoreError>) -> Self {
        match result {
            Ok(value) => Reply::Found(value),
            Err(e) => Reply::Failed(e),
        }
    }
}
