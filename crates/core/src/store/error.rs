use thiserror::Error;

use crate::error::Recovery;
use crate::value::Item;

/// Errors reported by an [`ItemStore`](super::ItemStore) backend.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    /// A write condition did not hold. Carries the stored item as it was
    /// when the condition was evaluated, or `None` if no item existed.
    #[error("Conditional check failed")]
    ConditionalCheckFailed { current: Option<Item> },
    #[error("Transient store failure: {0}")]
    Transient(String),
    #[error("Table not found: {0}")]
    TableNotFound(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Invalid data: {0}")]
    InvalidData(String),
    #[error("Request failed: {0}")]
    RequestFailed(String),
}

impl StoreError {
    /// How a single failed store request may be recovered from.
    pub fn recovery(&self) -> Recovery {
        match self {
            StoreError::Transient(_) => Recovery::Retry,
            StoreError::ConditionalCheckFailed { .. } => Recovery::RefetchAndRetry,
            _ => Recovery::Abort,
        }
    }

    /// Returns true when the same request may succeed if sent again.
    pub fn is_transient(&self) -> bool {
        self.recovery() == Recovery::Retry
    }
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_display() {
        let error = StoreError::Transient("throughput exceeded".to_string());
        assert_eq!(
            error.to_string(),
            "Transient store failure: throughput exceeded"
        );
        assert!(error.is_transient());
    }

    #[test]
    fn test_table_not_found_display() {
        let error = StoreError::TableNotFound("Users".to_string());
        assert_eq!(error.to_string(), "Table not found: Users");
        assert!(!error.is_transient());
    }

    #[test]
    fn test_conditional_check_failed_is_not_transient() {
        let error = StoreError::ConditionalCheckFailed { current: None };
        assert_eq!(error.to_string(), "Conditional check failed");
        assert!(!error.is_transient());
        assert_eq!(error.recovery(), Recovery::RefetchAndRetry);
    }

    #[test]
    fn test_store_error_recovery() {
        assert_eq!(
            StoreError::Transient("throttled".to_string()).recovery(),
            Recovery::Retry
        );
        assert_eq!(
            StoreError::TableNotFound("Users".to_string()).recovery(),
            Recovery::Abort
        );
    }
}
