use thiserror::Error;

use crate::store::StoreError;
use crate::value::AttributeType;

/// Errors raised while registering or validating against a schema.
///
/// These are always raised before any store call is made.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Attribute '{0}' is declared more than once")]
    DuplicateAttribute(String),
    #[error("Attribute '{0}' is not declared in the schema")]
    UnknownAttribute(String),
    #[error("Required attribute '{0}' is missing")]
    RequiredMissing(String),
    #[error("Type mismatch for attribute '{name}': expected {expected}, found {found}")]
    TypeMismatch {
        name: String,
        expected: AttributeType,
        found: AttributeType,
    },
    #[error("Value for attribute '{0}' failed validation")]
    ValidatorRejected(String),
    #[error("Attribute '{0}' is immutable and cannot be modified")]
    ImmutableViolation(String),
    #[error("Attribute type '{0}' is not supported")]
    UnsupportedType(String),
    #[error("Attribute name '{0}' is reserved")]
    ReservedAttribute(String),
    #[error("Invalid key attribute '{name}': {reason}")]
    InvalidKey { name: String, reason: String },
}

/// How a caller may recover from a [`DynaError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// The same request may be sent again after a delay.
    Retry,
    /// The caller must re-fetch, re-apply its change and re-validate.
    RefetchAndRetry,
    /// Retrying cannot succeed without a different input.
    Abort,
}

/// Errors surfaced by records, table bindings and locks.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DynaError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("Item already exists: {key}")]
    DuplicateKey { key: String },
    #[error("Item not found: {key}")]
    NotFound { key: String },
    #[error("Version conflict on {key}: expected {expected}, stored {}", display_version(.actual))]
    OptimisticLockConflict {
        key: String,
        expected: u64,
        actual: Option<u64>,
    },
    #[error("Precondition failed for {key}")]
    PreconditionFailed { key: String },
    #[error("Record has been deleted")]
    StaleRecord,
    #[error("Lock '{attribute}' is held by {}", display_owner(.owner))]
    LockHeld {
        attribute: String,
        owner: Option<String>,
    },
    #[error("Lock '{attribute}' is not owned by this token")]
    NotOwner { attribute: String },
    #[error("Lock '{attribute}' expired while work was in progress")]
    LockExpiredDuringWork { attribute: String },
    #[error("Lock '{attribute}' cannot be leased for {ttl_ms} ms")]
    LeaseOutOfRange { attribute: String, ttl_ms: u128 },
    #[error("Store unavailable after {attempts} attempts: {message}")]
    TransientStoreError { attempts: u32, message: String },
    #[error("Store error: {0}")]
    Store(StoreError),
}

fn display_version(version: &Option<u64>) -> String {
    version.map_or_else(|| "none".to_string(), |v| v.to_string())
}

fn display_owner(owner: &Option<String>) -> &str {
    owner.as_deref().unwrap_or("another owner")
}

impl DynaError {
    /// Returns the recovery policy that applies to this error kind.
    ///
    /// `TransientStoreError` is only raised once the binding's own retries
    /// are exhausted, so it escalates to `Abort`. `Retry` is reserved for
    /// store errors seen below that boundary.
    pub fn recovery(&self) -> Recovery {
        match self {
            DynaError::OptimisticLockConflict { .. }
            | DynaError::PreconditionFailed { .. }
            | DynaError::LockHeld { .. }
            | DynaError::LockExpiredDuringWork { .. } => Recovery::RefetchAndRetry,
            DynaError::TransientStoreError { .. }
            | DynaError::Schema(_)
            | DynaError::DuplicateKey { .. }
            | DynaError::NotFound { .. }
            | DynaError::StaleRecord
            | DynaError::NotOwner { .. }
            | DynaError::LeaseOutOfRange { .. } => Recovery::Abort,
            DynaError::Store(error) => error.recovery(),
        }
    }

    /// Returns true for the optimistic-lock conflict kind.
    pub fn is_conflict(&self) -> bool {
        matches!(self, DynaError::OptimisticLockConflict { .. })
    }
}

/// Result type for record, binding and lock operations.
pub type Result<T> = std::result::Result<T, DynaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_error_display() {
        assert_eq!(
            SchemaError::RequiredMissing("Name".to_string()).to_string(),
            "Required attribute 'Name' is missing"
        );
        assert_eq!(
            SchemaError::TypeMismatch {
                name: "Age".to_string(),
                expected: AttributeType::Int,
                found: AttributeType::String,
            }
            .to_string(),
            "Type mismatch for attribute 'Age': expected int, found string"
        );
    }

    #[test]
    fn test_conflict_display() {
        let error = DynaError::OptimisticLockConflict {
            key: "UserId=u1".to_string(),
            expected: 3,
            actual: Some(4),
        };
        assert_eq!(
            error.to_string(),
            "Version conflict on UserId=u1: expected 3, stored 4"
        );

        let error = DynaError::OptimisticLockConflict {
            key: "UserId=u1".to_string(),
            expected: 3,
            actual: None,
        };
        assert_eq!(
            error.to_string(),
            "Version conflict on UserId=u1: expected 3, stored none"
        );
    }

    #[test]
    fn test_lock_held_display() {
        let error = DynaError::LockHeld {
            attribute: "jobLock".to_string(),
            owner: Some("worker-1".to_string()),
        };
        assert_eq!(error.to_string(), "Lock 'jobLock' is held by worker-1");

        let error = DynaError::LockHeld {
            attribute: "jobLock".to_string(),
            owner: None,
        };
        assert_eq!(error.to_string(), "Lock 'jobLock' is held by another owner");
    }

    #[test]
    fn test_schema_error_is_transparent() {
        let error: DynaError = SchemaError::UnknownAttribute("Nickname".to_string()).into();
        assert_eq!(
            error.to_string(),
            "Attribute 'Nickname' is not declared in the schema"
        );
    }

    #[test]
    fn test_recovery_policy() {
        assert_eq!(
            DynaError::TransientStoreError {
                attempts: 5,
                message: "throttled".to_string()
            }
            .recovery(),
            Recovery::Abort
        );
        assert_eq!(
            DynaError::OptimisticLockConflict {
                key: "k".to_string(),
                expected: 0,
                actual: Some(1)
            }
            .recovery(),
            Recovery::RefetchAndRetry
        );
        assert_eq!(
            DynaError::NotFound {
                key: "k".to_string()
            }
            .recovery(),
            Recovery::Abort
        );
        assert_eq!(
            DynaError::Schema(SchemaError::RequiredMissing("Name".to_string())).recovery(),
            Recovery::Abort
        );
        assert_eq!(
            DynaError::Store(StoreError::TableNotFound("Users".to_string())).recovery(),
            Recovery::Abort
        );
    }
}
