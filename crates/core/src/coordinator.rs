//! Translation of version checks, predicates and lock rules into store
//! conditions, and classification of conditional write results.

use crate::condition::Condition;
use crate::error::SchemaError;
use crate::schema::Schema;
use crate::store::StoreError;
use crate::value::{Item, Value};

/// The outcome of a conditional store write, as seen by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome<T> {
    Success(T),
    /// The condition did not hold against an existing item.
    ConditionalCheckFailed { current: Item },
    /// The condition did not hold because no item exists.
    NotFound,
    /// The store was unavailable; the same request may be retried.
    TransientStoreError(String),
    Fatal(StoreError),
}

/// Builds store conditions and classifies write results.
///
/// Stateless apart from the name of the version attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionalWriteCoordinator {
    version_attribute: String,
}

impl ConditionalWriteCoordinator {
    pub fn new(version_attribute: impl Into<String>) -> Self {
        Self {
            version_attribute: version_attribute.into(),
        }
    }

    pub fn version_attribute(&self) -> &str {
        &self.version_attribute
    }

    /// Requires the stored version to equal `expected`, or requires that no
    /// version exists yet when `expected` is `None`.
    pub fn build_version_condition(&self, expected: Option<u64>) -> Condition {
        match expected {
            Some(version) => Condition::eq(&self.version_attribute, version_value(version)),
            None => Condition::not_exists(&self.version_attribute),
        }
    }

    /// Checks a caller predicate against the schema.
    ///
    /// Every referenced attribute must be declared, and every comparison
    /// operand must have the attribute's declared type.
    pub fn build_predicate_condition(
        &self,
        schema: &Schema,
        predicate: Condition,
    ) -> Result<Condition, SchemaError> {
        check_predicate(schema, &predicate)?;
        Ok(predicate)
    }

    /// Allows acquisition when the item exists and the lock is free or its
    /// lease ended at or before `now_millis`, matching
    /// [`LockLease::is_expired`](crate::lock::LockLease::is_expired).
    pub fn build_lock_acquire_condition(
        &self,
        key_attribute: &str,
        owner_attribute: &str,
        expiry_attribute: &str,
        now_millis: i64,
    ) -> Condition {
        Condition::exists(key_attribute).and(
            Condition::not_exists(owner_attribute).or(Condition::le(expiry_attribute, now_millis)),
        )
    }

    /// Allows release only by the current holder.
    pub fn build_lock_release_condition(&self, owner_attribute: &str, token: &str) -> Condition {
        Condition::eq(owner_attribute, token)
    }

    /// Classifies the result of a conditional write.
    pub fn classify<T>(&self, result: Result<T, StoreError>) -> WriteOutcome<T> {
        match result {
            Ok(value) => WriteOutcome::Success(value),
            Err(StoreError::ConditionalCheckFailed { current: Some(current) }) => {
                WriteOutcome::ConditionalCheckFailed { current }
            }
            Err(StoreError::ConditionalCheckFailed { current: None }) => WriteOutcome::NotFound,
            Err(StoreError::Transient(message)) => WriteOutcome::TransientStoreError(message),
            Err(error) => WriteOutcome::Fatal(error),
        }
    }

    /// Reads the version attribute from a stored item.
    pub fn version_of(&self, item: &Item) -> Option<u64> {
        item.get(&self.version_attribute)
            .and_then(Value::as_int)
            .and_then(|v| u64::try_from(v).ok())
    }
}

/// Encodes a version for storage.
pub fn version_value(version: u64) -> Value {
    Value::Int(i64::try_from(version).unwrap_or(i64::MAX))
}

fn check_predicate(schema: &Schema, predicate: &Condition) -> Result<(), SchemaError> {
    match predicate {
        Condition::And(conditions) | Condition::Or(conditions) => conditions
            .iter()
            .try_for_each(|condition| check_predicate(schema, condition)),
        Condition::Exists(name) | Condition::NotExists(name) => {
            if schema.contains(name) {
                Ok(())
            } else {
                Err(SchemaError::UnknownAttribute(name.clone()))
            }
        }
        other => {
            let Some((name, value)) = other.comparison() else {
                return Ok(());
            };
            let definition = schema
                .attribute(name)
                .ok_or_else(|| SchemaError::UnknownAttribute(name.to_string()))?;
            if value.attribute_type() != definition.attribute_type() {
                return Err(SchemaError::TypeMismatch {
                    name: name.to_string(),
                    expected: definition.attribute_type(),
                    found: value.attribute_type(),
                });
            }
            Ok(())
        }
    }
}
