use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::value::{Item, Value};

/// Suffix of the attribute that stores a lock's expiry.
pub const EXPIRY_SUFFIX: &str = "ExpiresAt";

/// Returns the name of the expiry companion of a lock owner attribute.
pub fn expiry_attribute(owner_attribute: &str) -> String {
    format!("{owner_attribute}{EXPIRY_SUFFIX}")
}

/// An opaque identifier of a lock holder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct LockToken(String);

impl LockToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Generates a random token.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for LockToken {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A lock as held by an owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockLease {
    pub owner: LockToken,
    pub attribute: String,
    /// `None` for a lease that never expires.
    pub expires_at: Option<DateTime<Utc>>,
}

impl LockLease {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    /// Reads the lease stored on an item, if the lock is held.
    pub fn from_item(item: &Item, attribute: &str) -> Option<Self> {
        let owner = item.get(attribute)?.as_str()?;
        let expires_at = item
            .get(&expiry_attribute(attribute))
            .and_then(Value::as_int)
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single());
        Some(Self {
            owner: LockToken::new(owner),
            attribute: attribute.to_string(),
            expires_at,
        })
    }
}
