//! Cooperative locks stored on items.
//!
//! A lock is a pair of attributes on an existing item: the owner attribute
//! holds the holder's token and its `ExpiresAt` companion holds the lease
//! expiry in epoch milliseconds. Acquire and release are single conditional
//! updates, so two clients can never both succeed in acquiring.
//!
//! This is best-effort mutual exclusion: expiry is judged by each client's
//! clock, and the TTL is the only recovery from a holder that crashed.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use dynabridge_core::{
    expiry_attribute, DynaError, ItemKey, LockLease, LockToken, Result, SchemaError, UpdateSpec,
    WriteOutcome,
};

use crate::binding::TableBinding;

/// A lock attribute on one item.
#[derive(Debug, Clone)]
pub struct Lock {
    binding: Arc<TableBinding>,
    key: ItemKey,
    attribute: String,
    expiry_attribute: String,
}

/// The result of work done under a lock.
#[derive(Debug, Clone, PartialEq)]
pub struct Guarded<T> {
    pub value: T,
    /// Set to `LockExpiredDuringWork` when the lease ran out before release.
    pub warning: Option<DynaError>,
}

impl<T> Guarded<T> {
    pub fn into_inner(self) -> T {
        self.value
    }

    /// Returns the value, or the warning as an error if the lease expired.
    pub fn into_result(self) -> Result<T> {
        match self.warning {
            Some(warning) => Err(warning),
            None => Ok(self.value),
        }
    }

    pub fn expired_during_work(&self) -> bool {
        self.warning.is_some()
    }
}

impl Lock {
    /// Creates a handle on the `attribute` lock of the item at `key`.
    ///
    /// The attribute must have been registered on the binding.
    pub fn new(binding: &Arc<TableBinding>, key: ItemKey, attribute: &str) -> Result<Self> {
        if !binding.is_lock_attribute(attribute) {
            return Err(SchemaError::UnknownAttribute(attribute.to_string()).into());
        }
        Ok(Self {
            binding: Arc::clone(binding),
            key,
            attribute: attribute.to_string(),
            expiry_attribute: expiry_attribute(attribute),
        })
    }

    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    pub fn key(&self) -> &ItemKey {
        &self.key
    }

    /// Acquires the lock for `token`.
    ///
    /// Succeeds when the item exists and the lock is free or its lease has
    /// expired. With no `ttl` the lease never expires and only `release`
    /// frees it.
    ///
    /// Acquiring is idempotent per token: if the lock is already held by
    /// `token` (for instance because a retried request had in fact landed),
    /// the stored lease is returned unchanged.
    pub async fn acquire(&self, token: &LockToken, ttl: Option<Duration>) -> Result<LockLease> {
        let now = self.binding.clock().now();
        let expires_at = match ttl {
            Some(ttl) => Some(lease_end(now, ttl).ok_or_else(|| DynaError::LeaseOutOfRange {
                attribute: self.attribute.clone(),
                ttl_ms: ttl.as_millis(),
            })?),
            None => None,
        };

        let mut update = UpdateSpec::new().set(&self.attribute, token.as_str());
        update = match expires_at {
            Some(expires_at) => update.set(&self.expiry_attribute, expires_at.timestamp_millis()),
            None => update.remove(&self.expiry_attribute),
        };
        let condition = self.binding.coordinator().build_lock_acquire_condition(
            self.binding.partition_key(),
            &self.attribute,
            &self.expiry_attribute,
            now.timestamp_millis(),
        );

        match self
            .binding
            .update_unversioned(&self.key, update, condition)
            .await?
        {
            WriteOutcome::Success(_) => {
                debug!(key = %self.key, lock = %self.attribute, owner = %token, "Lock acquired");
                Ok(LockLease {
                    owner: token.clone(),
                    attribute: self.attribute.clone(),
                    expires_at,
                })
            }
            WriteOutcome::ConditionalCheckFailed { current } => {
                match LockLease::from_item(&current, &self.attribute) {
                    Some(lease) if lease.owner == *token => {
                        debug!(key = %self.key, lock = %self.attribute, owner = %token, "Lock already held by this token");
                        Ok(lease)
                    }
                    lease => Err(DynaError::LockHeld {
                        attribute: self.attribute.clone(),
                        owner: lease.map(|lease| lease.owner.to_string()),
                    }),
                }
            }
            _ => Err(DynaError::NotFound {
                key: self.key.to_string(),
            }),
        }
    }

    /// Releases the lock if `token` holds it.
    ///
    /// Releasing a lock nobody holds succeeds, so a retried release whose
    /// first attempt already landed is not reported as `NotOwner`.
    pub async fn release(&self, token: &LockToken) -> Result<()> {
        let update = UpdateSpec::new()
            .remove(&self.attribute)
            .remove(&self.expiry_attribute);
        let condition = self
            .binding
            .coordinator()
            .build_lock_release_condition(&self.attribute, token.as_str());

        match self
            .binding
            .update_unversioned(&self.key, update, condition)
            .await?
        {
            WriteOutcome::Success(_) => {
                debug!(key = %self.key, lock = %self.attribute, owner = %token, "Lock released");
                Ok(())
            }
            WriteOutcome::ConditionalCheckFailed { current } if !current.contains_key(&self.attribute) => {
                debug!(key = %self.key, lock = %self.attribute, owner = %token, "Lock already free");
                Ok(())
            }
            WriteOutcome::ConditionalCheckFailed { .. } => Err(DynaError::NotOwner {
                attribute: self.attribute.clone(),
            }),
            _ => Err(DynaError::NotFound {
                key: self.key.to_string(),
            }),
        }
    }

    /// Reads the current lease, if the lock is held (expired or not).
    pub async fn current(&self) -> Result<Option<LockLease>> {
        let item = self.binding.get_raw(&self.key).await?;
        Ok(item.and_then(|item| LockLease::from_item(&item, &self.attribute)))
    }

    /// Runs `body` while holding the lock under a fresh token.
    ///
    /// The outer error reports lock failures only; the outcome of `body`,
    /// success or error, is returned inside [`Guarded`]. The lock is
    /// released either way. When the lease expired before release the
    /// outcome is flagged with a `LockExpiredDuringWork` warning, because
    /// another client may have acquired the lock in the meantime. A release
    /// failure after `body` failed is logged rather than masking its error.
    pub async fn with_lock<F, Fut, T, E>(
        &self,
        ttl: Option<Duration>,
        body: F,
    ) -> Result<Guarded<std::result::Result<T, E>>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let token = LockToken::generate();
        let lease = self.acquire(&token, ttl).await?;

        let outcome = body().await;

        let expired = lease.is_expired(self.binding.clock().now());
        let released = self.release(&token).await;

        let warning = expired.then(|| {
            warn!(
                key = %self.key,
                lock = %self.attribute,
                owner = %token,
                failed = outcome.is_err(),
                "Lock expired before the guarded work finished"
            );
            DynaError::LockExpiredDuringWork {
                attribute: self.attribute.clone(),
            }
        });

        match released {
            Ok(()) => {}
            // Taken over by another client after expiry; reported via the warning.
            Err(DynaError::NotOwner { .. }) if expired => {}
            Err(err) if outcome.is_err() => {
                warn!(
                    key = %self.key,
                    lock = %self.attribute,
                    owner = %token,
                    error = %err,
                    "Failed to release lock after the guarded work failed"
                );
            }
            Err(err) => return Err(err),
        }

        Ok(Guarded {
            value: outcome,
            warning,
        })
    }
}

fn lease_end(now: DateTime<Utc>, ttl: Duration) -> Option<DateTime<Utc>> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
}
