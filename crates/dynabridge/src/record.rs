//! Version-tracked records.
//!
//! A [`Record`] holds the values of one item plus the snapshot it last synced
//! with the store. Saves are optimistic: a persisted record writes only if the
//! stored version still matches the one it was read at, and conflicts are
//! reported to the caller rather than retried. Merging is left to the caller,
//! usually via [`Record::refresh`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::stream::{BoxStream, StreamExt, TryStreamExt};
use tracing::debug;

use dynabridge_core::{Condition, DynaError, Item, ItemKey, Result, SchemaError, Value};

use crate::binding::{StoredItem, TableBinding, WriteReceipt};
use crate::lock::Lock;

/// Lifecycle of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    /// Never written.
    Transient,
    /// Synced with the store at `version`.
    Persisted { version: u64 },
    /// Deleted through this record; further operations fail.
    Deleted,
}

/// One item of a bound table.
#[derive(Debug, Clone)]
pub struct Record {
    binding: Arc<TableBinding>,
    values: Item,
    snapshot: Option<Item>,
    state: RecordState,
    last_update: Option<DateTime<Utc>>,
}

impl Record {
    /// Creates an empty, unsaved record.
    pub fn new(binding: &Arc<TableBinding>) -> Self {
        Self::from_values(binding, Item::new())
    }

    /// Creates an unsaved record with initial values.
    pub fn from_values(binding: &Arc<TableBinding>, values: Item) -> Self {
        Self {
            binding: Arc::clone(binding),
            values,
            snapshot: None,
            state: RecordState::Transient,
            last_update: None,
        }
    }

    fn from_stored(binding: &Arc<TableBinding>, stored: StoredItem) -> Self {
        Self {
            binding: Arc::clone(binding),
            values: stored.values.clone(),
            snapshot: Some(stored.values),
            state: RecordState::Persisted {
                version: stored.version.unwrap_or(0),
            },
            last_update: stored.last_update,
        }
    }

    /// Fetches a record by primary key.
    pub async fn load(binding: &Arc<TableBinding>, key: &ItemKey) -> Result<Option<Self>> {
        let stored = binding.get_by_key(key).await?;
        Ok(stored.map(|stored| Self::from_stored(binding, stored)))
    }

    /// Returns true when an item with the key exists.
    pub async fn exists(binding: &Arc<TableBinding>, key: &ItemKey) -> Result<bool> {
        Ok(binding.get_by_key(key).await?.is_some())
    }

    /// Lazily streams the records whose `name` attribute equals `value`.
    pub fn scan_by_attribute<'a>(
        binding: &'a Arc<TableBinding>,
        name: &str,
        value: impl Into<Value>,
    ) -> Result<BoxStream<'a, Result<Self>>> {
        Ok(binding
            .scan_by_attribute(name, value)?
            .map_ok(move |stored| Self::from_stored(binding, stored))
            .boxed())
    }

    /// Lazily streams every record of the table.
    pub fn scan_all(binding: &Arc<TableBinding>) -> BoxStream<'_, Result<Self>> {
        binding
            .scan_all()
            .map_ok(move |stored| Self::from_stored(binding, stored))
            .boxed()
    }

    /// Collects every record of the table.
    pub async fn find_all(binding: &Arc<TableBinding>) -> Result<Vec<Self>> {
        Self::scan_all(binding).try_collect().await
    }

    /// Collects every record whose `name` attribute equals `value`.
    pub async fn find_by_attribute(
        binding: &Arc<TableBinding>,
        name: &str,
        value: impl Into<Value>,
    ) -> Result<Vec<Self>> {
        Self::scan_by_attribute(binding, name, value)?
            .try_collect()
            .await
    }

    pub fn binding(&self) -> &Arc<TableBinding> {
        &self.binding
    }

    pub fn state(&self) -> RecordState {
        self.state
    }

    /// The version last synced with the store, if persisted.
    pub fn version(&self) -> Option<u64> {
        match self.state {
            RecordState::Persisted { version } => Some(version),
            _ => None,
        }
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.last_update
    }

    pub fn values(&self) -> &Item {
        &self.values
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Sets an attribute. Validation happens on save.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Result<&mut Self> {
        self.ensure_live()?;
        self.values.insert(name.into(), value.into());
        Ok(self)
    }

    /// Removes an attribute, returning its previous value.
    pub fn remove(&mut self, name: &str) -> Result<Option<Value>> {
        self.ensure_live()?;
        Ok(self.values.remove(name))
    }

    /// Returns the record's key, taken from the synced snapshot once
    /// persisted.
    pub fn key(&self) -> Result<ItemKey> {
        self.binding
            .key_of(self.snapshot.as_ref().unwrap_or(&self.values))
    }

    /// Validates and writes the record.
    ///
    /// An unsaved record is created at version 0 and fails with
    /// `DuplicateKey` if the key is taken. A persisted record is updated only
    /// if the stored version still equals its own; otherwise the save fails
    /// with `OptimisticLockConflict` and the record is left unchanged.
    pub async fn save(&mut self) -> Result<u64> {
        self.persist(None).await
    }

    /// Saves only if `predicate` holds on the stored item, in addition to the
    /// version check.
    ///
    /// The predicate is checked against the schema, then against the last
    /// synced snapshot (failing early without a store call), then by the
    /// store atomically with the write.
    pub async fn save_if(&mut self, predicate: Condition) -> Result<u64> {
        self.ensure_live()?;
        let predicate = self
            .binding
            .coordinator()
            .build_predicate_condition(self.binding.schema(), predicate)?;

        if !predicate.evaluate(self.snapshot.as_ref()) {
            debug!(table = %self.binding.table(), %predicate, "Predicate does not hold on snapshot");
            return Err(self.precondition_failed());
        }
        self.persist(Some(predicate)).await
    }

    /// Saves only if `check` accepts a freshly fetched copy of the item.
    ///
    /// The check runs client-side, so it can express anything; the write
    /// that follows is still version-checked, so a concurrent change between
    /// the fetch and the write surfaces as `OptimisticLockConflict`.
    pub async fn save_when<F>(&mut self, check: F) -> Result<u64>
    where
        F: FnOnce(&Item) -> bool,
    {
        self.ensure_live()?;
        let RecordState::Persisted { version } = self.state else {
            return Err(self.precondition_failed());
        };
        let key = self.key()?;

        let current = self
            .binding
            .get_by_key(&key)
            .await?
            .ok_or_else(|| DynaError::NotFound {
                key: key.to_string(),
            })?;
        if current.version != Some(version) {
            return Err(DynaError::OptimisticLockConflict {
                key: key.to_string(),
                expected: version,
                actual: current.version,
            });
        }
        if !check(&current.values) {
            return Err(DynaError::PreconditionFailed {
                key: key.to_string(),
            });
        }
        self.persist(None).await
    }

    /// Deletes the stored item if its version still equals the record's.
    pub async fn delete(&mut self) -> Result<()> {
        self.ensure_live()?;
        let key = self.key_display();
        let RecordState::Persisted { version } = self.state else {
            return Err(DynaError::NotFound { key });
        };

        self.binding.delete_versioned(&self.key()?, version).await?;
        self.state = RecordState::Deleted;
        Ok(())
    }

    /// Replaces the record's values with the stored item, discarding local
    /// changes.
    pub async fn refresh(&mut self) -> Result<()> {
        self.ensure_live()?;
        let key = self.key()?;
        let stored = self
            .binding
            .get_by_key(&key)
            .await?
            .ok_or_else(|| DynaError::NotFound {
                key: key.to_string(),
            })?;

        *self = Self::from_stored(&self.binding, stored);
        Ok(())
    }

    /// Returns a lock handle on this record's item.
    pub fn lock(&self, attribute: &str) -> Result<Lock> {
        Lock::new(&self.binding, self.key()?, attribute)
    }

    /// JSON view of the record's values.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.values).unwrap_or_default()
    }

    fn ensure_live(&self) -> Result<()> {
        match self.state {
            RecordState::Deleted => Err(DynaError::StaleRecord),
            _ => Ok(()),
        }
    }

    fn key_display(&self) -> String {
        self.key()
            .map(|key| key.to_string())
            .unwrap_or_else(|_| "<unkeyed>".to_string())
    }

    fn precondition_failed(&self) -> DynaError {
        DynaError::PreconditionFailed {
            key: self.key_display(),
        }
    }

    async fn persist(&mut self, predicate: Option<Condition>) -> Result<u64> {
        self.ensure_live()?;
        let validated = self.binding.schema().validate(&self.values)?;

        let receipt: WriteReceipt = match (self.state, &self.snapshot) {
            (RecordState::Persisted { version }, Some(snapshot)) => {
                self.check_immutability(snapshot, &validated)?;
                let removed: Vec<String> = snapshot
                    .keys()
                    .filter(|name| !validated.contains_key(*name))
                    .cloned()
                    .collect();
                let key = self.binding.key_of(snapshot)?;
                self.binding
                    .put_versioned(&key, &validated, &removed, version, predicate)
                    .await?
            }
            _ => self.binding.put_if_absent(&validated).await?,
        };

        self.values = validated.clone();
        self.snapshot = Some(validated);
        self.state = RecordState::Persisted {
            version: receipt.version,
        };
        self.last_update = receipt.last_update.or(self.last_update);
        Ok(receipt.version)
    }

    fn check_immutability(&self, snapshot: &Item, validated: &Item) -> Result<()> {
        let schema = self.binding.schema();
        for definition in schema.attributes() {
            let name = definition.name();
            if self.binding.is_key_attribute(name) && snapshot.get(name) != validated.get(name) {
                return Err(SchemaError::ImmutableViolation(name.to_string()).into());
            }
            definition.check_immutability(snapshot.get(name), validated.get(name))?;
        }
        Ok(())
    }
}
