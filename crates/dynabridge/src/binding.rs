//! Table binding: the narrow, typed surface records and locks use to reach
//! the store.
//!
//! A binding owns the schema of one table, the names of its key and reserved
//! attributes, and the store handle. Every mutating call it makes is exactly
//! one conditional store request; transient store failures are retried with
//! bounded exponential backoff before escalating.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::stream::{BoxStream, StreamExt};
use tracing::{debug, warn};

use dynabridge_core::{
    expiry_attribute, version_value, AttributeType, Clock, Condition, ConditionalWriteCoordinator,
    DynaError, Item, ItemKey, ItemStore, Result, RetryPolicy, Schema, SchemaError, StoreError,
    StoreResult, SystemClock, UpdateSpec, Value, WriteOutcome,
};

use crate::config::Config;

/// Default name of the reserved version attribute.
pub const DEFAULT_VERSION_ATTRIBUTE: &str = "lockVersion";

/// Name of the attribute stamped with the time of the last save.
pub const LAST_UPDATE_ATTRIBUTE: &str = "last_update";

/// An item as read through a binding, with reserved attributes split out.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredItem {
    /// Declared attributes, decoded to their declared types.
    pub values: Item,
    /// `None` for items written without a version (outside this library).
    pub version: Option<u64>,
    pub last_update: Option<DateTime<Utc>>,
}

/// What a successful versioned write stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteReceipt {
    pub version: u64,
    pub last_update: Option<DateTime<Utc>>,
}

/// Binds a schema to a table in a store.
pub struct TableBinding {
    table: String,
    partition_key: String,
    sort_key: Option<String>,
    schema: Schema,
    coordinator: ConditionalWriteCoordinator,
    last_update_attribute: Option<String>,
    lock_attributes: Vec<String>,
    store: Arc<dyn ItemStore>,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for TableBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableBinding")
            .field("table", &self.table)
            .field("partition_key", &self.partition_key)
            .field("sort_key", &self.sort_key)
            .field("version_attribute", &self.coordinator.version_attribute())
            .field("last_update_attribute", &self.last_update_attribute)
            .field("lock_attributes", &self.lock_attributes)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

/// Builder for [`TableBinding`].
///
/// ```rust,ignore
/// let binding = TableBinding::builder("Users", schema, "UserId")
///     .lock_attribute("jobLock")
///     .build(Arc::new(InMemoryStore::new()))?;
/// ```
#[derive(Debug)]
pub struct TableBindingBuilder {
    table: String,
    schema: Schema,
    partition_key: String,
    sort_key: Option<String>,
    version_attribute: String,
    track_last_update: bool,
    lock_attributes: Vec<String>,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl TableBindingBuilder {
    pub fn sort_key(mut self, name: impl Into<String>) -> Self {
        self.sort_key = Some(name.into());
        self
    }

    pub fn version_attribute(mut self, name: impl Into<String>) -> Self {
        self.version_attribute = name.into();
        self
    }

    /// Enables or disables the `last_update` timestamp on saves.
    pub fn track_last_update(mut self, enabled: bool) -> Self {
        self.track_last_update = enabled;
        self
    }

    /// Registers a lock owner attribute. Its expiry companion is reserved too.
    pub fn lock_attribute(mut self, name: impl Into<String>) -> Self {
        self.lock_attributes.push(name.into());
        self
    }

    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Applies the version attribute, last-update tracking and retry policy
    /// from configuration.
    pub fn with_config(self, config: &Config) -> Self {
        self.version_attribute(config.version_attribute.clone())
            .track_last_update(config.track_last_update)
            .retry_policy(config.retry_policy())
    }

    /// Checks the key and reserved attributes and builds the binding.
    pub fn build(self, store: Arc<dyn ItemStore>) -> std::result::Result<TableBinding, SchemaError> {
        check_key(&self.schema, &self.partition_key)?;
        if let Some(sort_key) = &self.sort_key {
            if *sort_key == self.partition_key {
                return Err(SchemaError::InvalidKey {
                    name: sort_key.clone(),
                    reason: "sort key must differ from the partition key".to_string(),
                });
            }
            check_key(&self.schema, sort_key)?;
        }

        let last_update_attribute = self
            .track_last_update
            .then(|| LAST_UPDATE_ATTRIBUTE.to_string());

        let mut reserved: Vec<String> = vec![self.version_attribute.clone()];
        reserved.extend(last_update_attribute.iter().cloned());
        for lock in &self.lock_attributes {
            reserved.push(lock.clone());
            reserved.push(expiry_attribute(lock));
        }
        for (i, name) in reserved.iter().enumerate() {
            if self.schema.contains(name) || reserved[..i].contains(name) {
                return Err(SchemaError::ReservedAttribute(name.clone()));
            }
        }

        Ok(TableBinding {
            table: self.table,
            partition_key: self.partition_key,
            sort_key: self.sort_key,
            schema: self.schema,
            coordinator: ConditionalWriteCoordinator::new(self.version_attribute),
            last_update_attribute,
            lock_attributes: self.lock_attributes,
            store,
            retry: self.retry,
            clock: self.clock,
        })
    }
}

fn check_key(schema: &Schema, name: &str) -> std::result::Result<(), SchemaError> {
    let invalid = |reason: &str| SchemaError::InvalidKey {
        name: name.to_string(),
        reason: reason.to_string(),
    };
    let definition = schema
        .attribute(name)
        .ok_or_else(|| invalid("not declared in the schema"))?;
    if !definition.is_required() {
        return Err(invalid("key attributes must be required"));
    }
    if definition.attribute_type() == AttributeType::Bool {
        return Err(invalid("key attributes cannot be bool"));
    }
    Ok(())
}

impl TableBinding {
    /// Starts building a binding of `schema` to `table`, keyed by the
    /// `partition_key` attribute.
    pub fn builder(
        table: impl Into<String>,
        schema: Schema,
        partition_key: impl Into<String>,
    ) -> TableBindingBuilder {
        TableBindingBuilder {
            table: table.into(),
            schema,
            partition_key: partition_key.into(),
            sort_key: None,
            version_attribute: DEFAULT_VERSION_ATTRIBUTE.to_string(),
            track_last_update: true,
            lock_attributes: Vec::new(),
            retry: RetryPolicy::default(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn partition_key(&self) -> &str {
        &self.partition_key
    }

    pub fn sort_key(&self) -> Option<&str> {
        self.sort_key.as_deref()
    }

    pub fn version_attribute(&self) -> &str {
        self.coordinator.version_attribute()
    }

    pub fn coordinator(&self) -> &ConditionalWriteCoordinator {
        &self.coordinator
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn is_lock_attribute(&self, name: &str) -> bool {
        self.lock_attributes.iter().any(|lock| lock == name)
    }

    /// Returns true when `name` is a key attribute.
    pub fn is_key_attribute(&self, name: &str) -> bool {
        self.partition_key == name || self.sort_key.as_deref() == Some(name)
    }

    /// Builds a key from a partition value, for tables without a sort key.
    pub fn key(&self, partition: impl Into<Value>) -> ItemKey {
        ItemKey::new(&self.partition_key, partition)
    }

    /// Builds a key from partition and sort values.
    pub fn key_with_sort(
        &self,
        partition: impl Into<Value>,
        sort: impl Into<Value>,
    ) -> Result<ItemKey> {
        let sort_key = self.sort_key.as_ref().ok_or_else(|| SchemaError::InvalidKey {
            name: self.table.clone(),
            reason: "table has no sort key".to_string(),
        })?;
        Ok(self.key(partition).with_sort(sort_key, sort))
    }

    /// Extracts the key of an item.
    pub fn key_of(&self, values: &Item) -> Result<ItemKey> {
        ItemKey::from_item(values, &self.partition_key, self.sort_key.as_deref()).ok_or_else(|| {
            let missing = if values.contains_key(&self.partition_key) {
                self.sort_key.clone().unwrap_or_default()
            } else {
                self.partition_key.clone()
            };
            SchemaError::RequiredMissing(missing).into()
        })
    }

    fn stamp(&self) -> Option<(String, DateTime<Utc>)> {
        self.last_update_attribute
            .as_ref()
            .map(|name| (name.clone(), self.clock.now()))
    }

    /// Writes a new item at version 0, failing with `DuplicateKey` when an
    /// item with the same key already exists.
    pub async fn put_if_absent(&self, values: &Item) -> Result<WriteReceipt> {
        let key = self.key_of(values)?;
        let mut item = values.clone();
        item.insert(self.version_attribute().to_string(), version_value(0));
        let stamp = self.stamp();
        if let Some((name, now)) = &stamp {
            item.insert(name.clone(), Value::DateTime(*now));
        }
        let condition = Condition::not_exists(&self.partition_key);

        let outcome = self
            .call_store("PutItem", || {
                self.store
                    .put_item(&self.table, &key, item.clone(), Some(condition.clone()))
            })
            .await?;

        match outcome {
            WriteOutcome::Success(()) => {
                debug!(table = %self.table, %key, "Created item at version 0");
                Ok(WriteReceipt {
                    version: 0,
                    last_update: stamp.map(|(_, now)| now),
                })
            }
            _ => Err(DynaError::DuplicateKey {
                key: key.to_string(),
            }),
        }
    }

    /// Updates an item whose stored version must equal `expected`, bumping it
    /// by one. `predicate`, if any, must also hold on the stored item.
    ///
    /// Key attributes in `values` are never written.
    pub async fn put_versioned(
        &self,
        key: &ItemKey,
        values: &Item,
        removed: &[String],
        expected: u64,
        predicate: Option<Condition>,
    ) -> Result<WriteReceipt> {
        let next = expected + 1;
        let mut update = UpdateSpec::new();
        for (name, value) in values.iter().filter(|(name, _)| !key.contains(name)) {
            update.set.insert(name.clone(), value.clone());
        }
        update.remove.extend(removed.iter().cloned());
        update
            .set
            .insert(self.version_attribute().to_string(), version_value(next));
        let stamp = self.stamp();
        if let Some((name, now)) = &stamp {
            update.set.insert(name.clone(), Value::DateTime(*now));
        }

        let mut condition = self.coordinator.build_version_condition(Some(expected));
        if let Some(predicate) = predicate {
            condition = condition.and(predicate);
        }

        let outcome = self
            .call_store("UpdateItem", || {
                self.store
                    .update_item(&self.table, key, update.clone(), Some(condition.clone()))
            })
            .await?;

        match outcome {
            WriteOutcome::Success(_) => {
                debug!(table = %self.table, %key, version = next, "Saved item");
                Ok(WriteReceipt {
                    version: next,
                    last_update: stamp.map(|(_, now)| now),
                })
            }
            other => Err(self.write_failure(key, expected, other)),
        }
    }

    /// Reads an item by key.
    pub async fn get_by_key(&self, key: &ItemKey) -> Result<Option<StoredItem>> {
        let outcome = self
            .call_store("GetItem", || self.store.get_item(&self.table, key))
            .await?;
        match outcome {
            WriteOutcome::Success(Some(item)) => Ok(Some(self.decode(item)?)),
            _ => Ok(None),
        }
    }

    /// Deletes an item whose stored version must equal `expected`.
    pub async fn delete_versioned(&self, key: &ItemKey, expected: u64) -> Result<()> {
        let condition = self.coordinator.build_version_condition(Some(expected));

        let outcome = self
            .call_store("DeleteItem", || {
                self.store
                    .delete_item(&self.table, key, Some(condition.clone()))
            })
            .await?;

        match outcome {
            WriteOutcome::Success(()) => {
                debug!(table = %self.table, %key, version = expected, "Deleted item");
                Ok(())
            }
            other => Err(self.write_failure(key, expected, other)),
        }
    }

    /// Lazily scans for items whose `name` attribute equals `value`.
    ///
    /// The attribute must be declared and `value` must have its declared type.
    /// Scans are not retried: a transient failure ends the stream.
    pub fn scan_by_attribute(
        &self,
        name: &str,
        value: impl Into<Value>,
    ) -> Result<BoxStream<'_, Result<StoredItem>>> {
        let filter = self
            .coordinator
            .build_predicate_condition(&self.schema, Condition::eq(name, value))?;
        debug!(table = %self.table, %filter, "Scanning");
        Ok(self.scan(Some(filter)))
    }

    /// Lazily scans every item of the table.
    ///
    /// Like [`scan_by_attribute`](Self::scan_by_attribute), items are decoded
    /// to their declared types and the scan is not retried.
    pub fn scan_all(&self) -> BoxStream<'_, Result<StoredItem>> {
        debug!(table = %self.table, "Scanning all items");
        self.scan(None)
    }

    fn scan(&self, filter: Option<Condition>) -> BoxStream<'_, Result<StoredItem>> {
        self.store
            .scan(&self.table, filter)
            .map(move |item| match item {
                Ok(item) => self.decode(item),
                Err(err) => Err(escalate(err, 1)),
            })
            .boxed()
    }

    /// Applies a conditional update that leaves the version untouched.
    ///
    /// Used for lock bookkeeping; the caller interprets conditional failures.
    pub async fn update_unversioned(
        &self,
        key: &ItemKey,
        update: UpdateSpec,
        condition: Condition,
    ) -> Result<WriteOutcome<Item>> {
        self.call_store("UpdateItem", || {
            self.store
                .update_item(&self.table, key, update.clone(), Some(condition.clone()))
        })
        .await
    }

    /// Reads the raw stored item, reserved attributes included.
    pub async fn get_raw(&self, key: &ItemKey) -> Result<Option<Item>> {
        match self
            .call_store("GetItem", || self.store.get_item(&self.table, key))
            .await?
        {
            WriteOutcome::Success(item) => Ok(item),
            _ => Ok(None),
        }
    }

    fn write_failure<T>(&self, key: &ItemKey, expected: u64, outcome: WriteOutcome<T>) -> DynaError {
        match outcome {
            WriteOutcome::ConditionalCheckFailed { current } => {
                let actual = self.coordinator.version_of(&current);
                if actual == Some(expected) {
                    DynaError::PreconditionFailed {
                        key: key.to_string(),
                    }
                } else {
                    warn!(
                        table = %self.table,
                        %key,
                        expected,
                        actual = ?actual,
                        "Optimistic lock conflict"
                    );
                    DynaError::OptimisticLockConflict {
                        key: key.to_string(),
                        expected,
                        actual,
                    }
                }
            }
            _ => DynaError::NotFound {
                key: key.to_string(),
            },
        }
    }

    /// Splits reserved attributes out of a stored item and restores declared
    /// types (stores only keep strings, numbers and booleans).
    ///
    /// Undeclared attributes are kept as stored.
    pub fn decode(&self, mut item: Item) -> Result<StoredItem> {
        let version = self.coordinator.version_of(&item);
        item.remove(self.version_attribute());

        let last_update = self
            .last_update_attribute
            .as_ref()
            .and_then(|name| item.remove(name))
            .and_then(|value| AttributeType::DateTime.decode(value))
            .and_then(|value| match value {
                Value::DateTime(dt) => Some(dt),
                _ => None,
            });

        for lock in &self.lock_attributes {
            item.remove(lock);
            item.remove(&expiry_attribute(lock));
        }

        let values = item
            .into_iter()
            .map(|(name, value)| match self.schema.attribute(&name) {
                Some(definition) => {
                    let expected = definition.attribute_type();
                    let found = value.attribute_type();
                    match expected.decode(value) {
                        Some(value) => Ok((name, value)),
                        None => Err(DynaError::Schema(SchemaError::TypeMismatch {
                            name,
                            expected,
                            found,
                        })),
                    }
                }
                None => Ok((name, value)),
            })
            .collect::<Result<Item>>()?;

        Ok(StoredItem {
            values,
            version,
            last_update,
        })
    }

    /// Runs a store call, retrying transient failures per the retry policy.
    ///
    /// Fatal store errors are returned as `DynaError::Store`; every other
    /// outcome is returned for the caller to interpret.
    async fn call_store<T, F, Fut>(
        &self,
        operation: &'static str,
        mut call: F,
    ) -> Result<WriteOutcome<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.coordinator.classify(call().await) {
                WriteOutcome::TransientStoreError(message) => {
                    if !self.retry.should_retry(attempts) {
                        warn!(
                            table = %self.table,
                            operation,
                            attempts,
                            %message,
                            "Giving up after transient store failures"
                        );
                        return Err(DynaError::TransientStoreError { attempts, message });
                    }
                    let delay = self.retry.delay_for(attempts - 1);
                    warn!(
                        table = %self.table,
                        operation,
                        attempts,
                        delay_ms = delay.as_millis() as u64,
                        %message,
                        "Transient store failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                WriteOutcome::Fatal(err) => return Err(DynaError::Store(err)),
                outcome => return Ok(outcome),
            }
        }
    }
}

fn escalate(err: StoreError, attempts: u32) -> DynaError {
    match err {
        StoreError::Transient(message) => DynaError::TransientStoreError { attempts, message },
        err => DynaError::Store(err),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::time::Duration;

    use dynabridge_core::{item, AttributeDefinition};
    use futures_util::TryStreamExt;

    use crate::storage::InMemoryStore;

    pub(crate) fn user_schema() -> Schema {
        Schema::new()
            .add_attributes([
                AttributeDefinition::new("UserId", AttributeType::String).required(),
                AttributeDefinition::new("Name", AttributeType::String).required(),
                AttributeDefinition::new("Country", AttributeType::String)
                    .default_value("India"),
                AttributeDefinition::new("Status", AttributeType::String),
                AttributeDefinition::new("Age", AttributeType::Int),
            ])
            .unwrap()
    }

    pub(crate) fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2))
    }

    pub(crate) fn binding(store: &InMemoryStore) -> TableBinding {
        TableBinding::builder("Users", user_schema(), "UserId")
            .lock_attribute("jobLock")
            .retry_policy(fast_retry())
            .build(Arc::new(store.clone()))
            .unwrap()
    }

    #[test]
    fn test_build_rejects_undeclared_key() {
        let result = TableBinding::builder("Users", user_schema(), "Email")
            .build(Arc::new(InMemoryStore::new()));
        assert!(matches!(result, Err(SchemaError::InvalidKey { name, .. }) if name == "Email"));
    }

    #[test]
    fn test_build_rejects_optional_key() {
        let result = TableBinding::builder("Users", user_schema(), "Status")
            .build(Arc::new(InMemoryStore::new()));
        assert!(matches!(result, Err(SchemaError::InvalidKey { .. })));
    }

    #[test]
    fn test_build_rejects_bool_key() {
        let schema = Schema::new()
            .add_attributes([AttributeDefinition::new("Flag", AttributeType::Bool).required()])
            .unwrap();
        let result = TableBinding::builder("Flags", schema, "Flag")
            .build(Arc::new(InMemoryStore::new()));
        assert!(matches!(result, Err(SchemaError::InvalidKey { .. })));
    }

    #[test]
    fn test_build_rejects_reserved_collision() {
        let result = TableBinding::builder("Users", user_schema(), "UserId")
            .version_attribute("Status")
            .build(Arc::new(InMemoryStore::new()));
        assert_eq!(
            result.unwrap_err(),
            SchemaError::ReservedAttribute("Status".to_string())
        );

        let result = TableBinding::builder("Users", user_schema(), "UserId")
            .lock_attribute("jobLock")
            .lock_attribute("jobLock")
            .build(Arc::new(InMemoryStore::new()));
        assert_eq!(
            result.unwrap_err(),
            SchemaError::ReservedAttribute("jobLock".to_string())
        );
    }

    #[test]
    fn test_with_config() {
        let config = Config {
            version_attribute: "rev".to_string(),
            track_last_update: false,
            max_attempts: 2,
            retry_base_ms: 10,
            retry_max_ms: 20,
            endpoint_url: None,
            region: "us-east-1".to_string(),
        };

        let binding = TableBinding::builder("Users", user_schema(), "UserId")
            .with_config(&config)
            .build(Arc::new(InMemoryStore::new()))
            .unwrap();

        assert_eq!(binding.version_attribute(), "rev");
        assert!(binding.last_update_attribute.is_none());
        assert_eq!(binding.retry.max_attempts, 2);
    }

    #[tokio::test]
    async fn test_put_if_absent_and_get() {
        let store = InMemoryStore::new();
        let binding = binding(&store);
        let values = item! { "UserId" => "u1", "Name" => "John" };

        let receipt = binding.put_if_absent(&values).await.unwrap();
        assert_eq!(receipt.version, 0);
        assert!(receipt.last_update.is_some());

        let stored = binding
            .get_by_key(&binding.key("u1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.values, values);
        assert_eq!(stored.version, Some(0));
        assert_eq!(stored.last_update, receipt.last_update);
    }

    #[tokio::test]
    async fn test_put_if_absent_duplicate() {
        let store = InMemoryStore::new();
        let binding = binding(&store);
        let values = item! { "UserId" => "u1", "Name" => "John" };

        binding.put_if_absent(&values).await.unwrap();
        let result = binding.put_if_absent(&values).await;

        assert_eq!(
            result.unwrap_err(),
            DynaError::DuplicateKey {
                key: "UserId=u1".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_put_versioned_conflict_and_not_found() {
        let store = InMemoryStore::new();
        let binding = binding(&store);
        let key = binding.key("u1");
        binding
            .put_if_absent(&item! { "UserId" => "u1", "Name" => "John" })
            .await
            .unwrap();

        let receipt = binding
            .put_versioned(&key, &item! { "Name" => "Jane" }, &[], 0, None)
            .await
            .unwrap();
        assert_eq!(receipt.version, 1);

        let stale = binding
            .put_versioned(&key, &item! { "Name" => "Jim" }, &[], 0, None)
            .await;
        assert_eq!(
            stale.unwrap_err(),
            DynaError::OptimisticLockConflict {
                key: "UserId=u1".to_string(),
                expected: 0,
                actual: Some(1),
            }
        );

        let missing = binding
            .put_versioned(&binding.key("u2"), &item! { "Name" => "Jim" }, &[], 0, None)
            .await;
        assert_eq!(
            missing.unwrap_err(),
            DynaError::NotFound {
                key: "UserId=u2".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_put_versioned_predicate_failed() {
        let store = InMemoryStore::new();
        let binding = binding(&store);
        binding
            .put_if_absent(&item! { "UserId" => "u1", "Name" => "John", "Status" => "Inactive" })
            .await
            .unwrap();

        let result = binding
            .put_versioned(
                &binding.key("u1"),
                &item! { "Name" => "Jane" },
                &[],
                0,
                Some(Condition::eq("Status", "Active")),
            )
            .await;

        assert_eq!(
            result.unwrap_err(),
            DynaError::PreconditionFailed {
                key: "UserId=u1".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_delete_versioned() {
        let store = InMemoryStore::new();
        let binding = binding(&store);
        let key = binding.key("u1");
        binding
            .put_if_absent(&item! { "UserId" => "u1", "Name" => "John" })
            .await
            .unwrap();

        assert!(binding.delete_versioned(&key, 3).await.unwrap_err().is_conflict());
        binding.delete_versioned(&key, 0).await.unwrap();
        assert_eq!(
            binding.delete_versioned(&key, 0).await.unwrap_err(),
            DynaError::NotFound {
                key: "UserId=u1".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let store = InMemoryStore::new();
        let binding = binding(&store);
        store.inject_transient_failures(2);

        let receipt = binding
            .put_if_absent(&item! { "UserId" => "u1", "Name" => "John" })
            .await
            .unwrap();

        assert_eq!(receipt.version, 0);
        assert_eq!(store.request_count(), 3);
    }

    #[tokio::test]
    async fn test_transient_failures_escalate() {
        let store = InMemoryStore::new();
        let binding = binding(&store);
        store.inject_transient_failures(10);

        let result = binding.get_by_key(&binding.key("u1")).await;

        assert!(matches!(
            result,
            Err(DynaError::TransientStoreError { attempts: 3, .. })
        ));
        assert_eq!(store.request_count(), 3);
    }

    #[tokio::test]
    async fn test_scan_by_attribute() {
        let store = InMemoryStore::new();
        let binding = binding(&store);
        for (id, country) in [("u1", "India"), ("u2", "Peru"), ("u3", "India")] {
            binding
                .put_if_absent(&item! { "UserId" => id, "Name" => "N", "Country" => country })
                .await
                .unwrap();
        }

        let found: Vec<StoredItem> = binding
            .scan_by_attribute("Country", "India")
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|i| i.values["Country"] == Value::from("India")));
    }

    #[tokio::test]
    async fn test_scan_all_decodes_every_item() {
        let store = InMemoryStore::new();
        let binding = binding(&store);
        for (id, age) in [("u1", 30), ("u2", 41)] {
            binding
                .put_if_absent(&item! { "UserId" => id, "Name" => "N", "Age" => age })
                .await
                .unwrap();
        }

        let mut found: Vec<StoredItem> = binding.scan_all().try_collect().await.unwrap();
        found.sort_by_key(|i| i.values["UserId"].to_string());

        assert_eq!(found.len(), 2);
        assert_eq!(found[1].values["Age"], Value::Int(41));
        assert!(found.iter().all(|i| i.version == Some(0)));
        assert!(found
            .iter()
            .all(|i| !i.values.contains_key(binding.version_attribute())));
    }

    #[test]
    fn test_scan_by_attribute_checks_schema() {
        let store = InMemoryStore::new();
        let binding = binding(&store);

        assert!(matches!(
            binding.scan_by_attribute("Nickname", "JJ").err(),
            Some(DynaError::Schema(SchemaError::UnknownAttribute(_)))
        ));
        assert!(matches!(
            binding.scan_by_attribute("Age", "forty").err(),
            Some(DynaError::Schema(SchemaError::TypeMismatch { .. }))
        ));
    }

    #[test]
    fn test_decode_strips_reserved_attributes() {
        let store = InMemoryStore::new();
        let binding = binding(&store);

        let stored = binding
            .decode(item! {
                "UserId" => "u1",
                "Name" => "John",
                "lockVersion" => 4,
                "last_update" => "2024-01-15T10:30:00Z",
                "jobLock" => "worker-1",
                "jobLockExpiresAt" => 1_705_312_800_000_i64,
            })
            .unwrap();

        assert_eq!(stored.values, item! { "UserId" => "u1", "Name" => "John" });
        assert_eq!(stored.version, Some(4));
        assert!(stored.last_update.is_some());
    }

    #[test]
    fn test_decode_rejects_mistyped_attribute() {
        let store = InMemoryStore::new();
        let binding = binding(&store);

        let result = binding.decode(item! { "UserId" => "u1", "Age" => "old" });

        assert!(matches!(
            result,
            Err(DynaError::Schema(SchemaError::TypeMismatch { .. }))
        ));
    }
}
