use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::condition::Condition;
use crate::value::Item;

use super::{ItemKey, StoreResult, UpdateSpec};

/// Single-item access to a key-value store with conditional writes.
///
/// Every write evaluates its optional condition against the stored item
/// atomically with the write. When the condition does not hold, the write
/// fails with [`StoreError::ConditionalCheckFailed`](super::StoreError)
/// carrying the stored item, so callers can tell a missing item from a
/// conflicting one without a second read.
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Writes the whole item, replacing any stored item with the same key.
    async fn put_item(
        &self,
        table: &str,
        key: &ItemKey,
        item: Item,
        condition: Option<Condition>,
    ) -> StoreResult<()>;

    /// Reads an item by key.
    async fn get_item(&self, table: &str, key: &ItemKey) -> StoreResult<Option<Item>>;

    /// Sets and removes attributes of an item, creating it if absent.
    ///
    /// Returns the item as stored after the update.
    async fn update_item(
        &self,
        table: &str,
        key: &ItemKey,
        update: UpdateSpec,
        condition: Option<Condition>,
    ) -> StoreResult<Item>;

    /// Deletes an item by key. Deleting an absent item is not an error
    /// unless the condition requires it to exist.
    async fn delete_item(
        &self,
        table: &str,
        key: &ItemKey,
        condition: Option<Condition>,
    ) -> StoreResult<()>;

    /// Lazily scans a table, yielding the items matching `filter`.
    fn scan<'a>(
        &'a self,
        table: &'a str,
        filter: Option<Condition>,
    ) -> BoxStream<'a, StoreResult<Item>>;
}
