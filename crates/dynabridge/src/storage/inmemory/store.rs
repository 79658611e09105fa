//! In-memory item store implementation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use tokio::sync::RwLock;

use dynabridge_core::{Condition, Item, ItemKey, ItemStore, StoreError, StoreResult, UpdateSpec};

type Table = HashMap<String, Item>;

/// In-memory storage backend for testing and local runs.
///
/// Tables are created on first write. Cloning the store shares the
/// underlying data.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<HashMap<String, Table>>>,
    pending_failures: Arc<AtomicUsize>,
    requests: Arc<AtomicUsize>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` requests fail with a transient error.
    pub fn inject_transient_failures(&self, count: usize) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    /// Number of requests received so far, including failed ones.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Returns every item of a table, in no particular order.
    pub async fn items(&self, table: &str) -> Vec<Item> {
        let tables = self.tables.read().await;
        tables
            .get(table)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }

    fn begin_request(&self) -> StoreResult<()> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let injected = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::Transient("injected failure".to_string()));
        }
        Ok(())
    }
}

/// Identity of an item within a table. The debug form keeps the value type,
/// so `Int(1)` and `String("1")` never collide.
fn storage_key(key: &ItemKey) -> String {
    format!("{:?}|{:?}", key.partition, key.sort)
}

fn check(condition: Option<&Condition>, current: Option<&Item>) -> StoreResult<()> {
    match condition {
        Some(condition) if !condition.evaluate(current) => {
            Err(StoreError::ConditionalCheckFailed {
                current: current.cloned(),
            })
        }
        _ => Ok(()),
    }
}

#[async_trait]
impl ItemStore for InMemoryStore {
    async fn put_item(
        &self,
        table: &str,
        key: &ItemKey,
        item: Item,
        condition: Option<Condition>,
    ) -> StoreResult<()> {
        self.begin_request()?;
        let mut tables = self.tables.write().await;
        let table = tables.entry(table.to_string()).or_default();
        let id = storage_key(key);

        check(condition.as_ref(), table.get(&id))?;

        let mut item = item;
        item.extend(key.to_item());
        table.insert(id, item);
        Ok(())
    }

    async fn get_item(&self, table: &str, key: &ItemKey) -> StoreResult<Option<Item>> {
        self.begin_request()?;
        let tables = self.tables.read().await;
        Ok(tables
            .get(table)
            .and_then(|t| t.get(&storage_key(key)))
            .cloned())
    }

    async fn update_item(
        &self,
        table: &str,
        key: &ItemKey,
        update: UpdateSpec,
        condition: Option<Condition>,
    ) -> StoreResult<Item> {
        self.begin_request()?;
        let mut tables = self.tables.write().await;
        let table = tables.entry(table.to_string()).or_default();
        let id = storage_key(key);

        check(condition.as_ref(), table.get(&id))?;

        let item = table.entry(id).or_insert_with(|| key.to_item());
        update.apply(item);
        Ok(item.clone())
    }

    async fn delete_item(
        &self,
        table: &str,
        key: &ItemKey,
        condition: Option<Condition>,
    ) -> StoreResult<()> {
        self.begin_request()?;
        let mut tables = self.tables.write().await;
        let Some(table) = tables.get_mut(table) else {
            return check(condition.as_ref(), None);
        };
        let id = storage_key(key);

        check(condition.as_ref(), table.get(&id))?;

        table.remove(&id);
        Ok(())
    }

    fn scan<'a>(
        &'a self,
        table: &'a str,
        filter: Option<Condition>,
    ) -> BoxStream<'a, StoreResult<Item>> {
        Box::pin(try_stream! {
            self.begin_request()?;
            let items = self.items(table).await;
            for item in items {
                if filter.as_ref().map_or(true, |f| f.evaluate(Some(&item))) {
                    yield item;
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dynabridge_core::item;
    use futures_util::TryStreamExt;

    fn key(id: &str) -> ItemKey {
        ItemKey::new("UserId", id)
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let store = InMemoryStore::new();

        store
            .put_item("Users", &key("u1"), item! { "Name" => "John" }, None)
            .await
            .unwrap();

        let item = store.get_item("Users", &key("u1")).await.unwrap();
        assert_eq!(item, Some(item! { "UserId" => "u1", "Name" => "John" }));
        assert_eq!(store.get_item("Users", &key("u2")).await.unwrap(), None);
        assert_eq!(store.get_item("Other", &key("u1")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_conditional_put_returns_current_item() {
        let store = InMemoryStore::new();
        let absent = Some(Condition::not_exists("UserId"));

        store
            .put_item("Users", &key("u1"), item! { "Name" => "John" }, absent.clone())
            .await
            .unwrap();
        let result = store
            .put_item("Users", &key("u1"), item! { "Name" => "Jane" }, absent)
            .await;

        assert_eq!(
            result,
            Err(StoreError::ConditionalCheckFailed {
                current: Some(item! { "UserId" => "u1", "Name" => "John" })
            })
        );
    }

    #[tokio::test]
    async fn test_key_types_do_not_collide() {
        let store = InMemoryStore::new();

        store
            .put_item("T", &ItemKey::new("Id", 1), item! {}, None)
            .await
            .unwrap();

        assert_eq!(store.get_item("T", &ItemKey::new("Id", "1")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_update_item() {
        let store = InMemoryStore::new();
        store
            .put_item("Users", &key("u1"), item! { "Name" => "John", "lockVersion" => 0 }, None)
            .await
            .unwrap();

        let updated = store
            .update_item(
                "Users",
                &key("u1"),
                UpdateSpec::new().set("Name", "Jane").set("lockVersion", 1),
                Some(Condition::eq("lockVersion", 0)),
            )
            .await
            .unwrap();
        assert_eq!(
            updated,
            item! { "UserId" => "u1", "Name" => "Jane", "lockVersion" => 1 }
        );

        let stale = store
            .update_item(
                "Users",
                &key("u1"),
                UpdateSpec::new().set("Name", "Jim"),
                Some(Condition::eq("lockVersion", 0)),
            )
            .await;
        assert!(matches!(
            stale,
            Err(StoreError::ConditionalCheckFailed { current: Some(_) })
        ));
    }

    #[tokio::test]
    async fn test_update_missing_item_with_condition() {
        let store = InMemoryStore::new();

        let result = store
            .update_item(
                "Users",
                &key("u1"),
                UpdateSpec::new().set("Name", "Jane"),
                Some(Condition::exists("UserId")),
            )
            .await;

        assert_eq!(result, Err(StoreError::ConditionalCheckFailed { current: None }));
        assert!(store.items("Users").await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_item() {
        let store = InMemoryStore::new();
        store
            .put_item("Users", &key("u1"), item! { "lockVersion" => 2 }, None)
            .await
            .unwrap();

        let stale = store
            .delete_item("Users", &key("u1"), Some(Condition::eq("lockVersion", 1)))
            .await;
        assert!(stale.is_err());

        store
            .delete_item("Users", &key("u1"), Some(Condition::eq("lockVersion", 2)))
            .await
            .unwrap();
        assert_eq!(store.get_item("Users", &key("u1")).await.unwrap(), None);

        let gone = store
            .delete_item("Users", &key("u1"), Some(Condition::exists("UserId")))
            .await;
        assert_eq!(gone, Err(StoreError::ConditionalCheckFailed { current: None }));
    }

    #[tokio::test]
    async fn test_scan_with_filter() {
        let store = InMemoryStore::new();
        for (id, country) in [("u1", "India"), ("u2", "Peru"), ("u3", "India")] {
            store
                .put_item("Users", &key(id), item! { "Country" => country }, None)
                .await
                .unwrap();
        }

        let mut indians: Vec<Item> = store
            .scan("Users", Some(Condition::eq("Country", "India")))
            .try_collect()
            .await
            .unwrap();
        indians.sort_by(|a, b| a["UserId"].to_string().cmp(&b["UserId"].to_string()));

        let ids: Vec<_> = indians.iter().map(|i| i["UserId"].to_string()).collect();
        assert_eq!(ids, vec!["u1", "u3"]);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = InMemoryStore::new();
        store.inject_transient_failures(2);

        assert!(matches!(
            store.get_item("Users", &key("u1")).await,
            Err(StoreError::Transient(_))
        ));
        assert!(store.get_item("Users", &key("u1")).await.is_err());
        assert!(store.get_item("Users", &key("u1")).await.is_ok());
        assert_eq!(store.request_count(), 3);
    }
}
