use std::fmt;

use crate::value::{Item, Value};

/// The primary key of an item: a partition attribute and an optional sort
/// attribute, each as a `(name, value)` pair.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemKey {
    pub partition: (String, Value),
    pub sort: Option<(String, Value)>,
}

impl ItemKey {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            partition: (name.into(), value.into()),
            sort: None,
        }
    }

    pub fn with_sort(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.sort = Some((name.into(), value.into()));
        self
    }

    /// Extracts the key attributes from `item`.
    ///
    /// Returns `None` when a key attribute is absent.
    pub fn from_item(item: &Item, partition: &str, sort: Option<&str>) -> Option<Self> {
        let key = Self::new(partition, item.get(partition)?.clone());
        match sort {
            Some(sort) => Some(key.with_sort(sort, item.get(sort)?.clone())),
            None => Some(key),
        }
    }

    /// Returns the key attributes as an item.
    pub fn to_item(&self) -> Item {
        let mut item = Item::new();
        item.insert(self.partition.0.clone(), self.partition.1.clone());
        if let Some((name, value)) = &self.sort {
            item.insert(name.clone(), value.clone());
        }
        item
    }

    /// Returns true when `name` is one of the key attributes.
    pub fn contains(&self, name: &str) -> bool {
        self.partition.0 == name || self.sort.as_ref().is_some_and(|(sort, _)| sort == name)
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.partition.0, self.partition.1)?;
        if let Some((name, value)) = &self.sort {
            write!(f, ", {name}={value}")?;
        }
        Ok(())
    }
}

/// Attribute changes applied by a single update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateSpec {
    /// Attributes to set (insert or overwrite).
    pub set: Item,
    /// Attributes to remove.
    pub remove: Vec<String>,
}

impl UpdateSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set.insert(name.into(), value.into());
        self
    }

    pub fn remove(mut self, name: impl Into<String>) -> Self {
        self.remove.push(name.into());
        self
    }

    /// Applies the changes to an existing item in place.
    pub fn apply(&self, item: &mut Item) {
        for name in &self.remove {
            item.remove(name);
        }
        for (name, value) in &self.set {
            item.insert(name.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item;

    #[test]
    fn test_key_display() {
        let key = ItemKey::new("UserId", "u1");
        assert_eq!(key.to_string(), "UserId=u1");

        let key = ItemKey::new("Pk", "order").with_sort("Sk", 7);
        assert_eq!(key.to_string(), "Pk=order, Sk=7");
    }

    #[test]
    fn test_key_from_item() {
        let item = item! { "UserId" => "u1", "Name" => "John" };

        let key = ItemKey::from_item(&item, "UserId", None).unwrap();
        assert_eq!(key, ItemKey::new("UserId", "u1"));
        assert!(ItemKey::from_item(&item, "UserId", Some("Sk")).is_none());
        assert!(ItemKey::from_item(&item, "Missing", None).is_none());
    }

    #[test]
    fn test_key_to_item_and_contains() {
        let key = ItemKey::new("Pk", "a").with_sort("Sk", "b");
        assert_eq!(key.to_item(), item! { "Pk" => "a", "Sk" => "b" });
        assert!(key.contains("Sk"));
        assert!(!key.contains("Name"));
    }

    #[test]
    fn test_update_spec_apply() {
        let mut stored = item! { "Name" => "John", "jobLock" => "token" };
        let update = UpdateSpec::new().set("Name", "Jane").remove("jobLock");

        update.apply(&mut stored);

        assert_eq!(stored, item! { "Name" => "Jane" });
    }
}
