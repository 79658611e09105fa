//! In-memory storage backend.
//!
//! This module provides an in-memory implementation of `ItemStore` that keeps
//! every table in a `HashMap` wrapped in `Arc<RwLock<_>>`. Conditions are
//! evaluated under the write lock, so conditional writes are atomic exactly as
//! they are on DynamoDB. Data is lost when the store is dropped.
//!
//! # Example
//!
//! ```rust,ignore
//! use dynabridge::storage::inmemory::InMemoryStore;
//!
//! let store = InMemoryStore::new();
//! // Bind tables to the store...
//! ```

mod store;

pub use store::InMemoryStore;
