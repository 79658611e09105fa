//! Schema-validated, optimistically locked access to DynamoDB tables.
//!
//! The imperative shell over `dynabridge_core`: table bindings, version-tracked
//! records, item locks, configuration and store backends.

pub mod binding;
pub mod config;
pub mod lock;
pub mod record;
pub mod storage;

pub use binding::{StoredItem, TableBinding, TableBindingBuilder, WriteReceipt};
pub use config::Config;
pub use lock::{Guarded, Lock};
pub use record::{Record, RecordState};

pub use dynabridge_core::{
    item, AttributeDefinition, AttributeType, Clock, Condition, DefaultValue, DynaError, Item,
    ItemKey, ItemStore, LockLease, LockToken, ManualClock, Recovery, Result, RetryPolicy, Schema,
    SchemaError, StoreError, SystemClock, Value,
};
