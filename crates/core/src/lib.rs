//! Functional core of dynabridge: schemas, conditions and the rules for
//! versioned and lock-guarded conditional writes. Performs no I/O.

pub mod attribute;
pub mod clock;
pub mod condition;
pub mod coordinator;
pub mod error;
pub mod lock;
pub mod retry;
pub mod schema;
pub mod store;
pub mod value;

pub use attribute::{AttributeDefinition, AttributeInfo, DefaultValue, Validator};
pub use clock::{Clock, ManualClock, SystemClock};
pub use condition::Condition;
pub use coordinator::{version_value, ConditionalWriteCoordinator, WriteOutcome};
pub use error::{DynaError, Recovery, Result, SchemaError};
pub use lock::{expiry_attribute, LockLease, LockToken};
pub use retry::RetryPolicy;
pub use schema::{Schema, SchemaInfo};
pub use store::{ItemKey, ItemStore, StoreError, StoreResult, UpdateSpec};
pub use value::{AttributeType, Item, Value};
