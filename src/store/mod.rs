//! Record stores
//!
//! A store maps collection names to ordered sequences of JSON records.
//! The engine only relies on the CRUD contract of [`Store`]; the
//! in-memory implementation here is what tests and fixtures use.

mod errors;
mod matcher;
mod memory;
mod selector;
mod update;

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

pub use errors::{StoreError, StoreResult};
pub use matcher::{QueryMatcher, WherePredicates};
pub use memory::MemoryStore;
pub use selector::{Predicate, Selector};
pub use update::{apply_patch, validate_patch};

pub(crate) use matcher::values_equal;

/// Boxed future returned by store operations
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = StoreResult<T>> + Send + 'a>>;

/// CRUD contract every store provides
pub trait Store: Send + Sync {
    /// Insert one record (mapping) or a sequence of records, assigning the
    /// key field when absent. Returns what was inserted, same shape.
    fn create<'a>(&'a self, collection: &'a str, data: Value) -> StoreFuture<'a, Value>;

    /// All records matching `selector`, in collection order
    fn read<'a>(&'a self, collection: &'a str, selector: &'a Selector) -> StoreFuture<'a, Vec<Value>>;

    /// Patch every matching record; returns the updated records
    fn update<'a>(
        &'a self,
        collection: &'a str,
        selector: &'a Selector,
        patch: &'a Value,
    ) -> StoreFuture<'a, Vec<Value>>;

    /// Remove every matching record; returns the removed records
    fn delete<'a>(&'a self, collection: &'a str, selector: &'a Selector) -> StoreFuture<'a, Vec<Value>>;
}
