//! Source adapters
//!
//! A source is anything that can `fetch` records for a selector and
//! apply a sequence of write operations. Store collections and whole
//! models satisfy the same contract, which is what lets one model be
//! used as a source of another.

mod model_source;
mod store_source;

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use crate::errors::ModelResult;
use crate::query::Operation;
use crate::store::Selector;

pub use model_source::ModelSource;
pub use store_source::StoreSource;

/// Boxed future returned by source operations
pub type SourceFuture<'a, T> = Pin<Box<dyn Future<Output = ModelResult<T>> + Send + 'a>>;

/// Fetch/mutate capability shared by store-backed and model-backed sources
pub trait Source: Send + Sync {
    /// `Read` yields one record (or null); `ReadMany` a sequence
    fn fetch<'a>(&'a self, operation: Operation, selector: &'a Selector) -> SourceFuture<'a, Value>;

    /// Apply `operations` in order; results are aligned with them
    fn mutate<'a>(&'a self, operations: Vec<SourceOp>) -> SourceFuture<'a, Vec<Value>>;

    /// Short label for reflection ("store", "model")
    fn kind(&self) -> &'static str;
}

/// Write operation kinds, in dispatch order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SourceOpKind {
    Create,
    Update,
    Remove,
}

impl SourceOpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceOpKind::Create => "create",
            SourceOpKind::Update => "update",
            SourceOpKind::Remove => "remove",
        }
    }
}

impl fmt::Display for SourceOpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One write against a source. A missing selector on an update or
/// remove is filled in from the model's default query.
#[derive(Debug, Clone)]
pub struct SourceOp {
    pub kind: SourceOpKind,
    pub selector: Option<Selector>,
    pub data: Option<Value>,
}

impl SourceOp {
    pub fn create(data: Value) -> Self {
        Self {
            kind: SourceOpKind::Create,
            selector: None,
            data: Some(data),
        }
    }

    /// Update whatever the default query selects for this source
    pub fn update(data: Value) -> Self {
        Self {
            kind: SourceOpKind::Update,
            selector: None,
            data: Some(data),
        }
    }

    /// Remove whatever the default query selects for this source
    pub fn remove() -> Self {
        Self {
            kind: SourceOpKind::Remove,
            selector: None,
            data: None,
        }
    }

    pub fn with_selector(mut self, selector: impl Into<Selector>) -> Self {
        self.selector = Some(selector.into());
        self
    }
}
