//! Populations: how one source is fetched from previously fetched data

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::store::Selector;

use super::raw::RawData;

/// What a population asks of its source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    /// First matching record, or null
    Read,
    /// Every matching record
    ReadMany,
    Update,
    Create,
    Remove,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Read => "read",
            Operation::ReadMany => "readMany",
            Operation::Update => "update",
            Operation::Create => "create",
            Operation::Remove => "remove",
        }
    }

    pub fn is_read(&self) -> bool {
        matches!(self, Operation::Read | Operation::ReadMany)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolves a selector from the raw data accumulated so far.
/// `None` means "nothing to fetch"; the source is stored as null.
pub type SelectorFn = Arc<dyn Fn(&RawData) -> Option<Selector> + Send + Sync>;

/// One entry of a query
#[derive(Clone)]
pub struct Population {
    /// Source this population fills
    pub name: String,
    pub operation: Operation,
    /// Sources that must be fetched first
    pub require: Vec<String>,
    selector: SelectorFn,
}

impl Population {
    pub fn new<F>(name: impl Into<String>, operation: Operation, selector: F) -> Self
    where
        F: Fn(&RawData) -> Option<Selector> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            operation,
            require: Vec::new(),
            selector: Arc::new(selector),
        }
    }

    pub fn read<F>(name: impl Into<String>, selector: F) -> Self
    where
        F: Fn(&RawData) -> Option<Selector> + Send + Sync + 'static,
    {
        Self::new(name, Operation::Read, selector)
    }

    pub fn read_many<F>(name: impl Into<String>, selector: F) -> Self
    where
        F: Fn(&RawData) -> Option<Selector> + Send + Sync + 'static,
    {
        Self::new(name, Operation::ReadMany, selector)
    }

    /// Declare dependencies on other populations of the same query
    pub fn require<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.require.extend(sources.into_iter().map(Into::into));
        self
    }

    pub fn resolve(&self, raw: &RawData) -> Option<Selector> {
        (self.selector)(raw)
    }
}

impl fmt::Debug for Population {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Population")
            .field("name", &self.name)
            .field("operation", &self.operation)
            .field("require", &self.require)
            .finish_non_exhaustive()
    }
}
