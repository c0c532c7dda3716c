//! Query engine
//!
//! A [`Query`] is an ordered dependency graph of [`Population`]s. Each
//! population fills one source using a selector resolved from the raw
//! data fetched so far. Selectors are opaque here: the engine only
//! distinguishes a single selector from a sequence to fan out over.

mod engine;
mod order;
mod population;
mod raw;

pub use engine::{
    DocumentMapping, InputConstructor, Query, QueryResult, SourceBinding, SourceLookup,
};
pub use order::{topological_order, CycleError};
pub use population::{Operation, Population, SelectorFn};
pub use raw::{RawData, INPUT_KEY};

pub(crate) use engine::fetch;

/// Name of the query every model must declare
pub const DEFAULT_QUERY: &str = "default";
