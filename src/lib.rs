//! docmodel - Composable virtual documents over record stores
//!
//! A model declares named sources, queries that populate them in
//! dependency order from one input, a descriptor that projects the raw
//! records into a single document, and plans that write the document
//! back. Models are themselves sources, so documents compose.

pub mod config;
pub mod document;
pub mod errors;
pub mod model;
pub mod observability;
pub mod query;
pub mod schema;
pub mod source;
pub mod store;

pub use config::{EngineConfig, StoreConfig};
pub use document::{Document, Patch, RemovalReport};
pub use errors::{ModelError, ModelResult};
pub use model::{
    FieldDescriptor, InitializerPlan, Model, ModelBuilder, MutationPlan, PlanStep, QueryOutput,
    RemovePlan,
};
pub use query::{CycleError, Operation, Population, Query, QueryResult, RawData, DEFAULT_QUERY};
pub use schema::{Primitive, Rule, TypeDescriptor, ValidationReport, Validator};
pub use source::{ModelSource, Source, SourceOp, SourceOpKind, StoreSource};
pub use store::{MemoryStore, Selector, Store, StoreError};
