//! Models
//!
//! A model registers named sources, queries that populate them from a
//! single input, a descriptor projecting raw records into one logical
//! document, and the plans that write that document back:
//! - [`MutationPlan`]: named or per-field rewrites of source records
//! - [`InitializerPlan`]: how `create` builds new records
//! - [`RemovePlan`]: how `del` removes them (default: sweep bound sources)
//!
//! Every operation is async and suspends only at source boundaries.

mod builder;
mod description;
mod descriptor;
mod lifecycle;
#[allow(clippy::module_inception)]
mod model;
mod mutation;
mod plan;

pub use builder::ModelBuilder;
pub use description::{FieldDescription, ModelDescription, SourceDescription};
pub use descriptor::{DataFn, DefaultValue, FieldDescriptor};
pub use model::{Model, QueryOutput, SourceEntry};
pub use plan::{InitializerPlan, MutationPlan, OperationsFn, PlanStep, RemovePlan, ResultFn};
