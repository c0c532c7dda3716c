//! Type descriptors and validation
//!
//! Model authors describe fields with [`TypeDescriptor`]s; the validator
//! compiles them into [`Schema`]s and checks candidate values, returning
//! a [`ValidationReport`] listing every failure with its reason and path.
//!
//! # Design Principles
//!
//! - Explicit primitive tags, never host-language type objects
//! - No coercion: `"1"` is not a number
//! - User predicates plug in through [`CustomRule`]

mod errors;
mod types;
mod validator;

pub use errors::{Reason, SchemaError, SchemaResult, ValidationIssue, ValidationReport};
pub use types::{CheckFn, CustomRule, Format, Primitive, Rule, TypeDescriptor};
pub use validator::{Constraints, Schema, SchemaKind, Validator};
