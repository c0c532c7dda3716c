//! # Model Errors
//!
//! Every failure the engine can surface. Structural errors describe a
//! mis-assembled model and are bugs in the caller; the rest are
//! ordinary outcomes the caller is expected to handle.

use thiserror::Error;

use crate::query::CycleError;
use crate::schema::{SchemaError, ValidationReport};
use crate::store::StoreError;

/// Result type for model operations
pub type ModelResult<T> = Result<T, ModelError>;

/// Model, query and document errors
#[derive(Debug, Error)]
pub enum ModelError {
    // ==================
    // Structural
    // ==================
    /// A population, plan or call names a source the model never declared
    #[error("Unknown source: {0}")]
    UnknownSource(String),

    /// Named mutation does not exist
    #[error("Unknown mutation: {0}")]
    UnknownMutation(String),

    /// Named query does not exist
    #[error("Unknown query: {0}")]
    UnknownQuery(String),

    /// `create` on a model without an initializer
    #[error("Model '{0}' has no initializer")]
    NoInitializer(String),

    /// Document mapping of a multi-document query returned a non-sequence
    #[error("Document mapping of query '{0}' did not return a sequence")]
    NotASequence(String),

    /// Any other mis-assembly detected at build or run time
    #[error("Structural error: {0}")]
    Structural(String),

    /// Query populations depend on each other in a loop
    #[error(transparent)]
    Cycle(#[from] CycleError),

    /// A descriptor failed to compile
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    // ==================
    // Returned
    // ==================
    /// Candidate data failed the mutation or initializer schema
    #[error("Invalid: {0}")]
    Validation(ValidationReport),

    /// Named mutation targets a field declared non-modifiable
    #[error("Field '{0}' is not modifiable")]
    ImmutableField(String),

    /// Document was removed; it accepts no further operations
    #[error("Document has been removed")]
    RemovedDocument,

    /// Store failure, passed through untouched
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ModelError {
    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            ModelError::UnknownSource(_) => "MODEL_UNKNOWN_SOURCE",
            ModelError::UnknownMutation(_) => "MODEL_UNKNOWN_MUTATION",
            ModelError::UnknownQuery(_) => "MODEL_UNKNOWN_QUERY",
            ModelError::NoInitializer(_) => "MODEL_NO_INITIALIZER",
            ModelError::NotASequence(_) => "MODEL_NOT_A_SEQUENCE",
            ModelError::Structural(_) => "MODEL_STRUCTURAL",
            ModelError::Cycle(_) => "MODEL_CYCLE",
            ModelError::Schema(_) => "MODEL_SCHEMA",
            ModelError::Config(_) => "MODEL_CONFIG",
            ModelError::Validation(_) => "MODEL_VALIDATION_FAILED",
            ModelError::ImmutableField(_) => "MODEL_IMMUTABLE_FIELD",
            ModelError::RemovedDocument => "MODEL_REMOVED_DOCUMENT",
            ModelError::Store(e) => e.code(),
        }
    }

    /// True for errors caused by how the model was assembled rather than
    /// by the data flowing through it
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            ModelError::UnknownSource(_)
                | ModelError::UnknownMutation(_)
                | ModelError::UnknownQuery(_)
                | ModelError::NoInitializer(_)
                | ModelError::NotASequence(_)
                | ModelError::Structural(_)
                | ModelError::Cycle(_)
                | ModelError::Schema(_)
                | ModelError::Config(_)
        )
    }

    /// Validator report, for validation failures
    pub fn report(&self) -> Option<&ValidationReport> {
        match self {
            ModelError::Validation(report) => Some(report),
            _ => None,
        }
    }
}
