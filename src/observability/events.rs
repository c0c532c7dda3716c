//! Observable engine events
//!
//! Events are explicit and typed; the string form is what lands in the
//! `event` field of a log line.

use std::fmt;

use super::logger::Severity;

/// Observable events in the query/mutation engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Query execution
    /// Query execution begins
    QueryStart,
    /// Query execution finished and the document was materialized
    QueryComplete,
    /// A required source came back empty
    QueryShortCircuit,
    /// One population fetched (or fanned out)
    PopulationFetch,

    // Mutation pipeline
    /// A grouped write is about to be sent to a source
    MutationDispatch,
    /// Patch failed validation or targeted an immutable field
    MutationRejected,
    /// Writes done and the document re-materialized
    MutationComplete,

    // Lifecycle
    /// Initializer ran and the document was materialized
    CreateComplete,
    /// Bound sources or the remove plan were swept
    RemoveComplete,

    // Store
    /// The store applied a write
    StoreWrite,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::QueryStart => "QUERY_START",
            Event::QueryComplete => "QUERY_COMPLETE",
            Event::QueryShortCircuit => "QUERY_SHORT_CIRCUIT",
            Event::PopulationFetch => "POPULATION_FETCH",
            Event::MutationDispatch => "MUTATION_DISPATCH",
            Event::MutationRejected => "MUTATION_REJECTED",
            Event::MutationComplete => "MUTATION_COMPLETE",
            Event::CreateComplete => "CREATE_COMPLETE",
            Event::RemoveComplete => "REMOVE_COMPLETE",
            Event::StoreWrite => "STORE_WRITE",
        }
    }

    /// Default severity this event is logged at
    pub fn severity(&self) -> Severity {
        match self {
            Event::PopulationFetch | Event::MutationDispatch | Event::StoreWrite => {
                Severity::Trace
            }
            Event::QueryShortCircuit | Event::MutationRejected => Severity::Warn,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
