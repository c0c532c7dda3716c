//! Selectors
//!
//! A selector identifies records. It is opaque to the query engine: the
//! engine only asks whether it is a single value or a sequence to fan
//! out over. Store-backed sources hand it to the store; model-backed
//! sources use it as the inner model's input.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

/// Record predicate
pub type Predicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Identifies records within a collection (or an input for a model source)
#[derive(Clone)]
pub enum Selector {
    /// Declarative query document, or a plain input value
    Query(Value),
    /// Arbitrary record predicate
    Predicate(Predicate),
    /// Ordered sequence; the engine fetches once per element
    Sequence(Vec<Selector>),
}

impl Selector {
    pub fn query(query: Value) -> Self {
        Selector::Query(query)
    }

    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Selector::Predicate(Arc::new(f))
    }

    /// Sequence selector from anything convertible
    pub fn many<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Selector>,
    {
        Selector::Sequence(items.into_iter().map(Into::into).collect())
    }

    /// Selector matching every record
    pub fn all() -> Self {
        Selector::Query(Value::Object(serde_json::Map::new()))
    }

    /// A JSON array counts as a sequence as well
    pub fn is_sequence(&self) -> bool {
        matches!(self, Selector::Sequence(_) | Selector::Query(Value::Array(_)))
    }

    /// Elements when this is a sequence
    pub fn to_sequence(&self) -> Option<Vec<Selector>> {
        match self {
            Selector::Sequence(items) => Some(items.clone()),
            Selector::Query(Value::Array(items)) => {
                Some(items.iter().cloned().map(Selector::Query).collect())
            }
            _ => None,
        }
    }

    pub fn as_query(&self) -> Option<&Value> {
        match self {
            Selector::Query(value) => Some(value),
            _ => None,
        }
    }

    /// Reportable form; predicates render as the string `"<predicate>"`
    pub fn to_value(&self) -> Value {
        match self {
            Selector::Query(value) => value.clone(),
            Selector::Predicate(_) => Value::String("<predicate>".to_string()),
            Selector::Sequence(items) => Value::Array(items.iter().map(Selector::to_value).collect()),
        }
    }
}

impl From<Value> for Selector {
    fn from(value: Value) -> Self {
        Selector::Query(value)
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Query(value) => f.debug_tuple("Query").field(value).finish(),
            Selector::Predicate(_) => f.write_str("Predicate(..)"),
            Selector::Sequence(items) => f.debug_tuple("Sequence").field(items).finish(),
        }
    }
}
