//! Raw data accumulator
//!
//! One mapping per query execution: `input` plus one entry per fetched
//! source. Selectors, data maps and mutation plans all read from it.

use serde::Serialize;
use serde_json::{Map, Value};

/// Key reserved for the query input
pub const INPUT_KEY: &str = "input";

static NULL: Value = Value::Null;

/// Per-source records collected by a query, plus its input
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RawData(Map<String, Value>);

impl RawData {
    pub fn new(input: Value) -> Self {
        let mut map = Map::new();
        map.insert(INPUT_KEY.to_string(), input);
        Self(map)
    }

    /// Wrap an existing mapping. Non-mappings are rejected.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn input(&self) -> &Value {
        self.0.get(INPUT_KEY).unwrap_or(&NULL)
    }

    pub fn set_input(&mut self, input: Value) {
        self.0.insert(INPUT_KEY.to_string(), input);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Value stored for a source, null when nothing was stored
    pub fn source(&self, name: &str) -> &Value {
        self.get(name).unwrap_or(&NULL)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.0.insert(name.into(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Dotted-path lookup, with numeric segments indexing arrays
    /// (`"post.tags.0"`)
    pub fn path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.0.get(segments.next()?)?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Like [`path`](Self::path) but null when absent
    pub fn at(&self, path: &str) -> Value {
        self.path(path).cloned().unwrap_or(Value::Null)
    }

    /// Names of fetched sources, excluding the input
    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str).filter(|k| *k != INPUT_KEY)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

impl From<RawData> for Value {
    fn from(raw: RawData) -> Self {
        Value::Object(raw.0)
    }
}
