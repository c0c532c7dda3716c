//! Reflective form of a model

use serde::Serialize;
use serde_json::Value;

use super::model::Model;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceDescription {
    pub name: String,
    pub kind: &'static str,
    pub required: bool,
    pub many: bool,
    pub bound: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDescription {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: &'static str,
    pub required: bool,
    pub modifiable: bool,
    pub has_default: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelDescription {
    pub name: String,
    pub sources: Vec<SourceDescription>,
    pub queries: Vec<String>,
    pub mutations: Vec<String>,
    pub fields: Vec<FieldDescription>,
    pub creatable: bool,
}

impl Model {
    pub fn description(&self) -> ModelDescription {
        let inner = &self.inner;
        ModelDescription {
            name: inner.name.clone(),
            sources: inner
                .sources
                .iter()
                .map(|s| SourceDescription {
                    name: s.name.clone(),
                    kind: s.source.kind(),
                    required: s.required,
                    many: s.many,
                    bound: s.bound,
                })
                .collect(),
            queries: inner.queries.keys().cloned().collect(),
            mutations: inner.mutations.iter().map(|m| m.name.clone()).collect(),
            fields: inner
                .fields
                .iter()
                .map(|(name, f)| FieldDescription {
                    name: name.clone(),
                    type_name: f.kind.type_name(),
                    required: f.required,
                    modifiable: f.is_modifiable(),
                    has_default: f.default.is_some(),
                    meta: f.meta.clone(),
                })
                .collect(),
            creatable: inner.initializer.is_some(),
        }
    }
}
