//! Update patches
//!
//! Shallow field-wise assignment, plus a top-level `$push` mapping that
//! appends to (or creates) array fields:
//!
//! ```ignore
//! { "title": "New", "$push": { "tags": "rust", "links": { "$each": [1, 2] } } }
//! ```

use serde_json::{Map, Value};

use super::errors::{StoreError, StoreResult};
use super::matcher::json_type_name;

/// Checks a patch's shape without applying it
pub fn validate_patch(patch: &Value) -> StoreResult<()> {
    let fields = patch.as_object().ok_or_else(|| {
        StoreError::InvalidPatch(format!("patch must be a mapping, got {}", json_type_name(patch)))
    })?;

    for (key, value) in fields {
        match key.as_str() {
            "$push" => {
                if !value.is_object() {
                    return Err(StoreError::InvalidPatch("$push expects a mapping".into()));
                }
            }
            op if op.starts_with('$') => {
                return Err(StoreError::InvalidPatch(format!("unsupported update operator {}", op)))
            }
            _ => {}
        }
    }
    Ok(())
}

/// Applies `patch` to `record` in place
pub fn apply_patch(record: &mut Map<String, Value>, patch: &Value) -> StoreResult<()> {
    validate_patch(patch)?;
    let Some(fields) = patch.as_object() else {
        return Ok(());
    };

    for (key, value) in fields {
        if key == "$push" {
            if let Some(pushes) = value.as_object() {
                for (field, item) in pushes {
                    push_into(record, field, item)?;
                }
            }
        } else {
            record.insert(key.clone(), value.clone());
        }
    }
    Ok(())
}

fn push_into(record: &mut Map<String, Value>, field: &str, item: &Value) -> StoreResult<()> {
    let items: Vec<Value> = match item.get("$each") {
        Some(Value::Array(each)) => each.clone(),
        Some(_) => return Err(StoreError::InvalidPatch("$each expects an array".into())),
        None => vec![item.clone()],
    };

    let slot = record
        .entry(field.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    if slot.is_null() {
        *slot = Value::Array(Vec::new());
    }

    match slot {
        Value::Array(existing) => {
            existing.extend(items);
            Ok(())
        }
        other => Err(StoreError::InvalidPatch(format!(
            "cannot $push into field '{}' of type {}",
            field,
            json_type_name(other)
        ))),
    }
}
