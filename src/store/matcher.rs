//! Query document matching
//!
//! A MongoDB-subset matcher over JSON records. Supported:
//!
//! - equality (with array-contains semantics), `null` matching both
//!   null and missing
//! - `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`, `$in`, `$nin`
//! - `$and`, `$or`, `$nor`, `$not`
//! - `$exists`, `$type`, `$regex` (+ `$options`), `$size`, `$all`,
//!   `$elemMatch`, `$mod`
//! - `$where` naming a registered predicate
//! - dotted paths, including numeric indices into arrays
//!
//! No type coercion: `"1"` never equals `1`. Numbers compare by value,
//! so `1` equals `1.0`.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::DateTime;
use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value};

use super::errors::{StoreError, StoreResult};
use super::selector::{Predicate, Selector};

/// Named predicates reachable through `$where`
pub type WherePredicates = HashMap<String, Predicate>;

/// Evaluates selectors against records.
/// Regexes are compiled once per matcher, so one matcher serves a whole
/// read, update or delete.
pub struct QueryMatcher<'a> {
    wheres: &'a WherePredicates,
    regexes: RefCell<HashMap<(String, String), Regex>>,
}

impl<'a> QueryMatcher<'a> {
    pub fn new(wheres: &'a WherePredicates) -> Self {
        Self {
            wheres,
            regexes: RefCell::new(HashMap::new()),
        }
    }

    fn regex_any(&self, found: &[&Value], pattern: &str, options: &str) -> StoreResult<bool> {
        let key = (pattern.to_string(), options.to_string());
        if let Some(re) = self.regexes.borrow().get(&key) {
            return Ok(regex_any(found, re));
        }
        let re = compile_regex(pattern, options)?;
        let hit = regex_any(found, &re);
        self.regexes.borrow_mut().insert(key, re);
        Ok(hit)
    }

    #[cfg(test)]
    fn compiled_regexes(&self) -> usize {
        self.regexes.borrow().len()
    }

    /// Checks if a record matches a selector.
    /// A sequence selector matches when any element does.
    pub fn matches(&self, record: &Value, selector: &Selector) -> StoreResult<bool> {
        match selector {
            Selector::Predicate(predicate) => Ok(predicate(record)),
            Selector::Query(query) => self.matches_query(record, query),
            Selector::Sequence(items) => {
                for item in items {
                    if self.matches(record, item)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }

    /// Checks if a record matches a query document (AND over its clauses)
    pub fn matches_query(&self, record: &Value, query: &Value) -> StoreResult<bool> {
        let clauses = match query {
            Value::Object(map) => map,
            Value::Null => return Ok(true),
            Value::Array(items) => {
                for item in items {
                    if self.matches_query(record, item)? {
                        return Ok(true);
                    }
                }
                return Ok(false);
            }
            other => {
                return Err(StoreError::InvalidSelector(format!(
                    "query document must be a mapping, got {}",
                    json_type_name(other)
                )))
            }
        };

        for (key, condition) in clauses {
            let matched = match key.as_str() {
                "$and" => {
                    let mut all = true;
                    for sub in sub_queries(key, condition)? {
                        if !self.matches_query(record, sub)? {
                            all = false;
                            break;
                        }
                    }
                    all
                }
                "$or" => self.any_sub_query(record, key, condition)?,
                "$nor" => !self.any_sub_query(record, key, condition)?,
                "$where" => self.eval_where(record, condition)?,
                "$comment" => true,
                op if op.starts_with('$') => {
                    return Err(StoreError::InvalidSelector(format!(
                        "unknown top-level operator {}",
                        op
                    )))
                }
                path => self.matches_path(record, path, condition)?,
            };
            if !matched {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn any_sub_query(&self, record: &Value, key: &str, condition: &Value) -> StoreResult<bool> {
        for sub in sub_queries(key, condition)? {
            if self.matches_query(record, sub)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn eval_where(&self, record: &Value, condition: &Value) -> StoreResult<bool> {
        match condition {
            Value::Bool(b) => Ok(*b),
            Value::String(name) => {
                let predicate = self
                    .wheres
                    .get(name)
                    .ok_or_else(|| StoreError::UnknownWherePredicate(name.clone()))?;
                Ok(predicate(record))
            }
            other => Err(StoreError::InvalidSelector(format!(
                "$where expects a predicate name, got {}",
                json_type_name(other)
            ))),
        }
    }

    fn matches_path(&self, record: &Value, path: &str, condition: &Value) -> StoreResult<bool> {
        let segments: Vec<&str> = path.split('.').collect();
        let mut found = Vec::new();
        collect_path(record, &segments, &mut found);

        match condition {
            Value::Object(ops) if is_operator_document(ops) => self.eval_operators(ops, &found),
            expected => Ok(equals_any(&found, expected)),
        }
    }

    /// All operators in `ops` must hold
    fn eval_operators(&self, ops: &Map<String, Value>, found: &[&Value]) -> StoreResult<bool> {
        for (op, arg) in ops {
            if op == "$options" {
                continue;
            }
            if !self.eval_operator(op, arg, ops, found)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn eval_operator(
        &self,
        op: &str,
        arg: &Value,
        siblings: &Map<String, Value>,
        found: &[&Value],
    ) -> StoreResult<bool> {
        let result = match op {
            "$eq" => equals_any(found, arg),
            "$ne" => !equals_any(found, arg),
            "$gt" => compare_any(found, arg, |o| o == Ordering::Greater),
            "$gte" => compare_any(found, arg, |o| o != Ordering::Less),
            "$lt" => compare_any(found, arg, |o| o == Ordering::Less),
            "$lte" => compare_any(found, arg, |o| o != Ordering::Greater),
            "$in" => in_list(found, op, arg)?,
            "$nin" => !in_list(found, op, arg)?,
            "$exists" => is_truthy(arg) == !found.is_empty(),
            "$regex" => {
                let options = siblings.get("$options").and_then(Value::as_str).unwrap_or("");
                let pattern = arg.as_str().ok_or_else(|| {
                    StoreError::InvalidSelector("$regex expects a string pattern".into())
                })?;
                self.regex_any(found, pattern, options)?
            }
            "$not" => match arg {
                Value::String(pattern) => !self.regex_any(found, pattern, "")?,
                Value::Object(inner) if is_operator_document(inner) => {
                    !self.eval_operators(inner, found)?
                }
                _ => {
                    return Err(StoreError::InvalidSelector(
                        "$not expects an operator document or a regex".into(),
                    ))
                }
            },
            "$elemMatch" => {
                let inner = arg.as_object().ok_or_else(|| {
                    StoreError::InvalidSelector("$elemMatch expects a mapping".into())
                })?;
                let mut any = false;
                'outer: for value in found {
                    if let Value::Array(items) = value {
                        for item in items {
                            let ok = if is_operator_document(inner) {
                                self.eval_operators(inner, &[item])?
                            } else {
                                self.matches_query(item, arg)?
                            };
                            if ok {
                                any = true;
                                break 'outer;
                            }
                        }
                    }
                }
                any
            }
            "$size" => {
                let size = arg.as_u64().ok_or_else(|| {
                    StoreError::InvalidSelector("$size expects a non-negative integer".into())
                })?;
                found
                    .iter()
                    .any(|v| v.as_array().map(|a| a.len() as u64 == size).unwrap_or(false))
            }
            "$all" => {
                let wanted = arg.as_array().ok_or_else(|| {
                    StoreError::InvalidSelector("$all expects an array".into())
                })?;
                found.iter().any(|v| match v {
                    Value::Array(items) => wanted
                        .iter()
                        .all(|w| items.iter().any(|item| values_equal(item, w))),
                    single => wanted.len() == 1 && values_equal(single, &wanted[0]),
                })
            }
            "$mod" => {
                let (divisor, remainder) = mod_args(arg)?;
                expand(found).iter().any(|v| {
                    v.as_i64()
                        .or_else(|| v.as_f64().map(|f| f.trunc() as i64))
                        .and_then(|n| n.checked_rem(divisor))
                        .map(|r| r == remainder)
                        .unwrap_or(false)
                })
            }
            "$type" => {
                let wanted: Vec<&Value> = match arg {
                    Value::Array(items) => items.iter().collect(),
                    single => vec![single],
                };
                let mut any = false;
                for w in wanted {
                    for value in found {
                        if type_matches(value, w)?
                            || value
                                .as_array()
                                .map(|items| items.iter().any(|i| type_matches(i, w).unwrap_or(false)))
                                .unwrap_or(false)
                        {
                            any = true;
                        }
                    }
                }
                any
            }
            unknown => {
                return Err(StoreError::InvalidSelector(format!(
                    "unknown operator {}",
                    unknown
                )))
            }
        };
        Ok(result)
    }
}

fn sub_queries<'v>(key: &str, condition: &'v Value) -> StoreResult<&'v Vec<Value>> {
    condition
        .as_array()
        .ok_or_else(|| StoreError::InvalidSelector(format!("{} expects an array", key)))
}

fn is_operator_document(map: &Map<String, Value>) -> bool {
    !map.is_empty() && map.keys().all(|k| k.starts_with('$'))
}

/// Collects every value reachable through `segments`.
/// Arrays are traversed element-wise unless the segment is an index.
fn collect_path<'v>(value: &'v Value, segments: &[&str], out: &mut Vec<&'v Value>) {
    let Some((head, rest)) = segments.split_first() else {
        out.push(value);
        return;
    };

    match value {
        Value::Object(map) => {
            if let Some(child) = map.get(*head) {
                collect_path(child, rest, out);
            }
        }
        Value::Array(items) => {
            if let Ok(index) = head.parse::<usize>() {
                if let Some(child) = items.get(index) {
                    collect_path(child, rest, out);
                }
            } else {
                for item in items {
                    if item.is_object() {
                        collect_path(item, segments, out);
                    }
                }
            }
        }
        _ => {}
    }
}

/// Found values plus the elements of any array among them
fn expand<'v>(found: &[&'v Value]) -> Vec<&'v Value> {
    let mut out = Vec::with_capacity(found.len());
    for value in found {
        out.push(*value);
        if let Value::Array(items) = value {
            out.extend(items.iter());
        }
    }
    out
}

/// Equality without coercion; numbers compare by value
pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| values_equal(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).map(|w| values_equal(v, w)).unwrap_or(false))
        }
        _ => a == b,
    }
}

fn equals_any(found: &[&Value], expected: &Value) -> bool {
    if expected.is_null() {
        return found.is_empty() || found.iter().any(|v| v.is_null());
    }
    expand(found).iter().any(|v| values_equal(v, expected))
}

fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn compare_any(found: &[&Value], bound: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    expand(found)
        .iter()
        .any(|v| compare_values(v, bound).map(&accept).unwrap_or(false))
}

fn in_list(found: &[&Value], op: &str, arg: &Value) -> StoreResult<bool> {
    let candidates = arg
        .as_array()
        .ok_or_else(|| StoreError::InvalidSelector(format!("{} expects an array", op)))?;
    Ok(candidates.iter().any(|c| equals_any(found, c)))
}

fn compile_regex(pattern: &str, options: &str) -> StoreResult<Regex> {
    let mut builder = RegexBuilder::new(pattern);
    for flag in options.chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            'm' => builder.multi_line(true),
            's' => builder.dot_matches_new_line(true),
            'x' => builder.ignore_whitespace(true),
            other => {
                return Err(StoreError::InvalidSelector(format!(
                    "unsupported $options flag '{}'",
                    other
                )))
            }
        };
    }
    builder.build().map_err(|e| StoreError::InvalidRegex {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

fn regex_any(found: &[&Value], re: &Regex) -> bool {
    expand(found)
        .iter()
        .any(|v| v.as_str().map(|s| re.is_match(s)).unwrap_or(false))
}

fn mod_args(arg: &Value) -> StoreResult<(i64, i64)> {
    let invalid = || StoreError::InvalidSelector("$mod expects [divisor, remainder]".into());
    let items = arg.as_array().ok_or_else(invalid)?;
    if items.len() != 2 {
        return Err(invalid());
    }
    let divisor = items[0].as_i64().ok_or_else(invalid)?;
    let remainder = items[1].as_i64().ok_or_else(invalid)?;
    if divisor == 0 {
        return Err(StoreError::InvalidSelector("$mod divisor must not be zero".into()));
    }
    Ok((divisor, remainder))
}

fn type_matches(value: &Value, wanted: &Value) -> StoreResult<bool> {
    let name = match wanted {
        Value::String(name) => name.as_str(),
        Value::Number(code) => match code.as_u64() {
            Some(1) | Some(19) => "number",
            Some(2) => "string",
            Some(3) => "object",
            Some(4) => "array",
            Some(8) => "bool",
            Some(9) => "date",
            Some(10) => "null",
            Some(16) | Some(18) => "int",
            _ => {
                return Err(StoreError::InvalidSelector(format!(
                    "unsupported $type code {}",
                    code
                )))
            }
        },
        other => {
            return Err(StoreError::InvalidSelector(format!(
                "$type expects a name or code, got {}",
                json_type_name(other)
            )))
        }
    };

    let ok = match name {
        "number" | "double" | "decimal" => value.is_number(),
        "int" | "long" => value.is_i64() || value.is_u64(),
        "string" => value.is_string(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "bool" | "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        "date" => value
            .as_str()
            .map(|s| DateTime::parse_from_rfc3339(s).is_ok())
            .unwrap_or(false),
        other => {
            return Err(StoreError::InvalidSelector(format!(
                "unsupported $type '{}'",
                other
            )))
        }
    };
    Ok(ok)
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        _ => true,
    }
}

/// Returns the JSON type name for error messages
pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
