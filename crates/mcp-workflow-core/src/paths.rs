//! Dotted-path operations on the data document.
//!
//! Used by transform nodes (`move`/`set`/`delete`) and output placement.
//! `set` creates intermediate objects as needed; `delete` and `take` treat a
//! missing path as a no-op.

use serde_json::{Map, Value};

use crate::error::{Result, WorkflowError};
use crate::model::Document;

/// Read the value at `path`, if present.
pub fn get<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = doc.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Write `value` at `path`, creating (or replacing) intermediate objects.
pub fn set(doc: &mut Document, path: &str, value: Value) {
    let mut segments: Vec<&str> = path.split('.').collect();
    let last = match segments.pop() {
        Some(last) => last,
        None => return,
    };
    let mut current = doc;
    for segment in segments {
        let slot = current
            .entry(segment.to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        current = slot.as_object_mut().expect("slot was just made an object");
    }
    current.insert(last.to_owned(), value);
}

/// Remove and return the value at `path`. Missing paths are a no-op.
pub fn take(doc: &mut Document, path: &str) -> Option<Value> {
    let mut segments: Vec<&str> = path.split('.').collect();
    let last = segments.pop()?;
    let mut current = doc;
    for segment in segments {
        current = current.get_mut(segment)?.as_object_mut()?;
    }
    current.remove(last)
}

/// Remove the value at `path`. Missing paths are a no-op.
pub fn delete(doc: &mut Document, path: &str) {
    let _ = take(doc, path);
}

/// Cast `value` per a transform's `datatype`: `string`, `number`, `integer`
/// or `boolean`. No datatype leaves the value unchanged.
pub fn cast(value: Value, datatype: Option<&str>) -> Result<Value> {
    let Some(datatype) = datatype else {
        return Ok(value);
    };
    match datatype {
        "string" => Ok(Value::String(match value {
            Value::String(s) => s,
            other => other.to_string(),
        })),
        "number" => to_number(&value, false),
        "integer" => to_number(&value, true),
        "boolean" => Ok(Value::Bool(crate::model::rules::is_truthy(&value))),
        other => Err(WorkflowError::node(format!(
            "unknown transform datatype: {other:?}"
        ))),
    }
}

fn to_number(value: &Value, integer: bool) -> Result<Value> {
    let parsed: f64 = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Value::String(s) => s.trim().parse().map_err(|_| {
            WorkflowError::node(format!("cannot cast {s:?} to a number"))
        })?,
        other => {
            return Err(WorkflowError::node(format!(
                "cannot cast {other} to a number"
            )))
        }
    };
    if integer {
        Ok(Value::from(parsed as i64))
    } else if parsed.fract() == 0.0 {
        Ok(Value::from(parsed as i64))
    } else {
        Ok(Value::from(parsed))
    }
}
