//! Bounded sandbox for `function` and `script` nodes.
//!
//! Scripts run in an embedded [`rhai`] engine with hard limits on operation
//! count, call depth and value sizes, and no access to modules, the
//! filesystem or process state. The data document is bound to the `data`
//! variable; mutations are visible after evaluation. A script may `return`
//! a map (replacement document) or an array (positional per-edge documents,
//! unit entries dropping their edge); returning nothing propagates the
//! mutated input.

use rhai::{Dynamic, Engine, Scope};
use serde_json::Value;

use crate::error::{Result, WorkflowError};
use crate::model::Document;

const MAX_OPERATIONS: u64 = 500_000;
const MAX_CALL_LEVELS: usize = 32;
const MAX_STRING_SIZE: usize = 1 << 20;
const MAX_COLLECTION_SIZE: usize = 16 * 1024;

/// Value returned by a script, normalized for edge fan-out.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptReturn {
    /// No explicit return value.
    None,
    /// A replacement data document, broadcast to every edge.
    Doc(Document),
    /// Positional per-edge documents; `None` drops the edge.
    List(Vec<Option<Value>>),
    /// Any other value.
    Value(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScriptOutcome {
    /// The data document after evaluation, including in-place mutations.
    pub data: Document,
    pub returned: ScriptReturn,
}

fn sandbox_engine() -> Engine {
    let mut engine = Engine::new();
    engine.set_max_operations(MAX_OPERATIONS);
    engine.set_max_call_levels(MAX_CALL_LEVELS);
    engine.set_max_string_size(MAX_STRING_SIZE);
    engine.set_max_array_size(MAX_COLLECTION_SIZE);
    engine.set_max_map_size(MAX_COLLECTION_SIZE);
    engine.set_max_expr_depths(64, 64);
    engine
}

/// Evaluate `source` with `data` bound in scope.
pub fn evaluate(data: &Document, source: &str) -> Result<ScriptOutcome> {
    let engine = sandbox_engine();

    let dynamic = rhai::serde::to_dynamic(Value::Object(data.clone()))
        .map_err(|e| WorkflowError::script(format!("cannot bind data: {e}")))?;
    let map = dynamic
        .try_cast::<rhai::Map>()
        .ok_or_else(|| WorkflowError::script("data document is not an object"))?;

    let mut scope = Scope::new();
    scope.push("data", map);

    let result = engine
        .eval_with_scope::<Dynamic>(&mut scope, source)
        .map_err(|e| WorkflowError::script(e.to_string()))?;

    let data = match scope.get_value::<rhai::Map>("data") {
        Some(map) => dynamic_to_document(Dynamic::from(map))?,
        None => data.clone(),
    };

    let returned = normalize_return(result)?;
    Ok(ScriptOutcome { data, returned })
}

fn normalize_return(result: Dynamic) -> Result<ScriptReturn> {
    if result.is_unit() {
        return Ok(ScriptReturn::None);
    }
    if result.is_array() {
        let items = result
            .into_array()
            .map_err(|t| WorkflowError::script(format!("unexpected return type {t}")))?;
        let mut values = Vec::with_capacity(items.len());
        for item in items {
            if item.is_unit() {
                values.push(None);
            } else {
                values.push(Some(dynamic_to_value(item)?));
            }
        }
        return Ok(ScriptReturn::List(values));
    }
    if result.is_map() {
        return Ok(ScriptReturn::Doc(dynamic_to_document(result)?));
    }
    Ok(ScriptReturn::Value(dynamic_to_value(result)?))
}

fn dynamic_to_value(dynamic: Dynamic) -> Result<Value> {
    rhai::serde::from_dynamic(&dynamic)
        .map_err(|e| WorkflowError::script(format!("cannot convert script value: {e}")))
}

fn dynamic_to_document(dynamic: Dynamic) -> Result<Document> {
    match dynamic_to_value(dynamic)? {
        Value::Object(map) => Ok(map),
        other => Err(WorkflowError::script(format!(
            "expected an object, got {other}"
        ))),
    }
}
