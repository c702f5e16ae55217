//! `function` and `script` node handlers.
//!
//! Both evaluate a body in the bounded sandbox with `data` in scope. The
//! return value decides fan-out: a map replaces the document and is
//! broadcast; an array pairs element *i* with edge *i* (unit entries and
//! excess elements are dropped); no return value propagates the possibly
//! mutated input document. A node without edges produces no results.

use async_trait::async_trait;
use serde_json::Value;

use mcp_workflow_core::error::{Result, WorkflowError};
use mcp_workflow_core::model::{Document, Node, Slug};
use mcp_workflow_core::sandbox::{self, ScriptReturn};
use mcp_workflow_core::trace::EdgeResult;

use super::{HandlerContext, HandlerOutput, NodeHandler};

pub struct FunctionHandler;

pub struct ScriptHandler;

#[async_trait]
impl NodeHandler for FunctionHandler {
    async fn call(&self, data: Document, ctx: &mut HandlerContext<'_>) -> Result<HandlerOutput> {
        let node = ctx.node;
        let Node::Function(function) = node else {
            return Err(WorkflowError::node(format!(
                "function handler dispatched on '{}' node '{}'",
                node.node_type(),
                node.id()
            )));
        };
        evaluate_body(data, &function.function, &function.edges)
    }
}

#[async_trait]
impl NodeHandler for ScriptHandler {
    async fn call(&self, data: Document, ctx: &mut HandlerContext<'_>) -> Result<HandlerOutput> {
        let node = ctx.node;
        let Node::Script(script) = node else {
            return Err(WorkflowError::node(format!(
                "script handler dispatched on '{}' node '{}'",
                node.node_type(),
                node.id()
            )));
        };
        evaluate_body(data, &script.script, &script.edges)
    }
}

fn evaluate_body(data: Document, source: &str, edges: &[Option<Slug>]) -> Result<HandlerOutput> {
    if edges.is_empty() {
        return Ok(HandlerOutput::Results(Vec::new()));
    }

    let outcome = sandbox::evaluate(&data, source)?;
    let results = match outcome.returned {
        ScriptReturn::Doc(doc) => broadcast(doc, edges),
        ScriptReturn::None => broadcast(outcome.data, edges),
        ScriptReturn::List(items) => {
            let mut results = Vec::new();
            for (index, edge) in edges.iter().enumerate() {
                let Some(edge) = edge else { continue };
                let Some(Some(value)) = items.get(index) else {
                    continue;
                };
                results.push(EdgeResult {
                    edge: Some(edge.to_string()),
                    data: as_document(value.clone())?,
                });
            }
            results
        }
        ScriptReturn::Value(other) => {
            return Err(WorkflowError::script(format!(
                "script must return an object or a list of objects, got {other}"
            )))
        }
    };
    Ok(HandlerOutput::Results(results))
}

fn broadcast(doc: Document, edges: &[Option<Slug>]) -> Vec<EdgeResult> {
    edges
        .iter()
        .flatten()
        .map(|edge| EdgeResult {
            edge: Some(edge.to_string()),
            data: doc.clone(),
        })
        .collect()
}

fn as_document(value: Value) -> Result<Document> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(WorkflowError::script(format!(
            "per-edge script results must be objects, got {other}"
        ))),
    }
}
