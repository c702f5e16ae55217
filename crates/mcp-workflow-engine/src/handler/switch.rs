//! `switch` node handler: select outgoing edges by rule matches.
//!
//! Edges and rules are walked in parallel: edge *i* is taken when rule *i*
//! matches the evaluated value. An edge list one longer than the rule list
//! has a trailing default edge that is always taken.

use async_trait::async_trait;
use serde_json::Value;

use mcp_workflow_core::error::{Result, WorkflowError};
use mcp_workflow_core::expr;
use mcp_workflow_core::model::{Document, Node, SwitchNode};
use mcp_workflow_core::trace::EdgeResult;

use super::{HandlerContext, HandlerOutput, NodeHandler};

pub struct SwitchHandler;

fn as_switch(node: &Node) -> Result<&SwitchNode> {
    match node {
        Node::Switch(switch) => Ok(switch),
        other => Err(WorkflowError::node(format!(
            "switch handler dispatched on '{}' node '{}'",
            other.node_type(),
            other.id()
        ))),
    }
}

#[async_trait]
impl NodeHandler for SwitchHandler {
    async fn call(&self, data: Document, ctx: &mut HandlerContext<'_>) -> Result<HandlerOutput> {
        let node = as_switch(ctx.node)?;

        let value = match &node.expr {
            Some(source) => expr::evaluate(source, &data)?,
            None => Value::Object(data.clone()),
        };

        let mut results = Vec::new();
        for (index, edge) in node.edges.iter().enumerate() {
            let selected = match node.rules.get(index) {
                Some(rule) => rule.test(&value),
                // Trailing default edge
                None => node.edges.len() == node.rules.len() + 1,
            };
            if !selected {
                continue;
            }
            if let Some(edge) = edge {
                results.push(EdgeResult {
                    edge: Some(edge.to_string()),
                    data: data.clone(),
                });
            }
        }
        Ok(HandlerOutput::Results(results))
    }
}
