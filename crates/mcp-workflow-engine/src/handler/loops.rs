//! `loop` node handler: fan a list out across edges.
//!
//! The expression must evaluate to a list. Iteration is edge-major,
//! item-minor; each item is injected at `member` (default `__each__`). When
//! rules are present they pair positionally with edges: rule *i* filters the
//! items sent down edge *i*, and an edge without a rule receives every item.

use async_trait::async_trait;
use serde_json::Value;

use mcp_workflow_core::error::{Result, WorkflowError};
use mcp_workflow_core::expr;
use mcp_workflow_core::model::{Document, LoopNode, Node};
use mcp_workflow_core::trace::EdgeResult;

use super::{HandlerContext, HandlerOutput, NodeHandler};

const DEFAULT_MEMBER: &str = "__each__";

pub struct LoopHandler;

fn as_loop(node: &Node) -> Result<&LoopNode> {
    match node {
        Node::Loop(l) => Ok(l),
        other => Err(WorkflowError::node(format!(
            "loop handler dispatched on '{}' node '{}'",
            other.node_type(),
            other.id()
        ))),
    }
}

#[async_trait]
impl NodeHandler for LoopHandler {
    async fn call(&self, data: Document, ctx: &mut HandlerContext<'_>) -> Result<HandlerOutput> {
        let node = as_loop(ctx.node)?;

        let value = expr::evaluate(&node.expr, &data)?;
        let Value::Array(items) = value else {
            return Err(WorkflowError::node(format!(
                "loop expression '{}' did not evaluate to a list",
                node.expr
            )));
        };

        let member = node.member.as_deref().unwrap_or(DEFAULT_MEMBER);
        let mut results = Vec::new();
        for (index, edge) in node.edges.iter().enumerate() {
            let Some(edge) = edge else { continue };
            let rule = node.rules.get(index);
            for item in &items {
                if let Some(rule) = rule {
                    if !rule.test(item) {
                        continue;
                    }
                }
                let mut data = data.clone();
                data.insert(member.to_owned(), item.clone());
                results.push(EdgeResult {
                    edge: Some(edge.to_string()),
                    data,
                });
            }
        }
        Ok(HandlerOutput::Results(results))
    }
}
