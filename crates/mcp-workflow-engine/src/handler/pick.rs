//! `pick` node handler: build a fresh document from expression results.

use async_trait::async_trait;

use mcp_workflow_core::error::{Result, WorkflowError};
use mcp_workflow_core::expr;
use mcp_workflow_core::model::{Document, Node, PickNode};

use super::{HandlerContext, HandlerOutput, NodeHandler};

pub struct PickHandler;

fn as_pick(node: &Node) -> Result<&PickNode> {
    match node {
        Node::Pick(pick) => Ok(pick),
        other => Err(WorkflowError::node(format!(
            "pick handler dispatched on '{}' node '{}'",
            other.node_type(),
            other.id()
        ))),
    }
}

#[async_trait]
impl NodeHandler for PickHandler {
    async fn call(&self, data: Document, ctx: &mut HandlerContext<'_>) -> Result<HandlerOutput> {
        let node = as_pick(ctx.node)?;

        let mut doc = Document::new();
        for (field, source) in &node.expressions {
            doc.insert(field.clone(), expr::evaluate(source, &data)?);
        }
        Ok(HandlerOutput::Data(doc))
    }
}
