//! `transform` node handler: ordered path mutations on a copy of the data.

use async_trait::async_trait;

use mcp_workflow_core::error::{Result, WorkflowError};
use mcp_workflow_core::model::{Document, Node, TransformKind, TransformNode};
use mcp_workflow_core::{expr, paths};

use super::{HandlerContext, HandlerOutput, NodeHandler};

pub struct TransformHandler;

fn as_transform(node: &Node) -> Result<&TransformNode> {
    match node {
        Node::Transform(transform) => Ok(transform),
        other => Err(WorkflowError::node(format!(
            "transform handler dispatched on '{}' node '{}'",
            other.node_type(),
            other.id()
        ))),
    }
}

#[async_trait]
impl NodeHandler for TransformHandler {
    async fn call(&self, data: Document, ctx: &mut HandlerContext<'_>) -> Result<HandlerOutput> {
        let node = as_transform(ctx.node)?;

        let mut doc = data;
        for transform in &node.transforms {
            match transform.transform_type {
                TransformKind::Move => {
                    let target = transform.target.as_deref().ok_or_else(|| {
                        WorkflowError::node("transform 'move' requires a target")
                    })?;
                    if let Some(value) = paths::take(&mut doc, &transform.source) {
                        let value = paths::cast(value, transform.datatype.as_deref())?;
                        paths::set(&mut doc, target, value);
                    }
                }
                TransformKind::Set => {
                    let target = transform.target.as_deref().ok_or_else(|| {
                        WorkflowError::node("transform 'set' requires a target")
                    })?;
                    let value = expr::evaluate(&transform.source, &doc)?;
                    let value = paths::cast(value, transform.datatype.as_deref())?;
                    paths::set(&mut doc, target, value);
                }
                TransformKind::Delete => {
                    paths::delete(&mut doc, &transform.source);
                }
            }
        }
        Ok(HandlerOutput::Data(doc))
    }
}
