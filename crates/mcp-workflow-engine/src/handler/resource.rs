//! `resource` node handler: read an MCP resource into the data document.

use async_trait::async_trait;
use serde_json::Value;

use mcp_workflow_client::protocol::ResourceContents;
use mcp_workflow_core::error::{Result, WorkflowError};
use mcp_workflow_core::model::{Document, Node, ResourceNode};

use super::{place_output, HandlerContext, HandlerOutput, NodeHandler};

pub struct ResourceHandler;

fn as_resource(node: &Node) -> Result<&ResourceNode> {
    match node {
        Node::Resource(resource) => Ok(resource),
        other => Err(WorkflowError::node(format!(
            "resource handler dispatched on '{}' node '{}'",
            other.node_type(),
            other.id()
        ))),
    }
}

#[async_trait]
impl NodeHandler for ResourceHandler {
    async fn call(&self, mut data: Document, ctx: &mut HandlerContext<'_>) -> Result<HandlerOutput> {
        let node = as_resource(ctx.node)?;
        let session = ctx.sessions.get_session(&node.server_id).await?;

        let result = session.read_resource(&node.uri).await?;
        let output = match result.contents.first() {
            Some(ResourceContents::Text {
                mime_type, text, ..
            }) => {
                if mime_type.as_deref() == Some("application/json") {
                    Some(serde_json::from_str(text)?)
                } else {
                    Some(Value::String(text.clone()))
                }
            }
            Some(ResourceContents::Blob { uri, .. }) => {
                tracing::warn!(uri = %uri, "ignoring blob resource contents");
                None
            }
            None => {
                tracing::warn!(uri = %node.uri, "resource returned no contents");
                None
            }
        };

        if let Some(output) = output {
            place_output(&mut data, output, node.member.as_deref(), &node.uri);
        }
        Ok(HandlerOutput::Data(data))
    }
}
