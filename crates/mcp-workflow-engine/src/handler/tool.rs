//! `tool` node handler: invoke an MCP tool with the data document as input.

use async_trait::async_trait;
use serde_json::Value;

use mcp_workflow_core::error::{Result, WorkflowError};
use mcp_workflow_core::model::{Document, Node, ToolNode};
use mcp_workflow_core::schema;

use super::{place_output, HandlerContext, HandlerOutput, NodeHandler};
use mcp_workflow_client::protocol::Content;

pub struct ToolHandler;

fn as_tool(node: &Node) -> Result<&ToolNode> {
    match node {
        Node::Tool(tool) => Ok(tool),
        other => Err(WorkflowError::node(format!(
            "tool handler dispatched on '{}' node '{}'",
            other.node_type(),
            other.id()
        ))),
    }
}

#[async_trait]
impl NodeHandler for ToolHandler {
    async fn call(&self, mut data: Document, ctx: &mut HandlerContext<'_>) -> Result<HandlerOutput> {
        let node = as_tool(ctx.node)?;
        let session = ctx.sessions.get_session(&node.server_id).await?;

        let tool = session.tool(&node.tool_name).await?.ok_or_else(|| {
            WorkflowError::node(format!(
                "tool '{}' not found on server '{}'",
                node.tool_name, node.server_id
            ))
        })?;

        if !tool.input_schema.is_null() {
            schema::validate(&tool.input_schema, &Value::Object(data.clone())).map_err(|e| {
                WorkflowError::node(format!("input for tool '{}' is invalid: {e}", node.tool_name))
            })?;
        }

        let result = session.call_tool(&node.tool_name, data.clone()).await?;
        if result.is_error {
            let message = result
                .first_text()
                .unwrap_or("tool call failed")
                .to_owned();
            return Err(WorkflowError::node(message));
        }

        let output = if let Some(structured) = result.structured_content.clone() {
            Some(structured)
        } else {
            match result.content.first() {
                Some(Content::Text { text }) => {
                    Some(serde_json::from_str(text).unwrap_or(Value::String(text.clone())))
                }
                Some(other) => {
                    tracing::warn!(
                        tool = %node.tool_name,
                        "ignoring non-text content of type '{}'",
                        content_type(other)
                    );
                    None
                }
                None => None,
            }
        };

        if let Some(mut output) = output {
            if node.structured_output {
                if let Value::Array(items) = output {
                    output = items.into_iter().next().unwrap_or(Value::Null);
                }
            }
            place_output(&mut data, output, node.member.as_deref(), &node.tool_name);
        }
        Ok(HandlerOutput::Data(data))
    }
}

fn content_type(content: &Content) -> &'static str {
    match content {
        Content::Text { .. } => "text",
        Content::Image { .. } => "image",
    }
}
