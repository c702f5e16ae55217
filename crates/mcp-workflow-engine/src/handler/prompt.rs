//! `prompt` node handler: fetch an MCP prompt into the data document.

use async_trait::async_trait;
use serde_json::Value;

use mcp_workflow_client::protocol::Content;
use mcp_workflow_core::error::{Result, WorkflowError};
use mcp_workflow_core::model::{Document, Node, PromptNode};

use super::{place_output, HandlerContext, HandlerOutput, NodeHandler};

pub struct PromptHandler;

fn as_prompt(node: &Node) -> Result<&PromptNode> {
    match node {
        Node::Prompt(prompt) => Ok(prompt),
        other => Err(WorkflowError::node(format!(
            "prompt handler dispatched on '{}' node '{}'",
            other.node_type(),
            other.id()
        ))),
    }
}

#[async_trait]
impl NodeHandler for PromptHandler {
    async fn call(&self, mut data: Document, ctx: &mut HandlerContext<'_>) -> Result<HandlerOutput> {
        let node = as_prompt(ctx.node)?;
        let session = ctx.sessions.get_session(&node.server_id).await?;

        let result = session.get_prompt(&node.prompt_name).await?;
        let mut texts: Vec<&str> = Vec::new();
        for message in &result.messages {
            match &message.content {
                Content::Text { text } => texts.push(text),
                Content::Image { .. } => {
                    tracing::warn!(
                        prompt = %node.prompt_name,
                        "ignoring non-text prompt message"
                    );
                }
            }
        }

        if !texts.is_empty() {
            place_output(
                &mut data,
                Value::String(texts.join("\n")),
                node.member.as_deref(),
                "prompt",
            );
        }
        Ok(HandlerOutput::Data(data))
    }
}
