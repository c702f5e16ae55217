//! `anthropic` model-call handler.
//!
//! Calls the Messages API. Structured output is requested by registering a
//! single `structured_output` tool carrying the node's JSON schema; workflow
//! MCP servers are forwarded with the MCP-client beta header.

use async_trait::async_trait;
use serde_json::{json, Value};

use mcp_workflow_core::error::{Result, WorkflowError};
use mcp_workflow_core::model::{Document, ModelNode, Node};

use super::model::{
    build_messages, build_system, env_var, merge_structured, selected_servers, usage_record,
};
use super::{HandlerContext, HandlerOutput, NodeHandler};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const MCP_BETA: &str = "mcp-client-2025-04-04";

pub struct AnthropicHandler {
    http: reqwest::Client,
    base_url: String,
}

impl AnthropicHandler {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

impl Default for AnthropicHandler {
    fn default() -> Self {
        Self::new()
    }
}

fn as_anthropic(node: &Node) -> Result<&ModelNode> {
    match node {
        Node::Anthropic(model) => Ok(model),
        other => Err(WorkflowError::node(format!(
            "anthropic handler dispatched on '{}' node '{}'",
            other.node_type(),
            other.id()
        ))),
    }
}

#[async_trait]
impl NodeHandler for AnthropicHandler {
    async fn call(&self, mut data: Document, ctx: &mut HandlerContext<'_>) -> Result<HandlerOutput> {
        let node = as_anthropic(ctx.node)?;
        let api_key = env_var("ANTHROPIC_API_KEY")?;

        let mut body = json!({
            "model": node.model,
            "max_tokens": node.max_tokens,
            "messages": build_messages(&data, node)?,
        });
        if let Some(system) = build_system(&data, node)? {
            body["system"] = Value::String(system);
        }
        if node.wants_structured_output() {
            body["tools"] = json!([{
                "name": "structured_output",
                "input_schema": node.structured_output_schema(),
            }]);
        }

        let mut request = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION);

        if !ctx.workflow.servers.is_empty() {
            let servers: Vec<Value> = selected_servers(ctx.workflow, node)
                .into_iter()
                .map(|server| {
                    let mut definition = json!({
                        "type": "url",
                        "url": server.url,
                        "name": server.display_name(),
                    });
                    if let Some(authorization) = server.headers.get("authorization") {
                        definition["authorization_token"] = Value::String(authorization.clone());
                    }
                    definition
                })
                .collect();
            body["mcp_servers"] = Value::Array(servers);
            request = request.header("anthropic-beta", MCP_BETA);
        }

        let response = request.json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(WorkflowError::api(
                "Anthropic",
                format!("{status}: {detail}"),
                Some(status.as_u16()),
            ));
        }
        let message: Value = response.json().await?;

        ctx.usage.push(usage_record(
            ctx.action_id,
            &node.model,
            message.get("usage"),
            "input_tokens",
            "output_tokens",
        ));

        if node.include_message_in_output {
            if let Value::Object(map) = &message {
                data.extend(map.clone());
            }
        }

        let empty = Vec::new();
        let content = message["content"].as_array().unwrap_or(&empty);
        let structured = content.iter().find_map(|block| {
            (block["type"] == "tool_use" && block["name"] == "structured_output")
                .then(|| block.get("input").cloned())
                .flatten()
        });

        if let Some(structured) = structured {
            merge_structured(&mut data, structured, node.member.as_deref())?;
        } else {
            let texts: Vec<&str> = content
                .iter()
                .filter(|block| block["type"] == "text")
                .filter_map(|block| block["text"].as_str())
                .collect();
            if !texts.is_empty() {
                let key = node.member.clone().unwrap_or_else(|| node.name.clone());
                data.insert(key, Value::String(texts.join("\n")));
            }
        }

        Ok(HandlerOutput::Data(data))
    }
}
