//! `openai` model-call handler.
//!
//! Calls the Chat Completions API; structured output is requested through a
//! JSON-schema response format.

use async_trait::async_trait;
use serde_json::{json, Value};

use mcp_workflow_core::error::{Result, WorkflowError};
use mcp_workflow_core::model::{Document, ModelNode, Node};

use super::model::{build_messages, build_system, env_var, merge_structured, usage_record};
use super::{HandlerContext, HandlerOutput, NodeHandler};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

pub struct OpenAiHandler {
    http: reqwest::Client,
    base_url: String,
}

impl OpenAiHandler {
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

impl Default for OpenAiHandler {
    fn default() -> Self {
        Self::new()
    }
}

fn as_openai(node: &Node) -> Result<&ModelNode> {
    match node {
        Node::OpenAi(model) => Ok(model),
        other => Err(WorkflowError::node(format!(
            "openai handler dispatched on '{}' node '{}'",
            other.node_type(),
            other.id()
        ))),
    }
}

#[async_trait]
impl NodeHandler for OpenAiHandler {
    async fn call(&self, mut data: Document, ctx: &mut HandlerContext<'_>) -> Result<HandlerOutput> {
        let node = as_openai(ctx.node)?;
        let api_key = env_var("OPENAI_API_KEY")?;

        let mut messages = Vec::new();
        if let Some(system) = build_system(&data, node)? {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.extend(build_messages(&data, node)?);

        let mut body = json!({
            "model": node.model,
            "messages": messages,
            "max_tokens": node.max_tokens,
        });
        if node.wants_structured_output() {
            body["response_format"] = json!({
                "type": "json_schema",
                "json_schema": {
                    "name": "structured_output",
                    "schema": node.structured_output_schema(),
                },
            });
        }

        let response = self
            .http
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(WorkflowError::api(
                "OpenAI",
                format!("{status}: {detail}"),
                Some(status.as_u16()),
            ));
        }
        let completion: Value = response.json().await?;

        ctx.usage.push(usage_record(
            ctx.action_id,
            &node.model,
            completion.get("usage"),
            "prompt_tokens",
            "completion_tokens",
        ));

        let message = completion["choices"][0]["message"].clone();
        if node.include_message_in_output {
            if let Value::Object(map) = &message {
                data.extend(map.clone());
            }
        }

        let content = message["content"].as_str().unwrap_or_default().to_owned();
        if node.wants_structured_output() {
            let structured: Value = serde_json::from_str(&content).map_err(|e| {
                WorkflowError::api(
                    "OpenAI",
                    format!("structured output is not valid JSON: {e}"),
                    None,
                )
            })?;
            merge_structured(&mut data, structured, node.member.as_deref())?;
        } else if !content.is_empty() {
            let key = node.member.clone().unwrap_or_else(|| node.name.clone());
            data.insert(key, Value::String(content));
        }

        Ok(HandlerOutput::Data(data))
    }
}
