//! `cloudflare` model-call handler.
//!
//! Calls Workers AI over the REST `ai/run` endpoint. Structured output is a
//! best-effort JSON parse of the response text.

use async_trait::async_trait;
use serde_json::{json, Value};

use mcp_workflow_core::error::{Result, WorkflowError};
use mcp_workflow_core::model::{Document, ModelNode, Node};

use super::model::{build_messages, build_system, env_var, merge_structured, usage_record};
use super::{HandlerContext, HandlerOutput, NodeHandler};

const DEFAULT_BASE_URL: &str = "https://api.cloudflare.com";

pub struct CloudflareHandler {
    http: reqwest::Client,
    base_url: String,
}

impl CloudflareHandler {
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

impl Default for CloudflareHandler {
    fn default() -> Self {
        Self::new()
    }
}

fn as_cloudflare(node: &Node) -> Result<&ModelNode> {
    match node {
        Node::Cloudflare(model) => Ok(model),
        other => Err(WorkflowError::node(format!(
            "cloudflare handler dispatched on '{}' node '{}'",
            other.node_type(),
            other.id()
        ))),
    }
}

#[async_trait]
impl NodeHandler for CloudflareHandler {
    async fn call(&self, mut data: Document, ctx: &mut HandlerContext<'_>) -> Result<HandlerOutput> {
        let node = as_cloudflare(ctx.node)?;
        let api_token = env_var("CLOUDFLARE_API_TOKEN")?;
        let account_id = env_var("CLOUDFLARE_ACCOUNT_ID")?;

        let mut messages = Vec::new();
        if let Some(system) = build_system(&data, node)? {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.extend(build_messages(&data, node)?);

        let body = json!({
            "messages": messages,
            "max_tokens": node.max_tokens,
        });

        let response = self
            .http
            .post(format!(
                "{}/client/v4/accounts/{}/ai/run/{}",
                self.base_url, account_id, node.model
            ))
            .bearer_auth(api_token)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(WorkflowError::api(
                "Cloudflare",
                format!("{status}: {detail}"),
                Some(status.as_u16()),
            ));
        }
        let payload: Value = response.json().await?;

        // The REST surface wraps the model output in `result`.
        let result = if payload.get("result").is_some_and(Value::is_object) {
            payload["result"].clone()
        } else {
            payload
        };

        ctx.usage.push(usage_record(
            ctx.action_id,
            &node.model,
            result.get("usage"),
            "input_tokens",
            "output_tokens",
        ));

        if node.include_message_in_output {
            if let Value::Object(map) = &result {
                data.extend(map.clone());
            }
        }

        let text = result["response"].as_str().unwrap_or_default().to_owned();
        if node.wants_structured_output() {
            let structured: Value = serde_json::from_str(&text).map_err(|e| {
                WorkflowError::api(
                    "Cloudflare",
                    format!("structured output is not valid JSON: {e}"),
                    None,
                )
            })?;
            merge_structured(&mut data, structured, node.member.as_deref())?;
        } else if !text.is_empty() {
            let key = node.member.clone().unwrap_or_else(|| node.name.clone());
            data.insert(key, Value::String(text));
        }

        Ok(HandlerOutput::Data(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubSessionProvider;
    use mcp_workflow_core::model::{ModelUsage, Slug, Workflow};
    use wiremock::matchers::{method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn cloudflare_node(value: Value) -> Node {
        let mut base = json!({
            "id": "a", "name": "cf", "type": "cloudflare", "model": "meta"
        });
        base.as_object_mut()
            .unwrap()
            .extend(value.as_object().unwrap().clone());
        serde_json::from_value(base).unwrap()
    }

    async fn run(mock: &MockServer, node: Node, data: Value) -> (Document, Vec<ModelUsage>) {
        std::env::set_var("CLOUDFLARE_API_TOKEN", "cf-token");
        std::env::set_var("CLOUDFLARE_ACCOUNT_ID", "acct");
        let workflow = Workflow::new(Slug::new("workflow").unwrap());
        let provider = StubSessionProvider::new();
        let mut usage: Vec<ModelUsage> = Vec::new();
        let mut ctx = HandlerContext {
            workflow: &workflow,
            node: &node,
            sessions: &provider,
            usage: &mut usage,
            action_id: "x",
        };
        let handler = CloudflareHandler::with_base_url(mock.uri());
        let output = handler
            .call(data.as_object().unwrap().clone(), &mut ctx)
            .await
            .unwrap();
        match output {
            HandlerOutput::Data(doc) => (doc, usage),
            HandlerOutput::Results(_) => panic!("model handlers broadcast"),
        }
    }

    #[tokio::test]
    async fn test_handler_cloudflare() {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r"^/client/v4/accounts/acct/ai/run/.*$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": {
                    "response": "xxx",
                    "usage": {"input_tokens": 1, "output_tokens": 2}
                },
                "success": true
            })))
            .mount(&mock)
            .await;

        let node = cloudflare_node(json!({"system": "foo", "member": "baz"}));
        let (doc, usage) = run(&mock, node, json!({"prompt": "What?"})).await;

        assert_eq!(doc.get("baz").unwrap(), "xxx");
        assert_eq!(usage.len(), 1);
        assert_eq!(usage[0].input_tokens, 1);
        assert_eq!(usage[0].output_tokens, 2);
    }

    #[tokio::test]
    async fn test_handler_cloudflare_schema() {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r"^/client/v4/accounts/acct/ai/run/.*$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": {
                    "response": "{\"foo\": \"baz\"}",
                    "usage": {"input_tokens": 0, "output_tokens": 0}
                },
                "success": true
            })))
            .mount(&mock)
            .await;

        let node = cloudflare_node(json!({"use_json_schema": true}));
        let (doc, _) = run(&mock, node, json!({})).await;
        assert_eq!(doc.get("foo").unwrap(), "baz");
    }

    #[tokio::test]
    async fn test_handler_cloudflare_unwrapped_payload() {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r"^/client/v4/accounts/acct/ai/run/.*$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "response": "yyy",
                "usage": {"input_tokens": 0, "output_tokens": 0}
            })))
            .mount(&mock)
            .await;

        let node = cloudflare_node(json!({"member": "out"}));
        let (doc, _) = run(&mock, node, json!({"prompt": "What?"})).await;
        assert_eq!(doc.get("out").unwrap(), "yyy");
    }
}
