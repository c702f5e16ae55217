//! Node handler contract and registry.
//!
//! One handler per node `type`. The registry is the engine's only extension
//! point: registering a handler under a new type string makes that node type
//! executable, and overriding a built-in replaces its behavior. A node whose
//! type has no handler is passed through unchanged by the engine (a
//! `default` trace event).

pub mod anthropic;
pub mod cloudflare;
pub mod function;
pub mod loops;
pub mod model;
pub mod openai;
pub mod pick;
pub mod prompt;
pub mod resource;
pub mod switch;
pub mod tool;
pub mod transform;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use mcp_workflow_core::error::Result;
use mcp_workflow_core::model::{Document, ModelUsage, Node, Workflow};
use mcp_workflow_core::trace::EdgeResult;

use crate::sessions::SessionProvider;

/// Everything a handler can reach besides the data document itself.
pub struct HandlerContext<'a> {
    pub workflow: &'a Workflow,
    pub node: &'a Node,
    pub sessions: &'a dyn SessionProvider,
    pub usage: &'a mut Vec<ModelUsage>,
    /// Unique id of this node visit; `ModelUsage.ref_id` refers to it.
    pub action_id: &'a str,
}

/// What a handler produced for the current node.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerOutput {
    /// A data document, broadcast to every non-null edge.
    Data(Document),
    /// Explicit per-edge results.
    Results(Vec<EdgeResult>),
}

#[async_trait]
pub trait NodeHandler: Send + Sync {
    async fn call(&self, data: Document, ctx: &mut HandlerContext<'_>) -> Result<HandlerOutput>;
}

/// Open dispatch table keyed by node `type`.
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn NodeHandler>>,
}

impl HandlerRegistry {
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registry with every built-in node type.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register("tool", Arc::new(tool::ToolHandler));
        registry.register("resource", Arc::new(resource::ResourceHandler));
        registry.register("prompt", Arc::new(prompt::PromptHandler));
        registry.register("switch", Arc::new(switch::SwitchHandler));
        registry.register("loop", Arc::new(loops::LoopHandler));
        registry.register("function", Arc::new(function::FunctionHandler));
        registry.register("script", Arc::new(function::ScriptHandler));
        registry.register("transform", Arc::new(transform::TransformHandler));
        registry.register("pick", Arc::new(pick::PickHandler));
        registry.register("anthropic", Arc::new(anthropic::AnthropicHandler::new()));
        registry.register("openai", Arc::new(openai::OpenAiHandler::new()));
        registry.register("cloudflare", Arc::new(cloudflare::CloudflareHandler::new()));
        registry
    }

    pub fn register(&mut self, node_type: impl Into<String>, handler: Arc<dyn NodeHandler>) {
        self.handlers.insert(node_type.into(), handler);
    }

    pub fn get(&self, node_type: &str) -> Option<&Arc<dyn NodeHandler>> {
        self.handlers.get(node_type)
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Place a handler result into the data document: under `member` when set,
/// shallow-merged when it is an object, else under `fallback_key`.
pub(crate) fn place_output(
    data: &mut Document,
    value: Value,
    member: Option<&str>,
    fallback_key: &str,
) {
    match member {
        Some(member) => {
            data.insert(member.to_owned(), value);
        }
        None => match value {
            Value::Object(map) => data.extend(map),
            other => {
                data.insert(fallback_key.to_owned(), other);
            }
        },
    }
}
