//! The engine's own MCP surface.
//!
//! Exposes one tool, `workflow(name, data?)`, which runs a workflow and
//! returns its trace as a JSON list, and one resource per workflow at
//! `workflow://{id}/` serving the definition. The dispatcher is
//! request-level and framework-free: mount it behind any transport.

use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::{json, Value};

use mcp_workflow_client::protocol::{
    CallToolResult, InitializeResult, ListPromptsResult, ListResourcesResult, ListToolsResult,
    McpErrorData, McpRequest, McpResponse, ReadResourceResult, ResourceContents, ResourceInfo,
    ResponseResult, ServerInfo, Tool, PROTOCOL_VERSION,
};
use mcp_workflow_core::model::Workflow;
use mcp_workflow_engine::WorkflowEngine;

const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;

pub struct WorkflowMcpServer {
    engine: Arc<WorkflowEngine>,
    name: String,
}

impl WorkflowMcpServer {
    pub fn new(engine: Arc<WorkflowEngine>) -> Self {
        Self {
            engine,
            name: env!("CARGO_PKG_NAME").to_owned(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn resource_uri(workflow: &Workflow) -> String {
        format!("workflow://{}/", workflow.id)
    }

    /// Handle one MCP request.
    pub async fn handle(&self, request: McpRequest) -> McpResponse {
        let id = request.id().to_owned();
        match request {
            McpRequest::Initialize { .. } => McpResponse::Result {
                id,
                result: ResponseResult::Initialize(InitializeResult {
                    protocol_version: PROTOCOL_VERSION.to_owned(),
                    capabilities: json!({"tools": {}, "resources": {}}),
                    server_info: ServerInfo {
                        name: self.name.clone(),
                        version: env!("CARGO_PKG_VERSION").to_owned(),
                    },
                }),
            },
            McpRequest::ListTools { .. } => McpResponse::Result {
                id,
                result: ResponseResult::ListTools(ListToolsResult {
                    tools: vec![Tool {
                        name: "workflow".to_owned(),
                        description: Some(
                            "Run a workflow by id or name and return its trace".to_owned(),
                        ),
                        input_schema: json!({
                            "type": "object",
                            "properties": {
                                "name": {"type": "string"},
                                "data": {"type": "object"}
                            },
                            "required": ["name"]
                        }),
                    }],
                }),
            },
            McpRequest::CallTool { params, .. } => {
                if params.name != "workflow" {
                    return McpResponse::Error {
                        id,
                        error: McpErrorData {
                            code: METHOD_NOT_FOUND,
                            message: format!("unknown tool: {}", params.name),
                            data: None,
                        },
                    };
                }
                let result = self.run_workflow_tool(&params.arguments).await;
                McpResponse::Result {
                    id,
                    result: ResponseResult::CallTool(result),
                }
            }
            McpRequest::ListResources { .. } => McpResponse::Result {
                id,
                result: ResponseResult::ListResources(ListResourcesResult {
                    resources: self
                        .engine
                        .workflows()
                        .iter()
                        .map(|workflow| ResourceInfo {
                            uri: Self::resource_uri(workflow),
                            name: Some(workflow.display_name().to_owned()),
                            description: workflow.description.clone(),
                            mime_type: Some("application/json".to_owned()),
                        })
                        .collect(),
                }),
            },
            McpRequest::ReadResource { params, .. } => {
                let workflow = self
                    .engine
                    .workflows()
                    .iter()
                    .find(|workflow| Self::resource_uri(workflow) == params.uri);
                match workflow {
                    Some(workflow) => match serde_json::to_string(workflow) {
                        Ok(text) => McpResponse::Result {
                            id,
                            result: ResponseResult::ReadResource(ReadResourceResult {
                                contents: vec![ResourceContents::Text {
                                    uri: params.uri,
                                    mime_type: Some("application/json".to_owned()),
                                    text,
                                }],
                            }),
                        },
                        Err(e) => McpResponse::Error {
                            id,
                            error: McpErrorData {
                                code: INVALID_PARAMS,
                                message: format!("cannot serialize workflow: {e}"),
                                data: None,
                            },
                        },
                    },
                    None => McpResponse::Error {
                        id,
                        error: McpErrorData {
                            code: INVALID_PARAMS,
                            message: format!("unknown resource: {}", params.uri),
                            data: None,
                        },
                    },
                }
            }
            McpRequest::ListPrompts { .. } => McpResponse::Result {
                id,
                result: ResponseResult::ListPrompts(ListPromptsResult {
                    prompts: Vec::new(),
                }),
            },
            McpRequest::GetPrompt { .. } => McpResponse::Error {
                id,
                error: McpErrorData {
                    code: METHOD_NOT_FOUND,
                    message: "prompts are not supported".to_owned(),
                    data: None,
                },
            },
        }
    }

    async fn run_workflow_tool(
        &self,
        arguments: &mcp_workflow_core::model::Document,
    ) -> CallToolResult {
        let Some(name) = arguments.get("name").and_then(Value::as_str) else {
            return CallToolResult::error("missing required argument: name");
        };
        let data = arguments
            .get("data")
            .and_then(Value::as_object)
            .cloned();

        match self.engine.run_workflow(name, data) {
            Ok(stream) => {
                let trace: Vec<_> = stream.collect().await;
                match serde_json::to_string(&trace) {
                    Ok(text) => CallToolResult::text(text),
                    Err(e) => CallToolResult::error(format!("cannot serialize trace: {e}")),
                }
            }
            Err(e) => CallToolResult::error(e.to_string()),
        }
    }
}
