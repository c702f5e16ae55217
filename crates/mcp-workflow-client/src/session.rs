//! MCP client sessions.
//!
//! [`McpSession`] is the interface node handlers consume; [`HttpMcpSession`]
//! is the streaming-HTTP implementation opened by
//! [`crate::client::McpClient`]. A session is scoped to one workflow run and
//! owned by the session manager that created it.

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use mcp_workflow_core::error::{Result, WorkflowError};
use mcp_workflow_core::model::{Document, Server};

use crate::protocol::{
    CallToolResult, GetPromptParams, GetPromptResult, ListPromptsResult, ListResourcesResult,
    ListToolsResult, McpRequest, McpResponse, PromptInfo, ReadResourceParams, ReadResourceResult,
    ResourceInfo, ResponseResult, Tool, ToolCallParams,
};
use crate::transport::HttpTransport;

/// A live connection to one MCP server.
#[async_trait]
pub trait McpSession: Send + Sync + std::fmt::Debug {
    fn server(&self) -> &Server;

    /// Pre-load the server catalogs (tools, resources, prompts). MCP errors
    /// are tolerated and leave the corresponding catalog empty.
    async fn load(&self) -> Result<()>;

    async fn list_tools(&self) -> Result<ListToolsResult>;
    async fn call_tool(&self, name: &str, arguments: Document) -> Result<CallToolResult>;
    async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult>;
    async fn get_prompt(&self, name: &str) -> Result<GetPromptResult>;

    /// Look up a tool spec by name, listing tools if not yet cached.
    async fn tool(&self, name: &str) -> Result<Option<Tool>> {
        let result = self.list_tools().await?;
        Ok(result.tools.into_iter().find(|tool| tool.name == name))
    }
}

#[derive(Debug)]
pub struct HttpMcpSession {
    server: Server,
    transport: HttpTransport,
    tools: RwLock<Option<Vec<Tool>>>,
    resources: RwLock<Vec<ResourceInfo>>,
    prompts: RwLock<Vec<PromptInfo>>,
}

impl HttpMcpSession {
    pub(crate) fn new(server: Server, transport: HttpTransport) -> Self {
        Self {
            server,
            transport,
            tools: RwLock::new(None),
            resources: RwLock::new(Vec::new()),
            prompts: RwLock::new(Vec::new()),
        }
    }

    async fn request(&self, request: McpRequest) -> Result<ResponseResult> {
        match self.transport.send(&request).await? {
            McpResponse::Result { result, .. } => Ok(result),
            McpResponse::Error { error, .. } => Err(WorkflowError::mcp(
                self.server.id.as_str(),
                format!("{} (code {})", error.message, error.code),
            )),
        }
    }

    fn unexpected(&self, what: &str) -> WorkflowError {
        WorkflowError::mcp(
            self.server.id.as_str(),
            format!("unexpected response to {what}"),
        )
    }

    pub async fn cached_tools(&self) -> Vec<Tool> {
        self.tools.read().await.clone().unwrap_or_default()
    }

    pub async fn cached_resources(&self) -> Vec<ResourceInfo> {
        self.resources.read().await.clone()
    }

    pub async fn cached_prompts(&self) -> Vec<PromptInfo> {
        self.prompts.read().await.clone()
    }

    async fn list_resources(&self) -> Result<ListResourcesResult> {
        let result = self
            .request(McpRequest::ListResources {
                id: Uuid::new_v4().to_string(),
            })
            .await?;
        match result {
            ResponseResult::ListResources(resources) => {
                *self.resources.write().await = resources.resources.clone();
                Ok(resources)
            }
            _ => Err(self.unexpected("resources/list")),
        }
    }

    /// MCP-level errors during load leave the catalog empty; transport
    /// errors still propagate.
    fn tolerate(&self, what: &str, result: Result<()>) -> Result<()> {
        match result {
            Err(e @ WorkflowError::Mcp { .. }) => {
                tracing::debug!(server = %self.server.id, error = %e, "{what} failed during load");
                Ok(())
            }
            other => other,
        }
    }

    async fn list_prompts(&self) -> Result<ListPromptsResult> {
        let result = self
            .request(McpRequest::ListPrompts {
                id: Uuid::new_v4().to_string(),
            })
            .await?;
        match result {
            ResponseResult::ListPrompts(prompts) => {
                *self.prompts.write().await = prompts.prompts.clone();
                Ok(prompts)
            }
            _ => Err(self.unexpected("prompts/list")),
        }
    }
}

#[async_trait]
impl McpSession for HttpMcpSession {
    fn server(&self) -> &Server {
        &self.server
    }

    async fn load(&self) -> Result<()> {
        self.tolerate("tools/list", self.list_tools().await.map(|_| ()))?;
        self.tolerate("resources/list", self.list_resources().await.map(|_| ()))?;
        self.tolerate("prompts/list", self.list_prompts().await.map(|_| ()))?;
        Ok(())
    }

    async fn list_tools(&self) -> Result<ListToolsResult> {
        let result = self
            .request(McpRequest::ListTools {
                id: Uuid::new_v4().to_string(),
            })
            .await?;
        match result {
            ResponseResult::ListTools(tools) => {
                *self.tools.write().await = Some(tools.tools.clone());
                Ok(tools)
            }
            _ => Err(self.unexpected("tools/list")),
        }
    }

    async fn call_tool(&self, name: &str, arguments: Document) -> Result<CallToolResult> {
        let result = self
            .request(McpRequest::CallTool {
                id: Uuid::new_v4().to_string(),
                params: ToolCallParams {
                    name: name.to_owned(),
                    arguments,
                },
            })
            .await?;
        match result {
            ResponseResult::CallTool(result) => Ok(result),
            _ => Err(self.unexpected("tools/call")),
        }
    }

    async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult> {
        let result = self
            .request(McpRequest::ReadResource {
                id: Uuid::new_v4().to_string(),
                params: ReadResourceParams {
                    uri: uri.to_owned(),
                },
            })
            .await?;
        match result {
            ResponseResult::ReadResource(result) => Ok(result),
            _ => Err(self.unexpected("resources/read")),
        }
    }

    async fn get_prompt(&self, name: &str) -> Result<GetPromptResult> {
        let result = self
            .request(McpRequest::GetPrompt {
                id: Uuid::new_v4().to_string(),
                params: GetPromptParams {
                    name: name.to_owned(),
                    arguments: None,
                },
            })
            .await?;
        match result {
            ResponseResult::GetPrompt(result) => Ok(result),
            _ => Err(self.unexpected("prompts/get")),
        }
    }

    async fn tool(&self, name: &str) -> Result<Option<Tool>> {
        if let Some(tools) = self.tools.read().await.as_ref() {
            return Ok(tools.iter().find(|tool| tool.name == name).cloned());
        }
        let result = self.list_tools().await?;
        Ok(result.tools.into_iter().find(|tool| tool.name == name))
    }
}
