//! Scriptable session stubs for handler and engine tests.
//!
//! [`StubSession`] returns queued MCP results instead of dialing a server;
//! [`StubSessionProvider`] stands in for the session manager.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use mcp_workflow_client::protocol::{
    CallToolResult, Content, GetPromptResult, ListToolsResult, PromptMessage, ReadResourceResult,
    ResourceContents, Tool,
};
use mcp_workflow_client::McpSession;
use mcp_workflow_core::error::{Result, WorkflowError};
use mcp_workflow_core::model::{Document, Server, Slug};

use crate::sessions::SessionProvider;

#[derive(Default, Debug)]
struct Scripted {
    call_results: VecDeque<CallToolResult>,
    read_results: VecDeque<ReadResourceResult>,
    prompt_results: VecDeque<GetPromptResult>,
}

#[derive(Debug)]
pub struct StubSession {
    server: Server,
    tools: Vec<Tool>,
    scripted: Mutex<Scripted>,
}

impl StubSession {
    pub fn new(server_id: &str) -> Self {
        Self {
            server: Server::new(
                Slug::new(server_id).expect("valid server id"),
                "https://testserver/mcp/",
            ),
            tools: Vec::new(),
            scripted: Mutex::new(Scripted::default()),
        }
    }

    pub fn with_tool(mut self, name: &str, input_schema: Value) -> Self {
        self.tools.push(Tool {
            name: name.to_owned(),
            description: None,
            input_schema,
        });
        self
    }

    pub async fn push_call_result(&self, result: CallToolResult) {
        self.scripted.lock().await.call_results.push_back(result);
    }

    pub async fn push_read_result(&self, result: ReadResourceResult) {
        self.scripted.lock().await.read_results.push_back(result);
    }

    pub async fn push_prompt_result(&self, result: GetPromptResult) {
        self.scripted.lock().await.prompt_results.push_back(result);
    }
}

/// Build a text resource-contents entry.
pub fn text_contents(uri: &str, mime_type: Option<&str>, text: &str) -> ResourceContents {
    ResourceContents::Text {
        uri: uri.to_owned(),
        mime_type: mime_type.map(str::to_owned),
        text: text.to_owned(),
    }
}

/// Build a blob resource-contents entry.
pub fn blob_contents(uri: &str, blob: &str) -> ResourceContents {
    ResourceContents::Blob {
        uri: uri.to_owned(),
        mime_type: None,
        blob: blob.to_owned(),
    }
}

/// Build a text prompt message.
pub fn text_message(role: &str, text: &str) -> PromptMessage {
    PromptMessage {
        role: role.to_owned(),
        content: Content::Text {
            text: text.to_owned(),
        },
    }
}

/// Build an image prompt message.
pub fn image_message(role: &str) -> PromptMessage {
    PromptMessage {
        role: role.to_owned(),
        content: Content::Image {
            data: "xxx".to_owned(),
            mime_type: "image/png".to_owned(),
        },
    }
}

#[async_trait]
impl McpSession for StubSession {
    fn server(&self) -> &Server {
        &self.server
    }

    async fn load(&self) -> Result<()> {
        Ok(())
    }

    async fn list_tools(&self) -> Result<ListToolsResult> {
        Ok(ListToolsResult {
            tools: self.tools.clone(),
        })
    }

    async fn call_tool(&self, name: &str, _arguments: Document) -> Result<CallToolResult> {
        self.scripted
            .lock()
            .await
            .call_results
            .pop_front()
            .ok_or_else(|| {
                WorkflowError::mcp(self.server.id.as_str(), format!("no scripted result for tool {name:?}"))
            })
    }

    async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult> {
        self.scripted
            .lock()
            .await
            .read_results
            .pop_front()
            .ok_or_else(|| {
                WorkflowError::mcp(self.server.id.as_str(), format!("no scripted result for resource {uri:?}"))
            })
    }

    async fn get_prompt(&self, name: &str) -> Result<GetPromptResult> {
        self.scripted
            .lock()
            .await
            .prompt_results
            .pop_front()
            .ok_or_else(|| {
                WorkflowError::mcp(self.server.id.as_str(), format!("no scripted result for prompt {name:?}"))
            })
    }
}

#[derive(Default)]
pub struct StubSessionProvider {
    sessions: HashMap<String, Arc<dyn McpSession>>,
}

impl StubSessionProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(mut self, key: &str, session: Arc<dyn McpSession>) -> Self {
        self.sessions.insert(key.to_owned(), session);
        self
    }
}

#[async_trait]
impl SessionProvider for StubSessionProvider {
    async fn get_session(&self, key: &str) -> Result<Arc<dyn McpSession>> {
        self.sessions
            .get(key)
            .cloned()
            .ok_or_else(|| WorkflowError::session(format!("no session for '{key}'")))
    }
}
