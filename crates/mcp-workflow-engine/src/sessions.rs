//! Per-workflow session pool.
//!
//! Sessions are opened lazily, memoized by key, and owned by the task that
//! first touched the pool. `close()` from any other task fails without
//! closing anything; closing twice is safe; `get_session` after close is an
//! error. Keys resolve against `workflow.servers` first, then against
//! `workflow.nodes` for node-local server configs (a node carrying `url` and
//! optional `headers` extras).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use mcp_workflow_client::{McpClient, McpSession};
use mcp_workflow_core::error::{Result, WorkflowError};
use mcp_workflow_core::model::{Node, Server, Slug, Workflow};

/// Read-only session access handed to node handlers.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn get_session(&self, key: &str) -> Result<Arc<dyn McpSession>>;
}

#[derive(Default)]
struct PoolState {
    owner: Option<tokio::task::Id>,
    closed: bool,
    order: Vec<String>,
    sessions: HashMap<String, Arc<dyn McpSession>>,
}

pub struct SessionManager {
    workflow: Arc<Workflow>,
    client: Arc<McpClient>,
    state: Mutex<PoolState>,
}

impl SessionManager {
    pub fn new(workflow: Arc<Workflow>, client: Arc<McpClient>) -> Self {
        Self {
            workflow,
            client,
            state: Mutex::new(PoolState::default()),
        }
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    /// Open and pre-load a session for every workflow server. Failures are
    /// logged at debug level and tolerated; handlers re-check when they
    /// actually need a session.
    pub async fn preload(&self) {
        let server_ids: Vec<String> = self
            .workflow
            .servers
            .iter()
            .map(|server| server.id.to_string())
            .collect();
        for server_id in server_ids {
            match self.get_session(&server_id).await {
                Ok(session) => {
                    if let Err(e) = session.load().await {
                        tracing::debug!(server = %server_id, error = %e, "session pre-load failed");
                    }
                }
                Err(e) => {
                    tracing::debug!(server = %server_id, error = %e, "session open failed during pre-load");
                }
            }
        }
    }

    fn resolve(&self, key: &str) -> Result<Server> {
        if let Some(server) = self.workflow.server(key) {
            return Ok(server.clone());
        }
        if let Some(server) = self.workflow.node(key).and_then(server_from_node) {
            return Ok(server);
        }
        Err(WorkflowError::session(format!(
            "no server or node with id '{key}' in workflow '{}'",
            self.workflow.id
        )))
    }

    /// Close all sessions in reverse creation order. Only the owner task may
    /// close the pool; closing an already-closed pool is a no-op.
    pub async fn close(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Ok(());
        }
        if let Some(owner) = state.owner {
            if tokio::task::try_id() != Some(owner) {
                return Err(WorkflowError::session(
                    "session manager must be closed by its owner task",
                ));
            }
        }
        state.closed = true;
        while let Some(key) = state.order.pop() {
            state.sessions.remove(&key);
        }
        Ok(())
    }
}

#[async_trait]
impl SessionProvider for SessionManager {
    async fn get_session(&self, key: &str) -> Result<Arc<dyn McpSession>> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(WorkflowError::session("session manager is closed"));
        }
        if state.owner.is_none() {
            state.owner = tokio::task::try_id();
        }
        if let Some(session) = state.sessions.get(key) {
            return Ok(session.clone());
        }

        let server = self.resolve(key)?;
        let session: Arc<dyn McpSession> = Arc::new(self.client.session(&server, false).await?);
        state.order.push(key.to_owned());
        state.sessions.insert(key.to_owned(), session.clone());
        Ok(session)
    }
}

/// Interpret a node as an ad-hoc server config via its `url` (and optional
/// `headers`) extras.
fn server_from_node(node: &Node) -> Option<Server> {
    let url = node.extra().get("url")?.as_str()?.to_owned();
    let mut server = Server::new(Slug::new(node.id()).ok()?, url);
    server.name = Some(node.name().to_owned());
    if let Some(headers) = node.extra().get("headers").and_then(|v| v.as_object()) {
        server.headers = headers
            .iter()
            .filter_map(|(name, value)| {
                Some((name.to_lowercase(), value.as_str()?.to_owned()))
            })
            .collect();
    }
    Some(server)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn workflow_with_server(url: &str) -> Arc<Workflow> {
        let mut workflow = Workflow::new(Slug::new("test-workflow").unwrap());
        workflow.name = Some("Test".into());
        workflow
            .servers
            .push(Server::new(Slug::new("test-server").unwrap(), url.to_owned()));
        Arc::new(workflow)
    }

    fn manager(workflow: Arc<Workflow>) -> SessionManager {
        SessionManager::new(workflow, Arc::new(McpClient::default()))
    }

    #[tokio::test]
    async fn test_sessions_not_found() {
        let sessions = manager(workflow_with_server("https://example.com/mcp/"));
        let err = sessions.get_session("123").await.unwrap_err();
        assert!(matches!(err, WorkflowError::Session { .. }));
    }

    #[tokio::test]
    async fn test_sessions_closed() {
        let sessions = manager(workflow_with_server("https://example.com/mcp/"));
        sessions.close().await.unwrap();
        let err = sessions.get_session("test-server").await.unwrap_err();
        assert!(matches!(err, WorkflowError::Session { .. }));
        // Closing again is safe.
        sessions.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_sessions_owner_task_mismatch() {
        let workflow = workflow_with_server("https://example.com/mcp/");
        let sessions = Arc::new(manager(workflow));

        // Bind ownership from a spawned task. The dial fails (no server is
        // listening) but binding happens before the dial.
        let bound = sessions.clone();
        tokio::spawn(async move {
            let _ = bound.get_session("test-server").await;
        })
        .await
        .unwrap();

        let err = sessions.close().await.unwrap_err();
        assert!(matches!(err, WorkflowError::Session { .. }));
    }

    #[test]
    fn test_server_from_node() {
        let node: Node = serde_json::from_value(json!({
            "id": "node-server", "name": "inline", "type": "tool",
            "server_id": "node-server", "tool_name": "t",
            "url": "https://example.com/mcp/",
            "headers": {"X-Key": "abc"}
        }))
        .unwrap();
        let server = server_from_node(&node).unwrap();
        assert_eq!(server.id, "node-server");
        assert_eq!(server.url, "https://example.com/mcp/");
        assert_eq!(server.headers.get("x-key").unwrap(), "abc");
    }

    #[test]
    fn test_server_from_node_without_url() {
        let node: Node = serde_json::from_value(json!({
            "id": "n", "name": "x", "type": "other"
        }))
        .unwrap();
        assert!(server_from_node(&node).is_none());
    }
}
