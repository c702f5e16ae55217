//! Per-server OAuth credential persistence.
//!
//! The store is process-wide; the engine serializes reads and writes per
//! server. Implementations must be safe to share across tasks.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use mcp_workflow_core::error::{Result, WorkflowError};

/// OAuth artifacts persisted for one MCP server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerCredentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[async_trait]
pub trait CredentialsStore: Send + Sync {
    async fn load(&self, server_id: &str) -> Result<Option<ServerCredentials>>;
    async fn store(&self, server_id: &str, credentials: &ServerCredentials) -> Result<()>;
}

/// In-memory store; the default for ad-hoc clients and tests.
#[derive(Debug, Default)]
pub struct MemoryCredentialsStore {
    inner: RwLock<HashMap<String, ServerCredentials>>,
}

impl MemoryCredentialsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialsStore for MemoryCredentialsStore {
    async fn load(&self, server_id: &str) -> Result<Option<ServerCredentials>> {
        Ok(self.inner.read().await.get(server_id).cloned())
    }

    async fn store(&self, server_id: &str, credentials: &ServerCredentials) -> Result<()> {
        self.inner
            .write()
            .await
            .insert(server_id.to_owned(), credentials.clone());
        Ok(())
    }
}

/// File-backed store: one JSON document per server id under `dir`.
#[derive(Debug)]
pub struct FileCredentialsStore {
    dir: PathBuf,
}

impl FileCredentialsStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, server_id: &str) -> Result<PathBuf> {
        // Server ids are slugs, but this store takes raw strings; refuse
        // anything that could escape the directory.
        if server_id.is_empty()
            || !server_id
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
        {
            return Err(WorkflowError::configuration(format!(
                "invalid server id for credentials file: {server_id:?}"
            )));
        }
        Ok(self.dir.join(format!("{server_id}.json")))
    }
}

#[async_trait]
impl CredentialsStore for FileCredentialsStore {
    async fn load(&self, server_id: &str) -> Result<Option<ServerCredentials>> {
        let path = self.path_for(server_id)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(WorkflowError::configuration(format!(
                "cannot read credentials file {}: {e}",
                path.display()
            ))),
        }
    }

    async fn store(&self, server_id: &str, credentials: &ServerCredentials) -> Result<()> {
        let path = self.path_for(server_id)?;
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            WorkflowError::configuration(format!(
                "cannot create credentials directory {}: {e}",
                self.dir.display()
            ))
        })?;
        let bytes = serde_json::to_vec_pretty(credentials)?;
        tokio::fs::write(&path, bytes).await.map_err(|e| {
            WorkflowError::configuration(format!(
                "cannot write credentials file {}: {e}",
                path.display()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryCredentialsStore::new();
        let credentials = ServerCredentials {
            access_token: Some("xxx".into()),
            ..Default::default()
        };
        store.store("123", &credentials).await.unwrap();
        let loaded = store.load("123").await.unwrap().unwrap();
        assert_eq!(loaded.access_token.as_deref(), Some("xxx"));
        assert!(store.load("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialsStore::new(dir.path());
        let credentials = ServerCredentials {
            access_token: Some("xxx".into()),
            refresh_token: Some("yyy".into()),
            scope: Some("doc.read doc.write".into()),
            ..Default::default()
        };
        store.store("hello", &credentials).await.unwrap();
        let loaded = store.load("hello").await.unwrap().unwrap();
        assert_eq!(loaded, credentials);
    }

    #[tokio::test]
    async fn test_file_store_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialsStore::new(dir.path());
        assert!(store.load("absent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_rejects_path_escapes() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialsStore::new(dir.path());
        assert!(store.load("../evil").await.is_err());
    }
}
