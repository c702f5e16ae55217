//! MCP client: opens authenticated sessions against workflow servers.
//!
//! `session()` merges stored credentials into the request headers (server
//! configuration wins), performs the `initialize` handshake, and when the
//! attempt fails with an HTTP 401 anywhere in the error chain, refreshes the
//! token via [`crate::oauth`] and retries exactly once.

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use mcp_workflow_core::error::{Result, WorkflowError};
use mcp_workflow_core::model::Server;

use crate::credentials::{CredentialsStore, MemoryCredentialsStore, ServerCredentials};
use crate::oauth::{split_scopes, OAuth2AuthorizationCodeClient};
use crate::protocol::{ClientInfo, InitializeParams, McpRequest, McpResponse, ResponseResult, PROTOCOL_VERSION};
use crate::session::HttpMcpSession;
use crate::transport::HttpTransport;

/// True when the error, or anything in its source chain, is an HTTP 401.
pub fn is_http_401(error: &WorkflowError) -> bool {
    error.http_status() == Some(401)
}

pub struct McpClient {
    http: reqwest::Client,
    credentials: Arc<dyn CredentialsStore>,
    client_info: ClientInfo,
}

impl Default for McpClient {
    fn default() -> Self {
        Self::new(Arc::new(MemoryCredentialsStore::new()))
    }
}

impl McpClient {
    pub fn new(credentials: Arc<dyn CredentialsStore>) -> Self {
        Self {
            http: reqwest::Client::new(),
            credentials,
            client_info: ClientInfo {
                name: env!("CARGO_PKG_NAME").to_owned(),
                version: env!("CARGO_PKG_VERSION").to_owned(),
            },
        }
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialsStore> {
        &self.credentials
    }

    /// Request headers for `server`: a bearer token when one is known, with
    /// the server's own (lowercased) headers taking precedence.
    pub fn headers(&self, server: &Server, token: Option<&str>) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        if let Some(token) = token {
            headers.insert("authorization".to_owned(), format!("Bearer {token}"));
        }
        for (name, value) in &server.headers {
            headers.insert(name.clone(), value.clone());
        }
        headers
    }

    async fn connect(&self, server: &Server, token: Option<&str>) -> Result<HttpMcpSession> {
        let transport = HttpTransport::new(
            self.http.clone(),
            server.url.clone(),
            &self.headers(server, token),
        )?;

        let request = McpRequest::Initialize {
            id: Uuid::new_v4().to_string(),
            params: InitializeParams {
                protocol_version: PROTOCOL_VERSION.to_owned(),
                capabilities: serde_json::json!({}),
                client_info: self.client_info.clone(),
            },
        };
        match transport.send(&request).await? {
            McpResponse::Result {
                result: ResponseResult::Initialize(_),
                ..
            } => Ok(HttpMcpSession::new(server.clone(), transport)),
            McpResponse::Result { .. } => Err(WorkflowError::mcp(
                server.id.as_str(),
                "unexpected response to initialize",
            )),
            McpResponse::Error { error, .. } => Err(WorkflowError::mcp(
                server.id.as_str(),
                format!("initialize failed: {}", error.message),
            )),
        }
    }

    /// Open a session against `server`.
    ///
    /// With `authenticate` set, a token refresh is forced before the first
    /// attempt. A 401 on connect triggers one re-authentication and a single
    /// retry; other HTTP errors propagate unchanged.
    pub async fn session(&self, server: &Server, authenticate: bool) -> Result<HttpMcpSession> {
        let token = if authenticate {
            self.authenticate(server).await?
        } else {
            self.credentials
                .load(server.id.as_str())
                .await?
                .and_then(|credentials| credentials.access_token)
        };

        match self.connect(server, token.as_deref()).await {
            Err(e) if is_http_401(&e) => {
                tracing::debug!(server = %server.id, "MCP server returned 401, re-authenticating");
                let token = self.authenticate(server).await?;
                self.connect(server, token.as_deref()).await
            }
            other => other,
        }
    }

    /// Refresh the access token for `server` from stored credentials.
    /// Returns `None` when no credentials exist or the refresh fails softly.
    pub async fn authenticate(&self, server: &Server) -> Result<Option<String>> {
        let Some(credentials) = self.credentials.load(server.id.as_str()).await? else {
            return Ok(None);
        };
        self.token_refresh(server, credentials).await
    }

    /// Exchange the stored refresh token and persist the result.
    pub async fn token_refresh(
        &self,
        server: &Server,
        credentials: ServerCredentials,
    ) -> Result<Option<String>> {
        let Some(refresh_token) = credentials.refresh_token.clone() else {
            return Ok(None);
        };
        let (Some(client_id), Some(token_endpoint)) = (
            credentials.client_id.clone(),
            credentials.token_endpoint.clone(),
        ) else {
            return Ok(None);
        };

        let oauth = OAuth2AuthorizationCodeClient::new(
            credentials
                .authorization_endpoint
                .clone()
                .unwrap_or_default(),
            token_endpoint,
            client_id,
            credentials.client_secret.clone(),
            credentials.scope.clone(),
        );
        let scopes = split_scopes(credentials.scope.as_deref().unwrap_or(""));

        match oauth
            .exchange_refresh_token(&refresh_token, &scopes)
            .await?
        {
            Some(token) => {
                let mut updated = credentials;
                updated.access_token = Some(token.access_token.clone());
                if token.refresh_token.is_some() {
                    updated.refresh_token = token.refresh_token;
                }
                self.credentials
                    .store(server.id.as_str(), &updated)
                    .await?;
                Ok(Some(token.access_token))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{InitializeResult, ServerInfo};
    use crate::session::McpSession;
    use mcp_workflow_core::model::Slug;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn server_for(uri: &str) -> Server {
        Server::new(Slug::new("hello").unwrap(), format!("{uri}/mcp/"))
    }

    fn initialize_response() -> serde_json::Value {
        serde_json::to_value(McpResponse::Result {
            id: "1".into(),
            result: ResponseResult::Initialize(InitializeResult {
                protocol_version: PROTOCOL_VERSION.into(),
                capabilities: json!({}),
                server_info: ServerInfo {
                    name: "test".into(),
                    version: "0".into(),
                },
            }),
        })
        .unwrap()
    }

    async fn store_with_refresh(token_endpoint: &str) -> Arc<MemoryCredentialsStore> {
        let store = Arc::new(MemoryCredentialsStore::new());
        store
            .store(
                "hello",
                &ServerCredentials {
                    access_token: Some("stale".into()),
                    refresh_token: Some("xxx".into()),
                    client_id: Some("123".into()),
                    client_secret: Some("xyz".into()),
                    authorization_endpoint: Some("https://example.com/authorize".into()),
                    token_endpoint: Some(token_endpoint.to_owned()),
                    scope: Some("doc.read doc.write".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        store
    }

    #[test]
    fn test_headers_server_precedence() {
        let client = McpClient::default();
        let mut server = server_for("https://hello.example.com");
        server
            .headers
            .insert("authorization".into(), "Bot 123".into());

        let headers = client.headers(&server, Some("token"));
        assert_eq!(headers.get("authorization").unwrap(), "Bot 123");

        server.headers.clear();
        let headers = client.headers(&server, Some("token"));
        assert_eq!(headers.get("authorization").unwrap(), "Bearer token");
    }

    #[tokio::test]
    async fn test_session_initializes() {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(initialize_response()))
            .mount(&mock)
            .await;

        let client = McpClient::default();
        let session = client.session(&server_for(&mock.uri()), false).await.unwrap();
        assert_eq!(session.server().id, "hello");
    }

    #[tokio::test]
    async fn test_session_reauthenticates_on_401() {
        let mock = MockServer::start().await;
        // First connect attempt is rejected...
        Mock::given(method("POST"))
            .and(body_string_contains("initialize"))
            .respond_with(ResponseTemplate::new(401))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&mock)
            .await;
        // ...then succeeds once the refreshed token is presented.
        Mock::given(method("POST"))
            .and(body_string_contains("initialize"))
            .and(header("authorization", "Bearer fresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(initialize_response()))
            .with_priority(2)
            .mount(&mock)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "fresh"
            })))
            .with_priority(3)
            .mount(&mock)
            .await;

        let store = store_with_refresh(&format!("{}/token", mock.uri())).await;
        let client = McpClient::new(store.clone());
        let session = client.session(&server_for(&mock.uri()), false).await.unwrap();
        assert_eq!(session.server().id, "hello");

        // The refreshed token was persisted.
        let updated = store.load("hello").await.unwrap().unwrap();
        assert_eq!(updated.access_token.as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn test_session_other_errors_propagate() {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock)
            .await;

        let client = McpClient::default();
        let err = client
            .session(&server_for(&mock.uri()), false)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::HttpStatus { status: 500, .. }
        ));
    }

    #[tokio::test]
    async fn test_authenticate_without_credentials() {
        let client = McpClient::default();
        let token = client
            .authenticate(&server_for("https://hello.example.com"))
            .await
            .unwrap();
        assert!(token.is_none());
    }

    #[tokio::test]
    async fn test_token_refresh() {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("scope=doc.read+doc.write"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "xxx"
            })))
            .mount(&mock)
            .await;

        let store = store_with_refresh(&format!("{}/token", mock.uri())).await;
        let client = McpClient::new(store);
        let server = server_for("https://hello.example.com");
        let credentials = client.credentials().load("hello").await.unwrap().unwrap();
        let token = client.token_refresh(&server, credentials).await.unwrap();
        assert_eq!(token.as_deref(), Some("xxx"));
    }

    #[tokio::test]
    async fn test_token_refresh_failed() {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&mock)
            .await;

        let store = store_with_refresh(&format!("{}/token", mock.uri())).await;
        let client = McpClient::new(store);
        let server = server_for("https://hello.example.com");
        let credentials = client.credentials().load("hello").await.unwrap().unwrap();
        let token = client.token_refresh(&server, credentials).await.unwrap();
        assert!(token.is_none());
    }

    #[test]
    fn test_is_http_401() {
        let err = WorkflowError::HttpStatus {
            status: 401,
            url: "https://example.com".into(),
        };
        assert!(is_http_401(&err));

        let err = WorkflowError::HttpStatus {
            status: 200,
            url: "https://example.com".into(),
        };
        assert!(!is_http_401(&err));
    }
}
