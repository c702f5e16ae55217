//! Streaming-HTTP transport for MCP requests.
//!
//! Each request is a JSON POST to the server url with the session's headers
//! attached. Non-2xx responses surface as [`WorkflowError::HttpStatus`] so
//! the client can recognize a 401 and re-authenticate.

use std::collections::HashMap;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use mcp_workflow_core::error::{Result, WorkflowError};

use crate::protocol::{McpRequest, McpResponse};

#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    url: String,
    headers: HeaderMap,
}

impl HttpTransport {
    pub fn new(
        http: reqwest::Client,
        url: impl Into<String>,
        headers: &HashMap<String, String>,
    ) -> Result<Self> {
        let mut header_map = HeaderMap::new();
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                WorkflowError::configuration(format!("invalid header name {name:?}: {e}"))
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                WorkflowError::configuration(format!("invalid header value for {name}: {e}"))
            })?;
            header_map.insert(name, value);
        }
        Ok(Self {
            http,
            url: url.into(),
            headers: header_map,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn send(&self, request: &McpRequest) -> Result<McpResponse> {
        let response = self
            .http
            .post(&self.url)
            .headers(self.headers.clone())
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(WorkflowError::HttpStatus {
                status: status.as_u16(),
                url: self.url.clone(),
            });
        }
        Ok(response.json().await?)
    }
}
