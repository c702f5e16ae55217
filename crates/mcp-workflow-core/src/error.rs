//! Error types shared across the workflow engine crates.
//!
//! All fallible operations in the workspace return [`WorkflowError`]. Variants
//! are grouped by failure class: input validation, session lifecycle,
//! evaluation, transport, and provider errors. The engine converts any error
//! raised by a node handler into a `node-error` trace event followed by a
//! terminal `workflow-failed`.

use std::error::Error as StdError;

/// Primary error type for all workflow operations.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// No workflow with the requested id or name is registered.
    #[error("Workflow not found: {name}")]
    WorkflowNotFound { name: String },

    /// Input data rejected by a JSON schema (workflow event or tool input).
    #[error("Schema validation failed: {message}")]
    SchemaValidation { message: String },

    /// A workflow definition violates a structural invariant.
    #[error("Invalid workflow: {message}")]
    InvalidWorkflow { message: String },

    /// A node handler failed; terminates the run.
    #[error("Node processing error: {message}")]
    Node { message: String },

    /// Session-lifecycle misuse: unknown server key, closed manager, or a
    /// close attempted by a task that does not own the pool.
    #[error("Session error: {message}")]
    Session { message: String },

    /// Expression parsing or evaluation failure.
    #[error("Expression error: {message}")]
    Expression { message: String },

    /// Sandboxed script or function evaluation failure.
    #[error("Script error: {message}")]
    Script { message: String },

    /// Prompt template rendering failure.
    #[error("Template error: {message}")]
    Template { message: String },

    /// Missing or malformed environment configuration.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Error reported by an MCP server.
    #[error("MCP error from '{server}': {message}")]
    Mcp { server: String, message: String },

    /// Model provider API failure.
    #[error("{provider} API error: {message}")]
    Api {
        provider: String,
        message: String,
        status: Option<u16>,
    },

    /// Non-2xx HTTP response.
    #[error("HTTP status {status} from {url}")]
    HttpStatus { status: u16, url: String },

    /// HTTP transport failure.
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON encode/decode failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WorkflowError {
    pub fn node(message: impl Into<String>) -> Self {
        Self::Node {
            message: message.into(),
        }
    }

    pub fn session(message: impl Into<String>) -> Self {
        Self::Session {
            message: message.into(),
        }
    }

    pub fn expression(message: impl Into<String>) -> Self {
        Self::Expression {
            message: message.into(),
        }
    }

    pub fn script(message: impl Into<String>) -> Self {
        Self::Script {
            message: message.into(),
        }
    }

    pub fn schema(message: impl Into<String>) -> Self {
        Self::SchemaValidation {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn mcp(server: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Mcp {
            server: server.into(),
            message: message.into(),
        }
    }

    pub fn api(provider: impl Into<String>, message: impl Into<String>, status: Option<u16>) -> Self {
        Self::Api {
            provider: provider.into(),
            message: message.into(),
            status,
        }
    }

    /// Short tag identifying the error class, used as `exc_type` in
    /// `node-error` trace events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::WorkflowNotFound { .. } => "WorkflowNotFound",
            Self::SchemaValidation { .. } => "SchemaValidation",
            Self::InvalidWorkflow { .. } => "InvalidWorkflow",
            Self::Node { .. } => "Node",
            Self::Session { .. } => "Session",
            Self::Expression { .. } => "Expression",
            Self::Script { .. } => "Script",
            Self::Template { .. } => "Template",
            Self::Configuration { .. } => "Configuration",
            Self::Mcp { .. } => "Mcp",
            Self::Api { .. } => "Api",
            Self::HttpStatus { .. } => "HttpStatus",
            Self::Http(_) => "Http",
            Self::Serialization(_) => "Serialization",
        }
    }

    /// HTTP status carried by this error or any error in its source chain.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            Self::Api { status, .. } => *status,
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => {
                let mut source = self.source();
                while let Some(err) = source {
                    if let Some(e) = err.downcast_ref::<reqwest::Error>() {
                        return e.status().map(|s| s.as_u16());
                    }
                    source = err.source();
                }
                None
            }
        }
    }

    /// The error source chain rendered outermost-first, capped at `limit`
    /// frames. Carried in the `traceback` field of `node-error` events.
    pub fn trace_frames(&self, limit: usize) -> Vec<String> {
        let mut frames = vec![self.to_string()];
        let mut source = self.source();
        while let Some(err) = source {
            if frames.len() >= limit {
                break;
            }
            frames.push(err.to_string());
            source = err.source();
        }
        frames
    }
}

pub type Result<T> = std::result::Result<T, WorkflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_variant() {
        assert_eq!(WorkflowError::session("closed").kind(), "Session");
        assert_eq!(WorkflowError::node("boom").kind(), "Node");
    }

    #[test]
    fn test_http_status() {
        let err = WorkflowError::HttpStatus {
            status: 401,
            url: "https://example.com/mcp/".into(),
        };
        assert_eq!(err.http_status(), Some(401));
        assert_eq!(WorkflowError::node("x").http_status(), None);
    }

    #[test]
    fn test_trace_frames_capped() {
        let err = WorkflowError::script("bad expression");
        let frames = err.trace_frames(64);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].contains("bad expression"));
    }
}
