//! Server-side error type.
//!
//! Auth provider failures surface to HTTP callers as a status code; the
//! `Http` variant carries it. Everything engine-side converts via `From`.

use mcp_workflow_core::error::WorkflowError;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Surface an HTTP status to the caller (e.g. 500 for upstream OAuth
    /// failures).
    #[error("HTTP {status}")]
    Http { status: u16 },

    #[error("not supported: {0}")]
    NotSupported(String),

    #[error("token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),
}

impl ServerError {
    pub fn http(status: u16) -> Self {
        Self::Http { status }
    }

    pub fn status(&self) -> u16 {
        match self {
            Self::Http { status } => *status,
            Self::NotSupported(_) => 501,
            Self::Token(_) => 401,
            Self::Workflow(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;
