//! # MCP Workflow Client
//!
//! The MCP client layer consumed by the workflow engine:
//!
//! - [`protocol`]: the MCP wire types (tools, resources, prompts)
//! - [`transport`]: streaming-HTTP request transport
//! - [`session`]: the [`session::McpSession`] interface and its HTTP
//!   implementation with cached catalogs
//! - [`client`]: [`client::McpClient`], which opens sessions with
//!   credential-derived headers and a single re-authentication on HTTP 401
//! - [`oauth`]: OAuth2 authorization-code client (PKCE, refresh, discovery,
//!   dynamic registration)
//! - [`credentials`]: per-server credential persistence

pub mod client;
pub mod credentials;
pub mod oauth;
pub mod protocol;
pub mod session;
pub mod transport;

pub use client::{is_http_401, McpClient};
pub use credentials::{CredentialsStore, FileCredentialsStore, MemoryCredentialsStore, ServerCredentials};
pub use oauth::{split_scopes, OAuth2AuthorizationCodeClient, OAuthToken};
pub use session::{HttpMcpSession, McpSession};
