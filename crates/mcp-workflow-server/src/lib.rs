//! # MCP Workflow Server
//!
//! The serving side of the workflow engine:
//!
//! - [`mcp::WorkflowMcpServer`]: the engine's own MCP surface, a `workflow`
//!   tool streaming trace events and `workflow://{id}/` resources
//! - [`auth`]: OAuth authorization-server providers (pass-thru and
//!   third-party) minting HS256 JWT access/refresh tokens
//! - [`routes::redirect_route`]: the OAuth callback joining the two halves
//!   of the third-party flow
//! - [`cache`]: the async TTL cache backing in-flight authorization state

pub mod auth;
pub mod cache;
pub mod error;
pub mod mcp;
pub mod routes;

pub use auth::pass_thru::PassThruAuthServerProvider;
pub use auth::third_party::ThirdPartyAuthServerProvider;
pub use auth::{AuthServerProvider, ClientManager, MemoryClientManager, TokenExchanger};
pub use cache::{AsyncCache, MemoryCache};
pub use error::ServerError;
pub use mcp::WorkflowMcpServer;
