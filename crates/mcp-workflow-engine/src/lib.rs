//! # MCP Workflow Engine
//!
//! The execution engine for declarative MCP workflows:
//!
//! - [`engine::WorkflowEngine`] walks the node graph and emits a lazy trace
//!   stream
//! - [`handler`] holds the open handler registry and the built-in node
//!   handlers (MCP tool/resource/prompt, switch/loop, function/script,
//!   transform/pick, and the anthropic/openai/cloudflare model calls)
//! - [`sessions::SessionManager`] is the per-run, task-owned pool of MCP
//!   sessions
//! - [`testing`] provides scriptable session stubs for handler tests

pub mod engine;
pub mod handler;
pub mod sessions;
pub mod testing;

pub use engine::{TraceStream, WorkflowEngine};
pub use handler::{HandlerContext, HandlerOutput, HandlerRegistry, NodeHandler};
pub use sessions::{SessionManager, SessionProvider};
