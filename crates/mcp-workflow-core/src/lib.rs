//! # MCP Workflow Core
//!
//! Core primitives for the MCP workflow engine:
//!
//! - The workflow data model: [`model::Workflow`], the `type`-tagged
//!   [`model::Node`] union, [`model::Server`] and [`model::Rule`]
//! - Trace events emitted during a run ([`trace`])
//! - Expression evaluation over the data document ([`expr`])
//! - The bounded script sandbox backing function/script nodes ([`sandbox`])
//! - Dotted-path mutation helpers ([`paths`]), JSON-schema validation
//!   ([`schema`]) and prompt templating ([`template`])
//!
//! The engine, handlers, MCP client and server surfaces live in the sibling
//! crates and are built entirely on these types.

pub mod error;
pub mod expr;
pub mod model;
pub mod paths;
pub mod sandbox;
pub mod schema;
pub mod template;
pub mod trace;

pub use error::{Result, WorkflowError};
pub use model::{Document, Node, Rule, Server, Slug, Workflow};
pub use trace::{EdgeResult, TraceEvent};
