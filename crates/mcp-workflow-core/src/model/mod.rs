//! Workflow data model.
//!
//! A [`Workflow`] is a JSON-described graph: typed [`Node`]s connected by
//! named edges, plus the MCP [`Server`]s the workflow may talk to. All
//! polymorphic types are `type`-tagged unions (see [`node`] and [`rules`]);
//! unknown node types and extra fields survive a decode/encode round trip.

pub mod node;
pub mod rules;

use std::collections::HashMap;
use std::fmt;

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, WorkflowError};

pub use node::{
    FunctionNode, LoopNode, ModelNode, Node, NodeCommon, NodeServers, OtherNode, PickNode,
    PromptNode, ResourceNode, ScriptNode, SwitchNode, ToolNode, Transform, TransformKind,
    TransformNode,
};
pub use rules::Rule;

/// The mutable data document threaded through a workflow run.
pub type Document = Map<String, Value>;

/// Identifier used for workflows, nodes, servers and edges.
///
/// Matches `^[a-z0-9_\-]+$` with at most 255 characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Slug(String);

impl Slug {
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if !Self::is_valid(&value) {
            return Err(WorkflowError::InvalidWorkflow {
                message: format!("invalid slug: {value:?}"),
            });
        }
        Ok(Self(value))
    }

    /// Generate a random slug (lowercase hyphenless uuid).
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn is_valid(value: &str) -> bool {
        !value.is_empty()
            && value.len() <= 255
            && value
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-')
    }
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Slug {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for Slug {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Slug {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl<'de> Deserialize<'de> for Slug {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        if !Self::is_valid(&value) {
            return Err(D::Error::custom(format!("invalid slug: {value:?}")));
        }
        Ok(Self(value))
    }
}

/// Event that starts a workflow. `json_schema`, when present, validates the
/// merged input data before traversal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowEvent {
    pub name: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Document>,
}

/// A streaming-HTTP MCP server this workflow can use.
///
/// Header names are folded to lowercase at ingest. Inlining an
/// `authorization` header works but logs a warning: the credentials manager
/// is the preferred place for tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Server {
    pub id: Slug,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub url: String,
    #[serde(default, deserialize_with = "deserialize_headers")]
    pub headers: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Document>,
}

impl Server {
    pub fn new(id: Slug, url: impl Into<String>) -> Self {
        Self {
            id,
            name: None,
            url: url.into(),
            headers: HashMap::new(),
            metadata: None,
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or_else(|| self.id.as_str())
    }
}

fn deserialize_headers<'de, D>(
    deserializer: D,
) -> std::result::Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = HashMap::<String, String>::deserialize(deserializer)?;
    let headers: HashMap<String, String> = raw
        .into_iter()
        .map(|(k, v)| (k.to_lowercase(), v))
        .collect();
    if headers.contains_key("authorization") {
        tracing::warn!(
            "server config inlines an authorization header; prefer the credentials manager"
        );
    }
    Ok(headers)
}

/// Token accounting record appended by model-call handlers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelUsage {
    pub ref_id: String,
    pub model: String,
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(flatten)]
    pub extra: Document,
}

impl ModelUsage {
    pub fn new(ref_id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            ref_id: ref_id.into(),
            model: model.into(),
            input_tokens: 0,
            output_tokens: 0,
            extra: Document::new(),
        }
    }
}

/// A named, JSON-described graph of nodes with typed behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: Slug,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<WorkflowEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<Node>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub servers: Vec<Server>,
    /// Initial data for this workflow; caller-supplied data overrides it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Document>,
    /// Application metadata, not consulted by the engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Document>,
}

impl Workflow {
    pub fn new(id: Slug) -> Self {
        Self {
            id,
            name: None,
            description: None,
            event: None,
            start_node_id: None,
            nodes: Vec::new(),
            servers: Vec::new(),
            data: None,
            metadata: None,
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or_else(|| self.id.as_str())
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id() == id)
    }

    pub fn server(&self, id: &str) -> Option<&Server> {
        self.servers.iter().find(|s| s.id == *id)
    }

    /// Check the structural invariant that every non-null edge references a
    /// node id present in `nodes`.
    pub fn validate(&self) -> Result<()> {
        for node in &self.nodes {
            for edge in node.edges().iter().flatten() {
                if self.node(edge.as_str()).is_none() {
                    return Err(WorkflowError::InvalidWorkflow {
                        message: format!(
                            "node '{}' references unknown edge target '{}'",
                            node.id(),
                            edge
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}
