//! The node union.
//!
//! Nodes are any action taken on the data document: MCP tools, resources and
//! prompts, control flow (switch/loop), evaluation (function/script/
//! transform/pick) and model calls. The union is discriminated by the `type`
//! field; node types the engine does not know are preserved as
//! [`OtherNode`] so they round-trip and reach the default handler. Extra
//! fields on any node are retained.

use std::collections::BTreeMap;

use serde::de::Error as DeError;
use serde::ser::Error as SerError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use super::rules::Rule;
use super::{Document, Slug};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolNode {
    pub id: Slug,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Document>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edges: Vec<Option<Slug>>,
    pub server_id: String,
    pub tool_name: String,
    /// Where the output lands in the data document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member: Option<String>,
    /// Unwrap a single-element JSON list result.
    #[serde(default)]
    pub structured_output: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceNode {
    pub id: Slug,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Document>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edges: Vec<Option<Slug>>,
    pub server_id: String,
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptNode {
    pub id: Slug,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Document>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edges: Vec<Option<Slug>>,
    pub server_id: String,
    pub prompt_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Switch node: selects edges by rule matches on `expr(data)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchNode {
    pub id: Slug,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Document>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edges: Vec<Option<Slug>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expr: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<Rule>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Loop node: fans out each value of a list at `expr(data)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopNode {
    pub id: Slug,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Document>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edges: Vec<Option<Slug>>,
    pub expr: String,
    /// Member that holds the per-iteration value; defaults to `__each__`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<Rule>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionNode {
    pub id: Slug,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Document>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edges: Vec<Option<Slug>>,
    pub function: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<Rule>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptNode {
    pub id: Slug,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Document>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edges: Vec<Option<Slug>>,
    pub script: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformKind {
    Move,
    Set,
    Delete,
}

/// One path mutation applied by a transform node.
///
/// `move` relocates `source` to `target`; `set` evaluates `source` as an
/// expression and writes the result at `target`; `delete` removes `source`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    #[serde(rename = "type")]
    pub transform_type: TransformKind,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Optional cast: `string | number | integer | boolean`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datatype: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformNode {
    pub id: Slug,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Document>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edges: Vec<Option<Slug>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transforms: Vec<Transform>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Pick node: builds a fresh document from named expression results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickNode {
    pub id: Slug,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Document>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edges: Vec<Option<Slug>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub expressions: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Which workflow servers a model node forwards to the provider.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeServers {
    /// The literal `"*"`: all workflow servers.
    All,
    Ids(Vec<String>),
}

impl Serialize for NodeServers {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::All => serializer.serialize_str("*"),
            Self::Ids(ids) => ids.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for NodeServers {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::String(s) if s == "*" => Ok(Self::All),
            Value::String(s) => Err(D::Error::custom(format!(
                "expected \"*\" or a list of server ids, got {s:?}"
            ))),
            value @ Value::Array(_) => {
                let ids = serde_json::from_value(value).map_err(D::Error::custom)?;
                Ok(Self::Ids(ids))
            }
            other => Err(D::Error::custom(format!(
                "expected \"*\" or a list of server ids, got {other}"
            ))),
        }
    }
}

/// Provider model-call node (`anthropic`, `openai`, `cloudflare`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelNode {
    pub id: Slug,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Document>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edges: Vec<Option<Slug>>,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub servers: Option<NodeServers>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_json_schema: Option<bool>,
    #[serde(default = "default_true")]
    pub include_message_in_output: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ModelNode {
    /// Whether structured output was requested, explicitly or by supplying a
    /// schema.
    pub fn wants_structured_output(&self) -> bool {
        self.use_json_schema.unwrap_or(self.json_schema.is_some())
    }

    /// The schema to request; a permissive object schema when none is set.
    pub fn structured_output_schema(&self) -> Value {
        self.json_schema
            .clone()
            .unwrap_or_else(|| serde_json::json!({"type": "object"}))
    }
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_true() -> bool {
    true
}

/// A node whose `type` has no built-in meaning; handled by the engine's
/// default passthrough and preserved verbatim on re-serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OtherNode {
    /// The original `type` tag, restored during serialization.
    #[serde(skip)]
    pub node_type: String,
    pub id: Slug,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Document>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edges: Vec<Option<Slug>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Common node fields exposed uniformly across the union.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeCommon<'a> {
    pub id: &'a Slug,
    pub name: &'a str,
    pub edges: &'a [Option<Slug>],
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Tool(ToolNode),
    Resource(ResourceNode),
    Prompt(PromptNode),
    Switch(SwitchNode),
    Loop(LoopNode),
    Function(FunctionNode),
    Script(ScriptNode),
    Transform(TransformNode),
    Pick(PickNode),
    Anthropic(ModelNode),
    OpenAi(ModelNode),
    Cloudflare(ModelNode),
    Other(OtherNode),
}

macro_rules! for_each_node {
    ($self:expr, $n:ident => $body:expr) => {
        match $self {
            Node::Tool($n) => $body,
            Node::Resource($n) => $body,
            Node::Prompt($n) => $body,
            Node::Switch($n) => $body,
            Node::Loop($n) => $body,
            Node::Function($n) => $body,
            Node::Script($n) => $body,
            Node::Transform($n) => $body,
            Node::Pick($n) => $body,
            Node::Anthropic($n) => $body,
            Node::OpenAi($n) => $body,
            Node::Cloudflare($n) => $body,
            Node::Other($n) => $body,
        }
    };
}

impl Node {
    pub fn node_type(&self) -> &str {
        match self {
            Node::Tool(_) => "tool",
            Node::Resource(_) => "resource",
            Node::Prompt(_) => "prompt",
            Node::Switch(_) => "switch",
            Node::Loop(_) => "loop",
            Node::Function(_) => "function",
            Node::Script(_) => "script",
            Node::Transform(_) => "transform",
            Node::Pick(_) => "pick",
            Node::Anthropic(_) => "anthropic",
            Node::OpenAi(_) => "openai",
            Node::Cloudflare(_) => "cloudflare",
            Node::Other(n) => &n.node_type,
        }
    }

    pub fn id(&self) -> &str {
        for_each_node!(self, n => n.id.as_str())
    }

    pub fn name(&self) -> &str {
        for_each_node!(self, n => &n.name)
    }

    pub fn edges(&self) -> &[Option<Slug>] {
        for_each_node!(self, n => &n.edges)
    }

    pub fn common(&self) -> NodeCommon<'_> {
        for_each_node!(self, n => NodeCommon { id: &n.id, name: &n.name, edges: &n.edges })
    }

    /// Extra (unrecognized) fields retained from the wire format.
    pub fn extra(&self) -> &Map<String, Value> {
        for_each_node!(self, n => &n.extra)
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let tag = self.node_type().to_owned();
        let mut value = for_each_node!(self, n => serde_json::to_value(n))
            .map_err(S::Error::custom)?;
        match value {
            Value::Object(ref mut map) => {
                map.insert("type".to_owned(), Value::String(tag));
            }
            _ => return Err(S::Error::custom("node did not serialize to an object")),
        }
        value.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Node {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let mut value = Value::deserialize(deserializer)?;
        let tag = {
            let map = value
                .as_object_mut()
                .ok_or_else(|| D::Error::custom("node must be a JSON object"))?;
            match map.remove("type") {
                Some(Value::String(tag)) => tag,
                _ => return Err(D::Error::custom("node is missing a string 'type' tag")),
            }
        };
        let node = match tag.as_str() {
            "tool" => Node::Tool(serde_json::from_value(value).map_err(D::Error::custom)?),
            "resource" => Node::Resource(serde_json::from_value(value).map_err(D::Error::custom)?),
            "prompt" => Node::Prompt(serde_json::from_value(value).map_err(D::Error::custom)?),
            "switch" => Node::Switch(serde_json::from_value(value).map_err(D::Error::custom)?),
            "loop" => Node::Loop(serde_json::from_value(value).map_err(D::Error::custom)?),
            "function" => Node::Function(serde_json::from_value(value).map_err(D::Error::custom)?),
            "script" => Node::Script(serde_json::from_value(value).map_err(D::Error::custom)?),
            "transform" => {
                Node::Transform(serde_json::from_value(value).map_err(D::Error::custom)?)
            }
            "pick" => Node::Pick(serde_json::from_value(value).map_err(D::Error::custom)?),
            "anthropic" => Node::Anthropic(serde_json::from_value(value).map_err(D::Error::custom)?),
            "openai" => Node::OpenAi(serde_json::from_value(value).map_err(D::Error::custom)?),
            "cloudflare" => {
                Node::Cloudflare(serde_json::from_value(value).map_err(D::Error::custom)?)
            }
            _ => {
                let mut node: OtherNode =
                    serde_json::from_value(value).map_err(D::Error::custom)?;
                node.node_type = tag;
                Node::Other(node)
            }
        };
        Ok(node)
    }
}
