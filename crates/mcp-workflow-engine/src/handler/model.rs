//! Shared plumbing for the provider model-call handlers.

use serde_json::{json, Value};

use mcp_workflow_core::error::{Result, WorkflowError};
use mcp_workflow_core::model::{Document, ModelNode, ModelUsage, NodeServers, Server, Workflow};
use mcp_workflow_core::template;

/// Read a required provider credential from the environment.
pub(crate) fn env_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| WorkflowError::configuration(format!("{name} not set")))
}

/// Build the message list: `data.messages` wins, then the node's own
/// messages, then a single templated user message from
/// `data.prompt`/`node.prompt`. An empty list means no messages.
pub(crate) fn build_messages(data: &Document, node: &ModelNode) -> Result<Vec<Value>> {
    if let Some(Value::Array(messages)) = data.get("messages") {
        return Ok(messages.clone());
    }
    if let Some(messages) = &node.messages {
        if !messages.is_empty() {
            return Ok(messages.clone());
        }
    }

    let prompt = data
        .get("prompt")
        .and_then(Value::as_str)
        .or(node.prompt.as_deref());
    match prompt {
        Some(prompt) => {
            let rendered = template::render(prompt, data)?;
            Ok(vec![json!({"role": "user", "content": rendered})])
        }
        None => Ok(Vec::new()),
    }
}

/// The templated system prompt, from `data.system` or `node.system`.
pub(crate) fn build_system(data: &Document, node: &ModelNode) -> Result<Option<String>> {
    let system = data
        .get("system")
        .and_then(Value::as_str)
        .or(node.system.as_deref());
    match system {
        Some(system) => Ok(Some(template::render(system, data)?)),
        None => Ok(None),
    }
}

/// Workflow servers forwarded to the provider. Without a `servers` field on
/// the node (or with `"*"`) every workflow server is forwarded; otherwise
/// only the listed ids, warning on (and dropping) unknown ones.
pub(crate) fn selected_servers<'a>(workflow: &'a Workflow, node: &ModelNode) -> Vec<&'a Server> {
    match &node.servers {
        None | Some(NodeServers::All) => workflow.servers.iter().collect(),
        Some(NodeServers::Ids(ids)) => {
            let mut servers = Vec::new();
            for id in ids {
                match workflow.server(id) {
                    Some(server) => servers.push(server),
                    None => {
                        tracing::warn!(server = %id, node = %node.id, "unknown server id on model node");
                    }
                }
            }
            servers
        }
    }
}

/// Build a `ModelUsage` record from a provider usage object, keeping any
/// extra provider fields.
pub(crate) fn usage_record(
    action_id: &str,
    model: &str,
    usage: Option<&Value>,
    input_key: &str,
    output_key: &str,
) -> ModelUsage {
    let mut record = ModelUsage::new(action_id, model);
    if let Some(Value::Object(map)) = usage {
        for (key, value) in map {
            if key == input_key {
                record.input_tokens = value.as_u64().unwrap_or(0);
            } else if key == output_key {
                record.output_tokens = value.as_u64().unwrap_or(0);
            } else {
                record.extra.insert(key.clone(), value.clone());
            }
        }
    }
    record
}

/// Merge structured model output into the document: under `member` when
/// set, else shallow-merged (non-object values require a member).
pub(crate) fn merge_structured(
    data: &mut Document,
    value: Value,
    member: Option<&str>,
) -> Result<()> {
    match member {
        Some(member) => {
            data.insert(member.to_owned(), value);
            Ok(())
        }
        None => match value {
            Value::Object(map) => {
                data.extend(map);
                Ok(())
            }
            other => Err(WorkflowError::node(format!(
                "structured output is not an object ({other}); set 'member' to keep it"
            ))),
        },
    }
}
