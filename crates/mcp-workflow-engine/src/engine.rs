//! Workflow execution engine.
//!
//! `run_workflow` resolves a workflow by id (then name), merges the caller's
//! data over the workflow's base data, and returns a lazy stream of trace
//! events. The traversal is depth-first from the start node: every visit is
//! bracketed by `node-start` and `node-end` (or `node-error`), handler output
//! fans out across the node's edges, and each non-null edge that resolves to
//! a node is visited in turn. The stream terminates with exactly one of
//! `workflow-end` or `workflow-failed`; the session pool is released on
//! every exit path.

use std::pin::Pin;
use std::sync::Arc;

use futures_util::Stream;
use serde_json::Value;
use uuid::Uuid;

use mcp_workflow_client::McpClient;
use mcp_workflow_core::error::{Result, WorkflowError};
use mcp_workflow_core::model::{Document, Node, Workflow};
use mcp_workflow_core::schema;
use mcp_workflow_core::trace::{monotonic_now, EdgeResult, NodeRef, TraceEvent, WorkflowRef};

use crate::handler::{HandlerContext, HandlerOutput, HandlerRegistry};
use crate::sessions::SessionManager;

pub type TraceStream = Pin<Box<dyn Stream<Item = TraceEvent> + Send>>;

pub struct WorkflowEngine {
    workflows: Arc<Vec<Workflow>>,
    client: Arc<McpClient>,
    handlers: Arc<HandlerRegistry>,
}

impl WorkflowEngine {
    pub fn new(workflows: Vec<Workflow>) -> Self {
        Self {
            workflows: Arc::new(workflows),
            client: Arc::new(McpClient::default()),
            handlers: Arc::new(HandlerRegistry::with_defaults()),
        }
    }

    pub fn with_client(mut self, client: Arc<McpClient>) -> Self {
        self.client = client;
        self
    }

    pub fn with_handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = Arc::new(handlers);
        self
    }

    pub fn workflows(&self) -> &[Workflow] {
        &self.workflows
    }

    /// Resolve a workflow by id first, then by name.
    pub fn get_workflow(&self, name: &str) -> Option<&Workflow> {
        self.workflows
            .iter()
            .find(|workflow| workflow.id == *name)
            .or_else(|| {
                self.workflows
                    .iter()
                    .find(|workflow| workflow.name.as_deref() == Some(name))
            })
    }

    /// Run a workflow, producing a finite stream of trace events.
    ///
    /// An unknown workflow name is an error to the caller; no trace is
    /// emitted for it.
    pub fn run_workflow(&self, name: &str, data: Option<Document>) -> Result<TraceStream> {
        let Some(workflow) = self.get_workflow(name) else {
            tracing::error!(workflow = %name, "workflow not found");
            return Err(WorkflowError::WorkflowNotFound {
                name: name.to_owned(),
            });
        };
        let workflow = Arc::new(workflow.clone());
        let client = self.client.clone();
        let handlers = self.handlers.clone();

        let mut payload = workflow.data.clone().unwrap_or_default();
        if let Some(data) = data {
            payload.extend(data);
        }

        Ok(Box::pin(run(workflow, client, handlers, payload)))
    }
}

fn run(
    workflow: Arc<Workflow>,
    client: Arc<McpClient>,
    handlers: Arc<HandlerRegistry>,
    payload: Document,
) -> impl Stream<Item = TraceEvent> {
    async_stream::stream! {
        let start = monotonic_now();
        let mut usage = Vec::new();
        let workflow_ref = WorkflowRef::from_workflow(&workflow);
        tracing::info!(workflow = %workflow.display_name(), "running workflow");

        yield TraceEvent::WorkflowStart {
            timestamp: start,
            workflow: workflow_ref.clone(),
            data: payload.clone(),
        };

        if let Some(json_schema) = workflow.event.as_ref().and_then(|event| event.json_schema.as_ref()) {
            if let Err(error) = schema::validate(json_schema, &Value::Object(payload.clone())) {
                tracing::warn!(workflow = %workflow.display_name(), error = %error, "input rejected by event schema");
                yield TraceEvent::WorkflowSchemaError {
                    timestamp: monotonic_now(),
                    workflow: workflow_ref.clone(),
                    message: error.to_string(),
                };
                let end = monotonic_now();
                yield TraceEvent::WorkflowFailed {
                    timestamp: end,
                    workflow: workflow_ref,
                    duration: end - start,
                    usage,
                };
                return;
            }
        }

        let start_node = workflow
            .start_node_id
            .as_deref()
            .and_then(|id| workflow.node(id));
        let Some(start_node) = start_node else {
            // An empty workflow completes successfully.
            let end = monotonic_now();
            tracing::info!(workflow = %workflow.display_name(), "empty workflow completed");
            yield TraceEvent::WorkflowEnd {
                timestamp: end,
                workflow: workflow_ref,
                duration: end - start,
                usage,
            };
            return;
        };

        let sessions = SessionManager::new(workflow.clone(), client);
        sessions.preload().await;

        let mut failed = false;
        let mut stack: Vec<(String, Document)> = vec![(start_node.id().to_owned(), payload)];

        while let Some((node_id, data)) = stack.pop() {
            let Some(node) = workflow.node(&node_id) else { continue };
            let node_ref = NodeRef::from_node(node);
            let action_id = Uuid::new_v4().to_string();

            let results = match handlers.get(node.node_type()) {
                Some(handler) => {
                    yield TraceEvent::NodeStart {
                        timestamp: monotonic_now(),
                        node: node_ref.clone(),
                        data: data.clone(),
                    };
                    let mut ctx = HandlerContext {
                        workflow: &workflow,
                        node,
                        sessions: &sessions,
                        usage: &mut usage,
                        action_id: &action_id,
                    };
                    match handler.call(data, &mut ctx).await {
                        Ok(output) => {
                            let results = normalize_results(node, output);
                            yield TraceEvent::NodeEnd {
                                timestamp: monotonic_now(),
                                node: node_ref,
                                results: results.clone(),
                            };
                            results
                        }
                        Err(error) => {
                            tracing::error!(node = %node_id, error = %error, "node handler failed");
                            yield TraceEvent::node_error(node_ref, &error);
                            failed = true;
                            break;
                        }
                    }
                }
                None => {
                    // No handler for this node type: identity passthrough.
                    yield TraceEvent::Default {
                        timestamp: monotonic_now(),
                        node: node_ref,
                        data: data.clone(),
                    };
                    normalize_results(node, HandlerOutput::Data(data))
                }
            };

            // Reverse push so the first edge is visited first.
            for result in results.into_iter().rev() {
                if let Some(edge) = result.edge {
                    if workflow.node(&edge).is_some() {
                        stack.push((edge, result.data));
                    }
                }
            }
        }

        if let Err(error) = sessions.close().await {
            tracing::warn!(error = %error, "failed to close session pool");
        }

        let end = monotonic_now();
        let duration = end - start;
        if failed {
            tracing::info!(
                workflow = %workflow.display_name(),
                duration,
                "workflow failed"
            );
            yield TraceEvent::WorkflowFailed {
                timestamp: end,
                workflow: workflow_ref,
                duration,
                usage,
            };
        } else {
            tracing::info!(
                workflow = %workflow.display_name(),
                duration,
                "workflow completed successfully"
            );
            yield TraceEvent::WorkflowEnd {
                timestamp: end,
                workflow: workflow_ref,
                duration,
                usage,
            };
        }
    }
}

/// Normalize handler output into explicit per-edge results: a bare document
/// broadcasts to every non-null edge.
fn normalize_results(node: &Node, output: HandlerOutput) -> Vec<EdgeResult> {
    match output {
        HandlerOutput::Data(data) => node
            .edges()
            .iter()
            .flatten()
            .map(|edge| EdgeResult {
                edge: Some(edge.to_string()),
                data: data.clone(),
            })
            .collect(),
        HandlerOutput::Results(results) => results,
    }
}
