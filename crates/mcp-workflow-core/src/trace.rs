//! Trace events emitted during a workflow run.
//!
//! The trace stream is part of the public surface: a run always begins with
//! `workflow-start` and terminates with exactly one of `workflow-end` or
//! `workflow-failed`. Timestamps are monotonic-clock reads (seconds since an
//! arbitrary process-wide origin); `duration = end - start`.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::WorkflowError;
use crate::model::{Document, ModelUsage, Node, Workflow};

static CLOCK_ORIGIN: Lazy<Instant> = Lazy::new(Instant::now);

/// Seconds elapsed on the process monotonic clock.
pub fn monotonic_now() -> f64 {
    CLOCK_ORIGIN.elapsed().as_secs_f64()
}

/// Frames kept from an error source chain in `node-error` events.
pub const MAX_TRACE_FRAMES: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRef {
    pub id: String,
    pub name: String,
}

impl WorkflowRef {
    pub fn from_workflow(workflow: &Workflow) -> Self {
        Self {
            id: workflow.id.to_string(),
            name: workflow.display_name().to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRef {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: String,
}

impl NodeRef {
    pub fn from_node(node: &Node) -> Self {
        Self {
            id: node.id().to_owned(),
            name: node.name().to_owned(),
            node_type: node.node_type().to_owned(),
        }
    }
}

/// One outgoing result of a node visit: the data document bound for `edge`.
/// A null edge drops the branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeResult {
    pub edge: Option<String>,
    pub data: Document,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum TraceEvent {
    #[serde(rename = "workflow-start")]
    WorkflowStart {
        timestamp: f64,
        workflow: WorkflowRef,
        data: Document,
    },
    #[serde(rename = "workflow-schema-error")]
    WorkflowSchemaError {
        timestamp: f64,
        workflow: WorkflowRef,
        message: String,
    },
    #[serde(rename = "workflow-end")]
    WorkflowEnd {
        timestamp: f64,
        workflow: WorkflowRef,
        duration: f64,
        usage: Vec<ModelUsage>,
    },
    #[serde(rename = "workflow-failed")]
    WorkflowFailed {
        timestamp: f64,
        workflow: WorkflowRef,
        duration: f64,
        usage: Vec<ModelUsage>,
    },
    #[serde(rename = "node-start")]
    NodeStart {
        timestamp: f64,
        node: NodeRef,
        data: Document,
    },
    #[serde(rename = "node-end")]
    NodeEnd {
        timestamp: f64,
        node: NodeRef,
        results: Vec<EdgeResult>,
    },
    #[serde(rename = "node-error")]
    NodeError {
        timestamp: f64,
        node: NodeRef,
        message: String,
        exc_type: String,
        traceback: Vec<String>,
    },
    #[serde(rename = "default")]
    Default {
        timestamp: f64,
        node: NodeRef,
        data: Document,
    },
}

impl TraceEvent {
    pub fn node_error(node: NodeRef, error: &WorkflowError) -> Self {
        Self::NodeError {
            timestamp: monotonic_now(),
            node,
            message: error.to_string(),
            exc_type: error.kind().to_owned(),
            traceback: error.trace_frames(MAX_TRACE_FRAMES),
        }
    }

    /// The wire tag for this event.
    pub fn action(&self) -> &'static str {
        match self {
            Self::WorkflowStart { .. } => "workflow-start",
            Self::WorkflowSchemaError { .. } => "workflow-schema-error",
            Self::WorkflowEnd { .. } => "workflow-end",
            Self::WorkflowFailed { .. } => "workflow-failed",
            Self::NodeStart { .. } => "node-start",
            Self::NodeEnd { .. } => "node-end",
            Self::NodeError { .. } => "node-error",
            Self::Default { .. } => "default",
        }
    }

    pub fn timestamp(&self) -> f64 {
        match self {
            Self::WorkflowStart { timestamp, .. }
            | Self::WorkflowSchemaError { timestamp, .. }
            | Self::WorkflowEnd { timestamp, .. }
            | Self::WorkflowFailed { timestamp, .. }
            | Self::NodeStart { timestamp, .. }
            | Self::NodeEnd { timestamp, .. }
            | Self::NodeError { timestamp, .. }
            | Self::Default { timestamp, .. } => *timestamp,
        }
    }
}
