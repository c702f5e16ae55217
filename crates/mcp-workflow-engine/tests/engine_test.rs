//! End-to-end engine tests: trace shape, fan-out, failure propagation and
//! the pagination regression against a mock MCP server.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::{json, Value};

use mcp_workflow_client::McpClient;
use mcp_workflow_core::error::{Result, WorkflowError};
use mcp_workflow_core::model::{Document, ModelUsage, Workflow};
use mcp_workflow_core::trace::TraceEvent;
use mcp_workflow_engine::{
    HandlerContext, HandlerOutput, HandlerRegistry, NodeHandler, WorkflowEngine,
};

fn workflow(value: Value) -> Workflow {
    serde_json::from_value(value).unwrap()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

async fn collect(engine: &WorkflowEngine, name: &str, data: Option<Value>) -> Vec<TraceEvent> {
    let data = data.map(|value| value.as_object().unwrap().clone());
    engine
        .run_workflow(name, data)
        .unwrap()
        .collect::<Vec<_>>()
        .await
}

fn actions(trace: &[TraceEvent]) -> Vec<&'static str> {
    trace.iter().map(TraceEvent::action).collect()
}

struct Passthrough;

#[async_trait]
impl NodeHandler for Passthrough {
    async fn call(&self, data: Document, _ctx: &mut HandlerContext<'_>) -> Result<HandlerOutput> {
        Ok(HandlerOutput::Data(data))
    }
}

struct Failing;

#[async_trait]
impl NodeHandler for Failing {
    async fn call(&self, _data: Document, _ctx: &mut HandlerContext<'_>) -> Result<HandlerOutput> {
        Err(WorkflowError::node("boom"))
    }
}

struct RecordsUsage;

#[async_trait]
impl NodeHandler for RecordsUsage {
    async fn call(&self, data: Document, ctx: &mut HandlerContext<'_>) -> Result<HandlerOutput> {
        ctx.usage
            .push(ModelUsage::new(ctx.action_id, "test-model"));
        Ok(HandlerOutput::Data(data))
    }
}

fn passthrough_registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::empty();
    for node_type in ["tool", "resource", "prompt", "other"] {
        registry.register(node_type, Arc::new(Passthrough));
    }
    registry
}

/// Built-in handlers plus a passthrough for the `other` test node type.
fn defaults_plus_other() -> HandlerRegistry {
    let mut registry = HandlerRegistry::with_defaults();
    registry.register("other", Arc::new(Passthrough));
    registry
}

#[tokio::test]
async fn test_empty_workflow() {
    let engine = WorkflowEngine::new(vec![workflow(json!({"id": "t", "name": "Test"}))]);
    let trace = collect(&engine, "Test", None).await;
    assert_eq!(actions(&trace), vec!["workflow-start", "workflow-end"]);
}

#[tokio::test]
async fn test_workflow_resolved_by_id_then_name() {
    let engine = WorkflowEngine::new(vec![workflow(json!({"id": "t", "name": "Test"}))]);
    assert!(engine.get_workflow("t").is_some());
    assert!(engine.get_workflow("Test").is_some());
    assert!(engine.get_workflow("missing").is_none());
}

#[tokio::test]
async fn test_linear_chain_ten_events() {
    let engine = WorkflowEngine::new(vec![workflow(json!({
        "id": "test-workflow", "name": "Test", "start_node_id": "1",
        "nodes": [
            {"id": "1", "name": "tool", "type": "tool",
             "server_id": "test-server", "tool_name": "t", "edges": ["2"]},
            {"id": "2", "name": "resource", "type": "resource",
             "server_id": "test-server", "uri": "data://x", "edges": ["3"]},
            {"id": "3", "name": "prompt", "type": "prompt",
             "server_id": "test-server", "prompt_name": "p", "edges": ["4"]},
            {"id": "4", "name": "other", "type": "other"}
        ]
    }))])
    .with_handlers(passthrough_registry());

    let trace = collect(&engine, "test-workflow", Some(json!({"foo": "bar"}))).await;
    assert_eq!(trace.len(), 10);
    assert_eq!(
        actions(&trace),
        vec![
            "workflow-start",
            "node-start",
            "node-end",
            "node-start",
            "node-end",
            "node-start",
            "node-end",
            "node-start",
            "node-end",
            "workflow-end",
        ]
    );

    // Timestamps are monotonically non-decreasing.
    let timestamps: Vec<f64> = trace.iter().map(TraceEvent::timestamp).collect();
    assert!(timestamps.windows(2).all(|pair| pair[0] <= pair[1]));
}

#[tokio::test]
async fn test_default_handler_passthrough() {
    let engine = WorkflowEngine::new(vec![workflow(json!({
        "id": "test-workflow", "name": "Test", "start_node_id": "1",
        "nodes": [{"id": "1", "name": "missing", "type": "unknown"}]
    }))])
    .with_handlers(passthrough_registry());

    let trace = collect(&engine, "test-workflow", None).await;
    assert_eq!(
        actions(&trace),
        vec!["workflow-start", "default", "workflow-end"]
    );
}

#[tokio::test]
async fn test_workflow_not_found_raises() {
    let engine = WorkflowEngine::new(vec![]);
    let err = engine.run_workflow("test-workflow", None).err().unwrap();
    assert!(matches!(err, WorkflowError::WorkflowNotFound { .. }));
}

#[tokio::test]
async fn test_workflow_failed() {
    let mut registry = passthrough_registry();
    registry.register("other", Arc::new(Failing));

    let engine = WorkflowEngine::new(vec![workflow(json!({
        "id": "test-workflow", "name": "Test", "start_node_id": "1",
        "nodes": [{"id": "1", "name": "other", "type": "other"}]
    }))])
    .with_handlers(registry);

    let trace = collect(&engine, "test-workflow", Some(json!({"foo": "bar"}))).await;
    assert_eq!(
        actions(&trace),
        vec![
            "workflow-start",
            "node-start",
            "node-error",
            "workflow-failed",
        ]
    );
    let TraceEvent::NodeError {
        message, exc_type, ..
    } = &trace[2]
    else {
        panic!("expected node-error");
    };
    assert!(message.contains("boom"));
    assert_eq!(exc_type, "Node");
}

#[tokio::test]
async fn test_workflow_event_schema_accepts() {
    let engine = WorkflowEngine::new(vec![workflow(json!({
        "id": "test-workflow", "name": "Test",
        "event": {
            "name": "manual", "type": "manual",
            "json_schema": {
                "type": "object",
                "properties": {"name": {"type": "string"}},
                "required": ["name"],
                "additionalProperties": false
            }
        }
    }))]);

    let trace = collect(&engine, "test-workflow", Some(json!({"name": "foo"}))).await;
    assert_eq!(actions(&trace), vec!["workflow-start", "workflow-end"]);
}

#[tokio::test]
async fn test_workflow_event_schema_rejects() {
    let engine = WorkflowEngine::new(vec![workflow(json!({
        "id": "test-workflow", "name": "Test",
        "event": {
            "name": "manual", "type": "manual",
            "json_schema": {
                "type": "object",
                "properties": {"name": {"type": "string"}},
                "required": ["name"]
            }
        }
    }))]);

    let trace = collect(&engine, "test-workflow", None).await;
    assert_eq!(
        actions(&trace),
        vec!["workflow-start", "workflow-schema-error", "workflow-failed"]
    );
}

#[tokio::test]
async fn test_workflow_base_data_merged_under_caller_data() {
    let engine = WorkflowEngine::new(vec![workflow(json!({
        "id": "t", "name": "Test", "start_node_id": "1",
        "nodes": [{"id": "1", "name": "other", "type": "other"}],
        "data": {"a": 1, "b": 2}
    }))])
    .with_handlers(passthrough_registry());

    let trace = collect(&engine, "t", Some(json!({"b": 3}))).await;
    let TraceEvent::NodeStart { data, .. } = &trace[1] else {
        panic!("expected node-start");
    };
    assert_eq!(data.get("a").unwrap(), 1);
    assert_eq!(data.get("b").unwrap(), 3);
}

#[tokio::test]
async fn test_null_edges_drop_branches() {
    // Node 1 broadcasts over [null, "2"]: only node 2 runs.
    let engine = WorkflowEngine::new(vec![workflow(json!({
        "id": "t", "name": "Test", "start_node_id": "1",
        "nodes": [
            {"id": "1", "name": "first", "type": "other", "edges": [null, "2"]},
            {"id": "2", "name": "second", "type": "other"}
        ]
    }))])
    .with_handlers(passthrough_registry());

    let trace = collect(&engine, "t", None).await;
    assert_eq!(trace.len(), 6);
    let node_starts: Vec<String> = trace
        .iter()
        .filter_map(|event| match event {
            TraceEvent::NodeStart { node, .. } => Some(node.id.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(node_starts, vec!["1", "2"]);
}

#[tokio::test]
async fn test_broadcast_fans_out_per_edge() {
    // Two non-null edges: the subtree under each receives the same data.
    let engine = WorkflowEngine::new(vec![workflow(json!({
        "id": "t", "name": "Test", "start_node_id": "1",
        "nodes": [
            {"id": "1", "name": "first", "type": "other", "edges": ["2", "3"]},
            {"id": "2", "name": "left", "type": "other"},
            {"id": "3", "name": "right", "type": "other"}
        ]
    }))])
    .with_handlers(passthrough_registry());

    let trace = collect(&engine, "t", Some(json!({"x": 1}))).await;
    let node_starts: Vec<(String, Document)> = trace
        .iter()
        .filter_map(|event| match event {
            TraceEvent::NodeStart { node, data, .. } => Some((node.id.clone(), data.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(node_starts.len(), 3);
    assert_eq!(node_starts[1].0, "2");
    assert_eq!(node_starts[2].0, "3");
    assert_eq!(node_starts[1].1, node_starts[2].1);
}

#[tokio::test]
async fn test_switch_workflow_drops_unmatched_edge() {
    let engine = WorkflowEngine::new(vec![workflow(json!({
        "id": "t", "name": "Test", "start_node_id": "s",
        "nodes": [
            {"id": "s", "name": "switch", "type": "switch", "expr": "x.y",
             "rules": [{"type": "lt", "value": 2}, {"type": "gte", "value": 2}],
             "edges": ["e1", "e2", "e3"]},
            {"id": "e1", "name": "low", "type": "other"},
            {"id": "e2", "name": "high", "type": "other"},
            {"id": "e3", "name": "always", "type": "other"}
        ]
    }))])
    .with_handlers(defaults_plus_other());

    let trace = collect(&engine, "t", Some(json!({"x": {"y": 3}}))).await;
    let node_starts: Vec<String> = trace
        .iter()
        .filter_map(|event| match event {
            TraceEvent::NodeStart { node, .. } => Some(node.id.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(node_starts, vec!["s", "e2", "e3"]);
}

#[tokio::test]
async fn test_loop_workflow_edge_major_order() {
    let engine = WorkflowEngine::new(vec![workflow(json!({
        "id": "t", "name": "Test", "start_node_id": "l",
        "nodes": [
            {"id": "l", "name": "loop", "type": "loop", "expr": "lines",
             "edges": ["e1", "e2"]},
            {"id": "e1", "name": "one", "type": "other"},
            {"id": "e2", "name": "two", "type": "other"}
        ]
    }))])
    .with_handlers(defaults_plus_other());

    let trace = collect(&engine, "t", Some(json!({"lines": ["1", "2", "3"]}))).await;
    let visits: Vec<(String, Value)> = trace
        .iter()
        .filter_map(|event| match event {
            TraceEvent::NodeStart { node, data, .. } if node.id != "l" => {
                Some((node.id.clone(), data.get("__each__").cloned().unwrap()))
            }
            _ => None,
        })
        .collect();
    assert_eq!(
        visits,
        vec![
            ("e1".to_owned(), json!("1")),
            ("e1".to_owned(), json!("2")),
            ("e1".to_owned(), json!("3")),
            ("e2".to_owned(), json!("1")),
            ("e2".to_owned(), json!("2")),
            ("e2".to_owned(), json!("3")),
        ]
    );
}

#[tokio::test]
async fn test_function_positional_none_drops_edge() {
    let engine = WorkflowEngine::new(vec![workflow(json!({
        "id": "t", "name": "Test", "start_node_id": "f",
        "nodes": [
            {"id": "f", "name": "function", "type": "function",
             "function": "return [data, ()];", "edges": ["e1", "e2"]},
            {"id": "e1", "name": "kept", "type": "other"},
            {"id": "e2", "name": "dropped", "type": "other"}
        ]
    }))])
    .with_handlers(defaults_plus_other());

    let trace = collect(&engine, "t", Some(json!({"x": {"y": 3}}))).await;
    let node_starts: Vec<String> = trace
        .iter()
        .filter_map(|event| match event {
            TraceEvent::NodeStart { node, .. } => Some(node.id.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(node_starts, vec!["f", "e1"]);
    assert_eq!(trace.last().unwrap().action(), "workflow-end");
}

#[tokio::test]
async fn test_usage_collected_in_terminal_event() {
    let mut registry = HandlerRegistry::empty();
    registry.register("other", Arc::new(RecordsUsage));

    let engine = WorkflowEngine::new(vec![workflow(json!({
        "id": "t", "name": "Test", "start_node_id": "1",
        "nodes": [
            {"id": "1", "name": "first", "type": "other", "edges": ["2"]},
            {"id": "2", "name": "second", "type": "other"}
        ]
    }))])
    .with_handlers(registry);

    let trace = collect(&engine, "t", None).await;
    let TraceEvent::WorkflowEnd { usage, duration, .. } = trace.last().unwrap() else {
        panic!("expected workflow-end");
    };
    assert_eq!(usage.len(), 2);
    assert_eq!(usage[0].model, "test-model");
    assert!(*duration >= 0.0);
}

#[tokio::test]
async fn test_terminal_event_is_exclusive() {
    let engine = WorkflowEngine::new(vec![workflow(json!({"id": "t", "name": "Test"}))]);
    let trace = collect(&engine, "t", None).await;
    let terminals = trace
        .iter()
        .filter(|event| matches!(event.action(), "workflow-end" | "workflow-failed"))
        .count();
    assert_eq!(terminals, 1);
}

mod pagination {
    use super::*;
    use wiremock::matchers::{body_string_contains, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn result_response(result: Value) -> Value {
        json!({"type": "result", "id": "1", "result": result})
    }

    /// Regression: a tool returning a cursor page followed by an `isError`
    /// result must terminate the run with `workflow-failed`.
    #[tokio::test]
    async fn test_pagination_error_fails_workflow() {
        init_tracing();
        let mock = MockServer::start().await;

        Mock::given(method("POST"))
            .and(body_string_contains("initialize"))
            .respond_with(ResponseTemplate::new(200).set_body_json(result_response(json!({
                "protocolVersion": "2025-03-26",
                "capabilities": {},
                "serverInfo": {"name": "mock", "version": "0"}
            }))))
            .mount(&mock)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("tools/list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(result_response(json!({
                "tools": [{"name": "items", "inputSchema": {"type": "object"}}]
            }))))
            .mount(&mock)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("resources/list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(result_response(json!({
                "resources": []
            }))))
            .mount(&mock)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("prompts/list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(result_response(json!({
                "prompts": []
            }))))
            .mount(&mock)
            .await;

        // First page succeeds with a cursor...
        Mock::given(method("POST"))
            .and(body_string_contains("tools/call"))
            .respond_with(ResponseTemplate::new(200).set_body_json(result_response(json!({
                "content": [],
                "structuredContent": {
                    "cursor": "MTA=",
                    "items": [
                        {"id": "0", "value": 0}, {"id": "1", "value": 1},
                        {"id": "2", "value": 2}, {"id": "3", "value": 3}
                    ]
                }
            }))))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&mock)
            .await;
        // ...the second page is an error.
        Mock::given(method("POST"))
            .and(body_string_contains("tools/call"))
            .respond_with(ResponseTemplate::new(200).set_body_json(result_response(json!({
                "content": [{"type": "text", "text": "ERROR!"}],
                "isError": true
            }))))
            .with_priority(2)
            .mount(&mock)
            .await;

        let engine = WorkflowEngine::new(vec![workflow(json!({
            "id": "pagination", "name": "pagination", "start_node_id": "page-1",
            "servers": [{"id": "api", "url": format!("{}/mcp/", mock.uri()), "headers": {}}],
            "nodes": [
                {"id": "page-1", "name": "first page", "type": "tool",
                 "server_id": "api", "tool_name": "items", "edges": ["page-2"]},
                {"id": "page-2", "name": "second page", "type": "tool",
                 "server_id": "api", "tool_name": "items"}
            ]
        }))])
        .with_client(Arc::new(McpClient::default()));

        let trace = collect(&engine, "pagination", Some(json!({}))).await;
        assert_eq!(trace.last().unwrap().action(), "workflow-failed");

        // The first page's structured content flowed into the second call.
        let TraceEvent::NodeStart { data, .. } = &trace[3] else {
            panic!("expected node-start for the second page");
        };
        assert_eq!(data.get("cursor").unwrap(), "MTA=");
    }
}
