mod common;

use common::{args, tool, tool_with_meta, FakeConnector, FakeServer, Harness};
use patchcord::{CallToolResult, Content};
use serde_json::json;
use switchboard::output::TOOL_ERROR_TEXT;
use switchboard::{ConversationEvent, ToolCallOrigin, ToolInvokeError};

const A: &str = "http://a.test/mcp";

fn weather_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "city": { "type": "string" },
            "days": { "type": "integer" }
        },
        "required": ["city"]
    })
}

#[tokio::test]
async fn test_error_result_is_output_not_failure() {
    let server = FakeServer::with_tools(vec![tool("weather", weather_schema())]).result(
        "weather",
        CallToolResult {
            content: vec![Content::text("upstream down"), Content::text("try later")],
            is_error: true,
            ..Default::default()
        },
    );
    let h = Harness::new(FakeConnector::new().serve(A, server));
    h.servers.connect(A).await.unwrap();
    let registry = h.registry().await;

    let output = registry
        .get("weather")
        .unwrap()
        .invoke(r#"{"city": "Oslo"}"#)
        .await
        .unwrap();

    assert_eq!(output.texts, vec![TOOL_ERROR_TEXT, "upstream down", "try later"]);
}

#[tokio::test]
async fn test_undecodable_arguments_call_with_empty_set() {
    let server = FakeServer::with_tools(vec![tool("weather", weather_schema())]);
    let h = Harness::new(FakeConnector::new().serve(A, server.clone()));
    h.servers.connect(A).await.unwrap();
    let registry = h.registry().await;

    let output = registry.get("weather").unwrap().invoke("{city: oops").await.unwrap();

    assert_eq!(output.texts, vec!["weather ran"]);
    let calls = server.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].1.is_empty());
}

#[tokio::test]
async fn test_tool_use_events_pair_up_even_on_transport_failure() {
    let server = FakeServer {
        pages: vec![vec![tool("weather", weather_schema())]],
        fail_calls: true,
        ..Default::default()
    };
    let h = Harness::new(FakeConnector::new().serve(A, server));
    h.servers.connect(A).await.unwrap();
    let registry = h.registry().await;
    let mut events = h.events.subscribe();

    let err = registry
        .get("weather")
        .unwrap()
        .invoke(r#"{"city": "Oslo"}"#)
        .await
        .unwrap_err();
    assert!(matches!(err, ToolInvokeError::Transport { ref tool, .. } if tool == "weather"));

    match events.try_recv().unwrap() {
        ConversationEvent::ToolUseBegan {
            tool,
            origin,
            arguments,
            message,
            ..
        } => {
            assert_eq!(tool, "weather");
            assert_eq!(origin, ToolCallOrigin::Model);
            assert_eq!(arguments, Some(args(json!({ "city": "Oslo" }))));
            assert_eq!(
                message,
                r#"[Using Tool] Name: weather. Arguments: {"city":"Oslo"}"#
            );
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert!(matches!(
        events.try_recv().unwrap(),
        ConversationEvent::ToolUseEnded { tool, origin: ToolCallOrigin::Model, .. } if tool == "weather"
    ));
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_output_template_surfaces_app() {
    let server = FakeServer::with_tools(vec![tool_with_meta(
        "show_map",
        json!({ "openai/outputTemplate": "ui://widget/map.html" }),
    )])
    .result(
        "show_map",
        CallToolResult {
            content: vec![Content::text("map ready")],
            structured_content: Some(json!({ "pins": 3 })),
            ..Default::default()
        },
    );
    let h = Harness::new(FakeConnector::new().serve(A, server));
    h.servers.connect(A).await.unwrap();
    let registry = h.registry().await;
    let mut events = h.events.subscribe();

    registry.get("show_map").unwrap().invoke("{}").await.unwrap();

    let surfaced: Vec<_> = std::iter::from_fn(|| events.try_recv().ok())
        .filter_map(|e| match e {
            ConversationEvent::AppAvailable(params) => Some(params),
            _ => None,
        })
        .collect();
    assert_eq!(surfaced.len(), 1);
    let params = &surfaced[0];
    assert_eq!(params.server_endpoint, A);
    assert_eq!(params.resource_uri, "ui://widget/map.html");
    assert_eq!(params.tool_input_json, "{}");
    assert_eq!(params.tool_output_json, r#"{"pins":3}"#);
    assert_eq!(params.tool_response_metadata_json, "null");
}

#[tokio::test]
async fn test_widget_calls_do_not_surface_apps() {
    let server = FakeServer::with_tools(vec![tool_with_meta(
        "show_map",
        json!({
            "openai/outputTemplate": "ui://widget/map.html",
            "openai/widgetAccessible": true
        }),
    )]);
    let h = Harness::new(FakeConnector::new().serve(A, server));
    h.servers.connect(A).await.unwrap();
    let registry = h.registry().await;
    let mut events = h.events.subscribe();

    let invocation = registry
        .find(A, "show_map")
        .unwrap()
        .invoke_from_widget(args(json!({ "zoom": 4 })))
        .await
        .unwrap();

    assert!(!invocation.is_error);
    let seen: Vec<_> = std::iter::from_fn(|| events.try_recv().ok()).collect();
    assert!(!seen.iter().any(|e| matches!(e, ConversationEvent::AppAvailable(_))));
    assert_eq!(seen.len(), 2);
    assert!(matches!(
        seen[0],
        ConversationEvent::ToolUseBegan { origin: ToolCallOrigin::Widget, .. }
    ));
    assert!(matches!(
        seen[1],
        ConversationEvent::ToolUseEnded { origin: ToolCallOrigin::Widget, .. }
    ));
}

#[tokio::test]
async fn test_unconvertible_schema_skips_only_that_tool() {
    let server = FakeServer::with_tools(vec![
        tool("weather", weather_schema()),
        tool("broken", json!(["not", "an", "object"])),
    ]);
    let h = Harness::new(FakeConnector::new().serve(A, server));
    h.servers.connect(A).await.unwrap();

    let registry = h.registry().await;

    assert_eq!(registry.len(), 1);
    assert!(registry.get("weather").is_some());
    assert_eq!(registry.skipped().len(), 1);
    assert_eq!(registry.skipped()[0].tool, "broken");
}

#[tokio::test]
async fn test_parameters_follow_input_schema() {
    let server = FakeServer::with_tools(vec![tool("weather", weather_schema())]);
    let h = Harness::new(FakeConnector::new().serve(A, server));
    h.servers.connect(A).await.unwrap();
    let registry = h.registry().await;

    let parameters = registry.get("weather").unwrap().parameters();
    let object = parameters.as_object().unwrap();
    assert_eq!(object.required_names(), vec!["city"]);
}
