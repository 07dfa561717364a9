mod common;

use std::sync::Arc;

use common::{tool_with_meta, FakeConnector, FakeServer, Harness, ScriptedFactory};
use patchcord::{CallToolResult, Content};
use serde_json::json;
use switchboard::{
    BridgeReply, BridgeRequest, ConversationMessage, ConversationOrchestrator, RenderParams,
    WidgetBridge,
};

const A: &str = "http://a.test/mcp";

struct Setup {
    _harness: Harness,
    server: FakeServer,
    conversation: Arc<ConversationOrchestrator>,
}

async fn setup() -> Setup {
    let server = FakeServer::with_tools(vec![
        tool_with_meta(
            "refresh",
            json!({
                "openai/outputTemplate": "ui://widget/list.html",
                "openai/widgetAccessible": true
            }),
        ),
        tool_with_meta("delete_all", json!({ "openai/widgetAccessible": false })),
    ])
    .result(
        "refresh",
        CallToolResult {
            content: vec![Content::text("3 items")],
            structured_content: Some(json!({ "items": [1, 2, 3] })),
            ..Default::default()
        },
    );

    let harness = Harness::new(FakeConnector::new().serve(A, server.clone()));
    let conversation = Arc::new(ConversationOrchestrator::new(
        harness.servers.clone(),
        Arc::new(ScriptedFactory::default()),
        harness.events.clone(),
        harness.media.clone(),
    ));
    conversation.set_servers(&[A]).await.unwrap();

    Setup {
        _harness: harness,
        server,
        conversation,
    }
}

fn params() -> RenderParams {
    RenderParams {
        server_endpoint: A.into(),
        tool_name: "refresh".into(),
        resource_uri: "ui://widget/list.html".into(),
        tool_input_json: "{}".into(),
        tool_output_json: "null".into(),
        tool_response_metadata_json: "null".into(),
    }
}

#[tokio::test]
async fn test_unauthorized_call_never_reaches_server() {
    let s = setup().await;
    let bridge = WidgetBridge::new(s.conversation.clone(), params());

    let reply = bridge
        .handle(BridgeRequest::CallTool {
            name: "delete_all".into(),
            args: Default::default(),
        })
        .await;

    assert_eq!(
        reply.error(),
        Some("tool 'delete_all' is not callable from a widget")
    );
    assert!(s.server.calls().is_empty());
}

#[tokio::test]
async fn test_unknown_tool_is_an_error_reply() {
    let s = setup().await;
    let bridge = WidgetBridge::new(s.conversation.clone(), params());

    let reply = bridge
        .handle_raw("callTool", &json!({ "name": "nope", "args": {} }))
        .await;

    assert_eq!(reply.error(), Some("tool 'nope' does not exist"));
}

#[tokio::test]
async fn test_authorized_call_returns_normalized_output() {
    let s = setup().await;
    let bridge = WidgetBridge::new(s.conversation.clone(), params());

    let reply = bridge
        .handle_raw("callTool", &json!({ "name": "refresh", "args": { "page": 2 } }))
        .await;

    let result = reply.result().expect("call succeeds");
    assert_eq!(result["texts"], json!(["3 items"]));
    assert_eq!(result["isError"], json!(false));
    assert_eq!(result["structuredContent"], json!({ "items": [1, 2, 3] }));
    assert_eq!(result["result"], json!(r#"{"items":[1,2,3]}"#));

    let calls = s.server.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1["page"], json!(2));
}

#[tokio::test]
async fn test_follow_up_runs_a_turn() {
    let s = setup().await;
    let bridge = WidgetBridge::new(s.conversation.clone(), params());

    let reply = bridge
        .handle_raw("sendFollowUpMessage", &json!({ "prompt": "show more" }))
        .await;

    assert_eq!(reply, BridgeReply::Ok(json!({})));
    let timeline = s.conversation.timeline().await;
    assert!(matches!(
        &timeline[0],
        ConversationMessage::UserPrompt { text, .. } if text == "show more"
    ));
    assert_eq!(timeline.len(), 2);
}

#[tokio::test]
async fn test_spawned_bridge_replies_over_channel() {
    let s = setup().await;
    let handle = WidgetBridge::new(s.conversation.clone(), params()).spawn();

    let reply = handle
        .request(BridgeRequest::CallTool {
            name: "refresh".into(),
            args: Default::default(),
        })
        .await;
    assert!(reply.is_ok());

    let reply = handle.request_raw("openExternal", &json!({})).await;
    assert_eq!(reply.error(), Some("unknown bridge message 'openExternal'"));
}
