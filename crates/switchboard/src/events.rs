//! Events published while tools run.

use patchcord::CallToolResult;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 256;

/// Everything a widget needs at creation time.
///
/// The server is referenced by endpoint, not owned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderParams {
    pub server_endpoint: String,
    pub tool_name: String,
    pub resource_uri: String,
    pub tool_input_json: String,
    pub tool_output_json: String,
    pub tool_response_metadata_json: String,
}

impl RenderParams {
    /// `input` is `None` when the model's arguments could not be decoded.
    pub fn new(
        server_endpoint: &str,
        tool_name: &str,
        resource_uri: &str,
        input: Option<&Map<String, Value>>,
        result: &CallToolResult,
    ) -> Result<Self, serde_json::Error> {
        let input = match input {
            Some(args) => serde_json::to_string(args)?,
            None => "null".to_string(),
        };

        Ok(Self {
            server_endpoint: server_endpoint.to_string(),
            tool_name: tool_name.to_string(),
            resource_uri: resource_uri.to_string(),
            tool_input_json: input,
            tool_output_json: serde_json::to_string(
                result.structured_content.as_ref().unwrap_or(&Value::Null),
            )?,
            tool_response_metadata_json: match &result.meta {
                Some(meta) => serde_json::to_string(meta)?,
                None => "null".to_string(),
            },
        })
    }

    /// Inject `window.openai` globals into widget HTML, right after `<head>`
    /// when there is one.
    pub fn inject_into(&self, html: &str) -> String {
        let script = format!(
            "<script>window.openai = {{\"toolOutput\": {}, \"toolInput\": {}, \"toolResponseMetadata\": {}}};</script>",
            script_safe(&self.tool_output_json),
            script_safe(&self.tool_input_json),
            script_safe(&self.tool_response_metadata_json),
        );

        match html.find("<head>") {
            Some(index) => {
                let at = index + "<head>".len();
                format!("{}{}{}", &html[..at], script, &html[at..])
            }
            None => format!("{}{}", script, html),
        }
    }
}

fn script_safe(json: &str) -> String {
    json.replace("</", "<\\/")
}

/// Who asked for a tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallOrigin {
    /// The generative session, as part of a turn.
    Model,
    /// An embedded widget, through the bridge.
    Widget,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConversationEvent {
    /// A tool call started. `arguments` is `None` if they failed to decode.
    ToolUseBegan {
        endpoint: String,
        tool: String,
        origin: ToolCallOrigin,
        arguments: Option<Map<String, Value>>,
        message: String,
    },
    /// Paired with every `ToolUseBegan`, whatever the outcome.
    ToolUseEnded {
        endpoint: String,
        tool: String,
        origin: ToolCallOrigin,
    },
    AppAvailable(RenderParams),
}

/// Fan-out of [`ConversationEvent`]s to any number of subscribers.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ConversationEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConversationEvent> {
        self.tx.subscribe()
    }

    /// Publishing with no subscribers is not an error.
    pub fn emit(&self, event: ConversationEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_params_blobs() {
        let result: CallToolResult = serde_json::from_value(json!({
            "content": [],
            "structuredContent": { "pins": [1, 2] },
            "_meta": { "k": "v" }
        }))
        .unwrap();
        let args = json!({ "city": "Paris" });

        let params =
            RenderParams::new("http://a/mcp", "map", "ui://map", args.as_object(), &result).unwrap();

        assert_eq!(params.tool_input_json, r#"{"city":"Paris"}"#);
        assert_eq!(params.tool_output_json, r#"{"pins":[1,2]}"#);
        assert_eq!(params.tool_response_metadata_json, r#"{"k":"v"}"#);
    }

    #[test]
    fn test_render_params_missing_parts_are_null() {
        let params =
            RenderParams::new("e", "t", "ui://x", None, &CallToolResult::default()).unwrap();
        assert_eq!(params.tool_input_json, "null");
        assert_eq!(params.tool_output_json, "null");
        assert_eq!(params.tool_response_metadata_json, "null");
    }

    #[test]
    fn test_inject_into_head() {
        let params = RenderParams::new("e", "t", "u", None, &CallToolResult::default()).unwrap();
        let html = params.inject_into("<html><head><title>x</title></head></html>");
        assert!(html.starts_with("<html><head><script>window.openai = "));
        assert!(html.ends_with("<title>x</title></head></html>"));
    }

    #[test]
    fn test_inject_escapes_script_close() {
        let result = CallToolResult {
            structured_content: Some(json!({ "html": "</script>" })),
            ..Default::default()
        };
        let params = RenderParams::new("e", "t", "u", None, &result).unwrap();
        let html = params.inject_into("<p>body</p>");
        assert!(!html.contains("\"</script>\""));
        assert!(html.ends_with("<p>body</p>"));
    }

    #[tokio::test]
    async fn test_every_subscriber_sees_events() {
        let bus = EventBus::default();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.emit(ConversationEvent::ToolUseEnded {
            endpoint: "e".into(),
            tool: "t".into(),
            origin: ToolCallOrigin::Model,
        });

        assert!(matches!(a.recv().await.unwrap(), ConversationEvent::ToolUseEnded { .. }));
        assert!(matches!(b.recv().await.unwrap(), ConversationEvent::ToolUseEnded { .. }));
    }
}
