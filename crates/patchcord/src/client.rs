//! Streamable HTTP transport.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use reqwest::header::{HeaderMap, ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};

use crate::types::{CallToolResult, InitializeResult, ListToolsPage, ReadResourceResult};

const SESSION_HEADER: &str = "Mcp-Session-Id";

/// Options for configuring the MCP client.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub client_name: String,
    pub client_version: String,
    pub protocol_version: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            client_name: "patchcord".to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            protocol_version: "2025-06-18".to_string(),
            timeout_secs: 30,
        }
    }
}

impl ClientOptions {
    pub fn with_name(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            client_name: name.into(),
            client_version: version.into(),
            ..Default::default()
        }
    }
}

/// MCP client speaking JSON-RPC over HTTP POST.
///
/// The session id is whatever the server hands back in the `Mcp-Session-Id`
/// header during `initialize`; it is echoed on every later request.
pub struct McpClient {
    endpoint: String,
    client: Client,
    session_id: RwLock<Option<String>>,
    request_id: AtomicU64,
    options: ClientOptions,
}

impl McpClient {
    pub fn new(endpoint: &str) -> Self {
        Self::with_options(endpoint, ClientOptions::default())
    }

    pub fn with_options(endpoint: &str, options: ClientOptions) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            client: Client::new(),
            session_id: RwLock::new(None),
            request_id: AtomicU64::new(1),
            options,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn session_id(&self) -> Option<String> {
        self.session_id.read().ok().and_then(|id| id.clone())
    }

    fn next_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Perform the MCP handshake and send `notifications/initialized`.
    #[tracing::instrument(skip(self), fields(mcp.endpoint = %self.endpoint))]
    pub async fn initialize(&self) -> Result<InitializeResult, ClientError> {
        let params = json!({
            "protocolVersion": self.options.protocol_version,
            "capabilities": {},
            "clientInfo": {
                "name": self.options.client_name,
                "version": self.options.client_version
            }
        });

        let result: InitializeResult = self.request("initialize", params).await?;

        self.notify("notifications/initialized", json!({})).await?;

        tracing::info!(
            server = %result.server_info.name,
            version = ?result.server_info.version,
            protocol = %result.protocol_version,
            "MCP session initialized"
        );

        Ok(result)
    }

    /// Fetch one page of tools. Pass the previous page's `next_cursor` to continue.
    #[tracing::instrument(skip(self), fields(mcp.endpoint = %self.endpoint))]
    pub async fn list_tools_page(&self, cursor: Option<&str>) -> Result<ListToolsPage, ClientError> {
        let params = match cursor {
            Some(cursor) => json!({ "cursor": cursor }),
            None => json!({}),
        };
        self.request("tools/list", params).await
    }

    #[tracing::instrument(
        skip(self, arguments),
        fields(tool.name = %name, mcp.endpoint = %self.endpoint)
    )]
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<CallToolResult, ClientError> {
        let params = json!({ "name": name, "arguments": arguments });
        self.request("tools/call", params).await
    }

    #[tracing::instrument(skip(self), fields(mcp.endpoint = %self.endpoint))]
    pub async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult, ClientError> {
        self.request("resources/read", json!({ "uri": uri })).await
    }

    /// Terminate the server-side session. Failures are logged, not returned.
    pub async fn close(&self) {
        let Some(session_id) = self.session_id() else {
            return;
        };

        let result = self
            .client
            .delete(&self.endpoint)
            .header(SESSION_HEADER, &session_id)
            .timeout(Duration::from_secs(self.options.timeout_secs))
            .send()
            .await;

        match result {
            Ok(response) => tracing::debug!(status = %response.status(), "MCP session closed"),
            Err(e) => tracing::debug!(error = %e, "MCP session close failed"),
        }

        if let Ok(mut slot) = self.session_id.write() {
            *slot = None;
        }
    }

    async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, ClientError> {
        let id = self.next_id();
        let message = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params
        });

        let response = self.post(&message).await?;
        self.remember_session(response.headers());

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let is_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));

        let body = response
            .text()
            .await
            .map_err(|e| ClientError::Transport(format!("Failed to read response: {}", e)))?;

        let reply = if is_stream {
            reply_from_event_stream(&body, id)?
        } else {
            serde_json::from_str::<Value>(&body)
                .map_err(|e| ClientError::Protocol(format!("Invalid JSON response: {}", e)))?
        };

        if let Some(error) = reply.get("error") {
            return Err(ClientError::Rpc {
                method: method.to_string(),
                code: error.get("code").and_then(Value::as_i64).unwrap_or(-1),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("Unknown error")
                    .to_string(),
            });
        }

        let result = reply
            .get("result")
            .cloned()
            .ok_or_else(|| ClientError::Protocol(format!("Missing result in {} response", method)))?;

        serde_json::from_value(result)
            .map_err(|e| ClientError::Protocol(format!("Invalid {} result: {}", method, e)))
    }

    async fn notify(&self, method: &str, params: Value) -> Result<(), ClientError> {
        let message = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params
        });

        let response = self.post(&message).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Http {
                status: status.as_u16(),
                body: format!("Notification {} failed with status {}", method, status),
            });
        }
        Ok(())
    }

    async fn post(&self, message: &Value) -> Result<reqwest::Response, ClientError> {
        let mut builder = self
            .client
            .post(&self.endpoint)
            .header(ACCEPT, "application/json, text/event-stream")
            .timeout(Duration::from_secs(self.options.timeout_secs));

        if let Some(session_id) = self.session_id() {
            builder = builder.header(SESSION_HEADER, session_id);
        }
        if let Some(tp) = current_traceparent() {
            builder = builder.header("traceparent", tp);
        }

        builder
            .json(message)
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))
    }

    fn remember_session(&self, headers: &HeaderMap) {
        let Some(id) = headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok()) else {
            return;
        };
        if let Ok(mut slot) = self.session_id.write() {
            if slot.as_deref() != Some(id) {
                *slot = Some(id.to_string());
            }
        }
    }
}

/// Pick the JSON-RPC reply for `id` out of an SSE body.
fn reply_from_event_stream(body: &str, id: u64) -> Result<Value, ClientError> {
    let mut data = String::new();
    let mut events = Vec::new();

    for line in body.lines() {
        if let Some(chunk) = line.strip_prefix("data:") {
            data.push_str(chunk.trim_start());
        } else if line.is_empty() && !data.is_empty() {
            events.push(std::mem::take(&mut data));
        }
    }
    if !data.is_empty() {
        events.push(data);
    }

    events
        .iter()
        .filter_map(|event| serde_json::from_str::<Value>(event).ok())
        .find(|message| message.get("id").and_then(Value::as_u64) == Some(id))
        .ok_or_else(|| ClientError::Protocol(format!("No reply for request {} in event stream", id)))
}

/// W3C traceparent for the current span, if it carries a valid context.
fn current_traceparent() -> Option<String> {
    use opentelemetry::trace::TraceContextExt;
    use tracing_opentelemetry::OpenTelemetrySpanExt;

    let context = tracing::Span::current().context();
    let span = context.span();
    let span_context = span.span_context();

    if !span_context.is_valid() {
        return None;
    }

    let flags = if span_context.is_sampled() { "01" } else { "00" };
    Some(format!(
        "00-{}-{}-{}",
        span_context.trace_id(),
        span_context.span_id(),
        flags
    ))
}

/// Errors that can occur when using the MCP client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The server answered, but not with anything we understand.
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("{method} failed (code {code}): {message}")]
    Rpc {
        method: String,
        code: i64,
        message: String,
    },
}
