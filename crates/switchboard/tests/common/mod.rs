//! In-memory fakes for the transport and generative session seams.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use patchcord::{CallToolResult, ListToolsPage, ResourceContents, ServerInfo, ToolDescriptor};
use reqwest::Url;
use serde_json::{json, Map, Value};
use switchboard::transport::Connection;
use switchboard::{
    EventBus, GenerativeSession, MediaStore, ServerOrchestrator, SessionError, SessionFactory,
    StructuredResponse, ToolRegistry, ToolTransport, TransportConnector, TransportError,
};
use tokio::sync::Notify;

pub fn tool(name: &str, schema: Value) -> ToolDescriptor {
    serde_json::from_value(json!({
        "name": name,
        "description": format!("{name} tool"),
        "inputSchema": schema,
    }))
    .unwrap()
}

pub fn tool_with_meta(name: &str, meta: Value) -> ToolDescriptor {
    let mut descriptor = tool(name, json!({ "type": "object", "properties": {} }));
    descriptor.meta = meta.as_object().cloned();
    descriptor
}

pub fn args(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

/// One scripted remote server.
#[derive(Clone, Default)]
pub struct FakeServer {
    pub pages: Vec<Vec<ToolDescriptor>>,
    pub results: HashMap<String, CallToolResult>,
    pub resources: HashMap<String, Vec<ResourceContents>>,
    pub fail_listing: bool,
    pub fail_calls: bool,
    pub calls: Arc<Mutex<Vec<(String, Map<String, Value>)>>>,
    pub disconnects: Arc<AtomicUsize>,
}

impl FakeServer {
    pub fn with_tools(tools: Vec<ToolDescriptor>) -> Self {
        Self {
            pages: vec![tools],
            ..Default::default()
        }
    }

    pub fn result(mut self, tool: &str, result: CallToolResult) -> Self {
        self.results.insert(tool.to_string(), result);
        self
    }

    pub fn calls(&self) -> Vec<(String, Map<String, Value>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[derive(Default)]
pub struct FakeConnector {
    servers: Mutex<HashMap<String, FakeServer>>,
    gate: Option<Arc<Notify>>,
    delay: Option<Duration>,
    pub connects: AtomicUsize,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every connect waits for one permit from `gate`.
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Every connect sleeps this long first.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn serve(self, endpoint: &str, server: FakeServer) -> Self {
        self.servers
            .lock()
            .unwrap()
            .insert(endpoint.to_string(), server);
        self
    }
}

#[async_trait]
impl TransportConnector for FakeConnector {
    async fn connect(&self, endpoint: &Url) -> Result<Connection, TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let server = self
            .servers
            .lock()
            .unwrap()
            .get(endpoint.as_str())
            .cloned()
            .ok_or_else(|| TransportError::Other("connection refused".into()))?;

        Ok(Connection {
            transport: Arc::new(FakeTransport { server }),
            server_info: ServerInfo {
                name: format!("fake {}", endpoint.path()),
                version: Some("0.0.1".into()),
            },
        })
    }
}

struct FakeTransport {
    server: FakeServer,
}

#[async_trait]
impl ToolTransport for FakeTransport {
    async fn list_tools(&self, cursor: Option<&str>) -> Result<ListToolsPage, TransportError> {
        if self.server.fail_listing {
            return Err(TransportError::Other("tools/list exploded".into()));
        }

        let index = match cursor {
            None => 0,
            Some(cursor) => cursor
                .strip_prefix("page-")
                .and_then(|n| n.parse::<usize>().ok())
                .ok_or_else(|| TransportError::Other(format!("bad cursor {cursor}")))?,
        };
        let tools = self.server.pages.get(index).cloned().unwrap_or_default();
        let next_cursor = (index + 1 < self.server.pages.len()).then(|| format!("page-{}", index + 1));

        Ok(ListToolsPage { tools, next_cursor })
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<CallToolResult, TransportError> {
        self.server
            .calls
            .lock()
            .unwrap()
            .push((name.to_string(), arguments));

        if self.server.fail_calls {
            return Err(TransportError::Other("connection reset".into()));
        }
        Ok(self
            .server
            .results
            .get(name)
            .cloned()
            .unwrap_or_else(|| CallToolResult::text(format!("{name} ran"))))
    }

    async fn read_resource(&self, uri: &str) -> Result<Vec<ResourceContents>, TransportError> {
        self.server
            .resources
            .get(uri)
            .cloned()
            .ok_or_else(|| TransportError::Other(format!("no resource {uri}")))
    }

    async fn disconnect(&self) {
        self.server.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

/// A tool the scripted session calls before answering.
#[derive(Clone)]
pub struct ScriptedCall {
    pub tool: String,
    pub raw_arguments: String,
}

/// Factory for sessions that optionally call one tool, then answer with the
/// tool's text output.
///
/// `gate` is awaited before the tool call and `hold` after it. A `busy`
/// session refuses every turn.
#[derive(Default)]
pub struct ScriptedFactory {
    pub call: Option<ScriptedCall>,
    pub gate: Option<Arc<Notify>>,
    pub hold: Option<Arc<Notify>>,
    pub busy: bool,
    pub instructions: Mutex<Vec<String>>,
    pub tool_counts: Mutex<Vec<usize>>,
}

impl ScriptedFactory {
    pub fn calling(tool: &str, raw_arguments: &str) -> Self {
        Self {
            call: Some(ScriptedCall {
                tool: tool.to_string(),
                raw_arguments: raw_arguments.to_string(),
            }),
            ..Default::default()
        }
    }

    pub fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Default::default()
        }
    }

    pub fn holding(mut self, hold: Arc<Notify>) -> Self {
        self.hold = Some(hold);
        self
    }

    pub fn busy() -> Self {
        Self {
            busy: true,
            ..Default::default()
        }
    }

    pub fn created(&self) -> usize {
        self.instructions.lock().unwrap().len()
    }
}

#[async_trait]
impl SessionFactory for ScriptedFactory {
    async fn create(
        &self,
        registry: Arc<ToolRegistry>,
        instructions: String,
    ) -> Result<Arc<dyn GenerativeSession>, SessionError> {
        self.instructions.lock().unwrap().push(instructions);
        self.tool_counts.lock().unwrap().push(registry.len());
        Ok(Arc::new(ScriptedSession {
            registry,
            call: self.call.clone(),
            gate: self.gate.clone(),
            hold: self.hold.clone(),
            responding: AtomicBool::new(self.busy),
        }))
    }
}

struct ScriptedSession {
    registry: Arc<ToolRegistry>,
    call: Option<ScriptedCall>,
    gate: Option<Arc<Notify>>,
    hold: Option<Arc<Notify>>,
    responding: AtomicBool,
}

#[async_trait]
impl GenerativeSession for ScriptedSession {
    async fn respond(&self, prompt: &str) -> Result<StructuredResponse, SessionError> {
        if self.responding.swap(true, Ordering::SeqCst) {
            return Err(SessionError::Busy);
        }
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        let answer = match &self.call {
            Some(call) => match self.registry.get(&call.tool) {
                Some(tool) => tool.invoke(&call.raw_arguments).await.map(|out| out.texts.join(" ")),
                None => Ok(format!("no tool {}", call.tool)),
            },
            None => Ok(format!("echo: {prompt}")),
        };
        if let Some(hold) = &self.hold {
            hold.notified().await;
        }

        self.responding.store(false, Ordering::SeqCst);
        Ok(StructuredResponse::text(answer?))
    }

    fn is_responding(&self) -> bool {
        self.responding.load(Ordering::SeqCst)
    }
}

pub struct Harness {
    pub connector: Arc<FakeConnector>,
    pub servers: Arc<ServerOrchestrator>,
    pub events: EventBus,
    pub media: Arc<MediaStore>,
    pub _dir: tempfile::TempDir,
}

impl Harness {
    pub fn new(connector: FakeConnector) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let connector = Arc::new(connector);
        Self {
            servers: Arc::new(ServerOrchestrator::new(connector.clone())),
            connector,
            events: EventBus::default(),
            media: Arc::new(MediaStore::new(dir.path())),
            _dir: dir,
        }
    }

    pub async fn registry(&self) -> ToolRegistry {
        ToolRegistry::build(self.servers.clone(), self.events.clone(), self.media.clone()).await
    }
}
