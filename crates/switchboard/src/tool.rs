//! Remote tools and the servers that own them.

use std::sync::Arc;

use patchcord::{ServerInfo, ToolDescriptor};
use serde_json::{Map, Value};

use crate::transport::ToolTransport;

const OUTPUT_TEMPLATE_KEY: &str = "openai/outputTemplate";
const WIDGET_ACCESSIBLE_KEY: &str = "openai/widgetAccessible";

/// Capabilities declared in a tool's `_meta`, resolved once at listing time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCapabilities {
    /// Resource URI of the widget that renders this tool's output.
    pub output_template: Option<String>,

    /// Whether an embedded widget may call this tool directly.
    pub widget_accessible: bool,
}

impl ToolCapabilities {
    /// Values of the wrong type are treated as absent.
    pub fn from_meta(meta: Option<&Map<String, Value>>) -> Self {
        let Some(meta) = meta else {
            return Self::default();
        };

        Self {
            output_template: meta
                .get(OUTPUT_TEMPLATE_KEY)
                .and_then(Value::as_str)
                .map(str::to_owned),
            widget_accessible: meta
                .get(WIDGET_ACCESSIBLE_KEY)
                .and_then(Value::as_bool)
                .unwrap_or(false),
        }
    }
}

/// A tool as listed by a server. Immutable; a re-list replaces it.
#[derive(Debug, Clone)]
pub struct RemoteTool {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Value,
    pub meta: Option<Map<String, Value>>,
    pub capabilities: ToolCapabilities,
}

impl RemoteTool {
    /// Description, falling back to the name.
    pub fn display_description(&self) -> &str {
        self.description.as_deref().unwrap_or(&self.name)
    }
}

impl From<ToolDescriptor> for RemoteTool {
    fn from(tool: ToolDescriptor) -> Self {
        let capabilities = ToolCapabilities::from_meta(tool.meta.as_ref());
        Self {
            name: tool.name,
            description: tool.description,
            input_schema: tool.input_schema,
            meta: tool.meta,
            capabilities,
        }
    }
}

/// A connected server and its complete tool list.
pub struct RemoteServer {
    pub endpoint: String,
    pub info: ServerInfo,
    pub tools: Vec<RemoteTool>,
    pub(crate) transport: Arc<dyn ToolTransport>,
}

impl RemoteServer {
    pub fn tool(&self, name: &str) -> Option<&RemoteTool> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn transport(&self) -> &Arc<dyn ToolTransport> {
        &self.transport
    }
}

impl std::fmt::Debug for RemoteServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteServer")
            .field("endpoint", &self.endpoint)
            .field("info", &self.info)
            .field("tools", &self.tools.len())
            .finish()
    }
}
