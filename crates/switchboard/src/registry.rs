//! Remote tools wrapped as locally callable functions.

use std::sync::Arc;

use genschema::{GenerationSchema, SchemaError};
use serde_json::{Map, Value};

use crate::error::ToolInvokeError;
use crate::events::{ConversationEvent, EventBus, RenderParams, ToolCallOrigin};
use crate::media::MediaStore;
use crate::output::ToolOutput;
use crate::servers::ServerOrchestrator;
use crate::tool::{RemoteTool, ToolCapabilities};

/// Result of one remote call, normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub output: ToolOutput,
    /// The server flagged the result as an error.
    pub is_error: bool,
    pub structured_content: Option<Value>,
}

/// A listed tool whose schema could not become a generation schema.
#[derive(Debug, Clone)]
pub struct SkippedTool {
    pub endpoint: String,
    pub tool: String,
    pub error: SchemaError,
}

pub struct RegisteredTool {
    endpoint: String,
    tool: RemoteTool,
    parameters: GenerationSchema,
    servers: Arc<ServerOrchestrator>,
    events: EventBus,
    media: Arc<MediaStore>,
}

impl RegisteredTool {
    pub fn name(&self) -> &str {
        &self.tool.name
    }

    pub fn description(&self) -> &str {
        self.tool.display_description()
    }

    /// Endpoint of the owning server.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn parameters(&self) -> &GenerationSchema {
        &self.parameters
    }

    pub fn capabilities(&self) -> &ToolCapabilities {
        &self.tool.capabilities
    }

    pub fn remote(&self) -> &RemoteTool {
        &self.tool
    }

    /// Call the tool with model-produced arguments.
    ///
    /// Undecodable arguments are replaced by an empty set. A result flagged
    /// `isError` is returned as output, led by the error text. Only a transport
    /// failure is an `Err`.
    #[tracing::instrument(skip(self, raw_arguments), fields(tool.name = %self.tool.name, mcp.endpoint = %self.endpoint))]
    pub async fn invoke(&self, raw_arguments: &str) -> Result<ToolOutput, ToolInvokeError> {
        let arguments = decode_arguments(raw_arguments);
        let invocation = self.execute(arguments, ToolCallOrigin::Model).await?;
        Ok(invocation.output)
    }

    /// Call on behalf of an embedded widget. Does not surface a new app, and
    /// its tool-use events carry [`ToolCallOrigin::Widget`].
    #[tracing::instrument(skip(self, arguments), fields(tool.name = %self.tool.name, mcp.endpoint = %self.endpoint))]
    pub async fn invoke_from_widget(
        &self,
        arguments: Map<String, Value>,
    ) -> Result<ToolInvocation, ToolInvokeError> {
        self.execute(Some(arguments), ToolCallOrigin::Widget).await
    }

    async fn execute(
        &self,
        arguments: Option<Map<String, Value>>,
        origin: ToolCallOrigin,
    ) -> Result<ToolInvocation, ToolInvokeError> {
        let message = tool_use_message(&self.tool.name, arguments.as_ref());
        tracing::info!(?origin, "{}", message);

        self.events.emit(ConversationEvent::ToolUseBegan {
            endpoint: self.endpoint.clone(),
            tool: self.tool.name.clone(),
            origin,
            arguments: arguments.clone(),
            message,
        });
        let _ended = ToolUseEnded {
            events: &self.events,
            endpoint: &self.endpoint,
            tool: &self.tool.name,
            origin,
        };

        let result = self
            .servers
            .call_tool(
                &self.endpoint,
                &self.tool.name,
                arguments.clone().unwrap_or_default(),
            )
            .await
            .map_err(|source| ToolInvokeError::Transport {
                tool: self.tool.name.clone(),
                source,
            })?;

        let mut output = ToolOutput::from_contents_lenient(&result.content, &self.media);

        if result.is_error {
            tracing::warn!("tool reported an error");
            output.mark_error();
        } else if origin == ToolCallOrigin::Model {
            self.surface_app(arguments.as_ref(), &result);
        }

        Ok(ToolInvocation {
            output,
            is_error: result.is_error,
            structured_content: result.structured_content,
        })
    }

    fn surface_app(&self, arguments: Option<&Map<String, Value>>, result: &patchcord::CallToolResult) {
        let Some(uri) = self.tool.capabilities.output_template.as_deref() else {
            return;
        };

        match RenderParams::new(&self.endpoint, &self.tool.name, uri, arguments, result) {
            Ok(params) => {
                tracing::debug!(resource.uri = %uri, "app available");
                self.events.emit(ConversationEvent::AppAvailable(params));
            }
            Err(e) => tracing::warn!(error = %e, "could not build render params"),
        }
    }
}

/// Emits `ToolUseEnded` on drop.
struct ToolUseEnded<'a> {
    events: &'a EventBus,
    endpoint: &'a str,
    tool: &'a str,
    origin: ToolCallOrigin,
}

impl Drop for ToolUseEnded<'_> {
    fn drop(&mut self) {
        self.events.emit(ConversationEvent::ToolUseEnded {
            endpoint: self.endpoint.to_string(),
            tool: self.tool.to_string(),
            origin: self.origin,
        });
    }
}

fn decode_arguments(raw: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Map<String, Value>>(raw) {
        Ok(arguments) => Some(arguments),
        Err(e) => {
            tracing::warn!(error = %e, "undecodable tool arguments, calling with none");
            None
        }
    }
}

fn tool_use_message(tool: &str, arguments: Option<&Map<String, Value>>) -> String {
    let arguments = arguments
        .and_then(|args| serde_json::to_string(args).ok())
        .unwrap_or_else(|| "(No args).".to_string());
    format!("[Using Tool] Name: {}. Arguments: {}", tool, arguments)
}

/// The tool set handed to a generative session.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<RegisteredTool>>,
    skipped: Vec<SkippedTool>,
}

impl ToolRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Register every tool of every live server.
    ///
    /// A tool whose schema does not convert is left out and recorded in
    /// [`ToolRegistry::skipped`]; the others are unaffected.
    pub async fn build(
        servers: Arc<ServerOrchestrator>,
        events: EventBus,
        media: Arc<MediaStore>,
    ) -> Self {
        let mut registry = Self::default();

        for (server, tool) in servers.aggregated_tools().await {
            match GenerationSchema::from_tool_schema(&tool.input_schema) {
                Ok(parameters) => registry.tools.push(Arc::new(RegisteredTool {
                    endpoint: server.endpoint.clone(),
                    tool,
                    parameters,
                    servers: servers.clone(),
                    events: events.clone(),
                    media: media.clone(),
                })),
                Err(error) => {
                    tracing::warn!(
                        tool.name = %tool.name,
                        mcp.endpoint = %server.endpoint,
                        error = %error,
                        "skipping tool with unusable schema"
                    );
                    registry.skipped.push(SkippedTool {
                        endpoint: server.endpoint.clone(),
                        tool: tool.name,
                        error,
                    });
                }
            }
        }

        registry
    }

    pub fn tools(&self) -> &[Arc<RegisteredTool>] {
        &self.tools
    }

    pub fn skipped(&self) -> &[SkippedTool] {
        &self.skipped
    }

    /// First tool with this name, in server connection order.
    pub fn get(&self, name: &str) -> Option<&Arc<RegisteredTool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn find(&self, endpoint: &str, name: &str) -> Option<&Arc<RegisteredTool>> {
        self.tools
            .iter()
            .find(|t| t.endpoint() == endpoint && t.name() == name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
