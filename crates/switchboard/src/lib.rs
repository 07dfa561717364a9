//! Remote MCP tools, exposed as functions to a generative session.
//!
//! The pieces, leaf first:
//!
//! - [`output`]: normalize a tool result into [`ToolOutput`], writing binary
//!   payloads through [`MediaStore`].
//! - [`servers`]: the live set of connected [`RemoteServer`]s.
//! - [`registry`]: each remote tool wrapped as a locally callable function.
//! - [`conversation`]: session lifecycle and the message timeline.
//! - [`bridge`]: the request/reply channel an embedded widget uses to call
//!   tools and post follow-up prompts.
//!
//! Nothing here installs a tracing subscriber; binaries do that.

pub mod bridge;
pub mod conversation;
pub mod error;
pub mod events;
pub mod media;
pub mod output;
pub mod provider;
pub mod registry;
pub mod servers;
pub mod session;
pub mod tool;
pub mod transport;

pub use bridge::{BridgeHandle, BridgeReply, BridgeRequest, WidgetBridge};
pub use conversation::{ConversationMessage, ConversationOrchestrator, Phase, RespondOutcome};
pub use error::{
    BridgeError, ConversationError, MediaDecodeError, ServerError, SessionError, ToolInvokeError,
    TransportError,
};
pub use events::{ConversationEvent, EventBus, RenderParams, ToolCallOrigin};
pub use media::{extension_for, file_stem_for, MediaKind, MediaStore};
pub use output::ToolOutput;
pub use provider::{OpenAiSession, OpenAiSessionFactory, OpenAiSessionOptions};
pub use registry::{RegisteredTool, SkippedTool, ToolInvocation, ToolRegistry};
pub use servers::{ConnectReport, ServerOrchestrator};
pub use session::{instructions_for, GenerativeSession, SessionFactory, StructuredResponse};
pub use tool::{RemoteServer, RemoteTool, ToolCapabilities};
pub use transport::{HttpConnector, ToolTransport, TransportConnector};
