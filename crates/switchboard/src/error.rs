//! Error taxonomy.
//!
//! Server lifecycle failures are reported to the caller and never leave a
//! half-registered server behind. Tool failures on the remote side are data
//! (see [`crate::ToolOutput`]); only transport failures surface as
//! [`ToolInvokeError`].

use std::path::PathBuf;

use crate::media::MediaKind;

/// Failure from the underlying remote tool transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error(transparent)]
    Client(#[from] patchcord::ClientError),

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The endpoint string is not a usable URL.
    #[error("invalid endpoint '{endpoint}': {reason}")]
    Connection { endpoint: String, reason: String },

    #[error("failed to connect to {endpoint}: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: TransportError,
    },

    #[error("failed to list tools on {endpoint}: {source}")]
    Listing {
        endpoint: String,
        #[source]
        source: TransportError,
    },

    /// A request to an already-connected server failed.
    #[error("request to {endpoint} failed: {source}")]
    Request {
        endpoint: String,
        #[source]
        source: TransportError,
    },

    #[error("no connected server at {0}")]
    NotConnected(String),

    #[error("resource {uri} on {endpoint} has no HTML content")]
    ResourceNotFound { endpoint: String, uri: String },
}

impl ServerError {
    pub fn endpoint(&self) -> &str {
        match self {
            ServerError::Connection { endpoint, .. }
            | ServerError::Transport { endpoint, .. }
            | ServerError::Listing { endpoint, .. }
            | ServerError::Request { endpoint, .. }
            | ServerError::ResourceNotFound { endpoint, .. } => endpoint,
            ServerError::NotConnected(endpoint) => endpoint,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ToolInvokeError {
    #[error("transport failure calling '{tool}': {source}")]
    Transport {
        tool: String,
        #[source]
        source: ServerError,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum MediaDecodeError {
    #[error("{kind} payload is not valid base64: {source}")]
    InvalidPayload {
        kind: MediaKind,
        #[source]
        source: base64::DecodeError,
    },

    #[error("no file extension known for {kind} media type '{mime_type}'")]
    UnknownMediaType { kind: MediaKind, mime_type: String },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures of the generative session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("model backend error: {0}")]
    Backend(String),

    #[error(transparent)]
    Tool(#[from] ToolInvokeError),

    #[error("gave up after {0} tool-calling rounds")]
    ToolIterations(usize),

    #[error("model returned no choices")]
    EmptyResponse,

    #[error("session is already responding")]
    Busy,
}

#[derive(Debug, thiserror::Error)]
pub enum ConversationError {
    #[error("conversation is not initialized")]
    NotReady,

    /// Another server reconfiguration is still running.
    #[error("server set is being reconfigured")]
    Busy,

    #[error("failed to connect: {}", summarize(.failures))]
    Connect { failures: Vec<ServerError> },

    #[error(transparent)]
    Session(#[from] SessionError),
}

fn summarize(failures: &[ServerError]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors returned to an embedded widget. Rendered as the bridge error string.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("unknown bridge message '{0}'")]
    UnknownMessage(String),

    #[error("invalid {message} body: {reason}")]
    MalformedBody { message: String, reason: String },

    #[error("tool '{0}' does not exist")]
    UnknownTool(String),

    #[error("tool '{0}' is not callable from a widget")]
    Unauthorized(String),

    #[error(transparent)]
    Invoke(#[from] ToolInvokeError),

    #[error(transparent)]
    Conversation(#[from] ConversationError),

    #[error("bridge is closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_error_lists_every_failure() {
        let err = ConversationError::Connect {
            failures: vec![
                ServerError::Connection {
                    endpoint: "nope".into(),
                    reason: "relative URL without a base".into(),
                },
                ServerError::NotConnected("http://b/mcp".into()),
            ],
        };
        let text = err.to_string();
        assert!(text.contains("invalid endpoint 'nope'"));
        assert!(text.contains("http://b/mcp"));
    }

    #[test]
    fn test_server_error_endpoint() {
        let err = ServerError::Listing {
            endpoint: "http://a/mcp".into(),
            source: TransportError::Other("boom".into()),
        };
        assert_eq!(err.endpoint(), "http://a/mcp");
    }
}
