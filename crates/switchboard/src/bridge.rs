//! Request/reply channel between an embedded widget and the host.
//!
//! A widget can ask for two things: call a tool on the server that rendered
//! it, or post a follow-up prompt. Every request gets exactly one reply, with
//! either a result or an error string.

use std::sync::Arc;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Map, Value};
use tokio::sync::{mpsc, oneshot};

use crate::conversation::{ConversationOrchestrator, RespondOutcome};
use crate::error::BridgeError;
use crate::events::RenderParams;

const CALL_TOOL: &str = "callTool";
const SEND_FOLLOW_UP: &str = "sendFollowUpMessage";
const CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Clone, PartialEq)]
pub enum BridgeRequest {
    CallTool {
        name: String,
        args: Map<String, Value>,
    },
    SendFollowUp {
        prompt: String,
    },
}

#[derive(Deserialize)]
struct CallToolBody {
    name: String,
    #[serde(default)]
    args: Map<String, Value>,
}

#[derive(Deserialize)]
struct FollowUpBody {
    prompt: String,
}

impl BridgeRequest {
    /// Decode a named widget message.
    pub fn from_message(name: &str, body: &Value) -> Result<Self, BridgeError> {
        let malformed = |e: serde_json::Error| BridgeError::MalformedBody {
            message: name.to_string(),
            reason: e.to_string(),
        };

        match name {
            CALL_TOOL => {
                let body = CallToolBody::deserialize(body).map_err(malformed)?;
                Ok(BridgeRequest::CallTool {
                    name: body.name,
                    args: body.args,
                })
            }
            SEND_FOLLOW_UP => {
                let body = FollowUpBody::deserialize(body).map_err(malformed)?;
                Ok(BridgeRequest::SendFollowUp {
                    prompt: body.prompt,
                })
            }
            other => Err(BridgeError::UnknownMessage(other.to_string())),
        }
    }
}

/// Serializes as `{"result": ..., "error": ...}` with one side null.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeReply {
    Ok(Value),
    Err(String),
}

impl BridgeReply {
    pub fn is_ok(&self) -> bool {
        matches!(self, BridgeReply::Ok(_))
    }

    pub fn result(&self) -> Option<&Value> {
        match self {
            BridgeReply::Ok(value) => Some(value),
            BridgeReply::Err(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            BridgeReply::Ok(_) => None,
            BridgeReply::Err(message) => Some(message),
        }
    }
}

impl From<Result<Value, BridgeError>> for BridgeReply {
    fn from(result: Result<Value, BridgeError>) -> Self {
        match result {
            Ok(value) => BridgeReply::Ok(value),
            Err(e) => BridgeReply::Err(e.to_string()),
        }
    }
}

impl Serialize for BridgeReply {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("BridgeReply", 2)?;
        state.serialize_field("result", &self.result())?;
        state.serialize_field("error", &self.error())?;
        state.end()
    }
}

/// Host side of one rendered widget.
pub struct WidgetBridge {
    conversation: Arc<ConversationOrchestrator>,
    params: RenderParams,
}

impl WidgetBridge {
    pub fn new(conversation: Arc<ConversationOrchestrator>, params: RenderParams) -> Self {
        Self {
            conversation,
            params,
        }
    }

    pub fn params(&self) -> &RenderParams {
        &self.params
    }

    pub async fn handle(&self, request: BridgeRequest) -> BridgeReply {
        let result = match request {
            BridgeRequest::CallTool { name, args } => self.call_tool(&name, args).await,
            BridgeRequest::SendFollowUp { prompt } => self.follow_up(&prompt).await,
        };
        if let Err(e) = &result {
            tracing::warn!(error = %e, "widget request failed");
        }
        result.into()
    }

    /// Decode and handle a named message in one step.
    pub async fn handle_raw(&self, name: &str, body: &Value) -> BridgeReply {
        match BridgeRequest::from_message(name, body) {
            Ok(request) => self.handle(request).await,
            Err(e) => BridgeReply::Err(e.to_string()),
        }
    }

    #[tracing::instrument(skip(self, args), fields(mcp.endpoint = %self.params.server_endpoint))]
    async fn call_tool(&self, name: &str, args: Map<String, Value>) -> Result<Value, BridgeError> {
        let tool = self
            .conversation
            .tool(&self.params.server_endpoint, name)
            .await
            .ok_or_else(|| BridgeError::UnknownTool(name.to_string()))?;

        if !tool.capabilities().widget_accessible {
            return Err(BridgeError::Unauthorized(name.to_string()));
        }

        let invocation = tool.invoke_from_widget(args).await?;

        let mut reply = match serde_json::to_value(&invocation.output) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        reply.insert("isError".into(), Value::Bool(invocation.is_error));
        if let Some(structured) = invocation.structured_content {
            reply.insert("result".into(), Value::String(structured.to_string()));
            reply.insert("structuredContent".into(), structured);
        }
        Ok(Value::Object(reply))
    }

    async fn follow_up(&self, prompt: &str) -> Result<Value, BridgeError> {
        if let RespondOutcome::Dropped = self.conversation.respond(prompt).await? {
            tracing::debug!("follow-up dropped, a turn is in flight");
        }
        Ok(json!({}))
    }

    /// Serve requests on a task until every [`BridgeHandle`] is dropped.
    pub fn spawn(self) -> BridgeHandle {
        let (tx, mut rx) =
            mpsc::channel::<(BridgeRequest, oneshot::Sender<BridgeReply>)>(CHANNEL_CAPACITY);

        tokio::spawn(async move {
            while let Some((request, reply_to)) = rx.recv().await {
                let reply = self.handle(request).await;
                if reply_to.send(reply).is_err() {
                    tracing::debug!("widget went away before the reply");
                }
            }
        });

        BridgeHandle { tx }
    }
}

/// Sending side of a spawned [`WidgetBridge`].
#[derive(Clone)]
pub struct BridgeHandle {
    tx: mpsc::Sender<(BridgeRequest, oneshot::Sender<BridgeReply>)>,
}

impl BridgeHandle {
    pub async fn request(&self, request: BridgeRequest) -> BridgeReply {
        let (reply_to, reply) = oneshot::channel();
        if self.tx.send((request, reply_to)).await.is_err() {
            return BridgeReply::Err(BridgeError::Closed.to_string());
        }
        reply
            .await
            .unwrap_or_else(|_| BridgeReply::Err(BridgeError::Closed.to_string()))
    }

    pub async fn request_raw(&self, name: &str, body: &Value) -> BridgeReply {
        match BridgeRequest::from_message(name, body) {
            Ok(request) => self.request(request).await,
            Err(e) => BridgeReply::Err(e.to_string()),
        }
    }
}
