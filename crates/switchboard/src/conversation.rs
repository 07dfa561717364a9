//! Session lifecycle and the message timeline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, Mutex, RwLock};
use uuid::Uuid;

use crate::error::{ConversationError, SessionError};
use crate::events::{ConversationEvent, EventBus, RenderParams, ToolCallOrigin};
use crate::media::MediaStore;
use crate::registry::{RegisteredTool, ToolRegistry};
use crate::servers::ServerOrchestrator;
use crate::session::{instructions_for, GenerativeSession, SessionFactory, StructuredResponse};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Ready,
    Responding,
}

/// One timeline entry. Two entries are equal when their ids are.
#[derive(Debug, Clone)]
pub enum ConversationMessage {
    UserPrompt {
        id: Uuid,
        at: DateTime<Utc>,
        text: String,
    },
    ToolUseNotice {
        id: Uuid,
        at: DateTime<Utc>,
        text: String,
    },
    AppSurface {
        id: Uuid,
        at: DateTime<Utc>,
        params: RenderParams,
    },
    AssistantResponse {
        id: Uuid,
        at: DateTime<Utc>,
        response: StructuredResponse,
    },
}

impl ConversationMessage {
    fn user_prompt(text: impl Into<String>) -> Self {
        Self::UserPrompt {
            id: Uuid::new_v4(),
            at: Utc::now(),
            text: text.into(),
        }
    }

    fn tool_use_notice(text: impl Into<String>) -> Self {
        Self::ToolUseNotice {
            id: Uuid::new_v4(),
            at: Utc::now(),
            text: text.into(),
        }
    }

    fn app_surface(params: RenderParams) -> Self {
        Self::AppSurface {
            id: Uuid::new_v4(),
            at: Utc::now(),
            params,
        }
    }

    fn assistant_response(response: StructuredResponse) -> Self {
        Self::AssistantResponse {
            id: Uuid::new_v4(),
            at: Utc::now(),
            response,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Self::UserPrompt { id, .. }
            | Self::ToolUseNotice { id, .. }
            | Self::AppSurface { id, .. }
            | Self::AssistantResponse { id, .. } => *id,
        }
    }

    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Self::UserPrompt { at, .. }
            | Self::ToolUseNotice { at, .. }
            | Self::AppSurface { at, .. }
            | Self::AssistantResponse { at, .. } => *at,
        }
    }
}

impl PartialEq for ConversationMessage {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for ConversationMessage {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespondOutcome {
    Answered(StructuredResponse),
    /// A turn was already in flight; the prompt was not recorded.
    Dropped,
}

struct Active {
    session: Arc<dyn GenerativeSession>,
    registry: Arc<ToolRegistry>,
}

/// Owns the generative session and rebuilds it whenever the server set changes.
///
/// Every rebuild creates a fresh session from the current tool set and its
/// instructions. `respond` is single-flight: a prompt arriving while a turn is
/// running is dropped.
pub struct ConversationOrchestrator {
    servers: Arc<ServerOrchestrator>,
    factory: Arc<dyn SessionFactory>,
    events: EventBus,
    media: Arc<MediaStore>,
    active: RwLock<Option<Active>>,
    reconfigure: Mutex<()>,
    responding: AtomicBool,
    timeline: RwLock<Vec<ConversationMessage>>,
}

impl ConversationOrchestrator {
    pub fn new(
        servers: Arc<ServerOrchestrator>,
        factory: Arc<dyn SessionFactory>,
        events: EventBus,
        media: Arc<MediaStore>,
    ) -> Self {
        Self {
            servers,
            factory,
            events,
            media,
            active: RwLock::new(None),
            reconfigure: Mutex::new(()),
            responding: AtomicBool::new(false),
            timeline: RwLock::new(Vec::new()),
        }
    }

    /// Build the first session from whatever servers are connected now.
    pub async fn initialize(&self) -> Result<(), ConversationError> {
        let _reconfiguring = self
            .reconfigure
            .try_lock()
            .map_err(|_| ConversationError::Busy)?;
        self.rebuild().await
    }

    /// Replace the server set. On a connection failure the session keeps its
    /// previous tool set.
    #[tracing::instrument(skip(self, endpoints), fields(count = endpoints.len()))]
    pub async fn set_servers<S: AsRef<str>>(&self, endpoints: &[S]) -> Result<(), ConversationError> {
        let _reconfiguring = self
            .reconfigure
            .try_lock()
            .map_err(|_| ConversationError::Busy)?;

        self.servers.disconnect_all().await;
        let report = self.servers.connect_many(endpoints).await;
        if !report.is_success() {
            return Err(ConversationError::Connect {
                failures: report.failures,
            });
        }
        self.rebuild().await
    }

    /// Connect additional servers, keeping the current ones.
    #[tracing::instrument(skip(self, endpoints), fields(count = endpoints.len()))]
    pub async fn add_servers<S: AsRef<str>>(&self, endpoints: &[S]) -> Result<(), ConversationError> {
        let _reconfiguring = self
            .reconfigure
            .try_lock()
            .map_err(|_| ConversationError::Busy)?;

        let report = self.servers.connect_many(endpoints).await;
        if !report.is_success() {
            return Err(ConversationError::Connect {
                failures: report.failures,
            });
        }
        self.rebuild().await
    }

    async fn rebuild(&self) -> Result<(), ConversationError> {
        let registry = Arc::new(
            ToolRegistry::build(self.servers.clone(), self.events.clone(), self.media.clone()).await,
        );
        let instructions = instructions_for(&registry);
        let session = self.factory.create(registry.clone(), instructions).await?;

        tracing::info!(
            tools = registry.len(),
            skipped = registry.skipped().len(),
            "session rebuilt"
        );
        *self.active.write().await = Some(Active { session, registry });
        Ok(())
    }

    /// Run one turn.
    ///
    /// Tool-use notices and app surfaces are recorded as the session raises
    /// them, so they are visible in the timeline while the turn is running and
    /// always precede the answer. Tool calls made by widgets are not recorded.
    /// A failed turn records the error text as the answer and returns the error.
    #[tracing::instrument(skip(self, prompt))]
    pub async fn respond(&self, prompt: &str) -> Result<RespondOutcome, ConversationError> {
        let session = self
            .active
            .read()
            .await
            .as_ref()
            .map(|active| active.session.clone())
            .ok_or(ConversationError::NotReady)?;

        if self.responding.swap(true, Ordering::AcqRel) {
            tracing::debug!("already responding, dropping prompt");
            return Ok(RespondOutcome::Dropped);
        }
        let _ready = ResetOnDrop(&self.responding);

        let mut events = self.events.subscribe();
        let user_prompt = ConversationMessage::user_prompt(prompt);
        let prompt_id = user_prompt.id();
        self.append(user_prompt).await;

        let turn = session.respond(prompt);
        tokio::pin!(turn);
        let mut listening = true;
        let result = loop {
            tokio::select! {
                biased;
                received = events.recv(), if listening => match received {
                    Ok(event) => self.record(event).await,
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "timeline missed conversation events");
                    }
                    Err(RecvError::Closed) => listening = false,
                },
                result = &mut turn => break result,
            }
        };
        self.drain_events(&mut events).await;

        match result {
            Ok(response) => {
                self.append(ConversationMessage::assistant_response(response.clone()))
                    .await;
                Ok(RespondOutcome::Answered(response))
            }
            Err(SessionError::Busy) => {
                tracing::debug!("session busy, dropping prompt");
                self.timeline.write().await.retain(|m| m.id() != prompt_id);
                Ok(RespondOutcome::Dropped)
            }
            Err(e) => {
                tracing::warn!(error = %e, "turn failed");
                self.append(ConversationMessage::assistant_response(
                    StructuredResponse::text(format!("Error: {}", e)),
                ))
                .await;
                Err(e.into())
            }
        }
    }

    /// Record whatever was published between the last poll and the end of the turn.
    async fn drain_events(&self, events: &mut broadcast::Receiver<ConversationEvent>) {
        loop {
            match events.try_recv() {
                Ok(event) => self.record(event).await,
                Err(TryRecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "timeline missed conversation events");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
    }

    async fn record(&self, event: ConversationEvent) {
        match event {
            ConversationEvent::ToolUseBegan {
                origin: ToolCallOrigin::Model,
                message,
                ..
            } => {
                self.append(ConversationMessage::tool_use_notice(message)).await;
            }
            ConversationEvent::AppAvailable(params) => {
                self.append(ConversationMessage::app_surface(params)).await;
            }
            ConversationEvent::ToolUseBegan { .. } | ConversationEvent::ToolUseEnded { .. } => {}
        }
    }

    async fn append(&self, message: ConversationMessage) {
        self.timeline.write().await.push(message);
    }

    pub async fn phase(&self) -> Phase {
        if self.responding.load(Ordering::Acquire) {
            Phase::Responding
        } else if self.active.read().await.is_some() {
            Phase::Ready
        } else {
            Phase::Uninitialized
        }
    }

    pub async fn timeline(&self) -> Vec<ConversationMessage> {
        self.timeline.read().await.clone()
    }

    /// The most recent app surface in the timeline.
    pub async fn last_app_surface(&self) -> Option<RenderParams> {
        self.timeline
            .read()
            .await
            .iter()
            .rev()
            .find_map(|message| match message {
                ConversationMessage::AppSurface { params, .. } => Some(params.clone()),
                _ => None,
            })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConversationEvent> {
        self.events.subscribe()
    }

    pub async fn registry(&self) -> Option<Arc<ToolRegistry>> {
        self.active
            .read()
            .await
            .as_ref()
            .map(|active| active.registry.clone())
    }

    pub async fn tool(&self, endpoint: &str, name: &str) -> Option<Arc<RegisteredTool>> {
        self.registry()
            .await
            .and_then(|registry| registry.find(endpoint, name).cloned())
    }

    pub fn servers(&self) -> &Arc<ServerOrchestrator> {
        &self.servers
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn media(&self) -> &Arc<MediaStore> {
        &self.media
    }
}

struct ResetOnDrop<'a>(&'a AtomicBool);

impl Drop for ResetOnDrop<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_compare_by_id() {
        let a = ConversationMessage::user_prompt("hello");
        let mut b = a.clone();
        if let ConversationMessage::UserPrompt { text, .. } = &mut b {
            *text = "edited".into();
        }
        assert_eq!(a, b);
        assert_ne!(a, ConversationMessage::user_prompt("hello"));
    }
}
