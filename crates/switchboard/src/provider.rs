//! OpenAI-compatible chat completions as a [`GenerativeSession`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::{
    ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessageArgs,
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessageArgs,
    ChatCompletionTool, ChatCompletionToolType, CreateChatCompletionRequestArgs, FunctionObject,
    ResponseFormat, ResponseFormatJsonSchema,
};
use async_openai::Client;
use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::Mutex;

use crate::error::SessionError;
use crate::registry::ToolRegistry;
use crate::session::{GenerativeSession, SessionFactory, StructuredResponse};

#[derive(Debug, Clone)]
pub struct OpenAiSessionOptions {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    /// Upper bound on tool-calling rounds per turn.
    pub max_tool_iterations: usize,
    pub timeout: Duration,
}

impl Default for OpenAiSessionOptions {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            max_tool_iterations: 8,
            timeout: Duration::from_secs(120),
        }
    }
}

pub struct OpenAiSessionFactory {
    options: OpenAiSessionOptions,
}

impl OpenAiSessionFactory {
    pub fn new(options: OpenAiSessionOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl SessionFactory for OpenAiSessionFactory {
    async fn create(
        &self,
        registry: Arc<ToolRegistry>,
        instructions: String,
    ) -> Result<Arc<dyn GenerativeSession>, SessionError> {
        Ok(Arc::new(OpenAiSession::new(
            self.options.clone(),
            registry,
            instructions,
        )?))
    }
}

/// One conversation against a chat completions endpoint.
///
/// The transcript starts with the instructions as the system message and grows
/// with every turn. Registry tools are advertised as functions; the final
/// answer is requested in the [`StructuredResponse`] shape.
pub struct OpenAiSession {
    client: Client<OpenAIConfig>,
    options: OpenAiSessionOptions,
    registry: Arc<ToolRegistry>,
    tools: Vec<ChatCompletionTool>,
    response_format: ResponseFormat,
    transcript: Mutex<Vec<ChatCompletionRequestMessage>>,
    responding: AtomicBool,
}

impl OpenAiSession {
    pub fn new(
        mut options: OpenAiSessionOptions,
        registry: Arc<ToolRegistry>,
        instructions: String,
    ) -> Result<Self, SessionError> {
        // A turn always gets at least one completion request.
        options.max_tool_iterations = options.max_tool_iterations.max(1);
        let mut config = OpenAIConfig::new().with_api_base(options.base_url.trim_end_matches('/'));
        if let Some(key) = &options.api_key {
            config = config.with_api_key(key);
        }

        let http = reqwest::Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|e| SessionError::Backend(e.to_string()))?;

        let tools = registry
            .tools()
            .iter()
            .map(|tool| ChatCompletionTool {
                r#type: ChatCompletionToolType::Function,
                function: FunctionObject {
                    name: tool.name().to_string(),
                    description: Some(tool.description().to_string()),
                    parameters: Some(tool.parameters().to_json_schema()),
                    strict: Some(true),
                },
            })
            .collect();

        let schema = StructuredResponse::response_schema()
            .map_err(|e| SessionError::Backend(format!("response schema: {}", e)))?;
        let response_format = ResponseFormat::JsonSchema {
            json_schema: ResponseFormatJsonSchema {
                description: None,
                name: "StructuredResponse".to_string(),
                schema: Some(schema),
                strict: Some(true),
            },
        };

        let system = ChatCompletionRequestSystemMessageArgs::default()
            .content(instructions)
            .build()
            .map_err(backend)?;

        Ok(Self {
            client: Client::with_config(config).with_http_client(http),
            options,
            registry,
            tools,
            response_format,
            transcript: Mutex::new(vec![system.into()]),
            responding: AtomicBool::new(false),
        })
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    async fn run_turn(
        &self,
        transcript: &mut Vec<ChatCompletionRequestMessage>,
    ) -> Result<StructuredResponse, SessionError> {
        for round in 0..self.options.max_tool_iterations {
            let mut request = CreateChatCompletionRequestArgs::default();
            request
                .model(&self.options.model)
                .messages(transcript.clone())
                .response_format(self.response_format.clone());
            if !self.tools.is_empty() {
                request.tools(self.tools.clone());
            }
            let request = request.build().map_err(backend)?;

            let response = self.client.chat().create(request).await.map_err(backend)?;
            let message = response
                .choices
                .into_iter()
                .next()
                .ok_or(SessionError::EmptyResponse)?
                .message;

            let calls = message.tool_calls.unwrap_or_default();
            if calls.is_empty() {
                let content = message.content.unwrap_or_default();
                transcript.push(
                    ChatCompletionRequestAssistantMessageArgs::default()
                        .content(content.clone())
                        .build()
                        .map_err(backend)?
                        .into(),
                );
                return Ok(parse_answer(&content));
            }

            tracing::debug!(round, calls = calls.len(), "model requested tools");

            let mut assistant = ChatCompletionRequestAssistantMessageArgs::default();
            assistant.tool_calls(calls.clone());
            if let Some(content) = message.content {
                assistant.content(content);
            }
            transcript.push(assistant.build().map_err(backend)?.into());

            let replies = join_all(calls.iter().map(|call| self.dispatch(call))).await;
            for (call, reply) in calls.iter().zip(replies) {
                transcript.push(
                    ChatCompletionRequestToolMessageArgs::default()
                        .tool_call_id(call.id.clone())
                        .content(reply?)
                        .build()
                        .map_err(backend)?
                        .into(),
                );
            }
        }

        Err(SessionError::ToolIterations(self.options.max_tool_iterations))
    }

    async fn dispatch(&self, call: &ChatCompletionMessageToolCall) -> Result<String, SessionError> {
        let Some(tool) = self.registry.get(&call.function.name) else {
            tracing::warn!(tool.name = %call.function.name, "model called an unknown tool");
            return Ok(format!("Tool '{}' does not exist.", call.function.name));
        };
        let output = tool.invoke(&call.function.arguments).await?;
        Ok(output.to_model_text())
    }
}

#[async_trait]
impl GenerativeSession for OpenAiSession {
    #[tracing::instrument(skip(self, prompt), fields(model = %self.options.model))]
    async fn respond(&self, prompt: &str) -> Result<StructuredResponse, SessionError> {
        if self.responding.swap(true, Ordering::AcqRel) {
            return Err(SessionError::Busy);
        }
        let _idle = Responding(&self.responding);

        let mut transcript = self.transcript.lock().await;
        let rollback = transcript.len();
        transcript.push(
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt)
                .build()
                .map_err(backend)?
                .into(),
        );

        let result = self.run_turn(&mut transcript).await;
        if result.is_err() {
            transcript.truncate(rollback);
        }
        result
    }

    fn is_responding(&self) -> bool {
        self.responding.load(Ordering::Acquire)
    }
}

/// Clears the responding flag on drop.
struct Responding<'a>(&'a AtomicBool);

impl Drop for Responding<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn parse_answer(content: &str) -> StructuredResponse {
    match serde_json::from_str::<StructuredResponse>(content) {
        Ok(answer) => answer,
        Err(e) => {
            tracing::debug!(error = %e, "answer is not structured, using it as text");
            StructuredResponse::text(content)
        }
    }
}

fn backend(e: OpenAIError) -> SessionError {
    SessionError::Backend(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_structured_answer() {
        let answer = parse_answer(
            r#"{"images": [], "audios": ["/tmp/a.wav"], "resources": [], "text_response": "done"}"#,
        );
        assert_eq!(answer.audios, vec!["/tmp/a.wav"]);
        assert_eq!(answer.text_response, "done");
    }

    #[test]
    fn test_plain_answer_becomes_text() {
        assert_eq!(parse_answer("just words"), StructuredResponse::text("just words"));
    }

    #[tokio::test]
    async fn test_session_without_tools_advertises_none() {
        let session = OpenAiSession::new(
            OpenAiSessionOptions::default(),
            Arc::new(ToolRegistry::empty()),
            "be brief".into(),
        )
        .unwrap();
        assert!(session.tools.is_empty());
        assert!(!session.is_responding());
        assert_eq!(session.transcript.lock().await.len(), 1);
    }
}
