//! The generative session seam.

use std::sync::Arc;

use async_trait::async_trait;
use genschema::{GenerationSchema, SchemaError};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SessionError;
use crate::registry::ToolRegistry;

/// Final answer of one turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct StructuredResponse {
    /// Paths of image files the answer refers to.
    pub images: Vec<String>,
    /// Paths of audio files the answer refers to.
    pub audios: Vec<String>,
    /// Resource URIs the answer refers to.
    pub resources: Vec<String>,
    /// The answer text shown to the user.
    pub text_response: String,
}

impl StructuredResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text_response: text.into(),
            ..Default::default()
        }
    }

    /// Generation schema of this type, rendered as strict JSON Schema.
    pub fn response_schema() -> Result<Value, SchemaError> {
        let schema = schemars::schema_for!(StructuredResponse).to_value();
        Ok(GenerationSchema::from_tool_schema(&schema)?.to_json_schema())
    }
}

/// A model conversation that can call registered tools.
#[async_trait]
pub trait GenerativeSession: Send + Sync {
    /// Run one turn. Implementations reject a call while another is in flight.
    async fn respond(&self, prompt: &str) -> Result<StructuredResponse, SessionError>;

    fn is_responding(&self) -> bool;
}

/// Builds a fresh session for a tool set.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn create(
        &self,
        registry: Arc<ToolRegistry>,
        instructions: String,
    ) -> Result<Arc<dyn GenerativeSession>, SessionError>;
}

/// Instructions text for a registry.
pub fn instructions_for(registry: &ToolRegistry) -> String {
    if registry.is_empty() {
        return "You are a helpful assistant.\n**IMPORTANT**: You always answer user's question **concisely**."
            .to_string();
    }

    let mut text = String::from("You have access to the following tools.\n");
    for tool in registry.tools() {
        text.push_str(&format!("- {}: {}\n", tool.name(), tool.description()));
    }
    text.push_str("\nUse the tools to answer user's question properly. \n");
    text
}
