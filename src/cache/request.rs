//! Priming request construction.

use serde::Serialize;

use super::tokens::{estimate_tokens, MESSAGE_RESERVE};
use crate::watcher::FileSnapshot;

/// Output cap for priming requests; the generated text is discarded.
pub const PRIMING_MAX_TOKENS: u32 = 10;

/// Fixed user turn sent after the file content.
const USER_PROMPT: &str = "Analyze this file and be ready to answer questions about it.";

/// Prompt text for priming one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimingPrompt {
    system: String,
}

impl PrimingPrompt {
    /// Frame a snapshot's content in a short system message.
    #[must_use]
    pub fn new(snapshot: &FileSnapshot) -> Self {
        let language = snapshot.record.language.unwrap_or("");
        let system = format!(
            "You are analyzing the file: {}\n\n```{}\n{}\n```",
            snapshot.path(),
            language,
            snapshot.content
        );
        Self { system }
    }

    /// The framed system message.
    #[must_use]
    pub fn system(&self) -> &str {
        &self.system
    }

    /// Estimated tokens for the whole request, message overhead included.
    #[must_use]
    pub fn estimated_tokens(&self) -> usize {
        estimate_tokens(self.system.as_str()) + MESSAGE_RESERVE
    }

    /// Build the completion request body for `model`.
    #[must_use]
    pub fn into_request(self, model: &str) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: model.to_string(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: self.system,
                },
                ChatMessage {
                    role: "user",
                    content: USER_PROMPT.to_string(),
                },
            ],
            max_tokens: PRIMING_MAX_TOKENS,
            temperature: 0.0,
        }
    }
}

/// OpenAI-compatible chat completion request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// One chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}
