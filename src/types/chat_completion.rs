use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{ChatMessage, Model, Role, Usage};

/// Parameters for one chat completion request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatCompletionRequest {
    /// The model that will complete the conversation.
    pub model: Model,

    /// Ordered, role-tagged conversation messages.
    pub messages: Vec<ChatMessage>,

    /// Sampling temperature.
    pub temperature: f32,

    /// Maximum number of tokens to generate.
    pub max_tokens: u32,
}

impl ChatCompletionRequest {
    /// Create a new request.
    pub fn new(model: Model, messages: Vec<ChatMessage>, temperature: f32, max_tokens: u32) -> Self {
        Self {
            model,
            messages,
            temperature,
            max_tokens,
        }
    }
}

/// A response from the chat completion endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChatCompletionResponse {
    /// Unique response identifier.
    #[serde(default)]
    pub id: String,

    /// The model that produced the response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Candidate completions, in service order.
    #[serde(default)]
    pub choices: Vec<Choice>,

    /// Token usage for the request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// One candidate completion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Choice {
    /// Position of this choice in the response.
    #[serde(default)]
    pub index: u32,

    /// The generated assistant message.
    pub message: ResponseMessage,

    /// Why generation stopped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// A message as returned by the service.
///
/// `content` is null when the model refused or the completion was filtered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseMessage {
    /// The role of the message author.
    #[serde(default = "assistant_role")]
    pub role: Role,

    /// Generated text, if any.
    #[serde(default)]
    pub content: Option<String>,

    /// Refusal explanation, if the model declined to answer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refusal: Option<String>,
}

fn assistant_role() -> Role {
    Role::Assistant
}

impl ResponseMessage {
    /// Create an assistant message with `content`.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Some(content.into()),
            refusal: None,
        }
    }

    /// The generated text, or `""` when the service returned none.
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }
}

impl ChatCompletionResponse {
    /// Create a response carrying one assistant choice per content string.
    pub fn with_contents<S: Into<String>>(contents: impl IntoIterator<Item = S>) -> Self {
        let choices = contents
            .into_iter()
            .enumerate()
            .map(|(index, content)| Choice {
                index: index as u32,
                message: ResponseMessage::assistant(content),
                finish_reason: Some("stop".to_string()),
            })
            .collect();
        Self {
            choices,
            ..Self::default()
        }
    }

    /// Returns the content of the first choice; null content reads as `""`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoChoices`] when the service returned no candidates.
    pub fn first_content(&self) -> Result<&str> {
        self.choices
            .first()
            .map(|choice| choice.message.text())
            .ok_or_else(|| Error::no_choices(format!("response {:?} carried no choices", self.id)))
    }
}
