use std::fmt;

use serde::{Deserialize, Serialize};

/// Who authored a chat turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// Payload kind of a chat turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
}

/// A single turn in a conversation log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub content: String,
    pub role: Role,
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            role,
            kind: MessageKind::Text,
            image_url: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Assistant turn carrying a generated image reference.
    pub fn assistant_image(content: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            role: Role::Assistant,
            kind: MessageKind::Image,
            image_url: Some(image_url.into()),
        }
    }

    pub fn is_system(&self) -> bool {
        self.role == Role::System
    }

    /// `role: content` line used when a transcript is fed back to the model.
    pub fn render(&self) -> String {
        match (&self.kind, &self.image_url) {
            (MessageKind::Image, Some(url)) => format!("{}: [image] {}", self.role, url),
            _ => format!("{}: {}", self.role, self.content),
        }
    }
}

/// Render a slice of turns as one line per turn.
pub fn render_transcript(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(ChatMessage::render)
        .collect::<Vec<_>>()
        .join("\n")
}
