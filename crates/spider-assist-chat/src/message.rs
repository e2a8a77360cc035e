use std::fmt;

/// Speaker of a conversation turn.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Synthesized instruction text; only ever sent, never stored in history.
    System,
    /// Text typed by the user.
    User,
    /// Text produced by the model.
    Assistant,
}

impl Role {
    /// Returns the wire name of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a chat conversation, serialized as `{role, content}`.
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    /// Creates a turn with an explicit role.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Creates a system turn.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Creates a user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Creates an assistant turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Builds the message list for one request: a fresh system turn first, then
/// the visible history with any stored system turns skipped.
pub fn request_messages(
    system_prompt: &str,
    history: &[ConversationTurn],
) -> Vec<ConversationTurn> {
    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.push(ConversationTurn::system(system_prompt));
    messages.extend(
        history
            .iter()
            .filter(|turn| turn.role != Role::System)
            .cloned(),
    );
    messages
}
