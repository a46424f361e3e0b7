//! Conversation history and its outbound formats
//!
//! History is owned by the caller. This module only shapes it for a
//! backend: either a strictly alternating message list for chat APIs that
//! reject repeated roles, or a single flat prompt for completion APIs.

use serde::{Deserialize, Serialize};

/// Content of the synthetic user turn that opens a conversation led by the assistant
pub const CONVERSATION_PLACEHOLDER: &str = "[Starting conversation]";

/// Speaker of a logged message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// Label used in flat prompts
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::System => "System",
            Self::User => "User",
            Self::Assistant => "Assistant",
        }
    }
}

/// A message in the caller's conversation log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
}

impl ConversationMessage {
    /// System instruction message
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Message typed or spoken by the learner
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Reply from the tutor
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Role accepted by alternation-constrained chat backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// A message ready to send to a chat backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedMessage {
    pub role: ChatRole,
    pub content: String,
}

/// Build a strictly alternating user/assistant sequence
///
/// System entries in `history` are dropped; `system_prompt`, when present,
/// is prefixed to the first user message instead. The result always starts
/// with a user message and ends with `prompt`.
#[must_use]
pub fn normalize(
    prompt: &str,
    system_prompt: Option<&str>,
    history: &[ConversationMessage],
) -> Vec<NormalizedMessage> {
    let turns = history
        .iter()
        .filter_map(|message| {
            let role = match message.role {
                Role::System => return None,
                Role::User => ChatRole::User,
                Role::Assistant => ChatRole::Assistant,
            };
            Some((role, message.content.as_str()))
        })
        .chain(std::iter::once((ChatRole::User, prompt)));

    let mut messages: Vec<NormalizedMessage> = Vec::with_capacity(history.len() + 2);
    for (role, content) in turns {
        match messages.last_mut() {
            Some(last) if last.role == role => {
                last.content.push_str("\n\n");
                last.content.push_str(content);
            }
            _ => messages.push(NormalizedMessage {
                role,
                content: content.to_string(),
            }),
        }
    }

    if messages.first().is_some_and(|m| m.role == ChatRole::Assistant) {
        messages.insert(
            0,
            NormalizedMessage {
                role: ChatRole::User,
                content: CONVERSATION_PLACEHOLDER.to_string(),
            },
        );
    }

    if let Some(system) = system_prompt.filter(|s| !s.trim().is_empty())
        && let Some(first_user) = messages.iter_mut().find(|m| m.role == ChatRole::User)
    {
        first_user.content = format!("[Instructions: {system}]\n\n{}", first_user.content);
    }

    messages
}

/// Build a single prompt embedding the system prompt and history
#[must_use]
pub fn flat_prompt(
    prompt: &str,
    system_prompt: Option<&str>,
    history: &[ConversationMessage],
) -> String {
    let mut out = String::new();

    if let Some(system) = system_prompt.filter(|s| !s.is_empty()) {
        out.push_str(system);
        out.push_str("\n\n");
    }

    if !history.is_empty() {
        out.push_str("Previous conversation:\n");
        for message in history {
            out.push_str(message.role.label());
            out.push_str(": ");
            out.push_str(&message.content);
            out.push('\n');
        }
        out.push('\n');
    }

    out.push_str("User says: ");
    out.push_str(prompt);
    out
}

/// Bounded conversation log kept by the caller between turns
#[derive(Debug, Clone)]
pub struct ConversationLog {
    messages: Vec<ConversationMessage>,
    max_len: usize,
    include_system: bool,
}

impl Default for ConversationLog {
    fn default() -> Self {
        Self::new(20, false)
    }
}

impl ConversationLog {
    /// Create a log retaining at most `max_len` messages
    #[must_use]
    pub fn new(max_len: usize, include_system: bool) -> Self {
        Self {
            messages: Vec::with_capacity(max_len),
            max_len,
            include_system,
        }
    }

    /// Append a message, dropping the oldest entries beyond the limit
    ///
    /// System messages are ignored unless the log was created to keep them.
    pub fn push(&mut self, message: ConversationMessage) {
        if message.role == Role::System && !self.include_system {
            return;
        }
        self.messages.push(message);
        let excess = self.messages.len().saturating_sub(self.max_len);
        self.messages.drain(..excess);
    }

    /// Record a completed exchange
    pub fn record_exchange(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        self.push(ConversationMessage::user(user));
        self.push(ConversationMessage::assistant(assistant));
    }

    /// Messages oldest first
    #[must_use]
    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    /// Number of stored messages
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether nothing has been recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Forget the whole conversation
    pub fn clear(&mut self) {
        self.messages.clear();
    }
}
