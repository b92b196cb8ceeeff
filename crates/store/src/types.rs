use std::cmp::Ordering;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use super::ids::{ConversationId, MessageId, UserId};

/// Title given to every conversation until the first exchange produces one.
pub const DEFAULT_CONVERSATION_TITLE: &str = "New Conversation";

/// Namespace key for the persisted conversation-collection snapshot.
pub const CHATS_NAMESPACE: &str = "nexustalk-chats";

/// Namespace key for the persisted authenticated-user snapshot.
pub const AUTH_NAMESPACE: &str = "nexustalk-auth";

/// Chat speaker role as persisted and exchanged on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// One immutable message inside a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub id: MessageId,
    pub role: MessageRole,
    pub content: String,
    /// Unix seconds.
    pub created_at: u64,
}

/// A titled, ordered, append-only collection of messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRecord {
    pub id: ConversationId,
    pub title: String,
    pub messages: Vec<MessageRecord>,
    /// Unix seconds.
    pub created_at: u64,
    /// Unix seconds, refreshed on every title change and message append.
    pub updated_at: u64,
}

impl ConversationRecord {
    /// Mints a new empty conversation. A blank title falls back to the default.
    pub fn new(title: impl Into<String>) -> Self {
        let mut title = title.into();
        if title.trim().is_empty() {
            title = DEFAULT_CONVERSATION_TITLE.to_string();
        }

        let now = current_unix_timestamp_seconds();
        Self {
            id: ConversationId::new_v7(),
            title,
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_default_title(&self) -> bool {
        self.title == DEFAULT_CONVERSATION_TITLE
    }

    pub fn contains_message(&self, message_id: MessageId) -> bool {
        self.messages.iter().any(|message| message.id == message_id)
    }
}

/// Input for one message append. Carries its own id so appends are
/// idempotent: the id doubles as the dedup key for relay echoes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub id: MessageId,
    pub role: MessageRole,
    pub content: String,
    pub created_at: u64,
}

impl NewMessage {
    /// A locally authored user message, stamped now.
    pub fn user(content: impl Into<String>) -> Self {
        Self::local(MessageRole::User, content)
    }

    /// A locally produced assistant message, stamped now.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::local(MessageRole::Assistant, content)
    }

    /// A message received from the relay, keeping its original id and timestamp.
    pub fn received(
        id: MessageId,
        role: MessageRole,
        content: impl Into<String>,
        created_at: u64,
    ) -> Self {
        Self {
            id,
            role,
            content: content.into(),
            created_at,
        }
    }

    fn local(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new_v7(),
            role,
            content: content.into(),
            created_at: current_unix_timestamp_seconds(),
        }
    }
}

impl From<NewMessage> for MessageRecord {
    fn from(message: NewMessage) -> Self {
        Self {
            id: message.id,
            role: message.role,
            content: message.content,
            created_at: message.created_at,
        }
    }
}

/// The simulated authenticated user. Cleared on logout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: UserId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// Result of a mutation addressed at one conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    Applied,
    /// The conversation id is unknown; nothing changed.
    NotFound,
}

impl MutationOutcome {
    pub fn applied(self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// Result of one message append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    /// The message id already exists in the conversation; nothing changed.
    DuplicateMessage,
    /// The conversation id is unknown; nothing changed.
    UnknownConversation,
}

impl AppendOutcome {
    pub fn appended(self) -> bool {
        matches!(self, Self::Appended)
    }
}

pub fn current_unix_timestamp_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_secs())
}

pub(crate) fn sort_by_recent_desc(
    left: &ConversationRecord,
    right: &ConversationRecord,
) -> Ordering {
    right
        .updated_at
        .cmp(&left.updated_at)
        .then_with(|| right.id.cmp(&left.id))
}

/// Case-insensitive title search over a conversation list.
pub fn filter_by_title(
    conversations: &[ConversationRecord],
    query: &str,
) -> Vec<ConversationRecord> {
    let query = query.to_lowercase();
    conversations
        .iter()
        .filter(|conversation| conversation.title.to_lowercase().contains(&query))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_title_falls_back_to_default() {
        let conversation = ConversationRecord::new("   ");
        assert_eq!(conversation.title, DEFAULT_CONVERSATION_TITLE);
        assert!(conversation.has_default_title());
    }

    #[test]
    fn filter_by_title_is_case_insensitive() {
        let conversations = vec![
            ConversationRecord::new("Rust borrow checker"),
            ConversationRecord::new("Weekend plans"),
            ConversationRecord::new("More rust questions"),
        ];

        let matches = filter_by_title(&conversations, "RUST");
        assert_eq!(matches.len(), 2);
        assert!(matches.iter().all(|c| c.title.to_lowercase().contains("rust")));

        assert!(filter_by_title(&conversations, "python").is_empty());
        assert_eq!(filter_by_title(&conversations, "").len(), 3);
    }

    #[test]
    fn message_roles_serialize_lowercase() {
        assert_eq!(
            serde_json::to_string(&MessageRole::User).unwrap(),
            "\"user\""
        );
        assert_eq!(
            serde_json::to_string(&MessageRole::Assistant).unwrap(),
            "\"assistant\""
        );
    }
}
