pub mod collection;
pub mod error;
pub mod ids;
pub mod json;
pub mod memory;
pub mod types;

pub use collection::ChatCollection;
pub use error::{StoreError, StoreResult};
pub use ids::{ConversationId, MessageId, UserId};
pub use json::JsonStore;
pub use memory::MemoryStore;
pub use types::{
    AUTH_NAMESPACE, AppendOutcome, CHATS_NAMESPACE, ConversationRecord,
    DEFAULT_CONVERSATION_TITLE, MessageRecord, MessageRole, MutationOutcome, NewMessage,
    UserRecord, current_unix_timestamp_seconds, filter_by_title,
};

/// Operations over the conversation collection and the active pointer.
///
/// Mutations are synchronous, last-write-wins, and atomically visible.
/// Unknown identifiers are reported as no-op outcomes, never errors;
/// errors are reserved for persistence faults of the durable backend.
pub trait ConversationStore: Send + Sync {
    fn create_conversation(&self, title: &str) -> StoreResult<ConversationRecord>;
    fn list_conversations(&self) -> StoreResult<Vec<ConversationRecord>>;
    fn get_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> StoreResult<Option<ConversationRecord>>;
    fn delete_conversation(&self, conversation_id: ConversationId)
    -> StoreResult<MutationOutcome>;
    fn rename_conversation(
        &self,
        conversation_id: ConversationId,
        title: &str,
    ) -> StoreResult<MutationOutcome>;
    fn append_message(
        &self,
        conversation_id: ConversationId,
        message: NewMessage,
    ) -> StoreResult<AppendOutcome>;
    fn active_conversation(&self) -> StoreResult<Option<ConversationId>>;
    fn select_conversation(
        &self,
        conversation_id: Option<ConversationId>,
    ) -> StoreResult<MutationOutcome>;
}

/// The authenticated-user record, persisted independently from conversations.
pub trait UserStore: Send + Sync {
    fn current_user(&self) -> StoreResult<Option<UserRecord>>;
    fn set_user(&self, user: UserRecord) -> StoreResult<()>;
    fn clear_user(&self) -> StoreResult<()>;
}

pub trait Store: ConversationStore + UserStore {}

impl<T> Store for T where T: ConversationStore + UserStore {}
