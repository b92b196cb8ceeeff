use std::sync::{Mutex, MutexGuard, PoisonError};

use super::collection::ChatCollection;
use super::error::StoreResult;
use super::ids::ConversationId;
use super::types::{
    AppendOutcome, ConversationRecord, MutationOutcome, NewMessage, UserRecord,
};
use super::{ConversationStore, UserStore};

/// In-memory store backend. Same semantics as [`super::JsonStore`] without
/// durability; intended for tests and embedded use.
#[derive(Debug, Default)]
pub struct MemoryStore {
    chats: Mutex<ChatCollection>,
    user: Mutex<Option<UserRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ConversationStore for MemoryStore {
    fn create_conversation(&self, title: &str) -> StoreResult<ConversationRecord> {
        Ok(lock(&self.chats).create(title))
    }

    fn list_conversations(&self) -> StoreResult<Vec<ConversationRecord>> {
        Ok(lock(&self.chats).list())
    }

    fn get_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> StoreResult<Option<ConversationRecord>> {
        Ok(lock(&self.chats).get(conversation_id).cloned())
    }

    fn delete_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> StoreResult<MutationOutcome> {
        Ok(lock(&self.chats).delete(conversation_id))
    }

    fn rename_conversation(
        &self,
        conversation_id: ConversationId,
        title: &str,
    ) -> StoreResult<MutationOutcome> {
        Ok(lock(&self.chats).rename(conversation_id, title))
    }

    fn append_message(
        &self,
        conversation_id: ConversationId,
        message: NewMessage,
    ) -> StoreResult<AppendOutcome> {
        Ok(lock(&self.chats).append(conversation_id, message))
    }

    fn active_conversation(&self) -> StoreResult<Option<ConversationId>> {
        Ok(lock(&self.chats).active())
    }

    fn select_conversation(
        &self,
        conversation_id: Option<ConversationId>,
    ) -> StoreResult<MutationOutcome> {
        Ok(lock(&self.chats).select(conversation_id))
    }
}

impl UserStore for MemoryStore {
    fn current_user(&self) -> StoreResult<Option<UserRecord>> {
        Ok(lock(&self.user).clone())
    }

    fn set_user(&self, user: UserRecord) -> StoreResult<()> {
        *lock(&self.user) = Some(user);
        Ok(())
    }

    fn clear_user(&self) -> StoreResult<()> {
        *lock(&self.user) = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::UserId;

    #[test]
    fn user_record_is_set_and_cleared() {
        let store = MemoryStore::new();
        assert_eq!(store.current_user().unwrap(), None);

        let user = UserRecord {
            id: UserId::new_v7(),
            name: Some("Demo User".to_string()),
            email: Some("demo@example.com".to_string()),
            avatar_url: None,
        };
        store.set_user(user.clone()).unwrap();
        assert_eq!(store.current_user().unwrap(), Some(user));

        store.clear_user().unwrap();
        assert_eq!(store.current_user().unwrap(), None);
    }

    #[test]
    fn trait_object_covers_both_stores() {
        let store: std::sync::Arc<dyn crate::Store> = std::sync::Arc::new(MemoryStore::new());
        let conversation = store.create_conversation("via trait object").unwrap();
        store
            .select_conversation(Some(conversation.id))
            .unwrap();
        assert_eq!(store.active_conversation().unwrap(), Some(conversation.id));
    }
}
