use serde::{Deserialize, Serialize};

use super::ids::ConversationId;
use super::types::{
    AppendOutcome, ConversationRecord, MessageRecord, MutationOutcome, NewMessage,
    current_unix_timestamp_seconds, sort_by_recent_desc,
};

/// The conversation collection plus the active pointer.
///
/// This is the persisted snapshot shape and the single place mutation
/// semantics live; both store backends delegate here so their behavior
/// cannot drift apart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatCollection {
    #[serde(default)]
    chats: Vec<ConversationRecord>,
    #[serde(default)]
    active_chat: Option<ConversationId>,
}

impl ChatCollection {
    pub fn is_empty(&self) -> bool {
        self.chats.is_empty()
    }

    pub fn create(&mut self, title: &str) -> ConversationRecord {
        let conversation = ConversationRecord::new(title);
        self.chats.push(conversation.clone());
        conversation
    }

    /// Conversations sorted most-recently-updated first.
    pub fn list(&self) -> Vec<ConversationRecord> {
        let mut conversations = self.chats.clone();
        conversations.sort_by(sort_by_recent_desc);
        conversations
    }

    pub fn get(&self, conversation_id: ConversationId) -> Option<&ConversationRecord> {
        self.chats
            .iter()
            .find(|conversation| conversation.id == conversation_id)
    }

    /// Removes a conversation. Deleting the active conversation also clears
    /// the active pointer; deleting any other leaves the pointer untouched.
    pub fn delete(&mut self, conversation_id: ConversationId) -> MutationOutcome {
        let before = self.chats.len();
        self.chats
            .retain(|conversation| conversation.id != conversation_id);
        if self.chats.len() == before {
            return MutationOutcome::NotFound;
        }

        if self.active_chat == Some(conversation_id) {
            self.active_chat = None;
        }
        MutationOutcome::Applied
    }

    pub fn rename(&mut self, conversation_id: ConversationId, title: &str) -> MutationOutcome {
        let Some(conversation) = self.get_mut(conversation_id) else {
            return MutationOutcome::NotFound;
        };

        conversation.title = title.to_string();
        conversation.updated_at = current_unix_timestamp_seconds();
        MutationOutcome::Applied
    }

    /// Appends a message. Message ids are unique within a conversation, so a
    /// duplicate id is a no-op; this is what suppresses relay echoes.
    pub fn append(
        &mut self,
        conversation_id: ConversationId,
        message: NewMessage,
    ) -> AppendOutcome {
        let Some(conversation) = self.get_mut(conversation_id) else {
            return AppendOutcome::UnknownConversation;
        };

        if conversation.contains_message(message.id) {
            return AppendOutcome::DuplicateMessage;
        }

        conversation.messages.push(MessageRecord::from(message));
        conversation.updated_at = current_unix_timestamp_seconds();
        AppendOutcome::Appended
    }

    pub fn active(&self) -> Option<ConversationId> {
        self.active_chat
    }

    /// Moves the active pointer. Selecting an unknown id is a no-op;
    /// `None` always clears the pointer.
    pub fn select(&mut self, conversation_id: Option<ConversationId>) -> MutationOutcome {
        match conversation_id {
            None => {
                self.active_chat = None;
                MutationOutcome::Applied
            }
            Some(id) if self.get(id).is_some() => {
                self.active_chat = Some(id);
                MutationOutcome::Applied
            }
            Some(_) => MutationOutcome::NotFound,
        }
    }

    fn get_mut(&mut self, conversation_id: ConversationId) -> Option<&mut ConversationRecord> {
        self.chats
            .iter_mut()
            .find(|conversation| conversation.id == conversation_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MessageRole;

    #[test]
    fn appends_keep_call_order() {
        let mut collection = ChatCollection::default();
        let conversation = collection.create("ordering");

        let contents = ["first", "second", "third", "fourth"];
        for content in contents {
            let outcome = collection.append(conversation.id, NewMessage::user(content));
            assert_eq!(outcome, AppendOutcome::Appended);
        }

        let stored = collection.get(conversation.id).unwrap();
        let observed: Vec<&str> = stored
            .messages
            .iter()
            .map(|message| message.content.as_str())
            .collect();
        assert_eq!(observed, contents);
    }

    #[test]
    fn duplicate_message_id_is_a_no_op() {
        let mut collection = ChatCollection::default();
        let conversation = collection.create("dedup");

        let message = NewMessage::user("hello");
        assert_eq!(
            collection.append(conversation.id, message.clone()),
            AppendOutcome::Appended
        );
        assert_eq!(
            collection.append(conversation.id, message),
            AppendOutcome::DuplicateMessage
        );
        assert_eq!(collection.get(conversation.id).unwrap().messages.len(), 1);
    }

    #[test]
    fn append_to_unknown_conversation_changes_nothing() {
        let mut collection = ChatCollection::default();
        collection.create("only");

        let outcome = collection.append(ConversationId::new_v7(), NewMessage::user("lost"));
        assert_eq!(outcome, AppendOutcome::UnknownConversation);
        assert!(collection.list()[0].messages.is_empty());
    }

    #[test]
    fn appends_never_leak_across_conversations() {
        let mut collection = ChatCollection::default();
        let first = collection.create("first");
        let second = collection.create("second");
        let second_updated_at = collection.get(second.id).unwrap().updated_at;

        collection.append(first.id, NewMessage::user("only for the first"));

        let untouched = collection.get(second.id).unwrap();
        assert!(untouched.messages.is_empty());
        assert_eq!(untouched.updated_at, second_updated_at);
        assert_eq!(collection.get(first.id).unwrap().messages.len(), 1);
    }

    #[test]
    fn deleting_active_conversation_clears_pointer() {
        let mut collection = ChatCollection::default();
        let kept = collection.create("kept");
        let doomed = collection.create("doomed");

        collection.select(Some(doomed.id));
        assert_eq!(collection.delete(doomed.id), MutationOutcome::Applied);
        assert_eq!(collection.active(), None);

        // Deleting a non-active conversation leaves the pointer alone.
        let other = collection.create("other");
        collection.select(Some(kept.id));
        collection.delete(other.id);
        assert_eq!(collection.active(), Some(kept.id));
    }

    #[test]
    fn delete_of_unknown_id_is_a_no_op() {
        let mut collection = ChatCollection::default();
        let conversation = collection.create("stays");
        collection.select(Some(conversation.id));

        assert_eq!(
            collection.delete(ConversationId::new_v7()),
            MutationOutcome::NotFound
        );
        assert_eq!(collection.active(), Some(conversation.id));
        assert_eq!(collection.list().len(), 1);
    }

    #[test]
    fn selecting_unknown_conversation_is_a_no_op() {
        let mut collection = ChatCollection::default();
        let conversation = collection.create("selected");
        collection.select(Some(conversation.id));

        assert_eq!(
            collection.select(Some(ConversationId::new_v7())),
            MutationOutcome::NotFound
        );
        assert_eq!(collection.active(), Some(conversation.id));

        assert_eq!(collection.select(None), MutationOutcome::Applied);
        assert_eq!(collection.active(), None);
    }

    #[test]
    fn rename_refreshes_updated_at_and_keeps_messages() {
        let mut collection = ChatCollection::default();
        let conversation = collection.create("before");
        collection.append(conversation.id, NewMessage::assistant("kept"));

        assert_eq!(
            collection.rename(conversation.id, "after"),
            MutationOutcome::Applied
        );
        let renamed = collection.get(conversation.id).unwrap();
        assert_eq!(renamed.title, "after");
        assert_eq!(renamed.messages.len(), 1);
        assert_eq!(renamed.messages[0].role, MessageRole::Assistant);
    }

    #[test]
    fn snapshot_round_trips_through_json() {
        let mut collection = ChatCollection::default();
        let conversation = collection.create("round trip");
        collection.append(conversation.id, NewMessage::user("hello"));
        collection.append(conversation.id, NewMessage::assistant("hi there"));
        collection.select(Some(conversation.id));

        let payload = serde_json::to_string(&collection).unwrap();
        let restored: ChatCollection = serde_json::from_str(&payload).unwrap();
        assert_eq!(restored, collection);
    }
}
