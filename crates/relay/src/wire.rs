use std::time::{SystemTime, UNIX_EPOCH};

use nexus_store::{ConversationId, MessageId, MessageRole, UserId};
use serde::{Deserialize, Serialize};

/// Frames emitted toward the relay service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum OutboundFrame {
    JoinChat(ConversationId),
    LeaveChat(ConversationId),
    SendMessage(OutboundMessage),
    Typing(TypingPayload),
}

/// Payload of an outbound `send-message` frame.
///
/// Carries the local message id so the relay's echo can be recognized and
/// suppressed by the store's duplicate-id no-op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    pub id: MessageId,
    pub chat_id: ConversationId,
    pub message: String,
    pub user_id: UserId,
    /// Unix milliseconds.
    pub timestamp: u64,
}

/// Payload of an outbound `typing` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    pub chat_id: ConversationId,
    pub user_id: UserId,
    pub is_typing: bool,
}

/// Frames delivered by the relay service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum InboundFrame {
    NewMessage(InboundMessage),
    UserTyping(TypingChanged),
}

/// Payload of an inbound `new-message` frame.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    pub id: MessageId,
    pub chat_id: ConversationId,
    pub message: String,
    pub role: MessageRole,
    /// Unix milliseconds.
    pub timestamp: u64,
}

/// Payload of an inbound `user-typing` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingChanged {
    pub is_typing: bool,
}

pub fn current_unix_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn join_chat_frame_carries_the_bare_id() {
        let chat_id = ConversationId::new_v7();
        let frame = serde_json::to_value(OutboundFrame::JoinChat(chat_id)).unwrap();
        assert_eq!(
            frame,
            json!({ "event": "join-chat", "data": chat_id.to_string() })
        );
    }

    #[test]
    fn send_message_frame_matches_the_relay_contract() {
        let message = OutboundMessage {
            id: MessageId::new_v7(),
            chat_id: ConversationId::new_v7(),
            message: "hello".to_string(),
            user_id: UserId::new_v7(),
            timestamp: 1_700_000_000_000,
        };
        let frame = serde_json::to_value(OutboundFrame::SendMessage(message.clone())).unwrap();

        assert_eq!(
            frame,
            json!({
                "event": "send-message",
                "data": {
                    "id": message.id.to_string(),
                    "chatId": message.chat_id.to_string(),
                    "message": "hello",
                    "userId": message.user_id.to_string(),
                    "timestamp": 1_700_000_000_000u64,
                }
            })
        );
    }

    #[test]
    fn typing_frame_uses_camel_case_fields() {
        let payload = TypingPayload {
            chat_id: ConversationId::new_v7(),
            user_id: UserId::new_v7(),
            is_typing: true,
        };
        let frame = serde_json::to_value(OutboundFrame::Typing(payload)).unwrap();
        assert_eq!(frame["event"], "typing");
        assert_eq!(frame["data"]["isTyping"], true);
    }

    #[test]
    fn inbound_new_message_parses() {
        let id = MessageId::new_v7();
        let chat_id = ConversationId::new_v7();
        let payload = json!({
            "event": "new-message",
            "data": {
                "id": id.to_string(),
                "chatId": chat_id.to_string(),
                "message": "echoed",
                "role": "assistant",
                "timestamp": 1_700_000_000_000u64,
            }
        });

        let frame: InboundFrame = serde_json::from_value(payload).unwrap();
        let InboundFrame::NewMessage(message) = frame else {
            panic!("expected a new-message frame");
        };
        assert_eq!(message.id, id);
        assert_eq!(message.chat_id, chat_id);
        assert_eq!(message.role, MessageRole::Assistant);
    }

    #[test]
    fn inbound_user_typing_parses() {
        let frame: InboundFrame =
            serde_json::from_str(r#"{"event":"user-typing","data":{"isTyping":false}}"#).unwrap();
        assert_eq!(
            frame,
            InboundFrame::UserTyping(TypingChanged { is_typing: false })
        );
    }
}
