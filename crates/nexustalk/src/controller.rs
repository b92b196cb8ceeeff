use std::sync::Arc;

use snafu::{ResultExt, Snafu, ensure};

use nexus_llm::{
    ChatTurn, NEXUSTALK_PREAMBLE, RESPONSE_MAX_TOKENS, RESPONSE_TEMPERATURE, ResponseGenerator,
    Role, StreamRequest, collect_response, generate_title, heuristic_title,
};
use nexus_relay::{RelayClient, RelayEvent};
use nexus_store::{
    ConversationId, ConversationRecord, DEFAULT_CONVERSATION_TITLE, MessageRecord, MessageRole,
    MutationOutcome, NewMessage, Store, StoreError, StoreResult,
};

use crate::config::TitleMode;

/// Per-turn state: a new submission is rejected while one is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    AwaitingResponse,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SubmitError {
    #[snafu(display("cannot submit an empty message"))]
    EmptyInput { stage: &'static str },
    #[snafu(display("a response is already being generated"))]
    Busy { stage: &'static str },
    #[snafu(display("response generation failed: {message}"))]
    Generation {
        stage: &'static str,
        message: String,
    },
    #[snafu(display("session store operation failed on `{stage}`"))]
    StoreFailed {
        stage: &'static str,
        source: StoreError,
    },
}

/// What one completed submit produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReport {
    pub conversation_id: ConversationId,
    pub user_message: MessageRecord,
    pub assistant_message: MessageRecord,
    /// Title applied by first-exchange titling, when one was.
    pub title: Option<String>,
}

/// Page-level orchestration: ties user input, store mutation, relay traffic,
/// and response generation together.
pub struct SessionController {
    store: Arc<dyn Store>,
    generator: Arc<dyn ResponseGenerator>,
    relay: RelayClient,
    title_mode: TitleMode,
    model_id: String,
    turn: TurnState,
    peer_typing: bool,
}

impl SessionController {
    pub fn new(
        store: Arc<dyn Store>,
        generator: Arc<dyn ResponseGenerator>,
        relay: RelayClient,
        title_mode: TitleMode,
    ) -> Self {
        let model_id = generator.default_model().to_string();
        Self {
            store,
            generator,
            relay,
            title_mode,
            model_id,
            turn: TurnState::Idle,
            peer_typing: false,
        }
    }

    pub fn turn_state(&self) -> TurnState {
        self.turn
    }

    /// Whether the remote participant is currently typing.
    pub fn peer_typing(&self) -> bool {
        self.peer_typing
    }

    /// Returns the active conversation, selecting the most recent one or
    /// creating the first conversation when the store is empty.
    pub fn ensure_active_conversation(&mut self) -> StoreResult<ConversationId> {
        if let Some(active) = self.store.active_conversation()? {
            return Ok(active);
        }

        let conversations = self.store.list_conversations()?;
        let conversation_id = match conversations.first() {
            Some(most_recent) => most_recent.id,
            None => {
                self.store
                    .create_conversation(DEFAULT_CONVERSATION_TITLE)?
                    .id
            }
        };

        self.store.select_conversation(Some(conversation_id))?;
        self.relay.join_chat(conversation_id);
        Ok(conversation_id)
    }

    /// Runs one full exchange: append the user message, relay it, generate
    /// the assistant reply, append it, and title the conversation after its
    /// first exchange. A generation fault leaves the user message in place,
    /// appends nothing else, and returns the controller to idle.
    pub async fn submit(&mut self, input: &str) -> Result<TurnReport, SubmitError> {
        let content = input.trim();
        ensure!(
            !content.is_empty(),
            EmptyInputSnafu {
                stage: "submit-validate",
            }
        );
        ensure!(
            matches!(self.turn, TurnState::Idle),
            BusySnafu {
                stage: "submit-guard",
            }
        );

        let conversation_id = self
            .ensure_active_conversation()
            .context(StoreFailedSnafu {
                stage: "submit-ensure-active",
            })?;

        let should_title = self
            .store
            .get_conversation(conversation_id)
            .context(StoreFailedSnafu {
                stage: "submit-load-conversation",
            })?
            .is_some_and(|conversation| {
                conversation.has_default_title() && conversation.messages.is_empty()
            });

        let user_message = NewMessage::user(content);
        let user_record = MessageRecord::from(user_message.clone());
        self.store
            .append_message(conversation_id, user_message)
            .context(StoreFailedSnafu {
                stage: "submit-append-user",
            })?;

        if let Some(user) = self.store.current_user().context(StoreFailedSnafu {
            stage: "submit-load-user",
        })? {
            self.relay
                .send_message(user_record.id, conversation_id, content, user.id);
        }

        self.turn = TurnState::AwaitingResponse;
        let generated = self.generate_reply(conversation_id).await;
        self.turn = TurnState::Idle;
        let reply = generated?;

        let assistant_message = NewMessage::assistant(reply);
        let assistant_record = MessageRecord::from(assistant_message.clone());
        self.store
            .append_message(conversation_id, assistant_message)
            .context(StoreFailedSnafu {
                stage: "submit-append-assistant",
            })?;

        let mut applied_title = None;
        if should_title
            && let Some(title) = self.resolve_title(content, &assistant_record.content).await
            && title != DEFAULT_CONVERSATION_TITLE
        {
            let outcome = self
                .store
                .rename_conversation(conversation_id, &title)
                .context(StoreFailedSnafu {
                    stage: "submit-apply-title",
                })?;
            if outcome.applied() {
                applied_title = Some(title);
            }
        }

        Ok(TurnReport {
            conversation_id,
            user_message: user_record,
            assistant_message: assistant_record,
            title: applied_title,
        })
    }

    /// Forwards a typing indicator for the active conversation.
    pub fn input_changed(&self, text: &str) -> StoreResult<()> {
        let (Some(active), Some(user)) = (
            self.store.active_conversation()?,
            self.store.current_user()?,
        ) else {
            return Ok(());
        };

        self.relay.send_typing(active, user.id, !text.is_empty());
        Ok(())
    }

    /// Applies inbound relay traffic to local state. Duplicate message ids
    /// (our own relay echoes) and unknown conversations are silent no-ops.
    pub fn handle_relay_event(&mut self, event: RelayEvent) -> StoreResult<()> {
        match event {
            RelayEvent::Connected => {
                if let Some(active) = self.store.active_conversation()? {
                    self.relay.join_chat(active);
                }
            }
            RelayEvent::Disconnected => {
                self.peer_typing = false;
            }
            RelayEvent::MessageReceived(message) => {
                let outcome = self.store.append_message(
                    message.chat_id,
                    NewMessage::received(
                        message.id,
                        message.role,
                        message.message,
                        message.timestamp / 1_000,
                    ),
                )?;
                if !outcome.appended() {
                    tracing::debug!(
                        message_id = %message.id,
                        chat_id = %message.chat_id,
                        ?outcome,
                        "inbound relay message not appended"
                    );
                }
            }
            RelayEvent::TypingChanged { is_typing } => {
                self.peer_typing = is_typing;
            }
        }
        Ok(())
    }

    pub fn new_conversation(&mut self) -> StoreResult<ConversationRecord> {
        if let Some(previous) = self.store.active_conversation()? {
            self.relay.leave_chat(previous);
        }

        let conversation = self.store.create_conversation(DEFAULT_CONVERSATION_TITLE)?;
        self.store.select_conversation(Some(conversation.id))?;
        self.relay.join_chat(conversation.id);
        self.peer_typing = false;
        Ok(conversation)
    }

    pub fn select_conversation(
        &mut self,
        conversation_id: ConversationId,
    ) -> StoreResult<MutationOutcome> {
        let previous = self.store.active_conversation()?;
        let outcome = self.store.select_conversation(Some(conversation_id))?;

        if outcome.applied() && previous != Some(conversation_id) {
            if let Some(previous) = previous {
                self.relay.leave_chat(previous);
            }
            self.relay.join_chat(conversation_id);
            self.peer_typing = false;
        }
        Ok(outcome)
    }

    pub fn delete_conversation(
        &mut self,
        conversation_id: ConversationId,
    ) -> StoreResult<MutationOutcome> {
        let was_active = self.store.active_conversation()? == Some(conversation_id);
        let outcome = self.store.delete_conversation(conversation_id)?;

        if outcome.applied() && was_active {
            self.relay.leave_chat(conversation_id);
            self.peer_typing = false;
        }
        Ok(outcome)
    }

    async fn generate_reply(&self, conversation_id: ConversationId) -> Result<String, SubmitError> {
        let turns = self
            .store
            .get_conversation(conversation_id)
            .context(StoreFailedSnafu {
                stage: "reply-load-history",
            })?
            .map(|conversation| {
                conversation
                    .messages
                    .iter()
                    .map(|message| ChatTurn::new(chat_role(message.role), message.content.clone()))
                    .collect()
            })
            .unwrap_or_default();

        let request = StreamRequest::new(self.model_id.clone(), turns)
            .with_preamble(NEXUSTALK_PREAMBLE)
            .with_temperature(RESPONSE_TEMPERATURE)
            .with_max_tokens(RESPONSE_MAX_TOKENS);

        let handle = self.generator.stream_chat(request).map_err(|error| {
            SubmitError::Generation {
                stage: "open-reply-stream",
                message: error.to_string(),
            }
        })?;

        collect_response(handle)
            .await
            .map_err(|error| SubmitError::Generation {
                stage: "collect-reply",
                message: error.to_string(),
            })
    }

    async fn resolve_title(&self, user_input: &str, assistant_reply: &str) -> Option<String> {
        match self.title_mode {
            TitleMode::Heuristic => Some(heuristic_title(user_input)),
            TitleMode::Generated => {
                generate_title(self.generator.as_ref(), user_input, assistant_reply).await
            }
        }
    }
}

fn chat_role(role: MessageRole) -> Role {
    match role {
        MessageRole::User => Role::User,
        MessageRole::Assistant => Role::Assistant,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_llm::{
        GeneratorResult, GeneratorStreamHandle, SimulatedResponder, StreamEvent,
    };
    use nexus_relay::InboundMessage;
    use nexus_store::MemoryStore;
    use std::time::Duration;

    fn controller_with(generator: Arc<dyn ResponseGenerator>) -> SessionController {
        let (relay, _events) = RelayClient::offline();
        SessionController::new(
            Arc::new(MemoryStore::new()),
            generator,
            relay,
            TitleMode::Heuristic,
        )
    }

    fn controller() -> SessionController {
        controller_with(Arc::new(SimulatedResponder::with_delay(Duration::ZERO)))
    }

    struct FailingGenerator;

    impl ResponseGenerator for FailingGenerator {
        fn id(&self) -> &str {
            "failing"
        }

        fn name(&self) -> &str {
            "Failing"
        }

        fn default_model(&self) -> &str {
            "failing-v1"
        }

        fn stream_chat(&self, _request: StreamRequest) -> GeneratorResult<GeneratorStreamHandle> {
            Ok(GeneratorStreamHandle::from_events(vec![StreamEvent::Error(
                "upstream fault".to_string(),
            )]))
        }
    }

    #[tokio::test]
    async fn first_exchange_appends_two_messages_and_titles() {
        let mut controller = controller();

        let report = controller.submit("hello").await.unwrap();
        assert_eq!(report.title.as_deref(), Some("Hello"));
        assert_eq!(controller.turn_state(), TurnState::Idle);

        let conversation = controller
            .store
            .get_conversation(report.conversation_id)
            .unwrap()
            .unwrap();
        assert_eq!(conversation.title, "Hello");
        assert_eq!(conversation.messages.len(), 2);
        assert_eq!(conversation.messages[0].role, MessageRole::User);
        assert_eq!(conversation.messages[0].content, "hello");
        assert_eq!(conversation.messages[1].role, MessageRole::Assistant);
        assert_eq!(
            conversation.messages[1].content,
            "Hello! How can I help you today?"
        );
    }

    #[tokio::test]
    async fn later_exchanges_keep_the_existing_title() {
        let mut controller = controller();

        controller.submit("hello").await.unwrap();
        let report = controller.submit("and another thing entirely").await.unwrap();

        assert_eq!(report.title, None);
        let conversation = controller
            .store
            .get_conversation(report.conversation_id)
            .unwrap()
            .unwrap();
        assert_eq!(conversation.title, "Hello");
        assert_eq!(conversation.messages.len(), 4);
    }

    #[tokio::test]
    async fn generation_failure_leaves_no_assistant_message() {
        let mut controller = controller_with(Arc::new(FailingGenerator));

        let error = controller.submit("hello").await.unwrap_err();
        assert!(matches!(error, SubmitError::Generation { .. }));
        assert_eq!(controller.turn_state(), TurnState::Idle);

        let conversation_id = controller.store.active_conversation().unwrap().unwrap();
        let conversation = controller
            .store
            .get_conversation(conversation_id)
            .unwrap()
            .unwrap();
        // The user message stays; nothing else was appended and the default
        // title is retained.
        assert_eq!(conversation.messages.len(), 1);
        assert_eq!(conversation.messages[0].role, MessageRole::User);
        assert_eq!(conversation.title, DEFAULT_CONVERSATION_TITLE);
    }

    #[tokio::test]
    async fn empty_input_is_rejected_without_mutation() {
        let mut controller = controller();

        let error = controller.submit("   ").await.unwrap_err();
        assert!(matches!(error, SubmitError::EmptyInput { .. }));
        assert!(controller.store.list_conversations().unwrap().is_empty());
    }

    #[tokio::test]
    async fn relay_echo_of_the_local_message_is_suppressed() {
        let mut controller = controller();
        let report = controller.submit("hello").await.unwrap();

        let echo = RelayEvent::MessageReceived(InboundMessage {
            id: report.user_message.id,
            chat_id: report.conversation_id,
            message: "hello".to_string(),
            role: MessageRole::User,
            timestamp: 1_700_000_000_000,
        });
        controller.handle_relay_event(echo).unwrap();

        let conversation = controller
            .store
            .get_conversation(report.conversation_id)
            .unwrap()
            .unwrap();
        assert_eq!(conversation.messages.len(), 2);
    }

    #[tokio::test]
    async fn inbound_message_for_unknown_conversation_is_ignored() {
        let mut controller = controller();
        controller.submit("hello").await.unwrap();

        let stray = RelayEvent::MessageReceived(InboundMessage {
            id: nexus_store::MessageId::new_v7(),
            chat_id: ConversationId::new_v7(),
            message: "lost".to_string(),
            role: MessageRole::Assistant,
            timestamp: 1_700_000_000_000,
        });
        controller.handle_relay_event(stray).unwrap();

        let conversations = controller.store.list_conversations().unwrap();
        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].messages.len(), 2);
    }

    #[tokio::test]
    async fn typing_events_drive_the_peer_typing_flag() {
        let mut controller = controller();
        assert!(!controller.peer_typing());

        controller
            .handle_relay_event(RelayEvent::TypingChanged { is_typing: true })
            .unwrap();
        assert!(controller.peer_typing());

        controller
            .handle_relay_event(RelayEvent::Disconnected)
            .unwrap();
        assert!(!controller.peer_typing());
    }

    #[tokio::test]
    async fn deleting_the_active_conversation_clears_the_pointer() {
        let mut controller = controller();
        let report = controller.submit("hello").await.unwrap();

        let outcome = controller
            .delete_conversation(report.conversation_id)
            .unwrap();
        assert!(outcome.applied());
        assert_eq!(controller.store.active_conversation().unwrap(), None);
    }

    #[tokio::test]
    async fn ensure_active_reuses_the_most_recent_conversation() {
        let mut controller = controller();
        let first = controller.new_conversation().unwrap();
        controller.store.select_conversation(None).unwrap();

        let active = controller.ensure_active_conversation().unwrap();
        assert_eq!(active, first.id);
        assert_eq!(controller.store.list_conversations().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn input_changed_without_user_or_chat_is_a_no_op() {
        let controller = controller();
        controller.input_changed("typing away").unwrap();
    }
}
