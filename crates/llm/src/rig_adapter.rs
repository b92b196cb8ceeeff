use futures::StreamExt;
use rig::completion::{CompletionModel, Message as RigMessage};
use rig::prelude::CompletionClient;
use rig::providers::openai;
use rig::streaming::StreamedAssistantContent;
use snafu::{ResultExt, ensure};
use tokio::sync::{mpsc, oneshot};

use super::generator::{
    ChatTurn, CompletionsFailedSnafu, EmptyMessageSetSnafu, GeneratorConfig, GeneratorError,
    GeneratorResult, GeneratorStreamHandle, GeneratorWorker, HttpClientSnafu, MissingApiKeySnafu,
    ResponseGenerator, Role, StreamEvent, StreamRequest, make_event_stream,
};

pub const RIG_PROVIDER_ID: &str = "openai";

/// Model used when the configuration names none.
pub const DEFAULT_PROVIDER_MODEL: &str = "gpt-3.5-turbo";

type RigStreamingResponse = rig::streaming::StreamingCompletionResponse<
    rig::providers::openai::responses_api::streaming::StreamingCompletionResponse,
>;

/// Hosted-provider generator over rig's OpenAI-compatible client.
pub struct RigGenerator {
    config: GeneratorConfig,
}

impl RigGenerator {
    pub fn new(config: GeneratorConfig) -> GeneratorResult<Self> {
        ensure!(
            !config.api_key.is_empty(),
            MissingApiKeySnafu {
                stage: "rig-generator-new",
                provider_id: config.provider_id.clone(),
            }
        );

        Ok(Self { config })
    }

    fn build_client(config: &GeneratorConfig) -> GeneratorResult<openai::Client> {
        let mut builder = openai::Client::builder().api_key(config.api_key.as_str());
        if !config.endpoint.is_empty() {
            builder = builder.base_url(config.endpoint.as_str());
        }
        builder.build().context(HttpClientSnafu {
            stage: "build-client",
        })
    }

    fn to_rig_message(turn: &ChatTurn) -> Option<RigMessage> {
        match turn.role {
            Role::System => None,
            Role::User => Some(RigMessage::user(turn.content.clone())),
            Role::Assistant => Some(RigMessage::assistant(turn.content.clone())),
        }
    }

    fn merged_preamble(request: &StreamRequest) -> Option<String> {
        let mut preamble_parts = Vec::new();

        if let Some(preamble) = &request.preamble
            && !preamble.trim().is_empty()
        {
            preamble_parts.push(preamble.clone());
        }

        // Rig exposes a single preamble field, so system-role turns are folded into it
        // to preserve caller intent while still sending user/assistant turns as chat messages.
        for turn in &request.messages {
            if matches!(turn.role, Role::System) && !turn.content.trim().is_empty() {
                preamble_parts.push(turn.content.clone());
            }
        }

        if preamble_parts.is_empty() {
            None
        } else {
            Some(preamble_parts.join("\n\n"))
        }
    }

    async fn open_stream(
        config: &GeneratorConfig,
        request: &StreamRequest,
    ) -> GeneratorResult<RigStreamingResponse> {
        let client = Self::build_client(config)?;
        let model = client.completion_model(request.model_id.clone());

        let mut messages = request
            .messages
            .iter()
            .filter_map(Self::to_rig_message)
            .collect::<Vec<_>>();

        if messages.is_empty() {
            tracing::warn!(
                model_id = %request.model_id,
                total_turn_count = request.messages.len(),
                "cannot open stream because no user/assistant turns remain after filtering"
            );
            return EmptyMessageSetSnafu {
                stage: "open-stream-filter-messages",
            }
            .fail();
        }

        let Some(prompt) = messages.pop() else {
            return EmptyMessageSetSnafu {
                stage: "open-stream-pop-prompt",
            }
            .fail();
        };
        let mut builder = model.completion_request(prompt).messages(messages);

        if let Some(preamble) = Self::merged_preamble(request) {
            builder = builder.preamble(preamble);
        }

        if let Some(temperature) = request.temperature {
            builder = builder.temperature(temperature);
        }

        if let Some(max_tokens) = request.max_tokens {
            builder = builder.max_tokens(max_tokens);
        }

        builder.stream().await.context(CompletionsFailedSnafu {
            stage: "open-stream",
        })
    }

    fn emit_error_event(event_tx: &mpsc::UnboundedSender<StreamEvent>, error: GeneratorError) {
        let _ = event_tx.send(StreamEvent::Error(error.to_string()));
    }

    fn map_stream_item<R>(item: StreamedAssistantContent<R>) -> Option<StreamEvent>
    where
        R: Clone + Unpin,
    {
        match item {
            StreamedAssistantContent::Text(text) => Some(StreamEvent::Delta(text.text)),
            // Reasoning and tool traffic have no place in a chat transcript.
            StreamedAssistantContent::Reasoning(_)
            | StreamedAssistantContent::ReasoningDelta { .. }
            | StreamedAssistantContent::ToolCall { .. }
            | StreamedAssistantContent::ToolCallDelta { .. }
            | StreamedAssistantContent::Final(_) => None,
        }
    }

    async fn run_stream_worker(
        config: GeneratorConfig,
        request: StreamRequest,
        event_tx: mpsc::UnboundedSender<StreamEvent>,
        mut cancel_rx: oneshot::Receiver<()>,
    ) {
        let mut stream = match Self::open_stream(&config, &request).await {
            Ok(stream) => stream,
            Err(error) => {
                tracing::error!(
                    provider_id = %config.provider_id,
                    model_id = %request.model_id,
                    error = %error,
                    "failed to open provider stream"
                );
                Self::emit_error_event(&event_tx, error);
                return;
            }
        };

        let mut cancelled = false;
        let mut stream_failed = false;

        loop {
            tokio::select! {
                _ = &mut cancel_rx => {
                    cancelled = true;
                    // Cancel the upstream rig stream so provider IO stops promptly.
                    tracing::debug!("provider stream cancelled");
                    stream.cancel();
                    break;
                }
                next_item = stream.next() => {
                    match next_item {
                        Some(Ok(item)) => {
                            if let Some(mapped) = Self::map_stream_item(item)
                                && event_tx.send(mapped).is_err()
                            {
                                return;
                            }
                        }
                        Some(Err(source)) => {
                            stream_failed = true;
                            tracing::warn!(
                                error = %source,
                                "provider stream emitted an error chunk"
                            );
                            let error = GeneratorError::CompletionsFailed {
                                stage: "stream-chunk",
                                source,
                            };
                            Self::emit_error_event(&event_tx, error);
                            break;
                        }
                        None => break,
                    }
                }
            }
        }

        if !cancelled && !stream_failed {
            let _ = event_tx.send(StreamEvent::Done);
        }
    }
}

impl ResponseGenerator for RigGenerator {
    fn id(&self) -> &str {
        &self.config.provider_id
    }

    fn name(&self) -> &str {
        "Hosted Provider"
    }

    fn default_model(&self) -> &str {
        self.config
            .default_model
            .as_deref()
            .unwrap_or(DEFAULT_PROVIDER_MODEL)
    }

    fn stream_chat(&self, request: StreamRequest) -> GeneratorResult<GeneratorStreamHandle> {
        ensure!(
            !request.messages.is_empty(),
            EmptyMessageSetSnafu {
                stage: "stream-chat",
            }
        );

        let (event_tx, stream, cancel_rx) = make_event_stream();
        let worker: GeneratorWorker = Box::pin(Self::run_stream_worker(
            self.config.clone(),
            request,
            event_tx,
            cancel_rx,
        ));

        Ok(GeneratorStreamHandle { stream, worker })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GeneratorConfig {
        GeneratorConfig::new(RIG_PROVIDER_ID, "test-key", "", None)
    }

    #[test]
    fn rejects_missing_api_key() {
        let error = RigGenerator::new(GeneratorConfig::new(RIG_PROVIDER_ID, "  ", "", None))
            .err()
            .unwrap();
        assert!(matches!(error, GeneratorError::MissingApiKey { .. }));
    }

    #[test]
    fn rejects_empty_message_set_up_front() {
        let generator = RigGenerator::new(config()).unwrap();
        let error = generator
            .stream_chat(StreamRequest::new(DEFAULT_PROVIDER_MODEL, Vec::new()))
            .err()
            .unwrap();
        assert!(matches!(error, GeneratorError::EmptyMessageSet { .. }));
    }

    #[test]
    fn system_turns_fold_into_the_preamble() {
        let request = StreamRequest::new(
            DEFAULT_PROVIDER_MODEL,
            vec![
                ChatTurn::new(Role::System, "be terse"),
                ChatTurn::new(Role::User, "hello"),
            ],
        )
        .with_preamble("base preamble");

        let merged = RigGenerator::merged_preamble(&request).unwrap();
        assert_eq!(merged, "base preamble\n\nbe terse");
    }

    #[test]
    fn default_model_prefers_configuration() {
        let mut custom = config();
        custom.default_model = Some("gpt-4o-mini".to_string());
        let generator = RigGenerator::new(custom).unwrap();
        assert_eq!(generator.default_model(), "gpt-4o-mini");

        let fallback = RigGenerator::new(config()).unwrap();
        assert_eq!(fallback.default_model(), DEFAULT_PROVIDER_MODEL);
    }
}
