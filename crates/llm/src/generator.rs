use std::future::Future;
use std::pin::Pin;

use snafu::Snafu;
use tokio::sync::{mpsc, oneshot};

/// System preamble sent with every completion request.
pub const NEXUSTALK_PREAMBLE: &str = "You are NexusTalk, an advanced AI assistant designed to be helpful, informative, and engaging.\n\n\
Your capabilities include:\n\
- Answering questions on a wide range of topics\n\
- Providing detailed explanations and information\n\
- Assisting with problem-solving and creative tasks\n\
- Engaging in natural, conversational dialogue\n\
- Helping with coding and technical questions\n\n\
Always be respectful, accurate, and helpful. If you don't know something, be honest about it.\n\
Avoid generating harmful, illegal, unethical or deceptive content.\n\n\
Respond in a conversational, friendly tone while maintaining professionalism.";

/// Fixed sampling temperature for chat responses.
pub const RESPONSE_TEMPERATURE: f64 = 0.7;

/// Fixed output cap for chat responses.
pub const RESPONSE_MAX_TOKENS: u64 = 1_000;

/// Chat speaker role as seen by a generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One turn of conversation history handed to a generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Connection settings for a hosted provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorConfig {
    pub provider_id: String,
    pub api_key: String,
    pub endpoint: String,
    pub default_model: Option<String>,
}

impl GeneratorConfig {
    pub fn new(
        provider_id: impl Into<String>,
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
        default_model: Option<String>,
    ) -> Self {
        Self {
            provider_id: provider_id.into().trim().to_string(),
            api_key: api_key.into().trim().to_string(),
            endpoint: endpoint.into().trim().to_string(),
            default_model,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamRequest {
    pub model_id: String,
    pub messages: Vec<ChatTurn>,
    pub preamble: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u64>,
}

impl StreamRequest {
    pub fn new(model_id: impl Into<String>, messages: Vec<ChatTurn>) -> Self {
        Self {
            model_id: model_id.into(),
            messages,
            preamble: None,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_preamble(mut self, preamble: impl Into<String>) -> Self {
        self.preamble = Some(preamble.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u64) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

pub type GeneratorWorker = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;
pub type GeneratorResult<T> = Result<T, GeneratorError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum GeneratorError {
    #[snafu(display("missing API key for provider '{provider_id}'"))]
    MissingApiKey {
        stage: &'static str,
        provider_id: String,
    },
    #[snafu(display("stream request has no messages"))]
    EmptyMessageSet { stage: &'static str },
    #[snafu(display("http client failed on `{stage}`, {source}"))]
    HttpClient {
        stage: &'static str,
        source: rig::http_client::Error,
    },
    #[snafu(display("completions failed on `{stage}`, {source}"))]
    CompletionsFailed {
        stage: &'static str,
        source: rig::completion::CompletionError,
    },
    #[snafu(display("response stream failed: {message}"))]
    StreamFailed {
        stage: &'static str,
        message: String,
    },
}

/// Incremental generator output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Delta(String),
    Done,
    Error(String),
}

/// Receiver half of one generation. Dropping it cancels the worker.
pub struct GeneratorEventStream {
    events: mpsc::UnboundedReceiver<StreamEvent>,
    cancel_tx: Option<oneshot::Sender<()>>,
}

pub struct GeneratorStreamHandle {
    pub stream: GeneratorEventStream,
    pub worker: GeneratorWorker,
}

impl GeneratorStreamHandle {
    /// A handle that replays a fixed event sequence. Intended for test
    /// doubles standing in for a real generator.
    pub fn from_events(events: Vec<StreamEvent>) -> Self {
        let (event_tx, stream, _cancel_rx) = make_event_stream();
        for event in events {
            let _ = event_tx.send(event);
        }
        Self {
            stream,
            worker: Box::pin(async {}),
        }
    }
}

impl GeneratorEventStream {
    pub(crate) fn new(
        events: mpsc::UnboundedReceiver<StreamEvent>,
        cancel_tx: oneshot::Sender<()>,
    ) -> Self {
        Self {
            events,
            cancel_tx: Some(cancel_tx),
        }
    }

    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }

    pub fn try_recv(&mut self) -> Option<StreamEvent> {
        self.events.try_recv().ok()
    }

    pub fn cancel(&mut self) -> bool {
        self.cancel_tx
            .take()
            .map(|tx| tx.send(()).is_ok())
            .unwrap_or(false)
    }
}

impl Drop for GeneratorEventStream {
    fn drop(&mut self) {
        if let Some(cancel_tx) = self.cancel_tx.take() {
            let _ = cancel_tx.send(());
        }
    }
}

/// The single response-generation capability. Whether replies come from a
/// hosted model or the demo pattern table is a construction-time choice.
pub trait ResponseGenerator: Send + Sync {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
    fn default_model(&self) -> &str;
    fn stream_chat(&self, request: StreamRequest) -> GeneratorResult<GeneratorStreamHandle>;
}

pub(crate) fn make_event_stream() -> (
    mpsc::UnboundedSender<StreamEvent>,
    GeneratorEventStream,
    oneshot::Receiver<()>,
) {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (cancel_tx, cancel_rx) = oneshot::channel();
    (
        event_tx,
        GeneratorEventStream::new(event_rx, cancel_tx),
        cancel_rx,
    )
}

/// Drives a stream handle to completion and returns the concatenated text.
/// An error event terminates the turn; nothing after it is kept.
pub async fn collect_response(handle: GeneratorStreamHandle) -> GeneratorResult<String> {
    let GeneratorStreamHandle { mut stream, worker } = handle;
    let worker_task = tokio::spawn(worker);

    let mut text = String::new();
    let mut failure = None;
    while let Some(event) = stream.recv().await {
        match event {
            StreamEvent::Delta(chunk) => text.push_str(&chunk),
            StreamEvent::Done => break,
            StreamEvent::Error(message) => {
                failure = Some(message);
                break;
            }
        }
    }

    let _ = worker_task.await;

    match failure {
        Some(message) => StreamFailedSnafu {
            stage: "collect-response",
            message,
        }
        .fail(),
        None => Ok(text),
    }
}
