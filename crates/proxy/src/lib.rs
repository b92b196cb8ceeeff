use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use serde::Deserialize;
use snafu::{ResultExt, Snafu};
use tokio::sync::watch;

use nexus_llm::{
    ChatTurn, GeneratorStreamHandle, NEXUSTALK_PREAMBLE, RESPONSE_MAX_TOKENS,
    RESPONSE_TEMPERATURE, ResponseGenerator, Role, StreamEvent, StreamRequest,
};

/// Shared state for the completion proxy.
pub struct ProxyState {
    generator: Arc<dyn ResponseGenerator>,
    model_id: String,
}

impl ProxyState {
    pub fn new(generator: Arc<dyn ResponseGenerator>) -> Self {
        let model_id = generator.default_model().to_string();
        Self {
            generator,
            model_id,
        }
    }
}

/// `POST /api/chat` request body.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<WireMessage>,
}

#[derive(Debug, Deserialize)]
pub struct WireMessage {
    pub role: String,
    pub content: String,
}

fn wire_role(raw: &str) -> Role {
    match raw.to_lowercase().as_str() {
        "assistant" => Role::Assistant,
        "system" => Role::System,
        // Unknown roles degrade to user input rather than being rejected.
        _ => Role::User,
    }
}

pub fn router(state: Arc<ProxyState>) -> Router {
    Router::new()
        .route("/api/chat", post(chat_completions))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok", "service": "nexustalk-proxy" }))
}

/// Forwards a conversation history to the configured generator and streams
/// the text back. Fails closed: any error before the first byte yields a
/// single JSON error payload with a server-fault status.
async fn chat_completions(
    State(state): State<Arc<ProxyState>>,
    Json(request): Json<ChatRequest>,
) -> Response {
    let turns = request
        .messages
        .iter()
        .map(|message| ChatTurn::new(wire_role(&message.role), message.content.clone()))
        .collect();

    let stream_request = StreamRequest::new(state.model_id.clone(), turns)
        .with_preamble(NEXUSTALK_PREAMBLE)
        .with_temperature(RESPONSE_TEMPERATURE)
        .with_max_tokens(RESPONSE_MAX_TOKENS);

    let handle = match state.generator.stream_chat(stream_request) {
        Ok(handle) => handle,
        Err(error) => {
            tracing::error!(error = %error, "failed to open completion stream");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "Failed to process chat request" })),
            )
                .into_response();
        }
    };

    let GeneratorStreamHandle { stream, worker } = handle;
    tokio::spawn(worker);

    let body = Body::from_stream(futures::stream::unfold(stream, |mut stream| async move {
        match stream.recv().await {
            Some(StreamEvent::Delta(chunk)) => {
                Some((Ok::<_, Infallible>(Bytes::from(chunk)), stream))
            }
            Some(StreamEvent::Error(message)) => {
                // The status line is already committed; all we can do is
                // terminate the body and leave a trace.
                tracing::warn!(error = %message, "completion stream failed mid-response");
                None
            }
            Some(StreamEvent::Done) | None => None,
        }
    }));

    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response()
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ProxyServeError {
    #[snafu(display("failed to bind completion proxy to {addr}"))]
    Bind {
        stage: &'static str,
        addr: SocketAddr,
        source: std::io::Error,
    },
    #[snafu(display("completion proxy server failed"))]
    Serve {
        stage: &'static str,
        source: std::io::Error,
    },
}

/// Serves the proxy until the shutdown channel fires.
pub async fn serve(
    addr: SocketAddr,
    state: Arc<ProxyState>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<(), ProxyServeError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context(BindSnafu {
            stage: "proxy-bind",
            addr,
        })?;
    tracing::info!("completion proxy listening on http://{addr}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
            tracing::info!("completion proxy shutting down");
        })
        .await
        .context(ServeSnafu {
            stage: "proxy-serve",
        })
}
