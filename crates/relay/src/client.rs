use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use nexus_store::{ConversationId, MessageId, UserId};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::wire::{
    InboundFrame, OutboundFrame, OutboundMessage, TypingPayload, current_unix_timestamp_ms,
};

/// Reconnection attempts after a lost or failed connection.
pub const RECONNECT_ATTEMPT_LIMIT: u32 = 5;

/// Pause between reconnection attempts.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(1);

pub const DEFAULT_RELAY_URL: &str = "ws://localhost:5000";

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub url: String,
    pub reconnect_attempt_limit: u32,
    pub reconnect_delay: Duration,
}

impl RelayConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect_attempt_limit: RECONNECT_ATTEMPT_LIMIT,
            reconnect_delay: RECONNECT_DELAY,
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::new(DEFAULT_RELAY_URL)
    }
}

/// Relay traffic translated into domain language for the session controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    Connected,
    Disconnected,
    MessageReceived(super::wire::InboundMessage),
    TypingChanged { is_typing: bool },
}

/// Client for the realtime relay channel.
///
/// Constructed explicitly and handed to whoever needs it; there is no
/// process-wide connection. Outbound operations are fire-and-forget and
/// become silent no-ops while disconnected: no queuing, no retry beyond
/// the bounded reconnect loop.
pub struct RelayClient {
    outbound_tx: mpsc::UnboundedSender<OutboundFrame>,
    connected: Arc<AtomicBool>,
    shutdown_tx: watch::Sender<bool>,
    worker: Option<JoinHandle<()>>,
}

impl RelayClient {
    /// Connects in the background and returns the client plus the inbound
    /// event channel. The connection itself is established (and bounded-ly
    /// re-established) by the worker task.
    pub fn connect(config: RelayConfig) -> (Self, mpsc::UnboundedReceiver<RelayEvent>) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let connected = Arc::new(AtomicBool::new(false));

        let worker = tokio::spawn(run_worker(
            config,
            outbound_rx,
            event_tx,
            Arc::clone(&connected),
            shutdown_rx,
        ));

        (
            Self {
                outbound_tx,
                connected,
                shutdown_tx,
                worker: Some(worker),
            },
            event_rx,
        )
    }

    /// A client with no connection and no worker: every outbound operation
    /// is a no-op. Used when the relay is disabled and as a test double.
    pub fn offline() -> (Self, mpsc::UnboundedReceiver<RelayEvent>) {
        let (outbound_tx, _outbound_rx) = mpsc::unbounded_channel();
        let (_event_tx, event_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _shutdown_rx) = watch::channel(false);

        (
            Self {
                outbound_tx,
                connected: Arc::new(AtomicBool::new(false)),
                shutdown_tx,
                worker: None,
            },
            event_rx,
        )
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn join_chat(&self, chat_id: ConversationId) {
        self.emit(OutboundFrame::JoinChat(chat_id));
    }

    pub fn leave_chat(&self, chat_id: ConversationId) {
        self.emit(OutboundFrame::LeaveChat(chat_id));
    }

    pub fn send_message(
        &self,
        message_id: MessageId,
        chat_id: ConversationId,
        content: &str,
        user_id: UserId,
    ) {
        self.emit(OutboundFrame::SendMessage(OutboundMessage {
            id: message_id,
            chat_id,
            message: content.to_string(),
            user_id,
            timestamp: current_unix_timestamp_ms(),
        }));
    }

    pub fn send_typing(&self, chat_id: ConversationId, user_id: UserId, is_typing: bool) {
        self.emit(OutboundFrame::Typing(TypingPayload {
            chat_id,
            user_id,
            is_typing,
        }));
    }

    /// Ends the connection and the worker task.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(worker) = self.worker.take() {
            let _ = worker.await;
        }
    }

    fn emit(&self, frame: OutboundFrame) {
        if !self.is_connected() {
            tracing::debug!(?frame, "relay offline, dropping outbound frame");
            return;
        }
        let _ = self.outbound_tx.send(frame);
    }

    #[cfg(test)]
    fn test_pair(connected: bool) -> (Self, mpsc::UnboundedReceiver<OutboundFrame>) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _shutdown_rx) = watch::channel(false);
        (
            Self {
                outbound_tx,
                connected: Arc::new(AtomicBool::new(connected)),
                shutdown_tx,
                worker: None,
            },
            outbound_rx,
        )
    }
}

type RelaySocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

enum ConnectionEnd {
    /// The transport closed or failed; eligible for reconnection.
    Lost,
    /// The client asked to stop; no reconnection.
    Stopped,
}

async fn run_worker(
    config: RelayConfig,
    mut outbound_rx: mpsc::UnboundedReceiver<OutboundFrame>,
    event_tx: mpsc::UnboundedSender<RelayEvent>,
    connected: Arc<AtomicBool>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut attempts_remaining = config.reconnect_attempt_limit;

    loop {
        let connect = tokio::select! {
            _ = shutdown_rx.changed() => return,
            connect = connect_async(&config.url) => connect,
        };

        match connect {
            Ok((socket, _)) => {
                attempts_remaining = config.reconnect_attempt_limit;
                connected.store(true, Ordering::Relaxed);
                let _ = event_tx.send(RelayEvent::Connected);
                tracing::info!(url = %config.url, "relay connected");

                let end = run_connection(socket, &mut outbound_rx, &event_tx, &mut shutdown_rx)
                    .await;

                connected.store(false, Ordering::Relaxed);
                let _ = event_tx.send(RelayEvent::Disconnected);
                tracing::info!(url = %config.url, "relay disconnected");

                if matches!(end, ConnectionEnd::Stopped) {
                    return;
                }
            }
            Err(error) => {
                tracing::warn!(url = %config.url, error = %error, "relay connection failed");
            }
        }

        if attempts_remaining == 0 {
            tracing::warn!(
                url = %config.url,
                attempt_limit = config.reconnect_attempt_limit,
                "relay reconnect attempts exhausted, staying offline"
            );
            return;
        }
        attempts_remaining -= 1;

        tokio::select! {
            _ = shutdown_rx.changed() => return,
            _ = tokio::time::sleep(config.reconnect_delay) => {}
        }
    }
}

async fn run_connection(
    socket: RelaySocket,
    outbound_rx: &mut mpsc::UnboundedReceiver<OutboundFrame>,
    event_tx: &mpsc::UnboundedSender<RelayEvent>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> ConnectionEnd {
    let (mut sink, mut source) = socket.split();

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                let _ = sink.send(Message::Close(None)).await;
                return ConnectionEnd::Stopped;
            }
            frame = outbound_rx.recv() => {
                let Some(frame) = frame else {
                    // Every client handle is gone.
                    let _ = sink.send(Message::Close(None)).await;
                    return ConnectionEnd::Stopped;
                };
                let payload = match serde_json::to_string(&frame) {
                    Ok(payload) => payload,
                    Err(error) => {
                        tracing::warn!(error = %error, "failed to serialize relay frame");
                        continue;
                    }
                };
                if sink.send(Message::Text(payload)).await.is_err() {
                    return ConnectionEnd::Lost;
                }
            }
            incoming = source.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => dispatch_inbound(&text, event_tx),
                    Some(Ok(Message::Close(_))) | None => return ConnectionEnd::Lost,
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        tracing::warn!(error = %error, "relay read failed");
                        return ConnectionEnd::Lost;
                    }
                }
            }
        }
    }
}

fn dispatch_inbound(text: &str, event_tx: &mpsc::UnboundedSender<RelayEvent>) {
    let frame = match serde_json::from_str::<InboundFrame>(text) {
        Ok(frame) => frame,
        Err(error) => {
            tracing::warn!(error = %error, "dropping undecodable relay frame");
            return;
        }
    };

    let event = match frame {
        InboundFrame::NewMessage(message) => RelayEvent::MessageReceived(message),
        InboundFrame::UserTyping(typing) => RelayEvent::TypingChanged {
            is_typing: typing.is_typing,
        },
    };
    let _ = event_tx.send(event);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disconnected_sends_are_silent_no_ops() {
        let (client, mut outbound_rx) = RelayClient::test_pair(false);
        assert!(!client.is_connected());

        client.join_chat(ConversationId::new_v7());
        client.send_message(
            MessageId::new_v7(),
            ConversationId::new_v7(),
            "dropped",
            UserId::new_v7(),
        );
        client.send_typing(ConversationId::new_v7(), UserId::new_v7(), true);

        assert!(outbound_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn connected_sends_reach_the_worker_in_order() {
        let (client, mut outbound_rx) = RelayClient::test_pair(true);
        let chat_id = ConversationId::new_v7();
        let user_id = UserId::new_v7();
        let message_id = MessageId::new_v7();

        client.join_chat(chat_id);
        client.send_message(message_id, chat_id, "hello", user_id);
        client.leave_chat(chat_id);

        assert_eq!(
            outbound_rx.try_recv().unwrap(),
            OutboundFrame::JoinChat(chat_id)
        );
        let OutboundFrame::SendMessage(message) = outbound_rx.try_recv().unwrap() else {
            panic!("expected a send-message frame");
        };
        assert_eq!(message.id, message_id);
        assert_eq!(message.message, "hello");
        assert_eq!(
            outbound_rx.try_recv().unwrap(),
            OutboundFrame::LeaveChat(chat_id)
        );
    }

    #[tokio::test]
    async fn offline_client_never_panics() {
        let (client, mut event_rx) = RelayClient::offline();
        assert!(!client.is_connected());

        client.send_typing(ConversationId::new_v7(), UserId::new_v7(), false);
        assert!(event_rx.try_recv().is_err());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn exchanges_frames_with_a_live_relay_server() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut socket = tokio_tungstenite::accept_async(stream).await.unwrap();

            let frame = socket.next().await.unwrap().unwrap();
            let Message::Text(text) = frame else {
                panic!("expected a text frame");
            };
            assert!(text.contains("join-chat"));

            let inbound = serde_json::json!({
                "event": "user-typing",
                "data": { "isTyping": true }
            });
            socket
                .send(Message::Text(inbound.to_string()))
                .await
                .unwrap();

            // Hold the connection open until the client closes it.
            while let Some(Ok(frame)) = socket.next().await {
                if matches!(frame, Message::Close(_)) {
                    break;
                }
            }
        });

        let (client, mut events) = RelayClient::connect(RelayConfig::new(format!("ws://{addr}")));
        assert_eq!(events.recv().await, Some(RelayEvent::Connected));
        assert!(client.is_connected());

        client.join_chat(ConversationId::new_v7());
        assert_eq!(
            events.recv().await,
            Some(RelayEvent::TypingChanged { is_typing: true })
        );

        client.shutdown().await;
        server.await.unwrap();
    }

    #[test]
    fn inbound_dispatch_maps_frames_to_events() {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();

        dispatch_inbound(r#"{"event":"user-typing","data":{"isTyping":true}}"#, &event_tx);
        assert_eq!(
            event_rx.try_recv().unwrap(),
            RelayEvent::TypingChanged { is_typing: true }
        );

        dispatch_inbound("not json", &event_tx);
        assert!(event_rx.try_recv().is_err());
    }
}
