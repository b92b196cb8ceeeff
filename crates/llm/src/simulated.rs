use std::hash::{DefaultHasher, Hash, Hasher};
use std::time::Duration;

use snafu::ensure;
use tokio::sync::{mpsc, oneshot};

use super::generator::{
    EmptyMessageSetSnafu, GeneratorResult, GeneratorStreamHandle, GeneratorWorker,
    ResponseGenerator, StreamEvent, StreamRequest, make_event_stream,
};

/// Delay before the canned reply is emitted, approximating network latency.
pub const SIMULATED_RESPONSE_DELAY: Duration = Duration::from_secs(1);

/// Keyword table checked in order; first substring match wins.
const KEYWORD_REPLIES: &[(&str, &str)] = &[
    ("hello", "Hello! How can I help you today?"),
    ("hi", "Hi there! What can I do for you?"),
    (
        "how are you",
        "I'm functioning well, thank you for asking! How can I assist you?",
    ),
    (
        "what can you do",
        "I can answer questions, provide information, assist with tasks, generate content, and engage in conversations on a wide range of topics including science, history, technology, and more.",
    ),
    (
        "who are you",
        "I'm NexusTalk, an AI assistant designed to be helpful, informative, and engaging. I'm here to assist you with various tasks and answer your questions.",
    ),
    (
        "help",
        "I'd be happy to help! You can ask me questions, request information, or just chat. What would you like assistance with?",
    ),
];

const JOKES: &[&str] = &[
    "Why don't scientists trust atoms? Because they make up everything!",
    "Why did the scarecrow win an award? Because he was outstanding in his field!",
    "What do you call a fake noodle? An impasta!",
    "How does a penguin build its house? Igloos it together!",
    "Why don't eggs tell jokes? They'd crack each other up!",
];

const WEATHER_REPLY: &str = "I don't have access to real-time weather data, but I can suggest checking a weather service or app for the most current forecast in your area.";
const TIME_REPLY: &str =
    "I don't have access to your local time, but you can check the clock on your device.";
const THANKS_REPLY: &str =
    "You're welcome! If you have any more questions or need further assistance, feel free to ask.";
const DEFAULT_REPLY: &str = "Thank you for your message. I'm here to help with any questions or tasks you might have. Feel free to ask me anything!";

/// Demo response generator: pattern-matched canned replies after a fixed
/// delay. Stands behind the same capability as the hosted provider so the
/// two are swapped by configuration alone.
pub struct SimulatedResponder {
    delay: Duration,
}

impl SimulatedResponder {
    pub fn new() -> Self {
        Self {
            delay: SIMULATED_RESPONSE_DELAY,
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for SimulatedResponder {
    fn default() -> Self {
        Self::new()
    }
}

fn canned_reply(input: &str) -> String {
    let lowercase = input.to_lowercase();

    let mut reply = DEFAULT_REPLY;
    for (keyword, canned) in KEYWORD_REPLIES {
        if lowercase.contains(keyword) {
            reply = canned;
            break;
        }
    }

    // Topic overrides take precedence over the keyword table.
    if lowercase.contains("weather") {
        reply = WEATHER_REPLY;
    } else if lowercase.contains("time") {
        reply = TIME_REPLY;
    } else if lowercase.contains("joke") {
        // Keyed by input so replies stay deterministic under test.
        let mut hasher = DefaultHasher::new();
        lowercase.hash(&mut hasher);
        reply = JOKES[(hasher.finish() as usize) % JOKES.len()];
    } else if lowercase.contains("thank") {
        reply = THANKS_REPLY;
    }

    reply.to_string()
}

async fn run_simulated_worker(
    reply: String,
    delay: Duration,
    event_tx: mpsc::UnboundedSender<StreamEvent>,
    mut cancel_rx: oneshot::Receiver<()>,
) {
    tokio::select! {
        _ = &mut cancel_rx => return,
        _ = tokio::time::sleep(delay) => {}
    }

    if event_tx.send(StreamEvent::Delta(reply)).is_err() {
        return;
    }
    let _ = event_tx.send(StreamEvent::Done);
}

impl ResponseGenerator for SimulatedResponder {
    fn id(&self) -> &str {
        "simulated"
    }

    fn name(&self) -> &str {
        "Simulated Responder"
    }

    fn default_model(&self) -> &str {
        "nexustalk-demo"
    }

    fn stream_chat(&self, request: StreamRequest) -> GeneratorResult<GeneratorStreamHandle> {
        ensure!(
            !request.messages.is_empty(),
            EmptyMessageSetSnafu {
                stage: "simulated-stream-chat",
            }
        );

        // The reply is matched against the newest turn, which is the
        // just-submitted user input.
        let input = request
            .messages
            .last()
            .map(|turn| turn.content.clone())
            .unwrap_or_default();

        let (event_tx, stream, cancel_rx) = make_event_stream();
        let worker: GeneratorWorker = Box::pin(run_simulated_worker(
            canned_reply(&input),
            self.delay,
            event_tx,
            cancel_rx,
        ));

        Ok(GeneratorStreamHandle { stream, worker })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::{ChatTurn, GeneratorError, Role, collect_response};

    #[test]
    fn keyword_table_matches_in_order() {
        assert_eq!(canned_reply("hello there"), KEYWORD_REPLIES[0].1);
        assert_eq!(canned_reply("HELLO"), KEYWORD_REPLIES[0].1);
        assert_eq!(canned_reply("who are you exactly?"), KEYWORD_REPLIES[4].1);
        assert_eq!(canned_reply("something unmatched"), DEFAULT_REPLY);
    }

    #[test]
    fn topic_overrides_beat_the_keyword_table() {
        assert_eq!(canned_reply("hello, what's the weather?"), WEATHER_REPLY);
        assert_eq!(canned_reply("thanks for the help"), THANKS_REPLY);
        assert!(JOKES.contains(&canned_reply("tell me a joke").as_str()));
        // Same input, same joke.
        assert_eq!(canned_reply("tell me a joke"), canned_reply("tell me a joke"));
    }

    #[tokio::test]
    async fn streams_one_delta_then_done() {
        let responder = SimulatedResponder::with_delay(Duration::ZERO);
        let handle = responder
            .stream_chat(StreamRequest::new(
                "nexustalk-demo",
                vec![ChatTurn::new(Role::User, "hello")],
            ))
            .unwrap();

        let text = collect_response(handle).await.unwrap();
        assert_eq!(text, "Hello! How can I help you today?");
    }

    #[test]
    fn rejects_empty_message_set() {
        let responder = SimulatedResponder::with_delay(Duration::ZERO);
        let error = responder
            .stream_chat(StreamRequest::new("nexustalk-demo", Vec::new()))
            .err()
            .unwrap();
        assert!(matches!(error, GeneratorError::EmptyMessageSet { .. }));
    }
}
