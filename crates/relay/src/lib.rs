pub mod client;
pub mod wire;

pub use client::{
    DEFAULT_RELAY_URL, RECONNECT_ATTEMPT_LIMIT, RECONNECT_DELAY, RelayClient, RelayConfig,
    RelayEvent,
};
pub use wire::{
    InboundFrame, InboundMessage, OutboundFrame, OutboundMessage, TypingChanged, TypingPayload,
    current_unix_timestamp_ms,
};
