pub mod generator;
pub mod rig_adapter;
pub mod simulated;
pub mod title;

pub use generator::{
    ChatTurn, GeneratorConfig, GeneratorError, GeneratorEventStream, GeneratorResult,
    GeneratorStreamHandle, GeneratorWorker, NEXUSTALK_PREAMBLE, RESPONSE_MAX_TOKENS,
    RESPONSE_TEMPERATURE, ResponseGenerator, Role, StreamEvent, StreamRequest, collect_response,
};
pub use rig_adapter::{DEFAULT_PROVIDER_MODEL, RIG_PROVIDER_ID, RigGenerator};
pub use simulated::{SIMULATED_RESPONSE_DELAY, SimulatedResponder};
pub use title::{TITLE_MAX_TOKENS, TITLE_TEMPERATURE, generate_title, heuristic_title};
