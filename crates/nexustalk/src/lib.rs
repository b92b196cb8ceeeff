pub mod auth;
pub mod config;
pub mod controller;
pub mod export;

pub use auth::{AuthService, OauthProvider};
pub use config::{AppConfig, ConfigStore, GeneratorMode, TitleMode, build_generator};
pub use controller::{SessionController, SubmitError, TurnReport, TurnState};
