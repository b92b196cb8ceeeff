use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

use nexus_llm::{
    GeneratorConfig, GeneratorResult, RIG_PROVIDER_ID, ResponseGenerator, RigGenerator,
    SimulatedResponder,
};
use nexus_relay::DEFAULT_RELAY_URL;

pub const CONFIG_DIRECTORY_NAME: &str = "nexustalk";
pub const CONFIG_FILE_NAME: &str = "config.json";
pub const ENV_PREFIX: &str = "NEXUSTALK_";

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1";
pub const DEFAULT_PROXY_BIND: &str = "127.0.0.1:3000";

/// Which response-generation implementation backs the app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorMode {
    Simulated,
    Provider,
}

/// How first-exchange conversation titles are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TitleMode {
    Heuristic,
    Generated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorSettings {
    #[serde(default = "default_generator_mode")]
    pub mode: GeneratorMode,
    #[serde(default = "default_provider_id")]
    pub provider_id: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_title_mode")]
    pub title_mode: TitleMode,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            mode: default_generator_mode(),
            provider_id: default_provider_id(),
            api_key: String::new(),
            endpoint: default_endpoint(),
            model: None,
            title_mode: default_title_mode(),
        }
    }
}

impl GeneratorSettings {
    pub fn generator_config(&self) -> GeneratorConfig {
        GeneratorConfig::new(
            &self.provider_id,
            &self.api_key,
            &self.endpoint,
            self.model.clone(),
        )
    }

    fn normalized(mut self) -> Self {
        self.provider_id = if self.provider_id.trim().is_empty() {
            default_provider_id()
        } else {
            self.provider_id.trim().to_string()
        };
        self.api_key = self.api_key.trim().to_string();
        self.endpoint = if self.endpoint.trim().is_empty() {
            default_endpoint()
        } else {
            self.endpoint.trim().to_string()
        };
        self.model = self
            .model
            .and_then(|model| {
                let model = model.trim().to_string();
                if model.is_empty() { None } else { Some(model) }
            });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelaySettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_relay_url")]
    pub url: String,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            url: default_relay_url(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxySettings {
    #[serde(default = "default_proxy_bind")]
    pub bind: String,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            bind: default_proxy_bind(),
        }
    }
}

impl ProxySettings {
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.bind.parse()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub generator: GeneratorSettings,
    #[serde(default)]
    pub relay: RelaySettings,
    #[serde(default)]
    pub proxy: ProxySettings,
    /// Directory holding the persisted session snapshots. Defaults to the
    /// platform data directory when unset.
    #[serde(default)]
    pub storage_dir: Option<PathBuf>,
}

impl AppConfig {
    pub fn resolved_storage_dir(&self) -> PathBuf {
        self.storage_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .map(|path| path.join(CONFIG_DIRECTORY_NAME))
                .unwrap_or_else(|| PathBuf::from(".nexustalk"))
        })
    }

    fn normalized(mut self) -> Self {
        self.generator = self.generator.normalized();
        if self.relay.url.trim().is_empty() {
            self.relay.url = default_relay_url();
        }
        if self.proxy.bind.trim().is_empty() {
            self.proxy.bind = default_proxy_bind();
        }
        self
    }
}

/// Selects the response generator per configuration; there is no source
/// branching between the demo and provider paths anywhere else.
pub fn build_generator(config: &AppConfig) -> GeneratorResult<Arc<dyn ResponseGenerator>> {
    match config.generator.mode {
        GeneratorMode::Simulated => Ok(Arc::new(SimulatedResponder::new())),
        GeneratorMode::Provider => {
            let generator = RigGenerator::new(config.generator.generator_config())?;
            Ok(Arc::new(generator))
        }
    }
}

pub struct ConfigStore {
    config: Arc<ArcSwap<AppConfig>>,
    config_path: PathBuf,
}

impl ConfigStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(CONFIG_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".nexustalk"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(CONFIG_FILE_NAME)
    }

    pub fn new(config_path: PathBuf) -> Self {
        let config = Self::load_from_disk(&config_path);
        Self {
            config: Arc::new(ArcSwap::from_pointee(config)),
            config_path,
        }
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    pub fn config(&self) -> Arc<AppConfig> {
        self.config.load_full()
    }

    pub fn update(&self, config: AppConfig) -> Result<(), ConfigError> {
        let normalized = config.normalized();
        self.persist(&normalized)?;
        self.config.store(Arc::new(normalized));
        Ok(())
    }

    fn load_from_disk(path: &PathBuf) -> AppConfig {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));
        if path.exists() {
            figment = figment.merge(Json::file(path));
        } else {
            tracing::info!("config file not found at {:?}, using defaults", path);
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        match figment.extract::<AppConfig>() {
            Ok(config) => config.normalized(),
            Err(error) => {
                tracing::warn!(
                    "failed to parse config from {:?}: {}. using defaults",
                    path,
                    error
                );
                AppConfig::default()
            }
        }
    }

    fn persist(&self, config: &AppConfig) -> Result<(), ConfigError> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).context(CreateDirSnafu {
                stage: "create-config-directory",
                path: parent.to_path_buf(),
            })?;
        }

        let content = serde_json::to_string_pretty(config).context(SerializeConfigSnafu {
            stage: "serialize-config-json",
        })?;

        let temp_path = self.config_path.with_extension("json.tmp");
        std::fs::write(&temp_path, content).context(WriteFileSnafu {
            stage: "write-temporary-config-file",
            path: temp_path.clone(),
        })?;

        std::fs::rename(&temp_path, &self.config_path).context(RenameTempFileSnafu {
            stage: "rename-temporary-config-file",
            from: temp_path,
            to: self.config_path.clone(),
        })?;

        tracing::info!("saved config to {:?}", self.config_path);
        Ok(())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ConfigError {
    #[snafu(display("failed to create config directory at {path:?} on `{stage}`: {source}"))]
    CreateDir {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to serialize config on `{stage}`: {source}"))]
    SerializeConfig {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to write config file at {path:?} on `{stage}`: {source}"))]
    WriteFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to replace config file from {from:?} to {to:?} on `{stage}`: {source}"))]
    RenameTempFile {
        stage: &'static str,
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

fn default_generator_mode() -> GeneratorMode {
    GeneratorMode::Simulated
}

fn default_provider_id() -> String {
    RIG_PROVIDER_ID.to_string()
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_title_mode() -> TitleMode {
    TitleMode::Heuristic
}

fn default_relay_url() -> String {
    DEFAULT_RELAY_URL.to_string()
}

fn default_proxy_bind() -> String {
    DEFAULT_PROXY_BIND.to_string()
}

fn default_true() -> bool {
    true
}
