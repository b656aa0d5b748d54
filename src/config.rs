use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use validator::Validate;

use crate::orchestrator::OrchestratorSettings;
use crate::services::{GenerationParams, GigaChatSettings, StagingPolicy};

const DEFAULT_SYSTEM_PROMPT: &str = "You are a careful study assistant. \
Answer the user's questions clearly and concisely, and when files are attached, \
ground your answer in their contents and turn them into well-structured notes. \
Keep answers under 300 words unless asked for more.";

/// Main configuration for Conspectator
#[derive(Debug, Deserialize, Validate, Clone)]
pub struct Config {
    /// Interface the HTTP server binds to
    pub server_host: String,

    /// HTTP server port
    #[validate(range(min = 1024, max = 65535))]
    pub server_port: u16,

    /// Database URL (SeaORM / SQLite)
    pub database_url: String,

    /// Maximum database connections
    #[validate(range(min = 1, max = 100))]
    pub max_connections: u32,

    /// Root directory for attachment bytes
    pub storage_dir: PathBuf,

    #[validate(range(min = 1))]
    pub max_upload_bytes: u64,

    /// Extensions accepted by the upload endpoint, without the dot
    #[validate(length(min = 1))]
    pub allowed_extensions: Vec<String>,

    /// Log level (e.g., info, debug, trace)
    pub log_level: String,

    pub cors_enabled: bool,

    /// Process turns of one chat one at a time
    pub serialize_chat_turns: bool,

    /// Send the current message only once instead of replaying its stored copy too
    pub dedupe_current_turn: bool,

    /// File holding the system instruction prepended to every history
    pub system_prompt_path: Option<PathBuf>,

    /// GigaChat authorization key (base64 `client_id:client_secret`)
    #[validate(length(min = 1, message = "gigachat_credentials must be set"))]
    pub gigachat_credentials: String,

    pub gigachat_scope: String,

    pub gigachat_model: String,

    #[validate(url)]
    pub gigachat_auth_url: String,

    #[validate(url)]
    pub gigachat_base_url: String,

    #[validate(range(min = 100))]
    pub gigachat_timeout_ms: u64,

    #[validate(range(min = 0.0, max = 2.0))]
    pub gigachat_temperature: f32,

    #[validate(range(min = 1))]
    pub gigachat_max_tokens: u32,

    #[validate(range(min = 1, max = 4))]
    pub gigachat_sample_count: u32,

    pub gigachat_profanity_check: bool,

    /// The provider's certificate chain is often missing from default trust stores
    pub gigachat_accept_invalid_certs: bool,
}

impl Config {
    /// Defaults, then the config file, then `CONSPECTATOR__*` environment variables.
    ///
    /// An explicit `path` must exist; the default `~/.conspectator/config` is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let file_source = match path {
            Some(path) => config::File::from(path.to_path_buf()).required(true),
            None => {
                let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
                let base = home.join(".conspectator").join("config");
                config::File::with_name(&base.to_string_lossy()).required(false)
            }
        };

        let settings = config::Config::builder()
            // Server
            .set_default("server_host", "127.0.0.1")?
            .set_default("server_port", 3333)?
            .set_default("database_url", "sqlite://conspectator.db")?
            .set_default("max_connections", 5)?
            .set_default("log_level", "info")?
            .set_default("cors_enabled", true)?
            .set_default("serialize_chat_turns", true)?
            .set_default("dedupe_current_turn", false)?
            // Uploads
            .set_default("storage_dir", "storage/uploads")?
            .set_default("max_upload_bytes", 20 * 1024 * 1024)?
            .set_default(
                "allowed_extensions",
                vec!["txt", "pdf", "doc", "docx", "png", "jpg", "jpeg"],
            )?
            // GigaChat
            .set_default("gigachat_credentials", "")?
            .set_default("gigachat_scope", "GIGACHAT_API_PERS")?
            .set_default("gigachat_model", "GigaChat")?
            .set_default(
                "gigachat_auth_url",
                "https://ngw.devices.sberbank.ru:9443/api/v2/oauth",
            )?
            .set_default(
                "gigachat_base_url",
                "https://gigachat.devices.sberbank.ru/api/v1",
            )?
            .set_default("gigachat_timeout_ms", 5000)?
            .set_default("gigachat_temperature", 0.87)?
            .set_default("gigachat_max_tokens", 512)?
            .set_default("gigachat_sample_count", 1)?
            .set_default("gigachat_profanity_check", false)?
            .set_default("gigachat_accept_invalid_certs", false)?
            .add_source(file_source)
            // Environment overrides: CONSPECTATOR__SERVER_PORT, CONSPECTATOR__GIGACHAT_CREDENTIALS, etc.
            .add_source(
                config::Environment::with_prefix("CONSPECTATOR")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("allowed_extensions"),
            )
            .build()?;

        let mut cfg: Config = settings.try_deserialize()?;
        cfg.allowed_extensions = cfg
            .allowed_extensions
            .iter()
            .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    pub fn generation_params(&self) -> GenerationParams {
        GenerationParams {
            model: self.gigachat_model.clone(),
            temperature: self.gigachat_temperature,
            max_tokens: self.gigachat_max_tokens,
            sample_count: self.gigachat_sample_count,
            profanity_check: self.gigachat_profanity_check,
        }
    }

    pub fn gateway_settings(&self) -> GigaChatSettings {
        GigaChatSettings {
            credentials: self.gigachat_credentials.clone(),
            scope: self.gigachat_scope.clone(),
            auth_url: self.gigachat_auth_url.clone(),
            base_url: self.gigachat_base_url.clone(),
            timeout: Duration::from_millis(self.gigachat_timeout_ms),
            accept_invalid_certs: self.gigachat_accept_invalid_certs,
        }
    }

    pub fn staging_policy(&self) -> StagingPolicy {
        StagingPolicy {
            max_bytes: self.max_upload_bytes,
            allowed_extensions: self.allowed_extensions.clone(),
        }
    }

    /// Reads the system prompt file once; falls back to the built-in prompt.
    pub fn load_system_prompt(&self) -> String {
        let Some(path) = self.system_prompt_path.as_deref() else {
            return DEFAULT_SYSTEM_PROMPT.to_string();
        };

        match std::fs::read_to_string(path) {
            Ok(prompt) if !prompt.trim().is_empty() => prompt,
            Ok(_) => {
                tracing::warn!(
                    "System prompt file {} is empty, using the built-in prompt",
                    path.display()
                );
                DEFAULT_SYSTEM_PROMPT.to_string()
            }
            Err(e) => {
                tracing::warn!(
                    "Cannot read system prompt {}: {}. Using the built-in prompt",
                    path.display(),
                    e
                );
                DEFAULT_SYSTEM_PROMPT.to_string()
            }
        }
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            system_prompt: self.load_system_prompt(),
            params: self.generation_params(),
            serialize_chat_turns: self.serialize_chat_turns,
            dedupe_current_turn: self.dedupe_current_turn,
        }
    }
}
