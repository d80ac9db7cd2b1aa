//! Application settings and configuration structures.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use validator::Validate;

/// Root configuration structure containing all client settings.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Settings {
    /// Real-time (Socket.IO) endpoint and reconnection policy
    #[validate(nested)]
    pub realtime: RealtimeSettings,

    /// REST API used for history and conversation summaries
    #[validate(nested)]
    pub api: ApiSettings,

    /// Conversation engine tuning
    #[validate(nested)]
    pub chat: ChatSettings,

    /// Pre-authenticated session used by the headless runner
    pub session: SessionSettings,

    /// Current environment (development, staging, production)
    pub environment: String,
}

/// Real-time connection configuration.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RealtimeSettings {
    /// Base URL of the real-time server (http(s) or ws(s))
    #[validate(url(message = "Realtime URL must be a valid URL"))]
    pub url: String,

    /// Connection attempts before giving up (initial connect and each reconnect cycle)
    #[validate(range(min = 1, message = "At least one connection attempt is required"))]
    pub reconnection_attempts: u32,

    /// Fixed delay between attempts in milliseconds
    pub reconnection_delay_ms: u64,

    /// Per-attempt handshake timeout in milliseconds
    #[validate(range(min = 1, message = "Connect timeout must be non-zero"))]
    pub connect_timeout_ms: u64,

    /// Application-level `ping` interval in milliseconds (0 disables it)
    pub ping_interval_ms: u64,

    /// Capacity of the inbound event broadcast buffer
    #[validate(range(min = 1))]
    pub event_buffer: usize,
}

/// REST API configuration.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ApiSettings {
    /// Base URL including the `/api` prefix
    #[validate(url(message = "API base URL must be a valid URL"))]
    pub base_url: String,

    /// Request timeout in milliseconds
    #[validate(range(min = 1, message = "API timeout must be non-zero"))]
    pub timeout_ms: u64,
}

/// Conversation engine configuration.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ChatSettings {
    /// Messages fetched when a conversation is opened
    #[validate(range(min = 1, max = 100, message = "History page size must be 1-100"))]
    pub history_page_size: u32,

    /// Idle window after the last keystroke before `typing_stop` is sent
    #[validate(range(min = 1))]
    pub typing_idle_ms: u64,

    /// How long a peer's typing indicator survives without a stop event
    #[validate(range(min = 1))]
    pub typing_timeout_ms: u64,

    /// Capacity of the UI update broadcast buffer
    #[validate(range(min = 1))]
    pub update_buffer: usize,
}

/// Session material for the headless runner.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionSettings {
    pub user_id: Option<String>,
    pub role: Option<String>,
    pub name: Option<String>,
    pub token: Option<String>,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080".into(),
            reconnection_attempts: 5,
            reconnection_delay_ms: 1000,
            connect_timeout_ms: 20000,
            ping_interval_ms: 0,
            event_buffer: 1024,
        }
    }
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".into(),
            timeout_ms: 10000,
        }
    }
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            history_page_size: 50,
            typing_idle_ms: 3000,
            typing_timeout_ms: 5000,
            update_buffer: 256,
        }
    }
}

impl Settings {
    /// Load settings from environment variables and configuration files.
    ///
    /// The loading order is:
    /// 1. config/default.toml (base configuration)
    /// 2. config/{RUN_ENV}.toml (environment-specific overrides)
    /// 3. Environment variables (highest priority)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if configuration cannot be loaded or parsed,
    /// or if a value is out of range.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let environment = std::env::var("RUN_ENV").unwrap_or_else(|_| "development".into());
        let realtime = RealtimeSettings::default();
        let api = ApiSettings::default();
        let chat = ChatSettings::default();

        Config::builder()
            .set_default("environment", environment.clone())?
            .set_default("realtime.url", realtime.url)?
            .set_default("realtime.reconnection_attempts", realtime.reconnection_attempts)?
            .set_default("realtime.reconnection_delay_ms", realtime.reconnection_delay_ms)?
            .set_default("realtime.connect_timeout_ms", realtime.connect_timeout_ms)?
            .set_default("realtime.ping_interval_ms", realtime.ping_interval_ms)?
            .set_default("realtime.event_buffer", realtime.event_buffer as u64)?
            .set_default("api.base_url", api.base_url)?
            .set_default("api.timeout_ms", api.timeout_ms)?
            .set_default("chat.history_page_size", chat.history_page_size)?
            .set_default("chat.typing_idle_ms", chat.typing_idle_ms)?
            .set_default("chat.typing_timeout_ms", chat.typing_timeout_ms)?
            .set_default("chat.update_buffer", chat.update_buffer as u64)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // APP__REALTIME__URL=ws://... -> realtime.url
            .add_source(
                Environment::default()
                    .prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("realtime.url", std::env::var("SOCKET_URL").ok())?
            .set_override_option("api.base_url", std::env::var("API_URL").ok())?
            .set_override_option("session.token", std::env::var("AUTH_TOKEN").ok())?
            .build()?
            .try_deserialize()
            .and_then(|settings: Self| {
                settings
                    .validate()
                    .map_err(|e| ConfigError::Message(format!("Invalid configuration: {}", e)))?;
                Ok(settings)
            })
    }
}
