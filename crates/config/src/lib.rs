use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

const DEFAULT_CONFIG_FILES: &[&str] = &[
    "parley.toml",
    "config/parley.toml",
    "crates/config/parley.toml",
    "../parley.toml",
    "../config/parley.toml",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub channel: ChannelConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

/// Settings for the request/response HTTP collaborator.
///
/// ```
/// use parley_config::ApiConfig;
///
/// let api = ApiConfig::default();
/// assert_eq!(api.base_url, "http://localhost:8080");
/// assert_eq!(api.request_timeout().as_secs(), 30);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "ApiConfig::default_base_url")]
    pub base_url: String,
    #[serde(default = "ApiConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl ApiConfig {
    fn default_base_url() -> String {
        "http://localhost:8080".to_string()
    }

    const fn default_request_timeout() -> u64 {
        30
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: Self::default_base_url(),
            request_timeout_seconds: Self::default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    #[serde(default = "ChannelConfig::default_url")]
    pub url: String,
    #[serde(default = "ChannelConfig::default_connect_timeout")]
    pub connect_timeout_seconds: u64,
}

impl ChannelConfig {
    fn default_url() -> String {
        "ws://localhost:8080/ws".to_string()
    }

    const fn default_connect_timeout() -> u64 {
        10
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            url: Self::default_url(),
            connect_timeout_seconds: Self::default_connect_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// How long the code input group stays flagged after a rejected code.
    #[serde(default = "AuthConfig::default_error_flash")]
    pub error_flash_millis: u64,
}

impl AuthConfig {
    const fn default_error_flash() -> u64 {
        500
    }

    pub fn error_flash(&self) -> Duration {
        Duration::from_millis(self.error_flash_millis)
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            error_flash_millis: Self::default_error_flash(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Conversation opened right after a successful login.
    #[serde(default = "ChatConfig::default_conversation")]
    pub default_conversation: Option<String>,
    /// Interval between history refetches of the open conversation; zero disables polling.
    #[serde(default = "ChatConfig::default_refresh_interval")]
    pub refresh_interval_seconds: u64,
}

impl ChatConfig {
    fn default_conversation() -> Option<String> {
        Some("1".to_string())
    }

    const fn default_refresh_interval() -> u64 {
        5
    }

    pub fn refresh_interval(&self) -> Option<Duration> {
        (self.refresh_interval_seconds > 0)
            .then(|| Duration::from_secs(self.refresh_interval_seconds))
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            default_conversation: Self::default_conversation(),
            refresh_interval_seconds: Self::default_refresh_interval(),
        }
    }
}

/// Load the client configuration by combining defaults, files, and environment overrides.
///
/// ```
/// use parley_config::load;
///
/// std::env::remove_var("PARLEY_CONFIG");
///
/// let config = load().expect("configuration should load with defaults");
/// assert!(!config.api.base_url.is_empty());
/// ```
pub fn load() -> anyhow::Result<ClientConfig> {
    let defaults = ClientConfig::default();

    let mut builder = config::Config::builder()
        .set_default("api.base_url", defaults.api.base_url.clone())?
        .set_default(
            "api.request_timeout_seconds",
            i64::try_from(defaults.api.request_timeout_seconds).unwrap_or(i64::MAX),
        )?
        .set_default("channel.url", defaults.channel.url.clone())?
        .set_default(
            "channel.connect_timeout_seconds",
            i64::try_from(defaults.channel.connect_timeout_seconds).unwrap_or(i64::MAX),
        )?
        .set_default(
            "auth.error_flash_millis",
            i64::try_from(defaults.auth.error_flash_millis).unwrap_or(i64::MAX),
        )?
        .set_default(
            "chat.refresh_interval_seconds",
            i64::try_from(defaults.chat.refresh_interval_seconds).unwrap_or(i64::MAX),
        )?;

    if let Some(conversation) = defaults.chat.default_conversation.clone() {
        builder = builder.set_default("chat.default_conversation", conversation)?;
    }

    let environment_overrides = config::Environment::with_prefix("PARLEY").separator("__");

    let mut config_file_attached = false;

    if let Ok(path) = std::env::var("PARLEY_CONFIG") {
        builder = builder.add_source(config::File::from(PathBuf::from(&path)));
        config_file_attached = true;
        debug!(path, "loading configuration via PARLEY_CONFIG");
    } else if let Ok(cwd) = std::env::current_dir() {
        let fallback = DEFAULT_CONFIG_FILES
            .iter()
            .map(|candidate| cwd.join(candidate))
            .find(|path| path.exists());

        if let Some(path) = fallback {
            debug!(path = %path.display(), "loading configuration file");
            builder = builder.add_source(config::File::from(path));
            config_file_attached = true;
        }
    }

    if !config_file_attached {
        debug!("no configuration file found, relying on defaults and environment overrides");
    }

    builder = builder.add_source(environment_overrides);

    let cfg = builder.build().context("unable to build configuration")?;

    let mut config = cfg
        .try_deserialize::<ClientConfig>()
        .context("invalid configuration")?;

    config.api.base_url = config.api.base_url.trim_end_matches('/').to_string();

    if config
        .chat
        .default_conversation
        .as_deref()
        .is_some_and(|id| id.trim().is_empty())
    {
        config.chat.default_conversation = None;
    }

    debug!(?config, "loaded client configuration");
    Ok(config)
}
