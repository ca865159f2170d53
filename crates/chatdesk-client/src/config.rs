use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::anyhow;
use chatdesk_types::Sender;
use serde::Deserialize;

use crate::session::SessionOptions;

/// Default config template created when no config exists
const DEFAULT_CONFIG: &str = r#"
[chat]
page_size = 25  # messages per fetched window

[reconnect]
delay_secs = 3  # flat probe delay after a transport failure

[logging]
level = "info"  # trace, debug, info, warn, error
"#;

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    pub page_size: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReconnectConfig {
    pub delay_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub chat: ChatConfig,
    pub reconnect: ReconnectConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Get the global config path: ~/.chatdesk/chatdesk.toml
    fn global_config_path() -> anyhow::Result<PathBuf> {
        let home = dirs::home_dir().ok_or_else(|| anyhow!("could not find home directory"))?;
        Ok(home.join(".chatdesk").join("chatdesk.toml"))
    }

    /// Ensure global config directory and file exist, creating defaults if needed
    fn ensure_global_config() -> anyhow::Result<PathBuf> {
        let config_path = Self::global_config_path()?;

        if let Some(config_dir) = config_path.parent() {
            if !config_dir.exists() {
                fs::create_dir_all(config_dir)?;
                eprintln!("Created config directory: {}", config_dir.display());
            }
        }

        if !config_path.exists() {
            fs::write(&config_path, DEFAULT_CONFIG.trim())?;
            eprintln!("Created default config: {}", config_path.display());
        }

        Ok(config_path)
    }

    /// Load configuration with layered approach:
    /// 1. Global config: ~/.chatdesk/chatdesk.toml (auto-created if missing)
    /// 2. Local override: ./chatdesk.toml (workspace, optional)
    /// 3. Environment variables (highest priority)
    pub fn load() -> anyhow::Result<Self> {
        // Load .env file from current directory
        dotenvy::dotenv().ok();

        let global_config_path = Self::ensure_global_config()?;

        let mut config_builder = config::Config::builder()
            .add_source(config::File::from(global_config_path))
            .add_source(config::File::with_name("chatdesk").required(false))
            .add_source(config::Environment::with_prefix("CHATDESK").separator("__"));

        // Convenience env var overrides (highest priority)
        if let Ok(level) = env::var("CHATDESK_LOG_LEVEL") {
            config_builder = config_builder.set_override("logging.level", level)?;
        }
        if let Ok(delay) = env::var("CHATDESK_RECONNECT_DELAY_SECS") {
            config_builder = config_builder.set_override("reconnect.delay_secs", delay)?;
        }

        let config = config_builder.build()?;
        let config: Self = config.try_deserialize()?;
        Ok(config)
    }

    /// Session tunables derived from the loaded values.
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            page_size: self.chat.page_size,
            reconnect_delay: Duration::from_secs(self.reconnect.delay_secs),
            local_sender: Sender::Admin,
        }
    }
}
