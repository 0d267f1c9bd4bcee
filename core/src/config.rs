use std::path::{Path, PathBuf};

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "BridgeConfig::default_time_format")]
    pub time_format: String,
    #[serde(default = "BridgeConfig::default_time_zone")]
    pub time_zone: String,
    #[serde(default = "BridgeConfig::default_database_path")]
    pub database_path: PathBuf,
    #[serde(default = "BridgeConfig::default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    #[serde(default = "TelegramConfig::default_api_url")]
    pub api_url: String,
    pub target_chat_id: i64,
    /// A self-hosted Bot API server lifts the upload ceiling.
    #[serde(default)]
    pub self_hosted_api: bool,
}

impl TelegramConfig {
    fn default_api_url() -> String {
        "https://api.telegram.org".to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppConfig {
    #[serde(default)]
    pub sidecar_command: Vec<String>,
    #[serde(default = "WhatsAppConfig::default_id_command")]
    pub id_command: String,

    #[serde(default)]
    pub skip_images: bool,
    #[serde(default)]
    pub skip_gifs: bool,
    #[serde(default)]
    pub skip_videos: bool,
    #[serde(default)]
    pub skip_voice_notes: bool,
    #[serde(default)]
    pub skip_audios: bool,
    #[serde(default)]
    pub skip_documents: bool,
    #[serde(default)]
    pub skip_stickers: bool,
    #[serde(default)]
    pub skip_contacts: bool,
    #[serde(default)]
    pub skip_locations: bool,

    #[serde(default)]
    pub skip_status: bool,
    /// Sender users whose status updates are dropped.
    #[serde(default)]
    pub status_ignored_chats: Vec<String>,
    /// Chat users dropped entirely unless the operator sent the message.
    #[serde(default)]
    pub ignore_chats: Vec<String>,
    /// Groups where someone other than the operator may trigger `@all`.
    #[serde(default)]
    pub tag_all_allowed_groups: Vec<String>,

    #[serde(default)]
    pub send_my_messages_from_other_devices: bool,
    #[serde(default = "default_true")]
    pub send_revoked_message_updates: bool,
    #[serde(default)]
    pub skip_chat_details: bool,
    #[serde(default)]
    pub skip_profile_picture_updates: bool,
    #[serde(default)]
    pub skip_group_settings_updates: bool,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            sidecar_command: Vec::new(),
            id_command: Self::default_id_command(),
            skip_images: false,
            skip_gifs: false,
            skip_videos: false,
            skip_voice_notes: false,
            skip_audios: false,
            skip_documents: false,
            skip_stickers: false,
            skip_contacts: false,
            skip_locations: false,
            skip_status: false,
            status_ignored_chats: Vec::new(),
            ignore_chats: Vec::new(),
            tag_all_allowed_groups: Vec::new(),
            send_my_messages_from_other_devices: false,
            send_revoked_message_updates: true,
            skip_chat_details: false,
            skip_profile_picture_updates: false,
            skip_group_settings_updates: false,
        }
    }
}

impl WhatsAppConfig {
    fn default_id_command() -> String {
        ".id".to_string()
    }
}

fn default_true() -> bool {
    true
}

impl BridgeConfig {
    fn default_time_format() -> String {
        "%d %b %Y %H:%M:%S".to_string()
    }

    fn default_time_zone() -> String {
        "UTC".to_string()
    }

    fn default_database_path() -> PathBuf {
        PathBuf::from("relay.sqlite")
    }

    fn default_log_level() -> String {
        "info".to_string()
    }

    /// Minimal configuration pointing at one destination chat.
    pub fn new(bot_token: impl Into<String>, target_chat_id: i64) -> Self {
        Self {
            time_format: Self::default_time_format(),
            time_zone: Self::default_time_zone(),
            database_path: Self::default_database_path(),
            log_level: Self::default_log_level(),
            log_format: LogFormat::default(),
            telegram: TelegramConfig {
                bot_token: bot_token.into(),
                api_url: TelegramConfig::default_api_url(),
                target_chat_id,
                self_hosted_api: false,
            },
            whatsapp: WhatsAppConfig::default(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("read {} failed: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, CoreError> {
        let config: BridgeConfig =
            toml::from_str(content).map_err(|e| CoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.telegram.bot_token.trim().is_empty() {
            return Err(CoreError::Config("telegram.bot_token cannot be empty".to_string()));
        }
        if self.telegram.target_chat_id == 0 {
            return Err(CoreError::Config("telegram.target_chat_id must be set".to_string()));
        }
        self.tz()?;
        if self.whatsapp.id_command.trim().is_empty() {
            return Err(CoreError::Config("whatsapp.id_command cannot be empty".to_string()));
        }
        Ok(())
    }

    /// The sidecar command is only needed by the daemon, not by the core.
    pub fn validate_sidecar(&self) -> Result<(), CoreError> {
        if self.whatsapp.sidecar_command.is_empty() {
            return Err(CoreError::Config("whatsapp.sidecar_command cannot be empty".to_string()));
        }
        Ok(())
    }

    pub fn tz(&self) -> Result<Tz, CoreError> {
        self.time_zone
            .parse::<Tz>()
            .map_err(|e| CoreError::Config(format!("unknown time_zone {}: {}", self.time_zone, e)))
    }
}
