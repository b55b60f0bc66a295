//! Process configuration.
//!
//! Key names keep the `Section.PascalCase` shape of the deployment config
//! files, so `Discord.BotToken` in TOML or JSON lands where operators expect.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{MountError, MountResult};

/// Chat-service connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DiscordConfig {
    /// Bot token used by the SDK binding. Required.
    pub bot_token: String,
    /// Target channel id. Required.
    pub channel_id: u64,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            channel_id: 0,
        }
    }
}

/// Mount-facing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct FileSystemConfig {
    /// Drive letter the bridge mounts at.
    pub drive_letter: String,
    /// Content-cache budget in MiB.
    #[serde(rename = "CacheSizeMB")]
    pub cache_size_mb: u64,
}

impl Default for FileSystemConfig {
    fn default() -> Self {
        Self {
            drive_letter: "Z".to_string(),
            cache_size_mb: 256,
        }
    }
}

/// Encryption settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SecurityConfig {
    /// Whether file bodies are encrypted before upload.
    pub enable_encryption: bool,
    /// Base64 master key overriding the key file.
    pub master_key: Option<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enable_encryption: true,
            master_key: None,
        }
    }
}

/// Root configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct FsConfig {
    /// `Discord.*` keys.
    pub discord: DiscordConfig,
    /// `FileSystem.*` keys.
    pub file_system: FileSystemConfig,
    /// `Security.*` keys.
    pub security: SecurityConfig,
}

impl FsConfig {
    /// Loads a TOML or JSON config file, dispatching on the extension.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        match ext.to_lowercase().as_str() {
            "toml" => Ok(toml::from_str(&contents)?),
            "json" => Ok(serde_json::from_str(&contents)?),
            _ => anyhow::bail!("unsupported config file extension: {}", ext),
        }
    }

    /// Rejects configurations the engine cannot start with.
    pub fn validate(&self) -> MountResult<()> {
        if self.discord.bot_token.trim().is_empty() {
            return Err(MountError::Config {
                reason: "Discord.BotToken is required".to_string(),
            });
        }
        if self.discord.channel_id == 0 {
            return Err(MountError::Config {
                reason: "Discord.ChannelId is required".to_string(),
            });
        }
        if self.file_system.cache_size_mb == 0 {
            return Err(MountError::Config {
                reason: "FileSystem.CacheSizeMB must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Content-cache budget in bytes.
    pub fn cache_size_bytes(&self) -> u64 {
        self.file_system.cache_size_mb * 1024 * 1024
    }
}
