use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::platform;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub icons: IconsConfig,
    #[serde(default)]
    pub ports: PortsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Where tiles and icons live on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// JSON file holding the tile list.
    #[serde(default = "default_data_file")]
    pub data_file: PathBuf,
    /// Directory served under `/static`; icons are kept in its `icons/` child.
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IconsConfig {
    /// Timeout applied to every single icon fetch.
    #[serde(default = "default_icon_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Favicon-by-domain services, tried in order. `{domain}` is substituted.
    #[serde(default = "default_providers")]
    pub providers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortsConfig {
    /// Upper bound for the netstat fallback command.
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
}

impl PathsConfig {
    pub fn icon_dir(&self) -> PathBuf {
        self.static_dir.join("icons")
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_file: default_data_file(),
            static_dir: default_static_dir(),
        }
    }
}

impl Default for IconsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_icon_timeout_secs(),
            user_agent: default_user_agent(),
            providers: default_providers(),
        }
    }
}

impl Default for PortsConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: default_command_timeout_secs(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    4000
}

fn default_data_file() -> PathBuf {
    platform::data_dir().join("tiles.json")
}

fn default_static_dir() -> PathBuf {
    platform::data_dir().join("static")
}

fn default_icon_timeout_secs() -> u64 {
    6
}

fn default_user_agent() -> String {
    "Mozilla/5.0".to_string()
}

fn default_providers() -> Vec<String> {
    vec![
        "https://www.google.com/s2/favicons?domain={domain}&sz=128".to_string(),
        "https://icons.duckduckgo.com/ip3/{domain}.ico".to_string(),
    ]
}

fn default_command_timeout_secs() -> u64 {
    5
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}
