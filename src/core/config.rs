use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub client: ClientConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    /// How long one feedback interaction may take before the broker gives up.
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Overrides the `http://localhost:<port>` base URL derived from the
    /// server port.
    pub endpoint: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                port: default_server_port(),
                request_timeout_secs: 3600,
            },
            client: ClientConfig::default(),
        }
    }
}

/// Get the default server port based on build type
pub fn default_server_port() -> u16 {
    if cfg!(debug_assertions) { 18000 } else { 8000 }
}

impl Config {
    pub fn load() -> Result<Self> {
        if let Some(config_dir) = directories::ProjectDirs::from("com", "askuser", "askuser") {
            let config_file = config_dir.config_dir().join("config.toml");
            if config_file.exists() {
                let content = std::fs::read_to_string(&config_file)?;
                return Ok(toml::from_str(&content)?);
            }
        }
        Ok(Config::default())
    }

    pub fn save(&self) -> Result<()> {
        if let Some(config_dir) = directories::ProjectDirs::from("com", "askuser", "askuser") {
            std::fs::create_dir_all(config_dir.config_dir())?;
            let config_file = config_dir.config_dir().join("config.toml");
            let content = toml::to_string_pretty(self)?;
            std::fs::write(config_file, content)?;
        }
        Ok(())
    }
}
