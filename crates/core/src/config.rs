use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_GITHUB_CLIENT_ID: &str = "Ov23liUaGKjbJU8RGoM9";
const CONFIG_FILE_NAME: &str = "config.toml";
const CREDENTIALS_FILE_NAME: &str = "credentials.json";
const CONNECTIONS_FILE_NAME: &str = "connections.json";
const LOG_FILE_NAME: &str = "kozani.log";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CredentialSource {
    #[default]
    File,
    Keyring,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config directory is unavailable for this platform")]
    ConfigDirUnavailable,
    #[error("failed to read config file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Default, Deserialize)]
struct ConfigDocument {
    #[serde(default)]
    github_client_id: Option<String>,
    #[serde(default)]
    credential_source: CredentialSource,
    #[serde(default)]
    log_file: Option<PathBuf>,
    #[serde(default)]
    log_filter: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub config_dir: PathBuf,
    pub github_client_id: String,
    pub credential_source: CredentialSource,
    pub log_file: PathBuf,
    pub log_filter: Option<String>,
}

impl AppConfig {
    pub fn load_default() -> Result<Self, ConfigError> {
        Self::load_from_dir(default_config_dir()?)
    }

    pub fn load_from_dir(config_dir: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let config_dir = config_dir.into();
        let path = config_dir.join(CONFIG_FILE_NAME);
        let doc = read_document(&path)?;

        Ok(Self {
            github_client_id: doc
                .github_client_id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_GITHUB_CLIENT_ID.to_string()),
            credential_source: doc.credential_source,
            log_file: doc
                .log_file
                .unwrap_or_else(|| config_dir.join(LOG_FILE_NAME)),
            log_filter: doc.log_filter,
            config_dir,
        })
    }

    #[must_use]
    pub fn credentials_path(&self) -> PathBuf {
        self.config_dir.join(CREDENTIALS_FILE_NAME)
    }

    #[must_use]
    pub fn connections_path(&self) -> PathBuf {
        self.config_dir.join(CONNECTIONS_FILE_NAME)
    }
}

fn read_document(path: &Path) -> Result<ConfigDocument, ConfigError> {
    if !path.exists() {
        return Ok(ConfigDocument::default());
    }

    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    if raw.trim().is_empty() {
        return Ok(ConfigDocument::default());
    }

    toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn default_config_dir() -> Result<PathBuf, ConfigError> {
    if let Some(custom) = env::var_os("KOZANI_CONFIG_DIR") {
        return Ok(PathBuf::from(custom));
    }

    let base_dir = if cfg!(target_os = "windows") {
        env::var_os("APPDATA")
            .map(PathBuf::from)
            .ok_or(ConfigError::ConfigDirUnavailable)?
    } else if let Some(xdg_config_home) = env::var_os("XDG_CONFIG_HOME") {
        PathBuf::from(xdg_config_home)
    } else {
        let home = env::var_os("HOME").ok_or(ConfigError::ConfigDirUnavailable)?;
        PathBuf::from(home).join(".config")
    };

    Ok(base_dir.join("kozani"))
}
