use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

use crate::connections::{create_private_dir, write_private_file};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct AuthError {
    message: String,
}

impl AuthError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceFlowEvent {
    AwaitingVerification { code: String, url: String },
    Success { token: String },
    Failure { error: AuthError },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub login: String,
    pub name: Option<String>,
}

impl UserIdentity {
    #[must_use]
    pub fn display(&self) -> String {
        match &self.name {
            Some(name) => format!("@{} ({name})", self.login),
            None => format!("@{}", self.login),
        }
    }
}

/// Device-authorization login against the identity provider.
///
/// `run` reports progress on `events` and must finish with exactly one
/// `Success` or `Failure`.
#[async_trait]
pub trait DeviceFlow: Send + Sync {
    async fn run(&self, events: UnboundedSender<DeviceFlowEvent>);

    async fn fetch_user(&self, token: &str) -> Result<UserIdentity, AuthError>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub token: String,
    pub token_type: String,
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("failed to read credentials at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse credentials at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize credentials: {source}")]
    Serialize {
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write credentials at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("credential backend failed: {0}")]
    Backend(String),
}

pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Result<Option<Credentials>, CredentialError>;

    fn save(&self, credentials: &Credentials) -> Result<(), CredentialError>;

    fn clear(&self) -> Result<(), CredentialError>;

    fn is_authenticated(&self) -> bool {
        match self.load() {
            Ok(credentials) => credentials.is_some(),
            Err(error) => {
                tracing::warn!(%error, "treating unreadable credentials as logged out");
                false
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<Credentials>, CredentialError> {
        if !self.path.exists() {
            tracing::debug!("no stored credentials found");
            return Ok(None);
        }

        let raw = fs::read_to_string(&self.path).map_err(|source| CredentialError::Read {
            path: self.path.clone(),
            source,
        })?;
        let credentials =
            serde_json::from_str(&raw).map_err(|source| CredentialError::Parse {
                path: self.path.clone(),
                source,
            })?;
        tracing::info!("found stored credentials");
        Ok(Some(credentials))
    }

    fn save(&self, credentials: &Credentials) -> Result<(), CredentialError> {
        if let Some(parent_dir) = self.path.parent() {
            create_private_dir(parent_dir).map_err(|source| CredentialError::Write {
                path: parent_dir.to_path_buf(),
                source,
            })?;
        }

        let rendered = serde_json::to_string_pretty(credentials)
            .map_err(|source| CredentialError::Serialize { source })?;
        write_private_file(&self.path, &rendered).map_err(|source| CredentialError::Write {
            path: self.path.clone(),
            source,
        })
    }

    fn clear(&self) -> Result<(), CredentialError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CredentialError::Write {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::{CredentialStore, Credentials, FileCredentialStore, UserIdentity};

    fn sample_credentials() -> Credentials {
        Credentials {
            token: "gho_example".to_string(),
            token_type: "bearer".to_string(),
        }
    }

    #[test]
    fn save_load_and_clear_credentials() {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let store = FileCredentialStore::new(temp_dir.path().join("kozani/credentials.json"));
        assert!(!store.is_authenticated());

        store
            .save(&sample_credentials())
            .expect("failed to save credentials");
        assert!(store.is_authenticated());
        assert_eq!(
            store.load().expect("failed to load credentials"),
            Some(sample_credentials())
        );

        store.clear().expect("failed to clear credentials");
        assert!(!store.is_authenticated());
        store.clear().expect("clearing twice should stay ok");
    }

    #[test]
    fn unreadable_credentials_count_as_logged_out() {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let path = temp_dir.path().join("credentials.json");
        std::fs::write(&path, "garbage").expect("failed to write fixture");

        let store = FileCredentialStore::new(path);
        assert!(store.load().is_err());
        assert!(!store.is_authenticated());
    }

    #[test]
    fn identity_display_includes_optional_name() {
        let with_name = UserIdentity {
            login: "octocat".to_string(),
            name: Some("The Octocat".to_string()),
        };
        assert_eq!(with_name.display(), "@octocat (The Octocat)");

        let bare = UserIdentity {
            login: "octocat".to_string(),
            name: None,
        };
        assert_eq!(bare.display(), "@octocat");
    }
}
