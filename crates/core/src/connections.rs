use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub id: String,
    pub name: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionEndpoint {
    pub user: String,
    pub host: String,
}

impl Connection {
    #[must_use]
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            url: url.into(),
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn endpoint(&self) -> ConnectionEndpoint {
        let parsed = Url::parse(&self.url).ok();
        let user = parsed
            .as_ref()
            .map(Url::username)
            .filter(|user| !user.is_empty())
            .unwrap_or("unknown")
            .to_string();
        let host = parsed
            .as_ref()
            .and_then(Url::host_str)
            .filter(|host| !host.is_empty())
            .unwrap_or("unknown")
            .to_string();
        ConnectionEndpoint { user, host }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read connections file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse connections file at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to create config directory at {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize connections: {source}")]
    Serialize {
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write connections file at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub trait ConnectionStore: Send + Sync {
    fn list(&self) -> Result<Vec<Connection>, StoreError>;

    fn create(&self, name: &str, url: &str) -> Result<Connection, StoreError>;

    fn delete(&self, id: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ConnectionsDocument {
    #[serde(default)]
    connections: Vec<Connection>,
}

#[derive(Debug, Clone)]
pub struct FileConnectionStore {
    path: PathBuf,
}

impl FileConnectionStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<ConnectionsDocument, StoreError> {
        if !self.path.exists() {
            tracing::debug!(path = %self.path.display(), "no connections file found");
            return Ok(ConnectionsDocument::default());
        }

        let raw = fs::read_to_string(&self.path).map_err(|source| StoreError::Read {
            path: self.path.clone(),
            source,
        })?;
        if raw.trim().is_empty() {
            return Ok(ConnectionsDocument::default());
        }

        serde_json::from_str(&raw).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    fn write_document(&self, doc: &ConnectionsDocument) -> Result<(), StoreError> {
        if let Some(parent_dir) = self.path.parent() {
            create_private_dir(parent_dir).map_err(|source| StoreError::CreateDir {
                path: parent_dir.to_path_buf(),
                source,
            })?;
        }

        let rendered = serde_json::to_string_pretty(doc)
            .map_err(|source| StoreError::Serialize { source })?;
        write_private_file(&self.path, &rendered).map_err(|source| StoreError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

impl ConnectionStore for FileConnectionStore {
    fn list(&self) -> Result<Vec<Connection>, StoreError> {
        let doc = self.read_document()?;
        tracing::info!(count = doc.connections.len(), "loaded connections");
        Ok(doc.connections)
    }

    fn create(&self, name: &str, url: &str) -> Result<Connection, StoreError> {
        let mut doc = self.read_document()?;
        let connection = Connection::new(name, url);
        doc.connections.push(connection.clone());
        self.write_document(&doc)?;
        tracing::info!(id = %connection.id, name = %connection.name, "saved connection");
        Ok(connection)
    }

    fn delete(&self, id: &str) -> Result<(), StoreError> {
        let mut doc = self.read_document()?;
        doc.connections.retain(|connection| connection.id != id);
        self.write_document(&doc)?;
        tracing::info!(id, "deleted connection");
        Ok(())
    }
}

pub(crate) fn create_private_dir(path: &Path) -> std::io::Result<()> {
    fs::create_dir_all(path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o700))?;
    }
    Ok(())
}

pub(crate) fn write_private_file(path: &Path, contents: &str) -> std::io::Result<()> {
    fs::write(path, contents)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}
