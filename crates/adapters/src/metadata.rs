use async_trait::async_trait;
use kozani_core::schema_tree::{ColumnRow, LoadTarget, MetadataLoadError, MetadataSource};
use url::Url;

use crate::mysql::MysqlMetadataSource;
use crate::postgres::PostgresMetadataSource;

/// `information_schema` table type for ordinary tables; views are skipped.
pub(crate) const BASE_TABLE: &str = "BASE TABLE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseKind {
    Postgres,
    Mysql,
}

impl DatabaseKind {
    pub fn from_url(raw: &str) -> Result<Self, MetadataLoadError> {
        let url = Url::parse(raw)
            .map_err(|error| MetadataLoadError::new(format!("invalid connection URL: {error}")))?;
        match url.scheme() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "mysql" | "mariadb" => Ok(Self::Mysql),
            other => Err(MetadataLoadError::new(format!(
                "unsupported database scheme `{other}`"
            ))),
        }
    }
}

/// Picks the backend for a connection from its URL scheme.
#[derive(Default)]
pub struct SqlMetadataSource {
    postgres: PostgresMetadataSource,
    mysql: MysqlMetadataSource,
}

impl SqlMetadataSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn backend(&self, target: &LoadTarget) -> Result<&dyn MetadataSource, MetadataLoadError> {
        let backend: &dyn MetadataSource = match DatabaseKind::from_url(&target.url)? {
            DatabaseKind::Postgres => &self.postgres,
            DatabaseKind::Mysql => &self.mysql,
        };
        Ok(backend)
    }
}

#[async_trait]
impl MetadataSource for SqlMetadataSource {
    async fn fetch_catalogs(&self, target: &LoadTarget) -> Result<Vec<String>, MetadataLoadError> {
        self.backend(target)?.fetch_catalogs(target).await
    }

    async fn fetch_tables(
        &self,
        target: &LoadTarget,
    ) -> Result<Vec<(String, String)>, MetadataLoadError> {
        self.backend(target)?.fetch_tables(target).await
    }

    async fn fetch_columns(&self, target: &LoadTarget) -> Result<Vec<ColumnRow>, MetadataLoadError> {
        self.backend(target)?.fetch_columns(target).await
    }

    async fn close(&self) {
        tokio::join!(self.postgres.close(), self.mysql.close());
    }
}
