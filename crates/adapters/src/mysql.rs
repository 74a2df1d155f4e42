use std::collections::HashMap;

use async_trait::async_trait;
use kozani_core::schema_tree::{ColumnRow, LoadTarget, MetadataLoadError, MetadataSource};
use mysql_async::prelude::Queryable;
use mysql_async::{Conn, Opts, Pool};
use tokio::sync::Mutex;

use crate::metadata::BASE_TABLE;

pub const SYSTEM_SCHEMAS: [&str; 4] = ["information_schema", "mysql", "performance_schema", "sys"];

/// Reads catalogs, tables, and columns from `information_schema`.
///
/// One pool is kept per connection URL so repeated loads reuse sockets.
#[derive(Debug, Default)]
pub struct MysqlMetadataSource {
    pools: Mutex<HashMap<String, Pool>>,
}

impl MysqlMetadataSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn conn(&self, target: &LoadTarget) -> Result<Conn, MetadataLoadError> {
        let pool = {
            let mut pools = self.pools.lock().await;
            match pools.get(&target.url) {
                Some(pool) => pool.clone(),
                None => {
                    let opts = Opts::from_url(&mysql_url(&target.url)).map_err(|error| {
                        MetadataLoadError::new(format!("invalid MySQL URL: {error}"))
                    })?;
                    tracing::debug!(connection_id = %target.connection_id, "opening mysql pool");
                    let pool = Pool::new(opts);
                    pools.insert(target.url.clone(), pool.clone());
                    pool
                }
            }
        };
        pool.get_conn().await.map_err(to_metadata_error)
    }

    pub async fn disconnect_all(&self) {
        let pools = std::mem::take(&mut *self.pools.lock().await);
        for (_, pool) in pools {
            if let Err(error) = pool.disconnect().await {
                tracing::warn!(%error, "failed to close mysql pool");
            }
        }
    }
}

#[async_trait]
impl MetadataSource for MysqlMetadataSource {
    async fn fetch_catalogs(&self, target: &LoadTarget) -> Result<Vec<String>, MetadataLoadError> {
        let mut conn = self.conn(target).await?;
        conn.query_map(
            format!(
                "SELECT SCHEMA_NAME FROM information_schema.SCHEMATA \
                 WHERE {} ORDER BY SCHEMA_NAME",
                exclusion_clause("SCHEMA_NAME")
            ),
            |schema: String| schema,
        )
        .await
        .map_err(to_metadata_error)
    }

    async fn fetch_tables(
        &self,
        target: &LoadTarget,
    ) -> Result<Vec<(String, String)>, MetadataLoadError> {
        let mut conn = self.conn(target).await?;
        conn.query_map(
            format!(
                "SELECT TABLE_SCHEMA, TABLE_NAME FROM information_schema.TABLES \
                 WHERE {} AND TABLE_TYPE = '{BASE_TABLE}' \
                 ORDER BY TABLE_SCHEMA, TABLE_NAME",
                exclusion_clause("TABLE_SCHEMA")
            ),
            |(schema, table): (String, String)| (schema, table),
        )
        .await
        .map_err(to_metadata_error)
    }

    async fn fetch_columns(&self, target: &LoadTarget) -> Result<Vec<ColumnRow>, MetadataLoadError> {
        let mut conn = self.conn(target).await?;
        conn.query_map(
            format!(
                "SELECT c.TABLE_SCHEMA, c.TABLE_NAME, c.COLUMN_NAME, c.COLUMN_TYPE \
                 FROM information_schema.COLUMNS c \
                 JOIN information_schema.TABLES t \
                   ON t.TABLE_SCHEMA = c.TABLE_SCHEMA AND t.TABLE_NAME = c.TABLE_NAME \
                 WHERE {} AND t.TABLE_TYPE = '{BASE_TABLE}' \
                 ORDER BY c.TABLE_SCHEMA, c.TABLE_NAME, c.ORDINAL_POSITION",
                exclusion_clause("c.TABLE_SCHEMA")
            ),
            |(schema, table, column, data_type): (String, String, String, String)| {
                ColumnRow::new(schema, table, column, data_type)
            },
        )
        .await
        .map_err(to_metadata_error)
    }

    async fn close(&self) {
        self.disconnect_all().await;
    }
}

/// `mysql_async` only parses `mysql://`; MariaDB speaks the same protocol.
fn mysql_url(raw: &str) -> String {
    match raw.strip_prefix("mariadb://") {
        Some(rest) => format!("mysql://{rest}"),
        None => raw.to_string(),
    }
}

fn exclusion_clause(column: &str) -> String {
    let quoted = SYSTEM_SCHEMAS
        .iter()
        .map(|schema| format!("'{schema}'"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{column} NOT IN ({quoted})")
}

fn to_metadata_error(error: mysql_async::Error) -> MetadataLoadError {
    MetadataLoadError::new(error.to_string())
}
