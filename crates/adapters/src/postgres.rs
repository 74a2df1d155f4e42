use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use kozani_core::schema_tree::{ColumnRow, LoadTarget, MetadataLoadError, MetadataSource};
use tokio::sync::Mutex;
use tokio_postgres::{Client, NoTls, Row};

use crate::metadata::BASE_TABLE;

pub const SYSTEM_SCHEMAS: [&str; 2] = ["information_schema", "pg_catalog"];
const SYSTEM_SCHEMA_PREFIXES: [&str; 2] = ["pg_toast", "pg_temp"];

/// Reads catalogs, tables, and columns from `information_schema`.
///
/// One client per connection URL is cached and replaced once it closes.
#[derive(Default)]
pub struct PostgresMetadataSource {
    clients: Mutex<HashMap<String, Arc<Client>>>,
}

impl PostgresMetadataSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn client(&self, target: &LoadTarget) -> Result<Arc<Client>, MetadataLoadError> {
        let mut clients = self.clients.lock().await;
        if let Some(client) = clients.get(&target.url).filter(|client| !client.is_closed()) {
            return Ok(Arc::clone(client));
        }

        tracing::debug!(connection_id = %target.connection_id, "connecting to postgres");
        let (client, connection) = tokio_postgres::connect(&target.url, NoTls)
            .await
            .map_err(to_metadata_error)?;
        let connection_id = target.connection_id.clone();
        tokio::spawn(async move {
            if let Err(error) = connection.await {
                tracing::warn!(%connection_id, %error, "postgres connection closed");
            }
        });

        let client = Arc::new(client);
        clients.insert(target.url.clone(), Arc::clone(&client));
        Ok(client)
    }

    async fn query(&self, target: &LoadTarget, sql: &str) -> Result<Vec<Row>, MetadataLoadError> {
        let client = self.client(target).await?;
        client.query(sql, &[]).await.map_err(to_metadata_error)
    }
}

#[async_trait]
impl MetadataSource for PostgresMetadataSource {
    async fn fetch_catalogs(&self, target: &LoadTarget) -> Result<Vec<String>, MetadataLoadError> {
        let sql = format!(
            "SELECT schema_name::text FROM information_schema.schemata \
             WHERE {} ORDER BY schema_name",
            exclusion_clause("schema_name")
        );
        self.query(target, &sql)
            .await?
            .iter()
            .map(|row| text(row, 0))
            .collect()
    }

    async fn fetch_tables(
        &self,
        target: &LoadTarget,
    ) -> Result<Vec<(String, String)>, MetadataLoadError> {
        let sql = format!(
            "SELECT table_schema::text, table_name::text FROM information_schema.tables \
             WHERE {} AND table_type = '{BASE_TABLE}' ORDER BY table_schema, table_name",
            exclusion_clause("table_schema")
        );
        self.query(target, &sql)
            .await?
            .iter()
            .map(|row| Ok((text(row, 0)?, text(row, 1)?)))
            .collect()
    }

    async fn fetch_columns(&self, target: &LoadTarget) -> Result<Vec<ColumnRow>, MetadataLoadError> {
        let sql = format!(
            "SELECT c.table_schema::text, c.table_name::text, c.column_name::text, \
             c.data_type::text \
             FROM information_schema.columns c \
             JOIN information_schema.tables t \
               ON t.table_schema = c.table_schema AND t.table_name = c.table_name \
             WHERE {} AND t.table_type = '{BASE_TABLE}' \
             ORDER BY c.table_schema, c.table_name, c.ordinal_position",
            exclusion_clause("c.table_schema")
        );
        self.query(target, &sql)
            .await?
            .iter()
            .map(|row| {
                Ok(ColumnRow::new(
                    text(row, 0)?,
                    text(row, 1)?,
                    text(row, 2)?,
                    text(row, 3)?,
                ))
            })
            .collect()
    }

    async fn close(&self) {
        self.clients.lock().await.clear();
    }
}

fn exclusion_clause(column: &str) -> String {
    let quoted = SYSTEM_SCHEMAS
        .iter()
        .map(|schema| format!("'{schema}'"))
        .collect::<Vec<_>>()
        .join(", ");
    let prefixes = SYSTEM_SCHEMA_PREFIXES
        .iter()
        .map(|prefix| format!(" AND {column} NOT LIKE '{prefix}%'"))
        .collect::<String>();
    format!("{column} NOT IN ({quoted}){prefixes}")
}

fn text(row: &Row, index: usize) -> Result<String, MetadataLoadError> {
    row.try_get(index).map_err(to_metadata_error)
}

fn to_metadata_error(error: tokio_postgres::Error) -> MetadataLoadError {
    MetadataLoadError::new(error.to_string())
}
