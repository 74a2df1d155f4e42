use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnNode {
    pub name: String,
    pub data_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNode {
    pub name: String,
    pub columns: Vec<ColumnNode>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogNode {
    pub name: String,
    pub tables: Vec<TableNode>,
}

impl CatalogNode {
    #[must_use]
    pub fn table(&self, name: &str) -> Option<&TableNode> {
        self.tables.iter().find(|table| table.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SchemaTree {
    pub catalogs: Vec<CatalogNode>,
}

impl SchemaTree {
    #[must_use]
    pub fn catalog(&self, name: &str) -> Option<&CatalogNode> {
        self.catalogs.iter().find(|catalog| catalog.name == name)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.catalogs.is_empty()
    }

    /// Groups flat metadata rows into catalogs → tables → columns.
    ///
    /// Tables and columns may reference catalogs (or tables) missing from the
    /// earlier row sets; those parents are created on the fly.
    #[must_use]
    pub fn from_rows(rows: MetadataRows) -> Self {
        let mut grouped: BTreeMap<String, Vec<TableNode>> = BTreeMap::new();

        for catalog in rows.catalogs {
            grouped.entry(catalog).or_default();
        }

        for (catalog, table) in rows.tables {
            ensure_table(grouped.entry(catalog).or_default(), table);
        }

        for row in rows.columns {
            let tables = grouped.entry(row.catalog).or_default();
            let index = ensure_table(tables, row.table);
            tables[index].columns.push(ColumnNode {
                name: row.column,
                data_type: row.data_type,
            });
        }

        let catalogs = grouped
            .into_iter()
            .map(|(name, mut tables)| {
                tables.sort_by(|left, right| left.name.cmp(&right.name));
                CatalogNode { name, tables }
            })
            .collect();

        Self { catalogs }
    }
}

fn ensure_table(tables: &mut Vec<TableNode>, name: String) -> usize {
    if let Some(index) = tables.iter().position(|table| table.name == name) {
        return index;
    }
    tables.push(TableNode {
        name,
        columns: Vec::new(),
    });
    tables.len() - 1
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRow {
    pub catalog: String,
    pub table: String,
    pub column: String,
    pub data_type: String,
}

impl ColumnRow {
    #[must_use]
    pub fn new(
        catalog: impl Into<String>,
        table: impl Into<String>,
        column: impl Into<String>,
        data_type: impl Into<String>,
    ) -> Self {
        Self {
            catalog: catalog.into(),
            table: table.into(),
            column: column.into(),
            data_type: data_type.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MetadataRows {
    pub catalogs: Vec<String>,
    pub tables: Vec<(String, String)>,
    pub columns: Vec<ColumnRow>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTarget {
    pub connection_id: String,
    pub url: String,
}

impl LoadTarget {
    #[must_use]
    pub fn new(connection_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            connection_id: connection_id.into(),
            url: url.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct MetadataLoadError {
    message: String,
}

impl MetadataLoadError {
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

#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn fetch_catalogs(&self, target: &LoadTarget) -> Result<Vec<String>, MetadataLoadError>;

    async fn fetch_tables(
        &self,
        target: &LoadTarget,
    ) -> Result<Vec<(String, String)>, MetadataLoadError>;

    async fn fetch_columns(&self, target: &LoadTarget)
        -> Result<Vec<ColumnRow>, MetadataLoadError>;

    /// Releases cached connections. Called once when the app shuts down.
    async fn close(&self) {}
}

pub async fn fetch_schema<S>(source: &S, target: &LoadTarget) -> Result<SchemaTree, MetadataLoadError>
where
    S: MetadataSource + ?Sized,
{
    let (catalogs, tables, columns) = futures_util::try_join!(
        source.fetch_catalogs(target),
        source.fetch_tables(target),
        source.fetch_columns(target),
    )?;

    tracing::debug!(
        connection_id = %target.connection_id,
        catalogs = catalogs.len(),
        tables = tables.len(),
        columns = columns.len(),
        "fetched schema metadata"
    );

    Ok(SchemaTree::from_rows(MetadataRows {
        catalogs,
        tables,
        columns,
    }))
}
