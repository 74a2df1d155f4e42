use std::collections::BTreeSet;

use crate::schema_tree::{CatalogNode, SchemaTree, TableNode};

const EXPANDED_GLYPH: &str = "▾";
const COLLAPSED_GLYPH: &str = "▸";
const NO_TABLES_LABEL: &str = "(no tables)";
const NO_COLUMNS_LABEL: &str = "(no columns)";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExpandKey {
    Catalog(String),
    Table { catalog: String, table: String },
}

impl ExpandKey {
    #[must_use]
    pub fn catalog(name: impl Into<String>) -> Self {
        Self::Catalog(name.into())
    }

    #[must_use]
    pub fn table(catalog: impl Into<String>, table: impl Into<String>) -> Self {
        Self::Table {
            catalog: catalog.into(),
            table: table.into(),
        }
    }
}

/// Which catalogs and tables currently reveal their children.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExpandState {
    expanded: BTreeSet<ExpandKey>,
}

impl ExpandState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_expanded(&self, key: &ExpandKey) -> bool {
        self.expanded.contains(key)
    }

    #[must_use]
    pub fn toggled(&self, key: ExpandKey) -> Self {
        let mut expanded = self.expanded.clone();
        if !expanded.remove(&key) {
            expanded.insert(key);
        }
        Self { expanded }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.expanded.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.expanded.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowKind {
    Catalog,
    Table,
    Column,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibleRow {
    pub id: String,
    pub label: String,
    pub depth: u8,
    pub kind: RowKind,
    pub catalog_name: String,
    pub table_name: Option<String>,
    pub placeholder: bool,
}

impl VisibleRow {
    /// The expand key this row flips, or `None` for columns and placeholders.
    #[must_use]
    pub fn toggle_key(&self) -> Option<ExpandKey> {
        if self.placeholder {
            return None;
        }
        match (self.kind, &self.table_name) {
            (RowKind::Catalog, _) => Some(ExpandKey::catalog(self.catalog_name.clone())),
            (RowKind::Table, Some(table)) => {
                Some(ExpandKey::table(self.catalog_name.clone(), table.clone()))
            }
            (RowKind::Table, None) | (RowKind::Column, _) => None,
        }
    }
}

#[must_use]
pub fn flatten(tree: &SchemaTree, expand: &ExpandState) -> Vec<VisibleRow> {
    let mut rows = Vec::new();
    for catalog in &tree.catalogs {
        push_catalog(&mut rows, catalog, expand);
    }
    rows
}

fn push_catalog(rows: &mut Vec<VisibleRow>, catalog: &CatalogNode, expand: &ExpandState) {
    let expanded = expand.is_expanded(&ExpandKey::catalog(catalog.name.clone()));
    rows.push(VisibleRow {
        id: format!("catalog:{}", catalog.name),
        label: format!("{} {}", glyph(expanded), catalog.name),
        depth: 0,
        kind: RowKind::Catalog,
        catalog_name: catalog.name.clone(),
        table_name: None,
        placeholder: false,
    });

    if !expanded {
        return;
    }

    if catalog.tables.is_empty() {
        rows.push(VisibleRow {
            id: format!("table:{}:(no-tables)", catalog.name),
            label: NO_TABLES_LABEL.to_string(),
            depth: 1,
            kind: RowKind::Table,
            catalog_name: catalog.name.clone(),
            table_name: None,
            placeholder: true,
        });
        return;
    }

    for table in &catalog.tables {
        push_table(rows, &catalog.name, table, expand);
    }
}

fn push_table(rows: &mut Vec<VisibleRow>, catalog: &str, table: &TableNode, expand: &ExpandState) {
    let path = format!("{catalog}.{}", table.name);
    let expanded = expand.is_expanded(&ExpandKey::table(catalog, table.name.clone()));
    rows.push(VisibleRow {
        id: format!("table:{path}"),
        label: format!("{} {}", glyph(expanded), table.name),
        depth: 1,
        kind: RowKind::Table,
        catalog_name: catalog.to_string(),
        table_name: Some(table.name.clone()),
        placeholder: false,
    });

    if !expanded {
        return;
    }

    if table.columns.is_empty() {
        rows.push(VisibleRow {
            id: format!("column:{path}:(no-columns)"),
            label: NO_COLUMNS_LABEL.to_string(),
            depth: 2,
            kind: RowKind::Column,
            catalog_name: catalog.to_string(),
            table_name: Some(table.name.clone()),
            placeholder: true,
        });
        return;
    }

    for column in &table.columns {
        rows.push(VisibleRow {
            id: format!("column:{path}.{}", column.name),
            label: format!("{}: {}", column.name, column.data_type),
            depth: 2,
            kind: RowKind::Column,
            catalog_name: catalog.to_string(),
            table_name: Some(table.name.clone()),
            placeholder: false,
        });
    }
}

fn glyph(expanded: bool) -> &'static str {
    if expanded {
        EXPANDED_GLYPH
    } else {
        COLLAPSED_GLYPH
    }
}

/// Resolves the row at `index` and returns the expand state after toggling it.
///
/// Columns, placeholders, and out-of-range indexes leave the state unchanged.
#[must_use]
pub fn toggle_at(rows: &[VisibleRow], index: usize, expand: &ExpandState) -> ExpandState {
    match rows.get(index).and_then(VisibleRow::toggle_key) {
        Some(key) => expand.toggled(key),
        None => expand.clone(),
    }
}
