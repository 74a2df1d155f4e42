use std::sync::Arc;

use crate::connections::Connection;
use crate::cursor::Cursor;
use crate::schema_tree::{LoadTarget, SchemaTree};
use crate::tree_view::{flatten, toggle_at, ExpandState, VisibleRow};

/// State owned by one open schema browser. Dropped when the browser closes.
#[derive(Debug, Clone)]
pub struct SchemaBrowserSession {
    connection: Connection,
    tree: Option<Arc<SchemaTree>>,
    expand: ExpandState,
    cursor: Cursor,
    rows: Vec<VisibleRow>,
}

impl SchemaBrowserSession {
    #[must_use]
    pub fn new(connection: Connection) -> Self {
        Self {
            connection,
            tree: None,
            expand: ExpandState::new(),
            cursor: Cursor::new(),
            rows: Vec::new(),
        }
    }

    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    #[must_use]
    pub fn load_target(&self) -> LoadTarget {
        LoadTarget::new(self.connection.id.clone(), self.connection.url.clone())
    }

    #[must_use]
    pub fn tree(&self) -> Option<&SchemaTree> {
        self.tree.as_deref()
    }

    #[must_use]
    pub fn expand_state(&self) -> &ExpandState {
        &self.expand
    }

    #[must_use]
    pub fn rows(&self) -> &[VisibleRow] {
        &self.rows
    }

    #[must_use]
    pub fn selected_index(&self) -> usize {
        self.cursor.index()
    }

    #[must_use]
    pub fn selected_row(&self) -> Option<&VisibleRow> {
        self.rows.get(self.cursor.index())
    }

    pub fn set_tree(&mut self, tree: Option<Arc<SchemaTree>>) {
        self.tree = tree;
        self.refresh_rows();
    }

    pub fn move_by(&mut self, delta: isize) {
        self.cursor.move_by(delta, self.rows.len());
    }

    pub fn move_to_first(&mut self) {
        self.cursor.move_to_first();
    }

    pub fn move_to_last(&mut self) {
        self.cursor.move_to_last(self.rows.len());
    }

    /// Flips the node under the cursor. The cursor keeps its numeric position.
    pub fn toggle_selected(&mut self) -> bool {
        let next = toggle_at(&self.rows, self.cursor.index(), &self.expand);
        if next == self.expand {
            return false;
        }
        self.expand = next;
        self.refresh_rows();
        true
    }

    fn refresh_rows(&mut self) {
        self.rows = match &self.tree {
            Some(tree) => flatten(tree, &self.expand),
            None => Vec::new(),
        };
        self.cursor.clamp_to(self.rows.len());
    }
}
