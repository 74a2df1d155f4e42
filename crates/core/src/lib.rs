pub mod auth;
pub mod browser;
pub mod config;
pub mod connections;
pub mod cursor;
pub mod diagnostics;
pub mod forms;
pub mod keymap;
pub mod navigation;
pub mod schema_loader;
pub mod schema_tree;
pub mod tree_view;

pub use navigation::{App, AppEvent, Effect, Screen, SessionEpoch, Snapshot};
