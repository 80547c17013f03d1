pub mod api;
pub mod config;
pub mod db;
pub mod feedback;
pub mod models;
pub mod names;
pub mod visitors;

// Re-export important types
pub use api::{start_api_server, AppState};
pub use config::Settings;
pub use db::Database;
pub use visitors::{InMemoryVisitorStore, VisitorStore};
