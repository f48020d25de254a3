//! # Research Navigator
//!
//! Records how a researcher moves through a reference library and turns the
//! stream of selections into a browsable history tree, served to a host
//! over JSON-RPC on stdio.
//!
//! ## Features
//!
//! - **Sessions**: selections are grouped into sessions split by inactivity
//! - **Trails**: quick successive selections form parent/child chains
//! - **Relations**: each step is labelled (same author, shared tag, ...)
//! - **Navigation**: back/forward/parent independent of the tree shape
//! - **Tabs**: reader tabs are tracked, closed tabs stay reachable
//! - **Discovery**: search, recommendations and statistics over the history
//! - **Persistence**: write-through SQLite storage with export/import
//!
//! ## Architecture
//!
//! ```text
//! Host events → MCP Server (stdio) → Navigator → HistoryTree
//!                                        ↓
//!                                  SQLite (history)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use research_navigator::{Config, AppState, McpServer, Navigator};
//! use research_navigator::storage::SqliteStorage;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let storage = SqliteStorage::new(&config.database).await?;
//!     let navigator = Navigator::with_storage(config.navigator.clone(), Arc::new(storage));
//!     navigator.restore(chrono::Utc::now()).await?;
//!     let state = Arc::new(AppState::new(config, navigator));
//!     McpServer::new(state).run().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

/// Command-line maintenance commands.
pub mod cli;
/// Configuration management.
pub mod config;
/// Error types and result aliases for the application.
pub mod error;
/// In-memory history model: sessions, tree, navigation and indexes.
pub mod history;
/// History service tying the model to storage.
pub mod navigator;
/// MCP server implementation and request handling.
pub mod server;
/// SQLite storage layer for persistence.
pub mod storage;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use navigator::Navigator;
pub use server::{AppState, McpServer, SharedState};
