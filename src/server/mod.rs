//! Server module for MCP protocol handling.
//!
//! This module provides:
//! - MCP server implementation over stdio
//! - Tool call handlers and routing
//! - Shared application state management

mod handlers;
mod mcp;

pub use handlers::*;
pub use mcp::*;

use std::sync::Arc;

use crate::config::Config;
use crate::navigator::Navigator;

/// Application state shared across handlers.
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// History service.
    pub navigator: Navigator,
}

impl AppState {
    /// Create new application state
    pub fn new(config: Config, navigator: Navigator) -> Self {
        tracing::info!(
            persistent = navigator.is_persistent(),
            session_timeout_secs = config.navigator.session_timeout.as_secs(),
            navigation_timeout_ms = config.navigator.navigation_timeout.as_millis() as u64,
            "Application state initialized"
        );
        Self { config, navigator }
    }
}

/// Thread-safe shared application state
pub type SharedState = Arc<AppState>;
