use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Navigator error: {0}")]
    Navigator(#[from] NavigatorError),
}

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// History model errors surfaced to callers that address nodes explicitly.
///
/// Event handling (`visit`, tab events) never produces these; they only come
/// back from operations that take a node key or an import payload.
#[derive(Debug, Error)]
pub enum NavigatorError {
    #[error("Node not found: {node_id}")]
    NodeNotFound { node_id: String },

    #[error("Invalid import: {message}")]
    InvalidImport { message: String },

    #[error("No active node")]
    NoActiveNode,

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// MCP protocol errors
#[derive(Debug, Error)]
pub enum McpError {
    #[error("Unknown tool: {tool_name}")]
    UnknownTool { tool_name: String },

    #[error("Invalid parameters for {tool_name}: {message}")]
    InvalidParameters { tool_name: String, message: String },

    #[error("Tool execution failed: {message}")]
    ExecutionFailed { message: String },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<AppError> for McpError {
    fn from(err: AppError) -> Self {
        McpError::ExecutionFailed {
            message: err.to_string(),
        }
    }
}

impl From<NavigatorError> for McpError {
    fn from(err: NavigatorError) -> Self {
        McpError::ExecutionFailed {
            message: err.to_string(),
        }
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for history model operations
pub type NavigatorResult<T> = Result<T, NavigatorError>;

/// Result type alias for MCP operations
pub type McpResult<T> = Result<T, McpError>;
