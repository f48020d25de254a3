use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// History model tuning.
    pub navigator: NavigatorConfig,
    /// Database settings.
    pub database: DatabaseConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// History model tuning.
///
/// The session and navigation windows are tuning values, not protocol
/// constants; both can be overridden from the environment.
#[derive(Debug, Clone)]
pub struct NavigatorConfig {
    /// Inactivity after which the next visit starts a new session.
    pub session_timeout: Duration,
    /// Maximum gap between two visits for the second to become a child of the first.
    pub navigation_timeout: Duration,
    /// Maximum entries kept on the back/forward stack.
    pub history_limit: usize,
    /// Maximum entries kept in the recently-closed tab list.
    pub closed_tabs_limit: usize,
    /// Maximum nodes loaded from storage on startup.
    pub restore_limit: usize,
    /// Whether visits are written through to the database.
    pub persist: bool,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    pub path: PathBuf,
    /// Maximum number of pooled connections.
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug").
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    /// Human-readable output.
    Pretty,
    /// One JSON object per line.
    Json,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let defaults = NavigatorConfig::default();
        let navigator = NavigatorConfig {
            session_timeout: Duration::from_secs(parse_var(
                "NAVIGATOR_SESSION_TIMEOUT_SECS",
                defaults.session_timeout.as_secs(),
            )),
            navigation_timeout: Duration::from_millis(parse_var(
                "NAVIGATOR_NAVIGATION_TIMEOUT_MS",
                defaults.navigation_timeout.as_millis() as u64,
            )),
            history_limit: parse_var("NAVIGATOR_HISTORY_LIMIT", defaults.history_limit),
            closed_tabs_limit: parse_var("NAVIGATOR_CLOSED_TABS_LIMIT", defaults.closed_tabs_limit),
            restore_limit: parse_var("NAVIGATOR_RESTORE_LIMIT", defaults.restore_limit),
            persist: env::var("NAVIGATOR_PERSIST")
                .map(|v| v.to_lowercase() != "false")
                .unwrap_or(defaults.persist),
        };
        navigator.validate()?;

        let database = DatabaseConfig {
            path: PathBuf::from(
                env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/navigator.db".to_string()),
            ),
            max_connections: parse_var("DATABASE_MAX_CONNECTIONS", 5),
        };
        if database.max_connections == 0 {
            return Err(AppError::Config {
                message: "DATABASE_MAX_CONNECTIONS must be at least 1".to_string(),
            });
        }

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        Ok(Config {
            navigator,
            database,
            logging,
        })
    }
}

impl NavigatorConfig {
    /// Reject settings under which the tree builder cannot behave sensibly.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.session_timeout.is_zero() {
            return Err(AppError::Config {
                message: "NAVIGATOR_SESSION_TIMEOUT_SECS must be greater than zero".to_string(),
            });
        }
        if self.navigation_timeout.is_zero() {
            return Err(AppError::Config {
                message: "NAVIGATOR_NAVIGATION_TIMEOUT_MS must be greater than zero".to_string(),
            });
        }
        if self.navigation_timeout >= self.session_timeout {
            return Err(AppError::Config {
                message: "navigation timeout must be shorter than the session timeout".to_string(),
            });
        }
        if self.history_limit == 0 {
            return Err(AppError::Config {
                message: "NAVIGATOR_HISTORY_LIMIT must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for NavigatorConfig {
    fn default() -> Self {
        Self {
            session_timeout: Duration::from_secs(30 * 60),
            navigation_timeout: Duration::from_millis(5000),
            history_limit: 100,
            closed_tabs_limit: 100,
            restore_limit: 1000,
            persist: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            navigator: NavigatorConfig::default(),
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/navigator.db"),
            max_connections: 5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_navigator_defaults() {
        let config = NavigatorConfig::default();
        assert_eq!(config.session_timeout, Duration::from_secs(1800));
        assert_eq!(config.navigation_timeout, Duration::from_secs(5));
        assert_eq!(config.history_limit, 100);
        assert!(config.persist);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_session_timeout() {
        let config = NavigatorConfig {
            session_timeout: Duration::ZERO,
            ..NavigatorConfig::default()
        };
        assert!(matches!(config.validate(), Err(AppError::Config { .. })));
    }

    #[test]
    fn test_validate_rejects_navigation_longer_than_session() {
        let config = NavigatorConfig {
            session_timeout: Duration::from_secs(10),
            navigation_timeout: Duration::from_secs(20),
            ..NavigatorConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("shorter than the session timeout"));
    }

    #[test]
    fn test_validate_rejects_empty_history() {
        let config = NavigatorConfig {
            history_limit: 0,
            ..NavigatorConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
