//! Command-line maintenance commands.
//!
//! Everything except `serve` runs once against the restored history and
//! exits. Output goes to stdout; logs stay on stderr.

use std::path::{Path, PathBuf};

use clap::Subcommand;

use crate::history::HistoryStats;
use crate::navigator::Navigator;

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the JSON-RPC server on stdio (default)
    Serve,

    /// Write the whole history as a JSON document
    Export {
        /// Output file (stdout when omitted)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Merge a previously exported JSON document
    Import {
        /// Document to read
        input: PathBuf,
    },

    /// Show history statistics
    Stats {
        /// Number of most visited items to list
        #[arg(long, default_value = "10")]
        top: usize,
    },

    /// Delete all history
    Clear,
}

/// Result of CLI command execution.
pub struct CliResult {
    /// Exit code (0 = success)
    pub exit_code: i32,
    /// Output message
    pub message: String,
}

impl CliResult {
    /// Create a success result with the given message.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            message: message.into(),
        }
    }

    /// Create an error result with the given message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            exit_code: 1,
            message: message.into(),
        }
    }
}

/// Execute a one-shot command. `Serve` is handled by the binary and is a no-op here.
pub async fn execute_command(command: Commands, navigator: &Navigator) -> CliResult {
    match command {
        Commands::Serve => CliResult::success(""),
        Commands::Export { output } => execute_export(navigator, output.as_deref()).await,
        Commands::Import { input } => execute_import(navigator, &input).await,
        Commands::Stats { top } => execute_stats(navigator, top).await,
        Commands::Clear => {
            navigator.clear().await;
            CliResult::success("History cleared")
        }
    }
}

async fn execute_export(navigator: &Navigator, output: Option<&Path>) -> CliResult {
    let document = match navigator.export().await {
        Ok(d) => d,
        Err(e) => return CliResult::error(format!("Export failed: {}", e)),
    };

    match output {
        None => CliResult::success(document),
        Some(path) => match tokio::fs::write(path, document).await {
            Ok(()) => CliResult::success(format!("History exported to {}", path.display())),
            Err(e) => CliResult::error(format!("Failed to write {}: {}", path.display(), e)),
        },
    }
}

async fn execute_import(navigator: &Navigator, input: &Path) -> CliResult {
    let data = match tokio::fs::read_to_string(input).await {
        Ok(d) => d,
        Err(e) => return CliResult::error(format!("Failed to read {}: {}", input.display(), e)),
    };

    match navigator.import(&data).await {
        Ok(added) => CliResult::success(format!("Imported {} nodes", added)),
        Err(e) => CliResult::error(format!("Import failed: {}", e)),
    }
}

async fn execute_stats(navigator: &Navigator, top: usize) -> CliResult {
    CliResult::success(format_stats(&navigator.stats(top).await))
}

fn format_stats(stats: &HistoryStats) -> String {
    let mut output = String::new();

    output.push_str("\nResearch History\n");
    output.push_str("═══════════════════════════════════════════════════════════════════════════════\n\n");

    output.push_str(&format!("Sessions:       {}\n", stats.total_sessions));
    output.push_str(&format!("Nodes:          {}\n", stats.total_nodes));
    output.push_str(&format!("Visits:         {}\n", stats.total_visits));
    output.push_str(&format!("Unique items:   {}\n", stats.unique_items));
    output.push_str(&format!("Annotated:      {}\n", stats.annotated_nodes));
    output.push_str(&format!("Deepest chain:  {}\n", stats.max_depth));

    if !stats.relations.is_empty() {
        output.push_str("\nRelations\n");
        for (relation, count) in &stats.relations {
            output.push_str(&format!("  {:<16} {}\n", relation.label(), count));
        }
    }

    if !stats.top_items.is_empty() {
        output.push_str("\nMost visited\n");
        for item in &stats.top_items {
            let title = if item.title.is_empty() {
                format!("item {}", item.item_id)
            } else {
                truncate(&item.title, 60)
            };
            output.push_str(&format!("  {:>4}  {}\n", item.visits, title));
        }
    }

    if !stats.tags.is_empty() {
        output.push_str("\nTags\n");
        for tag in &stats.tags {
            output.push_str(&format!("  {:>4}  {}\n", tag.count, tag.tag));
        }
    }

    output
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NavigatorConfig;
    use crate::history::ItemDescriptor;
    use chrono::Utc;

    #[test]
    fn test_cli_result_success() {
        let result = CliResult::success("test message");
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.message, "test message");
    }

    #[test]
    fn test_cli_result_error() {
        let result = CliResult::error("error message");
        assert_eq!(result.exit_code, 1);
        assert_eq!(result.message, "error message");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghij", 5), "abcd…");
    }

    #[tokio::test]
    async fn test_stats_output() {
        let navigator = Navigator::new(NavigatorConfig::default());
        navigator
            .item_selected(&ItemDescriptor::new(1, "On Computable Numbers"), Utc::now())
            .await;

        let result = execute_command(Commands::Stats { top: 5 }, &navigator).await;
        assert_eq!(result.exit_code, 0);
        assert!(result.message.contains("Nodes:          1"));
        assert!(result.message.contains("On Computable Numbers"));
    }

    #[tokio::test]
    async fn test_export_import_through_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");

        let source = Navigator::new(NavigatorConfig::default());
        source
            .item_selected(&ItemDescriptor::new(7, "Exported"), Utc::now())
            .await;
        let result = execute_command(
            Commands::Export {
                output: Some(path.clone()),
            },
            &source,
        )
        .await;
        assert_eq!(result.exit_code, 0, "{}", result.message);

        let target = Navigator::new(NavigatorConfig::default());
        let result = execute_command(Commands::Import { input: path }, &target).await;
        assert_eq!(result.message, "Imported 1 nodes");
        assert_eq!(target.stats(1).await.total_nodes, 1);
    }

    #[tokio::test]
    async fn test_import_missing_file() {
        let navigator = Navigator::new(NavigatorConfig::default());
        let result = execute_command(
            Commands::Import {
                input: PathBuf::from("/nonexistent/history.json"),
            },
            &navigator,
        )
        .await;
        assert_eq!(result.exit_code, 1);
        assert!(result.message.starts_with("Failed to read"));
    }

    #[tokio::test]
    async fn test_clear() {
        let navigator = Navigator::new(NavigatorConfig::default());
        navigator
            .item_selected(&ItemDescriptor::new(1, "Gone"), Utc::now())
            .await;
        let result = execute_command(Commands::Clear, &navigator).await;
        assert_eq!(result.exit_code, 0);
        assert!(navigator.current().await.is_none());
    }
}
