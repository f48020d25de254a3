use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use super::SharedState;
use crate::error::{McpError, McpResult};
use crate::history::{ItemDescriptor, ItemId, NavigationState, NodeView, NoteLinkKind, TreeFilter};

const DEFAULT_SEARCH_LIMIT: usize = 20;
const DEFAULT_RECOMMEND_LIMIT: usize = 5;
const DEFAULT_TOP_ITEMS: usize = 10;
const DEFAULT_CLOSED_TABS: usize = 10;
const DEFAULT_RECENT_LINKS: usize = 10;

/// Route tool calls to appropriate handlers
pub async fn handle_tool_call(
    state: &SharedState,
    tool_name: &str,
    arguments: Option<Value>,
) -> McpResult<Value> {
    info!(tool = %tool_name, "Routing tool call");

    match tool_name {
        // Host events
        "history_item_selected" => handle_item_selected(state, arguments).await,
        "history_tab_opened" => handle_tab_opened(state, arguments).await,
        "history_tab_closed" => handle_tab_closed(state, arguments).await,
        "history_tab_selected" => handle_tab_selected(state, arguments).await,
        // Navigation
        "history_tree" => handle_tree(state, arguments).await,
        "history_current" => handle_current(state).await,
        "history_back" => navigation_result(state, state.navigator.back().await).await,
        "history_forward" => navigation_result(state, state.navigator.forward().await).await,
        "history_parent" => navigation_result(state, state.navigator.parent().await).await,
        "history_select" => handle_select(state, arguments).await,
        // Discovery
        "history_search" => handle_search(state, arguments).await,
        "history_recommend" => handle_recommend(state, arguments).await,
        "history_stats" => handle_stats(state, arguments).await,
        "history_closed_tabs" => handle_closed_tabs(state, arguments).await,
        // Note links
        "history_associate_note" => handle_associate_note(state, arguments).await,
        "history_dissociate_note" => handle_dissociate_note(state, arguments).await,
        "history_note_links" => handle_note_links(state, arguments).await,
        "history_note_stats" => handle_note_stats(state, arguments).await,
        // Maintenance
        "history_annotate" => handle_annotate(state, arguments).await,
        "history_export" => handle_export(state).await,
        "history_import" => handle_import(state, arguments).await,
        "history_clear" => handle_clear(state).await,
        _ => Err(McpError::UnknownTool {
            tool_name: tool_name.to_string(),
        }),
    }
}

/// Response for event and navigation tools.
#[derive(Debug, Serialize)]
pub struct NavigationResponse {
    /// The node now active, if the call changed anything.
    pub node: Option<NodeView>,
    /// Back/forward/parent availability after the call.
    pub navigation: NavigationState,
}

#[derive(Debug, Deserialize)]
struct ItemEventParams {
    item: ItemDescriptor,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct TabEventParams {
    tab_id: String,
    #[serde(default)]
    item: Option<ItemDescriptor>,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

/// Handle history_item_selected
async fn handle_item_selected(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    let params: ItemEventParams = parse_arguments("history_item_selected", arguments)?;
    let at = params.timestamp.unwrap_or_else(Utc::now);
    let node = state.navigator.item_selected(&params.item, at).await;
    navigation_result(state, node).await
}

/// Handle history_tab_opened
async fn handle_tab_opened(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    let params: TabEventParams = parse_arguments("history_tab_opened", arguments)?;
    let item = params.item.ok_or_else(|| McpError::InvalidParameters {
        tool_name: "history_tab_opened".to_string(),
        message: "missing field `item`".to_string(),
    })?;
    let at = params.timestamp.unwrap_or_else(Utc::now);
    let node = state.navigator.tab_opened(&params.tab_id, &item, at).await;
    navigation_result(state, node).await
}

/// Handle history_tab_closed
async fn handle_tab_closed(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    let params: TabEventParams = parse_arguments("history_tab_closed", arguments)?;
    let at = params.timestamp.unwrap_or_else(Utc::now);
    let node = state.navigator.tab_closed(&params.tab_id, at).await;
    to_value(serde_json::json!({ "closed": node }))
}

/// Handle history_tab_selected
async fn handle_tab_selected(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    let params: TabEventParams = parse_arguments("history_tab_selected", arguments)?;
    let at = params.timestamp.unwrap_or_else(Utc::now);
    let node = state
        .navigator
        .tab_selected(&params.tab_id, params.item.as_ref(), at)
        .await;
    navigation_result(state, node).await
}

/// Handle history_tree
async fn handle_tree(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    let filter: TreeFilter = parse_optional_arguments("history_tree", arguments)?;
    let sessions = state.navigator.tree(&filter).await;
    to_value(serde_json::json!({ "sessions": sessions }))
}

/// Handle history_current
async fn handle_current(state: &SharedState) -> McpResult<Value> {
    let node = state.navigator.current().await;
    navigation_result(state, node).await
}

/// Handle history_select
async fn handle_select(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    #[derive(Deserialize)]
    struct SelectParams {
        node_id: Uuid,
    }

    let params: SelectParams = parse_arguments("history_select", arguments)?;
    let node = state.navigator.select(&params.node_id).await?;
    navigation_result(state, Some(node)).await
}

/// Handle history_search
async fn handle_search(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    #[derive(Deserialize)]
    struct SearchParams {
        query: String,
        #[serde(default)]
        limit: Option<usize>,
    }

    let params: SearchParams = parse_arguments("history_search", arguments)?;
    let results = state
        .navigator
        .search(&params.query, params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT))
        .await;
    to_value(serde_json::json!({ "query": params.query, "results": results }))
}

/// Handle history_recommend
async fn handle_recommend(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    #[derive(Default, Deserialize)]
    struct RecommendParams {
        #[serde(default)]
        node_id: Option<Uuid>,
        #[serde(default)]
        limit: Option<usize>,
    }

    let params: RecommendParams = parse_optional_arguments("history_recommend", arguments)?;
    let recommendations = state
        .navigator
        .recommend(
            params.node_id.as_ref(),
            params.limit.unwrap_or(DEFAULT_RECOMMEND_LIMIT),
        )
        .await?;
    to_value(serde_json::json!({ "recommendations": recommendations }))
}

/// Handle history_stats
async fn handle_stats(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    #[derive(Default, Deserialize)]
    struct StatsParams {
        #[serde(default)]
        top: Option<usize>,
    }

    let params: StatsParams = parse_optional_arguments("history_stats", arguments)?;
    let stats = state
        .navigator
        .stats(params.top.unwrap_or(DEFAULT_TOP_ITEMS))
        .await;
    to_value(stats)
}

/// Handle history_closed_tabs
async fn handle_closed_tabs(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    #[derive(Default, Deserialize)]
    struct ClosedTabsParams {
        #[serde(default)]
        limit: Option<usize>,
    }

    let params: ClosedTabsParams = parse_optional_arguments("history_closed_tabs", arguments)?;
    let tabs = state
        .navigator
        .closed_tabs(params.limit.unwrap_or(DEFAULT_CLOSED_TABS))
        .await;
    to_value(serde_json::json!({ "closed_tabs": tabs }))
}

/// Handle history_associate_note
async fn handle_associate_note(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    #[derive(Deserialize)]
    struct AssociateParams {
        note_id: ItemId,
        #[serde(default)]
        node_id: Option<Uuid>,
        #[serde(default)]
        kind: NoteLinkKind,
        #[serde(default)]
        timestamp: Option<DateTime<Utc>>,
    }

    let params: AssociateParams = parse_arguments("history_associate_note", arguments)?;
    let at = params.timestamp.unwrap_or_else(Utc::now);
    let link = state
        .navigator
        .link_note(params.note_id, params.node_id.as_ref(), params.kind, at)
        .await?;
    to_value(link)
}

/// Handle history_dissociate_note
async fn handle_dissociate_note(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    #[derive(Deserialize)]
    struct DissociateParams {
        note_id: ItemId,
        node_id: Uuid,
    }

    let params: DissociateParams = parse_arguments("history_dissociate_note", arguments)?;
    let removed = state
        .navigator
        .unlink_note(params.note_id, &params.node_id)
        .await?;
    to_value(serde_json::json!({ "removed": removed }))
}

/// Handle history_note_links
async fn handle_note_links(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    #[derive(Default, Deserialize)]
    struct NoteLinksParams {
        #[serde(default)]
        node_id: Option<Uuid>,
        #[serde(default)]
        note_id: Option<ItemId>,
    }

    let params: NoteLinksParams = parse_optional_arguments("history_note_links", arguments)?;
    let links = match (params.node_id, params.note_id) {
        (Some(node_id), note_id) => {
            let mut links = state.navigator.node_notes(&node_id).await?;
            if let Some(note_id) = note_id {
                links.retain(|link| link.note_id == note_id);
            }
            links
        }
        (None, Some(note_id)) => state.navigator.note_nodes(note_id).await,
        (None, None) => {
            return Err(McpError::InvalidParameters {
                tool_name: "history_note_links".to_string(),
                message: "expected `node_id` or `note_id`".to_string(),
            })
        }
    };
    to_value(serde_json::json!({ "links": links }))
}

/// Handle history_note_stats
async fn handle_note_stats(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    #[derive(Default, Deserialize)]
    struct NoteStatsParams {
        #[serde(default)]
        recent: Option<usize>,
    }

    let params: NoteStatsParams = parse_optional_arguments("history_note_stats", arguments)?;
    let stats = state
        .navigator
        .note_stats(params.recent.unwrap_or(DEFAULT_RECENT_LINKS))
        .await;
    to_value(stats)
}

/// Handle history_annotate
async fn handle_annotate(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    #[derive(Deserialize)]
    struct AnnotateParams {
        node_id: Uuid,
        #[serde(default)]
        note: Option<String>,
        #[serde(default)]
        importance: Option<u8>,
    }

    let params: AnnotateParams = parse_arguments("history_annotate", arguments)?;
    if params.note.is_none() && params.importance.is_none() {
        return Err(McpError::InvalidParameters {
            tool_name: "history_annotate".to_string(),
            message: "expected `note` or `importance`".to_string(),
        });
    }

    let node = state
        .navigator
        .annotate(&params.node_id, params.note.as_deref(), params.importance)
        .await?;
    to_value(node)
}

/// Handle history_export
async fn handle_export(state: &SharedState) -> McpResult<Value> {
    let document = state.navigator.export().await?;
    serde_json::from_str(&document).map_err(McpError::Json)
}

/// Handle history_import
async fn handle_import(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    #[derive(Deserialize)]
    struct ImportParams {
        document: Value,
    }

    let params: ImportParams = parse_arguments("history_import", arguments)?;
    let data = match params.document {
        Value::String(text) => text,
        other => other.to_string(),
    };
    let imported = state.navigator.import(&data).await?;
    to_value(serde_json::json!({ "imported": imported }))
}

/// Handle history_clear
async fn handle_clear(state: &SharedState) -> McpResult<Value> {
    state.navigator.clear().await;
    to_value(serde_json::json!({ "cleared": true }))
}

async fn navigation_result(state: &SharedState, node: Option<NodeView>) -> McpResult<Value> {
    let navigation = state.navigator.navigation_state().await;
    to_value(NavigationResponse { node, navigation })
}

fn to_value<T: Serialize>(value: T) -> McpResult<Value> {
    serde_json::to_value(value).map_err(McpError::Json)
}

fn parse_arguments<T: serde::de::DeserializeOwned>(
    tool_name: &str,
    arguments: Option<Value>,
) -> McpResult<T> {
    match arguments {
        Some(args) => serde_json::from_value(args).map_err(|e| McpError::InvalidParameters {
            tool_name: tool_name.to_string(),
            message: e.to_string(),
        }),
        None => Err(McpError::InvalidParameters {
            tool_name: tool_name.to_string(),
            message: "Missing arguments".to_string(),
        }),
    }
}

/// Like [`parse_arguments`] for tools whose arguments are all optional.
fn parse_optional_arguments<T: serde::de::DeserializeOwned + Default>(
    tool_name: &str,
    arguments: Option<Value>,
) -> McpResult<T> {
    match arguments {
        None | Some(Value::Null) => Ok(T::default()),
        Some(args) => parse_arguments(tool_name, Some(args)),
    }
}
