//! Navigator service.
//!
//! Owns the [`HistoryTree`] behind a lock, turns host events into tree
//! operations and mirrors every change into optional [`Storage`]. Storage
//! writes happen after the lock is released; failures are logged and never
//! reach the caller.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::NavigatorConfig;
use crate::error::{NavigatorError, NavigatorResult, StorageResult};
use crate::history::{
    compute_stats, recommend, HistoryStats, HistoryTree, ItemDescriptor, ItemId,
    NavigationState, NodeRecord, NodeView, NoteLink, NoteLinkKind, NoteLinkStats,
    Recommendation, Session, SessionTree, TreeFilter, VisitOutcome,
};
use crate::storage::{Storage, VisitRecord};

/// Current export document version.
pub const EXPORT_VERSION: u32 = 1;

/// Portable snapshot of the whole history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportDocument {
    /// Format version.
    pub version: u32,
    /// When the snapshot was taken.
    pub exported_at: DateTime<Utc>,
    /// Known sessions.
    #[serde(default)]
    pub sessions: Vec<Session>,
    /// Every node, oldest first.
    pub nodes: Vec<NodeRecord>,
    /// Note links between host notes and nodes.
    #[serde(default)]
    pub note_links: Vec<NoteLink>,
}

/// A recently closed tab with the node it was showing.
#[derive(Debug, Clone, Serialize)]
pub struct ClosedTabView {
    /// Host tab id.
    pub tab_id: String,
    /// When the tab was closed.
    pub closed_at: DateTime<Utc>,
    /// The node.
    pub node: NodeView,
}

/// Pending storage writes collected while holding the tree lock.
#[derive(Debug, Default)]
struct Changes {
    sessions: Vec<Session>,
    nodes: Vec<NodeRecord>,
    visit: Option<VisitRecord>,
    links: Vec<NoteLink>,
    unlinked: Option<(ItemId, Uuid)>,
}

impl Changes {
    fn is_empty(&self) -> bool {
        self.sessions.is_empty()
            && self.nodes.is_empty()
            && self.visit.is_none()
            && self.links.is_empty()
            && self.unlinked.is_none()
    }
}

/// History service shared by the server and the CLI.
pub struct Navigator {
    config: NavigatorConfig,
    tree: RwLock<HistoryTree>,
    storage: Option<Arc<dyn Storage>>,
}

impl Navigator {
    /// Create an in-memory navigator.
    pub fn new(config: NavigatorConfig) -> Self {
        Self {
            tree: RwLock::new(HistoryTree::new(config.clone())),
            config,
            storage: None,
        }
    }

    /// Create a navigator that writes through to `storage`.
    pub fn with_storage(config: NavigatorConfig, storage: Arc<dyn Storage>) -> Self {
        Self {
            storage: Some(storage),
            ..Self::new(config)
        }
    }

    /// Whether changes are persisted.
    pub fn is_persistent(&self) -> bool {
        self.storage.is_some()
    }

    /// Load stored history, continuing the last session if it is still live
    /// at `now`. Returns the number of nodes loaded.
    pub async fn restore(&self, now: DateTime<Utc>) -> StorageResult<usize> {
        let Some(storage) = &self.storage else {
            return Ok(0);
        };
        let sessions = storage.load_sessions().await?;
        let records = storage.load_nodes(self.config.restore_limit).await?;
        let links = storage.load_note_links().await?;

        let mut tree = self.tree.write().await;
        Ok(tree.restore(records, sessions, links, now))
    }

    // ------------------------------------------------------------------
    // Host events
    // ------------------------------------------------------------------

    /// An item was selected in the library.
    ///
    /// Notes and attachments are ignored.
    pub async fn item_selected(
        &self,
        item: &ItemDescriptor,
        at: DateTime<Utc>,
    ) -> Option<NodeView> {
        if !item.is_trackable() {
            debug!(item_type = %item.item_type, "Ignoring untracked item type");
            return None;
        }

        let (view, changes) = {
            let mut tree = self.tree.write().await;
            let outcome = tree.visit(Some(item), at, None, None)?;
            (tree.view(outcome.node), visit_changes(&tree, &outcome, at))
        };
        self.persist(changes).await;
        view
    }

    /// A reader tab was opened.
    pub async fn tab_opened(
        &self,
        tab_id: &str,
        item: &ItemDescriptor,
        at: DateTime<Utc>,
    ) -> Option<NodeView> {
        let (view, changes) = {
            let mut tree = self.tree.write().await;
            let outcome = tree.open_tab(tab_id, item, at)?;
            (tree.view(outcome.node), visit_changes(&tree, &outcome, at))
        };
        self.persist(changes).await;
        view
    }

    /// A reader tab was closed.
    pub async fn tab_closed(&self, tab_id: &str, at: DateTime<Utc>) -> Option<NodeView> {
        let (view, changes) = {
            let mut tree = self.tree.write().await;
            let node = tree.close_tab(tab_id, at)?;
            let changes = Changes {
                nodes: tree.record(node).into_iter().collect(),
                ..Changes::default()
            };
            (tree.view(node), changes)
        };
        self.persist(changes).await;
        view
    }

    /// A reader tab was brought to front.
    pub async fn tab_selected(
        &self,
        tab_id: &str,
        item: Option<&ItemDescriptor>,
        at: DateTime<Utc>,
    ) -> Option<NodeView> {
        let (view, changes) = {
            let mut tree = self.tree.write().await;
            let outcome = tree.select_tab(tab_id, item, at)?;
            (tree.view(outcome.node), visit_changes(&tree, &outcome, at))
        };
        self.persist(changes).await;
        view
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    /// Step back.
    pub async fn back(&self) -> Option<NodeView> {
        let mut tree = self.tree.write().await;
        let node = tree.back()?;
        tree.view(node)
    }

    /// Step forward.
    pub async fn forward(&self) -> Option<NodeView> {
        let mut tree = self.tree.write().await;
        let node = tree.forward()?;
        tree.view(node)
    }

    /// Move to the active node's parent.
    pub async fn parent(&self) -> Option<NodeView> {
        let mut tree = self.tree.write().await;
        let node = tree.to_parent()?;
        tree.view(node)
    }

    /// Jump to a node.
    pub async fn select(&self, key: &Uuid) -> NavigatorResult<NodeView> {
        let mut tree = self.tree.write().await;
        let node = tree.select_node(key)?;
        tree.view(node).ok_or_else(|| not_found(key))
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// The active node.
    pub async fn current(&self) -> Option<NodeView> {
        let tree = self.tree.read().await;
        tree.current().and_then(|id| tree.view(id))
    }

    /// Back/forward/parent availability.
    pub async fn navigation_state(&self) -> NavigationState {
        self.tree.read().await.navigation_state()
    }

    /// Sessions with their (filtered) trees, newest first.
    pub async fn tree(&self, filter: &TreeFilter) -> Vec<SessionTree> {
        self.tree.read().await.tree_data(filter)
    }

    /// Full-text search over visited nodes.
    pub async fn search(&self, query: &str, limit: usize) -> Vec<NodeView> {
        let tree = self.tree.read().await;
        tree.search(query)
            .into_iter()
            .take(limit)
            .filter_map(|id| tree.view(id))
            .collect()
    }

    /// Items related to `key`, or to the active node when `key` is `None`.
    pub async fn recommend(
        &self,
        key: Option<&Uuid>,
        limit: usize,
    ) -> NavigatorResult<Vec<Recommendation>> {
        let tree = self.tree.read().await;
        let node = match key {
            Some(key) => tree.resolve(key).ok_or_else(|| not_found(key))?,
            None => match tree.current() {
                Some(node) => node,
                None => return Ok(Vec::new()),
            },
        };
        Ok(recommend(&tree, node, limit))
    }

    /// Aggregate statistics.
    pub async fn stats(&self, top: usize) -> HistoryStats {
        compute_stats(&*self.tree.read().await, top)
    }

    /// Recently closed tabs, most recent first.
    pub async fn closed_tabs(&self, limit: usize) -> Vec<ClosedTabView> {
        let tree = self.tree.read().await;
        tree.closed_tabs()
            .take(limit)
            .filter_map(|closed| {
                tree.view(closed.node).map(|node| ClosedTabView {
                    tab_id: closed.tab_id.clone(),
                    closed_at: closed.closed_at,
                    node,
                })
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Annotations and maintenance
    // ------------------------------------------------------------------

    /// Update the note and/or rating of a node.
    pub async fn annotate(
        &self,
        key: &Uuid,
        note: Option<&str>,
        importance: Option<u8>,
    ) -> NavigatorResult<NodeView> {
        let (view, changes) = {
            let mut tree = self.tree.write().await;
            let mut node = tree.resolve(key).ok_or_else(|| not_found(key))?;
            if let Some(note) = note {
                node = tree.set_note(key, note)?;
            }
            if let Some(importance) = importance {
                node = tree.set_importance(key, importance)?;
            }
            let changes = Changes {
                nodes: tree.record(node).into_iter().collect(),
                ..Changes::default()
            };
            (tree.view(node).ok_or_else(|| not_found(key))?, changes)
        };
        self.persist(changes).await;
        Ok(view)
    }

    // ------------------------------------------------------------------
    // Note links
    // ------------------------------------------------------------------

    /// Link host note `note_id` to `key`, or to the active node.
    pub async fn link_note(
        &self,
        note_id: ItemId,
        key: Option<&Uuid>,
        kind: NoteLinkKind,
        at: DateTime<Utc>,
    ) -> NavigatorResult<NoteLink> {
        let (link, changed) = self.tree.write().await.link_note(note_id, key, kind, at)?;
        if changed {
            self.persist(Changes {
                links: vec![link.clone()],
                ..Changes::default()
            })
            .await;
        }
        Ok(link)
    }

    /// Remove a note link. Returns whether one existed.
    pub async fn unlink_note(&self, note_id: ItemId, key: &Uuid) -> NavigatorResult<bool> {
        let removed = self.tree.write().await.unlink_note(note_id, key)?;
        if removed.is_some() {
            self.persist(Changes {
                unlinked: Some((note_id, *key)),
                ..Changes::default()
            })
            .await;
        }
        Ok(removed.is_some())
    }

    /// Notes linked to a node.
    pub async fn node_notes(&self, key: &Uuid) -> NavigatorResult<Vec<NoteLink>> {
        self.tree.read().await.notes_for_node(key)
    }

    /// Nodes a note is linked to.
    pub async fn note_nodes(&self, note_id: ItemId) -> Vec<NoteLink> {
        self.tree.read().await.nodes_for_note(note_id)
    }

    /// Link totals per kind plus the newest links.
    pub async fn note_stats(&self, recent: usize) -> NoteLinkStats {
        self.tree.read().await.note_link_stats(recent)
    }

    /// Forget everything, in memory and in storage.
    pub async fn clear(&self) {
        self.tree.write().await.clear_all();
        if let Some(storage) = &self.storage {
            if let Err(e) = storage.clear_all().await {
                warn!(error = %e, "Failed to clear stored history");
            }
        }
    }

    /// Serialize the whole history as pretty JSON.
    pub async fn export(&self) -> NavigatorResult<String> {
        let document = {
            let tree = self.tree.read().await;
            ExportDocument {
                version: EXPORT_VERSION,
                exported_at: Utc::now(),
                sessions: tree.sessions().sessions().to_vec(),
                nodes: tree.records(),
                note_links: tree.note_links(),
            }
        };
        info!(
            nodes = document.nodes.len(),
            note_links = document.note_links.len(),
            "Exported history"
        );
        Ok(serde_json::to_string_pretty(&document)?)
    }

    /// Merge an exported document. Returns the number of nodes added.
    pub async fn import(&self, data: &str) -> NavigatorResult<usize> {
        let document: ExportDocument =
            serde_json::from_str(data).map_err(|e| NavigatorError::InvalidImport {
                message: e.to_string(),
            })?;
        if document.version == 0 || document.version > EXPORT_VERSION {
            return Err(NavigatorError::InvalidImport {
                message: format!("Unsupported export version: {}", document.version),
            });
        }

        let (added, changes) = {
            let mut tree = self.tree.write().await;
            let keys: Vec<Uuid> = document
                .nodes
                .iter()
                .map(|n| n.id)
                .filter(|key| tree.resolve(key).is_none())
                .collect();
            let added = tree.import(document.nodes, document.sessions);
            let nodes: Vec<NodeRecord> = keys
                .iter()
                .filter_map(|key| tree.resolve(key))
                .filter_map(|id| tree.record(id))
                .collect();
            let sessions = tree.sessions().sessions().to_vec();
            let links = tree.import_note_links(document.note_links);
            let changes = Changes {
                sessions,
                nodes,
                links,
                ..Changes::default()
            };
            (added, changes)
        };
        info!(nodes = added, "Imported history");
        self.persist(changes).await;
        Ok(added)
    }

    async fn persist(&self, changes: Changes) {
        let Some(storage) = &self.storage else {
            return;
        };
        if changes.is_empty() {
            return;
        }

        for session in &changes.sessions {
            if let Err(e) = storage.save_session(session).await {
                warn!(error = %e, session = %session.id, "Failed to save session");
            }
        }

        let saved = match changes.nodes.as_slice() {
            [] => Ok(()),
            [node] => storage.save_node(node).await,
            nodes => storage.save_nodes(nodes).await,
        };
        if let Err(e) = saved {
            warn!(error = %e, nodes = changes.nodes.len(), "Failed to save history nodes");
        }

        if let Some(visit) = &changes.visit {
            if let Err(e) = storage.record_visit(visit).await {
                warn!(error = %e, item_id = visit.item_id, "Failed to record visit");
            }
        }

        for link in &changes.links {
            if let Err(e) = storage.save_note_link(link).await {
                warn!(error = %e, note_id = link.note_id, "Failed to save note link");
            }
        }
        if let Some((note_id, node_id)) = &changes.unlinked {
            if let Err(e) = storage.delete_note_link(*note_id, node_id).await {
                warn!(error = %e, note_id, "Failed to delete note link");
            }
        }
    }
}

fn visit_changes(tree: &HistoryTree, outcome: &VisitOutcome, at: DateTime<Utc>) -> Changes {
    let sessions = if outcome.new_session {
        tree.sessions().current().cloned().into_iter().collect()
    } else {
        Vec::new()
    };
    let visit = tree.node(outcome.node).map(|node| {
        let visit = VisitRecord::new(node.item_id, at, node.session_id);
        match node.parent.and_then(|p| tree.node(p)) {
            Some(parent) => visit.with_parent_item(parent.item_id),
            None => visit,
        }
    });
    Changes {
        sessions,
        nodes: tree.record(outcome.node).into_iter().collect(),
        visit,
        ..Changes::default()
    }
}

fn not_found(key: &Uuid) -> NavigatorError {
    NavigatorError::NodeNotFound {
        node_id: key.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 9, 1, 12, 0, 0).unwrap() + chrono::Duration::seconds(secs)
    }

    #[tokio::test]
    async fn test_item_selected_skips_notes() {
        let navigator = Navigator::new(NavigatorConfig::default());
        let note = ItemDescriptor::new(1, "A note").with_type("note");
        assert!(navigator.item_selected(&note, t(0)).await.is_none());
        assert!(navigator.current().await.is_none());
    }

    #[tokio::test]
    async fn test_item_selected_returns_current_view() {
        let navigator = Navigator::new(NavigatorConfig::default());
        let view = navigator
            .item_selected(&ItemDescriptor::new(1, "First"), t(0))
            .await
            .unwrap();
        assert!(view.is_current);
        assert_eq!(navigator.current().await.unwrap().id, view.id);
    }

    #[tokio::test]
    async fn test_tab_selected_known_tab_does_not_create_node() {
        let navigator = Navigator::new(NavigatorConfig::default());
        navigator
            .tab_opened("t1", &ItemDescriptor::new(1, "A"), t(0))
            .await
            .unwrap();
        navigator
            .tab_opened("t2", &ItemDescriptor::new(2, "B"), t(1))
            .await
            .unwrap();
        let view = navigator.tab_selected("t1", None, t(2)).await.unwrap();
        assert_eq!(view.item_id, 1);
        assert!(view.is_current);
        assert_eq!(navigator.stats(5).await.total_nodes, 2);
    }

    #[tokio::test]
    async fn test_link_note_without_active_node() {
        let navigator = Navigator::new(NavigatorConfig::default());
        let err = navigator
            .link_note(4, None, NoteLinkKind::Manual, t(0))
            .await
            .unwrap_err();
        assert!(matches!(err, NavigatorError::NoActiveNode));
        assert_eq!(navigator.note_stats(5).await.total, 0);
    }

    #[tokio::test]
    async fn test_export_carries_note_links() {
        let source = Navigator::new(NavigatorConfig::default());
        let view = source
            .item_selected(&ItemDescriptor::new(1, "A"), t(0))
            .await
            .unwrap();
        source
            .link_note(4, None, NoteLinkKind::Summarizes, t(1))
            .await
            .unwrap();

        let target = Navigator::new(NavigatorConfig::default());
        target.import(&source.export().await.unwrap()).await.unwrap();
        let links = target.node_notes(&view.id).await.unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].kind, NoteLinkKind::Summarizes);
    }

    #[tokio::test]
    async fn test_annotate_unknown_node() {
        let navigator = Navigator::new(NavigatorConfig::default());
        let err = navigator
            .annotate(&Uuid::new_v4(), Some("x"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, NavigatorError::NodeNotFound { .. }));
    }

    #[tokio::test]
    async fn test_recommend_without_current_is_empty() {
        let navigator = Navigator::new(NavigatorConfig::default());
        assert!(navigator.recommend(None, 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_import_rejects_future_version() {
        let navigator = Navigator::new(NavigatorConfig::default());
        let data = r#"{"version": 99, "exported_at": "2024-01-01T00:00:00Z", "nodes": []}"#;
        let err = navigator.import(data).await.unwrap_err();
        assert!(err.to_string().contains("Unsupported export version"));

        let err = navigator.import("not json").await.unwrap_err();
        assert!(matches!(err, NavigatorError::InvalidImport { .. }));
    }

    #[test]
    fn test_restore_without_storage_is_noop() {
        let navigator = Navigator::new(NavigatorConfig::default());
        let loaded = tokio_test::block_on(navigator.restore(t(0))).unwrap();
        assert_eq!(loaded, 0);
        assert!(!navigator.is_persistent());
    }
}
