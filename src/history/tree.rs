use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::classifier::classify;
use super::nav_stack::NavigationStack;
use super::notes::{NoteLink, NoteLinkKind, NoteLinkStats, NoteLinks};
use super::search::SearchIndex;
use super::session::{to_delta, SessionManager};
use super::{
    HistoryNode, ItemDescriptor, ItemId, NodeId, NodeRecord, Relation, Session, SessionId,
    MAX_IMPORTANCE,
};
use crate::config::NavigatorConfig;
use crate::error::{NavigatorError, NavigatorResult};

/// Whether a visit created a node or folded into the active one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitKind {
    /// A new node was allocated.
    Created,
    /// The active node already showed this item; its counter was bumped.
    Revisited,
}

/// Result of a successful [`HistoryTree::visit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisitOutcome {
    /// The node now active.
    pub node: NodeId,
    /// Created or revisited.
    pub kind: VisitKind,
    /// True when this visit opened a new session.
    pub new_session: bool,
}

/// A tab closed by the user, most recent first in [`HistoryTree::closed_tabs`].
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedTab {
    /// Host tab id.
    pub tab_id: String,
    /// Node the tab was showing.
    pub node: NodeId,
    /// When the tab was closed.
    pub closed_at: DateTime<Utc>,
}

/// Filters applied by [`HistoryTree::tree_data`].
///
/// A root is kept when its subtree satisfies each filter; different nodes of
/// the subtree may satisfy different filters.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TreeFilter {
    /// Free-text query over the search index.
    #[serde(default)]
    pub query: Option<String>,
    /// Only subtrees containing this relation.
    #[serde(default)]
    pub relation: Option<Relation>,
    /// Only subtrees containing a node rated at least this high.
    #[serde(default)]
    pub min_importance: u8,
}

impl TreeFilter {
    /// Set the search query
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Set the relation filter
    pub fn with_relation(mut self, relation: Relation) -> Self {
        self.relation = Some(relation);
        self
    }

    /// Set the minimum importance
    pub fn with_min_importance(mut self, importance: u8) -> Self {
        self.min_importance = importance;
        self
    }
}

/// Renderer-facing view of a node and, for tree data, its subtree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeView {
    /// Node key.
    pub id: Uuid,
    /// Visited item.
    pub item_id: ItemId,
    /// Parent node key.
    pub parent_id: Option<Uuid>,
    /// Owning session.
    pub session_id: SessionId,
    /// Relation to the parent.
    pub relation: Relation,
    /// Display label for `relation`.
    pub relation_label: &'static str,
    /// Cached title.
    pub title: String,
    /// Cached creator summary.
    pub creators: String,
    /// Cached year.
    pub year: String,
    /// Cached item type.
    pub item_type: String,
    /// Distance from the root.
    pub depth: u32,
    /// Visit count.
    pub visit_count: u32,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Most recent visit.
    pub last_visit: DateTime<Utc>,
    /// Open reader tab.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<String>,
    /// When the node's tab was closed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    /// User note.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub notes: String,
    /// User rating, 0-5.
    pub importance: u8,
    /// True for the active node.
    pub is_current: bool,
    /// Child views, only populated in tree data.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeView>,
}

/// One session with its root nodes, as returned by [`HistoryTree::tree_data`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionTree {
    /// Session id.
    pub id: SessionId,
    /// Session start.
    pub started_at: DateTime<Utc>,
    /// Root nodes in creation order.
    pub roots: Vec<NodeView>,
}

/// Enable/disable state for the renderer's navigation controls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavigationState {
    /// Back is available.
    pub can_go_back: bool,
    /// Forward is available.
    pub can_go_forward: bool,
    /// The active node has a parent.
    pub can_go_parent: bool,
    /// Cursor position in the back/forward list.
    pub position: Option<usize>,
    /// Entries in the back/forward list.
    pub length: usize,
}

/// The browsing-history forest.
///
/// Nodes live in an arena and refer to each other by [`NodeId`]. Every node
/// is indexed by key and by item at creation; nodes are never removed except
/// by [`clear_all`](Self::clear_all).
#[derive(Debug, Clone)]
pub struct HistoryTree {
    config: NavigatorConfig,
    navigation_timeout: chrono::Duration,
    nodes: Vec<HistoryNode>,
    roots: Vec<NodeId>,
    by_key: HashMap<Uuid, NodeId>,
    by_item: HashMap<ItemId, Vec<NodeId>>,
    by_tab: HashMap<String, NodeId>,
    catalog: HashMap<ItemId, ItemDescriptor>,
    sessions: SessionManager,
    nav: NavigationStack,
    search: SearchIndex,
    closed_tabs: VecDeque<ClosedTab>,
    note_links: NoteLinks,
}

impl HistoryTree {
    /// Create an empty tree.
    pub fn new(config: NavigatorConfig) -> Self {
        Self {
            navigation_timeout: to_delta(config.navigation_timeout),
            sessions: SessionManager::new(config.session_timeout),
            nav: NavigationStack::new(config.history_limit),
            nodes: Vec::new(),
            roots: Vec::new(),
            by_key: HashMap::new(),
            by_item: HashMap::new(),
            by_tab: HashMap::new(),
            catalog: HashMap::new(),
            search: SearchIndex::new(),
            closed_tabs: VecDeque::new(),
            note_links: NoteLinks::default(),
            config,
        }
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    /// Record a visit to `item` at `now`.
    ///
    /// `relation` overrides classification; `from` overrides the active node
    /// as the source. Returns `None` when `item` is missing or has no id.
    pub fn visit(
        &mut self,
        item: Option<&ItemDescriptor>,
        now: DateTime<Utc>,
        relation: Option<Relation>,
        from: Option<NodeId>,
    ) -> Option<VisitOutcome> {
        let item = item?;
        let Some(item_id) = item.id else {
            debug!(title = %item.title, "Ignoring item without id");
            return None;
        };

        let new_session = self.sessions.ensure_session(now);
        let session_id = self.sessions.current_id()?;
        let active = self.sessions.active_node();
        let source = from.filter(|id| id.0 < self.nodes.len()).or(active);

        if let Some(active) = active {
            if self.nodes[active.0].item_id == item_id {
                let node = &mut self.nodes[active.0];
                node.visit_count += 1;
                node.last_visit = now;
                debug!(item_id, visits = node.visit_count, "Revisited active node");
                self.catalog.insert(item_id, item.clone());
                return Some(VisitOutcome {
                    node: active,
                    kind: VisitKind::Revisited,
                    new_session,
                });
            }
        }

        let relation = relation.unwrap_or_else(|| match source {
            Some(src) => classify(self.catalog.get(&self.nodes[src.0].item_id), Some(item)),
            None => Relation::Manual,
        });

        let parent = source.filter(|src| {
            let source = &self.nodes[src.0];
            source.session_id == session_id && now - source.last_visit < self.navigation_timeout
        });

        let id = NodeId(self.nodes.len());
        let depth = parent.map_or(0, |p| self.nodes[p.0].depth + 1);
        let node = HistoryNode {
            key: Uuid::new_v4(),
            item_id,
            parent,
            children: Vec::new(),
            depth,
            created_at: now,
            last_visit: now,
            visit_count: 1,
            relation,
            session_id,
            tab_id: None,
            closed_at: None,
            title: item.title.clone(),
            creators: item.creator_summary(),
            year: item.year.clone().unwrap_or_default(),
            item_type: item.item_type.clone(),
            item_key: item.key.clone(),
            doi: item.doi.clone().unwrap_or_default(),
            tags: item.tags.clone(),
            notes: String::new(),
            importance: 0,
        };

        info!(
            item_id,
            relation = %relation,
            depth,
            root = parent.is_none(),
            "Created history node"
        );

        self.insert(id, node);
        self.catalog.insert(item_id, item.clone());
        self.sessions.set_active(Some(id));
        self.nav.push(id);

        Some(VisitOutcome {
            node: id,
            kind: VisitKind::Created,
            new_session,
        })
    }

    /// A reader tab was opened on `item`.
    pub fn open_tab(
        &mut self,
        tab_id: &str,
        item: &ItemDescriptor,
        now: DateTime<Utc>,
    ) -> Option<VisitOutcome> {
        let outcome = self.visit(Some(item), now, Some(Relation::Tab), None)?;
        self.bind_tab(tab_id, outcome.node);
        Some(outcome)
    }

    /// A reader tab was brought to front.
    ///
    /// Known tabs count as a revisit of their node: the session clock
    /// advances and the node becomes active. Unknown tabs are treated as
    /// newly opened on `item`, if one is given.
    pub fn select_tab(
        &mut self,
        tab_id: &str,
        item: Option<&ItemDescriptor>,
        now: DateTime<Utc>,
    ) -> Option<VisitOutcome> {
        let Some(&node) = self.by_tab.get(tab_id) else {
            return self.open_tab(tab_id, item?, now);
        };

        let new_session = self.sessions.ensure_session(now);
        let entry = &mut self.nodes[node.0];
        entry.visit_count += 1;
        entry.last_visit = now;
        debug!(tab_id, visits = entry.visit_count, "Selected tracked tab");
        self.activate(node);

        Some(VisitOutcome {
            node,
            kind: VisitKind::Revisited,
            new_session,
        })
    }

    /// A reader tab was closed. Returns the node it was showing.
    pub fn close_tab(&mut self, tab_id: &str, now: DateTime<Utc>) -> Option<NodeId> {
        let Some(node) = self.by_tab.remove(tab_id) else {
            debug!(tab_id, "Closed tab was not tracked");
            return None;
        };
        let entry = &mut self.nodes[node.0];
        entry.tab_id = None;
        entry.closed_at = Some(now);

        self.closed_tabs.push_front(ClosedTab {
            tab_id: tab_id.to_string(),
            node,
            closed_at: now,
        });
        self.closed_tabs.truncate(self.config.closed_tabs_limit);
        Some(node)
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    /// Step back in the navigation history.
    pub fn back(&mut self) -> Option<NodeId> {
        let node = self.nav.back()?;
        self.sessions.set_active(Some(node));
        Some(node)
    }

    /// Step forward in the navigation history.
    pub fn forward(&mut self) -> Option<NodeId> {
        let node = self.nav.forward()?;
        self.sessions.set_active(Some(node));
        Some(node)
    }

    /// Move to the active node's parent.
    pub fn to_parent(&mut self) -> Option<NodeId> {
        let parent = self.nodes[self.sessions.active_node()?.0].parent?;
        self.activate(parent);
        Some(parent)
    }

    /// Jump to the node with `key`.
    pub fn select_node(&mut self, key: &Uuid) -> NavigatorResult<NodeId> {
        let node = self.require(key)?;
        self.activate(node);
        Ok(node)
    }

    /// Back/forward/parent availability.
    pub fn navigation_state(&self) -> NavigationState {
        NavigationState {
            can_go_back: self.nav.can_go_back(),
            can_go_forward: self.nav.can_go_forward(),
            can_go_parent: self
                .sessions
                .active_node()
                .is_some_and(|n| self.nodes[n.0].parent.is_some()),
            position: self.nav.cursor(),
            length: self.nav.len(),
        }
    }

    // ------------------------------------------------------------------
    // Annotations
    // ------------------------------------------------------------------

    /// Replace the note on `key`.
    pub fn set_note(&mut self, key: &Uuid, note: &str) -> NavigatorResult<NodeId> {
        let id = self.require(key)?;
        self.nodes[id.0].notes = note.to_string();
        self.search.remove_node(id);
        self.search.index_node(id, &self.nodes[id.0]);
        Ok(id)
    }

    /// Rate `key`, clamped to 0..=5.
    pub fn set_importance(&mut self, key: &Uuid, importance: u8) -> NavigatorResult<NodeId> {
        let id = self.require(key)?;
        self.nodes[id.0].importance = importance.min(MAX_IMPORTANCE);
        Ok(id)
    }

    // ------------------------------------------------------------------
    // Note links
    // ------------------------------------------------------------------

    /// Link host note `note_id` to `key`, or to the active node when `key`
    /// is `None`.
    ///
    /// The link records the current session, falling back to the node's own
    /// session when none is open. Linking an existing pair again with a
    /// different kind replaces the kind. Returns the stored link and whether
    /// anything changed.
    pub fn link_note(
        &mut self,
        note_id: ItemId,
        key: Option<&Uuid>,
        kind: NoteLinkKind,
        now: DateTime<Utc>,
    ) -> NavigatorResult<(NoteLink, bool)> {
        let id = match key {
            Some(key) => self.require(key)?,
            None => self.current().ok_or(NavigatorError::NoActiveNode)?,
        };
        let node = &self.nodes[id.0];
        let link = NoteLink {
            note_id,
            node_id: node.key,
            kind,
            created_at: now,
            session_id: self.sessions.current_id().unwrap_or(node.session_id),
        };

        let changed = self.note_links.upsert(link.clone());
        if changed {
            debug!(note_id, node = %link.node_id, kind = %kind, "Linked note");
            Ok((link, true))
        } else {
            let stored = self
                .note_links
                .get(note_id, &link.node_id)
                .cloned()
                .unwrap_or(link);
            Ok((stored, false))
        }
    }

    /// Remove the link between `note_id` and `key`.
    pub fn unlink_note(
        &mut self,
        note_id: ItemId,
        key: &Uuid,
    ) -> NavigatorResult<Option<NoteLink>> {
        self.require(key)?;
        let removed = self.note_links.remove(note_id, key);
        if removed.is_some() {
            debug!(note_id, node = %key, "Unlinked note");
        }
        Ok(removed)
    }

    /// Notes linked to `key`, oldest link first.
    pub fn notes_for_node(&self, key: &Uuid) -> NavigatorResult<Vec<NoteLink>> {
        self.require(key)?;
        Ok(self.note_links.for_node(key))
    }

    /// Nodes `note_id` is linked to, oldest link first.
    pub fn nodes_for_note(&self, note_id: ItemId) -> Vec<NoteLink> {
        self.note_links.for_note(note_id)
    }

    /// Every note link, oldest first.
    pub fn note_links(&self) -> Vec<NoteLink> {
        self.note_links.all()
    }

    /// Link totals per kind plus the `recent` newest links.
    pub fn note_link_stats(&self, recent: usize) -> NoteLinkStats {
        self.note_links.stats(recent)
    }

    /// Merge stored or exported links, skipping pairs already present and
    /// links to nodes this tree does not hold. Returns the links added.
    pub fn import_note_links(&mut self, links: Vec<NoteLink>) -> Vec<NoteLink> {
        let mut added = Vec::new();
        for link in links {
            if !self.by_key.contains_key(&link.node_id) {
                debug!(
                    note_id = link.note_id,
                    node = %link.node_id,
                    "Skipping link to unknown node"
                );
                continue;
            }
            if self.note_links.get(link.note_id, &link.node_id).is_some() {
                continue;
            }
            self.note_links.upsert(link.clone());
            added.push(link);
        }
        added
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Node under `id`.
    pub fn node(&self, id: NodeId) -> Option<&HistoryNode> {
        self.nodes.get(id.0)
    }

    /// Resolve a node key.
    pub fn resolve(&self, key: &Uuid) -> Option<NodeId> {
        self.by_key.get(key).copied()
    }

    /// All nodes in creation order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &HistoryNode)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    /// Nodes created for `item_id`, oldest first.
    pub fn nodes_for_item(&self, item_id: ItemId) -> &[NodeId] {
        self.by_item.get(&item_id).map_or(&[], Vec::as_slice)
    }

    /// Node currently shown in `tab_id`.
    pub fn node_for_tab(&self, tab_id: &str) -> Option<NodeId> {
        self.by_tab.get(tab_id).copied()
    }

    /// Root nodes in creation order.
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// The active node.
    pub fn current(&self) -> Option<NodeId> {
        self.sessions.active_node()
    }

    /// Session bookkeeping.
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Back/forward list.
    pub fn navigation(&self) -> &NavigationStack {
        &self.nav
    }

    /// Latest descriptor seen for `item_id`.
    pub fn catalog_item(&self, item_id: ItemId) -> Option<&ItemDescriptor> {
        self.catalog.get(&item_id)
    }

    /// Recently closed tabs, most recent first.
    pub fn closed_tabs(&self) -> impl Iterator<Item = &ClosedTab> {
        self.closed_tabs.iter()
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when no node exists.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of entries in the key, item and tab indexes combined.
    pub fn index_entries(&self) -> usize {
        self.by_key.len() + self.by_item.len() + self.by_tab.len()
    }

    /// Nodes matching `query`, best first.
    pub fn search(&self, query: &str) -> Vec<NodeId> {
        self.search.search(query)
    }

    /// `root` and all of its descendants, depth first.
    pub fn subtree(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get(id.0) else {
                continue;
            };
            out.push(id);
            stack.extend(node.children.iter().rev());
        }
        out
    }

    /// Flat view of one node.
    pub fn view(&self, id: NodeId) -> Option<NodeView> {
        self.nodes.get(id.0).map(|_| self.build_view(id, false))
    }

    /// Sessions newest first, each with the roots that pass `filter`.
    ///
    /// Sessions left without roots are omitted.
    pub fn tree_data(&self, filter: &TreeFilter) -> Vec<SessionTree> {
        let hits: Option<HashSet<NodeId>> = filter
            .query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(|q| self.search.search(q).into_iter().collect());

        let mut grouped: HashMap<SessionId, Vec<NodeView>> = HashMap::new();
        for &root in &self.roots {
            let subtree = self.subtree(root);
            let matches_query = hits
                .as_ref()
                .map_or(true, |hits| subtree.iter().any(|id| hits.contains(id)));
            let matches_relation = filter
                .relation
                .map_or(true, |r| subtree.iter().any(|id| self.nodes[id.0].relation == r));
            let matches_importance = filter.min_importance == 0
                || subtree
                    .iter()
                    .any(|id| self.nodes[id.0].importance >= filter.min_importance);

            if matches_query && matches_relation && matches_importance {
                grouped
                    .entry(self.nodes[root.0].session_id)
                    .or_default()
                    .push(self.build_view(root, true));
            }
        }

        let mut trees: Vec<SessionTree> = self
            .sessions
            .sessions()
            .iter()
            .filter_map(|session| {
                grouped.remove(&session.id).map(|roots| SessionTree {
                    id: session.id,
                    started_at: session.started_at,
                    roots,
                })
            })
            .collect();
        trees.reverse();
        trees.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        trees
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Persisted form of `id`.
    pub fn record(&self, id: NodeId) -> Option<NodeRecord> {
        let node = self.nodes.get(id.0)?;
        Some(NodeRecord {
            id: node.key,
            item_id: node.item_id,
            parent_id: node.parent.map(|p| self.nodes[p.0].key),
            session_id: node.session_id,
            created_at: node.created_at,
            last_visit: node.last_visit,
            visit_count: node.visit_count,
            relation: node.relation,
            depth: node.depth,
            title: node.title.clone(),
            creators: node.creators.clone(),
            year: node.year.clone(),
            item_type: node.item_type.clone(),
            item_key: node.item_key.clone(),
            doi: node.doi.clone(),
            tags: node.tags.clone(),
            notes: node.notes.clone(),
            importance: node.importance,
            closed_at: node.closed_at,
        })
    }

    /// Every node in creation order.
    pub fn records(&self) -> Vec<NodeRecord> {
        (0..self.nodes.len())
            .filter_map(|i| self.record(NodeId(i)))
            .collect()
    }

    /// Merge `records` into the tree, skipping keys already present.
    ///
    /// Records are inserted oldest first so parents precede children. A
    /// record whose parent is unknown becomes a root. Sessions referenced by
    /// records but absent from `sessions` are synthesized from the earliest
    /// record. Returns the number of nodes added.
    pub fn import(&mut self, mut records: Vec<NodeRecord>, sessions: Vec<Session>) -> usize {
        for session in sessions {
            self.sessions.register(session);
        }
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        let mut added = 0;
        for record in records {
            if self.by_key.contains_key(&record.id) {
                continue;
            }
            if self.sessions.get(&record.session_id).is_none() {
                self.sessions.register(Session {
                    id: record.session_id,
                    started_at: record.created_at,
                });
            }

            let parent = match record.parent_id {
                Some(parent_key) => {
                    let parent = self.resolve(&parent_key);
                    if parent.is_none() {
                        warn!(node = %record.id, parent = %parent_key, "Parent missing, loading as root");
                    }
                    parent
                }
                None => None,
            };

            let id = NodeId(self.nodes.len());
            let node = HistoryNode {
                key: record.id,
                item_id: record.item_id,
                parent,
                children: Vec::new(),
                depth: parent.map_or(0, |p| self.nodes[p.0].depth + 1),
                created_at: record.created_at,
                last_visit: record.last_visit,
                visit_count: record.visit_count.max(1),
                relation: record.relation,
                session_id: record.session_id,
                tab_id: None,
                closed_at: record.closed_at,
                title: record.title,
                creators: record.creators,
                year: record.year,
                item_type: record.item_type,
                item_key: record.item_key,
                doi: record.doi,
                tags: record.tags,
                notes: record.notes,
                importance: record.importance.min(MAX_IMPORTANCE),
            };
            self.insert(id, node);
            added += 1;
        }
        added
    }

    /// Rebuild from storage and continue the last session if it is still
    /// live at `now`.
    pub fn restore(
        &mut self,
        records: Vec<NodeRecord>,
        sessions: Vec<Session>,
        links: Vec<NoteLink>,
        now: DateTime<Utc>,
    ) -> usize {
        let added = self.import(records, sessions);
        self.import_note_links(links);

        let latest = self
            .nodes()
            .max_by_key(|(_, node)| node.last_visit)
            .map(|(id, node)| (id, node.session_id, node.last_visit));
        if let Some((id, session_id, last_visit)) = latest {
            if now - last_visit < self.sessions.timeout() {
                if let Some(session) = self.sessions.get(&session_id).cloned() {
                    self.sessions.resume(session, last_visit, Some(id));
                    self.nav.push(id);
                }
            }
        }

        info!(nodes = added, "Restored history");
        added
    }

    /// Drop every node, index, stack entry, note link and session.
    pub fn clear_all(&mut self) {
        let nodes = self.nodes.len();
        *self = Self::new(self.config.clone());
        info!(nodes, "Cleared history");
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn insert(&mut self, id: NodeId, node: HistoryNode) {
        match node.parent {
            Some(parent) => self.nodes[parent.0].children.push(id),
            None => self.roots.push(id),
        }
        self.by_key.insert(node.key, id);
        self.by_item.entry(node.item_id).or_default().push(id);
        self.search.index_node(id, &node);
        self.nodes.push(node);
    }

    fn activate(&mut self, id: NodeId) {
        self.sessions.set_active(Some(id));
        self.nav.push(id);
    }

    fn bind_tab(&mut self, tab_id: &str, id: NodeId) {
        if let Some(previous) = self.nodes[id.0].tab_id.take() {
            if self.by_tab.get(&previous) == Some(&id) {
                self.by_tab.remove(&previous);
            }
        }
        if let Some(old) = self.by_tab.insert(tab_id.to_string(), id) {
            if old != id {
                self.nodes[old.0].tab_id = None;
            }
        }
        let node = &mut self.nodes[id.0];
        node.tab_id = Some(tab_id.to_string());
        node.closed_at = None;
    }

    fn require(&self, key: &Uuid) -> NavigatorResult<NodeId> {
        self.resolve(key).ok_or_else(|| NavigatorError::NodeNotFound {
            node_id: key.to_string(),
        })
    }

    fn build_view(&self, id: NodeId, deep: bool) -> NodeView {
        let node = &self.nodes[id.0];
        NodeView {
            id: node.key,
            item_id: node.item_id,
            parent_id: node.parent.map(|p| self.nodes[p.0].key),
            session_id: node.session_id,
            relation: node.relation,
            relation_label: node.relation.label(),
            title: node.title.clone(),
            creators: node.creators.clone(),
            year: node.year.clone(),
            item_type: node.item_type.clone(),
            depth: node.depth,
            visit_count: node.visit_count,
            created_at: node.created_at,
            last_visit: node.last_visit,
            tab_id: node.tab_id.clone(),
            closed_at: node.closed_at,
            notes: node.notes.clone(),
            importance: node.importance,
            is_current: self.sessions.active_node() == Some(id),
            children: if deep {
                node.children
                    .iter()
                    .map(|&child| self.build_view(child, true))
                    .collect()
            } else {
                Vec::new()
            },
        }
    }
}

#[cfg(test)]
#[path = "tree_tests.rs"]
mod tests;
