//! Storage layer for history persistence.
//!
//! The history model lives in memory; this module mirrors sessions, nodes,
//! note links and the raw visit log into SQLite so history survives restarts.

mod sqlite;

pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageResult;
use crate::history::{ItemId, NodeRecord, NoteLink, Session, SessionId};

/// One entry of the append-only visit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitRecord {
    /// Visited item.
    pub item_id: ItemId,
    /// When the visit happened.
    pub timestamp: DateTime<Utc>,
    /// Session the visit belongs to.
    pub session_id: SessionId,
    /// Item of the parent node, if the visit attached to one.
    pub parent_item_id: Option<ItemId>,
}

impl VisitRecord {
    /// Create a visit log entry.
    pub fn new(item_id: ItemId, timestamp: DateTime<Utc>, session_id: SessionId) -> Self {
        Self {
            item_id,
            timestamp,
            session_id,
            parent_item_id: None,
        }
    }

    /// Set the parent item
    pub fn with_parent_item(mut self, parent_item_id: ItemId) -> Self {
        self.parent_item_id = Some(parent_item_id);
        self
    }
}

/// Storage trait for history persistence.
#[async_trait]
pub trait Storage: Send + Sync {
    // Session operations

    /// Save a session, ignoring it if already stored.
    async fn save_session(&self, session: &Session) -> StorageResult<()>;
    /// Get all sessions, oldest first.
    async fn load_sessions(&self) -> StorageResult<Vec<Session>>;

    // Node operations

    /// Insert or replace a node.
    async fn save_node(&self, node: &NodeRecord) -> StorageResult<()>;
    /// Insert or replace many nodes in one transaction.
    async fn save_nodes(&self, nodes: &[NodeRecord]) -> StorageResult<()>;
    /// Get the `limit` most recently created nodes, oldest first.
    async fn load_nodes(&self, limit: usize) -> StorageResult<Vec<NodeRecord>>;
    /// Get all nodes in a session, oldest first.
    async fn get_session_nodes(&self, session_id: &SessionId) -> StorageResult<Vec<NodeRecord>>;

    // Visit log

    /// Append a visit.
    async fn record_visit(&self, visit: &VisitRecord) -> StorageResult<()>;
    /// Get the visits of a session, oldest first.
    async fn get_session_visits(&self, session_id: &SessionId) -> StorageResult<Vec<VisitRecord>>;

    // Note links

    /// Insert or replace the link for its `(note, node)` pair.
    async fn save_note_link(&self, link: &NoteLink) -> StorageResult<()>;
    /// Delete the link between `note_id` and `node_id`.
    async fn delete_note_link(&self, note_id: ItemId, node_id: &Uuid) -> StorageResult<()>;
    /// Get every link, oldest first.
    async fn load_note_links(&self) -> StorageResult<Vec<NoteLink>>;

    /// Delete every session, node, visit and note link.
    async fn clear_all(&self) -> StorageResult<()>;
}
