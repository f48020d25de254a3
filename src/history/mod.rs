//! In-memory browsing-history model.
//!
//! This module holds the state machine behind the navigator:
//! - [`SessionManager`]: session boundaries by inactivity timeout
//! - [`classify`]: relation between two consecutively viewed items
//! - [`HistoryTree`]: node arena, attachment decisions and indexes
//! - [`NavigationStack`]: back/forward list independent of the tree shape
//! - [`NoteLinks`]: host notes linked to the nodes they were written against
//!
//! Search, recommendations and statistics are read-only views over a
//! [`HistoryTree`].

mod classifier;
mod nav_stack;
mod notes;
mod recommend;
mod search;
mod session;
mod stats;
mod tree;

#[cfg(test)]
#[path = "types_tests.rs"]
mod types_tests;

pub use classifier::classify;
pub use nav_stack::NavigationStack;
pub use notes::{NoteLink, NoteLinkKind, NoteLinkStats, NoteLinks};
pub use recommend::{recommend, Recommendation};
pub use search::SearchIndex;
pub use session::SessionManager;
pub use stats::{compute_stats, DailyActivity, HistoryStats, ItemVisits, TagCount};
pub use tree::{
    ClosedTab, HistoryTree, NavigationState, NodeView, SessionTree, TreeFilter, VisitKind,
    VisitOutcome,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a library item in the host reference manager.
pub type ItemId = i64;

/// Handle of a node inside a [`HistoryTree`] arena.
///
/// Handles are dense indices and are only meaningful for the tree that
/// produced them. Use [`HistoryNode::key`] to refer to a node across
/// processes or in persisted data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Position of the node in the arena.
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Opaque session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generate a fresh session id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SessionId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| format!("Invalid session id {}: {}", s, e))
    }
}

/// A bounded period of continuous activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Unique session identifier.
    pub id: SessionId,
    /// When the first activity of the session happened.
    pub started_at: DateTime<Utc>,
}

impl Session {
    /// Start a new session at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            id: SessionId::new(),
            started_at: now,
        }
    }
}

/// Why a node was attached to its parent.
///
/// Computed once when the node is created and never changed afterwards.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    /// No detectable relationship, or no previous item.
    #[default]
    Manual,
    /// One item cites the other. Only ever supplied explicitly by the host.
    Citation,
    /// The items share an author.
    Author,
    /// The items share a tag.
    Tag,
    /// The items live in a common collection.
    Collection,
    /// The previous item lists the new one as related.
    Related,
    /// Nothing in common beyond being viewed one after the other.
    Temporal,
    /// Opened from a reader tab.
    Tab,
}

impl Relation {
    /// All relation kinds in declaration order.
    pub const ALL: [Relation; 8] = [
        Relation::Manual,
        Relation::Citation,
        Relation::Author,
        Relation::Tag,
        Relation::Collection,
        Relation::Related,
        Relation::Temporal,
        Relation::Tab,
    ];

    /// Get the relation name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::Manual => "manual",
            Relation::Citation => "citation",
            Relation::Author => "author",
            Relation::Tag => "tag",
            Relation::Collection => "collection",
            Relation::Related => "related",
            Relation::Temporal => "temporal",
            Relation::Tab => "tab",
        }
    }

    /// Human-readable label for renderers.
    pub fn label(&self) -> &'static str {
        match self {
            Relation::Manual => "Manual navigation",
            Relation::Citation => "Citation",
            Relation::Author => "Same author",
            Relation::Tag => "Common tags",
            Relation::Collection => "Same collection",
            Relation::Related => "Related item",
            Relation::Temporal => "Time-based",
            Relation::Tab => "Tab navigation",
        }
    }
}

impl std::fmt::Display for Relation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Relation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "manual" => Ok(Relation::Manual),
            "citation" => Ok(Relation::Citation),
            "author" => Ok(Relation::Author),
            "tag" => Ok(Relation::Tag),
            "collection" => Ok(Relation::Collection),
            "related" => Ok(Relation::Related),
            "temporal" => Ok(Relation::Temporal),
            "tab" => Ok(Relation::Tab),
            _ => Err(format!("Unknown relation: {}", s)),
        }
    }
}

/// An author or editor of an item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Creator {
    /// Given name.
    #[serde(default)]
    pub first_name: String,
    /// Family name.
    #[serde(default)]
    pub last_name: String,
}

impl Creator {
    /// Create a creator from first and last name.
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
        }
    }

    /// "First Last", trimmed.
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    /// True when neither name is set.
    pub fn is_blank(&self) -> bool {
        self.first_name.trim().is_empty() && self.last_name.trim().is_empty()
    }
}

/// Item data as delivered by the host with each event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemDescriptor {
    /// Host item id. Events for items without an id are ignored.
    #[serde(default)]
    pub id: Option<ItemId>,
    /// Host item key, referenced by other items' related lists.
    #[serde(default)]
    pub key: String,
    /// Item title.
    #[serde(default)]
    pub title: String,
    /// Host item type (e.g. "journalArticle", "note", "attachment").
    #[serde(default)]
    pub item_type: String,
    /// Authors and editors.
    #[serde(default)]
    pub creators: Vec<Creator>,
    /// Publication year.
    #[serde(default)]
    pub year: Option<String>,
    /// DOI, if any.
    #[serde(default)]
    pub doi: Option<String>,
    /// Tag names.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Ids of the collections containing the item.
    #[serde(default)]
    pub collections: Vec<i64>,
    /// Keys of items marked as related to this one.
    #[serde(default)]
    pub related_item_keys: Vec<String>,
}

impl ItemDescriptor {
    /// Create a descriptor with an id and a title.
    pub fn new(id: ItemId, title: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            title: title.into(),
            ..Default::default()
        }
    }

    /// Set the item key
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Set the item type
    pub fn with_type(mut self, item_type: impl Into<String>) -> Self {
        self.item_type = item_type.into();
        self
    }

    /// Add a creator
    pub fn with_creator(mut self, first_name: &str, last_name: &str) -> Self {
        self.creators.push(Creator::new(first_name, last_name));
        self
    }

    /// Set the year
    pub fn with_year(mut self, year: impl Into<String>) -> Self {
        self.year = Some(year.into());
        self
    }

    /// Set the DOI
    pub fn with_doi(mut self, doi: impl Into<String>) -> Self {
        self.doi = Some(doi.into());
        self
    }

    /// Add tags
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Add collection ids
    pub fn with_collections(mut self, collections: impl IntoIterator<Item = i64>) -> Self {
        self.collections.extend(collections);
        self
    }

    /// Add related item keys
    pub fn with_related<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.related_item_keys
            .extend(keys.into_iter().map(Into::into));
        self
    }

    /// Notes and attachments are not tracked on plain item selection.
    pub fn is_trackable(&self) -> bool {
        !matches!(self.item_type.as_str(), "note" | "attachment")
    }

    /// Comma-separated "First Last" list of the item's creators.
    pub fn creator_summary(&self) -> String {
        self.creators
            .iter()
            .filter(|c| !c.is_blank())
            .map(Creator::display_name)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// One visit to a library item within the history tree.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryNode {
    /// Stable identifier used outside the arena.
    pub key: Uuid,
    /// The visited item.
    pub item_id: ItemId,
    /// Parent node, `None` for roots.
    pub parent: Option<NodeId>,
    /// Children in visit order.
    pub children: Vec<NodeId>,
    /// Distance from the root (roots are 0).
    pub depth: u32,
    /// When the node was created.
    pub created_at: DateTime<Utc>,
    /// Most recent visit.
    pub last_visit: DateTime<Utc>,
    /// Number of immediate visits folded into this node (>= 1).
    pub visit_count: u32,
    /// Relation to the parent, frozen at creation.
    pub relation: Relation,
    /// Session the node was created in.
    pub session_id: SessionId,
    /// Reader tab currently showing this node, if any.
    pub tab_id: Option<String>,
    /// When the node's tab was closed.
    pub closed_at: Option<DateTime<Utc>>,
    /// Item title at creation time.
    pub title: String,
    /// Creator summary at creation time.
    pub creators: String,
    /// Publication year at creation time.
    pub year: String,
    /// Item type at creation time.
    pub item_type: String,
    /// Item key at creation time.
    pub item_key: String,
    /// DOI at creation time.
    pub doi: String,
    /// Tags at creation time.
    pub tags: Vec<String>,
    /// Free-form user note.
    pub notes: String,
    /// User importance rating, 0-5.
    pub importance: u8,
}

/// Highest importance rating a node can carry.
pub const MAX_IMPORTANCE: u8 = 5;

/// Persisted and exported form of a [`HistoryNode`].
///
/// Parent links are expressed by key so records can be reloaded into a
/// fresh arena in any process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Stable node key.
    pub id: Uuid,
    /// The visited item.
    pub item_id: ItemId,
    /// Parent node key.
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    /// Session the node belongs to.
    pub session_id: SessionId,
    /// When the node was created.
    pub created_at: DateTime<Utc>,
    /// Most recent visit.
    pub last_visit: DateTime<Utc>,
    /// Visit count.
    #[serde(default = "default_visit_count")]
    pub visit_count: u32,
    /// Relation to the parent.
    #[serde(default)]
    pub relation: Relation,
    /// Depth at the time the record was written.
    #[serde(default)]
    pub depth: u32,
    /// Cached title.
    #[serde(default)]
    pub title: String,
    /// Cached creator summary.
    #[serde(default)]
    pub creators: String,
    /// Cached year.
    #[serde(default)]
    pub year: String,
    /// Cached item type.
    #[serde(default)]
    pub item_type: String,
    /// Cached item key.
    #[serde(default)]
    pub item_key: String,
    /// Cached DOI.
    #[serde(default)]
    pub doi: String,
    /// Cached tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// User note.
    #[serde(default)]
    pub notes: String,
    /// User importance rating.
    #[serde(default)]
    pub importance: u8,
    /// When the node's tab was closed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
}

fn default_visit_count() -> u32 {
    1
}
