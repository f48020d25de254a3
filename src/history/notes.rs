use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ItemId, SessionId};

/// How a library note relates to the history node it is linked to.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum NoteLinkKind {
    /// Written while the node was being read.
    #[default]
    CreatedDuring,
    /// Prompted by the node.
    InspiredBy,
    /// Summarizes the node's item.
    Summarizes,
    /// Raises questions about the node's item.
    Questions,
    /// Linked by hand.
    Manual,
}

impl NoteLinkKind {
    /// Every kind, in declaration order.
    pub const ALL: [NoteLinkKind; 5] = [
        NoteLinkKind::CreatedDuring,
        NoteLinkKind::InspiredBy,
        NoteLinkKind::Summarizes,
        NoteLinkKind::Questions,
        NoteLinkKind::Manual,
    ];

    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            NoteLinkKind::CreatedDuring => "created_during",
            NoteLinkKind::InspiredBy => "inspired_by",
            NoteLinkKind::Summarizes => "summarizes",
            NoteLinkKind::Questions => "questions",
            NoteLinkKind::Manual => "manual",
        }
    }
}

impl fmt::Display for NoteLinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NoteLinkKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NoteLinkKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("Unknown note link kind: {}", s))
    }
}

/// A link between a host note and a history node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteLink {
    /// Host note id.
    pub note_id: ItemId,
    /// Linked node key.
    pub node_id: Uuid,
    /// Link kind.
    #[serde(default)]
    pub kind: NoteLinkKind,
    /// When the link was made or last changed kind.
    pub created_at: DateTime<Utc>,
    /// Session active when the link was made.
    pub session_id: SessionId,
}

/// Aggregate view over all note links.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoteLinkStats {
    /// Number of links.
    pub total: usize,
    /// Links per kind; every kind is present.
    pub by_kind: BTreeMap<NoteLinkKind, usize>,
    /// Most recent links first.
    pub recent: Vec<NoteLink>,
}

/// Note links keyed by `(note, node)`, at most one per pair.
#[derive(Debug, Clone, Default)]
pub struct NoteLinks {
    links: HashMap<(ItemId, Uuid), NoteLink>,
}

impl NoteLinks {
    /// Insert `link`, replacing the kind of an existing pair.
    ///
    /// Returns false when the pair already had the same kind; the stored
    /// link is left untouched then.
    pub fn upsert(&mut self, link: NoteLink) -> bool {
        match self.links.get(&(link.note_id, link.node_id)) {
            Some(existing) if existing.kind == link.kind => false,
            _ => {
                self.links.insert((link.note_id, link.node_id), link);
                true
            }
        }
    }

    /// Remove the link between `note_id` and `node_id`.
    pub fn remove(&mut self, note_id: ItemId, node_id: &Uuid) -> Option<NoteLink> {
        self.links.remove(&(note_id, *node_id))
    }

    /// Link for one pair.
    pub fn get(&self, note_id: ItemId, node_id: &Uuid) -> Option<&NoteLink> {
        self.links.get(&(note_id, *node_id))
    }

    /// Links of a node, oldest first.
    pub fn for_node(&self, node_id: &Uuid) -> Vec<NoteLink> {
        self.collect(|link| link.node_id == *node_id)
    }

    /// Links of a note, oldest first.
    pub fn for_note(&self, note_id: ItemId) -> Vec<NoteLink> {
        self.collect(|link| link.note_id == note_id)
    }

    /// Every link, oldest first.
    pub fn all(&self) -> Vec<NoteLink> {
        self.collect(|_| true)
    }

    /// Number of links.
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// True when there are no links.
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Totals per kind and the `recent` most recent links.
    pub fn stats(&self, recent: usize) -> NoteLinkStats {
        let mut by_kind: BTreeMap<NoteLinkKind, usize> =
            NoteLinkKind::ALL.into_iter().map(|k| (k, 0)).collect();
        for link in self.links.values() {
            *by_kind.entry(link.kind).or_insert(0) += 1;
        }

        let mut latest = self.all();
        latest.reverse();
        latest.truncate(recent);

        NoteLinkStats {
            total: self.links.len(),
            by_kind,
            recent: latest,
        }
    }

    fn collect(&self, keep: impl Fn(&NoteLink) -> bool) -> Vec<NoteLink> {
        let mut out: Vec<NoteLink> = self.links.values().filter(|l| keep(l)).cloned().collect();
        out.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then(a.note_id.cmp(&b.note_id))
                .then(a.node_id.cmp(&b.node_id))
        });
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn link(note_id: ItemId, node_id: Uuid, secs: i64, kind: NoteLinkKind) -> NoteLink {
        NoteLink {
            note_id,
            node_id,
            kind,
            created_at: Utc.with_ymd_and_hms(2024, 7, 1, 9, 0, 0).unwrap()
                + chrono::Duration::seconds(secs),
            session_id: SessionId::new(),
        }
    }

    #[test]
    fn test_kind_round_trips_through_str() {
        for kind in NoteLinkKind::ALL {
            assert_eq!(kind.as_str().parse::<NoteLinkKind>().unwrap(), kind);
        }
        assert!("bogus".parse::<NoteLinkKind>().is_err());
        assert_eq!(
            serde_json::to_value(NoteLinkKind::InspiredBy).unwrap(),
            serde_json::json!("inspired_by")
        );
    }

    #[test]
    fn test_upsert_is_one_link_per_pair() {
        let node = Uuid::new_v4();
        let mut links = NoteLinks::default();

        let first = link(1, node, 0, NoteLinkKind::CreatedDuring);
        assert!(links.upsert(first.clone()));
        assert!(!links.upsert(link(1, node, 5, NoteLinkKind::CreatedDuring)));
        assert_eq!(links.get(1, &node), Some(&first));

        assert!(links.upsert(link(1, node, 10, NoteLinkKind::Summarizes)));
        assert_eq!(links.len(), 1);
        assert_eq!(links.get(1, &node).unwrap().kind, NoteLinkKind::Summarizes);
    }

    #[test]
    fn test_lookup_by_node_and_note() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut links = NoteLinks::default();
        links.upsert(link(1, a, 0, NoteLinkKind::Manual));
        links.upsert(link(2, a, 1, NoteLinkKind::Questions));
        links.upsert(link(1, b, 2, NoteLinkKind::Manual));

        let on_a: Vec<ItemId> = links.for_node(&a).iter().map(|l| l.note_id).collect();
        assert_eq!(on_a, vec![1, 2]);
        let of_note: Vec<Uuid> = links.for_note(1).iter().map(|l| l.node_id).collect();
        assert_eq!(of_note, vec![a, b]);

        assert!(links.remove(1, &a).is_some());
        assert!(links.remove(1, &a).is_none());
        assert_eq!(links.for_node(&a).len(), 1);
    }

    #[test]
    fn test_stats_count_every_kind() {
        let mut links = NoteLinks::default();
        links.upsert(link(1, Uuid::new_v4(), 0, NoteLinkKind::Manual));
        links.upsert(link(2, Uuid::new_v4(), 1, NoteLinkKind::Manual));
        links.upsert(link(3, Uuid::new_v4(), 2, NoteLinkKind::InspiredBy));

        let stats = links.stats(2);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.by_kind.len(), NoteLinkKind::ALL.len());
        assert_eq!(stats.by_kind[&NoteLinkKind::Manual], 2);
        assert_eq!(stats.by_kind[&NoteLinkKind::Summarizes], 0);
        let recent: Vec<ItemId> = stats.recent.iter().map(|l| l.note_id).collect();
        assert_eq!(recent, vec![3, 2]);
    }
}
