use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::NaiveDate;
use serde::Serialize;

use super::{HistoryTree, ItemId, Relation};

/// Aggregate figures over the whole history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryStats {
    /// Number of nodes.
    pub total_nodes: usize,
    /// Number of sessions that own at least one node.
    pub total_sessions: usize,
    /// Sum of all visit counts.
    pub total_visits: u64,
    /// Distinct items visited.
    pub unique_items: usize,
    /// Nodes with a note or a non-zero rating.
    pub annotated_nodes: usize,
    /// Deepest node.
    pub max_depth: u32,
    /// Node count per relation.
    pub relations: BTreeMap<Relation, usize>,
    /// Most visited items.
    pub top_items: Vec<ItemVisits>,
    /// Nodes created per UTC day, oldest first.
    pub daily_activity: Vec<DailyActivity>,
    /// Tag usage across nodes, most used first.
    pub tags: Vec<TagCount>,
}

/// Visit total for one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemVisits {
    /// The item.
    pub item_id: ItemId,
    /// Title of its most recent node.
    pub title: String,
    /// Summed visit count.
    pub visits: u64,
}

/// Activity on one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyActivity {
    /// Calendar day (UTC).
    pub date: NaiveDate,
    /// Nodes created that day.
    pub nodes: usize,
}

/// Usage count of one tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagCount {
    /// Tag name.
    pub tag: String,
    /// Nodes carrying it.
    pub count: usize,
}

/// Compute statistics, keeping the `top` most visited items.
pub fn compute_stats(tree: &HistoryTree, top: usize) -> HistoryStats {
    let mut sessions = HashSet::new();
    let mut relations = BTreeMap::new();
    let mut items: HashMap<ItemId, ItemVisits> = HashMap::new();
    let mut days: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    let mut tags: HashMap<&str, usize> = HashMap::new();
    let mut total_visits = 0u64;
    let mut annotated_nodes = 0;
    let mut max_depth = 0;

    for (_, node) in tree.nodes() {
        sessions.insert(node.session_id);
        *relations.entry(node.relation).or_insert(0) += 1;
        total_visits += u64::from(node.visit_count);
        max_depth = max_depth.max(node.depth);
        if !node.notes.is_empty() || node.importance > 0 {
            annotated_nodes += 1;
        }

        let entry = items.entry(node.item_id).or_insert_with(|| ItemVisits {
            item_id: node.item_id,
            title: String::new(),
            visits: 0,
        });
        entry.visits += u64::from(node.visit_count);
        entry.title = node.title.clone();

        *days.entry(node.created_at.date_naive()).or_insert(0) += 1;
        for tag in &node.tags {
            *tags.entry(tag.as_str()).or_insert(0) += 1;
        }
    }

    let unique_items = items.len();
    let mut top_items: Vec<ItemVisits> = items.into_values().collect();
    top_items.sort_by(|a, b| b.visits.cmp(&a.visits).then(a.item_id.cmp(&b.item_id)));
    top_items.truncate(top);

    let mut tags: Vec<TagCount> = tags
        .into_iter()
        .map(|(tag, count)| TagCount {
            tag: tag.to_string(),
            count,
        })
        .collect();
    tags.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.tag.cmp(&b.tag)));

    HistoryStats {
        total_nodes: tree.len(),
        total_sessions: sessions.len(),
        total_visits,
        unique_items,
        annotated_nodes,
        max_depth,
        relations,
        top_items,
        daily_activity: days
            .into_iter()
            .map(|(date, nodes)| DailyActivity { date, nodes })
            .collect(),
        tags,
    }
}
