use std::collections::{HashMap, HashSet};

use serde::Serialize;
use uuid::Uuid;

use super::{HistoryTree, ItemId, NodeId};

const AUTHOR_SCORE: f64 = 0.8;
const TAG_BASE_SCORE: f64 = 0.6;
const TAG_STEP_SCORE: f64 = 0.1;

/// A previously visited item worth revisiting from the current node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    /// Key of the most relevant node for the item.
    pub node_id: Uuid,
    /// Recommended item.
    pub item_id: ItemId,
    /// Cached title.
    pub title: String,
    /// Why it was picked.
    pub reason: String,
    /// Relevance, higher is better.
    pub score: f64,
}

/// Recommend up to `limit` items related to `node` through co-authors or
/// shared tags.
///
/// Co-authorship is learned from every node in the tree. Each item appears
/// once, with its best score; `node`'s own item is never recommended.
pub fn recommend(tree: &HistoryTree, node: NodeId, limit: usize) -> Vec<Recommendation> {
    let Some(current) = tree.node(node) else {
        return Vec::new();
    };

    let mut collaborations: HashMap<&str, HashSet<&str>> = HashMap::new();
    for (_, other) in tree.nodes() {
        let authors = split_authors(&other.creators);
        for author in &authors {
            let peers = collaborations.entry(author).or_default();
            peers.extend(authors.iter().filter(|a| *a != author));
        }
    }

    let related_authors: HashSet<&str> = split_authors(&current.creators)
        .into_iter()
        .filter_map(|author| collaborations.get(author))
        .flatten()
        .copied()
        .collect();
    let current_tags: HashSet<&str> = current.tags.iter().map(String::as_str).collect();

    let mut best: HashMap<ItemId, (NodeId, Recommendation)> = HashMap::new();
    for (id, other) in tree.nodes() {
        if other.item_id == current.item_id {
            continue;
        }

        let mut candidates = Vec::new();
        if split_authors(&other.creators)
            .iter()
            .any(|a| related_authors.contains(a))
        {
            candidates.push((AUTHOR_SCORE, "Related author".to_string()));
        }

        let shared: Vec<&str> = other
            .tags
            .iter()
            .map(String::as_str)
            .filter(|t| current_tags.contains(t))
            .collect();
        if !shared.is_empty() {
            candidates.push((
                TAG_BASE_SCORE + TAG_STEP_SCORE * shared.len() as f64,
                format!("Common tags: {}", shared.join(", ")),
            ));
        }

        for (score, reason) in candidates {
            let better = best
                .get(&other.item_id)
                .map_or(true, |(_, existing)| score > existing.score);
            if better {
                best.insert(
                    other.item_id,
                    (
                        id,
                        Recommendation {
                            node_id: other.key,
                            item_id: other.item_id,
                            title: other.title.clone(),
                            reason,
                            score,
                        },
                    ),
                );
            }
        }
    }

    let mut ranked: Vec<(NodeId, Recommendation)> = best.into_values().collect();
    ranked.sort_by(|a, b| b.1.score.total_cmp(&a.1.score).then(a.0.cmp(&b.0)));
    ranked.truncate(limit);
    ranked.into_iter().map(|(_, rec)| rec).collect()
}

fn split_authors(creators: &str) -> Vec<&str> {
    creators
        .split(',')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NavigatorConfig;
    use crate::history::ItemDescriptor;
    use chrono::{TimeZone, Utc};

    fn build(items: &[ItemDescriptor]) -> (HistoryTree, Vec<NodeId>) {
        let mut tree = HistoryTree::new(NavigatorConfig::default());
        let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
        let ids = items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| {
                tree.visit(Some(item), t0 + chrono::Duration::seconds(i as i64 * 60), None, None)
                    .map(|o| o.node)
            })
            .collect();
        (tree, ids)
    }

    #[test]
    fn test_recommends_items_by_co_author() {
        let (tree, ids) = build(&[
            ItemDescriptor::new(1, "Paper A")
                .with_creator("Ada", "Lovelace")
                .with_creator("Charles", "Babbage"),
            ItemDescriptor::new(2, "Paper B").with_creator("Charles", "Babbage"),
            ItemDescriptor::new(3, "Paper C").with_creator("Someone", "Else"),
        ]);

        let recs = recommend(&tree, ids[1], 5);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].item_id, 1);
        assert_eq!(recs[0].reason, "Related author");
        assert!((recs[0].score - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn test_recommends_items_by_shared_tags() {
        let (tree, ids) = build(&[
            ItemDescriptor::new(1, "A").with_tags(["soil", "carbon", "climate"]),
            ItemDescriptor::new(2, "B").with_tags(["soil"]),
            ItemDescriptor::new(3, "C").with_tags(["soil", "carbon", "climate"]),
        ]);

        let recs = recommend(&tree, ids[0], 5);
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].item_id, 3);
        assert!((recs[0].score - 0.9).abs() < 1e-9);
        assert_eq!(recs[0].reason, "Common tags: soil, carbon, climate");
        assert_eq!(recs[1].item_id, 2);
    }

    #[test]
    fn test_one_entry_per_item_and_excludes_current_item() {
        let (tree, ids) = build(&[
            ItemDescriptor::new(1, "A").with_tags(["x"]),
            ItemDescriptor::new(2, "B").with_tags(["x"]),
            ItemDescriptor::new(1, "A").with_tags(["x"]),
            ItemDescriptor::new(2, "B").with_tags(["x"]),
        ]);

        let recs = recommend(&tree, ids[0], 5);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].item_id, 2);
    }

    #[test]
    fn test_limit() {
        let items: Vec<ItemDescriptor> = (1..=10)
            .map(|i| ItemDescriptor::new(i, format!("T{}", i)).with_tags(["shared"]))
            .collect();
        let (tree, ids) = build(&items);
        assert_eq!(recommend(&tree, ids[0], 3).len(), 3);
    }

    #[test]
    fn test_no_signal_no_recommendations() {
        let (tree, ids) = build(&[ItemDescriptor::new(1, "A"), ItemDescriptor::new(2, "B")]);
        assert!(recommend(&tree, ids[0], 5).is_empty());
    }
}
