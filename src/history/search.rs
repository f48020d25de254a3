use std::collections::{HashMap, HashSet};

use super::{HistoryNode, NodeId};

/// Inverted word index over node titles, creators, tags and notes.
///
/// Words of two characters or fewer are not indexed.
#[derive(Debug, Clone, Default)]
pub struct SearchIndex {
    words: HashMap<String, HashSet<NodeId>>,
}

impl SearchIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Index the searchable fields of `node`.
    pub fn index_node(&mut self, id: NodeId, node: &HistoryNode) {
        self.index_text(id, &node.title);
        self.index_text(id, &node.creators);
        for tag in &node.tags {
            self.index_text(id, tag);
        }
        self.index_text(id, &node.notes);
    }

    /// Add every indexable word of `text` for `id`.
    pub fn index_text(&mut self, id: NodeId, text: &str) {
        for word in tokenize(text) {
            self.words.entry(word).or_default().insert(id);
        }
    }

    /// Forget every word indexed for `id`.
    pub fn remove_node(&mut self, id: NodeId) {
        self.words.retain(|_, ids| {
            ids.remove(&id);
            !ids.is_empty()
        });
    }

    /// Nodes matching any word of `query`, most matched words first.
    ///
    /// Ties keep creation order.
    pub fn search(&self, query: &str) -> Vec<NodeId> {
        let mut scores: HashMap<NodeId, usize> = HashMap::new();
        let words: HashSet<String> = tokenize(query).collect();
        for word in &words {
            if let Some(ids) = self.words.get(word) {
                for id in ids {
                    *scores.entry(*id).or_insert(0) += 1;
                }
            }
        }

        let mut ranked: Vec<(NodeId, usize)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.into_iter().map(|(id, _)| id).collect()
    }

    /// Number of distinct indexed words.
    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.words.clear();
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| w.chars().count() > 2)
}
