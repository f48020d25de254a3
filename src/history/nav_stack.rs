use super::NodeId;

/// Browser-style back/forward list.
///
/// Independent of the tree shape: it records the order in which nodes were
/// made active. Pushing while the cursor is behind the end discards the
/// forward entries. The oldest entries are dropped past `limit`.
#[derive(Debug, Clone)]
pub struct NavigationStack {
    entries: Vec<NodeId>,
    cursor: Option<usize>,
    limit: usize,
}

impl NavigationStack {
    /// Create an empty stack holding at most `limit` entries.
    pub fn new(limit: usize) -> Self {
        Self {
            entries: Vec::new(),
            cursor: None,
            limit: limit.max(1),
        }
    }

    /// Push `node` after the cursor, dropping any forward entries.
    pub fn push(&mut self, node: NodeId) {
        if let Some(cursor) = self.cursor {
            self.entries.truncate(cursor + 1);
        }
        self.entries.push(node);
        if self.entries.len() > self.limit {
            let overflow = self.entries.len() - self.limit;
            self.entries.drain(..overflow);
        }
        self.cursor = Some(self.entries.len() - 1);
    }

    /// Step back. `None` at the start of the list.
    pub fn back(&mut self) -> Option<NodeId> {
        match self.cursor {
            Some(cursor) if cursor > 0 => {
                self.cursor = Some(cursor - 1);
                Some(self.entries[cursor - 1])
            }
            _ => None,
        }
    }

    /// Step forward. `None` at the end of the list.
    pub fn forward(&mut self) -> Option<NodeId> {
        match self.cursor {
            Some(cursor) if cursor + 1 < self.entries.len() => {
                self.cursor = Some(cursor + 1);
                Some(self.entries[cursor + 1])
            }
            _ => None,
        }
    }

    /// Entry under the cursor.
    pub fn current(&self) -> Option<NodeId> {
        self.cursor.map(|c| self.entries[c])
    }

    /// Whether [`back`](Self::back) would move.
    pub fn can_go_back(&self) -> bool {
        matches!(self.cursor, Some(c) if c > 0)
    }

    /// Whether [`forward`](Self::forward) would move.
    pub fn can_go_forward(&self) -> bool {
        matches!(self.cursor, Some(c) if c + 1 < self.entries.len())
    }

    /// Cursor position, `None` when empty.
    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    /// Entries from oldest to newest.
    pub fn entries(&self) -> &[NodeId] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing has been pushed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn n(i: usize) -> NodeId {
        NodeId(i)
    }

    #[test]
    fn test_empty_stack() {
        let mut stack = NavigationStack::new(10);
        assert!(stack.is_empty());
        assert_eq!(stack.cursor(), None);
        assert_eq!(stack.back(), None);
        assert_eq!(stack.forward(), None);
        assert_eq!(stack.current(), None);
    }

    #[test]
    fn test_back_and_forward() {
        let mut stack = NavigationStack::new(10);
        stack.push(n(0));
        stack.push(n(1));
        stack.push(n(2));

        assert_eq!(stack.back(), Some(n(1)));
        assert_eq!(stack.back(), Some(n(0)));
        assert_eq!(stack.back(), None);
        assert_eq!(stack.current(), Some(n(0)));
        assert_eq!(stack.forward(), Some(n(1)));
        assert_eq!(stack.forward(), Some(n(2)));
        assert_eq!(stack.forward(), None);
    }

    #[test]
    fn test_push_truncates_forward_entries() {
        let mut stack = NavigationStack::new(10);
        stack.push(n(0));
        stack.push(n(1));
        stack.push(n(2));
        stack.back();
        stack.push(n(3));

        assert_eq!(stack.entries(), &[n(0), n(1), n(3)]);
        assert_eq!(stack.current(), Some(n(3)));
        assert!(!stack.can_go_forward());
    }

    #[test]
    fn test_limit_drops_oldest() {
        let mut stack = NavigationStack::new(3);
        for i in 0..5 {
            stack.push(n(i));
        }
        assert_eq!(stack.entries(), &[n(2), n(3), n(4)]);
        assert_eq!(stack.cursor(), Some(2));
        assert_eq!(stack.back(), Some(n(3)));
    }

    #[test]
    fn test_can_go_flags() {
        let mut stack = NavigationStack::new(10);
        stack.push(n(0));
        assert!(!stack.can_go_back());
        stack.push(n(1));
        assert!(stack.can_go_back());
        stack.back();
        assert!(stack.can_go_forward());
    }
}
