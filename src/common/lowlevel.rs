use std::cmp::Ordering;

use crate::error::PlanError;

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SearchNode {
    pub(crate) vertex: usize,
    pub(crate) elapsed: usize, // route time since the search began
    pub(crate) predecessor: Option<usize>,
}

// Open list entry, the node itself lives in the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct OpenEntry {
    pub(crate) f_cost: usize,
    pub(crate) g_cost: usize,
    pub(crate) vertex: usize,
    pub(crate) node: usize,
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.f_cost
            .cmp(&other.f_cost)
            // Higher g cost (time) has higher priority
            .then_with(|| other.g_cost.cmp(&self.g_cost))
            .then_with(|| self.vertex.cmp(&other.vertex))
            .then_with(|| self.node.cmp(&other.node))
    }
}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Pre-allocated search node records handed out by a growing index.
///
/// Nodes are only referenced by index while a search is running; `reset`
/// makes the whole pool available again for the next search.
#[derive(Debug)]
pub(crate) struct NodePool {
    nodes: Vec<SearchNode>,
    next: usize,
    limit: usize,
}

impl NodePool {
    pub(crate) fn new(initial: usize, limit: usize) -> Self {
        NodePool {
            nodes: vec![SearchNode::default(); initial.min(limit)],
            next: 0,
            limit,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.next = 0;
    }

    pub(crate) fn in_use(&self) -> usize {
        self.next
    }

    pub(crate) fn allocate(
        &mut self,
        vertex: usize,
        elapsed: usize,
        predecessor: Option<usize>,
    ) -> Result<usize, PlanError> {
        if self.next == self.limit {
            return Err(PlanError::CapacityExceeded {
                what: "search nodes",
                limit: self.limit,
                actual: self.limit + 1,
            });
        }
        let node = SearchNode {
            vertex,
            elapsed,
            predecessor,
        };
        if self.next == self.nodes.len() {
            self.nodes.push(node);
        } else {
            self.nodes[self.next] = node;
        }
        self.next += 1;
        Ok(self.next - 1)
    }

    pub(crate) fn get(&self, index: usize) -> &SearchNode {
        debug_assert!(index < self.next);
        &self.nodes[index]
    }
}
