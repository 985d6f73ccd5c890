use std::rc::Rc;

use serde::Serialize;

use super::Tour;

/// Forbids `agent` from occupying `vertex` at `time`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Constraint {
    pub agent: usize,
    pub time: usize,
    pub vertex: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConflictType {
    Vertex {
        vertex: usize,
        time: usize,
    },
    // agent_1 moves from -> to while agent_2 moves to -> from, between time and time + 1.
    Edge {
        from: usize,
        to: usize,
        time: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Conflict {
    pub agent_1: usize,
    pub agent_2: usize,
    pub conflict_type: ConflictType,
}

impl Conflict {
    pub fn time(&self) -> usize {
        match self.conflict_type {
            ConflictType::Vertex { time, .. } | ConflictType::Edge { time, .. } => time,
        }
    }

    /// Constraint sets of the two CBS children: the first forbids `agent_1`,
    /// the second `agent_2`.
    pub fn make_constraints(&self) -> (Vec<Constraint>, Vec<Constraint>) {
        let forbid = |agent: usize| -> Vec<Constraint> {
            match self.conflict_type {
                ConflictType::Vertex { vertex, time } => vec![Constraint {
                    agent,
                    time,
                    vertex,
                }],
                ConflictType::Edge { from, to, time } => vec![
                    Constraint {
                        agent,
                        time: time + 1,
                        vertex: from,
                    },
                    Constraint {
                        agent,
                        time: time + 1,
                        vertex: to,
                    },
                ],
            }
        };
        (forbid(self.agent_1), forbid(self.agent_2))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeState {
    Ready,
    Expanded,
    Goal,
}

/// One node of the constraint tree.
///
/// Only the constraints added by this node are stored, the full set of an
/// agent is gathered along the parent chain. Per-agent tour arrays are shared
/// with the parent, except for the replanned agent.
#[derive(Debug, Clone)]
pub(crate) struct CbsNode {
    pub(crate) id: usize,
    pub(crate) parent: Option<usize>,
    pub(crate) new_constraints: Vec<Constraint>,
    pub(crate) solution: Vec<Rc<Vec<Tour>>>,
    pub(crate) cost: usize,
    pub(crate) constraint_count: usize,
    pub(crate) state: NodeState,
}

impl CbsNode {
    /// Open list key: total tour length first, constraint count breaks ties.
    pub(crate) fn key(&self) -> (usize, usize, usize) {
        (self.cost, self.constraint_count, self.id)
    }

    pub(crate) fn tours(&self) -> Vec<Vec<Tour>> {
        self.solution.iter().map(|tours| tours.to_vec()).collect()
    }
}

/// Arena of constraint tree nodes referenced by index.
#[derive(Debug, Default)]
pub(crate) struct CbsTree {
    nodes: Vec<CbsNode>,
}

impl CbsTree {
    pub(crate) fn push(&mut self, mut node: CbsNode) -> usize {
        node.id = self.nodes.len();
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn get(&self, id: usize) -> &CbsNode {
        &self.nodes[id]
    }

    pub(crate) fn set_state(&mut self, id: usize, state: NodeState) {
        self.nodes[id].state = state;
    }

    /// Every constraint of `agent` on the path from the root to `id`, root first.
    pub(crate) fn constraints_for(&self, id: usize, agent: usize) -> Vec<Constraint> {
        let mut constraints = Vec::new();
        let mut current = Some(id);
        while let Some(index) = current {
            let node = &self.nodes[index];
            constraints.extend(
                node.new_constraints
                    .iter()
                    .rev()
                    .filter(|constraint| constraint.agent == agent),
            );
            current = node.parent;
        }
        constraints.reverse();
        constraints
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(parent: Option<usize>, new_constraints: Vec<Constraint>) -> CbsNode {
        CbsNode {
            id: 0,
            parent,
            constraint_count: new_constraints.len(),
            new_constraints,
            solution: Vec::new(),
            cost: 0,
            state: NodeState::Ready,
        }
    }

    #[test]
    fn test_vertex_conflict_constraints() {
        let conflict = Conflict {
            agent_1: 0,
            agent_2: 3,
            conflict_type: ConflictType::Vertex { vertex: 7, time: 4 },
        };
        let (left, right) = conflict.make_constraints();
        assert_eq!(
            left,
            vec![Constraint {
                agent: 0,
                time: 4,
                vertex: 7
            }]
        );
        assert_eq!(
            right,
            vec![Constraint {
                agent: 3,
                time: 4,
                vertex: 7
            }]
        );
    }

    #[test]
    fn test_edge_conflict_constraints_cover_both_endpoints() {
        let conflict = Conflict {
            agent_1: 1,
            agent_2: 2,
            conflict_type: ConflictType::Edge {
                from: 5,
                to: 6,
                time: 2,
            },
        };
        let (left, right) = conflict.make_constraints();
        assert_eq!(left.len(), 2);
        assert!(left.iter().all(|c| c.agent == 1 && c.time == 3));
        assert!(right.iter().all(|c| c.agent == 2 && c.time == 3));
        assert!(left.iter().any(|c| c.vertex == 5));
        assert!(left.iter().any(|c| c.vertex == 6));
    }

    #[test]
    fn test_constraints_gathered_along_parent_chain() {
        let c = |agent, time, vertex| Constraint {
            agent,
            time,
            vertex,
        };
        let mut tree = CbsTree::default();
        let root = tree.push(node(None, Vec::new()));
        let left = tree.push(node(Some(root), vec![c(0, 2, 5)]));
        let deeper = tree.push(node(Some(left), vec![c(1, 3, 4)]));
        let deepest = tree.push(node(Some(deeper), vec![c(0, 6, 1), c(0, 6, 2)]));

        assert_eq!(
            tree.constraints_for(deepest, 0),
            vec![c(0, 2, 5), c(0, 6, 1), c(0, 6, 2)]
        );
        assert_eq!(tree.constraints_for(deepest, 1), vec![c(1, 3, 4)]);
        assert!(tree.constraints_for(root, 0).is_empty());
        assert_eq!(tree.get(deepest).parent, Some(deeper));
    }
}
