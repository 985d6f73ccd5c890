mod highlevel;
mod lowlevel;
mod tour;

pub use highlevel::{Conflict, ConflictType, Constraint};
pub(crate) use highlevel::{CbsNode, CbsTree, NodeState};
pub(crate) use lowlevel::{NodePool, OpenEntry};
pub use tour::{agent_duration, agent_track, makespan, sum_of_costs, Tour, TourIter};

use serde::Serialize;

use crate::error::PlanError;

/// One vertex per timestep.
pub type Path = Vec<usize>;

/// A candidate pick location of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PickItem {
    pub vertex: usize,
    pub class: usize,
    pub pick_time: usize,
}

/// Visit one item of every class between `start` and `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderInstance {
    pub id: usize,
    pub start: usize,
    pub target: usize,
    pub items: Vec<PickItem>,
    classes: usize,
}

impl OrderInstance {
    /// Item classes must be numbered `0..C` with every class non-empty.
    pub fn new(
        id: usize,
        start: usize,
        target: usize,
        items: Vec<PickItem>,
    ) -> Result<Self, PlanError> {
        let classes = items.iter().map(|item| item.class + 1).max().unwrap_or(0);
        let mut seen = vec![false; classes];
        for item in &items {
            seen[item.class] = true;
        }
        if let Some(missing) = seen.iter().position(|&present| !present) {
            return Err(PlanError::InvalidInstance(format!(
                "order {id} has no candidate item for class {missing}"
            )));
        }
        if let Some(item) = items.iter().find(|item| item.pick_time == 0) {
            return Err(PlanError::InvalidInstance(format!(
                "order {id}: item at vertex {} has no pick time",
                item.vertex
            )));
        }
        Ok(OrderInstance {
            id,
            start,
            target,
            items,
            classes,
        })
    }

    pub fn classes(&self) -> usize {
        self.classes
    }

    /// Start, target and every candidate pick vertex.
    pub fn vertices(&self) -> impl Iterator<Item = usize> + '_ {
        [self.start, self.target]
            .into_iter()
            .chain(self.items.iter().map(|item| item.vertex))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Agent {
    pub id: usize,
    pub orders: Vec<OrderInstance>,
}

impl Agent {
    pub fn new(id: usize, orders: Vec<OrderInstance>) -> Result<Self, PlanError> {
        if orders.is_empty() {
            return Err(PlanError::InvalidInstance(format!(
                "agent {id} has no orders"
            )));
        }
        for pair in orders.windows(2) {
            if pair[0].target != pair[1].start {
                return Err(PlanError::InvalidInstance(format!(
                    "agent {id}: order {} ends at vertex {} but order {} starts at vertex {}",
                    pair[0].id, pair[0].target, pair[1].id, pair[1].start
                )));
            }
        }
        Ok(Agent { id, orders })
    }
}
