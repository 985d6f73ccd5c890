use std::collections::HashMap;

use super::{ConstraintManager, PickCache};

/// Reservations keyed by `(time, vertex)`, suited to blocking whole committed
/// tours of other agents.
#[derive(Debug, Clone, Default)]
pub struct ConstraintManagerDense {
    reservations: HashMap<(usize, usize), Option<usize>>,
    latest: Option<usize>,
    cache: Option<PickCache>,
}

impl ConstraintManagerDense {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConstraintManager for ConstraintManagerDense {
    fn is_constrained(&self, vertex: usize, time: usize, predecessor: Option<usize>) -> bool {
        if self.reservations.contains_key(&(time, vertex)) {
            return true;
        }
        // Swapping conflict
        predecessor.is_some_and(|p| self.reservations.get(&(time, p)) == Some(&Some(vertex)))
    }

    fn is_constrained_pick(&self, vertex: usize, time: usize, duration: usize) -> bool {
        if let Some(hit) = self
            .cache
            .as_ref()
            .and_then(|cache| cache.lookup(vertex, time, duration))
        {
            return hit;
        }
        (time + 1..=time + duration).any(|t| self.reservations.contains_key(&(t, vertex)))
    }

    fn add_constraint(&mut self, vertex: usize, time: usize, predecessor: Option<usize>) {
        self.cache = None;
        self.reservations.entry((time, vertex)).or_insert(predecessor);
        self.latest = self.latest.max(Some(time));
    }

    fn clear(&mut self) {
        self.reservations.clear();
        self.latest = None;
        self.cache = None;
    }

    fn count(&self) -> usize {
        self.reservations.len()
    }

    fn latest_time(&self) -> Option<usize> {
        self.latest
    }

    fn cache_pick_constraints(&mut self, vertices: &[usize], pick_times: &[usize], max_time: usize) {
        let cache = PickCache::build(vertices, pick_times, max_time, |v, t| {
            self.reservations.contains_key(&(t, v))
        });
        self.cache = Some(cache);
    }
}
