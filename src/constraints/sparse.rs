use std::collections::BTreeMap;

use super::{ConstraintManager, PickCache};

/// Time-bucketed reservations, suited to the handful of constraints of a
/// CBS branch.
#[derive(Debug, Clone, Default)]
pub struct ConstraintManagerSparse {
    reservations: BTreeMap<usize, Vec<(usize, Option<usize>)>>,
    count: usize,
    cache: Option<PickCache>,
}

impl ConstraintManagerSparse {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_reserved(&self, vertex: usize, time: usize) -> bool {
        self.reservations
            .get(&time)
            .is_some_and(|bucket| bucket.iter().any(|&(v, _)| v == vertex))
    }
}

impl ConstraintManager for ConstraintManagerSparse {
    fn is_constrained(&self, vertex: usize, time: usize, predecessor: Option<usize>) -> bool {
        let Some(bucket) = self.reservations.get(&time) else {
            return false;
        };
        bucket.iter().any(|&(v, from)| {
            v == vertex || (predecessor == Some(v) && from == Some(vertex))
        })
    }

    fn is_constrained_pick(&self, vertex: usize, time: usize, duration: usize) -> bool {
        if let Some(hit) = self
            .cache
            .as_ref()
            .and_then(|cache| cache.lookup(vertex, time, duration))
        {
            return hit;
        }
        duration > 0
            && self
                .reservations
                .range(time + 1..=time + duration)
                .any(|(_, bucket)| bucket.iter().any(|&(v, _)| v == vertex))
    }

    fn add_constraint(&mut self, vertex: usize, time: usize, predecessor: Option<usize>) {
        self.cache = None;
        let bucket = self.reservations.entry(time).or_default();
        if bucket.iter().all(|&(v, _)| v != vertex) {
            bucket.push((vertex, predecessor));
            self.count += 1;
        }
    }

    fn clear(&mut self) {
        self.reservations.clear();
        self.count = 0;
        self.cache = None;
    }

    fn count(&self) -> usize {
        self.count
    }

    fn latest_time(&self) -> Option<usize> {
        self.reservations.last_key_value().map(|(&time, _)| time)
    }

    fn cache_pick_constraints(&mut self, vertices: &[usize], pick_times: &[usize], max_time: usize) {
        let cache = PickCache::build(vertices, pick_times, max_time, |v, t| self.is_reserved(v, t));
        self.cache = Some(cache);
    }
}
