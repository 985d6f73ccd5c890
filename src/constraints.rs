mod dense;
mod dummy;
mod sparse;

pub use dense::ConstraintManagerDense;
pub use dummy::ConstraintManagerDummy;
pub use sparse::ConstraintManagerSparse;

use std::collections::HashMap;

use serde::Deserialize;

use crate::common::{Constraint, Tour};

/// Reservation table of one low-level solve.
///
/// A reservation `(vertex, time, predecessor)` forbids occupying `vertex` at
/// `time`. When the reserving agent arrived from `predecessor`, moving from
/// `vertex` to `predecessor` over the same step is forbidden too (a swap).
/// Only the first reservation of a `(vertex, time)` pair is kept.
pub trait ConstraintManager {
    fn is_constrained(&self, vertex: usize, time: usize, predecessor: Option<usize>) -> bool;

    /// Whether `vertex` is reserved at any of `time + 1 ..= time + duration`.
    fn is_constrained_pick(&self, vertex: usize, time: usize, duration: usize) -> bool;

    fn add_constraint(&mut self, vertex: usize, time: usize, predecessor: Option<usize>);

    /// Reserves an arrival at `time` followed by `duration` dwell steps.
    fn add_constraint_pick(&mut self, vertex: usize, time: usize, duration: usize) {
        for t in time..=time + duration {
            self.add_constraint(vertex, t, None);
        }
    }

    /// Reserves every vertex a tour occupies, with its predecessor.
    fn add_constraints(&mut self, tour: &Tour) {
        let mut predecessor = None;
        for (offset, vertex) in tour.iter().enumerate() {
            let from = predecessor.filter(|&p| p != vertex);
            self.add_constraint(vertex, tour.start_time + offset, from);
            predecessor = Some(vertex);
        }
    }

    /// Clears the table, then reserves every constraint of the list.
    fn init_constraints(&mut self, constraints: &[Constraint]) {
        self.clear();
        for constraint in constraints {
            self.add_constraint(constraint.vertex, constraint.time, None);
        }
    }

    fn clear(&mut self);

    /// Number of reserved `(vertex, time)` pairs.
    fn count(&self) -> usize;

    /// Latest reserved time, if anything is reserved.
    fn latest_time(&self) -> Option<usize>;

    /// Precomputes `is_constrained_pick` for the given vertex/duration pairs
    /// over `0..max_time`. Any later mutation drops the cache.
    fn cache_pick_constraints(&mut self, vertices: &[usize], pick_times: &[usize], max_time: usize);
}

/// Pick-possibility table: `tables[(vertex, duration)][t]` answers
/// `is_constrained_pick(vertex, t, duration)` for `t < max_time`.
#[derive(Debug, Clone, Default)]
pub struct PickCache {
    tables: HashMap<(usize, usize), Vec<bool>>,
    max_time: usize,
}

impl PickCache {
    pub fn build<F>(vertices: &[usize], pick_times: &[usize], max_time: usize, reserved: F) -> Self
    where
        F: Fn(usize, usize) -> bool,
    {
        let mut tables = HashMap::new();
        for (&vertex, &duration) in vertices.iter().zip(pick_times) {
            tables.entry((vertex, duration)).or_insert_with(|| {
                let mut table = vec![false; max_time];
                // Nearest reserved time strictly after t.
                let mut nearest = None;
                for t in (0..max_time + duration).rev() {
                    if t < max_time {
                        table[t] = nearest.is_some_and(|s| s <= t + duration);
                    }
                    if reserved(vertex, t) {
                        nearest = Some(t);
                    }
                }
                table
            });
        }
        PickCache { tables, max_time }
    }

    /// `None` when the pair was not cached or `time` lies past the table.
    pub fn lookup(&self, vertex: usize, time: usize, duration: usize) -> Option<bool> {
        if time >= self.max_time {
            return None;
        }
        self.tables
            .get(&(vertex, duration))
            .map(|table| table[time])
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ConstraintStore {
    Sparse,
    Dense,
    Dummy,
}

impl ConstraintStore {
    pub fn build(self) -> Box<dyn ConstraintManager> {
        match self {
            ConstraintStore::Sparse => Box::new(ConstraintManagerSparse::new()),
            ConstraintStore::Dense => Box::new(ConstraintManagerDense::new()),
            ConstraintStore::Dummy => Box::new(ConstraintManagerDummy),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stores() -> Vec<Box<dyn ConstraintManager>> {
        vec![
            ConstraintStore::Sparse.build(),
            ConstraintStore::Dense.build(),
        ]
    }

    #[test]
    fn test_vertex_and_swap_checks_agree() {
        for mut store in stores() {
            store.add_constraint(3, 5, Some(2));
            store.add_constraint(7, 1, None);

            assert!(store.is_constrained(3, 5, None));
            assert!(!store.is_constrained(3, 4, None));
            // Moving 3 -> 2 while the reserving agent moves 2 -> 3.
            assert!(store.is_constrained(2, 5, Some(3)));
            assert!(!store.is_constrained(2, 5, Some(4)));
            assert!(!store.is_constrained(2, 5, None));
            assert!(store.is_constrained(7, 1, Some(8)));
            assert_eq!(store.count(), 2);
            assert_eq!(store.latest_time(), Some(5));
        }
    }

    #[test]
    fn test_pick_checks_following_steps() {
        for mut store in stores() {
            store.add_constraint(4, 10, None);
            assert!(store.is_constrained_pick(4, 9, 1));
            assert!(store.is_constrained_pick(4, 7, 3));
            assert!(!store.is_constrained_pick(4, 6, 3));
            // The arrival time itself is not part of the dwell.
            assert!(!store.is_constrained_pick(4, 10, 2));
            assert!(!store.is_constrained_pick(5, 9, 1));
            assert!(!store.is_constrained_pick(4, 9, 0));
        }
    }

    #[test]
    fn test_pick_cache_matches_direct_check() {
        for mut store in stores() {
            for t in [2, 3, 9, 15] {
                store.add_constraint(1, t, None);
            }
            store.add_constraint(6, 4, None);
            let mut direct = Vec::new();
            for vertex in [1, 6] {
                for duration in [0, 1, 2, 4] {
                    for t in 0..20 {
                        direct.push(store.is_constrained_pick(vertex, t, duration));
                    }
                }
            }

            store.cache_pick_constraints(&[1, 1, 1, 1, 6, 6, 6, 6], &[0, 1, 2, 4, 0, 1, 2, 4], 12);
            let mut cached = Vec::new();
            for vertex in [1, 6] {
                for duration in [0, 1, 2, 4] {
                    for t in 0..20 {
                        cached.push(store.is_constrained_pick(vertex, t, duration));
                    }
                }
            }
            assert_eq!(direct, cached);
        }
    }

    #[test]
    fn test_mutation_invalidates_pick_cache() {
        for mut store in stores() {
            store.cache_pick_constraints(&[2], &[3], 10);
            assert!(!store.is_constrained_pick(2, 1, 3));
            store.add_constraint(2, 3, None);
            assert!(store.is_constrained_pick(2, 1, 3));
        }
    }

    #[test]
    fn test_tour_reservations() {
        for mut store in stores() {
            let tour = Tour::new(2, vec![vec![0, 1], vec![1, 2]], vec![1], vec![1]);
            store.add_constraints(&tour);
            // 0@2, 1@3, 1@4, 2@5
            assert_eq!(store.count(), 4);
            assert!(store.is_constrained(1, 4, None));
            assert!(store.is_constrained(0, 3, Some(1)));
            assert!(store.is_constrained(1, 5, Some(2)));
            assert_eq!(store.latest_time(), Some(5));

            // Second tour of the same agent starts on the vertex just reserved.
            let next = Tour::direct(5, vec![2, 3]);
            store.add_constraints(&next);
            assert_eq!(store.count(), 5);
        }
    }

    #[test]
    fn test_init_and_clear() {
        for mut store in stores() {
            store.add_constraint(9, 9, None);
            store.add_constraint_pick(4, 2, 2);
            assert_eq!(store.count(), 4);
            let constraints = vec![
                Constraint {
                    agent: 0,
                    time: 1,
                    vertex: 5,
                },
                Constraint {
                    agent: 0,
                    time: 1,
                    vertex: 5,
                },
            ];
            store.init_constraints(&constraints);
            assert_eq!(store.count(), 1);
            assert!(!store.is_constrained(9, 9, None));
            assert!(store.is_constrained(5, 1, None));

            store.clear();
            assert_eq!(store.count(), 0);
            assert_eq!(store.latest_time(), None);
        }
    }

    #[test]
    fn test_dummy_is_never_constrained() {
        let mut store = ConstraintStore::Dummy.build();
        store.add_constraint(1, 1, None);
        store.add_constraint_pick(1, 0, 4);
        store.cache_pick_constraints(&[1], &[2], 10);
        assert!(!store.is_constrained(1, 1, None));
        assert!(!store.is_constrained_pick(1, 0, 4));
        assert_eq!(store.count(), 0);
        assert_eq!(store.latest_time(), None);
    }
}
