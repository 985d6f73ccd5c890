use super::ConstraintManager;

/// Ignores every reservation, for planners that deliberately allow collisions.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstraintManagerDummy;

impl ConstraintManager for ConstraintManagerDummy {
    fn is_constrained(&self, _vertex: usize, _time: usize, _predecessor: Option<usize>) -> bool {
        false
    }

    fn is_constrained_pick(&self, _vertex: usize, _time: usize, _duration: usize) -> bool {
        false
    }

    fn add_constraint(&mut self, _vertex: usize, _time: usize, _predecessor: Option<usize>) {}

    fn add_constraint_pick(&mut self, _vertex: usize, _time: usize, _duration: usize) {}

    fn add_constraints(&mut self, _tour: &crate::common::Tour) {}

    fn clear(&mut self) {}

    fn count(&self) -> usize {
        0
    }

    fn latest_time(&self) -> Option<usize> {
        None
    }

    fn cache_pick_constraints(&mut self, _vertices: &[usize], _pick_times: &[usize], _max_time: usize) {}
}
