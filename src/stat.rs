use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Default, Serialize)]
pub struct Stats {
    pub costs: usize,
    pub makespan: usize,
    pub time_ms: usize,
    pub low_level_expand_nodes: usize,
    pub high_level_expand_nodes: usize,
    pub gtsp_solves: usize,
    pub pruned_branches: usize,
    /// Prioritized planning rounds that re-solved an agent after a collision.
    pub replans: usize,
}

impl Stats {
    pub fn print(&self) {
        info!(
            "Cost {:?} Makespan {:?} Time(microseconds) {:?} High level expand nodes number: {:?} Low level expand nodes number {:?} Order solves {:?} Pruned branches {:?} Replans {:?}",
            self.costs,
            self.makespan,
            self.time_ms,
            self.high_level_expand_nodes,
            self.low_level_expand_nodes,
            self.gtsp_solves,
            self.pruned_branches,
            self.replans
        );
    }
}
