use super::{order_solver, plan_orders, record, Solution, Solver};
use crate::common::Agent;
use crate::config::Config;
use crate::constraints::ConstraintManagerDummy;
use crate::error::PlanError;
use crate::graph::Graph;
use crate::stat::Stats;

use std::time::Instant;
use tracing::{info, warn};

/// Plans every agent as if it were alone. Collisions are left in place.
pub struct IndependentPlanner<'a> {
    agents: &'a [Agent],
    graph: &'a Graph,
    config: &'a Config,
    stats: Stats,
}

impl<'a> IndependentPlanner<'a> {
    pub fn new(agents: &'a [Agent], graph: &'a Graph, config: &'a Config) -> Self {
        IndependentPlanner {
            agents,
            graph,
            config,
            stats: Stats::default(),
        }
    }
}

impl Solver for IndependentPlanner<'_> {
    fn solve(&mut self) -> Result<Solution, PlanError> {
        let started = Instant::now();
        let mut solver = order_solver(self.graph, self.agents, self.config)?;
        solver.set_deadline(self.config.deadline(started));
        let mut unconstrained = ConstraintManagerDummy;

        let mut tours = Vec::with_capacity(self.agents.len());
        for agent in self.agents {
            let mut planned = Vec::with_capacity(agent.orders.len());
            plan_orders(&mut solver, self.graph, &mut unconstrained, agent, &mut planned)?;
            tours.push(planned);
        }

        let solution = Solution { tours };
        if !solution.is_conflict_free(self.graph) {
            warn!("independent plan contains collisions");
        }
        record(&mut self.stats, &solver, &solution);
        self.stats.time_ms = started.elapsed().as_micros() as usize;
        info!("independent: {} agents", self.agents.len());
        self.stats.print();
        Ok(solution)
    }

    fn stats(&self) -> &Stats {
        &self.stats
    }
}
