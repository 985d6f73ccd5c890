use super::{order_solver, plan_orders, record, Solution, Solver};
use crate::algorithm::ConflictDetector;
use crate::common::{Agent, Constraint, Tour};
use crate::config::Config;
use crate::constraints::{ConstraintManager, ConstraintStore};
use crate::error::PlanError;
use crate::graph::Graph;
use crate::stat::Stats;

use std::time::Instant;
use tracing::{debug, instrument};

/// Plans agents one at a time in index order; every committed agent's tours
/// become reservations for the agents after it.
pub struct PrioritizedPlanner<'a> {
    agents: &'a [Agent],
    graph: &'a Graph,
    config: &'a Config,
    stats: Stats,
}

impl<'a> PrioritizedPlanner<'a> {
    pub fn new(agents: &'a [Agent], graph: &'a Graph, config: &'a Config) -> Self {
        PrioritizedPlanner {
            agents,
            graph,
            config,
            stats: Stats::default(),
        }
    }
}

impl Solver for PrioritizedPlanner<'_> {
    #[instrument(skip_all, name = "prioritized", level = "debug")]
    fn solve(&mut self) -> Result<Solution, PlanError> {
        let started = Instant::now();
        let mut solver = order_solver(self.graph, self.agents, self.config)?;
        solver.set_deadline(self.config.deadline(started));
        let mut constraints = self.config.store_or(ConstraintStore::Dense).build();
        let mut detector = ConflictDetector::new(self.graph.len());
        let mut committed: Vec<Vec<Tour>> = Vec::with_capacity(self.agents.len());

        for (index, agent) in self.agents.iter().enumerate() {
            // Leftover collisions the reservations miss, e.g. at time 0.
            let mut own: Vec<Constraint> = Vec::new();
            let mut rounds = 0;
            loop {
                constraints.init_constraints(&own);
                for tour in committed.iter().flatten() {
                    reserve(constraints.as_mut(), self.graph, tour);
                }

                let mut tours = Vec::with_capacity(agent.orders.len());
                match plan_orders(&mut solver, self.graph, constraints.as_mut(), agent, &mut tours) {
                    Ok(()) => {}
                    Err(err) if err.is_recoverable() => {
                        debug!("agent {index} cannot be planned around earlier agents: {err}");
                        return Err(PlanError::SearchExhausted);
                    }
                    Err(err) => return Err(err),
                }

                committed.push(tours);
                let Some(conflict) = detector.find_conflict(self.graph, &committed) else {
                    break;
                };
                committed.pop();

                let (first, second) = conflict.make_constraints();
                own.extend(if conflict.agent_1 == index { first } else { second });
                rounds += 1;
                self.stats.replans += 1;
                if rounds >= self.config.max_pp_iterations {
                    debug!("agent {index}: still colliding after {rounds} rounds");
                    return Err(PlanError::SearchExhausted);
                }
            }
        }

        let solution = Solution { tours: committed };
        record(&mut self.stats, &solver, &solution);
        self.stats.time_ms = started.elapsed().as_micros() as usize;
        self.stats.print();
        Ok(solution)
    }

    fn stats(&self) -> &Stats {
        &self.stats
    }
}

// Like `add_constraints`, but staging vertices stay free for everyone.
fn reserve(constraints: &mut dyn ConstraintManager, graph: &Graph, tour: &Tour) {
    let mut predecessor = None;
    for (offset, vertex) in tour.iter().enumerate() {
        if !graph.is_staging(vertex) {
            let from = predecessor.filter(|&p| p != vertex);
            constraints.add_constraint(vertex, tour.start_time + offset, from);
        }
        predecessor = Some(vertex);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{OrderInstance, PickItem};
    use crate::solver::tests::{init_tracing, line_graph, walker};

    #[test]
    fn test_later_agent_waits() {
        init_tracing();
        // Vertex 4 is a side entry to vertex 1.
        let mut graph = line_graph(4, &[]);
        let side = graph.add_vertex(None, crate::graph::VertexKind::Plain);
        graph.add_edge(1, side, 1).unwrap();
        let agents = vec![walker(0, 0, 3), walker(1, side, 2)];
        graph.initialize(&agents);
        let config = Config::default();
        let mut planner = PrioritizedPlanner::new(&agents, &graph, &config);
        let solution = planner.solve().unwrap();

        assert!(solution.verify(&graph, &agents));
        assert!(solution.is_conflict_free(&graph));
        assert_eq!(agent_steps(&solution.tours[0]), vec![0, 1, 2, 3]);
        assert_eq!(agent_steps(&solution.tours[1]), vec![side, side, 1, 2]);
        assert_eq!(planner.stats().costs, 6);
        assert_eq!(planner.stats().pruned_branches, 0);
    }

    #[test]
    fn test_orders_with_picks_stay_apart() {
        init_tracing();
        let mut graph = line_graph(5, &[0]);
        let item = |vertex| PickItem {
            vertex,
            class: 0,
            pick_time: 2,
        };
        let first = OrderInstance::new(0, 0, 4, vec![item(2)]).unwrap();
        let second = OrderInstance::new(0, 0, 3, vec![item(2)]).unwrap();
        let agents = vec![
            Agent::new(0, vec![first]).unwrap(),
            Agent::new(1, vec![second]).unwrap(),
        ];
        graph.initialize(&agents);
        let config = Config::default();
        let mut planner = PrioritizedPlanner::new(&agents, &graph, &config);
        let solution = planner.solve().unwrap();

        assert!(solution.verify(&graph, &agents));
        assert!(solution.is_conflict_free(&graph));
        // The first agent is planned as if alone.
        assert_eq!(solution.tours[0][0].duration(), 6);
        assert!(solution.tours[1][0].duration() > 5);
    }

    #[test]
    fn test_shared_start_is_exhausted() {
        init_tracing();
        let mut graph = line_graph(3, &[]);
        let agents = vec![walker(0, 1, 2), walker(1, 1, 0)];
        graph.initialize(&agents);
        let config = Config {
            max_pp_iterations: 3,
            ..Config::default()
        };
        let mut planner = PrioritizedPlanner::new(&agents, &graph, &config);
        assert_eq!(planner.solve(), Err(PlanError::SearchExhausted));
        assert_eq!(planner.stats().replans, 3);
        assert_eq!(planner.stats().pruned_branches, 0);
    }

    fn agent_steps(tours: &[Tour]) -> Vec<usize> {
        crate::common::agent_track(tours).collect()
    }
}
