mod cbs;
mod independent;
mod prioritized;

pub use cbs::CBS;
pub use independent::IndependentPlanner;
pub use prioritized::PrioritizedPlanner;

use serde::Serialize;
use tracing::debug;

use crate::algorithm::{ConflictDetector, GtspSolver, RouteSearch, SolverLimits};
use crate::common::{makespan, sum_of_costs, Agent, Tour};
use crate::config::Config;
use crate::constraints::ConstraintManager;
use crate::error::PlanError;
use crate::graph::Graph;
use crate::stat::Stats;

pub trait Solver {
    fn solve(&mut self) -> Result<Solution, PlanError>;

    fn stats(&self) -> &Stats;
}

/// Tours of every agent, one per order in order sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Solution {
    pub tours: Vec<Vec<Tour>>,
}

impl Solution {
    pub fn sum_of_costs(&self) -> usize {
        sum_of_costs(&self.tours)
    }

    pub fn makespan(&self) -> usize {
        makespan(&self.tours)
    }

    /// Checks every agent's tours against its orders: the tours chain in
    /// time and space, every step follows an edge or waits, and one item of
    /// every class is picked for its full pick time.
    pub fn verify(&self, graph: &Graph, agents: &[Agent]) -> bool {
        if self.tours.len() != agents.len() {
            debug!("{} tour lists for {} agents", self.tours.len(), agents.len());
            return false;
        }
        self.tours
            .iter()
            .zip(agents)
            .all(|(tours, agent)| verify_agent(graph, agent, tours))
    }

    pub fn is_conflict_free(&self, graph: &Graph) -> bool {
        ConflictDetector::new(graph.len())
            .find_conflict(graph, &self.tours)
            .is_none()
    }
}

fn verify_agent(graph: &Graph, agent: &Agent, tours: &[Tour]) -> bool {
    if tours.len() != agent.orders.len() {
        debug!("agent {}: {} tours for {} orders", agent.id, tours.len(), agent.orders.len());
        return false;
    }
    let mut time = 0;
    for (order, tour) in agent.orders.iter().zip(tours) {
        if tour.start_time != time
            || tour.start_vertex() != order.start
            || tour.target_vertex() != order.target
        {
            debug!("agent {}: tour of order {} does not chain", agent.id, order.id);
            return false;
        }
        time = tour.end_time();

        let steps: Vec<usize> = tour.iter().collect();
        if !moves_ok(graph, &steps) || steps.len() != tour.duration() + 1 {
            debug!("agent {}: tour of order {} leaves the graph", agent.id, order.id);
            return false;
        }

        let mut picked = vec![false; order.classes()];
        for (&vertex, &pick_time) in tour.pick_vertices.iter().zip(&tour.pick_times) {
            let Some(item) = order
                .items
                .iter()
                .find(|item| item.vertex == vertex && item.pick_time == pick_time && !picked[item.class])
            else {
                debug!("agent {}: stray pick at vertex {vertex}", agent.id);
                return false;
            };
            picked[item.class] = true;
        }
        if picked.iter().any(|&done| !done) {
            debug!("agent {}: order {} misses a class", agent.id, order.id);
            return false;
        }
    }
    true
}

// A move over an edge of cost `c` keeps the agent on the origin for the `c`
// steps before it arrives.
fn moves_ok(graph: &Graph, steps: &[usize]) -> bool {
    (1..steps.len()).all(|k| {
        let origin = steps[k - 1];
        if origin == steps[k] {
            return true;
        }
        match graph.edge_cost(origin, steps[k]) {
            Some(cost) => k >= cost && steps[k - cost..k].iter().all(|&v| v == origin),
            None => false,
        }
    })
}

/// Order tour solver sized for `agents` and bounded by the configured limits.
pub(crate) fn order_solver(
    graph: &Graph,
    agents: &[Agent],
    config: &Config,
) -> Result<GtspSolver, PlanError> {
    if !graph.is_initialized() {
        return Err(PlanError::InvalidInstance(
            "graph caches are not initialized".to_string(),
        ));
    }
    let limits = SolverLimits::from_agents(graph, agents, config.horizon)?;
    debug!("solver limits: {limits:?}");
    Ok(GtspSolver::new(limits, config.order_solver)
        .with_search(RouteSearch::new(config.max_low_level_nodes)))
}

/// Plans the orders of `agent` that `tours` does not cover yet, each starting
/// when the previous one ends.
pub(crate) fn plan_orders(
    solver: &mut GtspSolver,
    graph: &Graph,
    constraints: &mut dyn ConstraintManager,
    agent: &Agent,
    tours: &mut Vec<Tour>,
) -> Result<(), PlanError> {
    for order in &agent.orders[tours.len()..] {
        let start_time = tours.last().map_or(0, Tour::end_time);
        let tour = solver.solve(graph, constraints, order, start_time)?;
        tours.push(tour);
    }
    Ok(())
}

pub(crate) fn record(stats: &mut Stats, solver: &GtspSolver, solution: &Solution) {
    stats.costs = solution.sum_of_costs();
    stats.makespan = solution.makespan();
    stats.low_level_expand_nodes = solver.expanded_nodes();
    stats.gtsp_solves = solver.solves();
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::common::{OrderInstance, PickItem};
    use crate::graph::VertexKind;

    pub(crate) fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("debug")
            .try_init();
    }

    /// `0 - 1 - 2 - 3` with an optional staging vertex list.
    pub(crate) fn line_graph(vertices: usize, staging: &[usize]) -> Graph {
        let mut graph = Graph::new();
        for v in 0..vertices {
            let kind = if staging.contains(&v) {
                VertexKind::Staging
            } else {
                VertexKind::Plain
            };
            graph.add_vertex(None, kind);
        }
        for v in 0..vertices - 1 {
            graph.add_edge(v, v + 1, 1).unwrap();
        }
        graph
    }

    pub(crate) fn walker(id: usize, start: usize, target: usize) -> Agent {
        Agent::new(id, vec![OrderInstance::new(0, start, target, Vec::new()).unwrap()]).unwrap()
    }

    #[test]
    fn test_verify_checks_picks_and_chaining() {
        init_tracing();
        let graph = line_graph(4, &[]);
        let item = PickItem {
            vertex: 2,
            class: 0,
            pick_time: 1,
        };
        let order = OrderInstance::new(0, 0, 3, vec![item]).unwrap();
        let agent = Agent::new(0, vec![order]).unwrap();

        let good = Solution {
            tours: vec![vec![Tour::new(
                0,
                vec![vec![0, 1, 2], vec![2, 3]],
                vec![2],
                vec![1],
            )]],
        };
        assert!(good.verify(&graph, std::slice::from_ref(&agent)));
        assert_eq!(good.sum_of_costs(), 4);

        let skipped = Solution {
            tours: vec![vec![Tour::direct(0, vec![0, 1, 2, 3])]],
        };
        assert!(!skipped.verify(&graph, std::slice::from_ref(&agent)));

        let late = Solution {
            tours: vec![vec![Tour::new(
                1,
                vec![vec![0, 1, 2], vec![2, 3]],
                vec![2],
                vec![1],
            )]],
        };
        assert!(!late.verify(&graph, &[agent]));
    }

    #[test]
    fn test_planners_on_warehouse_instance() {
        init_tracing();
        let instance = crate::instance::Instance::load_from_file("map_file/test/warehouse.yaml").unwrap();
        let (graph, agents) = (&instance.graph, instance.agents.as_slice());
        let config = Config::default();

        let free = IndependentPlanner::new(agents, graph, &config).solve().unwrap();
        assert!(free.verify(graph, agents));

        let mut cbs = CBS::new(agents, graph, &config);
        let joint = cbs.solve().unwrap();
        assert!(joint.verify(graph, agents));
        assert!(joint.is_conflict_free(graph));
        assert!(joint.sum_of_costs() >= free.sum_of_costs());

        let prioritized = PrioritizedPlanner::new(agents, graph, &config).solve().unwrap();
        assert!(prioritized.verify(graph, agents));
        assert!(prioritized.is_conflict_free(graph));
        assert!(prioritized.sum_of_costs() >= free.sum_of_costs());
    }

    #[test]
    fn test_verify_rejects_teleport() {
        let graph = line_graph(4, &[]);
        let agent = walker(0, 0, 3);
        let jump = Solution {
            tours: vec![vec![Tour::direct(0, vec![0, 3])]],
        };
        assert!(!jump.verify(&graph, &[agent]));
    }

    #[test]
    fn test_verify_waits_out_costly_edges() {
        init_tracing();
        let mut graph = Graph::new();
        graph.add_vertex(None, VertexKind::Plain);
        graph.add_vertex(None, VertexKind::Plain);
        graph.add_edge(0, 1, 3).unwrap();
        let agent = walker(0, 0, 1);

        let hop = Solution {
            tours: vec![vec![Tour::direct(0, vec![0, 1])]],
        };
        assert!(!hop.verify(&graph, std::slice::from_ref(&agent)));

        let early = Solution {
            tours: vec![vec![Tour::direct(0, vec![0, 0, 1])]],
        };
        assert!(!early.verify(&graph, std::slice::from_ref(&agent)));

        let walked = Solution {
            tours: vec![vec![Tour::direct(0, vec![0, 0, 0, 1])]],
        };
        assert!(walked.verify(&graph, &[agent]));
    }

    #[test]
    fn test_planners_need_an_initialized_graph() {
        init_tracing();
        let agents = vec![walker(0, 0, 2)];
        let graph = line_graph(3, &[]);
        let config = Config::default();
        assert!(matches!(
            order_solver(&graph, &agents, &config),
            Err(PlanError::InvalidInstance(_))
        ));
        assert!(matches!(
            CBS::new(&agents, &graph, &config).solve(),
            Err(PlanError::InvalidInstance(_))
        ));

        let mut graph = graph;
        graph.initialize(&agents);
        assert!(order_solver(&graph, &agents, &config).is_ok());
    }
}
