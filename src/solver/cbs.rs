use super::{order_solver, plan_orders, record, Solution, Solver};
use crate::algorithm::{ConflictDetector, GtspSolver};
use crate::common::{agent_duration, Agent, CbsNode, CbsTree, Constraint, NodeState, Tour};
use crate::config::Config;
use crate::constraints::{ConstraintManager, ConstraintStore};
use crate::error::PlanError;
use crate::graph::Graph;
use crate::stat::Stats;

use std::collections::BTreeSet;
use std::rc::Rc;
use std::time::Instant;
use tracing::{debug, info, instrument};

pub struct CBS<'a> {
    agents: &'a [Agent],
    graph: &'a Graph,
    config: &'a Config,
    stats: Stats,
}

impl<'a> CBS<'a> {
    pub fn new(agents: &'a [Agent], graph: &'a Graph, config: &'a Config) -> Self {
        CBS {
            agents,
            graph,
            config,
            stats: Stats::default(),
        }
    }

    fn root(
        &self,
        solver: &mut GtspSolver,
        constraints: &mut dyn ConstraintManager,
    ) -> Result<CbsNode, PlanError> {
        let mut solution = Vec::with_capacity(self.agents.len());
        for agent in self.agents {
            constraints.clear();
            let mut tours = Vec::with_capacity(agent.orders.len());
            plan_orders(solver, self.graph, constraints, agent, &mut tours)?;
            solution.push(Rc::new(tours));
        }
        Ok(CbsNode {
            id: 0,
            parent: None,
            new_constraints: Vec::new(),
            cost: total_cost(&solution),
            solution,
            constraint_count: 0,
            state: NodeState::Ready,
        })
    }

    /// Child of `parent` that forbids `new_constraints` to `agent`. Only the
    /// order running at the constraint time and the orders after it are
    /// replanned. Returns `None` when the branch cannot lead to a solution.
    #[instrument(skip_all, name = "branch", fields(parent = parent, agent = agent), level = "debug")]
    fn branch(
        &mut self,
        tree: &CbsTree,
        parent: usize,
        agent: usize,
        new_constraints: Vec<Constraint>,
        solver: &mut GtspSolver,
        constraints: &mut dyn ConstraintManager,
    ) -> Result<Option<CbsNode>, PlanError> {
        let node = tree.get(parent);
        let tours = &node.solution[agent];
        let time = new_constraints[0].time;
        let end = tours.last().map_or(0, Tour::end_time);
        if time == 0 || time > end {
            debug!("void branch: constraint at {time}, agent active until {end}");
            return Ok(None);
        }
        let Some(first) = tours
            .iter()
            .position(|tour| tour.start_time < time && time <= tour.end_time())
        else {
            return Ok(None);
        };

        let mut all = tree.constraints_for(parent, agent);
        all.extend(new_constraints.iter().copied());
        constraints.init_constraints(&all);

        let mut replanned = tours[..first].to_vec();
        match plan_orders(
            solver,
            self.graph,
            constraints,
            &self.agents[agent],
            &mut replanned,
        ) {
            Ok(()) => {}
            Err(err) if err.is_recoverable() => {
                debug!("pruned: {err}");
                self.stats.pruned_branches += 1;
                return Ok(None);
            }
            Err(err) => return Err(err),
        }

        let mut solution = node.solution.clone();
        solution[agent] = Rc::new(replanned);
        Ok(Some(CbsNode {
            id: 0,
            parent: Some(parent),
            constraint_count: node.constraint_count + new_constraints.len(),
            new_constraints,
            cost: total_cost(&solution),
            solution,
            state: NodeState::Ready,
        }))
    }
}

fn total_cost(solution: &[Rc<Vec<Tour>>]) -> usize {
    solution.iter().map(|tours| agent_duration(tours)).sum()
}

impl Solver for CBS<'_> {
    #[instrument(skip_all, name = "cbs", fields(agents = self.agents.len()), level = "debug")]
    fn solve(&mut self) -> Result<Solution, PlanError> {
        let total_solve_start_time = Instant::now();
        let deadline = self.config.deadline(total_solve_start_time);
        let mut solver = order_solver(self.graph, self.agents, self.config)?;
        solver.set_deadline(deadline);
        let mut constraints = self.config.store_or(ConstraintStore::Sparse).build();
        let mut detector = ConflictDetector::new(self.graph.len());

        let mut tree = CbsTree::default();
        let mut open = BTreeSet::new();
        let root = self.root(&mut solver, constraints.as_mut())?;
        let id = tree.push(root);
        open.insert(tree.get(id).key());

        while let Some((_, _, current)) = open.pop_first() {
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return Err(PlanError::Timeout);
            }

            let conflict = {
                let views: Vec<&[Tour]> = tree
                    .get(current)
                    .solution
                    .iter()
                    .map(|tours| tours.as_slice())
                    .collect();
                detector.find_conflict(self.graph, &views)
            };
            let Some(conflict) = conflict else {
                // No conflicts, return solution.
                tree.set_state(current, NodeState::Goal);
                let solution = Solution {
                    tours: tree.get(current).tours(),
                };
                record(&mut self.stats, &solver, &solution);
                self.stats.time_ms = total_solve_start_time.elapsed().as_micros() as usize;
                info!("cbs: {} constraint tree nodes", tree.len());
                self.stats.print();
                return Ok(solution);
            };

            tree.set_state(current, NodeState::Expanded);
            self.stats.high_level_expand_nodes += 1;
            let (left, right) = conflict.make_constraints();
            for (agent, new_constraints) in [(conflict.agent_1, left), (conflict.agent_2, right)] {
                if let Some(child) = self.branch(
                    &tree,
                    current,
                    agent,
                    new_constraints,
                    &mut solver,
                    constraints.as_mut(),
                )? {
                    if tree.len() >= self.config.max_high_level_nodes {
                        return Err(PlanError::CapacityExceeded {
                            what: "constraint tree nodes",
                            limit: self.config.max_high_level_nodes,
                            actual: tree.len() + 1,
                        });
                    }
                    let id = tree.push(child);
                    open.insert(tree.get(id).key());
                }
            }
        }

        Err(PlanError::SearchExhausted)
    }

    fn stats(&self) -> &Stats {
        &self.stats
    }
}
