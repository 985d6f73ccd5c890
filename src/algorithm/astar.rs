use std::collections::{BTreeSet, HashMap};
use std::iter;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, instrument, trace};

use crate::common::{NodePool, OpenEntry, Path};
use crate::constraints::ConstraintManager;
use crate::error::PlanError;
use crate::graph::Graph;

const DEADLINE_CHECK_INTERVAL: usize = 256;
const DEFAULT_POOL_SIZE: usize = 1 << 12;
const DEFAULT_POOL_LIMIT: usize = 1 << 22;

/// A timed route: `path[k]` is occupied `k` steps after the route begins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Route {
    pub duration: usize,
    pub path: Path,
}

impl Route {
    fn from_path(path: Path) -> Self {
        Route {
            duration: path.len() - 1,
            path,
        }
    }
}

/// Scratch state of the time-expanded A*, reset at the start of every call.
#[derive(Debug)]
pub struct RouteSearch {
    pool: NodePool,
    open: BTreeSet<OpenEntry>,
    // Best elapsed time found per (vertex, time key).
    best: HashMap<(usize, usize), usize>,
    deadline: Option<Instant>,
    expanded: usize,
}

impl Default for RouteSearch {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_LIMIT)
    }
}

impl RouteSearch {
    pub fn new(node_limit: usize) -> Self {
        RouteSearch {
            pool: NodePool::new(DEFAULT_POOL_SIZE, node_limit),
            open: BTreeSet::new(),
            best: HashMap::new(),
            deadline: None,
            expanded: 0,
        }
    }

    pub fn set_deadline(&mut self, deadline: Option<Instant>) {
        self.deadline = deadline;
    }

    /// Total expansions over every search run so far.
    pub fn expanded_nodes(&self) -> usize {
        self.expanded
    }

    /// Constrained shortest route. The cached unconstrained route is returned
    /// directly whenever it violates no reservation, otherwise A* is run.
    /// A pick dwell after the arrival is not checked here; callers that stop
    /// to pick check it with `is_constrained_pick`.
    pub fn shortest_route(
        &mut self,
        graph: &Graph,
        from: usize,
        to: usize,
        start_time: usize,
        constraints: &dyn ConstraintManager,
        reverse: bool,
    ) -> Result<Option<Route>, PlanError> {
        let cached = if reverse {
            graph.cached_route(to, from)
        } else {
            graph.cached_route(from, to)
        };
        if let Some(path) = cached {
            if cached_route_free(path, start_time, constraints, reverse) {
                return Ok(Some(Route::from_path(path.to_vec())));
            }
        }
        self.a_star(graph, from, to, constraints, start_time, reverse, None)
    }

    /// Time-expanded A* over `(vertex, elapsed)` states.
    ///
    /// Forward: leaves `from` at `begin_time` and reaches `to`. Reverse: arrives
    /// at `from` at `begin_time`, having left `to` as late as possible; the
    /// returned path is still chronological and ends at `from`.
    /// With `step_bound` the route must take exactly that many steps.
    #[allow(clippy::too_many_arguments)]
    #[instrument(skip_all, name = "a_star", fields(from = from, to = to, time = begin_time, reverse = reverse), level = "debug")]
    pub fn a_star(
        &mut self,
        graph: &Graph,
        from: usize,
        to: usize,
        constraints: &dyn ConstraintManager,
        begin_time: usize,
        reverse: bool,
        step_bound: Option<usize>,
    ) -> Result<Option<Route>, PlanError> {
        self.pool.reset();
        self.open.clear();
        self.best.clear();

        if reverse && constraints.is_constrained(from, begin_time, None) {
            return Ok(None);
        }
        let Some(start_h) = graph.heuristic(from, to) else {
            return Ok(None);
        };
        // Reverse searches cannot run past time 0.
        let budget = match (step_bound, reverse) {
            (Some(bound), true) => Some(bound.min(begin_time)),
            (Some(bound), false) => Some(bound),
            (None, true) => Some(begin_time),
            (None, false) => None,
        };
        if budget.is_some_and(|b| start_h > b) {
            return Ok(None);
        }

        // Past the last reservation waiting cannot help any more, so forward
        // unbounded search folds all later times into one layer.
        let settle = constraints
            .latest_time()
            .map_or(begin_time, |latest| latest.max(begin_time))
            + 1;
        let collapse = !reverse && step_bound.is_none();
        let time_key = |elapsed: usize| {
            if collapse {
                (begin_time + elapsed).min(settle)
            } else {
                elapsed
            }
        };

        let root = self.pool.allocate(from, 0, None)?;
        self.open.insert(OpenEntry {
            f_cost: start_h,
            g_cost: 0,
            vertex: from,
            node: root,
        });
        self.best.insert((from, time_key(0)), 0);

        while let Some(current) = self.open.pop_first() {
            if self.best.get(&(current.vertex, time_key(current.g_cost))) != Some(&current.g_cost) {
                continue;
            }
            self.expanded += 1;
            if self.expanded % DEADLINE_CHECK_INTERVAL == 0
                && self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
            {
                return Err(PlanError::Timeout);
            }
            trace!("expand node: {current:?}");

            let node = *self.pool.get(current.node);
            if node.vertex == to && step_bound.map_or(true, |bound| node.elapsed == bound) {
                let route = self.unwind(current.node, reverse);
                debug!("found route of {} steps", route.duration);
                return Ok(Some(route));
            }

            let time = if reverse {
                begin_time - node.elapsed
            } else {
                begin_time + node.elapsed
            };
            let moves = iter::once((node.vertex, 1))
                .chain(graph.vertices[node.vertex].neighbors.iter().copied());
            for (next, cost) in moves {
                let elapsed = node.elapsed + cost;
                if budget.is_some_and(|b| elapsed > b) {
                    continue;
                }
                if next == node.vertex && collapse && time >= settle {
                    continue;
                }
                if !transition_free(constraints, node.vertex, next, time, cost, reverse) {
                    continue;
                }
                let Some(h) = graph.heuristic(next, to) else {
                    continue;
                };
                if budget.is_some_and(|b| elapsed + h > b) {
                    continue;
                }

                let key = (next, time_key(elapsed));
                if self.best.get(&key).is_some_and(|&g| g <= elapsed) {
                    continue;
                }
                self.best.insert(key, elapsed);
                let id = self.pool.allocate(next, elapsed, Some(current.node))?;
                self.open.insert(OpenEntry {
                    f_cost: elapsed + h,
                    g_cost: elapsed,
                    vertex: next,
                    node: id,
                });
            }
        }

        debug!("cannot find solution");
        Ok(None)
    }

    // Walks the predecessor chain and spells out one vertex per timestep,
    // repeating the origin of every costly edge.
    fn unwind(&self, goal: usize, reverse: bool) -> Route {
        let mut chain = Vec::new();
        let mut current = Some(goal);
        while let Some(index) = current {
            let node = self.pool.get(index);
            chain.push((node.vertex, node.elapsed));
            current = node.predecessor;
        }
        // The chain runs goal to root; chronological order is root to goal
        // forward and goal to root in reverse.
        if !reverse {
            chain.reverse();
        }

        let mut path = vec![chain[0].0];
        for pair in chain.windows(2) {
            let ((vertex, a), (next, b)) = (pair[0], pair[1]);
            let steps = a.abs_diff(b);
            path.extend(iter::repeat(vertex).take(steps - 1));
            path.push(next);
        }
        Route::from_path(path)
    }
}

// Checks travelling from `vertex` over an edge of `cost` steps. Forward the
// agent leaves `vertex` at `time`; in reverse it arrives at `vertex` at `time`
// coming from `next`.
fn transition_free(
    constraints: &dyn ConstraintManager,
    vertex: usize,
    next: usize,
    time: usize,
    cost: usize,
    reverse: bool,
) -> bool {
    let swap = |from: usize, to: usize| (from != to).then_some(from);
    if reverse {
        let departure = time - cost;
        (departure..time).all(|t| !constraints.is_constrained(next, t, None))
            && !constraints.is_constrained(vertex, time, swap(next, vertex))
    } else {
        (time + 1..time + cost).all(|t| !constraints.is_constrained(vertex, t, None))
            && !constraints.is_constrained(next, time + cost, swap(vertex, next))
    }
}

// The first vertex of a forward route is where the agent already stands.
fn cached_route_free(
    path: &[usize],
    start_time: usize,
    constraints: &dyn ConstraintManager,
    reverse: bool,
) -> bool {
    let duration = path.len() - 1;
    if reverse {
        let Some(departure) = start_time.checked_sub(duration) else {
            return false;
        };
        !constraints.is_constrained(path[0], departure, None)
            && path.windows(2).enumerate().all(|(k, pair)| {
                let pred = (pair[0] != pair[1]).then_some(pair[0]);
                !constraints.is_constrained(pair[1], departure + k + 1, pred)
            })
    } else {
        path.windows(2).enumerate().all(|(k, pair)| {
            let pred = (pair[0] != pair[1]).then_some(pair[0]);
            !constraints.is_constrained(pair[1], start_time + k + 1, pred)
        })
    }
}
