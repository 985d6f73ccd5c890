use std::time::Instant;

use serde::Deserialize;
use tracing::{debug, instrument, trace};

use super::astar::{Route, RouteSearch};
use super::subset::{SubsetSet, MAX_CLASSES};
use crate::common::{Agent, OrderInstance, Path, PickItem, Tour};
use crate::constraints::ConstraintManager;
use crate::error::PlanError;
use crate::graph::Graph;

/// Instance-wide maxima the solver tables are sized from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolverLimits {
    pub max_classes: usize,
    pub max_items: usize,
    /// Longest duration a single order tour may take.
    pub horizon: usize,
}

impl SolverLimits {
    /// Derives the maxima from the agents' orders. Without an explicit
    /// `horizon`, it is twice the longest unconstrained tour bound plus slack
    /// for every agent that may have to be waited for.
    pub fn from_agents(
        graph: &Graph,
        agents: &[Agent],
        horizon: Option<usize>,
    ) -> Result<Self, PlanError> {
        let orders = || agents.iter().flat_map(|agent| agent.orders.iter());
        let max_classes = orders().map(OrderInstance::classes).max().unwrap_or(0);
        if max_classes > MAX_CLASSES {
            return Err(PlanError::CapacityExceeded {
                what: "item classes per order",
                limit: MAX_CLASSES,
                actual: max_classes,
            });
        }
        let max_items = orders().map(|order| order.items.len()).max().unwrap_or(0);

        let horizon = match horizon {
            Some(horizon) => horizon,
            None => {
                let longest = orders()
                    .map(|order| tour_bound(graph, order))
                    .max()
                    .unwrap_or(0);
                2 * longest + 2 * agents.len() + 1
            }
        };
        Ok(SolverLimits {
            max_classes,
            max_items,
            horizon,
        })
    }

    fn check(&self, order: &OrderInstance) -> Result<(), PlanError> {
        if order.classes() > self.max_classes {
            return Err(PlanError::CapacityExceeded {
                what: "item classes per order",
                limit: self.max_classes,
                actual: order.classes(),
            });
        }
        if order.items.len() > self.max_items {
            return Err(PlanError::CapacityExceeded {
                what: "items per order",
                limit: self.max_items,
                actual: order.items.len(),
            });
        }
        Ok(())
    }
}

// (C + 1) legs of at most the order's diameter, plus the slowest pick of each class.
fn tour_bound(graph: &Graph, order: &OrderInstance) -> usize {
    let vertices: Vec<usize> = order.vertices().collect();
    let diameter = vertices
        .iter()
        .flat_map(|&x| vertices.iter().filter_map(move |&y| graph.distance(x, y)))
        .max()
        .unwrap_or(0);
    let picks: usize = (0..order.classes())
        .map(|class| {
            order
                .items
                .iter()
                .filter(|item| item.class == class)
                .map(|item| item.pick_time)
                .max()
                .unwrap_or(0)
        })
        .sum();
    (order.classes() + 1) * diameter + picks
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OrderSolverKind {
    /// Subset dynamic program with backward reconstruction.
    #[default]
    Dp,
    /// Depth-first branch and bound, nearest candidates first.
    Dfs,
}

#[derive(Debug)]
struct Finish {
    time: usize,
    item: usize,
    total: usize,
    route: Route,
}

/// Order tour solver: start, one item of every class, target.
///
/// `layers[t][i]` holds the class subsets completed by some feasible walk
/// that arrives at item `i` `t` steps after the order starts. The table and
/// the route search scratch are reset at the start of every solve.
#[derive(Debug)]
pub struct GtspSolver {
    limits: SolverLimits,
    kind: OrderSolverKind,
    search: RouteSearch,
    layers: Vec<Vec<Option<SubsetSet>>>,
    solves: usize,
}

impl GtspSolver {
    pub fn new(limits: SolverLimits, kind: OrderSolverKind) -> Self {
        GtspSolver {
            limits,
            kind,
            search: RouteSearch::default(),
            layers: Vec::new(),
            solves: 0,
        }
    }

    pub fn with_search(mut self, search: RouteSearch) -> Self {
        self.search = search;
        self
    }

    pub fn set_deadline(&mut self, deadline: Option<Instant>) {
        self.search.set_deadline(deadline);
    }

    pub fn limits(&self) -> &SolverLimits {
        &self.limits
    }

    pub fn solves(&self) -> usize {
        self.solves
    }

    pub fn expanded_nodes(&self) -> usize {
        self.search.expanded_nodes()
    }

    /// Solves one order with the configured strategy.
    pub fn solve(
        &mut self,
        graph: &Graph,
        constraints: &mut dyn ConstraintManager,
        order: &OrderInstance,
        start_time: usize,
    ) -> Result<Tour, PlanError> {
        match self.kind {
            OrderSolverKind::Dp => self.solve_gtsp(graph, constraints, order, start_time),
            OrderSolverKind::Dfs => {
                let bound = self.limits.horizon;
                self.depth_limited_gtsp(graph, constraints, order, start_time, bound)
            }
        }
    }

    #[instrument(skip_all, name = "gtsp", fields(order = order.id, start = start_time), level = "debug")]
    pub fn solve_gtsp(
        &mut self,
        graph: &Graph,
        constraints: &mut dyn ConstraintManager,
        order: &OrderInstance,
        start_time: usize,
    ) -> Result<Tour, PlanError> {
        self.limits.check(order)?;
        self.solves += 1;
        let unreachable = PlanError::UnreachableRoute {
            from: order.start,
            to: order.target,
            time: start_time,
        };

        if order.classes() == 0 {
            let route = self
                .search
                .shortest_route(graph, order.start, order.target, start_time, constraints, false)?
                .ok_or(unreachable)?;
            return Ok(Tour::direct(start_time, route.path));
        }

        let items = &order.items;
        let pick_vertices: Vec<usize> = items.iter().map(|item| item.vertex).collect();
        let pick_times: Vec<usize> = items.iter().map(|item| item.pick_time).collect();
        constraints.cache_pick_constraints(
            &pick_vertices,
            &pick_times,
            start_time + self.limits.horizon,
        );
        let constraints: &dyn ConstraintManager = constraints;

        let best = self.sweep(graph, constraints, order, start_time)?;
        let Some(best) = best else {
            debug!("no tour within {} steps", self.limits.horizon);
            return Err(unreachable);
        };
        debug!("best finish {} after item {}", best.total, best.item);
        self.reconstruct(graph, constraints, order, start_time, best)
    }

    fn reset_layers(&mut self, items: usize) {
        let horizon = self.limits.horizon;
        if self.layers.len() < horizon {
            self.layers.resize_with(horizon, Vec::new);
        }
        for layer in &mut self.layers[..horizon] {
            layer.clear();
            layer.resize(items, None);
        }
    }

    // Route from `from`, left at relative time `leave`, to `item` such that
    // its pick can start on arrival. Starts from the shortest route and delays
    // the arrival step by step while the dwell would hit a reservation.
    #[allow(clippy::too_many_arguments)]
    fn pick_leg(
        &mut self,
        graph: &Graph,
        constraints: &dyn ConstraintManager,
        from: usize,
        start_time: usize,
        leave: usize,
        item: PickItem,
        horizon: usize,
    ) -> Result<Option<Route>, PlanError> {
        let Some(shortest) =
            self.search
                .shortest_route(graph, from, item.vertex, start_time + leave, constraints, false)?
        else {
            return Ok(None);
        };
        let mut arrive = leave + shortest.duration;
        if arrive >= horizon {
            return Ok(None);
        }
        if !constraints.is_constrained_pick(item.vertex, start_time + arrive, item.pick_time) {
            return Ok(Some(shortest));
        }
        trace!("pick at {} blocked at {}", item.vertex, start_time + arrive);
        arrive += 1;
        while arrive < horizon {
            if !constraints.is_constrained_pick(item.vertex, start_time + arrive, item.pick_time) {
                let delayed = self.search.a_star(
                    graph,
                    from,
                    item.vertex,
                    constraints,
                    start_time + leave,
                    false,
                    Some(arrive - leave),
                )?;
                if delayed.is_some() {
                    return Ok(delayed);
                }
            }
            arrive += 1;
        }
        Ok(None)
    }

    // Forward pass, returns the earliest finish found.
    fn sweep(
        &mut self,
        graph: &Graph,
        constraints: &dyn ConstraintManager,
        order: &OrderInstance,
        start_time: usize,
    ) -> Result<Option<Finish>, PlanError> {
        let classes = order.classes();
        let items = &order.items;
        self.reset_layers(items.len());

        for (i, &item) in items.iter().enumerate() {
            let horizon = self.limits.horizon;
            let leg = self.pick_leg(graph, constraints, order.start, start_time, 0, item, horizon)?;
            if let Some(leg) = leg {
                self.layers[leg.duration][i] = Some(SubsetSet::with_empty_subset(classes));
            }
        }

        let mut best: Option<Finish> = None;
        let mut horizon = self.limits.horizon;
        let mut time = 0;
        while time < horizon {
            for i in 0..items.len() {
                let Some(mut subsets) = self.layers[time][i].take() else {
                    continue;
                };
                let item = items[i];
                subsets.add_class(item.class);
                let leave = time + item.pick_time;

                if subsets.is_complete() {
                    let route = self.search.shortest_route(
                        graph,
                        item.vertex,
                        order.target,
                        start_time + leave,
                        constraints,
                        false,
                    )?;
                    if let Some(route) = route {
                        let total = leave + route.duration;
                        if total < horizon {
                            horizon = total;
                            best = Some(Finish {
                                time,
                                item: i,
                                total,
                                route,
                            });
                        }
                    }
                }

                for (j, &next) in items.iter().enumerate() {
                    if next.class == item.class {
                        continue;
                    }
                    let mut moved = subsets.clone();
                    moved.filter_class(next.class);
                    if moved.is_empty() {
                        continue;
                    }
                    let leg = self.pick_leg(
                        graph,
                        constraints,
                        item.vertex,
                        start_time,
                        leave,
                        next,
                        horizon,
                    )?;
                    let Some(leg) = leg else {
                        continue;
                    };
                    let arrive = leave + leg.duration;
                    match &mut self.layers[arrive][j] {
                        Some(existing) => existing.union(&moved),
                        slot => *slot = Some(moved),
                    }
                }
                self.layers[time][i] = Some(subsets);
            }
            time += 1;
        }
        Ok(best)
    }

    // Walks back from the best finish. For every step a predecessor item is
    // tried with its natural (latest departure) travel time first, then with
    // longer travel times until its table entry covers the remaining classes.
    fn reconstruct(
        &mut self,
        graph: &Graph,
        constraints: &dyn ConstraintManager,
        order: &OrderInstance,
        start_time: usize,
        best: Finish,
    ) -> Result<Tour, PlanError> {
        let items = &order.items;
        let mut routes: Vec<Path> = vec![best.route.path];
        let mut picks: Vec<usize> = vec![best.item];
        let mut remaining: usize = (1 << order.classes()) - 1;
        let (mut current, mut time) = (best.item, best.time);

        loop {
            let item = items[current];
            remaining &= !(1 << item.class);
            if remaining == 0 {
                let route = self.route_exactly(graph, constraints, order.start, item.vertex, start_time, time)?;
                routes.push(route.path);
                break;
            }

            // Natural travel time from every candidate, searched backwards
            // from the arrival at the current item.
            let mut natural: Vec<Option<Route>> = Vec::with_capacity(items.len());
            for candidate in items {
                let route = if remaining >> candidate.class & 1 == 1 {
                    self.search.shortest_route(
                        graph,
                        item.vertex,
                        candidate.vertex,
                        start_time + time,
                        constraints,
                        true,
                    )?
                } else {
                    None
                };
                natural.push(route);
            }

            let mut found = None;
            'extend: for extension in 0..=time {
                let mut feasible = false;
                for (j, candidate) in items.iter().enumerate() {
                    let Some(route) = &natural[j] else {
                        continue;
                    };
                    let travel = route.duration + extension;
                    let Some(arrival) = time.checked_sub(travel + candidate.pick_time) else {
                        continue;
                    };
                    feasible = true;
                    let covered = self.layers[arrival][j]
                        .as_ref()
                        .is_some_and(|subsets| subsets.contains(remaining));
                    if !covered {
                        continue;
                    }
                    let leg = if extension == 0 {
                        Some(route.clone())
                    } else {
                        self.search.a_star(
                            graph,
                            candidate.vertex,
                            item.vertex,
                            constraints,
                            start_time + arrival + candidate.pick_time,
                            false,
                            Some(travel),
                        )?
                    };
                    if let Some(leg) = leg {
                        trace!("item {j} precedes item {current} with {extension} extra steps");
                        found = Some((j, arrival, leg));
                        break 'extend;
                    }
                }
                if !feasible {
                    break;
                }
            }

            let Some((previous, arrival, leg)) = found else {
                return Err(PlanError::UnreachableRoute {
                    from: order.start,
                    to: item.vertex,
                    time: start_time,
                });
            };
            routes.push(leg.path);
            picks.push(previous);
            current = previous;
            time = arrival;
        }

        routes.reverse();
        picks.reverse();
        let pick_vertices = picks.iter().map(|&i| items[i].vertex).collect();
        let pick_times = picks.iter().map(|&i| items[i].pick_time).collect();
        let tour = Tour::new(start_time, routes, pick_vertices, pick_times);
        debug_assert_eq!(tour.duration(), best.total);
        Ok(tour)
    }

    // Route from `from` at `start_time` arriving at `to` exactly `steps` later.
    fn route_exactly(
        &mut self,
        graph: &Graph,
        constraints: &dyn ConstraintManager,
        from: usize,
        to: usize,
        start_time: usize,
        steps: usize,
    ) -> Result<Route, PlanError> {
        let unreachable = PlanError::UnreachableRoute {
            from,
            to,
            time: start_time,
        };
        match self
            .search
            .shortest_route(graph, from, to, start_time, constraints, false)?
        {
            Some(route) if route.duration == steps => Ok(route),
            _ => self
                .search
                .a_star(graph, from, to, constraints, start_time, false, Some(steps))?
                .ok_or(unreachable),
        }
    }

    /// Depth-first search over class orderings, visiting the nearest
    /// candidates first. Returns the first feasible tour that finishes within
    /// `cost_bound` steps of `start_time`.
    #[instrument(skip_all, name = "depth_limited_gtsp", fields(order = order.id, start = start_time, bound = cost_bound), level = "debug")]
    pub fn depth_limited_gtsp(
        &mut self,
        graph: &Graph,
        constraints: &mut dyn ConstraintManager,
        order: &OrderInstance,
        start_time: usize,
        cost_bound: usize,
    ) -> Result<Tour, PlanError> {
        self.limits.check(order)?;
        self.solves += 1;
        let constraints: &dyn ConstraintManager = constraints;
        let mut walk = Walk {
            vertex: order.start,
            time: 0,
            visited: 0,
            routes: Vec::new(),
            picks: Vec::new(),
        };
        if self.descend(graph, constraints, order, start_time, cost_bound, &mut walk)? {
            let pick_vertices = walk.picks.iter().map(|item| item.vertex).collect();
            let pick_times = walk.picks.iter().map(|item| item.pick_time).collect();
            Ok(Tour::new(start_time, walk.routes, pick_vertices, pick_times))
        } else {
            Err(PlanError::UnreachableRoute {
                from: order.start,
                to: order.target,
                time: start_time,
            })
        }
    }

    fn descend(
        &mut self,
        graph: &Graph,
        constraints: &dyn ConstraintManager,
        order: &OrderInstance,
        start_time: usize,
        cost_bound: usize,
        walk: &mut Walk,
    ) -> Result<bool, PlanError> {
        if walk.visited == (1 << order.classes()) - 1 {
            let route = self.search.shortest_route(
                graph,
                walk.vertex,
                order.target,
                start_time + walk.time,
                constraints,
                false,
            )?;
            return Ok(match route {
                Some(route) if walk.time + route.duration <= cost_bound => {
                    walk.routes.push(route.path);
                    true
                }
                _ => false,
            });
        }

        let mut candidates: Vec<PickItem> = order
            .items
            .iter()
            .filter(|item| walk.visited >> item.class & 1 == 0)
            .copied()
            .collect();
        candidates.sort_by_key(|item| graph.distance(walk.vertex, item.vertex).unwrap_or(usize::MAX));

        for item in candidates {
            let Some(route) = self.pick_leg(
                graph,
                constraints,
                walk.vertex,
                start_time,
                walk.time,
                item,
                cost_bound + 1,
            )?
            else {
                continue;
            };
            let leave = walk.time + route.duration + item.pick_time;
            let Some(rest) = graph.heuristic(item.vertex, order.target) else {
                continue;
            };
            if leave + rest > cost_bound {
                continue;
            }

            let saved = (walk.vertex, walk.time, walk.visited);
            walk.routes.push(route.path);
            walk.picks.push(item);
            walk.vertex = item.vertex;
            walk.time = leave;
            walk.visited |= 1 << item.class;
            if self.descend(graph, constraints, order, start_time, cost_bound, walk)? {
                return Ok(true);
            }
            walk.routes.pop();
            walk.picks.pop();
            (walk.vertex, walk.time, walk.visited) = saved;
        }
        Ok(false)
    }
}

// Partial depth-first tour.
struct Walk {
    vertex: usize,
    time: usize,
    visited: usize,
    routes: Vec<Path>,
    picks: Vec<PickItem>,
}
