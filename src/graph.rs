use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::fs;

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::common::{Agent, Path};
use crate::error::PlanError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSlot {
    pub item: usize,
    pub side: usize, // 0: left rack, 1: right rack
    pub height: usize,
    pub pick_time: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VertexKind {
    Plain,
    Storage { slots: Vec<StorageSlot> },
    // Depot or staging area, any number of agents may share it.
    Staging,
}

#[derive(Debug, Clone)]
pub struct Vertex {
    pub index: usize,
    pub coord: Option<(usize, usize)>,
    pub kind: VertexKind,
    pub neighbors: Vec<(usize, usize)>, // (neighbor index, edge cost)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub from: usize,
    pub to: usize,
    pub cost: usize,
}

/// Static warehouse topology plus the unconstrained distance and route caches.
///
/// The caches are filled once by [`Graph::initialize`]; afterwards the graph is
/// only read, so it can be shared between any number of concurrent solves.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    pub vertices: Vec<Vertex>,
    pub edges: Vec<Edge>,
    coord_index: HashMap<(usize, usize), usize>,
    distances: HashMap<usize, Vec<usize>>,
    routes: HashMap<(usize, usize), Path>,
    initialized: bool,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_vertex(&mut self, coord: Option<(usize, usize)>, kind: VertexKind) -> usize {
        let index = self.vertices.len();
        if let Some(coord) = coord {
            self.coord_index.insert(coord, index);
        }
        self.vertices.push(Vertex {
            index,
            coord,
            kind,
            neighbors: Vec::new(),
        });
        index
    }

    pub fn add_edge(&mut self, from: usize, to: usize, cost: usize) -> Result<(), PlanError> {
        if from >= self.vertices.len() || to >= self.vertices.len() {
            return Err(PlanError::InvalidInstance(format!(
                "edge ({from}, {to}) references a missing vertex"
            )));
        }
        if cost == 0 || from == to {
            return Err(PlanError::InvalidInstance(format!(
                "edge ({from}, {to}) must join two vertices with positive cost"
            )));
        }
        self.edges.push(Edge { from, to, cost });
        self.vertices[from].neighbors.push((to, cost));
        self.vertices[to].neighbors.push((from, cost));
        Ok(())
    }

    /// Attaches an item slot to a vertex, turning it into a storage vertex.
    pub fn add_storage_slot(&mut self, vertex: usize, slot: StorageSlot) {
        let kind = &mut self.vertices[vertex].kind;
        match kind {
            VertexKind::Storage { slots } => slots.push(slot),
            _ => *kind = VertexKind::Storage { slots: vec![slot] },
        }
    }

    pub fn set_staging(&mut self, vertex: usize) {
        self.vertices[vertex].kind = VertexKind::Staging;
    }

    pub fn is_staging(&self, vertex: usize) -> bool {
        matches!(self.vertices[vertex].kind, VertexKind::Staging)
    }

    pub fn vertex_at(&self, coord: (usize, usize)) -> Option<usize> {
        self.coord_index.get(&coord).copied()
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn edge_cost(&self, from: usize, to: usize) -> Option<usize> {
        self.vertices[from]
            .neighbors
            .iter()
            .find(|&&(neighbor, _)| neighbor == to)
            .map(|&(_, cost)| cost)
    }

    pub fn get_pick_time(&self, vertex: usize, side: usize, height: usize) -> Option<usize> {
        match &self.vertices.get(vertex)?.kind {
            VertexKind::Storage { slots } => slots
                .iter()
                .find(|slot| slot.side == side && slot.height == height)
                .map(|slot| slot.pick_time),
            _ => None,
        }
    }

    /// Unconstrained shortest distance, if a distance row covers either endpoint.
    pub fn distance(&self, from: usize, to: usize) -> Option<usize> {
        let d = if let Some(row) = self.distances.get(&to) {
            row[from]
        } else {
            self.distances.get(&from)?[to]
        };
        (d != usize::MAX).then_some(d)
    }

    /// Admissible A* heuristic, zero for goals without a cached row and `None`
    /// when the goal cannot be reached from `vertex` at all.
    pub(crate) fn heuristic(&self, vertex: usize, goal: usize) -> Option<usize> {
        match self.distances.get(&goal) {
            Some(row) => (row[vertex] != usize::MAX).then_some(row[vertex]),
            None => Some(0),
        }
    }

    pub fn cached_route(&self, from: usize, to: usize) -> Option<&[usize]> {
        self.routes.get(&(from, to)).map(|route| route.as_slice())
    }

    /// Loads a grid map: header lines (`type`, `height`, `width`, `map`)
    /// followed by rows where `.` is floor, `D` a staging area and anything
    /// else an obstacle.
    pub fn from_grid_str(content: &str) -> anyhow::Result<Self> {
        let mut lines = content.lines();

        let _type = lines.next().ok_or_else(|| anyhow!("missing map type line"))?;
        let height = parse_header(lines.next(), "height")?;
        let width = parse_header(lines.next(), "width")?;
        let _map = lines.next().ok_or_else(|| anyhow!("missing map line"))?;

        let mut graph = Graph::new();
        for (x, line) in lines.take(height).enumerate() {
            for (y, ch) in line.chars().take(width).enumerate() {
                match ch {
                    '.' => {
                        graph.add_vertex(Some((x, y)), VertexKind::Plain);
                    }
                    'D' => {
                        graph.add_vertex(Some((x, y)), VertexKind::Staging);
                    }
                    _ => {}
                }
            }
        }

        // Right and down neighbours only, edges are undirected.
        let mut cells: Vec<((usize, usize), usize)> =
            graph.coord_index.iter().map(|(&c, &i)| (c, i)).collect();
        cells.sort_unstable();
        for ((x, y), index) in cells {
            for neighbor in [(x + 1, y), (x, y + 1)] {
                if let Some(other) = graph.vertex_at(neighbor) {
                    graph.add_edge(index, other, 1)?;
                }
            }
        }

        Ok(graph)
    }

    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content =
            fs::read_to_string(path).with_context(|| format!("cannot read map file {path}"))?;
        Self::from_grid_str(&content).with_context(|| format!("malformed map file {path}"))
    }

    /// Computes the distance rows and cached routes for every vertex referenced
    /// by the agents' orders and freezes the graph.
    pub fn initialize(&mut self, agents: &[Agent]) {
        let mut used = HashSet::new();
        for order in agents.iter().flat_map(|agent| agent.orders.iter()) {
            used.extend(order.vertices());
        }
        let mut used: Vec<usize> = used.into_iter().collect();
        used.sort_unstable();

        let mut towards = HashMap::new();
        for &vertex in &used {
            let (dist, parents) = self.dijkstra(vertex);
            self.distances.insert(vertex, dist);
            towards.insert(vertex, parents);
        }

        for order in agents.iter().flat_map(|agent| agent.orders.iter()) {
            let vertices: Vec<usize> = order.vertices().collect();
            for &x in &vertices {
                for &y in &vertices {
                    if self.routes.contains_key(&(x, y)) {
                        continue;
                    }
                    if let Some(route) = self.unfold_route(x, y, &towards[&y]) {
                        self.routes.insert((x, y), route);
                    }
                }
            }
        }

        debug!(
            "graph initialized: {} distance rows, {} cached routes",
            self.distances.len(),
            self.routes.len()
        );
        self.initialized = true;
    }

    // Follows parent pointers towards `to`, repeating the origin of costly edges
    // so that the route holds one vertex per timestep.
    fn unfold_route(&self, from: usize, to: usize, parents: &[usize]) -> Option<Path> {
        if self.distances[&to][from] == usize::MAX {
            return None;
        }
        let mut route = vec![from];
        let mut current = from;
        while current != to {
            let next = parents[current];
            let cost = self.edge_cost(current, next)?;
            route.extend(std::iter::repeat(current).take(cost - 1));
            route.push(next);
            current = next;
        }
        Some(route)
    }

    fn dijkstra(&self, source: usize) -> (Vec<usize>, Vec<usize>) {
        let mut dist = vec![usize::MAX; self.vertices.len()];
        let mut parents = vec![usize::MAX; self.vertices.len()];
        let mut heap = BinaryHeap::new();

        dist[source] = 0;
        parents[source] = source;
        heap.push((Reverse(0), Reverse(source)));

        while let Some((Reverse(cost), Reverse(vertex))) = heap.pop() {
            if cost > dist[vertex] {
                continue;
            }

            for &(neighbor, edge_cost) in &self.vertices[vertex].neighbors {
                let next_cost = cost + edge_cost;
                if next_cost < dist[neighbor] {
                    dist[neighbor] = next_cost;
                    parents[neighbor] = vertex;
                    heap.push((Reverse(next_cost), Reverse(neighbor)));
                }
            }
        }

        (dist, parents)
    }
}

fn parse_header(line: Option<&str>, name: &str) -> anyhow::Result<usize> {
    let line = line.ok_or_else(|| anyhow!("missing {name} line"))?;
    let value = line
        .split_whitespace()
        .last()
        .ok_or_else(|| anyhow!("empty {name} line"))?;
    value
        .parse::<usize>()
        .with_context(|| format!("invalid {name} value {value:?}"))
}
