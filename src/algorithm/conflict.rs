use tracing::debug;

use crate::common::{agent_track, Conflict, ConflictType, Tour};
use crate::graph::Graph;

/// Finds the earliest collision of a joint solution.
///
/// Occupant buckets for the current and the next timestep are kept between
/// calls; every entry is removed again before a call returns.
#[derive(Debug, Default)]
pub struct ConflictDetector {
    current: Vec<Vec<usize>>,
    next: Vec<Vec<usize>>,
}

impl ConflictDetector {
    pub fn new(vertices: usize) -> Self {
        ConflictDetector {
            current: vec![Vec::new(); vertices],
            next: vec![Vec::new(); vertices],
        }
    }

    /// Agents are scanned in index order; at each timestep vertex conflicts
    /// are reported before swaps over the following step. An agent whose last
    /// order has ended no longer occupies any vertex.
    pub fn find_conflict<T: AsRef<[Tour]>>(
        &mut self,
        graph: &Graph,
        tours: &[T],
    ) -> Option<Conflict> {
        if self.current.len() < graph.len() {
            self.current.resize(graph.len(), Vec::new());
            self.next.resize(graph.len(), Vec::new());
        }

        let mut tracks: Vec<_> = tours.iter().map(|agent| agent_track(agent.as_ref())).collect();
        let mut now: Vec<Option<usize>> = tracks.iter_mut().map(|track| track.next()).collect();
        let mut then: Vec<Option<usize>> = tracks.iter_mut().map(|track| track.next()).collect();
        for (agent, vertex) in now.iter().enumerate() {
            if let Some(v) = *vertex {
                self.current[v].push(agent);
            }
        }

        let mut time = 0;
        let conflict = loop {
            if now.iter().all(Option::is_none) {
                break None;
            }

            // Vertex conflicts at `time`.
            if let Some(conflict) = self.vertex_conflict(graph, &now, time) {
                break Some(conflict);
            }

            // Swaps between `time` and `time + 1`.
            for (agent, vertex) in then.iter().enumerate() {
                if let Some(v) = *vertex {
                    self.next[v].push(agent);
                }
            }
            if let Some(conflict) = self.edge_conflict(&now, &then, time) {
                break Some(conflict);
            }

            for vertex in now.iter().flatten() {
                self.current[*vertex].clear();
            }
            std::mem::swap(&mut self.current, &mut self.next);
            std::mem::swap(&mut now, &mut then);
            for (slot, track) in then.iter_mut().zip(tracks.iter_mut()) {
                *slot = track.next();
            }
            time += 1;
        };

        for vertex in now.iter().chain(then.iter()).flatten() {
            self.current[*vertex].clear();
            self.next[*vertex].clear();
        }
        if let Some(conflict) = &conflict {
            debug!("conflict: {conflict:?}");
        }
        conflict
    }

    fn vertex_conflict(&self, graph: &Graph, now: &[Option<usize>], time: usize) -> Option<Conflict> {
        now.iter().flatten().find_map(|&vertex| {
            let visitors = &self.current[vertex];
            (visitors.len() > 1 && !graph.is_staging(vertex)).then(|| Conflict {
                agent_1: visitors[0],
                agent_2: visitors[1],
                conflict_type: ConflictType::Vertex { vertex, time },
            })
        })
    }

    fn edge_conflict(&self, now: &[Option<usize>], then: &[Option<usize>], time: usize) -> Option<Conflict> {
        for (agent, step) in now.iter().zip(then).enumerate() {
            let (Some(from), Some(to)) = step else {
                continue;
            };
            if from == to {
                continue;
            }
            // Someone arrives at `from` after standing on `to`.
            if let Some(&other) = self.next[*from]
                .iter()
                .find(|&&other| other != agent && now[other] == Some(*to))
            {
                return Some(Conflict {
                    agent_1: agent,
                    agent_2: other,
                    conflict_type: ConflictType::Edge {
                        from: *from,
                        to: *to,
                        time,
                    },
                });
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::VertexKind;

    fn line_graph(staging: &[usize]) -> Graph {
        let mut graph = Graph::new();
        for v in 0..4 {
            let kind = if staging.contains(&v) {
                VertexKind::Staging
            } else {
                VertexKind::Plain
            };
            graph.add_vertex(None, kind);
        }
        for v in 0..3 {
            graph.add_edge(v, v + 1, 1).unwrap();
        }
        graph
    }

    fn single(start_time: usize, route: Vec<usize>) -> Vec<Tour> {
        vec![Tour::direct(start_time, route)]
    }

    #[test]
    fn test_reports_first_vertex_conflict() {
        let graph = line_graph(&[]);
        let mut detector = ConflictDetector::new(graph.len());
        let tours = vec![
            single(0, vec![0, 1, 2, 3]),
            single(0, vec![3, 3, 2, 2]),
        ];
        let conflict = detector.find_conflict(&graph, &tours).unwrap();
        assert_eq!(
            conflict,
            Conflict {
                agent_1: 0,
                agent_2: 1,
                conflict_type: ConflictType::Vertex { vertex: 2, time: 2 }
            }
        );
    }

    #[test]
    fn test_detects_swap() {
        let graph = line_graph(&[]);
        let mut detector = ConflictDetector::new(graph.len());
        let tours = vec![single(0, vec![0, 1, 2]), single(0, vec![3, 2, 1])];
        let conflict = detector.find_conflict(&graph, &tours).unwrap();
        assert_eq!(
            conflict.conflict_type,
            ConflictType::Edge {
                from: 1,
                to: 2,
                time: 1
            }
        );
        assert_eq!((conflict.agent_1, conflict.agent_2), (0, 1));
    }

    #[test]
    fn test_staging_vertex_is_shared() {
        let graph = line_graph(&[0]);
        let mut detector = ConflictDetector::new(graph.len());
        let tours = vec![
            single(0, vec![0, 1, 2]),
            single(0, vec![0, 0, 1]),
            single(0, vec![0, 0, 0]),
        ];
        assert_eq!(detector.find_conflict(&graph, &tours), None);
    }

    #[test]
    fn test_finished_agent_leaves_the_graph() {
        let graph = line_graph(&[]);
        let mut detector = ConflictDetector::new(graph.len());
        let tours = vec![single(0, vec![1, 2]), single(0, vec![0, 0, 1, 2])];
        assert_eq!(detector.find_conflict(&graph, &tours), None);
    }

    #[test]
    fn test_buckets_are_reset_between_calls() {
        let graph = line_graph(&[]);
        let mut detector = ConflictDetector::new(graph.len());
        let colliding = vec![single(0, vec![0, 1]), single(0, vec![2, 1])];
        assert!(detector.find_conflict(&graph, &colliding).is_some());
        assert!(detector.current.iter().chain(&detector.next).all(Vec::is_empty));

        let apart = vec![single(0, vec![0, 1]), single(0, vec![3, 2])];
        assert_eq!(detector.find_conflict(&graph, &apart), None);
    }

    #[test]
    fn test_tracks_span_consecutive_orders() {
        let graph = line_graph(&[]);
        let mut detector = ConflictDetector::new(graph.len());
        let tours = vec![
            vec![Tour::direct(0, vec![0, 1]), Tour::direct(1, vec![1, 2, 3])],
            single(0, vec![3, 3, 3, 2]),
        ];
        let conflict = detector.find_conflict(&graph, &tours).unwrap();
        assert_eq!(
            conflict.conflict_type,
            ConflictType::Edge {
                from: 2,
                to: 3,
                time: 2
            }
        );
    }
}
