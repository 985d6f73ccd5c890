use serde::Serialize;

use super::Path;

/// Realized route of one order: travel segments between consecutive picks and
/// the dwell time spent at every pick vertex.
///
/// `routes[0]` leads from the order start to the first pick, `routes[k]` from
/// pick `k - 1` to pick `k` and the last route ends at the order target. Each
/// route holds one vertex per timestep, both endpoints included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tour {
    pub start_time: usize,
    pub routes: Vec<Path>,
    pub pick_vertices: Vec<usize>,
    pub pick_times: Vec<usize>,
    duration: usize,
}

impl Tour {
    pub fn new(
        start_time: usize,
        routes: Vec<Path>,
        pick_vertices: Vec<usize>,
        pick_times: Vec<usize>,
    ) -> Self {
        debug_assert_eq!(routes.len(), pick_vertices.len() + 1);
        debug_assert_eq!(pick_vertices.len(), pick_times.len());
        debug_assert!(routes.iter().all(|route| !route.is_empty()));
        debug_assert!(pick_vertices
            .iter()
            .enumerate()
            .all(|(k, v)| routes[k].last() == Some(v) && routes[k + 1].first() == Some(v)));

        let duration = routes.iter().map(|route| route.len() - 1).sum::<usize>()
            + pick_times.iter().sum::<usize>();
        Tour {
            start_time,
            routes,
            pick_vertices,
            pick_times,
            duration,
        }
    }

    /// A tour without picks.
    pub fn direct(start_time: usize, route: Path) -> Self {
        Self::new(start_time, vec![route], Vec::new(), Vec::new())
    }

    /// Number of timesteps the tour takes, moves and dwell steps alike.
    pub fn duration(&self) -> usize {
        self.duration
    }

    pub fn end_time(&self) -> usize {
        self.start_time + self.duration
    }

    pub fn start_vertex(&self) -> usize {
        self.routes[0][0]
    }

    pub fn target_vertex(&self) -> usize {
        let last = &self.routes[self.routes.len() - 1];
        last[last.len() - 1]
    }

    /// Vertices occupied at `start_time ..= end_time()`, one per timestep.
    pub fn iter(&self) -> TourIter<'_> {
        TourIter {
            tour: self,
            segment: 0,
            offset: 0,
            dwell: 0,
        }
    }

    pub fn vertex_at(&self, time: usize) -> Option<usize> {
        time.checked_sub(self.start_time)
            .and_then(|offset| self.iter().nth(offset))
    }
}

impl<'a> IntoIterator for &'a Tour {
    type Item = usize;
    type IntoIter = TourIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct TourIter<'a> {
    tour: &'a Tour,
    segment: usize,
    offset: usize,
    dwell: usize,
}

impl Iterator for TourIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        loop {
            if self.dwell > 0 {
                self.dwell -= 1;
                return Some(self.tour.pick_vertices[self.segment - 1]);
            }

            let route = self.tour.routes.get(self.segment)?;
            if self.offset < route.len() {
                self.offset += 1;
                return Some(route[self.offset - 1]);
            }

            if self.segment == self.tour.pick_vertices.len() {
                // Exhausted: park past the last route.
                self.segment = self.tour.routes.len();
                return None;
            }

            // The pick vertex itself closed the route, dwell then skip the
            // first vertex of the next route.
            self.dwell = self.tour.pick_times[self.segment];
            self.segment += 1;
            self.offset = 1;
        }
    }
}

/// Continuous per-timestep sequence of one agent over all of its orders,
/// starting at time 0.
pub fn agent_track(tours: &[Tour]) -> impl Iterator<Item = usize> + '_ {
    tours
        .iter()
        .enumerate()
        .flat_map(|(k, tour)| tour.iter().skip(usize::from(k > 0)))
}

pub fn agent_duration(tours: &[Tour]) -> usize {
    tours.iter().map(Tour::duration).sum()
}

pub fn sum_of_costs(tours: &[Vec<Tour>]) -> usize {
    tours.iter().map(|agent| agent_duration(agent)).sum()
}

pub fn makespan(tours: &[Vec<Tour>]) -> usize {
    tours
        .iter()
        .map(|agent| agent_duration(agent))
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_pick_tour() -> Tour {
        // start 0 -> 1 -> pick 2 (2 steps) -> 3 -> pick 4 (1 step) -> 5
        Tour::new(
            4,
            vec![vec![0, 1, 2], vec![2, 3, 4], vec![4, 5]],
            vec![2, 4],
            vec![2, 1],
        )
    }

    #[test]
    fn test_tour_iteration_matches_duration() {
        let tour = two_pick_tour();
        let vertices: Vec<usize> = tour.iter().collect();
        assert_eq!(vertices, vec![0, 1, 2, 2, 2, 3, 4, 4, 5]);
        assert_eq!(tour.duration(), 8);
        assert_eq!(vertices.len(), tour.duration() + 1);
        assert_eq!(tour.end_time(), 12);
    }

    #[test]
    fn test_zero_length_segments() {
        // Two picks on the same vertex, one right at the start.
        let tour = Tour::new(0, vec![vec![3], vec![3], vec![3, 4]], vec![3, 3], vec![1, 2]);
        let vertices: Vec<usize> = tour.iter().collect();
        assert_eq!(vertices, vec![3, 3, 3, 3, 4]);
        assert_eq!(tour.duration(), 4);
    }

    #[test]
    fn test_vertex_at() {
        let tour = two_pick_tour();
        assert_eq!(tour.vertex_at(3), None);
        assert_eq!(tour.vertex_at(4), Some(0));
        assert_eq!(tour.vertex_at(7), Some(2));
        assert_eq!(tour.vertex_at(12), Some(5));
        assert_eq!(tour.vertex_at(13), None);
    }

    #[test]
    fn test_agent_track_and_metrics() {
        let first = Tour::direct(0, vec![7, 8, 9]);
        let second = Tour::direct(2, vec![9, 8]);
        let track: Vec<usize> = agent_track(&[first.clone(), second.clone()]).collect();
        assert_eq!(track, vec![7, 8, 9, 8]);

        let other = Tour::direct(0, vec![1, 1, 1, 1, 2]);
        let solution = vec![vec![first, second], vec![other]];
        assert_eq!(sum_of_costs(&solution), 7);
        assert_eq!(makespan(&solution), 4);
    }
}
