use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// No feasible route between two vertices under the active constraints.
    UnreachableRoute {
        from: usize,
        to: usize,
        time: usize,
    },
    /// A declared instance maximum was exceeded. Fatal to the whole run.
    CapacityExceeded {
        what: &'static str,
        limit: usize,
        actual: usize,
    },
    /// The high-level queue ran dry without a conflict-free node.
    SearchExhausted,
    Timeout,
    InvalidInstance(String),
}

impl PlanError {
    /// Errors that only invalidate one low-level solve, not the whole search.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PlanError::UnreachableRoute { .. })
    }
}

impl fmt::Display for PlanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanError::UnreachableRoute { from, to, time } => write!(
                f,
                "no feasible route from vertex {from} to vertex {to} starting at time {time}"
            ),
            PlanError::CapacityExceeded {
                what,
                limit,
                actual,
            } => write!(f, "{what} exceeds declared maximum: {actual} > {limit}"),
            PlanError::SearchExhausted => write!(f, "no feasible joint solution found"),
            PlanError::Timeout => write!(f, "search deadline reached"),
            PlanError::InvalidInstance(reason) => write!(f, "invalid instance: {reason}"),
        }
    }
}

impl std::error::Error for PlanError {}
