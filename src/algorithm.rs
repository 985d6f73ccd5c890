mod astar;
mod conflict;
mod gtsp;
mod subset;

pub use astar::{Route, RouteSearch};
pub use conflict::ConflictDetector;
pub use gtsp::{GtspSolver, OrderSolverKind, SolverLimits};
pub use subset::{SubsetSet, MAX_CLASSES};
