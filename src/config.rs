use std::time::{Duration, Instant};

use anyhow::anyhow;
use clap::Parser;
use serde::Deserialize;

use crate::algorithm::OrderSolverKind;
use crate::constraints::ConstraintStore;

#[derive(Parser, Debug)]
#[command(
    name = "Warehouse MAPF",
    about = "Conflict-free routing of warehouse pickers through their orders.",
    version = "1.0"
)]
pub struct Cli {
    #[arg(long, help = "Path to a YAML config file")]
    pub config: Option<String>,

    #[arg(long, help = "Path to the YAML instance file")]
    pub instance_path: Option<String>,

    #[arg(long, help = "Path to the JSON solution output")]
    pub output_path: Option<String>,

    #[arg(long, help = "Solver to use: cbs, pp or independent")]
    pub solver: Option<String>,

    #[arg(long, value_enum, help = "Order tour solver")]
    pub order_solver: Option<OrderSolverKind>,

    #[arg(long, value_enum, help = "Reservation table representation")]
    pub constraint_store: Option<ConstraintStore>,

    #[arg(long, help = "Longest duration a single order tour may take")]
    pub horizon: Option<usize>,

    #[arg(long, help = "Node limit of a single route search")]
    pub max_low_level_nodes: Option<usize>,

    #[arg(long, help = "Constraint tree node limit")]
    pub max_high_level_nodes: Option<usize>,

    #[arg(long, help = "Replanning rounds per agent for prioritized planning")]
    pub max_pp_iterations: Option<usize>,

    #[arg(long, help = "Wall clock limit in milliseconds")]
    pub time_limit_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub instance_path: String,
    pub output_path: Option<String>,
    pub solver: String,
    pub order_solver: OrderSolverKind,
    /// Solver default when unset: sparse for cbs, dense for pp.
    pub constraint_store: Option<ConstraintStore>,
    pub horizon: Option<usize>,
    pub max_low_level_nodes: usize,
    pub max_high_level_nodes: usize,
    pub max_pp_iterations: usize,
    pub time_limit_ms: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            instance_path: "map_file/test/warehouse.yaml".to_string(),
            output_path: None,
            solver: "cbs".to_string(),
            order_solver: OrderSolverKind::Dp,
            constraint_store: None,
            horizon: None,
            max_low_level_nodes: 1 << 22,
            max_high_level_nodes: 100_000,
            max_pp_iterations: 1_000,
            time_limit_ms: None,
        }
    }
}

impl Config {
    pub fn from_yaml_str(content: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn override_from_command_line(mut self, cli: &Cli) -> anyhow::Result<Self> {
        if let Some(instance_path) = &cli.instance_path {
            self.instance_path = instance_path.clone();
        }
        if let Some(output_path) = &cli.output_path {
            self.output_path = Some(output_path.clone());
        }
        if let Some(solver) = &cli.solver {
            self.solver = solver.clone();
        }
        if let Some(order_solver) = cli.order_solver {
            self.order_solver = order_solver;
        }
        if let Some(store) = cli.constraint_store {
            self.constraint_store = Some(store);
        }
        if let Some(horizon) = cli.horizon {
            self.horizon = Some(horizon);
        }
        if let Some(limit) = cli.max_low_level_nodes {
            self.max_low_level_nodes = limit;
        }
        if let Some(limit) = cli.max_high_level_nodes {
            self.max_high_level_nodes = limit;
        }
        if let Some(limit) = cli.max_pp_iterations {
            self.max_pp_iterations = limit;
        }
        if let Some(limit) = cli.time_limit_ms {
            self.time_limit_ms = Some(limit);
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        match (self.solver.as_str(), self.constraint_store) {
            ("cbs" | "pp", Some(ConstraintStore::Dummy)) => {
                return Err(anyhow!(
                    "Solver {} needs a real reservation table, got the dummy store",
                    self.solver
                ));
            }
            ("cbs" | "pp" | "independent", _) => {}
            (other, _) => return Err(anyhow!("Unknown solver: {other}")),
        }

        if self.horizon == Some(0) {
            return Err(anyhow!("Horizon must be positive"));
        }
        if self.max_low_level_nodes == 0 || self.max_high_level_nodes == 0 {
            return Err(anyhow!("Node limits must be positive"));
        }
        if self.max_pp_iterations == 0 {
            return Err(anyhow!("Prioritized planning needs at least one round"));
        }
        Ok(())
    }

    /// The store a solver uses when none is configured.
    pub fn store_or(&self, default: ConstraintStore) -> ConstraintStore {
        self.constraint_store.unwrap_or(default)
    }

    pub fn deadline(&self, started: Instant) -> Option<Instant> {
        self.time_limit_ms
            .map(|limit| started + Duration::from_millis(limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_and_command_line() {
        let config = Config::from_yaml_str(
            "solver: pp\norder_solver: dfs\nconstraint_store: sparse\nhorizon: 40\n",
        )
        .unwrap();
        assert_eq!(config.solver, "pp");
        assert_eq!(config.order_solver, OrderSolverKind::Dfs);
        assert_eq!(config.store_or(ConstraintStore::Dense), ConstraintStore::Sparse);
        assert_eq!(config.max_high_level_nodes, 100_000);

        let cli = Cli::parse_from(["warehouse_mapf", "--solver", "cbs", "--time-limit-ms", "500"]);
        let config = config.override_from_command_line(&cli).unwrap();
        assert_eq!(config.solver, "cbs");
        assert_eq!(config.horizon, Some(40));
        assert!(config.deadline(Instant::now()).is_some());
    }

    #[test]
    fn test_validate_rejects() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.constraint_store = Some(ConstraintStore::Dummy);
        assert!(config.validate().is_err());
        config.solver = "independent".to_string();
        assert!(config.validate().is_ok());

        config.solver = "ecbs".to_string();
        assert!(config.validate().is_err());

        let config = Config {
            horizon: Some(0),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
