use warehouse_mapf::config::{Cli, Config};
use warehouse_mapf::instance::Instance;
use warehouse_mapf::solver::{IndependentPlanner, PrioritizedPlanner, Solution, Solver, CBS};

use anyhow::{anyhow, Context};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = Cli::parse();

    let config = if let Some(config_file) = cli.config.as_ref() {
        let config_str = std::fs::read_to_string(config_file)
            .with_context(|| format!("cannot read config file: {config_file}"))?;
        Config::from_yaml_str(&config_str)
            .with_context(|| format!("error with config file: {config_file}"))?
    } else {
        info!("No config file specified, using default config");
        Config::default()
    }
    .override_from_command_line(&cli)?;

    let instance = Instance::load_from_file(&config.instance_path)?;
    let (graph, agents) = (&instance.graph, instance.agents.as_slice());

    let mut solver: Box<dyn Solver + '_> = match config.solver.as_str() {
        "cbs" => Box::new(CBS::new(agents, graph, &config)),
        "pp" => Box::new(PrioritizedPlanner::new(agents, graph, &config)),
        "independent" => Box::new(IndependentPlanner::new(agents, graph, &config)),
        other => return Err(anyhow!("Unknown solver: {other}")),
    };

    let solution: Solution = match solver.solve() {
        Ok(solution) => solution,
        Err(err) => {
            error!("{} solve fails: {err}", config.solver);
            return Err(err.into());
        }
    };
    if !solution.verify(graph, agents) {
        return Err(anyhow!("{} returned tours that do not serve the orders", config.solver));
    }
    info!(
        "sum of costs {} makespan {} conflict free {}",
        solution.sum_of_costs(),
        solution.makespan(),
        solution.is_conflict_free(graph)
    );

    if let Some(output_path) = &config.output_path {
        let json = serde_json::to_string_pretty(&solution)?;
        std::fs::write(output_path, json)
            .with_context(|| format!("cannot write solution to {output_path}"))?;
        info!("solution written to {output_path}");
    }

    Ok(())
}
