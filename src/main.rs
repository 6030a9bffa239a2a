use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::info;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use egress::agent::Agent;
use egress::error::BuildError;
use egress::finder::Finder;
use egress::geometry::Geometry;
use egress::mesh::Mesher;
use egress::output::write_trajectories;
use egress::params::{AGENT_COUNT, POOL_INNER, POOL_OUTER, POOL_SIM, REFINE_PASSES};
use egress::parse::parse_geometry;
use egress::plot::Plotter;
use egress::router::Router;
use egress::sim::{place_agents, Simulation};
use egress::util::timed_stage;

/// Egress - crowd evacuation simulator for partitioned floor plans
#[derive(Parser, Debug)]
#[command(name = "egress", version, about)]
struct Cli {
    /// Geometry specification file
    #[arg(short = 'g', long)]
    geometry: PathBuf,

    /// Output trajectory file
    #[arg(short = 'o', long)]
    output: PathBuf,

    /// Optional SVG plot file
    #[arg(short = 'p', long)]
    plot: Option<PathBuf>,

    /// Random seed for agent placement
    #[arg(long)]
    seed: Option<u64>,

    /// Number of agents
    #[arg(long, default_value_t = AGENT_COUNT)]
    agents: usize,

    /// Mesh refinement passes
    #[arg(long, default_value_t = REFINE_PASSES)]
    refine: u64,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    if !cli.geometry.is_file() {
        eprintln!("invalid geometry file");
        return ExitCode::from(1);
    }
    if !parent_exists(&cli.output) {
        eprintln!("output file directory does not exist");
        return ExitCode::from(1);
    }
    if let Some(plot) = &cli.plot {
        if !parent_exists(plot) {
            eprintln!("plot file directory does not exist");
            return ExitCode::from(1);
        }
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::from(2)
        }
    }
}

fn parent_exists(path: &PathBuf) -> bool {
    match path.parent() {
        Some(dir) => dir.as_os_str().is_empty() || dir.exists(),
        None => false,
    }
}

fn run(cli: Cli) -> Result<(), BuildError> {
    let mut geometry = Geometry::new(Mesher::new(cli.refine), true);

    timed_stage("Parsing", || {
        parse_geometry(&cli.geometry, &mut geometry)?;
        geometry.finalize()
    })?;
    info!("{} cells meshed", geometry.cell_count());

    let finder = Finder::new(&geometry, POOL_INNER, POOL_OUTER);
    let router = timed_stage("Routing", || Router::new(&geometry, &finder));

    let seed = cli.seed.unwrap_or_else(rand::random);
    info!("seed: {seed}");
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let spots = place_agents(&geometry, cli.agents, &mut rng)?;
    let agents: Vec<Agent> = spots
        .iter()
        .enumerate()
        .map(|(i, &(cell, pos))| Agent::new(i, i, cell, pos))
        .collect();

    let simulation = Simulation::new(&geometry, &router, agents, POOL_SIM);
    timed_stage("Simulating", || simulation.run());
    let agents = simulation.into_agents();

    timed_stage("Writing", || {
        let file = File::create(&cli.output)
            .map_err(|e| BuildError::Output(format!("could not create the output file: {e}")))?;
        let mut out = BufWriter::new(file);
        write_trajectories(&mut out, &geometry, &agents)
            .map_err(|e| BuildError::Output(format!("could not write trajectories: {e}")))
    })?;

    if let Some(path) = &cli.plot {
        timed_stage("Plotting", || {
            let mut plotter = Plotter::new(&geometry, &agents);
            plotter.background = "#FFFFFF".into();
            plotter.mesh_color = "#9F9F9F".into();
            plotter.wall_color = "#707070".into();
            plotter.interface_color = "#808080".into();
            plotter.start_color = "#912d40".into();
            plotter.end_color = "#912d40".into();

            let file = File::create(path)
                .map_err(|e| BuildError::Output(format!("could not create the plot file: {e}")))?;
            let mut out = BufWriter::new(file);
            plotter
                .plot(&mut out)
                .map_err(|e| BuildError::Output(format!("could not write the plot: {e}")))
        })?;
    }

    Ok(())
}
