// Command-line entry point for the molecular dynamics simulator.

use anyhow::{bail, Context, Result};
use clap::Parser;
use rand::Rng;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use moldyn::config::InputDocument;
use moldyn::integrator::ParallelMode;
use moldyn::output::WriterKind;
use moldyn::simulation::{SimKind, Simulation, SimulationOptions};

#[derive(Debug, Parser)]
#[command(
    name = "moldyn",
    about = "Simulate particle dynamics under short-range pair potentials"
)]
struct Args {
    /// Input file describing parameters, particle types and clusters.
    input: Option<PathBuf>,

    /// Override the simulation start time.
    #[arg(long)]
    start_time: Option<f64>,

    /// Override the simulation end time.
    #[arg(short, long)]
    end_time: Option<f64>,

    /// Override the integration time step.
    #[arg(short, long)]
    delta_t: Option<f64>,

    /// Override the depth of the Lennard-Jones potential well.
    #[arg(long)]
    epsilon: Option<f64>,

    /// Override the zero crossing of the Lennard-Jones potential.
    #[arg(long)]
    sigma: Option<f64>,

    /// Log level: off, error, warn, info, debug or trace.
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Simulation kind: planet, lj, linked-lj, domain-lj, mixed-lj or
    /// membrane-lj.
    #[arg(short = 's', long, default_value = "mixed-lj")]
    sim_kind: String,

    /// Output format: vtk, xyz or none.
    #[arg(short, long, default_value = "vtk")]
    writer: String,

    /// Input format: json or empty.
    #[arg(short, long, default_value = "json")]
    reader: String,

    /// Base name for output files.
    #[arg(short, long, default_value = "MD")]
    output: String,

    /// Measure and report particle updates per second.
    #[arg(short, long)]
    profile: bool,

    /// Parallel sweep scheduling: static or task.
    #[arg(short = 'P', long, default_value = "task")]
    parallel: String,

    /// Seed for the Brownian motion initialization. Random if omitted.
    #[arg(long)]
    seed: Option<u64>,
}

fn main() {
    let args = Args::parse();
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(args.log_level.clone()),
    )
    .init();

    if let Err(err) = run(args) {
        log::error!("{err:#}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    println!("🧪 moldyn - molecular dynamics simulator");
    println!("========================================\n");

    let kind = SimKind::parse(&args.sim_kind)?;
    let writer_kind = match args.writer.as_str() {
        "vtk" => WriterKind::Vtk,
        "xyz" => WriterKind::Xyz,
        "none" => WriterKind::None,
        other => bail!("unknown writer kind '{other}'"),
    };
    let parallel = match args.parallel.as_str() {
        "static" => ParallelMode::Static,
        "task" => ParallelMode::Task,
        other => bail!("unknown parallel strategy '{other}'"),
    };

    let mut doc = match args.reader.as_str() {
        "empty" => InputDocument::default(),
        "json" => {
            let path = args
                .input
                .as_ref()
                .context("the json reader needs an input file")?;
            InputDocument::load(path)?
        }
        other => bail!("unknown reader kind '{other}'"),
    };

    if let Some(t) = args.start_time {
        doc.parameters.start_time = t;
    }
    if let Some(t) = args.end_time {
        doc.parameters.end_time = t;
    }
    if let Some(dt) = args.delta_t {
        doc.parameters.delta_t = dt;
    }
    if let Some(eps) = args.epsilon {
        doc.parameters.epsilon = eps;
    }
    if let Some(sig) = args.sigma {
        doc.parameters.sigma = sig;
    }
    doc.validate()?;

    let seed = args.seed.unwrap_or_else(|| rand::rng().random());
    let opts = SimulationOptions {
        kind,
        writer_kind,
        output_prefix: args.output.clone(),
        parallel,
        seed,
    };
    let mut sim = Simulation::from_document(&doc, &opts)?;

    println!(
        "🔧 {} particles ({} active), kind '{}'",
        sim.container.len(),
        sim.container.active_count(),
        kind.name()
    );
    let total = ((doc.parameters.end_time - doc.parameters.start_time)
        / doc.parameters.delta_t)
        .ceil() as u64;
    println!(
        "▶️  Running until t = {} (dt = {}, {} iterations)...\n",
        doc.parameters.end_time, doc.parameters.delta_t, total
    );

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || {
            stop.store(true, Ordering::SeqCst);
        })?;
    }

    let stats = sim.run(&stop, args.profile)?;

    if args.profile {
        println!(
            "📈 {:.0} particle updates per second over {} iterations",
            stats.updates_per_second(),
            stats.iterations
        );
    }
    println!(
        "✅ Finished {} iterations in {:.2}s ({} particles still active)",
        stats.iterations,
        stats.wall.as_secs_f64(),
        sim.container.active_count()
    );
    Ok(())
}
