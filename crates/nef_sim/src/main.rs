use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nef_core::{region, Ensemble, PacingStrategy, RegionImage};
use nef_sim::image::{read_image, write_image};
use nef_sim::probe::{write_outputs, write_summary};
use nef_sim::{DeliveryMode, Scenario, VirtualCore};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "nef-sim")]
#[command(about = "Virtual core for NEF ensembles: simulated fabric, timer and probes")]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario and write probes
    Run {
        /// Scenario TOML file
        scenario: PathBuf,
        /// Directory for outputs.csv, spikes.csv, inputs.csv and summary.json
        #[arg(long, default_value = "nef_out")]
        out: PathBuf,
        /// Override the scenario's tick count
        #[arg(long)]
        ticks: Option<u32>,
        /// Override the delivery-order seed
        #[arg(long)]
        seed: Option<u64>,
        /// Override the delivery mode
        #[arg(long, value_enum)]
        mode: Option<DeliveryMode>,
        /// Override the output pacing strategy
        #[arg(long, value_enum)]
        pacing: Option<PacingStrategy>,
    },
    /// Write a scenario's ensemble as binary regions
    Pack {
        /// Scenario TOML file
        scenario: PathBuf,
        /// Output directory
        out: PathBuf,
    },
    /// Load binary regions and report what they describe
    Inspect {
        /// Directory written by `pack`
        dir: PathBuf,
    },
}

fn init_logging(verbose: u8, json: bool) {
    let level = match verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    // `init` also forwards `log` records from nef_core
    let builder = tracing_subscriber::fmt().with_max_level(level);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn run_scenario(
    path: &Path,
    out: &Path,
    ticks: Option<u32>,
    seed: Option<u64>,
    mode: Option<DeliveryMode>,
    pacing: Option<PacingStrategy>,
) -> Result<()> {
    let mut scenario = Scenario::load(path)
        .with_context(|| format!("loading scenario {}", path.display()))?;
    if let Some(ticks) = ticks {
        scenario.run.ticks = ticks;
    }
    if let Some(seed) = seed {
        scenario.run.seed = seed;
    }
    if let Some(mode) = mode {
        scenario.run.mode = mode;
    }
    if let Some(pacing) = pacing {
        scenario.ensemble.pacing = pacing;
    }

    let mut core = VirtualCore::new(&scenario).context("building virtual core")?;
    let summary = core.run();

    fs::create_dir_all(out).with_context(|| format!("creating {}", out.display()))?;
    write_outputs(
        &out.join("outputs.csv"),
        core.fabric().packets(),
        core.ensemble().output_keys(),
    )?;
    core.probe().write_spikes(&out.join("spikes.csv"))?;
    core.probe().write_inputs(&out.join("inputs.csv"))?;
    write_summary(&out.join("summary.json"), &summary)?;

    info!(dir = %out.display(), "Probes written");
    println!(
        "{} ticks | {} spikes | {:.1} Hz | {} packets out | {} misses",
        summary.ticks,
        summary.spikes,
        summary.mean_rate_hz,
        summary.packets_sent,
        summary.routing_misses
    );
    Ok(())
}

fn pack(path: &Path, out: &Path) -> Result<()> {
    let scenario = Scenario::load(path)
        .with_context(|| format!("loading scenario {}", path.display()))?;
    let image = RegionImage::from_config(&scenario.ensemble).context("packing regions")?;
    write_image(out, &image).with_context(|| format!("writing regions to {}", out.display()))?;
    info!(dir = %out.display(), "Regions written");
    Ok(())
}

fn inspect(dir: &Path) -> Result<()> {
    let image = read_image(dir).with_context(|| format!("reading regions from {}", dir.display()))?;
    let cfg = region::load(&image.regions())?;
    // Allocation is the last thing that can fail at start of day
    let ensemble = Ensemble::new(&cfg)?;
    let p = ensemble.params();
    println!(
        "{} neurons | {} -> {} dims | t_ref {} | dt/tau_rc {} | {:?} pacing",
        p.n_neurons, p.n_input_dimensions, p.n_output_dimensions, p.t_ref, p.dt_over_tau_rc,
        cfg.pacing
    );
    println!(
        "input: {} filters, {} routes | inhibition: {} | PES: {}",
        cfg.input.filters.len(),
        cfg.input.routes.len(),
        cfg.inhibition.is_some(),
        cfg.pes.is_some()
    );
    match p.simulation_ticks {
        Some(ticks) => println!("runs for {} ticks", ticks),
        None => println!("runs until stopped"),
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json);

    let result = match cli.command {
        Commands::Run {
            scenario,
            out,
            ticks,
            seed,
            mode,
            pacing,
        } => run_scenario(&scenario, &out, ticks, seed, mode, pacing),
        Commands::Pack { scenario, out } => pack(&scenario, &out),
        Commands::Inspect { dir } => inspect(&dir),
    };

    if let Err(e) = result {
        error!(error = %format!("{:#}", e), "Fatal Error");
        std::process::exit(1);
    }
}
