use std::path::PathBuf;

use clap::Parser;

use penney_bench::config::{ResolvedOutputs, ResumeMode, SimulationConfig};
use penney_bench::logging::init_logging;
use penney_bench::runner::{SimulationRunner, processed_seeds};
use penney_core::StartMode;

/// Penney's Game deck simulation and pair statistics.
#[derive(Debug, Parser)]
#[command(
    name = "penney-sim",
    author,
    version,
    about = "Incremental Penney's Game simulation harness"
)]
struct Cli {
    /// Path to a YAML configuration file (defaults apply when omitted).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the run identifier (substitutes {run_id} templates).
    #[arg(long, value_name = "RUN_ID")]
    run_id: Option<String>,

    /// Override the seed for deck generation.
    #[arg(long, value_name = "SEED")]
    seed: Option<u64>,

    /// Override the number of new decks to generate.
    #[arg(short = 'n', long, value_name = "COUNT")]
    decks: Option<u64>,

    /// Override the number of cards of each colour per deck.
    #[arg(long, value_name = "SIZE")]
    half_deck_size: Option<usize>,

    /// Override the storage root for decks, state and statistics.
    #[arg(long, value_name = "DIR")]
    storage_root: Option<PathBuf>,

    /// Always continue existing data for the seed.
    #[arg(long, conflicts_with = "fresh")]
    resume: bool,

    /// Discard existing data for the seed and start over.
    #[arg(long)]
    fresh: bool,

    /// Skip heatmap rendering.
    #[arg(long)]
    no_plots: bool,

    /// List seeds with processed decks and exit.
    #[arg(long)]
    list: bool,

    /// Exit after validating the configuration (nothing is generated).
    #[arg(long)]
    validate_only: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = match cli.config.as_ref() {
        Some(path) => SimulationConfig::from_path(path)?,
        None => SimulationConfig::default(),
    };

    if let Some(run_id) = cli.run_id {
        config.run_id = run_id;
    }

    if let Some(seed) = cli.seed {
        config.simulation.seed = seed;
    }

    if let Some(decks) = cli.decks {
        config.simulation.decks = decks;
    }

    if let Some(half) = cli.half_deck_size {
        config.simulation.half_deck_size = half;
    }

    if let Some(root) = cli.storage_root {
        config.storage.root = root;
    }

    if cli.resume {
        config.simulation.resume = ResumeMode::Always;
    } else if cli.fresh {
        config.simulation.resume = ResumeMode::Never;
    }

    if cli.no_plots {
        config.heatmap.enabled = false;
    }

    config.validate()?;

    if cli.list {
        let seeds = processed_seeds(config.storage.root.clone())?;
        if seeds.is_empty() {
            println!("No processed decks under {}", config.storage.root.display());
        }
        for (seed, decks) in seeds {
            println!("Seed {seed}: {decks} decks processed");
        }
        return Ok(());
    }

    let outputs: ResolvedOutputs = config.resolved_outputs();
    let run_id = config.run_id.clone();
    let seed = config.simulation.seed;
    let decks = config.simulation.decks;
    let half = config.simulation.half_deck_size;

    println!(
        "Loaded configuration '{run_id}': seed {seed}, {decks} new deck{} of {} cards",
        if decks == 1 { "" } else { "s" },
        half * 2
    );

    let _logging_guard = init_logging(&config.logging, &outputs)?;
    let runner = SimulationRunner::new(config, outputs);

    if cli.validate_only {
        println!("Validation-only mode: simulation skipped.");
        return Ok(());
    }

    let summary = runner.run()?;
    if summary.resumed {
        println!("Seed {} already has data; appended to it.", summary.seed);
    }
    for (stage, start) in [
        ("generation", summary.generation_start),
        ("aggregation", summary.aggregation_start),
    ] {
        if start == StartMode::FreshAfterMissingState {
            println!("WARN: nothing persisted to resume {stage} from; started fresh.");
        }
    }
    println!(
        "Simulation complete for seed {}: {} decks generated, {} scored, {} processed in total",
        summary.seed, summary.decks_added, summary.decks_scored, summary.decks_processed
    );
    println!("Summary table: {}", summary.summary_path.display());
    println!("Summary data: {}", summary.json_path.display());
    for path in &summary.plot_paths {
        println!("Heatmap: {}", path.display());
    }

    Ok(())
}
