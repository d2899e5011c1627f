use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use penney_core::{
    AggregateReport, Aggregator, DeckGenerator, GenerationRequest, ProgressLedger, Rule,
    StartMode, Storage,
};
use tracing::{info, warn};

use crate::config::{ResolvedOutputs, ResumeMode, SimulationConfig};
use crate::report::{SimulationSummary, render_heatmap};

/// Runs generation, aggregation and reporting for one seed.
pub struct SimulationRunner {
    config: SimulationConfig,
    outputs: ResolvedOutputs,
    storage: Storage,
}

/// Summary details returned after a run.
pub struct RunSummary {
    pub seed: u64,
    pub resumed: bool,
    pub generation_start: StartMode,
    pub aggregation_start: StartMode,
    pub decks_added: u64,
    pub decks_scored: u64,
    pub decks_processed: u64,
    pub summary_path: PathBuf,
    pub json_path: PathBuf,
    pub plot_paths: Vec<PathBuf>,
    pub report: AggregateReport,
}

impl SimulationRunner {
    /// Build a runner from a validated configuration.
    pub fn new(config: SimulationConfig, outputs: ResolvedOutputs) -> Self {
        let storage = Storage::new(config.storage.root.clone());
        Self {
            config,
            outputs,
            storage,
        }
    }

    /// Whether this run continues earlier work for its seed.
    pub fn should_resume(&self) -> Result<bool> {
        let seed = self.config.simulation.seed;
        Ok(match self.config.simulation.resume {
            ResumeMode::Always => true,
            ResumeMode::Never => false,
            ResumeMode::Auto => self
                .storage
                .seeds_with_progress()
                .with_context(|| format!("checking progress records for seed {seed}"))?
                .contains(&seed),
        })
    }

    pub fn run(&self) -> Result<RunSummary> {
        let params = &self.config.simulation;
        let seed = params.seed;
        let resume = self.should_resume()?;
        if resume {
            info!(seed, "seed already has data; appending new decks");
        }

        let generator = DeckGenerator::with_shard_capacity(self.storage.clone(), params.shard_capacity);
        let generated = generator
            .generate(&GenerationRequest {
                seed,
                count: params.decks,
                half_deck_size: params.half_deck_size,
                resume,
            })
            .with_context(|| format!("generating decks for seed {seed}"))?;

        let report = Aggregator::new(self.storage.clone())
            .process(seed, resume)
            .with_context(|| format!("aggregating seed {seed}"))?;

        ensure_parent(self.outputs.summary_md.parent())?;
        let summary = SimulationSummary::from_report(&report);
        summary
            .write_markdown(&self.outputs.summary_md)
            .with_context(|| format!("writing summary for seed {seed}"))?;
        let json_path = self.outputs.summary_md.with_extension("json");
        summary
            .write_json(&json_path)
            .with_context(|| format!("writing summary for seed {seed}"))?;

        let mut plot_paths = Vec::new();
        if self.config.heatmap.enabled {
            for rule in Rule::ALL {
                match render_heatmap(report.table(rule), &self.outputs.plots_dir, &self.config.heatmap) {
                    Ok(path) => plot_paths.push(path),
                    Err(err) => warn!(seed, %rule, "heatmap skipped: {err}"),
                }
            }
        }

        Ok(RunSummary {
            seed,
            resumed: resume,
            generation_start: generated.start,
            aggregation_start: report.start,
            decks_added: generated.decks_added,
            decks_scored: report.decks_added,
            decks_processed: report.decks_processed(),
            summary_path: self.outputs.summary_md.clone(),
            json_path,
            plot_paths,
            report,
        })
    }
}

/// `(seed, decks processed)` for every seed under `root`.
pub fn processed_seeds(root: impl Into<PathBuf>) -> Result<Vec<(u64, u64)>> {
    let storage = Storage::new(root);
    ProgressLedger::new(storage.clone())
        .entries()
        .with_context(|| format!("reading progress records under {}", storage.root().display()))
}

fn ensure_parent(path: Option<&Path>) -> Result<()> {
    if let Some(dir) = path.filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .with_context(|| format!("creating output directory {}", dir.display()))?;
    }
    Ok(())
}
