use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::Level;

const DEFAULT_HALF_DECK_SIZE: usize = 26;
const DEFAULT_SHARD_CAPACITY: usize = penney_core::generator::shard::DEFAULT_SHARD_CAPACITY;
const RUN_ID_ALLOWED: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789._-";

/// Root simulation configuration loaded from YAML.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SimulationConfig {
    #[serde(default = "default_run_id")]
    pub run_id: String,
    #[serde(default)]
    pub simulation: SimulationParams,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub outputs: OutputsConfig,
    #[serde(default)]
    pub heatmap: HeatmapConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            run_id: default_run_id(),
            simulation: SimulationParams::default(),
            storage: StorageConfig::default(),
            outputs: OutputsConfig::default(),
            heatmap: HeatmapConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl SimulationConfig {
    /// Load configuration from a YAML file on disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let path_buf = path.to_path_buf();
        let file = File::open(path).map_err(|source| ConfigError::Read {
            source,
            path: path_buf.clone(),
        })?;
        let reader = BufReader::new(file);
        let mut cfg: SimulationConfig =
            serde_yaml::from_reader(reader).map_err(|source| ConfigError::Parse {
                source,
                path: path_buf.clone(),
            })?;
        cfg.validate().map_err(|source| ConfigError::Invalid {
            path: path_buf,
            source,
        })?;
        Ok(cfg)
    }

    /// Validate the configuration without performing I/O.
    pub fn validate(&mut self) -> Result<(), ValidationError> {
        validate_run_id(&self.run_id)?;
        self.simulation.validate()?;
        self.storage.validate()?;
        self.outputs.validate(&self.run_id)?;
        self.heatmap.validate()?;
        self.logging.normalize();
        Ok(())
    }

    /// Resolve output templates (e.g., `{run_id}` placeholders) into concrete paths.
    pub fn resolved_outputs(&self) -> ResolvedOutputs {
        ResolvedOutputs {
            summary_md: resolve_template(&self.run_id, &self.outputs.summary_md),
            plots_dir: resolve_template(&self.run_id, &self.outputs.plots_dir),
        }
    }
}

fn default_run_id() -> String {
    "penney".to_string()
}

/// Deck generation parameters.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SimulationParams {
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub decks: u64,
    #[serde(default = "default_half_deck_size")]
    pub half_deck_size: usize,
    #[serde(default)]
    pub resume: ResumeMode,
    #[serde(default = "default_shard_capacity")]
    pub shard_capacity: usize,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            seed: 0,
            decks: 0,
            half_deck_size: default_half_deck_size(),
            resume: ResumeMode::default(),
            shard_capacity: default_shard_capacity(),
        }
    }
}

impl SimulationParams {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.half_deck_size == 0 {
            return Err(ValidationError::InvalidField {
                field: "simulation.half_deck_size".to_string(),
                message: "half-deck size must be greater than zero".to_string(),
            });
        }

        if self.shard_capacity == 0 {
            return Err(ValidationError::InvalidField {
                field: "simulation.shard_capacity".to_string(),
                message: "shard capacity must be at least 1".to_string(),
            });
        }

        Ok(())
    }
}

fn default_half_deck_size() -> usize {
    DEFAULT_HALF_DECK_SIZE
}

fn default_shard_capacity() -> usize {
    DEFAULT_SHARD_CAPACITY
}

/// Whether a run continues previously persisted decks and statistics.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResumeMode {
    /// Resume when the seed already has a progress record.
    #[default]
    Auto,
    Always,
    Never,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct StorageConfig {
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
        }
    }
}

impl StorageConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.root.as_os_str().is_empty() {
            return Err(ValidationError::InvalidField {
                field: "storage.root".to_string(),
                message: "path must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("data")
}

/// Output artifact configuration.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct OutputsConfig {
    #[serde(default = "default_summary_md")]
    pub summary_md: String,
    #[serde(default = "default_plots_dir")]
    pub plots_dir: String,
}

impl Default for OutputsConfig {
    fn default() -> Self {
        Self {
            summary_md: default_summary_md(),
            plots_dir: default_plots_dir(),
        }
    }
}

impl OutputsConfig {
    fn validate(&self, run_id: &str) -> Result<(), ValidationError> {
        for (label, value) in [
            ("outputs.summary_md", &self.summary_md),
            ("outputs.plots_dir", &self.plots_dir),
        ] {
            if value.trim().is_empty() {
                return Err(ValidationError::InvalidField {
                    field: label.to_string(),
                    message: "path must not be empty".to_string(),
                });
            }

            let resolved = resolve_template(run_id, value);
            if resolved.components().count() == 0 {
                return Err(ValidationError::InvalidField {
                    field: label.to_string(),
                    message: "resolved path is invalid".to_string(),
                });
            }
        }
        Ok(())
    }
}

fn default_summary_md() -> String {
    "figures/{run_id}/summary.md".to_string()
}

fn default_plots_dir() -> String {
    "figures/{run_id}".to_string()
}

/// Heatmap colour scale, in percent.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct HeatmapConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub vmin: f64,
    #[serde(default = "default_vmax")]
    pub vmax: f64,
    /// TrueType font for labels; common system fonts are tried when unset.
    #[serde(default)]
    pub font_path: Option<PathBuf>,
}

impl Default for HeatmapConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            vmin: 0.0,
            vmax: default_vmax(),
            font_path: None,
        }
    }
}

impl HeatmapConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if !(self.vmin.is_finite() && self.vmax.is_finite()) || self.vmin >= self.vmax {
            return Err(ValidationError::InvalidField {
                field: "heatmap".to_string(),
                message: format!(
                    "vmin ({}) must be finite and below vmax ({})",
                    self.vmin, self.vmax
                ),
            });
        }
        Ok(())
    }
}

fn default_enabled() -> bool {
    true
}

fn default_vmax() -> f64 {
    100.0
}

/// Logging configuration defaults to disabled structured logs.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default)]
    pub enable_structured: bool,
    #[serde(default = "default_tracing_level")]
    pub tracing_level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enable_structured: false,
            tracing_level: default_tracing_level(),
        }
    }
}

impl LoggingConfig {
    fn normalize(&mut self) {
        if self.tracing_level.trim().is_empty() {
            self.tracing_level = default_tracing_level();
        }
    }

    pub fn level(&self) -> Option<Level> {
        match self.tracing_level.to_ascii_lowercase().as_str() {
            "trace" => Some(Level::TRACE),
            "debug" => Some(Level::DEBUG),
            "info" => Some(Level::INFO),
            "warn" | "warning" => Some(Level::WARN),
            "error" => Some(Level::ERROR),
            _ => None,
        }
    }
}

fn default_tracing_level() -> String {
    "info".to_string()
}

fn validate_run_id(run_id: &str) -> Result<(), ValidationError> {
    if run_id.trim().is_empty() {
        return Err(ValidationError::InvalidField {
            field: "run_id".to_string(),
            message: "run_id must not be empty".to_string(),
        });
    }

    if !run_id.chars().all(|c| RUN_ID_ALLOWED.contains(c)) {
        return Err(ValidationError::InvalidField {
            field: "run_id".to_string(),
            message: "run_id may only contain alphanumeric characters, '.', '_' or '-'".to_string(),
        });
    }

    Ok(())
}

fn resolve_template(run_id: &str, template: &str) -> PathBuf {
    let replaced = template.replace("{run_id}", run_id);
    PathBuf::from(replaced)
}

/// Fully resolved output paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOutputs {
    pub summary_md: PathBuf,
    pub plots_dir: PathBuf,
}

/// Errors surfaced when loading configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("failed to parse config {path:?}: {source}")]
    Parse {
        #[source]
        source: serde_yaml::Error,
        path: PathBuf,
    },
    #[error("invalid config {path:?}: {source}")]
    Invalid {
        #[source]
        source: ValidationError,
        path: PathBuf,
    },
}

/// Validation failures for a parsed configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field}: {message}")]
    InvalidField { field: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASIC_YAML: &str = r#"
run_id: "seed42_run"
simulation:
  seed: 42
  decks: 100000
  resume: "never"
storage:
  root: "data"
outputs:
  summary_md: "figures/{run_id}/summary.md"
  plots_dir: "figures/{run_id}/plots"
heatmap:
  vmin: 20
  vmax: 80
logging:
  enable_structured: true
  tracing_level: "debug"
"#;

    #[test]
    fn loads_and_validates_basic_config() {
        let mut cfg: SimulationConfig = serde_yaml::from_str(BASIC_YAML).expect("parse yaml");
        cfg.validate().expect("validate");

        assert_eq!(cfg.simulation.half_deck_size, DEFAULT_HALF_DECK_SIZE);
        assert_eq!(cfg.simulation.shard_capacity, 50_000);
        assert_eq!(cfg.simulation.resume, ResumeMode::Never);
        assert!(cfg.logging.enable_structured);
        assert_eq!(cfg.logging.level(), Some(Level::DEBUG));

        let outputs = cfg.resolved_outputs();
        assert_eq!(
            outputs.summary_md,
            PathBuf::from("figures/seed42_run/summary.md")
        );
    }

    #[test]
    fn empty_document_uses_defaults() {
        let mut cfg: SimulationConfig = serde_yaml::from_str("{}").expect("parse");
        cfg.validate().expect("defaults validate");
        assert_eq!(cfg, SimulationConfig::default());
        assert_eq!(cfg.simulation.resume, ResumeMode::Auto);
        assert_eq!(cfg.storage.root, PathBuf::from("data"));
    }

    #[test]
    fn rejects_zero_half_deck_size() {
        let yaml = BASIC_YAML.replace("decks: 100000", "decks: 10\n  half_deck_size: 0");
        let mut cfg: SimulationConfig = serde_yaml::from_str(&yaml).expect("parse");
        let err = cfg.validate().expect_err("should fail");
        assert!(matches!(
            err,
            ValidationError::InvalidField { field, .. } if field == "simulation.half_deck_size"
        ));
    }

    #[test]
    fn rejects_inverted_colour_scale() {
        let yaml = BASIC_YAML.replace("vmin: 20", "vmin: 90");
        let mut cfg: SimulationConfig = serde_yaml::from_str(&yaml).expect("parse");
        let err = cfg.validate().expect_err("should fail");
        assert!(matches!(
            err,
            ValidationError::InvalidField { field, .. } if field == "heatmap"
        ));
    }

    #[test]
    fn rejects_negative_deck_count() {
        let yaml = BASIC_YAML.replace("decks: 100000", "decks: -5");
        assert!(serde_yaml::from_str::<SimulationConfig>(&yaml).is_err());
    }

    #[test]
    fn rejects_invalid_run_id() {
        let yaml = BASIC_YAML.replace("seed42_run", "seed 42 run");
        let mut cfg: SimulationConfig = serde_yaml::from_str(&yaml).expect("parse");
        let err = cfg.validate().expect_err("invalid run id");
        assert!(matches!(
            err,
            ValidationError::InvalidField { field, .. } if field == "run_id"
        ));
    }

    #[test]
    fn outputs_resolve_template_multiple_occurrences() {
        let yaml = BASIC_YAML.replace(
            "figures/{run_id}/plots",
            "figures/{run_id}/{run_id}/plots",
        );
        let mut cfg: SimulationConfig = serde_yaml::from_str(&yaml).expect("parse");
        cfg.validate().expect("valid");
        let outputs = cfg.resolved_outputs();
        assert_eq!(
            outputs.plots_dir,
            PathBuf::from("figures/seed42_run/seed42_run/plots")
        );
    }
}
