use std::fs;

use penney_bench::config::SimulationConfig;
use penney_bench::runner::{SimulationRunner, processed_seeds};
use penney_core::{Rule, StartMode};
use tempfile::tempdir;

fn load_config(output_dir: &std::path::Path, decks: u64) -> SimulationConfig {
    let yaml = format!(
        r#"
run_id: "test_smoke"
simulation:
  seed: 4242
  decks: {decks}
  half_deck_size: 8
  shard_capacity: 40
storage:
  root: "{root}"
outputs:
  summary_md: "{summary}"
  plots_dir: "{plots}"
logging:
  enable_structured: false
"#,
        root = output_dir.join("data").display(),
        summary = output_dir.join("out/summary.md").display(),
        plots = output_dir.join("out/plots").display()
    );

    let mut cfg: SimulationConfig = serde_yaml::from_str(&yaml).expect("valid yaml");
    cfg.validate().expect("config validates");
    cfg
}

#[test]
fn run_then_resume_accumulates_statistics() {
    let dir = tempdir().expect("temp dir");

    let config = load_config(dir.path(), 90);
    let outputs = config.resolved_outputs();
    let runner = SimulationRunner::new(config, outputs);
    assert!(!runner.should_resume().expect("resume check"));
    let first = runner.run().expect("first run completes");

    assert!(!first.resumed);
    assert_eq!(first.generation_start, StartMode::Fresh);
    assert_eq!(first.decks_added, 90);
    assert_eq!(first.decks_processed, 90);
    assert!(first.summary_path.exists(), "summary markdown missing");
    for path in &first.plot_paths {
        assert!(path.exists(), "plot path reported but missing on disk");
    }

    let markdown = fs::read_to_string(&first.summary_path).expect("summary readable");
    assert!(markdown.contains("seed 4242"));
    assert!(markdown.contains("(N = 90)"));

    let config = load_config(dir.path(), 25);
    let outputs = config.resolved_outputs();
    let second = SimulationRunner::new(config, outputs)
        .run()
        .expect("second run completes");

    assert!(second.resumed);
    assert_eq!(second.generation_start, StartMode::Resumed);
    assert_eq!(second.aggregation_start, StartMode::Resumed);
    assert_eq!(second.decks_scored, 25);
    assert_eq!(second.decks_processed, 115);
    for rule in Rule::ALL {
        for row in second.report.table(rule).rows() {
            assert_eq!(row.tally.total(), 115);
        }
    }

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&second.json_path).expect("json readable"))
            .expect("summary json decodes");
    assert_eq!(json["seed"], 4242);
    assert_eq!(json["rules"][0]["decks"], 115);

    let seeds = processed_seeds(dir.path().join("data")).expect("listing");
    assert_eq!(seeds, vec![(4242, 115)]);
}
