use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use penney_core::{AggregateReport, Rule, Sequence, SequencePair, StatsTable, Tally};
use plotters::coord::Shift;
use plotters::coord::combinators::BindKeyPoints;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use plotters::style::{FontStyle, register_font};
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, Normal};
use thiserror::Error;
use tracing::warn;

use crate::config::HeatmapConfig;

const CONFIDENCE: f64 = 0.95;
const GRID: usize = Sequence::COUNT;
const CELL_PX: i32 = 60;
const LABELLED_SIZE: (u32, u32) = (800, 720);
const FONT_FAMILY: &str = "sans-serif";
const FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

static LABEL_FONT: OnceCell<Option<PathBuf>> = OnceCell::new();
const MARGIN_PX: i32 = 10;
const LIGHTEST: (f64, f64, f64) = (247.0, 251.0, 255.0);
const DARKEST: (f64, f64, f64) = (8.0, 48.0, 107.0);

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize summary: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to render heatmap: {0}")]
    Plot(String),
}

/// One row of the per-rule result table handed to report consumers.
#[derive(Debug, Clone, Serialize)]
pub struct PairRow {
    pub sequence1: String,
    pub sequence2: String,
    pub player1_wins: u64,
    pub player2_wins: u64,
    pub draws: u64,
    pub player1_win_pct: f64,
    pub tie_pct: f64,
    pub ci95: (f64, f64),
}

#[derive(Debug, Clone, Serialize)]
pub struct RuleSummary {
    pub rule: Rule,
    pub decks: u64,
    pub rows: Vec<PairRow>,
}

impl RuleSummary {
    pub fn from_table(table: &StatsTable) -> Self {
        let z = z_score(CONFIDENCE);
        let rows = table
            .rows()
            .iter()
            .map(|row| PairRow {
                sequence1: row.pair.first().to_string(),
                sequence2: row.pair.second().to_string(),
                player1_wins: row.tally.player1_wins,
                player2_wins: row.tally.player2_wins,
                draws: row.tally.draws,
                player1_win_pct: row.tally.player1_win_pct(),
                tie_pct: row.tally.tie_pct(),
                ci95: win_interval(row.tally.player1_wins, row.tally.total(), z),
            })
            .collect();
        Self {
            rule: table.rule(),
            decks: table.decks_processed(),
            rows,
        }
    }
}

/// Percent interval for player 1's win rate using the normal approximation.
fn win_interval(wins: u64, total: u64, z: f64) -> (f64, f64) {
    if total == 0 {
        return (0.0, 0.0);
    }
    let p = wins as f64 / total as f64;
    let margin = z * (p * (1.0 - p) / total as f64).sqrt();
    (
        ((p - margin).max(0.0) * 100.0),
        ((p + margin).min(1.0) * 100.0),
    )
}

fn z_score(confidence: f64) -> f64 {
    Normal::new(0.0, 1.0)
        .map(|normal| normal.inverse_cdf(0.5 + confidence / 2.0))
        .unwrap_or(1.96)
}

#[derive(Debug, Serialize)]
pub struct SimulationSummary {
    pub seed: u64,
    pub rules: Vec<RuleSummary>,
}

impl SimulationSummary {
    pub fn from_report(report: &AggregateReport) -> Self {
        Self {
            seed: report.seed,
            rules: Rule::ALL
                .iter()
                .map(|rule| RuleSummary::from_table(report.table(*rule)))
                .collect(),
        }
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ReportError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), json).map_err(|e| ReportError::Io {
            context: "writing summary json",
            source: e,
        })
    }

    pub fn write_markdown(&self, path: impl AsRef<Path>) -> Result<(), ReportError> {
        let mut out = String::new();
        out.push_str(&format!("# Penney's Game Summary (seed {})\n", self.seed));

        for summary in &self.rules {
            out.push_str(&format!(
                "\n## {} (N = {})\n\n",
                rule_title(summary.rule),
                group_thousands(summary.decks)
            ));
            out.push_str("| Player 1 | Player 2 | P1 wins | P2 wins | Draws | P1 win % | 95% CI | Tie % |\n");
            out.push_str("|----------|----------|---------|---------|-------|----------|--------|-------|\n");
            for row in &summary.rows {
                out.push_str(&format!(
                    "| {s1} | {s2} | {w1} | {w2} | {d} | {pct:.2} | [{lo:.2}, {hi:.2}] | {tie:.2} |\n",
                    s1 = row.sequence1,
                    s2 = row.sequence2,
                    w1 = row.player1_wins,
                    w2 = row.player2_wins,
                    d = row.draws,
                    pct = row.player1_win_pct,
                    lo = row.ci95.0,
                    hi = row.ci95.1,
                    tie = row.tie_pct,
                ));
            }
        }

        fs::write(path.as_ref(), out).map_err(|e| ReportError::Io {
            context: "writing summary markdown",
            source: e,
        })
    }
}

fn rule_title(rule: Rule) -> &'static str {
    match rule {
        Rule::Cards => "Cards-based player 1 win probabilities",
        Rule::Tricks => "Tricks-based player 1 win probabilities",
    }
}

fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Cell shade for a win percentage on the configured scale.
fn shade(win_pct: f64, scale: &HeatmapConfig) -> RGBColor {
    let t = scale_position(win_pct, scale);
    let mix = |a: f64, b: f64| (a + (b - a) * t).round() as u8;
    RGBColor(
        mix(LIGHTEST.0, DARKEST.0),
        mix(LIGHTEST.1, DARKEST.1),
        mix(LIGHTEST.2, DARKEST.2),
    )
}

fn scale_position(win_pct: f64, scale: &HeatmapConfig) -> f64 {
    ((win_pct - scale.vmin) / (scale.vmax - scale.vmin)).clamp(0.0, 1.0)
}

/// `win%(tie%)` with the tie share truncated to whole percent.
fn cell_label(tally: &Tally) -> String {
    format!("{:?}({})", tally.player1_win_pct(), tally.tie_pct().trunc() as u64)
}

/// Axis label for the sequence whose cell is centred on `value`.
fn axis_label(value: f64, flipped: bool) -> String {
    let slot = value.floor();
    if !(0.0..GRID as f64).contains(&slot) {
        return String::new();
    }
    let index = if flipped { GRID - 1 - slot as usize } else { slot as usize };
    Sequence::from_index(index as u8).colour_label()
}

/// Registers the first loadable font for chart text; `None` leaves charts unlabelled.
fn label_font(preferred: Option<&Path>) -> Option<&'static Path> {
    LABEL_FONT
        .get_or_init(|| {
            preferred
                .map(Path::to_path_buf)
                .into_iter()
                .chain(FONT_CANDIDATES.iter().copied().map(PathBuf::from))
                .find(|path| {
                    fs::read(path).is_ok_and(|bytes| {
                        let bytes: &'static [u8] = Box::leak(bytes.into_boxed_slice());
                        register_font(FONT_FAMILY, FontStyle::Normal, bytes).is_ok()
                    })
                })
        })
        .as_deref()
}

struct Cell {
    col: usize,
    row: usize,
    fill: RGBColor,
    label: Option<(String, RGBColor)>,
}

fn plot_error(err: impl std::fmt::Display) -> ReportError {
    ReportError::Plot(err.to_string())
}

/// Renders the Sequence1 x Sequence2 grid for one rule as a PNG.
///
/// Columns are player 1's sequence and rows player 2's, `BBB` at the top left.
/// Identical sequences are drawn black. Without a usable font the grid is drawn
/// without caption, axis labels or cell annotations.
pub fn render_heatmap(
    table: &StatsTable,
    dir: impl AsRef<Path>,
    scale: &HeatmapConfig,
) -> Result<PathBuf, ReportError> {
    let dir = dir.as_ref();
    if !dir.as_os_str().is_empty() {
        fs::create_dir_all(dir).map_err(|e| ReportError::Io {
            context: "creating plots directory",
            source: e,
        })?;
    }

    let output_path = dir.join(format!("heatmap_{}.png", table.rule()));
    let cells: Vec<Cell> = Sequence::all()
        .flat_map(|second| Sequence::all().map(move |first| (first, second)))
        .map(|(first, second)| {
            let row = SequencePair::new(first, second)
                .ok()
                .and_then(|pair| table.get(&pair));
            Cell {
                col: first.index(),
                row: GRID - 1 - second.index(),
                fill: row.map_or(BLACK, |row| shade(row.tally.player1_win_pct(), scale)),
                label: row.map(|row| {
                    let ink = if scale_position(row.tally.player1_win_pct(), scale) > 0.5 {
                        WHITE
                    } else {
                        BLACK
                    };
                    (cell_label(&row.tally), ink)
                }),
            }
        })
        .collect();

    let font = label_font(scale.font_path.as_deref());
    if font.is_none() {
        warn!(
            rule = %table.rule(),
            "no usable font found; heatmap drawn without labels"
        );
    }
    let caption = format!(
        "{} (N = {})",
        heatmap_title(table.rule()),
        group_thousands(table.decks_processed())
    );
    let target = output_path.clone();

    let prev_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(|_| {}));

    let plot_attempt = std::panic::catch_unwind(move || -> Result<PathBuf, ReportError> {
        let size = if font.is_some() {
            LABELLED_SIZE
        } else {
            let side = (GRID as i32 * CELL_PX + 2 * MARGIN_PX) as u32;
            (side, side)
        };
        let root = BitMapBackend::new(&target, size).into_drawing_area();
        root.fill(&WHITE).map_err(plot_error)?;
        if font.is_some() {
            draw_chart(&root, &caption, &cells)?;
        } else {
            draw_grid(&root, &cells)?;
        }
        root.present().map_err(plot_error)?;
        drop(root);

        Ok(target)
    });

    std::panic::set_hook(prev_hook);

    match plot_attempt {
        Ok(result) => result,
        Err(_) => Err(ReportError::Plot(
            "plotters panicked while rendering (missing font support?)".into(),
        )),
    }
}

fn draw_chart<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    caption: &str,
    cells: &[Cell],
) -> Result<(), ReportError> {
    let centres: Vec<f64> = (0..GRID).map(|slot| slot as f64 + 0.5).collect();
    let mut chart = ChartBuilder::on(root)
        .margin(20)
        .caption(caption, (FONT_FAMILY, 22))
        .set_label_area_size(LabelAreaPosition::Left, 70)
        .set_label_area_size(LabelAreaPosition::Bottom, 60)
        .build_cartesian_2d(
            (0f64..GRID as f64).with_key_points(centres.clone()),
            (0f64..GRID as f64).with_key_points(centres),
        )
        .map_err(plot_error)?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc("Player 1 Sequence")
        .y_desc("Player 2 Sequence")
        .x_label_formatter(&|value| axis_label(*value, false))
        .y_label_formatter(&|value| axis_label(*value, true))
        .draw()
        .map_err(plot_error)?;

    chart
        .draw_series(cells.iter().flat_map(|cell| {
            let (x, y) = (cell.col as f64, cell.row as f64);
            let corners = [(x, y), (x + 1.0, y + 1.0)];
            [
                Rectangle::new(corners, cell.fill.filled()),
                Rectangle::new(corners, BLACK.stroke_width(1)),
            ]
        }))
        .map_err(plot_error)?;

    let anchor = Pos::new(HPos::Center, VPos::Center);
    chart
        .draw_series(cells.iter().filter_map(|cell| {
            cell.label.as_ref().map(|(text, ink)| {
                let style = TextStyle::from((FONT_FAMILY, 14).into_font())
                    .color(ink)
                    .pos(anchor);
                Text::new(
                    text.clone(),
                    (cell.col as f64 + 0.5, cell.row as f64 + 0.5),
                    style,
                )
            })
        }))
        .map_err(plot_error)?;

    Ok(())
}

fn draw_grid<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    cells: &[Cell],
) -> Result<(), ReportError> {
    for cell in cells {
        let x0 = MARGIN_PX + cell.col as i32 * CELL_PX;
        let y0 = MARGIN_PX + cell.row as i32 * CELL_PX;
        let corners = [(x0, y0), (x0 + CELL_PX, y0 + CELL_PX)];
        root.draw(&Rectangle::new(corners, cell.fill.filled()))
            .map_err(plot_error)?;
        root.draw(&Rectangle::new(corners, BLACK))
            .map_err(plot_error)?;
    }
    Ok(())
}

fn heatmap_title(rule: Rule) -> &'static str {
    match rule {
        Rule::Cards => "Cards-Based Player 1 Winning Probabilities",
        Rule::Tricks => "Tricks-Based Player 1 Winning Probabilities",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thousands_are_grouped() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1_000), "1,000");
        assert_eq!(group_thousands(1_234_567), "1,234,567");
    }

    #[test]
    fn interval_brackets_the_rate() {
        let z = z_score(CONFIDENCE);
        assert!((z - 1.96).abs() < 0.01);
        let (lo, hi) = win_interval(500, 1_000, z);
        assert!(lo < 50.0 && hi > 50.0);
        assert!((hi - lo) < 7.0);
        assert_eq!(win_interval(0, 0, z), (0.0, 0.0));
    }

    #[test]
    fn shade_clamps_to_scale() {
        let scale = HeatmapConfig::default();
        assert_eq!(shade(-5.0, &scale), RGBColor(247, 251, 255));
        assert_eq!(shade(100.0, &scale), RGBColor(8, 48, 107));
    }

    #[test]
    fn cells_show_win_and_truncated_tie_share() {
        let tally = Tally {
            player1_wins: 7,
            player2_wins: 0,
            draws: 1,
        };
        assert_eq!(cell_label(&tally), "87.5(12)");
        assert_eq!(cell_label(&Tally::default()), "0.0(0)");
    }

    #[test]
    fn axis_labels_use_colour_letters() {
        assert_eq!(axis_label(0.5, false), "BBB");
        assert_eq!(axis_label(7.5, false), "RRR");
        assert_eq!(axis_label(0.5, true), "RRR");
        assert_eq!(axis_label(7.5, true), "BBB");
        assert_eq!(axis_label(8.5, false), "");
    }

    #[test]
    fn heatmap_png_is_written() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut table = StatsTable::empty(3, Rule::Tricks);
        for pair in SequencePair::all() {
            table.merge(
                &pair,
                &Tally {
                    player1_wins: 2,
                    player2_wins: 1,
                    draws: 1,
                },
            );
        }
        let path = render_heatmap(&table, dir.path(), &HeatmapConfig::default())
            .expect("heatmap renders");
        assert_eq!(path, dir.path().join("heatmap_tricks.png"));
        let bytes = fs::read(&path).expect("png on disk");
        assert_eq!(&bytes[..4], b"\x89PNG");
    }

    #[test]
    fn summary_rows_follow_table_order() {
        let mut table = StatsTable::empty(1, Rule::Cards);
        let pair = SequencePair::all()[0];
        table.merge(
            &pair,
            &Tally {
                player1_wins: 1,
                player2_wins: 0,
                draws: 0,
            },
        );
        let summary = RuleSummary::from_table(&table);
        assert_eq!(summary.rows.len(), 56);
        assert_eq!(summary.rows[0].sequence1, "000");
        assert_eq!(summary.rows[0].sequence2, "001");
        assert_eq!(summary.rows[0].player1_win_pct, 100.0);
    }
}
