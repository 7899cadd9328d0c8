use crate::artifacts::error::{ArtifactError, ArtifactResult};
use crate::artifacts::types::{
    ArtifactConfig, ProfileArtifacts, SessionSummaryRow, SERIES_HEADER, SESSION_SUMMARY_HEADER,
};
use crate::profiler::{DelayStats, Histogram, ProfileLabels};
use plotters::prelude::*;
use plotters::style::{register_font, FontStyle};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{error, info};

const FONT_FAMILY: &str = "sans-serif";
static FONT: &[u8] = include_bytes!("../../assets/fonts/DejaVuSans.ttf");

/// Writes profiling and session artifacts to disk.
///
/// Every write creates its directory first. `persist_profile` never fails:
/// persistence errors are logged and the affected path is left out.
#[derive(Debug, Clone, Default)]
pub struct ArtifactWriter {
    config: ArtifactConfig,
}

impl ArtifactWriter {
    pub fn new(config: ArtifactConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ArtifactConfig {
        &self.config
    }

    /// Current local time in the form used in artifact file names.
    pub fn timestamp() -> String {
        chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
    }

    /// Render the histogram and write the raw series for one profiling run.
    pub fn persist_profile(
        &self,
        samples: &[(usize, f64)],
        stats: &DelayStats,
        histogram: &Histogram,
        labels: &ProfileLabels,
    ) -> ProfileArtifacts {
        let suffix = labels.file_suffix(&Self::timestamp());

        let histogram = match self.render_histogram(histogram, stats, labels, &suffix) {
            Ok(path) => {
                info!(path = %path.display(), "plot saved");
                Some(path)
            }
            Err(e) => {
                error!("Failed to save plot: {}", e);
                None
            }
        };

        let series = match self.write_series(samples, &suffix) {
            Ok(path) => {
                info!(path = %path.display(), "transfer times saved");
                Some(path)
            }
            Err(e) => {
                error!("Failed to save transfer times: {}", e);
                None
            }
        };

        ProfileArtifacts { histogram, series }
    }

    /// Draw the histogram with dashed markers at the mean and at one standard
    /// deviation either side of it, titled with the delay configuration.
    pub fn render_histogram(
        &self,
        histogram: &Histogram,
        stats: &DelayStats,
        labels: &ProfileLabels,
        suffix: &str,
    ) -> ArtifactResult<PathBuf> {
        let (Some(&first), Some(&last)) = (histogram.edges.first(), histogram.edges.last()) else {
            return Err(ArtifactError::Empty("histogram has no bins"));
        };
        ensure_font()?;

        fs::create_dir_all(&self.config.plots_dir)?;
        let path = self
            .config
            .plots_dir
            .join(format!("transfer_times_{suffix}.png"));

        let x_lo = first.min(stats.mean - stats.std_dev);
        let x_hi = last.max(stats.mean + stats.std_dev);
        let tallest = histogram.counts.iter().copied().max().unwrap_or(0);
        let y_hi = (tallest as f64 * 1.1).max(1.0);

        {
            let root = BitMapBackend::new(&path, self.config.image_size).into_drawing_area();
            root.fill(&WHITE).map_err(render_error)?;

            let mut chart = ChartBuilder::on(&root)
                .caption(labels.describe(), (FONT_FAMILY, 20))
                .margin(20)
                .x_label_area_size(45)
                .y_label_area_size(60)
                .build_cartesian_2d(x_lo..x_hi, 0f64..y_hi)
                .map_err(render_error)?;

            chart
                .configure_mesh()
                .disable_x_mesh()
                .x_desc("Transfer Time (seconds)")
                .y_desc("Frequency")
                .label_style((FONT_FAMILY, 14))
                .draw()
                .map_err(render_error)?;

            chart
                .draw_series(histogram.bins().map(|(left, right, count)| {
                    Rectangle::new([(left, 0.0), (right, count as f64)], BLUE.mix(0.7).filled())
                }))
                .map_err(render_error)?
                .label(format!("Transfer times (n={})", stats.count))
                .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 15, y + 5)], BLUE.mix(0.7).filled()));
            chart
                .draw_series(histogram.bins().map(|(left, right, count)| {
                    Rectangle::new([(left, 0.0), (right, count as f64)], BLACK.stroke_width(1))
                }))
                .map_err(render_error)?;

            let markers = [
                (stats.mean, RED, Some(format!("Mean: {:.3}s", stats.mean))),
                (
                    stats.mean + stats.std_dev,
                    GREEN,
                    Some(format!("Std Dev: {:.3}s", stats.std_dev)),
                ),
                (stats.mean - stats.std_dev, GREEN, None),
            ];
            for (x, color, label) in markers {
                let series = chart
                    .draw_series(dashes(y_hi).map(|(y0, y1)| {
                        PathElement::new(vec![(x, y0), (x, y1)], color.stroke_width(2))
                    }))
                    .map_err(render_error)?;
                if let Some(label) = label {
                    series.label(label).legend(move |(x, y)| {
                        PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2))
                    });
                }
            }

            chart
                .configure_series_labels()
                .position(SeriesLabelPosition::UpperRight)
                .label_font((FONT_FAMILY, 14))
                .background_style(WHITE.mix(0.8))
                .border_style(BLACK)
                .draw()
                .map_err(render_error)?;

            root.present().map_err(render_error)?;
        }

        Ok(path)
    }

    /// Write `(packet_index, transfer_time)` rows.
    pub fn write_series(&self, samples: &[(usize, f64)], suffix: &str) -> ArtifactResult<PathBuf> {
        fs::create_dir_all(&self.config.series_dir)?;
        let path = self
            .config
            .series_dir
            .join(format!("transfer_times_{suffix}.csv"));

        let mut content = String::with_capacity(32 * (samples.len() + 1));
        content.push_str(SERIES_HEADER);
        content.push('\n');
        for (index, transfer_time) in samples {
            content.push_str(&format!("{index},{transfer_time}\n"));
        }
        fs::write(&path, content)?;

        Ok(path)
    }

    /// Append one row, writing the header first when the file is new or empty.
    pub fn append_session_summary(&self, row: &SessionSummaryRow) -> ArtifactResult<PathBuf> {
        let path = &self.config.session_summary;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        if file.metadata()?.len() == 0 {
            writeln!(file, "{SESSION_SUMMARY_HEADER}")?;
        }
        writeln!(file, "{}", row.to_csv_line())?;

        Ok(path.clone())
    }
}

/// Read back a series written by [`ArtifactWriter::write_series`].
pub fn read_series(path: &Path) -> ArtifactResult<Vec<(usize, f64)>> {
    let content = fs::read_to_string(path)?;
    let mut samples = Vec::new();
    for line in content.lines().skip(1) {
        let Some((index, time)) = line.split_once(',') else {
            continue;
        };
        if let (Ok(index), Ok(time)) = (index.trim().parse::<usize>(), time.trim().parse::<f64>()) {
            samples.push((index, time));
        }
    }
    Ok(samples)
}

/// `(start, end)` heights of the dash segments of a vertical line.
fn dashes(height: f64) -> impl Iterator<Item = (f64, f64)> {
    let step = height / 40.0;
    (0..40)
        .step_by(2)
        .map(move |i| (i as f64 * step, (i + 1) as f64 * step))
}

/// Register the bundled font for chart text, once per process.
fn ensure_font() -> ArtifactResult<()> {
    static REGISTERED: OnceLock<bool> = OnceLock::new();
    let registered =
        *REGISTERED.get_or_init(|| register_font(FONT_FAMILY, FontStyle::Normal, FONT).is_ok());
    if registered {
        Ok(())
    } else {
        Err(ArtifactError::Render("bundled font could not be loaded".to_string()))
    }
}

fn render_error<E: std::fmt::Display>(e: E) -> ArtifactError {
    ArtifactError::Render(e.to_string())
}
