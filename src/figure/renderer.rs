//! Robustness-failure frequency figure.
//!
//! Draws the baseline reference as a dashed grey line, the IID sweep in
//! orange and the objective-robustness sweep in blue, all in percent.

use crate::config::FigureConfig;
use crate::models::{FigureData, RandomizationCondition, SummarySeries};
use anyhow::{anyhow, bail, Result};
use plotters::coord::types::RangedCoordf64;
use plotters::coord::Shift;
use plotters::prelude::*;
use std::path::Path;
use tracing::{debug, info};

// matplotlib "tab" palette
const TAB_BLUE: RGBColor = RGBColor(31, 119, 180);
const TAB_ORANGE: RGBColor = RGBColor(255, 127, 14);
const TAB_GREY: RGBColor = RGBColor(127, 127, 127);

pub const REFERENCE_LABEL: &str = "Maximum possible OR frequency";
pub const IID_LABEL: &str = "IID Robustness Failure";
pub const OBJECTIVE_LABEL: &str = "Objective Robustness Failure";

/// Render `data` to `path`, picking the backend from the file extension.
pub fn render_figure(path: &Path, data: &FigureData, config: &FigureConfig) -> Result<()> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    let size = (config.width, config.height);

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    match ext.as_str() {
        "svg" => {
            let root = SVGBackend::new(path, size).into_drawing_area();
            draw(&root, data, config)?;
            root.present().map_err(draw_err)?;
        }
        "png" => {
            let root = BitMapBackend::new(path, size).into_drawing_area();
            draw(&root, data, config)?;
            root.present().map_err(draw_err)?;
        }
        other => bail!("Unsupported figure format '{}' for {}", other, path.display()),
    }

    info!("Figure written to {}", path.display());
    Ok(())
}

/// Scale a fraction series to `(x, percent)` points.
pub fn percent_points(series: &SummarySeries) -> Vec<(f64, f64)> {
    series
        .points()
        .into_iter()
        .map(|(condition, value)| (condition as f64, value * 100.0))
        .collect()
}

/// X range covering every condition in both series, padded so markers at
/// 0 and 100 stay inside the plot.
pub fn x_range(data: &FigureData) -> (f64, f64) {
    let conditions: Vec<RandomizationCondition> = data
        .iid_failure
        .conditions()
        .into_iter()
        .chain(data.objective_failure.conditions())
        .collect();

    let min = conditions.iter().copied().min().unwrap_or(0) as f64;
    let max = conditions.iter().copied().max().unwrap_or(100) as f64;
    let pad = ((max - min) * 0.05).max(2.5);
    (min - pad, max + pad)
}

fn draw<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    data: &FigureData,
    config: &FigureConfig,
) -> Result<()> {
    root.fill(&WHITE).map_err(draw_err)?;

    let (x_min, x_max) = x_range(data);
    let reference = data.baseline_reference * 100.0;
    debug!("Plotting x in [{:.1}, {:.1}], reference {:.2}%", x_min, x_max, reference);

    let mut builder = ChartBuilder::on(root);
    builder
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50);
    if let Some(ref title) = config.title {
        builder.caption(title, ("sans-serif", 18));
    }

    let mut chart = builder
        .build_cartesian_2d(x_min..x_max, 0.0f64..105.0f64)
        .map_err(draw_err)?;

    chart
        .configure_mesh()
        .x_desc(config.x_label.as_str())
        .y_desc(config.y_label.as_str())
        .draw()
        .map_err(draw_err)?;

    chart
        .draw_series(DashedLineSeries::new(
            vec![(x_min, reference), (x_max, reference)],
            8,
            6,
            TAB_GREY.stroke_width(2),
        ))
        .map_err(draw_err)?
        .label(REFERENCE_LABEL)
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], TAB_GREY));

    draw_sweep(&mut chart, &percent_points(&data.iid_failure), TAB_ORANGE, IID_LABEL)?;
    draw_sweep(
        &mut chart,
        &percent_points(&data.objective_failure),
        TAB_BLUE,
        OBJECTIVE_LABEL,
    )?;

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::LowerRight)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(draw_err)?;

    Ok(())
}

fn draw_sweep<DB: DrawingBackend>(
    chart: &mut ChartContext<'_, DB, Cartesian2d<RangedCoordf64, RangedCoordf64>>,
    points: &[(f64, f64)],
    color: RGBColor,
    label: &str,
) -> Result<()> {
    chart
        .draw_series(LineSeries::new(points.iter().copied(), color.stroke_width(2)))
        .map_err(draw_err)?
        .label(label)
        .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));

    chart
        .draw_series(points.iter().map(|&p| Circle::new(p, 4, color.filled())))
        .map_err(draw_err)?;

    Ok(())
}

fn draw_err<E: std::fmt::Debug>(e: E) -> anyhow::Error {
    anyhow!("Failed to draw figure: {:?}", e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_data() -> FigureData {
        FigureData {
            iid_failure: vec![(0, 0.02), (25, 0.05), (50, 0.1)].into_iter().collect(),
            objective_failure: vec![(0, 0.8), (50, 0.6), (100, 0.01)].into_iter().collect(),
            baseline_reference: 0.9,
            threshold: 0.1,
            good_seed_count: 120,
        }
    }

    #[test]
    fn test_percent_points() {
        let series: SummarySeries = vec![(50, 0.25), (0, 0.5)].into_iter().collect();
        assert_eq!(percent_points(&series), vec![(0.0, 50.0), (50.0, 25.0)]);
    }

    #[test]
    fn test_x_range_padding() {
        let (min, max) = x_range(&sample_data());
        assert!(min < 0.0);
        assert!(max > 100.0);

        let (min, max) = x_range(&FigureData::default());
        assert!(min < 0.0 && max > 100.0);
    }

    #[test]
    fn test_render_svg() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("figures").join("coinrun_freq.svg");

        render_figure(&path, &sample_data(), &FigureConfig::default()).unwrap();

        let svg = std::fs::read_to_string(&path).unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains(IID_LABEL));
        assert!(svg.contains(OBJECTIVE_LABEL));
    }

    #[test]
    fn test_render_png() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("coinrun_freq.png");

        render_figure(&path, &sample_data(), &FigureConfig::default()).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"\x89PNG"));
    }

    #[test]
    fn test_render_with_empty_iid_series() {
        // A single discovered test condition leaves the IID sweep empty.
        let data = FigureData {
            iid_failure: SummarySeries::default(),
            objective_failure: vec![(100, 0.6)].into_iter().collect(),
            baseline_reference: 0.9,
            threshold: 0.1,
            good_seed_count: 3,
        };
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("coinrun_freq.svg");

        render_figure(&path, &data, &FigureConfig::default()).unwrap();

        let svg = std::fs::read_to_string(&path).unwrap();
        assert!(svg.contains(OBJECTIVE_LABEL));
        assert_eq!(x_range(&data), (97.5, 102.5));
    }

    #[test]
    fn test_render_rejects_unknown_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("coinrun_freq.pdf");

        let err = render_figure(&path, &sample_data(), &FigureConfig::default()).unwrap_err();
        assert!(err.to_string().contains("pdf"));
    }
}
