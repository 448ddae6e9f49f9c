use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::{ImageFormat, Rgb, RgbImage};
use tracing::info;

use crate::dataset::CleanDataset;
use crate::model::Missingness;
use crate::stats::{QuantileMethod, summary_stats};
use crate::util::ensure_directory;

const WIDTH: u32 = 640;
const HEIGHT: u32 = 400;
const MARGIN: u32 = 40;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const AXIS: Rgb<u8> = Rgb([40, 40, 40]);
const BAR: Rgb<u8> = Rgb([31, 119, 180]);
const MEDIAN: Rgb<u8> = Rgb([255, 127, 14]);

pub fn is_log_scaled(metric: &str) -> bool {
    matches!(metric, "pl_orbper" | "pl_bmasse")
}

struct Canvas {
    image: RgbImage,
}

impl Canvas {
    fn new() -> Self {
        Self {
            image: RgbImage::from_pixel(WIDTH, HEIGHT, BACKGROUND),
        }
    }

    fn fill_rect(&mut self, x0: u32, y0: u32, x1: u32, y1: u32, color: Rgb<u8>) {
        let (x0, x1) = (x0.min(x1), x0.max(x1).min(WIDTH - 1));
        let (y0, y1) = (y0.min(y1), y0.max(y1).min(HEIGHT - 1));
        for y in y0..=y1 {
            for x in x0..=x1 {
                self.image.put_pixel(x, y, color);
            }
        }
    }

    fn axes(&mut self) {
        self.fill_rect(MARGIN, MARGIN, MARGIN, HEIGHT - MARGIN, AXIS);
        self.fill_rect(MARGIN, HEIGHT - MARGIN, WIDTH - MARGIN, HEIGHT - MARGIN, AXIS);
    }

    fn save(&self, path: &Path) -> Result<()> {
        self.image
            .save_with_format(path, ImageFormat::Png)
            .with_context(|| format!("failed to write figure {}", path.display()))
    }
}

fn slot(index: usize, count: usize) -> (u32, u32) {
    let plot_width = WIDTH - 2 * MARGIN;
    let width = plot_width / count.max(1) as u32;
    let left = MARGIN + index as u32 * width;
    (left, left + width)
}

fn row_for(value: f64, low: f64, high: f64) -> u32 {
    let plot_height = f64::from(HEIGHT - 2 * MARGIN);
    let fraction = if high > low { (value - low) / (high - low) } else { 0.5 };
    let offset = (fraction.clamp(0.0, 1.0) * plot_height).round() as u32;
    HEIGHT - MARGIN - offset
}

pub fn plot_method_counts(
    dataset: &CleanDataset,
    method_order: &[String],
    out_dir: &Path,
) -> Result<PathBuf> {
    ensure_directory(out_dir)?;
    let counts: Vec<usize> = method_order.iter().map(|method| dataset.group_size(method)).collect();
    let peak = counts.iter().copied().max().unwrap_or(0).max(1) as f64;

    let mut canvas = Canvas::new();
    for (index, count) in counts.iter().enumerate() {
        if *count == 0 {
            continue;
        }
        let (left, right) = slot(index, counts.len());
        let top = row_for(*count as f64, 0.0, peak);
        canvas.fill_rect(left + 8, top, right.saturating_sub(8), HEIGHT - MARGIN, BAR);
    }
    canvas.axes();

    let path = out_dir.join("method_counts.png");
    canvas.save(&path)?;
    Ok(path)
}

fn heat_color(rate: f64) -> Rgb<u8> {
    let t = rate.clamp(0.0, 1.0);
    let lerp = |from: f64, to: f64| (from + (to - from) * t).round() as u8;
    Rgb([lerp(247.0, 8.0), lerp(251.0, 48.0), lerp(255.0, 107.0)])
}

pub fn plot_missingness_heatmap(
    missingness: &Missingness,
    metrics: &[String],
    out_dir: &Path,
) -> Result<PathBuf> {
    ensure_directory(out_dir)?;
    let mut canvas = Canvas::new();

    let rows = missingness.len().max(1) as u32;
    let cell_height = (HEIGHT - 2 * MARGIN) / rows;
    for (row, (_, by_metric)) in missingness.iter().enumerate() {
        let top = MARGIN + row as u32 * cell_height;
        for (column, metric) in metrics.iter().enumerate() {
            let rate = by_metric.get(metric).map_or(1.0, |entry| entry.missing_rate);
            let (left, right) = slot(column, metrics.len());
            let bottom = (top + cell_height).saturating_sub(1);
            canvas.fill_rect(left, top, right.saturating_sub(1), bottom, heat_color(rate));
        }
    }
    canvas.axes();

    let path = out_dir.join("missingness_heatmap.png");
    canvas.save(&path)?;
    Ok(path)
}

pub fn plotted_sample(dataset: &CleanDataset, method: &str, metric: &str) -> Vec<f64> {
    let Some(index) = dataset.metric_index(metric) else {
        return Vec::new();
    };
    let sample = dataset.sample(method, index);
    if is_log_scaled(metric) {
        sample.into_iter().filter(|v| *v > 0.0).map(f64::log10).collect()
    } else {
        sample
    }
}

pub fn plot_metric_by_method(
    dataset: &CleanDataset,
    metric: &str,
    method_order: &[String],
    out_dir: &Path,
) -> Result<PathBuf> {
    ensure_directory(out_dir)?;
    let boxes: Vec<_> = method_order
        .iter()
        .map(|method| summary_stats(&plotted_sample(dataset, method, metric), QuantileMethod::Linear, 0))
        .collect();

    let low = boxes.iter().filter_map(|stats| stats.p05).fold(f64::INFINITY, f64::min);
    let high = boxes.iter().filter_map(|stats| stats.p95).fold(f64::NEG_INFINITY, f64::max);
    let pad = if high > low { (high - low) * 0.05 } else { 1.0 };
    let (low, high) = (low - pad, high + pad);

    let mut canvas = Canvas::new();
    for (index, stats) in boxes.iter().enumerate() {
        let (Some(p05), Some(p25), Some(p50), Some(p75), Some(p95)) =
            (stats.p05, stats.p25, stats.p50, stats.p75, stats.p95)
        else {
            continue;
        };
        let (left, right) = slot(index, boxes.len());
        let center = (left + right) / 2;
        let (box_left, box_right) = (left + (right - left) / 4, right - (right - left) / 4);

        canvas.fill_rect(center, row_for(p95, low, high), center, row_for(p05, low, high), AXIS);
        canvas.fill_rect(box_left, row_for(p75, low, high), box_right, row_for(p25, low, high), BAR);
        canvas.fill_rect(box_left, row_for(p50, low, high), box_right, row_for(p50, low, high) + 1, MEDIAN);
        for cap in [p05, p95] {
            let y = row_for(cap, low, high);
            canvas.fill_rect(center - 6, y, center + 6, y, AXIS);
        }
    }
    canvas.axes();

    let path = out_dir.join(format!("{metric}_by_method.png"));
    canvas.save(&path)?;
    Ok(path)
}

pub fn generate_all_plots(
    dataset: &CleanDataset,
    missingness: &Missingness,
    metrics: &[String],
    method_order: &[String],
    figures_dir: &Path,
) -> Result<Vec<PathBuf>> {
    let mut paths = vec![
        plot_method_counts(dataset, method_order, figures_dir)?,
        plot_missingness_heatmap(missingness, metrics, figures_dir)?,
    ];
    for metric in metrics {
        paths.push(plot_metric_by_method(dataset, metric, method_order, figures_dir)?);
    }
    info!(dir = %figures_dir.display(), figures = paths.len(), "rendered figures");
    Ok(paths)
}
