//! Data/simulation comparison reports.
//!
//! `ComparisonPlot` is the serializable view handed to the HTML template;
//! it carries everything the page draws so the script does no physics.

pub mod html;

pub use html::render_comparison_html;

use crate::error::{AnalysisError, Result};
use crate::model::{Histogram, Histogram2D, Stack, Yield};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Plot decoration, fixed before rendering starts.
#[derive(Debug, Clone, Serialize)]
pub struct PlotStyle {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub data_label: String,
    /// Integrated luminosity shown in the header, fb^-1.
    pub lumi: Option<f64>,
    pub year: Option<String>,
    pub ratio: bool,
    pub log_y: bool,
}

impl Default for PlotStyle {
    fn default() -> Self {
        Self {
            title: String::new(),
            x_label: String::new(),
            y_label: "Events".to_string(),
            data_label: "Data".to_string(),
            lumi: None,
            year: None,
            ratio: true,
            log_y: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LayerView {
    pub name: String,
    pub label: String,
    pub color: String,
    pub sumw: Vec<f64>,
    pub errors: Vec<f64>,
}

impl LayerView {
    fn from_histogram(h: &Histogram) -> Self {
        Self {
            name: h.name().to_string(),
            label: h.label().to_string(),
            color: h.color().map(|c| c.css()).unwrap_or_else(|| "#5790fc".to_string()),
            sumw: h.sumw().to_vec(),
            errors: h.errors(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RatioView {
    pub values: Vec<f64>,
    pub errors: Vec<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct YieldsView {
    pub data: Yield,
    pub mc: Yield,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonPlot {
    pub name: String,
    pub edges: Vec<f64>,
    pub centers: Vec<f64>,
    /// Simulation layers, bottom first.
    pub mc: Vec<LayerView>,
    pub mc_total: LayerView,
    pub data: LayerView,
    /// Data over simulation; 0 where simulation is empty.
    pub ratio: RatioView,
    pub yields: YieldsView,
}

impl ComparisonPlot {
    pub fn new(data: &Histogram, mc: &Stack) -> Result<Self> {
        let total = mc.total()?;
        if data.edges() != total.edges() {
            return Err(AnalysisError::IncompatibleBinning {
                left: data.name().to_string(),
                right: total.name().to_string(),
            });
        }

        let edges = data.edges().to_vec();
        let centers = edges.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect();
        let data_errors = data.errors();
        let (values, errors) = data
            .sumw()
            .iter()
            .zip(&data_errors)
            .zip(total.sumw())
            .map(|((d, e), m)| if *m > 0.0 { (d / m, e / m) } else { (0.0, 0.0) })
            .unzip();

        Ok(Self {
            name: data.name().to_string(),
            edges,
            centers,
            mc: mc.layers.iter().map(LayerView::from_histogram).collect(),
            mc_total: LayerView::from_histogram(&total),
            data: LayerView::from_histogram(data),
            ratio: RatioView { values, errors },
            yields: YieldsView {
                data: data.total(),
                mc: total.total(),
            },
        })
    }
}

/// Write `<dir>/<name>.html` and `<dir>/<name>.json`.
pub fn write_report(dir: &Path, plot: &ComparisonPlot, style: &PlotStyle) -> Result<(PathBuf, PathBuf)> {
    fs::create_dir_all(dir)?;
    let html_path = dir.join(format!("{}.html", plot.name));
    let json_path = dir.join(format!("{}.json", plot.name));
    fs::write(&html_path, render_comparison_html(plot, style)?)?;
    fs::write(&json_path, serde_json::to_string_pretty(plot)?)?;
    Ok((html_path, json_path))
}

/// Write `<dir>/<name>.json` holding the given 2-D histograms.
pub fn write_histograms_2d(dir: &Path, name: &str, histograms: &[Histogram2D]) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.json", name));
    fs::write(&path, serde_json::to_string_pretty(histograms)?)?;
    Ok(path)
}
