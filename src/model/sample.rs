//! One dataset: its files, events, normalization and active selections.

use super::histogram::{Histogram, Histogram2D, Histogram2DRequest, HistogramRequest, Yield};
use crate::error::{AnalysisError, Result};
use crate::events::kinematics::{self, DIMUON_MASS_FIELD};
use crate::events::{Column, EventLoader, EventTable};
use crate::expr::{CompiledExpr, Value};
use crate::files::{FileLocation, FileResolver};
use crate::spec::{Color, SampleDef};
use std::fmt::Write as _;
use tracing::{debug, info, warn};

/// Per-event generator weight of simulated events.
pub const GEN_WEIGHT_FIELD: &str = "genWeight";

/// Derived per-event weight: genWeight x normalization for simulation, 1 for
/// data.
pub const EVENT_WEIGHT_FIELD: &str = "eventWeight";

/// Collaborators needed to load samples.
#[derive(Clone, Copy)]
pub struct LoadContext<'a> {
    pub resolver: &'a FileResolver,
    pub loader: &'a dyn EventLoader,
    /// Maximum files per sample, `0` for all.
    pub file_limit: usize,
}

#[derive(Debug, Clone)]
pub struct Sample {
    name: String,
    label: String,
    color: Color,
    locator: String,
    xsec: f64,
    is_data: bool,
    files: Vec<FileLocation>,
    events: EventTable,
    n_events: f64,
    sum_gen_weight: f64,
    norm: f64,
    selections: Vec<String>,
}

impl Sample {
    /// Resolve the sample's files and load their events.
    pub fn load(def: &SampleDef, ctx: &LoadContext<'_>) -> Result<Self> {
        let files = ctx.resolver.resolve(&def.locator, ctx.file_limit)?;
        info!(sample = %def.name, files = files.len(), "loading sample");

        let mut tables = Vec::with_capacity(files.len());
        for file in &files {
            match ctx.loader.load(file) {
                Ok(table) => tables.push(table),
                Err(e) => warn!(sample = %def.name, "skipping {}: {}", file, e),
            }
        }
        if tables.is_empty() {
            return Err(AnalysisError::EmptySample {
                sample: def.name.clone(),
            });
        }
        Self::from_events(def, files, EventTable::concat(tables)?)
    }

    /// Build a sample from already loaded events and compute its
    /// normalization.
    pub fn from_events(def: &SampleDef, files: Vec<FileLocation>, mut events: EventTable) -> Result<Self> {
        if events.is_empty() {
            return Err(AnalysisError::EmptySample {
                sample: def.name.clone(),
            });
        }

        let (n_events, sum_gen_weight, norm, weights) = if def.is_data {
            let n = events.len() as f64;
            (n, n, 1.0, vec![1.0; events.len()])
        } else {
            let gen_weights = events.scalar(GEN_WEIGHT_FIELD).ok_or_else(|| {
                AnalysisError::load(&def.name, format!("simulated sample has no '{}' field", GEN_WEIGHT_FIELD))
            })?;
            let sum: f64 = gen_weights.iter().sum();
            if sum <= 0.0 || !sum.is_finite() {
                return Err(AnalysisError::InvalidNormalization {
                    sample: def.name.clone(),
                    sum_gen_weight: sum,
                });
            }
            let norm = def.xsec / sum;
            let weights = gen_weights.iter().map(|g| g * norm).collect();
            (sum, sum, norm, weights)
        };
        events.insert_column(EVENT_WEIGHT_FIELD, Column::Scalar(weights))?;

        debug!(sample = %def.name, events = events.len(), sum_gen_weight, norm, "sample ready");
        Ok(Self {
            name: def.name.clone(),
            label: def.label.clone(),
            color: def.color,
            locator: def.locator.clone(),
            xsec: def.xsec,
            is_data: def.is_data,
            files,
            events,
            n_events,
            sum_gen_weight,
            norm,
            selections: Vec::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }

    pub fn xsec(&self) -> f64 {
        self.xsec
    }

    pub fn is_data(&self) -> bool {
        self.is_data
    }

    pub fn files(&self) -> &[FileLocation] {
        &self.files
    }

    pub fn events(&self) -> &EventTable {
        &self.events
    }

    /// Row count for data, sum of generator weights for simulation.
    pub fn n_events(&self) -> f64 {
        self.n_events
    }

    pub fn sum_gen_weight(&self) -> f64 {
        self.sum_gen_weight
    }

    /// Cross-section over the sum of generator weights; 1 for data.
    pub fn normalization(&self) -> f64 {
        self.norm
    }

    pub fn selections(&self) -> &[String] {
        &self.selections
    }

    /// Append a selection. It is combined with the others by logical AND and
    /// only checked when evaluated.
    pub fn add_selection(&mut self, expr: impl Into<String>) -> &mut Self {
        self.selections.push(expr.into());
        self
    }

    pub fn clear_selections(&mut self) {
        self.selections.clear();
    }

    /// Events passing every active selection, narrowed in insertion order.
    pub fn apply_selections(&self) -> Result<EventTable> {
        let mut selected = self.events.clone();
        for sel in &self.selections {
            selected = narrow(selected, sel)?;
        }
        Ok(selected)
    }

    fn weights(&self, events: &EventTable, lumi: f64) -> Result<Vec<f64>> {
        if self.is_data {
            return Ok(vec![1.0; events.len()]);
        }
        let w = events
            .scalar(EVENT_WEIGHT_FIELD)
            .ok_or_else(|| AnalysisError::eval(EVENT_WEIGHT_FIELD, "missing per-event weight"))?;
        Ok(w.iter().map(|w| w * lumi).collect())
    }

    /// Selected events plus a request's extra cut.
    fn select(&self, cut: Option<&str>) -> Result<EventTable> {
        let selected = self.apply_selections()?;
        match cut {
            Some(cut) => narrow(selected, cut),
            None => Ok(selected),
        }
    }

    /// Per-event weights, or the values of `weight` when it overrides them.
    fn request_weights(&self, events: &EventTable, lumi: f64, weight: Option<&str>) -> Result<Vec<Value>> {
        match weight {
            Some(expr) => CompiledExpr::compile(expr)?.evaluate(events),
            None => Ok(self
                .weights(events, lumi)?
                .into_iter()
                .map(Value::Scalar)
                .collect()),
        }
    }

    /// Fill a histogram of `request.variable` over the selected events.
    /// Collection variables contribute one entry per element, each with the
    /// event's weight.
    pub fn histogram(&self, request: &HistogramRequest, lumi: f64) -> Result<Histogram> {
        let selected = self.select(request.cut.as_deref())?;
        let values = CompiledExpr::compile(&request.variable)?.evaluate(&selected)?;
        let weights = self.request_weights(&selected, lumi, request.weight.as_deref())?;

        let mut hist = Histogram::new(&request.name, &request.binning);
        for (row, (value, weight)) in values.iter().zip(&weights).enumerate() {
            match (value, weight) {
                (Value::Scalar(x), Value::Scalar(w)) => {
                    hist.fill(*x, *w);
                }
                (Value::List(xs), Value::Scalar(w)) => {
                    for x in xs {
                        hist.fill(*x, *w);
                    }
                }
                (Value::List(xs), Value::List(ws)) if xs.len() == ws.len() => {
                    for (x, w) in xs.iter().zip(ws) {
                        hist.fill(*x, *w);
                    }
                }
                _ => {
                    let source = request.weight.as_deref().unwrap_or(EVENT_WEIGHT_FIELD);
                    return Err(AnalysisError::eval(
                        source,
                        format!("event {}: weight does not match the shape of '{}'", row, request.variable),
                    ));
                }
            }
        }
        Ok(hist.styled(&request.name, &self.label, Some(self.color)))
    }

    /// Fill a 2-D histogram of `request.x` against `request.y`. Scalars
    /// broadcast over collections; collections in one event must have the
    /// same length and are paired element by element.
    pub fn histogram_2d(&self, request: &Histogram2DRequest, lumi: f64) -> Result<Histogram2D> {
        let selected = self.select(request.cut.as_deref())?;
        let xs = CompiledExpr::compile(&request.x)?.evaluate(&selected)?;
        let ys = CompiledExpr::compile(&request.y)?.evaluate(&selected)?;
        let weights = self.request_weights(&selected, lumi, request.weight.as_deref())?;

        let mut hist = Histogram2D::new(&request.name, &request.x_binning, &request.y_binning);
        for (row, ((x, y), w)) in xs.iter().zip(&ys).zip(&weights).enumerate() {
            let n = entries_per_event(&[x, y, w]).ok_or_else(|| {
                AnalysisError::eval(
                    &request.y,
                    format!("event {}: collection lengths differ from '{}'", row, request.x),
                )
            })?;
            for k in 0..n {
                hist.fill(element(x, k), element(y, k), element(w, k));
            }
        }
        Ok(hist.styled(&request.name, &self.label, Some(self.color)))
    }

    /// Sum of weights over the selected events.
    pub fn event_yield(&self, lumi: f64) -> Result<Yield> {
        let selected = self.apply_selections()?;
        let mut y = Yield::default();
        for w in self.weights(&selected, lumi)? {
            y.add(w);
        }
        Ok(y)
    }

    /// Add a derived field computed from `expr` over all events.
    pub fn define(&mut self, name: &str, expr: &str) -> Result<()> {
        let compiled = CompiledExpr::compile(expr)?;
        let column = compiled.column(&self.events)?;
        debug!(sample = %self.name, field = name, inputs = ?compiled.fields(), "defined");
        self.events.insert_column(name, column)
    }

    /// Add the `DiMuon_mass` field.
    pub fn define_dimuon_mass(&mut self) -> Result<()> {
        let column = kinematics::dimuon_mass(&self.events)?;
        self.events.insert_column(DIMUON_MASS_FIELD, column)
    }

    pub fn summary(&self) -> String {
        let mut out = String::new();
        let kind = if self.is_data { "data" } else { "simulation" };
        let _ = writeln!(out, "Sample {} ({}, {})", self.name, self.label, kind);
        let _ = writeln!(out, "  locator:        {}", self.locator);
        let _ = writeln!(out, "  files:          {}", self.files.len());
        let _ = writeln!(out, "  rows:           {}", self.events.len());
        let _ = writeln!(out, "  events:         {}", self.n_events);
        if !self.is_data {
            let _ = writeln!(out, "  xsec [pb]:      {}", self.xsec);
            let _ = writeln!(out, "  sum genWeight:  {}", self.sum_gen_weight);
            let _ = writeln!(out, "  normalization:  {:.6e}", self.norm);
        }
        if self.selections.is_empty() {
            let _ = writeln!(out, "  selections:     none");
        } else {
            let _ = writeln!(out, "  selections:     {}", self.selections.join(" && "));
        }
        out
    }
}

fn narrow(events: EventTable, expr: &str) -> Result<EventTable> {
    let mask = CompiledExpr::compile(expr)?.mask(&events)?;
    Ok(events.filter(&mask))
}

/// Number of entries one event contributes: 1 for all scalars, otherwise the
/// common length of its collections (`None` when they disagree).
fn entries_per_event(values: &[&Value]) -> Option<usize> {
    let mut len = None;
    for value in values {
        if let Value::List(items) = value {
            match len {
                Some(n) if n != items.len() => return None,
                _ => len = Some(items.len()),
            }
        }
    }
    Some(len.unwrap_or(1))
}

fn element(value: &Value, k: usize) -> f64 {
    match value {
        Value::Scalar(x) => *x,
        Value::List(items) => items[k],
    }
}
