//! Weighted histograms, yields and stacks.

use crate::error::{AnalysisError, Result};
use crate::spec::Color;
use serde::Serialize;
use std::iter::Sum;

/// Bin layout. Bins are half-open `[low, high)`; there are no underflow or
/// overflow bins.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Binning {
    Regular { bins: usize, lo: f64, hi: f64 },
    Variable { edges: Vec<f64> },
}

impl Binning {
    pub fn regular(bins: usize, lo: f64, hi: f64) -> Result<Self> {
        if bins == 0 {
            return Err(AnalysisError::InvalidBinning("need at least one bin".into()));
        }
        if !(lo.is_finite() && hi.is_finite() && lo < hi) {
            return Err(AnalysisError::InvalidBinning(format!(
                "range [{}, {}) is empty or not finite",
                lo, hi
            )));
        }
        Ok(Binning::Regular { bins, lo, hi })
    }

    pub fn variable(edges: Vec<f64>) -> Result<Self> {
        if edges.len() < 2 {
            return Err(AnalysisError::InvalidBinning("need at least two edges".into()));
        }
        if edges.iter().any(|e| !e.is_finite()) || edges.windows(2).any(|w| w[0] >= w[1]) {
            return Err(AnalysisError::InvalidBinning(format!(
                "edges must be finite and strictly increasing: {:?}",
                edges
            )));
        }
        Ok(Binning::Variable { edges })
    }

    pub fn n_bins(&self) -> usize {
        match self {
            Binning::Regular { bins, .. } => *bins,
            Binning::Variable { edges } => edges.len() - 1,
        }
    }

    pub fn edges(&self) -> Vec<f64> {
        match self {
            Binning::Regular { bins, lo, hi } => {
                let width = (hi - lo) / *bins as f64;
                (0..=*bins)
                    .map(|i| if i == *bins { *hi } else { lo + width * i as f64 })
                    .collect()
            }
            Binning::Variable { edges } => edges.clone(),
        }
    }
}

/// Bin index of `x`, `None` outside `[edges[0], edges[last])` and for NaN.
fn find_bin(edges: &[f64], x: f64) -> Option<usize> {
    let (first, last) = (*edges.first()?, *edges.last()?);
    if x.is_nan() || x < first || x >= last {
        return None;
    }
    // Number of edges <= x, minus one.
    Some(edges.partition_point(|e| *e <= x) - 1)
}

/// Un-binned sum of weights with its squared-weight companion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Yield {
    pub sumw: f64,
    pub sumw2: f64,
}

impl Yield {
    pub fn new(sumw: f64, sumw2: f64) -> Self {
        Self { sumw, sumw2 }
    }

    pub fn add(&mut self, w: f64) {
        self.sumw += w;
        self.sumw2 += w * w;
    }

    pub fn value(&self) -> f64 {
        self.sumw
    }

    pub fn uncertainty(&self) -> f64 {
        self.sumw2.sqrt()
    }

    pub fn merge(&mut self, other: Yield) {
        self.sumw += other.sumw;
        self.sumw2 += other.sumw2;
    }
}

impl Sum for Yield {
    fn sum<I: Iterator<Item = Yield>>(iter: I) -> Self {
        iter.fold(Yield::default(), |mut acc, y| {
            acc.merge(y);
            acc
        })
    }
}

/// A 1-D histogram holding per-bin sum of weights and sum of squared weights.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    name: String,
    label: String,
    color: Option<Color>,
    edges: Vec<f64>,
    sumw: Vec<f64>,
    sumw2: Vec<f64>,
    entries: u64,
}

impl Histogram {
    pub fn new(name: impl Into<String>, binning: &Binning) -> Self {
        let name = name.into();
        let n = binning.n_bins();
        Self {
            label: name.clone(),
            name,
            color: None,
            edges: binning.edges(),
            sumw: vec![0.0; n],
            sumw2: vec![0.0; n],
            entries: 0,
        }
    }

    /// Fill one value. Returns whether it landed in a bin.
    pub fn fill(&mut self, x: f64, w: f64) -> bool {
        match find_bin(&self.edges, x) {
            Some(bin) => {
                self.sumw[bin] += w;
                self.sumw2[bin] += w * w;
                self.entries += 1;
                true
            }
            None => false,
        }
    }

    /// Bin-wise sum of contents and squared-weight terms.
    pub fn merge(&mut self, other: &Histogram) -> Result<()> {
        if self.edges != other.edges {
            return Err(AnalysisError::IncompatibleBinning {
                left: self.name.clone(),
                right: other.name.clone(),
            });
        }
        for (a, b) in self.sumw.iter_mut().zip(&other.sumw) {
            *a += b;
        }
        for (a, b) in self.sumw2.iter_mut().zip(&other.sumw2) {
            *a += b;
        }
        self.entries += other.entries;
        Ok(())
    }

    /// Same contents under a new name and display style.
    pub fn styled(mut self, name: &str, label: &str, color: Option<Color>) -> Self {
        self.name = name.to_string();
        self.label = label.to_string();
        self.color = color;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn color(&self) -> Option<Color> {
        self.color
    }

    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    pub fn n_bins(&self) -> usize {
        self.sumw.len()
    }

    pub fn sumw(&self) -> &[f64] {
        &self.sumw
    }

    pub fn sumw2(&self) -> &[f64] {
        &self.sumw2
    }

    /// Per-bin uncertainty, sqrt of the squared-weight sum.
    pub fn errors(&self) -> Vec<f64> {
        self.sumw2.iter().map(|s| s.sqrt()).collect()
    }

    pub fn entries(&self) -> u64 {
        self.entries
    }

    pub fn integral(&self) -> f64 {
        self.sumw.iter().sum()
    }

    /// Contents summed over all bins.
    pub fn total(&self) -> Yield {
        Yield::new(self.integral(), self.sumw2.iter().sum())
    }
}

/// A 2-D histogram. Bin `(i, j)` (x bin `i`, y bin `j`) lives at
/// `i * ny + j` in the content vectors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram2D {
    name: String,
    label: String,
    color: Option<Color>,
    x_edges: Vec<f64>,
    y_edges: Vec<f64>,
    sumw: Vec<f64>,
    sumw2: Vec<f64>,
    entries: u64,
}

impl Histogram2D {
    pub fn new(name: impl Into<String>, x: &Binning, y: &Binning) -> Self {
        let name = name.into();
        let n = x.n_bins() * y.n_bins();
        Self {
            label: name.clone(),
            name,
            color: None,
            x_edges: x.edges(),
            y_edges: y.edges(),
            sumw: vec![0.0; n],
            sumw2: vec![0.0; n],
            entries: 0,
        }
    }

    fn index(&self, i: usize, j: usize) -> usize {
        i * (self.y_edges.len() - 1) + j
    }

    /// Fill one `(x, y)` pair; both must land inside the ranges.
    pub fn fill(&mut self, x: f64, y: f64, w: f64) -> bool {
        let (Some(i), Some(j)) = (find_bin(&self.x_edges, x), find_bin(&self.y_edges, y)) else {
            return false;
        };
        let bin = self.index(i, j);
        self.sumw[bin] += w;
        self.sumw2[bin] += w * w;
        self.entries += 1;
        true
    }

    pub fn merge(&mut self, other: &Histogram2D) -> Result<()> {
        if self.x_edges != other.x_edges || self.y_edges != other.y_edges {
            return Err(AnalysisError::IncompatibleBinning {
                left: self.name.clone(),
                right: other.name.clone(),
            });
        }
        for (a, b) in self.sumw.iter_mut().zip(&other.sumw) {
            *a += b;
        }
        for (a, b) in self.sumw2.iter_mut().zip(&other.sumw2) {
            *a += b;
        }
        self.entries += other.entries;
        Ok(())
    }

    pub fn styled(mut self, name: &str, label: &str, color: Option<Color>) -> Self {
        self.name = name.to_string();
        self.label = label.to_string();
        self.color = color;
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn x_edges(&self) -> &[f64] {
        &self.x_edges
    }

    pub fn y_edges(&self) -> &[f64] {
        &self.y_edges
    }

    /// Contents of x bin `i`, y bin `j`.
    pub fn content(&self, i: usize, j: usize) -> f64 {
        self.sumw[self.index(i, j)]
    }

    pub fn error(&self, i: usize, j: usize) -> f64 {
        self.sumw2[self.index(i, j)].sqrt()
    }

    /// The `(i, j)` of the fullest bin, first one on ties. `None` when empty.
    pub fn peak(&self) -> Option<(usize, usize)> {
        let ny = self.y_edges.len() - 1;
        let mut best: Option<(usize, f64)> = None;
        for (k, w) in self.sumw.iter().enumerate() {
            if *w > 0.0 && best.is_none_or(|(_, b)| *w > b) {
                best = Some((k, *w));
            }
        }
        best.map(|(k, _)| (k / ny, k % ny))
    }

    pub fn entries(&self) -> u64 {
        self.entries
    }

    pub fn integral(&self) -> f64 {
        self.sumw.iter().sum()
    }

    pub fn total(&self) -> Yield {
        Yield::new(self.integral(), self.sumw2.iter().sum())
    }
}

/// Per-block histogram layers, bottom first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stack {
    pub name: String,
    pub binning: Binning,
    pub layers: Vec<Histogram>,
}

impl Stack {
    /// All layers merged into one histogram.
    pub fn total(&self) -> Result<Histogram> {
        let mut sum = Histogram::new(&self.name, &self.binning);
        for layer in &self.layers {
            sum.merge(layer)?;
        }
        Ok(sum)
    }
}

/// What to histogram: a variable expression, its binning, and an optional
/// extra cut and weight override.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramRequest {
    pub name: String,
    pub variable: String,
    pub binning: Binning,
    pub cut: Option<String>,
    /// Replaces the per-event weight when set.
    pub weight: Option<String>,
}

impl HistogramRequest {
    pub fn new(name: impl Into<String>, variable: impl Into<String>, binning: Binning) -> Self {
        Self {
            name: name.into(),
            variable: variable.into(),
            binning,
            cut: None,
            weight: None,
        }
    }

    pub fn with_cut(mut self, cut: impl Into<String>) -> Self {
        self.cut = Some(cut.into());
        self
    }

    pub fn with_weight(mut self, weight: impl Into<String>) -> Self {
        self.weight = Some(weight.into());
        self
    }
}

/// Two variables against each other, with the same cut and weight options
/// as [`HistogramRequest`].
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram2DRequest {
    pub name: String,
    pub x: String,
    pub x_binning: Binning,
    pub y: String,
    pub y_binning: Binning,
    pub cut: Option<String>,
    pub weight: Option<String>,
}

impl Histogram2DRequest {
    pub fn new(
        name: impl Into<String>,
        x: impl Into<String>,
        x_binning: Binning,
        y: impl Into<String>,
        y_binning: Binning,
    ) -> Self {
        Self {
            name: name.into(),
            x: x.into(),
            x_binning,
            y: y.into(),
            y_binning,
            cut: None,
            weight: None,
        }
    }

    pub fn with_cut(mut self, cut: impl Into<String>) -> Self {
        self.cut = Some(cut.into());
        self
    }

    pub fn with_weight(mut self, weight: impl Into<String>) -> Self {
        self.weight = Some(weight.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;

    fn filled(name: &str, values: &[(f64, f64)]) -> Histogram {
        let mut h = Histogram::new(name, &Binning::regular(4, 0.0, 4.0).unwrap());
        for (x, w) in values {
            h.fill(*x, *w);
        }
        h
    }

    #[test]
    fn binning_validation() {
        assert!(Binning::regular(0, 0.0, 1.0).is_err());
        assert!(Binning::regular(10, 1.0, 1.0).is_err());
        assert!(Binning::regular(10, 0.0, f64::INFINITY).is_err());
        assert!(Binning::variable(vec![0.0]).is_err());
        assert!(Binning::variable(vec![0.0, 2.0, 1.0]).is_err());
        assert_eq!(
            Binning::regular(4, 40.0, 60.0).unwrap().edges(),
            vec![40.0, 45.0, 50.0, 55.0, 60.0]
        );
    }

    #[test]
    fn fill_drops_out_of_range_and_nan() {
        let h = filled(
            "h",
            &[(0.5, 1.0), (1.5, 2.0), (1.5, 2.0), (4.0, 1.0), (-0.1, 1.0), (f64::NAN, 1.0), (0.0, 0.5)],
        );
        assert_eq!(h.sumw(), &[1.5, 4.0, 0.0, 0.0]);
        assert_eq!(h.sumw2(), &[1.25, 8.0, 0.0, 0.0]);
        assert_eq!(h.entries(), 4);
    }

    #[test]
    fn variable_bins() {
        let mut h = Histogram::new("m", &Binning::variable(vec![40.0, 70.0, 110.0, 150.0]).unwrap());
        for x in [40.0, 69.9, 70.0, 91.2, 149.9, 150.0] {
            h.fill(x, 1.0);
        }
        assert_eq!(h.sumw(), &[2.0, 2.0, 1.0]);
    }

    #[test]
    fn merge_is_associative_and_commutative() {
        let a = filled("a", &[(0.5, 1.0), (2.5, -0.5)]);
        let b = filled("b", &[(1.5, 2.0), (0.2, 0.25)]);
        let c = filled("c", &[(3.5, 4.0)]);

        let mut ab_c = a.clone();
        ab_c.merge(&b).unwrap();
        ab_c.merge(&c).unwrap();

        let mut bc = b.clone();
        bc.merge(&c).unwrap();
        let mut a_bc = a.clone();
        a_bc.merge(&bc).unwrap();

        let mut c_b_a = c.clone();
        c_b_a.merge(&b).unwrap();
        c_b_a.merge(&a).unwrap();

        for other in [&a_bc, &c_b_a] {
            for (x, y) in ab_c.sumw().iter().zip(other.sumw()) {
                assert_relative_eq!(*x, *y);
            }
            for (x, y) in ab_c.sumw2().iter().zip(other.sumw2()) {
                assert_relative_eq!(*x, *y);
            }
        }
        assert_eq!(ab_c.entries(), 5);
    }

    #[test]
    fn merge_rejects_other_edges() {
        let mut a = filled("a", &[]);
        let b = Histogram::new("b", &Binning::regular(5, 0.0, 4.0).unwrap());
        assert!(matches!(
            a.merge(&b),
            Err(AnalysisError::IncompatibleBinning { .. })
        ));
    }

    #[test]
    fn yields_add_in_quadrature() {
        let total: Yield = [Yield::new(10.0, 9.0), Yield::new(20.0, 16.0)].into_iter().sum();
        assert_eq!(total.value(), 30.0);
        assert_eq!(total.uncertainty(), 5.0);

        let mut y = Yield::default();
        for _ in 0..100 {
            y.add(1.0);
        }
        assert_eq!((y.value(), y.uncertainty()), (100.0, 10.0));
    }

    #[test]
    fn stack_total_keeps_layers() {
        let binning = Binning::regular(4, 0.0, 4.0).unwrap();
        let stack = Stack {
            name: "mc".into(),
            binning,
            layers: vec![
                filled("dy", &[(0.5, 2.0)]).styled("DY", "Drell-Yan", Some(Color::Index(861))),
                filled("tt", &[(0.5, 1.0), (3.5, 1.0)]),
            ],
        };
        let total = stack.total().unwrap();
        assert_eq!(total.name(), "mc");
        assert_eq!(total.sumw(), &[3.0, 0.0, 0.0, 1.0]);
        assert_eq!(stack.layers[0].label(), "Drell-Yan");
    }

    #[test]
    fn histogram_2d_fill_and_merge() {
        let x = Binning::regular(2, 0.0, 2.0).unwrap();
        let y = Binning::variable(vec![0.0, 10.0, 100.0]).unwrap();
        let mut a = Histogram2D::new("pt_vs_n", &x, &y);
        assert!(a.fill(0.5, 50.0, 2.0));
        assert!(a.fill(1.5, 5.0, 1.0));
        assert!(!a.fill(1.5, 100.0, 1.0));
        assert!(!a.fill(2.0, 5.0, 1.0));
        assert_eq!(a.content(0, 1), 2.0);
        assert_eq!(a.content(1, 0), 1.0);
        assert_eq!(a.content(0, 0), 0.0);

        let mut b = Histogram2D::new("other", &x, &y);
        b.fill(0.5, 50.0, 1.0);
        a.merge(&b).unwrap();
        assert_eq!(a.content(0, 1), 3.0);
        assert_relative_eq!(a.error(0, 1), 5.0_f64.sqrt());
        assert_eq!(a.peak(), Some((0, 1)));
        assert_eq!(Histogram2D::new("empty", &x, &y).peak(), None);
        assert_eq!(a.entries(), 3);
        assert_eq!(a.total(), Yield::new(4.0, 6.0));

        let flipped = Histogram2D::new("flipped", &y, &x);
        assert!(matches!(
            a.merge(&flipped),
            Err(AnalysisError::IncompatibleBinning { .. })
        ));
    }
}
