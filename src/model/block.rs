//! A named group of samples drawn as one layer.

use super::histogram::{Histogram, Histogram2D, Histogram2DRequest, HistogramRequest, Yield};
use super::sample::Sample;
use crate::error::Result;
use crate::spec::Color;

#[derive(Debug, Clone)]
pub struct Block {
    name: String,
    label: String,
    color: Color,
    is_data: bool,
    samples: Vec<Sample>,
}

impl Block {
    pub fn new(name: impl Into<String>, label: impl Into<String>, color: Color, is_data: bool) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            color,
            is_data,
            samples: Vec::new(),
        }
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

    pub fn is_data(&self) -> bool {
        self.is_data
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn samples_mut(&mut self) -> &mut [Sample] {
        &mut self.samples
    }

    pub fn add_sample(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    /// Members merged bin by bin, styled as the block.
    pub fn histogram(&self, request: &HistogramRequest, lumi: f64) -> Result<Histogram> {
        let mut merged = Histogram::new(&request.name, &request.binning);
        for sample in &self.samples {
            merged.merge(&sample.histogram(request, lumi)?)?;
        }
        Ok(merged.styled(&self.name, &self.label, Some(self.color)))
    }

    pub fn histogram_2d(&self, request: &Histogram2DRequest, lumi: f64) -> Result<Histogram2D> {
        let mut merged = Histogram2D::new(&request.name, &request.x_binning, &request.y_binning);
        for sample in &self.samples {
            merged.merge(&sample.histogram_2d(request, lumi)?)?;
        }
        Ok(merged.styled(&self.name, &self.label, Some(self.color)))
    }

    pub fn event_yield(&self, lumi: f64) -> Result<Yield> {
        self.samples.iter().map(|s| s.event_yield(lumi)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::histogram::Binning;
    use crate::model::sample::tests::{def, dimuon_events, sample};
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;

    #[test]
    fn yields_combine_in_quadrature() {
        // Data samples of 10 and 20 unit-weight events after the cut.
        let mut a = sample(&def("a", "DATA", 1.0, true), dimuon_events(20, 1.0));
        a.add_selection("Muon_charge[0] + Muon_charge[1] == 0");
        let b = sample(&def("b", "DATA", 1.0, true), dimuon_events(20, 1.0));

        let mut block = Block::new("DATA", "Data", Color::Index(1), true);
        block.add_sample(a);
        block.add_sample(b);

        let y = block.event_yield(1.0).unwrap();
        assert_eq!(y.value(), 30.0);
        assert_relative_eq!(y.uncertainty(), 30f64.sqrt());
    }

    #[test]
    fn merged_histogram_takes_block_style() {
        let mut block = Block::new("DY", "Drell-Yan", Color::Index(861), false);
        block.add_sample(sample(&def("dy_a", "DY", 10.0, false), dimuon_events(10, 1.0)));
        block.add_sample(sample(&def("dy_b", "DY", 30.0, false), dimuon_events(10, 1.0)));

        let req = HistogramRequest::new("x", "x", Binning::regular(10, 0.0, 10.0).unwrap());
        let h = block.histogram(&req, 1.0).unwrap();
        assert_eq!(h.name(), "DY");
        assert_eq!(h.label(), "Drell-Yan");
        assert_eq!(h.color(), Some(Color::Index(861)));
        assert_relative_eq!(h.integral(), 40.0, epsilon = 1e-9);
        assert_eq!(h.entries(), 20);
    }

    #[test]
    fn merged_histogram_2d_takes_block_style() {
        let mut block = Block::new("DY", "Drell-Yan", Color::Index(861), false);
        block.add_sample(sample(&def("dy_a", "DY", 10.0, false), dimuon_events(10, 1.0)));
        block.add_sample(sample(&def("dy_b", "DY", 30.0, false), dimuon_events(10, 1.0)));

        let req = Histogram2DRequest::new(
            "x_vs_n",
            "x",
            Binning::regular(10, 0.0, 10.0).unwrap(),
            "nMuon",
            Binning::regular(4, 0.0, 4.0).unwrap(),
        );
        let h = block.histogram_2d(&req, 1.0).unwrap();
        assert_eq!(h.label(), "Drell-Yan");
        // One event per x bin from each sample: weights 1 and 3.
        assert_relative_eq!(h.content(0, 2), 4.0, epsilon = 1e-9);
        assert_relative_eq!(h.total().sumw2, 10.0 * (1.0 + 9.0), epsilon = 1e-9);
        assert_eq!(h.entries(), 20);
    }

    #[test]
    fn empty_block_is_empty() {
        let block = Block::new("EMPTY", "nothing", Color::Index(2), false);
        let req = HistogramRequest::new("x", "x", Binning::regular(2, 0.0, 1.0).unwrap());
        let h = block.histogram(&req, 1.0).unwrap();
        assert_eq!(h.sumw(), &[0.0, 0.0]);
        assert_eq!(block.event_yield(1.0).unwrap(), Yield::default());
    }
}
