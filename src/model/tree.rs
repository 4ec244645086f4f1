//! The top of the sample hierarchy: blocks built from a definitions file.

use super::block::Block;
use super::histogram::{Histogram, Histogram2D, Histogram2DRequest, HistogramRequest, Stack, Yield};
use super::sample::{LoadContext, Sample};
use crate::error::Result;
use crate::spec::{self, SampleDef, VariableConfig};
use std::fmt::Write as _;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    /// Fail on the first malformed line instead of skipping it.
    pub strict: bool,
    /// Keep only these sample names (all when empty).
    pub only: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Tree {
    name: String,
    is_data: bool,
    blocks: Vec<Block>,
}

impl Tree {
    pub fn new(name: impl Into<String>, is_data: bool) -> Self {
        Self {
            name: name.into(),
            is_data,
            blocks: Vec::new(),
        }
    }

    /// Read a definitions file and load every sample it lists.
    pub fn parse(
        path: &Path,
        name: &str,
        is_data: bool,
        ctx: &LoadContext<'_>,
        options: &ParseOptions,
    ) -> Result<Tree> {
        let mut defs = spec::read_definitions(path)?;
        let source = path.display().to_string();
        for bad in defs.malformed.drain(..) {
            if options.strict {
                return Err(bad.into_error(&source));
            }
            warn!("skipping {}:{}: {}", source, bad.line, bad.reason);
        }
        defs.retain_names(&options.only);
        Self::assemble(name, is_data, &defs.samples, ctx)
    }

    /// Load samples and group them into blocks in definition order.
    pub fn assemble(name: &str, is_data: bool, defs: &[SampleDef], ctx: &LoadContext<'_>) -> Result<Tree> {
        let mut tree = Tree::new(name, is_data);
        for def in defs {
            tree.insert(&def.block, Sample::load(def, ctx)?);
        }
        info!(tree = name, blocks = tree.blocks.len(), "tree assembled");
        Ok(tree)
    }

    /// Add a sample to the named block. A new block takes its label and
    /// color from its first sample.
    pub fn insert(&mut self, block: &str, sample: Sample) {
        match self.blocks.iter_mut().find(|b| b.name() == block) {
            Some(existing) => existing.add_sample(sample),
            None => {
                let mut new = Block::new(block, sample.label(), sample.color(), sample.is_data());
                new.add_sample(sample);
                self.blocks.push(new);
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_data(&self) -> bool {
        self.is_data
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    fn samples_mut(&mut self) -> impl Iterator<Item = &mut Sample> {
        self.blocks.iter_mut().flat_map(|b| b.samples_mut().iter_mut())
    }

    /// Append a selection to every sample.
    pub fn set_selection(&mut self, expr: &str) {
        for sample in self.samples_mut() {
            sample.add_selection(expr);
        }
    }

    pub fn clear_selections(&mut self) {
        for sample in self.samples_mut() {
            sample.clear_selections();
        }
    }

    /// Register every `[name, expression]` pair on every sample, in order.
    pub fn set_definitions(&mut self, config: &VariableConfig) -> Result<()> {
        for sample in self.samples_mut() {
            for (name, expr) in &config.definitions {
                sample.define(name, expr)?;
            }
        }
        Ok(())
    }

    pub fn define_dimuon_mass(&mut self) -> Result<()> {
        for sample in self.samples_mut() {
            sample.define_dimuon_mass()?;
        }
        Ok(())
    }

    /// All blocks merged, named after the tree.
    pub fn histogram(&self, request: &HistogramRequest, lumi: f64) -> Result<Histogram> {
        let stack = self.stack(request, lumi)?;
        let total = stack.total()?;
        let style = self.blocks.first().map(|b| (b.label().to_string(), b.color()));
        Ok(match style {
            Some((label, color)) if self.blocks.len() == 1 => total.styled(&request.name, &label, Some(color)),
            _ => total.styled(&request.name, &self.name, None),
        })
    }

    /// All blocks merged into one 2-D histogram, labelled with the tree name.
    pub fn histogram_2d(&self, request: &Histogram2DRequest, lumi: f64) -> Result<Histogram2D> {
        let mut merged = Histogram2D::new(&request.name, &request.x_binning, &request.y_binning);
        for block in &self.blocks {
            merged.merge(&block.histogram_2d(request, lumi)?)?;
        }
        Ok(merged.styled(&request.name, &self.name, None))
    }

    /// One layer per block, in block order.
    pub fn stack(&self, request: &HistogramRequest, lumi: f64) -> Result<Stack> {
        let layers = self
            .blocks
            .iter()
            .map(|b| b.histogram(request, lumi))
            .collect::<Result<Vec<_>>>()?;
        Ok(Stack {
            name: request.name.clone(),
            binning: request.binning.clone(),
            layers,
        })
    }

    pub fn event_yield(&self, lumi: f64) -> Result<Yield> {
        self.blocks.iter().map(|b| b.event_yield(lumi)).sum()
    }

    /// Yield per block, in block order.
    pub fn block_yields(&self, lumi: f64) -> Result<Vec<(String, Yield)>> {
        self.blocks
            .iter()
            .map(|b| Ok((b.name().to_string(), b.event_yield(lumi)?)))
            .collect()
    }

    pub fn summary(&self) -> String {
        let mut out = String::new();
        let kind = if self.is_data { "data" } else { "simulation" };
        let _ = writeln!(out, "Tree {} ({}, {} blocks)", self.name, kind, self.blocks.len());
        for block in &self.blocks {
            let _ = writeln!(
                out,
                "Block {} ({}, {}, color {}, {} samples)",
                block.name(),
                block.label(),
                if block.is_data() { "data" } else { "simulation" },
                block.color(),
                block.samples().len()
            );
            for sample in block.samples() {
                out.push_str(&sample.summary());
            }
        }
        out
    }
}
