//! Sample definitions files.
//!
//! One sample per line, seven whitespace-separated fields:
//!
//! ```text
//! # block  color     name                label  locator                                   xsec     isdata
//! DATA     kBlack    Muon0_Run2024I_v1   Data   /Muon0/Run2024I-PromptReco-v1/NANOAOD     1        1
//! DY       kAzure+1  DYJetsToLL_M-50     DY     /store/mc/Run3Summer23NanoAODv12/DY/*.root 6077.22 0
//! ```
//!
//! Lines starting with `#` and near-empty lines are skipped. Anything else
//! that does not match the layout is collected as a [`MalformedLine`].

use super::color::Color;
use crate::error::{AnalysisError, Result};
use std::fs;
use std::path::Path;

/// One sample line.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleDef {
    pub block: String,
    pub color: Color,
    pub name: String,
    pub label: String,
    pub locator: String,
    /// Cross-section in pb.
    pub xsec: f64,
    pub is_data: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MalformedLine {
    pub line: usize,
    pub text: String,
    pub reason: String,
}

impl MalformedLine {
    pub fn into_error(self, path: &str) -> AnalysisError {
        AnalysisError::MalformedDefinitionLine {
            path: path.to_string(),
            line: self.line,
            reason: format!("{} ({:?})", self.reason, self.text),
        }
    }
}

/// Parsed definitions file: samples in file order plus rejected lines.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Definitions {
    pub samples: Vec<SampleDef>,
    pub malformed: Vec<MalformedLine>,
}

impl Definitions {
    /// Keep samples whose name is listed. An empty list keeps everything.
    pub fn retain_names(&mut self, names: &[String]) {
        if !names.is_empty() {
            self.samples.retain(|s| names.contains(&s.name));
        }
    }
}

pub fn parse_definitions(text: &str) -> Definitions {
    let mut defs = Definitions::default();
    for (lineno, line) in text.lines().enumerate() {
        if line.starts_with('#') || line.trim().len() < 2 {
            continue;
        }
        match parse_line(line) {
            Ok(sample) => defs.samples.push(sample),
            Err(reason) => defs.malformed.push(MalformedLine {
                line: lineno + 1,
                text: line.to_string(),
                reason,
            }),
        }
    }
    defs
}

fn parse_line(line: &str) -> std::result::Result<SampleDef, String> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let &[block, color, name, label, locator, xsec, is_data, ..] = fields.as_slice() else {
        return Err(format!("expected 7 fields, found {}", fields.len()));
    };

    let color: Color = color.parse().map_err(|e: AnalysisError| e.to_string())?;
    let xsec: f64 = xsec
        .parse()
        .map_err(|_| format!("cross-section '{}' is not a number", xsec))?;
    let is_data = match is_data {
        "0" => false,
        "1" => true,
        other => return Err(format!("is-data flag must be 0 or 1, found '{}'", other)),
    };

    Ok(SampleDef {
        block: block.to_string(),
        color,
        name: name.to_string(),
        label: label.to_string(),
        locator: locator.to_string(),
        xsec,
        is_data,
    })
}

pub fn read_definitions(path: &Path) -> Result<Definitions> {
    let text = fs::read_to_string(path)?;
    Ok(parse_definitions(&text))
}
