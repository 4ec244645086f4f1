//! Event loading collaborators.
//!
//! A loader turns one resolved file into an [`EventTable`]. The bundled
//! [`NdjsonLoader`] reads one JSON object per line, e.g.
//!
//! {"event": 1, "genWeight": 1.0, "nMuon": 2, "Muon_pt": [41.2, 30.5]}
//!
//! Numbers and booleans become scalar fields, arrays become jagged fields.

use super::{Column, EventTable};
use crate::error::{AnalysisError, Result};
use crate::files::FileLocation;

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;

/// Loads the events stored in one file.
pub trait EventLoader {
    fn load(&self, file: &FileLocation) -> Result<EventTable>;
}

/// Reads newline-delimited JSON event files from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct NdjsonLoader;

impl EventLoader for NdjsonLoader {
    fn load(&self, file: &FileLocation) -> Result<EventTable> {
        let path = match file {
            FileLocation::Local(path) => path,
            FileLocation::Remote(url) => {
                return Err(AnalysisError::load(url, "remote files need a remote-capable loader"));
            }
        };
        if path.extension().and_then(|e| e.to_str()) == Some("root") {
            return Err(AnalysisError::load(
                path.display(),
                "ROOT files need a ROOT-capable loader",
            ));
        }
        let text = fs::read_to_string(path)?;
        parse_ndjson(&text, &path.display().to_string())
    }
}

enum Builder {
    Scalar(Vec<f64>),
    Jagged { offsets: Vec<usize>, values: Vec<f64> },
}

impl Builder {
    fn push(&mut self, value: &Value) -> std::result::Result<(), String> {
        match (self, value) {
            (Builder::Scalar(_), Value::Array(_)) => {
                Err("expected a number, found a list".to_string())
            }
            (Builder::Scalar(v), other) => {
                v.push(as_number(other)?);
                Ok(())
            }
            (Builder::Jagged { offsets, values }, Value::Array(items)) => {
                for item in items {
                    values.push(as_number(item)?);
                }
                offsets.push(values.len());
                Ok(())
            }
            (Builder::Jagged { .. }, _) => Err("expected a list, found a number".to_string()),
        }
    }

    fn finish(self) -> Column {
        match self {
            Builder::Scalar(v) => Column::Scalar(v),
            Builder::Jagged { offsets, values } => Column::Jagged { offsets, values },
        }
    }
}

fn as_number(value: &Value) -> std::result::Result<f64, String> {
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| format!("number {} out of range", n)),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        other => Err(format!("unsupported value {}", other)),
    }
}

/// Parse NDJSON text into an event table. `source` only labels errors.
pub fn parse_ndjson(text: &str, source: &str) -> Result<EventTable> {
    let mut builders: BTreeMap<String, Builder> = BTreeMap::new();

    for (lineno, line) in text.lines().enumerate() {
        let lno = lineno + 1;
        if line.trim().is_empty() {
            continue;
        }

        let record: Map<String, Value> = serde_json::from_str(line)
            .map_err(|e| AnalysisError::load(format!("{}:{}", source, lno), e.to_string()))?;
        if record.is_empty() {
            return Err(AnalysisError::load(format!("{}:{}", source, lno), "event has no fields"));
        }

        // The first event fixes the schema.
        if builders.is_empty() {
            for (name, value) in &record {
                let builder = match value {
                    Value::Array(_) => Builder::Jagged {
                        offsets: vec![0],
                        values: Vec::new(),
                    },
                    _ => Builder::Scalar(Vec::new()),
                };
                builders.insert(name.clone(), builder);
            }
        }

        if record.len() != builders.len() {
            return Err(AnalysisError::load(
                format!("{}:{}", source, lno),
                format!("event has {} fields, expected {}", record.len(), builders.len()),
            ));
        }
        for (name, builder) in builders.iter_mut() {
            let value = record.get(name).ok_or_else(|| {
                AnalysisError::load(format!("{}:{}", source, lno), format!("missing field '{}'", name))
            })?;
            builder.push(value).map_err(|reason| {
                AnalysisError::load(format!("{}:{}", source, lno), format!("field '{}': {}", name, reason))
            })?;
        }
    }

    EventTable::from_columns(builders.into_iter().map(|(name, b)| (name, b.finish())))
}
