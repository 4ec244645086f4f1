//! Error taxonomy for sample loading, selection evaluation and histogramming.

use thiserror::Error;

/// Errors raised by the analysis layer.
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// A locator resolved to zero files.
    #[error("no files found for locator '{locator}'")]
    NoFilesFound { locator: String },

    /// Files were resolved but no events could be loaded from them.
    #[error("sample '{sample}' has no events")]
    EmptySample { sample: String },

    /// The catalog client executable is not installed.
    #[error("catalog client '{client}' is not available (set up the CMS environment first)")]
    CatalogUnavailable { client: String },

    /// The catalog client ran but the query failed.
    #[error("catalog query for '{dataset}' failed: {reason}")]
    CatalogQueryFailed { dataset: String, reason: String },

    /// A selection, variable or weight expression could not be evaluated.
    #[error("cannot evaluate '{expr}': {reason}")]
    SelectionEval { expr: String, reason: String },

    /// A definitions-file line that does not describe a sample.
    #[error("malformed definition at {path}:{line}: {reason}")]
    MalformedDefinitionLine {
        path: String,
        line: usize,
        reason: String,
    },

    /// Simulated sample whose generator weights do not sum to a positive value.
    #[error("sample '{sample}' has sum of generator weights {sum_gen_weight}, cannot normalize")]
    InvalidNormalization { sample: String, sum_gen_weight: f64 },

    /// Bin specification that cannot describe a histogram.
    #[error("invalid binning: {0}")]
    InvalidBinning(String),

    /// Two histograms with different bin edges were merged.
    #[error("cannot merge histogram '{left}' with '{right}': bin edges differ")]
    IncompatibleBinning { left: String, right: String },

    /// Unknown color constant in a color spec.
    #[error("unknown color '{0}'")]
    UnknownColor(String),

    /// A column whose length differs from the event table's.
    #[error("field '{field}' has {len} entries, table has {expected}")]
    ColumnLength { field: String, len: usize, expected: usize },

    /// An event file could not be decoded.
    #[error("cannot load '{path}': {reason}")]
    Load { path: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("bad glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("bad regex: {0}")]
    Regex(#[from] regex::Error),
}

impl AnalysisError {
    pub(crate) fn eval(expr: &str, reason: impl Into<String>) -> Self {
        AnalysisError::SelectionEval {
            expr: expr.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn load(path: impl std::fmt::Display, reason: impl Into<String>) -> Self {
        AnalysisError::Load {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result alias for the analysis layer.
pub type Result<T> = std::result::Result<T, AnalysisError>;
