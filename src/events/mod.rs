//! Columnar event storage.
//!
//! NanoAOD events are flat records mixing per-event scalars (`nMuon`,
//! `genWeight`) and per-object collections (`Muon_pt`, `Muon_charge`). We
//! keep them column-wise: scalar columns as one value per event, jagged
//! columns as a flat value buffer plus per-event offsets.

pub mod kinematics;
pub mod loader;

pub use loader::{EventLoader, NdjsonLoader};

use crate::error::{AnalysisError, Result};
use std::collections::BTreeMap;

/// One event field, stored column-wise.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    /// One value per event.
    Scalar(Vec<f64>),
    /// A variable-length list per event. `offsets` has `len + 1` entries and
    /// event `i` owns `values[offsets[i]..offsets[i + 1]]`.
    Jagged { offsets: Vec<usize>, values: Vec<f64> },
}

impl Column {
    /// Build a jagged column from per-event lists.
    pub fn jagged<I, R>(rows: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: AsRef<[f64]>,
    {
        let mut offsets = vec![0];
        let mut values = Vec::new();
        for row in rows {
            values.extend_from_slice(row.as_ref());
            offsets.push(values.len());
        }
        Column::Jagged { offsets, values }
    }

    /// Number of events covered by this column.
    pub fn len(&self) -> usize {
        match self {
            Column::Scalar(v) => v.len(),
            Column::Jagged { offsets, .. } => offsets.len().saturating_sub(1),
        }
    }

    pub fn is_jagged(&self) -> bool {
        matches!(self, Column::Jagged { .. })
    }

    /// The list owned by event `row` (jagged columns only).
    pub fn list(&self, row: usize) -> Option<&[f64]> {
        match self {
            Column::Scalar(_) => None,
            Column::Jagged { offsets, values } => {
                let (start, end) = (*offsets.get(row)?, *offsets.get(row + 1)?);
                Some(&values[start..end])
            }
        }
    }

    fn filter(&self, mask: &[bool]) -> Column {
        match self {
            Column::Scalar(v) => Column::Scalar(
                v.iter()
                    .zip(mask)
                    .filter_map(|(x, keep)| keep.then_some(*x))
                    .collect(),
            ),
            Column::Jagged { .. } => Column::jagged(
                mask.iter()
                    .enumerate()
                    .filter(|(_, keep)| **keep)
                    .filter_map(|(row, _)| self.list(row)),
            ),
        }
    }

    fn append(&mut self, other: Column) -> std::result::Result<(), &'static str> {
        match (self, other) {
            (Column::Scalar(a), Column::Scalar(b)) => {
                a.extend(b);
                Ok(())
            }
            (
                Column::Jagged { offsets, values },
                Column::Jagged {
                    offsets: more_offsets,
                    values: more_values,
                },
            ) => {
                let base = values.len();
                offsets.extend(more_offsets.iter().skip(1).map(|o| o + base));
                values.extend(more_values);
                Ok(())
            }
            _ => Err("field is a scalar in one file and a collection in another"),
        }
    }
}

/// A set of events with named columns of equal length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventTable {
    len: usize,
    columns: BTreeMap<String, Column>,
}

impl EventTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from `(name, column)` pairs.
    pub fn from_columns<I, S>(columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Column)>,
        S: Into<String>,
    {
        let mut table = EventTable::new();
        for (name, column) in columns {
            table.insert_column(name, column)?;
        }
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    /// Values of a scalar column.
    pub fn scalar(&self, name: &str) -> Option<&[f64]> {
        match self.columns.get(name)? {
            Column::Scalar(v) => Some(v),
            Column::Jagged { .. } => None,
        }
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Add or replace a column. Its length must match the table's.
    pub fn insert_column(&mut self, name: impl Into<String>, column: Column) -> Result<()> {
        let name = name.into();
        if self.columns.is_empty() {
            self.len = column.len();
        } else if column.len() != self.len {
            return Err(AnalysisError::ColumnLength {
                field: name,
                len: column.len(),
                expected: self.len,
            });
        }
        self.columns.insert(name, column);
        Ok(())
    }

    /// Keep the events whose mask entry is true.
    pub fn filter(&self, mask: &[bool]) -> EventTable {
        debug_assert_eq!(mask.len(), self.len);
        EventTable {
            len: mask.iter().filter(|keep| **keep).count(),
            columns: self
                .columns
                .iter()
                .map(|(name, column)| (name.clone(), column.filter(mask)))
                .collect(),
        }
    }

    /// Sum of a scalar column.
    pub fn sum(&self, name: &str) -> Option<f64> {
        self.scalar(name).map(|v| v.iter().sum())
    }

    /// Concatenate tables sharing one schema, in order. Tables without
    /// events carry no schema and are skipped.
    pub fn concat(tables: Vec<EventTable>) -> Result<EventTable> {
        let mut tables = tables.into_iter().filter(|t| !t.is_empty());
        let Some(mut out) = tables.next() else {
            return Ok(EventTable::new());
        };
        for table in tables {
            if table.columns.len() != out.columns.len() {
                return Err(AnalysisError::load(
                    "event tables",
                    format!(
                        "schemas differ: [{}] vs [{}]",
                        out.field_names().collect::<Vec<_>>().join(", "),
                        table.field_names().collect::<Vec<_>>().join(", ")
                    ),
                ));
            }
            out.len += table.len;
            for (name, column) in table.columns {
                let target = out.columns.get_mut(&name).ok_or_else(|| {
                    AnalysisError::load("event tables", format!("field '{}' missing", name))
                })?;
                target
                    .append(column)
                    .map_err(|reason| AnalysisError::load("event tables", format!("{}: {}", name, reason)))?;
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn muons() -> EventTable {
        EventTable::from_columns([
            ("nMuon", Column::Scalar(vec![2.0, 0.0, 1.0])),
            ("Muon_pt", Column::jagged([vec![40.0, 30.0], vec![], vec![25.0]])),
        ])
        .unwrap()
    }

    #[test]
    fn jagged_rows() {
        let table = muons();
        let pt = table.column("Muon_pt").unwrap();
        assert_eq!(pt.len(), 3);
        assert_eq!(pt.list(0), Some(&[40.0, 30.0][..]));
        assert_eq!(pt.list(1), Some(&[][..]));
        assert_eq!(pt.list(3), None);
    }

    #[test]
    fn length_mismatch_rejected() {
        let mut table = muons();
        let err = table
            .insert_column("bad", Column::Scalar(vec![1.0]))
            .unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::ColumnLength {
                len: 1,
                expected: 3,
                ..
            }
        ));
        assert!(err.to_string().contains("'bad' has 1 entries"));
    }

    #[test]
    fn filter_keeps_jagged_alignment() {
        let table = muons().filter(&[true, false, true]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.scalar("nMuon"), Some(&[2.0, 1.0][..]));
        assert_eq!(
            table.column("Muon_pt"),
            Some(&Column::jagged([vec![40.0, 30.0], vec![25.0]]))
        );
    }

    #[test]
    fn concat_shifts_offsets() {
        let joined = EventTable::concat(vec![muons(), muons()]).unwrap();
        assert_eq!(joined.len(), 6);
        assert_eq!(joined.sum("nMuon"), Some(6.0));
        assert_eq!(joined.column("Muon_pt").unwrap().list(5), Some(&[25.0][..]));
    }

    #[test]
    fn concat_rejects_schema_drift() {
        let other = EventTable::from_columns([("nMuon", Column::Scalar(vec![1.0]))]).unwrap();
        assert!(EventTable::concat(vec![muons(), other]).is_err());
    }

    #[test]
    fn concat_skips_empty_tables() {
        let joined = EventTable::concat(vec![EventTable::new(), muons(), EventTable::new()]).unwrap();
        assert_eq!(joined.len(), 3);
        assert_eq!(joined.field_names().collect::<Vec<_>>(), vec!["Muon_pt", "nMuon"]);

        let nothing = EventTable::concat(vec![EventTable::new(), EventTable::new()]).unwrap();
        assert!(nothing.is_empty());
    }
}
