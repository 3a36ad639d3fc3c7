//! Tabular measurement results.
//!
//! A [`Table`] holds named columns and rows of typed [`Cell`]s. Analysis
//! steps produce one row per feature; batch processing concatenates the
//! tables of many images.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A single table value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    /// Integer value.
    Int(i64),
    /// Floating point value (may be NaN for failed measurements).
    Float(f64),
    /// Boolean value.
    Bool(bool),
    /// Text value.
    Text(String),
    /// No value, e.g. after concatenating tables with different columns.
    Missing,
}

impl Cell {
    /// Numeric view of the cell.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::Int(v) => Some(v as f64),
            Self::Float(v) => Some(v),
            _ => None,
        }
    }

    /// Text view of the cell.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
            Self::Missing => Ok(()),
        }
    }
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<i64> for Cell {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for Cell {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

/// Errors from building a table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TableError {
    /// A row does not have one cell per column.
    #[error("row has {found} cells, table has {expected} columns")]
    RowLength {
        /// Number of columns.
        expected: usize,
        /// Number of cells supplied.
        found: usize,
    },
}

/// Named columns of typed cells.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    /// An empty table with the given column names.
    #[must_use]
    pub fn new<S: AsRef<str>>(columns: &[S]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.as_ref().to_string()).collect(),
            rows: Vec::new(),
        }
    }

    /// A one-row table from `(column, value)` pairs.
    #[must_use]
    pub fn single_row(entries: Vec<(String, Cell)>) -> Self {
        let (columns, row): (Vec<String>, Vec<Cell>) = entries.into_iter().unzip();
        Self {
            columns,
            rows: vec![row],
        }
    }

    /// Column names in order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// All rows.
    #[must_use]
    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` if the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Iterate over one column's cells.
    pub fn column(&self, name: &str) -> Option<impl Iterator<Item = &Cell>> {
        let i = self.column_index(name)?;
        Some(self.rows.iter().map(move |r| &r[i]))
    }

    /// The cell at `row` in column `name`.
    #[must_use]
    pub fn get(&self, row: usize, name: &str) -> Option<&Cell> {
        let i = self.column_index(name)?;
        self.rows.get(row).map(|r| &r[i])
    }

    /// Append a row.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::RowLength`] if the row does not match the
    /// column count.
    pub fn push_row(&mut self, row: Vec<Cell>) -> Result<(), TableError> {
        if row.len() != self.columns.len() {
            return Err(TableError::RowLength {
                expected: self.columns.len(),
                found: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    /// Set column `name` to `value` in every row, adding the column if
    /// it does not exist.
    pub fn set_constant_column(&mut self, name: &str, value: &Cell) {
        if let Some(i) = self.column_index(name) {
            for row in &mut self.rows {
                row[i] = value.clone();
            }
        } else {
            self.columns.push(name.to_string());
            for row in &mut self.rows {
                row.push(value.clone());
            }
        }
    }

    /// Append a column computed from another column. Rows where the
    /// source is not numeric get [`Cell::Missing`]. Returns `false` if
    /// `source` does not exist.
    pub fn push_derived_column(
        &mut self,
        source: &str,
        name: &str,
        f: impl Fn(f64) -> f64,
    ) -> bool {
        let Some(i) = self.column_index(source) else {
            return false;
        };
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            let derived = row[i].as_f64().map_or(Cell::Missing, |v| Cell::Float(f(v)));
            row.push(derived);
        }
        true
    }

    /// Stack tables vertically. Columns are the union of all inputs in
    /// first-seen order; cells a table lacks are [`Cell::Missing`].
    #[must_use]
    pub fn concat<'a>(tables: impl IntoIterator<Item = &'a Self>) -> Self {
        let tables: Vec<&Self> = tables.into_iter().collect();
        let mut columns: Vec<String> = Vec::new();
        for t in &tables {
            for c in &t.columns {
                if !columns.contains(c) {
                    columns.push(c.clone());
                }
            }
        }
        let mut rows = Vec::with_capacity(tables.iter().map(|t| t.len()).sum());
        for t in &tables {
            let mapping: Vec<Option<usize>> = columns.iter().map(|c| t.column_index(c)).collect();
            for row in &t.rows {
                rows.push(
                    mapping
                        .iter()
                        .map(|m| m.map_or(Cell::Missing, |i| row[i].clone()))
                        .collect(),
                );
            }
        }
        Self { columns, rows }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn areas() -> Table {
        let mut t = Table::new(&["area_px2", "ellipse_angle"]);
        t.push_row(vec![Cell::Float(100.0), Cell::Float(10.0)]).unwrap();
        t.push_row(vec![Cell::Float(400.0), Cell::Float(20.0)]).unwrap();
        t
    }

    #[test]
    fn push_row_checks_length() {
        let mut t = Table::new(&["a", "b"]);
        assert_eq!(
            t.push_row(vec![Cell::Int(1)]),
            Err(TableError::RowLength {
                expected: 2,
                found: 1
            })
        );
        assert!(t.is_empty());
    }

    #[test]
    fn constant_column_is_added_to_every_row() {
        let mut t = areas();
        t.set_constant_column("filename", &"a.png".into());
        assert_eq!(t.columns().last().unwrap(), "filename");
        assert_eq!(t.get(1, "filename"), Some(&Cell::Text("a.png".to_string())));
    }

    #[test]
    fn constant_column_overwrites_existing() {
        let mut t = areas();
        t.set_constant_column("ellipse_angle", &Cell::Int(0));
        assert_eq!(t.columns().len(), 2);
        assert_eq!(t.get(0, "ellipse_angle"), Some(&Cell::Int(0)));
    }

    #[test]
    fn derived_column() {
        let mut t = areas();
        assert!(t.push_derived_column("area_px2", "area_half", |v| v / 2.0));
        assert_eq!(t.get(1, "area_half"), Some(&Cell::Float(200.0)));
        assert!(!t.push_derived_column("nope", "x", |v| v));
    }

    #[test]
    fn concat_unions_columns() {
        let a = areas();
        let b = Table::single_row(vec![
            ("area_px2".to_string(), Cell::Float(5.0)),
            ("filename".to_string(), "b.png".into()),
        ]);
        let c = Table::concat([&a, &b]);
        assert_eq!(c.columns(), ["area_px2", "ellipse_angle", "filename"]);
        assert_eq!(c.len(), 3);
        assert_eq!(c.get(0, "filename"), Some(&Cell::Missing));
        assert_eq!(c.get(2, "ellipse_angle"), Some(&Cell::Missing));
        assert_eq!(c.get(2, "area_px2"), Some(&Cell::Float(5.0)));
    }

    #[test]
    fn concat_of_nothing_is_empty() {
        let c = Table::concat(std::iter::empty::<&Table>());
        assert!(c.is_empty());
        assert!(c.columns().is_empty());
    }

    #[test]
    fn column_iterates_cells() {
        let t = areas();
        let values: Vec<f64> = t
            .column("area_px2")
            .unwrap()
            .filter_map(Cell::as_f64)
            .collect();
        assert_eq!(values, vec![100.0, 400.0]);
    }
}
