//! Open-ended, string-keyed data accumulated by a processing item.
//!
//! Bulky entries (contours, result tables) are reference counted, so
//! cloning a [`Metadata`] on every stage transition is a shallow copy:
//! the new item gets its own map, and writing to it never reaches the
//! predecessor's map.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::table::{Cell, Table};
use crate::types::{Contour, Dimensions};

/// A metadata value.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    /// Text.
    Text(String),
    /// Integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// Flag.
    Bool(bool),
    /// A filesystem path.
    Path(PathBuf),
    /// Image dimensions.
    Shape(Dimensions),
    /// Extracted contours.
    Contours(Arc<Vec<Contour>>),
    /// Tabular analysis results.
    Table(Arc<Table>),
}

/// String-keyed metadata of a processing item.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata(BTreeMap<String, MetaValue>);

impl Metadata {
    /// Key of the source path.
    pub const SOURCE: &'static str = "filepath";
    /// Key of the image dimensions.
    pub const IMAGE_SHAPE: &'static str = "image_shape";
    /// Key of the extracted contours.
    pub const CONTOURS: &'static str = "contours";
    /// Key of the analysis result table.
    pub const RESULTS: &'static str = "results";
    /// Key of the written overlay image.
    pub const OUTPUT_IMAGE_PATH: &'static str = "output_image_filepath";
    /// Key of the written data file.
    pub const OUTPUT_DATA_PATH: &'static str = "output_data_path";

    /// An empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A map holding only the source path.
    #[must_use]
    pub fn with_source(path: impl Into<PathBuf>) -> Self {
        let mut md = Self::new();
        md.insert(Self::SOURCE, MetaValue::Path(path.into()));
        md
    }

    /// Insert or replace an entry.
    pub fn insert(&mut self, key: &str, value: MetaValue) {
        self.0.insert(key.to_string(), value);
    }

    /// Look up an entry.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&MetaValue> {
        self.0.get(key)
    }

    /// Remove an entry.
    pub fn remove(&mut self, key: &str) -> Option<MetaValue> {
        self.0.remove(key)
    }

    /// Returns `true` if `key` is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetaValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Add entries from `extras` whose keys are not yet present; existing
    /// entries take precedence.
    pub fn merge_missing(&mut self, extras: Self) {
        for (k, v) in extras.0 {
            self.0.entry(k).or_insert(v);
        }
    }

    /// The source path, if known.
    #[must_use]
    pub fn source(&self) -> Option<&Path> {
        match self.get(Self::SOURCE)? {
            MetaValue::Path(p) => Some(p),
            MetaValue::Text(s) => Some(Path::new(s)),
            _ => None,
        }
    }

    /// Dimensions of the image the item was derived from.
    #[must_use]
    pub fn image_shape(&self) -> Option<Dimensions> {
        match self.get(Self::IMAGE_SHAPE)? {
            MetaValue::Shape(d) => Some(*d),
            _ => None,
        }
    }

    /// Extracted (or filtered) contours.
    #[must_use]
    pub fn contours(&self) -> Option<&[Contour]> {
        match self.get(Self::CONTOURS)? {
            MetaValue::Contours(c) => Some(c),
            _ => None,
        }
    }

    /// Analysis results.
    #[must_use]
    pub fn results(&self) -> Option<&Table> {
        match self.get(Self::RESULTS)? {
            MetaValue::Table(t) => Some(t),
            _ => None,
        }
    }

    /// Flatten the scalar entries into `(column, cell)` pairs. Shapes
    /// become `WxH` text, contours their count; tables are skipped.
    #[must_use]
    pub fn to_row(&self) -> Vec<(String, Cell)> {
        self.0
            .iter()
            .filter_map(|(k, v)| {
                let cell = match v {
                    MetaValue::Text(s) => Cell::Text(s.clone()),
                    MetaValue::Int(i) => Cell::Int(*i),
                    MetaValue::Float(f) => Cell::Float(*f),
                    MetaValue::Bool(b) => Cell::Bool(*b),
                    MetaValue::Path(p) => Cell::Text(p.display().to_string()),
                    MetaValue::Shape(d) => Cell::Text(d.to_string()),
                    MetaValue::Contours(c) => Cell::Int(i64::try_from(c.len()).unwrap_or(i64::MAX)),
                    MetaValue::Table(_) => return None,
                };
                Some((k.clone(), cell))
            })
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::Point;

    #[test]
    fn merge_missing_keeps_existing_entries() {
        let mut md = Metadata::with_source("a.png");
        let mut extras = Metadata::new();
        extras.insert(Metadata::SOURCE, MetaValue::Text("other.png".to_string()));
        extras.insert("objective", MetaValue::Text("20x".to_string()));
        md.merge_missing(extras);
        assert_eq!(md.source(), Some(Path::new("a.png")));
        assert_eq!(
            md.get("objective"),
            Some(&MetaValue::Text("20x".to_string()))
        );
    }

    #[test]
    fn clone_does_not_alias() {
        let mut old = Metadata::with_source("a.png");
        old.insert(
            Metadata::CONTOURS,
            MetaValue::Contours(Arc::new(vec![Contour::new(vec![Point::new(1.0, 1.0)])])),
        );
        let mut new = old.clone();
        new.insert(Metadata::CONTOURS, MetaValue::Contours(Arc::new(vec![])));
        new.insert("extra", MetaValue::Int(1));
        assert_eq!(old.contours().unwrap().len(), 1);
        assert!(!old.contains("extra"));
    }

    #[test]
    fn to_row_flattens_scalars() {
        let mut md = Metadata::with_source("a.png");
        md.insert(
            Metadata::IMAGE_SHAPE,
            MetaValue::Shape(Dimensions {
                width: 4,
                height: 3,
            }),
        );
        md.insert(Metadata::RESULTS, MetaValue::Table(Arc::new(Table::default())));
        let row = md.to_row();
        assert_eq!(
            row,
            vec![
                ("filepath".to_string(), Cell::Text("a.png".to_string())),
                ("image_shape".to_string(), Cell::Text("4x3".to_string())),
            ]
        );
    }
}
