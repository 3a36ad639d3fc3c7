//! CSV export serializer.
//!
//! One header line with the column names, then one line per row.
//! Fields containing a comma, quote or line break are quoted, with
//! embedded quotes doubled. Missing cells and NaN are written as empty
//! fields.
//!
//! This is a pure function with no I/O -- it returns a `String`.

use std::fmt::Write;

use spotmeter_pipeline::{Cell, Table};

/// Serialize `table` as CSV.
///
/// # Examples
///
/// ```
/// use spotmeter_pipeline::{Cell, Table};
/// use spotmeter_export::to_csv;
///
/// let mut table = Table::new(&["area_px2", "filename"]);
/// table
///     .push_row(vec![Cell::Float(12.5), Cell::Text("a, b.png".to_string())])
///     .unwrap();
/// assert_eq!(to_csv(&table), "area_px2,filename\n12.5,\"a, b.png\"\n");
/// ```
#[must_use]
pub fn to_csv(table: &Table) -> String {
    let mut out = String::new();
    write_record(&mut out, table.columns().iter().map(String::as_str));
    for row in table.rows() {
        let fields: Vec<String> = row.iter().map(format_cell).collect();
        write_record(&mut out, fields.iter().map(String::as_str));
    }
    out
}

fn format_cell(cell: &Cell) -> String {
    match cell {
        Cell::Float(v) if v.is_nan() => String::new(),
        other => other.to_string(),
    }
}

fn write_record<'a>(out: &mut String, fields: impl Iterator<Item = &'a str>) {
    for (i, field) in fields.enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_field(out, field);
    }
    out.push('\n');
}

fn write_field(out: &mut String, field: &str) {
    if field.contains([',', '"', '\n', '\r']) {
        let _ = write!(out, "\"{}\"", field.replace('"', "\"\""));
    } else {
        out.push_str(field);
    }
}
