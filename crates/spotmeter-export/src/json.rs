//! JSON export serializer.
//!
//! A table becomes an array of records, one object per row keyed by
//! column name. Missing cells and non-finite floats are `null`.

use serde_json::{Map, Value};

use spotmeter_pipeline::{Cell, Table};

use crate::ExportError;

/// Serialize `table` as a pretty-printed JSON array of records.
///
/// # Errors
///
/// Returns [`ExportError::Json`] if encoding fails.
pub fn to_json(table: &Table) -> Result<String, ExportError> {
    let records: Vec<Value> = table
        .rows()
        .iter()
        .map(|row| {
            let record: Map<String, Value> = table
                .columns()
                .iter()
                .cloned()
                .zip(row.iter().map(cell_value))
                .collect();
            Value::Object(record)
        })
        .collect();
    Ok(serde_json::to_string_pretty(&records)?)
}

fn cell_value(cell: &Cell) -> Value {
    match cell {
        Cell::Int(v) => Value::from(*v),
        Cell::Float(v) => serde_json::Number::from_f64(*v).map_or(Value::Null, Value::Number),
        Cell::Bool(v) => Value::Bool(*v),
        Cell::Text(v) => Value::String(v.clone()),
        Cell::Missing => Value::Null,
    }
}
