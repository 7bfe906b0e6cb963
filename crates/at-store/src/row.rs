//! Storage-level rows.
//!
//! A row is a transient projection of one audit record onto column names. It
//! lives for the duration of a single insert or select call.

use at_common::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One column value: a scalar or an array of scalars.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Scalar(Value),
    Array(Vec<Value>),
}

impl Cell {
    /// The values held by the cell, one for a scalar.
    pub fn values(&self) -> &[Value] {
        match self {
            Cell::Scalar(v) => std::slice::from_ref(v),
            Cell::Array(values) => values,
        }
    }

    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            Cell::Scalar(v) => Some(v),
            Cell::Array(_) => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Cell::Array(values) => Some(values),
            Cell::Scalar(_) => None,
        }
    }
}

impl From<Value> for Cell {
    fn from(v: Value) -> Self {
        Cell::Scalar(v)
    }
}

impl From<Vec<Value>> for Cell {
    fn from(values: Vec<Value>) -> Self {
        Cell::Array(values)
    }
}

/// Column name to cell map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row {
    cells: BTreeMap<String, Cell>,
}

impl Row {
    pub fn new() -> Self {
        Row::default()
    }

    pub fn set(&mut self, column: impl Into<String>, cell: impl Into<Cell>) {
        self.cells.insert(column.into(), cell.into());
    }

    pub fn with(mut self, column: impl Into<String>, cell: impl Into<Cell>) -> Self {
        self.set(column, cell);
        self
    }

    pub fn get(&self, column: &str) -> Option<&Cell> {
        self.cells.get(column)
    }

    /// Scalar value of a column, if the column holds one.
    pub fn scalar(&self, column: &str) -> Option<&Value> {
        self.get(column).and_then(Cell::as_scalar)
    }

    pub fn remove(&mut self, column: &str) -> Option<Cell> {
        self.cells.remove(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Cell)> {
        self.cells.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl FromIterator<(String, Cell)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Cell)>>(iter: I) -> Self {
        Row {
            cells: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_json_shape() {
        let row = Row::new()
            .with("IdColumn", Value::Long(7))
            .with("String_Value", vec![Value::from("abc")]);

        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(
            json,
            r#"{"IdColumn":{"type":"long","value":7},"String_Value":[{"type":"string","value":"abc"}]}"#
        );

        let back: Row = serde_json::from_str(&json).unwrap();
        assert_eq!(back, row);
    }

    #[test]
    fn test_cell_values_view() {
        assert_eq!(Cell::Scalar(Value::Long(1)).values(), &[Value::Long(1)]);
        assert!(Cell::Array(vec![]).values().is_empty());
    }
}
