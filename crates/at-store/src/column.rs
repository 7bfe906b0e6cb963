//! Column and table descriptors.

use at_common::{InnerType, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::row::Cell;

/// Storage type of one column: a scalar kind, optionally as an array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnType {
    pub inner: InnerType,
    #[serde(default)]
    pub array: bool,
}

impl ColumnType {
    pub fn scalar(inner: InnerType) -> Self {
        ColumnType {
            inner,
            array: false,
        }
    }

    pub fn array(inner: InnerType) -> Self {
        ColumnType { inner, array: true }
    }

    /// Cell a column of this type holds in rows written before it existed.
    pub fn default_cell(&self) -> Cell {
        if self.array {
            Cell::Array(Vec::new())
        } else {
            Cell::Scalar(self.inner.default_value())
        }
    }

    /// Whether a cell has the right shape and kind for this column.
    pub fn accepts(&self, cell: &Cell) -> bool {
        match cell {
            Cell::Scalar(v) => !self.array && v.fits(self.inner),
            Cell::Array(values) => self.array && values.iter().all(|v| v.fits(self.inner)),
        }
    }

    /// Convert a cell into this column type when the conversion is lossless.
    pub fn coerce(&self, cell: Cell) -> Option<Cell> {
        match (cell, self.array) {
            (Cell::Scalar(v), false) => v.coerce(self.inner).map(Cell::Scalar),
            (Cell::Array(values), true) => values
                .into_iter()
                .map(|v| v.coerce(self.inner))
                .collect::<Option<Vec<Value>>>()
                .map(Cell::Array),
            _ => None,
        }
    }

    fn scalar_name(&self) -> &'static str {
        match self.inner {
            InnerType::Long => "Int64",
            InnerType::ULong => "UInt64",
            InnerType::Boolean => "UInt8",
            InnerType::String => "String",
            InnerType::Date => "Date",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.array {
            write!(f, "Array({})", self.scalar_name())
        } else {
            write!(f, "{}", self.scalar_name())
        }
    }
}

/// Name and type of a column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnHeader {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

impl ColumnHeader {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        ColumnHeader {
            name: name.into(),
            column_type,
        }
    }
}

/// Name and ordered columns of a table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableHeader {
    pub name: String,
    pub columns: Vec<ColumnHeader>,
}

impl TableHeader {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnHeader>) -> Self {
        TableHeader {
            name: name.into(),
            columns,
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnHeader> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }
}
