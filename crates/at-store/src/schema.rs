//! Arrow schema mapping for audit tables.
//!
//! Scalar columns map to a primitive Arrow type. Array columns map to a
//! `List` of that type with the standard nullable `item` field, which is what
//! `ListBuilder` produces.

use std::sync::Arc;

use arrow::array::{
    Array, ArrayBuilder, ArrayRef, BooleanArray, BooleanBuilder, Date32Array, Date32Builder,
    Int64Array, Int64Builder, ListArray, ListBuilder, RecordBatch, StringArray, StringBuilder,
    UInt64Array, UInt64Builder,
};
use arrow::datatypes::{DataType, Field, Schema};
use at_common::{InnerType, Value};
use chrono::{Datelike, NaiveDate};

use crate::column::{ColumnType, TableHeader};
use crate::error::StoreError;
use crate::row::{Cell, Row};

/// Days from 0001-01-01 to 1970-01-01, the Arrow `Date32` origin.
const EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Arrow type of a scalar kind.
pub fn inner_data_type(inner: InnerType) -> DataType {
    match inner {
        InnerType::Long => DataType::Int64,
        InnerType::ULong => DataType::UInt64,
        InnerType::Boolean => DataType::Boolean,
        InnerType::String => DataType::Utf8,
        InnerType::Date => DataType::Date32,
    }
}

/// Arrow type of a column.
pub fn data_type(column_type: ColumnType) -> DataType {
    let inner = inner_data_type(column_type.inner);
    if column_type.array {
        DataType::List(Arc::new(Field::new("item", inner, true)))
    } else {
        inner
    }
}

/// Arrow schema for a table header. Columns are non-nullable; absent values
/// are written as type defaults.
pub fn arrow_schema(header: &TableHeader) -> Schema {
    Schema::new(
        header
            .columns
            .iter()
            .map(|c| Field::new(&c.name, data_type(c.column_type), false))
            .collect::<Vec<_>>(),
    )
}

fn date_to_days(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - EPOCH_DAYS_FROM_CE
}

fn days_to_date(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days.checked_add(EPOCH_DAYS_FROM_CE)?)
}

fn mismatch(column: &str, column_type: ColumnType, actual: impl std::fmt::Debug) -> StoreError {
    StoreError::TypeMismatch {
        column: column.to_string(),
        expected: column_type,
        actual: format!("{:?}", actual),
    }
}

fn build_scalar<B, F>(
    mut builder: B,
    column: &str,
    column_type: ColumnType,
    cells: &[&Cell],
    mut push: F,
) -> Result<ArrayRef, StoreError>
where
    B: ArrayBuilder,
    F: FnMut(&mut B, &Value) -> Option<()>,
{
    for cell in cells {
        let value = cell
            .as_scalar()
            .ok_or_else(|| mismatch(column, column_type, cell))?;
        push(&mut builder, value).ok_or_else(|| mismatch(column, column_type, value))?;
    }
    Ok(builder.finish())
}

fn build_list<B, F>(
    values: B,
    column: &str,
    column_type: ColumnType,
    cells: &[&Cell],
    mut push: F,
) -> Result<ArrayRef, StoreError>
where
    B: ArrayBuilder,
    F: FnMut(&mut B, &Value) -> Option<()>,
{
    let mut builder = ListBuilder::new(values);
    for cell in cells {
        let items = cell
            .as_array()
            .ok_or_else(|| mismatch(column, column_type, cell))?;
        for value in items {
            push(builder.values(), value).ok_or_else(|| mismatch(column, column_type, value))?;
        }
        builder.append(true);
    }
    Ok(Arc::new(builder.finish()))
}

fn build_column(
    column: &str,
    column_type: ColumnType,
    cells: &[&Cell],
) -> Result<ArrayRef, StoreError> {
    let n = cells.len();
    match (column_type.inner, column_type.array) {
        (InnerType::Long, false) => build_scalar(
            Int64Builder::with_capacity(n),
            column,
            column_type,
            cells,
            |b, v| {
                b.append_value(v.as_i64()?);
                Some(())
            },
        ),
        (InnerType::ULong, false) => build_scalar(
            UInt64Builder::with_capacity(n),
            column,
            column_type,
            cells,
            |b, v| {
                b.append_value(v.as_u64()?);
                Some(())
            },
        ),
        (InnerType::Boolean, false) => build_scalar(
            BooleanBuilder::with_capacity(n),
            column,
            column_type,
            cells,
            |b, v| {
                b.append_value(v.as_bool()?);
                Some(())
            },
        ),
        (InnerType::String, false) => build_scalar(
            StringBuilder::new(),
            column,
            column_type,
            cells,
            |b, v| {
                b.append_value(v.as_str()?);
                Some(())
            },
        ),
        (InnerType::Date, false) => build_scalar(
            Date32Builder::with_capacity(n),
            column,
            column_type,
            cells,
            |b, v| {
                b.append_value(date_to_days(v.as_date()?));
                Some(())
            },
        ),
        (InnerType::Long, true) => build_list(
            Int64Builder::new(),
            column,
            column_type,
            cells,
            |b, v| {
                b.append_value(v.as_i64()?);
                Some(())
            },
        ),
        (InnerType::ULong, true) => build_list(
            UInt64Builder::new(),
            column,
            column_type,
            cells,
            |b, v| {
                b.append_value(v.as_u64()?);
                Some(())
            },
        ),
        (InnerType::Boolean, true) => build_list(
            BooleanBuilder::new(),
            column,
            column_type,
            cells,
            |b, v| {
                b.append_value(v.as_bool()?);
                Some(())
            },
        ),
        (InnerType::String, true) => build_list(
            StringBuilder::new(),
            column,
            column_type,
            cells,
            |b, v| {
                b.append_value(v.as_str()?);
                Some(())
            },
        ),
        (InnerType::Date, true) => build_list(
            Date32Builder::new(),
            column,
            column_type,
            cells,
            |b, v| {
                b.append_value(date_to_days(v.as_date()?));
                Some(())
            },
        ),
    }
}

/// Convert rows into a record batch laid out by the header.
///
/// Rows lacking a column get the column default.
pub fn rows_to_batch(header: &TableHeader, rows: &[Row]) -> Result<RecordBatch, StoreError> {
    let schema = Arc::new(arrow_schema(header));
    let mut arrays = Vec::with_capacity(header.columns.len());

    for column in &header.columns {
        let default = column.column_type.default_cell();
        let cells: Vec<&Cell> = rows
            .iter()
            .map(|row| row.get(&column.name).unwrap_or(&default))
            .collect();
        arrays.push(build_column(&column.name, column.column_type, &cells)?);
    }

    Ok(RecordBatch::try_new(schema, arrays)?)
}

fn downcast<'a, T: 'static>(
    array: &'a dyn Array,
    column: &str,
    column_type: ColumnType,
) -> Result<&'a T, StoreError> {
    array
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| mismatch(column, column_type, array.data_type()))
}

fn read_value(
    array: &dyn Array,
    index: usize,
    column: &str,
    column_type: ColumnType,
) -> Result<Value, StoreError> {
    if array.is_null(index) {
        return Ok(column_type.inner.default_value());
    }
    let value = match column_type.inner {
        InnerType::Long => Value::Long(downcast::<Int64Array>(array, column, column_type)?.value(index)),
        InnerType::ULong => {
            Value::ULong(downcast::<UInt64Array>(array, column, column_type)?.value(index))
        }
        InnerType::Boolean => {
            Value::Boolean(downcast::<BooleanArray>(array, column, column_type)?.value(index))
        }
        InnerType::String => Value::String(
            downcast::<StringArray>(array, column, column_type)?
                .value(index)
                .to_string(),
        ),
        InnerType::Date => {
            let days = downcast::<Date32Array>(array, column, column_type)?.value(index);
            Value::Date(days_to_date(days).ok_or_else(|| mismatch(column, column_type, days))?)
        }
    };
    Ok(value)
}

fn read_cell(
    array: &dyn Array,
    index: usize,
    column: &str,
    column_type: ColumnType,
) -> Result<Cell, StoreError> {
    if !column_type.array {
        return read_value(array, index, column, column_type).map(Cell::Scalar);
    }
    let list = downcast::<ListArray>(array, column, column_type)?;
    if list.is_null(index) {
        return Ok(Cell::Array(Vec::new()));
    }
    let items = list.value(index);
    (0..items.len())
        .map(|i| read_value(items.as_ref(), i, column, column_type))
        .collect::<Result<Vec<_>, _>>()
        .map(Cell::Array)
}

/// Convert a record batch back into rows, reading the header's columns.
///
/// Columns absent from the batch read as their type default, which is how
/// files written before a column was added are interpreted.
pub fn batch_to_rows(header: &TableHeader, batch: &RecordBatch) -> Result<Vec<Row>, StoreError> {
    let mut rows = vec![Row::new(); batch.num_rows()];
    for column in &header.columns {
        match batch.column_by_name(&column.name) {
            Some(array) => {
                for (i, row) in rows.iter_mut().enumerate() {
                    let cell = read_cell(array.as_ref(), i, &column.name, column.column_type)?;
                    row.set(column.name.clone(), cell);
                }
            }
            None => {
                for row in rows.iter_mut() {
                    row.set(column.name.clone(), column.column_type.default_cell());
                }
            }
        }
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::ColumnHeader;
    use at_common::epoch_date;

    fn header() -> TableHeader {
        TableHeader::new(
            "audit",
            vec![
                ColumnHeader::new("Description", ColumnType::array(InnerType::String)),
                ColumnHeader::new("IdColumn", ColumnType::scalar(InnerType::Long)),
                ColumnHeader::new("VersionColumn", ColumnType::scalar(InnerType::ULong)),
                ColumnHeader::new("IsDeletedColumn", ColumnType::scalar(InnerType::Boolean)),
                ColumnHeader::new("DateColumn", ColumnType::scalar(InnerType::Date)),
                ColumnHeader::new("Int_Value", ColumnType::array(InnerType::Long)),
            ],
        )
    }

    #[test]
    fn test_list_columns_use_item_field() {
        match data_type(ColumnType::array(InnerType::Date)) {
            DataType::List(field) => {
                assert_eq!(field.name(), "item");
                assert_eq!(field.data_type(), &DataType::Date32);
            }
            other => panic!("unexpected type {other:?}"),
        }
    }

    #[test]
    fn test_date_days_match_arrow_epoch() {
        assert_eq!(date_to_days(epoch_date()), 0);
        let d = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(days_to_date(date_to_days(d)), Some(d));
    }

    #[test]
    fn test_batch_preserves_rows() {
        let date = NaiveDate::from_ymd_opt(2023, 5, 17).unwrap();
        let rows = vec![
            Row::new()
                .with(
                    "Description",
                    vec![Value::from("String"), Value::from("Int")],
                )
                .with("IdColumn", Value::Long(-3))
                .with("VersionColumn", Value::ULong(u64::MAX))
                .with("IsDeletedColumn", Value::Boolean(true))
                .with("DateColumn", Value::Date(date))
                .with("Int_Value", vec![Value::Long(1), Value::Long(2)]),
            Row::new().with("IdColumn", Value::Long(9)),
        ];

        let batch = rows_to_batch(&header(), &rows).unwrap();
        assert_eq!(batch.num_rows(), 2);

        let back = batch_to_rows(&header(), &batch).unwrap();
        assert_eq!(back[0], rows[0]);
        assert_eq!(back[1].scalar("IdColumn"), Some(&Value::Long(9)));
        assert_eq!(back[1].get("Int_Value"), Some(&Cell::Array(vec![])));
        assert_eq!(back[1].scalar("DateColumn"), Some(&Value::Date(epoch_date())));
    }

    #[test]
    fn test_missing_batch_column_reads_default() {
        let narrow = TableHeader::new(
            "audit",
            vec![ColumnHeader::new("IdColumn", ColumnType::scalar(InnerType::Long))],
        );
        let batch = rows_to_batch(&narrow, &[Row::new().with("IdColumn", Value::Long(1))]).unwrap();
        let rows = batch_to_rows(&header(), &batch).unwrap();
        assert_eq!(
            rows[0].scalar("IsDeletedColumn"),
            Some(&Value::Boolean(false))
        );
    }

    #[test]
    fn test_wrong_cell_shape_is_rejected() {
        let rows = vec![Row::new().with("IdColumn", vec![Value::Long(1)])];
        assert!(matches!(
            rows_to_batch(&header(), &rows),
            Err(StoreError::TypeMismatch { .. })
        ));
    }
}
