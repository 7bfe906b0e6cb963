//! Filter, order and limit model, plus in-process evaluation.
//!
//! Gateways backed by a real column store translate these into statements.
//! The in-process gateways evaluate them directly with [`execute`].

use at_common::Value;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::column::{ColumnHeader, TableHeader};
use crate::error::StoreError;
use crate::row::{Cell, Row};

/// Row predicate.
///
/// Comparisons against an array column hold when any element satisfies them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    All,
    Eq(String, Value),
    Ne(String, Value),
    Lt(String, Value),
    Le(String, Value),
    Gt(String, Value),
    Ge(String, Value),
    In(String, Vec<Value>),
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq(column.into(), value.into())
    }

    pub fn ne(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Ne(column.into(), value.into())
    }

    pub fn lt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Lt(column.into(), value.into())
    }

    pub fn le(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Le(column.into(), value.into())
    }

    pub fn gt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Gt(column.into(), value.into())
    }

    pub fn ge(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Ge(column.into(), value.into())
    }

    pub fn is_in(column: impl Into<String>, values: Vec<Value>) -> Self {
        Filter::In(column.into(), values)
    }

    pub fn and(self, other: Filter) -> Self {
        match self {
            Filter::All => other,
            Filter::And(mut parts) => {
                parts.push(other);
                Filter::And(parts)
            }
            first => Filter::And(vec![first, other]),
        }
    }

    pub fn or(self, other: Filter) -> Self {
        match self {
            Filter::Or(mut parts) => {
                parts.push(other);
                Filter::Or(parts)
            }
            first => Filter::Or(vec![first, other]),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Filter::Not(Box::new(self))
    }

    /// Every column the filter reads.
    pub fn columns(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Filter::All => {}
            Filter::Eq(c, _)
            | Filter::Ne(c, _)
            | Filter::Lt(c, _)
            | Filter::Le(c, _)
            | Filter::Gt(c, _)
            | Filter::Ge(c, _)
            | Filter::In(c, _) => {
                out.insert(c.as_str());
            }
            Filter::And(parts) | Filter::Or(parts) => {
                for part in parts {
                    part.collect_columns(out);
                }
            }
            Filter::Not(inner) => inner.collect_columns(out),
        }
    }

    /// Evaluate the filter against a row holding every referenced column.
    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Filter::All => true,
            Filter::Eq(c, v) => any_value(row, c, |x| x.compare(v) == Some(Ordering::Equal)),
            Filter::Ne(c, v) => !any_value(row, c, |x| x.compare(v) == Some(Ordering::Equal)),
            Filter::Lt(c, v) => any_value(row, c, |x| x.compare(v) == Some(Ordering::Less)),
            Filter::Le(c, v) => any_value(row, c, |x| {
                matches!(x.compare(v), Some(Ordering::Less | Ordering::Equal))
            }),
            Filter::Gt(c, v) => any_value(row, c, |x| x.compare(v) == Some(Ordering::Greater)),
            Filter::Ge(c, v) => any_value(row, c, |x| {
                matches!(x.compare(v), Some(Ordering::Greater | Ordering::Equal))
            }),
            Filter::In(c, vs) => any_value(row, c, |x| {
                vs.iter().any(|v| x.compare(v) == Some(Ordering::Equal))
            }),
            Filter::And(parts) => parts.iter().all(|p| p.matches(row)),
            Filter::Or(parts) => parts.iter().any(|p| p.matches(row)),
            Filter::Not(inner) => !inner.matches(row),
        }
    }
}

fn any_value<F>(row: &Row, column: &str, pred: F) -> bool
where
    F: Fn(&Value) -> bool,
{
    row.get(column)
        .map(|cell| cell.values().iter().any(pred))
        .unwrap_or(false)
}

/// Sort key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub column: String,
    #[serde(default)]
    pub descending: bool,
}

impl OrderBy {
    pub fn asc(column: impl Into<String>) -> Self {
        OrderBy {
            column: column.into(),
            descending: false,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        OrderBy {
            column: column.into(),
            descending: true,
        }
    }
}

/// Page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limit {
    pub offset: usize,
    pub limit: usize,
}

impl Limit {
    pub fn new(offset: usize, limit: usize) -> Self {
        Limit { offset, limit }
    }

    pub fn first(limit: usize) -> Self {
        Limit { offset: 0, limit }
    }

    /// Apply the window to an ordered list.
    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        items
            .into_iter()
            .skip(self.offset)
            .take(self.limit)
            .collect()
    }
}

/// Complete select request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub filter: Filter,
    #[serde(default)]
    pub order_by: Vec<OrderBy>,
    #[serde(default)]
    pub limit: Option<Limit>,
}

impl Query {
    pub fn new(filter: Filter) -> Self {
        Query {
            filter,
            order_by: Vec::new(),
            limit: None,
        }
    }

    pub fn all() -> Self {
        Query::new(Filter::All)
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    pub fn limit(mut self, limit: Limit) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Every column the query reads, for validation against a table.
    pub fn columns(&self) -> BTreeSet<&str> {
        let mut cols = self.filter.columns();
        cols.extend(self.order_by.iter().map(|o| o.column.as_str()));
        cols
    }
}

fn compare_cells(a: Option<&Cell>, b: Option<&Cell>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => {
            let (a, b) = (a.values(), b.values());
            for (x, y) in a.iter().zip(b.iter()) {
                match x.compare(y).unwrap_or(Ordering::Equal) {
                    Ordering::Equal => continue,
                    other => return other,
                }
            }
            a.len().cmp(&b.len())
        }
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
    }
}

/// Check that every column a query reads exists in the table.
pub fn validate_query(header: &TableHeader, query: &Query) -> Result<(), StoreError> {
    for column in query.columns() {
        if !header.has_column(column) {
            return Err(StoreError::UnknownColumn {
                table: header.name.clone(),
                column: column.to_string(),
            });
        }
    }
    Ok(())
}

/// Fill the columns a stored row lacks with their type defaults.
pub fn complete_row(header: &TableHeader, row: &Row) -> Row {
    header
        .columns
        .iter()
        .map(|c| {
            let cell = row
                .get(&c.name)
                .cloned()
                .unwrap_or_else(|| c.column_type.default_cell());
            (c.name.clone(), cell)
        })
        .collect()
}

/// Filter, order, window and project stored rows.
///
/// Rows are completed against the table header before evaluation, so rows
/// written before a column was added read that column as its default.
pub fn execute<'a, I>(
    header: &TableHeader,
    rows: I,
    columns: &[ColumnHeader],
    query: &Query,
) -> Result<Vec<Row>, StoreError>
where
    I: IntoIterator<Item = &'a Row>,
{
    validate_query(header, query)?;
    for column in columns {
        if !header.has_column(&column.name) {
            return Err(StoreError::UnknownColumn {
                table: header.name.clone(),
                column: column.name.clone(),
            });
        }
    }

    let mut matched: Vec<Row> = rows
        .into_iter()
        .map(|row| complete_row(header, row))
        .filter(|row| query.filter.matches(row))
        .collect();

    if !query.order_by.is_empty() {
        // Stable sort keeps insertion order among equal keys
        matched.sort_by(|a, b| {
            for order in &query.order_by {
                let ord = compare_cells(a.get(&order.column), b.get(&order.column));
                let ord = if order.descending { ord.reverse() } else { ord };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
    }

    if let Some(limit) = query.limit {
        matched = limit.apply(matched);
    }

    Ok(matched
        .into_iter()
        .map(|mut row| {
            columns
                .iter()
                .filter_map(|c| row.remove(&c.name).map(|cell| (c.name.clone(), cell)))
                .collect()
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::ColumnType;
    use at_common::InnerType;

    fn header() -> TableHeader {
        TableHeader::new(
            "t",
            vec![
                ColumnHeader::new("id", ColumnType::scalar(InnerType::Long)),
                ColumnHeader::new("tags", ColumnType::array(InnerType::String)),
                ColumnHeader::new("flag", ColumnType::scalar(InnerType::Boolean)),
            ],
        )
    }

    fn rows() -> Vec<Row> {
        vec![
            Row::new()
                .with("id", Value::Long(2))
                .with("tags", vec![Value::from("a"), Value::from("b")]),
            Row::new()
                .with("id", Value::Long(1))
                .with("tags", vec![Value::from("c")])
                .with("flag", Value::Boolean(true)),
            Row::new().with("id", Value::Long(3)),
        ]
    }

    #[test]
    fn test_array_equality_means_contains() {
        let rows = rows();
        let out = execute(
            &header(),
            &rows,
            &header().columns,
            &Query::new(Filter::eq("tags", "b")),
        )
        .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].scalar("id"), Some(&Value::Long(2)));
    }

    #[test]
    fn test_missing_cells_read_as_defaults() {
        let rows = rows();
        let out = execute(
            &header(),
            &rows,
            &header().columns,
            &Query::new(Filter::eq("flag", false)),
        )
        .unwrap();
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|r| r.get("tags").is_some()));
    }

    #[test]
    fn test_order_and_limit() {
        let rows = rows();
        let query = Query::all()
            .order_by(OrderBy::desc("id"))
            .limit(Limit::new(1, 5));
        let out = execute(&header(), &rows, &header().columns, &query).unwrap();
        let ids: Vec<_> = out.iter().map(|r| r.scalar("id").cloned()).collect();
        assert_eq!(ids, vec![Some(Value::Long(2)), Some(Value::Long(1))]);
    }

    #[test]
    fn test_projection_keeps_requested_columns() {
        let rows = rows();
        let cols = vec![ColumnHeader::new("id", ColumnType::scalar(InnerType::Long))];
        let out = execute(&header(), &rows, &cols, &Query::all()).unwrap();
        assert!(out.iter().all(|r| r.len() == 1));
    }

    #[test]
    fn test_unknown_filter_column_rejected() {
        let rows = rows();
        let err = execute(
            &header(),
            &rows,
            &header().columns,
            &Query::new(Filter::eq("nope", 1i64)),
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::UnknownColumn { .. }));
    }

    #[test]
    fn test_combinators() {
        let f = Filter::All
            .and(Filter::ge("id", 2i64))
            .and(Filter::eq("tags", "a").or(Filter::is_in("id", vec![Value::Long(3)])));
        let rows = rows();
        let matched: Vec<_> = rows.iter().filter(|r| f.matches(&complete_row(&header(), r))).collect();
        assert_eq!(matched.len(), 2);
        assert!(!Filter::All.not().matches(&rows[0]));
    }
}
