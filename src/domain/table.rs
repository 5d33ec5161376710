//! A minimal ordered row-set with the relational operators the sensing
//! algebra needs: filter, concat, inner/outer join, group-by, explode,
//! projection.
//!
//! Rows are flat maps of column name to JSON value. This intentionally
//! replaces a general-purpose dataframe: the handful of operators below is
//! the entire surface the watcher engine uses.

use std::collections::BTreeSet;

use serde_json::Value;

use super::scene::value_eq;

/// One row: column name to cell value.
pub type Row = std::collections::BTreeMap<String, Value>;

/// An ordered collection of rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    rows: Vec<Row>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    pub fn push(&mut self, row: Row) {
        self.rows.push(row);
    }

    /// Union of column names over all rows.
    pub fn columns(&self) -> BTreeSet<String> {
        self.rows
            .iter()
            .flat_map(|row| row.keys().cloned())
            .collect()
    }

    /// Vertical concatenation, preserving input order.
    pub fn concat(tables: impl IntoIterator<Item = Table>) -> Table {
        let mut rows = Vec::new();
        for table in tables {
            rows.extend(table.rows);
        }
        Self { rows }
    }

    /// Rows satisfying the predicate, in order.
    pub fn filtered(&self, mut predicate: impl FnMut(&Row) -> bool) -> Table {
        Self {
            rows: self.rows.iter().filter(|r| predicate(r)).cloned().collect(),
        }
    }

    /// Keep rows whose `column` equals `expected` (numeric-aware).
    pub fn filtered_eq(&self, column: &str, expected: &Value) -> Table {
        self.filtered(|row| row.get(column).is_some_and(|v| value_eq(v, expected)))
    }

    /// Add (or overwrite) a column computed from each row.
    pub fn with_column(mut self, name: &str, f: impl Fn(&Row) -> Value) -> Table {
        for row in &mut self.rows {
            let value = f(row);
            row.insert(name.to_string(), value);
        }
        self
    }

    /// Inner join on `on` columns. A pair matches when both rows carry
    /// every join column and the values are equal; the merged row keeps
    /// the left cell when a non-join column exists on both sides.
    pub fn inner_join(&self, right: &Table, on: &[String]) -> Table {
        let mut out = Vec::new();
        for left_row in &self.rows {
            for right_row in &right.rows {
                if join_keys_match(left_row, right_row, on) {
                    out.push(merge_rows(left_row, right_row));
                }
            }
        }
        Self { rows: out }
    }

    /// Full outer join on `on` columns. Unmatched rows from either side
    /// are kept with the other side's columns set to null.
    pub fn outer_join(&self, right: &Table, on: &[String]) -> Table {
        let left_columns = self.columns();
        let right_columns = right.columns();
        let mut right_matched = vec![false; right.rows.len()];
        let mut out = Vec::new();

        for left_row in &self.rows {
            let mut matched = false;
            for (idx, right_row) in right.rows.iter().enumerate() {
                if join_keys_match(left_row, right_row, on) {
                    out.push(merge_rows(left_row, right_row));
                    right_matched[idx] = true;
                    matched = true;
                }
            }
            if !matched {
                out.push(pad_row(left_row, &right_columns));
            }
        }
        for (idx, right_row) in right.rows.iter().enumerate() {
            if !right_matched[idx] {
                out.push(pad_row(right_row, &left_columns));
            }
        }
        Self { rows: out }
    }

    /// Group rows by the given key columns, preserving first-seen group
    /// order. Rows missing a key column (or holding null) are dropped.
    pub fn group_by(&self, keys: &[String]) -> Vec<(Vec<Value>, Table)> {
        let mut groups: Vec<(Vec<Value>, Table)> = Vec::new();
        'rows: for row in &self.rows {
            let mut key_values = Vec::with_capacity(keys.len());
            for key in keys {
                match row.get(key) {
                    Some(Value::Null) | None => continue 'rows,
                    Some(v) => key_values.push(v.clone()),
                }
            }
            if let Some((_, group)) = groups
                .iter_mut()
                .find(|(k, _)| k.iter().zip(&key_values).all(|(a, b)| value_eq(a, b)))
            {
                group.push(row.clone());
            } else {
                groups.push((key_values, Table::from_rows(vec![row.clone()])));
            }
        }
        groups
    }

    /// Explode a list-valued column into one row per element.
    ///
    /// Rows whose cell is an empty list, null, or absent are dropped, as
    /// are null elements. A scalar cell passes through unchanged.
    pub fn explode(&self, column: &str) -> Table {
        let mut out = Vec::new();
        for row in &self.rows {
            match row.get(column) {
                Some(Value::Array(items)) => {
                    for item in items {
                        if item.is_null() {
                            continue;
                        }
                        let mut exploded = row.clone();
                        exploded.insert(column.to_string(), item.clone());
                        out.push(exploded);
                    }
                }
                Some(Value::Null) | None => {}
                Some(_) => out.push(row.clone()),
            }
        }
        Self { rows: out }
    }

    /// Project to the given columns; a column absent from a row becomes
    /// null.
    pub fn select(&self, columns: &[String]) -> Table {
        let rows = self
            .rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|c| (c.clone(), row.get(c).cloned().unwrap_or(Value::Null)))
                    .collect()
            })
            .collect();
        Self { rows }
    }
}

fn join_keys_match(left: &Row, right: &Row, on: &[String]) -> bool {
    on.iter().all(|key| match (left.get(key), right.get(key)) {
        (Some(a), Some(b)) => value_eq(a, b),
        _ => false,
    })
}

fn merge_rows(left: &Row, right: &Row) -> Row {
    let mut merged = left.clone();
    for (column, value) in right {
        merged.entry(column.clone()).or_insert_with(|| value.clone());
    }
    merged
}

fn pad_row(row: &Row, other_columns: &BTreeSet<String>) -> Row {
    let mut padded = row.clone();
    for column in other_columns {
        padded.entry(column.clone()).or_insert(Value::Null);
    }
    padded
}
