//! In-memory tabular data: raw Athena extracts and the derived star-schema tables.

use std::fmt;
use std::io;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::TableError;

/// A single cell. Source data arrives as CSV text; types are inferred per column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Canonical text used for join matching. Integral floats compare equal to
    /// integers (`1001.0` matches `1001`). Nulls never match anything.
    pub fn join_key(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Integer(n) => Some(n.to_string()),
            Value::Float(f) if f.is_finite() && f.fract() == 0.0 => Some(format!("{}", *f as i64)),
            Value::Float(f) => Some(f.to_string()),
            Value::Text(s) => Some(s.clone()),
            Value::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
        }
    }

    /// Render for a CSV cell. Nulls become empty cells and floats always carry
    /// a decimal point.
    pub fn to_csv_field(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Integer(n) => n.to_string(),
            Value::Float(f) if f.is_finite() && f.fract() == 0.0 => format!("{:.1}", f),
            Value::Float(f) => f.to_string(),
            Value::Text(s) => s.clone(),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
        }
    }

    fn kind(&self) -> Option<ColumnType> {
        match self {
            Value::Null => None,
            Value::Integer(_) => Some(ColumnType::Integer),
            Value::Float(_) => Some(ColumnType::Float),
            Value::Text(_) => Some(ColumnType::Text),
            Value::Date(_) => Some(ColumnType::Date),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            other => write!(f, "{}", other.to_csv_field()),
        }
    }
}

/// Inferred kind of a column's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Integer,
    Float,
    Text,
    Date,
}

impl ColumnType {
    /// Combine two observed kinds. Integers widen to floats; any other mix is text.
    fn widen(self, other: ColumnType) -> ColumnType {
        use ColumnType::*;
        match (self, other) {
            (a, b) if a == b => a,
            (Integer, Float) | (Float, Integer) => Float,
            _ => Text,
        }
    }
}

/// A named table: ordered column names plus row-major values.
///
/// Every row has exactly `columns.len()` values. Row position doubles as the
/// row index written to staged CSV files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a table, checking every row against the header width.
    pub fn from_rows(
        name: impl Into<String>,
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
    ) -> Result<Self, TableError> {
        let name = name.into();
        for (i, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(TableError::RaggedRow {
                    table: name,
                    row: i,
                    found: row.len(),
                    expected: columns.len(),
                });
            }
        }
        Ok(Self {
            name,
            columns,
            rows,
        })
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Zero-based index of a column by name (case-sensitive).
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Like [`column_index`](Self::column_index) but a missing column is an error.
    pub fn require_column(&self, name: &str) -> Result<usize, TableError> {
        self.column_index(name).ok_or_else(|| TableError::MissingColumn {
            table: self.name.clone(),
            column: name.to_string(),
        })
    }

    pub fn get_value(&self, row: usize, col: &str) -> Option<&Value> {
        let col_idx = self.column_index(col)?;
        self.rows.get(row)?.get(col_idx)
    }

    /// Project the given columns, in the given order, into a new table.
    pub fn select(&self, name: impl Into<String>, columns: &[&str]) -> Result<Table, TableError> {
        let indices = columns
            .iter()
            .map(|c| self.require_column(c))
            .collect::<Result<Vec<_>, _>>()?;

        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
            .collect();

        Ok(Table {
            name: name.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
        })
    }

    /// Append a column computed from each row.
    pub fn push_column<F>(&mut self, name: impl Into<String>, mut f: F)
    where
        F: FnMut(&[Value]) -> Value,
    {
        for row in &mut self.rows {
            let value = f(row);
            row.push(value);
        }
        self.columns.push(name.into());
    }

    /// Inferred type of a column. All-null columns report `Text`.
    pub fn column_type(&self, idx: usize) -> ColumnType {
        self.rows
            .iter()
            .filter_map(|row| row.get(idx).and_then(Value::kind))
            .reduce(ColumnType::widen)
            .unwrap_or(ColumnType::Text)
    }

    /// Inferred types for every column, in column order.
    pub fn column_types(&self) -> Vec<ColumnType> {
        (0..self.columns.len()).map(|i| self.column_type(i)).collect()
    }

    /// Replace the header with the first data row and drop that row.
    ///
    /// Used for extracts whose real header ships as the first data row.
    pub fn promote_first_row_to_header(&mut self) -> Result<(), TableError> {
        if self.rows.is_empty() {
            return Err(TableError::EmptyTable(self.name.clone()));
        }
        let header = self.rows.remove(0);
        self.columns = header.iter().map(Value::to_csv_field).collect();
        Ok(())
    }

    /// First `n` rows as a new table, for log previews.
    pub fn head(&self, n: usize) -> Table {
        Table {
            name: self.name.clone(),
            columns: self.columns.clone(),
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }

    // ── CSV ──────────────────────────────────────────────────

    /// Parse a headed CSV document, inferring each column's type.
    ///
    /// Per column: if every non-empty cell parses as an integer the column is
    /// integer; else if every non-empty cell parses as a float it is float;
    /// otherwise text. Empty cells are null.
    pub fn from_csv_reader<R: io::Read>(name: impl Into<String>, reader: R) -> Result<Self, TableError> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(reader);

        let columns: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();

        let mut raw: Vec<Vec<String>> = Vec::new();
        for record in rdr.records() {
            let record = record?;
            raw.push(record.iter().map(str::to_string).collect());
        }

        let kinds: Vec<ColumnType> = (0..columns.len())
            .map(|i| infer_text_column(raw.iter().map(|r| r[i].as_str())))
            .collect();

        let rows = raw
            .into_iter()
            .map(|r| {
                r.into_iter()
                    .zip(&kinds)
                    .map(|(cell, kind)| parse_cell(cell, *kind))
                    .collect()
            })
            .collect();

        Table::from_rows(name, columns, rows)
    }

    /// Write the table as CSV with a header row.
    ///
    /// When `with_index` is set, a leading unnamed column carries the row
    /// position (0-based), matching the staged file layout the warehouse COPY expects.
    pub fn write_csv<W: io::Write>(&self, writer: W, with_index: bool) -> Result<(), TableError> {
        let mut wtr = csv::Writer::from_writer(writer);

        let mut header: Vec<&str> = Vec::with_capacity(self.columns.len() + 1);
        if with_index {
            header.push("");
        }
        header.extend(self.columns.iter().map(String::as_str));
        wtr.write_record(&header)?;

        for (i, row) in self.rows.iter().enumerate() {
            let mut record: Vec<String> = Vec::with_capacity(row.len() + 1);
            if with_index {
                record.push(i.to_string());
            }
            record.extend(row.iter().map(Value::to_csv_field));
            wtr.write_record(&record)?;
        }

        wtr.flush()?;
        Ok(())
    }

    /// Render to an in-memory CSV buffer.
    pub fn to_csv_bytes(&self, with_index: bool) -> Result<Vec<u8>, TableError> {
        let mut buf = Vec::new();
        self.write_csv(&mut buf, with_index)?;
        Ok(buf)
    }
}

fn infer_text_column<'a>(cells: impl Iterator<Item = &'a str>) -> ColumnType {
    let mut kind: Option<ColumnType> = None;
    for cell in cells.filter(|c| !c.is_empty()) {
        let cell_kind = if cell.parse::<i64>().is_ok() {
            ColumnType::Integer
        } else if cell.parse::<f64>().is_ok() {
            ColumnType::Float
        } else {
            return ColumnType::Text;
        };
        kind = Some(match kind {
            Some(k) => k.widen(cell_kind),
            None => cell_kind,
        });
    }
    kind.unwrap_or(ColumnType::Text)
}

fn parse_cell(cell: String, kind: ColumnType) -> Value {
    if cell.is_empty() {
        return Value::Null;
    }
    match kind {
        ColumnType::Integer => cell.parse().map(Value::Integer).unwrap_or(Value::Text(cell)),
        ColumnType::Float => cell.parse().map(Value::Float).unwrap_or(Value::Text(cell)),
        ColumnType::Text | ColumnType::Date => Value::Text(cell),
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.columns.is_empty() {
            return write!(f, "{} (empty table)", self.name);
        }

        let mut widths: Vec<usize> = self.columns.iter().map(|c| c.len()).collect();
        for row in &self.rows {
            for (i, cell) in row.iter().enumerate() {
                if i < widths.len() {
                    widths[i] = widths[i].max(cell.to_string().len());
                }
            }
        }

        for (i, col) in self.columns.iter().enumerate() {
            if i > 0 {
                write!(f, " | ")?;
            }
            write!(f, "{:<width$}", col, width = widths[i])?;
        }
        writeln!(f)?;

        for (i, w) in widths.iter().enumerate() {
            if i > 0 {
                write!(f, "-+-")?;
            }
            write!(f, "{}", "-".repeat(*w))?;
        }
        writeln!(f)?;

        for row in &self.rows {
            for (i, cell) in row.iter().enumerate() {
                if i > 0 {
                    write!(f, " | ")?;
                }
                write!(f, "{:<width$}", cell.to_string(), width = widths[i])?;
            }
            writeln!(f)?;
        }

        write!(f, "{}: {} rows x {} columns", self.name, self.rows.len(), self.columns.len())
    }
}
