//! Compact `YYYYMMDD` date parsing and calendar columns for the date dimension.

use chrono::{Datelike, NaiveDate};

use covid_core::{Table, TableError, Value};

/// Parse a `YYYYMMDD` value. Integers, integral floats and 8-digit text are
/// accepted; anything else, including impossible dates, is `None`.
pub fn parse_compact_date(value: &Value) -> Option<NaiveDate> {
    let raw = match value {
        Value::Date(d) => return Some(*d),
        Value::Text(s) => s.trim().to_string(),
        Value::Integer(_) | Value::Float(_) => value.join_key()?,
        Value::Null => return None,
    };

    if raw.len() != 8 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let year = raw[0..4].parse().ok()?;
    let month = raw[4..6].parse().ok()?;
    let day = raw[6..8].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Replace `column` with parsed dates and append `year`, `month` and
/// `day_of_week` (0 = Monday .. 6 = Sunday).
///
/// Fails on the first value that is not a valid `YYYYMMDD` date, nulls included.
pub fn derive_calendar(table: &mut Table, column: &str) -> Result<(), TableError> {
    let idx = table.require_column(column)?;

    for row in &mut table.rows {
        let date = parse_compact_date(&row[idx]).ok_or_else(|| TableError::InvalidDate {
            table: table.name.clone(),
            column: column.to_string(),
            value: row[idx].to_string(),
        })?;
        row[idx] = Value::Date(date);
    }

    table.push_column("year", |row| calendar_field(row, idx, |d| d.year() as i64));
    table.push_column("month", |row| calendar_field(row, idx, |d| d.month() as i64));
    table.push_column("day_of_week", |row| {
        calendar_field(row, idx, |d| d.weekday().num_days_from_monday() as i64)
    });

    Ok(())
}

fn calendar_field(row: &[Value], idx: usize, f: impl Fn(&NaiveDate) -> i64) -> Value {
    match &row[idx] {
        Value::Date(d) => Value::Integer(f(d)),
        _ => Value::Null,
    }
}
