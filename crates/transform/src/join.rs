//! Inner equi-join on a single key column.

use std::collections::{HashMap, HashSet};

use covid_core::{Table, TableError};

/// Suffixes for non-key columns present on both sides.
const LEFT_SUFFIX: &str = "_x";
const RIGHT_SUFFIX: &str = "_y";

/// Join `left` and `right` on column `on`, keeping only rows whose key appears
/// in both.
///
/// Output columns are the left columns followed by the right columns minus the
/// key. A non-key column name present on both sides gets `_x` on the left copy
/// and `_y` on the right copy. Rows follow left order; for each left row, the
/// matching right rows follow right order. Null keys never match.
pub fn inner_join(
    name: impl Into<String>,
    left: &Table,
    right: &Table,
    on: &str,
) -> Result<Table, TableError> {
    let left_key = left.require_column(on)?;
    let right_key = right.require_column(on)?;

    let mut index: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, row) in right.rows.iter().enumerate() {
        if let Some(key) = row[right_key].join_key() {
            index.entry(key).or_default().push(i);
        }
    }

    let right_cols: Vec<usize> = (0..right.column_count())
        .filter(|&i| i != right_key)
        .collect();

    let left_names: HashSet<&str> = left
        .columns
        .iter()
        .enumerate()
        .filter(|&(i, _)| i != left_key)
        .map(|(_, c)| c.as_str())
        .collect();
    let shared: HashSet<&str> = right_cols
        .iter()
        .map(|&i| right.columns[i].as_str())
        .filter(|c| left_names.contains(c))
        .collect();

    let mut columns: Vec<String> = left
        .columns
        .iter()
        .enumerate()
        .map(|(i, c)| {
            if i != left_key && shared.contains(c.as_str()) {
                format!("{c}{LEFT_SUFFIX}")
            } else {
                c.clone()
            }
        })
        .collect();
    columns.extend(right_cols.iter().map(|&i| {
        let c = &right.columns[i];
        if shared.contains(c.as_str()) {
            format!("{c}{RIGHT_SUFFIX}")
        } else {
            c.clone()
        }
    }));

    let mut rows = Vec::new();
    for left_row in &left.rows {
        let Some(matches) = left_row[left_key].join_key().and_then(|k| index.get(&k)) else {
            continue;
        };
        for &r in matches {
            let mut row = left_row.clone();
            row.extend(right_cols.iter().map(|&i| right.rows[r][i].clone()));
            rows.push(row);
        }
    }

    Table::from_rows(name, columns, rows)
}
