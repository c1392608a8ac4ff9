//! SQL text for the schema and load phases.

use covid_core::{ColumnType, Table};

/// Name of the column the staged row index is loaded into.
pub const INDEX_COLUMN: &str = "index";

pub fn sql_type(kind: ColumnType) -> &'static str {
    match kind {
        ColumnType::Integer => "INTEGER",
        ColumnType::Float => "REAL",
        ColumnType::Text => "TEXT",
        ColumnType::Date => "TIMESTAMP",
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `CREATE TABLE` inferred from the table's columns.
///
/// The staged files carry a leading row index, so the statement starts with an
/// `"index" INTEGER` column followed by every data column and its inferred type.
pub fn create_table_statement(table: &Table) -> String {
    let mut defs = Vec::with_capacity(table.column_count() + 1);
    defs.push(format!("{} {}", quote_ident(INDEX_COLUMN), sql_type(ColumnType::Integer)));
    for (column, kind) in table.columns.iter().zip(table.column_types()) {
        defs.push(format!("{} {}", quote_ident(column), sql_type(kind)));
    }
    format!(
        "CREATE TABLE {} (\n{}\n)",
        quote_ident(&table.name),
        defs.join(",\n  ")
    )
}

/// Bulk load of one staged CSV file: comma delimited, one header row skipped.
pub fn copy_statement(table: &str, source_uri: &str, iam_role: &str, region: &str) -> String {
    format!(
        "COPY {table} FROM '{source_uri}'\n\
         CREDENTIALS 'aws_iam_role={iam_role}'\n\
         DELIMITER ','\n\
         REGION '{region}'\n\
         IGNOREHEADER 1"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use covid_core::Value;

    #[test]
    fn create_table_from_inferred_types() {
        let table = Table::from_rows(
            "dimDate",
            vec!["fips".into(), "date".into(), "lat".into(), "note".into()],
            vec![vec![
                Value::Integer(1001),
                Value::Date(chrono::NaiveDate::from_ymd_opt(2020, 3, 15).unwrap()),
                Value::Float(32.5),
                Value::Null,
            ]],
        )
        .unwrap();

        assert_eq!(
            create_table_statement(&table),
            "CREATE TABLE \"dimDate\" (\n\
             \"index\" INTEGER,\n  \
             \"fips\" INTEGER,\n  \
             \"date\" TIMESTAMP,\n  \
             \"lat\" REAL,\n  \
             \"note\" TEXT\n\
             )"
        );
    }

    #[test]
    fn quotes_are_escaped() {
        let table = Table::new("odd", vec!["say \"hi\"".into()]);
        assert!(create_table_statement(&table).contains("\"say \"\"hi\"\"\" TEXT"));
    }

    #[test]
    fn copy_statement_layout() {
        let sql = copy_statement(
            "dimRegion",
            "s3://covid-19-ukhsa/final-output/dimRegion.csv",
            "arn:aws:iam::123:role/r",
            "eu-west-2",
        );
        assert_eq!(
            sql,
            "COPY dimRegion FROM 's3://covid-19-ukhsa/final-output/dimRegion.csv'\n\
             CREDENTIALS 'aws_iam_role=arn:aws:iam::123:role/r'\n\
             DELIMITER ','\n\
             REGION 'eu-west-2'\n\
             IGNOREHEADER 1"
        );
    }
}
