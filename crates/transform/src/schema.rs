//! Reshape the raw COVID-19 extracts into one fact table and three dimensions.

use indexmap::IndexMap;
use tracing::info;

use covid_core::{Table, TableError};

use crate::calendar::derive_calendar;
use crate::join::inner_join;

pub const ENIGMA_JHU: &str = "enigma_jhu";
pub const STATES_DAILY: &str = "states_daily";
pub const US_COUNTY: &str = "us_county";
pub const HOSPITAL_BEDS: &str = "rearc_usa_hospital_beds";

/// Every table extracted per run, in extraction order.
pub const SOURCE_TABLES: [&str; 10] = [
    ENIGMA_JHU,
    "us_daily",
    "us_states",
    "us_total_latest",
    "states_abv",
    HOSPITAL_BEDS,
    "county_population",
    "countrycode",
    US_COUNTY,
    STATES_DAILY,
];

pub const FACT_COVID: &str = "factCovid";
pub const DIM_REGION: &str = "dimRegion";
pub const DIM_HOSPITAL: &str = "dimHospital";
pub const DIM_DATE: &str = "dimDate";

/// Shared key of every derived table.
const KEY: &str = "fips";

const FACT_CASES: &[&str] = &[
    KEY,
    "province_state",
    "country_region",
    "confirmed",
    "deaths",
    "recovered",
    "active",
];
const FACT_TESTING: &[&str] = &[
    KEY,
    "date",
    "positive",
    "negative",
    "hospitalizedcurrently",
    "hospitalized",
    "hospitalizeddischarged",
    "recovered",
    "death",
];
const REGION_LOCATION: &[&str] = &[KEY, "province_state", "country_region", "latitude", "longitude"];
const REGION_COUNTY: &[&str] = &[KEY, "county", "state"];
// `longtitude` is the source dataset's spelling.
const HOSPITAL: &[&str] = &[
    KEY,
    "state_name",
    "latitude",
    "longtitude",
    "hq_address",
    "hospital_type",
    "hospital_name",
    "hq_city",
    "hq_state",
];
const DATE: &[&str] = &[KEY, "date"];

#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("source table {0} was not loaded")]
    MissingTable(String),

    #[error(transparent)]
    Table(#[from] TableError),
}

/// The four derived tables of one run.
#[derive(Debug, Clone)]
pub struct StarSchema {
    pub fact_covid: Table,
    pub dim_region: Table,
    pub dim_hospital: Table,
    pub dim_date: Table,
}

impl StarSchema {
    /// All derived tables, fact first, then the dimensions.
    pub fn tables(&self) -> [&Table; 4] {
        [
            &self.fact_covid,
            &self.dim_region,
            &self.dim_hospital,
            &self.dim_date,
        ]
    }

    /// The dimension tables only.
    pub fn dimensions(&self) -> [&Table; 3] {
        [&self.dim_region, &self.dim_hospital, &self.dim_date]
    }
}

fn source<'a>(tables: &'a IndexMap<String, Table>, name: &str) -> Result<&'a Table, TransformError> {
    tables
        .get(name)
        .ok_or_else(|| TransformError::MissingTable(name.to_string()))
}

/// Derive the star schema from the raw tables.
///
/// Pure: inputs are only read. All joins are inner joins on `fips`; rows
/// without a partner on the other side are dropped silently.
pub fn transform(tables: &IndexMap<String, Table>) -> Result<StarSchema, TransformError> {
    let enigma = source(tables, ENIGMA_JHU)?;
    let daily = source(tables, STATES_DAILY)?;
    let county = source(tables, US_COUNTY)?;
    let beds = source(tables, HOSPITAL_BEDS)?;

    let fact_covid = inner_join(
        FACT_COVID,
        &enigma.select(ENIGMA_JHU, FACT_CASES)?,
        &daily.select(STATES_DAILY, FACT_TESTING)?,
        KEY,
    )?;

    let dim_region = inner_join(
        DIM_REGION,
        &enigma.select(ENIGMA_JHU, REGION_LOCATION)?,
        &county.select(US_COUNTY, REGION_COUNTY)?,
        KEY,
    )?;

    let dim_hospital = beds.select(DIM_HOSPITAL, HOSPITAL)?;

    let mut dim_date = daily.select(DIM_DATE, DATE)?;
    derive_calendar(&mut dim_date, "date")?;

    let schema = StarSchema {
        fact_covid,
        dim_region,
        dim_hospital,
        dim_date,
    };

    for table in schema.tables() {
        info!(
            table = %table.name,
            rows = table.row_count(),
            columns = table.column_count(),
            "Derived table"
        );
    }

    Ok(schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use covid_core::Value;

    fn table(name: &str, columns: &[&str], rows: Vec<Vec<Value>>) -> Table {
        Table::from_rows(name, columns.iter().map(|c| c.to_string()).collect(), rows).unwrap()
    }

    fn int(n: i64) -> Value {
        Value::Integer(n)
    }

    fn text(s: &str) -> Value {
        Value::Text(s.into())
    }

    fn enigma() -> Table {
        table(
            ENIGMA_JHU,
            &[
                "fips", "admin2", "province_state", "country_region", "last_update",
                "latitude", "longitude", "confirmed", "deaths", "recovered", "active",
            ],
            vec![
                vec![
                    int(1001), text("Autauga"), text("Alabama"), text("US"), text("2020-03-15"),
                    Value::Float(32.5), Value::Float(-86.6), int(10), int(1), int(2), int(7),
                ],
                vec![
                    int(9999), text("Nowhere"), text("Nowhere"), text("US"), text("2020-03-15"),
                    Value::Float(0.0), Value::Float(0.0), int(0), int(0), int(0), int(0),
                ],
            ],
        )
    }

    fn states_daily() -> Table {
        table(
            STATES_DAILY,
            &[
                "date", "state", "positive", "negative", "hospitalizedcurrently", "hospitalized",
                "hospitalizeddischarged", "recovered", "death", "fips",
            ],
            vec![
                vec![
                    int(20200315), text("AL"), int(12), int(30), Value::Null, int(3),
                    Value::Null, int(4), int(1), int(1001),
                ],
                vec![
                    int(20200316), text("AK"), int(1), int(5), Value::Null, Value::Null,
                    Value::Null, Value::Null, int(0), int(2),
                ],
            ],
        )
    }

    fn us_county() -> Table {
        table(
            US_COUNTY,
            &["fips", "county", "state", "lat", "long"],
            vec![
                vec![int(1001), text("Autauga"), text("Alabama"), Value::Float(32.5), Value::Float(-86.6)],
                vec![int(1003), text("Baldwin"), text("Alabama"), Value::Float(30.7), Value::Float(-87.7)],
            ],
        )
    }

    fn beds() -> Table {
        table(
            HOSPITAL_BEDS,
            &[
                "objectid", "hospital_name", "hospital_type", "hq_address", "hq_address1",
                "hq_city", "hq_state", "hq_zip_code", "county_name", "state_name", "fips",
                "num_licensed_beds", "latitude", "longtitude",
            ],
            vec![vec![
                int(1), text("General"), text("Short Term Acute Care Hospital"), text("1 Main St"),
                Value::Null, text("Prattville"), text("AL"), int(36067), text("Autauga"),
                text("Alabama"), int(1001), int(85), Value::Float(32.46), Value::Float(-86.47),
            ]],
        )
    }

    fn sources() -> IndexMap<String, Table> {
        [enigma(), states_daily(), us_county(), beds()]
            .into_iter()
            .map(|t| (t.name.clone(), t))
            .collect()
    }

    #[test]
    fn derives_four_tables_with_fixed_columns() {
        let schema = transform(&sources()).unwrap();

        let names: Vec<&str> = schema.tables().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec![FACT_COVID, DIM_REGION, DIM_HOSPITAL, DIM_DATE]);

        assert_eq!(
            schema.fact_covid.columns,
            vec![
                "fips", "province_state", "country_region", "confirmed", "deaths", "recovered_x",
                "active", "date", "positive", "negative", "hospitalizedcurrently", "hospitalized",
                "hospitalizeddischarged", "recovered_y", "death",
            ]
        );
        assert_eq!(
            schema.dim_region.columns,
            vec!["fips", "province_state", "country_region", "latitude", "longitude", "county", "state"]
        );
        assert_eq!(schema.dim_hospital.columns, HOSPITAL.to_vec());
        assert_eq!(
            schema.dim_date.columns,
            vec!["fips", "date", "year", "month", "day_of_week"]
        );
    }

    #[test]
    fn joins_only_keep_keys_present_on_both_sides() {
        let raw = sources();
        let schema = transform(&raw).unwrap();

        for derived in [&schema.fact_covid, &schema.dim_region] {
            assert!(!derived.is_empty());
            for row in &derived.rows {
                let key = row[0].join_key();
                assert!(raw[ENIGMA_JHU].rows.iter().any(|r| r[0].join_key() == key));
            }
        }
        assert_eq!(schema.fact_covid.row_count(), 1);
        assert_eq!(schema.fact_covid.get_value(0, "recovered_x"), Some(&int(2)));
        assert_eq!(schema.fact_covid.get_value(0, "recovered_y"), Some(&int(4)));
        assert_eq!(schema.dim_region.row_count(), 1);
        assert_eq!(schema.dim_region.get_value(0, "county"), Some(&text("Autauga")));
    }

    #[test]
    fn projections_keep_every_row() {
        let schema = transform(&sources()).unwrap();

        assert_eq!(schema.dim_hospital.row_count(), 1);
        assert_eq!(schema.dim_date.row_count(), 2);
        assert_eq!(
            schema.dim_date.get_value(0, "date"),
            Some(&Value::Date(NaiveDate::from_ymd_opt(2020, 3, 15).unwrap()))
        );
        assert_eq!(schema.dim_date.get_value(0, "day_of_week"), Some(&int(6)));
    }

    #[test]
    fn missing_source_table() {
        let mut raw = sources();
        raw.shift_remove(US_COUNTY);

        let err = transform(&raw).unwrap_err();
        assert!(matches!(err, TransformError::MissingTable(ref t) if t == US_COUNTY));
    }

    #[test]
    fn missing_projected_column() {
        let mut raw = sources();
        raw.insert(
            HOSPITAL_BEDS.to_string(),
            table(HOSPITAL_BEDS, &["fips", "state_name"], vec![]),
        );

        let err = transform(&raw).unwrap_err();
        assert!(err.to_string().contains("latitude"));
    }

    #[test]
    fn inputs_are_not_modified() {
        let raw = sources();
        let before = raw.clone();
        transform(&raw).unwrap();
        assert_eq!(raw, before);
    }
}
