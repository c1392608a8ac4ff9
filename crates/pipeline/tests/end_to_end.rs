//! Full pipeline runs against scripted query and statement backends with
//! in-memory object stores standing in for S3.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::ObjectStore;

use covid_athena::{AthenaConfig, AthenaError, QueryRequest, QueryService};
use covid_core::{AwsConfig, OperationStatus, PollPolicy};
use covid_pipeline::{Pipeline, PipelineConfig, PipelineError};
use covid_storage::StagingConfig;
use covid_transform::SOURCE_TABLES;
use covid_warehouse::{StatementService, StatementStatus, WarehouseConfig, WarehouseError};

/// Query ids are `q-<table>`; every query succeeds on the first probe.
#[derive(Default)]
struct MockAthena {
    submitted: Mutex<Vec<String>>,
}

#[async_trait]
impl QueryService for MockAthena {
    async fn submit_query(&self, request: &QueryRequest) -> Result<String, AthenaError> {
        let table = request.sql.trim_start_matches("SELECT * FROM ");
        self.submitted.lock().unwrap().push(table.to_string());
        Ok(format!("q-{table}"))
    }

    async fn query_status(&self, _query_id: &str) -> Result<OperationStatus, AthenaError> {
        Ok(OperationStatus::Finished)
    }
}

/// Records every statement; each finishes after one pending describe.
#[derive(Default)]
struct MockRedshift {
    executed: Mutex<Vec<String>>,
    pending_seen: Mutex<Vec<String>>,
}

impl MockRedshift {
    fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl StatementService for MockRedshift {
    async fn execute_statement(
        &self,
        _database: &str,
        sql: &str,
        _workgroup: &str,
    ) -> Result<String, WarehouseError> {
        let mut executed = self.executed.lock().unwrap();
        executed.push(sql.to_string());
        Ok(format!("stmt-{}", executed.len()))
    }

    async fn execute_batch(
        &self,
        _database: &str,
        _sqls: &[String],
        _workgroup: &str,
    ) -> Result<String, WarehouseError> {
        panic!("batch mode is not enabled in these runs");
    }

    async fn describe_statement(&self, id: &str) -> Result<StatementStatus, WarehouseError> {
        let mut seen = self.pending_seen.lock().unwrap();
        if seen.iter().any(|s| s == id) {
            Ok(StatementStatus::new("FINISHED"))
        } else {
            seen.push(id.to_string());
            Ok(StatementStatus::new("STARTED"))
        }
    }
}

fn source_csv(table: &str) -> &'static str {
    match table {
        "enigma_jhu" => {
            "fips,admin2,province_state,country_region,latitude,longitude,confirmed,deaths,recovered,active\n\
             1001,Autauga,Alabama,US,32.54,-86.64,10,1,2,7\n\
             1003,Baldwin,Alabama,US,30.72,-87.72,20,2,3,15\n\
             9999,Nowhere,Nowhere,US,0.0,0.0,0,0,0,0\n"
        }
        "states_daily" => {
            "date,state,fips,positive,negative,hospitalizedcurrently,hospitalized,hospitalizeddischarged,recovered,death\n\
             20200315,AL,1001,5,50,1,2,0,1,0\n\
             20200316,AL,1001,8,60,2,3,1,2,1\n\
             20200315,AL,1003,3,30,,1,,,0\n"
        }
        "us_county" => "fips,county,state,lat,long\n1001,Autauga,Alabama,32.5,-86.6\n1003,Baldwin,Alabama,30.7,-87.7\n",
        "rearc_usa_hospital_beds" => {
            "objectid,hospital_name,hospital_type,hq_address,hq_city,hq_state,state_name,fips,latitude,longtitude,num_licensed_beds\n\
             1,Prattville Baptist,Short Term Acute Care,\"124 S Memorial Dr, Unit 1\",Prattville,AL,Alabama,1001,32.46,-86.47,85\n"
        }
        "states_abv" => "col0,col1\nState,Abbreviation\nAlabama,AL\n",
        _ => "id,value\n1,2\n",
    }
}

async fn results_store() -> Arc<InMemory> {
    let store = Arc::new(InMemory::new());
    for table in SOURCE_TABLES {
        store
            .put(
                &Path::from(format!("output/q-{table}.csv")),
                bytes::Bytes::from_static(source_csv(table).as_bytes()).into(),
            )
            .await
            .unwrap();
    }
    store
}

fn config(stage_fact_table: bool) -> PipelineConfig {
    let fast = PollPolicy::fixed(Duration::from_millis(1));
    PipelineConfig {
        profile: String::new(),
        aws: AwsConfig {
            region: "eu-west-2".into(),
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
            endpoint_url: None,
        },
        athena: AthenaConfig {
            poll: fast.clone(),
            ..AthenaConfig::default()
        },
        staging: StagingConfig {
            stage_fact_table,
            ..StagingConfig::default()
        },
        warehouse: WarehouseConfig {
            poll: fast,
            ..WarehouseConfig::default()
        },
    }
}

async fn read(store: &InMemory, key: &str) -> String {
    let data = store
        .get(&Path::from(key))
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    String::from_utf8(data.to_vec()).unwrap()
}

#[tokio::test]
async fn full_run_with_fact_file_provided_out_of_band() {
    let athena = Arc::new(MockAthena::default());
    let redshift = Arc::new(MockRedshift::default());
    let staging = Arc::new(InMemory::new());
    staging
        .put(
            &Path::from("final-output/factCovid.csv"),
            bytes::Bytes::from_static(b",fips\n0,1001\n").into(),
        )
        .await
        .unwrap();

    let pipeline = Pipeline::from_config(
        &config(false),
        athena.clone(),
        redshift.clone(),
        results_store().await,
        staging.clone(),
    );
    let summary = pipeline.run().await.unwrap();

    // Ten sources, queried in order.
    assert_eq!(*athena.submitted.lock().unwrap(), SOURCE_TABLES.to_vec());
    assert_eq!(summary.source_tables.len(), 10);

    let derived: Vec<(&str, usize)> = summary
        .derived_tables
        .iter()
        .map(|t| (t.name.as_str(), t.rows))
        .collect();
    assert_eq!(
        derived,
        vec![("factCovid", 3), ("dimRegion", 2), ("dimHospital", 1), ("dimDate", 3)]
    );

    // Only the dimensions are staged, and the fact file is left untouched.
    let staged: Vec<&str> = summary.staged.iter().map(|a| a.key.as_str()).collect();
    assert_eq!(
        staged,
        vec![
            "final-output/dimRegion.csv",
            "final-output/dimHospital.csv",
            "final-output/dimDate.csv"
        ]
    );
    assert_eq!(read(&staging, "final-output/factCovid.csv").await, ",fips\n0,1001\n");

    let date_csv = read(&staging, "final-output/dimDate.csv").await;
    assert_eq!(
        date_csv,
        ",fips,date,year,month,day_of_week\n\
         0,1001,2020-03-15,2020,3,6\n\
         1,1001,2020-03-16,2020,3,0\n\
         2,1003,2020-03-15,2020,3,6\n"
    );
    let hospital_csv = read(&staging, "final-output/dimHospital.csv").await;
    assert!(hospital_csv.contains("\"124 S Memorial Dr, Unit 1\""));

    // Four CREATEs then four COPYs, fact first.
    let executed = redshift.executed();
    assert_eq!(executed.len(), 8);
    let order = ["factCovid", "dimRegion", "dimHospital", "dimDate"];
    for (i, name) in order.iter().enumerate() {
        assert!(executed[i].starts_with(&format!("CREATE TABLE \"{name}\" (\n\"index\" INTEGER")));
        assert!(executed[i + 4].starts_with(&format!(
            "COPY {name} FROM 's3://covid-19-ukhsa/final-output/{name}.csv'"
        )));
        assert!(executed[i + 4].contains("IGNOREHEADER 1"));
    }
    assert!(executed[0].contains("\"recovered_x\" INTEGER"));
    assert!(executed[0].contains("\"recovered_y\" INTEGER"));
    assert!(executed[3].contains("\"date\" TIMESTAMP"));

    assert_eq!(summary.statements.len(), 8);
    assert!(summary.statements.iter().all(|s| s.polls == 2));
    assert_eq!(summary.statements[0].name, "factCovidSQL");
    assert_eq!(summary.statements[7].name, "dimDateCopy");
}

#[tokio::test]
async fn missing_fact_file_fails_before_first_copy() {
    let redshift = Arc::new(MockRedshift::default());
    let staging = Arc::new(InMemory::new());

    let pipeline = Pipeline::from_config(
        &config(false),
        Arc::new(MockAthena::default()),
        redshift.clone(),
        results_store().await,
        staging.clone(),
    );
    let err = pipeline.run().await.unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Warehouse(WarehouseError::MissingStagedArtifact { ref table, .. })
            if table == "factCovid"
    ));
    // Schema phase already ran; no COPY was sent.
    let executed = redshift.executed();
    assert_eq!(executed.len(), 4);
    assert!(executed.iter().all(|s| s.starts_with("CREATE TABLE")));
    // Dimensions were staged before the failure.
    assert!(staging
        .head(&Path::from("final-output/dimDate.csv"))
        .await
        .is_ok());
}

#[tokio::test]
async fn staging_the_fact_table_completes_without_out_of_band_file() {
    let redshift = Arc::new(MockRedshift::default());
    let staging = Arc::new(InMemory::new());

    let pipeline = Pipeline::from_config(
        &config(true),
        Arc::new(MockAthena::default()),
        redshift.clone(),
        results_store().await,
        staging.clone(),
    );
    let summary = pipeline.run().await.unwrap();

    assert_eq!(summary.staged.len(), 4);
    assert_eq!(summary.staged[0].table, "factCovid");
    assert_eq!(summary.staged[0].rows, 3);
    assert_eq!(redshift.executed().len(), 8);

    let fact_csv = read(&staging, "final-output/factCovid.csv").await;
    assert!(fact_csv.starts_with(
        ",fips,province_state,country_region,confirmed,deaths,recovered_x,active,\
         date,positive,negative,hospitalizedcurrently,hospitalized,hospitalizeddischarged,recovered_y,death\n"
    ));
}

#[tokio::test]
async fn missing_source_result_aborts_before_any_statement() {
    let redshift = Arc::new(MockRedshift::default());
    let results = results_store().await;
    results
        .delete(&Path::from("output/q-us_county.csv"))
        .await
        .unwrap();

    let pipeline = Pipeline::from_config(
        &config(true),
        Arc::new(MockAthena::default()),
        redshift.clone(),
        results,
        Arc::new(InMemory::new()),
    );
    let err = pipeline.run().await.unwrap_err();

    assert!(matches!(err, PipelineError::Extract(AthenaError::Download(_))));
    assert!(redshift.executed().is_empty());
}
