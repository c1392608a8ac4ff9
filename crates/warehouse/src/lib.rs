pub mod client;
pub mod config;
pub mod ddl;
pub mod loader;

pub use client::{RedshiftDataService, StatementService, StatementStatus, WarehouseError};
pub use config::WarehouseConfig;
pub use ddl::{copy_statement, create_table_statement, sql_type};
pub use loader::{StatementReport, WarehouseLoader};
