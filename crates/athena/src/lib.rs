pub mod client;
pub mod config;
pub mod loader;

pub use client::{is_query_not_finished, AthenaError, AthenaQueryService, QueryRequest, QueryService};
pub use config::AthenaConfig;
pub use loader::{TableLoader, STATES_ABV};
