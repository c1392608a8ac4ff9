pub mod aws;
pub mod config;
pub mod error;
pub mod poll;
pub mod table;

pub use config::{load_dotenv, AwsConfig};
pub use error::*;
pub use poll::{OperationStatus, PollOutcome, PollPolicy, Poller};
pub use table::{ColumnType, Table, Value};
