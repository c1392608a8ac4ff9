use thiserror::Error;

/// Data-shape errors raised while building or reshaping tables.
#[derive(Error, Debug)]
pub enum TableError {
    #[error("table {table} has no column {column}")]
    MissingColumn { table: String, column: String },

    #[error("table {table}: invalid date {value:?} in column {column} (expected YYYYMMDD)")]
    InvalidDate {
        table: String,
        column: String,
        value: String,
    },

    #[error("table {0} has no rows")]
    EmptyTable(String),

    #[error("table {table}: row {row} has {found} values, expected {expected}")]
    RaggedRow {
        table: String,
        row: usize,
        found: usize,
        expected: usize,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from waiting on an asynchronous backend operation.
#[derive(Error, Debug)]
pub enum PollError {
    /// The backend reported a terminal failure.
    #[error("operation {handle} failed: {reason}")]
    Failed { handle: String, reason: String },

    /// Only reachable when a max-attempts budget is configured.
    #[error("operation {handle} not finished after {attempts} polls")]
    Exhausted { handle: String, attempts: u32 },

    /// The status check itself errored with something other than "still running".
    #[error("status check for {handle} failed: {message}")]
    Probe { handle: String, message: String },
}

impl PollError {
    pub fn handle(&self) -> &str {
        match self {
            PollError::Failed { handle, .. }
            | PollError::Exhausted { handle, .. }
            | PollError::Probe { handle, .. } => handle,
        }
    }
}
