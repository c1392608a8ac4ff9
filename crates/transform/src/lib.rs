pub mod calendar;
pub mod join;
pub mod schema;

pub use calendar::{derive_calendar, parse_compact_date};
pub use join::inner_join;
pub use schema::{transform, StarSchema, TransformError, SOURCE_TABLES};
