//! Raw data: schema checks, partitioning, providers, universes.

pub mod partition;
pub mod provider;
pub mod schema;
pub mod universe;

pub use partition::{partition, Partitioned};
pub use provider::{check_range, DataError, DataSource, FetchResult, RawDataProvider};
pub use schema::{check_instrument_id, validate_header, SchemaError, REQUIRED_COLUMNS};
pub use universe::{Universe, UniverseError};
