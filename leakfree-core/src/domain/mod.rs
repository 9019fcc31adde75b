//! Domain types shared by every stage of the pipeline.

pub mod column;
pub mod record;
pub mod row;

pub use column::{Causality, Column, ColumnValues, DATE_COLUMN, LABEL_COLUMN, TICKER_COLUMN};
pub use record::{InstrumentSeries, RawDataset, RawRecord};
pub use row::FeatureRow;
