//! Per-entity normalizer: min-max scaling with an explicit
//! `Unfit → Fit(params)` lifecycle per instrument.

pub mod fold;
pub mod scaler;
pub mod store;

pub use fold::FoldScaler;
pub use scaler::{
    normalize_rows, ColumnRange, NormalizationState, NormalizeError, ScalerState,
    ScalerTransition,
};
pub use store::{JsonScalerStore, MemoryScalerStore, ScalerStore};
