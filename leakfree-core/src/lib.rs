//! Leakfree Core: leakage-safe feature processing and validation.
//!
//! This crate contains the processing engine:
//! - Domain types (raw records, feature rows, the column catalog)
//! - Entity partitioner and raw-data provider contract
//! - Feature engine and label generator
//! - Missing-data resolver
//! - Per-entity normalizer with persisted scaler state
//! - Processed stores and the incremental merge controller
//! - Causal split engine
//! - Pipeline validator

pub mod data;
pub mod domain;
pub mod features;
pub mod merge;
pub mod normalize;
pub mod resolve;
pub mod split;
pub mod store;
pub mod validate;

pub use data::{partition, DataError, Partitioned, RawDataProvider, SchemaError};
pub use domain::{Column, FeatureRow, InstrumentSeries, RawDataset, RawRecord};
pub use features::{FeatureEngine, FeatureSet, Lookback};
pub use merge::{MergeController, Outcome, ProcessError, ProcessOptions, RunMode, RunState};
pub use normalize::{NormalizationState, ScalerState, ScalerStore, ScalerTransition};
pub use split::{final_split, holdout, walk_forward, SplitError, SplitFold};
pub use store::{ProcessedDataset, ProcessedStore, StoreError};
pub use validate::{PipelineValidator, ValidationConfig, ValidationReport};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: everything handed to worker threads is Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        // Domain types
        require_send::<RawRecord>();
        require_sync::<RawRecord>();
        require_send::<InstrumentSeries>();
        require_sync::<InstrumentSeries>();
        require_send::<FeatureRow>();
        require_sync::<FeatureRow>();

        // Processing
        require_send::<FeatureEngine>();
        require_sync::<FeatureEngine>();
        require_send::<MergeController>();
        require_sync::<MergeController>();
        require_send::<NormalizationState>();
        require_sync::<NormalizationState>();
        require_send::<store::ParquetStore>();
        require_sync::<store::ParquetStore>();
        require_send::<normalize::JsonScalerStore>();
        require_sync::<normalize::JsonScalerStore>();

        // Results
        require_send::<Outcome>();
        require_sync::<Outcome>();
        require_send::<ProcessError>();
        require_sync::<ProcessError>();
        require_send::<ValidationReport>();
        require_sync::<ValidationReport>();
        require_send::<SplitFold>();
        require_sync::<SplitFold>();
    }

    /// Architecture contract: features see only raw records, never labels or
    /// other instruments.
    ///
    /// `Feature::compute` takes one instrument's `&[RawRecord]`. If the
    /// signature ever grows a row or dataset parameter, this stops compiling.
    #[test]
    fn feature_trait_sees_only_raw_records() {
        fn _check_trait_object_builds(
            feature: &dyn features::Feature,
            records: &[RawRecord],
        ) -> Vec<f64> {
            feature.compute(records)
        }
    }
}
