//! Pipeline validator: an advisory, read-only auditor.
//!
//! Checks run against a processed dataset or a set of folds and return a
//! [`ValidationReport`]. Nothing here returns an error or mutates the data it
//! audits; problems become findings.

pub mod finding;
pub mod folds;
pub mod leakage;

pub use finding::{Finding, FindingKind, Severity, ValidationReport};
pub use leakage::{rederive, Rederivation};

use crate::domain::Column;
use crate::normalize::{FoldScaler, NormalizationState};
use crate::split::SplitFold;
use crate::store::ProcessedDataset;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Flag when `|p(y=0) - p(y=1)|` exceeds this.
    pub imbalance_threshold: f64,
    /// Relative tolerance for re-derived features (absolute below 1.0).
    pub derivation_tolerance: f64,
    /// Allowed overshoot of scaled evaluation values beyond [0, 1].
    pub scaled_range_margin: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            imbalance_threshold: 0.4,
            derivation_tolerance: 1e-6,
            scaled_range_margin: 0.1,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PipelineValidator {
    config: ValidationConfig,
}

impl PipelineValidator {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Audit a processed dataset: non-finite residue, feature re-derivation,
    /// class balance.
    ///
    /// `scalers` maps instruments to the states their stored rows were scaled
    /// with; re-derivation inverts them to compare in raw scale. Instruments
    /// without a state are taken as unscaled.
    pub fn audit_dataset(
        &self,
        dataset: &ProcessedDataset,
        scalers: &BTreeMap<String, NormalizationState>,
    ) -> ValidationReport {
        let mut report = ValidationReport::new();
        self.scan_non_finite(dataset, &mut report);
        self.check_derivations(dataset, scalers, &mut report);
        self.check_class_balance(dataset, &mut report);
        debug!(findings = report.findings().len(), "dataset audit finished");
        report
    }

    /// Audit folds against the scalers that were applied to them.
    pub fn audit_folds(
        &self,
        folds: &[SplitFold],
        scalers: &BTreeMap<String, NormalizationState>,
    ) -> ValidationReport {
        let mut report = ValidationReport::new();
        for fold in folds {
            folds::check_overlap(fold, &mut report);
            folds::check_scalers(fold, scalers, self.config.scaled_range_margin, &mut report);
        }
        report
    }

    /// Audit folds with scalers fitted on each fold's training rows only.
    pub fn audit_folds_fold_local(&self, folds: &[SplitFold]) -> ValidationReport {
        let mut report = ValidationReport::new();
        for fold in folds {
            folds::check_overlap(fold, &mut report);
            match FoldScaler::fit_on_train(fold) {
                Ok(scaler) => folds::check_scalers(
                    fold,
                    scaler.states(),
                    self.config.scaled_range_margin,
                    &mut report,
                ),
                Err(e) => report.push(
                    Finding::new(
                        FindingKind::ScalerUnavailable,
                        Severity::Warning,
                        format!("fold scaler fit failed: {e}"),
                    )
                    .fold(fold.fold_index),
                ),
            }
        }
        report
    }

    fn scan_non_finite(&self, dataset: &ProcessedDataset, report: &mut ValidationReport) {
        for column in dataset.columns() {
            let mut nan = 0usize;
            let mut inf = 0usize;
            for (_, rows) in dataset.iter() {
                for row in rows {
                    match row.values.get(column) {
                        Some(v) if v.is_nan() => nan += 1,
                        Some(v) if v.is_infinite() => inf += 1,
                        _ => {}
                    }
                }
            }
            if nan + inf > 0 {
                report.push(
                    Finding::new(
                        FindingKind::NonFinite,
                        Severity::Warning,
                        format!("{nan} NaN, {inf} infinite"),
                    )
                    .column(column)
                    .count(nan + inf),
                );
            }
        }
    }

    fn check_derivations(
        &self,
        dataset: &ProcessedDataset,
        scalers: &BTreeMap<String, NormalizationState>,
        report: &mut ValidationReport,
    ) {
        for (id, rows) in dataset.iter() {
            let state = scalers.get(id);
            for column in [Column::LagReturn1, Column::Sma20, Column::LogReturn] {
                let Some(d) = rederive(rows, column, state, self.config.derivation_tolerance)
                else {
                    continue;
                };
                if d.mismatches == 0 {
                    continue;
                }
                let finding = if leakage::is_shifted(column) {
                    let mut message = format!(
                        "{} of {} rows differ from the one-step-shifted re-derivation",
                        d.mismatches, d.checked
                    );
                    if d.same_day_matches > 0 {
                        message.push_str(&format!(
                            "; {} match the same-day value",
                            d.same_day_matches
                        ));
                    }
                    Finding::new(FindingKind::LookaheadSuspected, Severity::Warning, message)
                } else {
                    Finding::new(
                        FindingKind::DerivationMismatch,
                        Severity::Warning,
                        format!(
                            "{} of {} rows differ from the re-derived value",
                            d.mismatches, d.checked
                        ),
                    )
                };
                report.push(finding.column(column).instrument(id).count(d.mismatches));
            }
        }
    }

    fn check_class_balance(&self, dataset: &ProcessedDataset, report: &mut ValidationReport) {
        if dataset.is_empty() {
            return;
        }
        if !dataset.has_label() {
            report.push(Finding::new(
                FindingKind::MissingTarget,
                Severity::Fatal,
                "target column 'y' is missing",
            ));
            return;
        }

        let mut ones = 0usize;
        let mut zeros = 0usize;
        let mut missing = 0usize;
        for (_, rows) in dataset.iter() {
            for row in rows {
                match row.label {
                    Some(0) => zeros += 1,
                    Some(_) => ones += 1,
                    None => missing += 1,
                }
            }
        }
        if missing > 0 {
            report.push(
                Finding::new(
                    FindingKind::MissingTarget,
                    Severity::Warning,
                    "rows without a label",
                )
                .count(missing),
            );
        }

        let total = (ones + zeros) as f64;
        let p1 = ones as f64 / total;
        let p0 = zeros as f64 / total;
        report.push(Finding::new(
            FindingKind::ClassBalance,
            Severity::Info,
            format!("y=0: {:.1}%, y=1: {:.1}%", p0 * 100.0, p1 * 100.0),
        ));
        if (p0 - p1).abs() > self.config.imbalance_threshold {
            report.push(Finding::new(
                FindingKind::ClassImbalance,
                Severity::Warning,
                format!(
                    "class difference {:.2} exceeds {:.2}",
                    (p0 - p1).abs(),
                    self.config.imbalance_threshold
                ),
            ));
        }
    }
}
