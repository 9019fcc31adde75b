//! Fold-level audits: ordering, emptiness, scaler provenance, range drift.

use super::finding::{Finding, FindingKind, Severity, ValidationReport};
use crate::domain::Column;
use crate::normalize::NormalizationState;
use crate::split::SplitFold;
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Global and per-instrument `max(train) < min(test)`.
pub fn check_overlap(fold: &SplitFold, report: &mut ValidationReport) {
    let i = fold.fold_index;
    if fold.train_rows.is_empty() || fold.test_rows.is_empty() {
        report.push(
            Finding::new(
                FindingKind::EmptyFold,
                Severity::Fatal,
                format!(
                    "{} train rows, {} test rows",
                    fold.train_rows.len(),
                    fold.test_rows.len()
                ),
            )
            .fold(i),
        );
        return;
    }

    if let (Some(max_train), Some(min_test)) = (fold.max_train_timestamp(), fold.min_test_timestamp()) {
        if max_train >= min_test {
            let overlapping = fold
                .test_rows
                .iter()
                .filter(|r| r.timestamp <= max_train)
                .count();
            report.push(
                Finding::new(
                    FindingKind::FoldOverlap,
                    Severity::Fatal,
                    format!("train ends {max_train}, test starts {min_test}"),
                )
                .fold(i)
                .count(overlapping),
            );
        }
    }

    for id in fold.instruments() {
        let max_train = fold.train_for(id).map(|r| r.timestamp).max();
        let min_test = fold.test_for(id).map(|r| r.timestamp).min();
        if let (Some(a), Some(b)) = (max_train, min_test) {
            if a >= b {
                report.push(
                    Finding::new(
                        FindingKind::FoldOverlap,
                        Severity::Fatal,
                        format!("train ends {a}, test starts {b}"),
                    )
                    .fold(i)
                    .instrument(id),
                );
            }
        }
    }
}

/// Scalers applied to a fold must be fitted strictly before that
/// instrument's first test timestamp. Evaluation values far outside the
/// fitted range are reported as drift.
pub fn check_scalers(
    fold: &SplitFold,
    scalers: &BTreeMap<String, NormalizationState>,
    margin: f64,
    report: &mut ValidationReport,
) {
    let i = fold.fold_index;
    for id in fold.instruments() {
        let Some(state) = scalers.get(id) else {
            continue;
        };
        let first_test: Option<NaiveDate> = fold.test_for(id).map(|r| r.timestamp).min();
        if let Some(first_test) = first_test {
            if state.fitted_through >= first_test {
                let leaked = fold
                    .test_for(id)
                    .filter(|r| r.timestamp <= state.fitted_through)
                    .count();
                report.push(
                    Finding::new(
                        FindingKind::ScalerLeakage,
                        Severity::Fatal,
                        format!(
                            "scaler fitted through {}, test starts {first_test}",
                            state.fitted_through
                        ),
                    )
                    .fold(i)
                    .instrument(id)
                    .count(leaked),
                );
            }
        }

        let mut drift: BTreeMap<Column, usize> = BTreeMap::new();
        for row in fold.test_for(id) {
            for (&column, range) in &state.columns {
                let scaled = range.transform(row.value(column));
                if scaled < -margin || scaled > 1.0 + margin {
                    *drift.entry(column).or_default() += 1;
                }
            }
        }
        for (column, count) in drift {
            report.push(
                Finding::new(
                    FindingKind::ScaledRangeDrift,
                    Severity::Warning,
                    format!("scaled values outside [{:.2}, {:.2}]", -margin, 1.0 + margin),
                )
                .fold(i)
                .instrument(id)
                .column(column)
                .count(count),
            );
        }
    }
}
