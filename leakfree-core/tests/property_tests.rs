//! Property tests for processing invariants.
//!
//! Uses proptest to verify:
//! 1. Causality: truncating the future never changes a feature value
//! 2. Fold ordering: every train timestamp precedes every test timestamp
//! 3. Scaling: a fresh fit maps the fitted rows into [0, 1]
//! 4. Partitioning: output is strictly increasing per instrument

use chrono::NaiveDate;
use leakfree_core::domain::{Column, FeatureRow, RawDataset, RawRecord};
use leakfree_core::features::{FeatureEngine, FeatureSet};
use leakfree_core::normalize::NormalizationState;
use leakfree_core::split::create_folds;
use leakfree_core::store::ProcessedDataset;
use leakfree_core::{partition, walk_forward};
use proptest::prelude::*;

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_closes(max_len: usize) -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(1.0..500.0_f64, 2..max_len)
}

fn base_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()
}

fn records(closes: &[f64]) -> Vec<RawRecord> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            RawRecord::new("P", base_date() + chrono::Duration::days(i as i64))
                .with(Column::Close, c)
        })
        .collect()
}

fn same(a: f64, b: f64) -> bool {
    (a.is_nan() && b.is_nan()) || (a - b).abs() < 1e-9
}

// ── 1. Causality ─────────────────────────────────────────────────────

proptest! {
    /// Dropping every record after `cut` leaves all feature values before
    /// `cut` unchanged.
    #[test]
    fn features_ignore_the_future(closes in arb_closes(80), cut_frac in 0.1..0.9_f64) {
        let all = records(&closes);
        let cut = ((closes.len() as f64 * cut_frac) as usize).max(1);
        let engine = FeatureEngine::new(FeatureSet::FeatureEngineered { rsi: true });
        let full = engine.compute_window("P", &[Column::Close], &all).unwrap();
        let part = engine.compute_window("P", &[Column::Close], &all[..cut]).unwrap();

        for (t, f) in part.iter().zip(&full) {
            for (c, v) in t.values.iter() {
                prop_assert!(same(v, f.value(c)), "{} differs at {}", c, t.timestamp);
            }
        }
        // labels agree everywhere except the truncated tail
        for i in 0..cut.saturating_sub(1) {
            prop_assert_eq!(part[i].label, full[i].label);
        }
        prop_assert_eq!(part[cut - 1].label, None);
    }
}

// ── 2. Fold Ordering ─────────────────────────────────────────────────

proptest! {
    /// Index folds never overlap and the last fold reaches the end.
    #[test]
    fn index_folds_are_ordered(n in 5usize..400, k in 1usize..8) {
        prop_assume!(n > k);
        let folds = create_folds(n, k).unwrap();
        prop_assert_eq!(folds.len(), k);
        for f in &folds {
            prop_assert!(f.train_end <= f.test_start);
            prop_assert!(f.train_len() > 0);
            prop_assert!(f.test_len() > 0);
        }
        prop_assert_eq!(folds[k - 1].test_end, n);
    }

    /// Materialized folds keep max(train) < min(test) for every instrument,
    /// even when instruments cover different date ranges.
    #[test]
    fn materialized_folds_are_causal(
        lens in prop::collection::vec(10usize..60, 1..4),
        offsets in prop::collection::vec(0i64..20, 4),
        k in 1usize..5,
    ) {
        let mut rows = Vec::new();
        for (i, len) in lens.iter().enumerate() {
            let id = format!("I{i}");
            for d in 0..*len {
                let mut r = FeatureRow::new(
                    id.as_str(),
                    base_date() + chrono::Duration::days(offsets[i] + d as i64),
                );
                r.values.set(Column::Close, d as f64);
                r.label = Some((d % 2) as u8);
                rows.push(r);
            }
        }
        let dataset = ProcessedDataset::from_rows(rows).unwrap();
        let folds = walk_forward(&dataset, k).unwrap();
        for fold in &folds {
            let max_train = fold.max_train_timestamp().unwrap();
            let min_test = fold.min_test_timestamp().unwrap();
            prop_assert!(max_train < min_test);
            for id in fold.instruments() {
                let a = fold.train_for(id).map(|r| r.timestamp).max();
                let b = fold.test_for(id).map(|r| r.timestamp).min();
                if let (Some(a), Some(b)) = (a, b) {
                    prop_assert!(a < b);
                }
            }
        }
    }
}

// ── 3. Scaling ───────────────────────────────────────────────────────

proptest! {
    #[test]
    fn fitted_rows_land_in_unit_interval(closes in arb_closes(60)) {
        let mut rows: Vec<FeatureRow> = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                let mut r = FeatureRow::new("P", base_date() + chrono::Duration::days(i as i64));
                r.values.set(Column::Close, c);
                r
            })
            .collect();
        let state = NormalizationState::fit("P", &rows).unwrap();
        state.transform_rows(&mut rows).unwrap();
        for r in &rows {
            let v = r.value(Column::Close);
            prop_assert!((0.0..=1.0).contains(&v), "scaled {} outside [0, 1]", v);
        }
    }
}

// ── 4. Partitioning ──────────────────────────────────────────────────

proptest! {
    /// Any arrival order, with duplicates, partitions into strictly
    /// increasing series.
    #[test]
    fn partitions_are_strictly_increasing(days in prop::collection::vec((0usize..3, 0i64..50), 1..120)) {
        let ids = ["A", "B", "C"];
        let raw: Vec<RawRecord> = days
            .iter()
            .map(|&(i, d)| {
                RawRecord::new(ids[i], base_date() + chrono::Duration::days(d))
                    .with(Column::Close, d as f64)
            })
            .collect();
        let total = raw.len();
        let parts = partition(&RawDataset::with_standard_header(raw, false)).unwrap();
        let mut kept = 0;
        for id in parts.instruments() {
            let series = parts.get(id).unwrap();
            prop_assert!(series.records.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
            kept += series.len();
        }
        prop_assert_eq!(kept + parts.total_duplicates(), total);
    }
}
