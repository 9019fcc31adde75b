//! Property tests for runner-side invariants.
//!
//! 1. The dataset hash depends on content, not row order
//! 2. ROC AUC stays in [0, 1] and flips under score negation
//! 3. Raw CSV export reads back to the same records

use chrono::NaiveDate;
use leakfree_core::domain::{Column, RawDataset, RawRecord};
use leakfree_runner::export::export_raw_csv;
use leakfree_runner::history::dataset_hash;
use leakfree_runner::ingest::read_raw;
use leakfree_runner::training::roc_auc;
use proptest::prelude::*;

fn arb_dataset() -> impl Strategy<Value = RawDataset> {
    prop::collection::vec((0usize..3, 1.0..500.0_f64), 1..40).prop_map(|points| {
        let base = NaiveDate::from_ymd_opt(2021, 3, 1).unwrap();
        let records = points
            .into_iter()
            .enumerate()
            .map(|(i, (inst, close))| {
                let id = ["AAA", "BBB", "CCC"][inst];
                RawRecord::new(id, base + chrono::Duration::days(i as i64))
                    .with(Column::Open, close * 0.99)
                    .with(Column::High, close * 1.01)
                    .with(Column::Low, close * 0.98)
                    .with(Column::Close, close)
                    .with(Column::Volume, (i * 100) as f64)
            })
            .collect();
        RawDataset::with_standard_header(records, false)
    })
}

proptest! {
    #[test]
    fn hash_is_order_independent(ds in arb_dataset(), seed in any::<u64>()) {
        let mut shuffled = ds.clone();
        let n = shuffled.records.len();
        shuffled.records.rotate_left((seed as usize) % n);
        prop_assert_eq!(dataset_hash(&ds), dataset_hash(&shuffled));
    }

    #[test]
    fn roc_auc_is_bounded_and_antisymmetric(
        pairs in prop::collection::vec((0u8..2, 0.0..1.0_f64), 2..60)
    ) {
        let labels: Vec<u8> = pairs.iter().map(|p| p.0).collect();
        let scores: Vec<f64> = pairs.iter().map(|p| p.1).collect();
        let negated: Vec<f64> = scores.iter().map(|s| -s).collect();
        match (roc_auc(&labels, &scores), roc_auc(&labels, &negated)) {
            (Some(a), Some(b)) => {
                prop_assert!((0.0..=1.0).contains(&a));
                prop_assert!((a + b - 1.0).abs() < 1e-9);
            }
            (None, None) => prop_assert!(labels.iter().all(|&y| y == labels[0])),
            other => prop_assert!(false, "inconsistent AUC: {:?}", other),
        }
    }

    #[test]
    fn raw_csv_reads_back(ds in arb_dataset()) {
        let csv = export_raw_csv(&ds).unwrap();
        let back = read_raw(csv.as_bytes()).unwrap();
        prop_assert_eq!(back.records.len(), ds.records.len());
        for (a, b) in back.records.iter().zip(&ds.records) {
            prop_assert_eq!(&a.instrument_id, &b.instrument_id);
            prop_assert_eq!(a.timestamp, b.timestamp);
            prop_assert!((a.close() - b.close()).abs() <= 1e-9 * b.close());
        }
    }
}
