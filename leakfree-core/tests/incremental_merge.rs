//! Incremental merge against the on-disk stores.
//!
//! A full run over 150 days followed by an incremental run over 170 days
//! must append exactly the new labelled rows, leave every earlier part file
//! untouched, and match a single full run on the same scale. Concurrent runs
//! on one instrument serialize and leave the same rows as a sequential run.

use chrono::NaiveDate;
use leakfree_core::domain::{Column, InstrumentSeries, RawRecord};
use leakfree_core::normalize::{JsonScalerStore, ScalerStore, ScalerTransition};
use leakfree_core::store::{ParquetStore, ProcessedStore};
use leakfree_core::{MergeController, Outcome, ProcessOptions, RunMode, RunState};
use std::fs;
use std::path::Path;
use std::sync::Arc;

fn make_series(id: &str, days: usize) -> InstrumentSeries {
    let base = NaiveDate::from_ymd_opt(2021, 3, 1).unwrap();
    let records = (0..days)
        .map(|i| {
            let close = 50.0 + (i as f64 * 0.31).sin() * 4.0 + i as f64 * 0.05;
            RawRecord::new(id, base + chrono::Duration::days(i as i64))
                .with(Column::Open, close - 0.2)
                .with(Column::High, close + 0.6)
                .with(Column::Low, close - 0.6)
                .with(Column::Close, close)
                .with(Column::AdjClose, close)
                .with(Column::Volume, 5_000.0 + (i % 7) as f64 * 100.0)
        })
        .collect();
    InstrumentSeries {
        instrument_id: id.into(),
        columns: vec![
            Column::Open,
            Column::High,
            Column::Low,
            Column::Close,
            Column::AdjClose,
            Column::Volume,
        ],
        records,
    }
}

fn controller(dir: &Path) -> (MergeController, Arc<ParquetStore>, Arc<JsonScalerStore>) {
    let store = Arc::new(ParquetStore::new(dir.join("processed")));
    let scalers = Arc::new(JsonScalerStore::new(dir.join("scalers")));
    (
        MergeController::new(store.clone(), scalers.clone()),
        store,
        scalers,
    )
}

fn part_bytes(dir: &Path) -> Vec<(String, Vec<u8>)> {
    let mut parts: Vec<(String, Vec<u8>)> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "parquet"))
        .map(|p| {
            let name = p.file_name().unwrap().to_string_lossy().into_owned();
            (name, fs::read(&p).unwrap())
        })
        .collect();
    parts.sort();
    parts
}

#[test]
fn incremental_run_appends_only_new_days() {
    let tmp = tempfile::tempdir().unwrap();
    let (ctl, store, scalers) = controller(tmp.path());
    let opts = ProcessOptions::default();

    let first = ctl.process_instrument(&make_series("AAPL", 150), &opts).unwrap();
    let Outcome::Processed(first) = first else {
        panic!("expected a full run, got {first:?}");
    };
    assert_eq!(first.state, RunState::FullRun);
    assert_eq!(first.scaler, ScalerTransition::Fitted);
    let persisted = store.row_count("AAPL").unwrap();
    let last_before = store.last_timestamp("AAPL").unwrap().unwrap();
    let state_before = scalers.load("AAPL").unwrap();

    let instrument_dir = tmp.path().join("processed").join("instrument=AAPL");
    let parts_before = part_bytes(&instrument_dir);
    assert_eq!(parts_before.len(), 1);

    let second = ctl.process_instrument(&make_series("AAPL", 170), &opts).unwrap();
    let Outcome::Processed(second) = second else {
        panic!("expected an incremental run, got {second:?}");
    };
    assert_eq!(second.state, RunState::IncrementalRun);
    assert_eq!(second.scaler, ScalerTransition::Reused);
    assert_eq!(second.appended_rows, 20);
    assert!(second.rows.iter().all(|r| r.timestamp > last_before));

    let after = store.row_count("AAPL").unwrap();
    assert_eq!(after, persisted + 20);
    assert_eq!(scalers.load("AAPL").unwrap(), state_before);

    // earlier parts are byte-identical, one new part holds the append
    let parts_after = part_bytes(&instrument_dir);
    assert_eq!(parts_after.len(), 2);
    assert_eq!(parts_after[0], parts_before[0]);

    // timestamps stay strictly increasing across the part boundary
    let rows = store.load("AAPL").unwrap();
    assert!(rows.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
}

#[test]
fn rerun_with_same_data_appends_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let (ctl, store, _) = controller(tmp.path());
    let opts = ProcessOptions::default();
    let series = make_series("MSFT", 120);

    ctl.process_instrument(&series, &opts).unwrap();
    let before = store.load("MSFT").unwrap();
    let out = ctl.process_instrument(&series, &opts).unwrap();

    assert_eq!(out.appended_rows(), 0);
    assert_eq!(store.load("MSFT").unwrap(), before);
}

#[test]
fn incremental_rows_match_full_recompute_on_the_same_scale() {
    let tmp = tempfile::tempdir().unwrap();
    let (ctl, store, _) = controller(tmp.path());
    let opts = ProcessOptions::default();
    ctl.process_instrument(&make_series("IBM", 150), &opts).unwrap();
    ctl.process_instrument(&make_series("IBM", 170), &opts).unwrap();
    let incremental = store.load("IBM").unwrap();

    // overwrite keeps the persisted scaler, so both runs share a scale
    let overwrite = ProcessOptions {
        mode: RunMode::Fresh,
        overwrite: true,
        ..ProcessOptions::default()
    };
    ctl.process_instrument(&make_series("IBM", 170), &overwrite).unwrap();
    let full = store.load("IBM").unwrap();

    assert_eq!(incremental.len(), full.len());
    for (a, b) in incremental.iter().zip(&full) {
        assert_eq!(a.timestamp, b.timestamp);
        assert_eq!(a.label, b.label);
        for (c, v) in a.values.iter() {
            assert!(
                (v - b.value(c)).abs() < 1e-9,
                "{c} differs at {}: {v} vs {}",
                a.timestamp,
                b.value(c)
            );
        }
    }
}

#[test]
fn fresh_run_without_overwrite_leaves_disk_untouched() {
    let tmp = tempfile::tempdir().unwrap();
    let (ctl, _, _) = controller(tmp.path());
    ctl.process_instrument(&make_series("NOK", 80), &ProcessOptions::default())
        .unwrap();
    let dir = tmp.path().join("processed").join("instrument=NOK");
    let before = part_bytes(&dir);

    let fresh = ProcessOptions {
        mode: RunMode::Fresh,
        ..ProcessOptions::default()
    };
    let out = ctl.process_instrument(&make_series("NOK", 100), &fresh).unwrap();
    assert!(matches!(out, Outcome::AlreadyProcessed { .. }));
    assert_eq!(part_bytes(&dir), before);
}

#[test]
fn concurrent_runs_on_one_instrument_serialize() {
    let reference_dir = tempfile::tempdir().unwrap();
    let (reference, reference_store, _) = controller(reference_dir.path());
    reference
        .process_instrument(&make_series("TSLA", 170), &ProcessOptions::default())
        .unwrap();
    let expected = reference_store.row_count("TSLA").unwrap();

    for _ in 0..4 {
        let tmp = tempfile::tempdir().unwrap();
        let (ctl, store, _) = controller(tmp.path());
        let short = make_series("TSLA", 150);
        let long = make_series("TSLA", 170);
        let opts = ProcessOptions::default();

        std::thread::scope(|s| {
            let a = s.spawn(|| ctl.process_instrument(&short, &opts));
            let b = s.spawn(|| ctl.process_instrument(&long, &opts));
            a.join().unwrap().unwrap();
            b.join().unwrap().unwrap();
        });

        // whichever run went second either appended the tail or found nothing new
        let rows = store.load("TSLA").unwrap();
        assert!(rows.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        assert_eq!(rows.len(), expected);
        assert_eq!(store.row_count("TSLA").unwrap(), expected);
    }
}
