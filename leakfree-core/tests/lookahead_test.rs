//! Look-ahead contamination tests for every feature.
//!
//! Invariant: no feature value at t may depend on a close at t+1 or later.
//!
//! Method: compute on a truncated series (records 0..100) and the full series
//! (records 0..200). Values for records 0..100 must be identical. Any
//! difference means the feature is leaking future data into past values.

use chrono::NaiveDate;
use leakfree_core::domain::{Column, InstrumentSeries, RawRecord};
use leakfree_core::features::{
    Feature, FeatureEngine, FeatureSet, LaggedReturn, LogReturn, MovingAverage, Rsi,
};

/// Deterministic pseudo-random walk.
fn make_test_records(n: usize) -> Vec<RawRecord> {
    let base_date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    let mut price = 100.0;
    (0..n)
        .map(|i| {
            let seed = (i as u64).wrapping_mul(6364136223846793005).wrapping_add(1);
            let change = ((seed % 200) as f64 - 100.0) * 0.05;
            price = f64::max(price + change, 10.0);
            RawRecord::new("TEST", base_date + chrono::Duration::days(i as i64))
                .with(Column::Open, price - 0.5)
                .with(Column::High, price + 2.0)
                .with(Column::Low, price - 2.0)
                .with(Column::Close, price)
                .with(Column::Volume, 1000.0 + i as f64 * 100.0)
        })
        .collect()
}

fn assert_no_lookahead(feature: &dyn Feature, full: &[RawRecord], truncated_len: usize) {
    let full_result = feature.compute(full);
    let truncated_result = feature.compute(&full[..truncated_len]);
    let name = feature.column();

    assert_eq!(truncated_result.len(), truncated_len, "{name}: truncated length");
    assert_eq!(full_result.len(), full.len(), "{name}: full length");

    for i in 0..truncated_len {
        let t = truncated_result[i];
        let f = full_result[i];
        if t.is_nan() && f.is_nan() {
            continue;
        }
        assert!(
            !t.is_nan() && !f.is_nan(),
            "{name}: NaN mismatch at {i} (truncated={t}, full={f})"
        );
        assert!(
            (t - f).abs() < 1e-10,
            "{name}: look-ahead contamination at {i}: truncated={t}, full={f}"
        );
    }
}

#[test]
fn lookahead_moving_average() {
    assert_no_lookahead(&MovingAverage::new(), &make_test_records(200), 100);
}

#[test]
fn lookahead_lagged_return() {
    assert_no_lookahead(&LaggedReturn, &make_test_records(200), 100);
}

#[test]
fn lookahead_log_return() {
    assert_no_lookahead(&LogReturn, &make_test_records(200), 100);
}

#[test]
fn lookahead_rsi() {
    assert_no_lookahead(&Rsi::new(), &make_test_records(200), 100);
}

/// Full engine: every column except the label is unchanged when all later
/// records are deleted. The label of the last kept record becomes undefined,
/// which is the one sanctioned forward reference.
#[test]
fn lookahead_engine_rows() {
    let records = make_test_records(200);
    let columns = vec![
        Column::Open,
        Column::High,
        Column::Low,
        Column::Close,
        Column::Volume,
    ];
    let full = InstrumentSeries {
        instrument_id: "TEST".into(),
        columns: columns.clone(),
        records: records.clone(),
    };
    let truncated = InstrumentSeries {
        instrument_id: "TEST".into(),
        columns,
        records: records[..120].to_vec(),
    };

    let engine = FeatureEngine::new(FeatureSet::FeatureEngineered { rsi: true });
    let full_rows = engine.compute(&full).unwrap();
    let truncated_rows = engine.compute(&truncated).unwrap();

    for (t, f) in truncated_rows.iter().zip(&full_rows) {
        assert_eq!(t.timestamp, f.timestamp);
        for (c, tv) in t.values.iter() {
            let fv = f.value(c);
            assert!(
                (tv.is_nan() && fv.is_nan()) || (tv - fv).abs() < 1e-10,
                "{c} differs at {}: truncated={tv}, full={fv}",
                t.timestamp
            );
        }
    }
    assert_eq!(truncated_rows[119].label, None);
    assert!(full_rows[119].label.is_some());
    assert_eq!(truncated_rows[118].label, full_rows[118].label);
}

/// Perturbing a future close never moves a past feature value.
#[test]
fn future_shock_does_not_move_past_values() {
    let mut records = make_test_records(150);
    let engine = FeatureEngine::new(FeatureSet::default());
    let series = |records: Vec<RawRecord>| InstrumentSeries {
        instrument_id: "TEST".into(),
        columns: vec![Column::Close],
        records,
    };
    let before = engine.compute(&series(records.clone())).unwrap();
    records[100] = records[100].clone().with(Column::Close, 1_000.0);
    let after = engine.compute(&series(records)).unwrap();

    for i in 0..100 {
        for c in [Column::Sma20, Column::LagReturn1, Column::LogReturn, Column::Rsi14] {
            let (b, a) = (before[i].value(c), after[i].value(c));
            assert!(
                (b.is_nan() && a.is_nan()) || b == a,
                "{c} at {i} moved after a shock at 100"
            );
        }
    }
    // the label at 99 looks at 100 by definition
    assert_eq!(after[99].label, Some(1));
}
