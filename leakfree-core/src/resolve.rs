//! Missing-data resolver.
//!
//! Per instrument: forward-fill interior gaps, then drop every row that still
//! has an undefined value. NaN and ±∞ both count as undefined. The label is
//! never filled.

use crate::domain::{Column, FeatureRow, RawRecord};

/// Forward-fill raw columns in place. Leading gaps stay NaN.
pub fn forward_fill_raw(records: &mut [RawRecord], columns: &[Column]) {
    for &column in columns {
        let mut last: Option<f64> = None;
        for record in records.iter_mut() {
            match record.values.get(column) {
                Some(v) if v.is_finite() => last = Some(v),
                _ => {
                    let fill = last.unwrap_or(f64::NAN);
                    record.values.set(column, fill);
                }
            }
        }
    }
}

/// Forward-fill every present column of `rows` in place.
pub fn forward_fill_rows(rows: &mut [FeatureRow]) {
    let Some(first) = rows.first() else {
        return;
    };
    for column in first.values.columns() {
        let mut last: Option<f64> = None;
        for row in rows.iter_mut() {
            let v = row.value(column);
            if v.is_finite() {
                last = Some(v);
            } else if let Some(fill) = last {
                row.values.set(column, fill);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub rows: Vec<FeatureRow>,
    /// Rows removed because a value or the required label stayed undefined.
    pub dropped: usize,
}

impl Resolution {
    /// True when nothing survived; the instrument should be skipped.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MissingDataResolver {
    require_label: bool,
}

impl MissingDataResolver {
    pub fn new(require_label: bool) -> Self {
        Self { require_label }
    }

    pub fn resolve(&self, mut rows: Vec<FeatureRow>) -> Resolution {
        forward_fill_rows(&mut rows);
        let before = rows.len();
        rows.retain(|row| {
            !row.values.has_undefined() && (!self.require_label || row.label.is_some())
        });
        Resolution {
            dropped: before - rows.len(),
            rows,
        }
    }
}
