//! Label generator: `y(t) = 1 if close[t+1] > close[t] else 0`.
//!
//! The only computation allowed to look forward. The last row has no t+1 and
//! gets no label; it is dropped by the resolver, never imputed.

use crate::domain::RawRecord;

pub fn generate_labels(records: &[RawRecord]) -> Vec<Option<u8>> {
    let n = records.len();
    (0..n)
        .map(|i| {
            if i + 1 >= n {
                return None;
            }
            let today = records[i].close();
            let next = records[i + 1].close();
            if today.is_finite() && next.is_finite() {
                Some(u8::from(next > today))
            } else {
                None
            }
        })
        .collect()
}
