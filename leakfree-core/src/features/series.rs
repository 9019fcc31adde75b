//! Series primitives shared by the features.
//!
//! All functions return a vector of the same length as the input, with NaN
//! wherever the value is undefined (warmup, shifted-in positions, NaN inputs).

/// Rolling mean over `window` observations. A window containing NaN is NaN.
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if window == 0 || n < window {
        return result;
    }

    let mut sum = 0.0;
    let mut nan_in_window = false;
    for &v in values.iter().take(window) {
        if v.is_nan() {
            nan_in_window = true;
        }
        sum += v;
    }
    if !nan_in_window {
        result[window - 1] = sum / window as f64;
    }

    for i in window..n {
        let leaving = values[i - window];
        let entering = values[i];
        sum = sum - leaving + entering;

        // A NaN poisons the running sum, so rescan while one is near the window.
        if entering.is_nan() || leaving.is_nan() || nan_in_window {
            nan_in_window = false;
            sum = 0.0;
            for &v in &values[(i + 1 - window)..=i] {
                if v.is_nan() {
                    nan_in_window = true;
                }
                sum += v;
            }
            if nan_in_window {
                continue;
            }
        }
        result[i] = sum / window as f64;
    }
    result
}

/// `values[i] / values[i - periods] - 1`.
pub fn pct_change(values: &[f64], periods: usize) -> Vec<f64> {
    let mut result = vec![f64::NAN; values.len()];
    if periods == 0 {
        return result;
    }
    for i in periods..values.len() {
        result[i] = values[i] / values[i - periods] - 1.0;
    }
    result
}

/// Move every value `k` steps later in time. The first `k` slots become NaN.
pub fn shift(values: &[f64], k: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    for i in k..n {
        result[i] = values[i - k];
    }
    result
}

/// `ln(values[i] / values[i - 1])`.
pub fn log_return(values: &[f64]) -> Vec<f64> {
    let mut result = vec![f64::NAN; values.len()];
    for i in 1..values.len() {
        result[i] = (values[i] / values[i - 1]).ln();
    }
    result
}
