//! Model-trainer contract and evaluation metrics.
//!
//! The trainer consumes a feature matrix (every numeric column of the rows,
//! never identifiers or the label) and a label vector. Models are opaque
//! behind [`Classifier`]; a majority-class baseline ships here so the
//! contract is exercised end to end.

use leakfree_core::data::SchemaError;
use leakfree_core::domain::{Column, FeatureRow, LABEL_COLUMN};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrainError {
    #[error("training set is empty")]
    Empty,

    #[error("model has not been fitted")]
    NotFitted,

    #[error("dimension mismatch: expected {expected} features, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("row {row} has no label")]
    MissingLabel { row: usize },

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

// ─── Training set ───────────────────────────────────────────────────

/// Feature matrix and labels extracted from feature rows.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSet {
    pub columns: Vec<Column>,
    pub features: Vec<Vec<f64>>,
    pub labels: Vec<u8>,
}

impl TrainingSet {
    /// Extract `columns` from every row. Every row must carry a label; rows
    /// with no label at all come from a set that never generated one.
    pub fn from_rows(rows: &[FeatureRow], columns: &[Column]) -> Result<Self, TrainError> {
        if rows.is_empty() {
            return Err(TrainError::Empty);
        }
        if rows.iter().all(|r| r.label.is_none()) {
            return Err(SchemaError::MissingTarget(LABEL_COLUMN.to_string()).into());
        }
        let mut features = Vec::with_capacity(rows.len());
        let mut labels = Vec::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            let y = row.label.ok_or(TrainError::MissingLabel { row: i })?;
            features.push(row.features(columns));
            labels.push(y);
        }
        Ok(Self {
            columns: columns.to_vec(),
            features,
            labels,
        })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn positives(&self) -> usize {
        self.labels.iter().filter(|&&y| y == 1).count()
    }

    /// `negatives / positives`, the usual weight for the positive class on
    /// imbalanced data. 1.0 when there are no positives.
    pub fn scale_pos_weight(&self) -> f64 {
        let pos = self.positives();
        if pos == 0 {
            return 1.0;
        }
        (self.len() - pos) as f64 / pos as f64
    }
}

// ─── Classifier contract ────────────────────────────────────────────

pub trait Classifier: Send + Sync {
    fn name(&self) -> &str;

    fn fit(&mut self, set: &TrainingSet) -> Result<(), TrainError>;

    /// Probability of class 1 for each feature vector.
    fn predict_proba(&self, features: &[Vec<f64>]) -> Result<Vec<f64>, TrainError>;

    fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<u8>, TrainError> {
        Ok(self
            .predict_proba(features)?
            .into_iter()
            .map(|p| u8::from(p >= 0.5))
            .collect())
    }
}

/// Predicts the training base rate for every row.
#[derive(Debug, Clone, Default)]
pub struct MajorityClass {
    base_rate: Option<f64>,
}

impl MajorityClass {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Classifier for MajorityClass {
    fn name(&self) -> &str {
        "majority_class"
    }

    fn fit(&mut self, set: &TrainingSet) -> Result<(), TrainError> {
        if set.is_empty() {
            return Err(TrainError::Empty);
        }
        self.base_rate = Some(set.positives() as f64 / set.len() as f64);
        Ok(())
    }

    fn predict_proba(&self, features: &[Vec<f64>]) -> Result<Vec<f64>, TrainError> {
        let p = self.base_rate.ok_or(TrainError::NotFitted)?;
        Ok(vec![p; features.len()])
    }
}

// ─── Metrics ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub tp: usize,
    pub tn: usize,
    pub fp: usize,
    pub fn_: usize,
}

impl ConfusionMatrix {
    pub fn from_predictions(y_true: &[u8], y_pred: &[u8]) -> Self {
        let mut cm = Self::default();
        for (&t, &p) in y_true.iter().zip(y_pred) {
            match (t == 1, p == 1) {
                (true, true) => cm.tp += 1,
                (false, false) => cm.tn += 1,
                (false, true) => cm.fp += 1,
                (true, false) => cm.fn_ += 1,
            }
        }
        cm
    }

    pub fn total(&self) -> usize {
        self.tp + self.tn + self.fp + self.fn_
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub confusion: ConfusionMatrix,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    /// `None` when only one class is present.
    pub roc_auc: Option<f64>,
}

fn ratio(num: usize, denom: usize) -> f64 {
    if denom == 0 {
        0.0
    } else {
        num as f64 / denom as f64
    }
}

impl ClassificationMetrics {
    pub fn calculate(y_true: &[u8], y_proba: &[f64]) -> Self {
        let y_pred: Vec<u8> = y_proba.iter().map(|&p| u8::from(p >= 0.5)).collect();
        let cm = ConfusionMatrix::from_predictions(y_true, &y_pred);
        Self {
            confusion: cm,
            accuracy: ratio(cm.tp + cm.tn, cm.total()),
            precision: ratio(cm.tp, cm.tp + cm.fp),
            recall: ratio(cm.tp, cm.tp + cm.fn_),
            roc_auc: roc_auc(y_true, y_proba),
        }
    }

    pub fn render(&self) -> String {
        let auc = self
            .roc_auc
            .map_or_else(|| "n/a".to_string(), |a| format!("{a:.4}"));
        format!(
            "accuracy {:.4}  precision {:.4}  recall {:.4}  roc_auc {}\n\
             confusion  TN {:>6}  FP {:>6}\n           FN {:>6}  TP {:>6}",
            self.accuracy,
            self.precision,
            self.recall,
            auc,
            self.confusion.tn,
            self.confusion.fp,
            self.confusion.fn_,
            self.confusion.tp
        )
    }
}

/// Area under the ROC curve via the rank-sum statistic. Tied scores share
/// their average rank.
pub fn roc_auc(y_true: &[u8], y_proba: &[f64]) -> Option<f64> {
    let n_pos = y_true.iter().filter(|&&y| y == 1).count();
    let n_neg = y_true.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..y_proba.len()).collect();
    order.sort_by(|&a, &b| y_proba[a].total_cmp(&y_proba[b]));

    let mut rank_sum_pos = 0.0;
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && y_proba[order[j + 1]] == y_proba[order[i]] {
            j += 1;
        }
        // ranks are 1-based; i..=j share the average
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for &k in &order[i..=j] {
            if y_true[k] == 1 {
                rank_sum_pos += avg_rank;
            }
        }
        i = j + 1;
    }

    let n_pos = n_pos as f64;
    let n_neg = n_neg as f64;
    Some((rank_sum_pos - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg))
}

/// Fit on `train`, evaluate on `test`.
pub fn train_and_evaluate(
    model: &mut dyn Classifier,
    train: &TrainingSet,
    test: &TrainingSet,
) -> Result<ClassificationMetrics, TrainError> {
    model.fit(train)?;
    let proba = model.predict_proba(&test.features)?;
    Ok(ClassificationMetrics::calculate(&test.labels, &proba))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn rows(values: &[(f64, u8)]) -> Vec<FeatureRow> {
        let base = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, &(x, y))| {
                let mut r = FeatureRow::new("T", base + chrono::Duration::days(i as i64));
                r.values.set(Column::LagReturn1, x);
                r.values.set(Column::Close, 0.5);
                r.label = Some(y);
                r
            })
            .collect()
    }

    #[test]
    fn training_set_excludes_label_and_ids() {
        let set = TrainingSet::from_rows(&rows(&[(0.1, 1), (0.9, 0)]), &[Column::Close, Column::LagReturn1])
            .unwrap();
        assert_eq!(set.features, vec![vec![0.5, 0.1], vec![0.5, 0.9]]);
        assert_eq!(set.labels, vec![1, 0]);
    }

    #[test]
    fn unlabeled_row_is_rejected() {
        let mut r = rows(&[(0.1, 1), (0.2, 0)]);
        r[1].label = None;
        assert_eq!(
            TrainingSet::from_rows(&r, &[Column::Close]),
            Err(TrainError::MissingLabel { row: 1 })
        );
    }

    #[test]
    fn scale_pos_weight_is_neg_over_pos() {
        let set = TrainingSet::from_rows(&rows(&[(0.0, 1), (0.0, 0), (0.0, 0), (0.0, 0)]), &[Column::Close])
            .unwrap();
        assert_eq!(set.scale_pos_weight(), 3.0);
    }

    #[test]
    fn auc_handles_perfect_random_and_ties() {
        assert_eq!(roc_auc(&[0, 0, 1, 1], &[0.1, 0.2, 0.8, 0.9]), Some(1.0));
        assert_eq!(roc_auc(&[1, 1, 0, 0], &[0.1, 0.2, 0.8, 0.9]), Some(0.0));
        assert_eq!(roc_auc(&[0, 1, 0, 1], &[0.5, 0.5, 0.5, 0.5]), Some(0.5));
        assert_eq!(roc_auc(&[1, 1], &[0.1, 0.2]), None);
    }

    #[test]
    fn metrics_from_probabilities() {
        let m = ClassificationMetrics::calculate(&[1, 1, 0, 0], &[0.9, 0.4, 0.6, 0.1]);
        assert_eq!(
            m.confusion,
            ConfusionMatrix {
                tp: 1,
                tn: 1,
                fp: 1,
                fn_: 1
            }
        );
        assert_eq!(m.accuracy, 0.5);
        assert_eq!(m.precision, 0.5);
        assert_eq!(m.recall, 0.5);
        assert_eq!(m.roc_auc, Some(0.75));
    }

    #[test]
    fn majority_class_predicts_base_rate() {
        let set = TrainingSet::from_rows(&rows(&[(0.0, 1), (0.0, 1), (0.0, 0)]), &[Column::Close])
            .unwrap();
        let mut model = MajorityClass::new();
        assert_eq!(model.predict_proba(&set.features), Err(TrainError::NotFitted));
        model.fit(&set).unwrap();
        assert_eq!(model.predict(&set.features).unwrap(), vec![1, 1, 1]);
    }

    #[test]
    fn unlabelled_rows_report_missing_target() {
        let mut unlabelled = rows(&[(0.1, 0), (0.2, 1)]);
        for r in &mut unlabelled {
            r.label = None;
        }
        assert_eq!(
            TrainingSet::from_rows(&unlabelled, &[Column::Close]),
            Err(TrainError::Schema(SchemaError::MissingTarget(
                LABEL_COLUMN.to_string()
            )))
        );

        // a single gap in a labelled set is still a per-row error
        let mut partial = rows(&[(0.1, 0), (0.2, 1)]);
        partial[1].label = None;
        assert_eq!(
            TrainingSet::from_rows(&partial, &[Column::Close]),
            Err(TrainError::MissingLabel { row: 1 })
        );
    }
}
