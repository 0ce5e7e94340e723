//! Holdout predictions and the metrics derived from them.

use std::fmt;

use log::info;
use serde::Serialize;
use smartcore::metrics::{accuracy as accuracy_score, roc_auc_score};

use crate::error::FitError;
use crate::forest::RandomForest;

/// Positive-class probability and predicted label per row.
#[derive(Debug, Clone, PartialEq)]
pub struct Predictions {
    pub proba: Vec<f64>,
    pub labels: Vec<usize>,
}

pub fn predict(forest: &RandomForest, rows: &[Vec<f64>]) -> Result<Predictions, FitError> {
    Ok(Predictions {
        proba: forest.predict_proba(rows)?,
        labels: forest.predict(rows)?,
    })
}

/// Binary confusion matrix, `counts[true][predicted]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConfusionMatrix {
    counts: [[usize; 2]; 2],
}

impl ConfusionMatrix {
    pub fn from_labels(y_true: &[usize], y_pred: &[usize]) -> Self {
        let mut counts = [[0; 2]; 2];
        for (&t, &p) in y_true.iter().zip(y_pred) {
            counts[t.min(1)][p.min(1)] += 1;
        }
        ConfusionMatrix { counts }
    }

    pub fn true_negatives(&self) -> usize {
        self.counts[0][0]
    }

    pub fn false_positives(&self) -> usize {
        self.counts[0][1]
    }

    pub fn false_negatives(&self) -> usize {
        self.counts[1][0]
    }

    pub fn true_positives(&self) -> usize {
        self.counts[1][1]
    }

    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .counts
            .iter()
            .flatten()
            .map(|c| c.to_string().len())
            .max()
            .unwrap_or(1);
        let [a, b] = self.counts;
        write!(
            f,
            "[[{:>w$} {:>w$}]\n [{:>w$} {:>w$}]]",
            a[0],
            a[1],
            b[0],
            b[1],
            w = width
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Per-class precision/recall/F1 with accuracy and averages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationReport {
    pub classes: [ClassMetrics; 2],
    pub accuracy: f64,
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,
}

impl ClassificationReport {
    pub fn from_confusion(confusion: &ConfusionMatrix) -> Self {
        let c = confusion.counts;
        let class = |k: usize| {
            let other = 1 - k;
            let tp = c[k][k];
            let precision = ratio(tp, tp + c[other][k]);
            let recall = ratio(tp, tp + c[k][other]);
            let f1 = if precision + recall == 0.0 {
                0.0
            } else {
                2.0 * precision * recall / (precision + recall)
            };
            ClassMetrics {
                precision,
                recall,
                f1,
                support: tp + c[k][other],
            }
        };
        let classes = [class(0), class(1)];
        let total = confusion.total();

        let macro_avg = ClassMetrics {
            precision: (classes[0].precision + classes[1].precision) / 2.0,
            recall: (classes[0].recall + classes[1].recall) / 2.0,
            f1: (classes[0].f1 + classes[1].f1) / 2.0,
            support: total,
        };
        let weight = |get: fn(&ClassMetrics) -> f64| {
            classes
                .iter()
                .map(|m| get(m) * m.support as f64)
                .sum::<f64>()
                / total.max(1) as f64
        };
        let weighted_avg = ClassMetrics {
            precision: weight(|m| m.precision),
            recall: weight(|m| m.recall),
            f1: weight(|m| m.f1),
            support: total,
        };

        ClassificationReport {
            classes,
            accuracy: ratio(
                confusion.true_negatives() + confusion.true_positives(),
                total,
            ),
            macro_avg,
            weighted_avg,
        }
    }
}

fn write_row(f: &mut fmt::Formatter<'_>, name: &str, m: &ClassMetrics) -> fmt::Result {
    writeln!(
        f,
        "{:>12}  {:>9.2} {:>9.2} {:>9.2} {:>9}",
        name, m.precision, m.recall, m.f1, m.support
    )
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>12}  {:>9} {:>9} {:>9} {:>9}\n",
            "", "precision", "recall", "f1-score", "support"
        )?;
        for (label, metrics) in self.classes.iter().enumerate() {
            write_row(f, &label.to_string(), metrics)?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>12}  {:>9} {:>9} {:>9.2} {:>9}",
            "accuracy", "", "", self.accuracy, self.macro_avg.support
        )?;
        write_row(f, "macro avg", &self.macro_avg)?;
        write_row(f, "weighted avg", &self.weighted_avg)
    }
}

/// Holdout evaluation of a trained classifier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metrics {
    pub auc: f64,
    pub confusion: ConfusionMatrix,
    pub accuracy: f64,
    pub report: ClassificationReport,
}

impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Area under the curve\n{}\n", self.auc)?;
        writeln!(f, "Confusion matrix\n{}\n", self.confusion)?;
        writeln!(f, "Accuracy\n{}\n", self.accuracy)?;
        write!(f, "Classification report\n{}", self.report)
    }
}

/// AUC, confusion matrix, accuracy and per-class report for a holdout set.
pub fn evaluate(y_true: &[usize], predictions: &Predictions) -> Result<Metrics, FitError> {
    if y_true.len() != predictions.labels.len() || y_true.len() != predictions.proba.len() {
        return Err(FitError::LengthMismatch {
            features: predictions.labels.len(),
            target: y_true.len(),
        });
    }
    if y_true.is_empty() {
        return Err(FitError::EmptyDataset);
    }
    if let Some((row, &label)) = y_true.iter().enumerate().find(|(_, &l)| l > 1) {
        return Err(FitError::InvalidLabel {
            row,
            label: label as f64,
        });
    }
    let positives = y_true.iter().filter(|&&l| l == 1).count();
    if positives == 0 || positives == y_true.len() {
        return Err(FitError::SingleClass);
    }

    // roc_auc_score groups tied ranks by neighbouring input positions, so
    // hand it the pairs in ascending probability order.
    let mut ranked: Vec<(f64, f64)> = y_true
        .iter()
        .zip(&predictions.proba)
        .map(|(&l, &p)| (l as f64, p))
        .collect();
    ranked.sort_by(|a, b| a.1.total_cmp(&b.1));
    let (truth, proba): (Vec<f64>, Vec<f64>) = ranked.into_iter().unzip();
    let auc = roc_auc_score(&truth, &proba);

    let truth_labels: Vec<i32> = y_true.iter().map(|&l| l as i32).collect();
    let predicted_labels: Vec<i32> = predictions.labels.iter().map(|&l| l as i32).collect();
    let accuracy = accuracy_score(&truth_labels, &predicted_labels);

    let confusion = ConfusionMatrix::from_labels(y_true, &predictions.labels);
    let report = ClassificationReport::from_confusion(&confusion);

    info!("Computed accuracy metrics: auc={:.4}, accuracy={:.4}", auc, accuracy);
    Ok(Metrics {
        auc,
        confusion,
        accuracy,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forest::RandomForestConfig;

    #[test]
    fn separable_holdout_scores_perfectly() {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..40 {
            x.push(vec![i as f64 * 0.05, (i % 5) as f64]);
            y.push(0);
            x.push(vec![20.0 + i as f64 * 0.05, (i % 5) as f64]);
            y.push(1);
        }
        let forest = RandomForestConfig::new(15, 3).unwrap().fit(&x, &y).unwrap();

        let holdout = vec![
            vec![0.3, 1.0],
            vec![21.0, 2.0],
            vec![1.2, 4.0],
            vec![22.5, 0.0],
        ];
        let truth = vec![0, 1, 0, 1];
        let predictions = predict(&forest, &holdout).unwrap();
        let metrics = evaluate(&truth, &predictions).unwrap();

        assert_eq!(metrics.auc, 1.0);
        assert_eq!(metrics.accuracy, 1.0);
        assert_eq!(metrics.confusion.true_positives(), 2);
        assert_eq!(metrics.confusion.true_negatives(), 2);
    }

    #[test]
    fn metrics_from_known_predictions() {
        let truth = vec![0, 0, 1, 1, 1];
        let predictions = Predictions {
            proba: vec![0.1, 0.6, 0.4, 0.8, 0.9],
            labels: vec![0, 1, 0, 1, 1],
        };
        let metrics = evaluate(&truth, &predictions).unwrap();

        assert_eq!(metrics.confusion.true_negatives(), 1);
        assert_eq!(metrics.confusion.false_positives(), 1);
        assert_eq!(metrics.confusion.false_negatives(), 1);
        assert_eq!(metrics.confusion.true_positives(), 2);
        assert!((metrics.accuracy - 0.6).abs() < 1e-12);
        // 5 of 6 positive/negative pairs are ranked correctly
        assert!((metrics.auc - 5.0 / 6.0).abs() < 1e-12);

        let class1 = metrics.report.classes[1];
        assert!((class1.precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((class1.recall - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(class1.support, 3);
        assert_eq!(metrics.report.macro_avg.support, 5);
    }

    #[test]
    fn tied_probabilities_share_their_rank() {
        let predictions = Predictions {
            proba: vec![0.5, 0.9, 0.5],
            labels: vec![0, 1, 0],
        };
        let metrics = evaluate(&[1, 0, 0], &predictions).unwrap();
        assert!((metrics.auc - 0.25).abs() < 1e-12, "auc = {}", metrics.auc);

        // few distinct values, as a shallow forest produces
        let predictions = Predictions {
            proba: vec![0.7, 0.3, 0.3, 0.7, 0.7, 0.3],
            labels: vec![1, 0, 0, 1, 1, 0],
        };
        let metrics = evaluate(&[1, 0, 1, 0, 1, 0], &predictions).unwrap();
        assert!((metrics.auc - 2.0 / 3.0).abs() < 1e-12, "auc = {}", metrics.auc);
    }

    #[test]
    fn single_class_holdout_is_rejected() {
        let predictions = Predictions {
            proba: vec![0.2, 0.7],
            labels: vec![0, 1],
        };
        assert_eq!(evaluate(&[1, 1], &predictions), Err(FitError::SingleClass));
    }

    #[test]
    fn confusion_matrix_prints_like_an_array() {
        let confusion = ConfusionMatrix::from_labels(&[0, 0, 1, 1, 1], &[0, 1, 0, 1, 1]);
        assert_eq!(confusion.to_string(), "[[1 1]\n [1 2]]");
    }

    #[test]
    fn report_lists_both_classes_and_averages() {
        let confusion = ConfusionMatrix::from_labels(&[0, 1, 1, 0], &[0, 1, 0, 0]);
        let text = ClassificationReport::from_confusion(&confusion).to_string();
        assert!(text.contains("precision"));
        assert!(text.contains("accuracy"));
        assert!(text.contains("macro avg"));
        assert!(text.contains("weighted avg"));
        assert_eq!(text.lines().filter(|l| !l.trim().is_empty()).count(), 6);
    }
}
