use serde::{Deserialize, Serialize};

use crate::error::FitError;

/// Per-feature z-score standardization learned from a training matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl StandardScaler {
    /// Learn mean and population standard deviation of every column.
    pub fn fit(rows: &[Vec<f64>]) -> Result<Self, FitError> {
        let first = rows.first().ok_or(FitError::EmptyDataset)?;
        let n_features = first.len();
        let n = rows.len() as f64;

        let mut mean = vec![0.0; n_features];
        for (row_idx, row) in rows.iter().enumerate() {
            if row.len() != n_features {
                return Err(FitError::RaggedRow {
                    row: row_idx,
                    expected: n_features,
                    got: row.len(),
                });
            }
            for (j, &v) in row.iter().enumerate() {
                if !v.is_finite() {
                    return Err(FitError::NonFiniteValue {
                        row: row_idx,
                        feature: j,
                    });
                }
                mean[j] += v;
            }
        }
        mean.iter_mut().for_each(|m| *m /= n);

        let mut variance = vec![0.0; n_features];
        for row in rows {
            for (j, &v) in row.iter().enumerate() {
                variance[j] += (v - mean[j]).powi(2);
            }
        }

        let mut scale = Vec::with_capacity(n_features);
        for (feature, var) in variance.into_iter().enumerate() {
            let std = (var / n).sqrt();
            if std <= f64::EPSILON * mean[feature].abs().max(1.0) {
                return Err(FitError::DegenerateFeature { feature });
            }
            scale.push(std);
        }

        Ok(StandardScaler { mean, scale })
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, FitError> {
        rows.iter()
            .enumerate()
            .map(|(row_idx, row)| {
                if row.len() != self.mean.len() {
                    return Err(FitError::RaggedRow {
                        row: row_idx,
                        expected: self.mean.len(),
                        got: row.len(),
                    });
                }
                Ok(row
                    .iter()
                    .zip(self.mean.iter().zip(&self.scale))
                    .map(|(v, (m, s))| (v - m) / s)
                    .collect())
            })
            .collect()
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn scale(&self) -> &[f64] {
        &self.scale
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn learns_mean_and_population_std() {
        let train = vec![vec![1.0, 10.0], vec![3.0, 10.0], vec![5.0, 40.0]];
        let scaler = StandardScaler::fit(&train).unwrap();
        assert_eq!(scaler.mean(), &[3.0, 20.0]);
        let expected_std = (8.0f64 / 3.0).sqrt();
        assert!((scaler.scale()[0] - expected_std).abs() < 1e-12);

        let scaled = scaler.transform(&train).unwrap();
        let col_mean: f64 = scaled.iter().map(|r| r[0]).sum::<f64>() / 3.0;
        assert!(col_mean.abs() < 1e-12);
    }

    #[test]
    fn holdout_values_do_not_move_the_fit() {
        let train = vec![vec![1.0, 2.0], vec![2.0, 4.0], vec![4.0, 9.0]];
        let scaler = StandardScaler::fit(&train).unwrap();

        let holdout_a = vec![vec![0.0, 0.0]];
        let holdout_b = vec![vec![1000.0, -50.0]];
        scaler.transform(&holdout_a).unwrap();
        scaler.transform(&holdout_b).unwrap();

        assert_eq!(scaler, StandardScaler::fit(&train).unwrap());
        let t = scaler.transform(&holdout_b).unwrap();
        assert!((t[0][0] - (1000.0 - scaler.mean()[0]) / scaler.scale()[0]).abs() < 1e-9);
    }

    #[test]
    fn constant_column_cannot_be_fit() {
        let train = vec![vec![1.0, 7.0], vec![2.0, 7.0]];
        assert_eq!(
            StandardScaler::fit(&train),
            Err(FitError::DegenerateFeature { feature: 1 })
        );
    }

    #[test]
    fn empty_and_ragged_inputs_fail() {
        assert_eq!(StandardScaler::fit(&[]), Err(FitError::EmptyDataset));
        let ragged = vec![vec![1.0, 2.0], vec![3.0]];
        assert!(matches!(
            StandardScaler::fit(&ragged),
            Err(FitError::RaggedRow { row: 1, .. })
        ));
        let scaler = StandardScaler::fit(&[vec![1.0], vec![2.0]]).unwrap();
        assert!(scaler.transform(&[vec![1.0, 2.0]]).is_err());
    }
}
