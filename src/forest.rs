//! Bagged ensemble of CART trees voting by averaged class probability.

use log::{debug, info};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_SEED;
use crate::error::FitError;
use crate::tree::{DecisionTree, TreeParams};

const N_CLASSES: usize = 2;

/// Hyperparameters of the forest.
///
/// `n_trees` and `max_depth` come from the caller; candidate features per
/// split default to `ceil(sqrt(n_features))`.
#[derive(Debug, Clone, PartialEq)]
pub struct RandomForestConfig {
    n_trees: usize,
    max_depth: usize,
    min_samples_split: usize,
    seed: u64,
}

impl RandomForestConfig {
    pub fn new(n_trees: usize, max_depth: usize) -> Result<Self, FitError> {
        if n_trees == 0 {
            return Err(FitError::InvalidTreeCount { n_trees });
        }
        if max_depth == 0 {
            return Err(FitError::InvalidMaxDepth { max_depth });
        }
        Ok(RandomForestConfig {
            n_trees,
            max_depth,
            min_samples_split: 2,
            seed: DEFAULT_SEED,
        })
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn n_trees(&self) -> usize {
        self.n_trees
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Train on a row-major matrix and binary labels.
    pub fn fit(&self, features: &[Vec<f64>], labels: &[usize]) -> Result<RandomForest, FitError> {
        let n_features = validate_matrix(features)?;
        if labels.len() != features.len() {
            return Err(FitError::LengthMismatch {
                features: features.len(),
                target: labels.len(),
            });
        }
        if let Some((row, &label)) = labels.iter().enumerate().find(|(_, &l)| l >= N_CLASSES) {
            return Err(FitError::InvalidLabel {
                row,
                label: label as f64,
            });
        }

        let n_samples = features.len();
        let params = TreeParams {
            max_depth: self.max_depth,
            max_features: ((n_features as f64).sqrt().ceil() as usize).max(1),
            min_samples_split: self.min_samples_split,
            n_classes: N_CLASSES,
        };
        debug!(
            "Growing {} trees on {} samples, {} features, {} candidates per split",
            self.n_trees, n_samples, n_features, params.max_features
        );

        let mut master = ChaCha8Rng::seed_from_u64(self.seed);
        let trees: Vec<DecisionTree> = (0..self.n_trees)
            .map(|_| {
                let mut rng = ChaCha8Rng::seed_from_u64(master.gen());
                let bootstrap: Vec<usize> =
                    (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect();
                DecisionTree::grow(features, labels, bootstrap, params, &mut rng)
            })
            .collect();

        debug!(
            "Forest holds {} nodes in total",
            trees.iter().map(DecisionTree::node_count).sum::<usize>()
        );
        info!("Random forest model with {} trees built successfully", self.n_trees);
        Ok(RandomForest { trees, n_features })
    }
}

/// Check the matrix is non-empty, rectangular and finite; returns its width.
fn validate_matrix(features: &[Vec<f64>]) -> Result<usize, FitError> {
    let n_features = features.first().ok_or(FitError::EmptyDataset)?.len();
    for (row, values) in features.iter().enumerate() {
        if values.len() != n_features {
            return Err(FitError::RaggedRow {
                row,
                expected: n_features,
                got: values.len(),
            });
        }
        if let Some(feature) = values.iter().position(|v| !v.is_finite()) {
            return Err(FitError::NonFiniteValue { row, feature });
        }
    }
    Ok(n_features)
}

/// A fitted forest. Immutable once trained.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    n_features: usize,
}

impl RandomForest {
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    fn check_input(&self, rows: &[Vec<f64>]) -> Result<(), FitError> {
        for (row, values) in rows.iter().enumerate() {
            if values.len() != self.n_features {
                return Err(FitError::RaggedRow {
                    row,
                    expected: self.n_features,
                    got: values.len(),
                });
            }
            if let Some(feature) = values.iter().position(|v| !v.is_finite()) {
                return Err(FitError::NonFiniteValue { row, feature });
            }
        }
        Ok(())
    }

    fn class_proba(&self, row: &[f64]) -> [f64; N_CLASSES] {
        let mut sum = [0.0; N_CLASSES];
        for tree in &self.trees {
            for (acc, p) in sum.iter_mut().zip(tree.leaf_proba(row)) {
                *acc += p;
            }
        }
        let n = self.trees.len() as f64;
        sum.map(|s| s / n)
    }

    /// Positive-class probability of every row.
    pub fn predict_proba(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>, FitError> {
        self.check_input(rows)?;
        Ok(rows.iter().map(|r| self.class_proba(r)[1]).collect())
    }

    /// Most probable class of every row; ties go to class 0.
    pub fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<usize>, FitError> {
        self.check_input(rows)?;
        Ok(rows
            .iter()
            .map(|r| {
                let p = self.class_proba(r);
                usize::from(p[1] > p[0])
            })
            .collect())
    }

    /// Mean decrease in impurity per feature, summing to 1 unless every tree
    /// is a single leaf.
    pub fn feature_importances(&self) -> Vec<f64> {
        let grown: Vec<Vec<f64>> = self
            .trees
            .iter()
            .filter(|t| !t.is_stump())
            .map(DecisionTree::feature_importances)
            .collect();
        let mut totals = vec![0.0; self.n_features];
        if grown.is_empty() {
            return totals;
        }
        for importances in &grown {
            for (t, v) in totals.iter_mut().zip(importances) {
                *t += v;
            }
        }
        let sum: f64 = totals.iter().sum();
        if sum > 0.0 {
            totals.iter_mut().for_each(|v| *v /= sum);
        }
        totals
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Class follows the first feature; the second is noise.
    fn separable() -> (Vec<Vec<f64>>, Vec<usize>) {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..30 {
            let noise = ((i * 7) % 11) as f64;
            x.push(vec![i as f64 * 0.1, noise]);
            y.push(0);
            x.push(vec![10.0 + i as f64 * 0.1, noise]);
            y.push(1);
        }
        (x, y)
    }

    #[test]
    fn learns_separable_classes() {
        let (x, y) = separable();
        let forest = RandomForestConfig::new(25, 3).unwrap().fit(&x, &y).unwrap();
        let predicted = forest.predict(&x).unwrap();
        let correct = predicted.iter().zip(&y).filter(|(p, t)| p == t).count();
        assert!(correct as f64 / y.len() as f64 > 0.95, "correct = {}", correct);

        let proba = forest.predict_proba(&[vec![0.5, 3.0], vec![12.0, 3.0]]).unwrap();
        assert!(proba[0] < 0.5 && proba[1] > 0.5, "proba = {:?}", proba);
    }

    #[test]
    fn same_seed_same_forest() {
        let (x, y) = separable();
        let a = RandomForestConfig::new(10, 4).unwrap().with_seed(99).fit(&x, &y).unwrap();
        let b = RandomForestConfig::new(10, 4).unwrap().with_seed(99).fit(&x, &y).unwrap();
        assert_eq!(a.predict_proba(&x).unwrap(), b.predict_proba(&x).unwrap());
        assert_eq!(a.feature_importances(), b.feature_importances());
    }

    #[test]
    fn informative_feature_dominates_importance() {
        let (x, y) = separable();
        let forest = RandomForestConfig::new(20, 3).unwrap().fit(&x, &y).unwrap();
        let importances = forest.feature_importances();
        let total: f64 = importances.iter().sum();
        assert!((total - 1.0).abs() < 1e-10, "total = {}", total);
        assert!(importances[0] > importances[1]);
    }

    #[test]
    fn probabilities_stay_in_unit_interval() {
        let (x, y) = separable();
        let forest = RandomForestConfig::new(5, 2).unwrap().fit(&x, &y).unwrap();
        for p in forest.predict_proba(&x).unwrap() {
            assert!((0.0..=1.0).contains(&p));
        }
    }

    #[test]
    fn invalid_hyperparameters() {
        assert_eq!(
            RandomForestConfig::new(0, 3),
            Err(FitError::InvalidTreeCount { n_trees: 0 })
        );
        assert_eq!(
            RandomForestConfig::new(10, 0),
            Err(FitError::InvalidMaxDepth { max_depth: 0 })
        );
    }

    #[test]
    fn rejects_bad_training_data() {
        let config = RandomForestConfig::new(3, 2).unwrap();
        assert!(matches!(config.fit(&[], &[]), Err(FitError::EmptyDataset)));
        assert!(matches!(
            config.fit(&[vec![1.0], vec![f64::NAN]], &[0, 1]),
            Err(FitError::NonFiniteValue { row: 1, feature: 0 })
        ));
        assert!(matches!(
            config.fit(&[vec![1.0], vec![2.0]], &[0, 2]),
            Err(FitError::InvalidLabel { row: 1, .. })
        ));
    }

    #[test]
    fn prediction_checks_feature_count() {
        let (x, y) = separable();
        let forest = RandomForestConfig::new(3, 2).unwrap().fit(&x, &y).unwrap();
        assert!(matches!(
            forest.predict(&[vec![1.0]]),
            Err(FitError::RaggedRow { expected: 2, got: 1, .. })
        ));
    }
}
