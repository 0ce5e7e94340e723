//! CART decision tree grown on a bootstrap sample, Gini criterion.

use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) enum Node {
    Leaf {
        /// Class distribution of the training samples that reached the leaf.
        proba: Vec<f64>,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct TreeParams {
    pub max_depth: usize,
    pub max_features: usize,
    pub min_samples_split: usize,
    pub n_classes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
    /// Unnormalized weighted impurity decrease per feature.
    impurity_decrease: Vec<f64>,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

fn gini(counts: &[f64], total: f64) -> f64 {
    if total == 0.0 {
        return 0.0;
    }
    1.0 - counts.iter().map(|c| (c / total).powi(2)).sum::<f64>()
}

struct Builder<'a> {
    x: &'a [Vec<f64>],
    y: &'a [usize],
    params: TreeParams,
    rng: &'a mut ChaCha8Rng,
    nodes: Vec<Node>,
    impurity_decrease: Vec<f64>,
}

impl<'a> Builder<'a> {
    fn class_counts(&self, samples: &[usize]) -> Vec<f64> {
        let mut counts = vec![0.0; self.params.n_classes];
        for &i in samples {
            counts[self.y[i]] += 1.0;
        }
        counts
    }

    fn leaf(&mut self, counts: &[f64], total: f64) -> usize {
        let proba = counts.iter().map(|c| c / total).collect();
        self.nodes.push(Node::Leaf { proba });
        self.nodes.len() - 1
    }

    fn best_split_on(&self, samples: &[usize], feature: usize, total: f64) -> Option<BestSplit> {
        let mut order: Vec<usize> = samples.to_vec();
        order.sort_by(|&a, &b| self.x[a][feature].total_cmp(&self.x[b][feature]));

        let mut left = vec![0.0; self.params.n_classes];
        let mut right = self.class_counts(samples);
        let mut best: Option<BestSplit> = None;

        for k in 0..order.len() - 1 {
            let label = self.y[order[k]];
            left[label] += 1.0;
            right[label] -= 1.0;

            let here = self.x[order[k]][feature];
            let next = self.x[order[k + 1]][feature];
            if here >= next {
                continue;
            }
            let n_left = (k + 1) as f64;
            let n_right = total - n_left;
            let impurity = (n_left * gini(&left, n_left) + n_right * gini(&right, n_right)) / total;
            if best.as_ref().map_or(true, |b| impurity < b.impurity) {
                let mut threshold = here + (next - here) / 2.0;
                if threshold >= next {
                    threshold = here;
                }
                best = Some(BestSplit {
                    feature,
                    threshold,
                    impurity,
                });
            }
        }
        best
    }

    /// Draw features at random until `max_features` were inspected and at least
    /// one of them admits a split.
    fn find_split(&mut self, samples: &[usize], total: f64) -> Option<BestSplit> {
        let n_features = self.x[samples[0]].len();
        let mut features: Vec<usize> = (0..n_features).collect();
        features.shuffle(&mut *self.rng);

        let mut best: Option<BestSplit> = None;
        for (visited, &feature) in features.iter().enumerate() {
            if visited >= self.params.max_features && best.is_some() {
                break;
            }
            if let Some(candidate) = self.best_split_on(samples, feature, total) {
                if best.as_ref().map_or(true, |b| candidate.impurity < b.impurity) {
                    best = Some(candidate);
                }
            }
        }
        best
    }

    fn build(&mut self, samples: &mut [usize], depth: usize) -> usize {
        let counts = self.class_counts(samples);
        let total = samples.len() as f64;
        let node_impurity = gini(&counts, total);

        if depth >= self.params.max_depth
            || samples.len() < self.params.min_samples_split
            || node_impurity == 0.0
        {
            return self.leaf(&counts, total);
        }

        let Some(split) = self.find_split(samples, total) else {
            return self.leaf(&counts, total);
        };

        let feature = split.feature;
        let threshold = split.threshold;
        samples.sort_by_key(|&i| self.x[i][feature] > threshold);
        let n_left = samples.iter().filter(|&&i| self.x[i][feature] <= threshold).count();

        self.impurity_decrease[feature] += total * (node_impurity - split.impurity);

        let index = self.nodes.len();
        self.nodes.push(Node::Leaf { proba: Vec::new() });
        let (left_samples, right_samples) = samples.split_at_mut(n_left);
        let left = self.build(left_samples, depth + 1);
        let right = self.build(right_samples, depth + 1);
        self.nodes[index] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        index
    }
}

impl DecisionTree {
    /// Grow a tree on `samples`, a bootstrap list of row indices into `x`/`y`.
    pub(crate) fn grow(
        x: &[Vec<f64>],
        y: &[usize],
        mut samples: Vec<usize>,
        params: TreeParams,
        rng: &mut ChaCha8Rng,
    ) -> DecisionTree {
        let n_features = x.first().map_or(0, Vec::len);
        let mut builder = Builder {
            x,
            y,
            params,
            rng,
            nodes: Vec::new(),
            impurity_decrease: vec![0.0; n_features],
        };
        builder.build(&mut samples, 0);
        DecisionTree {
            nodes: builder.nodes,
            impurity_decrease: builder.impurity_decrease,
        }
    }

    /// Class distribution of the leaf `row` falls into.
    pub(crate) fn leaf_proba(&self, row: &[f64]) -> &[f64] {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf { proba } => return proba,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    pub(crate) fn is_stump(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Impurity decrease per feature, normalized to sum to 1.
    pub(crate) fn feature_importances(&self) -> Vec<f64> {
        let total: f64 = self.impurity_decrease.iter().sum();
        if total <= 0.0 {
            return vec![0.0; self.impurity_decrease.len()];
        }
        self.impurity_decrease.iter().map(|v| v / total).collect()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;

    fn params(max_depth: usize) -> TreeParams {
        TreeParams {
            max_depth,
            max_features: 2,
            min_samples_split: 2,
            n_classes: 2,
        }
    }

    #[test]
    fn single_threshold_separates_classes() {
        let x = vec![vec![1.0, 5.0], vec![2.0, 5.0], vec![8.0, 5.0], vec![9.0, 5.0]];
        let y = vec![0, 0, 1, 1];
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let tree = DecisionTree::grow(&x, &y, vec![0, 1, 2, 3], params(3), &mut rng);

        assert_eq!(tree.node_count(), 3);
        assert_eq!(tree.leaf_proba(&[1.5, 0.0]), &[1.0, 0.0]);
        assert_eq!(tree.leaf_proba(&[8.5, 0.0]), &[0.0, 1.0]);
        // threshold sits midway between 2 and 8
        assert_eq!(tree.leaf_proba(&[5.0, 0.0]), &[1.0, 0.0]);
        assert_eq!(tree.feature_importances(), vec![1.0, 0.0]);
    }

    #[test]
    fn depth_limit_yields_mixed_leaf() {
        let x = vec![vec![1.0], vec![2.0], vec![3.0], vec![4.0]];
        let y = vec![0, 1, 0, 1];
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let tree = DecisionTree::grow(&x, &y, vec![0, 1, 2, 3], params(1), &mut rng);
        let p = tree.leaf_proba(&[4.0]);
        assert!((p[0] + p[1] - 1.0).abs() < 1e-12);
        assert!(tree.node_count() <= 3);
    }

    #[test]
    fn pure_sample_is_a_stump() {
        let x = vec![vec![1.0], vec![2.0]];
        let y = vec![1, 1];
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let tree = DecisionTree::grow(&x, &y, vec![0, 1], params(3), &mut rng);
        assert!(tree.is_stump());
        assert_eq!(tree.feature_importances(), vec![0.0]);
    }
}
