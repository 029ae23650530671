//! Gradient-boosted regression trees with logistic loss.
//!
//! Each stage fits a depth-limited regression tree to the residuals
//! `y - p` by squared-error variance reduction, then sets leaf values with a
//! single Newton step `sum(r) / sum(p(1-p))`. Split search is exhaustive and
//! tie-breaks by feature index, so fitting is fully deterministic.

use serde::{Deserialize, Serialize};

use super::ModelError;
use crate::pipeline::features::FEATURE_COUNT;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_leaf: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

/// Flat node arena, root at index 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    pub nodes: Vec<TreeNode>,
}

impl RegressionTree {
    pub fn predict(&self, x: &[f64; FEATURE_COUNT]) -> f64 {
        let mut idx = 0;
        // Bounded by node count so a malformed cycle cannot spin forever.
        for _ in 0..self.nodes.len() {
            match &self.nodes[idx] {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if x[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
        0.0
    }

    fn validate(&self) -> Result<(), ModelError> {
        if self.nodes.is_empty() {
            return Err(ModelError::Corrupt("tree has no nodes".into()));
        }
        for (i, node) in self.nodes.iter().enumerate() {
            match node {
                TreeNode::Leaf { value } if !value.is_finite() => {
                    return Err(ModelError::Corrupt(format!("node {i} has non-finite value")));
                }
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if *feature >= FEATURE_COUNT
                        || !threshold.is_finite()
                        || *left <= i
                        || *right <= i
                        || *left >= self.nodes.len()
                        || *right >= self.nodes.len()
                    {
                        return Err(ModelError::Corrupt(format!("node {i} is malformed")));
                    }
                }
                TreeNode::Leaf { .. } => {}
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedClassifier {
    pub hyperparameters: Hyperparameters,
    /// Initial log-odds.
    pub base_score: f64,
    pub trees: Vec<RegressionTree>,
}

impl GradientBoostedClassifier {
    /// A tree-less model that always predicts `probability`.
    pub fn constant(probability: f64) -> Self {
        let p = probability.clamp(1e-12, 1.0 - 1e-12);
        Self {
            hyperparameters: Hyperparameters {
                n_estimators: 0,
                ..Hyperparameters::default()
            },
            base_score: (p / (1.0 - p)).ln(),
            trees: Vec::new(),
        }
    }

    pub fn fit(
        x: &[[f64; FEATURE_COUNT]],
        y: &[f64],
        hyperparameters: Hyperparameters,
    ) -> Result<Self, ModelError> {
        if x.is_empty() || x.len() != y.len() {
            return Err(ModelError::EmptyTrainingSet);
        }

        let positive_rate = (y.iter().sum::<f64>() / y.len() as f64).clamp(1e-6, 1.0 - 1e-6);
        let base_score = (positive_rate / (1.0 - positive_rate)).ln();
        let mut raw = vec![base_score; x.len()];
        let mut trees = Vec::with_capacity(hyperparameters.n_estimators);

        for _ in 0..hyperparameters.n_estimators {
            let probs: Vec<f64> = raw.iter().map(|f| sigmoid(*f)).collect();
            let residuals: Vec<f64> = y.iter().zip(&probs).map(|(t, p)| t - p).collect();
            let hessians: Vec<f64> = probs.iter().map(|p| p * (1.0 - p)).collect();

            let mut builder = TreeBuilder {
                x,
                residuals: &residuals,
                hessians: &hessians,
                params: &hyperparameters,
                nodes: Vec::new(),
            };
            builder.grow((0..x.len()).collect(), 0);
            let tree = RegressionTree {
                nodes: builder.nodes,
            };

            for (f, row) in raw.iter_mut().zip(x) {
                *f += hyperparameters.learning_rate * tree.predict(row);
            }
            trees.push(tree);
        }

        Ok(Self {
            hyperparameters,
            base_score,
            trees,
        })
    }

    /// Probability of the positive (diabetic) class, in [0, 1].
    pub fn predict_proba(&self, x: &[f64; FEATURE_COUNT]) -> f64 {
        let raw = self.base_score
            + self.hyperparameters.learning_rate
                * self.trees.iter().map(|t| t.predict(x)).sum::<f64>();
        sigmoid(raw).clamp(0.0, 1.0)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if !self.base_score.is_finite() || !self.hyperparameters.learning_rate.is_finite() {
            return Err(ModelError::Corrupt("non-finite base score or learning rate".into()));
        }
        self.trees.iter().try_for_each(RegressionTree::validate)
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

struct TreeBuilder<'a> {
    x: &'a [[f64; FEATURE_COUNT]],
    residuals: &'a [f64],
    hessians: &'a [f64],
    params: &'a Hyperparameters,
    nodes: Vec<TreeNode>,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl TreeBuilder<'_> {
    fn grow(&mut self, indices: Vec<usize>, depth: usize) -> usize {
        let id = self.nodes.len();
        self.nodes.push(TreeNode::Leaf { value: 0.0 });

        let split = if depth < self.params.max_depth
            && indices.len() >= 2 * self.params.min_samples_leaf.max(1)
        {
            self.best_split(&indices)
        } else {
            None
        };

        self.nodes[id] = match split {
            None => TreeNode::Leaf {
                value: self.leaf_value(&indices),
            },
            Some(split) => {
                let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
                    .iter()
                    .partition(|&&i| self.x[i][split.feature] <= split.threshold);
                let left = self.grow(left_idx, depth + 1);
                let right = self.grow(right_idx, depth + 1);
                TreeNode::Split {
                    feature: split.feature,
                    threshold: split.threshold,
                    left,
                    right,
                }
            }
        };
        id
    }

    fn leaf_value(&self, indices: &[usize]) -> f64 {
        let num: f64 = indices.iter().map(|&i| self.residuals[i]).sum();
        let den: f64 = indices.iter().map(|&i| self.hessians[i]).sum();
        if den.abs() < 1e-12 {
            0.0
        } else {
            num / den
        }
    }

    fn best_split(&self, indices: &[usize]) -> Option<BestSplit> {
        let n = indices.len();
        let min_leaf = self.params.min_samples_leaf.max(1);
        let total: f64 = indices.iter().map(|&i| self.residuals[i]).sum();
        let parent_score = total * total / n as f64;
        let mut best: Option<BestSplit> = None;

        let mut sorted = indices.to_vec();
        for feature in 0..FEATURE_COUNT {
            sorted.sort_by(|&a, &b| self.x[a][feature].total_cmp(&self.x[b][feature]));

            let mut left_sum = 0.0;
            for k in 1..n {
                left_sum += self.residuals[sorted[k - 1]];
                if k < min_leaf || n - k < min_leaf {
                    continue;
                }
                let lo = self.x[sorted[k - 1]][feature];
                let hi = self.x[sorted[k]][feature];
                if lo == hi {
                    continue;
                }
                let right_sum = total - left_sum;
                let gain = left_sum * left_sum / k as f64
                    + right_sum * right_sum / (n - k) as f64
                    - parent_score;
                if gain > 1e-12 && best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(BestSplit {
                        feature,
                        threshold: lo + (hi - lo) / 2.0,
                        gain,
                    });
                }
            }
        }
        best
    }
}
