use anyhow::{anyhow, Error};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use crate::modules::vocabulary::{Label, Modality};

pub const MODEL_FORMAT_VERSION: u32 = 1;

/// Per-feature standardization fitted at training time: `(x - mean) / scale`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StandardScaler {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<Vec<f32>>,
}

impl StandardScaler {
    /// unfit returns a scaler with no parameters; transforming with it fails.
    pub fn unfit() -> Self {
        StandardScaler { mean: None, scale: None }
    }

    pub fn fitted(mean: Vec<f32>, scale: Vec<f32>) -> Self {
        StandardScaler { mean: Some(mean), scale: Some(scale) }
    }

    pub fn is_fitted(&self) -> bool {
        self.mean.is_some() && self.scale.is_some()
    }

    pub fn n_features(&self) -> Option<usize> {
        self.mean.as_ref().map(Vec::len)
    }

    /// transform standardizes a feature vector. A zero scale is treated as one.
    pub fn transform(&self, features: &Array1<f32>) -> Result<Array1<f32>, Error> {
        let (mean, scale) = match (&self.mean, &self.scale) {
            (Some(mean), Some(scale)) => (mean, scale),
            _ => return Err(Error::msg("scaler is not fitted")),
        };
        if mean.len() != features.len() || scale.len() != features.len() {
            return Err(anyhow!(
                "scaler expects {} features, got {}",
                mean.len(),
                features.len()
            ))
        }

        let mean = Array1::from(mean.clone());
        let scale = Array1::from(scale.clone()).mapv(|s| if s == 0.0 { 1.0 } else { s });
        Ok((features - &mean) / &scale)
    }
}

/// Hyperparameters recorded with the forest. Inference only uses them for
/// validation; they document how the artifact was (or would be) trained.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub random_state: u64,
}

impl ForestParams {
    pub fn new() -> Self {
        ForestParams {
            n_estimators: 100,
            max_depth: 15,
            random_state: 42,
        }
    }
}

impl Default for ForestParams {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TreeNode {
    /// Go `left` when `x[feature] <= threshold`, `right` otherwise.
    Split {
        feature: usize,
        threshold: f32,
        left: usize,
        right: usize,
    },
    /// Per-class sample counts or weights at the leaf.
    Leaf { value: Vec<f32> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DecisionTree {
    pub nodes: Vec<TreeNode>,
}

impl DecisionTree {
    /// validate checks indices and leaf widths. Children must come after
    /// their parent, which rules out cycles.
    fn validate(&self, n_features: usize, n_classes: usize) -> Result<(), Error> {
        if self.nodes.is_empty() {
            return Err(Error::msg("tree has no nodes"))
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            match node {
                TreeNode::Split { feature, threshold, left, right } => {
                    if *feature >= n_features {
                        return Err(anyhow!("node {} splits on feature {} of {}", idx, feature, n_features))
                    }
                    if threshold.is_nan() {
                        return Err(anyhow!("node {} has a NaN threshold", idx))
                    }
                    for child in [left, right] {
                        if *child <= idx || *child >= self.nodes.len() {
                            return Err(anyhow!("node {} has invalid child {}", idx, child))
                        }
                    }
                }
                TreeNode::Leaf { value } => {
                    if value.len() != n_classes {
                        return Err(anyhow!("leaf {} has {} classes, expected {}", idx, value.len(), n_classes))
                    }
                    if value.iter().any(|v| !v.is_finite() || *v < 0.0) {
                        return Err(anyhow!("leaf {} has invalid weights", idx))
                    }
                }
            }
        }
        Ok(())
    }

    /// leaf_distribution walks the tree and returns the normalized class
    /// distribution of the reached leaf.
    fn leaf_distribution(&self, x: &Array1<f32>, n_classes: usize) -> Result<Array1<f32>, Error> {
        let mut idx = 0;
        // Each step moves to a strictly larger index, so this bounds the walk.
        for _ in 0..self.nodes.len() {
            match self.nodes.get(idx) {
                Some(TreeNode::Split { feature, threshold, left, right }) => {
                    let value = x.get(*feature).ok_or_else(|| anyhow!("feature {} out of range", feature))?;
                    idx = if *value <= *threshold { *left } else { *right };
                }
                Some(TreeNode::Leaf { value }) => {
                    let weights = Array1::from(value.clone());
                    let total = weights.sum();
                    if total <= 0.0 {
                        return Ok(Array1::from_elem(n_classes, 1.0 / n_classes as f32))
                    }
                    return Ok(weights / total)
                }
                None => return Err(anyhow!("node {} does not exist", idx)),
            }
        }
        Err(Error::msg("tree walk did not reach a leaf"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    pub params: ForestParams,
    pub n_features: usize,
    #[serde(default)]
    pub trees: Vec<DecisionTree>,
}

impl RandomForest {
    /// untrained returns a forest with default hyperparameters and no trees.
    pub fn untrained(n_features: usize) -> Self {
        RandomForest {
            params: ForestParams::new(),
            n_features,
            trees: Vec::new(),
        }
    }

    pub fn is_trained(&self) -> bool {
        !self.trees.is_empty()
    }

    /// predict_proba averages the leaf class distributions of every tree.
    /// An untrained forest answers with a uniform distribution.
    pub fn predict_proba(&self, x: &Array1<f32>, n_classes: usize) -> Result<Array1<f32>, Error> {
        if n_classes == 0 {
            return Err(Error::msg("forest has no classes"))
        }
        if x.len() != self.n_features {
            return Err(anyhow!("forest expects {} features, got {}", self.n_features, x.len()))
        }
        if self.trees.is_empty() {
            return Ok(Array1::from_elem(n_classes, 1.0 / n_classes as f32))
        }

        let mut total = Array1::<f32>::zeros(n_classes);
        for tree in &self.trees {
            total = total + tree.leaf_distribution(x, n_classes)?;
        }
        Ok(total / self.trees.len() as f32)
    }
}

/// The persisted classifier bundle: class names, fitted scaler and forest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierModel {
    pub format_version: u32,
    pub modality: Modality,
    pub classes: Vec<String>,
    pub scaler: StandardScaler,
    pub forest: RandomForest,
}

impl ClassifierModel {
    /// untrained builds the placeholder used when no artifact is available:
    /// default hyperparameters, no trees, unfit scaler.
    pub fn untrained(modality: Modality) -> Self {
        ClassifierModel {
            format_version: MODEL_FORMAT_VERSION,
            modality,
            classes: default_classes(modality),
            scaler: StandardScaler::unfit(),
            forest: RandomForest::untrained(modality.feature_arity()),
        }
    }

    pub fn is_trained(&self) -> bool {
        self.forest.is_trained() && self.scaler.is_fitted()
    }

    /// labels resolves the class names against the modality's vocabulary.
    pub fn labels(&self) -> Result<Vec<Label>, Error> {
        self.classes
            .iter()
            .map(|name| {
                self.modality
                    .parse_class(name)
                    .ok_or_else(|| anyhow!("unknown {} class {:?}", self.modality, name))
            })
            .collect()
    }

    /// validate checks the bundle against the expected modality before it is
    /// trusted for inference.
    pub fn validate(&self, expected: Modality) -> Result<(), Error> {
        if self.format_version != MODEL_FORMAT_VERSION {
            return Err(anyhow!("unsupported model format version {}", self.format_version))
        }
        if self.modality != expected {
            return Err(anyhow!("artifact is a {} model, expected {}", self.modality, expected))
        }
        let labels = self.labels()?;
        if labels.is_empty() {
            return Err(Error::msg("model has no classes"))
        }

        let arity = expected.feature_arity();
        if self.forest.n_features != arity {
            return Err(anyhow!("forest has {} features, expected {}", self.forest.n_features, arity))
        }
        if !self.scaler.is_fitted() {
            return Err(Error::msg("scaler is not fitted"))
        }
        if self.scaler.n_features() != Some(arity) || self.scaler.scale.as_ref().map(Vec::len) != Some(arity) {
            return Err(anyhow!("scaler does not have {} features", arity))
        }
        if self.forest.trees.is_empty() {
            return Err(Error::msg("forest has no trees"))
        }
        for (idx, tree) in self.forest.trees.iter().enumerate() {
            tree.validate(arity, labels.len())
                .map_err(|e| e.context(format!("tree {}", idx)))?;
        }
        Ok(())
    }

    pub fn predict_proba(&self, features: &Array1<f32>) -> Result<Array1<f32>, Error> {
        let scaled = self.scaler.transform(features)?;
        self.forest.predict_proba(&scaled, self.classes.len())
    }
}

fn default_classes(modality: Modality) -> Vec<String> {
    match modality {
        Modality::Gesture => crate::modules::vocabulary::Gesture::CLASSES
            .iter()
            .map(|g| g.as_str().to_string())
            .collect(),
        Modality::Expression => crate::modules::vocabulary::Expression::CLASSES
            .iter()
            .map(|e| e.as_str().to_string())
            .collect(),
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::modules::forest::*;

    /// stump builds a one-split tree on `feature`: values at or below
    /// `threshold` vote for class `low`, above for class `high`.
    pub fn stump(feature: usize, threshold: f32, low: usize, high: usize, n_classes: usize) -> DecisionTree {
        let mut low_value = vec![0.0; n_classes];
        low_value[low] = 10.0;
        let mut high_value = vec![0.0; n_classes];
        high_value[high] = 10.0;
        DecisionTree {
            nodes: vec![
                TreeNode::Split { feature, threshold, left: 1, right: 2 },
                TreeNode::Leaf { value: low_value },
                TreeNode::Leaf { value: high_value },
            ],
        }
    }

    /// trained_gesture_model votes on the wrist y coordinate (feature 1):
    /// the scaler centres it at 0.5, low wrists are "Hello", high ones "Stop".
    pub fn trained_gesture_model() -> ClassifierModel {
        let arity = Modality::Gesture.feature_arity();
        let mut mean = vec![0.0; arity];
        mean[1] = 0.5;
        let mut model = ClassifierModel::untrained(Modality::Gesture);
        model.scaler = StandardScaler::fitted(mean, vec![1.0; arity]);
        model.forest.trees = vec![
            stump(1, 0.0, 0, 4, 6),
            stump(1, 0.0, 0, 4, 6),
            stump(1, 0.1, 0, 5, 6),
        ];
        model
    }
}
