//! Pre-trained per-cluster regression artifacts: loading and inference

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::Context;
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

/// One node of a regression tree
///
/// Feature values strictly below the threshold descend left.
#[derive(Debug, Clone, Serialize, Deserialize)]
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

/// A single tree of the ensemble, stored as a flat node array rooted at index 0
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionTree {
    pub nodes: Vec<TreeNode>,
}

impl RegressionTree {
    /// Walk the tree for one feature row and return the leaf value
    fn score(&self, row: &ArrayView1<f64>) -> crate::Result<f64> {
        let mut idx = 0usize;
        // A valid descent visits each node at most once
        for _ in 0..=self.nodes.len() {
            match self.nodes.get(idx) {
                Some(TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    idx = if row[*feature] < *threshold {
                        *left
                    } else {
                        *right
                    };
                }
                Some(TreeNode::Leaf { value }) => return Ok(*value),
                None => anyhow::bail!("Tree node index {} out of bounds", idx),
            }
        }
        anyhow::bail!("Tree descent did not reach a leaf (cyclic node references)")
    }
}

/// An opaque serialized regressor for one store cluster
///
/// Artifacts are produced by the external training pipeline and stored as JSON
/// at `<models-dir>/xgb_cluster_<cluster>.json`. The stored `feature_columns`
/// declare the exact feature set and order used at training time, and are
/// validated against the input table before every prediction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterModel {
    /// Cluster label this model was trained for
    pub cluster: i64,
    /// Feature column names in training order
    pub feature_columns: Vec<String>,
    /// Prediction baseline added to every tree's contribution
    pub base_score: f64,
    /// Boosted tree ensemble
    pub trees: Vec<RegressionTree>,
}

impl ClusterModel {
    /// Artifact path for a cluster label under the models directory
    pub fn artifact_path(models_dir: &Path, cluster: i64) -> PathBuf {
        models_dir.join(format!("xgb_cluster_{cluster}.json"))
    }

    /// Load and validate an artifact from disk
    pub fn load(path: &Path) -> crate::Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open model file: {}", path.display()))?;
        let model: ClusterModel = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Malformed model file: {}", path.display()))?;
        model
            .validate()
            .with_context(|| format!("Invalid model file: {}", path.display()))?;
        Ok(model)
    }

    /// Load the artifact for a cluster, or `None` when no artifact file exists
    ///
    /// A missing file means the cluster has no model and is skipped by the
    /// caller; an unreadable or malformed file is a hard error.
    pub fn load_for_cluster(models_dir: &Path, cluster: i64) -> crate::Result<Option<Self>> {
        let path = Self::artifact_path(models_dir, cluster);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(Self::load(&path)?))
    }

    /// Serialize the artifact to disk (used by the training pipeline and tests)
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create model file: {}", path.display()))?;
        serde_json::to_writer_pretty(file, self)
            .with_context(|| format!("Failed to write model file: {}", path.display()))?;
        Ok(())
    }

    /// Map the stored feature schema onto the input table's feature columns
    ///
    /// Errors with the offending column name when the training-time contract
    /// is not satisfied by the input.
    pub fn feature_indices(&self, available: &[String]) -> crate::Result<Vec<usize>> {
        self.feature_columns
            .iter()
            .map(|name| {
                available.iter().position(|col| col == name).ok_or_else(|| {
                    anyhow::anyhow!(
                        "Model for cluster {} expects feature column '{}' which is missing from the input data",
                        self.cluster,
                        name
                    )
                })
            })
            .collect()
    }

    /// Score a feature matrix whose columns follow the stored schema order
    pub fn predict(&self, features: &Array2<f64>) -> crate::Result<Array1<f64>> {
        if features.ncols() != self.feature_columns.len() {
            anyhow::bail!(
                "Feature matrix has {} columns but the model for cluster {} expects {}",
                features.ncols(),
                self.cluster,
                self.feature_columns.len()
            );
        }

        let mut predictions = Array1::zeros(features.nrows());
        for (i, row) in features.outer_iter().enumerate() {
            let mut prediction = self.base_score;
            for tree in &self.trees {
                prediction += tree.score(&row)?;
            }
            predictions[i] = prediction;
        }
        Ok(predictions)
    }

    fn validate(&self) -> crate::Result<()> {
        if self.feature_columns.is_empty() {
            anyhow::bail!(
                "Model for cluster {} declares no feature columns",
                self.cluster
            );
        }
        for tree in &self.trees {
            if tree.nodes.is_empty() {
                anyhow::bail!("Model for cluster {} contains an empty tree", self.cluster);
            }
            for node in &tree.nodes {
                if let TreeNode::Split {
                    feature,
                    left,
                    right,
                    ..
                } = node
                {
                    if *feature >= self.feature_columns.len() {
                        anyhow::bail!(
                            "Split references feature index {} but the model declares {} features",
                            feature,
                            self.feature_columns.len()
                        );
                    }
                    if *left >= tree.nodes.len() || *right >= tree.nodes.len() {
                        anyhow::bail!("Split references a node index out of bounds");
                    }
                }
            }
        }
        Ok(())
    }
}
