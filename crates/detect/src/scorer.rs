//! Isolation Forest 스코어러 백엔드
//!
//! 학습 완료된 isolation forest를 JSON 아티팩트에서 로드하여
//! [`Scorer`] trait으로 제공합니다. 스코어링은 순수 트리 순회이므로
//! 별도 ML 런타임 없이 수행됩니다.
//!
//! # 아티팩트 형식
//! ```json
//! {
//!   "max_samples": 256,
//!   "feature_count": 4,
//!   "trees": [
//!     { "nodes": [
//!       { "feature": 0, "threshold": 120.5, "left": 1, "right": 2 },
//!       { "size": 1 },
//!       { "size": 200 }
//!     ]}
//!   ]
//! }
//! ```
//! 피처 컬럼 아티팩트는 JSON 문자열 배열이며, 없으면 기본 4-컬럼
//! 스키마가 적용됩니다.
//!
//! # 부호 규약
//! 반환 스코어는 `0.5 - 2^(-E[h(x)] / c(max_samples))` 로,
//! 학습 시 사용한 decision function과 동일합니다. **음수 = 이상**.

use std::path::Path;

use serde::{Deserialize, Serialize};

use suriguard_core::error::{ModelError, SuriguardError};
use suriguard_core::pipeline::Scorer;

use crate::error::DetectError;
use crate::features::default_columns;

/// 오일러-마스케로니 상수 (조화수 근사에 사용)
const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// 트리 노드 — 분기 또는 리프
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    /// 내부 분기 노드: `feature <= threshold`면 left, 아니면 right
    Split {
        /// 비교할 피처 인덱스
        feature: usize,
        /// 분기 임계값
        threshold: f64,
        /// 왼쪽 자식 노드 인덱스
        left: usize,
        /// 오른쪽 자식 노드 인덱스
        right: usize,
    },
    /// 리프 노드: 학습 시 이 리프에 도달한 샘플 수
    Leaf {
        /// 리프 샘플 수
        size: u64,
    },
}

/// 트리 하나의 직렬화 형태 (노드 평탄화 배열, 루트는 인덱스 0)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeArtifact {
    /// 평탄화된 노드 배열
    pub nodes: Vec<TreeNode>,
}

impl TreeArtifact {
    /// 피처 벡터가 루트에서 리프까지 내려가는 경로 길이를 계산합니다.
    ///
    /// 리프에서는 `depth + c(leaf_size)` 보정을 더합니다
    /// (리프에 모인 샘플들이 더 분리되는 데 필요한 기대 깊이).
    fn path_length(&self, features: &[f64]) -> f64 {
        let mut index = 0;
        let mut depth = 0.0;
        loop {
            match &self.nodes[index] {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    // 로드 시 검증: feature/left/right는 항상 범위 내
                    index = if features[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                    depth += 1.0;
                }
                TreeNode::Leaf { size } => {
                    return depth + average_path_length(*size);
                }
            }
        }
    }
}

/// 모델 아티팩트 최상위 구조
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestArtifact {
    /// 트리당 서브샘플 크기 (ψ) — 스코어 정규화 상수에 사용
    pub max_samples: u64,
    /// 모델이 기대하는 피처 수
    pub feature_count: usize,
    /// 학습된 트리들
    pub trees: Vec<TreeArtifact>,
}

/// Isolation Forest 스코어러
///
/// 로드 이후 내부 상태가 변경되지 않으므로 여러 호출자가
/// 동시에 스코어링해도 안전합니다.
pub struct IsolationForestScorer {
    /// 학습된 트리들
    trees: Vec<TreeArtifact>,
    /// 정규화 상수 c(ψ)
    normalizer: f64,
    /// 모델에 바인딩된 피처 컬럼 (순서 고정)
    columns: Vec<String>,
}

impl IsolationForestScorer {
    /// 모델 아티팩트와 피처 컬럼 아티팩트를 로드합니다.
    ///
    /// 컬럼 아티팩트 경로가 `None`이거나 파일이 없으면 기본 4-컬럼
    /// 스키마로 폴백합니다. 모델 아티팩트가 없거나 손상된 경우,
    /// 그리고 컬럼 수가 모델의 `feature_count`와 다른 경우는
    /// 기동 시 치명적 에러입니다.
    pub async fn load(
        model_path: impl AsRef<Path>,
        columns_path: Option<impl AsRef<Path>>,
    ) -> Result<Self, DetectError> {
        let model_path = model_path.as_ref();
        let raw = tokio::fs::read(model_path)
            .await
            .map_err(|e| DetectError::ModelLoad {
                path: model_path.display().to_string(),
                reason: e.to_string(),
            })?;
        let artifact: ForestArtifact =
            serde_json::from_slice(&raw).map_err(|e| DetectError::ModelLoad {
                path: model_path.display().to_string(),
                reason: e.to_string(),
            })?;

        let columns = match columns_path {
            Some(path) => Self::load_columns(path.as_ref()).await?,
            None => {
                tracing::info!("no feature columns artifact configured, using default schema");
                default_columns()
            }
        };

        let scorer = Self::from_artifact(artifact, columns).map_err(|e| match e {
            DetectError::ModelLoad { reason, .. } => DetectError::ModelLoad {
                path: model_path.display().to_string(),
                reason,
            },
            other => other,
        })?;
        tracing::info!(
            path = %model_path.display(),
            trees = scorer.trees.len(),
            columns = ?scorer.columns,
            "isolation forest model loaded"
        );
        Ok(scorer)
    }

    /// 파싱된 아티팩트에서 스코어러를 조립합니다.
    ///
    /// 트리 구조와 스키마를 검증합니다.
    pub fn from_artifact(
        artifact: ForestArtifact,
        columns: Vec<String>,
    ) -> Result<Self, DetectError> {
        if artifact.trees.is_empty() {
            return Err(DetectError::ModelLoad {
                path: String::new(),
                reason: "model has no trees".to_owned(),
            });
        }
        if artifact.max_samples < 2 {
            return Err(DetectError::ModelLoad {
                path: String::new(),
                reason: format!("max_samples must be >= 2, got {}", artifact.max_samples),
            });
        }
        if columns.len() != artifact.feature_count {
            return Err(DetectError::SchemaMismatch {
                expected: artifact.feature_count,
                actual: columns.len(),
            });
        }

        for (tree_idx, tree) in artifact.trees.iter().enumerate() {
            Self::validate_tree(tree_idx, tree, artifact.feature_count)?;
        }

        Ok(Self {
            normalizer: average_path_length(artifact.max_samples),
            trees: artifact.trees,
            columns,
        })
    }

    /// 트리 구조 검증: 인덱스 범위와 순회 종료를 보장합니다.
    ///
    /// 자식 인덱스는 항상 부모보다 커야 합니다 (전위 순서 평탄화).
    /// 이 불변식이 순회의 종료를 보장합니다.
    fn validate_tree(
        tree_idx: usize,
        tree: &TreeArtifact,
        feature_count: usize,
    ) -> Result<(), DetectError> {
        if tree.nodes.is_empty() {
            return Err(DetectError::ModelLoad {
                path: String::new(),
                reason: format!("tree {tree_idx} has no nodes"),
            });
        }
        for (node_idx, node) in tree.nodes.iter().enumerate() {
            if let TreeNode::Split {
                feature,
                left,
                right,
                ..
            } = node
            {
                if *feature >= feature_count {
                    return Err(DetectError::ModelLoad {
                        path: String::new(),
                        reason: format!(
                            "tree {tree_idx} node {node_idx}: feature index {feature} out of range"
                        ),
                    });
                }
                for child in [*left, *right] {
                    if child <= node_idx || child >= tree.nodes.len() {
                        return Err(DetectError::ModelLoad {
                            path: String::new(),
                            reason: format!(
                                "tree {tree_idx} node {node_idx}: invalid child index {child}"
                            ),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// 피처 컬럼 아티팩트(JSON 문자열 배열)를 로드합니다.
    ///
    /// 파일이 없으면 기본 스키마로 폴백하고, 손상된 경우는 에러입니다.
    async fn load_columns(path: &Path) -> Result<Vec<String>, DetectError> {
        match tokio::fs::read(path).await {
            Ok(raw) => serde_json::from_slice(&raw).map_err(|e| DetectError::ModelLoad {
                path: path.display().to_string(),
                reason: format!("invalid feature columns artifact: {e}"),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    path = %path.display(),
                    "feature columns artifact not found, using default schema"
                );
                Ok(default_columns())
            }
            Err(e) => Err(DetectError::ModelLoad {
                path: path.display().to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// 로드된 트리 수를 반환합니다.
    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }
}

impl Scorer for IsolationForestScorer {
    fn name(&self) -> &str {
        "isolation_forest"
    }

    fn feature_columns(&self) -> &[String] {
        &self.columns
    }

    fn score(&self, features: &[f64]) -> Result<f64, SuriguardError> {
        if features.len() != self.columns.len() {
            return Err(ModelError::Score {
                reason: format!(
                    "feature vector length {} does not match schema length {}",
                    features.len(),
                    self.columns.len()
                ),
            }
            .into());
        }

        let total: f64 = self
            .trees
            .iter()
            .map(|tree| tree.path_length(features))
            .sum();
        let mean_depth = total / self.trees.len() as f64;
        let anomaly_score = 2f64.powf(-mean_depth / self.normalizer);
        Ok(0.5 - anomaly_score)
    }
}

/// BST 실패 탐색의 평균 경로 길이 c(n)
///
/// c(1) = 0, c(2) = 1, n > 2에서 `2 H(n-1) - 2(n-1)/n`.
fn average_path_length(n: u64) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let nf = n as f64;
            2.0 * ((nf - 1.0).ln() + EULER_GAMMA) - 2.0 * (nf - 1.0) / nf
        }
    }
}
