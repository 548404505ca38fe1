use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Integer ID Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AlgorithmId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VersionId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CategoryId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MetricId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ImprovementId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeedbackId(pub i64);

impl fmt::Display for AlgorithmId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ImprovementId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for FeedbackId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Registry Schema
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Algorithm {
    pub id: AlgorithmId,
    pub name: String,
    pub description: Option<String>,
    pub created_at: String, // RFC3339
}

/// Immutable snapshot of an algorithm's source code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmVersion {
    pub id: VersionId,
    pub algorithm_id: AlgorithmId,
    pub version_number: u32,
    pub code: String,
    pub created_at: String, // RFC3339
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub description: Option<String>,
}

impl Category {
    /// Shape of the datasets an algorithm in this category is benchmarked on.
    pub fn dataset_shape(&self) -> DatasetShape {
        if self.name.to_lowercase().contains("search") {
            DatasetShape::Sorted
        } else {
            DatasetShape::Random
        }
    }
}

/// One row per algorithm with its version and metric counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmSummary {
    pub id: AlgorithmId,
    pub name: String,
    pub version_count: usize,
    pub metric_count: usize,
}

// ============================================================================
// Notes Schema
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Improvement {
    pub id: ImprovementId,
    pub algorithm_id: AlgorithmId,
    pub old_version_id: VersionId,
    pub new_version_id: VersionId,
    pub note: Option<String>,
    pub created_at: String, // RFC3339
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub id: FeedbackId,
    pub algorithm_id: AlgorithmId,
    pub version_id: VersionId,
    pub text: String,
    pub rating: Option<u8>, // 1-5
    pub created_at: String, // RFC3339
}

// ============================================================================
// Performance Metric Schema
// ============================================================================

/// Append-only benchmark sample for one (version, input size).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetric {
    pub id: MetricId,
    pub version_id: VersionId,
    pub version_number: u32,
    pub input_size: u64,
    pub execution_time: f64, // seconds
    pub memory_usage: f64,   // bytes
    pub platform: Option<String>,
    pub timestamp: String, // RFC3339
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatasetShape {
    #[default]
    #[serde(rename = "random")]
    Random,
    #[serde(rename = "sorted")]
    Sorted,
    #[serde(rename = "nearly_sorted")]
    NearlySorted,
}

impl DatasetShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetShape::Random => "random",
            DatasetShape::Sorted => "sorted",
            DatasetShape::NearlySorted => "nearly_sorted",
        }
    }
}
