//! The outcome of a series evaluation.
//!
//! [`QualityResult`] serializes to the JSON object stored as the
//! `pet_quality` field of a series document, tagged by `status`:
//!
//! ```json
//! {"status": "ok", "gni_suvbw": 0.21, "coverage_mask_pct": 38.5, "params": {...}, "suv_meta": {...}}
//! {"status": "error", "kind": "data", "message": "..."}
//! {"status": "skipped_dynamic", "reason": "dynamic_series", "number_of_frames": 24}
//! {"status": "disabled"}
//! ```

use crate::config::{Bins, QualityConfig};
use crate::decay::SuvMeta;
use serde::Serialize;
use std::fmt;

/// Category of an evaluation failure.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The evaluation parameters are unusable
    Configuration,
    /// Missing or malformed attributes, inconsistent or unreadable slices,
    /// or instances which could not be retrieved
    Data,
    /// The data was valid but yielded no metric
    Computation,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureKind::Configuration => "configuration",
            FailureKind::Data => "data",
            FailureKind::Computation => "computation",
        })
    }
}

/// A failed evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl QualityFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        QualityFailure {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for QualityFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error: {}", self.kind, self.message)
    }
}

/// The parameters with which a metric was computed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityParams {
    pub thr_suv: f64,
    pub block_size: usize,
    pub min_valid: usize,
    pub bins: Bins,
}

impl From<&QualityConfig> for QualityParams {
    fn from(config: &QualityConfig) -> Self {
        QualityParams {
            thr_suv: config.threshold,
            block_size: config.block_size,
            min_valid: config.min_valid,
            bins: config.bins,
        }
    }
}

/// A successfully computed quality metric.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReport {
    /// Global noise index, in SUV (body weight)
    #[serde(rename = "gni_suvbw")]
    pub gni: f64,
    /// Percentage of pixels in the tissue mask, over all slices
    #[serde(rename = "coverage_mask_pct")]
    pub coverage_pct: f64,
    /// Number of slices evaluated
    pub slices: usize,
    /// Number of noise samples in the histogram
    pub noise_blocks: usize,
    /// The parameters used
    pub params: QualityParams,
    /// Audit record of the SUV conversion
    pub suv_meta: SuvMeta,
}

/// The outcome of evaluating one series.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QualityResult {
    /// Quality metrics are turned off
    Disabled,
    /// The series is a dynamic acquisition and was not evaluated
    SkippedDynamic {
        reason: &'static str,
        number_of_frames: i64,
    },
    /// The evaluation failed
    Error(QualityFailure),
    /// The metric was computed
    Ok(QualityReport),
}

impl QualityResult {
    pub(crate) fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        QualityResult::Error(QualityFailure::new(kind, message))
    }

    pub(crate) fn skipped_dynamic(number_of_frames: i64) -> Self {
        QualityResult::SkippedDynamic {
            reason: "dynamic_series",
            number_of_frames,
        }
    }

    /// The status tag of this result.
    pub fn status(&self) -> &'static str {
        match self {
            QualityResult::Disabled => "disabled",
            QualityResult::SkippedDynamic { .. } => "skipped_dynamic",
            QualityResult::Error(_) => "error",
            QualityResult::Ok(_) => "ok",
        }
    }

    /// The computed GNI, if the evaluation succeeded.
    pub fn gni(&self) -> Option<f64> {
        match self {
            QualityResult::Ok(report) => Some(report.gni),
            _ => None,
        }
    }

    /// The failure, if the evaluation failed.
    pub fn as_failure(&self) -> Option<&QualityFailure> {
        match self {
            QualityResult::Error(failure) => Some(failure),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_with_status_tag() {
        assert_eq!(
            serde_json::to_value(QualityResult::Disabled).unwrap(),
            json!({"status": "disabled"})
        );
        assert_eq!(
            serde_json::to_value(QualityResult::skipped_dynamic(24)).unwrap(),
            json!({"status": "skipped_dynamic", "reason": "dynamic_series", "number_of_frames": 24})
        );
        assert_eq!(
            serde_json::to_value(QualityResult::failure(
                FailureKind::Computation,
                "No valid noise blocks"
            ))
            .unwrap(),
            json!({"status": "error", "kind": "computation", "message": "No valid noise blocks"})
        );
    }

    #[test]
    fn params_from_config() {
        let params = QualityParams::from(&QualityConfig::default());
        assert_eq!(
            serde_json::to_value(params).unwrap(),
            json!({"thr_suv": 0.07, "block_size": 6, "min_valid": 12, "bins": "fd"})
        );

        let config = QualityConfig::new().with_bins(Bins::Count(50));
        let params = QualityParams::from(&config);
        assert_eq!(serde_json::to_value(params).unwrap()["bins"], 50);
    }

    #[test]
    fn accessors() {
        let failure = QualityResult::failure(FailureKind::Data, "Missing pixel data");
        assert_eq!(failure.status(), "error");
        assert_eq!(failure.gni(), None);
        assert_eq!(
            failure.as_failure().unwrap().to_string(),
            "data error: Missing pixel data"
        );
        assert_eq!(QualityResult::Disabled.status(), "disabled");
    }
}
