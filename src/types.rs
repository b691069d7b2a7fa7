use serde::{Deserialize, Serialize};
use std::fmt;

/// One address to scan. Kept exactly as it appeared in the target list.
pub type Target = String;

/// Pipeline stage a failure is attributed to.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    VerifyAnonymity,
    FetchContent,
    CaptureRender,
    Persist,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::VerifyAnonymity => "VerifyAnonymity",
            Stage::FetchContent => "FetchContent",
            Stage::CaptureRender => "CaptureRender",
            Stage::Persist => "Persist",
        };
        f.write_str(name)
    }
}

/// A stage-tagged failure with a human readable detail.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{stage} failed: {detail}")]
pub struct StageError {
    pub stage: Stage,
    pub detail: String,
}

impl StageError {
    pub fn new(stage: Stage, detail: impl Into<String>) -> Self {
        Self {
            stage,
            detail: detail.into(),
        }
    }
}

/// In-memory result of a pipeline run that passed every stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSuccess {
    pub target: Target,
    pub status_code: u16,
    pub observed_address: String,
    pub render: Vec<u8>,
    pub content: Vec<u8>,
}

/// Report entry for a target that passed every scan stage.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SuccessOutcome {
    pub target: Target,
    pub status_code: u16,
    pub observed_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub render_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_path: Option<String>,
    pub timestamp: String,
}

/// Report entry for a target that stopped at `stage`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FailureOutcome {
    pub target: Target,
    pub stage: Stage,
    pub error_detail: String,
    pub timestamp: String,
}

/// Terminal result of one target. Serializes to a flat record tagged by `status`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "status")]
pub enum ScanOutcome {
    #[serde(rename = "SUCCESS")]
    Success(SuccessOutcome),
    #[serde(rename = "FAILED")]
    Failure(FailureOutcome),
}

impl ScanOutcome {
    pub fn target(&self) -> &str {
        match self {
            ScanOutcome::Success(s) => &s.target,
            ScanOutcome::Failure(f) => &f.target,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ScanOutcome::Success(_))
    }
}

/// Aggregate results and counters for one run.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub start_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    pub total_targets: usize,
    pub success_count: usize,
    pub fail_count: usize,
    #[serde(rename = "records")]
    pub outcomes: Vec<ScanOutcome>,
}
