use tokio::sync::Mutex;

use crate::timestamp;
use crate::types::{FailureOutcome, ScanOutcome, ScanReport, StageError, SuccessOutcome, Target};

/// Synchronized accumulator for one run's outcomes.
///
/// Every record call appends exactly one outcome and bumps exactly one
/// counter under the lock. Workers never see the report itself.
#[derive(Debug)]
pub struct ReportAggregator {
    report: Mutex<ScanReport>,
}

impl ReportAggregator {
    pub fn new(total_targets: usize) -> Self {
        Self {
            report: Mutex::new(ScanReport {
                start_time: timestamp::now_rfc3339(),
                end_time: None,
                total_targets,
                success_count: 0,
                fail_count: 0,
                outcomes: Vec::new(),
            }),
        }
    }

    pub async fn record(&self, outcome: ScanOutcome) {
        let mut report = self.report.lock().await;
        if outcome.is_success() {
            report.success_count += 1;
        } else {
            report.fail_count += 1;
        }
        report.outcomes.push(outcome);
    }

    pub async fn record_success(&self, outcome: SuccessOutcome) {
        self.record(ScanOutcome::Success(outcome)).await;
    }

    pub async fn record_failure(&self, target: Target, error: StageError) {
        self.record(ScanOutcome::Failure(FailureOutcome {
            target,
            stage: error.stage,
            error_detail: error.detail,
            timestamp: timestamp::now_rfc3339(),
        }))
        .await;
    }

    /// `(success_count, fail_count)`.
    pub async fn counts(&self) -> (usize, usize) {
        let report = self.report.lock().await;
        (report.success_count, report.fail_count)
    }

    /// Copy of the report. The first call stamps `end_time`; later calls keep it.
    pub async fn snapshot(&self) -> ScanReport {
        let mut report = self.report.lock().await;
        if report.end_time.is_none() {
            report.end_time = Some(timestamp::now_rfc3339());
        }
        report.clone()
    }
}
