use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::aggregator::ReportAggregator;
use crate::artifacts::{ArtifactKind, ArtifactStore};
use crate::pipeline::TargetPipeline;
use crate::timestamp;
use crate::types::{ScanReport, ScanSuccess, Stage, StageError, SuccessOutcome, Target};

/// Upper bound on the admission limit.
pub const MAX_CONCURRENCY: usize = 5_000;

/// Scan every target through `pipeline`, with at most `concurrency` targets doing
/// network work at once.
///
/// - Spawns one task per target; each task holds a `Semaphore` permit from
///   before its first network call until its outcome is recorded.
/// - A failing or panicking target is recorded as a failure and never affects
///   its siblings.
/// - Render and content buffers of successful targets are written to `store`;
///   a failed or panicking write only drops the corresponding path.
/// - Returns once every target has exactly one outcome in `aggregator`, with
///   the aggregator's snapshot.
pub async fn scan_targets(
    targets: &[Target],
    concurrency: usize,
    pipeline: Arc<TargetPipeline>,
    store: Arc<dyn ArtifactStore>,
    aggregator: Arc<ReportAggregator>,
) -> ScanReport {
    let total = targets.len();
    let sem = Arc::new(Semaphore::new(concurrency.clamp(1, MAX_CONCURRENCY)));
    let mut set = JoinSet::new();
    let mut by_task = HashMap::with_capacity(total);

    for (index, target) in targets.iter().enumerate() {
        let sem = sem.clone();
        let pipeline = pipeline.clone();
        let store = store.clone();
        let aggregator = aggregator.clone();
        let task_target = target.clone();

        let handle = set.spawn(async move {
            let target = task_target;
            let _permit = match sem.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    let detail = format!("admission closed: {e}");
                    let err = StageError::new(Stage::VerifyAnonymity, detail);
                    aggregator.record_failure(target, err).await;
                    return;
                }
            };
            info!("[{}/{}] Scanning: {}", index + 1, total, target);

            match run_isolated(pipeline, target.clone()).await {
                Ok(success) => {
                    info!(
                        "{} (Status: {}, IP: {})",
                        target, success.status_code, success.observed_address
                    );
                    let outcome = persist_artifacts(&store, success).await;
                    aggregator.record_success(outcome).await;
                }
                Err(err) => {
                    error!(stage = %err.stage, "{} -> {}", target, err.detail);
                    aggregator.record_failure(target, err).await;
                }
            }
        });
        by_task.insert(handle.id(), target.clone());
    }

    while let Some(res) = set.join_next_with_id().await {
        match res {
            Ok((id, ())) => {
                by_task.remove(&id);
            }
            Err(e) => {
                // The task died before recording anything; record it here instead.
                let Some(target) = by_task.remove(&e.id()) else {
                    error!(error = %e, "scan task for an unknown target terminated");
                    continue;
                };
                error!(error = %e, "scan task for {} ended before recording", target);
                let detail = format!("scan task aborted: {e}");
                let err = StageError::new(Stage::VerifyAnonymity, detail);
                aggregator.record_failure(target, err).await;
            }
        }
    }

    aggregator.snapshot().await
}

/// Run the pipeline on its own task so a panic becomes a failure of the stage it was in.
async fn run_isolated(
    pipeline: Arc<TargetPipeline>,
    target: Target,
) -> Result<ScanSuccess, StageError> {
    let current = Arc::new(Mutex::new(Stage::VerifyAnonymity));
    let tracker = current.clone();
    let handle = tokio::spawn(async move {
        let on_stage = move |stage: Stage| {
            if let Ok(mut slot) = tracker.lock() {
                *slot = stage;
            }
        };
        pipeline.run_observed(&target, &on_stage).await
    });

    match handle.await {
        Ok(res) => res,
        Err(join) => {
            let stage = current
                .lock()
                .map(|s| *s)
                .unwrap_or(Stage::VerifyAnonymity);
            Err(StageError::new(stage, format!("scan task aborted: {join}")))
        }
    }
}

async fn persist_artifacts(
    store: &Arc<dyn ArtifactStore>,
    success: ScanSuccess,
) -> SuccessOutcome {
    let ScanSuccess {
        target,
        status_code,
        observed_address,
        render,
        content,
    } = success;
    let render_path = save_soft(store, render, &target, ArtifactKind::Render).await;
    let content_path = save_soft(store, content, &target, ArtifactKind::Content).await;
    SuccessOutcome {
        target,
        status_code,
        observed_address,
        render_path,
        content_path,
        timestamp: timestamp::now_rfc3339(),
    }
}

/// Save one artifact on its own task; an error or a panic leaves the path unset.
async fn save_soft(
    store: &Arc<dyn ArtifactStore>,
    bytes: Vec<u8>,
    target: &str,
    kind: ArtifactKind,
) -> Option<String> {
    let store = store.clone();
    let owned_target = target.to_string();
    let saving = tokio::spawn(async move { store.save(&bytes, &owned_target, kind).await });
    let failure = match saving.await {
        Ok(Ok(path)) => {
            info!("{} saved: {}", kind.dir_name(), path.display());
            return Some(path.display().to_string());
        }
        Ok(Err(e)) => format!("{e:#}"),
        Err(join) => format!("store task aborted: {join}"),
    };
    warn!(
        stage = %Stage::Persist,
        "{} save failed for {}: {}",
        kind.dir_name(),
        target,
        failure
    );
    None
}
