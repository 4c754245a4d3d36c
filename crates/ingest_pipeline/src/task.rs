//! Stage execution with lifecycle hooks.
//!
//! Every dispatched stage run terminates in exactly one recorded Success or
//! Failure; a Pending record marks the dispatch so crash recovery can find
//! runs that never finished. Hooks replace any global signal mechanism:
//! callers wire explicit callbacks for before/after/error.

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::error::PipelineError;
use crate::model::{StageKind, StageRecord, StageStatus};
use crate::store::ResourceStore;

type Hook = Box<dyn Fn(u64, StageKind) + Send + Sync>;
type ErrorHook = Box<dyn Fn(u64, StageKind, &PipelineError) + Send + Sync>;

/// Explicit lifecycle callbacks around a stage run.
#[derive(Default)]
pub struct StageHooks {
    before: Option<Hook>,
    after: Option<Hook>,
    on_error: Option<ErrorHook>,
}

impl StageHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_before(mut self, hook: impl Fn(u64, StageKind) + Send + Sync + 'static) -> Self {
        self.before = Some(Box::new(hook));
        self
    }

    pub fn on_after(mut self, hook: impl Fn(u64, StageKind) + Send + Sync + 'static) -> Self {
        self.after = Some(Box::new(hook));
        self
    }

    pub fn on_error(
        mut self,
        hook: impl Fn(u64, StageKind, &PipelineError) + Send + Sync + 'static,
    ) -> Self {
        self.on_error = Some(Box::new(hook));
        self
    }
}

/// Run one stage and record its outcome exactly once.
///
/// The precondition (predecessor's last status is Success) is checked here;
/// a failed precondition is an Internal error and leaves this stage's own
/// status untouched. Work errors are recorded as Failure and re-raised so
/// the task queue's own bookkeeping fires too.
pub async fn run_stage<S, F, Fut>(
    store: &S,
    hooks: &StageHooks,
    resource_id: u64,
    stage: StageKind,
    work: F,
) -> Result<serde_json::Value, PipelineError>
where
    S: ResourceStore,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<serde_json::Value, PipelineError>>,
{
    if let Some(predecessor) = stage.predecessor() {
        let status = store.stage_status(resource_id, predecessor).await?;
        if status != StageStatus::Success {
            return Err(PipelineError::internal(format!(
                "stage {stage:?} requires {predecessor:?} to have succeeded, found {status:?}"
            )));
        }
    }

    if let Some(before) = &hooks.before {
        before(resource_id, stage);
    }

    let started_at = Utc::now();
    store
        .record_stage(resource_id, StageRecord::pending(stage, started_at))
        .await?;

    match work().await {
        Ok(payload) => {
            store
                .record_stage(
                    resource_id,
                    StageRecord::success(stage, started_at, Some(payload.clone())),
                )
                .await?;
            tracing::info!(resource_id, ?stage, "stage succeeded");
            if let Some(after) = &hooks.after {
                after(resource_id, stage);
            }
            Ok(payload)
        }
        Err(err) => {
            store
                .record_stage(
                    resource_id,
                    StageRecord::failure(stage, started_at, err.stage_error()),
                )
                .await?;
            tracing::warn!(resource_id, ?stage, error = %err, "stage failed");
            if let Some(on_error) = &hooks.on_error {
                on_error(resource_id, stage, &err);
            }
            Err(err)
        }
    }
}

/// Mark stage runs stuck in Pending since before the cutoff as timed-out
/// failures. Returns how many records were reconciled.
pub async fn reconcile<S: ResourceStore>(
    store: &S,
    cutoff: DateTime<Utc>,
) -> Result<usize, PipelineError> {
    let stuck = store.stuck_pending(cutoff).await?;
    let count = stuck.len();
    for (resource_id, stage, started_at) in stuck {
        let error = PipelineError::transport(format!(
            "stage dispatched at {started_at} never finished"
        ));
        store
            .record_stage(
                resource_id,
                StageRecord::failure(stage, started_at, error.stage_error()),
            )
            .await?;
        tracing::warn!(resource_id, ?stage, "reconciled stuck stage");
    }
    Ok(count)
}
