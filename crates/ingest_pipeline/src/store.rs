//! Persistent store collaborator.
//!
//! The per-resource row is the only shared mutable state in the pipeline.
//! `record_stage` must apply the history append and the denormalized
//! status-pointer update atomically: no observer may see one without the
//! other. Concurrent runs for the same resource resolve by last writer
//! wins on the pointer while both history entries are preserved.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ingest_score::OpennessScore;
use tokio::sync::RwLock;

use crate::error::PipelineError;
use crate::model::{Resource, ResourceFile, StageKind, StageRecord, StageStatus};

/// Derived-file storage path, identical for every run of the same resource
/// so re-runs overwrite instead of accumulating duplicates.
pub fn derived_path(resource_id: u64, basename: &str, extension: &str) -> String {
    format!("{resource_id}/{basename}.{extension}")
}

#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn resource(&self, id: u64) -> Result<Resource, PipelineError>;

    async fn insert_resource(&self, resource: Resource) -> Result<(), PipelineError>;

    /// Append a history entry and update the stage's status pointer, as one
    /// atomic step.
    async fn record_stage(&self, id: u64, record: StageRecord) -> Result<(), PipelineError>;

    async fn stage_status(&self, id: u64, stage: StageKind)
        -> Result<StageStatus, PipelineError>;

    /// Full append-only stage history, oldest first.
    async fn history(&self, id: u64) -> Result<Vec<StageRecord>, PipelineError>;

    /// Write the derived file bytes at the deterministic path, overwriting
    /// any previous run's output, and persist the detected file fields.
    async fn write_file(
        &self,
        file: ResourceFile,
        bytes: Vec<u8>,
    ) -> Result<(), PipelineError>;

    async fn file_record(&self, id: u64) -> Result<Option<ResourceFile>, PipelineError>;

    async fn read_file(&self, path: &str) -> Result<Vec<u8>, PipelineError>;

    async fn write_score(&self, id: u64, score: OpennessScore) -> Result<(), PipelineError>;

    /// Resources with a stage whose last status has been `Pending` since
    /// before the cutoff, for the reconciliation sweep.
    async fn stuck_pending(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<(u64, StageKind, DateTime<Utc>)>, PipelineError>;
}

#[derive(Debug)]
struct ResourceRow {
    resource: Resource,
    history: Vec<StageRecord>,
    file: Option<ResourceFile>,
}

/// In-memory reference store used by tests and the CLI.
#[derive(Default)]
pub struct MemoryStore {
    rows: RwLock<HashMap<u64, ResourceRow>>,
    files: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn missing(id: u64) -> PipelineError {
    PipelineError::internal(format!("unknown resource {id}"))
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn resource(&self, id: u64) -> Result<Resource, PipelineError> {
        let rows = self.rows.read().await;
        rows.get(&id)
            .map(|row| row.resource.clone())
            .ok_or_else(|| missing(id))
    }

    async fn insert_resource(&self, resource: Resource) -> Result<(), PipelineError> {
        let mut rows = self.rows.write().await;
        rows.insert(
            resource.id,
            ResourceRow {
                resource,
                history: Vec::new(),
                file: None,
            },
        );
        Ok(())
    }

    async fn record_stage(&self, id: u64, record: StageRecord) -> Result<(), PipelineError> {
        // One write guard covers both the append and the pointer update.
        let mut rows = self.rows.write().await;
        let row = rows.get_mut(&id).ok_or_else(|| missing(id))?;
        match record.stage {
            StageKind::Link => row.resource.link_status = record.status,
            StageKind::File => row.resource.file_status = record.status,
            StageKind::Data => row.resource.data_status = record.status,
        }
        row.history.push(record);
        Ok(())
    }

    async fn stage_status(
        &self,
        id: u64,
        stage: StageKind,
    ) -> Result<StageStatus, PipelineError> {
        let rows = self.rows.read().await;
        let row = rows.get(&id).ok_or_else(|| missing(id))?;
        Ok(row.resource.stage_status(stage))
    }

    async fn history(&self, id: u64) -> Result<Vec<StageRecord>, PipelineError> {
        let rows = self.rows.read().await;
        let row = rows.get(&id).ok_or_else(|| missing(id))?;
        Ok(row.history.clone())
    }

    async fn write_file(
        &self,
        file: ResourceFile,
        bytes: Vec<u8>,
    ) -> Result<(), PipelineError> {
        let mut rows = self.rows.write().await;
        let row = rows.get_mut(&file.resource_id).ok_or_else(|| missing(file.resource_id))?;
        let mut files = self.files.write().await;
        files.insert(file.path.clone(), bytes);
        row.file = Some(file);
        Ok(())
    }

    async fn file_record(&self, id: u64) -> Result<Option<ResourceFile>, PipelineError> {
        let rows = self.rows.read().await;
        let row = rows.get(&id).ok_or_else(|| missing(id))?;
        Ok(row.file.clone())
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>, PipelineError> {
        let files = self.files.read().await;
        files
            .get(path)
            .cloned()
            .ok_or_else(|| PipelineError::internal(format!("no stored file at {path}")))
    }

    async fn write_score(&self, id: u64, score: OpennessScore) -> Result<(), PipelineError> {
        let mut rows = self.rows.write().await;
        let row = rows.get_mut(&id).ok_or_else(|| missing(id))?;
        row.resource.openness_score = Some(score);
        Ok(())
    }

    async fn stuck_pending(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<(u64, StageKind, DateTime<Utc>)>, PipelineError> {
        let rows = self.rows.read().await;
        let mut stuck = Vec::new();
        for (id, row) in rows.iter() {
            for stage in [StageKind::Link, StageKind::File, StageKind::Data] {
                if row.resource.stage_status(stage) != StageStatus::Pending {
                    continue;
                }
                // The newest Pending entry for this stage marks the dispatch
                // time; a stage never dispatched has no entry and is fine.
                let Some(started_at) = row
                    .history
                    .iter()
                    .rev()
                    .find(|r| r.stage == stage)
                    .map(|r| r.started_at)
                else {
                    continue;
                };
                if started_at < cutoff {
                    stuck.push((*id, stage, started_at));
                }
            }
        }
        stuck.sort_by_key(|(id, _, _)| *id);
        Ok(stuck)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_record_stage_updates_pointer_and_history_together() {
        let store = MemoryStore::new();
        store
            .insert_resource(Resource::new(1, "r", "https://example.com/d.csv"))
            .await
            .unwrap();

        let record = StageRecord::success(StageKind::Link, Utc::now(), None);
        store.record_stage(1, record).await.unwrap();

        assert_eq!(
            store.stage_status(1, StageKind::Link).await.unwrap(),
            StageStatus::Success
        );
        assert_eq!(store.history(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_derived_path_is_deterministic_and_overwrites() {
        let store = MemoryStore::new();
        store
            .insert_resource(Resource::new(2, "r", "https://example.com/d.csv"))
            .await
            .unwrap();

        let path = derived_path(2, "budget", "csv");
        assert_eq!(path, "2/budget.csv");

        let file = ResourceFile {
            resource_id: 2,
            path: path.clone(),
            format: "csv".into(),
            mimetype: "text/csv".into(),
            encoding: "utf-8".into(),
        };
        store.write_file(file.clone(), b"a,b\n".to_vec()).await.unwrap();
        store.write_file(file, b"a,b\n1,2\n".to_vec()).await.unwrap();

        assert_eq!(store.read_file(&path).await.unwrap(), b"a,b\n1,2\n");
    }

    #[tokio::test]
    async fn test_stuck_pending_finds_old_dispatches() {
        let store = MemoryStore::new();
        store
            .insert_resource(Resource::new(3, "r", "https://example.com/d.csv"))
            .await
            .unwrap();

        let old = Utc::now() - chrono::Duration::hours(2);
        store
            .record_stage(3, StageRecord::pending(StageKind::Link, old))
            .await
            .unwrap();

        let cutoff = Utc::now() - chrono::Duration::hours(1);
        let stuck = store.stuck_pending(cutoff).await.unwrap();
        assert_eq!(stuck.len(), 1);
        assert_eq!(stuck[0].0, 3);
        assert_eq!(stuck[0].1, StageKind::Link);
    }

    #[tokio::test]
    async fn test_never_dispatched_stage_is_not_stuck() {
        let store = MemoryStore::new();
        store
            .insert_resource(Resource::new(4, "r", "https://example.com/d.csv"))
            .await
            .unwrap();

        let stuck = store.stuck_pending(Utc::now()).await.unwrap();
        assert!(stuck.is_empty());
    }
}
