//! Data model shared by the orchestrator and its collaborators.

use chrono::{DateTime, Utc};
use ingest_score::OpennessScore;

use crate::error::ErrorKind;

/// The three ordered stages of one ingestion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Validate that the resource link is reachable.
    Link,
    /// Download the bytes, classify the format, persist the derived file.
    File,
    /// Score the content and index its tabular schema.
    Data,
}

impl StageKind {
    /// The stage that must have succeeded before this one may run.
    pub fn predecessor(&self) -> Option<StageKind> {
        match self {
            StageKind::Link => None,
            StageKind::File => Some(StageKind::Link),
            StageKind::Data => Some(StageKind::File),
        }
    }
}

/// Denormalized last-known outcome of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    #[default]
    Pending,
    Success,
    Failure,
}

/// One append-only history entry for a stage run.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StageRecord {
    pub stage: StageKind,
    pub status: StageStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// JSON result of a successful run, if the stage produced one.
    pub payload: Option<serde_json::Value>,
    /// Error taxonomy and message of a failed run.
    pub error: Option<StageError>,
}

impl StageRecord {
    pub fn pending(stage: StageKind, started_at: DateTime<Utc>) -> Self {
        Self {
            stage,
            status: StageStatus::Pending,
            started_at,
            finished_at: None,
            payload: None,
            error: None,
        }
    }

    pub fn success(
        stage: StageKind,
        started_at: DateTime<Utc>,
        payload: Option<serde_json::Value>,
    ) -> Self {
        Self {
            stage,
            status: StageStatus::Success,
            started_at,
            finished_at: Some(Utc::now()),
            payload,
            error: None,
        }
    }

    pub fn failure(stage: StageKind, started_at: DateTime<Utc>, error: StageError) -> Self {
        Self {
            stage,
            status: StageStatus::Failure,
            started_at,
            finished_at: Some(Utc::now()),
            payload: None,
            error: Some(error),
        }
    }
}

/// Error details carried on a failed stage record.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StageError {
    pub kind: ErrorKind,
    pub message: String,
}

/// A catalog resource as the pipeline sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub id: u64,
    pub title: String,
    /// Remote URL or local filesystem path of the source data.
    pub link: String,
    pub openness_score: Option<OpennessScore>,
    pub link_status: StageStatus,
    pub file_status: StageStatus,
    pub data_status: StageStatus,
}

impl Resource {
    pub fn new(id: u64, title: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            link: link.into(),
            openness_score: None,
            link_status: StageStatus::Pending,
            file_status: StageStatus::Pending,
            data_status: StageStatus::Pending,
        }
    }

    pub fn stage_status(&self, stage: StageKind) -> StageStatus {
        match stage {
            StageKind::Link => self.link_status,
            StageKind::File => self.file_status,
            StageKind::Data => self.data_status,
        }
    }
}

/// The derived file written by the file stage.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ResourceFile {
    pub resource_id: u64,
    /// Deterministic storage path, `{resource_id}/{basename}.{ext}`.
    pub path: String,
    pub format: String,
    pub mimetype: String,
    pub encoding: String,
}

/// Raw bytes fetched from a resource link, plus the name they arrived under.
#[derive(Debug, Clone)]
pub struct SourceData {
    pub bytes: Vec<u8>,
    pub filename: Option<String>,
}

impl SourceData {
    /// Lowercased extension of the declared filename, if any.
    pub fn extension(&self) -> Option<String> {
        let name = self.filename.as_deref()?;
        let (stem, ext) = name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }

    /// Filename without its extension, falling back to `data`.
    pub fn basename(&self) -> &str {
        let name = self
            .filename
            .as_deref()
            .map(|n| n.rsplit('/').next().unwrap_or(n))
            .unwrap_or("data");
        match name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_predecessors() {
        assert_eq!(StageKind::Link.predecessor(), None);
        assert_eq!(StageKind::File.predecessor(), Some(StageKind::Link));
        assert_eq!(StageKind::Data.predecessor(), Some(StageKind::File));
    }

    #[test]
    fn test_source_data_names() {
        let data = SourceData {
            bytes: vec![],
            filename: Some("exports/budget.CSV".to_string()),
        };
        assert_eq!(data.extension().as_deref(), Some("csv"));
        assert_eq!(data.basename(), "budget");

        let unnamed = SourceData {
            bytes: vec![],
            filename: None,
        };
        assert_eq!(unnamed.extension(), None);
        assert_eq!(unnamed.basename(), "data");
    }

    #[test]
    fn test_new_resource_is_fully_pending() {
        let resource = Resource::new(7, "Budget", "https://example.com/budget.csv");
        for stage in [StageKind::Link, StageKind::File, StageKind::Data] {
            assert_eq!(resource.stage_status(stage), StageStatus::Pending);
        }
    }
}
