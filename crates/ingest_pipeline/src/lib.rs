//! Ingestion orchestration for catalog resources.
//!
//! Drives a resource through three ordered stages — link check, file
//! download/classification, data scoring/indexing — with per-stage status
//! tracking, an append-only run history, a four-way error taxonomy that
//! decides retryability, and a reconciliation sweep for runs that died
//! mid-flight. Collaborators (store, notifier) sit behind async traits so
//! real backends and test doubles plug in the same way.

pub mod error;
pub mod fetch;
pub mod model;
pub mod notify;
pub mod orchestrator;
pub mod store;
pub mod task;

pub use error::{ErrorKind, PipelineError};
pub use fetch::{FetchConfig, LinkFetcher};
pub use model::{
    Resource, ResourceFile, SourceData, StageError, StageKind, StageRecord, StageStatus,
};
pub use notify::{ChangeNotifier, ChannelNotifier, NullNotifier, ResourceChanged};
pub use orchestrator::{IngestionOrchestrator, OrchestratorConfig};
pub use store::{derived_path, MemoryStore, ResourceStore};
pub use task::{reconcile, run_stage, StageHooks};
