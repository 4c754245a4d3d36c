//! The three-stage ingestion orchestrator.
//!
//! Stages for one resource run strictly in sequence; a Failure
//! short-circuits the rest of the run but never blocks a future re-run
//! from starting over at the link stage. Blocking classification and
//! scoring work runs off the async runtime.

use std::sync::Arc;
use std::time::Duration;

use ingest_score::ScoreRegistry;
use ingest_sniff::{detect_encoding, FileFormat, FormatSniffer};
use ingest_tabular::{TypeGuesser, TypeResolver};

use crate::error::PipelineError;
use crate::fetch::{FetchConfig, LinkFetcher};
use crate::model::{ResourceFile, SourceData, StageKind};
use crate::notify::{ChangeNotifier, ResourceChanged};
use crate::store::{derived_path, ResourceStore};
use crate::task::{run_stage, StageHooks};

/// Orchestrator behavior knobs.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// `app_label` carried on change events.
    pub app_label: String,
    /// `model_name` carried on change events.
    pub model_name: String,
    /// Deadline for one stage's work; exceeding it is a transport failure.
    pub stage_timeout: Duration,
    pub fetch: FetchConfig,
    /// How many data rows feed column type resolution.
    pub schema_sample_rows: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            app_label: "resources".to_string(),
            model_name: "resource".to_string(),
            stage_timeout: Duration::from_secs(300),
            fetch: FetchConfig::default(),
            schema_sample_rows: 100,
        }
    }
}

pub struct IngestionOrchestrator<S, N> {
    store: Arc<S>,
    notifier: Arc<N>,
    fetcher: LinkFetcher,
    sniffer: Arc<FormatSniffer>,
    registry: Arc<ScoreRegistry>,
    hooks: StageHooks,
    config: OrchestratorConfig,
}

impl<S, N> IngestionOrchestrator<S, N>
where
    S: ResourceStore,
    N: ChangeNotifier,
{
    pub fn new(
        store: Arc<S>,
        notifier: Arc<N>,
        config: OrchestratorConfig,
    ) -> Result<Self, PipelineError> {
        Ok(Self {
            store,
            notifier,
            fetcher: LinkFetcher::new(config.fetch)?,
            sniffer: Arc::new(FormatSniffer::new()),
            registry: Arc::new(ScoreRegistry::new()),
            hooks: StageHooks::new(),
            config,
        })
    }

    /// Replace the default lifecycle hooks.
    pub fn with_hooks(mut self, hooks: StageHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Run all three stages for one resource.
    ///
    /// Returns the first stage error, leaving later stages untouched; the
    /// failure is already recorded by the time this returns.
    pub async fn ingest(&self, resource_id: u64) -> Result<(), PipelineError> {
        self.link_stage(resource_id).await?;
        self.file_stage(resource_id).await?;
        self.data_stage(resource_id).await?;
        Ok(())
    }

    /// Stage one: validate that the link is reachable.
    pub async fn link_stage(
        &self,
        resource_id: u64,
    ) -> Result<serde_json::Value, PipelineError> {
        let resource = self.store.resource(resource_id).await?;
        run_stage(
            self.store.as_ref(),
            &self.hooks,
            resource_id,
            StageKind::Link,
            || async {
                self.bounded(self.fetcher.check(&resource.link)).await?;
                Ok(serde_json::json!({ "link": resource.link }))
            },
        )
        .await
    }

    /// Stage two: download, classify, and persist the derived file.
    pub async fn file_stage(
        &self,
        resource_id: u64,
    ) -> Result<serde_json::Value, PipelineError> {
        let resource = self.store.resource(resource_id).await?;
        run_stage(
            self.store.as_ref(),
            &self.hooks,
            resource_id,
            StageKind::File,
            || async {
                let data = self.bounded(self.fetcher.fetch(&resource.link)).await?;
                let (format, encoding, data) = self.classify(data).await?;

                let file = ResourceFile {
                    resource_id,
                    path: derived_path(resource_id, data.basename(), format.extension()),
                    format: format.extension().to_string(),
                    mimetype: format.mimetype().to_string(),
                    encoding,
                };
                let payload = serde_json::json!({
                    "path": file.path,
                    "format": file.format,
                    "mimetype": file.mimetype,
                    "encoding": file.encoding,
                });
                self.store.write_file(file, data.bytes).await?;
                Ok(payload)
            },
        )
        .await
    }

    /// Stage three: score the content, resolve the tabular schema, and emit
    /// exactly one downstream change event.
    pub async fn data_stage(
        &self,
        resource_id: u64,
    ) -> Result<serde_json::Value, PipelineError> {
        let resource = self.store.resource(resource_id).await?;
        // The extension the resource was published under, not the detected
        // one; archive scoring needs it for the reserved-bundle short cut.
        let declared_ext = link_extension(&resource.link);
        let payload = run_stage(
            self.store.as_ref(),
            &self.hooks,
            resource_id,
            StageKind::Data,
            || async {
                let file = self
                    .store
                    .file_record(resource_id)
                    .await?
                    .ok_or_else(|| {
                        PipelineError::internal("data stage ran without a stored file")
                    })?;
                let bytes = self.store.read_file(&file.path).await?;
                let format =
                    FileFormat::from_extension(&file.format).unwrap_or(FileFormat::Unknown);

                let registry = Arc::clone(&self.registry);
                let sample_rows = self.config.schema_sample_rows;
                let declared_ext = declared_ext.clone();
                let (score, schema) = self
                    .bounded(async move {
                        tokio::task::spawn_blocking(move || {
                            let score =
                                registry.score_with_hint(&bytes, format, declared_ext.as_deref());
                            let schema = if format == FileFormat::Csv {
                                Some(resolve_schema(&bytes, sample_rows)?)
                            } else {
                                None
                            };
                            Ok::<_, PipelineError>((score, schema))
                        })
                        .await?
                    })
                    .await?;

                self.store.write_score(resource_id, score).await?;
                Ok(serde_json::json!({
                    "openness_score": score,
                    "schema": schema,
                }))
            },
        )
        .await?;

        // One refresh per successful data stage, not one per sub-step.
        self.notifier
            .resource_changed(ResourceChanged {
                app_label: self.config.app_label.clone(),
                model_name: self.config.model_name.clone(),
                resource_id,
            })
            .await?;
        Ok(payload)
    }

    async fn classify(
        &self,
        data: SourceData,
    ) -> Result<(FileFormat, String, SourceData), PipelineError> {
        let sniffer = Arc::clone(&self.sniffer);
        tokio::task::spawn_blocking(move || {
            let hint = data.extension();
            let format = sniffer.sniff(&data.bytes, hint.as_deref())?;
            let encoding = detect_encoding(&data.bytes)
                .encoding
                .name()
                .to_ascii_lowercase();
            tracing::debug!(?format, encoding, "classified resource bytes");
            Ok((format, encoding, data))
        })
        .await?
    }

    async fn bounded<T>(
        &self,
        work: impl std::future::Future<Output = Result<T, PipelineError>>,
    ) -> Result<T, PipelineError> {
        tokio::time::timeout(self.config.stage_timeout, work)
            .await
            .map_err(|_| {
                PipelineError::transport(format!(
                    "stage work exceeded {:?}",
                    self.config.stage_timeout
                ))
            })?
    }
}

/// Lowercased extension of the link's trailing path segment.
fn link_extension(link: &str) -> Option<String> {
    let name = link.rsplit(['/', '\\']).next()?;
    let name = name.split(['?', '#']).next()?;
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Resolve the column schema of a delimiter-separated file.
fn resolve_schema(
    bytes: &[u8],
    sample_rows: usize,
) -> Result<serde_json::Value, PipelineError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(bytes);
    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| PipelineError::format(format!("unreadable header row: {e}")))?
        .iter()
        .map(str::to_string)
        .collect();

    let guesser = TypeGuesser::new();
    let mut columns: Vec<Vec<_>> = vec![Vec::new(); headers.len()];
    for record in reader.byte_records().take(sample_rows) {
        let record =
            record.map_err(|e| PipelineError::format(format!("malformed row: {e}")))?;
        for (i, cell) in record.iter().enumerate().take(headers.len()) {
            let cell = String::from_utf8_lossy(cell);
            columns[i].push(guesser.candidates(&cell));
        }
    }

    let resolver = TypeResolver::default();
    let resolved: Vec<serde_json::Value> = headers
        .iter()
        .zip(&columns)
        .map(|(name, candidates)| {
            let resolved = resolver.resolve(candidates);
            serde_json::json!({
                "name": name,
                "type": resolved.ty,
                "format": resolved.format,
            })
        })
        .collect();
    Ok(serde_json::json!({ "columns": resolved }))
}
