//! End-to-end pipeline runs over local files.

use std::io::Write;
use std::sync::Arc;

use zip::unstable::write::FileOptionsExt;

use assert_matches::assert_matches;
use chrono::Utc;
use ingest_pipeline::{
    reconcile, ChannelNotifier, ErrorKind, IngestionOrchestrator, MemoryStore,
    OrchestratorConfig, Resource, ResourceStore, StageKind, StageRecord, StageStatus,
};

fn write_temp(content: &[u8], suffix: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content).unwrap();
    file.flush().unwrap();
    file
}

fn orchestrator(
    store: Arc<MemoryStore>,
) -> (
    IngestionOrchestrator<MemoryStore, ChannelNotifier>,
    tokio::sync::mpsc::UnboundedReceiver<ingest_pipeline::ResourceChanged>,
) {
    let (notifier, rx) = ChannelNotifier::channel();
    let orchestrator =
        IngestionOrchestrator::new(store, Arc::new(notifier), OrchestratorConfig::default())
            .unwrap();
    (orchestrator, rx)
}

#[tokio::test]
async fn test_csv_resource_runs_all_stages() {
    let file = write_temp(b"id,amount\n1,10.5\n2,11.0\n", ".csv");
    let store = Arc::new(MemoryStore::new());
    store
        .insert_resource(Resource::new(1, "budget", file.path().to_str().unwrap()))
        .await
        .unwrap();

    let (orchestrator, mut rx) = orchestrator(Arc::clone(&store));
    orchestrator.ingest(1).await.unwrap();

    let resource = store.resource(1).await.unwrap();
    assert_eq!(resource.link_status, StageStatus::Success);
    assert_eq!(resource.file_status, StageStatus::Success);
    assert_eq!(resource.data_status, StageStatus::Success);
    assert_eq!(resource.openness_score.unwrap().value(), 3);

    let stored = store.file_record(1).await.unwrap().unwrap();
    assert_eq!(stored.format, "csv");
    assert_eq!(stored.mimetype, "text/csv");
    assert_eq!(stored.encoding, "utf-8");

    // Exactly one downstream refresh for the whole run.
    let event = rx.recv().await.unwrap();
    assert_eq!(event.resource_id, 1);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_turtle_resource_scores_five() {
    let ttl = b"<http://example.com/a> <http://example.com/knows> <http://example.com/b> .\n";
    let file = write_temp(ttl, ".ttl");
    let store = Arc::new(MemoryStore::new());
    store
        .insert_resource(Resource::new(2, "graph", file.path().to_str().unwrap()))
        .await
        .unwrap();

    let (orchestrator, _rx) = orchestrator(Arc::clone(&store));
    orchestrator.ingest(2).await.unwrap();

    let resource = store.resource(2).await.unwrap();
    assert_eq!(resource.openness_score.unwrap().value(), 5);
}

#[tokio::test]
async fn test_dead_link_fails_link_stage_and_short_circuits() {
    let store = Arc::new(MemoryStore::new());
    store
        .insert_resource(Resource::new(3, "gone", "/no/such/file.csv"))
        .await
        .unwrap();

    let (orchestrator, mut rx) = orchestrator(Arc::clone(&store));
    let err = orchestrator.ingest(3).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Transport);

    let resource = store.resource(3).await.unwrap();
    assert_eq!(resource.link_status, StageStatus::Failure);
    assert_eq!(resource.file_status, StageStatus::Pending);
    assert_eq!(resource.data_status, StageStatus::Pending);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_encrypted_archive_is_a_security_policy_failure() {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options =
        zip::write::SimpleFileOptions::default().with_deprecated_encryption(b"secret");
    writer.start_file("data.csv", options).unwrap();
    writer.write_all(b"a,b\n1,2\n").unwrap();
    let bytes = writer.finish().unwrap().into_inner();
    let file = write_temp(&bytes, ".zip");

    let store = Arc::new(MemoryStore::new());
    store
        .insert_resource(Resource::new(4, "locked", file.path().to_str().unwrap()))
        .await
        .unwrap();

    let (orchestrator, mut rx) = orchestrator(Arc::clone(&store));
    let err = orchestrator.ingest(4).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::SecurityPolicy);
    assert!(!err.is_retryable());

    let resource = store.resource(4).await.unwrap();
    assert_eq!(resource.link_status, StageStatus::Success);
    assert_eq!(resource.file_status, StageStatus::Failure);
    assert_eq!(resource.data_status, StageStatus::Pending);
    assert!(rx.try_recv().is_err());

    let history = store.history(4).await.unwrap();
    let failure = history
        .iter()
        .find(|r| r.stage == StageKind::File && r.status == StageStatus::Failure)
        .unwrap();
    assert_matches!(
        failure.error.as_ref().map(|e| e.kind),
        Some(ErrorKind::SecurityPolicy)
    );
}

#[tokio::test]
async fn test_single_member_zip_unwraps_to_inner_score() {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    writer
        .start_file("data.csv", zip::write::SimpleFileOptions::default())
        .unwrap();
    writer.write_all(b"a,b\n1,2\n").unwrap();
    let bytes = writer.finish().unwrap().into_inner();
    let file = write_temp(&bytes, ".zip");

    let store = Arc::new(MemoryStore::new());
    store
        .insert_resource(Resource::new(5, "wrapped", file.path().to_str().unwrap()))
        .await
        .unwrap();

    let (orchestrator, _rx) = orchestrator(Arc::clone(&store));
    orchestrator.ingest(5).await.unwrap();

    let resource = store.resource(5).await.unwrap();
    // The inner csv decides the score, not the container.
    assert_eq!(resource.openness_score.unwrap().value(), 3);
    assert_eq!(store.file_record(5).await.unwrap().unwrap().format, "zip");
}

#[tokio::test]
async fn test_shp_named_archive_keeps_bundle_score() {
    // A zipped shapefile component published as .shp: the container must
    // not be unwrapped, and the bundle default wins over what sniffing the
    // member would yield.
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    writer
        .start_file("blob", zip::write::SimpleFileOptions::default())
        .unwrap();
    writer.write_all(&[0u8, 1, 2, 3]).unwrap();
    let bytes = writer.finish().unwrap().into_inner();
    let file = write_temp(&bytes, ".shp");

    let store = Arc::new(MemoryStore::new());
    store
        .insert_resource(Resource::new(8, "parcels", file.path().to_str().unwrap()))
        .await
        .unwrap();

    let (orchestrator, _rx) = orchestrator(Arc::clone(&store));
    orchestrator.ingest(8).await.unwrap();

    let resource = store.resource(8).await.unwrap();
    assert_eq!(resource.openness_score.unwrap().value(), 3);
}

#[tokio::test]
async fn test_rerun_overwrites_derived_file() {
    let file = write_temp(b"a,b\n1,2\n", ".csv");
    let store = Arc::new(MemoryStore::new());
    store
        .insert_resource(Resource::new(6, "twice", file.path().to_str().unwrap()))
        .await
        .unwrap();

    let (orchestrator, _rx) = orchestrator(Arc::clone(&store));
    orchestrator.ingest(6).await.unwrap();
    let first = store.file_record(6).await.unwrap().unwrap();
    orchestrator.ingest(6).await.unwrap();
    let second = store.file_record(6).await.unwrap().unwrap();

    assert_eq!(first.path, second.path);
    // Both runs' records are preserved in the history.
    let history = store.history(6).await.unwrap();
    let data_successes = history
        .iter()
        .filter(|r| r.stage == StageKind::Data && r.status == StageStatus::Success)
        .count();
    assert_eq!(data_successes, 2);
}

#[tokio::test]
async fn test_reconcile_times_out_stuck_runs() {
    let store = Arc::new(MemoryStore::new());
    store
        .insert_resource(Resource::new(7, "stuck", "/irrelevant.csv"))
        .await
        .unwrap();
    let old = Utc::now() - chrono::Duration::hours(3);
    store
        .record_stage(7, StageRecord::pending(StageKind::Link, old))
        .await
        .unwrap();

    let count = reconcile(store.as_ref(), Utc::now() - chrono::Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(count, 1);
    assert_eq!(
        store.stage_status(7, StageKind::Link).await.unwrap(),
        StageStatus::Failure
    );
}
