//! Downstream change notification.
//!
//! Exactly one event is emitted per successful data stage, regardless of
//! how many sub-steps ran; the search/RDF synchronizer consumes it and
//! performs the actual index writes.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::PipelineError;

/// Event telling external synchronizers which object to refresh.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ResourceChanged {
    pub app_label: String,
    pub model_name: String,
    pub resource_id: u64,
}

#[async_trait]
pub trait ChangeNotifier: Send + Sync {
    async fn resource_changed(&self, event: ResourceChanged) -> Result<(), PipelineError>;
}

/// Notifier backed by an in-process channel, for tests and the CLI.
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<ResourceChanged>,
}

impl ChannelNotifier {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ResourceChanged>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl ChangeNotifier for ChannelNotifier {
    async fn resource_changed(&self, event: ResourceChanged) -> Result<(), PipelineError> {
        self.tx
            .send(event)
            .map_err(|e| PipelineError::internal(format!("notifier channel closed: {e}")))
    }
}

/// Notifier that drops events, for runs with no downstream consumers.
pub struct NullNotifier;

#[async_trait]
impl ChangeNotifier for NullNotifier {
    async fn resource_changed(&self, _event: ResourceChanged) -> Result<(), PipelineError> {
        Ok(())
    }
}
