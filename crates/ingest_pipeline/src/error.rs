//! Pipeline error taxonomy.
//!
//! Every failure is classified into one of four kinds, and the kind alone
//! decides retry behavior: transport errors are retryable, everything else
//! is terminal for the current run.

use ingest_archive::ArchiveError;
use ingest_sniff::SniffError;

use crate::model::StageError;

/// Failure classification used by the retry policy and stage records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Network, timeout or IO failure; retrying may succeed.
    Transport,
    /// Unparseable or structurally invalid content; retrying reproduces it.
    Format,
    /// Disallowed content, e.g. a password-protected archive. Terminal, and
    /// kept distinct from format errors so operators can message the owner.
    SecurityPolicy,
    /// Anything unexpected, recorded and re-raised to the queue layer.
    Internal,
}

#[derive(Debug, thiserror::Error)]
#[error("{}: {message}", kind_name(*.kind))]
pub struct PipelineError {
    pub kind: ErrorKind,
    pub message: String,
}

fn kind_name(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Transport => "transport error",
        ErrorKind::Format => "format error",
        ErrorKind::SecurityPolicy => "security policy violation",
        ErrorKind::Internal => "internal error",
    }
}

impl PipelineError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Transport,
            message: message.into(),
        }
    }

    pub fn format(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Format,
            message: message.into(),
        }
    }

    pub fn security_policy(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::SecurityPolicy,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Internal,
            message: message.into(),
        }
    }

    /// Whether the task queue should schedule another attempt.
    pub fn is_retryable(&self) -> bool {
        self.kind == ErrorKind::Transport
    }

    pub fn stage_error(&self) -> StageError {
        StageError {
            kind: self.kind,
            message: self.message.clone(),
        }
    }
}

impl From<ArchiveError> for PipelineError {
    fn from(err: ArchiveError) -> Self {
        let kind = match &err {
            ArchiveError::PasswordProtected { .. } => ErrorKind::SecurityPolicy,
            ArchiveError::Io(_) => ErrorKind::Transport,
            _ => ErrorKind::Format,
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}

impl From<SniffError> for PipelineError {
    fn from(err: SniffError) -> Self {
        match err {
            SniffError::Archive(inner) => inner.into(),
        }
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        Self::transport(err.to_string())
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        Self::transport(err.to_string())
    }
}

impl From<reqwest_middleware::Error> for PipelineError {
    fn from(err: reqwest_middleware::Error) -> Self {
        Self::transport(err.to_string())
    }
}

impl From<tokio::task::JoinError> for PipelineError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::internal(err.to_string())
    }
}
