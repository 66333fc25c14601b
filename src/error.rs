//! Error type shared by every apply stage.
//!
//! Naming-convention violations never show up here: they are logged (or
//! silently skipped) where they are found. Everything else bubbles up through
//! the orchestrator unchanged and becomes the run's terminal failure.

use std::path::PathBuf;

use thiserror::Error;

use crate::contract::ClientError;

#[derive(Debug, Error)]
pub enum ApplyError {
    /// Conflicting or missing run parameters, raised before any remote call.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The scaffold folder (after joining the environment) is not a directory.
    #[error("problem with supplied path {path:?}: not a readable directory")]
    InvalidScaffold { path: PathBuf },

    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A collaborator call failed while creating or publishing a resource.
    #[error("{kind} {name}: {source}")]
    Remote {
        kind: &'static str,
        name: String,
        #[source]
        source: ClientError,
    },

    #[error("version not found")]
    VersionNotFound,

    #[error("serviceAttachment not found in {file}")]
    ServiceAttachmentNotFound { file: String },

    #[error("malformed JSON in {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// The integration was published, but the pipeline result file could not be written.
    #[error("integration published but result artifact {path} could not be written: {source}")]
    ResultArtifact {
        path: String,
        #[source]
        source: ClientError,
    },
}

impl ApplyError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ApplyError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn remote(kind: &'static str, name: impl Into<String>, source: ClientError) -> Self {
        ApplyError::Remote {
            kind,
            name: name.into(),
            source,
        }
    }
}
