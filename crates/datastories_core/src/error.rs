use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;
use ts_rs::TS;

use crate::moment::MomentId;
use crate::session::PendingRequest;

/// Unified error type for history operations
#[derive(Debug, Error)]
pub enum StoryError {
    // Replay errors
    #[error("Diff stored on moment {moment} does not apply to the replayed state: {reason}")]
    OutOfSequencePatch { moment: MomentId, reason: String },

    // Caller errors
    #[error("Moment {0} is not on the timeline")]
    MomentNotFound(MomentId),

    #[error("Moment {0} has no predecessor to combine with")]
    NoPredecessor(MomentId),

    #[error("The timeline has no moments")]
    EmptyTimeline,

    #[error("A {0} request is already outstanding")]
    RequestOutstanding(PendingRequest),

    #[error("No moment ids left to assign")]
    IdsExhausted,

    // Persistence errors
    #[error("Invalid timeline record: {0}")]
    InvalidRecord(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Config errors
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("Could not determine config directory")]
    NoConfigDir,

    // Host errors
    #[error("Host error: {0}")]
    Host(String),
}

/// Result type alias for history operations
pub type Result<T> = std::result::Result<T, StoryError>;

/// A serializable representation of StoryError for IPC with the UI layer
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SerializableError {
    /// Error kind/variant name
    pub kind: String,
    /// Human-readable error message
    pub message: String,
    /// Moment the error refers to (if applicable)
    #[ts(type = "number | null")]
    pub moment: Option<MomentId>,
}

impl From<&StoryError> for SerializableError {
    fn from(err: &StoryError) -> Self {
        let kind = match err {
            StoryError::OutOfSequencePatch { .. } => "OutOfSequencePatch",
            StoryError::MomentNotFound(_) => "MomentNotFound",
            StoryError::NoPredecessor(_) => "NoPredecessor",
            StoryError::EmptyTimeline => "EmptyTimeline",
            StoryError::RequestOutstanding(_) => "RequestOutstanding",
            StoryError::IdsExhausted => "IdsExhausted",
            StoryError::InvalidRecord(_) => "InvalidRecord",
            StoryError::Io(_) => "Io",
            StoryError::FileRead { .. } => "FileRead",
            StoryError::FileWrite { .. } => "FileWrite",
            StoryError::Json(_) => "Json",
            StoryError::ConfigParse(_) => "ConfigParse",
            StoryError::ConfigSerialize(_) => "ConfigSerialize",
            StoryError::NoConfigDir => "NoConfigDir",
            StoryError::Host(_) => "Host",
        }
        .to_string();

        let moment = match err {
            StoryError::OutOfSequencePatch { moment, .. } => Some(*moment),
            StoryError::MomentNotFound(id) => Some(*id),
            StoryError::NoPredecessor(id) => Some(*id),
            _ => None,
        };

        Self {
            kind,
            message: err.to_string(),
            moment,
        }
    }
}

impl From<StoryError> for SerializableError {
    fn from(err: StoryError) -> Self {
        SerializableError::from(&err)
    }
}

impl StoryError {
    /// Convert to a serializable representation for IPC
    pub fn to_serializable(&self) -> SerializableError {
        SerializableError::from(self)
    }

    /// Whether the caller can recover by fixing its arguments or retrying later.
    ///
    /// Replay corruption and storage failures are not recoverable this way.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            StoryError::MomentNotFound(_)
                | StoryError::NoPredecessor(_)
                | StoryError::EmptyTimeline
                | StoryError::RequestOutstanding(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializable_error_carries_moment() {
        let err = StoryError::NoPredecessor(MomentId::new(4));
        let ser = err.to_serializable();

        assert_eq!(ser.kind, "NoPredecessor");
        assert_eq!(ser.moment, Some(MomentId::new(4)));
        assert!(ser.message.contains("4"));
    }

    #[test]
    fn test_caller_errors() {
        assert!(StoryError::EmptyTimeline.is_caller_error());
        assert!(StoryError::RequestOutstanding(PendingRequest::Capture).is_caller_error());
        assert!(
            !StoryError::OutOfSequencePatch {
                moment: MomentId::new(1),
                reason: "missing key".to_string(),
            }
            .is_caller_error()
        );
    }
}
