#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Configuration options
pub mod config;

/// Error (common error types)
pub mod error;

/// Host collaborators (state provider and applier)
pub mod host;

/// A single recorded point in the history
pub mod moment;

/// Host round-trip protocol around a timeline
pub mod session;

/// Snapshot and diff primitive
pub mod snapshot;

/// Persistence backends for serialized timelines
pub mod store;

/// Timeline (ordered moments, reconstruction and persistence codec)
pub mod timeline;

pub use config::{Config, TimelineSettings};
pub use error::{Result, SerializableError, StoryError};
pub use moment::{Moment, MomentId, MomentRecord, MomentSummary};
pub use session::{HistorySession, HostNotification, NotificationOutcome, PendingRequest, RequestId};
pub use snapshot::{Diff, Snapshot};
pub use store::{FileStore, MemoryStore, TimelineStore};
pub use timeline::{SerializedTimeline, Timeline};
