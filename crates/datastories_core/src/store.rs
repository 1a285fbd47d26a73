//! Load/save of serialized timelines.
//!
//! [`TimelineStore`] is the persistence seam: anything that can hand back and
//! accept a [`SerializedTimeline`] can back a
//! [`HistorySession`](crate::session::HistorySession).

use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use crate::error::{Result, StoryError};
use crate::timeline::SerializedTimeline;

/// Persistence backend for one timeline.
pub trait TimelineStore: Send + Sync {
    /// Load the stored timeline, or `None` if nothing was saved yet.
    fn load(&self) -> Result<Option<SerializedTimeline>>;

    /// Replace the stored timeline.
    fn save(&self, data: &SerializedTimeline) -> Result<()>;
}

/// In-memory store for tests and embedding.
///
/// Data is lost when dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<Option<SerializedTimeline>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl TimelineStore for MemoryStore {
    fn load(&self) -> Result<Option<SerializedTimeline>> {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        Ok(data.clone())
    }

    fn save(&self, data: &SerializedTimeline) -> Result<()> {
        let mut slot = self.data.write().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(data.clone());
        Ok(())
    }
}

/// Store that keeps the timeline as pretty-printed JSON in one file.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Create a store backed by `path`. Nothing is touched until the first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TimelineStore for FileStore {
    fn load(&self) -> Result<Option<SerializedTimeline>> {
        if !self.path.exists() {
            log::debug!("No timeline at {}", self.path.display());
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&self.path).map_err(|e| StoryError::FileRead {
            path: self.path.clone(),
            source: e,
        })?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn save(&self, data: &SerializedTimeline) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        // Write beside the target, then rename over it.
        let contents = serde_json::to_string_pretty(data)?;
        let staging = self.path.with_extension("json.tmp");
        std::fs::write(&staging, contents).map_err(|e| StoryError::FileWrite {
            path: staging.clone(),
            source: e,
        })?;
        std::fs::rename(&staging, &self.path).map_err(|e| StoryError::FileWrite {
            path: self.path.clone(),
            source: e,
        })?;

        log::debug!("Saved {} moments to {}", data.moments.len(), self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimelineSettings;
    use crate::snapshot::Snapshot;
    use crate::timeline::Timeline;
    use serde_json::json;

    fn record() -> SerializedTimeline {
        let mut timeline = Timeline::new();
        timeline.capture_moment(Snapshot::new(json!({"a": 1}))).unwrap();
        timeline.capture_moment(Snapshot::new(json!({"a": 2}))).unwrap();
        timeline.serialize()
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        assert!(store.load().unwrap().is_none());

        let data = record();
        store.save(&data).unwrap();
        assert_eq!(store.load().unwrap(), Some(data));
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("stories").join("timeline.json"));
        assert!(store.load().unwrap().is_none());

        let data = record();
        store.save(&data).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, data);
        let timeline = Timeline::deserialize(loaded, TimelineSettings::default()).unwrap();
        assert_eq!(timeline.len(), 2);
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[test]
    fn test_file_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("timeline.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(matches!(FileStore::new(&path).load(), Err(StoryError::Json(_))));
    }
}
