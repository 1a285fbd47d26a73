//! Host collaborators.
//!
//! The external editor owns the live document. The history engine only ever
//! asks it for the current state (once per capture) and hands it a
//! reconstructed state to apply (once per travel). Both are async because a
//! real host answers over a message channel.
//!
//! ## Object safety
//!
//! The traits return boxed futures so they can be used as `&dyn StateProvider`
//! and `&dyn StateApplier`.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use crate::error::{Result, StoryError};
use crate::snapshot::Snapshot;

/// A boxed future for object-safe async methods.
#[cfg(not(target_arch = "wasm32"))]
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A boxed future for object-safe async methods.
///
/// WASM version without `Send` requirement - JavaScript is single-threaded.
#[cfg(target_arch = "wasm32")]
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// Supplies the live document state.
pub trait StateProvider: Send + Sync {
    /// Fetch the full current state of the document.
    fn current_state(&self) -> BoxFuture<'_, Result<Snapshot>>;
}

/// Replaces the live document with a reconstructed state.
pub trait StateApplier: Send + Sync {
    /// Apply `state`; resolves once the host acknowledges the restore.
    fn apply_state<'a>(&'a self, state: &'a Snapshot) -> BoxFuture<'a, Result<()>>;
}

/// Host whose document is a JSON file on disk.
#[derive(Debug, Clone)]
pub struct JsonFileHost {
    path: PathBuf,
}

impl JsonFileHost {
    /// Use the JSON document at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The document file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateProvider for JsonFileHost {
    fn current_state(&self) -> BoxFuture<'_, Result<Snapshot>> {
        Box::pin(async move {
            let contents =
                std::fs::read_to_string(&self.path).map_err(|e| StoryError::FileRead {
                    path: self.path.clone(),
                    source: e,
                })?;
            Snapshot::from_json(&contents)
        })
    }
}

impl StateApplier for JsonFileHost {
    fn apply_state<'a>(&'a self, state: &'a Snapshot) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let contents = state.to_json_pretty()?;
            std::fs::write(&self.path, contents).map_err(|e| StoryError::FileWrite {
                path: self.path.clone(),
                source: e,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_lite::future::block_on;
    use serde_json::json;

    #[test]
    fn test_json_file_host_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let host = JsonFileHost::new(dir.path().join("document.json"));
        let state = Snapshot::new(json!({"components": [{"type": "table"}]}));

        block_on(host.apply_state(&state)).unwrap();

        assert_eq!(block_on(host.current_state()).unwrap(), state);
    }

    #[test]
    fn test_missing_document() {
        let dir = tempfile::tempdir().unwrap();
        let host = JsonFileHost::new(dir.path().join("missing.json"));

        assert!(matches!(
            block_on(host.current_state()),
            Err(StoryError::FileRead { .. })
        ));
    }
}
