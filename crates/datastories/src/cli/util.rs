//! Shared utilities for CLI commands

use std::io::{self, Write};
use std::path::PathBuf;

use datastories_core::{
    Config, FileStore, HistorySession, Moment, MomentId, Result, StoryError, Timeline,
};

/// Config and timeline location for one invocation.
pub struct Context {
    pub config: Config,
    pub store: FileStore,
}

impl Context {
    /// Resolve the config and the timeline file.
    ///
    /// `timeline_override` wins over the configured path.
    pub fn resolve(timeline_override: Option<PathBuf>) -> Option<Self> {
        let config = match Config::load() {
            Ok(config) => config,
            Err(e) => {
                eprintln!("✗ Error loading config: {}", e);
                return None;
            }
        };

        let path = match timeline_override.or_else(|| config.resolved_timeline_path()) {
            Some(path) => path,
            None => {
                eprintln!("✗ Could not determine where to keep the timeline; pass --timeline");
                return None;
            }
        };
        log::debug!("Using timeline at {}", path.display());

        Some(Self {
            config,
            store: FileStore::new(path),
        })
    }

    /// Load the session, run `f`, and save if `f` changed something.
    ///
    /// Returns true on success, false on error (after printing it).
    pub fn with_session<F>(&self, save: bool, f: F) -> bool
    where
        F: FnOnce(&mut HistorySession) -> Result<()>,
    {
        let mut session = match HistorySession::load_from(&self.store, self.config.timeline.clone()) {
            Ok(session) => session,
            Err(e) => {
                eprintln!("✗ Error loading timeline {}: {}", self.store.path().display(), e);
                return false;
            }
        };

        if let Err(e) = f(&mut session) {
            report(&e);
            return false;
        }

        if save && let Err(e) = session.save_to(&self.store) {
            eprintln!("✗ Error saving timeline: {}", e);
            return false;
        }
        true
    }
}

/// Print an error with a hint where one helps.
pub fn report(e: &StoryError) {
    eprintln!("✗ {}", e);
    if let StoryError::OutOfSequencePatch { .. } = e {
        eprintln!("  The timeline no longer replays. Run 'datastories rebuild <document>' to re-anchor it.");
    }
}

/// The given id, or the cursor.
pub fn or_current(timeline: &Timeline, id: Option<MomentId>) -> Result<MomentId> {
    match id {
        Some(id) => Ok(id),
        None => timeline.current_id().ok_or(StoryError::EmptyTimeline),
    }
}

/// One line per moment for `list`.
pub fn format_line(moment: &Moment, is_current: bool) -> String {
    format!(
        "{} {} {:>4}  {}  {}",
        if is_current { ">" } else { " " },
        if moment.is_marker() { "*" } else { " " },
        moment.id(),
        moment
            .created()
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M:%S"),
        moment.title()
    )
}

/// Prompt user for confirmation
pub fn prompt_confirm(message: &str) -> bool {
    print!("{} [y/N] ", message);
    if io::stdout().flush().is_err() {
        return false;
    }

    let mut input = String::new();
    if io::stdin().read_line(&mut input).is_err() {
        return false;
    }

    matches!(input.trim().to_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use datastories_core::Snapshot;
    use serde_json::json;

    #[test]
    fn test_or_current() {
        let mut timeline = Timeline::new();
        assert!(matches!(
            or_current(&timeline, None),
            Err(StoryError::EmptyTimeline)
        ));

        let id = timeline.capture_moment(Snapshot::new(json!({}))).unwrap();
        assert_eq!(or_current(&timeline, None).unwrap(), id);
        assert_eq!(
            or_current(&timeline, Some(MomentId::new(5))).unwrap(),
            MomentId::new(5)
        );
    }

    #[test]
    fn test_format_line_flags() {
        let mut timeline = Timeline::new();
        let id = timeline.capture_moment(Snapshot::new(json!({}))).unwrap();
        let line = format_line(timeline.moment(id).unwrap(), true);

        assert!(line.starts_with("> *"));
        assert!(line.ends_with("start"));
    }
}
