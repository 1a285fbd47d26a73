//! Command-line argument structures and enums

use clap::{Parser, Subcommand};
use datastories_core::MomentId;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "datastories")]
#[command(version)]
#[command(about = "Record, annotate and time-travel through a JSON document's history", long_about = None)]
pub struct Cli {
    /// Override timeline file location
    #[arg(short, long, global = true)]
    pub timeline: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a config file with the timeline location and moment defaults
    Init {
        /// Where to keep the timeline (default: platform data directory)
        #[arg(short = 'p', long)]
        timeline_path: Option<PathBuf>,

        /// Do not flag new moments as markers
        #[arg(long)]
        no_markers: bool,

        /// Rapid succession window in milliseconds
        #[arg(long)]
        rapid_succession_ms: Option<i64>,
    },

    /// Record the current state of a JSON document as a new moment
    #[command(alias = "c")]
    Capture {
        /// The JSON document to read
        document: PathBuf,

        /// Description of what changed (becomes the title)
        #[arg(short, long)]
        description: Option<String>,
    },

    /// List moments from first to last
    #[command(alias = "ls")]
    List {
        /// Only show markers
        #[arg(short, long)]
        markers: bool,
    },

    /// Show one moment in full
    Show {
        /// Moment id (default: current)
        id: Option<MomentId>,
    },

    /// Print the reconstructed document at a moment
    State {
        /// Moment id (default: current)
        id: Option<MomentId>,
    },

    /// Restore a JSON document to the state at a moment
    #[command(alias = "t")]
    Travel {
        /// Moment to travel to
        id: MomentId,

        /// The JSON document to overwrite
        document: PathBuf,
    },

    /// Remove a moment
    #[command(alias = "rm")]
    Remove {
        /// Moment id (default: current)
        id: Option<MomentId>,
    },

    /// Move a moment after another one
    #[command(alias = "mv")]
    Move {
        /// Moment to move
        id: MomentId,

        /// Moment to place it after (default: move to the front)
        #[arg(short, long)]
        after: Option<MomentId>,
    },

    /// Fold a moment into its predecessor
    Combine {
        /// Moment to fold
        id: MomentId,

        /// Title of the merged moment (default: both titles joined)
        #[arg(long)]
        title: Option<String>,
    },

    /// Fold every moment captured in rapid succession into its predecessor
    Compact {
        /// Window in milliseconds (default: config's rapid_succession_ms)
        #[arg(long)]
        threshold_ms: Option<i64>,

        /// Separator used to join merged titles
        #[arg(long, default_value = " + ")]
        joiner: String,
    },

    /// Set a moment's title
    Title {
        /// Moment id
        id: MomentId,

        /// New title
        title: String,
    },

    /// Set a moment's narrative
    Narrative {
        /// New narrative text
        text: String,

        /// Moment id (default: current)
        #[arg(long)]
        id: Option<MomentId>,
    },

    /// Flag or unflag a moment as a marker
    Mark {
        /// Moment id
        id: MomentId,

        /// Clear the marker instead of setting it
        #[arg(long, conflicts_with = "toggle")]
        off: bool,

        /// Flip the marker
        #[arg(long)]
        toggle: bool,
    },

    /// Re-anchor a timeline that no longer replays to a document's current state
    Rebuild {
        /// The JSON document holding the state to anchor to
        document: PathBuf,
    },

    /// Replay the whole timeline and report the first broken moment
    Verify,

    /// Drop every moment
    Clear {
        /// Skip confirmation
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Show current configuration
    Config,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_move_and_mark() {
        let cli = Cli::try_parse_from(["datastories", "move", "3", "--after", "1"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Move { id, after: Some(after) } if id == MomentId::new(3) && after == MomentId::new(1)
        ));

        let cli = Cli::try_parse_from(["datastories", "-t", "/tmp/t.json", "mark", "2", "--toggle"])
            .unwrap();
        assert_eq!(cli.timeline, Some(PathBuf::from("/tmp/t.json")));
        assert!(matches!(cli.command, Commands::Mark { toggle: true, off: false, .. }));

        assert!(Cli::try_parse_from(["datastories", "mark", "2", "--off", "--toggle"]).is_err());
    }
}
