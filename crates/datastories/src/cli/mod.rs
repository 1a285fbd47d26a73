//! Command-line interface for DataStories.
//!
//! Every command loads the timeline from its file, runs, and saves it again
//! when something changed. The "host" document is a plain JSON file.

/// Clap argument definitions
mod args;

/// `init` and `config`
mod config;

/// Listing, metadata and reordering commands
mod moment;

/// `capture`, `travel`, `state`, `rebuild`, `verify`
mod travel;

/// Shared CLI utilities
mod util;

use clap::Parser;

pub use args::Cli;
use args::Commands;
use util::Context;

/// Helper to run async operations in sync context
fn block_on<F: std::future::Future>(f: F) -> F::Output {
    futures_lite::future::block_on(f)
}

/// Main entry point for the CLI
pub fn run_cli() {
    let cli = Cli::parse();

    // init writes the config, so it must not depend on resolving it first
    let success = match cli.command {
        Commands::Init {
            timeline_path,
            no_markers,
            rapid_succession_ms,
        } => config::handle_init(timeline_path.or(cli.timeline), no_markers, rapid_succession_ms),

        command => match Context::resolve(cli.timeline) {
            Some(ctx) => dispatch(&ctx, command),
            None => false,
        },
    };

    if !success {
        std::process::exit(1);
    }
}

fn dispatch(ctx: &Context, command: Commands) -> bool {
    match command {
        Commands::Init {
            timeline_path,
            no_markers,
            rapid_succession_ms,
        } => config::handle_init(timeline_path, no_markers, rapid_succession_ms),

        Commands::Capture {
            document,
            description,
        } => travel::handle_capture(ctx, &document, description),

        Commands::List { markers } => moment::handle_list(ctx, markers),

        Commands::Show { id } => moment::handle_show(ctx, id),

        Commands::State { id } => travel::handle_state(ctx, id),

        Commands::Travel { id, document } => travel::handle_travel(ctx, id, &document),

        Commands::Remove { id } => moment::handle_remove(ctx, id),

        Commands::Move { id, after } => moment::handle_move(ctx, id, after),

        Commands::Combine { id, title } => moment::handle_combine(ctx, id, title),

        Commands::Compact {
            threshold_ms,
            joiner,
        } => moment::handle_compact(ctx, threshold_ms, &joiner),

        Commands::Title { id, title } => moment::handle_title(ctx, id, title),

        Commands::Narrative { text, id } => moment::handle_narrative(ctx, id, text),

        Commands::Mark { id, off, toggle } => moment::handle_mark(ctx, id, off, toggle),

        Commands::Rebuild { document } => travel::handle_rebuild(ctx, &document),

        Commands::Verify => travel::handle_verify(ctx),

        Commands::Clear { yes } => moment::handle_clear(ctx, yes),

        Commands::Config => config::handle_config(ctx),
    }
}
