//! Config command handlers

use std::path::PathBuf;

use datastories_core::Config;

use crate::cli::util::Context;

/// Handle the init command
pub fn handle_init(
    timeline_path: Option<PathBuf>,
    no_markers: bool,
    rapid_succession_ms: Option<i64>,
) -> bool {
    let mut config = Config::load().unwrap_or_default();
    if let Some(path) = timeline_path {
        config.timeline_path = Some(path);
    }
    if no_markers {
        config.timeline.mark_new_moments = false;
    }
    if let Some(ms) = rapid_succession_ms {
        config.timeline.rapid_succession_ms = ms;
    }

    match config.save() {
        Ok(()) => {
            if let Some(path) = Config::config_path() {
                println!("✓ Wrote config to {}", path.display());
            }
            if let Some(path) = config.resolved_timeline_path() {
                println!("  Timeline: {}", path.display());
            }
            true
        }
        Err(e) => {
            eprintln!("✗ Error saving config: {}", e);
            false
        }
    }
}

/// Show the effective configuration
pub fn handle_config(ctx: &Context) -> bool {
    let settings = &ctx.config.timeline;
    println!("DataStories Configuration");
    println!("=========================");
    if let Some(path) = Config::config_path() {
        println!("Config file: {}", path.display());
    }
    println!("Timeline: {}", ctx.store.path().display());
    println!("Rapid succession window: {} ms", settings.rapid_succession_ms);
    println!("Mark new moments: {}", settings.mark_new_moments);
    println!("Start title: {}", settings.start_title);
    println!("Moment title prefix: {}", settings.moment_title_prefix);
    println!("Narrative prompt: {}", settings.narrative_prompt);
    true
}
