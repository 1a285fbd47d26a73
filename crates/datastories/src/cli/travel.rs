//! Commands that talk to the document: capture, travel, state, rebuild

use std::path::Path;

use datastories_core::MomentId;
use datastories_core::host::{JsonFileHost, StateProvider};

use crate::cli::block_on;
use crate::cli::util::{Context, or_current};

/// Handle the capture command
pub fn handle_capture(ctx: &Context, document: &Path, description: Option<String>) -> bool {
    let host = JsonFileHost::new(document);
    ctx.with_session(true, |session| {
        let id = block_on(session.capture_from(&host, description.as_deref()))?;
        let title = session
            .timeline()
            .moment(id)
            .map(|m| m.title().to_string())
            .unwrap_or_default();
        println!("✓ Captured moment {} ({})", id, title);

        let timeline = session.timeline();
        if let Some(prev) = timeline.moment(id).and_then(|m| m.prev())
            && timeline.detect_rapid_succession(prev, id, ctx.config.timeline.rapid_succession_ms)?
        {
            println!("  Captured right after moment {}; 'datastories compact' can fold them", prev);
        }
        Ok(())
    })
}

/// Handle the travel command
pub fn handle_travel(ctx: &Context, id: MomentId, document: &Path) -> bool {
    let host = JsonFileHost::new(document);
    ctx.with_session(true, |session| {
        block_on(session.travel_with(id, &host))?;
        println!("✓ Restored {} to moment {}", document.display(), id);
        Ok(())
    })
}

/// Handle the state command
pub fn handle_state(ctx: &Context, id: Option<MomentId>) -> bool {
    ctx.with_session(false, |session| {
        let timeline = session.timeline();
        let id = or_current(timeline, id)?;
        println!("{}", timeline.state_at(id)?.to_json_pretty()?);
        Ok(())
    })
}

/// Handle the rebuild command
pub fn handle_rebuild(ctx: &Context, document: &Path) -> bool {
    let host = JsonFileHost::new(document);
    ctx.with_session(true, |session| {
        let external = block_on(host.current_state())?;
        let rebuilt = session.timeline_mut()?.rebuild_from_state(external)?;
        if rebuilt.is_empty() {
            println!("Timeline replays cleanly; nothing to rebuild");
        } else {
            let ids: Vec<String> = rebuilt.iter().map(MomentId::to_string).collect();
            println!("✓ Re-anchored moments {}", ids.join(", "));
        }
        Ok(())
    })
}

/// Handle the verify command
pub fn handle_verify(ctx: &Context) -> bool {
    ctx.with_session(false, |session| {
        session.timeline().verify()?;
        println!("✓ {} moments replay cleanly", session.timeline().len());
        Ok(())
    })
}
