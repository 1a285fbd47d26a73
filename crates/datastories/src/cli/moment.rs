//! Moment listing, metadata and reordering commands

use datastories_core::{MomentId, StoryError};

use crate::cli::util::{Context, format_line, or_current, prompt_confirm};

/// Handle the list command
pub fn handle_list(ctx: &Context, markers_only: bool) -> bool {
    ctx.with_session(false, |session| {
        let timeline = session.timeline();
        if timeline.is_empty() {
            println!("No moments yet. Run 'datastories capture <document>' to record one.");
            return Ok(());
        }
        for moment in timeline.moments() {
            if markers_only && !moment.is_marker() {
                continue;
            }
            let is_current = timeline.current_id() == Some(moment.id());
            println!("{}", format_line(moment, is_current));
        }
        Ok(())
    })
}

/// Handle the show command
pub fn handle_show(ctx: &Context, id: Option<MomentId>) -> bool {
    ctx.with_session(false, |session| {
        let timeline = session.timeline();
        let id = or_current(timeline, id)?;
        let moment = timeline.moment(id).ok_or(StoryError::MomentNotFound(id))?;
        let position = timeline.position_of(id).map_or(0, |p| p + 1);

        println!("Moment {} ({} of {})", moment.id(), position, timeline.len());
        println!("Title:    {}", moment.title());
        println!("Marker:   {}", if moment.is_marker() { "yes" } else { "no" });
        println!("Current:  {}", if timeline.current_id() == Some(id) { "yes" } else { "no" });
        println!("Created:  {}", moment.created().with_timezone(&chrono::Local));
        println!("Modified: {}", moment.modified().with_timezone(&chrono::Local));
        match moment.diff() {
            Some(diff) => println!("Changes:  {}", diff.change_count()),
            None => println!("Changes:  initial state"),
        }
        println!();
        println!("{}", moment.narrative());
        Ok(())
    })
}

/// Handle the remove command
pub fn handle_remove(ctx: &Context, id: Option<MomentId>) -> bool {
    ctx.with_session(true, |session| {
        let timeline = session.timeline_mut()?;
        let removed = match id {
            Some(id) => timeline.remove(id)?,
            None => timeline.remove_current()?,
        };
        println!("✓ Removed moment {} ({})", removed.id(), removed.title());
        Ok(())
    })
}

/// Handle the move command
pub fn handle_move(ctx: &Context, id: MomentId, after: Option<MomentId>) -> bool {
    ctx.with_session(true, |session| {
        if session.timeline_mut()?.move_after(id, after)? {
            match after {
                Some(target) => println!("✓ Moved moment {} after {}", id, target),
                None => println!("✓ Moved moment {} to the front", id),
            }
        } else {
            println!("Moment {} is already there", id);
        }
        Ok(())
    })
}

/// Handle the combine command
pub fn handle_combine(ctx: &Context, id: MomentId, title: Option<String>) -> bool {
    ctx.with_session(true, |session| {
        let timeline = session.timeline_mut()?;
        let title = match title {
            Some(title) => title,
            None => {
                let moment = timeline.moment(id).ok_or(StoryError::MomentNotFound(id))?;
                let prev = moment.prev().ok_or(StoryError::NoPredecessor(id))?;
                let prev_title = timeline
                    .moment(prev)
                    .map(|m| m.title().to_string())
                    .unwrap_or_default();
                format!("{} + {}", prev_title, moment.title())
            }
        };
        let survivor = timeline.combine_with_predecessor(id, title)?;
        println!("✓ Combined moment {} into {}", id, survivor);
        Ok(())
    })
}

/// Handle the compact command
pub fn handle_compact(ctx: &Context, threshold_ms: Option<i64>, joiner: &str) -> bool {
    let threshold = threshold_ms.unwrap_or(ctx.config.timeline.rapid_succession_ms);
    ctx.with_session(true, |session| {
        let folded = session
            .timeline_mut()?
            .compact_rapid_succession(threshold, joiner)?;
        if folded.is_empty() {
            println!("Nothing captured within {} ms of its predecessor", threshold);
        } else {
            println!("✓ Folded {} moment(s)", folded.len());
        }
        Ok(())
    })
}

/// Handle the title command
pub fn handle_title(ctx: &Context, id: MomentId, title: String) -> bool {
    ctx.with_session(true, |session| {
        session.timeline_mut()?.set_title(id, title)?;
        println!("✓ Retitled moment {}", id);
        Ok(())
    })
}

/// Handle the narrative command
pub fn handle_narrative(ctx: &Context, id: Option<MomentId>, text: String) -> bool {
    ctx.with_session(true, |session| {
        let timeline = session.timeline_mut()?;
        match id {
            Some(id) => timeline.set_narrative(id, text)?,
            None => timeline.set_current_narrative(text)?,
        }
        println!("✓ Updated narrative");
        Ok(())
    })
}

/// Handle the mark command
pub fn handle_mark(ctx: &Context, id: MomentId, off: bool, toggle: bool) -> bool {
    ctx.with_session(true, |session| {
        let timeline = session.timeline_mut()?;
        let is_marker = if toggle {
            timeline.toggle_marker(id)?
        } else {
            timeline.set_marker(id, !off)?;
            !off
        };
        if is_marker {
            println!("✓ Moment {} is a marker", id);
        } else {
            println!("✓ Moment {} is no longer a marker", id);
        }
        Ok(())
    })
}

/// Handle the clear command
pub fn handle_clear(ctx: &Context, yes: bool) -> bool {
    if !yes && !prompt_confirm("Drop every moment?") {
        println!("Cancelled");
        return true;
    }
    ctx.with_session(true, |session| {
        session.timeline_mut()?.clear();
        println!("✓ Cleared timeline");
        Ok(())
    })
}
