//! The ordered chain of recorded moments and the cursor over it.
//!
//! Moments live in an arena keyed by [`MomentId`]; `prev`/`next` links are ids,
//! never references, so nothing can outlive its removal from the chain.
//!
//! # Rebase on structural edits
//!
//! Every moment stands for the absolute document state it was captured with.
//! Inserting, removing or moving a moment changes which moment precedes some
//! others, so the diffs of those moments are recomputed against their new
//! predecessors. After any structural edit each surviving moment still
//! reconstructs to the state it was recorded with, and replay from the head
//! stays in sequence.
//!
//! All operations compute everything that can fail (replays, diffs) before
//! touching the chain, so an error leaves the timeline exactly as it was.

mod codec;
mod reconstruct;

pub use codec::{FORMAT_VERSION, SerializedTimeline};

use indexmap::IndexMap;

use crate::config::TimelineSettings;
use crate::error::{Result, StoryError};
use crate::moment::{Moment, MomentId, MomentSummary};
use crate::snapshot::{Diff, PatchFailure, Snapshot};
use reconstruct::SnapshotCache;

/// Ordered, doubly-linked history of a document with a movable cursor.
#[derive(Debug, Default)]
pub struct Timeline {
    /// Arena owning every moment on the chain
    moments: IndexMap<MomentId, Moment>,
    head: Option<MomentId>,
    /// Cursor; `Some` iff the timeline is non-empty
    current: Option<MomentId>,
    /// Full state represented by `head`
    initial_snapshot: Option<Snapshot>,
    next_id: u64,
    settings: TimelineSettings,
    cache: SnapshotCache,
}

/// New diffs (and possibly a new initial snapshot) computed ahead of a relink.
struct Rebase {
    diffs: Vec<(MomentId, Option<Diff>)>,
    initial: Option<Snapshot>,
}

impl Timeline {
    /// Create an empty timeline with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty timeline with the given settings.
    pub fn with_settings(settings: TimelineSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    /// Settings applied to new moments.
    pub fn settings(&self) -> &TimelineSettings {
        &self.settings
    }

    // ========================================================================
    // Read access
    // ========================================================================

    /// Number of moments on the chain.
    pub fn len(&self) -> usize {
        self.moments.len()
    }

    /// Whether no moment has been captured (or all were removed).
    pub fn is_empty(&self) -> bool {
        self.moments.is_empty()
    }

    /// The earliest moment.
    pub fn head_id(&self) -> Option<MomentId> {
        self.head
    }

    /// The latest moment in chain order.
    pub fn tail_id(&self) -> Option<MomentId> {
        self.moments().last().map(Moment::id)
    }

    /// The cursor.
    pub fn current_id(&self) -> Option<MomentId> {
        self.current
    }

    /// The moment under the cursor.
    pub fn current(&self) -> Option<&Moment> {
        self.current.and_then(|id| self.moments.get(&id))
    }

    /// Look up a moment by id.
    pub fn moment(&self, id: MomentId) -> Option<&Moment> {
        self.moments.get(&id)
    }

    /// Whether the moment is on the chain.
    pub fn contains(&self, id: MomentId) -> bool {
        self.moments.contains_key(&id)
    }

    /// Full state represented by the head moment.
    pub fn initial_snapshot(&self) -> Option<&Snapshot> {
        self.initial_snapshot.as_ref()
    }

    /// Iterate from head to tail.
    pub fn moments(&self) -> Moments<'_> {
        Moments {
            timeline: self,
            cursor: self.head,
        }
    }

    /// Ids from head to tail.
    pub fn ids(&self) -> Vec<MomentId> {
        self.moments().map(Moment::id).collect()
    }

    /// 0-based position of a moment in chain order.
    pub fn position_of(&self, id: MomentId) -> Option<usize> {
        self.moments().position(|m| m.id() == id)
    }

    /// One summary per moment, head to tail, for the UI strip.
    pub fn summaries(&self) -> Vec<MomentSummary> {
        self.moments()
            .map(|m| MomentSummary::of(m, Some(m.id()) == self.current))
            .collect()
    }

    fn get(&self, id: MomentId) -> Result<&Moment> {
        self.moments.get(&id).ok_or(StoryError::MomentNotFound(id))
    }

    fn get_mut(&mut self, id: MomentId) -> Result<&mut Moment> {
        self.moments
            .get_mut(&id)
            .ok_or(StoryError::MomentNotFound(id))
    }

    /// Hand out the next id. The counter never wraps, so ids are never reused.
    fn allocate_id(&mut self) -> Result<MomentId> {
        let next = self.next_id.checked_add(1).ok_or(StoryError::IdsExhausted)?;
        let id = MomentId::new(self.next_id);
        self.next_id = next;
        Ok(id)
    }

    // ========================================================================
    // Capture
    // ========================================================================

    /// Record a newly observed external state.
    ///
    /// On an empty timeline the state becomes the initial snapshot and the head
    /// moment is created. Otherwise a new moment holding the diff from the
    /// state at the cursor is inserted right after the cursor, and the cursor
    /// advances to it.
    pub fn capture_moment(&mut self, raw: Snapshot) -> Result<MomentId> {
        self.capture_described(raw, None)
    }

    /// Like [`capture_moment`](Self::capture_moment), titling the new moment
    /// after the host's description of the user action.
    pub fn capture_described(
        &mut self,
        raw: Snapshot,
        description: Option<&str>,
    ) -> Result<MomentId> {
        let Some(current) = self.current else {
            let id = self.allocate_id()?;
            let mut head = Moment::head(id, &self.settings);
            if let Some(text) = description.map(str::trim).filter(|t| !t.is_empty()) {
                head.set_title(text);
            }
            self.moments.insert(id, head);
            self.head = Some(id);
            self.current = Some(id);
            self.cache.insert(id, raw.clone());
            self.initial_snapshot = Some(raw);
            log::info!("Captured initial moment {}", id);
            return Ok(id);
        };

        let diff = Diff::compute(&self.state_at(current)?, &raw);
        let successor = self.get(current)?.next;
        let successor_diff = match successor {
            Some(next) => Some(Diff::compute(&raw, &self.state_at(next)?)),
            None => None,
        };

        let id = self.allocate_id()?;
        let moment = Moment::following(id, diff, description, &self.settings);
        self.moments.insert(id, moment);
        self.attach_after(id, Some(current))?;
        if let (Some(next), Some(diff)) = (successor, successor_diff) {
            self.get_mut(next)?.set_diff(Some(diff));
        }
        self.current = Some(id);
        self.cache.insert(id, raw);

        log::info!("Captured moment {} after {}", id, current);
        Ok(id)
    }

    // ========================================================================
    // Removal
    // ========================================================================

    /// Remove the moment under the cursor.
    ///
    /// The cursor moves to the predecessor, or to the successor (the new head)
    /// when the head was removed.
    pub fn remove_current(&mut self) -> Result<Moment> {
        let id = self.current.ok_or(StoryError::EmptyTimeline)?;
        self.remove(id)
    }

    /// Remove any moment. The cursor only moves if it was on the removed moment.
    pub fn remove(&mut self, id: MomentId) -> Result<Moment> {
        let (prev, next) = self.links(id)?;
        let rebase = match next {
            Some(next) => self.plan_rebase(&[(next, prev)])?,
            None => Rebase {
                diffs: Vec::new(),
                initial: None,
            },
        };

        self.detach(id)?;
        let removed = self
            .moments
            .swap_remove(&id)
            .ok_or(StoryError::MomentNotFound(id))?;
        self.apply_rebase(rebase)?;

        if self.current == Some(id) {
            self.current = prev.or(next);
        }
        if self.moments.is_empty() {
            self.initial_snapshot = None;
        }
        self.cache.evict(id);

        log::info!("Removed moment {}", id);
        Ok(removed)
    }

    /// Drop every moment. Ids keep counting from where they were.
    pub fn clear(&mut self) {
        self.moments.clear();
        self.head = None;
        self.current = None;
        self.initial_snapshot = None;
        self.cache.clear();
        log::info!("Cleared timeline");
    }

    // ========================================================================
    // Reordering
    // ========================================================================

    /// Move `moment` to sit right after `target`, or to the front when
    /// `target` is `None`.
    ///
    /// Returns `false` when the move would not change the order (the moment
    /// already sits there, or `target` is the moment itself).
    pub fn move_after(&mut self, moment: MomentId, target: Option<MomentId>) -> Result<bool> {
        let (old_prev, old_next) = self.links(moment)?;
        if let Some(target) = target {
            self.get(target)?;
        }
        if target == Some(moment) || target == old_prev {
            log::debug!("Move of {} is a no-op", moment);
            return Ok(false);
        }

        let new_next = match target {
            Some(target) => self.get(target)?.next,
            None => self.head,
        };

        let mut changes = vec![(moment, target)];
        if let Some(next) = old_next {
            changes.push((next, old_prev));
        }
        if let Some(next) = new_next {
            changes.push((next, Some(moment)));
        }
        let rebase = self.plan_rebase(&changes)?;

        self.detach(moment)?;
        self.attach_after(moment, target)?;
        self.apply_rebase(rebase)?;

        log::info!(
            "Moved moment {} after {}",
            moment,
            target.map_or_else(|| "start".to_string(), |t| t.to_string())
        );
        Ok(true)
    }

    // ========================================================================
    // Travel
    // ========================================================================

    /// Reconstruct the state at `moment` and move the cursor there.
    ///
    /// No diff is touched.
    pub fn travel_to(&mut self, moment: MomentId) -> Result<Snapshot> {
        let state = self.state_at(moment)?;
        self.current = Some(moment);
        Ok(state)
    }

    /// Move the cursor without reconstructing.
    pub(crate) fn set_cursor(&mut self, moment: MomentId) -> Result<()> {
        self.get(moment)?;
        self.current = Some(moment);
        Ok(())
    }

    // ========================================================================
    // Compaction
    // ========================================================================

    /// Fold `moment` into its predecessor.
    ///
    /// The predecessor survives with `merged_title` and a diff that goes
    /// straight from the state before it to the state at `moment`; `moment`
    /// is removed. Returns the surviving id.
    pub fn combine_with_predecessor(
        &mut self,
        moment: MomentId,
        merged_title: impl Into<String>,
    ) -> Result<MomentId> {
        let predecessor = self.get(moment)?.prev.ok_or(StoryError::NoPredecessor(moment))?;
        let merged_state = self.state_at(moment)?;
        let (survivor_diff, new_initial) = match self.get(predecessor)?.prev {
            Some(before) => (
                Some(Diff::compute(&self.state_at(before)?, &merged_state)),
                None,
            ),
            None => (None, Some(merged_state.clone())),
        };

        self.detach(moment)?;
        let folded = self
            .moments
            .swap_remove(&moment)
            .ok_or(StoryError::MomentNotFound(moment))?;

        let prompt = self.settings.narrative_prompt.clone();
        let survivor = self.get_mut(predecessor)?;
        survivor.set_diff(survivor_diff);
        survivor.set_title(merged_title);
        if folded.is_marker() && !survivor.is_marker() {
            survivor.set_marker(true);
        }
        let survivor_narrative = survivor.narrative().trim();
        if survivor_narrative.is_empty() || survivor_narrative == prompt.trim() {
            survivor.set_narrative(folded.narrative());
        }

        if let Some(initial) = new_initial {
            self.initial_snapshot = Some(initial);
        }
        if self.current == Some(moment) {
            self.current = Some(predecessor);
        }
        self.cache.evict(moment);
        self.cache.insert(predecessor, merged_state);

        log::info!("Combined moment {} into {}", moment, predecessor);
        Ok(predecessor)
    }

    /// Whether `b` followed `a` quickly enough to count as the same action.
    ///
    /// True when `b` was created less than `threshold_ms` after `a` and `a`
    /// is not the head.
    pub fn detect_rapid_succession(
        &self,
        a: MomentId,
        b: MomentId,
        threshold_ms: i64,
    ) -> Result<bool> {
        let first = self.get(a)?;
        let second = self.get(b)?;
        if first.prev.is_none() {
            return Ok(false);
        }
        let elapsed = second.created() - first.created();
        Ok(elapsed.num_milliseconds() < threshold_ms)
    }

    /// Fold every moment that followed its predecessor in rapid succession.
    ///
    /// Titles are joined with `joiner`. The chain is verified before the
    /// first fold, so a corrupted timeline is reported without any change.
    /// Returns the ids that were folded away.
    pub fn compact_rapid_succession(
        &mut self,
        threshold_ms: i64,
        joiner: &str,
    ) -> Result<Vec<MomentId>> {
        self.verify()?;

        let mut folded = Vec::new();
        let mut cursor = self.head.and_then(|head| self.moments.get(&head)?.next);
        while let Some(id) = cursor {
            let moment = self.get(id)?;
            let next = moment.next;
            if let Some(prev) = moment.prev
                && self.detect_rapid_succession(prev, id, threshold_ms)?
            {
                let title = format!("{}{}{}", self.get(prev)?.title(), joiner, moment.title());
                self.combine_with_predecessor(id, title)?;
                folded.push(id);
            }
            cursor = next;
        }

        if !folded.is_empty() {
            log::info!("Compacted {} rapid moments", folded.len());
        }
        Ok(folded)
    }

    // ========================================================================
    // Metadata
    // ========================================================================

    /// Retitle a moment.
    pub fn set_title(&mut self, id: MomentId, title: impl Into<String>) -> Result<()> {
        self.get_mut(id)?.set_title(title);
        Ok(())
    }

    /// Replace a moment's narrative.
    pub fn set_narrative(&mut self, id: MomentId, narrative: impl Into<String>) -> Result<()> {
        self.get_mut(id)?.set_narrative(narrative);
        Ok(())
    }

    /// Replace the narrative of the moment under the cursor.
    pub fn set_current_narrative(&mut self, narrative: impl Into<String>) -> Result<()> {
        let id = self.current.ok_or(StoryError::EmptyTimeline)?;
        self.set_narrative(id, narrative)
    }

    /// Set or clear a moment's marker flag.
    pub fn set_marker(&mut self, id: MomentId, is_marker: bool) -> Result<()> {
        self.get_mut(id)?.set_marker(is_marker);
        Ok(())
    }

    /// Flip a moment's marker flag, returning the new value.
    pub fn toggle_marker(&mut self, id: MomentId) -> Result<bool> {
        let moment = self.get_mut(id)?;
        let flipped = !moment.is_marker();
        moment.set_marker(flipped);
        Ok(flipped)
    }

    // ========================================================================
    // Recovery
    // ========================================================================

    /// Re-anchor a timeline whose replay fails to the current external state.
    ///
    /// The first moment whose diff no longer applies gets a diff that leads to
    /// `external`; every later moment is pinned to the same state with an
    /// empty diff. Titles, narratives and markers are kept. Returns the ids
    /// that were re-anchored (empty when replay already succeeds).
    pub fn rebuild_from_state(&mut self, external: Snapshot) -> Result<Vec<MomentId>> {
        let head = self.head.ok_or(StoryError::EmptyTimeline)?;
        let mut state = self
            .initial_snapshot
            .clone()
            .ok_or_else(|| StoryError::InvalidRecord("timeline has no initial snapshot".into()))?;

        let mut replacements: Vec<(MomentId, Diff)> = Vec::new();
        let mut cursor = self.get(head)?.next;
        while let Some(id) = cursor {
            let moment = self.get(id)?;
            if replacements.is_empty() {
                let applied = moment
                    .diff()
                    .ok_or_else(|| PatchFailure("missing diff".into()))
                    .and_then(|diff| diff.apply(&state));
                match applied {
                    Ok(next_state) => state = next_state,
                    Err(failure) => {
                        log::warn!("Re-anchoring from moment {}: {}", id, failure);
                        replacements.push((id, Diff::compute(&state, &external)));
                    }
                }
            } else {
                replacements.push((id, Diff::identity()));
            }
            cursor = moment.next;
        }

        let mut rebuilt = Vec::with_capacity(replacements.len());
        for (id, diff) in replacements {
            self.get_mut(id)?.set_diff(Some(diff));
            self.cache.evict(id);
            rebuilt.push(id);
        }
        Ok(rebuilt)
    }

    // ========================================================================
    // Link plumbing
    // ========================================================================

    fn links(&self, id: MomentId) -> Result<(Option<MomentId>, Option<MomentId>)> {
        let moment = self.get(id)?;
        Ok((moment.prev, moment.next))
    }

    /// Unlink a moment from its neighbours, leaving it in the arena.
    fn detach(&mut self, id: MomentId) -> Result<()> {
        let (prev, next) = self.links(id)?;
        match prev {
            Some(prev) => self.get_mut(prev)?.next = next,
            None => self.head = next,
        }
        if let Some(next) = next {
            self.get_mut(next)?.prev = prev;
        }
        let moment = self.get_mut(id)?;
        moment.prev = None;
        moment.next = None;
        Ok(())
    }

    /// Link a detached moment in right after `target` (or at the front).
    fn attach_after(&mut self, id: MomentId, target: Option<MomentId>) -> Result<()> {
        let next = match target {
            Some(target) => self.get(target)?.next,
            None => self.head,
        };
        let moment = self.get_mut(id)?;
        moment.prev = target;
        moment.next = next;
        match target {
            Some(target) => self.get_mut(target)?.next = Some(id),
            None => self.head = Some(id),
        }
        if let Some(next) = next {
            self.get_mut(next)?.prev = Some(id);
        }
        Ok(())
    }

    /// Compute diffs for moments about to get a new predecessor.
    ///
    /// Runs against the chain as it is now; a moment heading for the front
    /// contributes the new initial snapshot instead of a diff.
    fn plan_rebase(&self, changes: &[(MomentId, Option<MomentId>)]) -> Result<Rebase> {
        let mut rebase = Rebase {
            diffs: Vec::with_capacity(changes.len()),
            initial: None,
        };
        for &(id, new_prev) in changes {
            let state = self.state_at(id)?;
            match new_prev {
                Some(prev) => {
                    let diff = Diff::compute(&self.state_at(prev)?, &state);
                    rebase.diffs.push((id, Some(diff)));
                }
                None => {
                    rebase.diffs.push((id, None));
                    rebase.initial = Some(state);
                }
            }
        }
        Ok(rebase)
    }

    fn apply_rebase(&mut self, rebase: Rebase) -> Result<()> {
        for (id, diff) in rebase.diffs {
            self.get_mut(id)?.set_diff(diff);
        }
        if let Some(initial) = rebase.initial {
            self.initial_snapshot = Some(initial);
        }
        Ok(())
    }

    /// Check invariants 1-4 (links, single head and tail, distinct ids, diff
    /// placement). Replay is checked separately by [`verify`](Self::verify).
    pub(crate) fn check_structure(&self) -> Result<()> {
        let broken = |msg: String| Err(StoryError::InvalidRecord(msg));

        if self.moments.is_empty() {
            if self.head.is_some() || self.current.is_some() {
                return broken("empty timeline with a head or cursor".into());
            }
            return Ok(());
        }

        let mut seen = std::collections::HashSet::new();
        let mut prev: Option<MomentId> = None;
        let mut cursor = self.head;
        while let Some(id) = cursor {
            let Some(moment) = self.moments.get(&id) else {
                return broken(format!("link to missing moment {}", id));
            };
            if !seen.insert(id) {
                return broken(format!("cycle through moment {}", id));
            }
            if moment.prev != prev {
                return broken(format!("moment {} has a mismatched prev link", id));
            }
            if moment.prev.is_none() != moment.diff().is_none() {
                return broken(format!("moment {} has a misplaced diff", id));
            }
            prev = Some(id);
            cursor = moment.next;
        }

        if seen.len() != self.moments.len() {
            return broken("moments unreachable from the head".into());
        }
        if !self.current.is_some_and(|c| seen.contains(&c)) {
            return broken("cursor is not on the chain".into());
        }
        if self.initial_snapshot.is_none() {
            return broken("non-empty timeline without an initial snapshot".into());
        }
        Ok(())
    }
}

/// Iterator over a timeline's moments from head to tail.
pub struct Moments<'a> {
    timeline: &'a Timeline,
    cursor: Option<MomentId>,
}

impl<'a> Iterator for Moments<'a> {
    type Item = &'a Moment;

    fn next(&mut self) -> Option<Self::Item> {
        let moment = self.timeline.moments.get(&self.cursor?)?;
        self.cursor = moment.next;
        Some(moment)
    }
}
