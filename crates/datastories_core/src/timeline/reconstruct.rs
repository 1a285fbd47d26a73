//! State reconstruction by replaying diffs.
//!
//! The state at a moment is the initial snapshot with every diff from the head
//! up to and including that moment applied in order. Replay starts from the
//! nearest moment whose absolute state is cached, so repeated travel around
//! the same region does not replay from the head every time.
//!
//! Cached states are absolute, and structural edits preserve every surviving
//! moment's absolute state, so entries only go stale when a moment's own state
//! changes (combine, rebuild) or the moment disappears.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use indexmap::IndexMap;

use super::Timeline;
use crate::error::{Result, StoryError};
use crate::moment::MomentId;
use crate::snapshot::Snapshot;

/// Cache an intermediate state every this many applied diffs during replay.
pub(crate) const SNAPSHOT_INTERVAL: usize = 25;

/// Maximum number of cached states; oldest insertions are dropped first.
pub(crate) const SNAPSHOT_CACHE_MAX_SIZE: usize = 32;

/// Absolute states of recently reconstructed moments.
#[derive(Debug, Default)]
pub(crate) struct SnapshotCache {
    entries: RwLock<IndexMap<MomentId, Snapshot>>,
}

impl SnapshotCache {
    fn read(&self) -> RwLockReadGuard<'_, IndexMap<MomentId, Snapshot>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, IndexMap<MomentId, Snapshot>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn get(&self, id: MomentId) -> Option<Snapshot> {
        self.read().get(&id).cloned()
    }

    pub(crate) fn insert(&self, id: MomentId, state: Snapshot) {
        let mut entries = self.write();
        entries.shift_remove(&id);
        entries.insert(id, state);
        while entries.len() > SNAPSHOT_CACHE_MAX_SIZE {
            entries.shift_remove_index(0);
        }
    }

    pub(crate) fn evict(&self, id: MomentId) {
        self.write().shift_remove(&id);
    }

    pub(crate) fn clear(&self) {
        self.write().clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.read().len()
    }
}

impl Timeline {
    /// Reconstruct the full state at `moment`.
    ///
    /// Fails with [`StoryError::MomentNotFound`] for an unknown id and with
    /// [`StoryError::OutOfSequencePatch`] when a stored diff does not apply to
    /// the state replay has reached, which means the chain is corrupted. The
    /// timeline is never modified.
    pub fn state_at(&self, moment: MomentId) -> Result<Snapshot> {
        // Walk back to the nearest cached moment or the head.
        let mut pending = Vec::new();
        let mut cursor = moment;
        let base = loop {
            if let Some(state) = self.cache.get(cursor) {
                break state;
            }
            let current = self.get(cursor)?;
            match current.prev {
                Some(prev) => {
                    pending.push(cursor);
                    cursor = prev;
                }
                None => {
                    break self.initial_snapshot.clone().ok_or_else(|| {
                        StoryError::OutOfSequencePatch {
                            moment: cursor,
                            reason: "no initial snapshot to replay from".to_string(),
                        }
                    })?;
                }
            }
        };

        let mut state = base;
        for (applied, id) in pending.into_iter().rev().enumerate() {
            state = self.apply_stored_diff(id, &state)?;
            if (applied + 1) % SNAPSHOT_INTERVAL == 0 && id != moment {
                self.cache.insert(id, state.clone());
            }
        }

        self.cache.insert(moment, state.clone());
        Ok(state)
    }

    /// Replay the whole chain from the head, ignoring the cache.
    ///
    /// Succeeds iff every stored diff applies in sequence.
    pub fn verify(&self) -> Result<()> {
        let Some(head) = self.head else {
            return Ok(());
        };
        let mut state = self.initial_snapshot.clone().ok_or_else(|| {
            StoryError::OutOfSequencePatch {
                moment: head,
                reason: "no initial snapshot to replay from".to_string(),
            }
        })?;
        let mut cursor = self.get(head)?.next;
        while let Some(id) = cursor {
            state = self.apply_stored_diff(id, &state)?;
            cursor = self.get(id)?.next;
        }
        Ok(())
    }

    fn apply_stored_diff(&self, id: MomentId, state: &Snapshot) -> Result<Snapshot> {
        let diff = self
            .get(id)?
            .diff()
            .ok_or_else(|| StoryError::OutOfSequencePatch {
                moment: id,
                reason: "moment has no diff".to_string(),
            })?;
        diff.apply(state).map_err(|failure| {
            log::warn!("Replay stopped at moment {}: {}", id, failure);
            StoryError::OutOfSequencePatch {
                moment: id,
                reason: failure.to_string(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn long_timeline(count: usize) -> (Timeline, Vec<MomentId>) {
        let mut timeline = Timeline::new();
        let ids = (0..count)
            .map(|i| {
                timeline
                    .capture_moment(Snapshot::new(json!({"step": i, "even": i % 2 == 0})))
                    .unwrap()
            })
            .collect();
        (timeline, ids)
    }

    #[test]
    fn test_state_at_every_moment() {
        let (timeline, ids) = long_timeline(60);
        timeline.cache.clear();

        for (i, id) in ids.iter().enumerate().rev() {
            assert_eq!(
                timeline.state_at(*id).unwrap(),
                Snapshot::new(json!({"step": i, "even": i % 2 == 0}))
            );
        }
    }

    #[test]
    fn test_cache_is_bounded() {
        let (timeline, _) = long_timeline(SNAPSHOT_CACHE_MAX_SIZE * 2);
        assert!(timeline.cache.len() <= SNAPSHOT_CACHE_MAX_SIZE);
    }

    #[test]
    fn test_replay_caches_intermediate_states() {
        let (timeline, ids) = long_timeline(SNAPSHOT_INTERVAL * 2 + 1);
        timeline.cache.clear();

        timeline.state_at(ids[SNAPSHOT_INTERVAL * 2]).unwrap();

        assert!(timeline.cache.get(ids[SNAPSHOT_INTERVAL]).is_some());
        assert!(timeline.cache.get(ids[SNAPSHOT_INTERVAL * 2]).is_some());
    }

    #[test]
    fn test_unknown_moment() {
        let (timeline, _) = long_timeline(2);
        assert!(matches!(
            timeline.state_at(MomentId::new(500)),
            Err(StoryError::MomentNotFound(_))
        ));
    }

    #[test]
    fn test_verify_detects_corruption() {
        let (mut timeline, ids) = long_timeline(4);
        timeline.verify().unwrap();

        let foreign = crate::snapshot::Diff::compute(
            &Snapshot::new(json!({"step": 99, "even": false})),
            &Snapshot::new(json!({"step": 100, "even": true})),
        );
        timeline.get_mut(ids[2]).unwrap().set_diff(Some(foreign));
        timeline.cache.clear();

        assert!(matches!(
            timeline.verify(),
            Err(StoryError::OutOfSequencePatch { moment, .. }) if moment == ids[2]
        ));
        // earlier moments still reconstruct
        assert!(timeline.state_at(ids[1]).is_ok());
    }

    #[test]
    fn test_empty_timeline_verifies() {
        Timeline::new().verify().unwrap();
    }
}
