//! Flat, storage-friendly form of a [`Timeline`].
//!
//! Moments are stored head to tail; links are rebuilt from list adjacency and
//! the cursor from its index. The record also carries the initial snapshot
//! and the id counter so a restored timeline can reconstruct every moment and
//! never hands out an id twice.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::Timeline;
use crate::config::TimelineSettings;
use crate::error::{Result, StoryError};
use crate::moment::{Moment, MomentId, MomentRecord};
use crate::snapshot::Snapshot;

/// Version written into new records. Older versions are read as-is.
pub const FORMAT_VERSION: u32 = 1;

fn default_version() -> u32 {
    FORMAT_VERSION
}

/// Persisted form of a whole timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SerializedTimeline {
    /// Record format version
    #[serde(default = "default_version")]
    pub version: u32,

    /// Moments from head to tail
    pub moments: Vec<MomentRecord>,

    /// Index of the cursor in `moments`
    #[serde(default)]
    pub current_index: Option<usize>,

    /// Full state represented by the first moment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(type = "unknown")]
    pub initial_snapshot: Option<Snapshot>,

    /// Next id to hand out; derived from the highest stored id when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(type = "number | null")]
    pub next_id: Option<u64>,
}

impl Timeline {
    /// Flatten the timeline into a record, walking head to tail.
    pub fn serialize(&self) -> SerializedTimeline {
        let moments: Vec<MomentRecord> = self.moments().map(Moment::to_record).collect();
        let current_index = self
            .current
            .and_then(|current| moments.iter().position(|m| m.id == current));

        SerializedTimeline {
            version: FORMAT_VERSION,
            moments,
            current_index,
            initial_snapshot: self.initial_snapshot.clone(),
            next_id: Some(self.next_id),
        }
    }

    /// Rebuild a timeline from a record.
    ///
    /// Fails with [`StoryError::InvalidRecord`] when the record could not have
    /// been produced by [`serialize`](Self::serialize): duplicate ids, a head
    /// with a diff or a later moment without one, a cursor out of range, or
    /// moments without an initial snapshot. Replay is not checked here, so a
    /// corrupted chain can still be loaded and repaired.
    pub fn deserialize(data: SerializedTimeline, settings: TimelineSettings) -> Result<Self> {
        Self::restore(data, None, settings)
    }

    /// Rebuild a timeline from a record whose initial snapshot is kept
    /// elsewhere. `initial` takes precedence over any snapshot in the record.
    pub fn deserialize_with_initial(
        data: SerializedTimeline,
        initial: Snapshot,
        settings: TimelineSettings,
    ) -> Result<Self> {
        Self::restore(data, Some(initial), settings)
    }

    fn restore(
        data: SerializedTimeline,
        initial: Option<Snapshot>,
        settings: TimelineSettings,
    ) -> Result<Self> {
        let invalid = |msg: String| StoryError::InvalidRecord(msg);

        if data.version > FORMAT_VERSION {
            return Err(invalid(format!(
                "record version {} is newer than supported version {}",
                data.version, FORMAT_VERSION
            )));
        }

        if data.next_id == Some(u64::MAX) {
            return Err(invalid("next id leaves no room to allocate".to_string()));
        }

        let mut timeline = Self::with_settings(settings);

        if data.moments.is_empty() {
            if let Some(index) = data.current_index {
                return Err(invalid(format!("cursor index {} on an empty timeline", index)));
            }
            timeline.next_id = data.next_id.unwrap_or(0);
            return Ok(timeline);
        }

        let current_index = data
            .current_index
            .ok_or_else(|| invalid("non-empty timeline without a cursor".to_string()))?;
        if current_index >= data.moments.len() {
            return Err(invalid(format!(
                "cursor index {} out of range for {} moments",
                current_index,
                data.moments.len()
            )));
        }

        let initial = initial
            .or(data.initial_snapshot)
            .ok_or_else(|| invalid("moments without an initial snapshot".to_string()))?;

        let mut seen = HashSet::with_capacity(data.moments.len());
        for (index, record) in data.moments.iter().enumerate() {
            if !seen.insert(record.id) {
                return Err(invalid(format!("duplicate moment id {}", record.id)));
            }
            match (index, record.diff.is_some()) {
                (0, true) => {
                    return Err(invalid(format!("head moment {} carries a diff", record.id)));
                }
                (i, false) if i > 0 => {
                    return Err(invalid(format!("moment {} has no diff", record.id)));
                }
                _ => {}
            }
        }

        let highest = seen.iter().map(|id| id.get()).max().unwrap_or(0);
        let next_id = match data.next_id {
            Some(next) if next <= highest => {
                return Err(invalid(format!(
                    "next id {} would reuse stored id {}",
                    next, highest
                )));
            }
            Some(next) => next,
            None => highest
                .checked_add(1)
                .filter(|next| *next < u64::MAX)
                .ok_or_else(|| invalid(format!("stored id {} leaves no room to allocate", highest)))?,
        };

        let ids: Vec<MomentId> = data.moments.iter().map(|r| r.id).collect();
        for (index, record) in data.moments.into_iter().enumerate() {
            let mut moment = Moment::from_record(record)?;
            moment.prev = index.checked_sub(1).map(|i| ids[i]);
            moment.next = ids.get(index + 1).copied();
            timeline.moments.insert(moment.id(), moment);
        }
        timeline.head = ids.first().copied();
        timeline.current = Some(ids[current_index]);
        timeline.initial_snapshot = Some(initial);
        timeline.next_id = next_id;

        timeline.check_structure()?;
        log::debug!("Restored timeline with {} moments", timeline.len());
        Ok(timeline)
    }
}
