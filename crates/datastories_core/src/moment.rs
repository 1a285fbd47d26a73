//! A single recorded point in a document's history.
//!
//! Moments are owned by a [`Timeline`](crate::timeline::Timeline) and addressed
//! by [`MomentId`]. Outside this crate they are read-only: every mutation goes
//! through the timeline, which keeps links and diffs consistent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::config::TimelineSettings;
use crate::error::{Result, StoryError};
use crate::snapshot::Diff;

/// Stable identifier of a moment. Assigned once, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MomentId(u64);

impl MomentId {
    /// Wrap a raw id.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw numeric id.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for MomentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for MomentId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// One recorded, navigable point in the history.
///
/// The head moment carries no diff (its state is the timeline's initial
/// snapshot); every other moment carries the diff from its predecessor.
#[derive(Debug, Clone)]
pub struct Moment {
    id: MomentId,
    pub(crate) prev: Option<MomentId>,
    pub(crate) next: Option<MomentId>,
    diff: Option<Diff>,
    title: String,
    narrative: String,
    is_marker: bool,
    created: DateTime<Utc>,
    modified: DateTime<Utc>,
}

impl Moment {
    /// Create the first moment of a timeline.
    pub(crate) fn head(id: MomentId, settings: &TimelineSettings) -> Self {
        Self::with_title(id, None, settings.start_title.clone(), settings)
    }

    /// Create a moment that follows another one.
    ///
    /// `description` is the host's description of the user action that led to
    /// this state; it only feeds the title.
    pub(crate) fn following(
        id: MomentId,
        diff: Diff,
        description: Option<&str>,
        settings: &TimelineSettings,
    ) -> Self {
        let title = match description.map(str::trim) {
            Some(text) if !text.is_empty() => text.to_string(),
            _ => format!("{} {}", settings.moment_title_prefix, id),
        };
        Self::with_title(id, Some(diff), title, settings)
    }

    fn with_title(
        id: MomentId,
        diff: Option<Diff>,
        title: String,
        settings: &TimelineSettings,
    ) -> Self {
        let now = now_millis();
        Self {
            id,
            prev: None,
            next: None,
            diff,
            title,
            narrative: settings.narrative_prompt.clone(),
            is_marker: settings.mark_new_moments,
            created: now,
            modified: now,
        }
    }

    /// Unique id of this moment.
    pub fn id(&self) -> MomentId {
        self.id
    }

    /// The moment before this one, if any.
    pub fn prev(&self) -> Option<MomentId> {
        self.prev
    }

    /// The moment after this one, if any.
    pub fn next(&self) -> Option<MomentId> {
        self.next
    }

    /// Diff from the predecessor's state; `None` only for the head.
    pub fn diff(&self) -> Option<&Diff> {
        self.diff.as_ref()
    }

    /// Display title.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Free-text narrative the user attached to this moment.
    pub fn narrative(&self) -> &str {
        &self.narrative
    }

    /// First non-empty line of the narrative, for compact displays.
    pub fn narrative_excerpt(&self) -> &str {
        self.narrative
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or("")
    }

    /// Whether the user flagged this moment as a marker.
    pub fn is_marker(&self) -> bool {
        self.is_marker
    }

    /// When the moment was captured.
    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    /// When any field was last changed.
    pub fn modified(&self) -> DateTime<Utc> {
        self.modified
    }

    pub(crate) fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
        self.touch();
    }

    pub(crate) fn set_narrative(&mut self, narrative: impl Into<String>) {
        self.narrative = narrative.into();
        self.touch();
    }

    pub(crate) fn set_marker(&mut self, is_marker: bool) {
        self.is_marker = is_marker;
        self.touch();
    }

    pub(crate) fn set_diff(&mut self, diff: Option<Diff>) {
        self.diff = diff;
        self.touch();
    }

    fn touch(&mut self) {
        self.modified = now_millis().max(self.created);
    }

    /// Flatten into a storage record. Links are not part of the record; the
    /// position in the surrounding list defines them.
    pub fn to_record(&self) -> MomentRecord {
        MomentRecord {
            id: self.id,
            title: self.title.clone(),
            narrative: self.narrative.clone(),
            is_marker: self.is_marker,
            created: self.created.timestamp_millis(),
            modified: self.modified.timestamp_millis(),
            diff: self.diff.clone(),
        }
    }

    /// Rebuild an unlinked moment from a storage record.
    pub(crate) fn from_record(record: MomentRecord) -> Result<Self> {
        let created = from_millis(record.created, record.id)?;
        let modified = from_millis(record.modified, record.id)?;
        Ok(Self {
            id: record.id,
            prev: None,
            next: None,
            diff: record.diff,
            title: record.title,
            narrative: record.narrative,
            is_marker: record.is_marker,
            created,
            modified,
        })
    }

    #[cfg(test)]
    pub(crate) fn set_created(&mut self, created: DateTime<Utc>) {
        self.created = created;
    }
}

impl std::fmt::Display for Moment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ID: {} title: [{}] narrative: {}",
            self.id,
            self.title,
            self.narrative_excerpt()
        )
    }
}

/// Current time truncated to whole milliseconds, the precision records keep.
fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

fn from_millis(millis: i64, id: MomentId) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        StoryError::InvalidRecord(format!("moment {}: timestamp {} out of range", id, millis))
    })
}

/// Storage form of a [`Moment`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct MomentRecord {
    /// Unique moment id
    #[ts(type = "number")]
    pub id: MomentId,

    /// Display title
    pub title: String,

    /// Free-text narrative
    #[serde(default)]
    pub narrative: String,

    /// Marker flag
    #[serde(default)]
    pub is_marker: bool,

    /// Unix timestamp of capture (milliseconds)
    pub created: i64,

    /// Unix timestamp of last modification (milliseconds)
    pub modified: i64,

    /// Diff from the predecessor; absent for the head
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(type = "unknown")]
    pub diff: Option<Diff>,
}

/// What the UI strip shows for one moment.
#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct MomentSummary {
    /// Unique moment id
    #[ts(type = "number")]
    pub id: MomentId,

    /// Display title
    pub title: String,

    /// First line of the narrative
    pub excerpt: String,

    /// Marker flag
    pub is_marker: bool,

    /// Whether the cursor is on this moment
    pub is_current: bool,

    /// Unix timestamp of capture (milliseconds)
    pub created: i64,
}

impl MomentSummary {
    pub(crate) fn of(moment: &Moment, is_current: bool) -> Self {
        Self {
            id: moment.id,
            title: moment.title.clone(),
            excerpt: moment.narrative_excerpt().to_string(),
            is_marker: moment.is_marker,
            is_current,
            created: moment.created.timestamp_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::Snapshot;
    use serde_json::json;

    fn settings() -> TimelineSettings {
        TimelineSettings::default()
    }

    #[test]
    fn test_default_titles() {
        let head = Moment::head(MomentId::new(0), &settings());
        assert_eq!(head.title(), "start");
        assert!(head.diff().is_none());
        assert!(head.is_marker());

        let next = Moment::following(MomentId::new(3), Diff::identity(), None, &settings());
        assert_eq!(next.title(), "Moment 3");
        assert!(next.diff().is_some());
    }

    #[test]
    fn test_title_from_description() {
        let moment = Moment::following(
            MomentId::new(1),
            Diff::identity(),
            Some("  create slider "),
            &settings(),
        );
        assert_eq!(moment.title(), "create slider");

        let blank = Moment::following(MomentId::new(2), Diff::identity(), Some("  "), &settings());
        assert_eq!(blank.title(), "Moment 2");
    }

    #[test]
    fn test_setters_update_modified() {
        let mut moment = Moment::head(MomentId::new(0), &settings());
        let before = moment.modified();

        moment.set_title("graph added");
        moment.set_narrative("Plotted height vs. weight");
        moment.set_marker(false);

        assert_eq!(moment.title(), "graph added");
        assert_eq!(moment.narrative(), "Plotted height vs. weight");
        assert!(!moment.is_marker());
        assert!(moment.modified() >= before);
        assert!(moment.modified() >= moment.created());
    }

    #[test]
    fn test_set_diff() {
        let mut moment = Moment::head(MomentId::new(0), &settings());
        let diff = Diff::compute(&Snapshot::new(json!({})), &Snapshot::new(json!({"x": 1})));

        moment.set_diff(Some(diff.clone()));
        assert_eq!(moment.diff(), Some(&diff));

        moment.set_diff(None);
        assert!(moment.diff().is_none());
    }

    #[test]
    fn test_record_round_trip() {
        let diff = Diff::compute(&Snapshot::new(json!({"a": 1})), &Snapshot::new(json!({})));
        let mut moment = Moment::following(MomentId::new(7), diff, None, &settings());
        moment.set_title("removed a");
        moment.set_narrative("first line\nsecond line");
        moment.set_marker(false);

        let record = moment.to_record();
        let text = serde_json::to_string(&record).unwrap();
        let back = Moment::from_record(serde_json::from_str(&text).unwrap()).unwrap();

        assert_eq!(back.id(), moment.id());
        assert_eq!(back.title(), "removed a");
        assert_eq!(back.narrative(), "first line\nsecond line");
        assert!(!back.is_marker());
        assert_eq!(
            back.created().timestamp_millis(),
            moment.created().timestamp_millis()
        );
        assert_eq!(
            back.modified().timestamp_millis(),
            moment.modified().timestamp_millis()
        );
        assert_eq!(back.diff(), moment.diff());
        assert!(back.prev().is_none() && back.next().is_none());
    }

    #[test]
    fn test_record_rejects_bad_timestamp() {
        let mut record = Moment::head(MomentId::new(0), &settings()).to_record();
        record.created = i64::MAX;

        assert!(matches!(
            Moment::from_record(record),
            Err(StoryError::InvalidRecord(_))
        ));
    }

    #[test]
    fn test_narrative_excerpt() {
        let mut moment = Moment::head(MomentId::new(0), &settings());
        moment.set_narrative("\n\n  Added a slider  \nbecause reasons");
        assert_eq!(moment.narrative_excerpt(), "Added a slider");
        assert_eq!(
            moment.to_string(),
            "ID: 0 title: [start] narrative: Added a slider"
        );
    }
}
