//! The host round trip around a [`Timeline`].
//!
//! Capturing and travelling both need one exchange with the host: a capture
//! asks for the current document state, a travel hands the host a
//! reconstructed state and waits for the acknowledgement. [`HistorySession`]
//! runs that exchange as an explicit two-state protocol:
//!
//! ```text
//! Idle --request_capture--> AwaitingState   --receive_state-------> Idle
//! Idle --request_travel---> AwaitingRestore --acknowledge_restore--> Idle
//! ```
//!
//! There is one slot. A second request while one is outstanding fails with
//! [`StoryError::RequestOutstanding`]; responses carrying any other request id
//! are ignored. There is no timeout and no retry.

use serde::{Deserialize, Serialize};

use crate::config::TimelineSettings;
use crate::error::{Result, StoryError};
use crate::host::{StateApplier, StateProvider};
use crate::moment::MomentId;
use crate::snapshot::Snapshot;
use crate::store::TimelineStore;
use crate::timeline::Timeline;

/// Kind of host request a session is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingRequest {
    /// Waiting for the current document state.
    Capture,
    /// Waiting for the host to acknowledge a restore.
    Travel,
}

impl std::fmt::Display for PendingRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PendingRequest::Capture => f.write_str("capture"),
            PendingRequest::Travel => f.write_str("travel"),
        }
    }
}

/// Correlates a host response with the request it answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(u64);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum RoundTrip {
    Idle,
    AwaitingState {
        request: RequestId,
        description: Option<String>,
    },
    AwaitingRestore {
        request: RequestId,
        target: MomentId,
    },
}

/// Messages the host sends to the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "params")]
pub enum HostNotification {
    /// The user changed the document.
    UserAction {
        /// Host's description of the action, used as the moment title.
        #[serde(default)]
        description: Option<String>,
    },

    /// Answer to a capture request.
    DocumentState {
        /// Request being answered.
        request: RequestId,
        /// Full document state.
        state: Snapshot,
    },

    /// The host applied a restored state.
    RestoreAcknowledged {
        /// Request being acknowledged.
        request: RequestId,
    },
}

/// What handling a [`HostNotification`] did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum NotificationOutcome {
    /// A capture started; the host should answer with the document state.
    StateRequested(RequestId),
    /// A moment was captured.
    Captured(MomentId),
    /// The cursor moved to the restored moment.
    Travelled(MomentId),
    /// The notification did not match the outstanding request.
    Ignored,
}

/// A [`Timeline`] plus the single-slot host round trip.
#[derive(Debug)]
pub struct HistorySession {
    timeline: Timeline,
    round_trip: RoundTrip,
    next_request: u64,
}

impl HistorySession {
    /// Wrap a timeline; the session starts idle.
    pub fn new(timeline: Timeline) -> Self {
        Self {
            timeline,
            round_trip: RoundTrip::Idle,
            next_request: 1,
        }
    }

    /// Load the stored timeline, or start an empty one.
    pub fn load_from(store: &dyn TimelineStore, settings: TimelineSettings) -> Result<Self> {
        let timeline = match store.load()? {
            Some(data) => Timeline::deserialize(data, settings)?,
            None => Timeline::with_settings(settings),
        };
        Ok(Self::new(timeline))
    }

    /// Persist the timeline.
    pub fn save_to(&self, store: &dyn TimelineStore) -> Result<()> {
        store.save(&self.timeline.serialize())
    }

    /// The wrapped timeline.
    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    /// Mutable access for edits that need no host round trip.
    ///
    /// Fails with [`StoryError::RequestOutstanding`] while a capture or travel
    /// is waiting on the host, so the chain cannot change under a response.
    pub fn timeline_mut(&mut self) -> Result<&mut Timeline> {
        self.ensure_idle()?;
        Ok(&mut self.timeline)
    }

    /// Give up the session, keeping the timeline.
    pub fn into_timeline(self) -> Timeline {
        self.timeline
    }

    /// The outstanding request, if any.
    pub fn pending(&self) -> Option<PendingRequest> {
        match self.round_trip {
            RoundTrip::Idle => None,
            RoundTrip::AwaitingState { .. } => Some(PendingRequest::Capture),
            RoundTrip::AwaitingRestore { .. } => Some(PendingRequest::Travel),
        }
    }

    fn ensure_idle(&self) -> Result<()> {
        match self.pending() {
            Some(kind) => Err(StoryError::RequestOutstanding(kind)),
            None => Ok(()),
        }
    }

    fn issue_request(&mut self) -> RequestId {
        let request = RequestId(self.next_request);
        self.next_request += 1;
        request
    }

    fn outstanding(&self) -> Option<RequestId> {
        match &self.round_trip {
            RoundTrip::Idle => None,
            RoundTrip::AwaitingState { request, .. } | RoundTrip::AwaitingRestore { request, .. } => {
                Some(*request)
            }
        }
    }

    /// Drop the outstanding request after the host reported a failure.
    fn abandon(&mut self, request: RequestId) {
        if self.outstanding() == Some(request) {
            log::debug!("Abandoning request {}", request);
            self.round_trip = RoundTrip::Idle;
        }
    }

    // ========================================================================
    // Capture
    // ========================================================================

    /// Start a capture. The host should answer with the document state under
    /// the returned id.
    pub fn request_capture(&mut self, description: Option<&str>) -> Result<RequestId> {
        self.ensure_idle()?;
        let request = self.issue_request();
        self.round_trip = RoundTrip::AwaitingState {
            request,
            description: description.map(str::to_string),
        };
        log::debug!("Requested document state ({})", request);
        Ok(request)
    }

    /// Accept the host's answer to a capture request.
    ///
    /// Returns the captured moment, or `None` when `request` is not the
    /// outstanding capture (the state is ignored).
    pub fn receive_state(
        &mut self,
        request: RequestId,
        state: Snapshot,
    ) -> Result<Option<MomentId>> {
        let description = match &self.round_trip {
            RoundTrip::AwaitingState {
                request: outstanding,
                description,
            } if *outstanding == request => description.clone(),
            _ => {
                log::debug!("Ignoring document state for request {}", request);
                return Ok(None);
            }
        };
        self.round_trip = RoundTrip::Idle;
        self.timeline
            .capture_described(state, description.as_deref())
            .map(Some)
    }

    /// Capture against an async host in one call.
    pub async fn capture_from(
        &mut self,
        provider: &dyn StateProvider,
        description: Option<&str>,
    ) -> Result<MomentId> {
        let request = self.request_capture(description)?;
        let state = match provider.current_state().await {
            Ok(state) => state,
            Err(e) => {
                self.abandon(request);
                return Err(e);
            }
        };
        self.receive_state(request, state)?
            .ok_or_else(|| StoryError::Host(format!("capture {} was not accepted", request)))
    }

    // ========================================================================
    // Travel
    // ========================================================================

    /// Start a travel: reconstruct the state at `target` for the host to apply.
    ///
    /// The cursor moves once the host acknowledges the restore. A failed
    /// reconstruction leaves the session idle.
    pub fn request_travel(&mut self, target: MomentId) -> Result<(RequestId, Snapshot)> {
        self.ensure_idle()?;
        let state = self.timeline.state_at(target)?;
        let request = self.issue_request();
        self.round_trip = RoundTrip::AwaitingRestore { request, target };
        log::debug!("Requested restore of moment {} ({})", target, request);
        Ok((request, state))
    }

    /// Accept the host's acknowledgement of a restore.
    ///
    /// Returns the moment now under the cursor, or `None` when `request` is not
    /// the outstanding travel.
    pub fn acknowledge_restore(&mut self, request: RequestId) -> Result<Option<MomentId>> {
        let target = match self.round_trip {
            RoundTrip::AwaitingRestore {
                request: outstanding,
                target,
            } if outstanding == request => target,
            _ => {
                log::debug!("Ignoring restore acknowledgement for request {}", request);
                return Ok(None);
            }
        };
        self.round_trip = RoundTrip::Idle;
        self.timeline.set_cursor(target)?;
        Ok(Some(target))
    }

    /// Travel against an async host in one call, returning the applied state.
    pub async fn travel_with(
        &mut self,
        target: MomentId,
        applier: &dyn StateApplier,
    ) -> Result<Snapshot> {
        let (request, state) = self.request_travel(target)?;
        if let Err(e) = applier.apply_state(&state).await {
            self.abandon(request);
            return Err(e);
        }
        self.acknowledge_restore(request)?;
        Ok(state)
    }

    // ========================================================================
    // Notifications
    // ========================================================================

    /// Route a host notification through the protocol.
    ///
    /// User actions that echo an in-flight restore are ignored; a user action
    /// during an outstanding capture fails fast.
    pub fn handle_notification(
        &mut self,
        notification: HostNotification,
    ) -> Result<NotificationOutcome> {
        match notification {
            HostNotification::UserAction { description } => match self.pending() {
                Some(PendingRequest::Travel) => {
                    log::debug!("Ignoring user action while a restore is in flight");
                    Ok(NotificationOutcome::Ignored)
                }
                _ => self
                    .request_capture(description.as_deref())
                    .map(NotificationOutcome::StateRequested),
            },
            HostNotification::DocumentState { request, state } => Ok(self
                .receive_state(request, state)?
                .map_or(NotificationOutcome::Ignored, NotificationOutcome::Captured)),
            HostNotification::RestoreAcknowledged { request } => Ok(self
                .acknowledge_restore(request)?
                .map_or(NotificationOutcome::Ignored, NotificationOutcome::Travelled)),
        }
    }
}
