//! End-to-end checks through the public API only.

use datastories_core::host::{BoxFuture, StateApplier, StateProvider};
use datastories_core::{
    FileStore, HistorySession, MomentId, Result, Snapshot, StoryError, Timeline, TimelineSettings,
    TimelineStore,
};
use futures_lite::future::block_on;
use serde_json::{Value, json};
use std::sync::Mutex;

struct Document(Mutex<Value>);

impl Document {
    fn new(value: Value) -> Self {
        Self(Mutex::new(value))
    }

    fn edit(&self, f: impl FnOnce(&mut Value)) {
        f(&mut self.0.lock().unwrap());
    }

    fn value(&self) -> Value {
        self.0.lock().unwrap().clone()
    }
}

impl StateProvider for Document {
    fn current_state(&self) -> BoxFuture<'_, Result<Snapshot>> {
        Box::pin(async move { Ok(Snapshot::new(self.value())) })
    }
}

impl StateApplier for Document {
    fn apply_state<'a>(&'a self, state: &'a Snapshot) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            *self.0.lock().unwrap() = state.as_value().clone();
            Ok(())
        })
    }
}

fn expected_states() -> Vec<Value> {
    vec![
        json!({"components": []}),
        json!({"components": [{"type": "slider", "value": 0}]}),
        json!({"components": [{"type": "slider", "value": 5}]}),
        json!({"components": [{"type": "slider", "value": 5}, {"type": "graph"}]}),
        json!({"components": [{"type": "graph"}]}),
    ]
}

#[test]
fn test_n_captures_reconstruct_each_state() {
    let mut timeline = Timeline::new();
    let states = expected_states();
    let ids: Vec<MomentId> = states
        .iter()
        .map(|s| timeline.capture_moment(Snapshot::new(s.clone())).unwrap())
        .collect();

    assert_eq!(
        timeline.state_at(ids[0]).unwrap(),
        timeline.initial_snapshot().cloned().unwrap()
    );
    for (id, state) in ids.iter().zip(&states) {
        assert_eq!(timeline.state_at(*id).unwrap(), Snapshot::new(state.clone()));
    }
}

#[test]
fn test_story_session_persists_across_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path().join("timeline.json"));
    let document = Document::new(json!({"components": []}));

    let mut session = HistorySession::load_from(&store, TimelineSettings::default()).unwrap();
    let start = block_on(session.capture_from(&document, None)).unwrap();
    document.edit(|doc| doc["components"] = json!([{"type": "table"}]));
    let table = block_on(session.capture_from(&document, Some("add table"))).unwrap();
    session
        .timeline_mut()
        .unwrap()
        .set_narrative(table, "Dragged the dataset in")
        .unwrap();
    session.save_to(&store).unwrap();
    drop(session);

    let mut session = HistorySession::load_from(&store, TimelineSettings::default()).unwrap();
    assert_eq!(session.timeline().ids(), vec![start, table]);
    assert_eq!(
        session.timeline().moment(table).unwrap().narrative(),
        "Dragged the dataset in"
    );

    block_on(session.travel_with(start, &document)).unwrap();
    assert_eq!(document.value(), json!({"components": []}));

    // Capture from the past inserts; the later moment keeps its state.
    document.edit(|doc| doc["title"] = json!("draft"));
    let branch = block_on(session.capture_from(&document, Some("rename"))).unwrap();
    assert_eq!(session.timeline().ids(), vec![start, branch, table]);
    assert_eq!(
        session.timeline().state_at(table).unwrap(),
        Snapshot::new(json!({"components": [{"type": "table"}]}))
    );
    session.save_to(&store).unwrap();

    let data = store.load().unwrap().unwrap();
    assert_eq!(data.current_index, Some(1));
}

#[test]
fn test_reorder_remove_and_compact_keep_chain_replayable() {
    let mut timeline = Timeline::new();
    let ids: Vec<MomentId> = expected_states()
        .into_iter()
        .map(|s| timeline.capture_moment(Snapshot::new(s)).unwrap())
        .collect();

    timeline.move_after(ids[4], Some(ids[1])).unwrap();
    timeline.move_after(ids[0], Some(ids[3])).unwrap();
    timeline.travel_to(ids[2]).unwrap();
    timeline.remove_current().unwrap();
    timeline.compact_rapid_succession(i64::MAX, " / ").unwrap();

    timeline.verify().unwrap();
    // the moment right after the head is never folded into it
    assert_eq!(timeline.ids(), vec![ids[1], ids[4]]);
    assert_eq!(timeline.current_id(), Some(ids[4]));
    assert_eq!(
        timeline.moment(ids[4]).unwrap().title(),
        "Moment 4 / Moment 3 / start"
    );
    assert_eq!(
        timeline.state_at(ids[4]).unwrap(),
        Snapshot::new(expected_states()[0].clone())
    );
    assert_eq!(
        timeline.state_at(ids[1]).unwrap(),
        Snapshot::new(expected_states()[1].clone())
    );
}

#[test]
fn test_errors_are_reported_without_changes() {
    let mut timeline = Timeline::new();
    assert!(matches!(timeline.remove_current(), Err(StoryError::EmptyTimeline)));

    let head = timeline.capture_moment(Snapshot::new(json!({}))).unwrap();
    assert!(matches!(
        timeline.combine_with_predecessor(head, "merged"),
        Err(StoryError::NoPredecessor(_))
    ));
    assert!(matches!(
        timeline.travel_to(MomentId::new(77)),
        Err(StoryError::MomentNotFound(_))
    ));

    let err = StoryError::MomentNotFound(MomentId::new(77)).to_serializable();
    assert_eq!(err.kind, "MomentNotFound");
    assert_eq!(timeline.len(), 1);
}
