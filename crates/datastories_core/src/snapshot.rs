//! Snapshot and diff primitive.
//!
//! A [`Snapshot`] is the full, self-contained state of the external document at
//! one instant. The history engine never looks inside it; the only code that
//! does is the diff primitive in this module, which is an adapter over
//! RFC 6902 JSON Patch (`json-patch`).
//!
//! # Contract
//!
//! - `Diff::compute(a, b).apply(a) == Ok(b)` for all snapshots `a`, `b`.
//! - `Diff::apply` fails when the diff was not computed against the given base.
//!
//! The second half is what lets replay detect a corrupted or reordered chain.
//! Plain JSON Patch silently succeeds on many mismatched bases (an `add` just
//! overwrites), so [`Diff::compute`] guards every `remove` and `replace` with a
//! `test` operation carrying the value it expects to find.

use json_patch::{Patch, PatchOperation, TestOperation};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Full state of the external document at one instant.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(Value);

impl Snapshot {
    /// Wrap a JSON value as a snapshot.
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Parse a snapshot from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(Self(serde_json::from_str(text)?))
    }

    /// Render the snapshot as pretty-printed JSON.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.0)?)
    }

    /// Borrow the underlying value (for the host side only).
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Take the underlying value (for the host side only).
    pub fn into_value(self) -> Value {
        self.0
    }
}

impl From<Value> for Snapshot {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Reason a diff could not be applied to a base snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchFailure(pub String);

impl std::fmt::Display for PatchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Difference between two snapshots.
///
/// Opaque to the rest of the crate: it can be computed, applied, persisted and
/// compared, nothing else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Diff(Patch);

impl Diff {
    /// Compute the diff that turns `from` into `to`.
    pub fn compute(from: &Snapshot, to: &Snapshot) -> Self {
        let patch = json_patch::diff(&from.0, &to.0);

        // Test values are taken from a scratch copy that evolves op by op, so
        // index shifts from earlier array removals are accounted for.
        let mut scratch = from.0.clone();
        let mut ops = Vec::with_capacity(patch.0.len() * 2);
        for op in patch.0 {
            let guarded = match &op {
                PatchOperation::Remove(remove) => Some(remove.path.clone()),
                PatchOperation::Replace(replace) => Some(replace.path.clone()),
                _ => None,
            };
            if let Some(path) = guarded
                && let Some(expected) = scratch.pointer(&path)
            {
                ops.push(PatchOperation::Test(TestOperation {
                    path,
                    value: expected.clone(),
                }));
            }
            if json_patch::patch(&mut scratch, std::slice::from_ref(&op)).is_err() {
                log::warn!("JSON diff produced an operation that does not apply; dropping guards");
                return Self(json_patch::diff(&from.0, &to.0));
            }
            ops.push(op);
        }

        Self(Patch(ops))
    }

    /// The diff that changes nothing.
    pub fn identity() -> Self {
        Self(Patch(Vec::new()))
    }

    /// Apply this diff to `base`, producing the target snapshot.
    ///
    /// `base` is never modified; on failure no partial state escapes.
    pub fn apply(&self, base: &Snapshot) -> std::result::Result<Snapshot, PatchFailure> {
        let mut target = base.0.clone();
        json_patch::patch(&mut target, &self.0.0).map_err(|e| PatchFailure(e.to_string()))?;
        Ok(Snapshot(target))
    }

    /// Whether applying this diff leaves any snapshot unchanged.
    pub fn is_identity(&self) -> bool {
        self.0.0.iter().all(|op| matches!(op, PatchOperation::Test(_)))
    }

    /// Number of operations that change the document (guards excluded).
    pub fn change_count(&self) -> usize {
        self.0
            .0
            .iter()
            .filter(|op| !matches!(op, PatchOperation::Test(_)))
            .count()
    }
}
