//! RFC 6902 JSON Patch construction for node annotations
//!
//! Annotation keys routinely contain `/` (`example.com/public-ip`), so every
//! key is escaped before it is embedded into a JSON pointer: `~` becomes
//! `~0` first, then `/` becomes `~1`. Reversing the order turns a literal
//! `/` into `~01` and corrupts the key.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::ip::IpAddress;

/// JSON pointer of a node's annotation map
pub const ANNOTATIONS_PATH: &str = "/metadata/annotations";

/// Patch operation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    /// Create a member (or the annotation map itself)
    Add,
    /// Overwrite an existing member
    Replace,
    /// Precondition: the target equals `value`, or the whole patch fails
    Test,
}

/// A single JSON Patch operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOperation {
    pub op: PatchOp,
    pub path: String,
    pub value: serde_json::Value,
}

impl PatchOperation {
    /// A `replace` operation
    pub fn replace(path: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self {
            op: PatchOp::Replace,
            path: path.into(),
            value: value.into(),
        }
    }

    /// A `test` operation
    pub fn test(path: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self {
            op: PatchOp::Test,
            path: path.into(),
            value: value.into(),
        }
    }

    /// An `add` operation
    pub fn add(path: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self {
            op: PatchOp::Add,
            path: path.into(),
            value: value.into(),
        }
    }
}

/// Ordered sequence of patch operations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatchSet(Vec<PatchOperation>);

impl PatchSet {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, op: PatchOperation) {
        self.0.push(op);
    }

    pub fn operations(&self) -> &[PatchOperation] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Serialize to the JSON array sent on the wire
    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}

impl FromIterator<PatchOperation> for PatchSet {
    fn from_iter<I: IntoIterator<Item = PatchOperation>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Escape a key for use as a single JSON pointer segment
pub fn escape_key(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}

/// Reverse of [`escape_key`]
pub fn unescape_key(segment: &str) -> String {
    segment.replace("~1", "/").replace("~0", "~")
}

fn key_path(base_path: &str, key: &str) -> String {
    format!("{}/{}", base_path, escape_key(key))
}

/// Build one `replace` operation per key, in key order.
///
/// Assumes every key already exists under `base_path`. See
/// [`plan_annotations`] for the variant that checks current state.
pub fn build<K: AsRef<str>>(base_path: &str, keys: &[K], value: &IpAddress) -> PatchSet {
    keys.iter()
        .map(|key| PatchOperation::replace(key_path(base_path, key.as_ref()), value.as_str()))
        .collect()
}

/// Compute the minimal annotation patch against the node's current map.
///
/// For each key in order:
/// - already equal to `value`: no operation
/// - present with another value: `replace`
/// - absent: `add`
///
/// When the node has no annotation map at all, an empty map is added first
/// so the per-key `add` operations have a parent to land in. That `add` is
/// guarded by a `test` that the map is still null: if another writer created
/// the map after the read, the whole patch is rejected instead of replacing
/// their annotations, and the next cycle plans against the new map.
/// An empty result means the node is already up to date.
pub fn plan_annotations<K: AsRef<str>>(
    current: Option<&BTreeMap<String, String>>,
    keys: &[K],
    value: &IpAddress,
) -> PatchSet {
    let mut patch = PatchSet::new();

    if current.is_none() && !keys.is_empty() {
        patch.push(PatchOperation::test(ANNOTATIONS_PATH, serde_json::Value::Null));
        patch.push(PatchOperation::add(
            ANNOTATIONS_PATH,
            serde_json::Value::Object(serde_json::Map::new()),
        ));
    }

    for key in keys {
        let key = key.as_ref();
        let path = key_path(ANNOTATIONS_PATH, key);
        match current.and_then(|annotations| annotations.get(key)) {
            Some(existing) if value == existing.as_str() => {}
            Some(_) => patch.push(PatchOperation::replace(path, value.as_str())),
            None => patch.push(PatchOperation::add(path, value.as_str())),
        }
    }

    patch
}
