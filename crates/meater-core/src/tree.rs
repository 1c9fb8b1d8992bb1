// ── Host state tree ──
//
// The hierarchical key-value store the loop mirrors probe readings into.
// `StateTree` is the seam to the host; `MemoryTree` is the bundled
// implementation used by the CLI and the tests.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use serde_json::Value;
use strum::Display;
use thiserror::Error;
use tokio::sync::watch;

// ── Node schema ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NodeKind {
    /// Root of one probe's subtree.
    Device,
    /// Grouping node without a value.
    Channel,
    /// Leaf carrying a value.
    State,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ValueType {
    Number,
    String,
    Boolean,
}

/// Schema of a single node, fixed at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeSpec {
    pub kind: NodeKind,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_type: Option<ValueType>,
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub read: bool,
    pub write: bool,
}

impl NodeSpec {
    pub fn device(name: impl Into<String>) -> Self {
        Self::group(NodeKind::Device, name)
    }

    pub fn channel(name: impl Into<String>) -> Self {
        Self::group(NodeKind::Channel, name)
    }

    /// Read-only state leaf.
    pub fn state(name: impl Into<String>, value_type: ValueType, role: &str) -> Self {
        Self {
            kind: NodeKind::State,
            name: name.into(),
            value_type: Some(value_type),
            role: role.to_owned(),
            unit: None,
            read: true,
            write: false,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    fn group(kind: NodeKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            value_type: None,
            role: String::new(),
            unit: None,
            read: true,
            write: false,
        }
    }
}

/// Per-write flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Value confirmed by the device side (as opposed to a command).
    pub ack: bool,
    /// Value reads as absent once this many seconds have passed.
    pub expire_after_secs: Option<u64>,
}

impl WriteOptions {
    pub fn acked() -> Self {
        Self {
            ack: true,
            expire_after_secs: None,
        }
    }

    pub fn acked_expiring(expire_after_secs: Option<u64>) -> Self {
        Self {
            ack: true,
            expire_after_secs,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("no node at '{path}'")]
    UnknownNode { path: String },

    #[error("node '{path}' is a {kind} and cannot hold a value")]
    NotAState { path: String, kind: NodeKind },
}

// ── Collaborator trait ───────────────────────────────────────────────

/// The host-side state tree.
pub trait StateTree: Send + Sync {
    /// Ids of all provisioned device roots.
    fn device_ids(&self) -> Vec<String>;

    /// Create `path` with `spec` unless a node already exists there.
    /// Returns `true` when the node was created. Never overwrites.
    fn create_if_absent(&self, path: &str, spec: NodeSpec) -> bool;

    /// Write a value into an existing state node.
    fn write(&self, path: &str, value: Value, opts: WriteOptions) -> Result<(), TreeError>;

    /// Current, unexpired value at `path`.
    fn read(&self, path: &str) -> Option<Value>;
}

// ── In-memory implementation ─────────────────────────────────────────

/// A value as stored, with its write metadata.
#[derive(Debug, Clone, Serialize)]
pub struct StoredValue {
    pub value: Value,
    pub ack: bool,
    pub written_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl StoredValue {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Concurrent in-memory state tree.
///
/// Nodes and values live in separate `DashMap`s keyed by dotted path.
/// Every structural change or write bumps a version counter broadcast
/// through a `watch` channel.
pub struct MemoryTree {
    nodes: DashMap<String, NodeSpec>,
    values: DashMap<String, StoredValue>,
    version: watch::Sender<u64>,
}

impl Default for MemoryTree {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTree {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            nodes: DashMap::new(),
            values: DashMap::new(),
            version,
        }
    }

    /// Schema of the node at `path`.
    pub fn node(&self, path: &str) -> Option<NodeSpec> {
        self.nodes.get(path).map(|r| r.value().clone())
    }

    /// Value and metadata at `path`, including expired entries.
    pub fn stored(&self, path: &str) -> Option<StoredValue> {
        self.values.get(path).map(|r| r.value().clone())
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// All node paths under `prefix` (inclusive), sorted.
    pub fn paths_under(&self, prefix: &str) -> Vec<String> {
        let nested = format!("{prefix}.");
        let mut paths: Vec<String> = self
            .nodes
            .iter()
            .map(|r| r.key().clone())
            .filter(|k| k == prefix || k.starts_with(&nested))
            .collect();
        paths.sort();
        paths
    }

    /// Sorted map of every unexpired value.
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        let now = Utc::now();
        self.values
            .iter()
            .filter(|r| !r.value().is_expired(now))
            .map(|r| (r.key().clone(), r.value().value.clone()))
            .collect()
    }

    pub fn version(&self) -> u64 {
        *self.version.borrow()
    }

    /// Subscribe to the change counter.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    fn bump_version(&self) {
        self.version.send_modify(|v| *v += 1);
    }
}

impl StateTree for MemoryTree {
    fn device_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .nodes
            .iter()
            .filter(|r| r.value().kind == NodeKind::Device)
            .map(|r| r.key().clone())
            .collect();
        ids.sort();
        ids
    }

    fn create_if_absent(&self, path: &str, spec: NodeSpec) -> bool {
        let created = match self.nodes.entry(path.to_owned()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(spec);
                true
            }
        };
        if created {
            self.bump_version();
        }
        created
    }

    fn write(&self, path: &str, value: Value, opts: WriteOptions) -> Result<(), TreeError> {
        let kind = self
            .nodes
            .get(path)
            .map(|r| r.value().kind)
            .ok_or_else(|| TreeError::UnknownNode {
                path: path.to_owned(),
            })?;
        if kind != NodeKind::State {
            return Err(TreeError::NotAState {
                path: path.to_owned(),
                kind,
            });
        }

        let now = Utc::now();
        let expires_at = opts.expire_after_secs.and_then(|secs| {
            let delta = TimeDelta::try_seconds(i64::try_from(secs).ok()?)?;
            now.checked_add_signed(delta)
        });

        self.values.insert(
            path.to_owned(),
            StoredValue {
                value,
                ack: opts.ack,
                written_at: now,
                expires_at,
            },
        );
        self.bump_version();
        Ok(())
    }

    fn read(&self, path: &str) -> Option<Value> {
        let now = Utc::now();
        self.values
            .get(path)
            .filter(|r| !r.value().is_expired(now))
            .map(|r| r.value().value.clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tree_with_state(path: &str) -> MemoryTree {
        let tree = MemoryTree::new();
        tree.create_if_absent(path, NodeSpec::state("x", ValueType::Number, "value"));
        tree
    }

    #[test]
    fn create_if_absent_never_overwrites() {
        let tree = MemoryTree::new();
        assert!(tree.create_if_absent("p1", NodeSpec::device("first")));
        assert!(!tree.create_if_absent("p1", NodeSpec::device("second")));
        assert_eq!(tree.node("p1").unwrap().name, "first");
        assert_eq!(tree.node_count(), 1);
    }

    #[test]
    fn device_ids_lists_only_device_roots() {
        let tree = MemoryTree::new();
        tree.create_if_absent("b", NodeSpec::device("b"));
        tree.create_if_absent("a", NodeSpec::device("a"));
        tree.create_if_absent("a.cook", NodeSpec::channel("cook"));
        tree.create_if_absent("info", NodeSpec::channel("info"));
        assert_eq!(tree.device_ids(), vec!["a".to_owned(), "b".to_owned()]);
    }

    #[test]
    fn write_requires_existing_state_node() {
        let tree = MemoryTree::new();
        let err = tree
            .write("missing", json!(1), WriteOptions::acked())
            .unwrap_err();
        assert_eq!(
            err,
            TreeError::UnknownNode {
                path: "missing".into()
            }
        );

        tree.create_if_absent("dev", NodeSpec::device("dev"));
        let err = tree.write("dev", json!(1), WriteOptions::acked()).unwrap_err();
        assert!(matches!(err, TreeError::NotAState { .. }));
    }

    #[test]
    fn write_then_read() {
        let tree = tree_with_state("a.x");
        tree.write("a.x", json!(42.5), WriteOptions::acked()).unwrap();
        assert_eq!(tree.read("a.x"), Some(json!(42.5)));
        let stored = tree.stored("a.x").unwrap();
        assert!(stored.ack);
        assert!(stored.expires_at.is_none());
    }

    #[test]
    fn expired_values_read_as_absent() {
        let tree = tree_with_state("a.x");
        tree.write("a.x", json!(1), WriteOptions::acked_expiring(Some(0)))
            .unwrap();
        assert_eq!(tree.read("a.x"), None);
        assert!(tree.snapshot().is_empty());
        assert!(tree.stored("a.x").is_some());
    }

    #[test]
    fn long_expiry_keeps_value() {
        let tree = tree_with_state("a.x");
        tree.write("a.x", json!(1), WriteOptions::acked_expiring(Some(120)))
            .unwrap();
        assert_eq!(tree.read("a.x"), Some(json!(1)));
        assert!(tree.stored("a.x").unwrap().expires_at.is_some());
    }

    #[test]
    fn version_bumps_on_create_and_write_only() {
        let tree = MemoryTree::new();
        let v0 = tree.version();
        tree.create_if_absent("a.x", NodeSpec::state("x", ValueType::Number, "value"));
        let v1 = tree.version();
        tree.create_if_absent("a.x", NodeSpec::state("x", ValueType::Number, "value"));
        assert_eq!(tree.version(), v1);
        tree.write("a.x", json!(2), WriteOptions::acked()).unwrap();
        assert!(v1 > v0);
        assert!(tree.version() > v1);
    }

    #[test]
    fn paths_under_is_prefix_exact() {
        let tree = MemoryTree::new();
        tree.create_if_absent("p1", NodeSpec::device("p1"));
        tree.create_if_absent("p1.cook", NodeSpec::channel("cook"));
        tree.create_if_absent("p10", NodeSpec::device("p10"));
        assert_eq!(tree.paths_under("p1"), vec!["p1".to_owned(), "p1.cook".to_owned()]);
    }
}
