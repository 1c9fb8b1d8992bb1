// ── Tree reconciliation ──
//
// Applies one device snapshot from the cloud to the state tree: provision
// unseen probes, write readings, count active cooks and pick the next poll
// interval. Probes missing from a snapshot are left untouched.

use std::collections::HashSet;

use meater_api::Device;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::tree::{NodeSpec, StateTree, TreeError, ValueType, WriteOptions};

/// Path of the "any probe cooking" flag.
pub const COOKING_ACTIVE: &str = "cooking_active";

/// Inputs that shape a reconciliation pass.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub temp_unit: String,
    pub clear_stale_values: bool,
    pub idle_interval_secs: u64,
    pub cook_interval_secs: u64,
    /// Interval in force when the poll started; expiry derives from it.
    pub current_interval_secs: u64,
}

impl SyncSettings {
    /// Expiry attached to every write of this pass.
    pub fn expire_after_secs(&self) -> Option<u64> {
        self.clear_stale_values
            .then(|| self.current_interval_secs.saturating_mul(2))
    }
}

/// Result of a reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Devices whose cook block carried a non-empty state.
    pub cooking_count: usize,
    /// Interval to schedule the next poll with.
    pub interval_secs: u64,
    /// Devices provisioned during this pass.
    pub provisioned: Vec<String>,
}

/// Tree path segment for a cloud device id. Dots would split the
/// hierarchy, so anything outside `[A-Za-z0-9_-]` becomes `_`.
pub fn device_path(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Create the full node subtree for one probe.
///
/// Every node uses create-if-absent semantics, so calling this for an
/// existing device changes nothing. Returns `true` if the device root was
/// newly created.
pub fn provision_device<T: StateTree + ?Sized>(tree: &T, id: &str, temp_unit: &str) -> bool {
    let root = device_path(id);
    let node = |suffix: &str| format!("{root}.{suffix}");

    let created = tree.create_if_absent(&root, NodeSpec::device(id));

    let temp = |name: &str, role: &str| {
        NodeSpec::state(name, ValueType::Number, role).with_unit(temp_unit)
    };
    let text = |name: &str| NodeSpec::state(name, ValueType::String, "state");
    let secs = |name: &str| {
        NodeSpec::state(name, ValueType::Number, "value.interval").with_unit("sec")
    };

    let schema = [
        (
            node("last_update"),
            NodeSpec::state("date/time of last transmitted value", ValueType::Number, "date"),
        ),
        (node("temperature"), NodeSpec::channel("temperature")),
        (
            node("temperature.internal"),
            temp("temperature of meat", "value.temperature"),
        ),
        (
            node("temperature.ambient"),
            temp("temperature of ambient", "value.temperature"),
        ),
        (
            node("temperature.target"),
            temp("target temperature of cook session", "value.temperature"),
        ),
        (
            node("temperature.peak"),
            temp("peak temperature of cook session", "value.temperature.max"),
        ),
        (node("cook"), NodeSpec::channel("cook")),
        (node("cook.id"), text("ID of cook session")),
        (node("cook.name"), text("name of selected meat")),
        (node("cook.state"), text("state of cook session")),
        (node("cook.time_elapsed"), secs("elapsed time of cook session")),
        (node("cook.time_remaining"), secs("remaining time of cook session")),
    ];

    for (path, spec) in schema {
        tree.create_if_absent(&path, spec);
    }

    created
}

/// Reconcile the tree with one cloud snapshot.
///
/// Order is fixed: read known ids, provision unseen devices, write base
/// readings, write cook readings for active cooks, then pick the interval
/// and write the cooking flag.
pub fn reconcile<T: StateTree + ?Sized>(
    tree: &T,
    devices: &[Device],
    settings: &SyncSettings,
) -> Result<SyncOutcome, TreeError> {
    let known: HashSet<String> = tree.device_ids().into_iter().collect();
    let opts = WriteOptions::acked_expiring(settings.expire_after_secs());
    let mut outcome = SyncOutcome::default();

    debug!(count = devices.len(), "got device data from cloud");

    for device in devices {
        let root = device_path(&device.id);

        if !known.contains(&root) {
            info!(device = %device.id, "found new probe, creating device");
            provision_device(tree, &device.id, &settings.temp_unit);
            outcome.provisioned.push(device.id.clone());
        }

        let put = |suffix: &str, value: Value| tree.write(&format!("{root}.{suffix}"), value, opts);

        put("last_update", json!(device.updated_at))?;
        put("temperature.internal", json!(device.temperature.internal))?;
        put("temperature.ambient", json!(device.temperature.ambient))?;

        // Absent cook block and empty state both mean "not cooking".
        if let Some(cook) = device.active_cook() {
            outcome.cooking_count += 1;

            put("temperature.target", json!(cook.temperature.target))?;
            put("temperature.peak", json!(cook.temperature.peak))?;
            put("cook.id", json!(cook.id))?;
            put("cook.name", json!(cook.name))?;
            put("cook.state", json!(cook.state))?;
            put("cook.time_elapsed", json!(cook.time.elapsed))?;
            put("cook.time_remaining", json!(cook.time.remaining))?;
        } else if device.cook.is_some() {
            debug!(device = %device.id, "cook block with empty state, treating as not cooking");
        }
    }

    let cooking = outcome.cooking_count > 0;
    outcome.interval_secs = if cooking {
        settings.cook_interval_secs
    } else {
        settings.idle_interval_secs
    };

    tree.create_if_absent(
        COOKING_ACTIVE,
        NodeSpec::state("at least one probe is cooking", ValueType::Boolean, "indicator"),
    );
    tree.write(COOKING_ACTIVE, json!(cooking), opts)?;

    debug!(
        cooking = outcome.cooking_count,
        interval_secs = outcome.interval_secs,
        "reconciled device data"
    );

    Ok(outcome)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::tree::{MemoryTree, NodeKind};
    use meater_api::{Cook, ProbeTemperature};
    use pretty_assertions::assert_eq;

    fn settings() -> SyncSettings {
        SyncSettings {
            temp_unit: "°C".into(),
            clear_stale_values: false,
            idle_interval_secs: 60,
            cook_interval_secs: 15,
            current_interval_secs: 60,
        }
    }

    fn probe(id: &str, cook_state: Option<&str>) -> Device {
        Device {
            id: id.into(),
            updated_at: 1_700_000_000,
            temperature: ProbeTemperature {
                internal: 50.0,
                ambient: 120.0,
            },
            cook: cook_state.map(|state| Cook {
                id: format!("{id}-cook"),
                name: "Brisket".into(),
                state: state.into(),
                ..Cook::default()
            }),
        }
    }

    #[test]
    fn provisioning_creates_full_subtree() {
        let tree = MemoryTree::new();
        assert!(provision_device(&tree, "p1", "°F"));

        let paths = tree.paths_under("p1");
        assert_eq!(paths.len(), 13);
        assert_eq!(tree.node("p1").unwrap().kind, NodeKind::Device);
        assert_eq!(tree.node("p1.cook").unwrap().kind, NodeKind::Channel);
        assert_eq!(
            tree.node("p1.temperature.peak").unwrap().unit.as_deref(),
            Some("°F")
        );
        assert_eq!(
            tree.node("p1.cook.time_remaining").unwrap().unit.as_deref(),
            Some("sec")
        );
    }

    #[test]
    fn provisioning_twice_is_a_no_op() {
        let tree = MemoryTree::new();
        provision_device(&tree, "p1", "°C");
        let count = tree.node_count();
        let version = tree.version();

        assert!(!provision_device(&tree, "p1", "°F"));
        assert_eq!(tree.node_count(), count);
        assert_eq!(tree.version(), version);
        // First schema wins.
        assert_eq!(
            tree.node("p1.temperature.internal").unwrap().unit.as_deref(),
            Some("°C")
        );
    }

    #[test]
    fn base_fields_written_regardless_of_cook() {
        let tree = MemoryTree::new();
        reconcile(&tree, &[probe("idle", None)], &settings()).unwrap();

        assert_eq!(tree.read("idle.last_update"), Some(json!(1_700_000_000)));
        assert_eq!(tree.read("idle.temperature.internal"), Some(json!(50.0)));
        assert_eq!(tree.read("idle.temperature.ambient"), Some(json!(120.0)));
        assert_eq!(tree.read("idle.cook.state"), None);
        assert_eq!(tree.read("idle.temperature.target"), None);
    }

    #[test]
    fn one_of_two_cooking() {
        let tree = MemoryTree::new();
        let devices = [probe("a", Some("Started")), probe("b", Some(""))];

        let outcome = reconcile(&tree, &devices, &settings()).unwrap();

        assert_eq!(outcome.cooking_count, 1);
        assert_eq!(outcome.interval_secs, 15);
        assert_eq!(outcome.provisioned, vec!["a".to_owned(), "b".to_owned()]);
        assert_eq!(tree.read("a.cook.state"), Some(json!("Started")));
        assert_eq!(tree.read("a.cook.name"), Some(json!("Brisket")));
        assert_eq!(tree.read("b.cook.state"), None);
        assert_eq!(tree.read("b.cook.name"), None);
        assert_eq!(tree.read(COOKING_ACTIVE), Some(json!(true)));
    }

    #[test]
    fn nobody_cooking_selects_idle_interval() {
        let tree = MemoryTree::new();
        let devices = [probe("a", None), probe("b", Some(""))];

        let outcome = reconcile(&tree, &devices, &settings()).unwrap();

        assert_eq!(outcome.cooking_count, 0);
        assert_eq!(outcome.interval_secs, 60);
        assert_eq!(tree.read(COOKING_ACTIVE), Some(json!(false)));
    }

    #[test]
    fn consecutive_passes_provision_once() {
        let tree = MemoryTree::new();
        let first = reconcile(&tree, &[probe("a", None)], &settings()).unwrap();
        let nodes = tree.node_count();
        let second = reconcile(&tree, &[probe("a", Some("Started"))], &settings()).unwrap();

        assert_eq!(first.provisioned, vec!["a".to_owned()]);
        assert!(second.provisioned.is_empty());
        assert_eq!(tree.node_count(), nodes);
    }

    #[test]
    fn absent_devices_are_kept() {
        let tree = MemoryTree::new();
        reconcile(&tree, &[probe("a", None), probe("b", None)], &settings()).unwrap();
        reconcile(&tree, &[probe("a", None)], &settings()).unwrap();

        assert_eq!(tree.device_ids(), vec!["a".to_owned(), "b".to_owned()]);
        assert!(tree.read("b.temperature.internal").is_some());
    }

    #[test]
    fn stale_expiry_is_twice_the_current_interval() {
        let tree = MemoryTree::new();
        let settings = SyncSettings {
            clear_stale_values: true,
            current_interval_secs: 45,
            ..settings()
        };
        assert_eq!(settings.expire_after_secs(), Some(90));

        reconcile(&tree, &[probe("a", None)], &settings).unwrap();
        let stored = tree.stored("a.temperature.internal").unwrap();
        let ttl = stored.expires_at.unwrap() - stored.written_at;
        assert_eq!(ttl.num_seconds(), 90);
    }

    #[test]
    fn expiry_disabled_by_default() {
        assert_eq!(settings().expire_after_secs(), None);
    }

    #[test]
    fn device_ids_with_dots_are_sanitized() {
        assert_eq!(device_path("a.b c"), "a_b_c");
        let tree = MemoryTree::new();
        reconcile(&tree, &[probe("x.y", None)], &settings()).unwrap();
        assert!(tree.read("x_y.temperature.internal").is_some());
        assert_eq!(tree.node("x_y").unwrap().name, "x.y");
    }
}
