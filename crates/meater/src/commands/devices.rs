//! One-shot probe listing: log in, poll once, render the tree.

use std::sync::Arc;

use chrono::{DateTime, Local};
use owo_colors::OwoColorize;
use serde::Serialize;
use serde_json::Value;
use tabled::Tabled;
use tracing::debug;

use meater_core::{MemoryTree, Poller, StateTree};

use crate::cli::{GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

use super::poller_config;

// ── Probe view ──────────────────────────────────────────────────────

/// One probe as read back from the state tree.
#[derive(Debug, Serialize)]
struct ProbeView {
    id: String,
    last_update: Option<i64>,
    internal: Option<f64>,
    ambient: Option<f64>,
    target: Option<f64>,
    peak: Option<f64>,
    cook_id: Option<String>,
    cook_name: Option<String>,
    cook_state: Option<String>,
    time_elapsed: Option<i64>,
    time_remaining: Option<i64>,
}

impl ProbeView {
    fn from_tree(tree: &MemoryTree, path: &str) -> Self {
        let at = |suffix: &str| tree.read(&format!("{path}.{suffix}"));
        let num = |suffix: &str| at(suffix).as_ref().and_then(Value::as_f64);
        let int = |suffix: &str| at(suffix).as_ref().and_then(Value::as_i64);
        let text = |suffix: &str| at(suffix).and_then(|v| v.as_str().map(str::to_owned));

        Self {
            id: tree.node(path).map_or_else(|| path.to_owned(), |n| n.name),
            last_update: int("last_update"),
            internal: num("temperature.internal"),
            ambient: num("temperature.ambient"),
            target: num("temperature.target"),
            peak: num("temperature.peak"),
            cook_id: text("cook.id"),
            cook_name: text("cook.name"),
            cook_state: text("cook.state"),
            time_elapsed: int("cook.time_elapsed"),
            time_remaining: int("cook.time_remaining"),
        }
    }
}

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct ProbeRow {
    #[tabled(rename = "Probe")]
    id: String,
    #[tabled(rename = "Meat")]
    meat: String,
    #[tabled(rename = "Cook")]
    state: String,
    #[tabled(rename = "Internal")]
    internal: String,
    #[tabled(rename = "Ambient")]
    ambient: String,
    #[tabled(rename = "Target")]
    target: String,
    #[tabled(rename = "Remaining")]
    remaining: String,
    #[tabled(rename = "Updated")]
    updated: String,
}

impl ProbeRow {
    fn new(p: &ProbeView, unit: &str, color: bool) -> Self {
        let state = p.cook_state.clone().unwrap_or_else(|| "idle".into());
        let state = match (color, p.cook_state.is_some()) {
            (false, _) => state,
            (true, true) => state.green().to_string(),
            (true, false) => state.dimmed().to_string(),
        };

        Self {
            id: p.id.clone(),
            meat: p.cook_name.clone().unwrap_or_else(|| "-".into()),
            state,
            internal: fmt_temp(p.internal, unit),
            ambient: fmt_temp(p.ambient, unit),
            target: fmt_temp(p.target, unit),
            remaining: fmt_secs(p.time_remaining),
            updated: fmt_timestamp(p.last_update),
        }
    }
}

fn fmt_temp(value: Option<f64>, unit: &str) -> String {
    value.map_or_else(|| "-".into(), |v| format!("{v:.1} {unit}"))
}

/// The cloud reports unknown durations as negative values.
fn fmt_secs(secs: Option<i64>) -> String {
    match secs {
        Some(s) if s >= 0 => {
            let (h, m) = (s / 3600, (s % 3600) / 60);
            if h > 0 {
                format!("{h}h {m:02}m")
            } else {
                format!("{m}m")
            }
        }
        _ => "-".into(),
    }
}

fn fmt_timestamp(secs: Option<i64>) -> String {
    secs.and_then(|s| DateTime::from_timestamp(s, 0))
        .map_or_else(
            || "-".into(),
            |dt| dt.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string(),
        )
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(global: &GlobalOpts) -> Result<(), CliError> {
    let (path, config) = poller_config(global)?;
    if !config.credentials.is_complete() {
        return Err(CliError::NoCredentials {
            path: path.display().to_string(),
        });
    }

    let unit = config.temp_unit.clone();
    let tree = Arc::new(MemoryTree::new());
    let mut poller = Poller::new(config, Arc::clone(&tree))?;

    poller.login_once().await?;
    let outcome = poller.poll_once().await?;
    debug!(?outcome, "one-shot poll finished");

    let probes: Vec<ProbeView> = tree
        .device_ids()
        .iter()
        .map(|p| ProbeView::from_tree(&tree, p))
        .collect();

    if probes.is_empty() && matches!(global.output, OutputFormat::Table) && !global.quiet {
        eprintln!("No probes reported by the MEATER cloud.");
        return Ok(());
    }

    let color = output::should_color(global.color);
    let rendered = output::render_list(
        global.output,
        &probes,
        |p| ProbeRow::new(p, &unit, color),
        |p| p.id.clone(),
    )?;
    output::print_output(&rendered, global.quiet);
    Ok(())
}
