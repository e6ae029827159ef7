//! Shared output layer for human/JSON parity across CLI commands.

use std::io::{self, Write};

use muster_core::model::Incident;
use muster_core::state::EngineSnapshot;
use serde::Serialize;

/// Shared width for human output separators.
pub const RULE_WIDTH: usize = 72;

/// The two output modes supported by the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-optimized tables and sections.
    Human,
    /// Machine-readable JSON.
    Json,
}

impl OutputMode {
    #[must_use]
    pub const fn from_json_flag(json: bool) -> Self {
        if json { Self::Json } else { Self::Human }
    }

    /// Returns `true` if JSON output was requested.
    #[must_use]
    pub const fn is_json(self) -> bool {
        matches!(self, Self::Json)
    }
}

/// Write a horizontal separator used by human output.
pub fn rule(w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "{:-<width$}", "", width = RULE_WIDTH)
}

/// Serializable view of a refresh result.
#[derive(Debug, Serialize)]
pub struct SnapshotReport {
    pub incidents: Vec<Incident>,
    pub loading: bool,
    pub error: Option<String>,
    pub degraded: bool,
    pub last_refreshed_ms: Option<i64>,
}

impl SnapshotReport {
    #[must_use]
    pub fn from_snapshot(snapshot: EngineSnapshot) -> Self {
        let degraded = snapshot.error.as_ref().is_some_and(muster_core::SyncError::is_degraded);
        Self {
            incidents: snapshot.incidents,
            loading: snapshot.loading,
            error: snapshot.error.map(|e| e.to_string()),
            degraded,
            last_refreshed_ms: snapshot.last_refreshed_ms,
        }
    }
}

/// Render a snapshot in the requested mode.
pub fn render_snapshot(report: &SnapshotReport, mode: OutputMode) -> anyhow::Result<()> {
    let mut stdout = io::stdout().lock();

    if mode.is_json() {
        serde_json::to_writer_pretty(&mut stdout, report)?;
        writeln!(stdout)?;
        return Ok(());
    }

    if let Some(error) = &report.error {
        let prefix = if report.degraded { "note" } else { "error" };
        writeln!(stdout, "[{prefix}] {error}")?;
    }

    if report.incidents.is_empty() {
        writeln!(stdout, "No assigned incidents.")?;
        return Ok(());
    }

    writeln!(
        stdout,
        "{:<14} {:<12} {:<14} {:<26} {}",
        "ID", "STATUS", "TYPE", "RESPONDED/CREATED", "LOCATION"
    )?;
    rule(&mut stdout)?;
    for incident in &report.incidents {
        writeln!(
            stdout,
            "{:<14} {:<12} {:<14} {:<26} {}",
            incident.id,
            incident.status,
            incident.incident_type.as_deref().unwrap_or("-"),
            incident
                .responded_at
                .as_deref()
                .unwrap_or(&incident.created_at),
            incident.location_address.as_deref().unwrap_or("-"),
        )?;
    }
    Ok(())
}

/// Render a plain success line (human) or `{"ok": true, "message": ...}`.
pub fn render_success(mode: OutputMode, message: &str) -> anyhow::Result<()> {
    let mut stdout = io::stdout().lock();
    if mode.is_json() {
        serde_json::to_writer(&mut stdout, &serde_json::json!({"ok": true, "message": message}))?;
        writeln!(stdout)?;
    } else {
        writeln!(stdout, "{message}")?;
    }
    Ok(())
}
