//! Append-only audit log of completed sync runs.

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::warn;

use crate::sync::SyncStatus;

#[derive(Serialize)]
struct AuditRecord<'a> {
    ts: String,
    total: u32,
    synced: u32,
    success: bool,
    status: &'a str,
}

/// Appends one JSON line for a completed run. Audit failures are warnings,
/// never sync failures.
pub fn record(path: &Path, status: &SyncStatus) {
    let record = AuditRecord {
        ts: status.synced_at.to_rfc3339(),
        total: status.total,
        synced: status.synced,
        success: status.success,
        status: &status.status,
    };
    let line = match serde_json::to_string(&record) {
        Ok(line) => line,
        Err(err) => {
            warn!(error = %err, "failed to encode audit record");
            return;
        }
    };

    if let Err(err) = append_line(path, &line) {
        warn!(path = %path.display(), error = %err, "failed to write audit record");
    }
}

fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.create(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    writeln!(file, "{line}")
}
