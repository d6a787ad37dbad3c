// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Flat text rendering of audit events and versions for a time range.

use std::fmt::Write;

use chrono::{DateTime, Utc};
use keepsake_core::VersionedMemory;
use keepsake_core::types::{format_timestamp, now};

use crate::chain::AuditEntry;

/// Render an export report. Output is plain text, one record per line,
/// with version content indented underneath its header line.
pub fn render_report(
    owner: &str,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    entries: &[AuditEntry],
    versions: &[VersionedMemory],
) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = writeln!(out, "Keepsake audit export");
    let _ = writeln!(out, "owner: {owner}");
    let _ = writeln!(
        out,
        "range: {} .. {}",
        format_timestamp(&from),
        format_timestamp(&to)
    );
    let _ = writeln!(out, "generated: {}", format_timestamp(&now()));

    let _ = writeln!(out, "\n== Events ({}) ==", entries.len());
    for entry in entries {
        let e = &entry.event;
        let _ = write!(
            out,
            "{} #{} {}",
            format_timestamp(&entry.timestamp),
            entry.seq,
            e.kind
        );
        if let Some(op) = &e.operation {
            let _ = write!(out, " op={op}");
        }
        if let Some(id) = &e.memory_id {
            let _ = write!(out, " memory={id}");
        }
        if let Some(v) = e.version {
            let _ = write!(out, " version={v}");
        }
        if !e.detail.is_empty() {
            let _ = write!(out, " :: {}", one_line(&e.detail));
        }
        out.push('\n');
    }

    let _ = writeln!(out, "\n== Versions ({}) ==", versions.len());
    for v in versions {
        let mut flags = Vec::new();
        if v.is_original {
            flags.push("original");
        }
        if v.is_current {
            flags.push("current");
        }
        if v.is_backup {
            flags.push("backup");
        }
        let _ = writeln!(
            out,
            "{} {} v{} {} {} importance={:.2} confidence={:.2} [{}] reason={}",
            format_timestamp(&v.created_at),
            v.memory_id,
            v.version_number,
            v.edit_source,
            v.memory_type,
            v.importance,
            v.edit_confidence,
            flags.join(","),
            one_line(&v.edit_reason),
        );
        let _ = writeln!(out, "    {}", one_line(&v.content));
    }
    out
}

fn one_line(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
