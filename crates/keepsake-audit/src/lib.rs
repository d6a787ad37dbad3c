// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Version history and audit trail for the Keepsake memory engine.
//!
//! [`VersionManager`] applies operations as atomic change sets, appends a
//! current version for every edit, and supports rollback, pruning, backups
//! and export. Every step is recorded in a per-owner [`AuditLog`] whose
//! lines are SHA-256 hash-chained.

pub mod chain;
pub mod export;
pub mod manager;

pub use chain::{AuditEntry, AuditEvent, AuditEventKind, AuditLog, ChainReport, GENESIS_HASH};
pub use export::render_report;
pub use manager::{AppliedOperation, FieldChange, VersionManager, diff_versions};
