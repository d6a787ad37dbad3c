// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only, hash-chained audit log.
//!
//! One event per line:
//!
//! ```text
//! 2026-03-01T10:00:00.000Z seq=3 COMPLETE owner="alice" memory=4f1c.. op=UPDATE version=2 detail="..." prev=<hex> hash=<hex>
//! ```
//!
//! `hash` is the SHA-256 of everything before ` hash=`, and `prev` is the
//! previous line's hash (64 zeros for the first line). Editing, reordering
//! or dropping any line breaks the chain.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use keepsake_core::KeepsakeError;
use keepsake_core::types::{format_timestamp, now, parse_timestamp};
use sha2::{Digest, Sha256};
use strum::{Display, EnumString};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// `prev` value of the first entry.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventKind {
    Start,
    Complete,
    Failed,
    Rollback,
    Prune,
    Purge,
    Pin,
    Unpin,
}

/// What happened, before it is stamped and chained.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEvent {
    pub kind: AuditEventKind,
    pub owner: String,
    pub memory_id: Option<String>,
    pub operation: Option<String>,
    pub version: Option<u32>,
    pub detail: String,
}

impl AuditEvent {
    pub fn new(kind: AuditEventKind, owner: impl Into<String>) -> Self {
        Self {
            kind,
            owner: owner.into(),
            memory_id: None,
            operation: None,
            version: None,
            detail: String::new(),
        }
    }

    pub fn memory(mut self, memory_id: impl Into<String>) -> Self {
        self.memory_id = Some(memory_id.into());
        self
    }

    pub fn operation(mut self, operation: impl ToString) -> Self {
        self.operation = Some(operation.to_string());
        self
    }

    pub fn version(mut self, version: u32) -> Self {
        self.version = Some(version);
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }
}

/// A chained line as written to (or read from) the log.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub event: AuditEvent,
    pub prev_hash: String,
    pub hash: String,
}

/// Result of walking the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainReport {
    /// Lines that verified before the first break.
    pub verified: usize,
    /// 1-based line number of the first broken line, if any.
    pub broken_at: Option<usize>,
    pub reason: Option<String>,
}

impl ChainReport {
    pub fn is_intact(&self) -> bool {
        self.broken_at.is_none()
    }
}

enum Sink {
    File(PathBuf),
    Memory(Vec<String>),
}

struct ChainState {
    sink: Sink,
    next_seq: u64,
    last_hash: String,
}

/// Durable audit log for one owner.
pub struct AuditLog {
    state: Mutex<ChainState>,
}

impl AuditLog {
    /// Open (or create on first append) the log at `path`, resuming the chain.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, KeepsakeError> {
        let path = path.into();
        let (next_seq, last_hash) = match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                let complete = complete_prefix(&content);
                if complete.len() < content.len() {
                    warn!(
                        path = %path.display(),
                        dropped = content.len() - complete.len(),
                        "audit log has a torn final line, truncating"
                    );
                    drop_torn_tail(&path, complete.len()).await?;
                }
                resume_point(complete)?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => (1, GENESIS_HASH.to_string()),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), next_seq, "audit log opened");
        Ok(Self {
            state: Mutex::new(ChainState {
                sink: Sink::File(path),
                next_seq,
                last_hash,
            }),
        })
    }

    /// Log kept in memory, for ephemeral owners and tests.
    pub fn in_memory() -> Self {
        Self {
            state: Mutex::new(ChainState {
                sink: Sink::Memory(Vec::new()),
                next_seq: 1,
                last_hash: GENESIS_HASH.to_string(),
            }),
        }
    }

    /// File backing this log, if any.
    pub async fn path(&self) -> Option<PathBuf> {
        match &self.state.lock().await.sink {
            Sink::File(path) => Some(path.clone()),
            Sink::Memory(_) => None,
        }
    }

    /// Stamp, chain and durably append one event.
    pub async fn append(&self, event: AuditEvent) -> Result<AuditEntry, KeepsakeError> {
        let mut state = self.state.lock().await;
        let timestamp = now();
        let seq = state.next_seq;
        let body = render_body(seq, &timestamp, &event, &state.last_hash);
        let hash = digest(&body);
        let line = format!("{body} hash={hash}\n");

        match &mut state.sink {
            Sink::File(path) => {
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                let mut file = tokio::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&*path)
                    .await?;
                file.write_all(line.as_bytes()).await?;
                file.sync_data().await?;
            }
            Sink::Memory(lines) => lines.push(line),
        }

        let entry = AuditEntry {
            seq,
            timestamp,
            event,
            prev_hash: std::mem::replace(&mut state.last_hash, hash.clone()),
            hash,
        };
        state.next_seq += 1;
        Ok(entry)
    }

    /// Every parsed entry, oldest first.
    pub async fn entries(&self) -> Result<Vec<AuditEntry>, KeepsakeError> {
        let content = self.raw().await?;
        content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(parse_line)
            .collect()
    }

    /// Entries stamped within `[from, to]`.
    pub async fn entries_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<AuditEntry>, KeepsakeError> {
        Ok(self
            .entries()
            .await?
            .into_iter()
            .filter(|e| e.timestamp >= from && e.timestamp <= to)
            .collect())
    }

    /// Walk the whole log and check every hash link.
    pub async fn verify_chain(&self) -> Result<ChainReport, KeepsakeError> {
        Ok(verify_text(&self.raw().await?))
    }

    async fn raw(&self) -> Result<String, KeepsakeError> {
        let state = self.state.lock().await;
        match &state.sink {
            Sink::File(path) => match tokio::fs::read_to_string(path).await {
                Ok(content) => Ok(content),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
                Err(e) => Err(e.into()),
            },
            Sink::Memory(lines) => Ok(lines.concat()),
        }
    }
}

fn digest(body: &str) -> String {
    hex::encode(Sha256::digest(body.as_bytes()))
}

fn quote(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

fn render_body(seq: u64, ts: &DateTime<Utc>, event: &AuditEvent, prev: &str) -> String {
    let opt = |v: Option<&str>| v.map(str::to_string).unwrap_or_else(|| "-".to_string());
    format!(
        "{} seq={seq} {} owner={} memory={} op={} version={} detail={} prev={prev}",
        format_timestamp(ts),
        event.kind,
        quote(&event.owner),
        event.memory_id.as_deref().map(quote).unwrap_or_else(|| "-".to_string()),
        opt(event.operation.as_deref()),
        event
            .version
            .map(|v| v.to_string())
            .unwrap_or_else(|| "-".to_string()),
        quote(&event.detail),
    )
}

fn corrupt(reason: impl Into<String>) -> KeepsakeError {
    KeepsakeError::Internal(format!("corrupt audit line: {}", reason.into()))
}

/// Split a line into its leading timestamp, the kind, and `key=value` pairs.
/// Values are bare tokens or JSON strings.
fn tokenize(body: &str) -> Result<(String, String, Vec<(String, String)>), KeepsakeError> {
    let (ts, rest) = body.split_once(' ').ok_or_else(|| corrupt("missing timestamp"))?;
    let mut pairs = Vec::new();
    let mut kind = None;
    let mut rest = rest.trim_start();

    while !rest.is_empty() {
        let token_end = rest.find([' ', '=']).unwrap_or(rest.len());
        let key = &rest[..token_end];
        if rest[token_end..].starts_with('=') {
            let value_src = &rest[token_end + 1..];
            let (value, consumed) = if value_src.starts_with('"') {
                let end = json_string_end(value_src).ok_or_else(|| corrupt("unterminated string"))?;
                let parsed: String = serde_json::from_str(&value_src[..end])
                    .map_err(|e| corrupt(e.to_string()))?;
                (parsed, end)
            } else {
                let end = value_src.find(' ').unwrap_or(value_src.len());
                (value_src[..end].to_string(), end)
            };
            pairs.push((key.to_string(), value));
            rest = value_src[consumed..].trim_start();
        } else {
            kind = Some(key.to_string());
            rest = rest[token_end..].trim_start();
        }
    }

    let kind = kind.ok_or_else(|| corrupt("missing event kind"))?;
    Ok((ts.to_string(), kind, pairs))
}

/// Byte length of the JSON string literal at the start of `s`, quotes included.
fn json_string_end(s: &str) -> Option<usize> {
    let mut escaped = false;
    for (i, c) in s.char_indices().skip(1) {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => return Some(i + 1),
            _ => {}
        }
    }
    None
}

fn parse_line(line: &str) -> Result<AuditEntry, KeepsakeError> {
    let (body, hash) = line
        .trim_end_matches(['\n', '\r'])
        .rsplit_once(" hash=")
        .ok_or_else(|| corrupt("missing hash"))?;
    let (ts, kind, pairs) = tokenize(body)?;
    let get = |key: &str| {
        pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    };
    let optional = |key: &str| get(key).filter(|v| *v != "-").map(str::to_string);

    let seq = get("seq")
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| corrupt("bad seq"))?;
    let timestamp = parse_timestamp(&ts).map_err(|e| corrupt(e.to_string()))?;
    let kind: AuditEventKind = kind.parse().map_err(|_| corrupt(format!("unknown kind {kind}")))?;
    let version = match optional("version") {
        Some(v) => Some(v.parse().map_err(|_| corrupt("bad version"))?),
        None => None,
    };

    Ok(AuditEntry {
        seq,
        timestamp,
        event: AuditEvent {
            kind,
            owner: get("owner").unwrap_or_default().to_string(),
            memory_id: optional("memory"),
            operation: optional("op"),
            version,
            detail: get("detail").unwrap_or_default().to_string(),
        },
        prev_hash: get("prev").ok_or_else(|| corrupt("missing prev"))?.to_string(),
        hash: hash.to_string(),
    })
}

/// Log text up to and including its last newline.
fn complete_prefix(content: &str) -> &str {
    match content.rfind('\n') {
        Some(idx) => &content[..=idx],
        None => "",
    }
}

/// Cut a partially written final line so the next append starts on a fresh line.
async fn drop_torn_tail(path: &Path, len: usize) -> Result<(), KeepsakeError> {
    let file = tokio::fs::OpenOptions::new().write(true).open(path).await?;
    file.set_len(len as u64).await?;
    file.sync_data().await?;
    Ok(())
}

/// Find where to continue the chain from complete log lines.
fn resume_point(complete: &str) -> Result<(u64, String), KeepsakeError> {
    match complete.lines().rev().find(|l| !l.trim().is_empty()) {
        Some(last) => {
            let entry = parse_line(last)?;
            Ok((entry.seq + 1, entry.hash))
        }
        None => Ok((1, GENESIS_HASH.to_string())),
    }
}

fn verify_text(content: &str) -> ChainReport {
    let mut expected_prev = GENESIS_HASH.to_string();
    let mut expected_seq = 1u64;
    let mut verified = 0;

    let broken = |line_no: usize, verified: usize, reason: String| ChainReport {
        verified,
        broken_at: Some(line_no),
        reason: Some(reason),
    };

    for (idx, raw) in content.split_inclusive('\n').enumerate() {
        let line_no = idx + 1;
        if raw.trim().is_empty() {
            continue;
        }
        if !raw.ends_with('\n') {
            return broken(line_no, verified, "torn final line".into());
        }
        let Some((body, hash)) = raw.trim_end_matches(['\n', '\r']).rsplit_once(" hash=") else {
            return broken(line_no, verified, "missing hash".into());
        };
        if digest(body) != hash {
            return broken(line_no, verified, "hash does not match content".into());
        }
        let entry = match parse_line(raw) {
            Ok(entry) => entry,
            Err(e) => return broken(line_no, verified, e.to_string()),
        };
        if entry.prev_hash != expected_prev {
            return broken(line_no, verified, "previous-hash link broken".into());
        }
        if entry.seq != expected_seq {
            return broken(
                line_no,
                verified,
                format!("sequence {} where {expected_seq} expected", entry.seq),
            );
        }
        expected_prev = entry.hash;
        expected_seq += 1;
        verified += 1;
    }

    ChainReport {
        verified,
        broken_at: None,
        reason: None,
    }
}
