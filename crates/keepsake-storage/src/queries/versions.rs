// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Version snapshot rows: append, lookup, pruning.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use keepsake_core::types::format_timestamp;
use keepsake_core::vector::{blob_to_vec, vec_to_blob};
use keepsake_core::{EditContext, Memory, PrunePolicy, PruneReport, VersionedMemory};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{metadata_column, metadata_text, parse_column, timestamp_column};

const COLUMNS: &str = "version_id, memory_id, version_number, content, memory_type, importance, \
     embedding, emotional_weight, metadata, edit_reason, edit_source, edit_confidence, \
     agent_reasoning, is_original, is_current, is_backup, created_at";

fn row_to_version(row: &Row<'_>) -> rusqlite::Result<VersionedMemory> {
    let memory_type: String = row.get(4)?;
    let embedding: Option<Vec<u8>> = row.get(6)?;
    let metadata: String = row.get(8)?;
    let edit_source: String = row.get(10)?;
    let created_at: String = row.get(16)?;
    let version_number: i64 = row.get(2)?;
    Ok(VersionedMemory {
        version_id: row.get(0)?,
        memory_id: row.get(1)?,
        version_number: u32::try_from(version_number).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Integer, Box::new(e))
        })?,
        content: row.get(3)?,
        memory_type: parse_column(4, &memory_type)?,
        importance: row.get::<_, f64>(5)? as f32,
        embedding: embedding.map(|blob| blob_to_vec(&blob)),
        emotional_weight: row.get::<_, f64>(7)? as f32,
        metadata: metadata_column(8, &metadata)?,
        edit_reason: row.get(9)?,
        edit_source: parse_column(10, &edit_source)?,
        edit_confidence: row.get::<_, f64>(11)? as f32,
        agent_reasoning: row.get(12)?,
        is_original: row.get(13)?,
        is_current: row.get(14)?,
        is_backup: row.get(15)?,
        created_at: timestamp_column(16, &created_at)?,
    })
}

fn query(
    conn: &Connection,
    filter: &str,
    params: impl rusqlite::Params,
) -> rusqlite::Result<Vec<VersionedMemory>> {
    let sql = format!("SELECT {COLUMNS} FROM memory_versions {filter}");
    let mut stmt = conn.prepare(&sql)?;
    stmt.query_map(params, row_to_version)?
        .collect::<Result<Vec<_>, _>>()
}

fn insert(conn: &Connection, v: &VersionedMemory) -> rusqlite::Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO memory_versions ({COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"
        ),
        params![
            v.version_id,
            v.memory_id,
            v.version_number as i64,
            v.content,
            v.memory_type.to_string(),
            v.importance as f64,
            v.embedding.as_deref().map(vec_to_blob),
            v.emotional_weight as f64,
            metadata_text(&v.metadata)?,
            v.edit_reason,
            v.edit_source.to_string(),
            v.edit_confidence as f64,
            v.agent_reasoning,
            v.is_original,
            v.is_current,
            v.is_backup,
            format_timestamp(&v.created_at),
        ],
    )?;
    Ok(())
}

/// Highest version number for a memory, 0 when it has no history.
pub fn max_version(conn: &Connection, memory_id: &str) -> rusqlite::Result<u32> {
    let n: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version_number), 0) FROM memory_versions WHERE memory_id = ?1",
        params![memory_id],
        |row| row.get(0),
    )?;
    Ok(u32::try_from(n).unwrap_or(u32::MAX))
}

pub fn count(conn: &Connection, memory_id: &str) -> rusqlite::Result<u32> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM memory_versions WHERE memory_id = ?1",
        params![memory_id],
        |row| row.get(0),
    )?;
    Ok(u32::try_from(n).unwrap_or(u32::MAX))
}

/// Drop the current flag from every version of a memory.
pub fn clear_current(conn: &Connection, memory_id: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE memory_versions SET is_current = 0 WHERE memory_id = ?1 AND is_current = 1",
        params![memory_id],
    )
}

/// Snapshot `memory` as the next version and make it current.
///
/// Must run inside the caller's transaction so the flag swap is atomic.
pub fn append(
    conn: &Connection,
    memory: &Memory,
    ctx: &EditContext,
) -> rusqlite::Result<VersionedMemory> {
    let next = max_version(conn, &memory.id)?.saturating_add(1);
    clear_current(conn, &memory.id)?;
    let version = VersionedMemory::snapshot(memory, next, ctx);
    insert(conn, &version)?;
    Ok(version)
}

pub fn for_memory(conn: &Connection, memory_id: &str) -> rusqlite::Result<Vec<VersionedMemory>> {
    query(
        conn,
        "WHERE memory_id = ?1 ORDER BY version_number ASC",
        params![memory_id],
    )
}

pub fn get(
    conn: &Connection,
    memory_id: &str,
    version_number: u32,
) -> rusqlite::Result<Option<VersionedMemory>> {
    conn.query_row(
        &format!(
            "SELECT {COLUMNS} FROM memory_versions WHERE memory_id = ?1 AND version_number = ?2"
        ),
        params![memory_id, version_number as i64],
        row_to_version,
    )
    .optional()
}

pub fn current(conn: &Connection, memory_id: &str) -> rusqlite::Result<Option<VersionedMemory>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM memory_versions WHERE memory_id = ?1 AND is_current = 1"),
        params![memory_id],
        row_to_version,
    )
    .optional()
}

pub fn between(
    conn: &Connection,
    from: &DateTime<Utc>,
    to: &DateTime<Utc>,
) -> rusqlite::Result<Vec<VersionedMemory>> {
    query(
        conn,
        "WHERE created_at >= ?1 AND created_at <= ?2 ORDER BY created_at ASC, rowid ASC",
        params![format_timestamp(from), format_timestamp(to)],
    )
}

/// Set or clear the backup pin. Returns false when the version does not exist.
pub fn set_backup(
    conn: &Connection,
    memory_id: &str,
    version_number: u32,
    pinned: bool,
) -> rusqlite::Result<bool> {
    Ok(conn.execute(
        "UPDATE memory_versions SET is_backup = ?3 WHERE memory_id = ?1 AND version_number = ?2",
        params![memory_id, version_number as i64, pinned],
    )? > 0)
}

pub fn purge(conn: &Connection, memory_id: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "DELETE FROM memory_versions WHERE memory_id = ?1",
        params![memory_id],
    )
}

/// Remove prunable versions. Originals, current versions and backups stay,
/// as does the highest-numbered version of each memory so numbering never
/// restarts below it after a delete.
pub fn prune(conn: &Connection, policy: &PrunePolicy) -> rusqlite::Result<PruneReport> {
    const PRUNABLE: &str = "is_original = 0 AND is_current = 0 AND is_backup = 0
        AND version_number < (SELECT MAX(latest.version_number) FROM memory_versions latest
                              WHERE latest.memory_id = memory_versions.memory_id)";

    let mut doomed: Vec<(String, String)> = Vec::new();

    if let Some(cutoff) = policy.older_than {
        let mut stmt = conn.prepare(&format!(
            "SELECT version_id, memory_id FROM memory_versions
             WHERE created_at < ?1 AND {PRUNABLE}"
        ))?;
        let rows = stmt.query_map(params![format_timestamp(&cutoff)], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })?;
        for row in rows {
            doomed.push(row?);
        }
    }

    if let Some(max) = policy.max_per_memory {
        let mut over = conn.prepare(
            "SELECT memory_id FROM memory_versions GROUP BY memory_id HAVING COUNT(*) > ?1",
        )?;
        let memory_ids = over
            .query_map(params![max as i64], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut versions = conn.prepare(&format!(
            "SELECT version_id, {PRUNABLE} FROM memory_versions
             WHERE memory_id = ?1 ORDER BY version_number DESC"
        ))?;
        for memory_id in memory_ids {
            let rows = versions
                .query_map(params![memory_id], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, bool>(1)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            // Newest `max` versions are kept; protected ones beyond that stay too.
            for (version_id, prunable) in rows.into_iter().skip(max as usize) {
                if prunable {
                    doomed.push((version_id, memory_id.clone()));
                }
            }
        }
    }

    let mut removed = BTreeSet::new();
    let mut touched = BTreeSet::new();
    let mut delete = conn.prepare("DELETE FROM memory_versions WHERE version_id = ?1")?;
    for (version_id, memory_id) in doomed {
        if removed.contains(&version_id) {
            continue;
        }
        if delete.execute(params![version_id])? > 0 {
            touched.insert(memory_id);
            removed.insert(version_id);
        }
    }

    Ok(PruneReport {
        versions_removed: removed.len(),
        memories_touched: touched.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use keepsake_core::{EditSource, MemoryType};

    fn edit(n: u32) -> EditContext {
        EditContext::new(format!("edit {n}"), EditSource::Agent, 0.9)
    }

    #[tokio::test]
    async fn append_moves_current_flag() {
        let db = Database::open_in_memory().await.unwrap();
        let (all, current) = db
            .connection()
            .call(|conn| -> rusqlite::Result<_> {
                let tx = conn.transaction()?;
                let mut m = Memory::new("User lives in Oslo", MemoryType::Fact, 0.5);
                append(&tx, &m, &EditContext::baseline())?;
                m.content = "User lives in Bergen".into();
                append(&tx, &m, &edit(2))?;
                m.content = "User lives in Tromso".into();
                append(&tx, &m, &edit(3))?;
                let all = for_memory(&tx, &m.id)?;
                let current = current(&tx, &m.id)?;
                tx.commit()?;
                Ok((all, current))
            })
            .await
            .unwrap();

        assert_eq!(all.len(), 3);
        assert_eq!(
            all.iter().map(|v| v.version_number).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(all.iter().filter(|v| v.is_current).count(), 1);
        assert!(all[0].is_original);
        let current = current.unwrap();
        assert_eq!(current.version_number, 3);
        assert_eq!(current.content, "User lives in Tromso");
    }

    #[tokio::test]
    async fn prune_keeps_protected_versions() {
        let db = Database::open_in_memory().await.unwrap();
        let (report, left) = db
            .connection()
            .call(|conn| -> rusqlite::Result<_> {
                let mut m = Memory::new("User is learning Go", MemoryType::Fact, 0.5);
                append(conn, &m, &EditContext::baseline())?;
                for n in 2..=6 {
                    m.content = format!("User is learning Go, week {n}");
                    append(conn, &m, &edit(n))?;
                }
                set_backup(conn, &m.id, 2, true)?;
                let report = prune(
                    conn,
                    &PrunePolicy {
                        older_than: None,
                        max_per_memory: Some(2),
                    },
                )?;
                Ok((report, for_memory(conn, &m.id)?))
            })
            .await
            .unwrap();

        // v1 original, v2 backup, v5/v6 newest two (v6 current).
        let numbers: Vec<u32> = left.iter().map(|v| v.version_number).collect();
        assert_eq!(numbers, vec![1, 2, 5, 6]);
        assert_eq!(report.versions_removed, 2);
        assert_eq!(report.memories_touched, 1);
    }

    #[tokio::test]
    async fn prune_by_age() {
        let db = Database::open_in_memory().await.unwrap();
        let report = db
            .connection()
            .call(|conn| -> rusqlite::Result<_> {
                let mut m = Memory::new("User reads sci-fi", MemoryType::Preference, 0.5);
                append(conn, &m, &EditContext::baseline())?;
                m.content = "User reads fantasy".into();
                append(conn, &m, &edit(2))?;
                m.content = "User reads history".into();
                append(conn, &m, &edit(3))?;
                prune(
                    conn,
                    &PrunePolicy {
                        older_than: Some(keepsake_core::types::now() + chrono::Duration::days(1)),
                        max_per_memory: None,
                    },
                )
            })
            .await
            .unwrap();
        // Only v2 is neither original nor current.
        assert_eq!(report.versions_removed, 1);
    }

    #[tokio::test]
    async fn deleted_memory_keeps_its_highest_version_number() {
        let db = Database::open_in_memory().await.unwrap();
        let (report, kept, restored) = db
            .connection()
            .call(|conn| -> rusqlite::Result<_> {
                let mut m = Memory::new("User owns a kayak", MemoryType::Fact, 0.5);
                append(conn, &m, &EditContext::baseline())?;
                for n in 2..=3 {
                    m.content = format!("User owns {n} kayaks");
                    append(conn, &m, &edit(n))?;
                }
                // A delete leaves history without a current version.
                clear_current(conn, &m.id)?;
                let report = prune(
                    conn,
                    &PrunePolicy {
                        older_than: Some(keepsake_core::types::now() + chrono::Duration::days(1)),
                        max_per_memory: Some(1),
                    },
                )?;
                let kept: Vec<u32> =
                    for_memory(conn, &m.id)?.iter().map(|v| v.version_number).collect();
                let restored = append(conn, &m, &edit(4))?;
                Ok((report, kept, restored.version_number))
            })
            .await
            .unwrap();

        assert_eq!(report.versions_removed, 1);
        assert_eq!(kept, vec![1, 3]);
        assert_eq!(restored, 4);
    }
}
