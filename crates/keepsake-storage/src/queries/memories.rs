// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory row CRUD, filters and aggregates.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use keepsake_core::types::format_timestamp;
use keepsake_core::vector::{blob_to_vec, vec_to_blob};
use keepsake_core::{Memory, MemoryType};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{metadata_column, metadata_text, parse_column, timestamp_column};

const COLUMNS: &str = "id, content, memory_type, importance, embedding, created_at, \
     last_accessed, access_count, emotional_weight, metadata";

/// Store iteration order: creation time, then insertion order.
const ORDER: &str = "ORDER BY created_at ASC, rowid ASC";

fn row_to_memory(row: &Row<'_>) -> rusqlite::Result<Memory> {
    let memory_type: String = row.get(2)?;
    let embedding: Option<Vec<u8>> = row.get(4)?;
    let created_at: String = row.get(5)?;
    let last_accessed: String = row.get(6)?;
    let access_count: i64 = row.get(7)?;
    let metadata: String = row.get(9)?;
    Ok(Memory {
        id: row.get(0)?,
        content: row.get(1)?,
        memory_type: parse_column(2, &memory_type)?,
        importance: row.get::<_, f64>(3)? as f32,
        embedding: embedding.map(|blob| blob_to_vec(&blob)),
        timestamp: timestamp_column(5, &created_at)?,
        last_accessed: timestamp_column(6, &last_accessed)?,
        access_count: access_count.max(0) as u64,
        emotional_weight: row.get::<_, f64>(8)? as f32,
        metadata: metadata_column(9, &metadata)?,
    })
}

fn query_memories(
    conn: &Connection,
    filter: &str,
    params: impl rusqlite::Params,
) -> rusqlite::Result<Vec<Memory>> {
    let sql = format!("SELECT {COLUMNS} FROM memories {filter} {ORDER}");
    let mut stmt = conn.prepare(&sql)?;
    stmt.query_map(params, row_to_memory)?
        .collect::<Result<Vec<_>, _>>()
}

/// Insert a memory or overwrite every field of an existing row.
///
/// Uses an upsert rather than `INSERT OR REPLACE` so the row is never
/// deleted and relationship foreign keys are left alone.
pub fn upsert(conn: &Connection, memory: &Memory) -> rusqlite::Result<()> {
    let memory = memory.clone().normalized();
    conn.execute(
        &format!(
            "INSERT INTO memories ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(id) DO UPDATE SET
                content = excluded.content,
                memory_type = excluded.memory_type,
                importance = excluded.importance,
                embedding = excluded.embedding,
                created_at = excluded.created_at,
                last_accessed = excluded.last_accessed,
                access_count = excluded.access_count,
                emotional_weight = excluded.emotional_weight,
                metadata = excluded.metadata"
        ),
        params![
            memory.id,
            memory.content,
            memory.memory_type.to_string(),
            memory.importance as f64,
            memory.embedding.as_deref().map(vec_to_blob),
            format_timestamp(&memory.timestamp),
            format_timestamp(&memory.last_accessed),
            memory.access_count.min(i64::MAX as u64) as i64,
            memory.emotional_weight as f64,
            metadata_text(&memory.metadata)?,
        ],
    )?;
    Ok(())
}

/// Overwrite an existing row. Returns false when no row matched.
pub fn update(conn: &Connection, memory: &Memory) -> rusqlite::Result<bool> {
    let memory = memory.clone().normalized();
    let changed = conn.execute(
        "UPDATE memories SET content = ?2, memory_type = ?3, importance = ?4, embedding = ?5,
             created_at = ?6, last_accessed = ?7, access_count = ?8, emotional_weight = ?9,
             metadata = ?10
         WHERE id = ?1",
        params![
            memory.id,
            memory.content,
            memory.memory_type.to_string(),
            memory.importance as f64,
            memory.embedding.as_deref().map(vec_to_blob),
            format_timestamp(&memory.timestamp),
            format_timestamp(&memory.last_accessed),
            memory.access_count.min(i64::MAX as u64) as i64,
            memory.emotional_weight as f64,
            metadata_text(&memory.metadata)?,
        ],
    )?;
    Ok(changed > 0)
}

pub fn get(conn: &Connection, id: &str) -> rusqlite::Result<Option<Memory>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM memories WHERE id = ?1"),
        params![id],
        row_to_memory,
    )
    .optional()
}

pub fn exists(conn: &Connection, id: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM memories WHERE id = ?1)",
        params![id],
        |row| row.get(0),
    )
}

/// Delete one row. Relationships must already be gone (or cascade).
pub fn delete(conn: &Connection, id: &str) -> rusqlite::Result<bool> {
    Ok(conn.execute("DELETE FROM memories WHERE id = ?1", params![id])? > 0)
}

pub fn record_access(conn: &Connection, ids: &[String], at: &DateTime<Utc>) -> rusqlite::Result<usize> {
    let ts = format_timestamp(at);
    let mut stmt = conn.prepare(
        "UPDATE memories SET access_count = access_count + 1, last_accessed = ?2 WHERE id = ?1",
    )?;
    let mut touched = 0;
    for id in ids {
        touched += stmt.execute(params![id, ts])?;
    }
    Ok(touched)
}

pub fn all(conn: &Connection) -> rusqlite::Result<Vec<Memory>> {
    query_memories(conn, "", [])
}

pub fn by_type(conn: &Connection, memory_type: MemoryType) -> rusqlite::Result<Vec<Memory>> {
    query_memories(
        conn,
        "WHERE memory_type = ?1",
        params![memory_type.to_string()],
    )
}

pub fn created_between(
    conn: &Connection,
    from: &DateTime<Utc>,
    to: &DateTime<Utc>,
) -> rusqlite::Result<Vec<Memory>> {
    query_memories(
        conn,
        "WHERE created_at >= ?1 AND created_at <= ?2",
        params![format_timestamp(from), format_timestamp(to)],
    )
}

pub fn with_min_importance(conn: &Connection, threshold: f32) -> rusqlite::Result<Vec<Memory>> {
    query_memories(conn, "WHERE importance >= ?1", params![threshold as f64])
}

/// Memories that carry an embedding, in store iteration order.
pub fn with_embeddings(conn: &Connection) -> rusqlite::Result<Vec<Memory>> {
    query_memories(conn, "WHERE embedding IS NOT NULL", [])
}

/// Case-insensitive substring match on content.
///
/// Matching happens in Rust so non-ASCII case folding and LIKE
/// metacharacters in the needle behave as plain text.
pub fn search_content(conn: &Connection, needle: &str, limit: usize) -> rusqlite::Result<Vec<Memory>> {
    let needle = needle.to_lowercase();
    Ok(all(conn)?
        .into_iter()
        .filter(|m| m.content.to_lowercase().contains(&needle))
        .take(limit)
        .collect())
}

pub fn count(conn: &Connection) -> rusqlite::Result<u64> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))?;
    Ok(n.max(0) as u64)
}

pub fn count_by_type(conn: &Connection) -> rusqlite::Result<BTreeMap<MemoryType, u64>> {
    let mut stmt = conn.prepare("SELECT memory_type, COUNT(*) FROM memories GROUP BY memory_type")?;
    let rows = stmt.query_map([], |row| {
        let raw: String = row.get(0)?;
        let n: i64 = row.get(1)?;
        Ok((parse_column::<MemoryType>(0, &raw)?, n.max(0) as u64))
    })?;
    rows.collect()
}

pub fn total_content_size(conn: &Connection) -> rusqlite::Result<u64> {
    let n: i64 = conn.query_row(
        "SELECT COALESCE(SUM(LENGTH(CAST(content AS BLOB))), 0) FROM memories",
        [],
        |row| row.get(0),
    )?;
    Ok(n.max(0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use chrono::Duration;

    async fn with_conn<T, F>(f: F) -> T
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let db = Database::open_in_memory().await.unwrap();
        db.connection().call(f).await.unwrap()
    }

    #[tokio::test]
    async fn upsert_clamps_and_round_trips() {
        let (stored, by_update) = with_conn(|conn| {
            let mut m = Memory::new("User drinks oolong", MemoryType::Preference, 0.5)
                .with_embedding(vec![0.1, 0.2, 0.3]);
            m.importance = 4.0;
            m.emotional_weight = -1.0;
            m.metadata.insert("source".into(), "chat".into());
            upsert(conn, &m)?;
            let stored = get(conn, &m.id)?.unwrap();

            let mut edited = stored.clone();
            edited.content = "User drinks sencha".into();
            let by_update = update(conn, &edited)?;
            Ok((get(conn, &m.id)?.map(|s| (stored, s)), by_update))
        })
        .await;

        let (stored, edited) = stored.unwrap();
        assert_eq!(stored.importance, 1.0);
        assert_eq!(stored.emotional_weight, 0.0);
        assert_eq!(stored.embedding.as_deref(), Some(&[0.1f32, 0.2, 0.3][..]));
        assert_eq!(stored.metadata["source"], "chat");
        assert!(by_update);
        assert_eq!(edited.content, "User drinks sencha");
    }

    #[tokio::test]
    async fn update_missing_row_reports_false() {
        let updated = with_conn(|conn| {
            update(conn, &Memory::new("User is left-handed", MemoryType::Fact, 0.5))
        })
        .await;
        assert!(!updated);
    }

    #[tokio::test]
    async fn filters_and_aggregates() {
        let (prefs, important, range, found, counts, size) = with_conn(|conn| {
            let base = keepsake_core::types::now() - Duration::days(10);
            let a = Memory::new("User likes Jazz", MemoryType::Preference, 0.9).created_at(base);
            let b = Memory::new("User met Ana", MemoryType::Event, 0.2)
                .created_at(base + Duration::days(5));
            let c = Memory::new("User prefers jazz clubs", MemoryType::Preference, 0.4)
                .created_at(base + Duration::days(9));
            for m in [&a, &b, &c] {
                upsert(conn, m)?;
            }
            Ok((
                by_type(conn, MemoryType::Preference)?,
                with_min_importance(conn, 0.4)?,
                created_between(conn, &(base + Duration::days(1)), &(base + Duration::days(6)))?,
                search_content(conn, "JAZZ", 10)?,
                count_by_type(conn)?,
                total_content_size(conn)?,
            ))
        })
        .await;

        assert_eq!(prefs.len(), 2);
        assert_eq!(prefs[0].content, "User likes Jazz");
        assert_eq!(important.len(), 2);
        assert_eq!(range.len(), 1);
        assert_eq!(range[0].content, "User met Ana");
        assert_eq!(found.len(), 2);
        assert_eq!(counts.get(&MemoryType::Preference), Some(&2));
        assert_eq!(counts.get(&MemoryType::Event), Some(&1));
        assert_eq!(size, (15 + 12 + 23) as u64);
    }

    #[tokio::test]
    async fn record_access_bumps_count() {
        let m = with_conn(|conn| {
            let m = Memory::new("User owns a bike", MemoryType::Fact, 0.5);
            upsert(conn, &m)?;
            let later = m.timestamp + Duration::hours(1);
            record_access(conn, &[m.id.clone(), "missing".into()], &later)?;
            record_access(conn, &[m.id.clone()], &later)?;
            get(conn, &m.id)
        })
        .await
        .unwrap();
        assert_eq!(m.access_count, 2);
        assert!(m.last_accessed > m.timestamp);
    }
}
