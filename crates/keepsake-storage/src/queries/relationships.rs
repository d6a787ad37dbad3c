// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Relationship edge CRUD.

use keepsake_core::types::format_timestamp;
use keepsake_core::MemoryRelationship;
use rusqlite::{Connection, Row, params};

use super::{parse_column, timestamp_column};

const COLUMNS: &str = "from_memory_id, to_memory_id, relationship_type, strength, created_at";

fn row_to_relationship(row: &Row<'_>) -> rusqlite::Result<MemoryRelationship> {
    let relationship_type: String = row.get(2)?;
    let created_at: String = row.get(4)?;
    Ok(MemoryRelationship {
        from_memory_id: row.get(0)?,
        to_memory_id: row.get(1)?,
        relationship_type: parse_column(2, &relationship_type)?,
        strength: row.get::<_, f64>(3)? as f32,
        created_at: timestamp_column(4, &created_at)?,
    })
}

fn query(conn: &Connection, filter: &str, id: &str) -> rusqlite::Result<Vec<MemoryRelationship>> {
    let sql = format!("SELECT {COLUMNS} FROM relationships {filter} ORDER BY created_at, rowid");
    let mut stmt = conn.prepare(&sql)?;
    stmt.query_map(params![id], row_to_relationship)?
        .collect::<Result<Vec<_>, _>>()
}

/// Insert an edge, or replace type and strength of the existing `(from, to)` edge.
pub fn upsert(conn: &Connection, rel: &MemoryRelationship) -> rusqlite::Result<()> {
    let mut rel = rel.clone();
    rel.normalize();
    conn.execute(
        &format!(
            "INSERT INTO relationships ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(from_memory_id, to_memory_id) DO UPDATE SET
                relationship_type = excluded.relationship_type,
                strength = excluded.strength"
        ),
        params![
            rel.from_memory_id,
            rel.to_memory_id,
            rel.relationship_type.to_string(),
            rel.strength as f64,
            format_timestamp(&rel.created_at),
        ],
    )?;
    Ok(())
}

pub fn touching(conn: &Connection, id: &str) -> rusqlite::Result<Vec<MemoryRelationship>> {
    query(conn, "WHERE from_memory_id = ?1 OR to_memory_id = ?1", id)
}

pub fn from(conn: &Connection, id: &str) -> rusqlite::Result<Vec<MemoryRelationship>> {
    query(conn, "WHERE from_memory_id = ?1", id)
}

pub fn to(conn: &Connection, id: &str) -> rusqlite::Result<Vec<MemoryRelationship>> {
    query(conn, "WHERE to_memory_id = ?1", id)
}

pub fn delete(conn: &Connection, from: &str, to: &str) -> rusqlite::Result<bool> {
    Ok(conn.execute(
        "DELETE FROM relationships WHERE from_memory_id = ?1 AND to_memory_id = ?2",
        params![from, to],
    )? > 0)
}

/// Remove every edge touching `id`. Returns the number removed.
pub fn delete_touching(conn: &Connection, id: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "DELETE FROM relationships WHERE from_memory_id = ?1 OR to_memory_id = ?1",
        params![id],
    )
}
