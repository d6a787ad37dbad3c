// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Apply a [`ChangeSet`] inside one transaction.

use keepsake_core::{Change, ChangeSet, CommitReceipt, EditContext};
use rusqlite::Connection;

use super::{memories, relationships, versions};

/// Apply every change in order. The caller owns the transaction; returning
/// an error without committing rolls all of it back.
pub fn apply(conn: &Connection, changes: ChangeSet) -> rusqlite::Result<CommitReceipt> {
    let mut receipt = CommitReceipt::default();

    for change in changes.into_changes() {
        match change {
            Change::PutMemory { memory, stamp } => {
                let memory = memory.normalized();
                if let Some(ctx) = stamp {
                    snapshot_baseline(conn, &memory.id, &mut receipt)?;
                    memories::upsert(conn, &memory)?;
                    receipt.versions.push(versions::append(conn, &memory, &ctx)?);
                } else {
                    memories::upsert(conn, &memory)?;
                }
            }
            Change::DeleteMemory { memory_id, stamp } => {
                if !memories::exists(conn, &memory_id)? {
                    continue;
                }
                if stamp.is_some() {
                    snapshot_baseline(conn, &memory_id, &mut receipt)?;
                }
                receipt.relationships_removed += relationships::delete_touching(conn, &memory_id)?;
                memories::delete(conn, &memory_id)?;
                versions::clear_current(conn, &memory_id)?;
                receipt.deleted.push(memory_id);
            }
            Change::PutRelationship(rel) => relationships::upsert(conn, &rel)?,
            Change::DeleteRelationship { from, to } => {
                if relationships::delete(conn, &from, &to)? {
                    receipt.relationships_removed += 1;
                }
            }
            Change::PurgeMemory { memory_id } => {
                receipt.relationships_removed += relationships::delete_touching(conn, &memory_id)?;
                if memories::delete(conn, &memory_id)? {
                    receipt.deleted.push(memory_id.clone());
                }
                versions::purge(conn, &memory_id)?;
            }
        }
    }

    Ok(receipt)
}

/// Record the live state of a memory that predates versioning as v1.
fn snapshot_baseline(
    conn: &Connection,
    memory_id: &str,
    receipt: &mut CommitReceipt,
) -> rusqlite::Result<()> {
    if versions::count(conn, memory_id)? > 0 {
        return Ok(());
    }
    if let Some(existing) = memories::get(conn, memory_id)? {
        receipt
            .versions
            .push(versions::append(conn, &existing, &EditContext::baseline())?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use keepsake_core::{
        EditSource, Memory, MemoryRelationship, MemoryType, RelationshipType, VersionedMemory,
    };

    fn agent(reason: &str) -> Option<EditContext> {
        Some(EditContext::new(reason, EditSource::Agent, 0.9))
    }

    #[tokio::test]
    async fn legacy_memory_gets_baseline_before_first_edit() {
        let db = Database::open_in_memory().await.unwrap();
        let (receipt, history) = db
            .connection()
            .call(|conn| -> rusqlite::Result<(CommitReceipt, Vec<VersionedMemory>)> {
                let legacy = Memory::new("User likes rain", MemoryType::Preference, 0.5);
                memories::upsert(conn, &legacy)?;

                let mut edited = legacy.clone();
                edited.content = "User likes thunderstorms".into();
                let tx = conn.transaction()?;
                let receipt = apply(&tx, ChangeSet::new().put_memory(edited, agent("refine")))?;
                tx.commit()?;
                Ok((receipt, versions::for_memory(conn, &legacy.id)?))
            })
            .await
            .unwrap();

        assert_eq!(receipt.versions.len(), 2);
        assert_eq!(history[0].content, "User likes rain");
        assert_eq!(history[0].edit_source, EditSource::Migration);
        assert!(history[0].is_original && !history[0].is_current);
        assert_eq!(history[1].content, "User likes thunderstorms");
        assert!(history[1].is_current);
    }

    #[tokio::test]
    async fn delete_cascades_and_keeps_history() {
        let db = Database::open_in_memory().await.unwrap();
        let (receipt, live, rels, history) = db
            .connection()
            .call(|conn| -> rusqlite::Result<_> {
                let a = Memory::new("User has a dog", MemoryType::Fact, 0.5);
                let b = Memory::new("User's dog is a beagle", MemoryType::Fact, 0.5);
                let tx = conn.transaction()?;
                apply(
                    &tx,
                    ChangeSet::new()
                        .put_memory(a.clone(), agent("new"))
                        .put_memory(b.clone(), agent("new"))
                        .put_relationship(MemoryRelationship::new(
                            &b.id,
                            &a.id,
                            RelationshipType::BuildsOn,
                            0.8,
                        )),
                )?;
                let receipt = apply(&tx, ChangeSet::new().delete_memory(&a.id, agent("gone")))?;
                tx.commit()?;
                Ok((
                    receipt,
                    memories::get(conn, &a.id)?,
                    relationships::touching(conn, &b.id)?,
                    versions::for_memory(conn, &a.id)?,
                ))
            })
            .await
            .unwrap();

        assert_eq!(receipt.deleted.len(), 1);
        assert_eq!(receipt.relationships_removed, 1);
        assert!(live.is_none());
        assert!(rels.is_empty());
        assert_eq!(history.len(), 1);
        assert!(!history[0].is_current);
    }

    #[tokio::test]
    async fn failed_change_set_rolls_back() {
        let db = Database::open_in_memory().await.unwrap();
        let (result_failed, count) = db
            .connection()
            .call(|conn| -> rusqlite::Result<_> {
                let a = Memory::new("User plays piano", MemoryType::Fact, 0.5);
                let tx = conn.transaction()?;
                // Edge to a memory that does not exist violates the foreign key.
                let result = apply(
                    &tx,
                    ChangeSet::new()
                        .put_memory(a.clone(), agent("new"))
                        .put_relationship(MemoryRelationship::new(
                            &a.id,
                            "ghost",
                            RelationshipType::RelatedTo,
                            0.5,
                        )),
                );
                let failed = result.is_err();
                drop(tx);
                Ok((failed, memories::count(conn)?))
            })
            .await
            .unwrap();

        assert!(result_failed);
        assert_eq!(count, 0);
    }
}
