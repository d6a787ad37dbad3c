// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All SQL for one owner runs on tokio-rusqlite's single background thread.
//! Do NOT create additional Connection instances for writes.

use std::path::{Path, PathBuf};

use keepsake_core::KeepsakeError;
use tokio_rusqlite::Connection;
use tracing::{debug, info};

use crate::migrations;

const PRAGMAS: &str = "PRAGMA foreign_keys = ON;
PRAGMA busy_timeout = 5000;
PRAGMA synchronous = NORMAL;";

/// Convert a tokio-rusqlite error into `KeepsakeError::Storage`.
pub fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> KeepsakeError {
    KeepsakeError::Storage {
        source: Box::new(e),
    }
}

fn open_err<E: std::error::Error + Send + Sync + 'static>(e: E) -> KeepsakeError {
    KeepsakeError::Storage {
        source: Box::new(e),
    }
}

/// A migrated SQLite database behind one background connection.
pub struct Database {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Database {
    /// Open (creating if needed) the database file at `path` and migrate it.
    pub async fn open(path: &Path, wal_mode: bool) -> Result<Self, KeepsakeError> {
        let conn = Connection::open(path).await.map_err(open_err)?;
        let db = Self {
            conn,
            path: Some(path.to_path_buf()),
        };
        db.prepare(wal_mode).await?;
        info!(path = %path.display(), wal_mode, "database opened");
        Ok(db)
    }

    /// Open a private in-memory database. Used by tests and ephemeral owners.
    pub async fn open_in_memory() -> Result<Self, KeepsakeError> {
        let conn = Connection::open_in_memory().await.map_err(open_err)?;
        let db = Self { conn, path: None };
        db.prepare(false).await?;
        debug!("in-memory database opened");
        Ok(db)
    }

    async fn prepare(&self, wal_mode: bool) -> Result<(), KeepsakeError> {
        self.conn
            .call(
                move |conn| -> Result<Result<(), KeepsakeError>, rusqlite::Error> {
                    if wal_mode {
                        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
                    }
                    conn.execute_batch(PRAGMAS)?;
                    Ok(migrations::run_migrations(conn))
                },
            )
            .await
            .map_err(map_tr_err)?
    }

    /// The underlying connection. All query modules go through `call()`.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// File path, or `None` for an in-memory database.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Flush the WAL into the main database file.
    pub async fn checkpoint(&self) -> Result<(), KeepsakeError> {
        if self.path.is_none() {
            return Ok(());
        }
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Checkpoint and close the connection.
    pub async fn close(self) -> Result<(), KeepsakeError> {
        self.checkpoint().await?;
        self.conn.close().await.map_err(open_err)
    }
}
