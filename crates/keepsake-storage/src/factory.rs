// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Registry of per-owner stores.
//!
//! Each owner gets an isolated SQLite file under
//! `<data_dir>/<sanitized-owner>/memories.db`. Stores open lazily and stay
//! cached until closed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use keepsake_config::model::StorageConfig;
use keepsake_core::KeepsakeError;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::adapter::SqliteMemoryStore;
use crate::database::Database;
use crate::writer::{OwnerLock, OwnerReadGuard, OwnerWriteGuard};

/// Database file name inside each owner directory.
pub const DATABASE_FILE: &str = "memories.db";

const MAX_OWNER_LEN: usize = 64;

/// Map an arbitrary owner id to a safe directory name.
///
/// Ids made only of `[A-Za-z0-9_-]` pass through unchanged. Anything else is
/// replaced with `_` and suffixed with a short hash of the original, so two
/// distinct ids never collide after sanitizing.
pub fn sanitize_owner_id(owner_id: &str) -> Result<String, KeepsakeError> {
    if owner_id.trim().is_empty() {
        return Err(KeepsakeError::InvalidOwner(owner_id.to_string()));
    }
    let clean = owner_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if clean && owner_id.len() <= MAX_OWNER_LEN {
        return Ok(owner_id.to_string());
    }

    let mut safe: String = owner_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_OWNER_LEN - 9)
        .collect();
    let digest = hex::encode(Sha256::digest(owner_id.as_bytes()));
    safe.push('-');
    safe.push_str(&digest[..8]);
    Ok(safe)
}

/// One owner's store plus its write lock.
pub struct OwnerStore {
    owner_id: String,
    dir: Option<PathBuf>,
    store: SqliteMemoryStore,
    lock: OwnerLock,
}

impl OwnerStore {
    pub fn new(owner_id: impl Into<String>, dir: Option<PathBuf>, store: SqliteMemoryStore) -> Self {
        Self {
            owner_id: owner_id.into(),
            dir,
            store,
            lock: OwnerLock::new(),
        }
    }

    /// Standalone in-memory owner, outside any factory.
    pub async fn in_memory(owner_id: impl Into<String>) -> Result<Self, KeepsakeError> {
        let owner_id = owner_id.into();
        let store = SqliteMemoryStore::in_memory(owner_id.clone()).await?;
        Ok(Self::new(owner_id, None, store))
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// Owner directory, or `None` when the store lives in memory.
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    pub fn store(&self) -> &SqliteMemoryStore {
        &self.store
    }

    /// Acquire exclusive access for a mutation sequence.
    pub async fn write(&self) -> OwnerWriteGuard<'_> {
        self.lock.write(&self.owner_id).await
    }

    /// Acquire shared access for reads.
    pub async fn read(&self) -> OwnerReadGuard<'_> {
        self.lock.read(&self.owner_id).await
    }
}

/// Lazily-populated map of owner id to store.
pub struct StoreFactory {
    data_dir: Option<PathBuf>,
    wal_mode: bool,
    stores: Mutex<HashMap<String, Arc<OwnerStore>>>,
}

impl StoreFactory {
    /// Factory persisting each owner under `config.data_dir`.
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            data_dir: Some(config.data_dir.clone()),
            wal_mode: config.wal_mode,
            stores: Mutex::new(HashMap::new()),
        }
    }

    /// Factory whose owners live in memory and vanish on close.
    pub fn in_memory() -> Self {
        Self {
            data_dir: None,
            wal_mode: false,
            stores: Mutex::new(HashMap::new()),
        }
    }

    /// Directory that holds (or would hold) an owner's files.
    pub fn owner_dir(&self, owner_id: &str) -> Result<Option<PathBuf>, KeepsakeError> {
        let safe = sanitize_owner_id(owner_id)?;
        Ok(self.data_dir.as_ref().map(|root| root.join(safe)))
    }

    /// Return the cached store for `owner_id`, opening it on first use.
    pub async fn open(&self, owner_id: &str) -> Result<Arc<OwnerStore>, KeepsakeError> {
        let mut stores = self.stores.lock().await;
        if let Some(existing) = stores.get(owner_id) {
            return Ok(Arc::clone(existing));
        }

        let dir = self.owner_dir(owner_id)?;
        let db = match &dir {
            Some(dir) => {
                tokio::fs::create_dir_all(dir).await?;
                Database::open(&dir.join(DATABASE_FILE), self.wal_mode).await?
            }
            None => Database::open_in_memory().await?,
        };
        let owner = Arc::new(OwnerStore::new(
            owner_id,
            dir,
            SqliteMemoryStore::new(owner_id, db),
        ));
        stores.insert(owner_id.to_string(), Arc::clone(&owner));
        info!(owner = %owner_id, "owner store opened");
        Ok(owner)
    }

    /// Checkpoint and drop one owner's store. Other owners are untouched.
    ///
    /// Returns false if the owner was not open.
    pub async fn close(&self, owner_id: &str) -> Result<bool, KeepsakeError> {
        let removed = self.stores.lock().await.remove(owner_id);
        match removed {
            Some(owner) => {
                // Wait for in-flight writers before flushing.
                let _guard = owner.write().await;
                owner.store().database().checkpoint().await?;
                info!(owner = %owner_id, "owner store closed");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Close the owner's store and irreversibly remove its directory,
    /// including the database and the audit log.
    pub async fn delete_owner(&self, owner_id: &str) -> Result<bool, KeepsakeError> {
        self.close(owner_id).await?;
        let Some(dir) = self.owner_dir(owner_id)? else {
            return Ok(true);
        };
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                warn!(owner = %owner_id, dir = %dir.display(), "owner data deleted");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Owners currently open, sorted.
    pub async fn owners(&self) -> Vec<String> {
        let mut owners: Vec<String> = self.stores.lock().await.keys().cloned().collect();
        owners.sort();
        owners
    }

    /// Checkpoint and drop every open store.
    pub async fn close_all(&self) -> Result<(), KeepsakeError> {
        for owner in self.owners().await {
            self.close(&owner).await?;
        }
        Ok(())
    }
}
