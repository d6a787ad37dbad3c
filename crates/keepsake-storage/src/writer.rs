// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-owner single-writer, multi-reader discipline.
//!
//! SQL for one owner is already serialized on tokio-rusqlite's background
//! thread, but an apply spans several calls (validate, detect, embed,
//! commit). The guards here hold an owner-wide `RwLock` across the whole
//! sequence so no write interleaves with another write or with a read.
//! Functions that mutate take `&OwnerWriteGuard` to prove the lock is held.

use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// The lock itself. One per owner store.
#[derive(Debug, Default)]
pub struct OwnerLock {
    inner: RwLock<()>,
}

impl OwnerLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn write<'a>(&'a self, owner_id: &'a str) -> OwnerWriteGuard<'a> {
        OwnerWriteGuard {
            owner_id,
            _guard: self.inner.write().await,
        }
    }

    pub async fn read<'a>(&'a self, owner_id: &'a str) -> OwnerReadGuard<'a> {
        OwnerReadGuard {
            owner_id,
            _guard: self.inner.read().await,
        }
    }
}

/// Exclusive access to one owner's store.
pub struct OwnerWriteGuard<'a> {
    owner_id: &'a str,
    _guard: RwLockWriteGuard<'a, ()>,
}

impl OwnerWriteGuard<'_> {
    pub fn owner_id(&self) -> &str {
        self.owner_id
    }
}

/// Shared read access to one owner's store.
pub struct OwnerReadGuard<'a> {
    owner_id: &'a str,
    _guard: RwLockReadGuard<'a, ()>,
}

impl OwnerReadGuard<'_> {
    pub fn owner_id(&self) -> &str {
        self.owner_id
    }
}
