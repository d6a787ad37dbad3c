// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Keepsake memory engine.
//!
//! One WAL-mode database per owner with embedded migrations, a single-writer
//! model via `tokio-rusqlite`, transactional change sets, and a factory that
//! keeps owners isolated from each other.

pub mod adapter;
pub mod database;
pub mod factory;
pub mod migrations;
pub mod queries;
pub mod writer;

pub use adapter::SqliteMemoryStore;
pub use database::Database;
pub use factory::{OwnerStore, StoreFactory, sanitize_owner_id};
pub use writer::{OwnerReadGuard, OwnerWriteGuard};
