// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed SQL for each table.
//!
//! Functions take a plain `rusqlite::Connection` so they compose inside a
//! transaction; callers dispatch them through `Database::connection().call()`.

pub mod changeset;
pub mod memories;
pub mod relationships;
pub mod versions;

use chrono::{DateTime, Utc};
use keepsake_core::Metadata;
use keepsake_core::types::parse_timestamp;
use rusqlite::types::Type;

/// Decode a TEXT column through `FromStr`, reporting failures as conversion errors.
pub(crate) fn parse_column<T>(idx: usize, raw: &str) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn timestamp_column(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    parse_timestamp(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn metadata_column(idx: usize, raw: &str) -> rusqlite::Result<Metadata> {
    serde_json::from_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn metadata_text(metadata: &Metadata) -> rusqlite::Result<String> {
    serde_json::to_string(metadata).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}
