// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory domain model: memories, relationships, version snapshots, and
//! the closed set of mutation operations.

/// Implements `Serialize`/`Deserialize` through the strum text form, so the
/// wire representation matches the SQLite column and parsing is
/// case-insensitive.
macro_rules! serde_via_strum {
    ($ty:ty) => {
        impl serde::Serialize for $ty {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> serde::Deserialize<'de> for $ty {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.trim()
                    .parse::<$ty>()
                    .map_err(|_| serde::de::Error::custom(format!("unknown variant `{raw}`")))
            }
        }
    };
}

pub mod changeset;
pub mod memory;
pub mod operation;
pub mod relationship;
pub mod version;

pub use changeset::{Change, ChangeSet, CommitReceipt, PrunePolicy, PruneReport};
pub use memory::{Memory, MemoryType, Metadata, clamp_unit};
pub use operation::{
    CreateOperation, DeleteOperation, MAX_CONTENT_CHARS, MIN_CONTENT_CHARS, MergeOperation,
    Operation, OperationKind, ReplaceOperation, UpdateOperation,
};
pub use relationship::{MemoryRelationship, RelationshipType};
pub use version::{EditContext, EditSource, VersionedMemory};
