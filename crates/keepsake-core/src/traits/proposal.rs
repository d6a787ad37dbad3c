// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The proposal source port: the agent that suggests memory operations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::KeepsakeError;
use crate::model::{Memory, MemoryType};
use crate::traits::adapter::PluginAdapter;

/// Compact view of a retrieved memory handed to the proposal source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemorySummary {
    pub id: String,
    pub content: String,
    pub memory_type: MemoryType,
    pub importance: f32,
}

impl From<&Memory> for MemorySummary {
    fn from(memory: &Memory) -> Self {
        Self {
            id: memory.id.clone(),
            content: memory.content.clone(),
            memory_type: memory.memory_type,
            importance: memory.importance,
        }
    }
}

/// One conversation turn plus the memories retrieved for it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProposalRequest {
    pub user_message: String,
    pub assistant_response: String,
    pub memories: Vec<MemorySummary>,
}

/// Proposes memory operations for a conversation turn.
///
/// Implementations return raw text; the engine parses it tolerantly, so a
/// source never needs to guarantee well-formed JSON.
#[async_trait]
pub trait ProposalSource: PluginAdapter {
    async fn propose(&self, request: ProposalRequest) -> Result<String, KeepsakeError>;
}
